//! Collections for semi-structured article data.

use super::{TocEntry, tags::strip_tags};
use crate::common::{anchor_encode, decode_html};
use core::fmt::{self, Write as _};
use indexmap::IndexSet;
use regex::{Captures, Regex};
use std::{collections::HashSet, sync::LazyLock};

/// The categories which the article belongs to, in order of first
/// appearance.
#[derive(Debug, Default)]
pub(crate) struct Categories(IndexSet<String>);

impl Categories {
    /// Adds a category to the set.
    pub(super) fn insert(&mut self, value: String) {
        self.0.insert(value);
    }

    /// Consumes this object, returning the category names.
    pub(super) fn into_vec(self) -> Vec<String> {
        self.0.into_iter().collect()
    }
}

/// An article outline (table of contents).
#[derive(Debug, Default)]
pub(crate) struct Outline(Vec<TocEntry>);

impl Outline {
    /// Extracts the outline from rendered HTML.
    ///
    /// Headings without an `id` get one generated from their text, and
    /// duplicate ids get a numeric suffix so every anchor is unique.
    pub(super) fn collect(html: &str) -> (String, Self) {
        static HEADING: LazyLock<Regex> =
            LazyLock::new(|| Regex::new(r"(?s)<h([1-6])([^>]*)>(.*?)</h[1-6]>").unwrap());
        static ID: LazyLock<Regex> =
            LazyLock::new(|| Regex::new(r#"(?:^|\s)id="([^"]*)""#).unwrap());

        let mut outline = Vec::new();
        let mut seen = HashSet::new();
        let html = HEADING.replace_all(html, |captures: &Captures<'_>| {
            let level = captures[1].parse::<u8>().unwrap_or(2);
            let attributes = &captures[2];
            let inner = &captures[3];
            let text = decode_html(&strip_tags(inner)).trim().to_string();

            let base = match ID.captures(attributes) {
                Some(id) if !id[1].is_empty() => id[1].to_string(),
                _ => {
                    let id = anchor_encode(&text);
                    if id.is_empty() { "section".into() } else { id }
                }
            };
            let mut id = base.clone();
            let mut n = 1;
            while !seen.insert(id.clone()) {
                n += 1;
                id = format!("{base}-{n}");
            }

            let attributes = ID.replace(attributes, "");
            let attributes = attributes.trim();
            let html = if attributes.is_empty() {
                format!(r#"<h{level} id="{id}">{inner}</h{level}>"#)
            } else {
                format!(r#"<h{level} id="{id}" {attributes}>{inner}</h{level}>"#)
            };
            outline.push(TocEntry { level, text, id });
            html
        });
        (html.into_owned(), Self(outline))
    }

    /// Returns true if the outline has no entries.
    #[inline]
    pub(super) fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The number of entries in the outline.
    #[inline]
    pub(super) fn len(&self) -> usize {
        self.0.len()
    }

    /// Inserts the outline as a collapsible block after the first paragraph
    /// of `html`, or before the first heading if there is no paragraph.
    pub(super) fn insert_into(&self, html: &mut String) -> fmt::Result {
        let mut block = String::new();
        write!(
            block,
            r#"<details class="toc" open><summary>Contents</summary>{self}</details>"#
        )?;

        if let Some(index) = html.find("</p>") {
            let at = index + "</p>".len();
            block.insert(0, '\n');
            html.insert_str(at, &block);
        } else if let Some(index) = html.find("<h") {
            block.push('\n');
            html.insert_str(index, &block);
        } else {
            html.push_str(&block);
        }
        Ok(())
    }

    /// Consumes this object, returning the entries.
    pub(super) fn into_vec(self) -> Vec<TocEntry> {
        self.0
    }
}

impl fmt::Display for Outline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(top) = self.0.iter().map(|entry| entry.level).min() else {
            return Ok(());
        };

        f.write_str("<ul>")?;
        let mut current = top;
        for entry in &self.0 {
            while current > entry.level {
                f.write_str("</ul>")?;
                current -= 1;
            }
            while current < entry.level {
                f.write_str("<ul>")?;
                current += 1;
            }
            write!(
                f,
                r##"<li><a href="#{}">{}</a></li>"##,
                entry.id,
                html_escape::encode_text_minimal(&entry.text)
            )?;
        }
        while current > top {
            f.write_str("</ul>")?;
            current -= 1;
        }
        f.write_str("</ul>")
    }
}
