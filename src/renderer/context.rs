//! Per-render parser state.

use crate::{common::url_encode, db::PageRecord};
use core::fmt;
use indexmap::IndexMap;
use std::{collections::HashMap, sync::Arc};
use time::OffsetDateTime;

/// The value of a magic word.
#[derive(Clone)]
pub enum MagicWord {
    /// A fixed string.
    Text(String),
    /// A function which is called each time the magic word is used.
    Dynamic(Arc<dyn Fn() -> String + Send + Sync>),
}

impl MagicWord {
    /// Returns the current value of the magic word.
    pub fn value(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Dynamic(f) => f(),
        }
    }
}

impl fmt::Debug for MagicWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Self::Dynamic(_) => f.write_str("Dynamic(..)"),
        }
    }
}

impl From<&str> for MagicWord {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for MagicWord {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// State for a single render.
#[derive(Debug)]
pub struct ParserContext {
    /// The title of the page being rendered, without namespace.
    pub page_title: String,
    /// The namespace of the page being rendered.
    pub namespace: String,
    /// Parameters bound to the text being rendered.
    pub template_params: IndexMap<String, String>,
    /// The current template transclusion depth.
    pub recursion_depth: usize,
    /// Magic word values, by name.
    pub magic_words: HashMap<String, MagicWord>,
    /// Rendered template calls, by normalized name and serialized parameters.
    pub template_cache: HashMap<String, String>,
    /// The current time, fixed for the duration of the render.
    pub now: OffsetDateTime,
}

impl ParserContext {
    /// Creates a new context for a page with the given metadata. A missing
    /// page gives empty page-related magic words.
    pub fn new(page: Option<&PageRecord>, now: OffsetDateTime) -> Self {
        let (page_title, namespace) = page
            .map(|page| (page.title.clone(), page.namespace.clone()))
            .unwrap_or_default();

        let full_page_name = if namespace.is_empty() {
            page_title.clone()
        } else {
            format!("{namespace}:{page_title}")
        };

        let magic_words = [
            ("PAGENAME", page_title.clone()),
            (
                "PAGENAMEE",
                url_encode(&page_title.replace(' ', "_")).to_string(),
            ),
            ("FULLPAGENAME", full_page_name),
            ("NAMESPACE", namespace.clone()),
            ("CURRENTYEAR", now.year().to_string()),
            ("CURRENTMONTH", format!("{:02}", u8::from(now.month()))),
            ("CURRENTMONTHNAME", now.month().to_string()),
            ("CURRENTDAY", now.day().to_string()),
            (
                "CURRENTTIME",
                format!("{:02}:{:02}", now.hour(), now.minute()),
            ),
            (
                "CURRENTTIMESTAMP",
                format!(
                    "{:04}{:02}{:02}{:02}{:02}{:02}",
                    now.year(),
                    u8::from(now.month()),
                    now.day(),
                    now.hour(),
                    now.minute(),
                    now.second()
                ),
            ),
        ]
        .into_iter()
        .map(|(name, value)| (name.to_string(), MagicWord::Text(value)))
        .collect();

        Self {
            page_title,
            namespace,
            template_params: IndexMap::new(),
            recursion_depth: 0,
            magic_words,
            template_cache: HashMap::new(),
            now,
        }
    }

    /// Returns the value of the magic word with the given name.
    pub fn magic_word(&self, name: &str) -> Option<String> {
        self.magic_words.get(name).map(MagicWord::value)
    }
}
