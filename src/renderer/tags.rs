//! Link and plain HTML rendering functions.

use super::{Result, State, document::render_inline};
use crate::{
    common::{anchor_encode, decode_html, url_encode},
    config::{FORBIDDEN_SCHEMES, HTML5_TAGS, URL_ATTRIBUTES},
    wikitext::{HtmlTag, Span, Spanned, Token, VOID_TAGS, tokenize_inline},
};
use core::fmt::{self, Write as _};
use indexmap::IndexMap;
use regex::Regex;
use std::{borrow::Cow, sync::LazyLock};

/// The kind of an internal link target.
#[derive(Debug, Eq, PartialEq)]
enum LinkKind<'a> {
    /// A category membership, like `[[Category:Name|sort key]]`.
    Category(&'a str),
    /// A link to a media file.
    File,
    /// A link to a page.
    Page,
}

impl<'a> LinkKind<'a> {
    /// Classifies a decoded link target. A leading `:` forces a page link.
    fn new(target: &'a str) -> (Self, &'a str) {
        if let Some(target) = target.strip_prefix(':') {
            return (Self::Page, target.trim_start());
        }

        let kind = match target.split_once(':') {
            Some((prefix, name)) if prefix.trim().eq_ignore_ascii_case("category") => {
                Self::Category(name.trim())
            }
            Some((prefix, _))
                if prefix.trim().eq_ignore_ascii_case("file")
                    || prefix.trim().eq_ignore_ascii_case("image") =>
            {
                Self::File
            }
            _ => Self::Page,
        };
        (kind, target)
    }
}

/// Renders an internal link.
pub(super) fn render_link(
    out: &mut String,
    state: &mut State<'_>,
    source: &str,
    span: Span,
    target: Span,
    content: Option<&[Spanned<Token>]>,
) -> Result {
    let raw_target = &source[target.into_range()];
    let target_text = if raw_target.contains("{{") {
        let mut expanded = String::new();
        render_inline(
            &mut expanded,
            state,
            source,
            &tokenize_inline(source, target),
        )?;
        decode_html(&strip_tags(&expanded)).trim().to_string()
    } else {
        decode_html(raw_target).trim().to_string()
    };

    let (kind, target_text) = LinkKind::new(&target_text);
    if let LinkKind::Category(name) = kind {
        if state.config.process_categories {
            if !name.is_empty() {
                state.categories.insert(name.to_string());
            }
        } else {
            escape_text(out, &source[span.into_range()]);
        }
        return Ok(());
    }

    let (page, fragment) = target_text.split_once('#').unwrap_or((target_text, ""));
    let page = page.trim();
    out.write_str(r#"<a href=""#)?;
    if !page.is_empty() {
        write!(
            out,
            "{}{}",
            html_escape::encode_double_quoted_attribute(&state.config.link_prefix),
            url_encode(&page.replace(' ', "_"))
        )?;
    }
    if !fragment.trim().is_empty() {
        write!(out, "#{}", anchor_encode(fragment))?;
    }
    out.write_char('"')?;
    if kind == LinkKind::File {
        out.write_str(r#" class="internal-link file-link""#)?;
    }
    out.write_char('>')?;

    match content {
        Some(content) => render_inline(out, state, source, content)?,
        None => escape_text(out, target_text),
    }
    out.write_str("</a>")?;
    Ok(())
}

/// Renders an external web site link.
pub(super) fn render_external_link(
    out: &mut String,
    state: &mut State<'_>,
    source: &str,
    target: Span,
    content: Option<&[Spanned<Token>]>,
) -> Result {
    let url = &source[target.into_range()];
    write!(
        out,
        r#"<a href="{}" rel="nofollow noopener" target="_blank">"#,
        html_escape::encode_double_quoted_attribute(url)
    )?;
    match content {
        Some(content) => render_inline(out, state, source, content)?,
        None => escape_text(out, url),
    }
    out.write_str("</a>")?;
    Ok(())
}

/// Returns true if an HTML tag with this name is passed through to the
/// output.
#[inline]
pub(super) fn is_allowed_tag(state: &State<'_>, name: &str) -> bool {
    state.config.allow_html && HTML5_TAGS.contains(name)
}

/// Renders an HTML tag from the source text. Tags which are not allowed are
/// shown as escaped text.
pub(super) fn render_html_tag(
    out: &mut String,
    state: &State<'_>,
    source: &str,
    span: Span,
    tag: &HtmlTag,
) -> Result {
    if !is_allowed_tag(state, &tag.name) {
        out.push_str(&html_escape::encode_text(&source[span.into_range()]));
        return Ok(());
    }

    let is_void = VOID_TAGS.contains(tag.name.as_str());
    if tag.closing {
        if !is_void {
            write!(out, "</{}>", tag.name)?;
        }
    } else {
        write!(out, "<{}", tag.name)?;
        write_attributes(out, &tag.attributes)?;
        if tag.self_closing && !is_void {
            write!(out, "></{}>", tag.name)?;
        } else {
            out.write_char('>')?;
        }
    }
    Ok(())
}

/// Parses a raw attribute string, like the one following a table marker.
pub(super) fn parse_attributes(text: &str) -> IndexMap<String, String> {
    static ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r#"([A-Za-z_:][-A-Za-z0-9_:.]*)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+)))?"#)
            .unwrap()
    });

    ATTRIBUTE
        .captures_iter(text)
        .map(|captures| {
            let name = captures[1].to_ascii_lowercase();
            let value = captures
                .get(2)
                .or_else(|| captures.get(3))
                .or_else(|| captures.get(4))
                .map_or("", |value| value.as_str());
            (name, value.to_string())
        })
        .collect()
}

/// Writes HTML attributes, dropping event handlers and unsafe URLs.
pub(super) fn write_attributes(
    out: &mut String,
    attributes: &IndexMap<String, String>,
) -> fmt::Result {
    for (name, value) in attributes {
        if !is_safe_attribute(name, value) {
            log::debug!("Dropping unsafe attribute '{name}'");
            continue;
        }
        write!(
            out,
            r#" {name}="{}""#,
            html_escape::encode_double_quoted_attribute(value)
        )?;
    }
    Ok(())
}

/// Returns true if the given attribute can be written to the output.
fn is_safe_attribute(name: &str, value: &str) -> bool {
    if name.is_empty()
        || name.starts_with("on")
        || !name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b':' | b'.'))
    {
        return false;
    }

    // Browsers ignore white space and control characters inside the scheme
    let compact = decode_html(value)
        .chars()
        .filter(|c| !c.is_whitespace() && !c.is_control())
        .collect::<String>()
        .to_ascii_lowercase();

    if URL_ATTRIBUTES.contains(name)
        && compact
            .split_once(':')
            .is_some_and(|(scheme, _)| FORBIDDEN_SCHEMES.contains(scheme))
    {
        return false;
    }

    !(name == "style" && (compact.contains("expression(") || compact.contains("javascript:")))
}

/// Writes plain text as HTML, escaping markup characters. Valid character
/// references are kept as-is.
pub(super) fn escape_text(out: &mut String, text: &str) {
    static ENTITY: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"^&(?:[A-Za-z][A-Za-z0-9]{1,31}|#[0-9]{1,7}|#[xX][0-9A-Fa-f]{1,6});").unwrap()
    });

    for (index, c) in text.char_indices() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' if !ENTITY.is_match(&text[index..]) => out.push_str("&amp;"),
            c => out.push(c),
        }
    }
}

/// Removes HTML tags from a string.
pub(super) fn strip_tags(html: &str) -> Cow<'_, str> {
    static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").unwrap());
    TAG.replace_all(html, "")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_kind() {
        assert_eq!(
            LinkKind::new("Category:Foo"),
            (LinkKind::Category("Foo"), "Category:Foo")
        );
        assert_eq!(
            LinkKind::new("category : Foo bar "),
            (LinkKind::Category("Foo bar"), "category : Foo bar ")
        );
        assert_eq!(
            LinkKind::new(":Category:Foo"),
            (LinkKind::Page, "Category:Foo")
        );
        assert_eq!(LinkKind::new("Image:a.png"), (LinkKind::File, "Image:a.png"));
        assert_eq!(LinkKind::new("Main Page"), (LinkKind::Page, "Main Page"));
    }

    #[test]
    fn attributes() {
        let attributes = parse_attributes(r#"class="a b" ID='x' border=1 hidden"#);
        assert_eq!(
            attributes.into_iter().collect::<Vec<_>>(),
            [
                ("class".to_string(), "a b".to_string()),
                ("id".to_string(), "x".to_string()),
                ("border".to_string(), "1".to_string()),
                ("hidden".to_string(), String::new()),
            ]
        );
    }

    #[test]
    fn unsafe_attributes() {
        let attributes = parse_attributes(
            r#"onclick="x()" href=" JavaScript:alert(1)" cite="https://example.com" style="width: expression(1)" title="a&quot;b""#,
        );
        let mut out = String::new();
        write_attributes(&mut out, &attributes).unwrap();
        assert_eq!(out, r#" cite="https://example.com" title="a&amp;quot;b""#);
    }

    #[test]
    fn escape() {
        let mut out = String::new();
        escape_text(&mut out, "a < b && c &amp; d &#160; &#x1F600; &nope");
        assert_eq!(
            out,
            "a &lt; b &amp;&amp; c &amp; d &#160; &#x1F600; &amp;nope"
        );
    }

    #[test]
    fn strip() {
        assert_eq!(strip_tags("<em>a</em> <b class=\"x\">b</b>"), "a b");
    }
}
