//! Engine configuration.
//!
//! Wikitext documents are not self-encapsulated and cannot be rendered without
//! out-of-band configuration data: which HTML is allowed through, how deep
//! template transclusion may go, where internal links point, and how long
//! rendered output may be reused.

use phf::Set;
use serde::Serialize;
use std::time::Duration;

/// The version of the render pipeline. It is folded into every render cache
/// key, so changing how output is produced must also change this value.
pub const CONFIG_VERSION: &str = "wiki-render/3";

/// Runtime configuration for an [`Engine`](crate::renderer::Engine).
#[derive(Clone, Debug, Serialize)]
pub struct Configuration {
    /// The maximum template transclusion depth. Transclusions past this depth
    /// are replaced by an error marker.
    pub max_depth: usize,
    /// If true, whitelisted HTML tags in the source are passed through.
    /// Otherwise, all tags are escaped.
    pub allow_html: bool,
    /// If true, `[[Category:…]]` links are collected into the render output
    /// instead of being shown.
    pub process_categories: bool,
    /// If true, templates, parser functions, and magic words are expanded.
    pub expand_templates: bool,
    /// How long a rendered page stays in the render cache.
    pub cache_ttl: Duration,
    /// The number of entries the render cache holds before it starts pruning.
    pub cache_max_entries: usize,
    /// The path prefix for internal links.
    pub link_prefix: String,
    /// The minimum number of headings required for the table of contents block
    /// to be emitted.
    pub toc_min_headings: usize,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            max_depth: 40,
            allow_html: true,
            process_categories: true,
            expand_templates: true,
            cache_ttl: Duration::from_secs(60 * 60),
            cache_max_entries: 1000,
            link_prefix: "/wiki/".into(),
            toc_min_headings: 1,
        }
    }
}

impl Configuration {
    /// Returns a copy of this configuration suitable for quick previews:
    /// templates are not expanded and categories are shown as written.
    pub fn preview(&self) -> Self {
        Self {
            expand_templates: false,
            process_categories: false,
            ..self.clone()
        }
    }
}

/// HTML tags allowed in Wikitext.
pub(crate) static HTML5_TAGS: Set<&str> = phf::phf_set! {
    // Explicit `<a>` tags are forbidden in Wikitext.
    "abbr",
    "b", "bdi", "bdo", "big", "blockquote", "br",
    "caption", "center", "cite", "code",
    "data", "dd", "del", "details", "dfn", "div", "dl", "dt",
    "em",
    "font",
    "h1", "h2", "h3", "h4", "h5", "h6", "hr",
    "i", "ins",
    "kbd",
    "li",
    "mark",
    "ol",
    "p", "pre",
    "q",
    "rb", "rp", "rt", "rtc", "ruby",
    "s", "samp", "small", "span", "strike", "strong", "sub", "summary", "sup",
    "table", "tbody", "td", "tfoot", "th", "thead", "time", "tr", "tt",
    "u", "ul",
    "var",
    "wbr",
};

/// HTML tags which start a block. Paragraphs are never opened around them.
pub(crate) static BLOCK_TAGS: Set<&str> = phf::phf_set! {
    "blockquote", "center", "details", "div", "dl", "h1", "h2", "h3", "h4",
    "h5", "h6", "hr", "ol", "p", "pre", "table", "ul",
};

/// Attribute names which may hold a URL.
pub(crate) static URL_ATTRIBUTES: Set<&str> = phf::phf_set! {
    "action", "background", "cite", "href", "poster", "src", "xlink:href",
};

/// URL schemes which may never appear in an attribute value.
pub(crate) static FORBIDDEN_SCHEMES: Set<&str> = phf::phf_set! {
    "javascript", "vbscript", "data",
};
