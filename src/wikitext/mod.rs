//! Wikitext tokenizer and template call scanner.

pub use calls::{TemplateCall, parse_template_calls};
pub(crate) use calls::{BraceKind, BraceMatcher, Expression};
pub use codemap::{Span, Spanned};
use indexmap::IndexMap;
pub use tokenizer::{tokenize, tokenize_inline};

mod calls;
mod codemap;
#[cfg(test)]
mod tests;
mod tokenizer;

/// A template argument.
///
/// ```wikitext
/// {{Template|name=value|positional}}
///            ^^^^^^^^^^ ^^^^^^^^^^
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Argument {
    /// The trimmed name part of the argument, if the argument is named.
    pub name: Option<Span>,
    /// The value part of the argument. Named values are trimmed; positional
    /// values are kept verbatim.
    pub value: Span,
}

/// A Wikitext item.
///
/// Token spans always refer to the original source text passed to the
/// tokenizer, including for child tokens.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Token {
    /// A behavior switch like `__NOTOC__`.
    BehaviorSwitch {
        /// The switch name, excluding `__` markers.
        name: Span,
    },
    /// An HTML comment. Comments produce no output.
    Comment,
    /// An external link.
    ExternalLink {
        /// The link target URL.
        target: Span,
        /// The link content, if any was given after the URL.
        content: Option<Vec<Spanned<Token>>>,
    },
    /// A heading.
    Heading {
        /// The heading outline level.
        level: HeadingLevel,
        /// The heading content.
        content: Vec<Spanned<Token>>,
    },
    /// A horizontal rule.
    HorizontalRule,
    /// An HTML start, end, or self-closing tag.
    HtmlTag(HtmlTag),
    /// An internal link.
    Link {
        /// The trimmed target of the link.
        target: Span,
        /// The display content of the link. If `None`, the target is used.
        content: Option<Vec<Spanned<Token>>>,
    },
    /// A list item.
    ListItem {
        /// The kind of list item, from its marker character.
        kind: ListKind,
        /// The nesting level (number of repeated markers), starting at 1.
        level: usize,
        /// The raw content of the item, up to the end of the line.
        content: Span,
    },
    /// A magic word, like `{{PAGENAME}}`.
    MagicWord {
        /// The trimmed magic word name.
        name: Span,
    },
    /// A context-sensitive "\n".
    NewLine,
    /// Content of a `<nowiki>` tag, which is emitted as plain text.
    NoWiki {
        /// The raw content between the tags.
        content: Span,
    },
    /// A parser function, like `{{#if: a | b | c}}`.
    ParserFunction {
        /// The lowercase function name, excluding the leading `#`.
        name: String,
        /// The raw arguments. The text after the `:` in the callee is the
        /// first argument.
        arguments: Vec<Span>,
    },
    /// A table caption marker (`|+`).
    TableCaption,
    /// A table cell marker.
    TableCell {
        /// If true, this is a heading cell (`!`); otherwise, a data cell (`|`).
        header: bool,
    },
    /// A table end (`|}`).
    TableEnd,
    /// A table row marker (`|-`).
    TableRow {
        /// The raw attributes following the marker.
        attributes: Span,
    },
    /// A table start (`{|`).
    TableStart {
        /// The raw attributes following the marker.
        attributes: Span,
    },
    /// A template transclusion.
    Template {
        /// The trimmed template name.
        name: Span,
        /// The template arguments.
        arguments: Vec<Spanned<Argument>>,
    },
    /// A run of plain text.
    Text,
}

/// An HTML tag.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct HtmlTag {
    /// The lowercase tag name.
    pub name: String,
    /// If true, this is an end tag (`</name>`).
    pub closing: bool,
    /// If true, this is a self-closing tag (`<name/>`).
    pub self_closing: bool,
    /// The tag attributes, in source order.
    pub attributes: IndexMap<String, String>,
}

/// The kind of a list item.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ListKind {
    /// `*`
    Bullet,
    /// `#`
    Number,
    /// `:`
    Indent,
    /// `;`
    Definition,
}

impl ListKind {
    /// Returns the list kind for the given marker character.
    pub fn from_marker(marker: u8) -> Option<Self> {
        Some(match marker {
            b'*' => Self::Bullet,
            b'#' => Self::Number,
            b':' => Self::Indent,
            b';' => Self::Definition,
            _ => return None,
        })
    }

    /// The HTML tag name of the list containing items of this kind.
    pub fn list_tag(self) -> &'static str {
        match self {
            Self::Bullet => "ul",
            Self::Number => "ol",
            Self::Indent | Self::Definition => "dl",
        }
    }

    /// The HTML tag name of items of this kind.
    pub fn item_tag(self) -> &'static str {
        match self {
            Self::Bullet | Self::Number => "li",
            Self::Indent => "dd",
            Self::Definition => "dt",
        }
    }
}

/// A conversion error for out-of-range heading levels.
#[derive(Debug, thiserror::Error)]
#[error("{0} is not a valid HTML heading level")]
pub struct HeadingRangeError(u8);

/// A heading level.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub struct HeadingLevel(u8);

impl HeadingLevel {
    /// Returns the HTML tag name corresponding to this heading level.
    pub fn tag_name(self) -> &'static str {
        const TAGS: [&str; 6] = ["h1", "h2", "h3", "h4", "h5", "h6"];
        TAGS[usize::from(self.0) - 1]
    }
}

impl From<HeadingLevel> for u8 {
    fn from(value: HeadingLevel) -> Self {
        value.0
    }
}

impl TryFrom<u8> for HeadingLevel {
    type Error = HeadingRangeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        if (1..=6).contains(&value) {
            Ok(Self(value))
        } else {
            Err(HeadingRangeError(value))
        }
    }
}

/// Void HTML5 tags.
pub static VOID_TAGS: phf::Set<&str> = phf::phf_set! {
    "area", "base", "br", "col", "embed", "hr", "img",
    "input", "link", "meta", "param", "source",
    "track", "wbr",
};

/// Behavior switch names recognised between double underscores.
pub static BEHAVIOR_SWITCHES: phf::Set<&str> = phf::phf_set! {
    "NOTOC", "FORCETOC", "TOC", "NOEDITSECTION", "NEWSECTIONLINK",
    "NONEWSECTIONLINK", "NOGALLERY", "HIDDENCAT", "INDEX", "NOINDEX",
    "STATICREDIRECT", "NOTITLECONVERT", "NOCONTENTCONVERT", "DISAMBIG",
};

/// Returns true if the given template name is spelled like a magic word: at
/// least one uppercase letter, and no lowercase letters.
pub fn is_magic_word(name: &str) -> bool {
    name.chars().any(char::is_uppercase)
        && name
            .chars()
            .all(|c| c.is_uppercase() || c.is_ascii_digit() || c == '_' || c == ' ')
}
