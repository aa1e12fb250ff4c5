//! HTML emitters for Wikitext fragments that require state management.

use crate::wikitext::ListKind;
use core::fmt;

/// A text style toggle, from a run of apostrophes.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(super) enum TextStyle {
    /// `'''`
    Bold,
    /// `'''''`
    BoldItalic,
    /// `''`
    Italic,
}

/// List emitter.
#[derive(Debug, Default)]
pub(super) struct ListEmitter {
    /// The stack of currently open list items.
    stack: Vec<ListKind>,
}

impl ListEmitter {
    /// Emits HTML to match the new state given by `kinds`, outermost first.
    pub fn emit<W: fmt::Write + ?Sized>(&mut self, out: &mut W, kinds: &[ListKind]) -> fmt::Result {
        // There are four possible states here:
        //
        // 1. transition between dt and dd (new list item)
        // 2. no changes (new list item)
        // 3. more markers (new list inside last list item)
        // 4. fewer markers (new list item outside last list)
        let common_end = self
            .stack
            .iter()
            .zip(kinds.iter())
            .take_while(|(lhs, rhs)| same_parent(**lhs, **rhs))
            .count();

        for item in self.stack.drain(common_end..).rev() {
            end(item, out, true)?;
        }

        if common_end != 0 && common_end == self.stack.len() && common_end == kinds.len() {
            let old = &mut self.stack[common_end - 1];
            let new = kinds[common_end - 1];
            end(*old, out, false)?;
            start(new, out, false)?;
            *old = new;
        }

        for item in kinds[common_end..].iter().copied() {
            start(item, out, true)?;
            self.stack.push(item);
        }

        Ok(())
    }

    /// Emits HTML to finish any incomplete list.
    pub fn finish<W: fmt::Write + ?Sized>(&mut self, out: &mut W) -> fmt::Result {
        for item in self.stack.drain(..).rev() {
            end(item, out, true)?;
        }
        Ok(())
    }
}

/// Emits HTML for the end of a list item.
fn end<W: fmt::Write + ?Sized>(kind: ListKind, out: &mut W, end_of_list: bool) -> fmt::Result {
    write!(out, "</{}>", kind.item_tag())?;
    if end_of_list {
        write!(out, "</{}>", kind.list_tag())?;
    }
    Ok(())
}

/// Returns true if `lhs` items have the same parent element as `rhs` items.
#[inline]
fn same_parent(lhs: ListKind, rhs: ListKind) -> bool {
    lhs.list_tag() == rhs.list_tag()
}

/// Emits HTML for the start of a list item.
fn start<W: fmt::Write + ?Sized>(kind: ListKind, out: &mut W, start_of_list: bool) -> fmt::Result {
    if start_of_list {
        write!(out, "<{}>", kind.list_tag())?;
    }
    write!(out, "<{}>", kind.item_tag())
}

/// Text style emitter.
#[derive(Clone, Copy, Debug, Default)]
pub(super) enum TextStyleEmitter {
    /// No current style.
    #[default]
    None,
    /// Current style is bold.
    B,
    /// Current style is italic nested in bold.
    BI,
    /// Current style is italic.
    I,
    /// Current style is bold nested in italic.
    IB,
}

impl TextStyleEmitter {
    /// Emits HTML to match the new state given by `style`.
    pub fn emit<W: fmt::Write + ?Sized>(&mut self, out: &mut W, style: TextStyle) -> fmt::Result {
        // A five-apostrophe opener is always emitted as bold-then-italic, since
        // the order cannot be known until the closing run is seen.
        let (html, next) = match (style, *self) {
            (TextStyle::Bold, Self::None) => ("<strong>", Self::B),
            (TextStyle::Bold, Self::B) => ("</strong>", Self::None),
            (TextStyle::Bold, Self::BI) => ("</em></strong><em>", Self::I),
            (TextStyle::Bold, Self::I) => ("<strong>", Self::IB),
            (TextStyle::Bold, Self::IB) => ("</strong>", Self::I),

            (TextStyle::BoldItalic, Self::None) => ("<strong><em>", Self::BI),
            (TextStyle::BoldItalic, Self::B) => ("</strong><em>", Self::I),
            (TextStyle::BoldItalic, Self::BI) => ("</em></strong>", Self::None),
            (TextStyle::BoldItalic, Self::I) => ("</em><strong>", Self::B),
            (TextStyle::BoldItalic, Self::IB) => ("</strong></em>", Self::None),

            (TextStyle::Italic, Self::None) => ("<em>", Self::I),
            (TextStyle::Italic, Self::B) => ("<em>", Self::BI),
            (TextStyle::Italic, Self::BI) => ("</em>", Self::B),
            (TextStyle::Italic, Self::I) => ("</em>", Self::None),
            (TextStyle::Italic, Self::IB) => ("</strong></em><strong>", Self::B),
        };
        out.write_str(html)?;
        *self = next;
        Ok(())
    }

    /// Emits HTML to finish any incomplete style.
    pub fn finish<W: fmt::Write + ?Sized>(&mut self, out: &mut W) -> fmt::Result {
        match self {
            Self::None => {}
            Self::B => out.write_str("</strong>")?,
            Self::BI => out.write_str("</em></strong>")?,
            Self::I => out.write_str("</em>")?,
            Self::IB => out.write_str("</strong></em>")?,
        }
        *self = Self::None;
        Ok(())
    }
}
