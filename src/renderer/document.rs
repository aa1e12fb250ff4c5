//! Block-level rendering of Wikitext documents.
//!
//! The token stream is walked once. Runs of inline tokens accumulate into an
//! implicit paragraph (graf), and lists and tables are each grouped by
//! scanning forward over their continuation tokens, then emitted as a whole.

use super::{
    Result, State,
    emitters::{ListEmitter, TextStyle, TextStyleEmitter},
    parser_fns, tags, template,
};
use crate::{
    common::anchor_encode,
    config::BLOCK_TAGS,
    wikitext::{ListKind, Span, Spanned, Token, VOID_TAGS, tokenize, tokenize_inline},
};
use core::fmt::Write as _;
use std::borrow::Cow;

/// Renders a complete Wikitext document to HTML.
pub(super) fn render_document(state: &mut State<'_>, source: &str) -> Result<String> {
    let tokens = tokenize(source);
    render_tokens(state, source, &tokens)
}

/// Renders Wikitext which will be embedded into some other output, like the
/// body of a template. A single paragraph is unwrapped to its content.
pub(super) fn render_fragment(state: &mut State<'_>, source: &str) -> Result<String> {
    Ok(unwrap_paragraph(render_document(state, source)?))
}

/// Renders Wikitext as a single line of inline content. Block-level markup
/// like list markers is kept as text.
pub(super) fn render_inline_text(state: &mut State<'_>, source: &str) -> Result<String> {
    let mut out = String::new();
    let tokens = tokenize_inline(source, Span::new(0, source.len()));
    render_inline(&mut out, state, source, &tokens)?;
    Ok(out)
}

/// Renders a sequence of block-level tokens to HTML.
fn render_tokens(state: &mut State<'_>, source: &str, tokens: &[Spanned<Token>]) -> Result<String> {
    let mut document = Document::default();
    document.render(state, source, tokens)?;
    document.finish()
}

/// Renders a sequence of inline tokens. Text styles are closed at the end of
/// the sequence.
pub(super) fn render_inline(
    out: &mut String,
    state: &mut State<'_>,
    source: &str,
    tokens: &[Spanned<Token>],
) -> Result {
    let mut style = TextStyleEmitter::default();
    for token in tokens {
        render_inline_token(out, &mut style, state, source, token)?;
    }
    style.finish(out)?;
    Ok(())
}

/// The root of a Wikitext document.
#[derive(Debug, Default)]
struct Document {
    /// The finished output.
    html: String,
    /// The inline content of the current graf.
    graf: String,
    /// The number of unbroken new lines at the end of the current graf.
    newlines: usize,
    /// The number of open block-level HTML elements from the source. Grafs are
    /// not wrapped in `<p>` inside of them.
    block_depth: usize,
    /// The text style emitter for the current line.
    text_style: TextStyleEmitter,
}

impl Document {
    /// Renders a sequence of tokens into the document.
    fn render(&mut self, state: &mut State<'_>, source: &str, tokens: &[Spanned<Token>]) -> Result {
        let mut index = 0;
        while let Some(token) = tokens.get(index) {
            match &token.node {
                Token::Heading { level, content } => {
                    self.flush()?;
                    let mut inner = String::new();
                    render_inline(&mut inner, state, source, content)?;
                    let tag = level.tag_name();
                    let id = anchor_encode(&tags::strip_tags(&inner));
                    writeln!(self.html, r#"<{tag} id="{id}">{inner}</{tag}>"#)?;
                }
                Token::HorizontalRule => {
                    self.flush()?;
                    self.html.push_str("<hr>\n");
                }
                Token::ListItem { .. } => {
                    self.flush()?;
                    index = self.list(state, source, tokens, index)?;
                    continue;
                }
                Token::TableStart { attributes } => {
                    self.flush()?;
                    index = self.table(state, source, tokens, index, *attributes)?;
                    continue;
                }
                Token::NewLine => self.new_line()?,
                Token::Text if self.newlines != 0 && is_blank(source, token.span) => {}
                Token::Comment | Token::BehaviorSwitch { .. } => {
                    render_inline_token(&mut self.graf, &mut self.text_style, state, source, token)?;
                }
                Token::Template { .. } | Token::ParserFunction { .. } | Token::MagicWord { .. } => {
                    let mut html = String::new();
                    expand_token(&mut html, state, source, token)?;
                    if is_block_html(&html) {
                        self.flush()?;
                        self.html.push_str(html.trim());
                        self.html.push('\n');
                    } else if !html.is_empty() {
                        self.start_inline();
                        self.graf.push_str(&html);
                    }
                }
                Token::HtmlTag(tag)
                    if BLOCK_TAGS.contains(tag.name.as_str())
                        && tags::is_allowed_tag(state, &tag.name) =>
                {
                    self.flush()?;
                    tags::render_html_tag(&mut self.html, state, source, token.span, tag)?;
                    if tag.closing {
                        self.block_depth = self.block_depth.saturating_sub(1);
                        if self.block_depth == 0 {
                            self.html.push('\n');
                        }
                    } else if !tag.self_closing && !VOID_TAGS.contains(tag.name.as_str()) {
                        self.block_depth += 1;
                    }
                }
                _ => {
                    self.start_inline();
                    render_inline_token(&mut self.graf, &mut self.text_style, state, source, token)?;
                }
            }
            index += 1;
        }
        Ok(())
    }

    /// Finalises the document and returns the resulting output.
    fn finish(mut self) -> Result<String> {
        self.flush()?;
        let len = self.html.trim_end().len();
        self.html.truncate(len);
        Ok(self.html)
    }

    /// Emits the current graf, if it has any visible content.
    fn flush(&mut self) -> Result {
        self.text_style.finish(&mut self.graf)?;
        let content = self.graf.trim();
        if !content.is_empty() {
            if self.block_depth == 0 {
                writeln!(self.html, "<p>{content}</p>")?;
            } else {
                self.html.push_str(content);
            }
        }
        self.graf.clear();
        self.newlines = 0;
        Ok(())
    }

    /// Handles a new line. Two new lines with nothing but white space between
    /// them end the current graf.
    fn new_line(&mut self) -> Result {
        if self.graf.is_empty() {
            return Ok(());
        }

        self.text_style.finish(&mut self.graf)?;
        self.newlines += 1;
        if self.newlines >= 2 {
            self.flush()?;
        }
        Ok(())
    }

    /// Prepares the current graf for more inline content.
    fn start_inline(&mut self) {
        if self.newlines != 0 {
            self.graf.push('\n');
            self.newlines = 0;
        }
    }

    /// Emits a run of list items starting at `start`. Returns the index of the
    /// first token after the list.
    fn list(
        &mut self,
        state: &mut State<'_>,
        source: &str,
        tokens: &[Spanned<Token>],
        start: usize,
    ) -> Result<usize> {
        let mut emitter = ListEmitter::default();
        let mut index = start;
        while let Some(Token::ListItem {
            kind,
            level,
            content,
        }) = tokens.get(index).map(|token| &token.node)
        {
            let mut kinds = vec![*kind; *level];
            emitter.emit(&mut self.html, &kinds)?;

            let split = (*kind == ListKind::Definition)
                .then(|| definition_split(source, *content))
                .flatten();
            if let Some(colon) = split {
                let term = Span::new(content.start, colon).trim(source);
                let detail = Span::new(colon + 1, content.end).trim(source);
                render_inline(&mut self.html, state, source, &tokenize_inline(source, term))?;
                if let Some(last) = kinds.last_mut() {
                    *last = ListKind::Indent;
                }
                emitter.emit(&mut self.html, &kinds)?;
                render_inline(&mut self.html, state, source, &tokenize_inline(source, detail))?;
            } else {
                let content = content.trim(source);
                render_inline(&mut self.html, state, source, &tokenize_inline(source, content))?;
            }

            // Items are separated by exactly one new line
            index += 1;
            if matches!(tokens.get(index).map(|t| &t.node), Some(Token::NewLine))
                && matches!(
                    tokens.get(index + 1).map(|t| &t.node),
                    Some(Token::ListItem { .. })
                )
            {
                index += 1;
            }
        }
        emitter.finish(&mut self.html)?;
        self.html.push('\n');
        Ok(index)
    }

    /// Emits a table starting at `start`. Returns the index of the first token
    /// after the table.
    fn table(
        &mut self,
        state: &mut State<'_>,
        source: &str,
        tokens: &[Spanned<Token>],
        start: usize,
        attributes: Span,
    ) -> Result<usize> {
        let end = table_end(tokens, start);
        let body = &tokens[start + 1..end];

        let mut attributes = tags::parse_attributes(&source[attributes.into_range()]);
        let class = match attributes.shift_remove("class") {
            Some(class) if !class.trim().is_empty() => Cow::Owned(format!("wikitable {}", class.trim())),
            _ => Cow::Borrowed("wikitable"),
        };

        let mut html = String::new();
        let mut fostered = String::new();
        write!(
            html,
            r#"<table class="{}""#,
            html_escape::encode_double_quoted_attribute(&class)
        )?;
        tags::write_attributes(&mut html, &attributes)?;
        html.push('>');

        let mut row_open = false;
        let mut index = 0;
        while let Some(token) = body.get(index) {
            match &token.node {
                Token::TableRow { attributes } => {
                    if row_open {
                        html.push_str("</tr>");
                    }
                    html.push_str("<tr");
                    tags::write_attributes(
                        &mut html,
                        &tags::parse_attributes(&source[attributes.into_range()]),
                    )?;
                    html.push('>');
                    row_open = true;
                    index += 1;
                }
                Token::TableCaption | Token::TableCell { .. } => {
                    let next = next_table_marker(body, index + 1);
                    let (attributes, content) = cell_attributes(source, &body[index + 1..next]);
                    let tag = match token.node {
                        Token::TableCaption => "caption",
                        Token::TableCell { header: true } => "th",
                        _ => "td",
                    };
                    if tag != "caption" && !row_open {
                        html.push_str("<tr>");
                        row_open = true;
                    }
                    let content = unwrap_paragraph(render_tokens(state, source, &content)?);
                    write!(html, "<{tag}")?;
                    tags::write_attributes(&mut html, &attributes)?;
                    write!(html, ">{content}</{tag}>")?;
                    index = next;
                }
                _ => {
                    // Content outside of any cell is moved in front of the
                    // table
                    let next = next_table_marker(body, index);
                    let content = render_tokens(state, source, &body[index..next])?;
                    if !content.is_empty() {
                        fostered.push_str(&content);
                        fostered.push('\n');
                    }
                    index = next;
                }
            }
        }

        if row_open {
            html.push_str("</tr>");
        }
        html.push_str("</table>\n");

        self.html.push_str(&fostered);
        self.html.push_str(&html);
        Ok((end + 1).min(tokens.len()))
    }
}

/// Renders a single inline token.
fn render_inline_token(
    out: &mut String,
    style: &mut TextStyleEmitter,
    state: &mut State<'_>,
    source: &str,
    token: &Spanned<Token>,
) -> Result {
    match &token.node {
        Token::Text => text_run(out, style, &source[token.span.into_range()])?,
        Token::NewLine => {
            style.finish(out)?;
            out.push('\n');
        }
        Token::Link { target, content } => {
            tags::render_link(out, state, source, token.span, *target, content.as_deref())?;
        }
        Token::ExternalLink { target, content } => {
            tags::render_external_link(out, state, source, *target, content.as_deref())?;
        }
        Token::HtmlTag(tag) => tags::render_html_tag(out, state, source, token.span, tag)?,
        Token::NoWiki { content } => {
            out.push_str(&html_escape::encode_text(&source[content.into_range()]));
        }
        Token::Comment => {}
        Token::BehaviorSwitch { name } => {
            state.switches.insert(source[name.into_range()].to_string());
        }
        Token::Template { .. } | Token::ParserFunction { .. } | Token::MagicWord { .. } => {
            expand_token(out, state, source, token)?;
        }
        Token::Heading { .. }
        | Token::HorizontalRule
        | Token::ListItem { .. }
        | Token::TableCaption
        | Token::TableCell { .. }
        | Token::TableEnd
        | Token::TableRow { .. }
        | Token::TableStart { .. } => tags::escape_text(out, &source[token.span.into_range()]),
    }
    Ok(())
}

/// Expands a template, parser function, or magic word token.
fn expand_token(
    out: &mut String,
    state: &mut State<'_>,
    source: &str,
    token: &Spanned<Token>,
) -> Result {
    match &token.node {
        Token::Template { name, arguments } => {
            template::render_template(out, state, source, token.span, *name, arguments)
        }
        Token::ParserFunction { name, arguments } => {
            parser_fns::render_parser_fn(out, state, source, token.span, name, arguments)
        }
        Token::MagicWord { name } => template::render_magic_word(
            out,
            state,
            source,
            token.span,
            &source[name.into_range()],
        ),
        _ => Ok(()),
    }
}

/// Writes a run of text, converting apostrophe runs into text styles.
///
/// Runs are matched longest first: five apostrophes toggle bold and italic,
/// three toggle bold, and two toggle italic. A run of four is an apostrophe
/// followed by a bold toggle, and a run of more than five keeps the extra
/// apostrophes as text before a bold and italic toggle.
fn text_run(out: &mut String, style: &mut TextStyleEmitter, text: &str) -> Result {
    let mut rest = text;
    while let Some(index) = rest.find("''") {
        tags::escape_text(out, &rest[..index]);
        let run = rest[index..].bytes().take_while(|b| *b == b'\'').count();
        let toggle = match run {
            2 => TextStyle::Italic,
            3 => TextStyle::Bold,
            4 => {
                out.push('\'');
                TextStyle::Bold
            }
            5 => TextStyle::BoldItalic,
            _ => {
                out.extend(core::iter::repeat_n('\'', run - 5));
                TextStyle::BoldItalic
            }
        };
        style.emit(out, toggle)?;
        rest = &rest[index + run..];
    }
    tags::escape_text(out, rest);
    Ok(())
}

/// Returns the index of the token which closes the table opened at `start`,
/// or the end of the token stream if the table is never closed.
fn table_end(tokens: &[Spanned<Token>], start: usize) -> usize {
    let mut depth = 0_usize;
    for (index, token) in tokens.iter().enumerate().skip(start) {
        match token.node {
            Token::TableStart { .. } => depth += 1,
            Token::TableEnd => {
                depth -= 1;
                if depth == 0 {
                    return index;
                }
            }
            _ => {}
        }
    }
    tokens.len()
}

/// Returns the index of the next row, cell, or caption marker of the current
/// table, skipping over nested tables.
fn next_table_marker(tokens: &[Spanned<Token>], from: usize) -> usize {
    let mut depth = 0_usize;
    for (index, token) in tokens.iter().enumerate().skip(from) {
        match token.node {
            Token::TableStart { .. } => depth += 1,
            Token::TableEnd => depth = depth.saturating_sub(1),
            Token::TableRow { .. } | Token::TableCell { .. } | Token::TableCaption if depth == 0 => {
                return index;
            }
            _ => {}
        }
    }
    tokens.len()
}

/// Splits the attributes from the content of a table cell.
///
/// ```wikitext
/// | style="color: red" | content
///   ^^^^^^^^^^^^^^^^^^
/// ```
fn cell_attributes(
    source: &str,
    content: &[Spanned<Token>],
) -> (indexmap::IndexMap<String, String>, Vec<Spanned<Token>>) {
    if let Some((first, rest)) = content.split_first()
        && first.node == Token::Text
    {
        let text = &source[first.span.into_range()];
        if let Some(pipe) = text.find('|')
            && !text[..pipe].contains('\n')
        {
            let attributes = tags::parse_attributes(&text[..pipe]);
            let mut tokens = Vec::with_capacity(content.len());
            let after = first.span.start + pipe + 1;
            if after < first.span.end {
                tokens.push(Spanned::new(Token::Text, after, first.span.end));
            }
            tokens.extend_from_slice(rest);
            return (attributes, tokens);
        }
    }
    (indexmap::IndexMap::new(), content.to_vec())
}

/// Finds the `:` separating the term from the detail of a `; term : detail`
/// item. Colons inside links and templates do not count.
fn definition_split(source: &str, content: Span) -> Option<usize> {
    let bytes = &source.as_bytes()[content.into_range()];
    let mut depth = 0_usize;
    let mut index = 0;
    while index < bytes.len() {
        match (bytes[index], bytes.get(index + 1)) {
            (b'[', Some(b'[')) | (b'{', Some(b'{')) => {
                depth += 1;
                index += 1;
            }
            (b']', Some(b']')) | (b'}', Some(b'}')) => {
                depth = depth.saturating_sub(1);
                index += 1;
            }
            (b':', _) if depth == 0 => return Some(content.start + index),
            _ => {}
        }
        index += 1;
    }
    None
}

/// Returns true if the text in `span` is entirely white space.
#[inline]
fn is_blank(source: &str, span: Span) -> bool {
    source[span.into_range()].trim().is_empty()
}

/// Returns true if the given HTML starts with a block-level element.
fn is_block_html(html: &str) -> bool {
    html.trim_start().strip_prefix('<').is_some_and(|rest| {
        let name_len = rest
            .bytes()
            .take_while(u8::is_ascii_alphanumeric)
            .count();
        BLOCK_TAGS.contains(rest[..name_len].to_ascii_lowercase().as_str())
    })
}

/// Unwraps a document consisting of a single graf into its content.
fn unwrap_paragraph(html: String) -> String {
    let trimmed = html.trim();
    if let Some(inner) = trimmed
        .strip_prefix("<p>")
        .and_then(|rest| rest.strip_suffix("</p>"))
        && !inner.contains("<p>")
        && !inner.contains("</p>")
    {
        inner.to_string()
    } else if trimmed.len() == html.len() {
        html
    } else {
        trimmed.to_string()
    }
}
