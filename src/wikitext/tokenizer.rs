//! A single-pass, character-driven Wikitext tokenizer.
//!
//! The tokenizer never fails. Anything which looks like the start of a
//! construct but turns out to be malformed (unclosed links, templates, tags) is
//! emitted as plain text.

use super::{
    Argument, BEHAVIOR_SWITCHES, BraceKind, BraceMatcher, Expression, HeadingLevel, HtmlTag,
    ListKind, Span, Spanned, Token, is_magic_word,
};
use indexmap::IndexMap;

/// Recognised external link schemes.
const URL_SCHEMES: [&str; 4] = ["http://", "https://", "ftp://", "mailto:"];

/// Tokenizes a Wikitext document.
pub fn tokenize(source: &str) -> Vec<Spanned<Token>> {
    Tokenizer::new(source, Span::new(0, source.len()), false).run()
}

/// Tokenizes a fragment of a Wikitext document as inline content. Line-based
/// constructs (headings, lists, tables, rules) are not recognised.
///
/// The spans of the returned tokens are relative to the start of `source`,
/// not the start of `span`.
pub fn tokenize_inline(source: &str, span: Span) -> Vec<Spanned<Token>> {
    Tokenizer::new(source, span, true).run()
}

/// Tokenizer state.
struct Tokenizer<'a> {
    /// The full source text.
    source: &'a str,
    /// The full source text, as bytes.
    bytes: &'a [u8],
    /// The position where tokenization started.
    begin: usize,
    /// The position where tokenization must stop.
    end: usize,
    /// The current position.
    pos: usize,
    /// If true, line-based constructs are disabled.
    inline: bool,
    /// The start of the pending text run, if any.
    text_start: Option<usize>,
    /// The emitted tokens.
    tokens: Vec<Spanned<Token>>,
    /// The number of unmatched table starts emitted so far.
    table_depth: usize,
    /// If true, the current line started with a table cell marker, so inline
    /// cell separators are recognised.
    cell_line: bool,
    /// If true, the current line started with a table heading cell marker.
    header_line: bool,
    /// The brace expression matcher for the tokenized range.
    braces: BraceMatcher<'a>,
}

impl<'a> Tokenizer<'a> {
    /// Creates a new tokenizer over the given span of `source`.
    fn new(source: &'a str, span: Span, inline: bool) -> Self {
        Self {
            source,
            bytes: source.as_bytes(),
            begin: span.start,
            end: span.end,
            pos: span.start,
            inline,
            text_start: None,
            tokens: Vec::new(),
            table_depth: 0,
            cell_line: false,
            header_line: false,
            braces: BraceMatcher::new(source, span.end),
        }
    }

    /// Consumes the whole input, returning the token stream.
    fn run(mut self) -> Vec<Spanned<Token>> {
        while self.pos < self.end {
            let matched = match self.bytes[self.pos] {
                b'\n' => {
                    self.cell_line = false;
                    self.header_line = false;
                    self.push(Token::NewLine, self.pos + 1);
                    true
                }
                b'=' if self.at_line_start() => self.heading(),
                b'[' if self.byte_at(1) == Some(b'[') => self.link(),
                b'[' => self.external_link(),
                b'{' => self.brace(),
                b'|' => self.pipe(),
                b'!' => self.bang(),
                b'<' => self.angle(),
                b'*' | b'#' | b':' | b';' if self.at_line_start() => self.list_item(),
                b'-' if self.at_line_start() && self.starts_with("----") => {
                    self.horizontal_rule()
                }
                b'_' if self.starts_with("__") => self.behavior_switch(),
                _ => false,
            };

            if !matched {
                self.text_start.get_or_insert(self.pos);
                self.pos += 1;
            }
        }

        self.flush_text(self.end);
        self.tokens
    }

    /// Returns true if the current position is at the start of a line: the
    /// start of the input, or immediately after an emitted new line.
    fn at_line_start(&self) -> bool {
        !self.inline
            && self.text_start.is_none()
            && (self.pos == self.begin
                || matches!(
                    self.tokens.last(),
                    Some(Spanned {
                        node: Token::NewLine,
                        ..
                    })
                ))
    }

    /// Returns the byte at `offset` from the current position, if it is in
    /// bounds.
    #[inline]
    fn byte_at(&self, offset: usize) -> Option<u8> {
        self.byte(self.pos + offset)
    }

    /// Returns the byte at the absolute position `pos`, if it is in bounds.
    #[inline]
    fn byte(&self, pos: usize) -> Option<u8> {
        (pos < self.end).then(|| self.bytes[pos])
    }

    /// Returns the number of consecutive `byte` from the current position.
    fn count(&self, byte: u8) -> usize {
        self.bytes[self.pos..self.end]
            .iter()
            .take_while(|b| **b == byte)
            .count()
    }

    /// Returns the position of the next line terminator at or after `from`, or
    /// the end of input.
    fn line_end(&self, from: usize) -> usize {
        memchr::memchr(b'\n', &self.bytes[from..self.end]).map_or(self.end, |index| from + index)
    }

    /// Returns true if the input at the current position starts with `s`.
    fn starts_with(&self, s: &str) -> bool {
        self.bytes[self.pos..self.end].starts_with(s.as_bytes())
    }

    /// Consumes input up to `end` as part of a plain text run.
    fn consume_text(&mut self, end: usize) -> bool {
        self.text_start.get_or_insert(self.pos);
        self.pos = end;
        true
    }

    /// Emits any pending text up to `at`.
    fn flush_text(&mut self, at: usize) {
        if let Some(start) = self.text_start.take()
            && start < at
        {
            self.tokens.push(Spanned::new(Token::Text, start, at));
        }
    }

    /// Emits a token spanning from the current position to `end`, and moves
    /// the current position to `end`.
    fn push(&mut self, token: Token, end: usize) {
        self.flush_text(self.pos);
        self.tokens.push(Spanned::new(token, self.pos, end));
        self.pos = end;
    }

    /// `== heading ==`
    fn heading(&mut self) -> bool {
        let open = self.count(b'=');
        let eol = self.line_end(self.pos);
        let line = &self.source[self.pos..eol];
        let trimmed_end = self.pos + line.trim_end_matches([' ', '\t', '\r']).len();
        let close = self.bytes[self.pos..trimmed_end]
            .iter()
            .rev()
            .take_while(|b| **b == b'=')
            .count();

        // The closing run must be distinct from the opening run
        if close == 0 || trimmed_end - close < self.pos + open {
            return false;
        }

        let level = open.min(close).min(6);
        let content = Span::new(self.pos + level, trimmed_end - level).trim(self.source);
        if content.is_empty() {
            return false;
        }

        let Some(level) = u8::try_from(level)
            .ok()
            .and_then(|level| HeadingLevel::try_from(level).ok())
        else {
            return false;
        };

        let content = tokenize_inline(self.source, content);
        self.push(Token::Heading { level, content }, eol);
        true
    }

    /// `[[target|content]]`
    fn link(&mut self) -> bool {
        let inner_start = self.pos + 2;
        let mut pos = inner_start;
        let mut depth = 0_usize;
        let mut braces = 0_usize;
        let mut pipe = None;
        let mut close = None;

        while let Some(byte) = self.byte(pos) {
            let next = self.byte(pos + 1);
            match (byte, next) {
                (b'\n', _) => return false,
                (b'[', Some(b'[')) => {
                    depth += 1;
                    pos += 2;
                    continue;
                }
                (b']', Some(b']')) => {
                    if depth == 0 {
                        close = Some(pos);
                        break;
                    }
                    depth -= 1;
                    pos += 2;
                    continue;
                }
                (b'{', Some(b'{')) => {
                    braces += 1;
                    pos += 2;
                    continue;
                }
                (b'}', Some(b'}')) if braces > 0 => {
                    braces -= 1;
                    pos += 2;
                    continue;
                }
                (b'|', _) if depth == 0 && braces == 0 && pipe.is_none() => {
                    pipe = Some(pos);
                }
                _ => {}
            }
            pos += 1;
        }

        let Some(close) = close else {
            return false;
        };

        let target = Span::new(inner_start, pipe.unwrap_or(close)).trim(self.source);
        if target.is_empty() {
            return self.consume_text(close + 2);
        }

        let content = pipe.map(|pipe| tokenize_inline(self.source, Span::new(pipe + 1, close)));
        self.push(Token::Link { target, content }, close + 2);
        true
    }

    /// `[scheme://target content]`
    fn external_link(&mut self) -> bool {
        let url_start = self.pos + 1;
        let rest = &self.bytes[url_start..self.end];
        let Some(scheme) = URL_SCHEMES.iter().find(|scheme| {
            rest.len() >= scheme.len() && rest[..scheme.len()].eq_ignore_ascii_case(scheme.as_bytes())
        }) else {
            return false;
        };

        let Some(close) = rest
            .iter()
            .position(|b| matches!(b, b']' | b'\n'))
            .filter(|index| rest[*index] == b']')
            .map(|index| url_start + index)
        else {
            return false;
        };

        let url_end = self.bytes[url_start..close]
            .iter()
            .position(|b| matches!(b, b' ' | b'\t'))
            .map_or(close, |index| url_start + index);

        if url_end - url_start <= scheme.len() {
            return false;
        }

        let content = Span::new(url_end, close).trim(self.source);
        let content = (!content.is_empty()).then(|| tokenize_inline(self.source, content));
        self.push(
            Token::ExternalLink {
                target: Span::new(url_start, url_end),
                content,
            },
            close + 1,
        );
        true
    }

    /// `{{…}}`, `{{{…}}}`, or `{|`
    fn brace(&mut self) -> bool {
        match self.byte_at(1) {
            Some(b'|') if self.at_line_start() => self.table_start(),
            Some(b'{') => match self.braces.scan(self.pos) {
                Some(expr) if expr.kind == BraceKind::Triple => {
                    // Parameters outside of a template body are literal text
                    self.consume_text(expr.span.end)
                }
                Some(expr) => self.template(&expr),
                None => false,
            },
            _ => false,
        }
    }

    /// Emits a template, parser function, or magic word token for a scanned
    /// `{{…}}` expression.
    fn template(&mut self, expr: &Expression) -> bool {
        let callee = expr.parts[0].span;
        let name_span = callee.trim(self.source);
        let name = &self.source[name_span.into_range()];
        if name.is_empty() {
            return self.consume_text(expr.span.end);
        }

        let word = name.split_once(':').map_or(name, |(word, _)| word).trim_end();
        let token = if let Some(rest) = name.strip_prefix('#') {
            let (function, first) = match rest.find(':') {
                Some(index) => {
                    let first = Span::new(name_span.start + 1 + index + 1, callee.end);
                    (&rest[..index], Some(first))
                }
                None => (rest, None),
            };
            Token::ParserFunction {
                name: function.trim().to_lowercase(),
                arguments: first
                    .into_iter()
                    .chain(expr.parts[1..].iter().map(|part| part.span))
                    .collect(),
            }
        } else if is_magic_word(word) {
            Token::MagicWord {
                name: Span::new(name_span.start, name_span.start + word.len()),
            }
        } else {
            let arguments = expr.parts[1..]
                .iter()
                .map(|part| {
                    let name = part.key(self.source).and(part.equals).map(|equals| {
                        Span::new(part.span.start, equals).trim(self.source)
                    });
                    Spanned {
                        node: Argument {
                            name,
                            value: part.value_span(self.source),
                        },
                        span: part.span,
                    }
                })
                .collect();
            Token::Template {
                name: name_span,
                arguments,
            }
        };

        self.push(token, expr.span.end);
        true
    }

    /// `{| attributes`
    fn table_start(&mut self) -> bool {
        let eol = self.line_end(self.pos);
        self.table_depth += 1;
        self.push(
            Token::TableStart {
                attributes: Span::new(self.pos + 2, eol),
            },
            eol,
        );
        true
    }

    /// `|}`, `|-`, `|+`, `|`, or `||` inside a table.
    fn pipe(&mut self) -> bool {
        if self.table_depth == 0 || self.inline {
            return false;
        }

        if self.at_line_start() {
            match self.byte_at(1) {
                Some(b'}') => {
                    self.table_depth -= 1;
                    self.push(Token::TableEnd, self.pos + 2);
                }
                Some(b'-') => {
                    let dashes = self.bytes[self.pos + 1..self.end]
                        .iter()
                        .take_while(|b| **b == b'-')
                        .count();
                    let eol = self.line_end(self.pos);
                    let attributes = Span::new(self.pos + 1 + dashes, eol);
                    self.push(Token::TableRow { attributes }, eol);
                }
                Some(b'+') => {
                    self.cell_line = true;
                    self.header_line = false;
                    self.push(Token::TableCaption, self.pos + 2);
                }
                _ => {
                    self.cell_line = true;
                    self.header_line = false;
                    self.push(Token::TableCell { header: false }, self.pos + 1);
                }
            }
            true
        } else if self.cell_line && self.byte_at(1) == Some(b'|') {
            let header = self.header_line;
            self.push(Token::TableCell { header }, self.pos + 2);
            true
        } else {
            false
        }
    }

    /// `!` or `!!` inside a table.
    fn bang(&mut self) -> bool {
        if self.table_depth == 0 || self.inline {
            return false;
        }

        if self.at_line_start() {
            self.cell_line = true;
            self.header_line = true;
            self.push(Token::TableCell { header: true }, self.pos + 1);
            true
        } else if self.header_line && self.byte_at(1) == Some(b'!') {
            self.push(Token::TableCell { header: true }, self.pos + 2);
            true
        } else {
            false
        }
    }

    /// `<!-- comment -->`, `<nowiki>…</nowiki>`, or an HTML tag.
    fn angle(&mut self) -> bool {
        if self.starts_with("<!--") {
            let end = memchr::memmem::find(&self.bytes[self.pos + 4..self.end], b"-->")
                .map_or(self.end, |index| self.pos + 4 + index + 3);
            self.push(Token::Comment, end);
            return true;
        }

        let Some((tag, tag_end)) = self.html_tag() else {
            return false;
        };

        if tag.name == "nowiki" && !tag.closing {
            if tag.self_closing {
                self.push(
                    Token::NoWiki {
                        content: Span::new(tag_end, tag_end),
                    },
                    tag_end,
                );
                return true;
            }

            const END_TAG: &[u8] = b"</nowiki>";
            let Some(index) = self.bytes[tag_end..self.end]
                .windows(END_TAG.len())
                .position(|window| window.eq_ignore_ascii_case(END_TAG))
            else {
                return false;
            };

            let content = Span::new(tag_end, tag_end + index);
            self.push(Token::NoWiki { content }, content.end + END_TAG.len());
            return true;
        }

        self.push(Token::HtmlTag(tag), tag_end);
        true
    }

    /// Scans an HTML tag at the current position. Returns the tag and the
    /// position after its closing `>`.
    fn html_tag(&self) -> Option<(HtmlTag, usize)> {
        let mut pos = self.pos + 1;
        let closing = self.byte(pos) == Some(b'/');
        if closing {
            pos += 1;
        }

        let name_start = pos;
        if !self.byte(pos)?.is_ascii_alphabetic() {
            return None;
        }
        while self.byte(pos).is_some_and(|b| b.is_ascii_alphanumeric()) {
            pos += 1;
        }
        let name = self.source[name_start..pos].to_ascii_lowercase();

        let skip_whitespace = |mut pos: usize| {
            while self.byte(pos).is_some_and(|b| b.is_ascii_whitespace()) {
                pos += 1;
            }
            pos
        };

        let mut attributes = IndexMap::new();
        loop {
            pos = skip_whitespace(pos);
            match self.byte(pos)? {
                b'>' => {
                    let tag = HtmlTag {
                        name,
                        closing,
                        self_closing: false,
                        attributes,
                    };
                    return Some((tag, pos + 1));
                }
                b'/' if self.byte(pos + 1) == Some(b'>') => {
                    let tag = HtmlTag {
                        name,
                        closing,
                        self_closing: true,
                        attributes,
                    };
                    return Some((tag, pos + 2));
                }
                b'<' => return None,
                _ => {}
            }

            let key_start = pos;
            while self.byte(pos).is_some_and(|b| {
                !b.is_ascii_whitespace() && !matches!(b, b'=' | b'>' | b'/' | b'<')
            }) {
                pos += 1;
            }
            if pos == key_start {
                // A stray `/` or `=`
                pos += 1;
                continue;
            }
            let key = self.source[key_start..pos].to_ascii_lowercase();

            pos = skip_whitespace(pos);
            let mut value = String::new();
            if self.byte(pos) == Some(b'=') {
                pos = skip_whitespace(pos + 1);
                match self.byte(pos)? {
                    quote @ (b'"' | b'\'') => {
                        let value_start = pos + 1;
                        let len = self.bytes[value_start..self.end]
                            .iter()
                            .position(|b| *b == quote)?;
                        value = self.source[value_start..value_start + len].to_string();
                        pos = value_start + len + 1;
                    }
                    _ => {
                        let value_start = pos;
                        while self
                            .byte(pos)
                            .is_some_and(|b| !b.is_ascii_whitespace() && b != b'>')
                        {
                            pos += 1;
                        }
                        value = self.source[value_start..pos].to_string();
                    }
                }
            }
            attributes.insert(key, value);
        }
    }

    /// `* item`, `# item`, `: item`, `; term : definition`
    fn list_item(&mut self) -> bool {
        let marker = self.bytes[self.pos];
        let Some(kind) = ListKind::from_marker(marker) else {
            return false;
        };
        let level = self.count(marker);
        let mut content_start = self.pos + level;
        if self.byte(content_start) == Some(b' ') {
            content_start += 1;
        }
        let eol = self.line_end(content_start);
        self.push(
            Token::ListItem {
                kind,
                level,
                content: Span::new(content_start, eol),
            },
            eol,
        );
        true
    }

    /// `----`
    fn horizontal_rule(&mut self) -> bool {
        let len = self.count(b'-');
        self.push(Token::HorizontalRule, self.pos + len);
        true
    }

    /// `__NAME__`
    fn behavior_switch(&mut self) -> bool {
        let name_start = self.pos + 2;
        let mut pos = name_start;
        while self.byte(pos).is_some_and(|b| b.is_ascii_uppercase()) {
            pos += 1;
        }

        if pos == name_start
            || !self.bytes[pos..self.end].starts_with(b"__")
            || !BEHAVIOR_SWITCHES.contains(&self.source[name_start..pos])
        {
            return false;
        }

        self.push(
            Token::BehaviorSwitch {
                name: Span::new(name_start, pos),
            },
            pos + 2,
        );
        true
    }
}
