//! Brace expression matching and template call extraction.

use super::Span;
use indexmap::IndexMap;
use serde::Serialize;
use std::collections::HashSet;

/// A template invocation extracted from raw text.
///
/// ```wikitext
/// {{Name|a=b|c}}
/// ```
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct TemplateCall {
    /// The trimmed template name, as written.
    pub name: String,
    /// The template parameters, in source order. Positional parameters are
    /// keyed by their 1-based index.
    pub params: IndexMap<String, String>,
    /// The span of the whole call, including braces.
    #[serde(skip)]
    pub span: Span,
}

impl TemplateCall {
    /// Creates a template call from a scanned brace expression.
    pub(crate) fn from_expression(source: &str, expr: &Expression) -> Self {
        let name = source[expr.parts[0].span.into_range()].trim().to_string();
        Self {
            name,
            params: params(source, &expr.parts[1..]),
            span: expr.span,
        }
    }
}

/// Converts the argument parts of a template expression into an ordered
/// parameter map.
///
/// Positional numbering is contiguous and does not skip named parameters.
pub(crate) fn params(source: &str, parts: &[Part]) -> IndexMap<String, String> {
    let mut params = IndexMap::with_capacity(parts.len());
    let mut index = 0_usize;
    for part in parts {
        if let Some(key) = part.key(source) {
            let value = source[part.value_span(source).into_range()].to_string();
            params.insert(key.to_string(), value);
        } else {
            index += 1;
            params.insert(index.to_string(), source[part.span.into_range()].to_string());
        }
    }
    params
}

/// Extracts template invocations from `text`, in document order. Calls nested
/// inside another call (in its name or parameters) follow their parent.
///
/// Parser functions (`{{#name:…}}`), colon-prefixed names, and unclosed
/// expressions are not recorded.
pub fn parse_template_calls(text: &str) -> Vec<TemplateCall> {
    let bytes = text.as_bytes();
    let mut braces = BraceMatcher::new(text, text.len());
    let mut calls = Vec::new();
    let mut pos = 0;
    while let Some(offset) = memchr::memmem::find(&bytes[pos..], b"{{") {
        let start = pos + offset;
        match braces.scan(start) {
            Some(expr) if expr.kind == BraceKind::Double => {
                let name = text[expr.parts[0].span.into_range()].trim();
                if !name.is_empty() && !name.starts_with(['#', ':']) {
                    calls.push(TemplateCall::from_expression(text, &expr));
                }
                pos = start + BraceKind::Double.len();
            }
            Some(expr) => pos = start + expr.kind.len(),
            None => pos = start + 1,
        }
    }
    calls
}

/// The kind of a brace expression.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum BraceKind {
    /// A template-like expression, `{{…}}`.
    Double,
    /// A template parameter, `{{{…}}}`.
    Triple,
}

impl BraceKind {
    /// The number of braces used to open or close this kind of expression.
    pub const fn len(self) -> usize {
        match self {
            Self::Double => 2,
            Self::Triple => 3,
        }
    }
}

/// A pipe-delimited part of a brace expression.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct Part {
    /// The raw span of the part.
    pub span: Span,
    /// The position of the first top-level `=` in the part, if any.
    pub equals: Option<usize>,
}

impl Part {
    /// Returns the trimmed key of this part, if it is a `key=value` part with
    /// a non-empty key.
    pub fn key<'a>(&self, source: &'a str) -> Option<&'a str> {
        self.equals
            .map(|equals| source[self.span.start..equals].trim())
            .filter(|key| !key.is_empty())
    }

    /// Returns the span of the trimmed value part of a `key=value` part, or
    /// the whole span if this part has no key.
    pub fn value_span(&self, source: &str) -> Span {
        match (self.key(source), self.equals) {
            (Some(_), Some(equals)) => Span::new(equals + 1, self.span.end).trim(source),
            _ => self.span,
        }
    }
}

/// A balanced brace expression.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct Expression {
    /// The kind of the outermost expression.
    pub kind: BraceKind,
    /// The span of the whole expression, including braces.
    pub span: Span,
    /// The top-level parts of the expression. There is always at least one.
    pub parts: Vec<Part>,
}

/// Matches balanced brace expressions within one source text.
///
/// Runs of braces are split the way the preprocessor splits them: a run of
/// three opens a parameter; an even run opens nested template expressions;
/// any other odd run opens nested template expressions around an innermost
/// parameter. A closing run closes as many open expressions as it can.
///
/// `[[…]]` links are tracked so that a `|` inside a link in an argument does
/// not split the argument.
///
/// Every opening run left open when a scan gives up is recorded. Nothing
/// opened before such a run can close either, so any later scan which reaches
/// it fails immediately instead of reading to the end of input again.
pub(crate) struct BraceMatcher<'a> {
    /// The source text, truncated to the end of the matchable range.
    bytes: &'a [u8],
    /// Positions of opening runs known to never close before the end.
    unclosed: HashSet<usize>,
    /// The most recently measured opening run, used when a scan starts
    /// partway into it.
    open_run: Span,
}

impl<'a> BraceMatcher<'a> {
    /// Creates a matcher for expressions in `source` which must close before
    /// `end`.
    pub fn new(source: &'a str, end: usize) -> Self {
        Self {
            bytes: &source.as_bytes()[..end],
            unclosed: HashSet::new(),
            open_run: Span::default(),
        }
    }

    /// Finds the balanced brace expression opened by the `{` run starting at
    /// `start`. A scan from partway into a run only uses the rest of the run.
    ///
    /// Returns `None` if the expression is not closed before the end.
    pub fn scan(&mut self, start: usize) -> Option<Expression> {
        let bytes = self.bytes;
        let run = self.open_run_len(start);
        if run < 2 || self.unclosed.contains(&start) {
            return None;
        }

        let mut stack = Vec::<Open>::new();
        let mut depth = push_run(&mut stack, run, start);
        let mut link_depth = 0_usize;
        let mut parts = Vec::new();
        let mut part_start = start + stack[0].kind.len();
        let mut equals = None;
        let mut pos = start + run;

        while pos < bytes.len() {
            match bytes[pos] {
                b'{' => {
                    let run = count_run(bytes, pos, b'{');
                    if run < 2 {
                        pos += 1;
                        continue;
                    }
                    if self.unclosed.contains(&pos) {
                        break;
                    }
                    depth += push_run(&mut stack, run, pos);
                    pos += run;
                }
                b'}' => {
                    let run_start = pos;
                    let run_end = run_start + count_run(bytes, pos, b'}');
                    let mut run = run_end - run_start;
                    while let Some(top) = stack.last_mut() {
                        let len = top.kind.len();
                        if run < len {
                            break;
                        }
                        if depth == 1 {
                            pos += len;
                            parts.push(Part {
                                span: Span::new(part_start, pos - len),
                                equals,
                            });
                            return Some(Expression {
                                kind: top.kind,
                                span: Span::new(start, pos),
                                parts,
                            });
                        }

                        // The outermost expression is closed by the branch
                        // above so that its end is known
                        let mut closed = (run / len).min(top.count);
                        if closed == depth {
                            closed -= 1;
                        }
                        top.count -= closed;
                        depth -= closed;
                        run -= closed * len;
                        pos += closed * len;
                        if top.count == 0 {
                            stack.pop();
                        }
                    }
                    pos = run_end;
                }
                b'[' if bytes.get(pos + 1) == Some(&b'[') => {
                    link_depth += 1;
                    pos += 2;
                }
                b']' if link_depth > 0 && bytes.get(pos + 1) == Some(&b']') => {
                    link_depth -= 1;
                    pos += 2;
                }
                b'|' if depth == 1 && link_depth == 0 => {
                    parts.push(Part {
                        span: Span::new(part_start, pos),
                        equals: equals.take(),
                    });
                    pos += 1;
                    part_start = pos;
                }
                b'=' if depth == 1 && link_depth == 0 && equals.is_none() => {
                    equals = Some(pos);
                    pos += 1;
                }
                _ => pos += 1,
            }
        }

        self.unclosed.extend(stack.iter().map(|open| open.run));
        None
    }

    /// Returns the number of consecutive `{` starting at `pos`.
    fn open_run_len(&mut self, pos: usize) -> usize {
        if self.open_run.start > pos || pos >= self.open_run.end {
            let len = count_run(self.bytes, pos, b'{');
            self.open_run = Span::new(pos, pos + len);
        }
        self.open_run.end - pos
    }
}

/// A group of identical expressions opened by the same run of braces.
#[derive(Clone, Copy, Debug)]
struct Open {
    /// The kind of the opened expressions.
    kind: BraceKind,
    /// The number of expressions in the group which are still open.
    count: usize,
    /// The position of the opening run.
    run: usize,
}

/// Pushes the expressions opened by a run of `run` braces at `pos` onto the
/// stack, outermost first. Returns the number of opened expressions.
fn push_run(stack: &mut Vec<Open>, run: usize, pos: usize) -> usize {
    let doubles = if run % 2 == 0 { run / 2 } else { (run - 3) / 2 };
    if doubles != 0 {
        stack.push(Open {
            kind: BraceKind::Double,
            count: doubles,
            run: pos,
        });
    }
    if run % 2 == 1 {
        stack.push(Open {
            kind: BraceKind::Triple,
            count: 1,
            run: pos,
        });
    }
    doubles + run % 2
}

/// Counts the number of consecutive `byte` starting at `pos`.
fn count_run(bytes: &[u8], pos: usize, byte: u8) -> usize {
    bytes[pos..].iter().take_while(|b| **b == byte).count()
}
