//! Parser function implementations.
//!
//! <https://www.mediawiki.org/wiki/Help:Extension:ParserFunctions>

// Clippy: Functions signatures all conform to a specific API; inline modules
// are clearer with wildcard import.
#![allow(clippy::unnecessary_wraps, clippy::wildcard_imports)]

use super::{
    Error, Result, State,
    document::{render_fragment, render_inline_text},
    tags,
};
use crate::{
    common::{decode_html, error_marker},
    wikitext::Span,
};
use core::fmt::Write as _;
use regex::Regex;
use std::sync::LazyLock;

/// The function signature of a parser function.
type ParserFn = fn(&mut String, &mut State<'_>, &Args<'_>) -> Result;

/// The raw arguments of a parser function call. Arguments are only expanded
/// when a function asks for them, so untaken branches are never rendered.
pub(super) struct Args<'a> {
    /// The source text the argument spans refer to.
    source: &'a str,
    /// The raw argument spans. The text after the `:` is the first argument.
    arguments: &'a [Span],
}

impl<'a> Args<'a> {
    /// The number of arguments.
    #[inline]
    fn len(&self) -> usize {
        self.arguments.len()
    }

    /// Returns true if there are no arguments.
    #[inline]
    fn is_empty(&self) -> bool {
        self.arguments.is_empty()
    }

    /// Returns the unexpanded text of the argument at `index`.
    #[inline]
    fn raw(&self, index: usize) -> Option<&'a str> {
        self.arguments
            .get(index)
            .map(|span| &self.source[span.into_range()])
    }

    /// Expands the argument at `index` and returns the trimmed HTML.
    fn eval(&self, state: &mut State<'_>, index: usize) -> Result<Option<String>> {
        self.raw(index).map(|raw| eval_text(state, raw)).transpose()
    }

    /// Expands the argument at `index` as inline text and returns it decoded
    /// and trimmed, for use as a condition or a comparison key.
    fn eval_key(&self, state: &mut State<'_>, index: usize) -> Result<String> {
        self.raw(index)
            .map_or_else(|| Ok(String::new()), |raw| eval_key(state, raw))
    }
}

mod cond {
    //! Flow control parser functions.

    use super::*;
    use crate::expr;

    /// `{{#expr: expression}}`
    pub fn expr(out: &mut String, state: &mut State<'_>, arguments: &Args<'_>) -> Result {
        let expr = arguments.eval_key(state, 0)?;
        let result = expr::do_expression(&expr)?;
        log::trace!("#expr: '{expr}' = {result:?}");
        if let Some(result) = result {
            out.push_str(&expr::format_number(result));
        }
        Ok(())
    }

    /// `{{#if: condition | consequent | alternate }}`
    ///
    /// The condition is true unless it is empty or the literal `0`.
    pub fn r#if(out: &mut String, state: &mut State<'_>, arguments: &Args<'_>) -> Result {
        let condition = arguments.eval_key(state, 0)?;
        let is_true = !matches!(condition.as_str(), "" | "0");
        if let Some(value) = arguments.eval(state, 1 + usize::from(!is_true))? {
            out.push_str(&value);
        }
        Ok(())
    }

    /// `{{#ifeq: lhs | rhs | consequent (lhs == rhs) | alternate }}`
    pub fn if_eq(out: &mut String, state: &mut State<'_>, arguments: &Args<'_>) -> Result {
        let lhs = arguments.eval_key(state, 0)?;
        let rhs = arguments.eval_key(state, 1)?;
        let is_eq = lhs == rhs;
        log::trace!("#ifeq: '{lhs}' == '{rhs}'? {is_eq}");
        if let Some(value) = arguments.eval(state, 2 + usize::from(!is_eq))? {
            out.push_str(&value);
        }
        Ok(())
    }

    /// `{{#iferror: condition | consequent (error) | alternate (no error) }}`
    pub fn if_error(out: &mut String, state: &mut State<'_>, arguments: &Args<'_>) -> Result {
        static ERROR_CLASS: LazyLock<Regex> = LazyLock::new(|| {
            Regex::new(r#"<(?:strong|span|p|div)\s(?:[^\s>]*\s+)*?class="(?:[^"\s>]*\s+)*?error(?:\s[^">]*)?""#).unwrap()
        });

        let lhs = arguments.eval(state, 0);
        let is_error = match &lhs {
            Ok(Some(lhs)) => ERROR_CLASS.is_match(lhs),
            Ok(None) => false,
            Err(err) => {
                log::debug!("#iferror: caught {err}");
                true
            }
        };

        if is_error {
            if let Some(value) = arguments.eval(state, 1)? {
                out.push_str(&value);
            }
        } else if let Some(value) = arguments.eval(state, 2)? {
            out.push_str(&value);
        } else if let Ok(Some(value)) = lhs {
            out.push_str(&value);
        }
        Ok(())
    }

    /// `{{#ifexpr: expression | consequent (expression != 0) | alternate }}`
    pub fn if_expr(out: &mut String, state: &mut State<'_>, arguments: &Args<'_>) -> Result {
        let expr = arguments.eval_key(state, 0)?;
        let result = expr::do_expression(&expr)?;
        let index = 1 + usize::from(result.unwrap_or(0.0) == 0.0);
        if let Some(value) = arguments.eval(state, index)? {
            out.push_str(&value);
        }
        Ok(())
    }

    /// `{{#switch: match | case [| case ...] = value | default }}`
    pub fn switch(out: &mut String, state: &mut State<'_>, arguments: &Args<'_>) -> Result {
        let lhs = arguments.eval_key(state, 0)?;
        let mut found = false;
        let mut consequent = None;

        let len = arguments.len();
        for index in 1..len {
            let Some(raw) = arguments.raw(index) else {
                break;
            };

            // If the case is in the form `k=v` then it is a new case,
            // otherwise we must record whether the case matched and
            // continue processing until a `k=v` is encountered to know
            // the consequent
            let (case, value) = match split_case(raw) {
                Some((case, value)) => (case, Some(value)),
                None => (raw, None),
            };
            let case = eval_key(state, case)?;

            // Default value can either be a bare final parameter or it
            // can be `#default = value`
            if case == "#default" && value.is_some() {
                consequent = value;
            }

            if !found {
                found = lhs == case;
            }

            if found && value.is_some() {
                consequent = value;
                break;
            }

            // If the case is the last one, there was no `#default`, and it
            // is not a `k=v`, then it is the default value
            if index + 1 == len && consequent.is_none() && value.is_none() {
                consequent = Some(raw);
                break;
            }
        }

        if let Some(consequent) = consequent {
            out.push_str(&eval_text(state, consequent)?);
        }
        Ok(())
    }
}

mod time {
    //! Date and time parser functions.

    use super::*;
    use crate::common::format_date;

    /// `{{#time: format [| date] }}`
    pub fn time(out: &mut String, state: &mut State<'_>, arguments: &Args<'_>) -> Result {
        if !arguments.is_empty() {
            let format = arguments.eval_key(state, 0)?;
            let date = arguments
                .raw(1)
                .map(|raw| eval_key(state, raw))
                .transpose()?;
            let result = format_date(state.context.now, &format, date.as_deref())?;
            write!(out, "{}", html_escape::encode_text(&result))?;
        }
        Ok(())
    }
}

/// Known parser functions, by lowercase name without the leading `#`.
static PARSER_FUNCTIONS: phf::Map<&'static str, ParserFn> = phf::phf_map! {
    "expr" => cond::expr,
    "if" => cond::r#if,
    "ifeq" => cond::if_eq,
    "iferror" => cond::if_error,
    "ifexpr" => cond::if_expr,
    "switch" => cond::switch,
    "time" => time::time,
};

/// Renders a parser function token.
pub(super) fn render_parser_fn(
    out: &mut String,
    state: &mut State<'_>,
    source: &str,
    span: Span,
    name: &str,
    arguments: &[Span],
) -> Result {
    if !state.config.expand_templates {
        tags::escape_text(out, &source[span.into_range()]);
        return Ok(());
    }

    call_parser_fn(out, state, name, &Args { source, arguments });
    Ok(())
}

/// Evaluates a parser function with already-split arguments.
pub(crate) fn evaluate(state: &mut State<'_>, name: &str, arguments: &[&str]) -> String {
    let name = name.trim();
    let name = name.strip_prefix('#').unwrap_or(name).to_lowercase();

    let source = arguments.join("|");
    let mut spans = Vec::with_capacity(arguments.len());
    let mut start = 0;
    for argument in arguments {
        spans.push(Span::new(start, start + argument.len()));
        start += argument.len() + 1;
    }

    let mut out = String::new();
    call_parser_fn(
        &mut out,
        state,
        &name,
        &Args {
            source: &source,
            arguments: &spans,
        },
    );
    out
}

/// Calls a parser function. Failures are written as an error marker.
fn call_parser_fn(out: &mut String, state: &mut State<'_>, name: &str, arguments: &Args<'_>) {
    let Some(parser_fn) = PARSER_FUNCTIONS.get(name) else {
        log::warn!("Unknown parser function: #{name}");
        let err = Error::UnknownFunction(name.to_string());
        out.push_str(&error_marker(&err.to_string()));
        return;
    };

    let mut result = String::new();
    match parser_fn(&mut result, state, arguments) {
        Ok(()) => out.push_str(&result),
        Err(err) => {
            log::warn!("#{name}: {err}");
            out.push_str(&error_marker(&err.to_string()));
        }
    }
}

/// Expands a raw argument and returns the trimmed HTML.
fn eval_text(state: &mut State<'_>, text: &str) -> Result<String> {
    Ok(render_fragment(state, text)?.trim().to_string())
}

/// Expands a raw argument as inline text and returns it decoded and trimmed.
fn eval_key(state: &mut State<'_>, text: &str) -> Result<String> {
    Ok(decode_html(&render_inline_text(state, text)?).trim().to_string())
}

/// Splits a `case = value` argument at its first top-level `=`. An `=` inside
/// a nested template or link does not count.
fn split_case(text: &str) -> Option<(&str, &str)> {
    let bytes = text.as_bytes();
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
            (b'=', _) if depth == 0 => return Some((&text[..index], &text[index + 1..])),
            _ => {}
        }
        index += 1;
    }
    None
}
