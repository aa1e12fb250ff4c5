//! Template parameter substitution.

use crate::wikitext::{BraceKind, BraceMatcher};
use indexmap::IndexMap;

/// Replaces `{{{key}}}` and `{{{key|default}}}` parameter expressions in
/// `body` with values from `params`.
///
/// A parameter bound to an empty string is treated as absent, so it falls
/// back to the default. A parameter with no usable value and no default is
/// replaced by an empty string. Parameter names and defaults may themselves
/// contain parameter expressions.
pub fn substitute(body: &str, params: &IndexMap<String, String>) -> String {
    let bytes = body.as_bytes();
    let mut braces = BraceMatcher::new(body, body.len());
    let mut out = String::with_capacity(body.len());
    let mut copied = 0;
    let mut pos = 0;

    while let Some(offset) = memchr::memmem::find(&bytes[pos..], b"{{{") {
        let start = pos + offset;
        match braces.scan(start) {
            Some(expr) if expr.kind == BraceKind::Triple => {
                out += &body[copied..start];

                let key = substitute(&body[expr.parts[0].span.into_range()], params);
                let key = key.trim();
                match params.get(key).filter(|value| !value.is_empty()) {
                    Some(value) => out += value,
                    None => {
                        if let Some(default) = expr.parts.get(1) {
                            out += &substitute(&body[default.span.into_range()], params);
                        }
                    }
                }

                pos = expr.span.end;
                copied = pos;
            }
            // A longer brace run may hide a parameter further right, so only
            // skip one brace
            _ => pos = start + 1,
        }
    }

    out += &body[copied..];
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> IndexMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn bound_values() {
        let p = params(&[("1", "one"), ("name", "World")]);
        assert_eq!(substitute("Hello {{{name}}}!", &p), "Hello World!");
        assert_eq!(substitute("{{{1}}}-{{{ 1 }}}", &p), "one-one");
        assert_eq!(substitute("{{{name|x}}}", &p), "World");
    }

    #[test]
    fn defaults() {
        let p = params(&[("empty", "")]);
        assert_eq!(substitute("{{{missing|fallback}}}", &p), "fallback");
        assert_eq!(substitute("{{{empty|fallback}}}", &p), "fallback");
        assert_eq!(substitute("[{{{missing}}}]", &p), "[]");
        assert_eq!(substitute("[{{{empty}}}]", &p), "[]");
        assert_eq!(substitute("{{{missing|}}}", &p), "");
        assert_eq!(substitute("{{{a|b|c}}}", &p), "b");
    }

    #[test]
    fn nested() {
        let p = params(&[("which", "x"), ("x", "found"), ("d", "deep")]);
        assert_eq!(substitute("{{{ {{{which}}} }}}", &p), "found");
        assert_eq!(substitute("{{{nope|{{{d}}}}}}", &p), "deep");
        assert_eq!(substitute("{{{nope|{{{nope2|last}}}}}}", &p), "last");
    }

    #[test]
    fn templates_are_kept() {
        let p = params(&[("1", "v")]);
        assert_eq!(substitute("{{T|{{{1}}}}}", &p), "{{T|v}}");
        assert_eq!(substitute("{{{{{1}}}}}", &p), "{{v}}");
        assert_eq!(substitute("{{#if:{{{1|}}}|y|n}}", &p), "{{#if:v|y|n}}");
    }

    #[test]
    fn malformed() {
        let p = params(&[("1", "v")]);
        assert_eq!(substitute("{{{1", &p), "{{{1");
        assert_eq!(substitute("a {{{1}} b", &p), "a {{{1}} b");
        assert_eq!(substitute("{{{1}}} {{{", &p), "v {{{");
    }

    #[test]
    fn large_unclosed_body() {
        let p = params(&[("1", "v")]);
        let body = format!("{}{{{{{{1}}}}}}", "{{{a|".repeat(50_000));
        let out = substitute(&body, &p);
        assert!(out.ends_with("{{{a|v"));
        assert_eq!(out.len(), body.len() - "{{{1}}}".len() + 1);
    }
}
