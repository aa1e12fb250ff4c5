//! Template and magic word expansion.

use super::{
    Error, Expansion, Result, State,
    document::{render_fragment, render_inline},
    tags, template_dependency,
};
use crate::{
    common::{decode_html, error_marker, normalize_name},
    wikitext::{Argument, Span, Spanned, TemplateCall, tokenize_inline},
};
use indexmap::IndexMap;

/// Renders a template transclusion token.
pub(super) fn render_template(
    out: &mut String,
    state: &mut State<'_>,
    source: &str,
    span: Span,
    name: Span,
    arguments: &[Spanned<Argument>],
) -> Result {
    if !state.config.expand_templates {
        tags::escape_text(out, &source[span.into_range()]);
        return Ok(());
    }

    let name = if source[name.into_range()].contains("{{") {
        let mut expanded = String::new();
        render_inline(&mut expanded, state, source, &tokenize_inline(source, name))?;
        decode_html(&tags::strip_tags(&expanded)).trim().to_string()
    } else {
        decode_html(&source[name.into_range()]).trim().to_string()
    };

    let mut params = IndexMap::with_capacity(arguments.len());
    let mut index = 0_usize;
    for argument in arguments {
        let value = source[argument.value.into_range()].to_string();
        if let Some(key) = argument.name {
            params.insert(source[key.into_range()].to_string(), value);
        } else {
            index += 1;
            params.insert(index.to_string(), value);
        }
    }

    expand(out, state, &TemplateCall { name, params, span })
}

/// Expands a template call and writes the resulting HTML.
pub(super) fn expand(out: &mut String, state: &mut State<'_>, call: &TemplateCall) -> Result {
    state.dependencies.insert(template_dependency(&call.name));

    if state.context.recursion_depth >= state.config.max_depth {
        log::warn!(
            "Template recursion depth exceeded at '{}' (depth {})",
            call.name,
            state.context.recursion_depth
        );
        let err = Error::DepthExceeded(call.name.clone());
        out.push_str(&error_marker(&err.to_string()));
        return Ok(());
    }

    let memo_key = format!(
        "{}\0{}",
        normalize_name(&call.name),
        serde_json::to_string(&call.params)?
    );
    if let Some(html) = state.context.template_cache.get(&memo_key) {
        log::trace!("Reusing expansion of '{}'", call.name);
        out.push_str(html);
        return Ok(());
    }

    let html = {
        let mut state = scopeguard::guard(&mut *state, |state| {
            state.context.recursion_depth -= 1;
        });
        state.context.recursion_depth += 1;

        let page = state.context.page_title.clone();
        match state.registry.render(call, &page, &state.config.link_prefix) {
            Expansion::Wikitext(text) => render_fragment(&mut **state, &text)?,
            Expansion::Html(html) => html,
        }
    };

    out.push_str(&html);
    state.context.template_cache.insert(memo_key, html);
    Ok(())
}

/// Renders a magic word token.
///
/// Magic words with no value in the render context fall back to a template
/// with the same name.
pub(super) fn render_magic_word(
    out: &mut String,
    state: &mut State<'_>,
    source: &str,
    span: Span,
    name: &str,
) -> Result {
    if !state.config.expand_templates {
        tags::escape_text(out, &source[span.into_range()]);
        return Ok(());
    }

    if let Some(value) = state.context.magic_word(name) {
        tags::escape_text(out, &value);
        return Ok(());
    }

    // A template created later under this name must invalidate the render.
    state.dependencies.insert(template_dependency(name));
    if state.registry.has(name) {
        let call = TemplateCall {
            name: name.to_string(),
            params: IndexMap::new(),
            span,
        };
        expand(out, state, &call)?;
    } else {
        log::warn!("Unknown magic word: {name}");
        let err = Error::UnknownMagicWord(name.to_string());
        out.push_str(&error_marker(&err.to_string()));
    }
    Ok(())
}
