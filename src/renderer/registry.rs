//! The template registry.
//!
//! Templates are either built in, registered once at start-up by
//! [`Registry::init`], or backed by pages in a [`TemplateSource`] and loaded
//! the first time they are used.

use super::{Error, Result, substitute::substitute};
use crate::{
    common::{error_marker, normalize_name, url_encode},
    db::TemplateSource,
    wikitext::TemplateCall,
};
use core::fmt;
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::{collections::HashMap, sync::Arc};

/// A programmatic template renderer. It receives the call parameters and the
/// calling page, and returns HTML.
pub type RendererFn = Arc<dyn Fn(&Scope<'_>) -> Result<String> + Send + Sync>;

/// The data available to a programmatic template renderer.
#[derive(Debug)]
pub struct Scope<'a> {
    /// The parameters of the call.
    pub params: &'a IndexMap<String, String>,
    /// The title of the page being rendered.
    pub page: &'a str,
    /// The path prefix for internal links.
    pub link_prefix: &'a str,
}

/// The body of a template.
#[derive(Clone)]
pub enum TemplateBody {
    /// Wikitext with `{{{param}}}` placeholders.
    Static(String),
    /// A function producing HTML.
    Renderer(RendererFn),
}

impl fmt::Debug for TemplateBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(body) => f.debug_tuple("Static").field(body).finish(),
            Self::Renderer(_) => f.write_str("Renderer(..)"),
        }
    }
}

/// Where a template definition came from.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TemplateOrigin {
    /// Registered by the engine itself.
    BuiltIn,
    /// Loaded from or written to the template store.
    Page,
}

/// A template definition.
#[derive(Clone, Debug)]
pub struct TemplateDefinition {
    /// The name of the template, as given when it was defined.
    pub name: String,
    /// The template body.
    pub body: TemplateBody,
    /// A human-readable description of the template.
    pub description: Option<String>,
    /// Where the definition came from.
    pub origin: TemplateOrigin,
}

impl TemplateDefinition {
    /// Creates a new page-backed Wikitext template.
    pub fn new_static(name: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            body: TemplateBody::Static(body.into()),
            description: None,
            origin: TemplateOrigin::Page,
        }
    }

    /// Creates a new built-in programmatic template.
    pub fn new_renderer<F>(name: impl Into<String>, renderer: F) -> Self
    where
        F: Fn(&Scope<'_>) -> Result<String> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            body: TemplateBody::Renderer(Arc::new(renderer)),
            description: None,
            origin: TemplateOrigin::BuiltIn,
        }
    }

    /// Sets the description of the template.
    #[must_use]
    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }

    /// Sets the origin of the template.
    #[must_use]
    pub fn with_origin(mut self, origin: TemplateOrigin) -> Self {
        self.origin = origin;
        self
    }
}

/// The result of rendering a template call.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Expansion {
    /// Wikitext which still needs to be rendered.
    Wikitext(String),
    /// Finished HTML.
    Html(String),
}

/// Registry state guarded by the registry lock.
#[derive(Debug, Default)]
struct Inner {
    /// Definitions, by normalized name. `None` marks a deleted template which
    /// must not be reloaded from the template store.
    definitions: HashMap<String, Option<Arc<TemplateDefinition>>>,
    /// Canonical names, by normalized alias.
    aliases: HashMap<String, String>,
}

/// A thread-safe, name-indexed store of template definitions.
pub struct Registry {
    /// The registry state.
    inner: RwLock<Inner>,
    /// The backing store for page templates.
    source: Option<Arc<dyn TemplateSource + Send + Sync>>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("inner", &self.inner)
            .field("source", &self.source.is_some())
            .finish()
    }
}

impl Registry {
    /// Creates a new empty registry, loading unknown templates on demand from
    /// `source`, if given.
    pub fn new(source: Option<Arc<dyn TemplateSource + Send + Sync>>) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            source,
        }
    }

    /// Registers the built-in templates.
    pub fn init(&self) {
        self.register(
            TemplateDefinition::new_static("!", "|").with_origin(TemplateOrigin::BuiltIn),
        );
        self.register(
            TemplateDefinition::new_static("=", "=").with_origin(TemplateOrigin::BuiltIn),
        );
        self.register(
            TemplateDefinition::new_renderer("Clear", |scope| {
                let side = match scope.params.get("1").map(|side| side.trim()) {
                    Some(side @ ("left" | "right")) => side,
                    _ => "both",
                };
                Ok(format!(r#"<div style="clear: {side};"></div>"#))
            })
            .with_description(Some("Clears floating content.".into())),
        );
        self.register(
            TemplateDefinition::new_renderer("Tl", |scope| {
                let Some(name) = scope.params.get("1").map(|name| name.trim()) else {
                    return Err(Error::Renderer("missing template name".into()));
                };
                let target = format!("Template:{}", name.replace(' ', "_"));
                Ok(format!(
                    r#"&#123;&#123;<a href="{}{}">{}</a>&#125;&#125;"#,
                    html_escape::encode_double_quoted_attribute(scope.link_prefix),
                    url_encode(&target),
                    html_escape::encode_text(name)
                ))
            })
            .with_description(Some("Links to a template, showing its call syntax.".into())),
        );
        self.register_alias("Template link", "Tl");
    }

    /// Registers a definition, replacing any existing definition or alias with
    /// the same name.
    pub fn register(&self, definition: TemplateDefinition) {
        let key = normalize_name(&definition.name);
        log::trace!("Registering template '{key}'");
        let mut inner = self.inner.write();
        inner.aliases.remove(&key);
        inner.definitions.insert(key, Some(Arc::new(definition)));
    }

    /// Makes `alias` resolve to the definition of `canonical`.
    pub fn register_alias(&self, alias: &str, canonical: &str) {
        self.inner
            .write()
            .aliases
            .insert(normalize_name(alias), normalize_name(canonical));
    }

    /// Returns the definition of the given template, following at most one
    /// alias. Page templates which have not been used yet are loaded from the
    /// template store.
    pub fn get(&self, name: &str) -> Option<Arc<TemplateDefinition>> {
        let key = self.resolve(name);
        if let Some(definition) = self.inner.read().definitions.get(&key) {
            return definition.clone();
        }

        let definition = self.load(&key)?;
        Some(
            self.inner
                .write()
                .definitions
                .entry(key)
                .or_insert(Some(definition))
                .clone()?,
        )
    }

    /// Returns true if the given template exists.
    pub fn has(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Returns the sorted normalized names of all loaded definitions.
    pub fn list(&self) -> Vec<String> {
        let mut names = self
            .inner
            .read()
            .definitions
            .iter()
            .filter(|(_, definition)| definition.is_some())
            .map(|(name, _)| name.clone())
            .collect::<Vec<_>>();
        names.sort_unstable();
        names
    }

    /// Deletes a template. It will not be reloaded from the template store.
    pub fn remove(&self, name: &str) -> bool {
        let key = normalize_name(name);
        let mut inner = self.inner.write();
        inner.aliases.remove(&key);
        inner
            .definitions
            .insert(key, None)
            .is_some_and(|old| old.is_some())
    }

    /// Discards any loaded definition for a page template so it is reloaded
    /// from the template store on next use.
    pub fn forget(&self, name: &str) {
        self.inner.write().definitions.remove(&normalize_name(name));
    }

    /// Renders a template call.
    ///
    /// A missing template gives an error marker, never an error.
    pub fn render(&self, call: &TemplateCall, page: &str, link_prefix: &str) -> Expansion {
        let Some(definition) = self.get(&call.name) else {
            log::warn!("Template not found: {}", call.name);
            let err = Error::TemplateNotFound(call.name.clone());
            return Expansion::Html(error_marker(&err.to_string()));
        };

        match &definition.body {
            TemplateBody::Static(body) => Expansion::Wikitext(substitute(body, &call.params)),
            TemplateBody::Renderer(renderer) => {
                let scope = Scope {
                    params: &call.params,
                    page,
                    link_prefix,
                };
                match renderer(&scope) {
                    Ok(html) => Expansion::Html(html),
                    Err(err) => {
                        log::warn!("Template '{}' failed: {err}", call.name);
                        Expansion::Html(error_marker(&err.to_string()))
                    }
                }
            }
        }
    }

    /// Resolves a name to its normalized canonical name.
    fn resolve(&self, name: &str) -> String {
        let key = normalize_name(name);
        self.inner.read().aliases.get(&key).cloned().unwrap_or(key)
    }

    /// Loads a page template from the template store.
    fn load(&self, key: &str) -> Option<Arc<TemplateDefinition>> {
        let source = self.source.as_ref()?;
        match source.fetch_template_body(key) {
            Ok(Some(record)) => {
                log::trace!("Loaded template '{key}' from the template store");
                Some(Arc::new(
                    TemplateDefinition::new_static(key, record.content)
                        .with_description(record.description),
                ))
            }
            Ok(None) => None,
            Err(err) => {
                log::warn!("Could not load template '{key}': {err}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryDatabase;

    fn call(name: &str, params: &[(&str, &str)]) -> TemplateCall {
        TemplateCall {
            name: name.into(),
            params: params
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
            span: crate::wikitext::Span::new(0, 0),
        }
    }

    #[test]
    fn normalized_lookup() {
        let registry = Registry::new(None);
        registry.register(TemplateDefinition::new_static("Info Box", "x"));
        assert!(registry.has("info_box"));
        assert!(registry.has("  INFO   box "));
        assert!(!registry.has("infobox"));
        assert_eq!(registry.list(), ["info_box"]);
    }

    #[test]
    fn aliases() {
        let registry = Registry::new(None);
        registry.register(TemplateDefinition::new_static("Real", "body"));
        registry.register_alias("Other", "Real");
        registry.register_alias("Chained", "Other");
        assert_eq!(registry.get("other").unwrap().name, "Real");
        // Only one alias hop is followed
        assert!(registry.get("chained").is_none());
    }

    #[test]
    fn render_static() {
        let registry = Registry::new(None);
        registry.register(TemplateDefinition::new_static("Greet", "Hi {{{1|you}}}"));
        assert_eq!(
            registry.render(&call("greet", &[("1", "Bob")]), "", "/wiki/"),
            Expansion::Wikitext("Hi Bob".into())
        );
        assert_eq!(
            registry.render(&call("greet", &[]), "", "/wiki/"),
            Expansion::Wikitext("Hi you".into())
        );
    }

    #[test]
    fn render_missing() {
        let registry = Registry::new(None);
        assert_eq!(
            registry.render(&call("Nope", &[]), "", "/wiki/"),
            Expansion::Html(r#"<strong class="error">Template not found: Nope</strong>"#.into())
        );
    }

    #[test]
    fn builtins() {
        let registry = Registry::new(None);
        registry.init();
        assert_eq!(
            registry.render(&call("!", &[]), "", "/wiki/"),
            Expansion::Wikitext("|".into())
        );
        assert_eq!(
            registry.render(&call("clear", &[("1", "left")]), "", "/wiki/"),
            Expansion::Html(r#"<div style="clear: left;"></div>"#.into())
        );
        assert_eq!(
            registry.render(&call("Template link", &[("1", "Info box")]), "", "/wiki/"),
            Expansion::Html(
                r#"&#123;&#123;<a href="/wiki/Template:Info_box">Info box</a>&#125;&#125;"#.into()
            )
        );
        let Expansion::Html(html) = registry.render(&call("tl", &[]), "", "/wiki/") else {
            panic!("expected html");
        };
        assert!(html.contains(r#"class="error""#));
    }

    #[test]
    fn loads_from_source() {
        let db = Arc::new(MemoryDatabase::new());
        db.insert_template("Stored", "from store", Some("desc".into()));
        let registry = Registry::new(Some(db.clone()));
        let definition = registry.get("stored").unwrap();
        assert_eq!(definition.origin, TemplateOrigin::Page);
        assert_eq!(definition.description.as_deref(), Some("desc"));
        assert_eq!(registry.list(), ["stored"]);

        // Loaded definitions stay until forgotten
        db.insert_template("Stored", "changed", None);
        assert!(matches!(
            &registry.get("stored").unwrap().body,
            TemplateBody::Static(body) if body == "from store"
        ));
        registry.forget("Stored");
        assert!(matches!(
            &registry.get("stored").unwrap().body,
            TemplateBody::Static(body) if body == "changed"
        ));

        // Removed definitions are never reloaded
        assert!(registry.remove("stored"));
        assert!(!registry.has("stored"));
        assert!(registry.list().is_empty());
    }
}
