//! The rendering entry point.

use super::{
    MagicWord, ParserContext, Registry, State, TemplateDefinition, document,
    globals::Outline, parser_fns, substitute, template_dependency,
};
use crate::{
    cache::{CacheStats, EntryOptions, RenderCache},
    common::error_marker,
    config::{CONFIG_VERSION, Configuration},
    db::{self, PageRecord, PageSource, TemplateRecord, TemplateSource},
    wikitext::{TemplateCall, parse_template_calls},
};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::{
    borrow::Cow,
    collections::{BTreeMap, BTreeSet, HashMap},
    sync::Arc,
    time::Instant,
};
use time::OffsetDateTime;

/// A table of contents entry.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct TocEntry {
    /// The heading level, 1 to 6.
    pub level: u8,
    /// The plain text of the heading.
    pub text: String,
    /// The element ID of the heading.
    pub id: String,
}

/// The result of a render.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderOutput {
    /// The rendered HTML.
    pub html: String,
    /// The categories the text belongs to, in order of first appearance.
    pub categories: Vec<String>,
    /// The headings of the text, in document order.
    pub table_of_contents: Vec<TocEntry>,
}

/// Per-call render options.
#[derive(Clone, Debug, Default)]
pub struct RenderOptions {
    /// The slug of the page being rendered, used to look up page metadata.
    pub page: Option<String>,
    /// Parameters bound to `{{{param}}}` expressions in the text.
    pub template_params: IndexMap<String, String>,
    /// Extra magic words, which override the built-in ones.
    pub magic_words: HashMap<String, MagicWord>,
}

/// A template source which may be shared across threads.
pub type SharedTemplateSource = Arc<dyn TemplateSource + Send + Sync>;

/// A page source which may be shared across threads.
pub type SharedPageSource = Arc<dyn PageSource + Send + Sync>;

/// A Wikitext rendering engine.
pub struct Engine {
    /// The engine configuration.
    config: Configuration,
    /// The template registry.
    registry: Registry,
    /// The render cache.
    cache: RenderCache,
    /// The backing store for page templates.
    templates: Option<SharedTemplateSource>,
    /// The page metadata store.
    pages: Option<SharedPageSource>,
}

impl core::fmt::Debug for Engine {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("cache", &self.cache.stats())
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Creates a new engine with only the built-in templates.
    pub fn new(config: Configuration) -> Self {
        Self::with_sources(config, None, None)
    }

    /// Creates a new engine backed by the given template and page stores.
    pub fn with_sources(
        config: Configuration,
        templates: Option<SharedTemplateSource>,
        pages: Option<SharedPageSource>,
    ) -> Self {
        let registry = Registry::new(templates.clone());
        registry.init();
        Self {
            cache: RenderCache::new(config.cache_max_entries),
            config,
            registry,
            templates,
            pages,
        }
    }

    /// The engine configuration.
    #[inline]
    pub fn config(&self) -> &Configuration {
        &self.config
    }

    /// The template registry.
    #[inline]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// The render cache.
    #[inline]
    pub fn cache(&self) -> &RenderCache {
        &self.cache
    }

    /// Render cache statistics.
    #[inline]
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Renders Wikitext to HTML.
    ///
    /// This never fails. Problems in the text, like unknown templates, are
    /// shown as error markers in the output.
    pub fn render(&self, text: &str, options: &RenderOptions) -> RenderOutput {
        let started = Instant::now();

        // Dynamic magic words may change between calls, so their output
        // cannot be reused
        let is_cacheable = !options
            .magic_words
            .values()
            .any(|word| matches!(word, MagicWord::Dynamic(_)));
        let key = is_cacheable.then(|| self.cache_key(text, options));

        if let Some(key) = &key
            && let Some(content) = self.cache.get(key)
        {
            match serde_json::from_str(&content) {
                Ok(output) => return output,
                Err(err) => log::warn!("Discarding unreadable render cache entry {key}: {err}"),
            }
        }

        let mut dependencies = BTreeSet::new();
        let output = self.render_with(&self.config, text, options, &mut dependencies);

        if let Some(key) = key {
            match serde_json::to_string(&output) {
                Ok(content) => self.cache.set(
                    key,
                    content,
                    EntryOptions {
                        ttl: self.config.cache_ttl,
                        dependencies,
                        created_at: Some(started),
                    },
                ),
                Err(err) => log::warn!("Could not cache render output: {err}"),
            }
        }

        log::trace!("Rendered {} bytes in {:?}", text.len(), started.elapsed());
        output
    }

    /// Renders Wikitext to HTML for a quick preview. Templates are not
    /// expanded and categories are shown as written. Previews are not cached.
    pub fn render_preview(&self, text: &str) -> String {
        let config = self.config.preview();
        self.render_with(&config, text, &RenderOptions::default(), &mut BTreeSet::new())
            .html
    }

    /// Creates a template. An existing template with the same name is
    /// replaced.
    pub fn create_template(
        &self,
        name: &str,
        body: &str,
        description: Option<&str>,
    ) -> db::Result {
        self.update_template(name, body, description)
    }

    /// Replaces the body of a template, and invalidates every render which
    /// used it.
    ///
    /// If the template store is read-only, the new body is only kept in
    /// memory.
    pub fn update_template(
        &self,
        name: &str,
        body: &str,
        description: Option<&str>,
    ) -> db::Result {
        let record = TemplateRecord {
            content: body.to_string(),
            description: description.map(ToString::to_string),
        };

        if let Some(templates) = &self.templates {
            match templates.store_template_body(name, record.clone()) {
                Ok(()) => {}
                Err(db::Error::ReadOnly) => {
                    log::debug!("Template store is read-only; keeping '{name}' in memory");
                }
                Err(err) => return Err(err),
            }
        }

        self.registry.register(
            TemplateDefinition::new_static(name, record.content).with_description(record.description),
        );
        self.cache.invalidate(&template_dependency(name));
        Ok(())
    }

    /// Deletes a template, and invalidates every render which used it.
    /// Returns true if the template existed.
    pub fn delete_template(&self, name: &str) -> db::Result<bool> {
        let mut existed = false;
        if let Some(templates) = &self.templates {
            match templates.delete_template_body(name) {
                Ok(found) => existed = found,
                Err(db::Error::ReadOnly) => {
                    log::debug!("Template store is read-only; deleting '{name}' in memory");
                }
                Err(err) => return Err(err),
            }
        }

        existed |= self.registry.remove(name);
        self.cache.invalidate(&template_dependency(name));
        Ok(existed)
    }

    /// Notifies the engine that a template was changed in the template store
    /// by someone else.
    pub fn template_changed(&self, name: &str) -> usize {
        self.registry.forget(name);
        self.cache.invalidate(&template_dependency(name))
    }

    /// Notifies the engine that the metadata of a page changed.
    pub fn page_changed(&self, slug: &str) -> usize {
        self.cache.invalidate(&page_dependency(slug))
    }

    /// Extracts the template calls from raw Wikitext.
    #[inline]
    pub fn template_calls(&self, text: &str) -> Vec<TemplateCall> {
        parse_template_calls(text)
    }

    /// Evaluates a parser function by name with already-split arguments.
    /// Errors are returned as an error marker.
    pub fn evaluate_function(&self, name: &str, arguments: &[&str]) -> String {
        let context = ParserContext::new(None, OffsetDateTime::now_utc());
        let mut state = State::new(&self.config, &self.registry, context);
        parser_fns::evaluate(&mut state, name, arguments)
    }

    /// Renders text with the given configuration, recording every
    /// dependency of the output into `dependencies`.
    fn render_with(
        &self,
        config: &Configuration,
        text: &str,
        options: &RenderOptions,
        dependencies: &mut BTreeSet<String>,
    ) -> RenderOutput {
        let page = options.page.as_deref().and_then(|slug| {
            dependencies.insert(page_dependency(slug));
            self.fetch_page(slug)
        });

        let mut context = ParserContext::new(page.as_ref(), OffsetDateTime::now_utc());
        context.template_params.clone_from(&options.template_params);
        context.magic_words.extend(
            options
                .magic_words
                .iter()
                .map(|(name, word)| (name.clone(), word.clone())),
        );

        if config.expand_templates {
            dependencies.extend(
                parse_template_calls(text)
                    .iter()
                    .map(|call| template_dependency(&call.name)),
            );
        }

        let text = if options.template_params.is_empty() {
            Cow::Borrowed(text)
        } else {
            Cow::Owned(substitute(text, &options.template_params))
        };

        let mut state = State::new(config, &self.registry, context);
        let html = document::render_document(&mut state, &text).unwrap_or_else(|err| {
            log::error!("Render failed: {err}");
            error_marker(&err.to_string())
        });

        let (mut html, outline) = Outline::collect(&html);
        let show_toc = !outline.is_empty()
            && (state.switches.contains("FORCETOC")
                || (outline.len() >= config.toc_min_headings
                    && !state.switches.contains("NOTOC")));
        if show_toc && let Err(err) = outline.insert_into(&mut html) {
            log::warn!("Could not write the table of contents: {err}");
        }

        dependencies.append(&mut state.dependencies);
        RenderOutput {
            html,
            categories: state.categories.into_vec(),
            table_of_contents: outline.into_vec(),
        }
    }

    /// Builds the render cache key for a render.
    fn cache_key(&self, text: &str, options: &RenderOptions) -> String {
        let magic_words = options
            .magic_words
            .iter()
            .map(|(name, word)| (name.as_str(), word.value()))
            .collect::<BTreeMap<_, _>>();
        RenderCache::generate_key(
            text,
            options.page.as_deref(),
            &options.template_params,
            &(CONFIG_VERSION, &self.config, magic_words),
        )
    }

    /// Fetches page metadata. An unavailable page store is treated as if the
    /// page does not exist.
    fn fetch_page(&self, slug: &str) -> Option<PageRecord> {
        let pages = self.pages.as_ref()?;
        match pages.fetch_page_context(slug) {
            Ok(page) => page,
            Err(err) => {
                log::warn!("Could not load page metadata for '{slug}': {err}");
                None
            }
        }
    }
}

/// Returns the render cache dependency name for a page.
fn page_dependency(slug: &str) -> String {
    format!("page:{slug}")
}
