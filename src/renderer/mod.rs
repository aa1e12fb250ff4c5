//! Article rendering types and functions.
//!
//! When processing a Wikitext document, the smallest atom is a Wikitext token,
//! but the smallest atom that a template can produce is a *character*. This
//! renderer therefore works as-if this sequence of steps is run in order:
//!
//! 1. Bind any parameters given by the caller to `{{{param}}}` expressions in
//!    the source text.
//!
//! 2. Tokenize the source text. Templates, parser functions, and magic words
//!    are single tokens which are not yet expanded.
//!
//! 3. Walk the token stream once, grouping runs of inline tokens into grafs
//!    and scanning ahead to group list items and table rows. Whenever
//!    a template token is reached:
//!
//!    1. Look up the template in the [`Registry`]. Page templates are loaded
//!       from the template store the first time they are used.
//!    2. If the template is a Wikitext template, substitute its parameters
//!       and render the result as a fragment, recursively. Otherwise, call
//!       its renderer function.
//!    3. Stop at the maximum transclusion depth. There is no cycle detection;
//!       a template which includes itself simply runs out of depth.
//!
//! 4. Assign ids to headings, collect the outline, and insert the table of
//!    contents.
//!
//! Nothing in this pipeline ever fails outward. Unknown templates, parser
//! function errors, and depth exhaustion are written into the output as
//! error markers.

use crate::{
    common::{DateError, normalize_name},
    config::Configuration,
};
pub use context::{MagicWord, ParserContext};
pub use engine::{
    Engine, RenderOptions, RenderOutput, SharedPageSource, SharedTemplateSource, TocEntry,
};
pub use registry::{
    Expansion, Registry, RendererFn, Scope, TemplateBody, TemplateDefinition, TemplateOrigin,
};
use std::collections::{BTreeSet, HashSet};
pub use substitute::substitute;

mod context;
mod document;
mod emitters;
mod engine;
mod globals;
mod parser_fns;
mod registry;
mod substitute;
mod tags;
mod template;
#[cfg(test)]
mod tests;

/// A rendering error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Template transclusion went too deep.
    #[error("Template recursion depth exceeded: {0}")]
    DepthExceeded(String),

    /// An arithmetic expression evaluation error.
    #[error("Expression error: {0}")]
    Expr(#[from] crate::expr::Error),

    /// A write to a buffer failed.
    #[error("fmt error: {0}")]
    Fmt(#[from] core::fmt::Error),

    /// Template parameters could not be serialized.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A template renderer function failed.
    #[error("Template error: {0}")]
    Renderer(Box<dyn std::error::Error + Send + Sync + 'static>),

    /// No template exists with the given name.
    #[error("Template not found: {0}")]
    TemplateNotFound(String),

    /// A date could not be parsed or formatted.
    #[error("Date error: {0}")]
    Time(#[from] DateError),

    /// A parser function with the given name does not exist.
    #[error("Unknown parser function: #{0}")]
    UnknownFunction(String),

    /// A magic word has no value and no template with the same name exists.
    #[error("Unknown magic word: {0}")]
    UnknownMagicWord(String),
}

/// The result type used by all renderer functions.
pub type Result<T = (), E = Error> = core::result::Result<T, E>;

/// Mutable state for a single render.
pub(crate) struct State<'e> {
    /// The configuration of this render.
    pub config: &'e Configuration,
    /// The template registry.
    pub registry: &'e Registry,
    /// The parser context.
    pub context: ParserContext,
    /// The categories collected from the document.
    pub categories: globals::Categories,
    /// The behavior switches seen in the document, without `__` markers.
    pub switches: HashSet<String>,
    /// The templates and pages the output depends on.
    pub dependencies: BTreeSet<String>,
}

impl<'e> State<'e> {
    /// Creates a new render state.
    pub fn new(config: &'e Configuration, registry: &'e Registry, context: ParserContext) -> Self {
        Self {
            config,
            registry,
            context,
            categories: globals::Categories::default(),
            switches: HashSet::new(),
            dependencies: BTreeSet::new(),
        }
    }
}

/// Returns the render cache dependency name for a template.
pub(crate) fn template_dependency(name: &str) -> String {
    format!("template:{}", normalize_name(name))
}
