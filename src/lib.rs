//! A Wikitext rendering engine.
//!
//! Raw Wikitext is tokenized, rendered to HTML with recursive template
//! transclusion, and stored in a render cache which knows which templates and
//! pages each render depends on.
//!
//! ```
//! use wiki_render::{Configuration, Engine, RenderOptions};
//!
//! let engine = Engine::new(Configuration::default());
//! engine.create_template("Greet", "Hello, {{{1}}}!", None).unwrap();
//! let output = engine.render("{{Greet|World}}", &RenderOptions::default());
//! assert_eq!(output.html, "<p>Hello, World!</p>");
//! ```

pub mod cache;
pub mod common;
pub mod config;
pub mod db;
pub mod expr;
pub mod renderer;
pub mod wikitext;

pub use cache::{CacheStats, RenderCache};
pub use config::{CONFIG_VERSION, Configuration};
pub use db::{MemoryDatabase, PageRecord, PageSource, TemplateRecord, TemplateSource};
pub use renderer::{Engine, MagicWord, RenderOptions, RenderOutput, TemplateDefinition, TocEntry};
