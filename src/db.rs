//! Interfaces to the page store which backs page-defined templates and page
//! metadata, plus an in-memory implementation of both.

use crate::common::normalize_name;
use parking_lot::RwLock;
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

/// The result type for page store operations.
pub type Result<T = (), E = Error> = core::result::Result<T, E>;

/// Errors that may occur when interacting with a page store.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An I/O error occurred reading from the store.
    #[error("{1}: I/O error: {0}")]
    Io(std::io::Error, PathBuf),

    /// The store does not accept writes.
    #[error("page store is read-only")]
    ReadOnly,

    /// The store could not be reached.
    #[error("page store unavailable: {0}")]
    Unavailable(String),
}

/// A stored template body.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TemplateRecord {
    /// The Wikitext source of the template.
    pub content: String,
    /// A human-readable description of the template.
    pub description: Option<String>,
}

/// Page metadata used for magic word substitution.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PageRecord {
    /// The canonical page title, without namespace.
    pub title: String,
    /// The page namespace. Empty for the main namespace.
    pub namespace: String,
}

/// A source of page-backed template definitions.
pub trait TemplateSource {
    /// Fetches the body of the template with the given name. Returns
    /// `Ok(None)` if no such template exists.
    fn fetch_template_body(&self, name: &str) -> Result<Option<TemplateRecord>>;

    /// Stores the body of the template with the given name.
    fn store_template_body(&self, _name: &str, _record: TemplateRecord) -> Result {
        Err(Error::ReadOnly)
    }

    /// Deletes the template with the given name. Returns true if the template
    /// existed.
    fn delete_template_body(&self, _name: &str) -> Result<bool> {
        Err(Error::ReadOnly)
    }
}

/// A source of page metadata.
pub trait PageSource {
    /// Fetches the metadata of the page with the given slug. Returns
    /// `Ok(None)` if no such page exists.
    fn fetch_page_context(&self, slug: &str) -> Result<Option<PageRecord>>;
}

/// An in-memory page store.
#[derive(Debug, Default)]
pub struct MemoryDatabase {
    /// Templates, by normalized name.
    templates: RwLock<HashMap<String, TemplateRecord>>,
    /// Page metadata, by slug.
    pages: RwLock<HashMap<String, PageRecord>>,
}

impl MemoryDatabase {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new store containing every `*.wiki` file in `dir` as
    /// a template. The template name is the file stem.
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let db = Self::new();
        let entries = std::fs::read_dir(dir).map_err(|err| Error::Io(err, dir.to_path_buf()))?;
        for entry in entries {
            let path = entry.map_err(|err| Error::Io(err, dir.to_path_buf()))?.path();
            if path.extension().is_none_or(|ext| ext != "wiki") {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|stem| stem.to_str()) else {
                log::warn!("Skipping template with non-UTF-8 name: {}", path.display());
                continue;
            };
            let content =
                std::fs::read_to_string(&path).map_err(|err| Error::Io(err, path.clone()))?;
            log::debug!("Loaded template '{name}' from {}", path.display());
            db.insert_template(name, content, None);
        }
        Ok(db)
    }

    /// Inserts or replaces a template.
    pub fn insert_template(
        &self,
        name: &str,
        content: impl Into<String>,
        description: Option<String>,
    ) {
        self.templates.write().insert(
            normalize_name(name),
            TemplateRecord {
                content: content.into(),
                description,
            },
        );
    }

    /// Inserts or replaces page metadata.
    pub fn insert_page(&self, slug: &str, title: impl Into<String>, namespace: impl Into<String>) {
        self.pages.write().insert(
            slug.to_string(),
            PageRecord {
                title: title.into(),
                namespace: namespace.into(),
            },
        );
    }

    /// The names of all stored templates, sorted.
    pub fn template_names(&self) -> Vec<String> {
        let mut names = self.templates.read().keys().cloned().collect::<Vec<_>>();
        names.sort_unstable();
        names
    }
}

impl TemplateSource for MemoryDatabase {
    fn fetch_template_body(&self, name: &str) -> Result<Option<TemplateRecord>> {
        Ok(self.templates.read().get(&normalize_name(name)).cloned())
    }

    fn store_template_body(&self, name: &str, record: TemplateRecord) -> Result {
        self.templates.write().insert(normalize_name(name), record);
        Ok(())
    }

    fn delete_template_body(&self, name: &str) -> Result<bool> {
        Ok(self.templates.write().remove(&normalize_name(name)).is_some())
    }
}

impl PageSource for MemoryDatabase {
    fn fetch_page_context(&self, slug: &str) -> Result<Option<PageRecord>> {
        Ok(self.pages.read().get(slug).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn templates_are_normalized() {
        let db = MemoryDatabase::new();
        db.insert_template("Info Box", "body", Some("desc".into()));
        let record = db.fetch_template_body("  info_box ").unwrap().unwrap();
        assert_eq!(record.content, "body");
        assert_eq!(record.description.as_deref(), Some("desc"));
        assert_eq!(db.template_names(), ["info_box"]);
        assert!(db.delete_template_body("INFO box").unwrap());
        assert_eq!(db.fetch_template_body("info box").unwrap(), None);
    }

    #[test]
    fn pages() {
        let db = MemoryDatabase::new();
        db.insert_page("main", "Main Page", "");
        assert_eq!(
            db.fetch_page_context("main").unwrap(),
            Some(PageRecord {
                title: "Main Page".into(),
                namespace: String::new(),
            })
        );
        assert_eq!(db.fetch_page_context("other").unwrap(), None);
    }

    #[test]
    fn from_dir() {
        let dir = std::env::temp_dir().join(format!("wiki-render-db-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("Greeting.wiki"), "Hello {{{1}}}").unwrap();
        std::fs::write(dir.join("notes.txt"), "ignored").unwrap();
        let db = MemoryDatabase::from_dir(&dir).unwrap();
        std::fs::remove_dir_all(&dir).unwrap();
        assert_eq!(db.template_names(), ["greeting"]);
    }
}
