//! Larder – an embedded, file-backed store of typed records with a tiny
//! textual query language.
//!
//! Larder keeps flat JSON documents under string keys and layers three things
//! on top of that mapping:
//! * A **record model**: every document carries a `type` field naming its
//!   registered kind, and the pair `"{type}_{id}"` addresses exactly one
//!   record (see [`record`]).
//! * A **query language**: strings of the form `"<type>::<clause>[;<clause>...]"`
//!   route to a kind and filter its documents with a small operator grammar
//!   (see [`query`]).
//! * **Foreign keys**: a record may declare fields whose raw value is a unique
//!   key, a list of unique keys, or a query; reads resolve those into live
//!   referents (see [`store`]).
//!
//! ## Modules
//! * [`query`] – condition grammar: casting, formatting, clause evaluation.
//! * [`record`] – records, identifiers, kinds and the kind registry.
//! * [`persist`] – SQLite persistence for the key→document mapping.
//! * [`archive`] – single-entry compressed archives for backup and restore.
//! * [`store`] – the storage facade tying everything together.
//! * [`settings`] – data-directory configuration.
//!
//! ## Quick Start
//! ```
//! use larder::record::{Id, Tag};
//! use larder::settings::Settings;
//! use larder::store::Store;
//!
//! let store = Store::in_memory(&Settings::default()).unwrap();
//! let tag = Tag::new(Id::Auto, serde_json::json!({ "title": "hello" }));
//! let key = store.set(None, &tag).unwrap();
//! assert_eq!(key, "tag_0");
//! let found = store.query_all("tag::title==.\"Hello\"").unwrap();
//! assert_eq!(found.len(), 1);
//! ```

pub mod archive;
pub mod persist;
pub mod query;
pub mod record;
pub mod settings;
pub mod store;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LarderError {
    #[error("Settings error: {0}")]
    Settings(String),
    #[error("Persistence error: {0}")]
    Persistence(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("`{kind}` is not a registered kind")]
    UnregisteredKind { kind: String },
    #[error("document has an empty or missing `type` field")]
    UntypedDocument,
    #[error("`{key}` does not exist in the store")]
    MissingKey { key: String },
    #[error("Parse error: {message}")]
    Parse { message: String },
    #[error("archive `{path}` does not exist")]
    MissingArchive { path: String },
    #[error("Archive error: {0}")]
    Archive(String),
    #[error("Argument error: {0}")]
    Argument(String),
}

pub type Result<T> = std::result::Result<T, LarderError>;

// Helper conversions
impl From<rusqlite::Error> for LarderError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Persistence(e.to_string())
    }
}
impl From<serde_json::Error> for LarderError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
impl From<std::io::Error> for LarderError {
    fn from(e: std::io::Error) -> Self {
        Self::Persistence(e.to_string())
    }
}
impl From<zip::result::ZipError> for LarderError {
    fn from(e: zip::result::ZipError) -> Self {
        Self::Archive(e.to_string())
    }
}
impl From<config::ConfigError> for LarderError {
    fn from(e: config::ConfigError) -> Self {
        Self::Settings(e.to_string())
    }
}
