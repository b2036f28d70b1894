//! Storage backends for Hifz data.
//!
//! The [`Storage`] trait abstracts over where students, plans, exam records
//! and exam requests live. The default backend keeps JSON files on disk; an
//! optional SQLite backend is available behind the `sqlite` feature.

#![warn(missing_docs)]

mod trait_;

#[cfg(feature = "json")]
mod json_storage;

#[cfg(feature = "sqlite")]
mod sqlite_storage;

pub use trait_::{Result, Storage, StorageError};

#[cfg(feature = "json")]
pub use json_storage::JsonStorage;

#[cfg(feature = "sqlite")]
pub use sqlite_storage::SqliteStorage;
