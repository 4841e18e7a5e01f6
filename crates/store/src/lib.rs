//! Append-only SQLite store for rule matches.
//!
//! The ingestion worker is the only writer; readers (the CLI, an external
//! UI) get matches newest-first through [`MatchStore::list_matches`].

pub mod error;
pub mod store;

pub use error::StoreError;
pub use store::{MatchQuery, MatchStore, StoredMatch};
