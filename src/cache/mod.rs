//! Versioned response cache for offline support.
//!
//! This module provides the storage side of the offline cache controller:
//! - Named cache generations holding request/response entries
//! - Lookup by request key, overwrite-on-put semantics
//! - Whole-generation deletion for the activation purge
//! - An in-memory backend and a SQLite backend that survives the host process

mod storage;

pub use storage::{CacheStore, EntryInfo, MemoryStore, SqliteStore};
