//! # article-sync-core
//!
//! Store-independent sync engine: keeps a relational mirror and a search
//! index in step with a relational store of record.
//!
//! This crate holds the data model, the render transform, the extraction,
//! mirroring, indexing and reconciliation steps, and the store traits they
//! run against. It does no I/O of its own; the `article-sync` crate plugs in
//! the MariaDB, PostgreSQL and Milvus adapters.
//!
//! # Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`models`] | Record shapes: source, mirror, index |
//! | [`error`] | [`SyncError`] taxonomy |
//! | [`store`] | `SourceStore`, `MirrorStore`, `SearchIndex` traits and in-memory stores |
//! | [`permalink`] | Category hierarchy and permalink composition |
//! | [`extract`] | Raw source rows to source records |
//! | [`mirror`] | Mirror upsert and new-set computation |
//! | [`render`] | Mirror row to index document |
//! | [`indexer`] | First-time indexing of the new set |
//! | [`canonical`] | Normalized form for comparisons |
//! | [`reconcile`] | Drift detection and patching |
//! | [`pipeline`] | The full sync cycle |

pub mod canonical;
pub mod error;
pub mod extract;
pub mod indexer;
pub mod mirror;
pub mod models;
pub mod permalink;
pub mod pipeline;
pub mod reconcile;
pub mod render;
pub mod store;

pub use error::{StoreKind, SyncError};
