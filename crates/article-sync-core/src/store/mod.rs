//! Storage abstraction for the three stores the engine keeps in step.
//!
//! | Trait | Store | Role |
//! |-------|-------|------|
//! | [`SourceStore`] | relational store of record | read-only snapshot per cycle |
//! | [`MirrorStore`] | relational mirror | one row per source id, upsert-on-conflict |
//! | [`SearchIndex`] | search index | lookup by source id, insert, upsert by key |
//!
//! The sync pipeline and the reconciliation pass only talk to these traits,
//! so the same code runs against the production adapters in the app crate
//! and the in-memory stores in [`memory`].
//!
//! Implementations must be `Send + Sync`; one instance of each is opened at
//! startup and shared by every job.

pub mod memory;

use std::collections::BTreeSet;

use async_trait::async_trait;

use crate::error::SyncError;
use crate::extract::SourceSnapshot;
use crate::models::{IndexDocument, MirrorRecord};

/// Read side of the store of record.
#[async_trait]
pub trait SourceStore: Send + Sync {
    /// Reads published articles, the category hierarchy and related-item
    /// edges in one go.
    ///
    /// Either the whole snapshot is returned or the cycle fails; partial
    /// snapshots never reach the mirror.
    async fn fetch_snapshot(&self) -> Result<SourceSnapshot, SyncError>;
}

/// Result of reading the whole mirror.
///
/// Rows that cannot be decoded do not fail the read; their ids are listed in
/// `unreadable` so callers can report them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MirrorScan {
    pub records: Vec<MirrorRecord>,
    pub unreadable: Vec<i64>,
}

/// The relational mirror.
#[async_trait]
pub trait MirrorStore: Send + Sync {
    /// Subset of `ids` that already has a row.
    async fn existing_ids(&self, ids: &[i64]) -> Result<BTreeSet<i64>, SyncError>;

    /// Inserts or fully overwrites every record, as one unit of work.
    ///
    /// Returns the number of rows written.
    async fn upsert_batch(&self, records: &[MirrorRecord]) -> Result<u64, SyncError>;

    /// Every row, ordered by id.
    async fn fetch_all(&self) -> Result<MirrorScan, SyncError>;

    async fn fetch_one(&self, id: i64) -> Result<Option<MirrorRecord>, SyncError>;

    async fn count(&self) -> Result<i64, SyncError>;

    /// Releases connections. Called once at shutdown.
    async fn close(&self) {}
}

/// The search index.
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// The entity holding `source_id`, if any.
    ///
    /// When more than one entity claims the same source id, implementations
    /// return the one with the lowest key.
    async fn lookup_by_source_id(&self, source_id: i64) -> Result<Option<IndexDocument>, SyncError>;

    /// Inserts new entities; the index assigns their keys.
    ///
    /// Returns the assigned keys in input order.
    async fn insert(&self, docs: &[IndexDocument]) -> Result<Vec<i64>, SyncError>;

    /// Replaces the entity whose key is `doc.pk`.
    async fn upsert(&self, doc: &IndexDocument) -> Result<(), SyncError>;

    async fn count(&self) -> Result<i64, SyncError>;

    /// Releases connections. Called once at shutdown.
    async fn close(&self) {}
}
