//! In-memory stores for tests and dry runs.
//!
//! Uses `BTreeMap`s behind `std::sync::RwLock`. Each store can be told to
//! fail: [`InMemorySource::set_unreachable`], [`InMemoryMirror::fail_upserts`],
//! [`InMemoryIndex::fail_upsert_for`] and friends, so that failure handling
//! can be exercised without a database.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::{StoreKind, SyncError};
use crate::extract::SourceSnapshot;
use crate::models::{IndexDocument, MirrorRecord};

use super::{MirrorScan, MirrorStore, SearchIndex, SourceStore};

/// Source store returning a fixed snapshot.
#[derive(Default)]
pub struct InMemorySource {
    snapshot: RwLock<SourceSnapshot>,
    unreachable: AtomicBool,
}

impl InMemorySource {
    pub fn new(snapshot: SourceSnapshot) -> Self {
        Self {
            snapshot: RwLock::new(snapshot),
            unreachable: AtomicBool::new(false),
        }
    }

    pub fn replace(&self, snapshot: SourceSnapshot) {
        *self.snapshot.write().unwrap() = snapshot;
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }
}

#[async_trait]
impl SourceStore for InMemorySource {
    async fn fetch_snapshot(&self) -> Result<SourceSnapshot, SyncError> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(SyncError::connectivity(StoreKind::Source, "source offline"));
        }
        Ok(self.snapshot.read().unwrap().clone())
    }
}

/// Mirror store keyed by source id.
#[derive(Default)]
pub struct InMemoryMirror {
    rows: RwLock<BTreeMap<i64, MirrorRecord>>,
    unreadable: RwLock<BTreeSet<i64>>,
    fail_upserts: AtomicBool,
    unreachable: AtomicBool,
}

impl InMemoryMirror {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following `upsert_batch` fail with an integrity error.
    pub fn fail_upserts(&self, fail: bool) {
        self.fail_upserts.store(fail, Ordering::SeqCst);
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Writes a row directly, bypassing the pipeline.
    pub fn put(&self, record: MirrorRecord) {
        self.rows.write().unwrap().insert(record.id, record);
    }

    /// Makes the row for `id` undecodable when the whole mirror is read.
    pub fn mark_unreadable(&self, id: i64) {
        self.unreadable.write().unwrap().insert(id);
    }

    pub fn get(&self, id: i64) -> Option<MirrorRecord> {
        self.rows.read().unwrap().get(&id).cloned()
    }

    pub fn snapshot(&self) -> Vec<MirrorRecord> {
        self.rows.read().unwrap().values().cloned().collect()
    }

    fn check_reachable(&self) -> Result<(), SyncError> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(SyncError::connectivity(StoreKind::Mirror, "mirror offline"));
        }
        Ok(())
    }
}

#[async_trait]
impl MirrorStore for InMemoryMirror {
    async fn existing_ids(&self, ids: &[i64]) -> Result<BTreeSet<i64>, SyncError> {
        self.check_reachable()?;
        let rows = self.rows.read().unwrap();
        Ok(ids.iter().copied().filter(|id| rows.contains_key(id)).collect())
    }

    async fn upsert_batch(&self, records: &[MirrorRecord]) -> Result<u64, SyncError> {
        self.check_reachable()?;
        if self.fail_upserts.load(Ordering::SeqCst) {
            return Err(SyncError::integrity(
                StoreKind::Mirror,
                "duplicate key value violates unique constraint",
            ));
        }
        let mut rows = self.rows.write().unwrap();
        for rec in records {
            rows.insert(rec.id, rec.clone());
        }
        Ok(records.len() as u64)
    }

    async fn fetch_all(&self) -> Result<MirrorScan, SyncError> {
        self.check_reachable()?;
        let unreadable = self.unreadable.read().unwrap();
        let (bad, good): (Vec<_>, Vec<_>) = self
            .snapshot()
            .into_iter()
            .partition(|rec| unreadable.contains(&rec.id));
        Ok(MirrorScan {
            records: good,
            unreadable: bad.into_iter().map(|rec| rec.id).collect(),
        })
    }

    async fn fetch_one(&self, id: i64) -> Result<Option<MirrorRecord>, SyncError> {
        self.check_reachable()?;
        Ok(self.get(id))
    }

    async fn count(&self) -> Result<i64, SyncError> {
        self.check_reachable()?;
        Ok(self.rows.read().unwrap().len() as i64)
    }
}

/// Search index with auto-assigned keys.
///
/// Like the production index, nothing stops two entities from carrying the
/// same source id.
pub struct InMemoryIndex {
    docs: RwLock<BTreeMap<i64, IndexDocument>>,
    next_pk: AtomicI64,
    failing_inserts: RwLock<HashSet<i64>>,
    failing_lookups: RwLock<HashSet<i64>>,
    failing_upserts: RwLock<HashSet<i64>>,
    unreachable: AtomicBool,
}

impl Default for InMemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self {
            docs: RwLock::new(BTreeMap::new()),
            next_pk: AtomicI64::new(1000),
            failing_inserts: RwLock::new(HashSet::new()),
            failing_lookups: RwLock::new(HashSet::new()),
            failing_upserts: RwLock::new(HashSet::new()),
            unreachable: AtomicBool::new(false),
        }
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    pub fn fail_insert_for(&self, source_id: i64) {
        self.failing_inserts.write().unwrap().insert(source_id);
    }

    pub fn fail_lookup_for(&self, source_id: i64) {
        self.failing_lookups.write().unwrap().insert(source_id);
    }

    pub fn fail_upsert_for(&self, source_id: i64) {
        self.failing_upserts.write().unwrap().insert(source_id);
    }

    /// All entities carrying `source_id`, lowest key first.
    pub fn documents_for(&self, source_id: i64) -> Vec<IndexDocument> {
        self.docs
            .read()
            .unwrap()
            .values()
            .filter(|d| d.metadata.source_id == source_id)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.docs.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rewrites a stored entity in place, e.g. to make it stale.
    pub fn edit(&self, source_id: i64, f: impl FnOnce(&mut IndexDocument)) -> bool {
        let mut docs = self.docs.write().unwrap();
        match docs.values_mut().find(|d| d.metadata.source_id == source_id) {
            Some(doc) => {
                f(doc);
                true
            }
            None => false,
        }
    }

    fn check_reachable(&self) -> Result<(), SyncError> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(SyncError::connectivity(StoreKind::Index, "index offline"));
        }
        Ok(())
    }
}

#[async_trait]
impl SearchIndex for InMemoryIndex {
    async fn lookup_by_source_id(&self, source_id: i64) -> Result<Option<IndexDocument>, SyncError> {
        self.check_reachable()?;
        if self.failing_lookups.read().unwrap().contains(&source_id) {
            return Err(SyncError::connectivity(StoreKind::Index, "operation timed out"));
        }
        Ok(self.documents_for(source_id).into_iter().next())
    }

    async fn insert(&self, docs: &[IndexDocument]) -> Result<Vec<i64>, SyncError> {
        self.check_reachable()?;
        let failing = self.failing_inserts.read().unwrap();
        if let Some(doc) = docs.iter().find(|d| failing.contains(&d.metadata.source_id)) {
            return Err(SyncError::store(
                StoreKind::Index,
                format!("insert rejected for source id {}", doc.metadata.source_id),
            ));
        }
        let mut stored = self.docs.write().unwrap();
        let mut keys = Vec::with_capacity(docs.len());
        for doc in docs {
            let pk = self.next_pk.fetch_add(1, Ordering::SeqCst);
            let mut doc = doc.clone();
            doc.pk = Some(pk);
            stored.insert(pk, doc);
            keys.push(pk);
        }
        Ok(keys)
    }

    async fn upsert(&self, doc: &IndexDocument) -> Result<(), SyncError> {
        self.check_reachable()?;
        if self
            .failing_upserts
            .read()
            .unwrap()
            .contains(&doc.metadata.source_id)
        {
            return Err(SyncError::connectivity(
                StoreKind::Index,
                format!("HTTP 503 upserting source id {}", doc.metadata.source_id),
            ));
        }
        let pk = doc
            .pk
            .ok_or_else(|| SyncError::store(StoreKind::Index, "upsert requires a key"))?;
        self.docs.write().unwrap().insert(pk, doc.clone());
        Ok(())
    }

    async fn count(&self) -> Result<i64, SyncError> {
        self.check_reachable()?;
        Ok(self.len() as i64)
    }
}
