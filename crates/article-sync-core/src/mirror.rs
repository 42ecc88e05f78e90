//! Mirror upsert step.
//!
//! One existence query over every incoming id, then one bulk upsert of the
//! whole batch. The ids that were absent before the upsert form the *new
//! set*; only those are handed to the indexer.

use std::collections::BTreeSet;

use crate::error::SyncError;
use crate::models::MirrorRecord;
use crate::store::MirrorStore;

/// Result of [`upsert_mirror`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MirrorOutcome {
    /// Ids with no mirror row before this call.
    pub new_ids: BTreeSet<i64>,
    /// Rows written, new and existing.
    pub written: u64,
}

/// Upserts `records` and reports which ids are new.
///
/// Any failure, existence check or upsert, is returned as-is; the caller
/// must not index anything for this cycle.
pub async fn upsert_mirror(
    mirror: &dyn MirrorStore,
    records: &[MirrorRecord],
) -> Result<MirrorOutcome, SyncError> {
    if records.is_empty() {
        return Ok(MirrorOutcome::default());
    }

    let ids: Vec<i64> = records.iter().map(|r| r.id).collect();
    let existing = mirror.existing_ids(&ids).await?;
    let new_ids: BTreeSet<i64> = ids.into_iter().filter(|id| !existing.contains(id)).collect();

    let written = mirror.upsert_batch(records).await?;
    tracing::info!(
        written,
        new = new_ids.len(),
        existing = existing.len(),
        "mirror upsert complete"
    );

    Ok(MirrorOutcome { new_ids, written })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Counters, Flags};
    use crate::store::memory::InMemoryMirror;

    fn rec(id: i64, title: &str) -> MirrorRecord {
        MirrorRecord {
            id,
            link: Some(format!("https://example.vn/tin-tuc/a/{id}")),
            category_name: None,
            title: Some(title.to_string()),
            header: None,
            body: None,
            author: None,
            flags: Flags::default(),
            counters: Counters::default(),
            created_at: None,
            updated_at: None,
            published_time: None,
            related: vec![],
        }
    }

    #[tokio::test]
    async fn test_new_set_is_exactly_the_absent_ids() {
        let mirror = InMemoryMirror::new();
        mirror.put(rec(2, "old"));
        mirror.put(rec(4, "old"));

        let batch = vec![rec(1, "a"), rec(2, "b"), rec(3, "c"), rec(4, "d")];
        let out = upsert_mirror(&mirror, &batch).await.unwrap();
        assert_eq!(out.new_ids, BTreeSet::from([1, 3]));
        assert_eq!(out.written, 4);
        assert_eq!(mirror.get(2).unwrap().title.as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let mirror = InMemoryMirror::new();
        let batch = vec![rec(1, "a"), rec(2, "b")];

        let first = upsert_mirror(&mirror, &batch).await.unwrap();
        let after_first = mirror.snapshot();
        let second = upsert_mirror(&mirror, &batch).await.unwrap();

        assert_eq!(first.new_ids.len(), 2);
        assert!(second.new_ids.is_empty());
        assert_eq!(mirror.snapshot(), after_first);
    }

    #[tokio::test]
    async fn test_failed_upsert_reports_no_new_set() {
        let mirror = InMemoryMirror::new();
        mirror.fail_upserts(true);
        let err = upsert_mirror(&mirror, &[rec(1, "a")]).await.unwrap_err();
        assert!(matches!(err, SyncError::Integrity { .. }));
        assert!(mirror.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_empty_batch_touches_nothing() {
        let mirror = InMemoryMirror::new();
        mirror.set_unreachable(true);
        let out = upsert_mirror(&mirror, &[]).await.unwrap();
        assert_eq!(out, MirrorOutcome::default());
    }
}
