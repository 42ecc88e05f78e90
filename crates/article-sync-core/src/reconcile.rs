//! Reconciliation: find index entries that drifted from the mirror and
//! patch them.
//!
//! # Algorithm
//!
//! For every mirror row, in id order:
//!
//! 1. Render the document the index should hold, with the same
//!    [`Renderer`] the indexer uses.
//! 2. Look up the index's copy by source id. No copy means the record is
//!    [`Check::Missing`]; it is the indexer's job, not ours.
//! 3. Compare the rendered text. Any difference is
//!    [`DriftReason::Content`] and ends the comparison.
//! 4. Normalize both metadata sides into [`CanonicalRecord`]s and compare
//!    field by field; the first differing field is recorded as
//!    [`DriftReason::Field`].
//!
//! Drifted records are then upserted by index key, one at a time. A failure
//! on one id is logged and the pass moves on, even when the request timed
//! out. After a connectivity failure the index is asked for its entity
//! count; only when that fails too is the index considered down and the
//! pass stopped. Mirror rows that cannot be decoded are reported as failed.

use std::fmt;

use crate::canonical::{CanonicalRecord, MetadataField};
use crate::error::SyncError;
use crate::models::{IndexDocument, MirrorRecord};
use crate::render::Renderer;
use crate::store::{MirrorStore, SearchIndex};

/// Why a record counts as drifted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriftReason {
    /// Rendered text differs.
    Content,
    /// Text matches; this metadata field is the first that differs.
    Field(MetadataField),
}

impl fmt::Display for DriftReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriftReason::Content => f.write_str("content"),
            DriftReason::Field(field) => write!(f, "{}", field),
        }
    }
}

/// A drifted record and the document that should replace the index copy.
#[derive(Debug, Clone, PartialEq)]
pub struct Drift {
    pub source_id: i64,
    pub reason: DriftReason,
    /// Freshly rendered document carrying the index copy's key.
    pub expected: IndexDocument,
}

/// Classification of one record.
#[derive(Debug, Clone, PartialEq)]
pub enum Check {
    Missing,
    InSync,
    Drifted(Drift),
}

/// Compares one mirror row with its index copy.
pub async fn check_record(
    index: &dyn SearchIndex,
    renderer: &Renderer,
    rec: &MirrorRecord,
) -> Result<Check, SyncError> {
    let mut expected = renderer.to_index_document(rec)?;
    let Some(actual) = index.lookup_by_source_id(rec.id).await? else {
        return Ok(Check::Missing);
    };
    expected.pk = actual.pk;

    if expected.text != actual.text {
        return Ok(Check::Drifted(Drift {
            source_id: rec.id,
            reason: DriftReason::Content,
            expected,
        }));
    }

    let want = CanonicalRecord::from_metadata(&expected.metadata)
        .map_err(|e| SyncError::per_record(rec.id, format!("mirror side: {e}")))?;
    let have = CanonicalRecord::from_metadata(&actual.metadata)
        .map_err(|e| SyncError::per_record(rec.id, format!("index side: {e}")))?;

    Ok(match want.first_mismatch(&have) {
        Some(field) => Check::Drifted(Drift {
            source_id: rec.id,
            reason: DriftReason::Field(field),
            expected,
        }),
        None => Check::InSync,
    })
}

/// Classification counts for one pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiffReport {
    pub examined: usize,
    pub in_sync: usize,
    pub missing: Vec<i64>,
    pub failed: Vec<i64>,
    pub drifts: Vec<Drift>,
}

/// Classifies every mirror row.
pub async fn diff(
    mirror: &dyn MirrorStore,
    index: &dyn SearchIndex,
    renderer: &Renderer,
) -> Result<DiffReport, SyncError> {
    let scan = mirror.fetch_all().await?;
    for id in &scan.unreadable {
        tracing::warn!(id, "mirror row could not be decoded; record skipped");
    }
    let mut report = diff_records(index, renderer, &scan.records).await?;
    report.examined += scan.unreadable.len();
    report.failed.extend(scan.unreadable);
    report.failed.sort_unstable();
    Ok(report)
}

/// Whether `err`, raised for a single id, means the whole index is down:
/// a connectivity error followed by a failing count request.
async fn index_is_down(index: &dyn SearchIndex, err: &SyncError) -> bool {
    if !err.is_connectivity() {
        return false;
    }
    match index.count().await {
        Ok(_) => false,
        Err(probe) => probe.is_connectivity(),
    }
}

/// Classifies the given rows.
pub async fn diff_records(
    index: &dyn SearchIndex,
    renderer: &Renderer,
    rows: &[MirrorRecord],
) -> Result<DiffReport, SyncError> {
    let mut report = DiffReport::default();

    for rec in rows {
        report.examined += 1;
        match check_record(index, renderer, rec).await {
            Ok(Check::InSync) => report.in_sync += 1,
            Ok(Check::Missing) => report.missing.push(rec.id),
            Ok(Check::Drifted(drift)) => {
                tracing::debug!(id = rec.id, reason = %drift.reason, "drift detected");
                report.drifts.push(drift);
            }
            Err(e) => {
                if index_is_down(index, &e).await {
                    return Err(e);
                }
                tracing::warn!(id = rec.id, error = %e, "comparison failed; record skipped");
                report.failed.push(rec.id);
            }
        }
    }

    tracing::info!(
        examined = report.examined,
        in_sync = report.in_sync,
        drifted = report.drifts.len(),
        missing = report.missing.len(),
        failed = report.failed.len(),
        "diff complete"
    );
    Ok(report)
}

/// Counts from one [`patch`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatchReport {
    pub patched: usize,
    pub failed: Vec<i64>,
}

/// Upserts the expected document of every drift.
pub async fn patch(index: &dyn SearchIndex, drifts: &[Drift]) -> Result<PatchReport, SyncError> {
    let mut report = PatchReport::default();

    for drift in drifts {
        match index.upsert(&drift.expected).await {
            Ok(()) => report.patched += 1,
            Err(e) => {
                if index_is_down(index, &e).await {
                    return Err(e);
                }
                tracing::warn!(id = drift.source_id, error = %e, "patch failed; record skipped");
                report.failed.push(drift.source_id);
            }
        }
    }

    if report.patched == 0 {
        tracing::info!(failed = report.failed.len(), "no index entries patched");
    } else {
        tracing::info!(
            patched = report.patched,
            failed = report.failed.len(),
            "index patch complete"
        );
    }
    Ok(report)
}

/// Result of a full reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileReport {
    pub diff: DiffReport,
    /// `None` on a dry run.
    pub patch: Option<PatchReport>,
}

/// One differ pass over the whole mirror, followed by patching unless
/// `dry_run` is set.
pub async fn reconcile_pass(
    mirror: &dyn MirrorStore,
    index: &dyn SearchIndex,
    renderer: &Renderer,
    dry_run: bool,
) -> Result<ReconcileReport, SyncError> {
    let diff = diff(mirror, index, renderer).await?;
    if dry_run {
        return Ok(ReconcileReport { diff, patch: None });
    }
    let patch = patch(index, &diff.drifts).await?;
    Ok(ReconcileReport {
        diff,
        patch: Some(patch),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Counters, Flags, RelatedItem};
    use crate::render::RenderConfig;
    use crate::store::memory::InMemoryIndex;
    use chrono::{TimeZone, Utc};

    fn rec(id: i64, title: &str) -> MirrorRecord {
        MirrorRecord {
            id,
            link: Some(format!("https://example.vn/tin-tuc/a/{id}")),
            category_name: Some("Tin tức".to_string()),
            title: Some(title.to_string()),
            header: Some("Tóm tắt".to_string()),
            body: Some("<p>Nội dung</p>".to_string()),
            author: Some("An".to_string()),
            flags: Flags {
                is_active: true,
                ..Flags::default()
            },
            counters: Counters::default(),
            created_at: Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()),
            updated_at: None,
            published_time: None,
            related: vec![RelatedItem {
                title: "B".to_string(),
                link: "https://example.vn/tin-tuc/a/b".to_string(),
            }],
        }
    }

    async fn seed(index: &InMemoryIndex, renderer: &Renderer, rec: &MirrorRecord) {
        let doc = renderer.to_index_document(rec).unwrap();
        index.insert(&[doc]).await.unwrap();
    }

    #[tokio::test]
    async fn test_identical_copy_is_in_sync() {
        let index = InMemoryIndex::new();
        let renderer = Renderer::new(RenderConfig::default());
        let r = rec(42, "A");
        seed(&index, &renderer, &r).await;
        index.edit(42, |d| d.metadata.created_at = "2024-01-01T00:00:00".to_string());

        assert_eq!(check_record(&index, &renderer, &r).await.unwrap(), Check::InSync);
    }

    #[tokio::test]
    async fn test_absent_copy_is_missing() {
        let index = InMemoryIndex::new();
        let renderer = Renderer::new(RenderConfig::default());
        assert_eq!(
            check_record(&index, &renderer, &rec(1, "A")).await.unwrap(),
            Check::Missing
        );
    }

    #[tokio::test]
    async fn test_content_change_wins_over_metadata() {
        let index = InMemoryIndex::new();
        let renderer = Renderer::new(RenderConfig::default());
        seed(&index, &renderer, &rec(1, "A")).await;

        let mut changed = rec(1, "A");
        changed.body = Some("<p>Khác</p>".to_string());
        changed.counters.hit_count = 10;
        match check_record(&index, &renderer, &changed).await.unwrap() {
            Check::Drifted(d) => assert_eq!(d.reason, DriftReason::Content),
            other => panic!("expected drift, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_metadata_only_change_names_the_field() {
        let index = InMemoryIndex::new();
        let renderer = Renderer::new(RenderConfig::default());
        seed(&index, &renderer, &rec(1, "A")).await;

        let mut changed = rec(1, "A");
        changed.flags.is_hot = true;
        match check_record(&index, &renderer, &changed).await.unwrap() {
            Check::Drifted(d) => {
                assert_eq!(d.reason, DriftReason::Field(MetadataField::IsHot));
                assert!(d.expected.pk.is_some());
            }
            other => panic!("expected drift, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_lookup_failure_is_skipped() {
        let index = InMemoryIndex::new();
        let renderer = Renderer::new(RenderConfig::default());
        let rows = vec![rec(1, "A"), rec(2, "B")];
        for r in &rows {
            seed(&index, &renderer, r).await;
        }
        index.fail_lookup_for(1);

        let report = diff_records(&index, &renderer, &rows).await.unwrap();
        assert_eq!(report.failed, vec![1]);
        assert_eq!(report.in_sync, 1);
        assert_eq!(report.examined, 2);
    }

    #[tokio::test]
    async fn test_timed_out_lookup_does_not_stop_later_ids() {
        let index = InMemoryIndex::new();
        let renderer = Renderer::new(RenderConfig::default());
        let rows = vec![rec(1, "A"), rec(2, "B"), rec(3, "C")];
        for r in &rows {
            seed(&index, &renderer, r).await;
        }
        index.fail_lookup_for(1);

        let report = diff_records(&index, &renderer, &rows).await.unwrap();
        assert_eq!(report.examined, 3);
        assert_eq!(report.in_sync, 2);
        assert_eq!(report.failed, vec![1]);
    }

    #[tokio::test]
    async fn test_unavailable_upsert_does_not_stop_later_patches() {
        let index = InMemoryIndex::new();
        let renderer = Renderer::new(RenderConfig::default());
        for id in [5, 7, 9] {
            seed(&index, &renderer, &rec(id, "A")).await;
        }
        let rows: Vec<_> = [5, 7, 9].into_iter().map(|id| rec(id, "A mới")).collect();
        let report = diff_records(&index, &renderer, &rows).await.unwrap();
        index.fail_upsert_for(7);

        let patched = patch(&index, &report.drifts).await.unwrap();
        assert_eq!(patched.patched, 2);
        assert_eq!(patched.failed, vec![7]);
        assert_eq!(index.documents_for(9)[0].metadata.title, "A mới");
    }

    #[tokio::test]
    async fn test_offline_index_stops_the_diff() {
        let index = InMemoryIndex::new();
        let renderer = Renderer::new(RenderConfig::default());
        let rows = vec![rec(1, "A"), rec(2, "B")];
        for r in &rows {
            seed(&index, &renderer, r).await;
        }
        index.set_unreachable(true);

        let err = diff_records(&index, &renderer, &rows).await.unwrap_err();
        assert!(err.is_connectivity());
    }

    #[tokio::test]
    async fn test_offline_index_stops_patching() {
        let index = InMemoryIndex::new();
        let renderer = Renderer::new(RenderConfig::default());
        seed(&index, &renderer, &rec(1, "A")).await;
        let report = diff_records(&index, &renderer, &[rec(1, "A mới")])
            .await
            .unwrap();
        index.set_unreachable(true);

        let err = patch(&index, &report.drifts).await.unwrap_err();
        assert!(err.is_connectivity());
    }

    #[tokio::test]
    async fn test_patch_replaces_by_key() {
        let index = InMemoryIndex::new();
        let renderer = Renderer::new(RenderConfig::default());
        seed(&index, &renderer, &rec(1, "A")).await;
        let rows = vec![rec(1, "A mới")];

        let report = diff_records(&index, &renderer, &rows).await.unwrap();
        let patched = patch(&index, &report.drifts).await.unwrap();
        assert_eq!(patched.patched, 1);

        let docs = index.documents_for(1);
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].metadata.title, "A mới");
    }

    #[tokio::test]
    async fn test_empty_drift_set_patches_nothing() {
        let index = InMemoryIndex::new();
        let report = patch(&index, &[]).await.unwrap();
        assert_eq!(report, PatchReport::default());
    }
}
