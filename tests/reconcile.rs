//! Reconciliation passes against the in-memory stores.

use article_sync_core::canonical::MetadataField;
use article_sync_core::models::{Counters, Flags, MirrorRecord, RelatedItem};
use article_sync_core::reconcile::{reconcile_pass, DriftReason};
use article_sync_core::render::{RenderConfig, Renderer};
use article_sync_core::store::memory::{InMemoryIndex, InMemoryMirror};
use article_sync_core::store::SearchIndex;
use chrono::{TimeZone, Utc};

fn record(id: i64, title: &str) -> MirrorRecord {
    MirrorRecord {
        id,
        link: Some(format!("https://nguoidonghanh.viettel.vn/tin-tuc/the-thao/bai-{id}")),
        category_name: Some("Thể thao".to_string()),
        title: Some(title.to_string()),
        header: Some("Tóm tắt".to_string()),
        body: Some("<p>Đoạn một</p><p>Đoạn hai</p>".to_string()),
        author: None,
        flags: Flags {
            is_active: true,
            ..Flags::default()
        },
        counters: Counters {
            hit_count: 10,
            ..Counters::default()
        },
        created_at: Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()),
        updated_at: Some(Utc.with_ymd_and_hms(2024, 2, 1, 8, 30, 0).unwrap()),
        published_time: None,
        related: vec![RelatedItem {
            title: "Bài khác".to_string(),
            link: "https://nguoidonghanh.viettel.vn/tin-tuc/su-kien/bai-khac".to_string(),
        }],
    }
}

struct Harness {
    mirror: InMemoryMirror,
    index: InMemoryIndex,
    renderer: Renderer,
}

impl Harness {
    /// Mirror and index both hold `records`, in sync.
    async fn synced(records: Vec<MirrorRecord>) -> Self {
        let h = Self {
            mirror: InMemoryMirror::new(),
            index: InMemoryIndex::new(),
            renderer: Renderer::new(RenderConfig::default()),
        };
        for rec in records {
            let doc = h.renderer.to_index_document(&rec).unwrap();
            h.index.insert(&[doc]).await.unwrap();
            h.mirror.put(rec);
        }
        h
    }
}

#[tokio::test]
async fn test_in_sync_stores_report_no_drift() {
    let h = Harness::synced(vec![record(42, "A"), record(43, "B")]).await;
    // older index entries hold naive timestamps and compact JSON
    h.index.edit(42, |doc| {
        doc.metadata.created_at = "2024-01-01T00:00:00".to_string();
        doc.metadata.related_json = serde_json::to_string(&record(42, "A").related).unwrap();
    });

    let report = reconcile_pass(&h.mirror, &h.index, &h.renderer, false)
        .await
        .unwrap();
    assert_eq!(report.diff.examined, 2);
    assert_eq!(report.diff.in_sync, 2);
    assert!(report.diff.drifts.is_empty());
    assert_eq!(report.patch.unwrap().patched, 0);
}

#[tokio::test]
async fn test_title_change_is_drift_and_gets_patched() {
    let h = Harness::synced(vec![record(42, "A")]).await;
    // stale metadata, current text
    h.index.edit(42, |doc| doc.metadata.title = "A cũ".to_string());

    let report = reconcile_pass(&h.mirror, &h.index, &h.renderer, false)
        .await
        .unwrap();
    assert_eq!(report.diff.drifts.len(), 1);
    assert_eq!(
        report.diff.drifts[0].reason,
        DriftReason::Field(MetadataField::Title)
    );
    assert_eq!(report.patch.unwrap().patched, 1);

    let docs = h.index.documents_for(42);
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].metadata.title, "A");
}

#[tokio::test]
async fn test_mirror_title_update_drifts_on_content() {
    let h = Harness::synced(vec![record(42, "A")]).await;
    h.mirror.put(record(42, "A mới"));

    let report = reconcile_pass(&h.mirror, &h.index, &h.renderer, true)
        .await
        .unwrap();
    assert_eq!(report.diff.drifts.len(), 1);
    assert_eq!(report.diff.drifts[0].reason, DriftReason::Content);
    assert!(report.patch.is_none());
    // dry run leaves the index alone
    assert_eq!(h.index.documents_for(42)[0].metadata.title, "A");
}

#[tokio::test]
async fn test_patch_failure_for_one_id_does_not_stop_the_others() {
    let h = Harness::synced(vec![record(5, "E"), record(7, "G"), record(9, "I")]).await;
    for id in [5, 7, 9] {
        h.index.edit(id, |doc| doc.metadata.hit_count = 0);
    }
    h.index.fail_upsert_for(7);

    let report = reconcile_pass(&h.mirror, &h.index, &h.renderer, false)
        .await
        .unwrap();
    assert_eq!(report.diff.drifts.len(), 3);
    let patch = report.patch.unwrap();
    assert_eq!(patch.patched, 2);
    assert_eq!(patch.failed, vec![7]);

    assert_eq!(h.index.documents_for(5)[0].metadata.hit_count, 10);
    assert_eq!(h.index.documents_for(9)[0].metadata.hit_count, 10);
    assert_eq!(h.index.documents_for(7)[0].metadata.hit_count, 0);
}

#[tokio::test]
async fn test_unindexed_record_is_left_to_the_indexer() {
    let h = Harness::synced(vec![record(1, "A")]).await;
    h.mirror.put(record(2, "B"));

    let report = reconcile_pass(&h.mirror, &h.index, &h.renderer, false)
        .await
        .unwrap();
    assert_eq!(report.diff.missing, vec![2]);
    assert!(h.index.documents_for(2).is_empty());
}

#[tokio::test]
async fn test_duplicate_entries_patch_the_lowest_key() {
    let h = Harness::synced(vec![record(42, "A")]).await;
    let stale = h.index.documents_for(42)[0].clone();
    h.index.insert(&[stale]).await.unwrap();
    h.mirror.put(record(42, "A mới"));

    let report = reconcile_pass(&h.mirror, &h.index, &h.renderer, false)
        .await
        .unwrap();
    assert_eq!(report.patch.unwrap().patched, 1);

    let docs = h.index.documents_for(42);
    assert_eq!(docs.len(), 2);
    assert_eq!(docs[0].metadata.title, "A mới");
    assert_eq!(docs[1].metadata.title, "A");
}

#[tokio::test]
async fn test_unreachable_index_aborts_the_pass() {
    let h = Harness::synced(vec![record(1, "A")]).await;
    h.index.set_unreachable(true);

    let err = reconcile_pass(&h.mirror, &h.index, &h.renderer, false)
        .await
        .unwrap_err();
    assert!(err.is_connectivity());
}

#[tokio::test]
async fn test_undecodable_mirror_row_is_reported_not_fatal() {
    let h = Harness::synced(vec![record(1, "A"), record(2, "B"), record(3, "C")]).await;
    h.mirror.mark_unreadable(2);
    h.mirror.put(record(3, "C mới"));

    let report = reconcile_pass(&h.mirror, &h.index, &h.renderer, false)
        .await
        .unwrap();
    assert_eq!(report.diff.examined, 3);
    assert_eq!(report.diff.failed, vec![2]);
    assert_eq!(report.diff.in_sync, 1);
    assert_eq!(report.patch.unwrap().patched, 1);
    assert_eq!(h.index.documents_for(3)[0].metadata.title, "C mới");
}

#[tokio::test]
async fn test_timed_out_lookup_skips_only_that_record() {
    let h = Harness::synced(vec![record(1, "A"), record(2, "B"), record(3, "C")]).await;
    h.mirror.put(record(2, "B mới"));
    h.mirror.put(record(3, "C mới"));
    h.index.fail_lookup_for(1);

    let report = reconcile_pass(&h.mirror, &h.index, &h.renderer, false)
        .await
        .unwrap();
    assert_eq!(report.diff.failed, vec![1]);
    assert_eq!(report.patch.unwrap().patched, 2);
    assert_eq!(h.index.documents_for(3)[0].metadata.title, "C mới");
}
