use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use hist_index::config::IndexConfig;
use hist_index::core::PageCapture;
use hist_index::index::Index;
use hist_index::query::SearchQuery;
use hist_index::storage::{MemoryStore, SnapshotStore};

fn unique_tmp_dir(tag: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let dir = std::env::temp_dir().join(format!("hist-index-{tag}-{nanos}"));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn capture(url: &str, title: &str, content: &str, ts: u64) -> PageCapture {
    PageCapture {
        url: url.to_string(),
        title: title.to_string(),
        content: content.to_string(),
        timestamp: ts,
        ..Default::default()
    }
}

#[tokio::test]
async fn index_survives_snapshot_reload() {
    let dir = unique_tmp_dir("flow");
    let snapshots = SnapshotStore::new(dir.join("index.db"));

    let store = MemoryStore::new();
    let index = Index::open(store.clone(), IndexConfig::default());
    index
        .record_visit(capture("https://blog.example.org/post?id=7", "Borrow Checker", "lifetimes explained", 1_000))
        .await
        .unwrap();
    index
        .record_visit(capture("https://example.org/", "Home", "welcome", 2_000))
        .await
        .unwrap();
    index
        .record_bookmark("blog.example.org/post?id=7", 3_000)
        .await
        .unwrap();
    index.flush().await.unwrap();
    snapshots.write_atomic(&store).await.unwrap();

    let reloaded = snapshots.load_if_valid().await.unwrap().unwrap();
    assert_eq!(reloaded.entries(), store.entries());

    let index = Index::open(reloaded, IndexConfig::default());
    let hits = index
        .search(&SearchQuery::text("borrow lifetimes"))
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, "blog.example.org/post?id=7");
    assert!(hits[0].document.is_bookmarked());

    let recent = index.search(&SearchQuery::default()).await.unwrap();
    let ids: Vec<&str> = recent.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, ["example.org", "blog.example.org/post?id=7"]);

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn closed_store_surfaces_errors_to_writers() {
    let store = MemoryStore::new();
    let index = Index::open(store.clone(), IndexConfig::default());
    store.close();

    let err = index
        .record_visit(capture("https://a.com/", "", "", 1))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("closed"), "{err}");
    assert!(index.search(&SearchQuery::default()).await.is_err());
}
