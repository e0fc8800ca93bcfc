//! End-to-end sync engine tests over the fixture source and the in-memory
//! object gateway.
//!
//! Run with: cargo test --test sync_tests

use std::sync::Arc;

use pretty_assertions::assert_eq;

use pressroom::access::{RuleStore, UpsertRule};
use pressroom::bucket::{BucketKind, MemoryGateway, ObjectGateway};
use pressroom::source::FixtureSource;
use pressroom::storage::{latest_build, BuildStatus, Storage};
use pressroom::sync::{Catalog, SyncEngine};
use pressroom::types::{AccessMode, EngineConfig, CATALOG_KEY};

struct Harness {
    engine: SyncEngine,
    source: Arc<FixtureSource>,
    gateway: Arc<MemoryGateway>,
    storage: Storage,
}

fn harness() -> Harness {
    let source = Arc::new(FixtureSource::new());
    let gateway = Arc::new(MemoryGateway::new());
    let storage = Storage::open_in_memory().unwrap();
    let engine = SyncEngine::new(
        source.clone(),
        gateway.clone(),
        storage.clone(),
        EngineConfig::default(),
    );
    Harness {
        engine,
        source,
        gateway,
        storage,
    }
}

fn seed_three_files(h: &Harness) {
    h.source.insert(
        "content/notes/a.md",
        "---\ntitle: Note A\ndate: 2024-01-10\n---\nAn open note.\n",
    );
    h.source.insert(
        "content/ideas/b.md",
        "---\ntitle: Idea B\ndate: 2024-02-20\n---\nA gated idea.\n",
    );
    h.source.insert(
        "content/pages/c.md",
        "---\ntitle: Page C\ndate: 2024-03-05\n---\nAn open page.\n",
    );
}

fn protect_with_password(h: &Harness, content_type: &str, slug: &str) {
    h.storage
        .with_transaction(|conn| {
            RuleStore::new(conn).upsert_rule(
                content_type,
                slug,
                &UpsertRule {
                    access_mode: AccessMode::Password,
                    password: Some("secret123".into()),
                    ..Default::default()
                },
            )
        })
        .unwrap();
}

fn stored_catalog(h: &Harness) -> Catalog {
    let raw = h
        .gateway
        .get_text(BucketKind::Public, CATALOG_KEY)
        .expect("catalog must exist");
    serde_json::from_str(&raw).unwrap()
}

#[tokio::test]
async fn full_sync_routes_items_per_access_rule() {
    let h = harness();
    seed_three_files(&h);
    protect_with_password(&h, "ideas", "b");

    let report = h.engine.run_full("test").await.unwrap();

    assert!(report.success);
    assert_eq!(report.total_processed, 3);
    assert_eq!(report.uploaded.len(), 3);
    assert!(report.deleted.is_empty());

    assert_eq!(
        h.gateway.keys(BucketKind::Public),
        vec![
            CATALOG_KEY.to_string(),
            "notes/a.html".to_string(),
            "pages/c.html".to_string(),
        ]
    );
    assert_eq!(h.gateway.keys(BucketKind::Protected), vec!["ideas/b.html"]);

    let catalog = stored_catalog(&h);
    assert_eq!(catalog.get("notes").map(Vec::len), Some(1));
    assert_eq!(catalog.get("pages").map(Vec::len), Some(1));
    assert!(catalog.get("ideas").is_none());
    assert_eq!(catalog["notes"][0].slug, "a");
    assert_eq!(catalog["pages"][0].slug, "c");
}

#[tokio::test]
async fn default_open_when_no_rule_exists() {
    let h = harness();
    seed_three_files(&h);

    let report = h.engine.run_full("test").await.unwrap();

    assert!(report.success);
    assert!(h.gateway.keys(BucketKind::Protected).is_empty());
    assert_eq!(h.gateway.keys(BucketKind::Public).len(), 4); // 3 items + catalog
}

#[tokio::test]
async fn second_full_sync_is_idempotent() {
    let h = harness();
    seed_three_files(&h);
    protect_with_password(&h, "ideas", "b");

    let first = h.engine.run_full("test").await.unwrap();
    assert!(first.success);

    let second = h.engine.run_full("test").await.unwrap();
    assert!(second.success);
    assert_eq!(second.uploaded.len(), first.uploaded.len());
    assert_eq!(second.deleted, Vec::<String>::new());

    // Bucket contents unchanged
    assert_eq!(h.gateway.keys(BucketKind::Public).len(), 3);
    assert_eq!(h.gateway.keys(BucketKind::Protected).len(), 1);
}

#[tokio::test]
async fn stale_objects_are_reconciled_catalog_is_not() {
    let h = harness();
    seed_three_files(&h);

    // Objects no source file backs
    h.gateway
        .put(BucketKind::Public, "notes/ghost.html", b"old", "text/html")
        .await
        .unwrap();
    h.gateway
        .put(BucketKind::Protected, "ideas/stale.html", b"old", "text/html")
        .await
        .unwrap();

    let report = h.engine.run_full("test").await.unwrap();

    assert!(report.success);
    let mut deleted = report.deleted.clone();
    deleted.sort();
    assert_eq!(deleted, vec!["ideas/stale.html", "notes/ghost.html"]);
    assert!(!report.deleted.contains(&CATALOG_KEY.to_string()));
    assert!(h
        .gateway
        .get_text(BucketKind::Public, CATALOG_KEY)
        .is_some());
}

#[tokio::test]
async fn one_failing_item_does_not_stop_the_batch() {
    let h = harness();
    seed_three_files(&h);
    h.gateway.fail_key("notes/a.html");

    let report = h.engine.run_full("test").await.unwrap();

    assert!(!report.success);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].path, "notes/a.html");
    // The two healthy items still made it
    assert_eq!(report.uploaded.len(), 2);
    assert!(h
        .gateway
        .keys(BucketKind::Public)
        .contains(&"pages/c.html".to_string()));
}

#[tokio::test]
async fn rule_change_moves_item_between_buckets() {
    let h = harness();
    seed_three_files(&h);

    h.engine.run_full("test").await.unwrap();
    assert!(h
        .gateway
        .keys(BucketKind::Public)
        .contains(&"ideas/b.html".to_string()));

    protect_with_password(&h, "ideas", "b");
    let report = h.engine.run_full("test").await.unwrap();

    assert!(report.success);
    assert_eq!(h.gateway.keys(BucketKind::Protected), vec!["ideas/b.html"]);
    // The old public copy is now stale and got reconciled away
    assert!(!h
        .gateway
        .keys(BucketKind::Public)
        .contains(&"ideas/b.html".to_string()));
    assert!(report.deleted.contains(&"ideas/b.html".to_string()));

    let catalog = stored_catalog(&h);
    assert!(catalog.get("ideas").is_none());
}

#[tokio::test]
async fn partial_sync_updates_only_named_paths() {
    let h = harness();
    seed_three_files(&h);
    h.engine.run_full("test").await.unwrap();

    h.source.insert(
        "content/notes/a.md",
        "---\ntitle: Note A Updated\ndate: 2024-01-11\n---\nNew body.\n",
    );

    let report = h
        .engine
        .run_partial(vec!["content/notes/a.md".into()], "test")
        .await
        .unwrap();

    assert!(report.success);
    assert_eq!(report.uploaded, vec!["notes/a.html"]);
    assert!(report.deleted.is_empty());

    let html = h
        .gateway
        .get_text(BucketKind::Public, "notes/a.html")
        .unwrap();
    assert!(html.contains("New body."));

    // Catalog was merged, not rebuilt: untouched entries survive
    let catalog = stored_catalog(&h);
    assert_eq!(catalog["notes"][0].title, "Note A Updated");
    assert_eq!(catalog.get("pages").map(Vec::len), Some(1));
}

#[tokio::test]
async fn partial_sync_removes_vanished_files() {
    let h = harness();
    seed_three_files(&h);
    h.engine.run_full("test").await.unwrap();

    h.source.remove("content/pages/c.md");
    let report = h
        .engine
        .run_partial(vec!["content/pages/c.md".into()], "test")
        .await
        .unwrap();

    assert!(report.success);
    assert_eq!(report.deleted, vec!["pages/c.html"]);
    assert!(!h
        .gateway
        .keys(BucketKind::Public)
        .contains(&"pages/c.html".to_string()));

    let catalog = stored_catalog(&h);
    assert!(catalog.get("pages").is_none());
    // Other entries untouched
    assert_eq!(catalog.get("notes").map(Vec::len), Some(1));
}

#[tokio::test]
async fn partial_sync_never_reconciles_stale() {
    let h = harness();
    seed_three_files(&h);
    h.engine.run_full("test").await.unwrap();

    // A partial run over one path must not delete the other objects
    let report = h
        .engine
        .run_partial(vec!["content/notes/a.md".into()], "test")
        .await
        .unwrap();

    assert!(report.success);
    assert!(h
        .gateway
        .keys(BucketKind::Public)
        .contains(&"pages/c.html".to_string()));
}

#[tokio::test]
async fn malformed_frontmatter_still_publishes() {
    let h = harness();
    h.source.insert(
        "content/notes/broken-note.md",
        "---\ntitle: [unclosed\n---\nStill renders fine.\n",
    );

    let report = h.engine.run_full("test").await.unwrap();

    assert!(report.success);
    let html = h
        .gateway
        .get_text(BucketKind::Public, "notes/broken-note.html")
        .unwrap();
    assert!(html.contains("Still renders fine."));

    let catalog = stored_catalog(&h);
    // Slug-as-title fallback
    assert_eq!(catalog["notes"][0].title, "Broken Note");
}

#[tokio::test]
async fn sync_outcome_lands_in_build_log() {
    let h = harness();
    seed_three_files(&h);

    h.engine.run_full("manual").await.unwrap();
    let build = h
        .storage
        .with_connection(|conn| latest_build(conn))
        .unwrap()
        .unwrap();
    assert_eq!(build.status, BuildStatus::Completed);
    assert_eq!(build.build_type, "full_sync");
    assert_eq!(build.triggered_by.as_deref(), Some("manual"));

    h.gateway.fail_key("notes/a.html");
    h.engine.run_full("manual").await.unwrap();
    let failed = h
        .storage
        .with_connection(|conn| latest_build(conn))
        .unwrap()
        .unwrap();
    assert_eq!(failed.status, BuildStatus::Failed);
    assert!(failed.error_message.is_some());
}

#[tokio::test]
async fn unreachable_source_aborts_the_run() {
    let h = harness();
    seed_three_files(&h);
    h.source.set_unavailable(true);

    let result = h.engine.run_full("test").await;
    assert!(result.is_err());

    let build = h
        .storage
        .with_connection(|conn| latest_build(conn))
        .unwrap()
        .unwrap();
    assert_eq!(build.status, BuildStatus::Failed);
}

#[tokio::test]
async fn non_content_paths_are_ignored_by_partial_sync() {
    let h = harness();
    seed_three_files(&h);

    let report = h
        .engine
        .run_partial(
            vec!["README.md".into(), "content/notes/a.md".into()],
            "test",
        )
        .await
        .unwrap();

    assert!(report.success);
    assert_eq!(report.total_processed, 1);
    assert_eq!(report.uploaded, vec!["notes/a.html"]);
}

#[tokio::test]
async fn rendered_objects_carry_html_content_type() {
    let h = harness();
    seed_three_files(&h);
    h.engine.run_full("test").await.unwrap();

    assert_eq!(
        h.gateway
            .content_type_of(BucketKind::Public, "notes/a.html")
            .as_deref(),
        Some("text/html; charset=utf-8")
    );
    assert_eq!(
        h.gateway
            .content_type_of(BucketKind::Public, CATALOG_KEY)
            .as_deref(),
        Some("application/json")
    );
}
