//! The sync state machine.
//!
//! Fetching → Transforming → Classifying → Uploading → ReconcilingStale →
//! Reporting. Item-level failures are recorded and skipped; the run only
//! aborts when the source or the object store cannot be reached at all.

use std::collections::HashSet;
use std::sync::Arc;

use futures::stream::{self, StreamExt};

use crate::access::RuleStore;
use crate::bucket::{BucketKind, ObjectGateway, HTML_CONTENT_TYPE, JSON_CONTENT_TYPE};
use crate::content::transform;
use crate::error::Result;
use crate::routing;
use crate::source::ContentSource;
use crate::storage::{finish_build, start_build, BuildStatus, Storage};
use crate::sync::catalog::{build_catalog, merge_catalog, Catalog};
use crate::types::{
    ContentItem, DeleteDetail, EngineConfig, SyncError, SyncReport, Transformed, UploadDetail,
    CATALOG_KEY,
};

/// Phases of one sync run, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Fetching,
    Transforming,
    Classifying,
    Uploading,
    ReconcilingStale,
    Reporting,
}

/// What to sync
#[derive(Debug, Clone)]
pub enum SyncRequest {
    /// Recompute and reconcile the entire content set
    Full,
    /// Sync an explicit list of source paths
    Paths(Vec<String>),
}

impl SyncRequest {
    fn build_type(&self) -> &'static str {
        match self {
            SyncRequest::Full => "full_sync",
            SyncRequest::Paths(_) => "partial_sync",
        }
    }
}

/// Top-level sync driver.
///
/// Two engines running concurrently against the same buckets have no
/// mutual-exclusion guarantee; callers must serialize runs.
pub struct SyncEngine {
    source: Arc<dyn ContentSource>,
    gateway: Arc<dyn ObjectGateway>,
    storage: Storage,
    config: EngineConfig,
}

impl SyncEngine {
    pub fn new(
        source: Arc<dyn ContentSource>,
        gateway: Arc<dyn ObjectGateway>,
        storage: Storage,
        config: EngineConfig,
    ) -> Self {
        Self {
            source,
            gateway,
            storage,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn source(&self) -> &Arc<dyn ContentSource> {
        &self.source
    }

    pub fn gateway(&self) -> &Arc<dyn ObjectGateway> {
        &self.gateway
    }

    /// Full sync: enumerate all content, upload, reconcile stale objects
    pub async fn run_full(&self, triggered_by: &str) -> Result<SyncReport> {
        self.run(SyncRequest::Full, triggered_by).await
    }

    /// Partial sync over an explicit path list. No stale reconciliation:
    /// a partial item set must never imply deletions beyond its own paths.
    pub async fn run_partial(&self, paths: Vec<String>, triggered_by: &str) -> Result<SyncReport> {
        self.run(SyncRequest::Paths(paths), triggered_by).await
    }

    async fn run(&self, request: SyncRequest, triggered_by: &str) -> Result<SyncReport> {
        let build_id = self
            .storage
            .with_connection(|conn| start_build(conn, request.build_type(), triggered_by))?;

        let result = self.run_inner(&request).await;

        match &result {
            Ok(report) => {
                let status = if report.success {
                    BuildStatus::Completed
                } else {
                    BuildStatus::Failed
                };
                let message = (!report.success)
                    .then(|| format!("{} item(s) failed", report.errors.len()));
                self.storage.with_connection(|conn| {
                    finish_build(conn, build_id, status, message.as_deref())
                })?;
            }
            Err(e) => {
                self.storage.with_connection(|conn| {
                    finish_build(conn, build_id, BuildStatus::Failed, Some(&e.to_string()))
                })?;
            }
        }

        result
    }

    async fn run_inner(&self, request: &SyncRequest) -> Result<SyncReport> {
        let mut report = SyncReport::default();

        // Fetching: resolve the set of source paths for this run. Failing to
        // enumerate the source at all is fatal; individual files are not.
        self.enter(SyncPhase::Fetching);
        let full_sync = matches!(request, SyncRequest::Full);
        let paths = match request {
            SyncRequest::Full => self.enumerate_all_paths().await?,
            SyncRequest::Paths(paths) => paths
                .iter()
                .filter(|p| {
                    let keep = crate::types::parse_content_path(p).is_some();
                    if !keep {
                        tracing::debug!("ignoring non-content path {}", p);
                    }
                    keep
                })
                .cloned()
                .collect(),
        };
        tracing::info!(
            "sync started: {} path(s), full={}",
            paths.len(),
            full_sync
        );

        // Transforming: fetch and render each file. A vanished file becomes
        // a removal; an unreachable one becomes a recorded error.
        self.enter(SyncPhase::Transforming);
        let mut transformed: Vec<Transformed> = Vec::new();
        let mut removals: Vec<(String, String)> = Vec::new();
        for path in &paths {
            report.total_processed += 1;
            match self.source.get_file_content(path).await {
                Ok(Some(raw)) => match transform(path, &raw) {
                    Ok(t) => {
                        for warning in &t.warnings {
                            tracing::warn!("{}: {}", path, warning);
                        }
                        transformed.push(t);
                    }
                    Err(e) => report.errors.push(SyncError {
                        path: path.clone(),
                        message: e.to_string(),
                    }),
                },
                Ok(None) => {
                    if let Some(identity) = crate::types::parse_content_path(path) {
                        removals.push(identity);
                    }
                }
                Err(e) => report.errors.push(SyncError {
                    path: path.clone(),
                    message: e.to_string(),
                }),
            }
        }

        // Classifying: one consistent rule snapshot for the whole run.
        self.enter(SyncPhase::Classifying);
        let snapshot = self
            .storage
            .with_connection(|conn| RuleStore::new(conn).snapshot_rules())?;
        let default_access = self.config.default_access;
        let items: Vec<ContentItem> = transformed
            .into_iter()
            .map(|t| {
                let rule = snapshot.get(&(t.content_type.clone(), t.slug.clone()));
                let decision = routing::decide(rule, default_access);
                ContentItem::classified(t, decision)
            })
            .collect();

        // Uploading: bounded fan-out; every failure is per-item.
        self.enter(SyncPhase::Uploading);
        let upload_inputs: Vec<_> = items
            .iter()
            .map(|item| {
                let key = item.object_key();
                let bucket = if item.is_protected {
                    BucketKind::Protected
                } else {
                    BucketKind::Public
                };
                let html = item.html.clone();
                (key, bucket, html)
            })
            .collect();
        let upload_results = stream::iter(upload_inputs.into_iter().map(|(key, bucket, html)| {
            let gateway = self.gateway.clone();
            async move {
                let size = html.len();
                let result = gateway
                    .put(bucket, &key, html.as_bytes(), HTML_CONTENT_TYPE)
                    .await;
                (key, bucket, size, result)
            }
        }))
        .buffer_unordered(self.config.sync_concurrency)
        .collect::<Vec<_>>()
        .await;

        for (key, bucket, size, result) in upload_results {
            match result {
                Ok(()) => {
                    report.uploaded.push(key.clone());
                    report.upload_details.push(UploadDetail {
                        key,
                        bucket: bucket.to_string(),
                        size,
                    });
                }
                Err(e) => report.errors.push(SyncError {
                    path: key,
                    message: e.to_string(),
                }),
            }
        }

        // Removals (partial syncs): the object may be in either bucket.
        for (content_type, slug) in &removals {
            let key = format!("{}/{}.html", content_type, slug);
            let mut any_deleted = false;
            for bucket in [BucketKind::Protected, BucketKind::Public] {
                match self.gateway.delete(bucket, &key).await {
                    Ok(()) => {
                        any_deleted = true;
                        report.delete_details.push(DeleteDetail {
                            key: key.clone(),
                            bucket: bucket.to_string(),
                        });
                    }
                    Err(e) => tracing::warn!("removal of {}/{} failed: {}", bucket, key, e),
                }
            }
            if any_deleted {
                report.deleted.push(key);
            }
        }

        // The catalog is written only after every item upload was attempted,
        // so a reader never sees an entry for an object that was never put.
        if let Err(e) = self.write_catalog(full_sync, &items, &removals).await {
            report.errors.push(SyncError {
                path: CATALOG_KEY.to_string(),
                message: e.to_string(),
            });
        }

        // ReconcilingStale: full syncs only. Delete failures are logged and
        // retried implicitly by the next run.
        if full_sync && self.config.reconcile_stale {
            self.enter(SyncPhase::ReconcilingStale);
            let stale_deleted = self.reconcile_stale(&items).await?;
            for detail in stale_deleted {
                if !report.deleted.contains(&detail.key) {
                    report.deleted.push(detail.key.clone());
                }
                report.delete_details.push(detail);
            }
        }

        self.enter(SyncPhase::Reporting);
        let report = report.finish();
        tracing::info!(
            "sync finished: processed={} uploaded={} deleted={} errors={} success={}",
            report.total_processed,
            report.uploaded.len(),
            report.deleted.len(),
            report.errors.len(),
            report.success
        );
        Ok(report)
    }

    async fn enumerate_all_paths(&self) -> Result<Vec<String>> {
        let mut paths = Vec::new();
        for content_type in &self.config.content_types {
            let files = self.source.list_content_files(content_type).await?;
            paths.extend(files.into_iter().map(|f| f.path));
        }
        Ok(paths)
    }

    async fn write_catalog(
        &self,
        full_sync: bool,
        items: &[ContentItem],
        removals: &[(String, String)],
    ) -> Result<()> {
        let catalog = if full_sync {
            build_catalog(items)
        } else {
            let existing = self.load_catalog().await?;
            merge_catalog(existing, items, removals)
        };

        let body = serde_json::to_vec(&catalog)?;
        self.gateway
            .put(BucketKind::Public, CATALOG_KEY, &body, JSON_CONTENT_TYPE)
            .await
    }

    /// Read the stored catalog; absent or unreadable means empty
    pub async fn load_catalog(&self) -> Result<Catalog> {
        match self.gateway.get(BucketKind::Public, CATALOG_KEY).await? {
            Some(bytes) => match serde_json::from_slice(&bytes) {
                Ok(catalog) => Ok(catalog),
                Err(e) => {
                    tracing::warn!("stored catalog unreadable, rebuilding from scratch: {}", e);
                    Ok(Catalog::new())
                }
            },
            None => Ok(Catalog::new()),
        }
    }

    /// Delete objects whose keys no longer correspond to a current item.
    /// The catalog key is never considered stale.
    async fn reconcile_stale(&self, items: &[ContentItem]) -> Result<Vec<DeleteDetail>> {
        let mut deleted = Vec::new();

        for bucket in [BucketKind::Protected, BucketKind::Public] {
            let current: HashSet<String> = items
                .iter()
                .filter(|i| i.is_protected == (bucket == BucketKind::Protected))
                .map(|i| i.object_key())
                .collect();

            let existing = self.gateway.list(bucket, None).await?;
            let stale: Vec<String> = existing
                .into_iter()
                .map(|o| o.key)
                .filter(|key| key != CATALOG_KEY && !current.contains(key))
                .collect();

            if stale.is_empty() {
                continue;
            }
            tracing::info!("reconciling {} stale object(s) in {}", stale.len(), bucket);

            let results = stream::iter(stale.into_iter().map(|key| {
                let gateway = self.gateway.clone();
                async move {
                    let result = gateway.delete(bucket, &key).await;
                    (key, result)
                }
            }))
            .buffer_unordered(self.config.sync_concurrency)
            .collect::<Vec<_>>()
            .await;

            for (key, result) in results {
                match result {
                    Ok(()) => deleted.push(DeleteDetail {
                        key,
                        bucket: bucket.to_string(),
                    }),
                    Err(e) => tracing::warn!("stale delete {}/{} failed: {}", bucket, key, e),
                }
            }
        }

        Ok(deleted)
    }

    /// Per-bucket object listings for the status endpoint
    pub async fn bucket_status(&self) -> Result<Vec<(BucketKind, Vec<crate::bucket::ObjectInfo>)>> {
        let mut status = Vec::new();
        for bucket in [BucketKind::Protected, BucketKind::Public] {
            status.push((bucket, self.gateway.list(bucket, None).await?));
        }
        Ok(status)
    }

    fn enter(&self, phase: SyncPhase) {
        tracing::debug!(?phase, "entering sync phase");
    }
}
