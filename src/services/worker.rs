use crate::config::AppConfig;
use crate::services::record_store::RecordStore;
use crate::services::staging::{PHOTO_TAG, StagingArea};
use crate::services::storage::{ObjectInfo, StorageService};
use chrono::Utc;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{Duration, sleep};

/// Counters from one reconciliation pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    pub scanned: usize,
    /// Blobs whose item was deleted
    pub removed_for_deleted_items: usize,
    /// Blobs that outlived the grace period without being linked
    pub removed_unlinked: usize,
    pub kept: usize,
}

/// Cleans up blobs the request path cannot: images of deleted items, blobs
/// orphaned by a failed link, and staging files left by a crashed process.
pub struct BackgroundWorker {
    records: Arc<dyn RecordStore>,
    storage: Arc<dyn StorageService>,
    staging: StagingArea,
    config: AppConfig,
    shutdown: watch::Receiver<bool>,
}

impl BackgroundWorker {
    pub fn new(
        records: Arc<dyn RecordStore>,
        storage: Arc<dyn StorageService>,
        config: AppConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            records,
            storage,
            staging: StagingArea::new(&config.staging_dir),
            config,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        tracing::info!("🚀 Background worker started");

        loop {
            tokio::select! {
                _ = self.shutdown.changed() => {
                    tracing::info!("🛑 Background worker shutting down");
                    break;
                }
                _ = sleep(Duration::from_secs(self.config.reconcile_interval_secs)) => {
                    self.perform_cleanup().await;
                }
            }
        }
    }

    async fn perform_cleanup(&self) {
        tracing::info!("🧹 Running background cleanup tasks...");

        match self.reconcile_blobs().await {
            Ok(report) => tracing::info!(
                scanned = report.scanned,
                deleted_items = report.removed_for_deleted_items,
                unlinked = report.removed_unlinked,
                kept = report.kept,
                "Blob reconciliation finished"
            ),
            Err(e) => tracing::error!("Blob reconciliation failed: {:?}", e),
        }

        let max_age = Duration::from_secs(self.config.staging_cleanup_age_hours * 3600);
        match self.staging.sweep(max_age).await {
            Ok(0) => {}
            Ok(n) => tracing::info!("Removed {} stale staging files", n),
            Err(e) => tracing::error!("Staging sweep failed: {}", e),
        }

        tracing::info!("✅ Background cleanup completed");
    }

    /// Compares stored image blobs with the items that should reference them.
    pub async fn reconcile_blobs(&self) -> anyhow::Result<ReconcileReport> {
        let mut report = ReconcileReport::default();
        let mut by_item: BTreeMap<String, Vec<ObjectInfo>> = BTreeMap::new();

        for object in self.storage.list_objects("").await? {
            if let Some((item_id, _)) = object.key.rsplit_once(PHOTO_TAG) {
                report.scanned += 1;
                by_item.entry(item_id.to_string()).or_default().push(object);
            }
        }

        let grace = chrono::Duration::seconds(
            i64::try_from(self.config.orphan_grace_secs).unwrap_or(i64::MAX),
        );
        let now = Utc::now();

        for (item_id, objects) in by_item {
            let Some(item) = self.records.find(&item_id).await? else {
                tracing::info!(
                    "Item {} is gone, removing {} image(s)",
                    item_id,
                    objects.len()
                );
                for object in objects {
                    if self.remove(&object.key).await {
                        report.removed_for_deleted_items += 1;
                    }
                }
                continue;
            };

            let linked: HashSet<&str> = item
                .photos
                .0
                .iter()
                .filter_map(|reference| referenced_object_name(reference))
                .collect();

            for object in objects {
                let settled = object
                    .last_modified
                    .map(|modified| now - modified >= grace)
                    .unwrap_or(false);

                if linked.contains(object.key.as_str()) || !settled {
                    report.kept += 1;
                } else {
                    tracing::warn!("Removing unlinked image {} of item {}", object.key, item_id);
                    if self.remove(&object.key).await {
                        report.removed_unlinked += 1;
                    }
                }
            }
        }

        Ok(report)
    }

    async fn remove(&self, key: &str) -> bool {
        match self.storage.delete_file(key).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("Failed to delete {} from storage: {}", key, e);
                false
            }
        }
    }
}

/// Object name at the end of an image reference, ignoring query and fragment.
pub fn referenced_object_name(reference: &str) -> Option<&str> {
    let path = reference.split(['?', '#']).next()?;
    let name = path.rsplit('/').next()?;
    if name.contains(PHOTO_TAG) { Some(name) } else { None }
}
