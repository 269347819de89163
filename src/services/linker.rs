use crate::entities::items;
use crate::services::record_store::{RecordStore, WriteStatus};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("item {0} no longer exists")]
    RecordGone(String),

    #[error("photo list of item {record_id} kept changing, gave up after {attempts} attempts")]
    Conflict { record_id: String, attempts: u32 },

    #[error("record store write failed: {0}")]
    Store(anyhow::Error),
}

/// Appends image references to an item's photo list.
///
/// Writes replace the whole list and are guarded by the item's version, so a
/// concurrent upload to the same item is detected and the append is replayed
/// on the fresh list instead of overwriting it.
pub struct MetadataLinker {
    records: Arc<dyn RecordStore>,
    max_attempts: u32,
}

impl MetadataLinker {
    pub fn new(records: Arc<dyn RecordStore>, max_attempts: u32) -> Self {
        Self {
            records,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Returns the persisted photo list on success.
    pub async fn link(
        &self,
        snapshot: &items::Model,
        reference: &str,
    ) -> Result<Vec<String>, LinkError> {
        let record_id = snapshot.id.as_str();
        let mut photos = snapshot.photos.0.clone();
        let mut version = snapshot.version;

        for attempt in 1..=self.max_attempts {
            photos.push(reference.to_string());

            let status = self
                .records
                .replace_photos(record_id, photos.clone(), version)
                .await
                .map_err(LinkError::Store)?;

            if status == WriteStatus::Applied {
                return Ok(photos);
            }

            tracing::debug!(
                "Photo list of item {} changed since version {} (attempt {}/{})",
                record_id,
                version,
                attempt,
                self.max_attempts
            );

            if attempt == self.max_attempts {
                break;
            }

            let fresh = self
                .records
                .find(record_id)
                .await
                .map_err(LinkError::Store)?
                .ok_or_else(|| LinkError::RecordGone(record_id.to_string()))?;
            photos = fresh.photos.0;
            version = fresh.version;
        }

        Err(LinkError::Conflict {
            record_id: record_id.to_string(),
            attempts: self.max_attempts,
        })
    }
}
