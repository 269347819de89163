use crate::services::staging::StagedFile;
use crate::services::storage::StorageService;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("remote store did not answer within {0:?}")]
    Timeout(Duration),

    #[error("remote store rejected the upload: {0}")]
    Store(anyhow::Error),
}

/// Pushes staged files to the blob store. One attempt per call, no retries.
pub struct RemoteUploader {
    storage: Arc<dyn StorageService>,
    timeout: Duration,
}

impl RemoteUploader {
    pub fn new(storage: Arc<dyn StorageService>, timeout: Duration) -> Self {
        Self { storage, timeout }
    }

    /// Uploads the staged file under its generated name and returns the public reference.
    pub async fn upload(&self, staged: &StagedFile) -> Result<String, UploadError> {
        let key = staged.object_name();
        let started = Instant::now();

        let put = self
            .storage
            .upload_path(key, staged.path(), staged.content_type());

        match tokio::time::timeout(self.timeout, put).await {
            Err(_) => Err(UploadError::Timeout(self.timeout)),
            Ok(Err(e)) => Err(UploadError::Store(e)),
            Ok(Ok(())) => {
                tracing::info!(
                    "Stored {} ({} bytes) in bucket {} in {:?}",
                    key,
                    staged.size(),
                    self.storage.bucket(),
                    started.elapsed()
                );
                Ok(self.storage.object_url(key))
            }
        }
    }
}
