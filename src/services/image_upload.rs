use crate::config::AppConfig;
use crate::entities::items;
use crate::services::linker::MetadataLinker;
use crate::services::record_store::RecordStore;
use crate::services::staging::{StagedFile, StagingArea};
use crate::services::storage::StorageService;
use crate::services::uploader::RemoteUploader;
use crate::utils::validation::is_accepted_image;
use axum::extract::Multipart;
use axum::extract::multipart::MultipartError;
use futures::TryStreamExt;
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::io::StreamReader;

/// Result of one image upload request, one variant per pipeline stage that can fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    /// Carries the reference appended to the item
    Success(String),
    RecordNotFound,
    InvalidMediaType,
    /// The blob is stored but the item does not reference it
    LinkFailed,
    StorageFailed,
    OtherFailure,
}

impl UploadOutcome {
    /// Response code reported to the client.
    pub fn code(&self) -> u16 {
        match self {
            UploadOutcome::Success(_) => 200,
            UploadOutcome::RecordNotFound => 101,
            UploadOutcome::InvalidMediaType => 102,
            UploadOutcome::LinkFailed => 103,
            UploadOutcome::StorageFailed => 104,
            UploadOutcome::OtherFailure => 105,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, UploadOutcome::Success(_))
    }
}

pub struct ImageUploadService {
    records: Arc<dyn RecordStore>,
    staging: StagingArea,
    uploader: RemoteUploader,
    linker: MetadataLinker,
}

impl ImageUploadService {
    pub fn new(
        records: Arc<dyn RecordStore>,
        storage: Arc<dyn StorageService>,
        config: &AppConfig,
    ) -> Self {
        Self {
            staging: StagingArea::new(&config.staging_dir),
            uploader: RemoteUploader::new(
                storage,
                Duration::from_secs(config.storage_timeout_secs),
            ),
            linker: MetadataLinker::new(records.clone(), config.link_max_attempts),
            records,
        }
    }

    /// Runs the attachment pipeline for one request.
    ///
    /// Lookup, staging, upload and link run strictly in order and the first
    /// failure decides the outcome. The staged file never outlives this call.
    pub async fn handle_upload(&self, record_id: &str, mut multipart: Multipart) -> UploadOutcome {
        let record = match self.lookup(record_id).await {
            Ok(record) => record,
            Err(outcome) => return outcome,
        };

        let staged = match self.stage_image_part(&record.id, &mut multipart).await {
            Ok(staged) => staged,
            Err(outcome) => return outcome,
        };

        let outcome = self.publish(&record, &staged).await;
        staged.discard().await;
        outcome
    }

    /// Outcome for a request whose body is not a readable multipart payload.
    pub async fn reject_malformed(&self, record_id: &str, reason: impl Display) -> UploadOutcome {
        if let Err(outcome) = self.lookup(record_id).await {
            return outcome;
        }
        tracing::warn!("Rejected image upload for item {}: {}", record_id, reason);
        UploadOutcome::OtherFailure
    }

    async fn lookup(&self, record_id: &str) -> Result<items::Model, UploadOutcome> {
        match self.records.find(record_id).await {
            Ok(Some(record)) => Ok(record),
            Ok(None) => {
                tracing::info!("Image upload for unknown item {}", record_id);
                Err(UploadOutcome::RecordNotFound)
            }
            Err(e) => {
                tracing::error!("Item lookup failed for {}: {:?}", record_id, e);
                Err(UploadOutcome::OtherFailure)
            }
        }
    }

    /// Finds the first file part, gates it on its declared type and stages it.
    /// Everything after that part is read and discarded.
    async fn stage_image_part(
        &self,
        record_id: &str,
        multipart: &mut Multipart,
    ) -> Result<StagedFile, UploadOutcome> {
        loop {
            let field = match multipart.next_field().await {
                Ok(Some(field)) => field,
                Ok(None) => {
                    tracing::warn!("Image upload for item {} carried no file part", record_id);
                    return Err(UploadOutcome::OtherFailure);
                }
                Err(e) => {
                    tracing::warn!("Malformed multipart body for item {}: {}", record_id, e);
                    return Err(UploadOutcome::OtherFailure);
                }
            };

            let Some(filename) = field.file_name().map(str::to_string) else {
                continue;
            };
            let content_type = field.content_type().unwrap_or_default().to_string();

            if !is_accepted_image(&content_type) {
                drop(field);
                tracing::info!(
                    "Rejected '{}' ({}) for item {}: not a JPEG or PNG image",
                    filename,
                    content_type,
                    record_id
                );
                if let Err(e) = drain(multipart).await {
                    tracing::debug!("Body ended early while draining: {}", e);
                }
                return Err(UploadOutcome::InvalidMediaType);
            }

            let reader = StreamReader::new(field.map_err(std::io::Error::other));
            let staged = self
                .staging
                .stage(record_id, &filename, &content_type, reader)
                .await
                .map_err(|e| {
                    tracing::warn!("Staging '{}' for item {} failed: {}", filename, record_id, e);
                    UploadOutcome::OtherFailure
                })?;

            if let Err(e) = drain(multipart).await {
                tracing::warn!(
                    "Request body for item {} broke after the file part: {}",
                    record_id,
                    e
                );
                staged.discard().await;
                return Err(UploadOutcome::OtherFailure);
            }

            return Ok(staged);
        }
    }

    async fn publish(&self, record: &items::Model, staged: &StagedFile) -> UploadOutcome {
        let reference = match self.uploader.upload(staged).await {
            Ok(reference) => reference,
            Err(e) => {
                tracing::error!(
                    "Upload of {} for item {} failed: {}",
                    staged.object_name(),
                    record.id,
                    e
                );
                return UploadOutcome::StorageFailed;
            }
        };

        match self.linker.link(record, &reference).await {
            Ok(photos) => {
                tracing::info!(
                    "Linked {} to item {} ({} photos)",
                    reference,
                    record.id,
                    photos.len()
                );
                UploadOutcome::Success(reference)
            }
            Err(e) => {
                tracing::error!(
                    orphaned_blob = %staged.object_name(),
                    "Stored {} but could not link it to item {}: {}",
                    reference,
                    record.id,
                    e
                );
                UploadOutcome::LinkFailed
            }
        }
    }
}

async fn drain(multipart: &mut Multipart) -> Result<(), MultipartError> {
    while let Some(mut field) = multipart.next_field().await? {
        while field.chunk().await?.is_some() {}
    }
    Ok(())
}
