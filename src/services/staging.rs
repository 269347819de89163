use crate::utils::validation::{canonical_extension, extension_from_filename, is_safe_record_id};
use rand::Rng;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncRead, AsyncWriteExt, BufWriter};

/// Literal tag placed between the record id and the random suffix of an image name
pub const PHOTO_TAG: &str = "_photo_";

/// Exclusive upper bound of the random name suffix
const SUFFIX_RANGE: u32 = 10_000_000;

const MAX_NAME_ATTEMPTS: u32 = 5;

#[derive(Debug, Error)]
pub enum StagingError {
    #[error("record id '{0}' cannot be used in a file name")]
    UnsafeRecordId(String),

    #[error("no free staging name after {0} attempts")]
    NameExhausted(u32),

    #[error("staging I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Local directory bridging streamed multipart input to the remote store.
#[derive(Debug, Clone)]
pub struct StagingArea {
    dir: PathBuf,
}

impl StagingArea {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Streams `reader` into a freshly named file under the staging directory.
    ///
    /// The name is `{record_id}_photo_{n}.{ext}`. On any failure the partially
    /// written file is removed before the error is returned.
    pub async fn stage<R>(
        &self,
        record_id: &str,
        original_filename: &str,
        content_type: &str,
        mut reader: R,
    ) -> Result<StagedFile, StagingError>
    where
        R: AsyncRead + Unpin,
    {
        if !is_safe_record_id(record_id) {
            return Err(StagingError::UnsafeRecordId(record_id.to_string()));
        }

        let extension = extension_from_filename(original_filename)
            .or_else(|| canonical_extension(content_type).map(str::to_string))
            .unwrap_or_else(|| "img".to_string());

        tokio::fs::create_dir_all(&self.dir).await?;

        let mut attempt = 0;
        let (file, object_name, path) = loop {
            attempt += 1;
            let object_name = generate_object_name(record_id, &extension);
            let path = self.dir.join(&object_name);

            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => break (file, object_name, path),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if attempt >= MAX_NAME_ATTEMPTS {
                        return Err(StagingError::NameExhausted(attempt));
                    }
                }
                Err(e) => return Err(e.into()),
            }
        };

        // From here on the guard owns the path, including when this future is dropped.
        let mut staged = StagedFile {
            path,
            object_name,
            content_type: content_type.to_string(),
            record_id: record_id.to_string(),
            size: 0,
            armed: true,
        };

        let mut writer = BufWriter::new(file);
        staged.size = tokio::io::copy(&mut reader, &mut writer).await?;
        writer.flush().await?;

        tracing::debug!(
            "Staged {} bytes for item {} at {}",
            staged.size,
            staged.record_id,
            staged.path.display()
        );

        Ok(staged)
    }

    /// Removes staged images older than `max_age`, left behind by crashed processes.
    pub async fn sweep(&self, max_age: Duration) -> std::io::Result<usize> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e),
        };

        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            if !name.to_string_lossy().contains(PHOTO_TAG) {
                continue;
            }

            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }

            let age = metadata
                .modified()
                .ok()
                .and_then(|m| m.elapsed().ok())
                .unwrap_or_default();
            if age < max_age {
                continue;
            }

            match tokio::fs::remove_file(entry.path()).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => tracing::warn!(
                    "Failed to remove stale staging file {}: {}",
                    entry.path().display(),
                    e
                ),
            }
        }

        Ok(removed)
    }
}

fn generate_object_name(record_id: &str, extension: &str) -> String {
    let suffix = rand::thread_rng().gen_range(0..SUFFIX_RANGE);
    format!("{record_id}{PHOTO_TAG}{suffix}.{extension}")
}

/// A staged upload on local disk. The file is deleted when this value is
/// discarded or dropped, whichever comes first.
#[derive(Debug)]
pub struct StagedFile {
    path: PathBuf,
    object_name: String,
    content_type: String,
    record_id: String,
    size: u64,
    armed: bool,
}

impl StagedFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Generated name, reused as the remote object key
    pub fn object_name(&self) -> &str {
        &self.object_name
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn record_id(&self) -> &str {
        &self.record_id
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub async fn discard(mut self) {
        self.armed = false;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                "Failed to delete staged file {}: {}",
                self.path.display(),
                e
            ),
        }
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!("Removed abandoned staged file {}", self.path.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                "Failed to delete staged file {}: {}",
                self.path.display(),
                e
            ),
        }
    }
}
