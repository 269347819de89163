use anyhow::{Result, anyhow};
use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::primitives::ByteStream;
use chrono::{DateTime, Utc};
use std::path::Path;
use url::Url;

/// Listing entry for a stored blob.
#[derive(Debug, Clone)]
pub struct ObjectInfo {
    pub key: String,
    pub last_modified: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait StorageService: Send + Sync {
    fn bucket(&self) -> &str;
    /// Streams a local file into the bucket under `key`.
    async fn upload_path(&self, key: &str, path: &Path, content_type: &str) -> Result<()>;
    async fn delete_file(&self, key: &str) -> Result<()>;
    async fn list_objects(&self, prefix: &str) -> Result<Vec<ObjectInfo>>;
    /// Publicly resolvable reference for `key`.
    fn object_url(&self, key: &str) -> String;
    async fn health_check(&self) -> bool;
}

/// Builds `{base}/{bucket}/{key}` with each segment percent-encoded.
pub fn object_url_for(base: &Url, bucket: &str, key: &str) -> String {
    let mut url = base.clone();
    if let Ok(mut segments) = url.path_segments_mut() {
        segments.pop_if_empty().push(bucket).push(key);
    }
    url.to_string()
}

/// Parses a base URL suitable for [`object_url_for`].
pub fn parse_base_url(base_url: &str) -> Result<Url> {
    let url = Url::parse(base_url)?;
    if url.cannot_be_a_base() {
        return Err(anyhow!("'{}' cannot be used as a base url", base_url));
    }
    Ok(url)
}

pub struct S3StorageService {
    client: Client,
    bucket: String,
    public_base: Url,
}

impl S3StorageService {
    pub fn new(client: Client, bucket: String, public_base_url: &str) -> Result<Self> {
        Ok(Self {
            client,
            bucket,
            public_base: parse_base_url(public_base_url)?,
        })
    }
}

#[async_trait]
impl StorageService for S3StorageService {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn upload_path(&self, key: &str, path: &Path, content_type: &str) -> Result<()> {
        let body = ByteStream::from_path(path).await?;
        let res = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(body)
            .send()
            .await;

        if let Err(e) = res {
            tracing::error!(
                "S3 put_object failed: bucket={}, key={}, error={:?}",
                self.bucket,
                key,
                e
            );
            return Err(e.into());
        }
        Ok(())
    }

    async fn delete_file(&self, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await?;
        Ok(())
    }

    async fn list_objects(&self, prefix: &str) -> Result<Vec<ObjectInfo>> {
        let mut objects = Vec::new();
        let mut continuation_token = None;

        loop {
            let res = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix)
                .set_continuation_token(continuation_token)
                .send()
                .await?;

            if let Some(contents) = res.contents {
                for object in contents {
                    if let Some(key) = object.key {
                        let last_modified = object.last_modified.and_then(|d| {
                            DateTime::from_timestamp(d.secs(), d.subsec_nanos())
                        });
                        objects.push(ObjectInfo {
                            key,
                            last_modified,
                        });
                    }
                }
            }

            if res.is_truncated.unwrap_or(false) {
                continuation_token = res.next_continuation_token;
            } else {
                break;
            }
        }

        Ok(objects)
    }

    fn object_url(&self, key: &str) -> String {
        object_url_for(&self.public_base, &self.bucket, key)
    }

    async fn health_check(&self) -> bool {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .is_ok()
    }
}
