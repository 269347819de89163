#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use chrono::{DateTime, Utc};
use http_body_util::BodyExt;
use item_image_backend::config::AppConfig;
use item_image_backend::entities::items;
use item_image_backend::infrastructure::database;
use item_image_backend::services::image_upload::ImageUploadService;
use item_image_backend::services::record_store::{RecordStore, SeaOrmRecordStore};
use item_image_backend::services::storage::{
    ObjectInfo, StorageService, object_url_for, parse_base_url,
};
use item_image_backend::{AppState, create_app};
use sea_orm::{ActiveModelTrait, ConnectOptions, Database, DatabaseConnection, EntityTrait, Set};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tempfile::TempDir;
use tower::ServiceExt;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

pub const BOUNDARY: &str = "---------------------------123456789012345678901234567";
pub const BUCKET: &str = "item-photos";

pub struct StoredObject {
    pub data: Vec<u8>,
    pub content_type: String,
    pub last_modified: DateTime<Utc>,
}

pub struct MockStorageService {
    pub files: Mutex<HashMap<String, StoredObject>>,
    pub fail_uploads: AtomicBool,
    pub upload_calls: AtomicUsize,
    base: url::Url,
}

impl MockStorageService {
    pub fn new() -> Self {
        Self {
            files: Mutex::new(HashMap::new()),
            fail_uploads: AtomicBool::new(false),
            upload_calls: AtomicUsize::new(0),
            base: parse_base_url("http://blobs.test").unwrap(),
        }
    }

    pub fn insert(&self, key: &str, data: &[u8], last_modified: DateTime<Utc>) {
        self.files.lock().unwrap().insert(
            key.to_string(),
            StoredObject {
                data: data.to_vec(),
                content_type: "image/jpeg".to_string(),
                last_modified,
            },
        );
    }

    /// Bytes behind a reference produced by `object_url`.
    pub fn resolve(&self, reference: &str) -> Option<Vec<u8>> {
        let prefix = format!("http://blobs.test/{}/", BUCKET);
        let key = reference.strip_prefix(&prefix)?;
        self.files.lock().unwrap().get(key).map(|o| o.data.clone())
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.files.lock().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl StorageService for MockStorageService {
    fn bucket(&self) -> &str {
        BUCKET
    }

    async fn upload_path(&self, key: &str, path: &Path, content_type: &str) -> anyhow::Result<()> {
        self.upload_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(anyhow::anyhow!("simulated storage outage"));
        }
        let data = tokio::fs::read(path).await?;
        self.files.lock().unwrap().insert(
            key.to_string(),
            StoredObject {
                data,
                content_type: content_type.to_string(),
                last_modified: Utc::now(),
            },
        );
        Ok(())
    }

    async fn delete_file(&self, key: &str) -> anyhow::Result<()> {
        self.files.lock().unwrap().remove(key);
        Ok(())
    }

    async fn list_objects(&self, prefix: &str) -> anyhow::Result<Vec<ObjectInfo>> {
        let files = self.files.lock().unwrap();
        Ok(files
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(k, o)| ObjectInfo {
                key: k.clone(),
                last_modified: Some(o.last_modified),
            })
            .collect())
    }

    fn object_url(&self, key: &str) -> String {
        object_url_for(&self.base, BUCKET, key)
    }

    async fn health_check(&self) -> bool {
        true
    }
}

pub struct TestApp {
    pub app: Router,
    pub db: DatabaseConnection,
    pub storage: Arc<MockStorageService>,
    pub records: Arc<dyn RecordStore>,
    pub config: AppConfig,
    pub staging: TempDir,
}

pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::new("item_image_backend=debug,tower_http=debug"))
        .with(fmt::layer().with_test_writer())
        .try_init();
}

pub async fn setup_test_db() -> DatabaseConnection {
    // Every pooled connection would get its own in-memory database
    let mut opt = ConnectOptions::new("sqlite::memory:");
    opt.max_connections(1).min_connections(1).sqlx_logging(false);
    let db = Database::connect(opt).await.unwrap();
    database::run_migrations(&db).await.unwrap();
    db
}

pub async fn spawn_app() -> TestApp {
    let db = setup_test_db().await;
    let records: Arc<dyn RecordStore> = Arc::new(SeaOrmRecordStore::new(db.clone()));
    spawn_app_with_records(db, records).await
}

/// Builds the app around a caller supplied record store (used to inject failures).
pub async fn spawn_app_with_records(
    db: DatabaseConnection,
    records: Arc<dyn RecordStore>,
) -> TestApp {
    init_tracing();

    let staging = tempfile::tempdir().unwrap();
    let config = AppConfig {
        staging_dir: staging.path().join("staging"),
        ..AppConfig::default()
    };
    let storage = Arc::new(MockStorageService::new());
    let uploads = Arc::new(ImageUploadService::new(
        records.clone(),
        storage.clone(),
        &config,
    ));

    let state = AppState {
        db: db.clone(),
        storage: storage.clone(),
        records: records.clone(),
        uploads,
        config: config.clone(),
    };

    TestApp {
        app: create_app(state),
        db,
        storage,
        records,
        config,
        staging,
    }
}

impl TestApp {
    pub fn staged_file_count(&self) -> usize {
        std::fs::read_dir(&self.config.staging_dir)
            .map(|d| d.count())
            .unwrap_or(0)
    }

    pub async fn photos_of(&self, id: &str) -> Vec<String> {
        items::Entity::find_by_id(id)
            .one(&self.db)
            .await
            .unwrap()
            .unwrap()
            .photos
            .0
    }

    pub async fn upload(&self, id: &str, filename: &str, content_type: &str, data: &[u8]) -> (StatusCode, Value) {
        let request = upload_request(id, multipart_body(filename, content_type, data));
        send(&self.app, request).await
    }
}

pub async fn insert_item(db: &DatabaseConnection, id: &str, created_on: DateTime<Utc>) {
    items::ActiveModel {
        id: Set(id.to_string()),
        name: Set(format!("item {id}")),
        description: Set(None),
        cover: Set(None),
        visible_to: Set(items::StringList::default()),
        assigned_to: Set(items::StringList::default()),
        int_users: Set(items::StringList::default()),
        photos: Set(items::StringList::default()),
        created_on: Set(created_on),
        version: Set(0),
    }
    .insert(db)
    .await
    .unwrap();
}

pub fn multipart_body(filename: &str, content_type: &str, data: &[u8]) -> Vec<u8> {
    let mut body = format!(
        "--{BOUNDARY}\r\n\
        Content-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n\
        Content-Type: {content_type}\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub fn upload_request(id: &str, body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(format!("/items/{id}/image"))
        .header(
            "Content-Type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

pub async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

/// Fake JPEG payload of `len` bytes.
pub fn jpeg_bytes(len: usize) -> Vec<u8> {
    let mut data = vec![0xFF, 0xD8, 0xFF, 0xE0];
    data.extend((0..len.saturating_sub(4)).map(|i| (i % 251) as u8));
    data
}
