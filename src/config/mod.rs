use std::env;
use std::path::PathBuf;

/// Runtime configuration for the item and image upload service
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Maximum request body size in bytes (default: 32 MB)
    pub max_file_size: usize,

    /// Directory used for staged uploads (default: <tmp>/item-image-staging)
    pub staging_dir: PathBuf,

    /// Timeout for a single remote store upload in seconds (default: 30)
    pub storage_timeout_secs: u64,

    /// Attempts for the versioned reference list write (default: 3)
    pub link_max_attempts: u32,

    /// Base URL used to build public image references.
    /// Falls back to the storage endpoint when unset.
    pub public_base_url: Option<String>,

    /// Interval between blob reconciliation runs in seconds (default: 3600)
    pub reconcile_interval_secs: u64,

    /// Minimum age of an unreferenced blob before it is deleted (default: 900)
    pub orphan_grace_secs: u64,

    /// Staging file cleanup age in hours (default: 24)
    pub staging_cleanup_age_hours: u64,

    /// Allowed CORS Origins (comma separated)
    pub allowed_origins: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            max_file_size: 32 * 1024 * 1024, // 32 MB
            staging_dir: env::temp_dir().join("item-image-staging"),
            storage_timeout_secs: 30,
            link_max_attempts: 3,
            public_base_url: None,
            reconcile_interval_secs: 3600,
            orphan_grace_secs: 900,
            staging_cleanup_age_hours: 24,
            allowed_origins: vec![
                "http://localhost:3000".to_string(),
                "http://localhost:5173".to_string(), // Vite default
                "http://127.0.0.1:3000".to_string(),
            ],
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            max_file_size: env::var("MAX_FILE_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_file_size),

            staging_dir: env::var("STAGING_DIR")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or(default.staging_dir),

            storage_timeout_secs: env::var("STORAGE_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|v| *v > 0)
                .unwrap_or(default.storage_timeout_secs),

            link_max_attempts: env::var("LINK_MAX_ATTEMPTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|v| *v > 0)
                .unwrap_or(default.link_max_attempts),

            public_base_url: env::var("PUBLIC_BASE_URL")
                .ok()
                .filter(|v| !v.trim().is_empty()),

            reconcile_interval_secs: env::var("RECONCILE_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|v| *v > 0)
                .unwrap_or(default.reconcile_interval_secs),

            orphan_grace_secs: env::var("ORPHAN_GRACE_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.orphan_grace_secs),

            staging_cleanup_age_hours: env::var("STAGING_CLEANUP_AGE_HOURS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.staging_cleanup_age_hours),

            allowed_origins: env::var("ALLOWED_ORIGINS")
                .ok()
                .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or(default.allowed_origins),
        }
    }

    /// Create config for development (short reconcile loop, local staging dir)
    pub fn development() -> Self {
        Self {
            staging_dir: PathBuf::from("./data/staging"),
            reconcile_interval_secs: 60,
            orphan_grace_secs: 60,
            ..Self::default()
        }
    }

    /// Create config for production (environment driven, strict origins)
    pub fn production() -> Self {
        let from_env = Self::from_env();
        Self {
            allowed_origins: env::var("ALLOWED_ORIGINS")
                .ok()
                .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or_default(),
            ..from_env
        }
    }
}
