//! Runtime configuration for tiercache.
//!
//! Configuration can be loaded from a JSON file or constructed
//! programmatically. All cache knobs (hot-store budgets, warm bucket,
//! per-dataset staleness windows) live here.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use serde::{Deserialize, Serialize};

/// Command-line arguments.
#[derive(Parser, Debug, Clone)]
#[command(name = "tiercache", about = "Tiered query-result cache server")]
pub struct Cli {
    /// Path to configuration file (JSON).
    #[arg(short, long, default_value = "config.json")]
    pub config: PathBuf,

    /// HTTP listen address.
    #[arg(long, default_value = "0.0.0.0:8080")]
    pub listen: String,

    /// Enable verbose logging.
    #[arg(short, long)]
    pub verbose: bool,
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server settings.
    pub server: ServerConfig,

    /// Cold store (warehouse) settings.
    pub warehouse: WarehouseConfig,

    /// Warm store (object storage) settings.
    pub warm: WarmConfig,

    /// Hot store (process memory) settings.
    pub hot: HotConfig,

    /// Freshness policy settings.
    pub freshness: FreshnessConfig,
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address (e.g. "0.0.0.0:8080").
    pub listen: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Warehouse client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WarehouseConfig {
    /// Base URL of the warehouse query endpoint.
    pub endpoint: String,

    /// Per-query timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:9090".to_string(),
            request_timeout_secs: 120,
        }
    }
}

/// Warm store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WarmConfig {
    /// Bucket root for cached result blobs. A filesystem path here; an
    /// object-store mount or bucket identifier in deployment.
    pub bucket_path: PathBuf,

    /// zstd compression level for warm blobs (1-22).
    pub zstd_level: i32,
}

impl Default for WarmConfig {
    fn default() -> Self {
        Self {
            bucket_path: PathBuf::from("/tmp/tiercache"),
            zstd_level: 3,
        }
    }
}

/// Hot store budgets. Either bound set to 0 disables that bound.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HotConfig {
    /// Maximum resident entries.
    pub max_entries: usize,

    /// Maximum resident bytes (approximate payload sizing).
    pub max_bytes: usize,
}

impl Default for HotConfig {
    fn default() -> Self {
        Self {
            max_entries: 256,
            max_bytes: 512 * 1024 * 1024, // 512 MB
        }
    }
}

/// Freshness windows, in seconds, per dataset with a default.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FreshnessConfig {
    /// Default max staleness for datasets without an explicit entry.
    pub default_max_staleness_secs: u64,

    /// Per-dataset overrides.
    pub max_staleness_per_dataset: HashMap<String, u64>,
}

impl Default for FreshnessConfig {
    fn default() -> Self {
        Self {
            default_max_staleness_secs: 1800, // 30 minutes
            max_staleness_per_dataset: HashMap::new(),
        }
    }
}

impl FreshnessConfig {
    /// The max-staleness window for a dataset.
    pub fn max_staleness(&self, dataset: &str) -> Duration {
        let secs = self
            .max_staleness_per_dataset
            .get(dataset)
            .copied()
            .unwrap_or(self.default_max_staleness_secs);
        Duration::from_secs(secs)
    }
}

impl Config {
    /// Load configuration from a JSON file, falling back to defaults for
    /// missing fields or a missing file.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if path.exists() {
            let data = std::fs::read_to_string(path)?;
            let config: Config = serde_json::from_str(&data)?;
            Ok(config)
        } else {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            Ok(Config::default())
        }
    }
}
