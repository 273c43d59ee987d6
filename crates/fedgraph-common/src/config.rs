use serde::{Deserialize, Serialize};
use config::{Config, ConfigError, Environment, File};

// --- Constants for Default Configuration ---
pub const DEFAULT_SKIP_FAILED_FEDERATED_EXECUTION: bool = false;
pub const DEFAULT_FEDERATION_MAX_PARALLELISM: usize = 4;
pub const DEFAULT_FEDERATION_EXECUTION_TIMEOUT_MS: u64 = 0;
pub const DEFAULT_SCHEMA_CACHE_TTL_SECS: u64 = 60;
pub const DEFAULT_SCHEMA_CACHE_MAX_ENTRIES: u64 = 10_000;
pub const DEFAULT_CACHE_PATH: &str = "./data/cache";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FederationConfig {
    #[serde(default = "default_skip_failed")]
    pub skip_failed_federated_execution: bool,
    #[serde(default = "default_max_parallelism")]
    pub max_parallelism: usize,
    /// Graphs used when a request names none. Empty means "every enabled
    /// graph the user can read".
    #[serde(default)]
    pub default_graph_ids: Vec<String>,
    /// Holders of this op auth may read and modify every graph.
    #[serde(default)]
    pub admin_auth: Option<String>,
    /// Per-graph execution deadline; 0 disables it.
    #[serde(default = "default_execution_timeout_ms")]
    pub execution_timeout_ms: u64,
    #[serde(default = "default_schema_cache_ttl_secs")]
    pub schema_cache_ttl_secs: u64,
    #[serde(default = "default_schema_cache_max_entries")]
    pub schema_cache_max_entries: u64,
}

fn default_skip_failed() -> bool {
    DEFAULT_SKIP_FAILED_FEDERATED_EXECUTION
}

fn default_max_parallelism() -> usize {
    DEFAULT_FEDERATION_MAX_PARALLELISM
}

fn default_execution_timeout_ms() -> u64 {
    DEFAULT_FEDERATION_EXECUTION_TIMEOUT_MS
}

fn default_schema_cache_ttl_secs() -> u64 {
    DEFAULT_SCHEMA_CACHE_TTL_SECS
}

fn default_schema_cache_max_entries() -> u64 {
    DEFAULT_SCHEMA_CACHE_MAX_ENTRIES
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    Memory,
    Rocksdb,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub backend: CacheBackend,
    #[serde(default = "default_cache_path")]
    pub path: String,
}

fn default_cache_path() -> String {
    DEFAULT_CACHE_PATH.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub federation: FederationConfig,
    pub cache: CacheConfig,
}

impl Default for FederationConfig {
    fn default() -> Self {
        Self {
            skip_failed_federated_execution: DEFAULT_SKIP_FAILED_FEDERATED_EXECUTION,
            max_parallelism: DEFAULT_FEDERATION_MAX_PARALLELISM,
            default_graph_ids: Vec::new(),
            admin_auth: None,
            execution_timeout_ms: DEFAULT_FEDERATION_EXECUTION_TIMEOUT_MS,
            schema_cache_ttl_secs: DEFAULT_SCHEMA_CACHE_TTL_SECS,
            schema_cache_max_entries: DEFAULT_SCHEMA_CACHE_MAX_ENTRIES,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::Memory,
            path: DEFAULT_CACHE_PATH.into(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            federation: FederationConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl AppConfig {
    /// Loads defaults, then `fedgraph.toml` (optional), then
    /// `FEDGRAPH__SECTION__KEY` environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("fedgraph")
    }

    pub fn load_from(file_stem: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .set_default("federation.skip_failed_federated_execution", DEFAULT_SKIP_FAILED_FEDERATED_EXECUTION)?
            .set_default("federation.max_parallelism", DEFAULT_FEDERATION_MAX_PARALLELISM as i64)?
            .set_default("federation.default_graph_ids", Vec::<String>::new())?
            .set_default("federation.execution_timeout_ms", DEFAULT_FEDERATION_EXECUTION_TIMEOUT_MS)?
            .set_default("federation.schema_cache_ttl_secs", DEFAULT_SCHEMA_CACHE_TTL_SECS)?
            .set_default("federation.schema_cache_max_entries", DEFAULT_SCHEMA_CACHE_MAX_ENTRIES)?
            .set_default("cache.backend", "memory")?
            .set_default("cache.path", DEFAULT_CACHE_PATH)?
            .add_source(File::with_name(file_stem).required(false))
            // FEDGRAPH__FEDERATION__MAX_PARALLELISM=8 -> federation.max_parallelism=8
            .add_source(Environment::with_prefix("FEDGRAPH").separator("__"))
            .build()?;

        s.try_deserialize()
    }

    /// Parallelism actually used by the federation engine; never zero.
    pub fn effective_parallelism(&self) -> usize {
        self.federation.max_parallelism.max(1)
    }
}
