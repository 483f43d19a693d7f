//! Configuration management for the ragline pipeline.
//!
//! Configuration is merged from three sources, lowest precedence first:
//! - Built-in defaults
//! - An optional YAML config file (`ragline.yaml` or `RAGLINE_CONFIG`)
//! - Environment variables (`RAGLINE_*`)
//!
//! CLI flags are applied last via [`AppConfig::with_overrides`].

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{AppError, AppResult};

/// Embedding providers this build knows how to construct.
pub const KNOWN_EMBED_PROVIDERS: &[&str] = &["trigram", "ollama"];

/// Main application configuration.
///
/// One value of this struct is constructed at startup and passed by
/// reference to every component; nothing reads configuration from globals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Optional config file path
    pub config_file: Option<PathBuf>,

    /// Embedding provider ("trigram" or "ollama")
    pub embed_provider: String,

    /// Embedding model identifier (used by the ollama provider)
    pub embed_model: String,

    /// Embedding vector dimension; must match the provider output
    pub embed_dimensions: usize,

    /// Base URL for the local Ollama API (embeddings and generation)
    pub ollama_url: String,

    /// Path of the persisted index file
    pub index_path: PathBuf,

    /// Path of the persisted metadata file
    pub meta_path: PathBuf,

    /// Default number of results per search
    pub top_k: usize,

    /// Query-time candidate list breadth
    pub ef: usize,

    /// Build-time candidate list breadth
    pub ef_construction: usize,

    /// Maximum bidirectional links per node per layer
    pub m: usize,

    /// Embedding cache capacity (entries)
    pub cache_capacity: usize,

    /// Per-topic bus channel capacity (messages retained for slow readers)
    pub bus_capacity: usize,

    /// Seconds a response record survives in the store
    pub response_ttl_secs: u64,

    /// Seconds a bookkeeping request record survives
    pub request_ttl_secs: u64,

    /// Milliseconds between response poll attempts
    pub poll_interval_ms: u64,

    /// Poll attempts before giving up
    pub max_poll_attempts: u32,

    /// Generation model identifier
    pub gen_model: String,

    /// Maximum tokens per generated answer
    pub gen_max_tokens: u32,

    /// Sampling temperature for generation
    pub gen_temperature: f32,

    /// Nucleus sampling parameter for generation
    pub gen_top_p: f32,

    /// Log level override
    pub log_level: Option<String>,

    /// Disable colored output
    pub no_color: bool,
}

/// Full configuration file structure.
#[derive(Debug, Clone, Default, Deserialize)]
struct ConfigFile {
    retrieval: Option<RetrievalSection>,
    bus: Option<BusSection>,
    generation: Option<GenerationSection>,
    logging: Option<LoggingSection>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RetrievalSection {
    embed_provider: Option<String>,
    embed_model: Option<String>,
    embed_dimensions: Option<usize>,
    ollama_url: Option<String>,
    index_path: Option<PathBuf>,
    meta_path: Option<PathBuf>,
    top_k: Option<usize>,
    ef: Option<usize>,
    ef_construction: Option<usize>,
    m: Option<usize>,
    cache_capacity: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct BusSection {
    capacity: Option<usize>,
    response_ttl_secs: Option<u64>,
    request_ttl_secs: Option<u64>,
    poll_interval_ms: Option<u64>,
    max_poll_attempts: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct GenerationSection {
    model: Option<String>,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
    top_p: Option<f32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct LoggingSection {
    level: Option<String>,
    color: Option<bool>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            config_file: None,
            embed_provider: "trigram".to_string(), // Local-first default
            embed_model: "nomic-embed-text".to_string(),
            embed_dimensions: 384,
            ollama_url: "http://localhost:11434".to_string(),
            index_path: PathBuf::from("index/ragline_index.bin"),
            meta_path: PathBuf::from("index/meta.json"),
            top_k: 5,
            ef: 64,
            ef_construction: 200,
            m: 16,
            cache_capacity: 2048,
            bus_capacity: 128,
            response_ttl_secs: 300,
            request_ttl_secs: 300,
            poll_interval_ms: 1000,
            max_poll_attempts: 60,
            gen_model: "mistral".to_string(),
            gen_max_tokens: 512,
            gen_temperature: 0.7,
            gen_top_p: 0.9,
            log_level: None,
            no_color: false,
        }
    }
}

/// Read and parse an environment variable, treating parse failures as
/// configuration errors rather than silently falling back.
fn env_parse<T: FromStr>(key: &str) -> AppResult<Option<T>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|_| AppError::Config(format!("Invalid value for {}: {:?}", key, raw))),
        Err(_) => Ok(None),
    }
}

impl AppConfig {
    /// Load configuration from defaults, the optional YAML file, and
    /// environment variables, in that order.
    ///
    /// Environment variables: `RAGLINE_CONFIG`, `RAGLINE_EMBED_PROVIDER`,
    /// `RAGLINE_EMBED_MODEL`, `RAGLINE_EMBED_DIMENSIONS`,
    /// `RAGLINE_OLLAMA_URL`, `RAGLINE_INDEX_PATH`, `RAGLINE_META_PATH`,
    /// `RAGLINE_TOP_K`, `RAGLINE_EF`, `RAGLINE_EF_CONSTRUCTION`,
    /// `RAGLINE_M`, `RAGLINE_CACHE_CAPACITY`, `RAGLINE_BUS_CAPACITY`,
    /// `RAGLINE_RESPONSE_TTL_SECS`, `RAGLINE_REQUEST_TTL_SECS`,
    /// `RAGLINE_POLL_INTERVAL_MS`, `RAGLINE_MAX_POLL_ATTEMPTS`,
    /// `RAGLINE_GEN_MODEL`, `RUST_LOG`, `NO_COLOR`.
    pub fn load() -> AppResult<Self> {
        Self::load_with_file(None)
    }

    /// Like [`load`](Self::load), with an explicit config file path taking
    /// precedence over `RAGLINE_CONFIG`.
    pub fn load_with_file(config_file: Option<PathBuf>) -> AppResult<Self> {
        let mut config = Self::default();

        config.config_file = config_file.or_else(|| {
            std::env::var("RAGLINE_CONFIG").ok().map(PathBuf::from)
        });

        // Merge the YAML file if one exists
        let config_path = config
            .config_file
            .clone()
            .unwrap_or_else(|| PathBuf::from("ragline.yaml"));

        if config_path.exists() {
            config = config.merge_yaml(&config_path)?;
        }

        // Environment variables override YAML
        if let Ok(provider) = std::env::var("RAGLINE_EMBED_PROVIDER") {
            config.embed_provider = provider;
        }
        if let Ok(model) = std::env::var("RAGLINE_EMBED_MODEL") {
            config.embed_model = model;
        }
        if let Some(dims) = env_parse("RAGLINE_EMBED_DIMENSIONS")? {
            config.embed_dimensions = dims;
        }
        if let Ok(url) = std::env::var("RAGLINE_OLLAMA_URL") {
            config.ollama_url = url;
        }
        if let Ok(path) = std::env::var("RAGLINE_INDEX_PATH") {
            config.index_path = PathBuf::from(path);
        }
        if let Ok(path) = std::env::var("RAGLINE_META_PATH") {
            config.meta_path = PathBuf::from(path);
        }
        if let Some(k) = env_parse("RAGLINE_TOP_K")? {
            config.top_k = k;
        }
        if let Some(ef) = env_parse("RAGLINE_EF")? {
            config.ef = ef;
        }
        if let Some(efc) = env_parse("RAGLINE_EF_CONSTRUCTION")? {
            config.ef_construction = efc;
        }
        if let Some(m) = env_parse("RAGLINE_M")? {
            config.m = m;
        }
        if let Some(cap) = env_parse("RAGLINE_CACHE_CAPACITY")? {
            config.cache_capacity = cap;
        }
        if let Some(cap) = env_parse("RAGLINE_BUS_CAPACITY")? {
            config.bus_capacity = cap;
        }
        if let Some(ttl) = env_parse("RAGLINE_RESPONSE_TTL_SECS")? {
            config.response_ttl_secs = ttl;
        }
        if let Some(ttl) = env_parse("RAGLINE_REQUEST_TTL_SECS")? {
            config.request_ttl_secs = ttl;
        }
        if let Some(interval) = env_parse("RAGLINE_POLL_INTERVAL_MS")? {
            config.poll_interval_ms = interval;
        }
        if let Some(attempts) = env_parse("RAGLINE_MAX_POLL_ATTEMPTS")? {
            config.max_poll_attempts = attempts;
        }
        if let Ok(model) = std::env::var("RAGLINE_GEN_MODEL") {
            config.gen_model = model;
        }

        config.log_level = std::env::var("RUST_LOG").ok().or(config.log_level);

        if std::env::var("NO_COLOR").is_ok() {
            config.no_color = true;
        }

        Ok(config)
    }

    /// Merge a YAML configuration file into this config.
    fn merge_yaml(&self, path: &PathBuf) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let file: ConfigFile = serde_yaml::from_str(&contents).map_err(|e| {
            AppError::Config(format!("Failed to parse config file {:?}: {}", path, e))
        })?;

        let mut result = self.clone();

        if let Some(retrieval) = file.retrieval {
            if let Some(v) = retrieval.embed_provider {
                result.embed_provider = v;
            }
            if let Some(v) = retrieval.embed_model {
                result.embed_model = v;
            }
            if let Some(v) = retrieval.embed_dimensions {
                result.embed_dimensions = v;
            }
            if let Some(v) = retrieval.ollama_url {
                result.ollama_url = v;
            }
            if let Some(v) = retrieval.index_path {
                result.index_path = v;
            }
            if let Some(v) = retrieval.meta_path {
                result.meta_path = v;
            }
            if let Some(v) = retrieval.top_k {
                result.top_k = v;
            }
            if let Some(v) = retrieval.ef {
                result.ef = v;
            }
            if let Some(v) = retrieval.ef_construction {
                result.ef_construction = v;
            }
            if let Some(v) = retrieval.m {
                result.m = v;
            }
            if let Some(v) = retrieval.cache_capacity {
                result.cache_capacity = v;
            }
        }

        if let Some(bus) = file.bus {
            if let Some(v) = bus.capacity {
                result.bus_capacity = v;
            }
            if let Some(v) = bus.response_ttl_secs {
                result.response_ttl_secs = v;
            }
            if let Some(v) = bus.request_ttl_secs {
                result.request_ttl_secs = v;
            }
            if let Some(v) = bus.poll_interval_ms {
                result.poll_interval_ms = v;
            }
            if let Some(v) = bus.max_poll_attempts {
                result.max_poll_attempts = v;
            }
        }

        if let Some(generation) = file.generation {
            if let Some(v) = generation.model {
                result.gen_model = v;
            }
            if let Some(v) = generation.max_tokens {
                result.gen_max_tokens = v;
            }
            if let Some(v) = generation.temperature {
                result.gen_temperature = v;
            }
            if let Some(v) = generation.top_p {
                result.gen_top_p = v;
            }
        }

        if let Some(logging) = file.logging {
            if let Some(level) = logging.level {
                result.log_level = Some(level);
            }
            if let Some(color) = logging.color {
                result.no_color = !color;
            }
        }

        Ok(result)
    }

    /// Apply CLI overrides, which take precedence over everything else.
    pub fn with_overrides(
        mut self,
        top_k: Option<usize>,
        log_level: Option<String>,
        verbose: bool,
        no_color: bool,
    ) -> Self {
        if let Some(top_k) = top_k {
            self.top_k = top_k;
        }

        if let Some(log_level) = log_level {
            self.log_level = Some(log_level);
        }

        if verbose && self.log_level.is_none() {
            self.log_level = Some("debug".to_string());
        }

        if no_color {
            self.no_color = true;
        }

        self
    }

    /// Pause between response poll attempts.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Lifetime of a stored response record.
    pub fn response_ttl(&self) -> Duration {
        Duration::from_secs(self.response_ttl_secs)
    }

    /// Lifetime of a bookkeeping request record.
    pub fn request_ttl(&self) -> Duration {
        Duration::from_secs(self.request_ttl_secs)
    }

    /// Validate configuration before any component is constructed.
    pub fn validate(&self) -> AppResult<()> {
        if !KNOWN_EMBED_PROVIDERS.contains(&self.embed_provider.as_str()) {
            return Err(AppError::Config(format!(
                "Unknown embedding provider: {}. Supported: {}",
                self.embed_provider,
                KNOWN_EMBED_PROVIDERS.join(", ")
            )));
        }

        if self.embed_dimensions == 0 {
            return Err(AppError::Config(
                "Embedding dimension must be non-zero".to_string(),
            ));
        }

        if self.m < 2 {
            return Err(AppError::Config(format!(
                "M must be at least 2, got {}",
                self.m
            )));
        }

        if self.ef == 0 || self.ef_construction == 0 {
            return Err(AppError::Config(
                "ef and ef_construction must be non-zero".to_string(),
            ));
        }

        if self.cache_capacity == 0 {
            return Err(AppError::Config(
                "Cache capacity must be non-zero".to_string(),
            ));
        }

        if self.max_poll_attempts == 0 {
            return Err(AppError::Config(
                "max_poll_attempts must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.embed_provider, "trigram");
        assert_eq!(config.top_k, 5);
        assert_eq!(config.ef, 64);
        assert_eq!(config.ef_construction, 200);
        assert_eq!(config.m, 16);
        assert_eq!(config.max_poll_attempts, 60);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_with_overrides() {
        let config = AppConfig::default().with_overrides(Some(3), None, true, true);

        assert_eq!(config.top_k, 3);
        assert_eq!(config.log_level, Some("debug".to_string()));
        assert!(config.no_color);
    }

    #[test]
    fn test_validate_unknown_provider() {
        let mut config = AppConfig::default();
        config.embed_provider = "sentencepiece".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_zero_dimension() {
        let mut config = AppConfig::default();
        config.embed_dimensions = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_merge_yaml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "retrieval:\n  top_k: 8\n  ef: 128\nbus:\n  response_ttl_secs: 60\nlogging:\n  level: warn\n  color: false"
        )
        .unwrap();

        let config = AppConfig::default()
            .merge_yaml(&file.path().to_path_buf())
            .unwrap();

        assert_eq!(config.top_k, 8);
        assert_eq!(config.ef, 128);
        assert_eq!(config.response_ttl_secs, 60);
        assert_eq!(config.log_level, Some("warn".to_string()));
        assert!(config.no_color);
        // Untouched sections keep their defaults
        assert_eq!(config.m, 16);
    }

    #[test]
    fn test_durations() {
        let config = AppConfig::default();
        assert_eq!(config.poll_interval(), Duration::from_millis(1000));
        assert_eq!(config.response_ttl(), Duration::from_secs(300));
    }
}
