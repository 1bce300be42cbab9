//! Engine configuration.
//!
//! Configuration is a TOML document with one table per concern:
//!
//! ```toml
//! profile = "dev"
//!
//! [general]
//! version = "0.1.0"
//! log_level = "debug"
//! log_json = false
//!
//! [schema]
//! schema_paths = ["schemas/v1.json", "schemas/v2.json"]
//! model_type = "dynamic"
//!
//! [serializer]
//! source_of_truth = "inventory"
//! version_check = true
//!
//! [retry]
//! max_attempts = 3
//! initial_backoff_ms = 50
//! ```
//!
//! Every value can be overridden from the environment with an
//! `INVENTORY_`-prefixed variable; see [`EngineConfig::merge_env_vars`].

use crate::error::{InventoryError, Result};
use crate::introspection::ModelType;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// The current configuration version
pub const CONFIG_VERSION: &str = "0.1.0";

/// Environment variable prefix for all overrides
pub const ENV_PREFIX: &str = "INVENTORY_";

pub const ENV_CONFIG_PROFILE: &str = "INVENTORY_CONFIG_PROFILE";
pub const ENV_LOG_LEVEL: &str = "INVENTORY_LOG_LEVEL";
pub const ENV_LOG_JSON: &str = "INVENTORY_LOG_JSON";
pub const ENV_SCHEMA_VERSION: &str = "INVENTORY_SCHEMA_VERSION";
pub const ENV_SCHEMA_PATHS: &str = "INVENTORY_SCHEMA_PATHS";
pub const ENV_MODEL_TYPE: &str = "INVENTORY_MODEL_TYPE";
pub const ENV_SOURCE_OF_TRUTH: &str = "INVENTORY_SOURCE_OF_TRUTH";
pub const ENV_VERSION_CHECK: &str = "INVENTORY_VERSION_CHECK";
pub const ENV_RETRY_MAX_ATTEMPTS: &str = "INVENTORY_RETRY_MAX_ATTEMPTS";

/// Depth value meaning "no limit" for hydration
pub const UNBOUNDED_DEPTH: u32 = u32::MAX;

/// Configuration profile enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigProfile {
    /// Verbose logging
    #[default]
    Dev,
    /// Strict version checks, info logging
    Prod,
    /// Minimal logging and fast retries for automated tests
    Test,
}

impl ConfigProfile {
    /// Get profile from environment variable or default to Dev
    pub fn from_env() -> Self {
        std::env::var(ENV_CONFIG_PROFILE)
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(Self::Dev)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dev => "dev",
            Self::Prod => "prod",
            Self::Test => "test",
        }
    }
}

impl std::str::FromStr for ConfigProfile {
    type Err = InventoryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "dev" | "development" => Ok(Self::Dev),
            "prod" | "production" => Ok(Self::Prod),
            "test" | "testing" => Ok(Self::Test),
            _ => Err(InventoryError::config(format!(
                "Invalid config profile '{}'. Must be one of: dev, prod, test",
                s
            ))),
        }
    }
}

impl std::fmt::Display for ConfigProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// General settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub version: String,
    /// trace, debug, info, warn, error
    pub log_level: String,
    /// Emit JSON log lines instead of plain text
    pub log_json: bool,
}

/// Where schema documents come from and how objects are represented
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaConfig {
    /// Version used when a request names none; the latest loaded otherwise
    pub default_version: Option<String>,
    /// Schema documents, oldest first. Empty means the bundled fixtures.
    pub schema_paths: Vec<PathBuf>,
    /// Segment(s) ahead of the version in request paths and links, e.g.
    /// `/aai` for `/aai/v1/...`
    pub namespace_prefix: Option<String>,
    pub model_type: ModelType,
}

/// Serializer behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SerializerConfig {
    /// Attribution stamped on created and modified vertices
    pub source_of_truth: String,
    /// Enforce resource-version tokens on create/update/delete
    pub version_check: bool,
    /// Hydration depth used when a read names none
    pub default_depth: u32,
    /// Delete damaged neighbours found while hydrating
    pub cleanup_damaged_vertices: bool,
    /// Fill missing required properties from schema defaults on write
    pub apply_defaults: bool,
}

/// Retry policy for transient storage conflicts
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub multiplier: f64,
}

impl RetryConfig {
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION.to_string(),
            log_level: "info".to_string(),
            log_json: false,
        }
    }
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            default_version: None,
            schema_paths: Vec::new(),
            namespace_prefix: None,
            model_type: ModelType::Dynamic,
        }
    }
}

impl Default for SerializerConfig {
    fn default() -> Self {
        Self {
            source_of_truth: "inventory".to_string(),
            version_check: true,
            default_depth: 1,
            cleanup_damaged_vertices: false,
            apply_defaults: true,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 50,
            max_backoff_ms: 5000,
            multiplier: 1.5,
        }
    }
}

/// Main engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    general: GeneralConfig,
    #[serde(default)]
    schema: SchemaConfig,
    #[serde(default)]
    serializer: SerializerConfig,
    #[serde(default)]
    retry: RetryConfig,
    #[serde(default)]
    profile: ConfigProfile,
}

impl EngineConfig {
    /// Create a new configuration with the specified profile
    pub fn with_profile(profile: ConfigProfile) -> Self {
        let mut config = match profile {
            ConfigProfile::Dev => Self::dev_defaults(),
            ConfigProfile::Prod => Self::prod_defaults(),
            ConfigProfile::Test => Self::test_defaults(),
        };
        config.profile = profile;
        config
    }

    fn dev_defaults() -> Self {
        let mut config = Self::default();
        config.general.log_level = "debug".to_string();
        config
    }

    fn prod_defaults() -> Self {
        let mut config = Self::default();
        config.general.log_level = "info".to_string();
        config.general.log_json = true;
        config.serializer.version_check = true;
        config.serializer.cleanup_damaged_vertices = true;
        config.retry.max_attempts = 5;
        config
    }

    fn test_defaults() -> Self {
        let mut config = Self::default();
        config.general.log_level = "warn".to_string();
        config.serializer.source_of_truth = "test".to_string();
        config.retry.initial_backoff_ms = 1;
        config.retry.max_backoff_ms = 10;
        config
    }

    pub fn profile(&self) -> ConfigProfile {
        self.profile
    }

    pub fn set_profile(&mut self, profile: ConfigProfile) {
        self.profile = profile;
    }

    pub fn general(&self) -> &GeneralConfig {
        &self.general
    }

    pub fn general_mut(&mut self) -> &mut GeneralConfig {
        &mut self.general
    }

    pub fn schema(&self) -> &SchemaConfig {
        &self.schema
    }

    pub fn schema_mut(&mut self) -> &mut SchemaConfig {
        &mut self.schema
    }

    pub fn serializer(&self) -> &SerializerConfig {
        &self.serializer
    }

    pub fn serializer_mut(&mut self) -> &mut SerializerConfig {
        &mut self.serializer
    }

    pub fn retry(&self) -> &RetryConfig {
        &self.retry
    }

    pub fn retry_mut(&mut self) -> &mut RetryConfig {
        &mut self.retry
    }
}

impl EngineConfig {
    /// Load configuration from a specific path
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if the
    /// result fails validation
    pub async fn load_from_path(path: &Path) -> Result<Self> {
        debug!("Loading configuration from: {}", path.display());

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| InventoryError::config(format!("Failed to read config file: {}", e)))?;

        let mut config: Self = toml::from_str(&content)
            .map_err(|e| InventoryError::config(format!("Failed to parse config file: {}", e)))?;

        config.merge_env_vars()?;
        config.validate()?;

        info!("Configuration loaded successfully from {}", path.display());
        Ok(config)
    }

    /// Save configuration to a specific path atomically
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or cannot be written
    pub async fn save_to_path(&self, path: &Path) -> Result<()> {
        debug!("Saving configuration to: {}", path.display());

        self.validate()?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    InventoryError::config(format!("Failed to create config directory: {}", e))
                })?;
            }
        }

        let content = self.export_toml()?;

        // Write to a sibling temp file, then rename over the target
        let temp_path = path.with_extension("toml.tmp");

        tokio::fs::write(&temp_path, content)
            .await
            .map_err(|e| InventoryError::config(format!("Failed to write config file: {}", e)))?;

        tokio::fs::rename(&temp_path, path)
            .await
            .map_err(|e| InventoryError::config(format!("Failed to rename config file: {}", e)))?;

        info!("Configuration saved successfully to {}", path.display());
        Ok(())
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid
    pub fn validate(&self) -> Result<()> {
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.general.log_level.as_str()) {
            return Err(InventoryError::config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.general.log_level,
                valid_log_levels.join(", ")
            )));
        }

        if self.serializer.source_of_truth.trim().is_empty() {
            return Err(InventoryError::config("source_of_truth must not be empty"));
        }

        if let Some(prefix) = &self.schema.namespace_prefix {
            if !prefix.is_empty() && !prefix.starts_with('/') {
                return Err(InventoryError::config(format!(
                    "namespace_prefix '{}' must start with '/'",
                    prefix
                )));
            }
        }

        if self.retry.max_attempts == 0 {
            return Err(InventoryError::config("max_attempts must be greater than 0"));
        }

        if self.retry.initial_backoff_ms > self.retry.max_backoff_ms {
            return Err(InventoryError::config(
                "initial_backoff_ms cannot be greater than max_backoff_ms",
            ));
        }

        if self.retry.multiplier.is_nan() || self.retry.multiplier < 1.0 {
            return Err(InventoryError::config("multiplier must be at least 1.0"));
        }

        if !self.serializer.version_check {
            warn!("Resource version checking is disabled");
        }

        debug!("Configuration validation passed");
        Ok(())
    }

    /// Merge environment variable overrides into the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if environment variables contain invalid values
    pub fn merge_env_vars(&mut self) -> Result<()> {
        debug!("Merging environment variable overrides");

        if let Ok(log_level) = std::env::var(ENV_LOG_LEVEL) {
            debug!("Overriding log_level from environment: {}", log_level);
            self.general.log_level = log_level;
        }

        if let Ok(log_json) = std::env::var(ENV_LOG_JSON) {
            self.general.log_json = parse_bool(ENV_LOG_JSON, &log_json)?;
        }

        if let Ok(version) = std::env::var(ENV_SCHEMA_VERSION) {
            debug!("Overriding default schema version from environment: {}", version);
            self.schema.default_version = Some(version);
        }

        if let Ok(paths) = std::env::var(ENV_SCHEMA_PATHS) {
            self.schema.schema_paths = paths
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(PathBuf::from)
                .collect();
        }

        if let Ok(model_type) = std::env::var(ENV_MODEL_TYPE) {
            self.schema.model_type = model_type.parse()?;
        }

        if let Ok(source) = std::env::var(ENV_SOURCE_OF_TRUTH) {
            debug!("Overriding source_of_truth from environment: {}", source);
            self.serializer.source_of_truth = source;
        }

        if let Ok(check) = std::env::var(ENV_VERSION_CHECK) {
            self.serializer.version_check = parse_bool(ENV_VERSION_CHECK, &check)?;
        }

        if let Ok(attempts) = std::env::var(ENV_RETRY_MAX_ATTEMPTS) {
            let attempts = attempts.parse::<u32>().map_err(|e| {
                InventoryError::config(format!("Invalid retry attempts in environment: {}", e))
            })?;
            debug!("Overriding retry max_attempts from environment: {}", attempts);
            self.retry.max_attempts = attempts;
        }

        Ok(())
    }

    /// Export configuration to a TOML string
    pub fn export_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| InventoryError::config(format!("Failed to export config to TOML: {}", e)))
    }

    /// Import configuration from a TOML string
    ///
    /// # Errors
    ///
    /// Returns an error if deserialization or validation fails
    pub fn import_toml(toml_str: &str) -> Result<Self> {
        let config: Self = toml::from_str(toml_str)
            .map_err(|e| InventoryError::config(format!("Failed to import config from TOML: {}", e)))?;

        config.validate()?;
        Ok(config)
    }
}

fn parse_bool(var: &str, value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(InventoryError::config(format!(
            "Invalid boolean '{}' in {}",
            other, var
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use tempfile::TempDir;

    fn create_temp_config_env() -> (TempDir, PathBuf) {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        (temp_dir, config_path)
    }

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.general().version, CONFIG_VERSION);
        assert_eq!(config.general().log_level, "info");
        assert!(config.serializer().version_check);
        assert_eq!(config.retry().max_attempts, 3);
        assert_eq!(config.retry().initial_backoff(), Duration::from_millis(50));
        assert_eq!(config.schema().model_type, ModelType::Dynamic);
    }

    #[test]
    fn test_profiles() {
        let test = EngineConfig::with_profile(ConfigProfile::Test);
        assert_eq!(test.profile(), ConfigProfile::Test);
        assert_eq!(test.general().log_level, "warn");
        assert_eq!(test.retry().initial_backoff_ms, 1);

        let prod = EngineConfig::with_profile(ConfigProfile::Prod);
        assert!(prod.general().log_json);
        assert!(prod.serializer().cleanup_damaged_vertices);

        assert_eq!("production".parse::<ConfigProfile>().unwrap(), ConfigProfile::Prod);
        assert!("staging".parse::<ConfigProfile>().is_err());
        assert_eq!(ConfigProfile::Test.to_string(), "test");
    }

    #[test]
    fn test_config_validation() {
        let mut config = EngineConfig::default();
        assert!(config.validate().is_ok());

        config.general_mut().log_level = "loud".to_string();
        assert!(config.validate().is_err());
        config.general_mut().log_level = "info".to_string();

        config.retry_mut().max_attempts = 0;
        assert!(config.validate().is_err());
        config.retry_mut().max_attempts = 3;

        config.retry_mut().initial_backoff_ms = 10_000;
        assert!(config.validate().is_err());
        config.retry_mut().initial_backoff_ms = 50;

        config.retry_mut().multiplier = 0.5;
        assert!(config.validate().is_err());
        config.retry_mut().multiplier = 2.0;

        config.schema_mut().namespace_prefix = Some("aai".to_string());
        assert!(config.validate().is_err());
        config.schema_mut().namespace_prefix = Some("/aai".to_string());
        assert!(config.validate().is_ok());
    }

    #[tokio::test]
    async fn test_save_and_load_config() {
        let (_temp_dir, config_path) = create_temp_config_env();

        let mut config = EngineConfig::default();
        config.general_mut().log_level = "debug".to_string();
        config.serializer_mut().default_depth = 4;
        config.schema_mut().schema_paths = vec![PathBuf::from("schemas/v1.json")];

        config.save_to_path(&config_path).await.unwrap();
        assert!(config_path.exists());
        assert!(!config_path.with_extension("toml.tmp").exists());

        let loaded = EngineConfig::load_from_path(&config_path).await.unwrap();
        assert_eq!(loaded.general().log_level, "debug");
        assert_eq!(loaded.serializer().default_depth, 4);
        assert_eq!(loaded.schema().schema_paths, vec![PathBuf::from("schemas/v1.json")]);
    }

    #[tokio::test]
    async fn test_load_missing_file_is_config_error() {
        let (_temp_dir, config_path) = create_temp_config_env();
        let err = EngineConfig::load_from_path(&config_path).await.unwrap_err();
        assert!(matches!(err, InventoryError::Config(_)));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = EngineConfig::import_toml(
            "profile = \"test\"\n[retry]\nmax_attempts = 7\n",
        )
        .unwrap();
        assert_eq!(config.profile(), ConfigProfile::Test);
        assert_eq!(config.retry().max_attempts, 7);
        assert_eq!(config.retry().max_backoff_ms, 5000);
        assert_eq!(config.serializer().source_of_truth, "inventory");
    }

    #[test]
    fn test_env_var_overrides() {
        let mut config = EngineConfig::default();

        unsafe {
            env::set_var(ENV_SOURCE_OF_TRUTH, "env-loader");
            env::set_var(ENV_SCHEMA_PATHS, "a.json, b.json");
            env::set_var(ENV_RETRY_MAX_ATTEMPTS, "9");
        }

        config.merge_env_vars().unwrap();

        assert_eq!(config.serializer().source_of_truth, "env-loader");
        assert_eq!(
            config.schema().schema_paths,
            vec![PathBuf::from("a.json"), PathBuf::from("b.json")]
        );
        assert_eq!(config.retry().max_attempts, 9);

        unsafe {
            env::remove_var(ENV_SOURCE_OF_TRUTH);
            env::remove_var(ENV_SCHEMA_PATHS);
            env::remove_var(ENV_RETRY_MAX_ATTEMPTS);
        }
    }

    #[test]
    fn test_invalid_env_var() {
        let mut config = EngineConfig::default();

        unsafe {
            env::set_var(ENV_VERSION_CHECK, "sometimes");
        }

        let result = config.merge_env_vars();
        assert!(result.is_err());

        unsafe {
            env::remove_var(ENV_VERSION_CHECK);
        }
    }

    #[test]
    fn test_toml_round_trip() {
        let config = EngineConfig::with_profile(ConfigProfile::Prod);
        let exported = config.export_toml().unwrap();
        let imported = EngineConfig::import_toml(&exported).unwrap();
        assert_eq!(imported.profile(), ConfigProfile::Prod);
        assert_eq!(imported.retry().max_attempts, 5);
    }
}
