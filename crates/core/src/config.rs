//! Configuration management for bulkstore

use crate::error::{Error, Result};
use dirs::home_dir;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration directory name
const CONFIG_DIR: &str = "bulkstore";

/// Configuration file name
const CONFIG_FILE: &str = "config.toml";

/// Smallest part size S3 accepts for all but the last part of a multipart upload
pub const MIN_MULTIPART_CHUNK_MB: usize = 5;

/// Longest lifetime a presigned URL may have (7 days)
pub const MAX_PRESIGN_EXPIRATION_SECS: u64 = 604_800;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigFile {
    pub storage: StorageConfig,
    #[serde(default)]
    pub transfer: TransferConfig,
    #[serde(default)]
    pub presign: PresignConfig,
    pub logging: Option<LoggingConfig>,
}

/// Storage endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Custom endpoint for S3-compatible stores; AWS when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    #[serde(default = "default_region")]
    pub region: String,

    /// Static keys; the SDK's default provider chain is used when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_key_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_access_key: Option<String>,

    #[serde(default)]
    pub force_path_style: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_bucket: Option<String>,
}

/// Transfer and polling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Files at or above this size (MB) are uploaded in parts
    #[serde(default = "default_multipart_threshold")]
    pub multipart_threshold_mb: usize,
    /// Multipart upload chunk size in MB
    #[serde(default = "default_multipart_chunk_size")]
    pub multipart_chunk_size_mb: usize,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            timeout_secs: default_timeout_secs(),
            multipart_threshold_mb: default_multipart_threshold(),
            multipart_chunk_size_mb: default_multipart_chunk_size(),
        }
    }
}

impl TransferConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn multipart_threshold_bytes(&self) -> u64 {
        self.multipart_threshold_mb as u64 * 1024 * 1024
    }

    pub fn multipart_chunk_bytes(&self) -> usize {
        self.multipart_chunk_size_mb * 1024 * 1024
    }
}

/// Presigned URL configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresignConfig {
    #[serde(default = "default_expiration")]
    pub default_expiration: u64,
}

impl Default for PresignConfig {
    fn default() -> Self {
        Self {
            default_expiration: default_expiration(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

// Default values
fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_poll_interval_ms() -> u64 {
    250
}

fn default_timeout_secs() -> u64 {
    3600
}

fn default_multipart_threshold() -> usize {
    16
}

fn default_multipart_chunk_size() -> usize {
    8
}

fn default_expiration() -> u64 {
    600 // 10 minutes
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

/// Get the configuration directory
pub fn get_config_dir() -> Result<PathBuf> {
    let home = home_dir()
        .ok_or_else(|| Error::Config("Cannot determine home directory".to_string()))?;
    let config_dir = home.join(".config").join(CONFIG_DIR);

    if !config_dir.exists() {
        fs::create_dir_all(&config_dir)
            .map_err(|e| Error::Config(format!("Failed to create config directory: {}", e)))?;
    }

    Ok(config_dir)
}

/// Get the configuration file path
pub fn get_config_path() -> Result<PathBuf> {
    Ok(get_config_dir()?.join(CONFIG_FILE))
}

/// Load configuration from the default location
pub fn load_config() -> Result<ConfigFile> {
    load_config_from(&get_config_path()?)
}

/// Load configuration from a specific file
pub fn load_config_from(path: &Path) -> Result<ConfigFile> {
    if !path.exists() {
        return Err(Error::ConfigNotFound(path.to_path_buf()));
    }

    let content = fs::read_to_string(path)
        .map_err(|e| Error::InvalidConfig(format!("Failed to read config file: {}", e)))?;

    toml::from_str(&content)
        .map_err(|e| Error::InvalidConfig(format!("Failed to parse config file: {}", e)))
}

/// Save configuration to the default location
pub fn save_config(config: &ConfigFile) -> Result<()> {
    save_config_to(config, &get_config_path()?)
}

/// Save configuration to a specific file
pub fn save_config_to(config: &ConfigFile, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)?;

    fs::write(path, content)
        .map_err(|e| Error::Config(format!("Failed to write config file: {}", e)))?;

    // May hold secret keys: owner read/write only
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = fs::metadata(path)?.permissions();
        perms.set_mode(0o600);
        fs::set_permissions(path, perms)?;
    }

    Ok(())
}

/// Validate configuration
pub fn validate_config(config: &ConfigFile) -> Result<()> {
    if config.storage.region.trim().is_empty() {
        return Err(Error::InvalidInput("Region cannot be empty".to_string()));
    }

    if config.storage.access_key_id.is_some() != config.storage.secret_access_key.is_some() {
        return Err(Error::Config(
            "access_key_id and secret_access_key must be set together".to_string(),
        ));
    }

    if let Some(endpoint) = &config.storage.endpoint {
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            return Err(Error::InvalidInput(format!(
                "Endpoint must be an http(s) URL, got '{}'",
                endpoint
            )));
        }
    }

    if matches!(&config.storage.default_bucket, Some(b) if b.is_empty()) {
        return Err(Error::InvalidInput("Bucket name cannot be empty".to_string()));
    }

    if config.transfer.poll_interval_ms == 0 {
        return Err(Error::InvalidInput(
            "poll_interval_ms must be greater than zero".to_string(),
        ));
    }

    if config.transfer.multipart_chunk_size_mb < MIN_MULTIPART_CHUNK_MB {
        return Err(Error::InvalidInput(format!(
            "multipart_chunk_size_mb must be at least {} (got {})",
            MIN_MULTIPART_CHUNK_MB, config.transfer.multipart_chunk_size_mb
        )));
    }

    if config.presign.default_expiration == 0
        || config.presign.default_expiration > MAX_PRESIGN_EXPIRATION_SECS
    {
        return Err(Error::InvalidInput(
            "Default expiration must be between 1 second and 7 days (604800 seconds)".to_string(),
        ));
    }

    Ok(())
}

/// Check if configuration exists
pub fn config_exists() -> bool {
    get_config_path().map(|p| p.exists()).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn make_valid_config() -> ConfigFile {
        ConfigFile {
            storage: StorageConfig {
                endpoint: Some("http://localhost:9000".to_string()),
                region: "us-east-1".to_string(),
                access_key_id: None,
                secret_access_key: None,
                force_path_style: true,
                default_bucket: Some("test-bucket".to_string()),
            },
            transfer: TransferConfig::default(),
            presign: PresignConfig::default(),
            logging: None,
        }
    }

    #[test]
    fn test_validate_config_valid() {
        let config = make_valid_config();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_config_half_keys() {
        let mut config = make_valid_config();
        config.storage.access_key_id = Some("AKIAEXAMPLE".to_string());
        assert!(validate_config(&config).is_err());

        config.storage.secret_access_key = Some("secret".to_string());
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_config_bad_endpoint() {
        let mut config = make_valid_config();
        config.storage.endpoint = Some("localhost:9000".to_string());
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_config_empty_bucket() {
        let mut config = make_valid_config();
        config.storage.default_bucket = Some("".to_string());
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_config_zero_poll_interval() {
        let mut config = make_valid_config();
        config.transfer.poll_interval_ms = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_config_small_chunk() {
        let mut config = make_valid_config();
        config.transfer.multipart_chunk_size_mb = 4;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_config_expiration_boundary() {
        let mut config = make_valid_config();
        config.presign.default_expiration = 604800;
        assert!(validate_config(&config).is_ok());

        config.presign.default_expiration = 604801;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_minimal_file_uses_defaults() {
        let config: ConfigFile = toml::from_str("[storage]\n").unwrap();
        assert_eq!(config.storage.region, "us-east-1");
        assert_eq!(config.transfer.poll_interval(), Duration::from_millis(250));
        assert_eq!(config.transfer.multipart_chunk_bytes(), 8 * 1024 * 1024);
        assert_eq!(config.presign.default_expiration, 600);
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = make_valid_config();
        config.transfer.timeout_secs = 42;
        save_config_to(&config, &path).unwrap();

        let loaded = load_config_from(&path).unwrap();
        assert_eq!(loaded.transfer.timeout(), Duration::from_secs(42));
        assert_eq!(loaded.storage.default_bucket.as_deref(), Some("test-bucket"));

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn test_load_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = load_config_from(&dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(err, Error::ConfigNotFound(_)));
    }

    #[test]
    fn test_load_malformed_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "storage = 12").unwrap();
        let err = load_config_from(&path).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }
}
