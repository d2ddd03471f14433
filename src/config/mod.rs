//! Configuration management
//!
//! Configuration is read from `config.yml` and may be overridden by
//! `SLIDEHUB_*` environment variables. Missing values fall back to defaults.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    /// Where slide files and derived images live
    #[serde(default)]
    pub media: MediaConfig,
    /// Deep Zoom pyramid parameters
    #[serde(default)]
    pub deepzoom: DeepZoomConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// CORS allowed origin (for cookie-based auth)
    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origin: default_cors_origin(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_cors_origin() -> String {
    "http://localhost:3000".to_string()
}

/// Database configuration (SQLite)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database file path, or `:memory:`
    #[serde(default = "default_database_url")]
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
        }
    }
}

fn default_database_url() -> String {
    "data/slidehub.db".to_string()
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Default entry TTL in seconds
    #[serde(default = "default_ttl")]
    pub ttl_seconds: u64,
    /// Maximum number of cached entries
    #[serde(default = "default_max_capacity")]
    pub max_capacity: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_ttl(),
            max_capacity: default_max_capacity(),
        }
    }
}

fn default_ttl() -> u64 {
    3600
}

fn default_max_capacity() -> u64 {
    10_000
}

/// Media storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    /// Media root. Slides go to `<root>/slides`, pyramids to `<root>/images/<id>`.
    #[serde(default = "default_media_root")]
    pub root: PathBuf,
    /// Maximum slide upload size in bytes
    #[serde(default = "default_max_upload_size")]
    pub max_upload_size: u64,
    /// Accepted slide file extensions (lowercase, no dot)
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            root: default_media_root(),
            max_upload_size: default_max_upload_size(),
            allowed_extensions: default_allowed_extensions(),
        }
    }
}

fn default_media_root() -> PathBuf {
    PathBuf::from("media")
}

fn default_max_upload_size() -> u64 {
    4 * 1024 * 1024 * 1024 // 4GB
}

fn default_allowed_extensions() -> Vec<String> {
    ["svs", "tif", "tiff", "ndpi", "png", "jpg", "jpeg"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl MediaConfig {
    /// Check whether a file name carries an accepted slide extension
    pub fn is_extension_allowed(&self, file_name: &str) -> bool {
        let ext = match std::path::Path::new(file_name).extension() {
            Some(ext) => ext.to_string_lossy().to_lowercase(),
            None => return false,
        };
        self.allowed_extensions.iter().any(|e| *e == ext)
    }
}

/// Tile image format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TileFormat {
    #[default]
    Jpeg,
    Png,
}

impl TileFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            TileFormat::Jpeg => "jpeg",
            TileFormat::Png => "png",
        }
    }

    /// Parse a tile extension as it appears in a tile URL
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "jpeg" => Some(TileFormat::Jpeg),
            "png" => Some(TileFormat::Png),
            _ => None,
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            TileFormat::Jpeg => "image/jpeg",
            TileFormat::Png => "image/png",
        }
    }
}

/// Deep Zoom generation parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeepZoomConfig {
    /// Tile edge length in pixels, excluding overlap
    #[serde(default = "default_tile_size")]
    pub tile_size: u32,
    /// Pixels of overlap on each interior tile edge
    #[serde(default = "default_overlap")]
    pub overlap: u32,
    #[serde(default)]
    pub format: TileFormat,
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
    /// Thumbnail edge length; thumbnails are always square
    #[serde(default = "default_thumbnail_size")]
    pub thumbnail_size: u32,
}

impl Default for DeepZoomConfig {
    fn default() -> Self {
        Self {
            tile_size: default_tile_size(),
            overlap: default_overlap(),
            format: TileFormat::default(),
            jpeg_quality: default_jpeg_quality(),
            thumbnail_size: default_thumbnail_size(),
        }
    }
}

fn default_tile_size() -> u32 {
    254
}

fn default_overlap() -> u32 {
    1
}

fn default_jpeg_quality() -> u8 {
    75
}

fn default_thumbnail_size() -> u32 {
    256
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Session lifetime in days
    #[serde(default = "default_session_days")]
    pub session_days: i64,
    /// Whether `POST /auth/register` is open
    #[serde(default = "default_allow_registration")]
    pub allow_registration: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_days: default_session_days(),
            allow_registration: default_allow_registration(),
        }
    }
}

fn default_session_days() -> i64 {
    7
}

fn default_allow_registration() -> bool {
    true
}

/// Error type for configuration parsing
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    FileRead {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {message}")]
    ParseError { path: String, message: String },
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

impl Config {
    /// Load configuration from file
    ///
    /// A missing or empty file yields the default configuration.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.display().to_string(),
            source: e,
        })?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config =
            serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError {
                path: path.display().to_string(),
                message: format_yaml_error(&e),
            })?;

        config.validate()?;

        Ok(config)
    }

    /// Load configuration from file with environment variable overrides
    ///
    /// Recognised variables:
    /// - SLIDEHUB_SERVER_HOST / SLIDEHUB_SERVER_PORT / SLIDEHUB_SERVER_CORS_ORIGIN
    /// - SLIDEHUB_DATABASE_URL
    /// - SLIDEHUB_CACHE_TTL_SECONDS
    /// - SLIDEHUB_MEDIA_ROOT
    /// - SLIDEHUB_AUTH_ALLOW_REGISTRATION
    pub fn load_with_env(path: &std::path::Path) -> anyhow::Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.deepzoom.tile_size == 0 {
            return Err(ConfigError::ValidationError(
                "deepzoom.tile_size must be greater than 0".to_string(),
            ));
        }
        if self.deepzoom.thumbnail_size == 0 {
            return Err(ConfigError::ValidationError(
                "deepzoom.thumbnail_size must be greater than 0".to_string(),
            ));
        }
        if !(1..=100).contains(&self.deepzoom.jpeg_quality) {
            return Err(ConfigError::ValidationError(
                "deepzoom.jpeg_quality must be between 1 and 100".to_string(),
            ));
        }
        Ok(())
    }

    /// Apply environment variable overrides. Unparsable values are ignored.
    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("SLIDEHUB_SERVER_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("SLIDEHUB_SERVER_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                self.server.port = port;
            }
        }
        if let Ok(cors_origin) = std::env::var("SLIDEHUB_SERVER_CORS_ORIGIN") {
            self.server.cors_origin = cors_origin;
        }

        if let Ok(url) = std::env::var("SLIDEHUB_DATABASE_URL") {
            self.database.url = url;
        }

        if let Ok(ttl) = std::env::var("SLIDEHUB_CACHE_TTL_SECONDS") {
            if let Ok(ttl) = ttl.parse::<u64>() {
                self.cache.ttl_seconds = ttl;
            }
        }

        if let Ok(root) = std::env::var("SLIDEHUB_MEDIA_ROOT") {
            self.media.root = PathBuf::from(root);
        }

        if let Ok(allow) = std::env::var("SLIDEHUB_AUTH_ALLOW_REGISTRATION") {
            match allow.to_lowercase().as_str() {
                "true" | "1" | "yes" => self.auth.allow_registration = true,
                "false" | "0" | "no" => self.auth.allow_registration = false,
                _ => {}
            }
        }
    }
}

/// Format YAML parsing error with location
fn format_yaml_error(e: &serde_yaml::Error) -> String {
    if let Some(location) = e.location() {
        format!(
            "at line {}, column {}: {}",
            location.line(),
            location.column(),
            e
        )
    } else {
        e.to_string()
    }
}

// Shared by every test that touches SLIDEHUB_* variables.
#[cfg(test)]
static CONFIG_ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());

#[cfg(test)]
const ENV_KEYS: &[&str] = &[
    "SLIDEHUB_SERVER_HOST",
    "SLIDEHUB_SERVER_PORT",
    "SLIDEHUB_SERVER_CORS_ORIGIN",
    "SLIDEHUB_DATABASE_URL",
    "SLIDEHUB_CACHE_TTL_SECONDS",
    "SLIDEHUB_MEDIA_ROOT",
    "SLIDEHUB_AUTH_ALLOW_REGISTRATION",
];

#[cfg(test)]
fn clear_env() {
    for key in ENV_KEYS {
        std::env::remove_var(key);
    }
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn lock_env() -> std::sync::MutexGuard<'static, ()> {
        super::CONFIG_ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn valid_deepzoom_strategy() -> impl Strategy<Value = DeepZoomConfig> {
        (
            1u32..2048,
            0u32..8,
            prop_oneof![Just(TileFormat::Jpeg), Just(TileFormat::Png)],
            1u8..=100,
            1u32..1024,
        )
            .prop_map(
                |(tile_size, overlap, format, jpeg_quality, thumbnail_size)| DeepZoomConfig {
                    tile_size,
                    overlap,
                    format,
                    jpeg_quality,
                    thumbnail_size,
                },
            )
    }

    fn valid_config_strategy() -> impl Strategy<Value = Config> {
        (
            "[a-z][a-z0-9]{0,10}",
            1u16..=65535,
            "[a-z][a-z0-9_/]{0,20}\\.db",
            1u64..100_000,
            valid_deepzoom_strategy(),
            any::<bool>(),
        )
            .prop_map(|(host, port, url, ttl, deepzoom, allow)| Config {
                server: ServerConfig {
                    host,
                    port,
                    cors_origin: default_cors_origin(),
                },
                database: DatabaseConfig { url },
                cache: CacheConfig {
                    ttl_seconds: ttl,
                    max_capacity: default_max_capacity(),
                },
                media: MediaConfig::default(),
                deepzoom,
                auth: AuthConfig {
                    session_days: 7,
                    allow_registration: allow,
                },
            })
    }

    fn malformed_yaml_strategy() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("server:\n  port: [unclosed".to_string()),
            Just("deepzoom: {tile_size: }}".to_string()),
            Just("server: port: 1".to_string()),
            "[a-z]{1,8}".prop_map(|k| format!("{}:\n  - a\n  b: c", k)),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(20))]

        #[test]
        fn config_yaml_roundtrip(config in valid_config_strategy()) {
            let yaml = serde_yaml::to_string(&config).unwrap();
            let mut file = NamedTempFile::new().unwrap();
            write!(file, "{}", yaml).unwrap();

            let loaded = Config::load(file.path()).unwrap();
            prop_assert_eq!(loaded.server.host, config.server.host);
            prop_assert_eq!(loaded.server.port, config.server.port);
            prop_assert_eq!(loaded.database.url, config.database.url);
            prop_assert_eq!(loaded.cache.ttl_seconds, config.cache.ttl_seconds);
            prop_assert_eq!(loaded.deepzoom.tile_size, config.deepzoom.tile_size);
            prop_assert_eq!(loaded.deepzoom.overlap, config.deepzoom.overlap);
            prop_assert_eq!(loaded.deepzoom.format, config.deepzoom.format);
            prop_assert_eq!(loaded.auth.allow_registration, config.auth.allow_registration);
        }

        #[test]
        fn single_section_fills_remaining_defaults(port in 1u16..=65535) {
            let mut file = NamedTempFile::new().unwrap();
            write!(file, "server:\n  port: {}\n", port).unwrap();

            let loaded = Config::load(file.path()).unwrap();
            prop_assert_eq!(loaded.server.port, port);
            prop_assert_eq!(loaded.deepzoom.tile_size, 254);
            prop_assert_eq!(loaded.media.root, PathBuf::from("media"));
            prop_assert_eq!(loaded.auth.session_days, 7);
        }

        #[test]
        fn malformed_yaml_is_rejected(yaml in malformed_yaml_strategy()) {
            let mut file = NamedTempFile::new().unwrap();
            write!(file, "{}", yaml).unwrap();
            prop_assert!(Config::load(file.path()).is_err());
        }

        #[test]
        fn env_port_takes_precedence_over_file(file_port in 1u16..=65535, env_port in 1u16..=65535) {
            let _guard = lock_env();
            clear_env();

            let mut file = NamedTempFile::new().unwrap();
            write!(file, "server:\n  port: {}\n", file_port).unwrap();
            std::env::set_var("SLIDEHUB_SERVER_PORT", env_port.to_string());

            let loaded = Config::load_with_env(file.path()).unwrap();
            clear_env();
            prop_assert_eq!(loaded.server.port, env_port);
        }
    }
}
