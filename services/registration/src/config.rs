use serde::Deserialize;
use std::time::Duration;

/// Main configuration for the registration service
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Service configuration
    #[serde(default)]
    pub service: ServiceConfig,
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Upload policy applied to multipart submissions
    #[serde(default)]
    pub uploads: UploadConfig,
    /// Workbook and PDF export configuration
    #[serde(default)]
    pub export: ExportConfig,
    /// API configuration
    #[serde(default)]
    pub api: ApiConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Service name for logging/metrics
    #[serde(default = "default_service_name")]
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Metrics port
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

/// Which repository implementation backs the record store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    /// PostgreSQL through a sqlx connection pool
    Postgres,
    /// Process-local store, lost on restart
    Memory,
}

/// Database configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Repository backend
    #[serde(default = "default_backend")]
    pub backend: StoreBackend,
    /// PostgreSQL connection URL
    #[serde(default = "default_database_url")]
    pub url: String,
    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Idle connection timeout in seconds
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    /// Run migrations on startup
    #[serde(default = "default_run_migrations")]
    pub run_migrations: bool,
}

/// Upload policy configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UploadConfig {
    /// Maximum size of a single uploaded file in bytes (5MB default)
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: usize,
    /// Declared content types accepted for file parts
    #[serde(default = "default_allowed_content_types")]
    pub allowed_content_types: Vec<String>,
}

/// Export configuration for the workbook and PDF renderers
#[derive(Debug, Clone, Deserialize)]
pub struct ExportConfig {
    /// Externally reachable base URL used in workbook hyperlinks
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,
    /// First letterhead line of the PDF
    #[serde(default = "default_institution_name")]
    pub institution_name: String,
    /// Second letterhead line of the PDF
    #[serde(default = "default_programme_title")]
    pub programme_title: String,
    /// Edge length of workbook thumbnails in pixels
    #[serde(default = "default_thumbnail_px")]
    pub thumbnail_px: u32,
    /// Height of workbook rows that carry attachments, in points
    #[serde(default = "default_row_height")]
    pub row_height: f64,
}

/// API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// API listen address
    #[serde(default = "default_api_host")]
    pub host: String,
    /// API listen port
    #[serde(default = "default_api_port")]
    pub port: u16,
    /// Enable CORS
    #[serde(default = "default_true")]
    pub cors_enabled: bool,
    /// Allowed CORS origins
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

// Default value functions
fn default_service_name() -> String {
    "registration-service".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_backend() -> StoreBackend {
    StoreBackend::Postgres
}

fn default_database_url() -> String {
    "postgres://localhost:5432/admissions".to_string()
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    2
}

fn default_connect_timeout_secs() -> u64 {
    30
}

fn default_idle_timeout_secs() -> u64 {
    600
}

fn default_run_migrations() -> bool {
    true
}

fn default_max_file_bytes() -> usize {
    5 * 1024 * 1024 // 5MB
}

fn default_allowed_content_types() -> Vec<String> {
    vec![
        "image/jpeg".to_string(),
        "image/png".to_string(),
        "application/pdf".to_string(),
    ]
}

fn default_public_base_url() -> String {
    "http://localhost:5000".to_string()
}

fn default_institution_name() -> String {
    "CMR College of Engineering & Technology".to_string()
}

fn default_programme_title() -> String {
    "Application for Admission to Category B Seats - B.Tech 2025-26".to_string()
}

fn default_thumbnail_px() -> u32 {
    100
}

fn default_row_height() -> f64 {
    100.0
}

fn default_true() -> bool {
    true
}

fn default_api_host() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    5000
}

impl Config {
    /// Load configuration from environment and config files
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            // Start with default values
            .set_default("service.name", "registration-service")?
            .set_default("service.log_level", "info")?
            .set_default("service.metrics_port", 9090)?
            // Add config file if present
            .add_source(
                config::File::with_name("config/registration")
                    .required(false)
            )
            .add_source(
                config::File::with_name("/etc/admissions/registration")
                    .required(false)
            )
            // Override with environment variables
            // REGISTRATION__DATABASE__URL -> database.url
            .add_source(
                config::Environment::with_prefix("REGISTRATION")
                    .separator("__")
                    .try_parsing(true)
            )
            .build()?;

        config.try_deserialize().map_err(Into::into)
    }
}

impl DatabaseConfig {
    /// Get connection acquire timeout as Duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Get idle connection timeout as Duration
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
            metrics_port: default_metrics_port(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            url: default_database_url(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connect_timeout_secs: default_connect_timeout_secs(),
            idle_timeout_secs: default_idle_timeout_secs(),
            run_migrations: default_run_migrations(),
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_file_bytes: default_max_file_bytes(),
            allowed_content_types: default_allowed_content_types(),
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            public_base_url: default_public_base_url(),
            institution_name: default_institution_name(),
            programme_title: default_programme_title(),
            thumbnail_px: default_thumbnail_px(),
            row_height: default_row_height(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_api_host(),
            port: default_api_port(),
            cors_enabled: default_true(),
            cors_origins: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        assert_eq!(default_max_file_bytes(), 5 * 1024 * 1024);
        assert_eq!(default_api_port(), 5000);
        assert_eq!(default_allowed_content_types().len(), 3);
        assert_eq!(default_backend(), StoreBackend::Postgres);
    }

    #[test]
    fn test_overrides_deserialize_into_sections() {
        let config: Config = config::Config::builder()
            .set_override("database.backend", "memory")
            .unwrap()
            .set_override("uploads.max_file_bytes", 1024)
            .unwrap()
            .set_override("export.public_base_url", "https://admissions.example.edu")
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.database.backend, StoreBackend::Memory);
        assert_eq!(config.uploads.max_file_bytes, 1024);
        assert_eq!(config.export.public_base_url, "https://admissions.example.edu");
        assert_eq!(config.export.thumbnail_px, 100);
        assert_eq!(config.api.port, 5000);
        assert_eq!(config.service.name, "registration-service");
    }
}
