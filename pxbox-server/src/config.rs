//! Server configuration
//!
//! All options load from environment variables with development defaults:
//!
//! | Variable | Default | Meaning |
//! |----------|---------|---------|
//! | DATABASE_URL | sqlite://pxbox.db | storage connection URL |
//! | EVENT_LOG_URL | = DATABASE_URL | event-log connection URL |
//! | ADDR | 0.0.0.0:8080 | server bind address |
//! | JWT_SECRET | dev default | bearer-token signing secret |
//! | SCHEMA_REF_ALLOWLIST | (empty = allow all) | comma-separated $ref patterns |
//! | STORAGE_BASE_DIR | ./storage | file-storage base directory |
//! | STORAGE_BASE_URL | http://localhost:8080 | file-storage base URL |
//! | DEADLINE_WARNING_SECS | 3600 | deadline warning window |
//! | SCHEMA_CACHE_CAPACITY | 64 | compiled-schema cache capacity |
//! | SCHEMA_CACHE_TTL_SECS | 3600 | compiled-schema cache TTL |
//! | HUB_QUEUE_DEPTH | 256 | per-subscriber queue depth |
//! | ENVIRONMENT | development | gates the dev auth fallback |

#[derive(Debug, Clone)]
pub struct Config {
    /// Storage connection URL
    pub database_url: String,
    /// Event-log connection URL (defaults to the storage URL)
    pub event_log_url: String,
    /// Server bind address
    pub addr: String,
    /// Bearer-token signing secret
    pub jwt_secret: String,
    /// Allowed `$ref` URL patterns; empty = allow all (development only)
    pub schema_ref_allowlist: Vec<String>,
    /// File-storage base directory
    pub storage_base_dir: String,
    /// File-storage base URL
    pub storage_base_url: String,
    /// Deadline warning window in seconds
    pub deadline_warning_secs: i64,
    /// Compiled-schema cache capacity
    pub schema_cache_capacity: usize,
    /// Compiled-schema cache TTL in seconds
    pub schema_cache_ttl_secs: u64,
    /// Per-subscriber hub queue depth
    pub hub_queue_depth: usize,
    /// development | staging | production
    pub environment: String,
}

impl Config {
    /// Load from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        let database_url =
            std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://pxbox.db".into());
        Self {
            event_log_url: std::env::var("EVENT_LOG_URL")
                .unwrap_or_else(|_| database_url.clone()),
            database_url,
            addr: std::env::var("ADDR").unwrap_or_else(|_| "0.0.0.0:8080".into()),
            jwt_secret: std::env::var("JWT_SECRET")
                .unwrap_or_else(|_| "dev-secret-change-in-production".into()),
            schema_ref_allowlist: std::env::var("SCHEMA_REF_ALLOWLIST")
                .map(|s| {
                    s.split(',')
                        .map(str::trim)
                        .filter(|p| !p.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            storage_base_dir: std::env::var("STORAGE_BASE_DIR")
                .unwrap_or_else(|_| "./storage".into()),
            storage_base_url: std::env::var("STORAGE_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8080".into()),
            deadline_warning_secs: env_parse("DEADLINE_WARNING_SECS", 3600),
            schema_cache_capacity: env_parse("SCHEMA_CACHE_CAPACITY", 64),
            schema_cache_ttl_secs: env_parse("SCHEMA_CACHE_TTL_SECS", 3600),
            hub_queue_depth: env_parse("HUB_QUEUE_DEPTH", 256),
            environment: std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into()),
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
