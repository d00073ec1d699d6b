//! Configuration loader
//!
//! Loads configuration from environment variables or files.
//!
//! ## Loading Strategy
//! 1. First, attempts to load from environment variables
//! 2. If `CRAWLSYNC_API_ENDPOINT` is unset, falls back to loading from file
//! 3. Searches several paths for config files
//! 4. Supports JSON and TOML formats
//!
//! Whatever the source, the result is validated before it is returned.
//!
//! ## Environment Variables
//! Primary realm (required):
//! - `CRAWLSYNC_API_ENDPOINT`: GraphQL endpoint URL
//! - `CRAWLSYNC_STATIC_TOKEN`: pre-issued token, or
//! - `CRAWLSYNC_TOKEN_URL`, `CRAWLSYNC_CLIENT_ID`, `CRAWLSYNC_CLIENT_SECRET`,
//!   and optionally `CRAWLSYNC_AUDIENCE`, `CRAWLSYNC_SCOPE`
//!
//! Orchestration realm (optional): the same names with an
//! `CRAWLSYNC_ORCHESTRATION_` prefix, e.g. `CRAWLSYNC_ORCHESTRATION_ENDPOINT`.
//!
//! Tuning (optional, defaults apply when unset):
//! - `CRAWLSYNC_TIMEOUT_SECS`
//! - `CRAWLSYNC_INFORMATIONAL_CODES`: comma-separated GraphQL error codes
//! - `CRAWLSYNC_REQUESTS_PER_SECOND`, `CRAWLSYNC_BURST`,
//!   `CRAWLSYNC_MAX_CONCURRENT`, `CRAWLSYNC_MAX_ATTEMPTS`
//! - `CRAWLSYNC_PAGE_SIZE`, `CRAWLSYNC_OFFSET_CEILING`
//! - `CRAWLSYNC_STORE_PATH`, `CRAWLSYNC_STORE_POOL_SIZE`
//!
//! ## File Locations
//! The loader searches the following paths (in order):
//! 1. `./crawlsync.toml` or `./crawlsync.json` (current working directory)
//! 2. `./config.toml` or `./config.json` (current working directory)
//! 3. The same names one and two directories up
//! 4. Relative to executable location

use std::path::{Path, PathBuf};
use std::str::FromStr;

use crawlsync_domain::{ApiConfig, Config, CrawlSyncError, RealmConfig, Result};

const CONFIG_FILE_NAMES: [&str; 4] =
    ["crawlsync.toml", "crawlsync.json", "config.toml", "config.json"];

/// Load configuration with automatic fallback strategy
///
/// First attempts to load from environment variables. If the primary
/// endpoint variable is missing, falls back to loading from a config file.
///
/// # Errors
/// Returns `CrawlSyncError::Config` if:
/// - Configuration cannot be loaded from either source
/// - File format is invalid
/// - The loaded configuration fails validation
pub fn load() -> Result<Config> {
    match load_from_env() {
        Ok(config) => {
            tracing::info!("Configuration loaded from environment variables");
            Ok(config)
        }
        Err(e) => {
            tracing::debug!(error = %e, "Failed to load from environment, trying file");
            load_from_file(None)
        }
    }
}

/// Load configuration from environment variables
///
/// # Errors
/// Returns `CrawlSyncError::Config` if required variables are missing,
/// a numeric variable does not parse, or validation fails.
pub fn load_from_env() -> Result<Config> {
    let primary = realm_from_env("CRAWLSYNC_", "CRAWLSYNC_API_ENDPOINT")?;
    let orchestration = match optional_var("CRAWLSYNC_ORCHESTRATION_ENDPOINT") {
        Some(_) => Some(realm_from_env(
            "CRAWLSYNC_ORCHESTRATION_",
            "CRAWLSYNC_ORCHESTRATION_ENDPOINT",
        )?),
        None => None,
    };

    let mut config = Config { api: ApiConfig { primary, orchestration }, ..Config::default() };

    if let Some(timeout) = env_parse("CRAWLSYNC_TIMEOUT_SECS")? {
        config.transport.timeout_secs = timeout;
    }
    if let Some(codes) = optional_var("CRAWLSYNC_INFORMATIONAL_CODES") {
        config.transport.informational_codes = split_list(&codes);
    }
    if let Some(rate) = env_parse("CRAWLSYNC_REQUESTS_PER_SECOND")? {
        config.governor.requests_per_second = rate;
    }
    if let Some(burst) = env_parse("CRAWLSYNC_BURST")? {
        config.governor.burst = burst;
    }
    if let Some(max_concurrent) = env_parse("CRAWLSYNC_MAX_CONCURRENT")? {
        config.governor.max_concurrent = max_concurrent;
    }
    if let Some(max_attempts) = env_parse("CRAWLSYNC_MAX_ATTEMPTS")? {
        config.governor.max_attempts = max_attempts;
    }
    if let Some(page_size) = env_parse("CRAWLSYNC_PAGE_SIZE")? {
        config.crawl.page_size = page_size;
    }
    if let Some(ceiling) = env_parse("CRAWLSYNC_OFFSET_CEILING")? {
        config.crawl.offset_ceiling = Some(ceiling);
    }
    if let Some(path) = optional_var("CRAWLSYNC_STORE_PATH") {
        config.store.path = path;
    }
    if let Some(pool_size) = env_parse("CRAWLSYNC_STORE_POOL_SIZE")? {
        config.store.pool_size = pool_size;
    }

    config.validate()?;
    Ok(config)
}

/// Load configuration from a file
///
/// If `path` is `None`, searches several locations for config files.
/// Supports both JSON and TOML formats (detected by file extension).
///
/// # Errors
/// Returns `CrawlSyncError::Config` if:
/// - File not found (when path is specified)
/// - No config file found (when path is `None`)
/// - File format is invalid
/// - The configuration fails validation
pub fn load_from_file(path: Option<PathBuf>) -> Result<Config> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(CrawlSyncError::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            p
        }
        None => find_config_file().ok_or_else(|| {
            CrawlSyncError::Config("No config file found in any of the standard locations".into())
        })?,
    };

    tracing::info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| CrawlSyncError::Config(format!("Failed to read config file: {e}")))?;

    let config = parse_config(&contents, &config_path)?;
    config.validate()?;
    Ok(config)
}

/// Parse configuration from string content
///
/// Format is detected by file extension (`.json` or `.toml`).
fn parse_config(contents: &str, path: &Path) -> Result<Config> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| CrawlSyncError::Config(format!("Invalid TOML format: {e}"))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| CrawlSyncError::Config(format!("Invalid JSON format: {e}"))),
        _ => Err(CrawlSyncError::Config(format!("Unsupported config format: {extension}"))),
    }
}

/// First existing configuration file among the search paths
///
/// # Returns
/// The first config file found, or `None` if no file exists.
pub fn find_config_file() -> Option<PathBuf> {
    let mut roots = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        roots.extend([cwd.clone(), cwd.join(".."), cwd.join("../..")]);
    }

    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            roots.extend([exe_dir.to_path_buf(), exe_dir.join(".."), exe_dir.join("../..")]);
        }
    }

    roots
        .iter()
        .flat_map(|root| CONFIG_FILE_NAMES.iter().map(move |name| root.join(name)))
        .find(|path| path.exists())
}

fn realm_from_env(prefix: &str, endpoint_key: &str) -> Result<RealmConfig> {
    let var = |suffix: &str| optional_var(&format!("{prefix}{suffix}"));
    Ok(RealmConfig {
        endpoint: env_var(endpoint_key)?,
        token_url: var("TOKEN_URL"),
        client_id: var("CLIENT_ID"),
        client_secret: var("CLIENT_SECRET"),
        audience: var("AUDIENCE"),
        scope: var("SCOPE"),
        static_token: var("STATIC_TOKEN"),
    })
}

/// Get required environment variable
///
/// # Errors
/// Returns `CrawlSyncError::Config` if the variable is not set.
fn env_var(key: &str) -> Result<String> {
    optional_var(key).ok_or_else(|| {
        CrawlSyncError::Config(format!("Missing required environment variable: {key}"))
    })
}

/// Non-empty environment variable, if set
fn optional_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

/// Parse an optional environment variable
///
/// # Errors
/// Returns `CrawlSyncError::Config` if the variable is set but does not parse.
fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    optional_var(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| CrawlSyncError::Config(format!("Invalid value for {key}: {e}")))
        })
        .transpose()
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::Mutex;

    use once_cell::sync::Lazy;
    use tempfile::NamedTempFile;

    use super::*;

    static ENV_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

    const ENV_KEYS: [&str; 22] = [
        "CRAWLSYNC_API_ENDPOINT",
        "CRAWLSYNC_TOKEN_URL",
        "CRAWLSYNC_CLIENT_ID",
        "CRAWLSYNC_CLIENT_SECRET",
        "CRAWLSYNC_AUDIENCE",
        "CRAWLSYNC_SCOPE",
        "CRAWLSYNC_STATIC_TOKEN",
        "CRAWLSYNC_ORCHESTRATION_ENDPOINT",
        "CRAWLSYNC_ORCHESTRATION_TOKEN_URL",
        "CRAWLSYNC_ORCHESTRATION_CLIENT_ID",
        "CRAWLSYNC_ORCHESTRATION_CLIENT_SECRET",
        "CRAWLSYNC_ORCHESTRATION_STATIC_TOKEN",
        "CRAWLSYNC_TIMEOUT_SECS",
        "CRAWLSYNC_INFORMATIONAL_CODES",
        "CRAWLSYNC_REQUESTS_PER_SECOND",
        "CRAWLSYNC_BURST",
        "CRAWLSYNC_MAX_CONCURRENT",
        "CRAWLSYNC_MAX_ATTEMPTS",
        "CRAWLSYNC_PAGE_SIZE",
        "CRAWLSYNC_OFFSET_CEILING",
        "CRAWLSYNC_STORE_PATH",
        "CRAWLSYNC_STORE_POOL_SIZE",
    ];

    fn clear_env() {
        for key in ENV_KEYS {
            std::env::remove_var(key);
        }
    }

    fn write_config(contents: &str, extension: &str) -> (NamedTempFile, PathBuf) {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(contents.as_bytes()).unwrap();
        let path = temp_file.path().with_extension(extension);
        std::fs::copy(temp_file.path(), &path).unwrap();
        (temp_file, path)
    }

    #[test]
    fn test_load_from_env_with_client_credentials() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");
        clear_env();

        std::env::set_var("CRAWLSYNC_API_ENDPOINT", "https://api.example.org/graphql");
        std::env::set_var("CRAWLSYNC_TOKEN_URL", "https://auth.example.org/oauth/token");
        std::env::set_var("CRAWLSYNC_CLIENT_ID", "machine");
        std::env::set_var("CRAWLSYNC_CLIENT_SECRET", "s3cret");
        std::env::set_var("CRAWLSYNC_AUDIENCE", "https://api.example.org");
        std::env::set_var("CRAWLSYNC_PAGE_SIZE", "250");
        std::env::set_var("CRAWLSYNC_OFFSET_CEILING", "10000");
        std::env::set_var("CRAWLSYNC_INFORMATIONAL_CODES", "DEPRECATED, PARTIAL_RESULT");
        std::env::set_var("CRAWLSYNC_STORE_PATH", "/tmp/crawl.db");

        let result = load_from_env();
        clear_env();

        let config = result.expect("config from env");
        assert_eq!(config.api.primary.endpoint, "https://api.example.org/graphql");
        assert_eq!(config.api.primary.client_id.as_deref(), Some("machine"));
        assert!(config.api.primary.has_client_credentials());
        assert!(config.api.orchestration.is_none());
        assert_eq!(config.crawl.page_size, 250);
        assert_eq!(config.crawl.offset_ceiling, Some(10_000));
        assert_eq!(config.transport.informational_codes, vec!["DEPRECATED", "PARTIAL_RESULT"]);
        assert_eq!(config.store.path, "/tmp/crawl.db");
        // Untouched sections keep their defaults
        assert_eq!(config.governor.max_attempts, 5);
    }

    #[test]
    fn test_load_from_env_orchestration_realm() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");
        clear_env();

        std::env::set_var("CRAWLSYNC_API_ENDPOINT", "https://api.example.org/graphql");
        std::env::set_var("CRAWLSYNC_STATIC_TOKEN", "dev");
        std::env::set_var("CRAWLSYNC_ORCHESTRATION_ENDPOINT", "https://jobs.example.org/graphql");
        std::env::set_var("CRAWLSYNC_ORCHESTRATION_STATIC_TOKEN", "jobs-dev");

        let result = load_from_env();
        clear_env();

        let config = result.expect("config from env");
        let orchestration = config.api.orchestration.expect("orchestration realm");
        assert_eq!(orchestration.endpoint, "https://jobs.example.org/graphql");
        assert_eq!(orchestration.static_token.as_deref(), Some("jobs-dev"));
    }

    #[test]
    fn test_load_from_env_missing_endpoint() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");
        clear_env();

        let err = load_from_env().unwrap_err();
        assert!(matches!(err, CrawlSyncError::Config(msg) if msg.contains("API_ENDPOINT")));
    }

    #[test]
    fn test_load_from_env_requires_credentials() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");
        clear_env();

        std::env::set_var("CRAWLSYNC_API_ENDPOINT", "https://api.example.org/graphql");
        std::env::set_var("CRAWLSYNC_CLIENT_ID", "machine");

        let result = load_from_env();
        clear_env();

        assert!(matches!(result, Err(CrawlSyncError::Config(_))));
    }

    #[test]
    fn test_load_from_env_invalid_number() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");
        clear_env();

        std::env::set_var("CRAWLSYNC_API_ENDPOINT", "https://api.example.org/graphql");
        std::env::set_var("CRAWLSYNC_STATIC_TOKEN", "dev");
        std::env::set_var("CRAWLSYNC_MAX_ATTEMPTS", "lots");

        let result = load_from_env();
        clear_env();

        let err = result.unwrap_err();
        assert!(matches!(err, CrawlSyncError::Config(msg) if msg.contains("MAX_ATTEMPTS")));
    }

    #[test]
    fn test_load_from_file_toml() {
        let toml_content = r#"
[api.primary]
endpoint = "https://api.example.org/graphql"
static_token = "dev"

[governor]
requests_per_second = 2
max_attempts = 3

[crawl]
page_size = 100
offset_ceiling = 10000

[store]
path = "catalog.db"
"#;
        let (_temp, path) = write_config(toml_content, "toml");

        let result = load_from_file(Some(path.clone()));
        std::fs::remove_file(path).ok();

        let config = result.expect("config from TOML file");
        assert_eq!(config.governor.requests_per_second, 2);
        assert_eq!(config.governor.max_attempts, 3);
        assert_eq!(config.governor.burst, 5);
        assert_eq!(config.crawl.offset_ceiling, Some(10_000));
        assert_eq!(config.store.path, "catalog.db");
        assert_eq!(config.transport.timeout_secs, 30);
    }

    #[test]
    fn test_load_from_file_json() {
        let json_content = r#"{
            "api": {
                "primary": {
                    "endpoint": "https://api.example.org/graphql",
                    "token_url": "https://auth.example.org/oauth/token",
                    "client_id": "machine",
                    "client_secret": "s3cret"
                }
            },
            "transport": { "informational_codes": ["DEPRECATED"] }
        }"#;
        let (_temp, path) = write_config(json_content, "json");

        let result = load_from_file(Some(path.clone()));
        std::fs::remove_file(path).ok();

        let config = result.expect("config from JSON file");
        assert!(config.api.primary.has_client_credentials());
        assert_eq!(config.transport.informational_codes, vec!["DEPRECATED"]);
        assert_eq!(config.transport.throttle_codes, vec!["THROTTLED", "RATE_LIMITED"]);
    }

    #[test]
    fn test_load_from_file_rejects_invalid_values() {
        let toml_content = r#"
[api.primary]
endpoint = "https://api.example.org/graphql"
static_token = "dev"

[crawl]
page_size = 0
"#;
        let (_temp, path) = write_config(toml_content, "toml");

        let result = load_from_file(Some(path.clone()));
        std::fs::remove_file(path).ok();

        assert!(matches!(result, Err(CrawlSyncError::Config(msg)) if msg.contains("page_size")));
    }

    #[test]
    fn test_load_from_file_not_found() {
        let result = load_from_file(Some(PathBuf::from("/nonexistent/crawlsync.toml")));
        assert!(matches!(result, Err(CrawlSyncError::Config(_))));
    }

    #[test]
    fn test_load_from_file_invalid_json() {
        let (_temp, path) = write_config(r#"{ "this is": "not valid json" "#, "json");

        let result = load_from_file(Some(path.clone()));
        std::fs::remove_file(path).ok();

        assert!(result.is_err(), "Should fail with invalid JSON");
    }

    #[test]
    fn test_parse_config_unsupported_format() {
        let result = parse_config("some content", &PathBuf::from("crawlsync.yaml"));
        assert!(matches!(result, Err(CrawlSyncError::Config(msg)) if msg.contains("yaml")));
    }

    #[test]
    fn test_split_list() {
        assert_eq!(split_list(" A, ,B ,"), vec!["A", "B"]);
        assert!(split_list("").is_empty());
    }
}
