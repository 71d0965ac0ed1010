//! Environment configuration with documented defaults.

use std::path::PathBuf;
use std::time::Duration;

/// The provider deadline must fire at least this far ahead of the request
/// deadline, so an inner timeout is reported before the outer one.
const PROVIDER_TIMEOUT_MARGIN: Duration = Duration::from_secs(10);

/// The temp sweep threshold must outlive the longest possible request by at
/// least this much, or an in-flight request's temp file could be swept.
const SWEEP_TTL_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Admission ceiling: max in-flight transform requests.
    pub max_concurrent: usize,
    /// Outer deadline for an entire transform request.
    pub request_timeout: Duration,
    /// Inner deadline for the provider call alone.
    pub provider_timeout: Duration,
    pub sweep_interval: Duration,
    pub temp_ttl: Duration,
    pub result_ttl: Duration,
    pub data_dir: PathBuf,
    pub max_upload_bytes: usize,
    /// Optional JSON file overriding the builtin style catalog.
    pub style_catalog: Option<PathBuf>,
    pub api_key: Option<String>,
    pub api_base: String,
    pub model: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            max_concurrent: 20,
            request_timeout: Duration::from_millis(300_000),
            provider_timeout: Duration::from_millis(240_000),
            sweep_interval: Duration::from_millis(30_000),
            temp_ttl: Duration::from_millis(360_000),
            result_ttl: Duration::from_millis(3_600_000),
            data_dir: PathBuf::from("data"),
            max_upload_bytes: 10 * 1024 * 1024,
            style_catalog: None,
            api_key: None,
            api_base: "https://api.openai.com/v1".to_string(),
            model: "gpt-image-1".to_string(),
        }
    }
}

fn env_string(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_ms(name: &str, default: Duration) -> Duration {
    Duration::from_millis(env_u64(name, default.as_millis() as u64))
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: env_string("HOST", &defaults.host),
            port: env_u64("PORT", defaults.port as u64) as u16,
            max_concurrent: env_u64("MAX_CONCURRENT_REQUESTS", defaults.max_concurrent as u64)
                .max(1) as usize,
            request_timeout: env_ms("REQUEST_TIMEOUT_MS", defaults.request_timeout),
            provider_timeout: env_ms("PROVIDER_TIMEOUT_MS", defaults.provider_timeout),
            sweep_interval: env_ms("CLEANUP_INTERVAL_MS", defaults.sweep_interval),
            temp_ttl: env_ms("TEMP_TTL_MS", defaults.temp_ttl),
            result_ttl: env_ms("RESULT_TTL_MS", defaults.result_ttl),
            data_dir: PathBuf::from(env_string("DATA_DIR", "data")),
            max_upload_bytes: env_u64("MAX_UPLOAD_BYTES", defaults.max_upload_bytes as u64)
                as usize,
            style_catalog: std::env::var("STYLE_CATALOG").ok().map(PathBuf::from),
            api_key: std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty()),
            api_base: env_string("OPENAI_API_BASE", &defaults.api_base),
            model: env_string("OPENAI_IMAGE_MODEL", &defaults.model),
        }
        .validated()
    }

    /// Close invalid timing relationships instead of failing startup.
    pub fn validated(mut self) -> Self {
        let provider_ceiling = self.request_timeout.saturating_sub(PROVIDER_TIMEOUT_MARGIN);
        if self.provider_timeout > provider_ceiling {
            tracing::warn!(
                configured = ?self.provider_timeout,
                clamped = ?provider_ceiling,
                "provider timeout must undercut the request timeout; clamping"
            );
            self.provider_timeout = provider_ceiling;
        }

        let temp_floor = self.request_timeout + SWEEP_TTL_MARGIN;
        if self.temp_ttl < temp_floor {
            tracing::warn!(
                configured = ?self.temp_ttl,
                clamped = ?temp_floor,
                "temp TTL must outlive the request timeout; clamping"
            );
            self.temp_ttl = temp_floor;
        }

        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_keep_the_timing_invariants() {
        let config = Config::default().validated();

        assert!(config.provider_timeout + PROVIDER_TIMEOUT_MARGIN <= config.request_timeout);
        assert!(config.temp_ttl >= config.request_timeout + SWEEP_TTL_MARGIN);
        assert_eq!(config.max_concurrent, 20);
        assert_eq!(config.request_timeout, Duration::from_secs(300));
        assert_eq!(config.provider_timeout, Duration::from_secs(240));
    }

    #[test]
    fn oversized_provider_timeout_is_clamped() {
        let config = Config {
            request_timeout: Duration::from_secs(60),
            provider_timeout: Duration::from_secs(120),
            ..Config::default()
        }
        .validated();

        assert_eq!(config.provider_timeout, Duration::from_secs(50));
    }

    #[test]
    fn short_temp_ttl_is_raised_above_the_request_timeout() {
        let config = Config {
            request_timeout: Duration::from_secs(300),
            temp_ttl: Duration::from_secs(10),
            ..Config::default()
        }
        .validated();

        assert_eq!(config.temp_ttl, Duration::from_secs(360));
    }
}
