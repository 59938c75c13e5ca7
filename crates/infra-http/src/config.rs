// HTTP client configuration (environment + defaults)

use noxtools_core::application::ReconnectPolicy;
use noxtools_core::error::{AppError, Result};
use std::time::Duration;
use url::Url;

pub const ENV_API_URL: &str = "NOXTOOLS_API_URL";
pub const ENV_TIMEOUT_SECS: &str = "NOXTOOLS_TIMEOUT_SECS";
pub const ENV_STREAM_MAX_RETRIES: &str = "NOXTOOLS_STREAM_MAX_RETRIES";

pub const DEFAULT_API_URL: &str = "http://localhost:8000/api";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Settings for [`crate::HttpJobTransport`]
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the backend API, e.g. `http://localhost:8000/api`
    pub api_url: Url,
    /// Timeout for request/response calls (not applied to the SSE stream)
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub reconnect: ReconnectPolicy,
}

impl ClientConfig {
    pub fn new(api_url: &str) -> Result<Self> {
        Ok(Self {
            api_url: parse_api_url(api_url)?,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            reconnect: ReconnectPolicy::default(),
        })
    }

    /// Load from `NOXTOOLS_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup; missing keys fall back to defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_url = lookup(ENV_API_URL).unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let mut config = Self::new(&api_url)?;

        if let Some(raw) = lookup(ENV_TIMEOUT_SECS) {
            let secs: u64 = raw.trim().parse().map_err(|_| {
                AppError::Config(format!("{} must be a number of seconds, got {:?}", ENV_TIMEOUT_SECS, raw))
            })?;
            config.timeout = Duration::from_secs(secs.max(1));
        }

        if let Some(raw) = lookup(ENV_STREAM_MAX_RETRIES) {
            config.reconnect = config
                .reconnect
                .with_max_attempts(parse_max_retries(&raw)?);
        }

        Ok(config)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_reconnect(mut self, reconnect: ReconnectPolicy) -> Self {
        self.reconnect = reconnect;
        self
    }
}

fn parse_api_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw.trim())
        .map_err(|e| AppError::Config(format!("Invalid API URL {:?}: {}", raw, e)))?;
    if url.cannot_be_a_base() {
        return Err(AppError::Config(format!("API URL {:?} cannot be a base URL", raw)));
    }
    Ok(url)
}

/// `unlimited` (or `none`) disables the cap
fn parse_max_retries(raw: &str) -> Result<Option<u32>> {
    let value = raw.trim();
    if value.eq_ignore_ascii_case("unlimited") || value.eq_ignore_ascii_case("none") {
        return Ok(None);
    }
    value.parse().map(Some).map_err(|_| {
        AppError::Config(format!(
            "{} must be a number or \"unlimited\", got {:?}",
            ENV_STREAM_MAX_RETRIES, raw
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tokio_test::{assert_err, assert_ok};

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = assert_ok!(ClientConfig::from_lookup(lookup(&[])));
        assert_eq!(config.api_url.as_str(), "http://localhost:8000/api");
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.reconnect.max_attempts(), Some(10));
    }

    #[test]
    fn test_overrides() {
        let config = assert_ok!(ClientConfig::from_lookup(lookup(&[
            (ENV_API_URL, "https://jobs.example.com/api/"),
            (ENV_TIMEOUT_SECS, "5"),
            (ENV_STREAM_MAX_RETRIES, "unlimited"),
        ])));
        assert_eq!(config.api_url.host_str(), Some("jobs.example.com"));
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.reconnect.max_attempts(), None);
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            ClientConfig::from_lookup(lookup(&[(ENV_API_URL, "not a url")])),
            Err(AppError::Config(_))
        ));
        assert!(matches!(
            ClientConfig::from_lookup(lookup(&[(ENV_TIMEOUT_SECS, "soon")])),
            Err(AppError::Config(_))
        ));
        assert!(matches!(
            ClientConfig::from_lookup(lookup(&[(ENV_STREAM_MAX_RETRIES, "-1")])),
            Err(AppError::Config(_))
        ));
    }

    #[test]
    fn test_max_retries_values() {
        assert_eq!(assert_ok!(parse_max_retries(" 3 ")), Some(3));
        assert_eq!(assert_ok!(parse_max_retries("None")), None);
        assert_err!(parse_max_retries("often"));
    }
}
