//! Connection settings: base URL, API token and transport timeout.
//!
//! Values are resolved in a fixed order: explicit argument, then environment
//! variable, then `SaturnError::Configuration`. The environment is read
//! through a lookup closure so callers (and tests) can supply their own.

use std::time::Duration;

use url::Url;

use crate::error::{Result, SaturnError};

pub const BASE_URL_ENV: &str = "SATURN_BASE_URL";
pub const TOKEN_ENV: &str = "SATURN_TOKEN";
pub const REFRESH_TOKEN_ENV: &str = "SATURN_REFRESH_TOKEN";

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Version reported to the service in `X-Saturn-Client-Version`.
pub const CLIENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Immutable connection parameters.
#[derive(Clone, PartialEq, Eq)]
pub struct Settings {
    base_url: String,
    api_token: String,
    refresh_token: Option<String>,
    timeout: Duration,
}

impl Settings {
    /// Resolve settings from explicit values, falling back to the process
    /// environment.
    pub fn new(url: Option<&str>, api_token: Option<&str>) -> Result<Self> {
        Self::resolve(url, api_token, |key| std::env::var(key).ok())
    }

    /// Resolve settings purely from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::new(None, None)
    }

    /// Resolve settings from explicit values, falling back to `lookup` for
    /// anything not supplied. Empty strings count as missing.
    pub fn resolve<F>(url: Option<&str>, api_token: Option<&str>, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base_url = non_empty(url)
            .or_else(|| lookup(BASE_URL_ENV).filter(|v| !v.is_empty()))
            .ok_or_else(|| {
                SaturnError::Configuration(format!(
                    "missing Saturn URL: pass one explicitly or set {BASE_URL_ENV}"
                ))
            })?;
        let base_url = normalize_url(&base_url)?;

        let api_token = non_empty(api_token)
            .or_else(|| lookup(TOKEN_ENV).filter(|v| !v.is_empty()))
            .ok_or_else(|| {
                SaturnError::Configuration(format!(
                    "missing Saturn API token: pass one explicitly or set {TOKEN_ENV}"
                ))
            })?;

        Ok(Self {
            base_url,
            api_token,
            refresh_token: lookup(REFRESH_TOKEN_ENV).filter(|v| !v.is_empty()),
            timeout: DEFAULT_TIMEOUT,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    /// Base URL without a trailing slash.
    pub fn url(&self) -> &str {
        &self.base_url
    }

    pub fn api_token(&self) -> &str {
        &self.api_token
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Headers attached to every request.
    pub fn headers(&self) -> Vec<(String, String)> {
        vec![
            ("authorization".to_string(), format!("token {}", self.api_token)),
            ("x-saturn-client-version".to_string(), CLIENT_VERSION.to_string()),
            ("accept".to_string(), "application/json".to_string()),
        ]
    }
}

// Tokens stay out of logs and panic messages.
impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("base_url", &self.base_url)
            .field("api_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.filter(|v| !v.is_empty()).map(str::to_string)
}

fn normalize_url(raw: &str) -> Result<String> {
    let parsed = Url::parse(raw)
        .map_err(|e| SaturnError::Configuration(format!("\"{raw}\" is not a valid URL: {e}")))?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(SaturnError::Configuration(format!(
            "\"{raw}\" is not a valid URL"
        )));
    }
    Ok(raw.trim_end_matches('/').to_string())
}
