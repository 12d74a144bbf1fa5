//! Environment configuration
//!
//! Values come from the process environment, optionally seeded from a
//! `.env` file by the binaries via `dotenv`.

use crate::error::GatewayError;
use crate::models::Credential;
use crate::Result;
use std::env;
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_PORT: u16 = 8080;

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Base URL of the financial operations API
    pub api_base_url: Option<String>,
    /// Credential used when a caller does not supply one
    pub default_credential: Credential,
    pub request_timeout: Duration,
    /// Organization injected into every call that does not name one
    pub current_organization_id: Option<String>,
    /// Conversations untouched for longer than this are evicted
    pub conversation_idle_ttl: Option<Duration>,
    pub port: u16,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            api_base_url: None,
            default_credential: Credential::default(),
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            current_organization_id: None,
            conversation_idle_ttl: None,
            port: DEFAULT_PORT,
        }
    }
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let api_base_url = get("FINANCIAL_API_BASE_URL");
        if let Some(url) = &api_base_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(GatewayError::Config(format!(
                    "FINANCIAL_API_BASE_URL must be an http(s) URL, got '{}'",
                    url
                )));
            }
        }

        let request_timeout = match get("FINANCIAL_API_TIMEOUT_SECS") {
            Some(raw) => Duration::from_secs(parse_number("FINANCIAL_API_TIMEOUT_SECS", &raw)?),
            None => Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        };

        let conversation_idle_ttl = get("CONVERSATION_IDLE_TTL_SECS")
            .map(|raw| parse_number("CONVERSATION_IDLE_TTL_SECS", &raw))
            .transpose()?
            .map(Duration::from_secs);

        let port = match get("PORT").or_else(|| get("API_PORT")) {
            Some(raw) => raw
                .parse::<u16>()
                .map_err(|_| GatewayError::Config(format!("PORT must be a port number, got '{}'", raw)))?,
            None => DEFAULT_PORT,
        };

        Ok(Self {
            api_base_url,
            default_credential: get("FINANCIAL_API_KEY").map(Credential::new).unwrap_or_default(),
            request_timeout,
            current_organization_id: get("CURRENT_ORGANIZATION_ID"),
            conversation_idle_ttl,
            port,
        })
    }
}

fn parse_number(key: &str, raw: &str) -> Result<u64> {
    raw.parse::<u64>()
        .map_err(|_| GatewayError::Config(format!("{} must be a whole number of seconds, got '{}'", key, raw)))
}
