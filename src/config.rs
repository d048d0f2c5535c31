//! Runtime configuration, read from the environment (and `.env` if present).

use anyhow::{anyhow, Result};
use std::env;

pub const DEFAULT_API_URL: &str = "http://localhost:3000";
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Backend origin, without a trailing slash.
    pub api_base_url: String,
    /// Sent as a bearer token when set.
    pub auth_token: Option<String>,
    pub connect_timeout_secs: u64,
}

impl AppConfig {
    /// Loads the configuration from environment variables. Call
    /// `dotenvy::dotenv()` first to pick up a `.env` file.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn with_base_url(api_base_url: impl Into<String>) -> Self {
        Self {
            api_base_url: api_base_url.into(),
            auth_token: None,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
        }
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let api_base_url = lookup("PDF_CHAT_API_URL")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());
        if !api_base_url.starts_with("http://") && !api_base_url.starts_with("https://") {
            return Err(anyhow!(
                "PDF_CHAT_API_URL must be an http(s) URL, got {api_base_url}"
            ));
        }

        let auth_token = lookup("PDF_CHAT_AUTH_TOKEN").filter(|v| !v.is_empty());

        let connect_timeout_secs = match lookup("PDF_CHAT_TIMEOUT_SECS") {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|_| anyhow!("PDF_CHAT_TIMEOUT_SECS is not a number: {raw}"))?,
            None => DEFAULT_CONNECT_TIMEOUT_SECS,
        };

        Ok(Self {
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            auth_token,
            connect_timeout_secs,
        })
    }
}
