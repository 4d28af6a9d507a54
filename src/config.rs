//! Server configuration.
//!
//! Values come from the process environment (an optional `.env` file is loaded
//! by the binary before this runs). Only the listen address and body limit are
//! needed to boot; the completion API key is checked when a request needs it.

use anyhow::{Context, Result};
use std::env;
use std::net::SocketAddr;
use tracing::{info, warn};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-2024-08-06";
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
const DEFAULT_MAX_UPLOAD_BYTES: usize = 100 * 1024 * 1024; // 100MB

#[derive(Debug, Clone)]
pub struct Config {
    /// Key for the completion service. `None` fails the first request that needs it.
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub bind_addr: SocketAddr,
    pub max_upload_bytes: usize,
}

impl Config {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        let api_key = env::var("OPENAI_API_KEY").ok().filter(|k| !k.trim().is_empty());
        if api_key.is_none() {
            warn!("OPENAI_API_KEY is not set; extraction requests will fail until it is");
        }

        let bind_addr = env::var("BIND_ADDR")
            .unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string())
            .parse()
            .context("BIND_ADDR must be a socket address like 0.0.0.0:3000")?;

        let max_upload_bytes = match env::var("MAX_UPLOAD_BYTES") {
            Ok(raw) => raw
                .parse()
                .with_context(|| format!("MAX_UPLOAD_BYTES is not a byte count: {}", raw))?,
            Err(_) => DEFAULT_MAX_UPLOAD_BYTES,
        };

        let config = Self {
            api_key,
            base_url: env::var("OPENAI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            model: env::var("OPENAI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
            bind_addr,
            max_upload_bytes,
        };

        info!(
            "Config loaded: model={}, base_url={}, bind={}, max_upload={} bytes",
            config.model, config.base_url, config.bind_addr, config.max_upload_bytes
        );
        Ok(config)
    }

    /// Configuration pointing at a specific completion endpoint, used by tests.
    pub fn for_endpoint(base_url: impl Into<String>, api_key: Option<&str>) -> Self {
        Self {
            api_key: api_key.map(str::to_string),
            base_url: base_url.into(),
            model: DEFAULT_MODEL.to_string(),
            bind_addr: ([127, 0, 0, 1], 0).into(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}
