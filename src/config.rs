//! Runtime settings.
//! Read from the environment first; CLI flags in main.rs override.
//! GEMINI_API_KEY is the only required value.

use std::net::SocketAddr;

use anyhow::Context;

use crate::vision::{DEFAULT_FALLBACK_MODEL, DEFAULT_MODEL};

#[derive(Debug, Clone)]
pub struct Settings {
    pub bind_addr: SocketAddr,
    pub api_key: String,
    /// Ordered model routes; the call falls back along this list on
    /// quota failures only.
    pub model_routes: Vec<String>,
}

impl Settings {
    pub fn from_env() -> anyhow::Result<Self> {
        let bind_addr: SocketAddr = std::env::var("RELAY_BIND_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:8000".to_string())
            .parse()
            .context("RELAY_BIND_ADDR is not a valid socket address")?;

        let api_key = std::env::var("GEMINI_API_KEY")
            .context("GEMINI_API_KEY environment variable not set")?;

        let primary =
            std::env::var("GEMINI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        let fallback = std::env::var("GEMINI_FALLBACK_MODEL")
            .unwrap_or_else(|_| DEFAULT_FALLBACK_MODEL.to_string());

        Ok(Self {
            bind_addr,
            api_key,
            model_routes: build_routes(&primary, &fallback),
        })
    }
}

/// Setting the fallback to the primary (or to empty) disables the
/// fallback hop.
pub fn build_routes(primary: &str, fallback: &str) -> Vec<String> {
    let mut routes = vec![primary.to_string()];
    if !fallback.is_empty() && fallback != primary {
        routes.push(fallback.to_string());
    }
    routes
}
