use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Arg, Command};
use tracing::info;
use tracing_subscriber::EnvFilter;

use kopitalk_relay::config::{Settings, build_routes};
use kopitalk_relay::state::AppState;
use kopitalk_relay::vision::GeminiClient;

#[tokio::main]
async fn main() -> Result<()> {
    init_telemetry();

    // Parse CLI arguments; flags override environment settings.
    let matches = Command::new("kopitalk-relay")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Board-game vision relay: pairs camera frames with piece photos and asks Gemini for grid positions")
        .arg(
            Arg::new("bind")
                .long("bind")
                .value_name("ADDR")
                .help("Socket address to listen on (default: RELAY_BIND_ADDR or 0.0.0.0:8000)"),
        )
        .arg(
            Arg::new("model")
                .long("model")
                .value_name("MODEL")
                .help("Primary Gemini model (default: GEMINI_MODEL or gemini-1.5-pro-latest)"),
        )
        .arg(
            Arg::new("fallback-model")
                .long("fallback-model")
                .value_name("MODEL")
                .help("Quota fallback model; pass an empty string to disable the fallback hop"),
        )
        .get_matches();

    let mut settings = Settings::from_env()?;
    if let Some(bind) = matches.get_one::<String>("bind") {
        settings.bind_addr = bind
            .parse()
            .context("--bind is not a valid socket address")?;
    }
    if matches.contains_id("model") || matches.contains_id("fallback-model") {
        let primary = matches
            .get_one::<String>("model")
            .cloned()
            .unwrap_or_else(|| settings.model_routes[0].clone());
        let fallback = matches
            .get_one::<String>("fallback-model")
            .cloned()
            .unwrap_or_else(|| settings.model_routes.get(1).cloned().unwrap_or_default());
        settings.model_routes = build_routes(&primary, &fallback);
    }

    let vision = GeminiClient::new(settings.api_key.clone(), settings.model_routes.clone())
        .context("failed to build Gemini client")?;
    let state = AppState::new(Arc::new(vision));
    let app = kopitalk_relay::router(state);

    info!(addr = %settings.bind_addr, routes = ?settings.model_routes, "relay listening");
    let listener = tokio::net::TcpListener::bind(settings.bind_addr)
        .await
        .context("failed to bind listen address")?;
    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}

fn init_telemetry() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}
