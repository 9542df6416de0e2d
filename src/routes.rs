//! HTTP surface.
//! Device-facing frame uploads plus the operator/admin endpoints. All
//! handlers return `RelayError` for failure mapping; request tracing and
//! CORS come from tower-http layers on the router.

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::{StatusCode, header};
use axum::response::{Html, IntoResponse};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::error::RelayError;
use crate::state::AppState;
use crate::turn;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(|| async { StatusCode::OK }))
        .route("/version", get(version))
        .route("/device/submit-image", post(submit_image))
        .route("/admin/process-turn", post(process_turn))
        .route("/admin/status", get(admin_status))
        .route("/admin/latest-image/:device_id", get(latest_image))
        .route("/admin", get(admin_page))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn version() -> Json<serde_json::Value> {
    Json(json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[derive(Deserialize)]
struct SubmitQuery {
    device_id: String,
}

/// Raw-body frame upload from the camera device.
async fn submit_image(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SubmitQuery>,
    body: Bytes,
) -> Result<Json<serde_json::Value>, RelayError> {
    if body.is_empty() {
        return Err(RelayError::InvalidInput("No image data received.".into()));
    }

    info!(device_id = %query.device_id, bytes = body.len(), "frame received");
    state.record_frame(&query.device_id, body.to_vec()).await;

    Ok(Json(json!({
        "status": "success",
        "message": format!("Image received from {}.", query.device_id),
    })))
}

#[derive(Deserialize)]
struct TurnQuery {
    device_id: String,
    session_id: String,
}

/// Operator-facing turn request: multipart with a `piece_image` file.
async fn process_turn(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TurnQuery>,
    mut multipart: Multipart,
) -> Result<Json<serde_json::Value>, RelayError> {
    let mut piece_bytes = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| RelayError::InvalidInput(format!("invalid multipart body: {e}")))?
    {
        if field.name() == Some("piece_image") {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| RelayError::InvalidInput(format!("invalid multipart body: {e}")))?;
            piece_bytes = Some(bytes);
            break;
        }
    }
    let piece_bytes = piece_bytes
        .filter(|b| !b.is_empty())
        .ok_or_else(|| RelayError::InvalidInput("missing piece_image upload".into()))?;

    info!(
        device_id = %query.device_id,
        session_id = %query.session_id,
        "processing turn"
    );
    let outcome =
        turn::process_turn(&state, &query.device_id, &query.session_id, &piece_bytes).await?;

    Ok(Json(json!({
        "status": "success",
        "processed_data": outcome.processed_data,
        "raw_model_response": outcome.raw_response,
    })))
}

/// Device registry with lazily derived online/offline status, plus
/// preview URLs for cached frames.
async fn admin_status(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let now = Utc::now();
    let devices: HashMap<String, serde_json::Value> = state
        .devices
        .read()
        .await
        .iter()
        .map(|(id, record)| {
            (
                id.clone(),
                json!({
                    "last_seen": record.last_seen,
                    "status": record.status_at(now),
                }),
            )
        })
        .collect();

    let latest_images: HashMap<String, String> = state
        .images
        .read()
        .await
        .keys()
        .map(|id| (id.clone(), format!("/admin/latest-image/{id}")))
        .collect();

    Json(json!({
        "devices": devices,
        "latest_images": latest_images,
    }))
}

async fn latest_image(
    State(state): State<Arc<AppState>>,
    Path(device_id): Path<String>,
) -> Result<impl IntoResponse, RelayError> {
    let bytes = state
        .latest_image(&device_id)
        .await
        .ok_or_else(|| RelayError::NotFound("No image found.".into()))?;
    Ok(([(header::CONTENT_TYPE, "image/jpeg")], bytes))
}

async fn admin_page() -> Html<&'static str> {
    Html(ADMIN_HTML)
}

/// Embedded operator dashboard; polls /admin/status and previews frames.
const ADMIN_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
  <title>Board Relay Admin</title>
  <style>
    body { font-family: sans-serif; margin: 2em; }
    .device { border: 1px solid #ccc; padding: 1em; margin-bottom: 1em; }
    .online { color: green; }
    .offline { color: red; }
    img { max-width: 320px; display: block; margin-top: 0.5em; }
  </style>
</head>
<body>
  <h1>Connected Devices</h1>
  <div id="devices">Loading...</div>
  <script>
    async function refresh() {
      const res = await fetch('/admin/status');
      const data = await res.json();
      const container = document.getElementById('devices');
      container.innerHTML = '';
      for (const [id, info] of Object.entries(data.devices)) {
        const div = document.createElement('div');
        div.className = 'device';
        div.innerHTML = `<strong>${id}</strong>
          <span class="${info.status}">${info.status}</span>
          <div>last seen: ${info.last_seen}</div>`;
        const url = data.latest_images[id];
        if (url) {
          const img = document.createElement('img');
          img.src = `${url}?t=${Date.now()}`;
          div.appendChild(img);
        }
        container.appendChild(div);
      }
      if (Object.keys(data.devices).length === 0) {
        container.textContent = 'No devices have reported yet.';
      }
    }
    refresh();
    setInterval(refresh, 5000);
  </script>
</body>
</html>
"#;
