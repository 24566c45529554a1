//! HTTP responder serving published artifacts.
//!
//! - `GET /` - liveness message
//! - `GET /data/:month` - the artifact for that period as `text/csv`, or 404

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use serde_json::json;
use tracing::{error, info};

use crate::config::Period;
use crate::output::LocalArtifactStore;

pub fn router(artifacts: LocalArtifactStore) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/data/:month", get(artifact))
        .with_state(Arc::new(artifacts))
}

/// Binds `addr` and serves until the process is stopped.
pub async fn serve(addr: SocketAddr, artifacts: LocalArtifactStore) -> anyhow::Result<()> {
    let dir = artifacts.dir().display().to_string();
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, dir = %dir, "Delivery service listening");
    axum::serve(listener, router(artifacts)).await?;
    Ok(())
}

async fn index() -> Json<serde_json::Value> {
    Json(json!({ "message": "Delivery service is running." }))
}

async fn artifact(
    State(artifacts): State<Arc<LocalArtifactStore>>,
    Path(month): Path<String>,
) -> Response {
    let Ok(period) = month.parse::<Period>() else {
        return not_found();
    };

    let read = tokio::task::spawn_blocking(move || artifacts.read_artifact(period))
        .await
        .unwrap_or_else(|e| Err(io::Error::other(e)));

    match read {
        Ok(Some(bytes)) => ([(header::CONTENT_TYPE, "text/csv")], bytes).into_response(),
        Ok(None) => not_found(),
        Err(e) => {
            error!(period = %period, error = %e, "Failed to read artifact");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Failed to read file" })),
            )
                .into_response()
        }
    }
}

fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": "File not found" })),
    )
        .into_response()
}
