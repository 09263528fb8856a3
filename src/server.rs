use std::sync::Arc;
use std::time::Instant;

use axum::http::StatusCode;
use axum::{Json, Router, routing::post};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::error::TableError;
use crate::interface::SessionInterface;

#[derive(Deserialize)]
pub struct EvalRequest {
    pub script: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct EvalResponse {
    pub id: u64,
    pub status: String,
    pub elapsed_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn status_of(error: &TableError) -> StatusCode {
    match error {
        TableError::Parse { .. } | TableError::Argument(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::UNPROCESSABLE_ENTITY,
    }
}

pub fn router(interface: Arc<SessionInterface>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([axum::http::Method::POST])
        .allow_headers(Any);
    Router::new()
        .route(
            "/v1/eval",
            post(move |Json(req): Json<EvalRequest>| {
                let iface = Arc::clone(&interface);
                async move {
                    // the session worker blocks, so wait for it off the async runtime
                    let outcome = tokio::task::spawn_blocking(move || {
                        let started = Instant::now();
                        let handle = iface.submit(req.script);
                        let id = handle.id.value();
                        let result = handle.wait();
                        (id, started.elapsed(), result)
                    })
                    .await;
                    let (id, elapsed, result) = match outcome {
                        Ok(done) => done,
                        Err(e) => {
                            warn!(error = %e, "join error");
                            let body = EvalResponse {
                                id: 0,
                                status: "error".into(),
                                elapsed_ms: 0.0,
                                result: None,
                                error: Some("join error".into()),
                            };
                            return (StatusCode::INTERNAL_SERVER_ERROR, Json(body));
                        }
                    };
                    let elapsed_ms = elapsed.as_secs_f64() * 1000.0;
                    match result {
                        Ok(result) => {
                            info!(id, ms = elapsed_ms, "eval complete");
                            let body = EvalResponse {
                                id,
                                status: "ok".into(),
                                elapsed_ms,
                                result: Some(result),
                                error: None,
                            };
                            (StatusCode::OK, Json(body))
                        }
                        Err(e) => {
                            let status = status_of(&e);
                            let msg = e.to_string();
                            warn!(id, %msg, code = %status.as_u16(), "eval error");
                            let body = EvalResponse {
                                id,
                                status: "error".into(),
                                elapsed_ms,
                                result: None,
                                error: Some(msg),
                            };
                            (status, Json(body))
                        }
                    }
                }
            }),
        )
        .layer(cors)
}

/// Serves the router on `addr` until the process is stopped.
pub async fn serve(addr: &str, interface: Arc<SessionInterface>) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "listening");
    axum::serve(listener, router(interface)).await
}
