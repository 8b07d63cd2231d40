//! HTTP server fronted by the admission gate.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{error, info};

use super::middleware::{admission_middleware, EdgeState};
use crate::error::{Result, SitegateError};

/// HTTP server that gates every route through the admission controller.
pub struct EdgeServer {
    /// Address to bind to
    addr: SocketAddr,
    /// State shared by the middleware
    state: EdgeState,
}

impl EdgeServer {
    /// Create a new server.
    pub fn new(addr: SocketAddr, state: EdgeState) -> Self {
        Self { addr, state }
    }

    /// Wrap `app` with the admission middleware.
    ///
    /// Routes and the fallback must already be registered on `app`.
    pub fn router(&self, app: Router) -> Router {
        app.layer(axum::middleware::from_fn_with_state(
            self.state.clone(),
            admission_middleware,
        ))
    }

    /// Serve `app` until `signal` resolves.
    pub async fn serve_with_shutdown<F>(self, app: Router, signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.addr).await?;
        let app = self.router(app);

        info!(
            addr = %listener.local_addr()?,
            "Starting HTTP server with graceful shutdown"
        );

        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(signal)
        .await
        .map_err(|e| {
            error!(error = %e, "HTTP server failed");
            SitegateError::Server(e.to_string())
        })
    }
}

/// Routes served by the standalone binary: `/health` and a JSON 404 fallback.
pub fn default_routes() -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .fallback(not_found_handler)
}

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

async fn not_found_handler() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({ "error": "Not found" })),
    )
}
