//! HTTP surface of the service.

pub mod error;
pub mod handlers;
pub mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use log::info;

pub use error::ServerError;
pub use state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(handlers::home))
        .route("/predict", post(handlers::predict))
        .route("/run-eda", get(handlers::run_eda))
        .route("/run-ml", get(handlers::run_ml))
        .route("/run-dt", get(handlers::run_dt))
        .route("/run-lr", get(handlers::run_lr))
        .route("/run-rm", get(handlers::run_rm))
        .route("/run-xgboost", get(handlers::run_xgboost))
        .route("/run-svm", get(handlers::run_svm))
        .with_state(state)
}

/// Bind `addr` and serve until the process is stopped.
pub async fn serve(addr: SocketAddr, state: AppState) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, router(Arc::new(state))).await
}
