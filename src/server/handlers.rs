//! HTTP request handlers

use std::sync::Arc;

use axum::{body::Bytes, extract::State, Json};
use log::info;
use serde_json::Value;

use crate::eda::{run_eda as eda_pipeline, EdaBundle};
use crate::error::InputValidationError;
use crate::predict::{handle_predict, PredictResponse};
use crate::report::{run_dt as dt_pipeline, run_ml as ml_pipeline, DtReport, MlReport};

use super::error::{Result, ServerError};
use super::state::AppState;

pub const WELCOME: &str = "Welcome to the Bank Customer Churn Prediction API!";

pub async fn home() -> Json<Value> {
    Json(serde_json::json!({ "message": WELCOME }))
}

/// Score one customer with every registered model.
pub async fn predict(State(state): State<Arc<AppState>>, body: Bytes) -> Result<Json<PredictResponse>> {
    let body: Value = serde_json::from_slice(&body).map_err(|_| {
        ServerError::from(InputValidationError::InvalidInput {
            field: "body".into(),
        })
    })?;
    let response = handle_predict(&state.registry, &body)?;
    info!("predicted with {} models", response.predictions.len());
    Ok(Json(response))
}

pub async fn run_eda(State(state): State<Arc<AppState>>) -> Result<Json<EdaBundle>> {
    let bundle = tokio::task::spawn_blocking(move || {
        eda_pipeline(&state.settings.data_path, &state.renderer)
    })
    .await??;
    Ok(Json(bundle))
}

pub async fn run_ml(State(state): State<Arc<AppState>>) -> Result<Json<MlReport>> {
    let report = tokio::task::spawn_blocking(move || {
        ml_pipeline(
            &state.registry,
            &state.settings.data_path,
            &state.settings.split,
            &state.renderer,
        )
    })
    .await??;
    Ok(Json(report))
}

pub async fn run_dt(State(state): State<Arc<AppState>>) -> Result<Json<DtReport>> {
    let report = tokio::task::spawn_blocking(move || {
        dt_pipeline(
            &state.registry,
            &state.settings.data_path,
            &state.settings.split,
            &state.renderer,
        )
    })
    .await??;
    Ok(Json(report))
}

// Not implemented yet; the routes only reserve the paths.

pub async fn run_lr() -> &'static str {
    "Logistic Regression results are not available yet"
}

pub async fn run_rm() -> &'static str {
    "Random Forest results are not available yet"
}

pub async fn run_xgboost() -> &'static str {
    "XGBoost results are not available yet"
}

pub async fn run_svm() -> &'static str {
    "SVM results are not available yet"
}
