use axum::{
    body::Bytes,
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde_json::{Map, Value};
use std::{path::PathBuf, sync::Arc};
use tower_http::cors::CorsLayer;

use crate::{
    config::absolute,
    error::{AppError, NO_JSON},
    features::{self, BookingFeatures, SCHEMA},
    model::ModelHost,
    static_files::{self, INDEX},
    types::{DebugOut, HealthOut, PredictRequest, PredictionOut},
};

// ---------- Server state ----------

#[derive(Clone)]
pub struct AppState {
    pub host: Arc<ModelHost>,
    pub static_dir: Arc<PathBuf>,
    pub log_predictions: bool,
}

impl AppState {
    pub fn new(host: ModelHost, static_dir: PathBuf) -> Self {
        Self {
            host: Arc::new(host),
            static_dir: Arc::new(static_dir),
            log_predictions: false,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/predict", post(predict))
        .route("/health", get(health))
        .route("/debug", get(debug))
        .route("/", get(static_files::serve_root))
        .route("/*path", get(static_files::serve_path))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

// ---------- Request parsing ----------

/// Extracts the raw feature mapping from a `{"features": {...}}` body.
pub fn parse_features(body: &[u8]) -> Result<Map<String, Value>, AppError> {
    let value: Value = match serde_json::from_slice(body) {
        Ok(Value::Null) | Err(_) => return Err(AppError::InvalidRequest(NO_JSON.to_string())),
        Ok(v) => v,
    };
    if !value.is_object() {
        return Err(AppError::InvalidRequest(
            "request body must be a JSON object".to_string(),
        ));
    }
    let req: PredictRequest = serde_json::from_value(value)
        .map_err(|e| AppError::InvalidRequest(format!("malformed features: {}", e)))?;
    Ok(req.features)
}

// ---------- Handlers ----------

async fn predict(State(state): State<AppState>, body: Bytes) -> Result<Json<PredictionOut>, AppError> {
    if !state.host.is_loaded() {
        return Err(AppError::ModelUnavailable);
    }

    let raw = parse_features(&body)?;
    let features = features::derive(&raw);

    // Debug signal so we can confirm what the model actually sees
    if state.log_predictions {
        log_row(&features);
    }

    let proba = state.host.score(&features)?;
    Ok(Json(PredictionOut {
        cancellation_probability: percent(proba),
        prediction_time: chrono::Local::now()
            .naive_local()
            .format("%Y-%m-%dT%H:%M:%S%.6f")
            .to_string(),
    }))
}

async fn health(State(state): State<AppState>) -> Json<HealthOut> {
    Json(HealthOut {
        status: "healthy".to_string(),
        model_loaded: state.host.is_loaded(),
        static_folder: state.static_dir.display().to_string(),
        static_folder_exists: static_files::exists(&state.static_dir).await,
    })
}

async fn debug(State(state): State<AppState>) -> Json<DebugOut> {
    let dir = state.static_dir.as_path();
    let exists = static_files::exists(dir).await;
    let (files, has_index) = if exists {
        (
            Some(static_files::list_entries(dir).await.unwrap_or_default()),
            Some(static_files::exists(&dir.join(INDEX)).await),
        )
    } else {
        (None, None)
    };
    Json(DebugOut {
        static_folder: dir.display().to_string(),
        absolute_path: absolute(dir).display().to_string(),
        exists,
        files,
        has_index,
    })
}

/// Probability as a percentage rounded to two decimals.
pub fn percent(p: f64) -> f64 {
    (p * 10_000.0).round() / 100.0
}

fn log_row(features: &BookingFeatures) {
    let row = features.to_row();
    let numeric: Vec<f64> = row.iter().filter_map(|v| v.as_number()).collect();
    let nz = numeric.iter().filter(|x| **x != 0.0).count();
    let mean = if numeric.is_empty() {
        0.0
    } else {
        numeric.iter().sum::<f64>() / (numeric.len() as f64)
    };
    let mut sample = vec![];
    for (col, value) in SCHEMA.iter().zip(&row).take(6) {
        sample.push(format!("{}={:?}", col.name, value));
    }
    tracing::info!(
        "derived row in_dim={} nonzero={} mean={:.3} season={} room_pair={} market_pair={} sample=[{}]",
        row.len(),
        nz,
        mean,
        features.arrival_season,
        features.room_pair,
        features.market_pair,
        sample.join(", ")
    );
}
