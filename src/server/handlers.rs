use crate::predict::Prediction;
use crate::server::error::ApiError;
use crate::server::SharedPredictor;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

/// `POST /predict` body; a missing `features` key reads as an empty list
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PredictRequest {
    #[serde(default)]
    pub features: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub features: usize,
    pub version: String,
}

/// POST /predict
pub async fn predict(
    State(predictor): State<SharedPredictor>,
    payload: Result<Json<PredictRequest>, JsonRejection>,
) -> Result<Json<Prediction>, ApiError> {
    let Json(request) = payload?;

    let prediction = tokio::task::spawn_blocking(move || predictor.predict(&request.features))
        .await
        .map_err(|e| ApiError::Internal(format!("Prediction task failed: {}", e)))??;

    Ok(Json(prediction))
}

/// GET /health
pub async fn health(State(predictor): State<SharedPredictor>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        features: predictor.num_features(),
        version: crate::VERSION.to_string(),
    })
}
