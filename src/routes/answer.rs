use std::time::{Duration, Instant};

use axum::{
    extract::{rejection::JsonRejection, State},
    routing::post,
    Json, Router,
};
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::agents::RequestOptions;
use crate::models::{AnswerRequest, AnswerResponse, AppState};
use crate::types::AppError;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/answer", post(post_answer))
        .with_state(state)
}

pub async fn post_answer(
    State(state): State<AppState>,
    payload: Result<Json<AnswerRequest>, JsonRejection>,
) -> Result<Json<AnswerResponse>, AppError> {
    let Json(request) = payload.map_err(|rejection| AppError::InvalidRequest(rejection.body_text()))?;
    request
        .validate()
        .map_err(|e| AppError::InvalidRequest(e.to_string()))?;

    let request_id = Uuid::new_v4();
    info!(%request_id, query_len = request.query.len(), "Received answer request");
    let started = Instant::now();

    let options = request
        .timeout_secs
        .map(|secs| RequestOptions::with_deadline(Duration::from_secs(secs)))
        .unwrap_or_default()
        .with_request_id(request_id);
    let content = state.pipeline.answer_with(&request.query, options).await?;

    let response = AnswerResponse {
        request_id,
        content,
        response_time_ms: started.elapsed().as_millis() as u64,
    };
    info!(%request_id, response_time_ms = response.response_time_ms, "Answer sent");

    Ok(Json(response))
}
