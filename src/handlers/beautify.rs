use axum::{Json, extract::State};
use std::sync::Arc;
use tokio::sync::oneshot;

use crate::auth::Principal;
use crate::error::{ApiError, ApiResult};
use crate::models::{BeautifyJob, BeautifyRequest, BeautifyResponse};
use crate::state::AppState;
use crate::throttle::{Tier, enforce};

const MAX_TEXT_LEN: usize = 2000;

pub async fn beautify_handler(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Json(payload): Json<BeautifyRequest>,
) -> ApiResult<Json<BeautifyResponse>> {
    let text = payload.text.trim();
    if text.is_empty() {
        return Err(ApiError::InvalidRequest("text must not be empty".into()));
    }
    if text.chars().count() > MAX_TEXT_LEN {
        return Err(ApiError::InvalidRequest(format!(
            "text must be at most {MAX_TEXT_LEN} characters"
        )));
    }
    enforce(&state.limiter, &state.policies, Tier::Beautify, &principal.user_id)?;

    // Create oneshot channel for the worker's answer
    let (response_tx, response_rx) = oneshot::channel();
    let job = BeautifyJob {
        text: text.to_string(),
        response_tx,
    };

    state
        .beautify_tx
        .send(job)
        .await
        .map_err(|_| ApiError::Internal("beautify queue closed".into()))?;

    let result = response_rx
        .await
        .map_err(|_| ApiError::Internal("beautify worker failed to respond".into()))?;

    result.map(Json)
}
