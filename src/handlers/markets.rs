use axum::{
    Json,
    extract::{Path, State},
};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

use crate::auth::{Principal, Role, require_role};
use crate::error::{ApiError, ApiResult};
use crate::models::{
    CreateMarketRequest, MarketActionResponse, PurchaseTicketsRequest, ResolveMarketRequest,
};
use crate::state::AppState;
use crate::throttle::{Tier, enforce};

const MAX_QUESTION_LEN: usize = 500;

fn validate_market(req: &CreateMarketRequest) -> ApiResult<()> {
    let question = req.question.trim();
    if question.is_empty() {
        return Err(ApiError::InvalidRequest("question must not be empty".into()));
    }
    if question.chars().count() > MAX_QUESTION_LEN {
        return Err(ApiError::InvalidRequest(format!(
            "question must be at most {MAX_QUESTION_LEN} characters"
        )));
    }

    let mut seen = HashSet::new();
    for outcome in &req.outcomes {
        let normalized = outcome.trim().to_lowercase();
        if normalized.is_empty() {
            return Err(ApiError::InvalidRequest("outcomes must not be blank".into()));
        }
        if !seen.insert(normalized) {
            return Err(ApiError::InvalidRequest(format!("duplicate outcome {outcome:?}")));
        }
    }
    if seen.len() < 2 {
        return Err(ApiError::InvalidRequest("a market needs at least two outcomes".into()));
    }

    if req.closes_at <= chrono::Utc::now() {
        return Err(ApiError::InvalidRequest("closes_at must be in the future".into()));
    }
    Ok(())
}

pub async fn create_market_handler(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Json(payload): Json<CreateMarketRequest>,
) -> ApiResult<Json<MarketActionResponse>> {
    validate_market(&payload)?;
    enforce(&state.limiter, &state.policies, Tier::CreateMarket, &principal.user_id)?;

    let outcomes: Vec<&str> = payload.outcomes.iter().map(|o| o.trim()).collect();
    let result = state
        .relay
        .invoke(
            "create_market",
            &serde_json::json!({
                "creator": principal.user_id,
                "wallet": principal.wallet,
                "question": payload.question.trim(),
                "outcomes": outcomes,
                "closes_at": payload.closes_at,
                "description": payload.description,
            }),
        )
        .await?;

    info!(user_id = %principal.user_id, "Market created");
    Ok(Json(MarketActionResponse {
        action: "create_market".to_string(),
        market_id: result.get("market_id").and_then(|v| v.as_u64()),
        result,
    }))
}

pub async fn purchase_tickets_handler(
    State(state): State<Arc<AppState>>,
    Path(market_id): Path<u64>,
    principal: Principal,
    Json(payload): Json<PurchaseTicketsRequest>,
) -> ApiResult<Json<MarketActionResponse>> {
    if payload.ticket_count == 0 {
        return Err(ApiError::InvalidRequest("ticket_count must be at least 1".into()));
    }
    let wallet = principal.wallet.as_deref().ok_or_else(|| {
        ApiError::InvalidRequest("a linked wallet is required to buy tickets".into())
    })?;
    enforce(&state.limiter, &state.policies, Tier::Purchase, &principal.user_id)?;

    let result = state
        .relay
        .invoke(
            "buy_tickets",
            &serde_json::json!({
                "market_id": market_id,
                "outcome": payload.outcome,
                "ticket_count": payload.ticket_count,
                "buyer": principal.user_id,
                "wallet": wallet,
            }),
        )
        .await?;

    info!(
        user_id = %principal.user_id,
        market_id,
        tickets = payload.ticket_count,
        "Tickets purchased"
    );
    Ok(Json(MarketActionResponse {
        action: "buy_tickets".to_string(),
        market_id: Some(market_id),
        result,
    }))
}

pub async fn resolve_market_handler(
    State(state): State<Arc<AppState>>,
    Path(market_id): Path<u64>,
    principal: Principal,
    Json(payload): Json<ResolveMarketRequest>,
) -> ApiResult<Json<MarketActionResponse>> {
    require_role(&principal, Role::Admin)?;

    let result = state
        .relay
        .invoke(
            "resolve_market",
            &serde_json::json!({
                "market_id": market_id,
                "winning_outcome": payload.winning_outcome,
                "resolved_by": principal.user_id,
            }),
        )
        .await?;

    info!(admin = %principal.user_id, market_id, "Market resolved");
    Ok(Json(MarketActionResponse {
        action: "resolve_market".to_string(),
        market_id: Some(market_id),
        result,
    }))
}

pub async fn cancel_market_handler(
    State(state): State<Arc<AppState>>,
    Path(market_id): Path<u64>,
    principal: Principal,
) -> ApiResult<Json<MarketActionResponse>> {
    require_role(&principal, Role::Admin)?;

    let result = state
        .relay
        .invoke(
            "cancel_market",
            &serde_json::json!({
                "market_id": market_id,
                "cancelled_by": principal.user_id,
            }),
        )
        .await?;

    info!(admin = %principal.user_id, market_id, "Market cancelled");
    Ok(Json(MarketActionResponse {
        action: "cancel_market".to_string(),
        market_id: Some(market_id),
        result,
    }))
}
