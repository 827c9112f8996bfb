use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::oneshot;

use crate::error::ApiError;

// POST /api/markets
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct CreateMarketRequest {
    pub question: String,
    pub outcomes: Vec<String>,
    pub closes_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

// POST /api/markets/{id}/tickets
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct PurchaseTicketsRequest {
    pub ticket_count: u32,
    // index into the market's outcomes
    pub outcome: u32,
}

// POST /api/markets/{id}/resolve
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct ResolveMarketRequest {
    pub winning_outcome: u32,
}

// What the gateway answers for any relayed contract call
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct MarketActionResponse {
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub market_id: Option<u64>,
    pub result: Value,
}

// POST /api/beautify
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct BeautifyRequest {
    pub text: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct BeautifyResponse {
    pub text: String,
    pub cached: bool,
}

// Ollama-compatible generate request format
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct GenerateRequest {
    pub model: String,
    pub prompt: String,
    #[serde(default)]
    pub stream: bool,
}

// Ollama-compatible generate response format
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct GenerateResponse {
    pub model: String,
    pub response: String,
}

// Queued beautify call - holds the text + response channel
pub struct BeautifyJob {
    pub text: String,
    pub response_tx: oneshot::Sender<Result<BeautifyResponse, ApiError>>,
}
