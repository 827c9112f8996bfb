use std::sync::Arc;
use tokio::sync::mpsc;

use crate::auth::JwtVerifier;
use crate::models::BeautifyJob;
use crate::rate_limit::RateLimiter;
use crate::relay::ContractRelay;
use crate::throttle::RatePolicies;

// app's shared state
pub struct AppState {
    pub limiter: Arc<RateLimiter>,
    pub policies: RatePolicies, // per-endpoint throttle tiers
    pub verifier: JwtVerifier,
    pub relay: ContractRelay,
    pub beautify_tx: mpsc::Sender<BeautifyJob>,
}
