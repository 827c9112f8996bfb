use tracing::warn;

use crate::error::ApiError;
use crate::metrics::{RATE_LIMIT_DECISIONS, TRACKED_IDENTIFIERS};
use crate::rate_limit::{RateLimiter, RatePolicy};

// Throttled endpoint families, each with its own bucket per caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    Purchase,
    CreateMarket,
    Beautify,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Purchase => "purchase",
            Tier::CreateMarket => "create_market",
            Tier::Beautify => "beautify",
        }
    }

    pub fn key(&self, identifier: &str) -> String {
        format!("{}:{}", self.as_str(), identifier)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RatePolicies {
    pub purchase: RatePolicy,
    pub create_market: RatePolicy,
    pub beautify: RatePolicy,
}

impl RatePolicies {
    pub fn for_tier(&self, tier: Tier) -> RatePolicy {
        match tier {
            Tier::Purchase => self.purchase,
            Tier::CreateMarket => self.create_market,
            Tier::Beautify => self.beautify,
        }
    }
}

// Check `identifier` against the tier's policy, turning a rejection into a 429
pub fn enforce(
    limiter: &RateLimiter,
    policies: &RatePolicies,
    tier: Tier,
    identifier: &str,
) -> Result<(), ApiError> {
    let decision = limiter.check_and_record(&tier.key(identifier), policies.for_tier(tier))?;
    TRACKED_IDENTIFIERS.set(limiter.len() as f64);

    if decision.allowed {
        RATE_LIMIT_DECISIONS
            .with_label_values(&[tier.as_str(), "allowed"])
            .inc();
        return Ok(());
    }

    RATE_LIMIT_DECISIONS
        .with_label_values(&[tier.as_str(), "limited"])
        .inc();
    let retry_after_seconds = decision.retry_after_seconds.unwrap_or(0);
    warn!(
        tier = tier.as_str(),
        identifier = %identifier,
        retry_after_seconds,
        "Caller throttled"
    );
    Err(ApiError::RateLimited { retry_after_seconds })
}
