use clap::Parser;

use crate::rate_limit::{DEFAULT_SWEEP_PROBABILITY, RatePolicy, parse_sweep_probability};
use crate::throttle::RatePolicies;

// CLI argument structure
#[derive(Parser, Debug, Clone)]
#[command(name = "market-gateway")]
#[command(about = "API gateway for the prediction market contract relay")]
pub struct Args {
    // Port to run the server on
    #[arg(short, long, default_value_t = 8080)]
    pub port: u16,

    // Shared secret for verifying HS256 bearer tokens
    #[arg(long, env = "MARKET_GATEWAY_JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: String,

    // Contract relay servers (comma-separated)
    // Example: "localhost:8545,localhost:8546"
    #[arg(short, long, env = "MARKET_GATEWAY_RELAYS", default_value = "localhost:8545")]
    pub relays: String,

    // LLM backends used by beautify (comma-separated)
    #[arg(long, env = "MARKET_GATEWAY_LLM_BACKENDS", default_value = "localhost:11434")]
    pub llm_backends: String,

    #[arg(long, default_value = "llama3")]
    pub llm_model: String,

    // Beautify cache TTL in seconds
    #[arg(short, long, default_value_t = 300)]
    pub cache_ttl: u64,

    // Ticket purchases per caller, as <max_requests>/<window_ms>
    #[arg(long, default_value = "5/60000")]
    pub purchase_limit: RatePolicy,

    // Market creations per caller
    #[arg(long, default_value = "3/3600000")]
    pub create_market_limit: RatePolicy,

    // Beautify calls per caller
    #[arg(long, default_value = "10/60000")]
    pub beautify_limit: RatePolicy,

    // Seconds between background rate limiter sweeps
    #[arg(long, default_value_t = 60)]
    pub sweep_interval: u64,

    // Chance that a single request also sweeps the limiter
    #[arg(long, default_value_t = DEFAULT_SWEEP_PROBABILITY, value_parser = parse_sweep_probability)]
    pub sweep_probability: f64,

    // Health check interval for relays and LLM backends
    #[arg(long, default_value_t = 30)]
    pub health_interval: u64,

    // Fallback log filter when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Args {
    pub fn rate_policies(&self) -> RatePolicies {
        RatePolicies {
            purchase: self.purchase_limit,
            create_market: self.create_market_limit,
            beautify: self.beautify_limit,
        }
    }
}
