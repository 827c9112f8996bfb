use clap::Parser;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use market_gateway::auth::JwtVerifier;
use market_gateway::config::Args;
use market_gateway::error::ConfigError;
use market_gateway::models::BeautifyJob;
use market_gateway::rate_limit::{RateLimiter, SystemClock, spawn_sweeper};
use market_gateway::relay::ContractRelay;
use market_gateway::state::AppState;
use market_gateway::upstream::{UpstreamPool, health_checker};
use market_gateway::worker::BeautifyWorker;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // parse cli arguments
    let args = Args::parse();

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    if args.jwt_secret.is_empty() {
        return Err(ConfigError::EmptyJwtSecret.into());
    }

    let client = reqwest::Client::new();
    let relays = Arc::new(UpstreamPool::new("relay", &args.relays)?);
    let llm_backends = Arc::new(UpstreamPool::new("llm", &args.llm_backends)?);
    let health_every = Duration::from_secs(args.health_interval);

    tokio::spawn(health_checker(relays.clone(), client.clone(), "/health", health_every));
    tokio::spawn(health_checker(llm_backends.clone(), client.clone(), "/api/tags", health_every));

    // one limiter for every throttled endpoint
    let limiter = Arc::new(RateLimiter::with_clock(
        Arc::new(SystemClock),
        args.sweep_probability,
    ));
    spawn_sweeper(limiter.clone(), Duration::from_secs(args.sweep_interval.max(1)));

    // spawn the beautify worker
    let (beautify_tx, beautify_rx) = mpsc::channel::<BeautifyJob>(100);
    let worker = BeautifyWorker {
        client: client.clone(),
        backends: llm_backends,
        model: args.llm_model.clone(),
        cache: Arc::new(DashMap::new()),
        ttl: Duration::from_secs(args.cache_ttl),
    };
    tokio::spawn(worker.run(beautify_rx));

    let policies = args.rate_policies();
    let state = Arc::new(AppState {
        limiter,
        policies,
        verifier: JwtVerifier::new(args.jwt_secret.as_bytes()),
        relay: ContractRelay::new(relays, client),
        beautify_tx,
    });

    let app = market_gateway::app(state);

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!(%addr, "Gateway listening");
    info!(
        purchase = %policies.purchase,
        create_market = %policies.create_market,
        beautify = %policies.beautify,
        "Rate limits (max_requests/window_ms)"
    );
    axum::serve(listener, app).await?;
    Ok(())
}
