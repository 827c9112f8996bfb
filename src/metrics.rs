use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Gauge, Histogram, register_counter, register_counter_vec, register_gauge,
    register_histogram,
};


lazy_static! {
    pub static ref REQUEST_TOTAL: Counter =
        register_counter!("market_gateway_requests_total", "Total number of API requests").unwrap();
    pub static ref REQUEST_LATENCY: Histogram = register_histogram!(
        "market_gateway_request_latency_seconds",
        "Request latency in seconds"
    )
    .unwrap();
    pub static ref RATE_LIMIT_DECISIONS: CounterVec = register_counter_vec!(
        "market_gateway_rate_limit_decisions_total",
        "Rate limiter decisions by tier and outcome",
        &["tier", "outcome"]
    )
    .unwrap();
    pub static ref TRACKED_IDENTIFIERS: Gauge = register_gauge!(
        "market_gateway_rate_limit_identifiers",
        "Identifiers currently tracked by the rate limiter"
    )
    .unwrap();
    pub static ref SWEPT_RECORDS: Counter = register_counter!(
        "market_gateway_rate_limit_swept_total",
        "Idle rate limit records removed by sweeps"
    )
    .unwrap();
    pub static ref UPSTREAM_FAILURES: CounterVec = register_counter_vec!(
        "market_gateway_upstream_failures_total",
        "Failed calls to upstream services",
        &["upstream"]
    )
    .unwrap();
    pub static ref CACHE_HITS: Counter =
        register_counter!("market_gateway_beautify_cache_hits_total", "Beautify cache hits").unwrap();
    pub static ref CACHE_MISSES: Counter =
        register_counter!("market_gateway_beautify_cache_misses_total", "Beautify cache misses").unwrap();
    pub static ref CACHE_SIZE: Gauge =
        register_gauge!("market_gateway_beautify_cache_size", "Current number of items in beautify cache").unwrap();
}
