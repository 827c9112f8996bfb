use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::time::{Duration, interval};
use tracing::{info, warn};

use crate::error::ConfigError;

// Single upstream server (contract relay or LLM backend)
pub struct Upstream {
    pub url: String,
    healthy: AtomicBool,
}

impl Upstream {
    pub fn new(url: String) -> Self {
        Self {
            url,
            healthy: AtomicBool::new(true),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Relaxed)
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::Relaxed);
    }
}

// Round-robin pool over one kind of upstream
pub struct UpstreamPool {
    pub name: &'static str,
    upstreams: Vec<Arc<Upstream>>,
    current: AtomicUsize,
}

impl UpstreamPool {
    // Create from comma-separated hosts "localhost:8545, localhost:8546"
    pub fn new(name: &'static str, list: &str) -> Result<Self, ConfigError> {
        let upstreams: Vec<Arc<Upstream>> = list
            .split(',')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(|url| {
                let full_url = if url.starts_with("http") {
                    url.trim_end_matches('/').to_string()
                } else {
                    format!("http://{}", url.trim_end_matches('/'))
                };
                Arc::new(Upstream::new(full_url))
            })
            .collect();

        if upstreams.is_empty() {
            return Err(ConfigError::NoUpstreams(name));
        }

        for (i, u) in upstreams.iter().enumerate() {
            info!(pool = name, index = i + 1, url = %u.url, "Registered upstream");
        }

        Ok(Self {
            name,
            upstreams,
            current: AtomicUsize::new(0),
        })
    }

    // Next healthy upstream (round-robin)
    pub fn next_healthy(&self) -> Option<Arc<Upstream>> {
        let len = self.upstreams.len();
        let start = self.current.fetch_add(1, Ordering::Relaxed) % len;

        (0..len)
            .map(|i| &self.upstreams[(start + i) % len])
            .find(|u| u.is_healthy())
            .map(Arc::clone)
    }

    pub fn all(&self) -> &[Arc<Upstream>] {
        &self.upstreams
    }
}

// Polls every upstream's health path and flips its flag
pub async fn health_checker(
    pool: Arc<UpstreamPool>,
    client: reqwest::Client,
    health_path: &'static str,
    check_interval: Duration,
) {
    let mut ticker = interval(check_interval);
    info!(pool = pool.name, interval = ?check_interval, "Health checker started");

    loop {
        ticker.tick().await;

        for upstream in pool.all() {
            let url = format!("{}{}", upstream.url, health_path);
            let was_healthy = upstream.is_healthy();

            let is_healthy = match client.get(&url).timeout(Duration::from_secs(5)).send().await {
                Ok(res) => res.status().is_success(),
                Err(_) => false,
            };
            upstream.set_healthy(is_healthy);

            if was_healthy != is_healthy {
                if is_healthy {
                    info!(pool = pool.name, url = %upstream.url, "Upstream is now healthy");
                } else {
                    warn!(pool = pool.name, url = %upstream.url, "Upstream is now unhealthy");
                }
            }
        }
    }
}
