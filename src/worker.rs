use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::cache::{BeautifyCache, CacheEntry, evict_expired, make_cache_key};
use crate::error::ApiError;
use crate::metrics::{CACHE_HITS, CACHE_MISSES, CACHE_SIZE, UPSTREAM_FAILURES};
use crate::models::{BeautifyJob, BeautifyResponse, GenerateRequest, GenerateResponse};
use crate::upstream::UpstreamPool;

const PROMPT: &str = "Rewrite the following prediction market question so it is clear, \
neutral and has an unambiguous resolution. Reply with the rewritten question only.\n\n";

pub struct BeautifyWorker {
    pub client: reqwest::Client,
    pub backends: Arc<UpstreamPool>,
    pub model: String,
    pub cache: Arc<BeautifyCache>,
    pub ttl: Duration,
}

impl BeautifyWorker {
    // Processes queued beautify jobs one by one until every sender is gone
    pub async fn run(self, mut rx: mpsc::Receiver<BeautifyJob>) {
        info!(model = %self.model, "Beautify worker started");

        while let Some(job) = rx.recv().await {
            let result = self.beautify(&job.text).await;
            // caller may have gone away; nothing to do then
            let _ = job.response_tx.send(result);
        }

        info!("Beautify worker stopped");
    }

    async fn beautify(&self, text: &str) -> Result<BeautifyResponse, ApiError> {
        let cache_key = make_cache_key(&self.model, text);

        if let Some(entry) = self.cache.get(&cache_key) {
            if entry.is_fresh(self.ttl) {
                CACHE_HITS.inc();
                debug!("Beautify cache hit");
                return Ok(BeautifyResponse {
                    text: entry.text.clone(),
                    cached: true,
                });
            }
        }
        CACHE_MISSES.inc();

        let backend = self
            .backends
            .next_healthy()
            .ok_or(ApiError::NoUpstream("llm"))?;
        debug!(backend = %backend.url, "Beautify cache miss, calling LLM");

        let request = GenerateRequest {
            model: self.model.clone(),
            prompt: format!("{PROMPT}{}", text.trim()),
            stream: false,
        };

        let res = self
            .client
            .post(format!("{}/api/generate", backend.url))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                backend.set_healthy(false);
                UPSTREAM_FAILURES.with_label_values(&["llm"]).inc();
                warn!(backend = %backend.url, error = %e, "LLM backend failed, marked unhealthy");
                ApiError::Upstream(format!("llm request failed: {e}"))
            })?;

        if !res.status().is_success() {
            UPSTREAM_FAILURES.with_label_values(&["llm"]).inc();
            return Err(ApiError::Upstream(format!("llm answered {}", res.status())));
        }

        let body = res
            .json::<GenerateResponse>()
            .await
            .map_err(|e| ApiError::Upstream(format!("llm parse error: {e}")))?;
        let rewritten = body.response.trim().to_string();
        if rewritten.is_empty() {
            return Err(ApiError::Upstream("llm returned an empty rewrite".to_string()));
        }

        let evicted = evict_expired(&self.cache, self.ttl);
        if evicted > 0 {
            debug!(evicted, "Evicted expired beautify cache entries");
        }
        self.cache.insert(
            cache_key,
            CacheEntry {
                text: rewritten.clone(),
                created_at: Instant::now(),
            },
        );
        CACHE_SIZE.set(self.cache.len() as f64);

        Ok(BeautifyResponse {
            text: rewritten,
            cached: false,
        })
    }
}
