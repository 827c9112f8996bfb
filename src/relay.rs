use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::ApiError;
use crate::metrics::UPSTREAM_FAILURES;
use crate::upstream::UpstreamPool;

const RELAY_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for the service that submits contract calls and mirrors their
/// results into the market database.
///
/// Each operation is a POST of JSON params to `<relay>/rpc/<method>`. The
/// relay's JSON answer is handed back untouched.
#[derive(Clone)]
pub struct ContractRelay {
    pool: Arc<UpstreamPool>,
    client: reqwest::Client,
}

impl ContractRelay {
    pub fn new(pool: Arc<UpstreamPool>, client: reqwest::Client) -> Self {
        Self { pool, client }
    }

    pub async fn invoke<P: Serialize + ?Sized>(
        &self,
        method: &str,
        params: &P,
    ) -> Result<Value, ApiError> {
        let relay = self
            .pool
            .next_healthy()
            .ok_or(ApiError::NoUpstream("contract relay"))?;
        let url = format!("{}/rpc/{}", relay.url, method);
        debug!(method, relay = %relay.url, "Invoking contract relay");

        let res = self
            .client
            .post(&url)
            .timeout(RELAY_TIMEOUT)
            .json(params)
            .send()
            .await
            .map_err(|e| {
                // transport failure: take it out of rotation until the health check says otherwise
                relay.set_healthy(false);
                UPSTREAM_FAILURES.with_label_values(&["relay"]).inc();
                warn!(method, relay = %relay.url, error = %e, "Relay unreachable, marked unhealthy");
                ApiError::Upstream(format!("relay unreachable: {e}"))
            })?;

        let status = res.status();
        if !status.is_success() {
            UPSTREAM_FAILURES.with_label_values(&["relay"]).inc();
            let body = res.text().await.unwrap_or_default();
            warn!(method, status = %status, body = %body, "Relay rejected call");
            return Err(ApiError::Upstream(format!("{method} failed with {status}")));
        }

        res.json::<Value>()
            .await
            .map_err(|e| ApiError::Upstream(format!("invalid relay response: {e}")))
    }
}
