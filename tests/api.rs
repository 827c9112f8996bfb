//! Integration tests for the gateway's HTTP surface

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, Request, StatusCode, header};
use axum::routing::post;
use axum::{Json, Router};
use dashmap::DashMap;
use http_body_util::BodyExt; // for .collect().await
use serde_json::{Value, json};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower::ServiceExt; // for .oneshot()

use market_gateway::auth::{Claims, JwtVerifier};
use market_gateway::rate_limit::{ManualClock, RateLimiter, RatePolicy};
use market_gateway::relay::ContractRelay;
use market_gateway::state::AppState;
use market_gateway::throttle::RatePolicies;
use market_gateway::upstream::UpstreamPool;
use market_gateway::worker::BeautifyWorker;

const SECRET: &[u8] = b"integration-secret";

type Calls = Arc<Mutex<Vec<String>>>;

struct Harness {
    app: Router,
    clock: Arc<ManualClock>,
    tokens: JwtVerifier,
    relay_calls: Calls,
    llm_calls: Arc<AtomicUsize>,
}

async fn spawn_server(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
    format!("http://{addr}")
}

async fn fake_relay(calls: Calls) -> String {
    async fn rpc(
        Path(method): Path<String>,
        State(calls): State<Calls>,
        Json(params): Json<Value>,
    ) -> Json<Value> {
        calls.lock().unwrap().push(method.clone());
        let market_id = params.get("market_id").cloned().unwrap_or(json!(7));
        Json(json!({ "ok": true, "method": method, "market_id": market_id, "params": params }))
    }

    spawn_server(Router::new().route("/rpc/{method}", post(rpc)).with_state(calls)).await
}

async fn fake_llm(calls: Arc<AtomicUsize>) -> String {
    async fn generate(State(calls): State<Arc<AtomicUsize>>, Json(req): Json<Value>) -> Json<Value> {
        calls.fetch_add(1, Ordering::SeqCst);
        let prompt = req["prompt"].as_str().unwrap_or_default();
        let question = prompt.lines().last().unwrap_or_default();
        Json(json!({ "model": req["model"], "response": format!(" Clean: {question} \n") }))
    }

    spawn_server(Router::new().route("/api/generate", post(generate)).with_state(calls)).await
}

// Free port with nothing listening on it
async fn dead_address() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

fn policies() -> RatePolicies {
    RatePolicies {
        purchase: RatePolicy::new(5, 60_000).unwrap(),
        create_market: RatePolicy::new(1, 3_600_000).unwrap(),
        beautify: RatePolicy::new(3, 60_000).unwrap(),
    }
}

async fn harness_with_relay(relay_url: Option<String>) -> Harness {
    let relay_calls: Calls = Arc::default();
    let llm_calls = Arc::new(AtomicUsize::new(0));

    let relay_url = match relay_url {
        Some(url) => url,
        None => fake_relay(relay_calls.clone()).await,
    };
    let llm_url = fake_llm(llm_calls.clone()).await;

    let client = reqwest::Client::new();
    let clock = Arc::new(ManualClock::new(1_000_000));
    let limiter = Arc::new(RateLimiter::with_clock(clock.clone(), 0.0));

    let (beautify_tx, beautify_rx) = mpsc::channel(100);
    let worker = BeautifyWorker {
        client: client.clone(),
        backends: Arc::new(UpstreamPool::new("llm", &llm_url).unwrap()),
        model: "test-model".to_string(),
        cache: Arc::new(DashMap::new()),
        ttl: Duration::from_secs(300),
    };
    tokio::spawn(worker.run(beautify_rx));

    let state = Arc::new(AppState {
        limiter,
        policies: policies(),
        verifier: JwtVerifier::new(SECRET),
        relay: ContractRelay::new(Arc::new(UpstreamPool::new("relay", &relay_url).unwrap()), client),
        beautify_tx,
    });

    Harness {
        app: market_gateway::app(state),
        clock,
        tokens: JwtVerifier::new(SECRET),
        relay_calls,
        llm_calls,
    }
}

async fn harness() -> Harness {
    harness_with_relay(None).await
}

impl Harness {
    fn token(&self, sub: &str, roles: &[&str]) -> String {
        self.tokens
            .issue(&Claims {
                sub: sub.to_string(),
                exp: (chrono::Utc::now().timestamp() + 3600) as usize,
                wallet: Some(format!("0x{sub}")),
                roles: roles.iter().map(|r| r.to_string()).collect(),
            })
            .unwrap()
    }

    async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, HeaderMap, Value) {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = builder.body(Body::from(body.to_string())).unwrap();

        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, headers, json)
    }

    async fn get(&self, uri: &str) -> (StatusCode, String) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8_lossy(&bytes).into_owned())
    }
}

fn market_body() -> Value {
    json!({
        "question": "Will the mainnet upgrade ship before June?",
        "outcomes": ["Yes", "No"],
        "closes_at": (chrono::Utc::now() + chrono::Duration::days(7)).to_rfc3339(),
    })
}

#[tokio::test]
async fn health_is_public() {
    let h = harness().await;
    let (status, body) = h.get("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("healthy"));
}

#[tokio::test]
async fn missing_or_bad_token_is_unauthorized() {
    let h = harness().await;
    let body = json!({ "ticket_count": 1, "outcome": 0 });

    let (status, _, json) = h.post("/api/markets/1/tickets", None, body.clone()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(json["error"].is_string());

    let (status, _, _) = h.post("/api/markets/1/tickets", Some("garbage"), body).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(h.relay_calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn purchases_are_throttled_per_user() {
    let h = harness().await;
    let alice = h.token("alice", &[]);
    let bob = h.token("bob", &[]);
    let body = json!({ "ticket_count": 2, "outcome": 1 });

    for _ in 0..5 {
        let (status, _, json) = h.post("/api/markets/42/tickets", Some(&alice), body.clone()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["action"], "buy_tickets");
        assert_eq!(json["market_id"], 42);
        assert_eq!(json["result"]["params"]["wallet"], "0xalice");
    }

    let (status, headers, json) = h.post("/api/markets/42/tickets", Some(&alice), body.clone()).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(headers[header::RETRY_AFTER], "60");
    assert_eq!(json["retry_after_seconds"], 60);
    assert_eq!(json["error"], "Too many requests. Try again in 60 seconds.");

    // bob has his own bucket
    let (status, _, _) = h.post("/api/markets/42/tickets", Some(&bob), body.clone()).await;
    assert_eq!(status, StatusCode::OK);

    h.clock.advance(45_000);
    let (_, headers, _) = h.post("/api/markets/42/tickets", Some(&alice), body.clone()).await;
    assert_eq!(headers[header::RETRY_AFTER], "15");

    h.clock.advance(15_000);
    let (status, _, _) = h.post("/api/markets/42/tickets", Some(&alice), body).await;
    assert_eq!(status, StatusCode::OK);

    assert_eq!(h.relay_calls.lock().unwrap().len(), 7);
}

#[tokio::test]
async fn invalid_input_does_not_consume_quota() {
    let h = harness().await;
    let carol = h.token("carol", &[]);

    let mut bad = market_body();
    bad["outcomes"] = json!(["Yes"]);
    let (status, _, _) = h.post("/api/markets", Some(&carol), bad).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _, json) = h.post("/api/markets", Some(&carol), market_body()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["action"], "create_market");
    assert_eq!(json["market_id"], 7);

    let (status, headers, _) = h.post("/api/markets", Some(&carol), market_body()).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(headers[header::RETRY_AFTER], "3600");

    let (status, _, _) = h
        .post("/api/markets/1/tickets", Some(&carol), json!({ "ticket_count": 0, "outcome": 0 }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert_eq!(*h.relay_calls.lock().unwrap(), vec!["create_market".to_string()]);
}

#[tokio::test]
async fn admin_routes_require_admin_role() {
    let h = harness().await;
    // a user merely named Admin gets no privileges
    let impostor = h.token("Admin", &["user"]);
    let admin = h.token("ops-1", &["admin"]);
    let body = json!({ "winning_outcome": 0 });

    let (status, _, json) = h.post("/api/markets/9/resolve", Some(&impostor), body.clone()).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["error"], "Requires the admin role");

    let (status, _, _) = h.post("/api/markets/9/cancel", Some(&impostor), json!({})).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _, json) = h.post("/api/markets/9/resolve", Some(&admin), body).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["result"]["params"]["resolved_by"], "ops-1");

    let (status, _, _) = h.post("/api/markets/9/cancel", Some(&admin), json!({})).await;
    assert_eq!(status, StatusCode::OK);

    assert_eq!(
        *h.relay_calls.lock().unwrap(),
        vec!["resolve_market".to_string(), "cancel_market".to_string()]
    );
}

#[tokio::test]
async fn beautify_caches_rewrites() {
    let h = harness().await;
    let dave = h.token("dave", &[]);
    let body = json!({ "text": "will eth go up??" });

    let (status, _, json) = h.post("/api/beautify", Some(&dave), body.clone()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["text"], "Clean: will eth go up??");
    assert_eq!(json["cached"], false);

    let (status, _, json) = h.post("/api/beautify", Some(&dave), body.clone()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["cached"], true);
    assert_eq!(h.llm_calls.load(Ordering::SeqCst), 1);

    // cached answers still count against the caller
    let (status, _, _) = h.post("/api/beautify", Some(&dave), body.clone()).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _, _) = h.post("/api/beautify", Some(&dave), body).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);

    let (status, _, _) = h.post("/api/beautify", Some(&dave), json!({ "text": "   " })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unreachable_relay_is_taken_out_of_rotation() {
    let h = harness_with_relay(Some(dead_address().await)).await;
    let erin = h.token("erin", &[]);
    let body = json!({ "ticket_count": 1, "outcome": 0 });

    let (status, _, _) = h.post("/api/markets/3/tickets", Some(&erin), body.clone()).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);

    let (status, _, json) = h.post("/api/markets/3/tickets", Some(&erin), body).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["error"], "No healthy contract relay upstream available");
}

#[tokio::test]
async fn relay_error_body_is_not_forwarded() {
    async fn reject() -> (StatusCode, &'static str) {
        (StatusCode::INTERNAL_SERVER_ERROR, "db password=hunter2 at 10.0.0.5")
    }
    let relay = spawn_server(Router::new().route("/rpc/{method}", post(reject))).await;
    let h = harness_with_relay(Some(relay)).await;
    let gina = h.token("gina", &[]);

    let (status, _, json) = h
        .post("/api/markets/3/tickets", Some(&gina), json!({ "ticket_count": 1, "outcome": 0 }))
        .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    let message = json["error"].as_str().unwrap();
    assert_eq!(message, "Upstream error: buy_tickets failed with 500 Internal Server Error");
    assert!(!message.contains("hunter2"));
}

#[tokio::test]
async fn metrics_expose_rate_limit_decisions() {
    let h = harness().await;
    let frank = h.token("frank", &[]);
    h.post("/api/markets/5/tickets", Some(&frank), json!({ "ticket_count": 1, "outcome": 0 }))
        .await;

    let (status, body) = h.get("/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("market_gateway_rate_limit_decisions_total"));
    assert!(body.contains("market_gateway_requests_total"));
}
