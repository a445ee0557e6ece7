//! Fetch behaviour against a local HTTP server.
//!
//! Timeouts are retried with a sleep between attempts; statuses are terminal.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;

use jobharvest::scrapers::{
    FetchOutcome, HttpClient, PageFetcher, ResilientFetcher, RetryPolicy, Sleeper,
};

/// Records requested sleeps instead of waiting.
#[derive(Default)]
struct RecordingSleeper {
    sleeps: Mutex<Vec<Duration>>,
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
    }
}

async fn spawn_server() -> SocketAddr {
    let app = Router::new()
        .route("/ok", get(|| async { "<html><body>hello</body></html>" }))
        .route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "too late"
            }),
        )
        .route(
            "/error",
            get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
        )
        .route(
            "/limited",
            get(|| async { (StatusCode::TOO_MANY_REQUESTS, "slow down") }),
        );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn fetcher(
    client: HttpClient,
    attempts: u32,
) -> (ResilientFetcher<HttpClient>, Arc<RecordingSleeper>) {
    let sleeper = Arc::new(RecordingSleeper::default());
    let fetcher = ResilientFetcher::new(client, RetryPolicy::new(attempts, Duration::from_secs(2)))
        .with_sleeper(sleeper.clone());
    (fetcher, sleeper)
}

fn client() -> HttpClient {
    HttpClient::direct(Duration::from_millis(200)).unwrap()
}

#[tokio::test]
async fn successful_fetch_returns_body() {
    let addr = spawn_server().await;
    let (fetcher, sleeper) = fetcher(client(), 3);

    let outcome = fetcher.fetch(&format!("http://{}/ok", addr)).await;
    let page = outcome.into_page().expect("page");
    assert!(page.body.contains("hello"));
    assert!(sleeper.sleeps.lock().unwrap().is_empty());
}

#[tokio::test]
async fn timeouts_are_retried_then_abandoned() {
    let addr = spawn_server().await;
    let (fetcher, sleeper) = fetcher(client(), 3);

    let outcome = fetcher.fetch(&format!("http://{}/slow", addr)).await;
    assert_eq!(outcome, FetchOutcome::Failed);
    // three attempts, sleeping between them but not after the last
    assert_eq!(
        *sleeper.sleeps.lock().unwrap(),
        vec![Duration::from_secs(2), Duration::from_secs(2)]
    );
}

#[tokio::test]
async fn server_error_is_terminal() {
    let addr = spawn_server().await;
    let (fetcher, sleeper) = fetcher(client(), 3);

    let outcome = fetcher.fetch(&format!("http://{}/error", addr)).await;
    assert_eq!(outcome, FetchOutcome::Failed);
    assert!(sleeper.sleeps.lock().unwrap().is_empty());
}

#[tokio::test]
async fn rate_limit_status_is_reported_to_limiter() {
    let addr = spawn_server().await;
    let client = client();
    let limiter = client.rate_limiter().clone();
    let (fetcher, sleeper) = fetcher(client, 3);

    let outcome = fetcher.fetch(&format!("http://{}/limited", addr)).await;
    assert_eq!(outcome, FetchOutcome::Failed);
    assert!(sleeper.sleeps.lock().unwrap().is_empty());

    let stats = limiter.stats("127.0.0.1").await.expect("host tracked");
    assert_eq!(stats.rate_limit_hits, 1);
    assert!(stats.in_backoff);
}

#[tokio::test]
async fn single_attempt_policy_never_sleeps() {
    let addr = spawn_server().await;
    let (fetcher, sleeper) = fetcher(client(), 1);

    let outcome = fetcher.fetch(&format!("http://{}/slow", addr)).await;
    assert_eq!(outcome, FetchOutcome::Failed);
    assert!(sleeper.sleeps.lock().unwrap().is_empty());
}
