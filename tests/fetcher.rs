//! Fetcher integration tests
//!
//! Uses wiremock for mocking HTTP endpoints.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use url::Url;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

use news_ingestion::error::FetchError;
use news_ingestion::http_client::{Fetcher, HttpClientConfig};
use news_ingestion::metrics;
use news_ingestion::schemas::RequestSpec;

fn fast_retries(max_retries: u32) -> HttpClientConfig {
    HttpClientConfig {
        max_retries,
        initial_retry_delay: Duration::from_millis(10),
        ..HttpClientConfig::default()
    }
}

fn get(server: &MockServer, route: &str) -> RequestSpec {
    RequestSpec::get(Url::parse(&format!("{}{}", server.uri(), route)).unwrap())
}

/// Fails with 500 until the `succeed_on`-th call, recording when each call arrived
struct FlakyResponder {
    calls: AtomicUsize,
    succeed_on: usize,
    arrivals: Arc<Mutex<Vec<Instant>>>,
}

impl Respond for FlakyResponder {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        self.arrivals.lock().unwrap().push(Instant::now());
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call < self.succeed_on {
            ResponseTemplate::new(500)
        } else {
            ResponseTemplate::new(200).set_body_string("finally")
        }
    }
}

#[tokio::test]
async fn test_in_flight_never_exceeds_limit() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(150)))
        .expect(50)
        .mount(&server)
        .await;

    let fetcher = Fetcher::with_limit(HttpClientConfig::default(), 20).unwrap();
    let requests: Vec<RequestSpec> = (0..50).map(|i| get(&server, &format!("/item/{i}"))).collect();

    let outcomes = fetcher.fetch_all(&requests).await;

    assert_eq!(outcomes.len(), 50);
    assert!(outcomes.iter().all(Result::is_ok));
    let peak = fetcher.peak_in_flight();
    assert!(peak <= 20, "peak in-flight was {peak}");
    assert!(peak >= 10, "limiter never filled up, peak was {peak}");
    assert_eq!(fetcher.in_flight(), 0);
    assert_eq!(fetcher.available_permits(), 20);
}

#[tokio::test]
async fn test_limiter_is_shared_between_fetchers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(200)))
        .mount(&server)
        .await;

    let limiter = Arc::new(Semaphore::new(4));
    let discovery = Fetcher::new(HttpClientConfig::default(), limiter.clone()).unwrap();
    let extraction = Fetcher::new(HttpClientConfig::default(), limiter.clone()).unwrap();

    let batch: Vec<RequestSpec> = (0..4).map(|i| get(&server, &format!("/x/{i}"))).collect();

    // 8 requests through 4 shared permits take at least two delay rounds
    let started = Instant::now();
    let (a, b) = tokio::join!(discovery.fetch_all(&batch), extraction.fetch_all(&batch));
    let elapsed = started.elapsed();

    assert!(a.iter().chain(b.iter()).all(Result::is_ok));
    assert!(elapsed >= Duration::from_millis(400), "took only {elapsed:?}");
    assert_eq!(limiter.available_permits(), 4);
}

#[tokio::test]
async fn test_retry_after_two_failures_with_doubling_delay() {
    let server = MockServer::start().await;
    let arrivals = Arc::new(Mutex::new(Vec::new()));

    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(FlakyResponder {
            calls: AtomicUsize::new(0),
            succeed_on: 3,
            arrivals: arrivals.clone(),
        })
        .expect(3)
        .mount(&server)
        .await;

    let fetcher = Fetcher::with_limit(HttpClientConfig::default(), 20).unwrap();
    let body = fetcher.fetch(&get(&server, "/flaky")).await.unwrap();
    assert_eq!(body, "finally");

    let arrivals = arrivals.lock().unwrap();
    assert_eq!(arrivals.len(), 3);
    let first_gap = arrivals[1] - arrivals[0];
    let second_gap = arrivals[2] - arrivals[1];

    assert!(
        first_gap >= Duration::from_millis(950) && first_gap < Duration::from_millis(1600),
        "first gap {first_gap:?}"
    );
    assert!(
        second_gap >= Duration::from_millis(1950) && second_gap < Duration::from_millis(2800),
        "second gap {second_gap:?}"
    );
}

#[tokio::test]
async fn test_results_follow_submission_order() {
    let server = MockServer::start().await;
    Mock::given(path("/a"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("A")
                .set_delay(Duration::from_millis(300)),
        )
        .mount(&server)
        .await;
    Mock::given(path("/b"))
        .respond_with(ResponseTemplate::new(200).set_body_string("B"))
        .mount(&server)
        .await;
    Mock::given(path("/c"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("C")
                .set_delay(Duration::from_millis(100)),
        )
        .mount(&server)
        .await;

    let fetcher = Fetcher::with_limit(HttpClientConfig::default(), 20).unwrap();
    let requests = vec![get(&server, "/a"), get(&server, "/b"), get(&server, "/c")];

    let bodies: Vec<String> = fetcher
        .fetch_all(&requests)
        .await
        .into_iter()
        .map(Result::unwrap)
        .collect();

    assert_eq!(bodies, vec!["A", "B", "C"]);
}

#[tokio::test]
async fn test_exhausted_request_does_not_abort_batch() {
    let server = MockServer::start().await;
    Mock::given(path("/ok"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&server)
        .await;
    Mock::given(path("/gone"))
        .respond_with(ResponseTemplate::new(404))
        .expect(3)
        .mount(&server)
        .await;

    let fetcher = Fetcher::with_limit(fast_retries(3), 20).unwrap();
    let requests = vec![get(&server, "/ok"), get(&server, "/gone"), get(&server, "/ok")];
    let retries_before = metrics::fetch_attempts(metrics::ATTEMPT_RETRY);
    let failures_before = metrics::fetch_attempts(metrics::ATTEMPT_FAILURE);

    let outcomes = fetcher.fetch_all(&requests).await;

    // Counters are process-wide and other tests run alongside
    assert!(metrics::fetch_attempts(metrics::ATTEMPT_RETRY) >= retries_before + 2);
    assert!(metrics::fetch_attempts(metrics::ATTEMPT_FAILURE) >= failures_before + 1);

    assert_eq!(outcomes[0].as_deref().unwrap(), "ok");
    assert_eq!(outcomes[2].as_deref().unwrap(), "ok");
    match &outcomes[1] {
        Err(FetchError::Exhausted { attempts, last, .. }) => {
            assert_eq!(*attempts, 3);
            assert!(matches!(**last, FetchError::Status { status: 404, .. }));
        }
        other => panic!("expected exhausted retries, got {other:?}"),
    }
}

#[tokio::test]
async fn test_timeout_bounds_each_attempt() {
    let server = MockServer::start().await;
    Mock::given(path("/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
        .expect(2)
        .mount(&server)
        .await;

    let config = HttpClientConfig {
        request_timeout: Duration::from_millis(200),
        ..fast_retries(2)
    };
    let fetcher = Fetcher::with_limit(config, 20).unwrap();

    let started = Instant::now();
    let err = fetcher.fetch(&get(&server, "/slow")).await.unwrap_err();

    assert!(started.elapsed() < Duration::from_secs(2));
    match err {
        FetchError::Exhausted { attempts: 2, last, .. } => {
            assert!(matches!(*last, FetchError::Timeout { .. }));
        }
        other => panic!("expected timeouts, got {other:?}"),
    }
}

#[tokio::test]
async fn test_request_descriptor_is_sent_as_described() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/search"))
        .and(query_param("page", "1"))
        .and(header("authorization", "Bearer secret"))
        .and(body_json(serde_json::json!({"query": "purbaya"})))
        .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
        .expect(1)
        .mount(&server)
        .await;

    let url = Url::parse(&format!("{}/api/search", server.uri())).unwrap();
    let spec = RequestSpec::post_json(url, serde_json::json!({"query": "purbaya"}))
        .query("page", "1")
        .header("authorization", "Bearer secret");

    let fetcher = Fetcher::with_limit(HttpClientConfig::default(), 1).unwrap();
    assert_eq!(fetcher.fetch(&spec).await.unwrap(), "{}");
}
