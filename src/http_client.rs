//! HTTP Client Module
//!
//! The Fetcher used by both discovery and article extraction:
//! - Semaphore-based concurrency limiting, with the semaphore injected by the caller
//! - Exponential backoff between attempts (1s, 2s, 4s, ... by default)
//! - Per-attempt timeout
//! - Batch execution whose results line up with the submitted requests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use futures::future::join_all;
use reqwest::Client;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::FetchError;
use crate::metrics;
use crate::schemas::RequestSpec;

/// Result of one request in a batch: the response body, or why it failed.
pub type FetchOutcome = Result<String, FetchError>;

/// Configuration for the HTTP client
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Per-attempt timeout
    pub request_timeout: Duration,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Total attempts per request, including the first
    pub max_retries: u32,
    /// Delay before the second attempt
    pub initial_retry_delay: Duration,
    /// Maximum retry delay
    pub max_retry_delay: Duration,
    /// Retry multiplier for exponential backoff
    pub retry_multiplier: f64,
    /// Randomization factor for backoff delays (0 disables jitter)
    pub retry_jitter: f64,
    /// User agent string
    pub user_agent: String,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            max_retries: 3,
            initial_retry_delay: Duration::from_secs(1),
            max_retry_delay: Duration::from_secs(30),
            retry_multiplier: 2.0,
            retry_jitter: 0.0,
            user_agent: crate::config::DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl HttpClientConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
            max_retries: config.max_retries,
            initial_retry_delay: Duration::from_millis(config.retry_base_delay_ms),
            max_retry_delay: Duration::from_millis(config.retry_max_delay_ms),
            retry_multiplier: 2.0,
            retry_jitter: config.retry_jitter,
            user_agent: config.user_agent.clone(),
        }
    }
}

/// Tracks attempts currently holding a limiter permit.
///
/// The process-wide count is published as `ingestion_fetch_in_flight`; the
/// per-fetcher peak stays local for the batch summary.
#[derive(Debug, Default)]
struct InFlightGauge {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl InFlightGauge {
    fn enter(&self) -> InFlightGuard<'_> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        metrics::inc_fetch_in_flight();
        InFlightGuard { gauge: self }
    }
}

struct InFlightGuard<'a> {
    gauge: &'a InFlightGauge,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.gauge.current.fetch_sub(1, Ordering::SeqCst);
        metrics::dec_fetch_in_flight();
    }
}

/// Concurrency-bounded, retrying request executor
pub struct Fetcher {
    /// Inner reqwest client
    client: Client,
    /// Shared concurrency limiter
    limiter: Arc<Semaphore>,
    /// Configuration
    config: HttpClientConfig,
    in_flight: InFlightGauge,
}

impl Fetcher {
    /// Creates a fetcher that draws permits from `limiter`.
    ///
    /// Fetchers built over the same semaphore share one concurrency budget.
    pub fn new(config: HttpClientConfig, limiter: Arc<Semaphore>) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .user_agent(&config.user_agent)
            .gzip(true)
            .brotli(true)
            .build()
            .map_err(FetchError::ClientBuild)?;

        Ok(Self {
            client,
            limiter,
            config,
            in_flight: InFlightGauge::default(),
        })
    }

    /// Creates a fetcher with its own limiter of `max_concurrent` permits
    pub fn with_limit(config: HttpClientConfig, max_concurrent: usize) -> Result<Self, FetchError> {
        Self::new(config, Arc::new(Semaphore::new(max_concurrent)))
    }

    /// Creates the exponential backoff schedule for one request
    fn create_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.config.initial_retry_delay)
            .with_max_interval(self.config.max_retry_delay)
            .with_multiplier(self.config.retry_multiplier)
            .with_randomization_factor(self.config.retry_jitter)
            .with_max_elapsed_time(None)
            .build()
    }

    /// Executes every request concurrently, bounded by the limiter.
    ///
    /// `result[i]` always belongs to `requests[i]`. A failing request never
    /// aborts the batch; it shows up as an `Err` in its slot.
    pub async fn fetch_all(&self, requests: &[RequestSpec]) -> Vec<FetchOutcome> {
        let outcomes = join_all(requests.iter().map(|spec| self.fetch(spec))).await;

        let failed = outcomes.iter().filter(|o| o.is_err()).count();
        info!(
            requests = requests.len(),
            succeeded = requests.len() - failed,
            failed,
            peak_in_flight = self.peak_in_flight(),
            "Fetch batch drained"
        );

        outcomes
    }

    /// Executes one request with retries.
    ///
    /// Worst case wall time is roughly `max_retries * (timeout + delay)`.
    pub async fn fetch(&self, spec: &RequestSpec) -> FetchOutcome {
        let url = spec.url.as_str();
        let mut backoff = self.create_backoff();
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            let err = match self.attempt(spec).await {
                Ok(body) => {
                    metrics::record_fetch_attempt(metrics::ATTEMPT_SUCCESS);
                    debug!(url = %url, attempt, bytes = body.len(), "Request succeeded");
                    return Ok(body);
                }
                Err(e) => e,
            };

            if !err.is_transient() {
                metrics::record_fetch_attempt(metrics::ATTEMPT_FAILURE);
                warn!(url = %url, attempt, error = %err, "Non-retryable request failure");
                return Err(err);
            }

            if attempt >= self.config.max_retries {
                metrics::record_fetch_attempt(metrics::ATTEMPT_FAILURE);
                warn!(
                    url = %url,
                    attempts = attempt,
                    error = %err,
                    "Retry budget exhausted, dropping request"
                );
                return Err(FetchError::Exhausted {
                    url: url.to_string(),
                    attempts: attempt,
                    last: Box::new(err),
                });
            }

            metrics::record_fetch_attempt(metrics::ATTEMPT_RETRY);
            let delay = backoff
                .next_backoff()
                .unwrap_or(self.config.max_retry_delay);
            warn!(
                url = %url,
                attempt,
                max_retries = self.config.max_retries,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Transient error, will retry"
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// One attempt: holds a limiter permit from send until the body is read
    async fn attempt(&self, spec: &RequestSpec) -> FetchOutcome {
        let url = spec.url.as_str();

        let _permit = self
            .limiter
            .acquire()
            .await
            .map_err(|_| FetchError::LimiterClosed)?;
        let _in_flight = self.in_flight.enter();

        debug!(method = ?spec.method, url = %url, "Executing HTTP request");

        let mut builder = self
            .client
            .request(spec.method.into(), spec.url.clone())
            .query(&spec.query);
        for (name, value) in &spec.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(ref body) = spec.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?;

        let status = response.status();
        if status.as_u16() >= 400 {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        response
            .text()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))
    }

    /// Gets the number of available permits
    pub fn available_permits(&self) -> usize {
        self.limiter.available_permits()
    }

    /// Attempts currently in flight through this fetcher
    pub fn in_flight(&self) -> usize {
        self.in_flight.current.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneous attempts seen so far
    pub fn peak_in_flight(&self) -> usize {
        self.in_flight.peak.load(Ordering::SeqCst)
    }
}
