//! Rate-limited HTTP client shared by provider and arr calls
//!
//! Every outbound request first acquires a slot from a token bucket sized by
//! the configured `<count>/<unit>` budget, so all concurrent tasks sharing one
//! client respect the provider's rate limit together.

use crate::error::{Error, Result};
use reqwest::Method;
use reqwest::header::HeaderMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Token granularity: one request is a million micro-tokens, so fractional
/// refill rates like "250/minute" (~4.17 requests/sec) accumulate smoothly.
const MICROS_PER_REQUEST: u64 = 1_000_000;

/// Unit of a request budget
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateUnit {
    /// Budget applies per second
    Second,
    /// Budget applies per minute
    Minute,
}

/// Request budget parsed from a `<count>/<unit>` spec
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimit {
    /// Requests allowed per unit
    pub count: u32,
    /// The unit the count applies to
    pub per: RateUnit,
}

impl RateLimit {
    /// Parse a spec like "250/minute" or "10/second"
    pub fn parse(spec: &str) -> Result<Self> {
        let invalid = |message: String| Error::Config {
            message,
            key: Some("debrid.rate_limit".into()),
        };

        let mut parts = spec.trim().splitn(2, '/');
        let count_part = parts.next().unwrap_or_default().trim();
        let unit_part = parts.next().unwrap_or_default().trim();

        let count: u32 = count_part
            .parse()
            .map_err(|_| invalid(format!("invalid rate limit count in {spec:?}")))?;
        if count == 0 {
            return Err(invalid(format!("rate limit count must be positive in {spec:?}")));
        }

        let per = match unit_part.to_ascii_lowercase().as_str() {
            "second" => RateUnit::Second,
            "minute" => RateUnit::Minute,
            _ => {
                return Err(invalid(format!(
                    "rate limit unit must be second or minute in {spec:?}"
                )));
            }
        };

        Ok(Self { count, per })
    }

    /// Budget expressed as requests per second
    fn per_second(&self) -> f64 {
        match self.per {
            RateUnit::Second => f64::from(self.count),
            RateUnit::Minute => f64::from(self.count) / 60.0,
        }
    }
}

/// Token bucket limiting whole requests
///
/// All tasks sharing one limiter draw from the same bucket, naturally
/// serializing acquisition under load. The bucket starts full (one budget
/// window worth of burst) and refills continuously.
#[derive(Clone, Debug)]
pub struct RequestLimiter {
    /// Refill rate in micro-tokens per second (0 = unlimited)
    rate_micros: u64,
    /// Bucket capacity in micro-tokens
    capacity_micros: u64,
    /// Available micro-tokens
    tokens: Arc<AtomicU64>,
    /// Last refill timestamp (nanoseconds since arbitrary epoch)
    last_refill: Arc<AtomicU64>,
}

impl RequestLimiter {
    /// Create a limiter for the given budget (None = unlimited)
    #[must_use]
    pub fn new(limit: Option<RateLimit>) -> Self {
        let rate_micros = limit
            .map(|l| (l.per_second() * MICROS_PER_REQUEST as f64) as u64)
            .unwrap_or(0);
        let capacity_micros = limit
            .map(|l| u64::from(l.count) * MICROS_PER_REQUEST)
            .unwrap_or(0);

        Self {
            rate_micros,
            capacity_micros,
            tokens: Arc::new(AtomicU64::new(capacity_micros)),
            last_refill: Arc::new(AtomicU64::new(Self::now_nanos())),
        }
    }

    /// Acquire one request slot, waiting for refill when the bucket is empty
    pub async fn acquire(&self) {
        // Fast path: unlimited
        if self.rate_micros == 0 {
            return;
        }

        loop {
            self.refill_tokens();

            let current = self.tokens.load(Ordering::SeqCst);
            if current >= MICROS_PER_REQUEST {
                if self
                    .tokens
                    .compare_exchange(
                        current,
                        current - MICROS_PER_REQUEST,
                        Ordering::SeqCst,
                        Ordering::SeqCst,
                    )
                    .is_ok()
                {
                    return;
                }
                // CAS lost to a concurrent caller — retry immediately
                continue;
            }

            // Not enough tokens — wait for refill.
            // Cap sleep at 100ms so concurrent callers interleave fairly.
            let deficit = MICROS_PER_REQUEST - current;
            let wait_ms = (deficit as f64 / self.rate_micros as f64 * 1000.0) as u64;
            tokio::time::sleep(Duration::from_millis(wait_ms.clamp(10, 100))).await;
        }
    }

    /// Refill tokens based on elapsed time since last refill
    fn refill_tokens(&self) {
        let now = Self::now_nanos();
        let last = self.last_refill.load(Ordering::SeqCst);

        let elapsed_secs = now.saturating_sub(last) as f64 / 1_000_000_000.0;
        let tokens_to_add = (self.rate_micros as f64 * elapsed_secs) as u64;

        if tokens_to_add > 0
            && self
                .last_refill
                .compare_exchange(last, now, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
        {
            let current = self.tokens.load(Ordering::SeqCst);
            let new_tokens = (current + tokens_to_add).min(self.capacity_micros);
            self.tokens.store(new_tokens, Ordering::SeqCst);
        }
    }

    /// Monotonic time in nanoseconds since an arbitrary process-local epoch
    fn now_nanos() -> u64 {
        static START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();
        let start = START.get_or_init(Instant::now);
        start.elapsed().as_nanos() as u64
    }
}

/// HTTP client that throttles every call through a [`RequestLimiter`]
///
/// One instance is shared per provider configuration. Default headers
/// (bearer token, api key) are attached at construction so call sites only
/// supply method, URL, and an optional form body.
#[derive(Clone, Debug)]
pub struct RequestClient {
    client: reqwest::Client,
    limiter: RequestLimiter,
}

impl RequestClient {
    /// Build a client with the given budget and default headers
    pub fn new(limit: Option<RateLimit>, default_headers: HeaderMap) -> Result<Self> {
        let client = reqwest::Client::builder()
            .default_headers(default_headers)
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            limiter: RequestLimiter::new(limit),
        })
    }

    /// Dispatch one request after acquiring a rate-limit slot
    ///
    /// The response body is fully drained before the status is inspected, so
    /// the connection returns to the pool on every exit path. Non-2xx
    /// responses surface as [`Error::HttpStatus`].
    pub async fn execute(
        &self,
        method: Method,
        url: &str,
        form: Option<&[(&str, &str)]>,
    ) -> Result<Vec<u8>> {
        self.limiter.acquire().await;

        let mut request = self.client.request(method, url);
        if let Some(fields) = form {
            request = request.form(fields);
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.bytes().await?;

        if !status.is_success() {
            return Err(Error::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        Ok(body.to_vec())
    }
}
