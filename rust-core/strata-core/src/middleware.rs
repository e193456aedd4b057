//! # Middleware System
//!
//! Onion-model request interception.
//!
//! A middleware receives the request and a [`Next`] frame. It can:
//!
//! - return its own response without calling `next` (short-circuit)
//! - change the request, then call `next` (pre-processing)
//! - call `next`, then change the response it got back (post-processing)
//!
//! Frames are `Copy` values holding a borrowed stack slice and an index, so
//! advancing never mutates shared position state.

use crate::error::{Error, Result};
use crate::request::Request;
use crate::response::Response;
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Request interceptor
pub trait Middleware: Send + Sync {
    /// Handle the request, usually by delegating to `next`
    ///
    /// # Errors
    ///
    /// Implementations propagate whatever the inner chain returns, or fail on
    /// their own.
    fn process(&self, request: &mut Request, next: Next<'_>) -> Result<Response>;

    /// Middleware name for logging
    fn name(&self) -> &'static str {
        "Unknown"
    }
}

/// Fallback handler run once the stack is exhausted
pub type DefaultHandler<'a> = dyn Fn(&mut Request) -> Result<Response> + 'a;

/// Position in a middleware chain
#[derive(Clone, Copy)]
pub struct Next<'a> {
    stack: &'a [Arc<dyn Middleware>],
    index: usize,
    default: &'a DefaultHandler<'a>,
}

impl<'a> Next<'a> {
    /// Start a chain at the first middleware of `stack`
    #[must_use]
    pub fn new(stack: &'a [Arc<dyn Middleware>], default: &'a DefaultHandler<'a>) -> Self {
        Self {
            stack,
            index: 0,
            default,
        }
    }

    /// Run the rest of the chain
    ///
    /// # Errors
    ///
    /// Returns the first error raised further down the chain.
    pub fn run(self, request: &mut Request) -> Result<Response> {
        match self.stack.get(self.index) {
            Some(middleware) => {
                let next = Self {
                    index: self.index + 1,
                    ..self
                };
                middleware.process(request, next)
            }
            None => (self.default)(request),
        }
    }

    /// Middleware left before the default handler
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.stack.len().saturating_sub(self.index)
    }
}

impl std::fmt::Debug for Next<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Next")
            .field("index", &self.index)
            .field("len", &self.stack.len())
            .finish_non_exhaustive()
    }
}

/// Closure adapter created by [`from_fn`]
pub struct FnMiddleware<F> {
    name: &'static str,
    f: F,
}

impl<F> Middleware for FnMiddleware<F>
where
    F: Fn(&mut Request, Next<'_>) -> Result<Response> + Send + Sync,
{
    fn process(&self, request: &mut Request, next: Next<'_>) -> Result<Response> {
        (self.f)(request, next)
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

/// Wrap a closure as a middleware
pub fn from_fn<F>(f: F) -> FnMiddleware<F>
where
    F: Fn(&mut Request, Next<'_>) -> Result<Response> + Send + Sync,
{
    FnMiddleware {
        name: "FnMiddleware",
        f,
    }
}

/// Wrap a closure as a middleware with a name for logs
pub fn named_fn<F>(name: &'static str, f: F) -> FnMiddleware<F>
where
    F: Fn(&mut Request, Next<'_>) -> Result<Response> + Send + Sync,
{
    FnMiddleware { name, f }
}

/// Logging middleware - logs requests and responses
#[derive(Default)]
pub struct LoggingMiddleware {
    log_headers: bool,
}

impl LoggingMiddleware {
    /// Create a new logging middleware
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable header logging
    #[must_use]
    pub fn with_headers(mut self) -> Self {
        self.log_headers = true;
        self
    }
}

impl Middleware for LoggingMiddleware {
    fn process(&self, request: &mut Request, next: Next<'_>) -> Result<Response> {
        let method = request.method().to_string();
        let path = request.path().to_string();
        let request_id = request.header("x-request-id").unwrap_or("-").to_string();

        if self.log_headers {
            info!(%method, %path, %request_id, headers = ?request.headers(), "Request received");
        } else {
            info!(%method, %path, %request_id, "Request received");
        }

        match next.run(request) {
            Ok(response) => {
                info!(%method, %path, status = response.status, %request_id, "Response sent");
                Ok(response)
            }
            Err(e) => {
                info!(%method, %path, status = e.status(), %request_id, error = %e, "Request failed");
                Err(e)
            }
        }
    }

    fn name(&self) -> &'static str {
        "LoggingMiddleware"
    }
}

/// Timing middleware - measures the duration of the inner chain
#[derive(Default)]
pub struct TimingMiddleware {
    header: bool,
}

impl TimingMiddleware {
    /// Create a new timing middleware
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Report the duration in an `x-response-time` header
    #[must_use]
    pub fn with_header(mut self) -> Self {
        self.header = true;
        self
    }
}

impl Middleware for TimingMiddleware {
    fn process(&self, request: &mut Request, next: Next<'_>) -> Result<Response> {
        let start = Instant::now();
        let mut response = next.run(request)?;
        let duration = start.elapsed();

        debug!(
            method = %request.method(),
            path = %request.path(),
            duration_us = %duration.as_micros(),
            "Request timing"
        );
        if self.header {
            response.set_header(
                "x-response-time",
                &format!("{:.3}ms", duration.as_secs_f64() * 1000.0),
            );
        }
        Ok(response)
    }

    fn name(&self) -> &'static str {
        "TimingMiddleware"
    }
}

/// CORS middleware - adds Cross-Origin Resource Sharing headers
///
/// Preflights (`OPTIONS` with `Access-Control-Request-Method`) are answered
/// with 204; any other `OPTIONS` request reaches the router.
#[derive(Clone)]
pub struct CorsMiddleware {
    allow_origin: String,
    allow_methods: String,
    allow_headers: String,
}

impl Default for CorsMiddleware {
    fn default() -> Self {
        Self {
            allow_origin: "*".to_string(),
            allow_methods: "GET, POST, PUT, DELETE, PATCH, OPTIONS".to_string(),
            allow_headers: "Content-Type, Authorization".to_string(),
        }
    }
}

impl CorsMiddleware {
    /// Create a new CORS middleware with default settings
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set allowed origin
    #[must_use]
    pub fn allow_origin(mut self, origin: impl Into<String>) -> Self {
        self.allow_origin = origin.into();
        self
    }

    /// Set allowed methods
    #[must_use]
    pub fn allow_methods(mut self, methods: impl Into<String>) -> Self {
        self.allow_methods = methods.into();
        self
    }

    /// Set allowed headers
    #[must_use]
    pub fn allow_headers(mut self, headers: impl Into<String>) -> Self {
        self.allow_headers = headers.into();
        self
    }

    /// Get the Access-Control-Allow-Origin header value
    #[must_use]
    pub fn origin(&self) -> &str {
        &self.allow_origin
    }

    fn apply(&self, response: &mut Response) {
        response.set_header("Access-Control-Allow-Origin", &self.allow_origin);
        response.set_header("Access-Control-Allow-Methods", &self.allow_methods);
        response.set_header("Access-Control-Allow-Headers", &self.allow_headers);
    }
}

impl Middleware for CorsMiddleware {
    fn process(&self, request: &mut Request, next: Next<'_>) -> Result<Response> {
        let preflight = request.method() == "OPTIONS"
            && request.header("access-control-request-method").is_some();
        let mut response = if preflight {
            debug!(path = %request.path(), "CORS preflight");
            Response::new().with_status(204)
        } else {
            next.run(request)?
        };
        self.apply(&mut response);
        Ok(response)
    }

    fn name(&self) -> &'static str {
        "CorsMiddleware"
    }
}

/// Number of tracked clients above which full buckets are evicted
pub const DEFAULT_RATE_LIMIT_KEYS: usize = 10_000;

/// Token bucket rate limiting middleware, keyed by `x-client-ip`
///
/// Buckets that have refilled to capacity carry no state worth keeping, so
/// they are dropped once more than `max_keys` clients are tracked.
pub struct RateLimitMiddleware {
    /// Maximum burst capacity
    capacity: u64,
    /// Tokens refilled per second
    refill_per_sec: u64,
    /// Tracked clients before full buckets are swept
    max_keys: usize,
    /// Per-key buckets
    state: Mutex<HashMap<String, Bucket>>,
}

/// Internal token bucket state
struct Bucket {
    tokens: u64,
    last_refill: Instant,
}

impl Bucket {
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    fn pending_refill(&self, now: Instant, refill_per_sec: u64) -> u64 {
        let elapsed = now.saturating_duration_since(self.last_refill);
        // float to int casts saturate
        (elapsed.as_secs_f64() * refill_per_sec as f64) as u64
    }

    fn is_full(&self, now: Instant, capacity: u64, refill_per_sec: u64) -> bool {
        self.tokens
            .saturating_add(self.pending_refill(now, refill_per_sec))
            >= capacity
    }
}

impl RateLimitMiddleware {
    /// Create a new rate limiter
    #[must_use]
    pub fn new(capacity: u64, refill_per_sec: u64) -> Self {
        Self {
            capacity,
            refill_per_sec,
            max_keys: DEFAULT_RATE_LIMIT_KEYS,
            state: Mutex::new(HashMap::new()),
        }
    }

    /// Set how many clients are tracked before full buckets are evicted
    #[must_use]
    pub fn with_max_keys(mut self, max_keys: usize) -> Self {
        self.max_keys = max_keys;
        self
    }

    /// Number of clients currently tracked
    pub fn tracked(&self) -> usize {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn allow(&self, key: &str) -> bool {
        let mut map = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();

        if map.len() >= self.max_keys && !map.contains_key(key) {
            let before = map.len();
            map.retain(|_, bucket| !bucket.is_full(now, self.capacity, self.refill_per_sec));
            debug!(evicted = before - map.len(), "Rate limit buckets swept");
        }

        let bucket = map.entry(key.to_string()).or_insert(Bucket {
            tokens: self.capacity,
            last_refill: now,
        });
        let refill = bucket.pending_refill(now, self.refill_per_sec);
        if refill > 0 {
            bucket.tokens = bucket.tokens.saturating_add(refill).min(self.capacity);
            bucket.last_refill = now;
        }
        if bucket.tokens == 0 {
            return false;
        }
        bucket.tokens -= 1;
        true
    }
}

impl Middleware for RateLimitMiddleware {
    fn process(&self, request: &mut Request, next: Next<'_>) -> Result<Response> {
        let key = request.header("x-client-ip").unwrap_or("unknown").to_string();
        if self.allow(&key) {
            next.run(request)
        } else {
            warn!(client = %key, path = %request.path(), "Rate limit exceeded");
            Ok(Response::json(json!({"error": "Rate limit exceeded"})).with_status(429))
        }
    }

    fn name(&self) -> &'static str {
        "RateLimitMiddleware"
    }
}

/// Redirects requests whose path has the wrong trailing slash
pub struct TrailingSlashMiddleware {
    append: bool,
    status: u16,
}

impl Default for TrailingSlashMiddleware {
    fn default() -> Self {
        Self {
            append: false,
            status: 301,
        }
    }
}

impl TrailingSlashMiddleware {
    /// Strip trailing slashes
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a trailing slash instead of stripping it
    #[must_use]
    pub fn appending() -> Self {
        Self {
            append: true,
            ..Self::default()
        }
    }

    /// Redirect status to use
    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    /// Normalized form of `path`
    #[must_use]
    pub fn normalize(&self, path: &str) -> String {
        let trimmed = path.trim_end_matches('/');
        if trimmed.is_empty() {
            "/".to_string()
        } else if self.append {
            format!("{trimmed}/")
        } else {
            trimmed.to_string()
        }
    }
}

impl Middleware for TrailingSlashMiddleware {
    fn process(&self, request: &mut Request, next: Next<'_>) -> Result<Response> {
        let normalized = self.normalize(request.path());
        if normalized == request.path() {
            return next.run(request);
        }

        let location = match request.query_string() {
            Some(query) => format!("{normalized}?{query}"),
            None => normalized,
        };
        debug!(from = %request.path(), to = %location, "Trailing slash redirect");
        Ok(Response::redirect(&location, self.status))
    }

    fn name(&self) -> &'static str {
        "TrailingSlashMiddleware"
    }
}

static REQUEST_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Generate a process-unique request id
#[must_use]
pub fn generate_request_id() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    let counter = REQUEST_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{:x}-{:x}", now.as_nanos(), counter)
}

/// Ensures every request carries an `x-request-id` and echoes it back
#[derive(Default)]
pub struct RequestIdMiddleware;

impl RequestIdMiddleware {
    /// Create a new request id middleware
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Middleware for RequestIdMiddleware {
    fn process(&self, request: &mut Request, next: Next<'_>) -> Result<Response> {
        let request_id = match request.header("x-request-id") {
            Some(id) => id.to_string(),
            None => {
                let id = generate_request_id();
                request.set_header("x-request-id", &id);
                id
            }
        };

        let mut response = next.run(request)?;
        response.set_header("x-request-id", &request_id);
        Ok(response)
    }

    fn name(&self) -> &'static str {
        "RequestIdMiddleware"
    }
}

type MiddlewareFactory = Arc<dyn Fn() -> Arc<dyn Middleware> + Send + Sync>;

/// Resolves middleware by name for configuration-driven stacks
#[derive(Clone)]
pub struct MiddlewareRegistry {
    factories: HashMap<String, MiddlewareFactory>,
}

impl Default for MiddlewareRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry
            .register("logging", || Arc::new(LoggingMiddleware::new()))
            .register("timing", || Arc::new(TimingMiddleware::new().with_header()))
            .register("cors", || Arc::new(CorsMiddleware::new()))
            .register("rate_limit", || Arc::new(RateLimitMiddleware::new(100, 10)))
            .register("trailing_slash", || Arc::new(TrailingSlashMiddleware::new()))
            .register("request_id", || Arc::new(RequestIdMiddleware::new()));
        registry
    }
}

impl MiddlewareRegistry {
    /// Registry with the built-in middleware
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry without any entries
    #[must_use]
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a factory under `name`, replacing any previous one
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn() -> Arc<dyn Middleware> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
        self
    }

    /// Check if `name` is registered
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered names, sorted
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Build the middleware registered under `name`
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidMiddleware` if nothing is registered under
    /// `name`.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Middleware>> {
        self.factories
            .get(name)
            .map(|factory| factory())
            .ok_or_else(|| Error::InvalidMiddleware {
                name: name.to_string(),
            })
    }
}

impl std::fmt::Debug for MiddlewareRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.names()).finish()
    }
}
