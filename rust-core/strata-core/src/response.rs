//! # HTTP Response
//!
//! Response record passed through the middleware chain. The body is kept as
//! an opaque [`Body`] value; conversion to bytes happens only in
//! [`Response::dispatch`], at the transport boundary.

use crate::error::{Error, Result};
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::ext::ReasonPhrase;
use hyper::StatusCode;
use serde_json::Value;
use std::collections::HashMap;
use tracing::warn;

/// Response body, serialized lazily
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Body {
    /// No body
    #[default]
    Empty,
    /// Plain text
    Text(String),
    /// JSON document
    Json(Value),
    /// Raw bytes
    Bytes(Bytes),
}

impl Body {
    /// Content type implied by the body variant
    #[must_use]
    pub fn content_type(&self) -> Option<&'static str> {
        match self {
            Self::Empty => None,
            Self::Text(_) => Some("text/plain; charset=utf-8"),
            Self::Json(_) => Some("application/json"),
            Self::Bytes(_) => Some("application/octet-stream"),
        }
    }

    /// Check if the body is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Text(text) => text.is_empty(),
            Self::Json(_) => false,
            Self::Bytes(bytes) => bytes.is_empty(),
        }
    }

    /// Get the body as JSON, if it is one
    #[must_use]
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(value) => Some(value),
            _ => None,
        }
    }

    /// Get the body as text, if it is one
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Serialize into wire bytes
    ///
    /// # Errors
    ///
    /// Returns `Error::Json` if a JSON body fails to serialize.
    pub fn into_bytes(self) -> Result<Bytes> {
        Ok(match self {
            Self::Empty => Bytes::new(),
            Self::Text(text) => Bytes::from(text),
            Self::Json(value) => Bytes::from(serde_json::to_vec(&value)?),
            Self::Bytes(bytes) => bytes,
        })
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for Body {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<Value> for Body {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(Bytes::from(bytes))
    }
}

/// HTTP response
#[derive(Debug, Clone)]
pub struct Response {
    /// HTTP status code
    pub status: u16,
    /// Reason phrase override; the canonical phrase is used when unset
    pub reason: Option<String>,
    /// Response headers, keyed by lowercase name
    pub headers: HashMap<String, String>,
    /// Response body
    pub body: Body,
}

impl Default for Response {
    fn default() -> Self {
        Self {
            status: 200,
            reason: None,
            headers: HashMap::new(),
            body: Body::Empty,
        }
    }
}

impl Response {
    /// Create an empty 200 response
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a JSON response
    #[must_use]
    pub fn json(body: Value) -> Self {
        Self::new().with_body(body)
    }

    /// Create a text response
    #[must_use]
    pub fn text(body: impl Into<String>) -> Self {
        Self::new().with_body(body.into())
    }

    /// Create a redirect to `location`
    #[must_use]
    pub fn redirect(location: &str, status: u16) -> Self {
        Self::new()
            .with_status(status)
            .with_header("Location", location)
    }

    /// Set status code
    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    /// Set the reason phrase
    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Set header
    #[must_use]
    pub fn with_header(mut self, key: &str, value: &str) -> Self {
        self.set_header(key, value);
        self
    }

    /// Set body
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Body>) -> Self {
        self.body = body.into();
        self
    }

    /// Set or override a header
    pub fn set_header(&mut self, key: &str, value: &str) {
        self.headers
            .insert(key.to_ascii_lowercase(), value.to_string());
    }

    /// Get a header value (case-insensitive)
    #[must_use]
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .get(&key.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Replace the body in place
    pub fn set_body(&mut self, body: impl Into<Body>) {
        self.body = body.into();
    }

    /// The reason phrase that will be reported for this response
    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref().or_else(|| {
            StatusCode::from_u16(self.status)
                .ok()
                .and_then(|s| s.canonical_reason())
        })
    }

    /// Convert to a hyper response for the wire
    ///
    /// An explicit `content-type` header wins over the one implied by the
    /// body. A custom reason phrase is carried as a [`ReasonPhrase`]
    /// extension; one that is not valid on the status line is dropped in
    /// favour of the canonical phrase.
    ///
    /// # Errors
    ///
    /// Returns an error if the status is out of range or a header is not
    /// representable.
    pub fn dispatch(self) -> Result<hyper::Response<Full<Bytes>>> {
        let status = StatusCode::from_u16(self.status).map_err(Error::internal)?;
        let mut builder = hyper::Response::builder().status(status);

        if let Some(reason) = self.reason {
            match ReasonPhrase::try_from(reason.into_bytes()) {
                Ok(phrase) => builder = builder.extension(phrase),
                Err(e) => warn!(status = self.status, error = %e, "Dropping invalid reason phrase"),
            }
        }

        if !self.headers.contains_key("content-type") {
            if let Some(content_type) = self.body.content_type() {
                builder = builder.header("content-type", content_type);
            }
        }
        for (key, value) in &self.headers {
            builder = builder.header(key.as_str(), value.as_str());
        }

        builder
            .body(Full::new(self.body.into_bytes()?))
            .map_err(Error::internal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_response_json() {
        let resp = Response::json(json!({"status": "ok"}));
        assert_eq!(resp.status, 200);
        assert_eq!(resp.body.content_type(), Some("application/json"));
        assert_eq!(resp.body.as_json(), Some(&json!({"status": "ok"})));
    }

    #[test]
    fn test_response_with_status() {
        let resp = Response::text("Not Found").with_status(404);
        assert_eq!(resp.status, 404);
        assert_eq!(resp.reason(), Some("Not Found"));
        assert_eq!(resp.body.as_text(), Some("Not Found"));
    }

    #[test]
    fn test_custom_reason() {
        let resp = Response::new().with_status(418).with_reason("Short and stout");
        assert_eq!(resp.reason(), Some("Short and stout"));
    }

    #[test]
    fn test_headers_case_insensitive() {
        let resp = Response::new().with_header("X-Trace", "1");
        assert_eq!(resp.header("x-trace"), Some("1"));
        assert_eq!(resp.header("X-TRACE"), Some("1"));
    }

    #[test]
    fn test_redirect() {
        let resp = Response::redirect("/users", 301);
        assert_eq!(resp.status, 301);
        assert_eq!(resp.header("location"), Some("/users"));
        assert!(resp.body.is_empty());
    }

    #[test]
    fn test_dispatch_json() {
        let hyper_resp = Response::json(json!({"id": "42"}))
            .with_status(201)
            .dispatch()
            .unwrap();
        assert_eq!(hyper_resp.status(), StatusCode::CREATED);
        assert_eq!(
            hyper_resp.headers().get("content-type").unwrap(),
            "application/json"
        );
    }

    #[test]
    fn test_dispatch_explicit_content_type_wins() {
        let hyper_resp = Response::text("<p>hi</p>")
            .with_header("Content-Type", "text/html")
            .dispatch()
            .unwrap();
        let values: Vec<_> = hyper_resp.headers().get_all("content-type").iter().collect();
        assert_eq!(values.len(), 1);
        assert_eq!(values[0], "text/html");
    }

    #[test]
    fn test_dispatch_carries_custom_reason() {
        let hyper_resp = Response::new()
            .with_status(418)
            .with_reason("Short and stout")
            .dispatch()
            .unwrap();
        assert_eq!(hyper_resp.status().as_u16(), 418);
        assert_eq!(
            hyper_resp
                .extensions()
                .get::<ReasonPhrase>()
                .map(ReasonPhrase::as_bytes),
            Some(&b"Short and stout"[..])
        );
    }

    #[test]
    fn test_dispatch_drops_invalid_reason() {
        let hyper_resp = Response::new()
            .with_status(200)
            .with_reason("bad\r\nX-Injected: 1")
            .dispatch()
            .unwrap();
        assert!(hyper_resp.extensions().get::<ReasonPhrase>().is_none());
        assert!(hyper_resp.headers().get("x-injected").is_none());
    }

    #[test]
    fn test_default_reason_adds_no_extension() {
        let hyper_resp = Response::new().with_status(404).dispatch().unwrap();
        assert!(hyper_resp.extensions().get::<ReasonPhrase>().is_none());
    }

    #[test]
    fn test_dispatch_rejects_invalid_status() {
        let result = Response::new().with_status(1000).dispatch();
        assert!(result.is_err());
    }
}
