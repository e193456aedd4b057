//! # HTTP Request
//!
//! Request wrapper carrying exactly what the dispatch core needs: method,
//! path, a mutable parameter store, headers and the collected body.
//!
//! ## Parameter store
//!
//! Query parameters are parsed once on construction. The kernel later merges
//! matched path placeholders into the same store; placeholders overwrite
//! query parameters of the same name.

use crate::error::{Error, Result};
use http_body_util::BodyExt;
use hyper::body::{Body, Bytes};
use hyper::header::{HeaderMap, HeaderName, HeaderValue};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::str::FromStr;

/// Mutable key/value store for query and path parameters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    data: HashMap<String, String>,
}

impl Params {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a raw query string (`page=1&limit=10`)
    ///
    /// Handles URL decoding; duplicate keys keep the last value.
    #[must_use]
    pub fn from_query(query: &str) -> Self {
        Self {
            data: url::form_urlencoded::parse(query.as_bytes())
                .into_owned()
                .collect(),
        }
    }

    /// Get a parameter by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.data.get(name).map(String::as_str)
    }

    /// Get a parameter parsed into `T`
    ///
    /// Returns `None` if the parameter is missing or does not parse.
    #[must_use]
    pub fn get_as<T: FromStr>(&self, name: &str) -> Option<T> {
        self.get(name).and_then(|value| value.parse().ok())
    }

    /// Check if a parameter exists
    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        self.data.contains_key(name)
    }

    /// Set or override a parameter
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.data.insert(name.into(), value.into());
    }

    /// Remove a parameter, returning its value
    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.data.remove(name)
    }

    /// Merge entries on top of the store; incoming values win
    pub fn merge<I, K, V>(&mut self, entries: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (name, value) in entries {
            self.set(name, value);
        }
    }

    /// Iterate over all parameters
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.data.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of parameters
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if the store is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// HTTP request as seen by middleware and handlers
#[derive(Debug, Clone)]
pub struct Request {
    method: String,
    path: String,
    query_string: Option<String>,
    params: Params,
    headers: HeaderMap,
    body: Option<Bytes>,
}

impl Request {
    /// Create a request from a method and a request target
    ///
    /// The target may carry a query string (`/users?page=2`), which is split
    /// off and parsed into the parameter store.
    pub fn new(method: impl Into<String>, target: &str) -> Self {
        let (path, query_string) = match target.split_once('?') {
            Some((path, query)) => (path.to_string(), Some(query.to_string())),
            None => (target.to_string(), None),
        };
        let params = query_string
            .as_deref()
            .map(Params::from_query)
            .unwrap_or_default();

        Self {
            method: method.into(),
            path,
            query_string,
            params,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    /// Create from a hyper request, collecting the body up to `max_body_size`
    ///
    /// # Errors
    ///
    /// Returns `Error::PayloadTooLarge` if the declared or collected body
    /// exceeds the limit.
    pub async fn from_hyper<B>(req: hyper::Request<B>, max_body_size: usize) -> Result<Self>
    where
        B: Body,
        B::Error: std::fmt::Display,
    {
        let (parts, body) = req.into_parts();

        let target = parts
            .uri
            .path_and_query()
            .map_or_else(|| parts.uri.path().to_string(), |pq| pq.as_str().to_string());
        let mut request = Self::new(parts.method.as_str(), &target);
        request.headers = parts.headers;

        let declared = request
            .header(hyper::header::CONTENT_LENGTH.as_str())
            .and_then(|len| len.parse::<usize>().ok());
        if let Some(actual) = declared.filter(|len| *len > max_body_size) {
            return Err(Error::PayloadTooLarge {
                limit: max_body_size,
                actual,
            });
        }

        match body.collect().await {
            Ok(collected) => {
                let bytes = collected.to_bytes();
                if bytes.len() > max_body_size {
                    return Err(Error::PayloadTooLarge {
                        limit: max_body_size,
                        actual: bytes.len(),
                    });
                }
                if !bytes.is_empty() {
                    request.body = Some(bytes);
                }
            }
            Err(e) => tracing::warn!(error = %e, "Failed to collect request body"),
        }

        Ok(request)
    }

    /// Set a header (builder style)
    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.set_header(name, value);
        self
    }

    /// Set the body (builder style)
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Rewrite the request path (builder style)
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// HTTP method as sent by the client
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Request path without the query string
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Rewrite the request path in place
    pub fn set_path(&mut self, path: impl Into<String>) {
        self.path = path.into();
    }

    /// Raw query string, if any
    #[must_use]
    pub fn query_string(&self) -> Option<&str> {
        self.query_string.as_deref()
    }

    /// Query and path parameters
    #[must_use]
    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Mutable access to the parameter store
    pub fn params_mut(&mut self) -> &mut Params {
        &mut self.params
    }

    /// Shorthand for `params().get(name)`
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name)
    }

    /// Get a header value by name (case-insensitive)
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Set or override a header
    ///
    /// Invalid names or values are ignored.
    pub fn set_header(&mut self, name: &str, value: &str) {
        if let (Ok(n), Ok(v)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.insert(n, v);
        }
    }

    /// All headers
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Whether the method usually carries a body
    #[must_use]
    pub fn has_body(&self) -> bool {
        matches!(self.method.as_str(), "POST" | "PUT" | "PATCH")
    }

    /// Get the request body as bytes
    #[must_use]
    pub fn body_bytes(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    /// Get the request body as string (UTF-8)
    #[must_use]
    pub fn body_str(&self) -> Option<&str> {
        self.body_bytes().and_then(|b| std::str::from_utf8(b).ok())
    }

    /// Deserialize the body as JSON
    ///
    /// A missing body is treated as `null`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Json` if the body does not deserialize into `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        let bytes = self.body_bytes().unwrap_or(b"null");
        Ok(serde_json::from_slice(bytes)?)
    }
}
