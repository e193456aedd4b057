//! # Error Handling
//!
//! Centralized error types for the Strata dispatch core.
//! Uses `thiserror` for ergonomic error definitions.
//!
//! Every variant maps onto an HTTP status class via [`Error::status`], so an
//! outer formatter never needs to inspect the concrete failure to pick one.

use thiserror::Error;

/// Result type alias for Strata operations
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed cause carried by [`Error::Internal`]
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Core error types for the dispatch core
#[derive(Error, Debug)]
pub enum Error {
    /// The request method has no route bucket, and no `ANY` bucket exists
    #[error("Invalid request method {method}")]
    InvalidMethod {
        /// The method that was requested
        method: String,
    },

    /// Router failed to match the requested path
    #[error("The requested resource at {path} does not exist")]
    RouteNotFound {
        /// The path that wasn't matched
        path: String,
    },

    /// Invalid route pattern provided
    #[error("Invalid route pattern: {pattern}: {reason}")]
    InvalidRoutePattern {
        /// The invalid pattern
        pattern: String,
        /// Reason for invalidity
        reason: String,
    },

    /// A handler reference could not be resolved to a controller action
    #[error("Cannot resolve route handler {handler} to a controller action")]
    InvalidRouteHandler {
        /// The unresolvable reference
        handler: String,
    },

    /// A named middleware could not be resolved
    #[error("Cannot use invalid middleware {name}: no middleware is registered under that name")]
    InvalidMiddleware {
        /// The unresolvable middleware name
        name: String,
    },

    /// A handler gave up on the request with a specific status
    #[error("{message}")]
    RouteHandler {
        /// HTTP status chosen by the handler
        status: u16,
        /// Human readable reason
        message: String,
    },

    /// A handler failed unexpectedly
    #[error("Internal server error: {source}")]
    Internal {
        /// The original failure
        #[source]
        source: BoxError,
    },

    /// Request payload too large
    #[error("Payload too large: limit={limit} bytes, received={actual} bytes")]
    PayloadTooLarge {
        /// Max allowed size
        limit: usize,
        /// Actual size
        actual: usize,
    },

    /// HTTP protocol error
    #[error("HTTP error: {0}")]
    Http(#[from] hyper::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Wrap an arbitrary failure as [`Error::Internal`]
    pub fn internal(source: impl Into<BoxError>) -> Self {
        Self::Internal {
            source: source.into(),
        }
    }

    /// HTTP status code this error should be rendered with
    #[must_use]
    pub fn status(&self) -> u16 {
        match self {
            Self::InvalidMethod { .. } => 400,
            Self::RouteNotFound { .. } => 404,
            Self::RouteHandler { status, .. } => *status,
            Self::PayloadTooLarge { .. } => 413,
            Self::Json(_) => 400,
            Self::InvalidRoutePattern { .. }
            | Self::InvalidRouteHandler { .. }
            | Self::InvalidMiddleware { .. }
            | Self::Internal { .. }
            | Self::Http(_)
            | Self::Io(_) => 500,
        }
    }

    /// Whether this error is the caller's fault (4xx)
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_route_not_found_error() {
        let err = Error::RouteNotFound {
            path: "/unknown".to_string(),
        };
        assert!(err.to_string().contains("/unknown"));
        assert_eq!(err.status(), 404);
        assert!(err.is_client_error());
    }

    #[test]
    fn test_invalid_method_is_bad_request() {
        let err = Error::InvalidMethod {
            method: "BREW".to_string(),
        };
        assert_eq!(err.status(), 400);
        assert!(err.to_string().contains("BREW"));
    }

    #[test]
    fn test_route_handler_keeps_status() {
        let err = Error::RouteHandler {
            status: 422,
            message: "missing title".to_string(),
        };
        assert_eq!(err.status(), 422);
        assert_eq!(err.to_string(), "missing title");
    }

    #[test]
    fn test_internal_preserves_source() {
        let io_err = std::io::Error::new(std::io::ErrorKind::Other, "disk on fire");
        let err = Error::internal(io_err);
        assert_eq!(err.status(), 500);
        assert!(!err.is_client_error());
        let source = err.source().expect("source preserved");
        assert_eq!(source.to_string(), "disk on fire");
    }

    #[test]
    fn test_configuration_errors_are_server_errors() {
        let err = Error::InvalidRouteHandler {
            handler: "Missing@show".to_string(),
        };
        assert_eq!(err.status(), 500);
        let err = Error::InvalidMiddleware {
            name: "nope".to_string(),
        };
        assert_eq!(err.status(), 500);
    }
}
