//! # Strata Core
//!
//! Request-dispatch core for the Strata framework.
//! Matches requests against declarative URL patterns and runs them through an
//! onion-model middleware pipeline whose innermost layer invokes the matched
//! handler.
//!
//! ## Architecture
//!
//! ```text
//! request -> Server(middleware..., Kernel) -> Router::match_route -> handler
//!                  ^                                                   |
//!                  +------------------- response <--------------------+
//! ```
//!
//! ## Modules
//!
//! - `pattern` - Placeholder templates compiled to anchored regexes
//! - `router` - Route table with deterministic precedence and hot reload
//! - `route` - Registered routes and request-scoped matches
//! - `handler` - Handler references, controllers and their resolution
//! - `middleware` - Middleware trait, chain frames and built-in middleware
//! - `server` - The middleware pipeline
//! - `kernel` - Terminal middleware performing routing
//! - `app` - Router, pipeline and kernel wired together
//! - `request` / `response` - Request and response records
//! - `http` - Hyper transport adapter
//! - `config` - Server configuration
//! - `logging` - Tracing subscriber setup
//! - `error` - Error types and handling

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod app;
pub mod config;
pub mod error;
pub mod handler;
pub mod http;
pub mod kernel;
pub mod logging;
pub mod middleware;
pub mod pattern;
pub mod request;
pub mod response;
pub mod route;
pub mod router;
pub mod server;

pub use app::{Application, ApplicationBuilder};
pub use config::ServerConfig;
pub use error::{Error, Result};
pub use handler::{
    from_fn, Controller, ControllerRegistry, HandlerError, HandlerRef, HandlerResult, Output,
};
pub use kernel::Kernel;
pub use logging::{init_tracing, LogFormat};
pub use middleware::{
    CorsMiddleware, LoggingMiddleware, Middleware, MiddlewareRegistry, Next, RateLimitMiddleware,
    RequestIdMiddleware, TimingMiddleware, TrailingSlashMiddleware,
};
pub use pattern::Pattern;
pub use request::{Params, Request};
pub use response::{Body, Response};
pub use route::{Route, RouteMatch};
pub use router::{Method, Router, SharedRouter};
pub use server::Server;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
