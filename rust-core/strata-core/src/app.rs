//! # Application
//!
//! Wires a router, a middleware pipeline and the kernel together.
//!
//! ```
//! use strata_core::{from_fn, Application, Request, Router};
//! use serde_json::json;
//!
//! let mut router = Router::new();
//! router
//!     .get(r"/items/{id:\d+}", from_fn(|_req, _res, args| Ok(json!({ "id": args[0] }).into())))
//!     .unwrap();
//!
//! let app = Application::builder(router).build().unwrap();
//! let response = app.handle(&mut Request::new("GET", "/items/42")).unwrap();
//! assert_eq!(response.body.as_json(), Some(&json!({ "id": "42" })));
//! ```

use crate::config::ServerConfig;
use crate::error::{Error, Result};
use crate::kernel::Kernel;
use crate::middleware::{Middleware, MiddlewareRegistry};
use crate::request::Request;
use crate::response::Response;
use crate::router::{Router, SharedRouter};
use crate::server::Server;
use std::sync::Arc;
use tracing::{error, info, warn};

/// A configured router and middleware stack
#[derive(Debug)]
pub struct Application {
    router: Arc<SharedRouter>,
    server: Server,
}

impl Application {
    /// Start building an application around `router`
    #[must_use]
    pub fn builder(router: Router) -> ApplicationBuilder {
        ApplicationBuilder::new(router)
    }

    /// Dispatch a request through the middleware stack and the kernel
    ///
    /// # Errors
    ///
    /// Returns the routing or handler failure, already logged.
    pub fn handle(&self, request: &mut Request) -> Result<Response> {
        let result = self.server.run(request, |_| Ok(Response::new()));
        if let Err(e) = &result {
            log_failure(request, e);
        }
        result
    }

    /// Live routing table
    #[must_use]
    pub fn router(&self) -> &Arc<SharedRouter> {
        &self.router
    }

    /// The middleware pipeline
    #[must_use]
    pub fn server(&self) -> &Server {
        &self.server
    }
}

fn log_failure(request: &Request, e: &Error) {
    let status = e.status();
    if e.is_client_error() {
        warn!(method = %request.method(), path = %request.path(), status, error = %e, "Request rejected");
    } else {
        let cause = std::error::Error::source(e).map(ToString::to_string);
        error!(
            method = %request.method(),
            path = %request.path(),
            status,
            error = %e,
            cause = cause.as_deref().unwrap_or("-"),
            "Request failed"
        );
    }
}

/// Builder for [`Application`]
pub struct ApplicationBuilder {
    router: Router,
    registry: MiddlewareRegistry,
    middleware: Vec<Arc<dyn Middleware>>,
    named: Vec<String>,
}

impl ApplicationBuilder {
    /// Start from `router`, with the built-in middleware registry
    #[must_use]
    pub fn new(router: Router) -> Self {
        Self {
            router,
            registry: MiddlewareRegistry::new(),
            middleware: Vec::new(),
            named: Vec::new(),
        }
    }

    /// Resolve named middleware through `registry`
    #[must_use]
    pub fn registry(mut self, registry: MiddlewareRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Add a middleware after those already added
    #[must_use]
    pub fn middleware<M: Middleware + 'static>(mut self, middleware: M) -> Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    /// Add a middleware by registry name
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.named.push(name.into());
        self
    }

    /// Install the named middleware listed in `config`
    #[must_use]
    pub fn config(mut self, config: &ServerConfig) -> Self {
        self.named.extend(config.middleware.iter().cloned());
        self
    }

    /// Assemble the application
    ///
    /// Named middleware run outermost, in the order given, followed by
    /// middleware added as values. The kernel is always last.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidMiddleware` if a name is not registered.
    pub fn build(self) -> Result<Application> {
        let router = Arc::new(SharedRouter::new(self.router));
        let server = Server::with_registry(self.registry);

        for name in &self.named {
            server.append_named(name)?;
        }
        for middleware in self.middleware {
            server.append_arc(middleware);
        }
        server.append(Kernel::new(Arc::clone(&router)));

        info!(
            routes = router.load().len(),
            middleware = ?server.names(),
            "Application ready"
        );
        Ok(Application { router, server })
    }
}

impl std::fmt::Debug for ApplicationBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApplicationBuilder")
            .field("router", &self.router)
            .field("named", &self.named)
            .field("middleware", &self.middleware.len())
            .finish_non_exhaustive()
    }
}
