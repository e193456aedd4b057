//! # Middleware Pipeline
//!
//! Ordered middleware stack run around a caller-supplied default handler.
//!
//! The stack lives behind an `ArcSwap`. Each [`Server::run`] takes its own
//! snapshot, so changing the stack while requests are in flight never
//! affects a chain that has already started.

use crate::error::Result;
use crate::middleware::{Middleware, MiddlewareRegistry, Next};
use crate::request::Request;
use crate::response::Response;
use arc_swap::ArcSwap;
use std::sync::Arc;
use tracing::debug;

type Stack = Vec<Arc<dyn Middleware>>;

/// Middleware pipeline
pub struct Server {
    stack: ArcSwap<Stack>,
    registry: MiddlewareRegistry,
}

impl Default for Server {
    fn default() -> Self {
        Self::new()
    }
}

impl Server {
    /// Create an empty pipeline using the built-in middleware registry
    #[must_use]
    pub fn new() -> Self {
        Self::with_registry(MiddlewareRegistry::new())
    }

    /// Create an empty pipeline resolving names through `registry`
    #[must_use]
    pub fn with_registry(registry: MiddlewareRegistry) -> Self {
        Self {
            stack: ArcSwap::from_pointee(Vec::new()),
            registry,
        }
    }

    /// Add a middleware to the end of the stack
    pub fn append<M: Middleware + 'static>(&self, middleware: M) {
        self.append_arc(Arc::new(middleware));
    }

    /// Add a middleware to the front of the stack
    pub fn prepend<M: Middleware + 'static>(&self, middleware: M) {
        self.prepend_arc(Arc::new(middleware));
    }

    /// Add a shared middleware to the end of the stack
    pub fn append_arc(&self, middleware: Arc<dyn Middleware>) {
        debug!(middleware = middleware.name(), "Middleware appended");
        self.stack.rcu(|stack| {
            let mut next = Stack::clone(stack);
            next.push(Arc::clone(&middleware));
            next
        });
    }

    /// Add a shared middleware to the front of the stack
    pub fn prepend_arc(&self, middleware: Arc<dyn Middleware>) {
        debug!(middleware = middleware.name(), "Middleware prepended");
        self.stack.rcu(|stack| {
            let mut next = Stack::with_capacity(stack.len() + 1);
            next.push(Arc::clone(&middleware));
            next.extend(stack.iter().cloned());
            next
        });
    }

    /// Append the middleware registered under `name`
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidMiddleware` if `name` is unknown.
    pub fn append_named(&self, name: &str) -> Result<()> {
        let middleware = self.registry.resolve(name)?;
        self.append_arc(middleware);
        Ok(())
    }

    /// Prepend the middleware registered under `name`
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidMiddleware` if `name` is unknown.
    pub fn prepend_named(&self, name: &str) -> Result<()> {
        let middleware = self.registry.resolve(name)?;
        self.prepend_arc(middleware);
        Ok(())
    }

    /// Run the pipeline with `default` as the innermost handler
    ///
    /// # Errors
    ///
    /// Returns the first error raised by a middleware or by `default`.
    pub fn run<F>(&self, request: &mut Request, default: F) -> Result<Response>
    where
        F: Fn(&mut Request) -> Result<Response>,
    {
        let stack = self.stack.load_full();
        Next::new(&stack, &default).run(request)
    }

    /// Names of the middleware in stack order
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.stack.load().iter().map(|m| m.name()).collect()
    }

    /// Get the number of middlewares
    #[must_use]
    pub fn len(&self) -> usize {
        self.stack.load().len()
    }

    /// Check if the stack is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stack.load().is_empty()
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("stack", &self.names())
            .field("registry", &self.registry)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::middleware::{from_fn, named_fn};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn tracer(name: &'static str, log: Arc<Mutex<Vec<String>>>) -> impl Middleware {
        named_fn(name, move |req, next| {
            log.lock().unwrap().push(format!("{name}:before"));
            let mut response = next.run(req)?;
            let inner = response.body.as_text().unwrap_or_default().to_string();
            log.lock().unwrap().push(format!("{name}:after saw {inner}"));
            response.set_body(format!("{name}({inner})"));
            Ok(response)
        })
    }

    #[test]
    fn test_server_empty() {
        let server = Server::new();
        assert!(server.is_empty());
        assert_eq!(server.len(), 0);

        let response = server
            .run(&mut Request::new("GET", "/"), |_| Ok(Response::text("D")))
            .unwrap();
        assert_eq!(response.body.as_text(), Some("D"));
    }

    #[test]
    fn test_onion_ordering() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let calls = AtomicUsize::new(0);

        let server = Server::new();
        server.append(tracer("A", log.clone()));
        server.append(tracer("B", log.clone()));
        assert_eq!(server.names(), vec!["A", "B"]);

        let response = server
            .run(&mut Request::new("GET", "/"), |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(Response::text("D"))
            })
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(response.body.as_text(), Some("A(B(D))"));
        assert_eq!(
            *log.lock().unwrap(),
            vec!["A:before", "B:before", "B:after saw D", "A:after saw B(D)"]
        );
    }

    #[test]
    fn test_prepend_runs_first() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let server = Server::new();
        server.append(tracer("A", log.clone()));
        server.prepend(tracer("B", log.clone()));

        let response = server
            .run(&mut Request::new("GET", "/"), |_| Ok(Response::text("D")))
            .unwrap();
        assert_eq!(response.body.as_text(), Some("B(A(D))"));
    }

    #[test]
    fn test_short_circuit_skips_default() {
        let server = Server::new();
        server.append(from_fn(|_req, _next| Ok(Response::text("denied").with_status(403))));

        let calls = AtomicUsize::new(0);
        let response = server
            .run(&mut Request::new("GET", "/"), |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(Response::new())
            })
            .unwrap();

        assert_eq!(response.status, 403);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_pre_processing_mutates_request() {
        let server = Server::new();
        server.append(from_fn(|req, next| {
            req.params_mut().set("tenant", "acme");
            next.run(req)
        }));

        let response = server
            .run(&mut Request::new("GET", "/"), |req| {
                Ok(Response::text(req.param("tenant").unwrap_or("-").to_string()))
            })
            .unwrap();
        assert_eq!(response.body.as_text(), Some("acme"));
    }

    #[test]
    fn test_append_during_run_does_not_affect_chain() {
        let server = Arc::new(Server::new());
        let inner = Arc::clone(&server);
        server.append(from_fn(move |req, next| {
            inner.append(from_fn(|_req, _next| Ok(Response::text("late"))));
            next.run(req)
        }));

        let response = server
            .run(&mut Request::new("GET", "/"), |_| Ok(Response::text("D")))
            .unwrap();
        assert_eq!(response.body.as_text(), Some("D"));
        assert_eq!(server.len(), 2);
    }

    #[test]
    fn test_errors_propagate() {
        let server = Server::new();
        server.append(from_fn(|req, next| next.run(req)));
        let err = server
            .run(&mut Request::new("GET", "/x"), |req| {
                Err(Error::RouteNotFound {
                    path: req.path().to_string(),
                })
            })
            .unwrap_err();
        assert!(matches!(err, Error::RouteNotFound { .. }));
    }

    #[test]
    fn test_named_middleware() {
        let server = Server::new();
        server.append_named("timing").unwrap();
        server.prepend_named("request_id").unwrap();
        assert_eq!(server.names(), vec!["RequestIdMiddleware", "TimingMiddleware"]);

        let err = server.append_named("compression").unwrap_err();
        assert!(matches!(err, Error::InvalidMiddleware { .. }));
        assert_eq!(server.len(), 2);
    }
}
