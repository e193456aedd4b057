//! # Router
//!
//! Pattern router with deterministic precedence.
//!
//! ## Matching
//!
//! 1. A method with neither its own bucket nor an `ANY` bucket is rejected
//!    with `InvalidMethod`.
//! 2. Literal routes are found with a single hash lookup, exact method first,
//!    then `ANY`. A literal hit beats every placeholder route.
//! 3. Placeholder routes from both buckets are tried in registration order.
//!    Routes whose literal prefix does not fit the path are skipped without
//!    running their regex. The first full match wins.
//!
//! Registration order is the only tie-breaker: register specific routes
//! before general ones.
//!
//! ## Hot reload
//!
//! [`SharedRouter`] holds the table behind an `ArcSwap`. Updates clone the
//! table, apply the change and swap it in, so a lookup never sees a partial
//! update.

use crate::error::{Error, Result};
use crate::handler::{ControllerRegistry, HandlerRef};
use crate::pattern::Pattern;
use crate::route::{Route, RouteMatch};
use arc_swap::ArcSwap;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, trace};

/// HTTP methods supported by the router
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// Matches every request method
    Any,
    /// HTTP GET
    Get,
    /// HTTP POST
    Post,
    /// HTTP PUT
    Put,
    /// HTTP DELETE
    Delete,
    /// HTTP PATCH
    Patch,
    /// HTTP HEAD
    Head,
    /// HTTP OPTIONS
    Options,
}

impl Method {
    /// Wire name of the method
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Any => "ANY",
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Patch => "PATCH",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Method {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ANY" => Ok(Self::Any),
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "DELETE" => Ok(Self::Delete),
            "PATCH" => Ok(Self::Patch),
            "HEAD" => Ok(Self::Head),
            "OPTIONS" => Ok(Self::Options),
            other => Err(Error::InvalidMethod {
                method: other.to_string(),
            }),
        }
    }
}

/// Per-method storage for routes
#[derive(Clone, Default)]
struct MethodRoutes {
    /// Routes in registration order
    routes: Vec<Arc<Route>>,
    /// Normalized pattern to position in `routes`
    index: HashMap<String, usize>,
}

impl MethodRoutes {
    fn get(&self, pattern: &str) -> Option<&Arc<Route>> {
        self.index.get(pattern).map(|&pos| &self.routes[pos])
    }
}

/// Walk two registration-ordered slices as one sequence
fn in_registration_order<'a>(
    a: &'a [Arc<Route>],
    b: &'a [Arc<Route>],
) -> impl Iterator<Item = &'a Arc<Route>> {
    let mut a = a.iter().peekable();
    let mut b = b.iter().peekable();
    std::iter::from_fn(move || {
        let take_a = match (a.peek(), b.peek()) {
            (Some(x), Some(y)) => x.seq() < y.seq(),
            (Some(_), None) => true,
            (None, _) => false,
        };
        if take_a {
            a.next()
        } else {
            b.next()
        }
    })
}

/// HTTP router
#[derive(Clone, Default)]
pub struct Router {
    /// Per-method route buckets
    method_routes: HashMap<Method, MethodRoutes>,
    /// Controllers available to `"Name@action"` handlers
    controllers: ControllerRegistry,
    /// Next registration sequence number
    next_seq: u64,
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("routes", &self.len())
            .field("controllers", &self.controllers)
            .finish()
    }
}

impl Router {
    /// Create a new empty router
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a router resolving named handlers through `controllers`
    #[must_use]
    pub fn with_controllers(controllers: ControllerRegistry) -> Self {
        Self {
            controllers,
            ..Self::default()
        }
    }

    /// Controllers used for named handlers
    pub fn controllers_mut(&mut self) -> &mut ControllerRegistry {
        &mut self.controllers
    }

    /// Register a route
    ///
    /// Re-registering the same method and pattern replaces the handler and
    /// keeps the original registration position.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRoutePattern` if the pattern does not compile,
    /// or `Error::InvalidRouteHandler` if the handler cannot be resolved.
    pub fn register(
        &mut self,
        method: Method,
        pattern: &str,
        handler: impl Into<HandlerRef>,
    ) -> Result<()> {
        let pattern = Pattern::compile(pattern)?;
        let handler = handler.into().resolve(&self.controllers)?;

        let bucket = self.method_routes.entry(method).or_default();

        if let Some(&pos) = bucket.index.get(pattern.as_str()) {
            let seq = bucket.routes[pos].seq();
            debug!(%method, pattern = %pattern, handler = handler.label(), "Route replaced");
            bucket.routes[pos] = Arc::new(Route::new(method, pattern, handler, seq));
            return Ok(());
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        debug!(%method, pattern = %pattern, handler = handler.label(), seq, "Route registered");

        bucket
            .index
            .insert(pattern.as_str().to_string(), bucket.routes.len());
        bucket
            .routes
            .push(Arc::new(Route::new(method, pattern, handler, seq)));
        Ok(())
    }

    /// Match a request against registered routes
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidMethod` if neither the method nor `ANY` has any
    /// routes, and `Error::RouteNotFound` if nothing matches `path`.
    pub fn match_route(&self, method: &str, path: &str) -> Result<RouteMatch> {
        let exact = method
            .parse::<Method>()
            .ok()
            .filter(|m| *m != Method::Any)
            .and_then(|m| self.method_routes.get(&m));
        let any = self.method_routes.get(&Method::Any);

        if exact.is_none() && any.is_none() {
            return Err(Error::InvalidMethod {
                method: method.to_string(),
            });
        }

        for bucket in [exact, any].into_iter().flatten() {
            if let Some(route) = bucket.get(path).filter(|r| r.pattern().is_literal()) {
                trace!(method, path, "Literal route matched");
                return Ok(RouteMatch::new(Arc::clone(route), Vec::new()));
            }
        }

        let exact_routes = exact.map_or(&[][..], |b| b.routes.as_slice());
        let any_routes = any.map_or(&[][..], |b| b.routes.as_slice());

        for route in in_registration_order(any_routes, exact_routes) {
            let pattern = route.pattern();
            if pattern.is_literal() || !pattern.may_match(path) {
                continue;
            }
            // An exact-method route shadows an ANY route with the same pattern
            if route.method() == Method::Any
                && exact.is_some_and(|b| b.index.contains_key(pattern.as_str()))
            {
                continue;
            }
            if let Some(values) = pattern.captures(path) {
                trace!(method, path, pattern = %pattern, "Placeholder route matched");
                return Ok(RouteMatch::new(Arc::clone(route), values));
            }
        }

        debug!(method, path, "No route matched");
        Err(Error::RouteNotFound {
            path: path.to_string(),
        })
    }

    /// Register a route for any method
    ///
    /// # Errors
    ///
    /// See [`Router::register`].
    pub fn any(&mut self, path: &str, handler: impl Into<HandlerRef>) -> Result<()> {
        self.register(Method::Any, path, handler)
    }

    /// Convenience method to add a GET route
    ///
    /// # Errors
    ///
    /// See [`Router::register`].
    pub fn get(&mut self, path: &str, handler: impl Into<HandlerRef>) -> Result<()> {
        self.register(Method::Get, path, handler)
    }

    /// Convenience method to add a POST route
    ///
    /// # Errors
    ///
    /// See [`Router::register`].
    pub fn post(&mut self, path: &str, handler: impl Into<HandlerRef>) -> Result<()> {
        self.register(Method::Post, path, handler)
    }

    /// Convenience method to add a PUT route
    ///
    /// # Errors
    ///
    /// See [`Router::register`].
    pub fn put(&mut self, path: &str, handler: impl Into<HandlerRef>) -> Result<()> {
        self.register(Method::Put, path, handler)
    }

    /// Convenience method to add a DELETE route
    ///
    /// # Errors
    ///
    /// See [`Router::register`].
    pub fn delete(&mut self, path: &str, handler: impl Into<HandlerRef>) -> Result<()> {
        self.register(Method::Delete, path, handler)
    }

    /// Convenience method to add a PATCH route
    ///
    /// # Errors
    ///
    /// See [`Router::register`].
    pub fn patch(&mut self, path: &str, handler: impl Into<HandlerRef>) -> Result<()> {
        self.register(Method::Patch, path, handler)
    }

    /// Convenience method to add a HEAD route
    ///
    /// # Errors
    ///
    /// See [`Router::register`].
    pub fn head(&mut self, path: &str, handler: impl Into<HandlerRef>) -> Result<()> {
        self.register(Method::Head, path, handler)
    }

    /// Convenience method to add an OPTIONS route
    ///
    /// # Errors
    ///
    /// See [`Router::register`].
    pub fn options(&mut self, path: &str, handler: impl Into<HandlerRef>) -> Result<()> {
        self.register(Method::Options, path, handler)
    }

    /// Register the five CRUD routes of a resource
    ///
    /// `resource("books", "Books")` maps `GET /books` to `Books@index`,
    /// `POST /books` to `Books@create`, and `GET`, `PUT`, `DELETE` on
    /// `/books/{id}` to `show`, `update` and `destroy`.
    ///
    /// # Errors
    ///
    /// Fails on the first action the controller does not expose.
    pub fn resource(&mut self, name: &str, controller: &str) -> Result<()> {
        let name = name.trim_matches('/');
        self.get(&format!("/{name}"), format!("{controller}@index"))?;
        self.post(&format!("/{name}"), format!("{controller}@create"))?;
        self.get(&format!("/{name}/{{id}}"), format!("{controller}@show"))?;
        self.put(&format!("/{name}/{{id}}"), format!("{controller}@update"))?;
        self.delete(&format!("/{name}/{{id}}"), format!("{controller}@destroy"))?;
        Ok(())
    }

    /// All routes, bucket by bucket
    pub fn routes(&self) -> impl Iterator<Item = &Route> {
        self.method_routes
            .values()
            .flat_map(|bucket| bucket.routes.iter().map(|route| &**route))
    }

    /// Number of registered routes
    #[must_use]
    pub fn len(&self) -> usize {
        self.method_routes.values().map(|b| b.routes.len()).sum()
    }

    /// Check if no routes are registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Router snapshot that can be swapped while requests are being served
pub struct SharedRouter {
    current: ArcSwap<Router>,
    writer: Mutex<()>,
}

impl SharedRouter {
    /// Wrap a configured router
    #[must_use]
    pub fn new(router: Router) -> Self {
        Self {
            current: ArcSwap::from_pointee(router),
            writer: Mutex::new(()),
        }
    }

    /// Current table
    #[must_use]
    pub fn load(&self) -> Arc<Router> {
        self.current.load_full()
    }

    /// Replace the whole table
    pub fn store(&self, router: Router) {
        let _guard = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        self.current.store(Arc::new(router));
    }

    /// Apply `f` to a copy of the table and publish it
    ///
    /// If `f` fails the live table is left untouched.
    ///
    /// # Errors
    ///
    /// Returns whatever `f` returns.
    pub fn update<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut Router) -> Result<()>,
    {
        let _guard = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        let mut next = Router::clone(&self.current.load());
        f(&mut next)?;
        debug!(routes = next.len(), "Route table swapped");
        self.current.store(Arc::new(next));
        Ok(())
    }

    /// Match against the current table
    ///
    /// # Errors
    ///
    /// See [`Router::match_route`].
    pub fn match_route(&self, method: &str, path: &str) -> Result<RouteMatch> {
        self.current.load().match_route(method, path)
    }
}

impl From<Router> for SharedRouter {
    fn from(router: Router) -> Self {
        Self::new(router)
    }
}

impl std::fmt::Debug for SharedRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SharedRouter").field(&self.load()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{from_fn, Controller, HandlerResult, Output};
    use crate::request::Request;
    use crate::response::{Body, Response};

    fn tag(name: &'static str) -> HandlerRef {
        from_fn(move |_req, _res, _args| Ok(name.into()))
    }

    fn label(m: &RouteMatch) -> String {
        let request = Request::new("GET", "/");
        let mut response = Response::new();
        match m.invoke(&request, &mut response).unwrap() {
            Output::Body(Body::Text(t)) => t,
            other => panic!("unexpected output {other:?}"),
        }
    }

    #[test]
    fn test_basic_routing() {
        let mut router = Router::new();
        router.get("/", tag("root")).unwrap();
        router.get("/users", tag("list")).unwrap();
        router.post("/users", tag("create")).unwrap();

        assert_eq!(label(&router.match_route("GET", "/").unwrap()), "root");
        assert_eq!(label(&router.match_route("GET", "/users").unwrap()), "list");
        assert_eq!(label(&router.match_route("POST", "/users").unwrap()), "create");
        assert_eq!(router.len(), 3);
    }

    #[test]
    fn test_trailing_slash_is_normalized_on_registration() {
        let mut router = Router::new();
        router.get("/users/", tag("list")).unwrap();
        router.get("", tag("root")).unwrap();

        assert_eq!(label(&router.match_route("GET", "/users").unwrap()), "list");
        assert_eq!(label(&router.match_route("GET", "/").unwrap()), "root");
    }

    #[test]
    fn test_path_parameters() {
        let mut router = Router::new();
        router.get("/users/{id}", tag("user")).unwrap();
        router
            .get("/users/{user_id}/posts/{post_id}", tag("post"))
            .unwrap();

        let m = router.match_route("GET", "/users/123").unwrap();
        assert_eq!(m.arg("id"), Some("123"));

        let m = router.match_route("GET", "/users/456/posts/789").unwrap();
        assert_eq!(m.values(), ["456", "789"]);
        assert_eq!(m.arg("user_id"), Some("456"));
        assert_eq!(m.arg("post_id"), Some("789"));
    }

    #[test]
    fn test_regex_constraint() {
        let mut router = Router::new();
        router.get(r"/items/{id:\d+}", tag("item")).unwrap();

        let m = router.match_route("GET", "/items/42").unwrap();
        assert_eq!(m.arg_as::<u64>("id"), Some(42));

        let err = router.match_route("GET", "/items/abc").unwrap_err();
        assert!(matches!(err, Error::RouteNotFound { .. }));
    }

    #[test]
    fn test_literal_beats_placeholder() {
        let mut router = Router::new();
        router.get("/{x}", tag("placeholder")).unwrap();
        router.get("/a", tag("literal")).unwrap();

        assert_eq!(label(&router.match_route("GET", "/a").unwrap()), "literal");
        assert_eq!(label(&router.match_route("GET", "/b").unwrap()), "placeholder");
    }

    #[test]
    fn test_literal_lookup_ignores_placeholder_count() {
        let mut router = Router::new();
        for i in 0..200 {
            router.get(&format!("/{{a{i}}}/{{b}}"), tag("p")).unwrap();
        }
        router.get("/health", tag("health")).unwrap();
        assert_eq!(label(&router.match_route("GET", "/health").unwrap()), "health");
    }

    #[test]
    fn test_registration_order_breaks_ties() {
        let mut router = Router::new();
        router.get("/files/{name}", tag("A")).unwrap();
        router.get("/files/{path:.+}", tag("B")).unwrap();
        assert_eq!(label(&router.match_route("GET", "/files/x").unwrap()), "A");

        let mut router = Router::new();
        router.get("/files/{path:.+}", tag("B")).unwrap();
        router.get("/files/{name}", tag("A")).unwrap();
        assert_eq!(label(&router.match_route("GET", "/files/x").unwrap()), "B");
    }

    #[test]
    fn test_registration_order_spans_buckets() {
        let mut router = Router::new();
        router.any("/v/{a}", tag("any")).unwrap();
        router.get("/v/{b}", tag("get")).unwrap();
        assert_eq!(label(&router.match_route("GET", "/v/1").unwrap()), "any");

        let mut router = Router::new();
        router.get("/v/{b}", tag("get")).unwrap();
        router.any("/v/{a}", tag("any")).unwrap();
        assert_eq!(label(&router.match_route("GET", "/v/1").unwrap()), "get");
    }

    #[test]
    fn test_exact_method_shadows_any_with_same_pattern() {
        let mut router = Router::new();
        router.any("/v/{id}", tag("any")).unwrap();
        router.get("/v/{id}", tag("get")).unwrap();
        assert_eq!(label(&router.match_route("GET", "/v/1").unwrap()), "get");
        assert_eq!(label(&router.match_route("POST", "/v/1").unwrap()), "any");
    }

    #[test]
    fn test_overwrite_is_last_write_wins() {
        let mut router = Router::new();
        router.get("/x/{id}", tag("first")).unwrap();
        router.get("/x/{other}", tag("second")).unwrap();
        router.get("/x/{id}", tag("replaced")).unwrap();

        assert_eq!(router.len(), 2);
        // keeps its original position ahead of "/x/{other}"
        assert_eq!(label(&router.match_route("GET", "/x/1").unwrap()), "replaced");
    }

    #[test]
    fn test_any_method_routes() {
        let mut router = Router::new();
        router.any("/ping", tag("pong")).unwrap();
        assert_eq!(label(&router.match_route("DELETE", "/ping").unwrap()), "pong");
        assert_eq!(label(&router.match_route("BREW", "/ping").unwrap()), "pong");
    }

    #[test]
    fn test_invalid_method_without_any_bucket() {
        let mut router = Router::new();
        router.get("/users", tag("list")).unwrap();

        let err = router.match_route("POST", "/users").unwrap_err();
        assert!(matches!(err, Error::InvalidMethod { method } if method == "POST"));
        let err = router.match_route("BREW", "/users").unwrap_err();
        assert!(matches!(err, Error::InvalidMethod { .. }));
    }

    #[test]
    fn test_not_found_with_any_bucket() {
        let mut router = Router::new();
        router.any("/ping", tag("pong")).unwrap();
        let err = router.match_route("POST", "/users").unwrap_err();
        assert!(matches!(err, Error::RouteNotFound { path } if path == "/users"));
    }

    #[test]
    fn test_route_not_found() {
        let mut router = Router::new();
        router.get("/users", tag("list")).unwrap();
        let result = router.match_route("GET", "/nonexistent");
        assert!(matches!(result, Err(Error::RouteNotFound { .. })));
    }

    #[test]
    fn test_invalid_pattern_is_rejected() {
        let mut router = Router::new();
        let err = router.get("/users/{id", tag("x")).unwrap_err();
        assert!(matches!(err, Error::InvalidRoutePattern { .. }));
        assert!(router.is_empty());
    }

    #[derive(Default)]
    struct Books;

    impl Controller for Books {
        fn actions(&self) -> &[&'static str] {
            &["index", "create", "show", "update", "destroy"]
        }

        fn call(
            &self,
            action: &str,
            _request: &Request,
            _response: &mut Response,
            args: &[String],
        ) -> HandlerResult {
            Ok(format!("{action}:{}", args.join(",")).into())
        }
    }

    #[test]
    fn test_resource_routes() {
        let mut controllers = ControllerRegistry::new();
        controllers.register::<Books>("Books");
        let mut router = Router::with_controllers(controllers);
        router.resource("books", "Books").unwrap();

        assert_eq!(router.len(), 5);
        assert_eq!(label(&router.match_route("GET", "/books").unwrap()), "index:");
        assert_eq!(label(&router.match_route("POST", "/books").unwrap()), "create:");
        assert_eq!(label(&router.match_route("GET", "/books/3").unwrap()), "show:3");
        assert_eq!(label(&router.match_route("PUT", "/books/3").unwrap()), "update:3");
        assert_eq!(label(&router.match_route("DELETE", "/books/3").unwrap()), "destroy:3");
    }

    #[test]
    fn test_unknown_controller_fails_registration() {
        let mut router = Router::new();
        let err = router.get("/x", "Missing@show").unwrap_err();
        assert!(matches!(err, Error::InvalidRouteHandler { .. }));
    }

    #[test]
    fn test_method_round_trip() {
        for method in [Method::Get, Method::Post, Method::Any, Method::Options] {
            assert_eq!(method.as_str().parse::<Method>().unwrap(), method);
        }
        assert!("get".parse::<Method>().is_err());
    }

    #[test]
    fn test_shared_router_update() {
        let shared = SharedRouter::new(Router::new());
        assert!(matches!(
            shared.match_route("GET", "/a"),
            Err(Error::InvalidMethod { .. })
        ));

        shared.update(|r| r.get("/a", tag("a"))).unwrap();
        assert_eq!(label(&shared.match_route("GET", "/a").unwrap()), "a");
    }

    #[test]
    fn test_shared_router_failed_update_keeps_table() {
        let mut router = Router::new();
        router.get("/a", tag("a")).unwrap();
        let shared = SharedRouter::new(router);

        let result = shared.update(|r| {
            r.get("/b", tag("b"))?;
            r.get("/c/{broken", tag("c"))
        });
        assert!(result.is_err());
        assert_eq!(shared.load().len(), 1);
        assert!(shared.match_route("GET", "/b").is_err());
    }

    #[test]
    fn test_snapshot_survives_swap() {
        let mut router = Router::new();
        router.get("/a", tag("old")).unwrap();
        let shared = SharedRouter::new(router);

        let snapshot = shared.load();
        let mut replacement = Router::new();
        replacement.get("/a", tag("new")).unwrap();
        shared.store(replacement);

        assert_eq!(label(&snapshot.match_route("GET", "/a").unwrap()), "old");
        assert_eq!(label(&shared.match_route("GET", "/a").unwrap()), "new");
    }

    #[test]
    fn test_concurrent_matches_keep_their_own_args() {
        let mut router = Router::new();
        router
            .get(
                "/users/{id}/posts/{post}",
                from_fn(|_req, _res, args| Ok(args.join(",").into())),
            )
            .unwrap();
        let shared = SharedRouter::new(router);

        std::thread::scope(|scope| {
            for worker in 0..8 {
                let shared = &shared;
                scope.spawn(move || {
                    for i in 0..200 {
                        let id = format!("{worker}-{i}");
                        let path = format!("/users/{id}/posts/{i}");
                        let m = shared.match_route("GET", &path).unwrap();
                        assert_eq!(m.arg("id"), Some(id.as_str()));
                        assert_eq!(m.arg("post"), Some(i.to_string().as_str()));
                        assert_eq!(label(&m), format!("{id},{i}"));
                    }
                });
            }
        });
    }
}
