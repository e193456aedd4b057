//! # Routes
//!
//! A [`Route`] is the immutable binding of a method and a compiled pattern to
//! a resolved handler. Routes are shared between requests, so matched values
//! never live on them; a successful lookup produces a request-scoped
//! [`RouteMatch`] instead.

use crate::handler::{HandlerResult, ResolvedHandler};
use crate::pattern::Pattern;
use crate::request::Request;
use crate::response::Response;
use crate::router::Method;
use std::str::FromStr;
use std::sync::Arc;

/// Registered route
#[derive(Debug)]
pub struct Route {
    method: Method,
    pattern: Pattern,
    handler: ResolvedHandler,
    seq: u64,
}

impl Route {
    pub(crate) fn new(method: Method, pattern: Pattern, handler: ResolvedHandler, seq: u64) -> Self {
        Self {
            method,
            pattern,
            handler,
            seq,
        }
    }

    /// Method bucket this route lives in
    #[must_use]
    pub fn method(&self) -> Method {
        self.method
    }

    /// Compiled pattern
    #[must_use]
    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    /// Normalized template string
    #[must_use]
    pub fn uri(&self) -> &str {
        self.pattern.as_str()
    }

    /// Resolved handler
    #[must_use]
    pub fn handler(&self) -> &ResolvedHandler {
        &self.handler
    }

    /// Router-wide registration position
    #[must_use]
    pub fn seq(&self) -> u64 {
        self.seq
    }
}

/// Result of a successful match, owned by a single request
#[derive(Debug, Clone)]
pub struct RouteMatch {
    route: Arc<Route>,
    values: Vec<String>,
}

impl RouteMatch {
    pub(crate) fn new(route: Arc<Route>, values: Vec<String>) -> Self {
        Self { route, values }
    }

    /// The matched route
    #[must_use]
    pub fn route(&self) -> &Route {
        &self.route
    }

    /// Captured values in placeholder order
    #[must_use]
    pub fn values(&self) -> &[String] {
        &self.values
    }

    /// Placeholder name/value pairs in declaration order
    pub fn args(&self) -> impl Iterator<Item = (&str, &str)> {
        self.route
            .pattern
            .names()
            .iter()
            .zip(&self.values)
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    /// Get a captured value by placeholder name
    #[must_use]
    pub fn arg(&self, name: &str) -> Option<&str> {
        self.args().find(|(n, _)| *n == name).map(|(_, v)| v)
    }

    /// Get a captured value parsed into `T`
    #[must_use]
    pub fn arg_as<T: FromStr>(&self, name: &str) -> Option<T> {
        self.arg(name).and_then(|v| v.parse().ok())
    }

    /// Invoke the route's handler with the captured values
    pub fn invoke(&self, request: &Request, response: &mut Response) -> HandlerResult {
        self.route.handler.call(request, response, &self.values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{from_fn, ControllerRegistry, Output};
    use crate::response::Body;

    fn route(pattern: &str) -> Arc<Route> {
        let handler = from_fn(|_req, _res, args| Ok(args.join(",").into()))
            .resolve(&ControllerRegistry::new())
            .unwrap();
        Arc::new(Route::new(
            Method::Get,
            Pattern::compile(pattern).unwrap(),
            handler,
            0,
        ))
    }

    #[test]
    fn test_route_uri_is_normalized() {
        let r = route("/users/");
        assert_eq!(r.uri(), "/users");
        assert_eq!(r.method(), Method::Get);
    }

    #[test]
    fn test_match_args_in_order() {
        let r = route("/users/{user_id}/posts/{post_id}");
        let values = r.pattern().captures("/users/4/posts/2").unwrap();
        let m = RouteMatch::new(r, values);

        let args: Vec<_> = m.args().collect();
        assert_eq!(args, vec![("user_id", "4"), ("post_id", "2")]);
        assert_eq!(m.arg("post_id"), Some("2"));
        assert_eq!(m.arg_as::<u32>("user_id"), Some(4));
        assert_eq!(m.arg("missing"), None);
    }

    #[test]
    fn test_matches_do_not_share_args() {
        let r = route("/users/{id}");
        let first = RouteMatch::new(r.clone(), r.pattern().captures("/users/1").unwrap());
        let second = RouteMatch::new(r.clone(), r.pattern().captures("/users/2").unwrap());
        assert_eq!(first.arg("id"), Some("1"));
        assert_eq!(second.arg("id"), Some("2"));
    }

    #[test]
    fn test_invoke_passes_values() {
        let r = route("/{a}/{b}");
        let m = RouteMatch::new(r.clone(), r.pattern().captures("/x/y").unwrap());
        let request = Request::new("GET", "/x/y");
        let mut response = Response::new();
        let output = m.invoke(&request, &mut response).unwrap();
        assert!(matches!(output, Output::Body(Body::Text(t)) if t == "x,y"));
    }
}
