//! # Route Handlers
//!
//! A route can point at three kinds of handler:
//!
//! - an in-process function (`from_fn`)
//! - a named controller action (`"Books@show"`), resolved through a
//!   [`ControllerRegistry`]
//! - a pre-built controller object
//!
//! All three are resolved once, at registration, into a [`ResolvedHandler`]:
//! a controller plus the action to call on it.

use crate::error::{Error, Result};
use crate::request::Request;
use crate::response::{Body, Response};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Separates the controller name from the action in a handler string
pub const CONTROLLER_DELIMITER: char = '@';

/// Action used when a handler string names no action, and for functions
pub const DEFAULT_ACTION: &str = "invoke";

/// What a handler produced
#[derive(Debug, Clone)]
pub enum Output {
    /// A complete response, returned as-is
    Response(Response),
    /// A body to place on the response the kernel prepared
    Body(Body),
}

impl From<Response> for Output {
    fn from(response: Response) -> Self {
        Self::Response(response)
    }
}

impl From<Body> for Output {
    fn from(body: Body) -> Self {
        Self::Body(body)
    }
}

impl From<serde_json::Value> for Output {
    fn from(value: serde_json::Value) -> Self {
        Self::Body(Body::Json(value))
    }
}

impl From<String> for Output {
    fn from(text: String) -> Self {
        Self::Body(Body::Text(text))
    }
}

impl From<&str> for Output {
    fn from(text: &str) -> Self {
        Self::Body(Body::Text(text.to_string()))
    }
}

/// Failure raised by a handler
///
/// Any `std::error::Error` converts into [`HandlerError::Other`], so handlers
/// can use `?` freely. `anyhow::Error` values go through
/// [`HandlerError::other`].
#[derive(Debug)]
pub enum HandlerError {
    /// The addressed resource does not exist
    NotFound(String),
    /// The handler rejected the request with a specific status
    Status {
        /// HTTP status
        status: u16,
        /// Human readable reason
        message: String,
    },
    /// Anything else; reported as an internal error
    Other(anyhow::Error),
}

impl HandlerError {
    /// Create a not-found failure
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Create a failure with a specific status
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self::Status {
            status,
            message: message.into(),
        }
    }

    /// Wrap an `anyhow::Error`
    #[must_use]
    pub fn other(error: anyhow::Error) -> Self {
        Self::Other(error)
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound(message) => write!(f, "Not found: {message}"),
            Self::Status { status, message } => write!(f, "{status}: {message}"),
            Self::Other(error) => write!(f, "{error}"),
        }
    }
}

impl<E> From<E> for HandlerError
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn from(error: E) -> Self {
        Self::Other(anyhow::Error::new(error))
    }
}

/// Result returned by handlers
pub type HandlerResult = std::result::Result<Output, HandlerError>;

/// Signature of function handlers
///
/// Arguments are the request, the response prepared by the pipeline, and the
/// captured placeholder values in declaration order.
pub type HandlerFn =
    dyn Fn(&Request, &mut Response, &[String]) -> HandlerResult + Send + Sync + 'static;

/// An object exposing named actions
pub trait Controller: Send + Sync {
    /// Actions this controller answers to
    fn actions(&self) -> &[&'static str];

    /// Run `action`
    ///
    /// Only called with names listed by [`Controller::actions`].
    fn call(
        &self,
        action: &str,
        request: &Request,
        response: &mut Response,
        args: &[String],
    ) -> HandlerResult;

    /// Check whether `action` is exposed
    fn has_action(&self, action: &str) -> bool {
        self.actions().contains(&action)
    }
}

/// Adapter exposing a function as a controller with a single `invoke` action
struct FnController {
    f: Arc<HandlerFn>,
}

impl Controller for FnController {
    fn actions(&self) -> &[&'static str] {
        &[DEFAULT_ACTION]
    }

    fn call(
        &self,
        _action: &str,
        request: &Request,
        response: &mut Response,
        args: &[String],
    ) -> HandlerResult {
        (self.f)(request, response, args)
    }
}

/// Reference to a route handler, as given at registration
#[derive(Clone)]
pub enum HandlerRef {
    /// In-process function
    Function(Arc<HandlerFn>),
    /// `"Controller@action"` or `"Controller"` (uses [`DEFAULT_ACTION`])
    Named(String),
    /// Pre-built controller and the action to call
    Object {
        /// The controller
        controller: Arc<dyn Controller>,
        /// Action name
        action: String,
    },
}

impl fmt::Debug for HandlerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Function(_) => f.write_str("HandlerRef::Function"),
            Self::Named(name) => f.debug_tuple("HandlerRef::Named").field(name).finish(),
            Self::Object { action, .. } => f
                .debug_struct("HandlerRef::Object")
                .field("action", action)
                .finish_non_exhaustive(),
        }
    }
}

impl From<&str> for HandlerRef {
    fn from(name: &str) -> Self {
        Self::Named(name.to_string())
    }
}

impl From<String> for HandlerRef {
    fn from(name: String) -> Self {
        Self::Named(name)
    }
}

impl From<Arc<dyn Controller>> for HandlerRef {
    fn from(controller: Arc<dyn Controller>) -> Self {
        Self::Object {
            controller,
            action: DEFAULT_ACTION.to_string(),
        }
    }
}

/// Wrap a function as a handler reference
pub fn from_fn<F>(f: F) -> HandlerRef
where
    F: Fn(&Request, &mut Response, &[String]) -> HandlerResult + Send + Sync + 'static,
{
    HandlerRef::Function(Arc::new(f))
}

/// Reference a specific action on a pre-built controller
pub fn action<C>(controller: C, action: &str) -> HandlerRef
where
    C: Controller + 'static,
{
    HandlerRef::Object {
        controller: Arc::new(controller),
        action: action.to_string(),
    }
}

impl HandlerRef {
    /// Resolve into an invocable handler
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRouteHandler` if a named controller is unknown,
    /// or the requested action is not exposed.
    pub fn resolve(self, controllers: &ControllerRegistry) -> Result<ResolvedHandler> {
        match self {
            Self::Function(f) => Ok(ResolvedHandler {
                controller: Arc::new(FnController { f }),
                action: DEFAULT_ACTION.to_string(),
                label: "<fn>".to_string(),
            }),
            Self::Named(reference) => {
                let (type_name, action) = reference
                    .split_once(CONTROLLER_DELIMITER)
                    .unwrap_or((reference.as_str(), DEFAULT_ACTION));

                let controller = controllers.instantiate(type_name).ok_or_else(|| {
                    Error::InvalidRouteHandler {
                        handler: reference.clone(),
                    }
                })?;
                if !controller.has_action(action) {
                    return Err(Error::InvalidRouteHandler { handler: reference });
                }

                Ok(ResolvedHandler {
                    controller,
                    action: action.to_string(),
                    label: reference,
                })
            }
            Self::Object { controller, action } => {
                if !controller.has_action(&action) {
                    return Err(Error::InvalidRouteHandler {
                        handler: format!("<object>{CONTROLLER_DELIMITER}{action}"),
                    });
                }
                Ok(ResolvedHandler {
                    controller,
                    label: format!("<object>{CONTROLLER_DELIMITER}{action}"),
                    action,
                })
            }
        }
    }
}

/// A controller paired with the action to run
#[derive(Clone)]
pub struct ResolvedHandler {
    controller: Arc<dyn Controller>,
    action: String,
    label: String,
}

impl ResolvedHandler {
    /// Invoke the handler
    pub fn call(&self, request: &Request, response: &mut Response, args: &[String]) -> HandlerResult {
        self.controller.call(&self.action, request, response, args)
    }

    /// The action that will be called
    #[must_use]
    pub fn action(&self) -> &str {
        &self.action
    }

    /// Human readable description, for logs
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }
}

impl fmt::Debug for ResolvedHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedHandler")
            .field("label", &self.label)
            .field("action", &self.action)
            .finish_non_exhaustive()
    }
}

type ControllerFactory = Arc<dyn Fn() -> Arc<dyn Controller> + Send + Sync>;

/// Maps controller names to zero-argument constructors
#[derive(Clone, Default)]
pub struct ControllerRegistry {
    factories: HashMap<String, ControllerFactory>,
}

impl ControllerRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `C` under `name`
    pub fn register<C>(&mut self, name: impl Into<String>) -> &mut Self
    where
        C: Controller + Default + 'static,
    {
        let factory: ControllerFactory =
            Arc::new(|| Arc::new(C::default()) as Arc<dyn Controller>);
        self.factories.insert(name.into(), factory);
        self
    }

    /// Check if a controller is registered under `name`
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Build a fresh instance of the named controller
    #[must_use]
    pub fn instantiate(&self, name: &str) -> Option<Arc<dyn Controller>> {
        self.factories.get(name).map(|factory| factory())
    }
}

impl fmt::Debug for ControllerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.factories.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Default)]
    struct Books;

    impl Controller for Books {
        fn actions(&self) -> &[&'static str] {
            &["invoke", "index", "show"]
        }

        fn call(
            &self,
            action: &str,
            _request: &Request,
            _response: &mut Response,
            args: &[String],
        ) -> HandlerResult {
            match action {
                "show" => Ok(json!({ "book": args[0] }).into()),
                "index" => Ok(json!([]).into()),
                _ => Ok("books".into()),
            }
        }
    }

    fn registry() -> ControllerRegistry {
        let mut controllers = ControllerRegistry::new();
        controllers.register::<Books>("Books");
        controllers
    }

    fn run(handler: &ResolvedHandler, args: &[String]) -> Output {
        let request = Request::new("GET", "/");
        let mut response = Response::new();
        handler.call(&request, &mut response, args).unwrap()
    }

    #[test]
    fn test_resolve_function() {
        let handler = from_fn(|_req, _res, args| Ok(format!("hello {}", args[0]).into()))
            .resolve(&ControllerRegistry::new())
            .unwrap();
        assert_eq!(handler.action(), DEFAULT_ACTION);
        let output = run(&handler, &["world".to_string()]);
        assert!(matches!(output, Output::Body(Body::Text(t)) if t == "hello world"));
    }

    #[test]
    fn test_resolve_named_action() {
        let handler = HandlerRef::from("Books@show").resolve(&registry()).unwrap();
        assert_eq!(handler.action(), "show");
        assert_eq!(handler.label(), "Books@show");
        let output = run(&handler, &["7".to_string()]);
        assert!(matches!(output, Output::Body(Body::Json(v)) if v == json!({"book": "7"})));
    }

    #[test]
    fn test_resolve_named_default_action() {
        let handler = HandlerRef::from("Books").resolve(&registry()).unwrap();
        assert_eq!(handler.action(), DEFAULT_ACTION);
    }

    #[test]
    fn test_resolve_unknown_controller() {
        let err = HandlerRef::from("Authors@show").resolve(&registry()).unwrap_err();
        assert!(matches!(err, Error::InvalidRouteHandler { handler } if handler == "Authors@show"));
    }

    #[test]
    fn test_resolve_missing_action() {
        let err = HandlerRef::from("Books@destroy").resolve(&registry()).unwrap_err();
        assert!(matches!(err, Error::InvalidRouteHandler { .. }));
    }

    #[test]
    fn test_resolve_object() {
        let handler = action(Books, "index").resolve(&ControllerRegistry::new()).unwrap();
        assert_eq!(handler.action(), "index");

        let err = action(Books, "nope")
            .resolve(&ControllerRegistry::new())
            .unwrap_err();
        assert!(matches!(err, Error::InvalidRouteHandler { .. }));
    }

    #[test]
    fn test_question_mark_wraps_std_errors() {
        fn parse(raw: &str) -> std::result::Result<i64, HandlerError> {
            Ok(raw.parse::<i64>()?)
        }
        assert!(matches!(parse("x"), Err(HandlerError::Other(_))));
        assert_eq!(parse("5").unwrap(), 5);
    }
}
