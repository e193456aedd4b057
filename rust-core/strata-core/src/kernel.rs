//! # Kernel
//!
//! Terminal middleware: routes the request and runs the matched handler.

use crate::error::{Error, Result};
use crate::handler::{HandlerError, Output};
use crate::middleware::{Middleware, Next};
use crate::request::Request;
use crate::response::Response;
use crate::router::SharedRouter;
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

/// Routing middleware, placed last in the stack
#[derive(Debug, Clone)]
pub struct Kernel {
    router: Arc<SharedRouter>,
}

impl Kernel {
    /// Create a kernel dispatching through `router`
    #[must_use]
    pub fn new(router: Arc<SharedRouter>) -> Self {
        Self { router }
    }

    /// The router this kernel dispatches through
    #[must_use]
    pub fn router(&self) -> &Arc<SharedRouter> {
        &self.router
    }
}

impl Middleware for Kernel {
    fn process(&self, request: &mut Request, next: Next<'_>) -> Result<Response> {
        let mut response = next.run(request)?;

        let matched = self.router.match_route(request.method(), request.path())?;
        request.params_mut().merge(matched.args());

        match matched.invoke(request, &mut response) {
            Ok(Output::Body(body)) => {
                response.set_body(body);
                Ok(response)
            }
            Ok(Output::Response(handler_response)) => Ok(handler_response),
            Err(HandlerError::NotFound(message)) => {
                debug!(
                    path = %request.path(),
                    handler = matched.route().handler().label(),
                    %message,
                    "Handler reported not found"
                );
                response.status = 404;
                response.set_body(json!({ "error": message }));
                Ok(response)
            }
            Err(HandlerError::Status { status, message }) => {
                Err(Error::RouteHandler { status, message })
            }
            Err(HandlerError::Other(source)) => Err(Error::internal(source)),
        }
    }

    fn name(&self) -> &'static str {
        "Kernel"
    }
}
