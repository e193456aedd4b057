//! # HTTP Adapter
//!
//! Serves an [`Application`] over HTTP/1.1 with Hyper and Tokio.
//!
//! ## Key Features
//!
//! - One Tokio task per connection; the synchronous pipeline runs on the
//!   blocking pool
//! - Graceful shutdown on CTRL+C or a caller-supplied future
//! - Request bodies capped at `ServerConfig::max_body_size`
//! - Failures rendered as `{"error": ...}` with `Error::status()`

use crate::app::Application;
use crate::config::ServerConfig;
use crate::error::{Error, Result};
use crate::request::Request;
use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::StatusCode;
use hyper_util::rt::TokioIo;
use serde_json::json;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::{TcpListener, TcpSocket};
use tracing::{error, info, warn};

/// Bind a listening socket with `SO_REUSEADDR`
///
/// # Errors
///
/// Returns `Error::Io` if the socket cannot be created or bound.
pub fn bind(address: SocketAddr) -> Result<TcpListener> {
    let socket = if address.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    socket.set_reuseaddr(true)?;
    #[cfg(not(windows))]
    {
        socket.set_reuseport(true)?;
    }
    socket.bind(address)?;
    Ok(socket.listen(1024)?)
}

/// Serve `app` on `config.address` until CTRL+C
///
/// # Errors
///
/// Returns an error if binding or accepting fails.
pub async fn serve(app: Arc<Application>, config: ServerConfig) -> Result<()> {
    let listener = bind(config.address)?;
    serve_with_shutdown(app, listener, config, shutdown_signal()).await
}

/// Serve `app` on `listener` until `shutdown` resolves
///
/// In-flight connections get `config.shutdown_timeout` to finish.
///
/// # Errors
///
/// Returns an error if accepting a connection fails.
pub async fn serve_with_shutdown<S>(
    app: Arc<Application>,
    listener: TcpListener,
    config: ServerConfig,
    shutdown: S,
) -> Result<()>
where
    S: Future<Output = ()>,
{
    info!("Server listening on http://{}", listener.local_addr()?);

    let active = Arc::new(AtomicUsize::new(0));
    let max_body_size = config.max_body_size;
    let keep_alive = config.keep_alive;
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            accept_result = listener.accept() => {
                let (stream, remote_addr) = accept_result?;
                let io = TokioIo::new(stream);
                let app = Arc::clone(&app);
                let active = Arc::clone(&active);

                active.fetch_add(1, Ordering::Relaxed);
                tokio::task::spawn(async move {
                    let service = service_fn(move |req| {
                        handle_request(req, Arc::clone(&app), remote_addr, max_body_size)
                    });
                    if let Err(err) = http1::Builder::new()
                        .keep_alive(keep_alive)
                        .serve_connection(io, service)
                        .await
                    {
                        error!(remote = %remote_addr, error = ?err, "Error serving connection");
                    }
                    active.fetch_sub(1, Ordering::Relaxed);
                });
            }
            () = &mut shutdown => {
                info!("Shutdown signal received, stopping server...");
                break;
            }
        }
    }

    let drain = async {
        while active.load(Ordering::Relaxed) > 0 {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    };
    if tokio::time::timeout(config.shutdown_timeout, drain).await.is_err() {
        warn!(
            remaining = active.load(Ordering::Relaxed),
            "Shutdown timeout reached with connections still open"
        );
    }
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to install CTRL+C signal handler");
        std::future::pending::<()>().await;
    }
}

async fn handle_request(
    req: hyper::Request<Incoming>,
    app: Arc<Application>,
    remote_addr: SocketAddr,
    max_body_size: usize,
) -> std::result::Result<hyper::Response<Full<Bytes>>, Infallible> {
    let start = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let version = req.version();

    let response = match Request::from_hyper(req, max_body_size).await {
        Ok(mut request) => {
            request.set_header("x-client-ip", &remote_addr.ip().to_string());
            let outcome = tokio::task::spawn_blocking(move || app.handle(&mut request)).await;
            match outcome {
                Ok(Ok(response)) => response.dispatch().unwrap_or_else(|e| error_response(&e)),
                Ok(Err(e)) => error_response(&e),
                Err(e) => {
                    error!(error = %e, "Request task failed");
                    error_response(&Error::internal(e.to_string()))
                }
            }
        }
        Err(e) => error_response(&e),
    };

    info!(
        remote = %remote_addr,
        %method,
        %path,
        version = ?version,
        status = response.status().as_u16(),
        elapsed_us = %start.elapsed().as_micros(),
        "Request served"
    );
    Ok(response)
}

/// Render an error as a JSON response
///
/// Client errors carry the error message; server errors only the canonical
/// reason phrase.
#[must_use]
pub fn error_response(error: &Error) -> hyper::Response<Full<Bytes>> {
    let status = StatusCode::from_u16(error.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let message = if status.is_server_error() {
        status
            .canonical_reason()
            .unwrap_or("Internal Server Error")
            .to_string()
    } else {
        error.to_string()
    };

    let mut response =
        hyper::Response::new(Full::new(Bytes::from(json!({ "error": message }).to_string())));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}
