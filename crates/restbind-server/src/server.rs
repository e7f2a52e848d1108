//! HTTP transport.
//!
//! Accepts HTTP/1.1 connections with hyper, collects each request body
//! (bounded in size and time), runs the request through a [`RestRouter`] and
//! sends back the ended response.
//!
//! ```rust,no_run
//! use restbind_server::{RestRouter, Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let rest = RestRouter::new();
//!     let config = ServerConfig::builder().http_addr("0.0.0.0:8080").build();
//!     Server::new(rest, config).run().await?;
//!     Ok(())
//! }
//! ```

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http::{Request, Response, StatusCode};
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use restbind_core::HttpRequest;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::rest_router::RestRouter;
use crate::shutdown::{ConnectionTracker, ShutdownSignal};

/// Body type of transport responses.
pub type ResponseBody = Full<Bytes>;

/// Errors that stop the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The configured address does not parse.
    #[error("invalid address '{addr}': {source}")]
    InvalidAddress {
        /// Configured address.
        addr: String,
        /// Parse failure.
        #[source]
        source: std::net::AddrParseError,
    },

    /// The listener could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address tried.
        addr: SocketAddr,
        /// I/O failure.
        #[source]
        source: std::io::Error,
    },
}

/// Serves a [`RestRouter`] over HTTP.
#[derive(Debug)]
pub struct Server {
    config: ServerConfig,
    rest: RestRouter,
}

impl Server {
    /// Server for `rest` with `config`.
    #[must_use]
    pub const fn new(rest: RestRouter, config: ServerConfig) -> Self {
        Self { config, rest }
    }

    /// Transport configuration.
    #[must_use]
    pub const fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// The served router.
    #[must_use]
    pub const fn rest(&self) -> &RestRouter {
        &self.rest
    }

    /// Serves until SIGTERM or SIGINT.
    pub async fn run(self) -> Result<(), ServerError> {
        self.run_with_shutdown(ShutdownSignal::with_os_signals()).await
    }

    /// Binds the configured address and serves until `shutdown` fires.
    pub async fn run_with_shutdown(self, shutdown: ShutdownSignal) -> Result<(), ServerError> {
        let addr = self.config.socket_addr().map_err(|source| ServerError::InvalidAddress {
            addr: self.config.http_addr().to_string(),
            source,
        })?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        self.serve(listener, shutdown).await;
        Ok(())
    }

    /// Serves connections from `listener` until `shutdown` fires, then waits
    /// up to the shutdown timeout for open connections.
    ///
    /// Plugin registration is closed before the first connection is accepted.
    pub async fn serve(mut self, listener: TcpListener, shutdown: ShutdownSignal) {
        self.rest.freeze();
        match listener.local_addr() {
            Ok(addr) => info!(%addr, routes = self.rest.router().len(), "server listening"),
            Err(e) => warn!(error = %e, "server listening on an unknown address"),
        }

        let server = Arc::new(self);
        let tracker = ConnectionTracker::new();

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, remote_addr)) => {
                        let server = Arc::clone(&server);
                        let token = tracker.acquire();
                        let shutdown = shutdown.clone();
                        tokio::spawn(async move {
                            if let Err(e) = server.handle_connection(stream, remote_addr, shutdown).await {
                                debug!(%remote_addr, error = %e, "connection error");
                            }
                            drop(token);
                        });
                    }
                    Err(e) => error!(error = %e, "failed to accept connection"),
                },
                () = shutdown.recv() => {
                    info!("shutdown signal received, no longer accepting connections");
                    break;
                }
            }
        }

        let timeout = server.config.shutdown_timeout();
        info!(?timeout, active = tracker.active_connections(), "draining connections");
        tokio::select! {
            () = tracker.wait_for_shutdown() => info!("all connections closed"),
            () = tokio::time::sleep(timeout) => {
                warn!(active = tracker.active_connections(), "shutdown timeout reached with open connections");
            }
        }
        info!("server stopped");
    }

    async fn handle_connection(
        self: &Arc<Self>,
        stream: TcpStream,
        remote_addr: SocketAddr,
        shutdown: ShutdownSignal,
    ) -> Result<(), hyper::Error> {
        let io = TokioIo::new(stream);
        let server = Arc::clone(self);
        let service = service_fn(move |request: Request<Incoming>| {
            let server = Arc::clone(&server);
            async move { server.handle_request(request, remote_addr).await }
        });

        let connection = http1::Builder::new().serve_connection(io, service);
        tokio::select! {
            result = connection => result,
            () = shutdown.recv() => {
                debug!(%remote_addr, "closing connection for shutdown");
                Ok(())
            }
        }
    }

    async fn handle_request(
        &self,
        request: Request<Incoming>,
        remote_addr: SocketAddr,
    ) -> Result<Response<ResponseBody>, Infallible> {
        let timeout = self.config.request_timeout();
        let (parts, body) = request.into_parts();
        debug!(method = %parts.method, path = parts.uri.path(), "request received");

        let limited = Limited::new(body, self.config.max_body_bytes());
        let body = match tokio::time::timeout(timeout, limited.collect()).await {
            Ok(Ok(collected)) => collected.to_bytes(),
            Ok(Err(e)) if e.is::<LengthLimitError>() => {
                warn!(limit = self.config.max_body_bytes(), "request body too large");
                return Ok(plain(StatusCode::PAYLOAD_TOO_LARGE, "Payload Too Large"));
            }
            Ok(Err(e)) => {
                warn!(error = %e, "failed to read request body");
                return Ok(plain(StatusCode::BAD_REQUEST, "Bad Request"));
            }
            Err(_) => {
                warn!("timed out reading request body");
                return Ok(plain(StatusCode::REQUEST_TIMEOUT, "Request Timeout"));
            }
        };

        let request = HttpRequest::from_http(Request::from_parts(parts, body), Some(remote_addr));
        match tokio::time::timeout(timeout, self.rest.handle(request)).await {
            Ok(response) => Ok(response.into_http().map(Full::new)),
            Err(_) => {
                warn!("timed out producing response");
                Ok(plain(StatusCode::GATEWAY_TIMEOUT, "Gateway Timeout"))
            }
        }
    }
}

fn plain(status: StatusCode, message: &'static str) -> Response<ResponseBody> {
    let mut response = Response::new(Full::new(Bytes::from_static(message.as_bytes())));
    *response.status_mut() = status;
    response
}
