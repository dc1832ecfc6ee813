//! Serving the same handlers through hyper.
//!
//! [`Server`](crate::Server) speaks one exchange per connection. When you
//! want keep-alive, pipelining or HTTP/2, use [`HyperServer`] instead. It has
//! the same surface (middleware, `start`, `stop`, lifecycle state) and
//! handlers cannot tell the difference: they see the same [`Request`], and
//! their outcomes are mapped to the wire by the same rules (`204` for no
//! response, an opaque `500` for errors and panics, default `Content-Type`
//! and `Content-Length`).
//!
//! Differences at the edge:
//! - an unknown method answers `405 Method Not Allowed` instead of dropping
//!   the connection;
//! - a body that fails mid-read answers `400 Bad Request`;
//! - connection reuse is negotiated by hyper, so no `Connection: close` is
//!   forced;
//! - on stop, idle keep-alive connections are closed right away and busy
//!   ones after their current response, still bounded by
//!   [`ServerConfig::shutdown_timeout`].

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::ext::ReasonPhrase;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use hyper_util::server::graceful::GracefulShutdown;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::error::Error;
use crate::handler::{respond, BoxedHandler, Handler};
use crate::headers::Headers;
use crate::method::Method;
use crate::middleware::{Middleware, MiddlewareChain};
use crate::request::Request;
use crate::response::Response;
use crate::server::{bind, shutdown_signal, ServerState};
use crate::status::Status;

/// A hyper-backed HTTP/1.1 + HTTP/2 server.
///
/// ```rust,no_run
/// use webby::middleware::trace;
/// use webby::{HyperServer, Request, Router};
///
/// # async fn run() -> Result<(), webby::Error> {
/// let app = Router::new().get("/", |_req: Request| async { "hello" });
/// let mut server = HyperServer::new(app);
/// server.add_middleware(trace());
/// server.serve().await
/// # }
/// ```
///
/// Dropping a running server stops accepting and lets the drain finish in
/// the background, as with [`Server`](crate::Server).
pub struct HyperServer {
    config: ServerConfig,
    handler: BoxedHandler,
    middleware: MiddlewareChain,
    state: ServerState,
    running: Option<Running>,
}

struct Running {
    local_addr: SocketAddr,
    // Sending, or dropping, tells the accept task to stop.
    shutdown: oneshot::Sender<()>,
    acceptor: JoinHandle<()>,
}

impl HyperServer {
    pub fn new(handler: impl Handler) -> Self {
        Self::with_config(ServerConfig::default(), handler)
    }

    pub fn with_config(config: ServerConfig, handler: impl Handler) -> Self {
        Self {
            config,
            handler: handler.into_boxed_handler(),
            middleware: MiddlewareChain::new(),
            state: ServerState::Stopped,
            running: None,
        }
    }

    /// Appends `middleware` to the chain run before the handler. Applies
    /// from the next [`start`](Self::start).
    pub fn add_middleware(&mut self, middleware: impl Middleware) -> &mut Self {
        self.middleware = self.middleware.append(middleware);
        self
    }

    /// Replaces the terminal handler. Applies from the next start.
    pub fn set_handler(&mut self, handler: impl Handler) -> &mut Self {
        self.handler = handler.into_boxed_handler();
        self
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn state(&self) -> ServerState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.as_ref().map(|r| r.local_addr)
    }

    /// Binds the configured address and starts accepting in the background.
    /// Idempotent while running.
    ///
    /// # Errors
    ///
    /// [`Error::Bind`] when the socket cannot be bound.
    pub async fn start(&mut self) -> Result<SocketAddr, Error> {
        if let Some(running) = &self.running {
            return Ok(running.local_addr);
        }

        self.state = ServerState::Starting;
        let (listener, local_addr) = match bind(self.config.addr()).await {
            Ok(bound) => bound,
            Err(e) => {
                self.state = ServerState::Stopped;
                return Err(e);
            }
        };

        let handler = self.middleware.wrap(self.handler.clone());
        let (shutdown, signal) = oneshot::channel::<()>();
        let acceptor = tokio::spawn(accept_loop(
            listener,
            handler,
            async move {
                let _ = signal.await;
            },
            self.config.shutdown_timeout(),
        ));

        self.running = Some(Running { local_addr, shutdown, acceptor });
        self.state = ServerState::Running;
        info!(addr = %local_addr, middleware = self.middleware.len(), "webby (hyper) listening");
        Ok(local_addr)
    }

    /// Stops accepting, closes idle connections, lets busy ones finish
    /// within the configured deadline, and returns once everything is down.
    /// Does nothing when not running.
    pub async fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };

        self.state = ServerState::Stopping;
        let _ = running.shutdown.send(());
        if let Err(e) = running.acceptor.await {
            error!("accept task failed: {e}");
        }
        self.state = ServerState::Stopped;
        info!(addr = %running.local_addr, "webby (hyper) stopped");
    }

    /// Starts, waits for SIGINT or SIGTERM (Ctrl-C on non-Unix), then stops.
    pub async fn serve(mut self) -> Result<(), Error> {
        let addr = self.start().await?;
        shutdown_signal().await;
        info!(%addr, "shutdown signal received");
        self.stop().await;
        Ok(())
    }

    /// Serves connections from an already-bound `listener` until `signal`
    /// resolves, then shuts down as [`stop`](Self::stop) does.
    pub async fn serve_with_shutdown(
        self,
        listener: TcpListener,
        signal: impl Future<Output = ()>,
    ) -> Result<(), Error> {
        let local_addr = listener.local_addr()?;
        let handler = self.middleware.wrap(self.handler);
        info!(addr = %local_addr, "webby (hyper) listening");
        accept_loop(listener, handler, signal, self.config.shutdown_timeout()).await;
        info!(addr = %local_addr, "webby (hyper) stopped");
        Ok(())
    }
}

async fn accept_loop(
    listener: TcpListener,
    handler: BoxedHandler,
    signal: impl Future<Output = ()>,
    drain_deadline: Duration,
) {
    let builder = ConnBuilder::new(TokioExecutor::new());
    // Watches every connection so shutdown can close idle keep-alive ones.
    let graceful = GracefulShutdown::new();
    let mut tasks = JoinSet::new();

    tokio::pin!(signal);

    loop {
        tokio::select! {
            biased;

            () = &mut signal => {
                debug!(in_flight = tasks.len(), "accept loop stopping");
                break;
            }

            res = listener.accept() => {
                let (stream, peer) = match res {
                    Ok(v) => v,
                    Err(e) => {
                        error!("accept error: {e}");
                        continue;
                    }
                };

                let handler = handler.clone();
                // Called once per request on the connection, not once per
                // connection.
                let svc = service_fn(move |req| dispatch(handler.clone(), req));
                // TokioIo adapts tokio's AsyncRead/AsyncWrite to the hyper
                // IO traits.
                let conn = builder.serve_connection(TokioIo::new(stream), svc);
                let conn = graceful.watch(conn.into_owned());

                tasks.spawn(async move {
                    if let Err(e) = conn.await {
                        debug!(%peer, "connection error: {e}");
                    }
                });
            }

            Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
        }
    }

    drop(listener);

    let drained = tokio::time::timeout(drain_deadline, async {
        graceful.shutdown().await;
        while tasks.join_next().await.is_some() {}
    })
    .await;
    if drained.is_err() {
        warn!(aborted = tasks.len(), "drain deadline elapsed, aborting connections");
        tasks.shutdown().await;
    }
}

// ── Request dispatch ──────────────────────────────────────────────────────────

/// Routes one hyper request through `handler`.
///
/// The error type is [`Infallible`]: every failure becomes a response, so
/// hyper never sees an error.
async fn dispatch(
    handler: BoxedHandler,
    req: hyper::Request<Incoming>,
) -> Result<http::Response<Full<Bytes>>, Infallible> {
    let (parts, body) = req.into_parts();

    let Some(method) = Method::from_token(parts.method.as_str()) else {
        return Ok(into_hyper(&Response::text(Status::MethodNotAllowed, "Method Not Allowed")));
    };

    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            debug!(%method, "failed to read request body: {e}");
            return Ok(into_hyper(&Response::text(Status::BadRequest, "Bad Request")));
        }
    };

    let target = parts
        .uri
        .path_and_query()
        .map_or_else(|| parts.uri.path().to_owned(), |pq| pq.as_str().to_owned());
    let headers: Headers = parts
        .headers
        .iter()
        .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str(), v)))
        .collect();
    let version = format!("{:?}", parts.version);

    let req = Request::from_parts(method, target, version, headers, body);
    Ok(into_hyper(&respond(&handler, req).await))
}

fn into_hyper(response: &Response) -> http::Response<Full<Bytes>> {
    let mut builder = http::Response::builder().status(response.status_code());
    for (name, value) in response.wire_headers().iter() {
        builder = builder.header(name, value);
    }

    let canonical = http::StatusCode::from_u16(response.status_code())
        .ok()
        .and_then(|code| code.canonical_reason());
    if canonical != Some(response.reason()) {
        if let Ok(phrase) = ReasonPhrase::try_from(response.reason().to_owned()) {
            builder = builder.extension(phrase);
        }
    }

    builder.body(Full::new(response.body().clone())).unwrap_or_else(|e| {
        error!(status = response.status_code(), "response rejected by hyper: {e}");
        let mut fallback = http::Response::new(Full::new(Bytes::from_static(b"Internal Server Error")));
        *fallback.status_mut() = http::StatusCode::INTERNAL_SERVER_ERROR;
        fallback
    })
}
