//! One-request-per-connection HTTP/1.1 server and graceful shutdown.
//!
//! # Lifecycle
//!
//! ```text
//! Stopped ──start()──▶ Starting ──bound──▶ Running ──stop()──▶ Stopping ──drained──▶ Stopped
//! ```
//!
//! A dedicated accept task owns the listening socket and spawns one task per
//! accepted connection. Each connection carries exactly one exchange: read
//! one request, write one response, close.
//!
//! On stop the accept task:
//! 1. Stops calling `listener.accept()` and closes the socket, so no new
//!    connections are made.
//! 2. Lets in-flight connection tasks finish for up to
//!    [`ServerConfig::shutdown_timeout`].
//! 3. Aborts whatever is still running once that deadline passes. A response
//!    cut off this way may reach the client partially written.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use crate::codec;
use crate::config::ServerConfig;
use crate::error::Error;
use crate::handler::{respond, BoxedHandler, Handler};
use crate::middleware::{Middleware, MiddlewareChain};

/// Where a [`Server`] is in its lifecycle.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ServerState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

/// The HTTP server.
///
/// Holds a terminal handler (usually a [`Router`](crate::Router)) and a
/// middleware chain. Both are composed into one handler at
/// [`start`](Server::start), so changes made while running apply from the
/// next start.
///
/// Dropping a running server stops accepting immediately and lets the
/// drain finish in the background.
pub struct Server {
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

impl Server {
    /// A server with the default [`ServerConfig`] (`0.0.0.0:8080`).
    ///
    /// ```rust,no_run
    /// use webby::{Request, Router, Server};
    ///
    /// # async fn run() -> Result<(), webby::Error> {
    /// let app = Router::new().get("/", |_req: Request| async { "hello" });
    /// Server::new(app).serve().await
    /// # }
    /// ```
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

    /// Appends `middleware` to the chain run before the handler.
    pub fn add_middleware(&mut self, middleware: impl Middleware) -> &mut Self {
        self.middleware = self.middleware.append(middleware);
        self
    }

    /// Replaces the terminal handler.
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

    /// The bound address while running. Useful after binding port `0`.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.as_ref().map(|r| r.local_addr)
    }

    /// Binds the listening socket and starts accepting in the background.
    ///
    /// Returns the bound address. Calling this while already running does
    /// nothing and returns the current address.
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
        let (shutdown, signal) = oneshot::channel();
        let acceptor = tokio::spawn(accept_loop(
            listener,
            handler,
            signal,
            self.config.shutdown_timeout(),
        ));

        self.running = Some(Running { local_addr, shutdown, acceptor });
        self.state = ServerState::Running;
        info!(addr = %local_addr, middleware = self.middleware.len(), "webby listening");
        Ok(local_addr)
    }

    /// Stops accepting, drains in-flight connections within the configured
    /// deadline, and returns once the accept task has exited.
    ///
    /// Does nothing when not running. Never fails: problems while closing
    /// are logged.
    pub async fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };

        self.state = ServerState::Stopping;
        // The accept task may already be gone; either way it is stopping.
        let _ = running.shutdown.send(());
        if let Err(e) = running.acceptor.await {
            error!("accept task failed: {e}");
        }
        self.state = ServerState::Stopped;
        info!(addr = %running.local_addr, "webby stopped");
    }

    /// Starts, waits for SIGINT or SIGTERM (Ctrl-C on non-Unix), then stops.
    pub async fn serve(mut self) -> Result<(), Error> {
        let addr = self.start().await?;
        shutdown_signal().await;
        info!(%addr, "shutdown signal received");
        self.stop().await;
        Ok(())
    }
}

pub(crate) async fn bind(addr: SocketAddr) -> Result<(TcpListener, SocketAddr), Error> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| Error::Bind { addr, source })?;
    let local_addr = listener.local_addr()?;
    Ok((listener, local_addr))
}

async fn accept_loop(
    listener: TcpListener,
    handler: BoxedHandler,
    mut shutdown: oneshot::Receiver<()>,
    drain_deadline: Duration,
) {
    let mut tasks = JoinSet::new();

    loop {
        tokio::select! {
            // Check shutdown first so a stop request wins over queued connections.
            biased;

            _ = &mut shutdown => {
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
                if let Err(e) = stream.set_nodelay(true) {
                    debug!(%peer, "could not set TCP_NODELAY: {e}");
                }

                let handler = handler.clone();
                tasks.spawn(async move {
                    if let Err(e) = serve_connection(stream, &handler).await {
                        debug!(%peer, "connection error: {e}");
                    }
                });
            }

            // Reap finished connection tasks so the JoinSet stays small.
            Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
        }
    }

    drop(listener);

    let drained = tokio::time::timeout(drain_deadline, async {
        while tasks.join_next().await.is_some() {}
    })
    .await;
    if drained.is_err() {
        warn!(aborted = tasks.len(), "drain deadline elapsed, aborting connections");
        tasks.shutdown().await;
    }
}

/// Serves exactly one exchange on `stream`, then closes it.
///
/// This is what the server runs for every accepted TCP connection. It works
/// on any byte stream, so a stream already wrapped by the caller (TLS, a
/// Unix socket, an in-memory pipe) gets identical behavior.
///
/// A request that cannot be parsed gets no response at all: the stream is
/// dropped without writing a byte. Handler errors and panics become `500`
/// and an absent response becomes `204`.
pub async fn serve_connection<S>(stream: S, handler: &BoxedHandler) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut reader = BufReader::new(stream);
    let Some(req) = codec::read_request(&mut reader).await? else {
        return Ok(());
    };
    let response = respond(handler, req).await;
    codec::write_response(reader.get_mut(), &response).await
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on the first shutdown signal the process receives.
///
/// On Unix this listens for both **SIGTERM** (service managers, container
/// runtimes) and **SIGINT** (Ctrl-C). On Windows only Ctrl-C is available.
/// A listener that cannot be installed is logged and never fires.
pub(crate) async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    // `pending()` never resolves, so on non-Unix the SIGTERM arm is disabled.
    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = sigterm => {}
    }
}
