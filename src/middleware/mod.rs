//! Middleware layer.
//!
//! Middleware intercepts requests on their way to a handler and responses on
//! their way back, and is the right place for cross-cutting concerns:
//! structured tracing, authentication-header inspection, response decoration.
//!
//! A middleware gets the request plus a [`Next`] standing for everything
//! downstream (the remaining middleware, then the terminal handler). It
//! either delegates by calling [`Next::run`] or short-circuits by returning
//! its own response. `Next::run` consumes `next`, so delegating twice does not
//! compile.
//!
//! ```rust
//! use webby::middleware::{MiddlewareChain, Next};
//! use webby::{Outcome, Request, Response, Status};
//!
//! async fn require_token(req: Request, next: Next) -> Outcome {
//!     let authorized = req.header("x-auth-token").is_some_and(|t| !t.trim().is_empty());
//!     if !authorized {
//!         return Ok(Some(Response::text(Status::Unauthorized, "Provide X-Auth-Token header")));
//!     }
//!     next.run(req).await
//! }
//!
//! let chain = MiddlewareChain::new()
//!     .append(webby::middleware::trace())
//!     .append(require_token);
//! assert_eq!(chain.len(), 2);
//! ```
//!
//! Built-in middleware:
//! - [`trace`]: one structured event per request with method, target, status, latency

mod trace;

pub use trace::{trace, Trace};

use std::future::Future;
use std::sync::Arc;

use crate::handler::{BoxFuture, BoxedHandler, ErasedHandler, Handler, IntoOutcome, Outcome};
use crate::request::Request;

// ── Middleware trait ──────────────────────────────────────────────────────────

/// An interceptor wrapped around a handler.
///
/// Implemented automatically for any `async fn(Request, Next) -> impl IntoOutcome`
/// and matching closures. Implement it by hand on a struct when the
/// middleware carries configuration.
pub trait Middleware: Send + Sync + 'static {
    fn handle(&self, req: Request, next: Next) -> BoxFuture;
}

impl<F, Fut, R> Middleware for F
where
    F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoOutcome + Send + 'static,
{
    fn handle(&self, req: Request, next: Next) -> BoxFuture {
        let fut = (self)(req, next);
        Box::pin(async move { fut.await.into_outcome() })
    }
}

/// Everything downstream of the current middleware.
pub struct Next {
    inner: BoxedHandler,
}

impl Next {
    /// Passes `req` on and returns the downstream outcome.
    pub async fn run(self, req: Request) -> Outcome {
        self.inner.call(req).await
    }
}

// ── MiddlewareChain ───────────────────────────────────────────────────────────

/// An immutable, ordered sequence of middleware.
///
/// Each link pairs one middleware with the rest of the chain. [`append`]
/// never touches the receiver: it rebuilds the spine with the new middleware
/// at the end and shares the middleware values themselves, so every earlier
/// chain stays valid and unchanged.
///
/// [`append`]: MiddlewareChain::append
#[derive(Clone, Default)]
pub struct MiddlewareChain {
    head: Option<Arc<Link>>,
}

struct Link {
    middleware: Arc<dyn Middleware>,
    rest: Option<Arc<Link>>,
}

impl MiddlewareChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a new chain with `middleware` as its last element.
    pub fn append(&self, middleware: impl Middleware) -> Self {
        self.append_shared(Arc::new(middleware))
    }

    fn append_shared(&self, middleware: Arc<dyn Middleware>) -> Self {
        let mut head = Some(Arc::new(Link { middleware, rest: None }));
        for existing in self.middlewares().into_iter().rev() {
            head = Some(Arc::new(Link { middleware: existing, rest: head }));
        }
        Self { head }
    }

    pub fn len(&self) -> usize {
        self.links().count()
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Composes the chain around `terminal` into a single handler.
    ///
    /// The first middleware appended is the first one invoked. An empty chain
    /// hands back the terminal handler itself.
    pub fn wrap(&self, terminal: impl Handler) -> BoxedHandler {
        // Fold from the last middleware to the first: each step captures the
        // handler built so far as its `next`.
        self.middlewares()
            .into_iter()
            .rev()
            .fold(terminal.into_boxed_handler(), |next, middleware| {
                BoxedHandler::new(Wrapped { middleware, next })
            })
    }

    fn links(&self) -> impl Iterator<Item = &Link> {
        std::iter::successors(self.head.as_deref(), |link| link.rest.as_deref())
    }

    fn middlewares(&self) -> Vec<Arc<dyn Middleware>> {
        self.links().map(|link| Arc::clone(&link.middleware)).collect()
    }
}

/// One middleware bound to its downstream handler.
struct Wrapped {
    middleware: Arc<dyn Middleware>,
    next: BoxedHandler,
}

impl ErasedHandler for Wrapped {
    fn call(&self, req: Request) -> BoxFuture {
        self.middleware.handle(req, Next { inner: self.next.clone() })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::method::Method;
    use crate::response::Response;
    use crate::status::Status;

    type Calls = Arc<Mutex<Vec<&'static str>>>;

    fn recording(trace: &Calls, name: &'static str) -> impl Middleware {
        let trace = Arc::clone(trace);
        move |req: Request, next: Next| {
            trace.lock().unwrap().push(name);
            next.run(req)
        }
    }

    fn terminal(trace: &Calls) -> impl Handler {
        let trace = Arc::clone(trace);
        move |_req: Request| {
            trace.lock().unwrap().push("terminal");
            async { Response::text(Status::Ok, "done") }
        }
    }

    fn request() -> Request {
        Request::new(Method::Get, "/")
    }

    #[tokio::test]
    async fn runs_in_append_order_then_terminal() {
        let trace = Calls::default();
        let chain = MiddlewareChain::new()
            .append(recording(&trace, "first"))
            .append(recording(&trace, "second"));

        let response = chain.wrap(terminal(&trace)).call(request()).await.unwrap().unwrap();

        assert_eq!(*trace.lock().unwrap(), ["first", "second", "terminal"]);
        assert_eq!(&response.body()[..], b"done");
    }

    #[tokio::test]
    async fn short_circuit_stops_everything_downstream() {
        let trace = Calls::default();
        let blocker_trace = Arc::clone(&trace);
        let blocker = move |_req: Request, _next: Next| {
            blocker_trace.lock().unwrap().push("blocker");
            async { Response::text(Status::Forbidden, "blocked") }
        };
        let chain = MiddlewareChain::new()
            .append(recording(&trace, "first"))
            .append(recording(&trace, "second"))
            .append(blocker)
            .append(recording(&trace, "never"));

        let response = chain.wrap(terminal(&trace)).call(request()).await.unwrap().unwrap();

        assert_eq!(*trace.lock().unwrap(), ["first", "second", "blocker"]);
        assert_eq!(response.status_code(), 403);
        assert_eq!(&response.body()[..], b"blocked");
    }

    #[tokio::test]
    async fn append_leaves_earlier_chains_untouched() {
        let trace = Calls::default();
        let base = MiddlewareChain::new().append(recording(&trace, "base"));
        let extended = base.append(recording(&trace, "extra"));

        assert_eq!(base.len(), 1);
        assert_eq!(extended.len(), 2);

        base.wrap(terminal(&trace)).call(request()).await.unwrap();
        assert_eq!(*trace.lock().unwrap(), ["base", "terminal"]);
    }

    #[tokio::test]
    async fn empty_chain_is_the_terminal_handler() {
        let trace = Calls::default();
        let chain = MiddlewareChain::new();
        assert!(chain.is_empty());

        chain.wrap(terminal(&trace)).call(request()).await.unwrap();
        assert_eq!(*trace.lock().unwrap(), ["terminal"]);
    }

    #[tokio::test]
    async fn middleware_can_decorate_the_response() {
        let stamp = |req: Request, next: Next| async move {
            let outcome = next.run(req).await?;
            Ok::<_, crate::BoxError>(outcome.map(|r| r.with_header("X-Powered-By", "webby")))
        };
        let chain = MiddlewareChain::new().append(stamp);

        let response = chain
            .wrap(|_req: Request| async { "hello" })
            .call(request())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(response.header("x-powered-by"), Some("webby"));
    }
}
