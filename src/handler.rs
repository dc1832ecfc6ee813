//! Handler trait and type erasure.
//!
//! # How async handlers are stored
//!
//! The router needs to hold handlers of *different* types in a single trie,
//! and the middleware chain needs to hand "everything downstream" to each
//! middleware as one value. Both store handlers as trait objects
//! (`dyn ErasedHandler`) behind a cheap, clonable [`BoxedHandler`].
//!
//! The chain from user code to vtable call is:
//!
//! ```text
//! async fn hello(req: Request) -> Response { … }   ← user writes this
//!        ↓ router.get("/", hello)
//! hello.into_boxed_handler()                       ← Handler blanket impl
//!        ↓
//! BoxedHandler(Arc::new(FnHandler(hello)))         ← heap-allocated wrapper
//!        ↓
//! handler.call(req)  at request time               ← one vtable dispatch
//!        ↓
//! Box::pin(async { hello(req).await.into_outcome() })  ← BoxFuture
//! ```
//!
//! # Outcomes
//!
//! A handler resolves to an [`Outcome`]: a response, no response at all, or
//! an error. Only the transport decides what goes on the wire for the last
//! two: an absent response becomes `204 No Content`, an error (or a panic)
//! becomes `500 Internal Server Error` with a fixed body. Routers and
//! middleware pass outcomes through untouched.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;

use futures_util::FutureExt;
use tracing::error;

use crate::request::Request;
use crate::response::Response;
use crate::status::Status;

// ── Outcome ───────────────────────────────────────────────────────────────────

/// Any error a handler or middleware wants to bubble up.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// What a handler produced: `Ok(Some(_))` to respond, `Ok(None)` for
/// "nothing to say", `Err(_)` when it failed.
pub type Outcome = Result<Option<Response>, BoxError>;

/// A heap-allocated, type-erased future that resolves to an [`Outcome`].
///
/// `Send + 'static` let tokio move the future across worker threads.
pub type BoxFuture = Pin<Box<dyn Future<Output = Outcome> + Send + 'static>>;

/// Conversion into an [`Outcome`].
///
/// Lets handlers return whatever is most natural:
///
/// ```rust
/// use webby::{Request, Response, Status};
///
/// async fn plain(_req: Request) -> &'static str { "hello" }
/// async fn nothing(_req: Request) {}
/// async fn maybe(req: Request) -> Option<Response> {
///     req.param("id").map(|id| Response::text(Status::Ok, id))
/// }
/// async fn fallible(req: Request) -> Result<Response, std::num::ParseIntError> {
///     let n: u32 = req.param("n").unwrap_or("0").parse()?;
///     Ok(Response::text(Status::Ok, (n * 2).to_string()))
/// }
/// ```
pub trait IntoOutcome {
    fn into_outcome(self) -> Outcome;
}

impl IntoOutcome for Response {
    fn into_outcome(self) -> Outcome { Ok(Some(self)) }
}

/// Return a [`Status`] directly from a handler: `return Status::NotFound`
impl IntoOutcome for Status {
    fn into_outcome(self) -> Outcome { Ok(Some(Response::status(self))) }
}

impl IntoOutcome for &'static str {
    fn into_outcome(self) -> Outcome { Ok(Some(Response::text(Status::Ok, self))) }
}

impl IntoOutcome for String {
    fn into_outcome(self) -> Outcome { Ok(Some(Response::text(Status::Ok, self))) }
}

impl IntoOutcome for () {
    fn into_outcome(self) -> Outcome { Ok(None) }
}

impl IntoOutcome for Option<Response> {
    fn into_outcome(self) -> Outcome { Ok(self) }
}

impl<R, E> IntoOutcome for Result<R, E>
where
    R: IntoOutcome,
    E: Into<BoxError>,
{
    fn into_outcome(self) -> Outcome {
        match self {
            Ok(inner) => inner.into_outcome(),
            Err(e) => Err(e.into()),
        }
    }
}

// ── Type erasure ──────────────────────────────────────────────────────────────

/// Internal dispatch interface.
///
/// `#[doc(hidden)] pub` rather than `pub(crate)` because it appears in the
/// public [`BoxedHandler`] plumbing. External crates cannot usefully
/// interact with this trait.
#[doc(hidden)]
pub trait ErasedHandler: Send + Sync + 'static {
    fn call(&self, req: Request) -> BoxFuture;
}

/// A type-erased handler shared across concurrent requests.
///
/// Cloning is one atomic increment. This is what a [`MiddlewareChain`]
/// produces when it wraps a terminal handler, and it is itself a [`Handler`].
///
/// [`MiddlewareChain`]: crate::middleware::MiddlewareChain
#[derive(Clone)]
pub struct BoxedHandler(Arc<dyn ErasedHandler>);

impl BoxedHandler {
    pub(crate) fn new(handler: impl ErasedHandler) -> Self {
        Self(Arc::new(handler))
    }

    /// Runs the handler. The outcome is returned as-is; see [`Outcome`].
    pub fn call(&self, req: Request) -> BoxFuture {
        self.0.call(req)
    }
}

impl fmt::Debug for BoxedHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BoxedHandler")
    }
}

// ── Public Handler trait ──────────────────────────────────────────────────────

/// Implemented for every valid request handler.
///
/// You never implement this yourself. It is automatically satisfied for any
/// `async fn` (or closure returning a future) with the signature:
///
/// ```text
/// async fn name(req: Request) -> impl IntoOutcome
/// ```
///
/// [`Router`](crate::Router) and [`BoxedHandler`] implement it too, so a
/// router (or a mounted view of one) and a middleware-wrapped handler can go
/// anywhere a plain handler can.
///
/// The trait is **sealed** (via the private `Sealed` supertrait): only the
/// impls in this crate can satisfy it.
pub trait Handler: private::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self) -> BoxedHandler;
}

/// The sealing module. Because `Sealed` is unreachable from outside the
/// crate, external crates cannot implement `Handler` on their own types.
pub(crate) mod private {
    pub trait Sealed {}
}

impl<F, Fut, R> private::Sealed for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoOutcome + Send + 'static,
{
}

impl<F, Fut, R> Handler for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoOutcome + Send + 'static,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        BoxedHandler::new(FnHandler(self))
    }
}

impl private::Sealed for BoxedHandler {}

impl Handler for BoxedHandler {
    fn into_boxed_handler(self) -> BoxedHandler {
        self
    }
}

/// Newtype wrapper that holds a concrete handler `F` and implements
/// [`ErasedHandler`], bridging the typed world to the trait-object world.
struct FnHandler<F>(F);

impl<F, Fut, R> ErasedHandler for FnHandler<F>
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoOutcome + Send + 'static,
{
    fn call(&self, req: Request) -> BoxFuture {
        let fut = (self.0)(req);
        Box::pin(async move { fut.await.into_outcome() })
    }
}

// ── Transport boundary ────────────────────────────────────────────────────────

/// Runs `handler` and turns whatever happens into a response for the wire.
///
/// Errors and panics are logged here and never echoed to the client.
pub(crate) async fn respond(handler: &BoxedHandler, req: Request) -> Response {
    let method = req.method();
    let target = req.target().to_owned();
    let handler = handler.clone();

    // The call itself sits inside the async block so a panic raised before
    // the first await is caught as well.
    let outcome = AssertUnwindSafe(async move { handler.call(req).await })
        .catch_unwind()
        .await;

    match outcome {
        Ok(Ok(Some(response))) => response,
        Ok(Ok(None)) => Response::text(Status::NoContent, ""),
        Ok(Err(e)) => {
            error!(%method, %target, error = %e, "handler failed");
            internal_server_error()
        }
        Err(payload) => {
            error!(%method, %target, panic = panic_message(payload.as_ref()), "handler panicked");
            internal_server_error()
        }
    }
}

fn internal_server_error() -> Response {
    Response::text(Status::InternalServerError, "Internal Server Error")
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}
