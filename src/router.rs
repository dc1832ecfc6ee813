//! Segment-trie request router.
//!
//! One trie per HTTP method. Each level holds literal children keyed by
//! segment text plus at most one variable child, and matching always tries
//! the literal first. O(segments) lookup, no backtracking, no regexes. You
//! register a path, you get a handler. That is all.
//!
//! # Mount points
//!
//! [`Router::mount`] returns a *view* of the same router: same tries, same
//! not-found handler, plus a path prefix prepended to every registration made
//! through the view. Dispatch always matches the absolute request path, so a
//! view handles requests exactly like the root does.
//!
//! ```rust
//! use webby::{Request, Response, Router, Status};
//!
//! async fn user(req: Request) -> Response {
//!     Response::text(Status::Ok, req.param("id").unwrap_or("?"))
//! }
//!
//! let app = Router::new();
//! let v1 = app.mount("/api/v1").get("/users/{id}", user);
//! // `app` now answers GET /api/v1/users/7, and so does `v1`.
//! # drop(v1);
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::RwLock;

use crate::handler::{private, BoxFuture, BoxedHandler, ErasedHandler, Handler, Outcome};
use crate::method::Method;
use crate::request::Request;
use crate::response::Response;
use crate::status::Status;

/// The application router.
///
/// Cheap to clone: every clone, and every view returned by
/// [`mount`](Router::mount), refers to the same route table. Build it at
/// startup and hand it to a server; it is itself a [`Handler`].
/// Each registration call returns `self` so registrations chain naturally.
#[derive(Clone)]
pub struct Router {
    table: Arc<RouteTable>,
    prefix: Vec<String>,
}

/// State shared by a router and all of its views.
struct RouteTable {
    roots: RwLock<HashMap<Method, RouteNode>>,
    not_found: ArcSwap<BoxedHandler>,
}

#[derive(Default)]
struct RouteNode {
    literals: HashMap<String, RouteNode>,
    variable: Option<Box<VariableChild>>,
    handler: Option<BoxedHandler>,
}

/// The single variable slot of a node, bound to the most recently
/// registered variable name at this position.
struct VariableChild {
    name: String,
    node: RouteNode,
}

impl RouteNode {
    /// Walks to (creating if needed) the child for one template token.
    fn child(&mut self, token: &str, route: &str) -> &mut RouteNode {
        match variable_name(token, route) {
            Some(name) => {
                let slot = self.variable.get_or_insert_with(|| {
                    Box::new(VariableChild { name: name.to_owned(), node: RouteNode::default() })
                });
                // Last registration wins the name at a shared position.
                slot.name = name.to_owned();
                &mut slot.node
            }
            None => self.literals.entry(token.to_owned()).or_default(),
        }
    }
}

impl Router {
    /// An empty router whose misses answer `404 Not Found`.
    pub fn new() -> Self {
        let table = RouteTable {
            roots: RwLock::new(HashMap::new()),
            not_found: ArcSwap::from_pointee(default_not_found.into_boxed_handler()),
        };
        Self { table: Arc::new(table), prefix: Vec::new() }
    }

    /// Register a handler for a method + path pair. Returns `self` for chaining.
    ///
    /// Path variables use `{name}` syntax and `req.param("name")` retrieves
    /// them. Registering the same method + path twice replaces the handler.
    ///
    /// ```rust
    /// # use webby::{Method, Request, Response, Router, Status};
    /// # async fn get_user(_: Request) -> Response { Response::status(Status::Ok) }
    /// # async fn create_user(_: Request) -> Response { Response::status(Status::Ok) }
    /// # async fn delete_user(_: Request) -> Response { Response::status(Status::Ok) }
    /// Router::new()
    ///     .on(Method::Delete, "/users/{id}", delete_user)
    ///     .on(Method::Get,    "/users/{id}", get_user)
    ///     .on(Method::Post,   "/users",      create_user);
    /// ```
    ///
    /// # Panics
    ///
    /// Panics if a variable segment has a blank name, e.g. `/users/{ }`.
    pub fn on(self, method: Method, path: &str, handler: impl Handler) -> Self {
        self.add(method, path, handler.into_boxed_handler());
        self
    }

    pub fn get(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::Get, path, handler)
    }

    pub fn post(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::Post, path, handler)
    }

    pub fn put(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::Put, path, handler)
    }

    pub fn delete(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::Delete, path, handler)
    }

    pub fn patch(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::Patch, path, handler)
    }

    /// Replaces the handler used when no route matches. Applies to the root
    /// router and every view of it.
    pub fn not_found(self, handler: impl Handler) -> Self {
        self.table.not_found.store(Arc::new(handler.into_boxed_handler()));
        self
    }

    /// Returns a view whose registrations live under `prefix`.
    ///
    /// `"/"` and `""` add nothing, so the view is equivalent to `self`.
    /// Prefixes nest: mounting `/v1` on a view mounted at `/api` registers
    /// under `/api/v1`.
    pub fn mount(&self, prefix: &str) -> Router {
        let extra = segments(prefix);
        if extra.is_empty() {
            return self.clone();
        }
        let mut combined = self.prefix.clone();
        combined.extend(extra.into_iter().map(str::to_owned));
        Router { table: Arc::clone(&self.table), prefix: combined }
    }

    /// Routes `req` to its handler, or to the not-found handler on a miss.
    ///
    /// Captured path variables are attached to the request the handler
    /// sees. The outcome is returned untouched.
    pub async fn dispatch(&self, req: Request) -> Outcome {
        match self.lookup(req.method(), req.target()) {
            Some((handler, params)) => {
                let req = if params.is_empty() { req } else { req.with_path_variables(params) };
                handler.call(req).await
            }
            None => {
                let not_found = self.table.not_found.load_full();
                not_found.call(req).await
            }
        }
    }

    fn add(&self, method: Method, path: &str, handler: BoxedHandler) {
        let mut roots = self.table.roots.write();
        let mut node = roots.entry(method).or_default();
        let template = self.prefix.iter().map(String::as_str).chain(segments(path));
        for token in template {
            node = node.child(token, path);
        }
        node.handler = Some(handler);
    }

    fn lookup(
        &self,
        method: Method,
        target: &str,
    ) -> Option<(BoxedHandler, Vec<(String, String)>)> {
        let roots = self.table.roots.read();
        let mut node = roots.get(&method)?;
        let mut params = Vec::new();
        for segment in segments(target) {
            node = match node.literals.get(segment) {
                Some(child) => child,
                None => {
                    let variable = node.variable.as_deref()?;
                    params.push((variable.name.clone(), segment.to_owned()));
                    &variable.node
                }
            };
        }
        let handler = node.handler.clone()?;
        Some((handler, params))
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}

impl private::Sealed for Router {}

impl Handler for Router {
    fn into_boxed_handler(self) -> BoxedHandler {
        BoxedHandler::new(self)
    }
}

impl ErasedHandler for Router {
    fn call(&self, req: Request) -> BoxFuture {
        let router = self.clone();
        Box::pin(async move { router.dispatch(req).await })
    }
}

async fn default_not_found(_req: Request) -> Response {
    Response::text(Status::NotFound, "Not Found")
}

// ── Path handling ─────────────────────────────────────────────────────────────

/// Splits a path or request target into segments.
///
/// The query string and one leading slash are ignored, and trailing empty
/// segments are dropped, so `/`, `""` and `/?q=1` are all zero segments and
/// `/items/` is the same as `/items`. Interior empty segments are kept.
fn segments(path: &str) -> Vec<&str> {
    let path = path.split_once('?').map_or(path, |(path, _)| path);
    let path = path.strip_prefix('/').unwrap_or(path);
    let mut parts: Vec<&str> = path.split('/').collect();
    while parts.last().is_some_and(|s| s.is_empty()) {
        parts.pop();
    }
    parts
}

/// `Some(name)` when `token` is exactly `{name}` with a non-empty interior.
fn variable_name<'a>(token: &'a str, route: &str) -> Option<&'a str> {
    let name = token.strip_prefix('{')?.strip_suffix('}')?;
    if name.is_empty() {
        return None;
    }
    if name.trim().is_empty() {
        panic!("invalid route `{route}`: path variable name must not be blank");
    }
    Some(name)
}
