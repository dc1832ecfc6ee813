//! # webby
//!
//! A minimal HTTP toolkit. Nothing more. Nothing less.
//!
//! ## What is in the box
//!
//! - **Routing**: a segment trie per method, `{name}` path variables, literal
//!   segments preferred over variables, and mount points that share one table.
//! - **Middleware**: an ordered chain where any link may answer early.
//! - **Transport**: raw HTTP/1.1 on tokio, one request per connection,
//!   graceful drain on stop. A hyper adapter serves the same handlers with
//!   keep-alive and HTTP/2.
//! - **Wire model**: immutable [`Request`] and [`Response`] values.
//!
//! What it leaves to you (or to the proxy in front of it): TLS, body-size
//! limits, rate limiting, chunked transfer encoding, static files.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use webby::middleware::trace;
//! use webby::{Request, Response, Router, Server, ServerConfig, Status};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), webby::Error> {
//!     let app = Router::new()
//!         .get("/users/{id}", get_user)
//!         .post("/users",     create_user);
//!
//!     let mut server = Server::with_config(ServerConfig::from_env(), app);
//!     server.add_middleware(trace());
//!     server.serve().await
//! }
//!
//! async fn get_user(req: Request) -> Response {
//!     let id = req.param("id").unwrap_or("unknown");
//!     // webby sends bytes; it doesn't care how you build them:
//!     //   serde_json::to_vec(&user)?
//!     //   format!(r#"{{"id":"{id}"}}"#).into_bytes()
//!     Response::json(format!(r#"{{"id":"{id}"}}"#).into_bytes())
//! }
//!
//! async fn create_user(req: Request) -> Response {
//!     if req.body().is_empty() {
//!         return Response::status(Status::BadRequest);
//!     }
//!     Response::builder()
//!         .status(Status::Created)
//!         .header("location", "/users/99")
//!         .json(br#"{"id":"99"}"#.to_vec())
//! }
//! ```

mod adapter;
mod codec;
mod config;
mod error;
mod handler;
mod headers;
mod method;
mod request;
mod response;
mod router;
mod server;
mod status;

pub mod middleware;

pub use adapter::HyperServer;
pub use config::{ServerConfig, ENV_HOST, ENV_PORT, ENV_SHUTDOWN_TIMEOUT_MS};
pub use error::Error;
pub use handler::{BoxError, BoxFuture, BoxedHandler, Handler, IntoOutcome, Outcome};
pub use headers::Headers;
pub use method::{Method, UnknownMethod};
pub use request::Request;
pub use response::{ContentType, Response, ResponseBuilder};
pub use router::Router;
pub use server::{serve_connection, Server, ServerState};
pub use status::{reason_phrase, Status};
