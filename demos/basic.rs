//! Minimal webby example: greeting, echo, a mounted API and middleware.
//!
//! Run with:
//!   RUST_LOG=info cargo run --example basic
//!   WEBBY_PORT=3000 cargo run --example basic
//!
//! Try:
//!   curl http://localhost:8080/hello
//!   curl -X POST http://localhost:8080/echo -d 'hello there'
//!   curl http://localhost:8080/api/v1/users/42
//!   curl -H 'X-Auth-Token: secret' http://localhost:8080/api/v1/users/42
//!   curl http://localhost:8080/nowhere

use webby::middleware::{trace, Next};
use webby::{Outcome, Request, Response, Router, Server, ServerConfig, Status};

#[tokio::main]
async fn main() -> Result<(), webby::Error> {
    tracing_subscriber::fmt::init();

    let app = Router::new()
        .get("/hello", hello)
        .post("/echo", echo)
        .not_found(|req: Request| async move {
            Response::text(Status::NotFound, format!("nothing at {}", req.path()))
        });

    app.mount("/api/v1")
        .get("/users/{id}", get_user)
        .delete("/users/{id}", delete_user);

    let mut server = Server::with_config(ServerConfig::from_env(), app);
    server.add_middleware(trace()).add_middleware(require_token).add_middleware(powered_by);
    server.serve().await
}

async fn hello(_req: Request) -> &'static str {
    "Hello, world!"
}

// POST /echo: the body comes back as-is, with the caller's content type.
async fn echo(req: Request) -> Response {
    let content_type = req.header("content-type").unwrap_or("application/octet-stream").to_owned();
    Response::builder()
        .header("content-type", &content_type)
        .bytes(webby::ContentType::OctetStream, req.body().clone())
}

// GET /api/v1/users/{id}
async fn get_user(req: Request) -> Response {
    let id = req.param("id").unwrap_or("unknown");
    Response::json(format!(r#"{{"id":"{id}","name":"alice"}}"#).into_bytes())
}

// DELETE /api/v1/users/{id}: nothing to say, so the transport answers 204.
async fn delete_user(_req: Request) {}

// Guards everything under /api with a token header.
async fn require_token(req: Request, next: Next) -> Outcome {
    let guarded = req.path().starts_with("/api/");
    let authorized = req.header("x-auth-token").is_some_and(|t| !t.trim().is_empty());
    if guarded && !authorized {
        return Ok(Some(Response::text(Status::Unauthorized, "Provide X-Auth-Token header")));
    }
    next.run(req).await
}

async fn powered_by(req: Request, next: Next) -> Outcome {
    let outcome = next.run(req).await?;
    Ok(outcome.map(|response| response.with_header("X-Powered-By", "webby")))
}
