use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::{Duration, Instant};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use webby::middleware::Next;
use webby::{Error, HyperServer, Request, Response, Router, ServerConfig, ServerState, Status};

fn local_config() -> ServerConfig {
    ServerConfig::default()
        .with_host(IpAddr::V4(Ipv4Addr::LOCALHOST))
        .with_port(0)
        .with_shutdown_timeout(Duration::from_millis(500))
}

async fn stamp(req: Request, next: Next) -> Result<Option<Response>, webby::BoxError> {
    let outcome = next.run(req).await?;
    Ok(outcome.map(|r| r.with_header("X-Served-By", "hyper")))
}

fn server(config: ServerConfig) -> HyperServer {
    let mut server = HyperServer::with_config(config, app());
    server.add_middleware(stamp);
    server
}

async fn request(addr: SocketAddr, raw: &[u8]) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(raw).await.unwrap();
    let mut reply = Vec::new();
    stream.read_to_end(&mut reply).await.unwrap();
    String::from_utf8(reply).unwrap()
}

fn app() -> Router {
    Router::new()
        .get("/items/{id}", |req: Request| async move {
            Response::text(Status::Ok, format!("item {} via {}", req.param("id").unwrap_or("?"), req.target()))
        })
        .post("/echo", |req: Request| async move { Response::text(Status::Ok, String::from_utf8_lossy(req.body()).into_owned()) })
        .get("/nothing", |_req: Request| async {})
        .get("/fail", |_req: Request| async { Err::<Response, _>("kaput") })
}

#[tokio::test]
async fn routes_through_the_same_router_and_middleware() {
    let mut server = server(local_config());
    let addr = server.start().await.unwrap();

    let reply = request(addr, b"GET /items/7?full=1 HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n").await;
    assert!(reply.starts_with("HTTP/1.1 200 OK\r\n"), "{reply}");
    assert!(reply.contains("x-served-by: hyper\r\n"));
    assert!(reply.contains("content-type: text/plain; charset=UTF-8\r\n"));
    assert!(reply.ends_with("item 7 via /items/7?full=1"));

    server.stop().await;
}

#[tokio::test]
async fn request_body_is_collected() {
    let mut server = server(local_config());
    let addr = server.start().await.unwrap();

    let reply = request(
        addr,
        b"POST /echo HTTP/1.1\r\nHost: x\r\nContent-Length: 5\r\nConnection: close\r\n\r\nhello",
    )
    .await;
    assert!(reply.ends_with("hello"), "{reply}");

    server.stop().await;
}

#[tokio::test]
async fn outcome_mapping_matches_the_raw_transport() {
    let mut server = server(local_config());
    let addr = server.start().await.unwrap();

    let nothing = request(addr, b"GET /nothing HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n").await;
    assert!(nothing.starts_with("HTTP/1.1 204 No Content\r\n"), "{nothing}");

    let failed = request(addr, b"GET /fail HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n").await;
    assert!(failed.starts_with("HTTP/1.1 500 Internal Server Error\r\n"), "{failed}");
    assert!(!failed.contains("kaput"));

    let missing = request(addr, b"GET /missing HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n").await;
    assert!(missing.starts_with("HTTP/1.1 404 Not Found\r\n"), "{missing}");

    server.stop().await;
}

#[tokio::test]
async fn unknown_method_is_405() {
    let mut server = server(local_config());
    let addr = server.start().await.unwrap();

    let reply = request(addr, b"BREW /items/1 HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n").await;
    assert!(reply.starts_with("HTTP/1.1 405 Method Not Allowed\r\n"), "{reply}");

    server.stop().await;
}

#[tokio::test]
async fn start_is_idempotent_and_stop_closes_the_listener() {
    let mut server = server(local_config());
    let addr = server.start().await.unwrap();
    assert_eq!(server.start().await.unwrap(), addr);
    assert_eq!(server.local_addr(), Some(addr));
    assert!(server.is_running());

    server.stop().await;
    assert_eq!(server.state(), ServerState::Stopped);
    assert_eq!(server.local_addr(), None);
    assert!(TcpStream::connect(addr).await.is_err());
}

#[tokio::test]
async fn bind_conflict_is_reported() {
    let mut first = server(local_config());
    let taken = first.start().await.unwrap();

    let mut second = server(local_config().with_port(taken.port()));
    let err = second.start().await.unwrap_err();

    assert!(matches!(err, Error::Bind { addr, .. } if addr == taken), "{err}");
    assert_eq!(second.state(), ServerState::Stopped);
    first.stop().await;
}

#[tokio::test]
async fn handler_changes_apply_on_next_start() {
    let mut server = server(local_config());
    let addr = server.start().await.unwrap();
    server.set_handler(|_req: Request| async { "replaced" });

    let reply = request(addr, b"GET /items/1 HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n").await;
    assert!(reply.ends_with("item 1 via /items/1"), "{reply}");

    server.stop().await;
    let addr = server.start().await.unwrap();
    let reply = request(addr, b"GET /items/1 HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n").await;
    assert!(reply.ends_with("replaced"), "{reply}");
    assert!(reply.contains("x-served-by: hyper\r\n"));
    server.stop().await;
}

#[tokio::test]
async fn stop_closes_idle_keep_alive_connections_without_waiting() {
    let mut server = server(local_config().with_shutdown_timeout(Duration::from_secs(3)));
    let addr = server.start().await.unwrap();

    // One keep-alive exchange, then leave the socket open and idle.
    let mut idle = TcpStream::connect(addr).await.unwrap();
    idle.write_all(b"GET /items/1 HTTP/1.1\r\nHost: x\r\n\r\n").await.unwrap();
    let mut reply = Vec::new();
    let mut buf = [0u8; 1024];
    while !reply.ends_with(b"item 1 via /items/1") {
        let n = idle.read(&mut buf).await.unwrap();
        assert_ne!(n, 0, "connection closed before the response arrived");
        reply.extend_from_slice(&buf[..n]);
    }

    let started = Instant::now();
    server.stop().await;
    let took = started.elapsed();

    assert!(took < Duration::from_secs(1), "stop took {took:?}");
    assert_eq!(idle.read(&mut buf).await.unwrap_or(0), 0);
}

#[tokio::test]
async fn serve_with_shutdown_uses_the_given_listener() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (stop, signal) = oneshot::channel::<()>();
    let task = tokio::spawn(server(local_config()).serve_with_shutdown(listener, async move {
        let _ = signal.await;
    }));

    let reply = request(addr, b"GET /items/3 HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n").await;
    assert!(reply.ends_with("item 3 via /items/3"), "{reply}");
    assert!(reply.contains("x-served-by: hyper\r\n"));

    stop.send(()).unwrap();
    task.await.unwrap().unwrap();
}
