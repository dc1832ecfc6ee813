//! Per-request structured logging.

use std::time::{Duration, Instant};

use tracing::{info, warn};

use super::{Middleware, Next};
use crate::handler::BoxFuture;
use crate::request::Request;

/// Logs one event per request once the downstream outcome is known.
///
/// Fields: `method`, `target`, `status`, `elapsed_ms`. Failures are logged at
/// `warn` and passed through unchanged, so the transport still maps them to
/// `500`.
#[derive(Clone, Copy, Debug, Default)]
pub struct Trace;

/// Shorthand for [`Trace`].
pub fn trace() -> Trace {
    Trace
}

impl Middleware for Trace {
    fn handle(&self, req: Request, next: Next) -> BoxFuture {
        Box::pin(async move {
            let method = req.method();
            let target = req.target().to_owned();
            let start = Instant::now();

            let outcome = next.run(req).await;
            let elapsed_ms = millis(start.elapsed());

            match &outcome {
                Ok(Some(response)) => {
                    info!(%method, %target, status = response.status_code(), elapsed_ms, "request");
                }
                Ok(None) => info!(%method, %target, status = 204u16, elapsed_ms, "request"),
                Err(e) => warn!(%method, %target, error = %e, elapsed_ms, "request failed"),
            }
            outcome
        })
    }
}

/// Whole milliseconds, saturating at `u64::MAX`.
fn millis(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::MiddlewareChain;
    use crate::method::Method;
    use crate::response::Response;
    use crate::status::Status;

    #[tokio::test]
    async fn passes_outcomes_through() {
        let chain = MiddlewareChain::new().append(trace());

        let ok = chain
            .wrap(|_req: Request| async { Response::text(Status::Accepted, "queued") })
            .call(Request::new(Method::Post, "/jobs"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(ok.status_code(), 202);

        let failed = chain
            .wrap(|_req: Request| async { Err::<Response, _>("nope") })
            .call(Request::new(Method::Get, "/jobs/1"))
            .await;
        assert!(failed.is_err());
    }

    #[test]
    fn elapsed_millis_saturate() {
        assert_eq!(millis(Duration::from_micros(2_500)), 2);
        assert_eq!(millis(Duration::MAX), u64::MAX);
    }
}
