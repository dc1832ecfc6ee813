//! Unified error type.

use std::net::SocketAddr;

/// The error type returned by webby's fallible operations.
///
/// Application-level failures (404, 422, a handler that gives up) are
/// expressed as HTTP [`Response`](crate::Response) values or as a
/// [`BoxError`](crate::BoxError) inside an [`Outcome`](crate::Outcome), not as
/// `Error`s. This type surfaces infrastructure failures only: binding the
/// listening socket, or I/O on the listener itself.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The listening socket could not be bound. Fatal for `start`.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}
