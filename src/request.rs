//! Incoming HTTP request type.

use bytes::Bytes;

use crate::headers::Headers;
use crate::method::Method;

/// An incoming HTTP request.
///
/// Immutable once built: every `with_*` method consumes the request and
/// returns a new one. The body is never absent, only empty, and both the
/// header map and the path variables start out empty rather than missing.
#[derive(Clone, Debug)]
pub struct Request {
    method: Method,
    target: String,
    version: String,
    headers: Headers,
    body: Bytes,
    params: Vec<(String, String)>,
}

impl Request {
    /// A bodiless `HTTP/1.1` request for `target`.
    pub fn new(method: Method, target: impl Into<String>) -> Self {
        Self::from_parts(method, target, "HTTP/1.1", Headers::new(), Bytes::new())
    }

    pub fn from_parts(
        method: Method,
        target: impl Into<String>,
        version: impl Into<String>,
        headers: Headers,
        body: impl Into<Bytes>,
    ) -> Self {
        Self {
            method,
            target: target.into(),
            version: version.into(),
            headers,
            body: body.into(),
            params: Vec::new(),
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Returns a copy carrying `vars` as its path variables.
    ///
    /// An empty `vars` leaves the request untouched. A name given twice keeps
    /// its first position and its last value.
    pub fn with_path_variables<K, V>(mut self, vars: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        for (name, value) in vars {
            let (name, value) = (name.into(), value.into());
            match self.params.iter_mut().find(|(k, _)| *k == name) {
                Some((_, existing)) => *existing = value,
                None => self.params.push((name, value)),
            }
        }
        self
    }

    pub fn method(&self) -> Method { self.method }

    /// The raw request target, query string included (e.g. `/items?limit=10`).
    pub fn target(&self) -> &str { &self.target }

    pub fn version(&self) -> &str { &self.version }
    pub fn headers(&self) -> &Headers { &self.headers }
    pub fn body(&self) -> &Bytes { &self.body }

    /// The target without its query string.
    pub fn path(&self) -> &str {
        self.target.split_once('?').map_or(self.target.as_str(), |(path, _)| path)
    }

    /// The query string without the leading `?`, if the target has one.
    pub fn query(&self) -> Option<&str> {
        self.target.split_once('?').map(|(_, query)| query)
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/users/{id}`, `req.param("id")` on `/users/42` returns `Some("42")`.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// All captured path variables, in route order.
    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }
}
