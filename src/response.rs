//! Outgoing HTTP response type.
//!
//! You should not need to think about this module directly. Build a [`Response`]
//! in your handler and return it. That is the entire job description.

use std::borrow::Cow;

use bytes::Bytes;

use crate::headers::Headers;
use crate::status::reason_phrase;

// ── ContentType ───────────────────────────────────────────────────────────────

/// Common content-type values for use with [`ResponseBuilder::bytes`].
pub enum ContentType {
    Csv,          // text/csv
    EventStream,  // text/event-stream  (SSE)
    FormData,     // application/x-www-form-urlencoded
    Html,         // text/html; charset=utf-8
    Json,         // application/json
    OctetStream,  // application/octet-stream  (binary / file download)
    Pdf,          // application/pdf
    Text,         // text/plain; charset=utf-8
    Xml,          // application/xml
}

impl ContentType {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Csv         => "text/csv",
            Self::EventStream => "text/event-stream",
            Self::FormData    => "application/x-www-form-urlencoded",
            Self::Html        => "text/html; charset=utf-8",
            Self::Json        => "application/json",
            Self::OctetStream => "application/octet-stream",
            Self::Pdf         => "application/pdf",
            Self::Text        => "text/plain; charset=utf-8",
            Self::Xml         => "application/xml",
        }
    }
}

/// Content type the transports add when a response does not name one.
pub(crate) const DEFAULT_CONTENT_TYPE: &str = "text/plain; charset=UTF-8";

// ── Response ─────────────────────────────────────────────────────────────────

/// An outgoing HTTP response.
///
/// Immutable once built; [`Response::with_header`] hands back a new value,
/// which is how middleware decorates what a handler produced.
///
/// # Shortcuts
///
/// ```rust
/// use webby::{Response, Status};
///
/// Response::text(Status::Ok, "hello");
/// Response::json(br#"{"id":1}"#.to_vec());
/// Response::status(Status::NoContent);
/// ```
///
/// # Builder (custom reason phrase or headers)
///
/// ```rust
/// use webby::{ContentType, Response, Status};
///
/// Response::builder()
///     .status(Status::Created)
///     .header("location", "/users/42")
///     .json(br#"{"id":42}"#.to_vec());
///
/// Response::builder()
///     .status(418u16)
///     .reason("Teapot")
///     .bytes(ContentType::Xml, b"<ok/>".to_vec());
/// ```
#[derive(Clone, Debug)]
pub struct Response {
    status: u16,
    reason: Cow<'static, str>,
    headers: Headers,
    body: Bytes,
}

impl Response {
    /// A response with the canonical reason phrase for `status`.
    pub fn new(status: impl Into<u16>, headers: Headers, body: impl Into<Bytes>) -> Self {
        let status = status.into();
        Self {
            status,
            reason: Cow::Borrowed(reason_phrase(status)),
            headers,
            body: body.into(),
        }
    }

    /// UTF-8 text body, no headers. The transport fills in `Content-Type`
    /// and `Content-Length` on the way out.
    pub fn text(status: impl Into<u16>, body: impl Into<String>) -> Self {
        let body: String = body.into();
        Self::new(status, Headers::new(), body)
    }

    /// `200 OK` with `application/json`.
    ///
    /// Pass bytes from your serialiser directly, e.g.
    /// `serde_json::to_vec(&val)?` or `format!(r#"{{"id":{id}}}"#).into_bytes()`.
    pub fn json(body: impl Into<Bytes>) -> Self {
        Self::new(200u16, Headers::from([("content-type", "application/json")]), body)
    }

    /// Response with no body.
    pub fn status(code: impl Into<u16>) -> Self {
        Self::new(code, Headers::new(), Bytes::new())
    }

    /// Builder for responses that need a custom reason phrase or extra headers.
    pub fn builder() -> ResponseBuilder {
        ResponseBuilder { headers: Headers::new(), reason: None, status: 200 }
    }

    /// Returns a copy with `name` set to `value`.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn status_code(&self) -> u16 { self.status }
    pub fn reason(&self) -> &str { &self.reason }
    pub fn headers(&self) -> &Headers { &self.headers }
    pub fn body(&self) -> &Bytes { &self.body }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// The headers a transport puts on the wire: the caller's own, plus
    /// `Content-Length` and `Content-Type` when the caller left them out.
    pub(crate) fn wire_headers(&self) -> Headers {
        let mut headers = self.headers.clone();
        headers.insert_if_absent("Content-Length", self.body.len().to_string());
        headers.insert_if_absent("Content-Type", DEFAULT_CONTENT_TYPE);
        headers
    }
}

// ── ResponseBuilder ───────────────────────────────────────────────────────────

/// Fluent builder for [`Response`].
///
/// Obtain via [`Response::builder()`]. Defaults to `200 OK`.
/// Terminated by a typed body method, so you always know what you're sending.
pub struct ResponseBuilder {
    headers: Headers,
    reason: Option<Cow<'static, str>>,
    status: u16,
}

impl ResponseBuilder {
    pub fn status(mut self, code: impl Into<u16>) -> Self {
        self.status = code.into();
        self
    }

    /// Overrides the reason phrase derived from the status code.
    pub fn reason(mut self, reason: impl Into<Cow<'static, str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Terminate with a JSON body (`application/json`).
    pub fn json(self, body: impl Into<Bytes>) -> Response {
        self.finish(ContentType::Json, body.into())
    }

    /// Terminate with a plain-text body (`text/plain; charset=utf-8`).
    pub fn text(self, body: impl Into<String>) -> Response {
        let body: String = body.into();
        self.finish(ContentType::Text, Bytes::from(body))
    }

    /// Terminate with a typed body. Use this for XML, HTML, binary, SSE, etc.
    pub fn bytes(self, content_type: ContentType, body: impl Into<Bytes>) -> Response {
        self.finish(content_type, body.into())
    }

    /// Terminate with no body (e.g. `Status::NoContent`, `Status::MovedPermanently`).
    pub fn no_body(self) -> Response {
        self.build(Bytes::new())
    }

    fn finish(mut self, content_type: ContentType, body: Bytes) -> Response {
        self.headers.insert_if_absent("content-type", content_type.as_str());
        self.build(body)
    }

    fn build(self, body: Bytes) -> Response {
        let reason = self.reason.unwrap_or(Cow::Borrowed(reason_phrase(self.status)));
        Response { status: self.status, reason, headers: self.headers, body }
    }
}
