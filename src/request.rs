//! The request context seen by policies and saviours.

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method};

/// An incoming request, reduced to what enablement policies and saviour
/// callables actually inspect: method, path, headers, body.
///
/// The middleware never consumes the body and never mutates the context —
/// the request goes to the wrapped handler untouched, and a copy of the
/// context is kept around for the persistence cycle. `Bytes` makes that
/// copy a reference-count bump, not a body copy.
#[derive(Clone, Debug)]
pub struct Request {
    method: Method,
    path: String,
    headers: HeaderMap,
    body: Bytes,
}

impl Request {
    pub fn new(method: Method, path: impl Into<String>, headers: HeaderMap, body: Bytes) -> Self {
        Self { method, path: path.into(), headers, body }
    }

    /// A bodyless GET — the usual shape for exercising policies by hand.
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path, HeaderMap::new(), Bytes::new())
    }

    /// Attaches a header, consuming and returning `self` for chaining.
    ///
    /// # Panics
    ///
    /// Panics on names or values that are not legal HTTP — programmer
    /// error, not input handling. Parse untrusted input into a
    /// [`HeaderMap`] yourself and use [`Request::new`].
    pub fn with_header(mut self, name: &'static str, value: &str) -> Self {
        self.headers.insert(
            HeaderName::from_static(name),
            HeaderValue::try_from(value).expect("invalid header value"),
        );
        self
    }

    pub fn method(&self) -> &Method { &self.method }
    pub fn path(&self) -> &str { &self.path }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn body(&self) -> &[u8] { &self.body }

    /// Case-insensitive header lookup. Non-UTF-8 values read as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// The empty context: `GET /`, no headers, no body.
///
/// Administrative entry points evaluate policies against this when no real
/// request is at hand. A dynamic policy must treat absent keys as its own
/// case to handle — [`Request::header`] simply returns `None`.
impl Default for Request {
    fn default() -> Self {
        Self::get("/")
    }
}
