//! HTTP request and response views used to fill the `httpRequest` record.
//!
//! The formatter never owns the caller's request or response. It reads them
//! through [`HttpRequestLike`] and [`HttpResponseLike`], and measures bodies
//! through [`ReplayBody::peek_len`], which hands the drained bytes back to the
//! stream so the next consumer still sees the whole body.

use std::{
    fmt,
    io::{self, Cursor, Read},
    mem,
    net::SocketAddr,
    sync::{Arc, Mutex, MutexGuard},
};

use derive_builder::Builder;
use http::{HeaderMap, Method, StatusCode, Version, header};

use crate::INTERNAL_TARGET;

type BoxedReader = Box<dyn Read + Send>;

/// Shared handle to a body stream that can be measured without being consumed.
///
/// Clones point at the same stream, the way several owners of one request
/// see the same body.
#[derive(Clone)]
pub struct ReplayBody {
    inner: Arc<Mutex<BoxedReader>>,
}

impl ReplayBody {
    pub fn new(reader: impl Read + Send + 'static) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Box::new(reader))),
        }
    }

    pub fn empty() -> Self {
        Self::new(io::empty())
    }

    /// Drains the unread part of the body, measures it, and rewinds.
    ///
    /// After this returns the stream yields exactly the bytes it would have
    /// yielded before the call. On a read error the bytes drained so far are
    /// put back in front of the unread remainder and the error is returned.
    pub fn peek_len(&self) -> io::Result<usize> {
        let mut guard = self.lock()?;
        let mut reader = mem::replace(&mut *guard, Box::new(io::empty()));

        let mut drained = Vec::new();
        let result = reader.read_to_end(&mut drained);
        let len = drained.len();

        *guard = match result {
            Ok(_) => Box::new(Cursor::new(drained)),
            Err(_) => Box::new(Cursor::new(drained).chain(reader)),
        };

        result.map(|_| len)
    }

    fn lock(&self) -> io::Result<MutexGuard<'_, BoxedReader>> {
        self.inner
            .lock()
            .map_err(|_| io::Error::other("body stream lock poisoned"))
    }
}

impl Default for ReplayBody {
    fn default() -> Self {
        Self::empty()
    }
}

impl Read for &ReplayBody {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.lock()?.read(buf)
    }
}

impl Read for ReplayBody {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Read::read(&mut &*self, buf)
    }
}

impl From<Vec<u8>> for ReplayBody {
    fn from(bytes: Vec<u8>) -> Self {
        Self::new(Cursor::new(bytes))
    }
}

impl From<String> for ReplayBody {
    fn from(body: String) -> Self {
        Self::from(body.into_bytes())
    }
}

impl From<&'static str> for ReplayBody {
    fn from(body: &'static str) -> Self {
        Self::new(body.as_bytes())
    }
}

impl fmt::Debug for ReplayBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplayBody").finish_non_exhaustive()
    }
}

/// Read-only view of an HTTP request.
pub trait HttpRequestLike: fmt::Debug + Send + Sync {
    fn request_method(&self) -> &str;

    fn request_url(&self) -> String;

    fn protocol(&self) -> &'static str;

    fn header_map(&self) -> &HeaderMap;

    /// `None` when the request carries no body at all.
    fn replay_body(&self) -> Option<&ReplayBody>;

    fn remote_addr(&self) -> Option<SocketAddr> {
        None
    }

    fn user_agent(&self) -> Option<&str> {
        header_str(self.header_map(), header::USER_AGENT)
    }

    fn referer(&self) -> Option<&str> {
        header_str(self.header_map(), header::REFERER)
    }
}

/// Read-only view of an HTTP response.
pub trait HttpResponseLike: fmt::Debug + Send + Sync {
    fn status(&self) -> StatusCode;

    fn protocol(&self) -> &'static str;

    fn header_map(&self) -> &HeaderMap;

    fn replay_body(&self) -> Option<&ReplayBody>;
}

/// Owned request record for callers that do not have an [`http::Request`] at hand.
#[derive(Debug, Clone, Builder)]
#[builder(pattern = "owned", setter(into, strip_option))]
pub struct HttpRequest {
    #[builder(default = Method::GET)]
    method: Method,
    /// Kept verbatim; [`http::Uri`] would append a `/` to bare authorities.
    url: String,
    #[builder(default = Version::HTTP_11)]
    version: Version,
    #[builder(default)]
    headers: HeaderMap,
    #[builder(default)]
    body: Option<ReplayBody>,
    #[builder(default)]
    remote_addr: Option<SocketAddr>,
}

impl HttpRequest {
    pub fn builder() -> HttpRequestBuilder {
        HttpRequestBuilder::default()
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }
}

impl HttpRequestBuilder {
    /// Appends one header value, keeping earlier values of the same name.
    pub fn header(mut self, name: header::HeaderName, value: header::HeaderValue) -> Self {
        self.headers
            .get_or_insert_with(HeaderMap::new)
            .append(name, value);
        self
    }
}

impl HttpRequestLike for HttpRequest {
    fn request_method(&self) -> &str {
        self.method.as_str()
    }

    fn request_url(&self) -> String {
        self.url.clone()
    }

    fn protocol(&self) -> &'static str {
        protocol_name(self.version)
    }

    fn header_map(&self) -> &HeaderMap {
        &self.headers
    }

    fn replay_body(&self) -> Option<&ReplayBody> {
        self.body.as_ref()
    }

    fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }
}

/// Owned response record, the counterpart of [`HttpRequest`].
#[derive(Debug, Clone, Builder)]
#[builder(pattern = "owned", setter(into, strip_option))]
pub struct HttpResponse {
    #[builder(default = StatusCode::OK)]
    status: StatusCode,
    #[builder(default = Version::HTTP_11)]
    version: Version,
    #[builder(default)]
    headers: HeaderMap,
    #[builder(default)]
    body: Option<ReplayBody>,
}

impl HttpResponse {
    pub fn builder() -> HttpResponseBuilder {
        HttpResponseBuilder::default()
    }
}

impl HttpResponseBuilder {
    pub fn header(mut self, name: header::HeaderName, value: header::HeaderValue) -> Self {
        self.headers
            .get_or_insert_with(HeaderMap::new)
            .append(name, value);
        self
    }
}

impl HttpResponseLike for HttpResponse {
    fn status(&self) -> StatusCode {
        self.status
    }

    fn protocol(&self) -> &'static str {
        protocol_name(self.version)
    }

    fn header_map(&self) -> &HeaderMap {
        &self.headers
    }

    fn replay_body(&self) -> Option<&ReplayBody> {
        self.body.as_ref()
    }
}

/// The peer address is read from the request extensions, where servers
/// usually stash it as a [`SocketAddr`].
impl HttpRequestLike for http::Request<ReplayBody> {
    fn request_method(&self) -> &str {
        self.method().as_str()
    }

    fn request_url(&self) -> String {
        self.uri().to_string()
    }

    fn protocol(&self) -> &'static str {
        protocol_name(self.version())
    }

    fn header_map(&self) -> &HeaderMap {
        self.headers()
    }

    fn replay_body(&self) -> Option<&ReplayBody> {
        Some(self.body())
    }

    fn remote_addr(&self) -> Option<SocketAddr> {
        self.extensions().get::<SocketAddr>().copied()
    }
}

impl HttpResponseLike for http::Response<ReplayBody> {
    fn status(&self) -> StatusCode {
        http::Response::status(self)
    }

    fn protocol(&self) -> &'static str {
        protocol_name(self.version())
    }

    fn header_map(&self) -> &HeaderMap {
        self.headers()
    }

    fn replay_body(&self) -> Option<&ReplayBody> {
        Some(self.body())
    }
}

pub fn protocol_name(version: Version) -> &'static str {
    if version == Version::HTTP_09 {
        "HTTP/0.9"
    } else if version == Version::HTTP_10 {
        "HTTP/1.0"
    } else if version == Version::HTTP_2 {
        "HTTP/2.0"
    } else if version == Version::HTTP_3 {
        "HTTP/3.0"
    } else {
        "HTTP/1.1"
    }
}

fn header_str(headers: &HeaderMap, name: header::HeaderName) -> Option<&str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

/// Estimated wire size of `request`, as a decimal string.
///
/// Empty when the body cannot be read.
pub fn request_size(request: &dyn HttpRequestLike) -> String {
    // "METHOD URL PROTO\r\n"
    let line = request.request_method().len()
        + request.request_url().len()
        + request.protocol().len()
        + 4;

    wire_size(line, request.header_map(), request.replay_body())
}

/// Estimated wire size of `response`, as a decimal string.
///
/// Empty when the body cannot be read.
pub fn response_size(response: &dyn HttpResponseLike) -> String {
    // "PROTO CODE REASON\r\n"; the code is counted once, the reason phrase separately.
    let reason = response.status().canonical_reason().unwrap_or_default();
    let line = response.protocol().len() + 1 + 3 + 1 + reason.len() + 2;

    wire_size(line, response.header_map(), response.replay_body())
}

fn wire_size(line: usize, headers: &HeaderMap, body: Option<&ReplayBody>) -> String {
    // "Name: value\r\n" per value, then the blank line.
    let headers_size = headers
        .iter()
        .map(|(name, value)| name.as_str().len() + value.len() + 4)
        .sum::<usize>()
        + 2;

    let body_size = match body.map(ReplayBody::peek_len).transpose() {
        Ok(size) => size.unwrap_or_default(),
        Err(err) => {
            tracing::debug!(target: INTERNAL_TARGET, "Body unreadable, size left empty: {err}");
            return String::new();
        }
    };

    (line + headers_size + body_size).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    /// Yields `data` then fails.
    struct FailingReader {
        data: Cursor<Vec<u8>>,
    }

    impl Read for FailingReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.data.read(buf)? {
                0 => Err(io::Error::other("connection reset")),
                n => Ok(n),
            }
        }
    }

    fn read_all(body: &ReplayBody) -> Vec<u8> {
        let mut out = Vec::new();
        let mut reader = body;
        reader.read_to_end(&mut out).unwrap();
        out
    }

    #[test]
    fn peek_len_leaves_body_readable() {
        let body = ReplayBody::from("hello world");

        assert_eq!(body.peek_len().unwrap(), 11);
        assert_eq!(body.peek_len().unwrap(), 11);
        assert_eq!(read_all(&body), b"hello world");
        assert_eq!(body.peek_len().unwrap(), 0);
    }

    #[test]
    fn peek_len_after_partial_read_measures_the_rest() {
        let body = ReplayBody::from("abcdef");
        let mut first = [0u8; 2];
        (&body).read_exact(&mut first).unwrap();

        assert_eq!(body.peek_len().unwrap(), 4);
        assert_eq!(read_all(&body), b"cdef");
    }

    #[test]
    fn clones_share_the_stream() {
        let body = ReplayBody::from("shared");
        let clone = body.clone();

        assert_eq!(body.peek_len().unwrap(), 6);
        assert_eq!(read_all(&clone), b"shared");
        assert_eq!(read_all(&body), b"");
    }

    #[test]
    fn failed_peek_restores_drained_bytes() {
        let body = ReplayBody::new(FailingReader {
            data: Cursor::new(b"partial".to_vec()),
        });

        assert!(body.peek_len().is_err());

        let mut restored = [0u8; 7];
        (&body).read_exact(&mut restored).unwrap();
        assert_eq!(&restored, b"partial");
    }

    #[test]
    fn request_size_counts_line_headers_and_body() {
        let request = HttpRequest::builder()
            .method(Method::POST)
            .url("https://example.com/items")
            .header(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"))
            .body(ReplayBody::from("hello"))
            .build()
            .unwrap();

        // 4 + 25 + 8 + 4 = 41, 12 + 10 + 4 = 26, + 2, + 5
        assert_eq!(request_size(&request), "74");
        assert_eq!(read_all(request.replay_body().unwrap()), b"hello");
    }

    #[test]
    fn multi_valued_headers_count_every_value() {
        let request = HttpRequest::builder()
            .url("/")
            .header(header::ACCEPT, HeaderValue::from_static("a"))
            .header(header::ACCEPT, HeaderValue::from_static("bb"))
            .build()
            .unwrap();

        // 3 + 1 + 8 + 4 = 16, (6 + 1 + 4) + (6 + 2 + 4) = 23, + 2
        assert_eq!(request_size(&request), "41");
    }

    #[test]
    fn response_size_uses_status_line() {
        let response = HttpResponse::builder()
            .header(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"))
            .body(ReplayBody::from("hello"))
            .build()
            .unwrap();

        // "HTTP/1.1 200 OK\r\n" = 17, 26, 2, 5
        assert_eq!(response_size(&response), "50");
        assert_eq!(read_all(response.replay_body().unwrap()), b"hello");
    }

    #[test]
    fn empty_response_is_status_line_and_blank_line() {
        let response = HttpResponse::builder().build().unwrap();

        assert_eq!(response_size(&response), "19");
    }

    #[test]
    fn unreadable_body_gives_empty_size() {
        let request = HttpRequest::builder()
            .url("https://example.com")
            .body(ReplayBody::new(FailingReader {
                data: Cursor::new(Vec::new()),
            }))
            .build()
            .unwrap();

        assert_eq!(request_size(&request), "");
    }

    #[test]
    fn http_crate_adapters() {
        let mut request = http::Request::builder()
            .method("PUT")
            .uri("https://example.com/a?b=c")
            .version(Version::HTTP_2)
            .header(header::USER_AGENT, "curl/8.0")
            .header(header::REFERER, "https://example.com/")
            .body(ReplayBody::from("xyz"))
            .unwrap();
        request
            .extensions_mut()
            .insert(SocketAddr::from(([10, 0, 0, 1], 443)));

        assert_eq!(request.request_method(), "PUT");
        assert_eq!(request.request_url(), "https://example.com/a?b=c");
        assert_eq!(HttpRequestLike::protocol(&request), "HTTP/2.0");
        assert_eq!(request.user_agent(), Some("curl/8.0"));
        assert_eq!(request.referer(), Some("https://example.com/"));
        assert_eq!(
            request.remote_addr(),
            Some(SocketAddr::from(([10, 0, 0, 1], 443)))
        );

        let response = http::Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(ReplayBody::empty())
            .unwrap();

        assert_eq!(HttpResponseLike::status(&response), StatusCode::NOT_FOUND);
        // "HTTP/1.1 404 Not Found\r\n" = 24, + 2
        assert_eq!(response_size(&response), "26");
    }
}
