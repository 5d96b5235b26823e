// SPDX-FileCopyrightText: 2023 Jade Lovelace
//
// SPDX-License-Identifier: MPL-2.0

//! The reconstructed transaction, as seen by everything downstream of the
//! assemblers.
//!
//! HTTP/1 sides keep the raw bytes exactly as they went over the wire and
//! derive everything else (header block, header list, decoded content) on
//! demand, since more bytes can arrive at any point. HTTP/2 sides keep the
//! decoded header list and the concatenated DATA payloads.

use std::{
    borrow::Cow,
    fmt, io,
    ops::{Deref, DerefMut},
    sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use http::{
    header::{CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE, HOST, TRANSFER_ENCODING},
    HeaderMap, HeaderName, HeaderValue,
};

use crate::{
    chunked::decode_chunked,
    cookies::{self, Cookie},
    listener::{now, Direction, Nanos, PeerAddr},
    preview::{self, Preview},
};

const HEADER_END: &[u8] = b"\r\n\r\n";
const CRLF: &[u8] = b"\r\n";

const HTTP100_RESPONSES: [&[u8]; 2] = [
    b"HTTP/1.1 100 Continue\r\n\r\n",
    b"HTTP/1.0 100 Continue\r\n\r\n",
];

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordId(uuid::Uuid);

impl RecordId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Protocol {
    Http10,
    Http11,
    Http2,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Http10 => "HTTP/1.0",
            Protocol::Http11 => "HTTP/1.1",
            Protocol::Http2 => "HTTP/2",
        }
    }

    pub fn version(&self) -> http::Version {
        match self {
            Protocol::Http10 => http::Version::HTTP_10,
            Protocol::Http11 => http::Version::HTTP_11,
            Protocol::Http2 => http::Version::HTTP_2,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of the observed connection itself.
#[derive(Debug, thiserror::Error)]
pub enum Exception {
    #[error("connect failed: {0}")]
    Connect(#[source] io::Error),
    #[error("tls handshake failed: {0}")]
    Handshake(#[source] io::Error),
    #[error("read failed: {0}")]
    Read(#[source] io::Error),
    #[error("write failed: {0}")]
    Write(#[source] io::Error),
}

impl Exception {
    pub fn io_error(&self) -> &io::Error {
        match self {
            Exception::Connect(e)
            | Exception::Handshake(e)
            | Exception::Read(e)
            | Exception::Write(e) => e,
        }
    }

    /// Short name shown in place of a reason phrase.
    pub fn name(&self) -> String {
        format!("{:?}", self.io_error().kind())
    }

    /// Whether this happened before any HTTP bytes could have been exchanged.
    pub fn is_setup_failure(&self) -> bool {
        matches!(self, Exception::Connect(_) | Exception::Handshake(_))
    }
}

/// Opaque identifiers owned by whoever does call-site bookkeeping.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Attribution {
    pub tag: Option<String>,
    pub group_id: Option<String>,
    pub initiator_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Header {
    pub name: String,
    pub value: String,
}

impl Header {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

impl<N: Into<String>, V: Into<String>> From<(N, V)> for Header {
    fn from((name, value): (N, V)) -> Self {
        Self::new(name, value)
    }
}

/// Best-effort split of an HTTP/1 header block into headers. The first line
/// (request or status line) is skipped, lines without a name are dropped.
fn parse_header_lines(raw_headers: &[u8]) -> Vec<Header> {
    let Some(first_line_end) = find(raw_headers, CRLF) else {
        return Vec::new();
    };

    raw_headers[first_line_end + CRLF.len()..]
        .split(|&b| b == b'\n')
        .filter_map(|line| {
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            let (name, value) = match line.iter().position(|&b| b == b':') {
                Some(colon) => (&line[..colon], &line[colon + 1..]),
                None => (line, &[][..]),
            };
            let name = String::from_utf8_lossy(name).trim().to_owned();
            if name.is_empty() {
                return None;
            }
            Some(Header {
                name,
                value: String::from_utf8_lossy(value).trim().to_owned(),
            })
        })
        .collect()
}

/// Splits `host[:port]`, leaving bracketed IPv6 literals intact.
fn split_host_port(host: &str) -> (String, Option<String>) {
    match host.rsplit_once(':') {
        Some((h, p))
            if !p.is_empty()
                && p.bytes().all(|b| b.is_ascii_digit())
                && (!h.contains(':') || h.starts_with('[')) =>
        {
            (h.to_owned(), Some(p.to_owned()))
        }
        _ => (host.to_owned(), None),
    }
}

pub(crate) fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

#[derive(Clone, Debug)]
enum Wire {
    /// Everything seen on the wire for this side, header block included
    Raw(Vec<u8>),
    /// Already decoded by an HTTP/2 frame layer
    Decoded {
        headers: Vec<Header>,
        content: Vec<u8>,
    },
}

/// One half of a transaction.
#[derive(Clone, Debug)]
pub struct Side {
    wire: Wire,
    last_update: Nanos,
}

impl Side {
    fn raw() -> Self {
        Self {
            wire: Wire::Raw(Vec::new()),
            last_update: now(),
        }
    }

    fn decoded() -> Self {
        Self {
            wire: Wire::Decoded {
                headers: Vec::new(),
                content: Vec::new(),
            },
            last_update: now(),
        }
    }

    pub fn last_update(&self) -> Nanos {
        self.last_update
    }

    fn touch(&mut self) {
        // Keep it monotonic even if the wall clock steps backwards.
        self.last_update = now().max(self.last_update);
    }

    /// All bytes seen for this side. For HTTP/2 there is no header block on
    /// the wire that we see, so this is just the content.
    pub fn rawdata(&self) -> &[u8] {
        match &self.wire {
            Wire::Raw(raw) => raw,
            Wire::Decoded { content, .. } => content,
        }
    }

    /// Whether anything at all has been recorded for this side.
    pub fn has_data(&self) -> bool {
        match &self.wire {
            Wire::Raw(raw) => !raw.is_empty(),
            Wire::Decoded { headers, content } => !headers.is_empty() || !content.is_empty(),
        }
    }

    /// The HTTP/1 header block (start line included, final blank line
    /// excluded), once it has been fully received.
    pub fn raw_headers(&self) -> &[u8] {
        match &self.wire {
            Wire::Raw(raw) => match find(raw, HEADER_END) {
                Some(end) => &raw[..end],
                None => &[],
            },
            Wire::Decoded { .. } => &[],
        }
    }

    /// Whether the header block is complete, i.e. the headers are final.
    pub fn headers_complete(&self) -> bool {
        match &self.wire {
            Wire::Raw(raw) => find(raw, HEADER_END).is_some(),
            Wire::Decoded { headers, .. } => !headers.is_empty(),
        }
    }

    pub fn headers(&self) -> Cow<'_, [Header]> {
        match &self.wire {
            Wire::Raw(_) => Cow::Owned(parse_header_lines(self.raw_headers())),
            Wire::Decoded { headers, .. } => Cow::Borrowed(headers),
        }
    }

    /// First value of the header `name`, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<String> {
        self.headers()
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.clone())
    }

    /// The header list as an [`HeaderMap`]. Headers that `http` considers
    /// invalid are skipped.
    pub fn header_map(&self) -> HeaderMap {
        let mut header_map = HeaderMap::new();
        for h in self.headers().iter() {
            let name = match HeaderName::from_bytes(h.name.as_bytes()) {
                Ok(v) => v,
                Err(err) => {
                    tracing::debug!("invalid http header {err}");
                    continue;
                }
            };
            let value = match HeaderValue::try_from(h.value.as_str()) {
                Ok(v) => v,
                Err(err) => {
                    tracing::debug!("invalid http header value: {err}");
                    continue;
                }
            };
            header_map.append(name, value);
        }
        header_map
    }

    /// Declared `Content-Length`, if present and numeric.
    pub fn content_length(&self) -> Option<usize> {
        self.header(CONTENT_LENGTH.as_str())?.trim().parse().ok()
    }

    /// The body with transfer framing removed.
    ///
    /// For HTTP/1 this is everything after the header block, cut to
    /// `Content-Length` or chunk-decoded as declared.
    pub fn content(&self) -> Cow<'_, [u8]> {
        let raw = match &self.wire {
            Wire::Raw(raw) => raw,
            Wire::Decoded { content, .. } => return Cow::Borrowed(content),
        };
        let Some(end) = find(raw, HEADER_END) else {
            return Cow::Borrowed(&[]);
        };
        let body = &raw[end + HEADER_END.len()..];

        if let Some(len) = self.content_length() {
            return Cow::Borrowed(&body[..len.min(body.len())]);
        }
        let chunked = self
            .header(TRANSFER_ENCODING.as_str())
            .is_some_and(|te| te.to_ascii_lowercase().contains("chunked"));
        if chunked {
            Cow::Owned(decode_chunked(body))
        } else {
            Cow::Borrowed(body)
        }
    }

    /// Content decoded for display, see [`preview::generate`].
    pub fn preview(&self) -> Preview {
        preview::generate(
            &self.content(),
            self.header(CONTENT_TYPE.as_str()).as_deref().unwrap_or(""),
            self.header(CONTENT_ENCODING.as_str())
                .as_deref()
                .unwrap_or(""),
        )
    }

    /// The start line split on spaces, at most `parts` pieces.
    fn first_line(&self, parts: usize) -> Vec<String> {
        let raw_headers = self.raw_headers();
        let line = match find(raw_headers, CRLF) {
            Some(end) => &raw_headers[..end],
            None => raw_headers,
        };
        if line.is_empty() {
            return Vec::new();
        }
        line.splitn(parts, |&b| b == b' ')
            .map(|s| String::from_utf8_lossy(s).into_owned())
            .collect()
    }

    fn append(&mut self, data: &[u8]) {
        match &mut self.wire {
            Wire::Raw(raw) => raw.extend_from_slice(data),
            Wire::Decoded { content, .. } => content.extend_from_slice(data),
        }
        self.touch();
    }

    fn set_headers(&mut self, new_headers: Vec<Header>) {
        match &mut self.wire {
            Wire::Decoded { headers, .. } => headers.extend(new_headers),
            Wire::Raw(_) => {
                tracing::warn!("header list given for an HTTP/1 side, ignored");
                return;
            }
        }
        self.touch();
    }

    fn clear(&mut self) {
        match &mut self.wire {
            Wire::Raw(raw) => raw.clear(),
            Wire::Decoded { headers, content } => {
                headers.clear();
                content.clear();
            }
        }
        self.touch();
    }

    fn is_http100(&self) -> bool {
        let Wire::Raw(raw) = &self.wire else {
            return false;
        };
        HTTP100_RESPONSES
            .iter()
            .any(|candidate| raw.eq_ignore_ascii_case(candidate))
    }
}

#[derive(Clone, Debug)]
pub struct Request(Side);

impl Request {
    /// Method from the request line, or `:method`. Empty when the request line
    /// is malformed.
    pub fn method(&self) -> String {
        match self.0.wire {
            Wire::Raw(_) => self.request_line().0,
            Wire::Decoded { .. } => self.0.header(":method").unwrap_or_default(),
        }
    }

    pub fn uri(&self) -> String {
        match self.0.wire {
            Wire::Raw(_) => self.request_line().1,
            Wire::Decoded { .. } => self.0.header(":path").unwrap_or_default(),
        }
    }

    pub fn protocol(&self) -> String {
        match self.0.wire {
            Wire::Raw(_) => self.request_line().2,
            Wire::Decoded { .. } => Protocol::Http2.as_str().to_owned(),
        }
    }

    fn request_line(&self) -> (String, String, String) {
        // Not exactly three tokens means we don't know what this is.
        match <[String; 3]>::try_from(self.0.first_line(4)) {
            Ok([method, uri, protocol]) => (method, uri, protocol),
            Err(_) => Default::default(),
        }
    }

    pub fn cookies(&self) -> Vec<Cookie> {
        cookies::request_cookies(&self.0.headers())
    }
}

impl Deref for Request {
    type Target = Side;

    fn deref(&self) -> &Side {
        &self.0
    }
}

impl DerefMut for Request {
    fn deref_mut(&mut self) -> &mut Side {
        &mut self.0
    }
}

#[derive(Clone, Debug)]
pub struct Response(Side);

impl Response {
    pub fn protocol(&self) -> String {
        match self.0.wire {
            Wire::Raw(_) => self.0.first_line(3).into_iter().next().unwrap_or_default(),
            Wire::Decoded { .. } => Protocol::Http2.as_str().to_owned(),
        }
    }

    /// Status code, 0 if none has been received (or it is unparseable).
    pub fn status_code(&self) -> u16 {
        let code = match self.0.wire {
            Wire::Raw(_) => self.0.first_line(3).into_iter().nth(1),
            Wire::Decoded { .. } => self.0.header(":status"),
        };
        code.and_then(|c| c.trim().parse().ok()).unwrap_or(0)
    }

    /// Reason phrase. HTTP/2 has none on the wire, so the canonical one for
    /// the status code is used.
    pub fn message(&self) -> String {
        match self.0.wire {
            Wire::Raw(_) => self.0.first_line(3).into_iter().nth(2).unwrap_or_default(),
            Wire::Decoded { .. } => http::StatusCode::from_u16(self.status_code())
                .ok()
                .and_then(|s| s.canonical_reason())
                .unwrap_or("")
                .to_owned(),
        }
    }

    pub fn cookies(&self) -> Vec<Cookie> {
        cookies::response_cookies(&self.0.headers())
    }
}

impl Deref for Response {
    type Target = Side;

    fn deref(&self) -> &Side {
        &self.0
    }
}

impl DerefMut for Response {
    fn deref_mut(&mut self) -> &mut Side {
        &mut self.0
    }
}

/// One reconstructed request/response pair.
#[derive(Clone, Debug)]
pub struct Record {
    pub id: RecordId,
    pub address: PeerAddr,
    pub is_tls: bool,
    /// This process originated the request
    pub is_client: bool,
    pub protocol: Option<Protocol>,
    pub begin: Nanos,
    pub request: Request,
    pub response: Response,
    pub exception: Option<Arc<Exception>>,
    pub attribution: Attribution,
    /// An interim `100 Continue` was received (and dropped) before the real
    /// response
    pub received_http100: bool,
    url: Option<String>,
}

impl Record {
    fn new(protocol: Option<Protocol>, is_client: bool, begin: Nanos, side: fn() -> Side) -> Self {
        Self {
            id: RecordId::new(),
            address: PeerAddr::unknown(),
            is_tls: false,
            is_client,
            protocol,
            begin,
            request: Request(side()),
            response: Response(side()),
            exception: None,
            attribution: Attribution::default(),
            received_http100: false,
            url: None,
        }
    }

    pub fn new_http1(protocol: Protocol, is_client: bool, begin: Nanos) -> Self {
        Self::new(Some(protocol), is_client, begin, Side::raw)
    }

    pub fn new_http2(is_client: bool, begin: Nanos) -> Self {
        Self::new(Some(Protocol::Http2), is_client, begin, Side::decoded)
    }

    /// A record for a connection which failed before any HTTP was exchanged.
    pub fn failed(exception: Exception, begin: Nanos) -> Self {
        let mut record = Self::new(None, true, begin, Side::raw);
        record.exception = Some(Arc::new(exception));
        record
    }

    pub fn with_address(mut self, address: PeerAddr, is_tls: bool) -> Self {
        self.address = address;
        self.is_tls = is_tls;
        self
    }

    pub fn with_attribution(mut self, attribution: Attribution) -> Self {
        self.attribution = attribution;
        self
    }

    pub fn set_url(&mut self, url: impl Into<String>) {
        self.url = Some(url.into());
    }

    pub fn url(&self) -> String {
        if let Some(url) = &self.url {
            return url.clone();
        }
        if self.protocol == Some(Protocol::Http2) {
            return format!(
                "{}://{}{}",
                self.request.header(":scheme").unwrap_or_default(),
                self.request.header(":authority").unwrap_or_default(),
                self.request.uri()
            );
        }

        let (host, port) = match self.request.header(HOST.as_str()) {
            Some(host) if !host.is_empty() => split_host_port(&host),
            _ => (
                self.address.host.clone(),
                (self.address.port != 0).then(|| self.address.port.to_string()),
            ),
        };
        let (scheme, default_port) = if self.is_tls {
            ("https", "443")
        } else {
            ("http", "80")
        };
        let port = match port {
            Some(p) if p != default_port => format!(":{p}"),
            _ => String::new(),
        };
        format!("{scheme}://{host}{port}{}", self.request.uri())
    }

    /// `scheme://authority` part of the url
    pub fn netloc(&self) -> String {
        let Ok(uri) = self.url().parse::<http::Uri>() else {
            return String::new();
        };
        match (uri.scheme_str(), uri.authority()) {
            (Some(scheme), Some(authority)) => format!("{scheme}://{authority}"),
            _ => String::new(),
        }
    }

    /// Everything in the url after the netloc
    pub fn urlext(&self) -> String {
        let url = self.url();
        let netloc = self.netloc();
        match url.strip_prefix(netloc.as_str()) {
            Some(rest) => rest.to_owned(),
            None => url,
        }
    }

    pub fn method(&self) -> String {
        self.request.method()
    }

    /// 0 while pending, -1 if the connection failed.
    pub fn status_code(&self) -> i32 {
        if self.exception.is_some() {
            -1
        } else {
            i32::from(self.response.status_code())
        }
    }

    pub fn reason(&self) -> String {
        let message = self.response.message();
        if !message.is_empty() {
            message
        } else if let Some(exception) = &self.exception {
            exception.name()
        } else {
            "in progress".to_owned()
        }
    }

    pub fn protocol_label(&self) -> &'static str {
        self.protocol.map(|p| p.as_str()).unwrap_or("")
    }

    /// The response declared a length it hasn't reached yet.
    pub fn in_progress(&self) -> bool {
        match self.response.content_length() {
            Some(len) if len > 0 => self.response.content().len() < len,
            _ => false,
        }
    }

    pub fn last_update(&self) -> Nanos {
        self.request.last_update().max(self.response.last_update())
    }

    fn request_direction(&self) -> Direction {
        if self.is_client {
            Direction::Send
        } else {
            Direction::Receive
        }
    }

    /// Bytes going the request way while the response has already started
    /// mean the connection is being reused for a new exchange.
    pub fn is_reuse_boundary(&self, direction: Direction) -> bool {
        direction == self.request_direction() && self.response.has_data()
    }

    /// Appends observed bytes to whichever side they belong to.
    pub fn append(&mut self, direction: Direction, data: &[u8]) {
        if direction == self.request_direction() {
            self.request.append(data);
        } else {
            self.response.append(data);
            if self.response.is_http100() {
                // Interim response: remember it, but build the real one from
                // scratch. The request body follows after this.
                tracing::debug!(id = %self.id, "dropping 100 Continue");
                self.received_http100 = true;
                self.response.clear();
            }
        }
    }

    pub fn send_data(&mut self, data: &[u8]) {
        self.append(Direction::Send, data)
    }

    pub fn receive_data(&mut self, data: &[u8]) {
        self.append(Direction::Receive, data)
    }

    pub fn set_request_headers(&mut self, headers: Vec<Header>) {
        self.request.set_headers(headers)
    }

    pub fn set_response_headers(&mut self, headers: Vec<Header>) {
        self.response.set_headers(headers)
    }

    pub fn set_exception(&mut self, exception: Exception) {
        self.exception = Some(Arc::new(exception));
        self.response.touch();
    }
}

/// Summary line: `METHOD url status reason`
impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {}",
            self.method(),
            self.url(),
            self.status_code(),
            self.reason()
        )
    }
}

/// A record shared between the session that is still filling it in and the
/// published collection.
///
/// Poisoning is ignored: a panic while one thread held the lock leaves the
/// record as complete as it got, which is fine for an observer.
#[derive(Clone, Debug)]
pub struct SharedRecord {
    id: RecordId,
    inner: Arc<RwLock<Record>>,
}

impl SharedRecord {
    pub fn new(record: Record) -> Self {
        Self {
            id: record.id,
            inner: Arc::new(RwLock::new(record)),
        }
    }

    pub fn id(&self) -> RecordId {
        self.id
    }

    pub fn read(&self) -> RwLockReadGuard<'_, Record> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, Record> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of the record as it is right now.
    pub fn snapshot(&self) -> Record {
        self.read().clone()
    }

    pub fn ptr_eq(&self, other: &SharedRecord) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn client() -> Record {
        Record::new_http1(Protocol::Http11, true, now())
    }

    #[test]
    fn test_header_block_split() {
        let mut r = client();
        r.send_data(b"POST /x HTTP/1.1\r\nHost: example.com\r\nX-Thing:  a:b \r\n");
        assert!(r.request.headers().is_empty());
        assert_eq!(r.method(), "");

        r.send_data(b"\r\nbody");
        assert_eq!(
            &*r.request.headers(),
            &[
                Header::new("Host", "example.com"),
                Header::new("X-Thing", "a:b")
            ]
        );
        assert_eq!(r.request.header("x-thing").as_deref(), Some("a:b"));
        assert_eq!(r.method(), "POST");
        assert_eq!(r.request.uri(), "/x");
        assert_eq!(r.request.protocol(), "HTTP/1.1");
        assert_eq!(&*r.request.content(), b"body");
    }

    #[test]
    fn test_content_length_truncation() {
        let mut r = client();
        r.receive_data(b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello world");
        assert_eq!(&*r.response.content(), b"hello");
        assert!(!r.in_progress());
    }

    #[test]
    fn test_in_progress() {
        let mut r = client();
        r.receive_data(b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\nhello");
        assert!(r.in_progress());
        r.receive_data(b"world");
        assert!(!r.in_progress());
    }

    #[test]
    fn test_chunked_content() {
        let mut r = client();
        r.receive_data(b"HTTP/1.1 200 OK\r\nTransfer-Encoding: Chunked\r\n\r\n3\r\nabc\r\n");
        assert_eq!(&*r.response.content(), b"abc");
        r.receive_data(b"2\r\nde\r\n0\r\n\r\n");
        assert_eq!(&*r.response.content(), b"abcde");
    }

    #[test]
    fn test_http100_suppressed() {
        let mut r = client();
        r.send_data(b"PUT /up HTTP/1.1\r\nExpect: 100-continue\r\n\r\n");
        r.receive_data(b"HTTP/1.1 100 continue\r\n\r\n");
        assert!(r.received_http100);
        assert!(!r.response.has_data());
        assert!(!r.is_reuse_boundary(Direction::Send));

        r.send_data(b"payload");
        r.receive_data(b"HTTP/1.1 200 OK\r\n\r\n");
        assert_eq!(r.status_code(), 200);
        assert_eq!(&*r.request.content(), b"payload");
    }

    #[test]
    fn test_http100_split_is_not_suppressed_early() {
        let mut r = client();
        r.receive_data(b"HTTP/1.1 100 Cont");
        assert!(!r.received_http100);
        r.receive_data(b"inue\r\n\r\n");
        assert!(r.received_http100);
        assert!(!r.response.has_data());
    }

    #[test]
    fn test_malformed_request_line() {
        let mut r = client();
        r.send_data(b"GET /a b HTTP/1.1\r\n\r\n");
        assert_eq!(r.method(), "");
        assert_eq!(r.request.uri(), "");
        assert_eq!(r.request.protocol(), "");
    }

    #[test]
    fn test_status_and_reason() {
        let mut r = client();
        assert_eq!(r.status_code(), 0);
        assert_eq!(r.reason(), "in progress");

        r.receive_data(b"HTTP/1.0 404 Not Found\r\n\r\n");
        assert_eq!(r.status_code(), 404);
        assert_eq!(r.reason(), "Not Found");
        assert_eq!(r.response.protocol(), "HTTP/1.0");

        r.set_exception(Exception::Read(io::ErrorKind::ConnectionReset.into()));
        assert_eq!(r.status_code(), -1);
        // The reason phrase still wins if there is one
        assert_eq!(r.reason(), "Not Found");

        let failed = Record::failed(
            Exception::Connect(io::ErrorKind::ConnectionRefused.into()),
            now(),
        );
        assert_eq!(failed.status_code(), -1);
        assert_eq!(failed.reason(), "ConnectionRefused");
    }

    #[test]
    fn test_url() {
        let mut r = client().with_address(PeerAddr::new("10.0.0.1", 8080), false);
        r.send_data(b"GET /p?q=1 HTTP/1.1\r\n\r\n");
        assert_eq!(r.url(), "http://10.0.0.1:8080/p?q=1");

        let mut r = client().with_address(PeerAddr::new("10.0.0.1", 443), true);
        r.send_data(b"GET /p HTTP/1.1\r\nHost: example.com:443\r\n\r\n");
        assert_eq!(r.url(), "https://example.com/p");
        assert_eq!(r.netloc(), "https://example.com");
        assert_eq!(r.urlext(), "/p");

        let mut r = client();
        r.send_data(b"GET / HTTP/1.1\r\nHost: example.com:8443\r\n\r\n");
        assert_eq!(r.url(), "http://example.com:8443/");

        r.set_url("http://elsewhere/");
        assert_eq!(r.url(), "http://elsewhere/");
    }

    #[test]
    fn test_netloc_without_path() {
        let mut r = client();
        r.set_url("http://h?q");
        assert_eq!(r.netloc(), "http://h");
        assert_eq!(r.urlext(), "?q");

        r.set_url("https://h:8443");
        assert_eq!(r.netloc(), "https://h:8443");
        assert_eq!(r.urlext(), "");

        r.set_url("not a url");
        assert_eq!(r.netloc(), "");
        assert_eq!(r.urlext(), "not a url");
    }

    #[test]
    fn test_http2_sides() {
        let mut r = Record::new_http2(true, now());
        r.set_request_headers(vec![
            (":method", "GET").into(),
            (":scheme", "https").into(),
            (":authority", "example.com").into(),
            (":path", "/get").into(),
        ]);
        r.set_response_headers(vec![(":status", "200").into()]);
        r.receive_data(b"{}");

        assert_eq!(r.method(), "GET");
        assert_eq!(r.url(), "https://example.com/get");
        assert_eq!(r.status_code(), 200);
        assert_eq!(r.reason(), "OK");
        assert_eq!(r.protocol_label(), "HTTP/2");
        assert_eq!(r.response.protocol(), "HTTP/2");
        assert_eq!(&*r.response.content(), b"{}");
    }

    #[test]
    fn test_cookies_and_completeness() {
        let mut r = client();
        r.send_data(b"GET / HTTP/1.1\r\nCookie: a=1; b=2\r\n");
        assert!(!r.request.headers_complete());
        assert!(r.request.cookies().is_empty());
        r.send_data(b"\r\n");
        assert!(r.request.headers_complete());
        assert_eq!(r.request.cookies().len(), 2);

        r.receive_data(b"HTTP/1.1 200 OK\r\nSet-Cookie: s=x; Secure\r\n\r\n");
        let cookies = r.response.cookies();
        assert_eq!(cookies[0].name, "s");
        assert_eq!(cookies[0].attributes[0].name, "Secure");
        assert_eq!(r.protocol.map(|p| p.version()), Some(http::Version::HTTP_11));
    }

    #[test]
    fn test_header_map() {
        let mut r = client();
        r.send_data(b"GET / HTTP/1.1\r\nAccept: */*\r\nBad Name: x\r\n\r\n");
        let hm = r.request.header_map();
        assert_eq!(hm.len(), 1);
        assert_eq!(hm.get("accept").unwrap(), "*/*");
    }

    #[test]
    fn test_last_update_moves() {
        let mut r = client();
        let before = r.last_update();
        r.send_data(b"G");
        assert!(r.last_update() >= before);
    }
}
