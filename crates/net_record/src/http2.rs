// SPDX-FileCopyrightText: 2023 Jade Lovelace
//
// SPDX-License-Identifier: MPL-2.0

//! HTTP/2 reconstruction from frame-level events.
//!
//! Framing, HPACK and flow control are somebody else's problem: we get header
//! lists (pseudo-headers included) and DATA payloads per stream and turn them
//! into records shaped like the HTTP/1 ones.

use std::fmt;

use bytes::Bytes;
use tracing::Level;

use crate::{
    config::RecorderConfig,
    listener::{now, ConnectionId, PeerAddr},
    record::{Header, SharedRecord},
    records::Records,
    session::SessionStore,
    stream_session::{StreamId, StreamSeed, StreamSessionStore},
};

/// Something decoded off an HTTP/2 connection by the frame layer.
pub enum H2Event {
    /// Headers of a request we are serving
    RequestHeadersReceived {
        stream_id: StreamId,
        headers: Vec<Header>,
    },
    /// Headers of the response to a request we made
    ResponseHeadersReceived {
        stream_id: StreamId,
        headers: Vec<Header>,
    },
    DataReceived { stream_id: StreamId, data: Bytes },
}

impl H2Event {
    pub fn stream_id(&self) -> StreamId {
        match self {
            Self::RequestHeadersReceived { stream_id, .. }
            | Self::ResponseHeadersReceived { stream_id, .. }
            | Self::DataReceived { stream_id, .. } => *stream_id,
        }
    }
}

impl fmt::Debug for H2Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RequestHeadersReceived { stream_id, headers } => f
                .debug_struct("RequestHeadersReceived")
                .field("stream_id", stream_id)
                .field("headers", &headers.len())
                .finish(),
            Self::ResponseHeadersReceived { stream_id, headers } => f
                .debug_struct("ResponseHeadersReceived")
                .field("stream_id", stream_id)
                .field("headers", &headers.len())
                .finish(),
            Self::DataReceived { stream_id, data } => f
                .debug_struct("DataReceived")
                .field("stream_id", stream_id)
                .field("len", &data.len())
                .finish(),
        }
    }
}

fn push_fields(headers: &mut Vec<Header>, map: &http::HeaderMap) {
    for (name, value) in map {
        headers.push(Header::new(
            name.as_str(),
            String::from_utf8_lossy(value.as_bytes()),
        ));
    }
}

/// Header list for a request decoded by an `http`-based frame layer, with the
/// pseudo-headers put back in front.
pub fn request_headers(parts: &http::request::Parts) -> Vec<Header> {
    let mut headers = vec![Header::new(":method", parts.method.as_str())];
    if let Some(scheme) = parts.uri.scheme_str() {
        headers.push(Header::new(":scheme", scheme));
    }
    if let Some(authority) = parts.uri.authority() {
        headers.push(Header::new(":authority", authority.as_str()));
    }
    let path = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    headers.push(Header::new(":path", path));
    push_fields(&mut headers, &parts.headers);
    headers
}

/// Header list for a response decoded by an `http`-based frame layer.
pub fn response_headers(parts: &http::response::Parts) -> Vec<Header> {
    let mut headers = vec![Header::new(":status", parts.status.as_str())];
    push_fields(&mut headers, &parts.headers);
    headers
}

/// Feeds stream events into HTTP/2 stream sessions.
pub struct Http2Assembler<'a> {
    streams: &'a StreamSessionStore,
    sessions: &'a SessionStore,
    records: &'a Records,
    config: &'a RecorderConfig,
}

impl<'a> Http2Assembler<'a> {
    pub fn new(
        streams: &'a StreamSessionStore,
        sessions: &'a SessionStore,
        records: &'a Records,
        config: &'a RecorderConfig,
    ) -> Self {
        Self {
            streams,
            sessions,
            records,
            config,
        }
    }

    /// What records on `conn` inherit. `None` if the connection is ignored.
    fn seed(&self, conn: ConnectionId) -> Option<StreamSeed> {
        if self.sessions.is_ignored(conn) {
            return None;
        }
        let (address, is_tls) = self
            .sessions
            .connection_info(conn)
            .unwrap_or_else(|| (PeerAddr::unknown(), false));
        Some(StreamSeed {
            address,
            is_tls,
            attribution: self.sessions.attribution(conn),
            begin: now(),
        })
    }

    fn publish(&self, record: Option<SharedRecord>) {
        let Some(record) = record else {
            return;
        };
        let is_client = record.read().is_client;
        tracing::debug!(record = %record.id(), is_client, "HTTP/2 exchange started");
        if self.config.mode.records(is_client) {
            self.records.insert(record);
        }
    }

    /// We sent a header block on `stream`.
    pub fn send_headers(&self, conn: ConnectionId, stream: StreamId, headers: Vec<Header>) {
        let _span = tracing::span!(Level::DEBUG, "http2", %conn, stream).entered();
        tracing::trace!(count = headers.len(), "headers sent");
        let Some(seed) = self.seed(conn) else {
            return;
        };
        let created = self.streams.send_headers(conn, stream, headers, &seed);
        self.publish(created);
    }

    /// We sent DATA on `stream`.
    pub fn send_data(&self, conn: ConnectionId, stream: StreamId, data: &[u8]) {
        let _span = tracing::span!(Level::DEBUG, "http2", %conn, stream).entered();
        tracing::trace!(len = data.len(), data = %misc::Show::preview(data), "data sent");
        self.streams.send_data(conn, stream, data);
    }

    /// We received a header block on `stream`; `is_client` says whether it is
    /// the response to our own request.
    pub fn on_headers(
        &self,
        conn: ConnectionId,
        stream: StreamId,
        headers: Vec<Header>,
        is_client: bool,
    ) {
        let _span = tracing::span!(Level::DEBUG, "http2", %conn, stream).entered();
        tracing::trace!(count = headers.len(), is_client, "headers received");
        let Some(seed) = self.seed(conn) else {
            return;
        };
        let created = self
            .streams
            .receive_headers(conn, stream, headers, is_client, &seed);
        self.publish(created);
    }

    /// We received DATA on `stream`. Which side it lands on is decided by the
    /// role the stream was opened with, `is_client` is only logged.
    pub fn on_data(&self, conn: ConnectionId, stream: StreamId, data: &[u8], is_client: bool) {
        let _span = tracing::span!(Level::DEBUG, "http2", %conn, stream).entered();
        tracing::trace!(len = data.len(), is_client, data = %misc::Show::preview(data), "data received");
        self.streams.receive_data(conn, stream, data);
    }

    pub fn on_event(&self, conn: ConnectionId, event: H2Event) {
        tracing::trace!(%conn, ?event, "h2 event");
        match event {
            H2Event::RequestHeadersReceived { stream_id, headers } => {
                self.on_headers(conn, stream_id, headers, false)
            }
            H2Event::ResponseHeadersReceived { stream_id, headers } => {
                self.on_headers(conn, stream_id, headers, true)
            }
            H2Event::DataReceived { stream_id, data } => {
                self.on_data(conn, stream_id, &data, false)
            }
        }
    }
}
