// SPDX-FileCopyrightText: 2023 Jade Lovelace
//
// SPDX-License-Identifier: MPL-2.0

//! Per-stream state for HTTP/2 reconstruction.
//!
//! Unlike HTTP/1 there is nothing to sniff: the frame layer hands us decoded
//! header lists and DATA payloads, so a stream session is just the record
//! currently being filled in on that stream id and which end we are.

use dashmap::{mapref::entry::Entry, DashMap};

use crate::{
    listener::{ConnectionId, Nanos, PeerAddr},
    record::{Attribution, Header, Record, SharedRecord},
};

pub type StreamId = u32;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    /// We sent the request
    Client,
    /// We received the request
    Server,
}

impl Role {
    pub fn is_client(self) -> bool {
        self == Role::Client
    }
}

#[derive(Clone, Debug)]
pub struct StreamSession {
    pub role: Role,
    pub record: SharedRecord,
}

/// What a record created on a stream inherits from its connection.
#[derive(Clone, Debug, Default)]
pub struct StreamSeed {
    pub address: PeerAddr,
    pub is_tls: bool,
    pub attribution: Attribution,
    pub begin: Nanos,
}

impl StreamSeed {
    fn session(&self, role: Role, request_headers: Vec<Header>) -> StreamSession {
        let mut record = Record::new_http2(role.is_client(), self.begin)
            .with_address(self.address.clone(), self.is_tls)
            .with_attribution(self.attribution.clone());
        record.set_request_headers(request_headers);
        StreamSession {
            role,
            record: SharedRecord::new(record),
        }
    }
}

type Key = (ConnectionId, StreamId);

/// Stream sessions keyed by connection and stream id.
///
/// Every operation that creates a record returns it, so that the caller can
/// publish it; operations on existing records return `None`.
#[derive(Debug, Default)]
pub struct StreamSessionStore {
    streams: DashMap<Key, StreamSession>,
}

impl StreamSessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    pub fn get(&self, conn: ConnectionId, stream: StreamId) -> Option<StreamSession> {
        self.streams.get(&(conn, stream)).map(|s| s.value().clone())
    }

    /// We sent a header block on `stream`.
    ///
    /// As a client this is a new request, unless the stream holds a request
    /// that hasn't been answered yet, in which case the headers belong to it.
    /// A client-role entry whose response has started means the id is being
    /// reused and the old record is left as it is. As a server this is the
    /// response.
    pub fn send_headers(
        &self,
        conn: ConnectionId,
        stream: StreamId,
        headers: Vec<Header>,
        seed: &StreamSeed,
    ) -> Option<SharedRecord> {
        match self.streams.entry((conn, stream)) {
            Entry::Occupied(mut entry) => match entry.get().role {
                Role::Server => {
                    entry.get().record.write().set_response_headers(headers);
                    None
                }
                Role::Client if !entry.get().record.read().response.has_data() => {
                    // Still waiting for the response: trailers or a
                    // continuation of the same request
                    entry.get().record.write().set_request_headers(headers);
                    None
                }
                Role::Client => {
                    tracing::debug!(%conn, stream, "stream reused for a new request");
                    let session = seed.session(Role::Client, headers);
                    let record = session.record.clone();
                    entry.insert(session);
                    Some(record)
                }
            },
            Entry::Vacant(entry) => {
                let session = seed.session(Role::Client, headers);
                let record = session.record.clone();
                entry.insert(session);
                Some(record)
            }
        }
    }

    /// We received a header block on `stream`.
    ///
    /// `is_client` says which end we are. A client receiving headers is
    /// getting its response, which only matters if we saw the request. A
    /// server receiving headers is getting a new request and replaces
    /// whatever was on the stream.
    pub fn receive_headers(
        &self,
        conn: ConnectionId,
        stream: StreamId,
        headers: Vec<Header>,
        is_client: bool,
        seed: &StreamSeed,
    ) -> Option<SharedRecord> {
        if is_client {
            match self.streams.get(&(conn, stream)) {
                Some(session) => session.record.write().set_response_headers(headers),
                None => tracing::debug!(%conn, stream, "response headers for unknown stream"),
            }
            return None;
        }

        let session = seed.session(Role::Server, headers);
        let record = session.record.clone();
        if self.streams.insert((conn, stream), session).is_some() {
            tracing::debug!(%conn, stream, "stream reused for a new inbound request");
        }
        Some(record)
    }

    /// We sent DATA on `stream`: request body as a client, response body as a
    /// server.
    pub fn send_data(&self, conn: ConnectionId, stream: StreamId, data: &[u8]) {
        let Some(session) = self.streams.get(&(conn, stream)) else {
            tracing::debug!(%conn, stream, "data sent on unknown stream");
            return;
        };
        session.record.write().send_data(data);
    }

    /// We received DATA on `stream`: response body as a client, request body
    /// as a server.
    pub fn receive_data(&self, conn: ConnectionId, stream: StreamId, data: &[u8]) {
        let Some(session) = self.streams.get(&(conn, stream)) else {
            tracing::debug!(%conn, stream, "data received on unknown stream");
            return;
        };
        session.record.write().receive_data(data);
    }

    /// Drops every stream of a closed connection.
    pub fn close_connection(&self, conn: ConnectionId) {
        self.streams.retain(|(c, _), _| *c != conn);
    }
}
