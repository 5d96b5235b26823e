// SPDX-FileCopyrightText: 2023 Jade Lovelace
//
// SPDX-License-Identifier: MPL-2.0

//! One recording context: the stores, the published records and the config
//! they were built from, with an entry point per interception event.

use crate::{
    config::RecorderConfig,
    http1::Http1Assembler,
    http2::{H2Event, Http2Assembler},
    listener::{now, AddressSource, ConnectionId, Direction, PeerAddr, Unaddressed},
    record::{Attribution, Exception, Header, Record, SharedRecord},
    records::Records,
    session::SessionStore,
    stream_session::{StreamId, StreamSessionStore},
};

#[derive(Debug)]
pub struct Recorder {
    config: RecorderConfig,
    sessions: SessionStore,
    streams: StreamSessionStore,
    records: Records,
}

impl Default for Recorder {
    fn default() -> Self {
        Self::new(RecorderConfig::default())
    }
}

impl Recorder {
    pub fn new(config: RecorderConfig) -> Self {
        Self {
            sessions: SessionStore::new(config.ignore.clone()),
            streams: StreamSessionStore::new(),
            records: Records::new(),
            config,
        }
    }

    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }

    pub fn records(&self) -> &Records {
        &self.records
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn streams(&self) -> &StreamSessionStore {
        &self.streams
    }

    pub fn http1(&self) -> Http1Assembler<'_> {
        Http1Assembler::new(&self.sessions, &self.records, &self.config)
    }

    pub fn http2(&self) -> Http2Assembler<'_> {
        Http2Assembler::new(&self.streams, &self.sessions, &self.records, &self.config)
    }

    /// A connection was (re)established. Anything known about `id` before is
    /// discarded.
    pub fn on_connect(&self, id: ConnectionId, source: &dyn AddressSource, is_tls: bool) {
        tracing::debug!(conn = %id, is_tls, "connect");
        self.force_new(id, source, is_tls);
    }

    /// `new` is now the handle for what used to be `old`, e.g. after a TLS
    /// handshake wrapped a plaintext socket.
    pub fn on_wrapped(&self, new: ConnectionId, old: ConnectionId, is_tls: bool) {
        if is_tls {
            self.sessions.move_to(new, old);
        } else {
            self.sessions.relink(new, old);
        }
    }

    /// Bytes on a connection whose address was given at connect time (or
    /// that has none).
    pub fn on_bytes(&self, id: ConnectionId, direction: Direction, data: &[u8]) {
        self.http1()
            .on_bytes(id, direction, data, &Unaddressed, false)
    }

    /// Bytes on a connection that may not have been seen before; `source` is
    /// asked for its address if so.
    pub fn on_bytes_from(
        &self,
        id: ConnectionId,
        direction: Direction,
        data: &[u8],
        source: &dyn AddressSource,
        is_tls: bool,
    ) {
        self.http1().on_bytes(id, direction, data, source, is_tls)
    }

    /// The observed I/O on `id` failed.
    ///
    /// The error lands on the exchange in progress. Without one, a failure to
    /// even set the connection up is published as a record of its own; later
    /// failures have nothing to attach to and are dropped.
    pub fn on_error(&self, id: ConnectionId, exception: Exception) {
        let _span = tracing::span!(tracing::Level::DEBUG, "http1", conn = %id).entered();
        if self.sessions.is_ignored(id) {
            return;
        }

        let active = self
            .sessions
            .get(id)
            .and_then(|s| s.lock().active().cloned());
        if let Some(record) = active {
            tracing::debug!(record = %record.id(), %exception, "exchange failed");
            record.write().set_exception(exception);
            return;
        }

        if !exception.is_setup_failure() {
            tracing::debug!(%exception, "error outside of any exchange");
            return;
        }

        let (address, is_tls) = self
            .sessions
            .connection_info(id)
            .unwrap_or_else(|| (PeerAddr::unknown(), false));
        tracing::debug!(%exception, ?address, "connection failed");
        let record = Record::failed(exception, now())
            .with_address(address, is_tls)
            .with_attribution(self.sessions.attribution(id));
        if self.config.mode.records(record.is_client) {
            self.records.insert(SharedRecord::new(record));
        }
    }

    /// The connection is gone, along with all its streams.
    pub fn on_close(&self, id: ConnectionId) {
        tracing::debug!(conn = %id, "close");
        self.sessions.forget(id);
        self.streams.close_connection(id);
    }

    pub fn force_new(&self, id: ConnectionId, source: &dyn AddressSource, is_tls: bool) {
        self.sessions.force_new(id, source, is_tls);
    }

    pub fn set_attribution(&self, id: ConnectionId, attribution: Attribution) {
        self.sessions.set_attribution(id, attribution)
    }

    pub fn on_h2_event(&self, conn: ConnectionId, event: H2Event) {
        self.http2().on_event(conn, event)
    }

    pub fn h2_send_headers(&self, conn: ConnectionId, stream: StreamId, headers: Vec<Header>) {
        self.http2().send_headers(conn, stream, headers)
    }

    pub fn h2_send_data(&self, conn: ConnectionId, stream: StreamId, data: &[u8]) {
        self.http2().send_data(conn, stream, data)
    }

    pub fn h2_on_headers(
        &self,
        conn: ConnectionId,
        stream: StreamId,
        headers: Vec<Header>,
        is_client: bool,
    ) {
        self.http2().on_headers(conn, stream, headers, is_client)
    }

    pub fn h2_on_data(&self, conn: ConnectionId, stream: StreamId, data: &[u8], is_client: bool) {
        self.http2().on_data(conn, stream, data, is_client)
    }
}
