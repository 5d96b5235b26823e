// SPDX-FileCopyrightText: 2023 Jade Lovelace
//
// SPDX-License-Identifier: MPL-2.0

//! HTTP/1 reconstruction from raw socket bytes.
//!
//! Bytes for a connection are buffered until we can see the first line. If it
//! looks like an HTTP/1 request line, a record is started and every later byte
//! on the connection is appended to it (see [`Record::append`]); otherwise the
//! connection is written off and ignored.

use tracing::Level;

use crate::{
    config::RecorderConfig,
    listener::{AddressSource, ConnectionId, Direction, NANOS_PER_MILLI},
    record::{find, Protocol, Record, SharedRecord},
    records::Records,
    session::{Detection, Session, SessionStore},
};

/// Looks for an HTTP/1 request line at the start of `buf`.
///
/// The first CRLF must show up within `window` bytes; the line before it must
/// end with `HTTP/1.0` or `HTTP/1.1`. Until there are more than `window` bytes
/// without a CRLF, the answer is [`Detection::Unknown`].
pub fn detect(buf: &[u8], window: usize) -> Detection {
    let head = &buf[..buf.len().min(window)];
    let Some(line_end) = find(head, b"\r\n") else {
        return if buf.len() > window {
            Detection::NotHttp
        } else {
            Detection::Unknown
        };
    };
    if http1_protocol(&buf[..line_end]).is_some() {
        Detection::Http1
    } else {
        Detection::NotHttp
    }
}

fn http1_protocol(first_line: &[u8]) -> Option<Protocol> {
    let suffix = first_line.get(first_line.len().checked_sub(8)?..)?;
    if suffix.eq_ignore_ascii_case(b"HTTP/1.1") {
        Some(Protocol::Http11)
    } else if suffix.eq_ignore_ascii_case(b"HTTP/1.0") {
        Some(Protocol::Http10)
    } else {
        None
    }
}

/// Feeds directional byte events into HTTP/1 sessions.
pub struct Http1Assembler<'a> {
    sessions: &'a SessionStore,
    records: &'a Records,
    config: &'a RecorderConfig,
}

impl<'a> Http1Assembler<'a> {
    pub fn new(sessions: &'a SessionStore, records: &'a Records, config: &'a RecorderConfig) -> Self {
        Self {
            sessions,
            records,
            config,
        }
    }

    /// Handles `data` going `direction` on connection `id`.
    ///
    /// `source` and `is_tls` are only consulted if this is the first we hear
    /// of the connection.
    pub fn on_bytes(
        &self,
        id: ConnectionId,
        direction: Direction,
        data: &[u8],
        source: &dyn AddressSource,
        is_tls: bool,
    ) {
        let _span = tracing::span!(Level::DEBUG, "http1", conn = %id, ?direction).entered();
        tracing::trace!(len = data.len(), data = %misc::Show::preview(data), "bytes");

        let Some(session) = self.sessions.for_event(id, direction, source, is_tls) else {
            return;
        };
        let started = {
            let mut session = session.lock();

            if let Some(record) = &session.active {
                record.write().append(direction, data);
                return;
            }

            match session.detected {
                Detection::NotHttp => return,
                Detection::Unknown | Detection::Http1 => {}
            }

            session.raw.extend_from_slice(data);
            match detect(&session.raw, self.config.detect_window) {
                Detection::Unknown => {
                    tracing::trace!(buffered = session.raw.len(), "not sure yet");
                    return;
                }
                Detection::NotHttp => {
                    tracing::debug!(
                        start = %misc::Show::preview(&session.raw),
                        "not HTTP/1, ignoring connection"
                    );
                    session.mark_not_http();
                    return;
                }
                Detection::Http1 => self.start_record(id, &mut session, direction),
            }
        };

        // Listeners run without the session lock held
        if self.config.mode.records(started.read().is_client) {
            self.records.insert(started);
        }
    }

    fn start_record(
        &self,
        id: ConnectionId,
        session: &mut Session,
        direction: Direction,
    ) -> SharedRecord {
        // A new exchange always starts with a request: if we are sending it we
        // are the client, if we are receiving it we are the server.
        let is_client = direction == Direction::Send;
        let protocol = find(&session.raw, b"\r\n")
            .and_then(|end| http1_protocol(&session.raw[..end]))
            .unwrap_or(Protocol::Http11);

        let mut record = Record::new_http1(
            protocol,
            is_client,
            // Sort before anything attributed to the same call
            session.created_at.saturating_sub(NANOS_PER_MILLI),
        )
        .with_address(session.address.clone(), session.is_tls)
        .with_attribution(self.sessions.attribution(id));
        record.append(direction, &session.raw);

        session.raw = Vec::new();
        session.detected = Detection::Http1;

        let record = SharedRecord::new(record);
        tracing::debug!(record = %record.id(), is_client, %protocol, "HTTP/1 exchange detected");
        session.active = Some(record.clone());
        record
    }
}
