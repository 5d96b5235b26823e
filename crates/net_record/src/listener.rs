// SPDX-FileCopyrightText: 2023 Jade Lovelace
//
// SPDX-License-Identifier: MPL-2.0

//! Identities and timing shared by every layer, and the observer seam through
//! which reconstructed records leave the engine.

use std::{
    fmt, io,
    net::SocketAddr,
    sync::atomic::{AtomicU64, Ordering},
    time::{SystemTime, UNIX_EPOCH},
};

use crate::record::SharedRecord;

/// Nanoseconds since the Unix epoch
pub type Nanos = u64;

pub const NANOS_PER_MILLI: Nanos = 1_000_000;

pub fn now() -> Nanos {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as Nanos)
        .unwrap_or_default()
}

/// Stable handle for one logical connection.
///
/// The interception layer picks these; a plaintext socket and the TLS object
/// later wrapped around it get different ids which are then linked with
/// [`crate::Recorder::on_wrapped`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

impl ConnectionId {
    /// Generates a fresh process-unique id.
    pub fn generate() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl From<u64> for ConnectionId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Debug for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn#{}", self.0)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which way bytes went, from the point of view of the observed process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    Send,
    Receive,
}

/// Address of the remote end of a connection.
///
/// Some transports have none, in which case this is `("", 0)`.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct PeerAddr {
    pub host: String,
    pub port: u16,
}

impl PeerAddr {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn unknown() -> Self {
        Self::default()
    }

    pub fn is_unknown(&self) -> bool {
        self.host.is_empty() && self.port == 0
    }
}

impl From<SocketAddr> for PeerAddr {
    fn from(value: SocketAddr) -> Self {
        Self::new(value.ip().to_string(), value.port())
    }
}

impl From<(&str, u16)> for PeerAddr {
    fn from((host, port): (&str, u16)) -> Self {
        Self::new(host, port)
    }
}

impl fmt::Debug for PeerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl fmt::Display for PeerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Something that can tell us who is on the other end of a connection.
///
/// Resolution may fail transiently (e.g. the socket was already closed), in
/// which case the event is not tracked.
pub trait AddressSource {
    fn peer_addr(&self) -> io::Result<PeerAddr>;
}

impl AddressSource for PeerAddr {
    fn peer_addr(&self) -> io::Result<PeerAddr> {
        Ok(self.clone())
    }
}

impl AddressSource for SocketAddr {
    fn peer_addr(&self) -> io::Result<PeerAddr> {
        Ok((*self).into())
    }
}

impl AddressSource for std::net::TcpStream {
    fn peer_addr(&self) -> io::Result<PeerAddr> {
        std::net::TcpStream::peer_addr(self).map(Into::into)
    }
}

impl<F> AddressSource for F
where
    F: Fn() -> io::Result<PeerAddr>,
{
    fn peer_addr(&self) -> io::Result<PeerAddr> {
        self()
    }
}

/// Address source for transports that carry no address at all.
#[derive(Clone, Copy, Debug, Default)]
pub struct Unaddressed;

impl AddressSource for Unaddressed {
    fn peer_addr(&self) -> io::Result<PeerAddr> {
        Ok(PeerAddr::unknown())
    }
}

/// Receives every record at the moment it is published, i.e. while it is
/// still in progress.
///
/// Called synchronously from whichever thread observed the traffic, so
/// implementations must not block.
pub trait RecordListener: Send + Sync {
    fn on_record(&self, record: &SharedRecord);
}

#[derive(Debug, Default)]
pub struct NoOpListener {}

impl RecordListener for NoOpListener {
    fn on_record(&self, _record: &SharedRecord) {
        // do nothing! :D
    }
}

#[derive(Debug, Default)]
pub struct DebugListener {}

impl RecordListener for DebugListener {
    fn on_record(&self, record: &SharedRecord) {
        let record = record.read();
        tracing::info!(
            id = %record.id,
            client = record.is_client,
            "new record {} {}",
            record.method(),
            record.url()
        );
    }
}

impl<F> RecordListener for F
where
    F: Fn(&SharedRecord) + Send + Sync,
{
    fn on_record(&self, record: &SharedRecord) {
        self(record)
    }
}
