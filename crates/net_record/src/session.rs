// SPDX-FileCopyrightText: 2023 Jade Lovelace
//
// SPDX-License-Identifier: MPL-2.0

//! Per-connection state for HTTP/1 reconstruction.
//!
//! Sessions live in a concurrent map so that unrelated connections never wait
//! on each other; each session has its own lock, which the assembler holds for
//! the duration of one byte event.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use dashmap::{DashMap, DashSet};

use crate::{
    ignore::IgnoreList,
    listener::{now, AddressSource, ConnectionId, Direction, Nanos, PeerAddr},
    record::{Attribution, SharedRecord},
};

/// Result of sniffing the start of a connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Detection {
    /// Not enough bytes to tell yet
    Unknown,
    NotHttp,
    Http1,
}

#[derive(Debug)]
pub struct Session {
    pub id: ConnectionId,
    pub address: PeerAddr,
    pub is_tls: bool,
    /// Bytes seen since the last decision point, while detection is pending
    pub(crate) raw: Vec<u8>,
    pub(crate) detected: Detection,
    pub(crate) active: Option<SharedRecord>,
    pub created_at: Nanos,
}

impl Session {
    fn new(id: ConnectionId, address: PeerAddr, is_tls: bool) -> Self {
        Self {
            id,
            address,
            is_tls,
            raw: Vec::new(),
            detected: Detection::Unknown,
            active: None,
            created_at: now(),
        }
    }

    pub fn detected(&self) -> Detection {
        self.detected
    }

    pub fn active(&self) -> Option<&SharedRecord> {
        self.active.as_ref()
    }

    pub fn buffered(&self) -> &[u8] {
        &self.raw
    }

    /// Stops buffering for good. Nothing on this connection will be looked at
    /// again until it is re-initialised.
    pub(crate) fn mark_not_http(&mut self) {
        self.detected = Detection::NotHttp;
        self.raw = Vec::new();
    }
}

#[derive(Clone, Debug)]
pub struct SharedSession(Arc<Mutex<Session>>);

impl SharedSession {
    fn new(session: Session) -> Self {
        Self(Arc::new(Mutex::new(session)))
    }

    pub fn lock(&self) -> MutexGuard<'_, Session> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: DashMap<ConnectionId, SharedSession>,
    /// Connections that resolved to an ignored address
    ignored: DashSet<ConnectionId>,
    attributions: DashMap<ConnectionId, Attribution>,
    /// Connections wrapped in TLS before we ever saw them
    tls_hints: DashSet<ConnectionId>,
    ignore: IgnoreList,
}

impl SessionStore {
    pub fn new(ignore: IgnoreList) -> Self {
        Self {
            ignore,
            ..Default::default()
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn get(&self, id: ConnectionId) -> Option<SharedSession> {
        self.sessions.get(&id).map(|s| s.value().clone())
    }

    /// Returns the session for `id`, creating it if the connection is new.
    ///
    /// `None` means the connection is not to be tracked: its address is on the
    /// ignore-list, or it could not be resolved right now.
    pub fn get_or_create(
        &self,
        id: ConnectionId,
        source: &dyn AddressSource,
        is_tls: bool,
    ) -> Option<SharedSession> {
        if let Some(existing) = self.get(id) {
            return Some(existing);
        }
        if self.ignored.contains(&id) {
            return None;
        }
        let is_tls = is_tls || self.tls_hints.contains(&id);

        let address = match source.peer_addr() {
            Ok(address) => address,
            Err(err) => {
                tracing::debug!(conn = %id, %err, "no address for connection, not tracking");
                return None;
            }
        };
        if self.ignore.is_ignored(&address) {
            tracing::debug!(conn = %id, ?address, "ignoring connection");
            self.ignored.insert(id);
            return None;
        }

        let session = self
            .sessions
            .entry(id)
            .or_insert_with(|| {
                tracing::debug!(conn = %id, ?address, is_tls, "new session");
                SharedSession::new(Session::new(id, address, is_tls))
            })
            .value()
            .clone();
        self.tls_hints.remove(&id);
        Some(session)
    }

    /// Throws away whatever was known about `id` and starts over.
    pub fn force_new(
        &self,
        id: ConnectionId,
        source: &dyn AddressSource,
        is_tls: bool,
    ) -> Option<SharedSession> {
        self.delete(id);
        self.get_or_create(id, source, is_tls)
    }

    /// Like [`Self::get_or_create`], but bytes going the request way on a
    /// connection whose current exchange already has a response start a fresh
    /// session (keep-alive reuse). The fresh session keeps the address and TLS
    /// flag.
    pub fn for_event(
        &self,
        id: ConnectionId,
        direction: Direction,
        source: &dyn AddressSource,
        is_tls: bool,
    ) -> Option<SharedSession> {
        let session = self.get_or_create(id, source, is_tls)?;
        let reused = {
            let s = session.lock();
            match &s.active {
                Some(record) if record.read().is_reuse_boundary(direction) => {
                    Some((s.address.clone(), s.is_tls))
                }
                _ => None,
            }
        };
        let Some((address, is_tls)) = reused else {
            return Some(session);
        };

        tracing::debug!(conn = %id, "connection reused for a new exchange");
        let fresh = SharedSession::new(Session::new(id, address, is_tls));
        self.sessions.insert(id, fresh.clone());
        Some(fresh)
    }

    /// Moves the session of `old` over to `new`, e.g. when a plaintext socket
    /// gets wrapped in TLS. Buffered bytes go with it.
    pub fn move_to(&self, new: ConnectionId, old: ConnectionId) {
        self.transfer(new, old, true)
    }

    /// Same as [`Self::move_to`] without touching the TLS flag.
    pub fn relink(&self, new: ConnectionId, old: ConnectionId) {
        self.transfer(new, old, false)
    }

    fn transfer(&self, new: ConnectionId, old: ConnectionId, mark_tls: bool) {
        if let Some((_, attribution)) = self.attributions.remove(&old) {
            self.attributions.insert(new, attribution);
        }
        if self.ignored.remove(&old).is_some() {
            self.ignored.insert(new);
        }
        let Some((_, session)) = self.sessions.remove(&old) else {
            if mark_tls {
                // Nothing seen on `old` yet; whatever shows up on `new` is TLS
                tracing::debug!(%new, %old, "wrapped unknown connection");
                self.tls_hints.insert(new);
            }
            return;
        };
        {
            let mut s = session.lock();
            s.id = new;
            if mark_tls {
                s.is_tls = true;
            }
        }
        tracing::debug!(%new, %old, mark_tls, "session moved");
        self.sessions.insert(new, session);
    }

    /// Whether `id` resolved to an address on the ignore-list.
    pub fn is_ignored(&self, id: ConnectionId) -> bool {
        self.ignored.contains(&id)
    }

    pub fn mark_not_http(&self, id: ConnectionId) {
        if let Some(session) = self.get(id) {
            session.lock().mark_not_http();
        }
    }

    /// Forgets the session, e.g. because the socket was re-initialised.
    pub fn delete(&self, id: ConnectionId) {
        if self.sessions.remove(&id).is_some() {
            tracing::debug!(conn = %id, "session deleted");
        }
        self.ignored.remove(&id);
        self.tls_hints.remove(&id);
    }

    /// Forgets everything about a closed connection.
    pub fn forget(&self, id: ConnectionId) {
        self.delete(id);
        self.attributions.remove(&id);
    }

    /// Address and TLS flag of a connection, for layers above HTTP/1.
    pub fn connection_info(&self, id: ConnectionId) -> Option<(PeerAddr, bool)> {
        let Some(session) = self.get(id) else {
            return self
                .tls_hints
                .contains(&id)
                .then(|| (PeerAddr::unknown(), true));
        };
        let s = session.lock();
        Some((s.address.clone(), s.is_tls))
    }

    pub fn set_attribution(&self, id: ConnectionId, attribution: Attribution) {
        self.attributions.insert(id, attribution);
    }

    pub fn attribution(&self, id: ConnectionId) -> Attribution {
        self.attributions
            .get(&id)
            .map(|a| a.value().clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod test {
    use std::io;

    use super::*;
    use crate::{
        listener::Unaddressed,
        record::{Protocol, Record},
    };

    fn id(n: u64) -> ConnectionId {
        ConnectionId(n)
    }

    #[test]
    fn test_get_or_create() {
        let store = SessionStore::default();
        let a = store
            .get_or_create(id(1), &PeerAddr::new("h", 80), false)
            .unwrap();
        let b = store.get_or_create(id(1), &Unaddressed, true).unwrap();
        assert!(Arc::ptr_eq(&a.0, &b.0));
        assert_eq!(b.lock().address, PeerAddr::new("h", 80));
        assert!(!b.lock().is_tls);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_unresolvable_address() {
        let store = SessionStore::default();
        let closed = || -> io::Result<PeerAddr> { Err(io::ErrorKind::NotConnected.into()) };
        assert!(store.get_or_create(id(1), &closed, false).is_none());
        assert!(store.is_empty());
        // Transient: works once an address is available
        assert!(store.get_or_create(id(1), &Unaddressed, false).is_some());
    }

    #[test]
    fn test_ignored() {
        let store = SessionStore::new(IgnoreList::default().add(("127.0.0.1", 4909)));
        let ui = PeerAddr::new("127.0.0.1", 4909);
        assert!(store.get_or_create(id(1), &ui, false).is_none());
        // Stays ignored even if a later event has no address to check
        assert!(store.get_or_create(id(1), &Unaddressed, false).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_move_to() {
        let store = SessionStore::default();
        let s = store
            .get_or_create(id(1), &PeerAddr::new("h", 443), false)
            .unwrap();
        s.lock().raw.extend_from_slice(b"GET ");
        store.set_attribution(
            id(1),
            Attribution {
                tag: Some("t".into()),
                ..Default::default()
            },
        );

        store.move_to(id(2), id(1));
        assert!(store.get(id(1)).is_none());
        let moved = store.get(id(2)).unwrap();
        let moved = moved.lock();
        assert!(moved.is_tls);
        assert_eq!(moved.id, id(2));
        assert_eq!(moved.buffered(), b"GET ");
        assert_eq!(store.attribution(id(2)).tag.as_deref(), Some("t"));
    }

    #[test]
    fn test_move_unknown_is_noop() {
        let store = SessionStore::default();
        store.relink(id(2), id(1));
        assert!(store.is_empty());
        let s = store.get_or_create(id(2), &Unaddressed, false).unwrap();
        assert!(!s.lock().is_tls);
    }

    #[test]
    fn test_move_unknown_keeps_tls() {
        let store = SessionStore::default();
        store.move_to(id(2), id(1));
        assert!(store.is_empty());
        let s = store
            .get_or_create(id(2), &PeerAddr::new("example.com", 443), false)
            .unwrap();
        assert!(s.lock().is_tls);
        assert_eq!(s.lock().address, PeerAddr::new("example.com", 443));
    }

    #[test]
    fn test_relink_keeps_flag() {
        let store = SessionStore::default();
        store.get_or_create(id(1), &PeerAddr::new("h", 80), false);
        store.relink(id(2), id(1));
        let s = store.get(id(2)).unwrap();
        assert!(!s.lock().is_tls);
        assert_eq!(s.lock().id, id(2));
    }

    #[test]
    fn test_mark_not_http_and_force_new() {
        let store = SessionStore::default();
        let s = store.get_or_create(id(1), &Unaddressed, false).unwrap();
        s.lock().raw.extend_from_slice(b"\x16\x03\x01");
        store.mark_not_http(id(1));
        assert_eq!(s.lock().detected(), Detection::NotHttp);
        assert!(s.lock().buffered().is_empty());

        let fresh = store.force_new(id(1), &Unaddressed, false).unwrap();
        assert_eq!(fresh.lock().detected(), Detection::Unknown);
    }

    #[test]
    fn test_reuse_boundary() {
        let store = SessionStore::default();
        let s = store
            .for_event(id(1), Direction::Send, &PeerAddr::new("h", 80), true)
            .unwrap();
        let record = SharedRecord::new(Record::new_http1(Protocol::Http11, true, now()));
        record.write().send_data(b"GET / HTTP/1.1\r\n\r\n");
        s.lock().active = Some(record.clone());

        // More request bytes: same exchange
        let same = store
            .for_event(id(1), Direction::Send, &Unaddressed, false)
            .unwrap();
        assert!(Arc::ptr_eq(&s.0, &same.0));

        record.write().receive_data(b"HTTP/1.1 204 No Content\r\n\r\n");
        let same = store
            .for_event(id(1), Direction::Receive, &Unaddressed, false)
            .unwrap();
        assert!(Arc::ptr_eq(&s.0, &same.0));

        // Request bytes after a response: new exchange
        let fresh = store
            .for_event(id(1), Direction::Send, &Unaddressed, false)
            .unwrap();
        assert!(!Arc::ptr_eq(&s.0, &fresh.0));
        let fresh = fresh.lock();
        assert!(fresh.active().is_none());
        assert_eq!(fresh.address, PeerAddr::new("h", 80));
        assert!(fresh.is_tls);
    }
}
