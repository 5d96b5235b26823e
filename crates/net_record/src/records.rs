// SPDX-FileCopyrightText: 2023 Jade Lovelace
//
// SPDX-License-Identifier: MPL-2.0

//! The externally visible collection of records.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, PoisonError, RwLock,
};

use dashmap::DashMap;

use crate::{
    listener::RecordListener,
    record::{RecordId, SharedRecord},
};

/// Records keyed by id, remembering the order they were first seen in.
///
/// Records are inserted when first detected, not when complete, so readers
/// see in-progress exchanges too.
#[derive(Default)]
pub struct Records {
    by_id: DashMap<RecordId, SharedRecord>,
    order: RwLock<Vec<RecordId>>,
    already_read: AtomicUsize,
    listeners: RwLock<Vec<Arc<dyn RecordListener>>>,
}

impl Records {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an observer for newly published records.
    pub fn subscribe(&self, listener: Arc<dyn RecordListener>) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    pub fn insert(&self, record: SharedRecord) {
        let id = record.id();
        {
            let mut order = self.order.write().unwrap_or_else(PoisonError::into_inner);
            if self.by_id.insert(id, record.clone()).is_some() {
                return;
            }
            order.push(id);
        }
        tracing::debug!(%id, "record published");

        let listeners = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for listener in listeners {
            listener.on_record(&record);
        }
    }

    pub fn len(&self) -> usize {
        self.order.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The `index`th record in publication order.
    pub fn get(&self, index: usize) -> Option<SharedRecord> {
        let id = *self
            .order
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(index)?;
        self.by_id(id)
    }

    pub fn by_id(&self, id: RecordId) -> Option<SharedRecord> {
        self.by_id.get(&id).map(|r| r.value().clone())
    }

    /// All records in publication order.
    pub fn snapshot(&self) -> Vec<SharedRecord> {
        let order = self.order.read().unwrap_or_else(PoisonError::into_inner);
        order.iter().filter_map(|id| self.by_id(*id)).collect()
    }

    /// Number of records published since the last [`Self::mark_read`].
    pub fn unread(&self) -> usize {
        self.len()
            .saturating_sub(self.already_read.load(Ordering::Acquire))
    }

    pub fn mark_read(&self) {
        self.already_read.store(self.len(), Ordering::Release);
    }

    /// Drops every record. Sessions still holding one keep filling it in, it
    /// just isn't visible any more.
    pub fn reset(&self) {
        let mut order = self.order.write().unwrap_or_else(PoisonError::into_inner);
        self.by_id.clear();
        order.clear();
        self.already_read.store(0, Ordering::Release);
    }
}

impl std::fmt::Debug for Records {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Records")
            .field("len", &self.len())
            .field("unread", &self.unread())
            .finish()
    }
}

#[cfg(test)]
mod test {
    use std::sync::Mutex;

    use super::*;
    use crate::{
        listener::now,
        record::{Protocol, Record},
    };

    fn record() -> SharedRecord {
        SharedRecord::new(Record::new_http1(Protocol::Http11, true, now()))
    }

    #[test]
    fn test_order_and_lookup() {
        let records = Records::new();
        let (a, b) = (record(), record());
        records.insert(a.clone());
        records.insert(b.clone());
        records.insert(a.clone());

        assert_eq!(records.len(), 2);
        assert!(records.get(0).unwrap().ptr_eq(&a));
        assert!(records.get(1).unwrap().ptr_eq(&b));
        assert!(records.get(2).is_none());
        assert!(records.by_id(b.id()).unwrap().ptr_eq(&b));

        let ids: Vec<_> = records.snapshot().iter().map(|r| r.id()).collect();
        assert_eq!(ids, vec![a.id(), b.id()]);
    }

    #[test]
    fn test_unread() {
        let records = Records::new();
        records.insert(record());
        assert_eq!(records.unread(), 1);
        records.mark_read();
        assert_eq!(records.unread(), 0);
        records.insert(record());
        assert_eq!(records.unread(), 1);

        records.reset();
        assert!(records.is_empty());
        assert_eq!(records.unread(), 0);
    }

    #[test]
    fn test_listener() {
        let records = Records::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        records.subscribe(Arc::new(move |r: &SharedRecord| {
            sink.lock().unwrap().push(r.id())
        }));

        let r = record();
        records.insert(r.clone());
        records.insert(r.clone());
        assert_eq!(*seen.lock().unwrap(), vec![r.id()]);
    }
}
