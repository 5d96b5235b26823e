// SPDX-FileCopyrightText: 2023 Jade Lovelace
//
// SPDX-License-Identifier: MPL-2.0

//! Rules for connections that should never be recorded, e.g. the inspection
//! UI's own traffic.

use std::{fmt, sync::Arc};

use crate::listener::PeerAddr;

trait ErasedMatcher: Matcher + Send + Sync + 'static {}

impl<T: Matcher + Send + Sync + 'static> ErasedMatcher for T {}

pub trait Matcher {
    fn matches(&self, addr: &PeerAddr) -> bool;
    fn as_debug(&self) -> &dyn fmt::Debug;
}

/// Any host on this port
impl Matcher for u16 {
    fn matches(&self, addr: &PeerAddr) -> bool {
        addr.port == *self
    }
    fn as_debug(&self) -> &dyn fmt::Debug {
        self
    }
}

/// Exactly this host and port
impl Matcher for PeerAddr {
    fn matches(&self, addr: &PeerAddr) -> bool {
        self.port == addr.port && self.host.eq_ignore_ascii_case(&addr.host)
    }
    fn as_debug(&self) -> &dyn fmt::Debug {
        self
    }
}

impl Matcher for (String, u16) {
    fn matches(&self, addr: &PeerAddr) -> bool {
        self.1 == addr.port && self.0.eq_ignore_ascii_case(&addr.host)
    }
    fn as_debug(&self) -> &dyn fmt::Debug {
        self
    }
}

impl Matcher for (&'static str, u16) {
    fn matches(&self, addr: &PeerAddr) -> bool {
        self.1 == addr.port && self.0.eq_ignore_ascii_case(&addr.host)
    }
    fn as_debug(&self) -> &dyn fmt::Debug {
        self
    }
}

impl<F> Matcher for F
where
    F: Fn(&PeerAddr) -> bool,
{
    fn matches(&self, addr: &PeerAddr) -> bool {
        self(addr)
    }

    fn as_debug(&self) -> &dyn fmt::Debug {
        &"(closure)"
    }
}

#[derive(Clone, Default)]
pub struct IgnoreList {
    rules: Vec<Arc<dyn ErasedMatcher>>,
}

impl IgnoreList {
    pub fn add(mut self, m: impl Matcher + Send + Sync + 'static) -> Self {
        self.push(m);
        self
    }

    pub fn push(&mut self, m: impl Matcher + Send + Sync + 'static) {
        self.rules.push(Arc::new(m));
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn is_ignored(&self, addr: &PeerAddr) -> bool {
        self.rules.iter().any(|m| {
            let hit = m.matches(addr);
            if hit {
                tracing::trace!(rule = ?m.as_debug(), ?addr, "ignore rule matched");
            }
            hit
        })
    }
}

impl fmt::Debug for IgnoreList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.rules.iter().map(|m| m.as_debug()))
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_rules() {
        let list = IgnoreList::default()
            .add(("localhost", 4909))
            .add(6830u16)
            .add(|addr: &PeerAddr| addr.host.ends_with(".internal"));

        assert!(list.is_ignored(&PeerAddr::new("LOCALHOST", 4909)));
        assert!(!list.is_ignored(&PeerAddr::new("localhost", 4910)));
        assert!(list.is_ignored(&PeerAddr::new("10.1.1.1", 6830)));
        assert!(list.is_ignored(&PeerAddr::new("db.internal", 5432)));
        assert!(!list.is_ignored(&PeerAddr::unknown()));
        assert_eq!(
            format!("{list:?}"),
            r#"[("localhost", 4909), 6830, "(closure)"]"#
        );
    }
}
