// SPDX-FileCopyrightText: 2023 Jade Lovelace
//
// SPDX-License-Identifier: MPL-2.0

//! Knobs for a recording context.

use crate::ignore::IgnoreList;

/// How much of a fresh connection we look at for a request line before
/// deciding it isn't HTTP/1.
pub const DEFAULT_DETECT_WINDOW: usize = 2048;

/// Which side of HTTP exchanges gets published.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RecordMode {
    /// Requests this process makes
    pub client: bool,
    /// Requests this process serves
    pub server: bool,
}

impl Default for RecordMode {
    fn default() -> Self {
        Self {
            client: true,
            server: false,
        }
    }
}

impl RecordMode {
    pub fn records(&self, is_client: bool) -> bool {
        if is_client {
            self.client
        } else {
            self.server
        }
    }
}

#[derive(Debug)]
pub struct RecorderConfig {
    pub ignore: IgnoreList,
    pub mode: RecordMode,
    pub detect_window: usize,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            ignore: IgnoreList::default(),
            mode: RecordMode::default(),
            detect_window: DEFAULT_DETECT_WINDOW,
        }
    }
}

impl RecorderConfig {
    pub fn with_ignore(mut self, ignore: IgnoreList) -> Self {
        self.ignore = ignore;
        self
    }

    pub fn with_mode(mut self, mode: RecordMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn record_server(mut self, server: bool) -> Self {
        self.mode.server = server;
        self
    }

    pub fn record_client(mut self, client: bool) -> Self {
        self.mode.client = client;
        self
    }
}
