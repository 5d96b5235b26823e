// SPDX-FileCopyrightText: 2023 Jade Lovelace
//
// SPDX-License-Identifier: MPL-2.0

//! Formatting helpers for putting wire bytes into log lines.

use std::fmt;

/// How many bytes of a chunk [`Show::preview`] prints before eliding.
pub const PREVIEW_LEN: usize = 20;

/// Displays a binary value as an escaped ascii string.
///
/// With a limit set, only the first `limit` bytes are printed, followed by a
/// count of the elided remainder.
pub struct Show<'a> {
    bytes: &'a [u8],
    limit: Option<usize>,
}

impl<'a> Show<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, limit: None }
    }

    /// Shows at most [`PREVIEW_LEN`] bytes.
    pub fn preview(bytes: &'a [u8]) -> Self {
        Self::truncated(bytes, PREVIEW_LEN)
    }

    pub fn truncated(bytes: &'a [u8], limit: usize) -> Self {
        Self {
            bytes,
            limit: Some(limit),
        }
    }
}

impl<'a> fmt::Display for Show<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shown = match self.limit {
            Some(limit) if limit < self.bytes.len() => &self.bytes[..limit],
            _ => self.bytes,
        };

        write!(f, "\"")?;
        for &ch in shown {
            for part in std::ascii::escape_default(ch) {
                fmt::Write::write_char(f, part as char)?;
            }
        }
        write!(f, "\"")?;

        let elided = self.bytes.len() - shown.len();
        if elided > 0 {
            write!(f, "... (+{elided} bytes)")?;
        }
        Ok(())
    }
}

impl<'a> fmt::Debug for Show<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
