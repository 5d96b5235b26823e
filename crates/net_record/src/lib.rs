// SPDX-FileCopyrightText: 2023 Jade Lovelace
//
// SPDX-License-Identifier: MPL-2.0

//! Reconstruction of HTTP exchanges from the events of an interception layer.
//!
//! HTTP/1 is reassembled from raw directional bytes per connection
//! ([`http1`]), HTTP/2 from decoded frame events per stream ([`http2`]). Both
//! produce [`record::Record`]s, which are published to a shared
//! [`records::Records`] as soon as they are detected.

pub mod chunked;
pub mod config;
pub mod cookies;
pub mod http1;
pub mod http2;
pub mod ignore;
pub mod listener;
pub mod preview;
pub mod record;
pub mod recorder;
pub mod records;
pub mod session;
pub mod stream_session;

pub use config::{RecordMode, RecorderConfig};
pub use listener::{ConnectionId, Direction, PeerAddr};
pub use record::{Exception, Header, Record, SharedRecord};
pub use recorder::Recorder;
