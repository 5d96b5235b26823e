// SPDX-FileCopyrightText: 2023 Jade Lovelace
//
// SPDX-License-Identifier: MPL-2.0

//! Event scripts: one JSON object per line, each describing something an
//! interception layer would have reported.
//!
//! ```text
//! {"event": "connect", "conn": 1, "host": "example.com", "port": 80}
//! {"event": "send", "conn": 1, "data": "GET / HTTP/1.1\r\nHost: example.com\r\n\r\n"}
//! {"event": "recv", "conn": 1, "data_b64": "SFRUUC8xLjEgMjA0IE5vIENvbnRlbnQNCg0K"}
//! ```
//!
//! Blank lines and lines starting with `#` are skipped.

use std::io::{self, BufRead};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use net_record::{Exception, Header};
use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    #[error("line {line}: {source}")]
    Parse {
        line: usize,
        source: serde_json::Error,
    },
    #[error("line {line}: bad base64 payload: {source}")]
    Base64 {
        line: usize,
        source: base64::DecodeError,
    },
    #[error("line {line}: give either data or data_b64, not both")]
    AmbiguousPayload { line: usize },
    #[error("reading script: {0}")]
    Io(#[from] io::Error),
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Connect,
    Handshake,
    Read,
    Write,
}

impl Stage {
    pub fn exception(self, kind: io::ErrorKind, message: &str) -> Exception {
        let err = io::Error::new(kind, message.to_owned());
        match self {
            Stage::Connect => Exception::Connect(err),
            Stage::Handshake => Exception::Handshake(err),
            Stage::Read => Exception::Read(err),
            Stage::Write => Exception::Write(err),
        }
    }
}

/// An event exactly as written in the script.
#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum RawEvent {
    Connect {
        conn: u64,
        #[serde(default)]
        host: String,
        #[serde(default)]
        port: u16,
        #[serde(default)]
        tls: bool,
    },
    Wrap {
        conn: u64,
        old: u64,
        #[serde(default = "yes")]
        tls: bool,
    },
    Send {
        conn: u64,
        data: Option<String>,
        data_b64: Option<String>,
    },
    Recv {
        conn: u64,
        data: Option<String>,
        data_b64: Option<String>,
    },
    Error {
        conn: u64,
        stage: Stage,
        kind: String,
        #[serde(default)]
        message: Option<String>,
    },
    Close {
        conn: u64,
    },
    H2SendHeaders {
        conn: u64,
        stream: u32,
        headers: Vec<(String, String)>,
    },
    H2SendData {
        conn: u64,
        stream: u32,
        data: Option<String>,
        data_b64: Option<String>,
    },
    H2RecvHeaders {
        conn: u64,
        stream: u32,
        headers: Vec<(String, String)>,
        #[serde(default)]
        is_client: bool,
    },
    H2RecvData {
        conn: u64,
        stream: u32,
        data: Option<String>,
        data_b64: Option<String>,
        #[serde(default)]
        is_client: bool,
    },
}

fn yes() -> bool {
    true
}

/// A script event with its payload decoded.
#[derive(Debug, PartialEq)]
pub enum Event {
    Connect {
        conn: u64,
        host: String,
        port: u16,
        tls: bool,
    },
    Wrap {
        conn: u64,
        old: u64,
        tls: bool,
    },
    Send {
        conn: u64,
        data: Vec<u8>,
    },
    Recv {
        conn: u64,
        data: Vec<u8>,
    },
    Error {
        conn: u64,
        stage: Stage,
        kind: io::ErrorKind,
        message: String,
    },
    Close {
        conn: u64,
    },
    H2SendHeaders {
        conn: u64,
        stream: u32,
        headers: Vec<Header>,
    },
    H2SendData {
        conn: u64,
        stream: u32,
        data: Vec<u8>,
    },
    H2RecvHeaders {
        conn: u64,
        stream: u32,
        headers: Vec<Header>,
        is_client: bool,
    },
    H2RecvData {
        conn: u64,
        stream: u32,
        data: Vec<u8>,
        is_client: bool,
    },
}

impl Event {
    /// The connection whose ordering this event is part of.
    pub fn conn(&self) -> u64 {
        match self {
            Event::Connect { conn, .. }
            | Event::Wrap { conn, .. }
            | Event::Send { conn, .. }
            | Event::Recv { conn, .. }
            | Event::Error { conn, .. }
            | Event::Close { conn }
            | Event::H2SendHeaders { conn, .. }
            | Event::H2SendData { conn, .. }
            | Event::H2RecvHeaders { conn, .. }
            | Event::H2RecvData { conn, .. } => *conn,
        }
    }
}

fn payload(
    line: usize,
    data: Option<String>,
    data_b64: Option<String>,
) -> Result<Vec<u8>, ScriptError> {
    match (data, data_b64) {
        (Some(_), Some(_)) => Err(ScriptError::AmbiguousPayload { line }),
        (Some(text), None) => Ok(text.into_bytes()),
        (None, Some(b64)) => BASE64
            .decode(b64.trim())
            .map_err(|source| ScriptError::Base64 { line, source }),
        (None, None) => Ok(Vec::new()),
    }
}

fn headers(pairs: Vec<(String, String)>) -> Vec<Header> {
    pairs.into_iter().map(Header::from).collect()
}

fn error_kind(name: &str) -> io::ErrorKind {
    use io::ErrorKind::*;
    match name {
        "ConnectionRefused" => ConnectionRefused,
        "ConnectionReset" => ConnectionReset,
        "ConnectionAborted" => ConnectionAborted,
        "NotConnected" => NotConnected,
        "AddrNotAvailable" => AddrNotAvailable,
        "BrokenPipe" => BrokenPipe,
        "TimedOut" => TimedOut,
        "UnexpectedEof" => UnexpectedEof,
        "InvalidData" => InvalidData,
        "PermissionDenied" => PermissionDenied,
        _ => Other,
    }
}

fn decode(line: usize, raw: RawEvent) -> Result<Event, ScriptError> {
    Ok(match raw {
        RawEvent::Connect {
            conn,
            host,
            port,
            tls,
        } => Event::Connect {
            conn,
            host,
            port,
            tls,
        },
        RawEvent::Wrap { conn, old, tls } => Event::Wrap { conn, old, tls },
        RawEvent::Send {
            conn,
            data,
            data_b64,
        } => Event::Send {
            conn,
            data: payload(line, data, data_b64)?,
        },
        RawEvent::Recv {
            conn,
            data,
            data_b64,
        } => Event::Recv {
            conn,
            data: payload(line, data, data_b64)?,
        },
        RawEvent::Error {
            conn,
            stage,
            kind,
            message,
        } => Event::Error {
            conn,
            stage,
            kind: error_kind(&kind),
            message: message.unwrap_or(kind),
        },
        RawEvent::Close { conn } => Event::Close { conn },
        RawEvent::H2SendHeaders {
            conn,
            stream,
            headers: h,
        } => Event::H2SendHeaders {
            conn,
            stream,
            headers: headers(h),
        },
        RawEvent::H2SendData {
            conn,
            stream,
            data,
            data_b64,
        } => Event::H2SendData {
            conn,
            stream,
            data: payload(line, data, data_b64)?,
        },
        RawEvent::H2RecvHeaders {
            conn,
            stream,
            headers: h,
            is_client,
        } => Event::H2RecvHeaders {
            conn,
            stream,
            headers: headers(h),
            is_client,
        },
        RawEvent::H2RecvData {
            conn,
            stream,
            data,
            data_b64,
            is_client,
        } => Event::H2RecvData {
            conn,
            stream,
            data: payload(line, data, data_b64)?,
            is_client,
        },
    })
}

/// Parses a whole script. Line numbers in errors start at 1.
pub fn parse(reader: impl BufRead) -> Result<Vec<Event>, ScriptError> {
    let mut events = Vec::new();
    for (idx, text) in reader.lines().enumerate() {
        let text = text?;
        let line = idx + 1;
        let trimmed = text.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let raw: RawEvent =
            serde_json::from_str(trimmed).map_err(|source| ScriptError::Parse { line, source })?;
        events.push(decode(line, raw)?);
    }
    Ok(events)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse() {
        let script = r#"
# a comment
{"event": "connect", "conn": 1, "host": "h", "port": 80}
{"event": "send", "conn": 1, "data": "GET / HTTP/1.1\r\n\r\n"}
{"event": "recv", "conn": 1, "data_b64": "b2s="}
{"event": "wrap", "conn": 2, "old": 1}
{"event": "error", "conn": 2, "stage": "read", "kind": "ConnectionReset"}
{"event": "h2_recv_headers", "conn": 3, "stream": 1, "headers": [[":status", "200"]], "is_client": true}
"#;
        let events = parse(script.as_bytes()).unwrap();
        assert_eq!(
            events,
            vec![
                Event::Connect {
                    conn: 1,
                    host: "h".into(),
                    port: 80,
                    tls: false
                },
                Event::Send {
                    conn: 1,
                    data: b"GET / HTTP/1.1\r\n\r\n".to_vec()
                },
                Event::Recv {
                    conn: 1,
                    data: b"ok".to_vec()
                },
                Event::Wrap {
                    conn: 2,
                    old: 1,
                    tls: true
                },
                Event::Error {
                    conn: 2,
                    stage: Stage::Read,
                    kind: io::ErrorKind::ConnectionReset,
                    message: "ConnectionReset".into()
                },
                Event::H2RecvHeaders {
                    conn: 3,
                    stream: 1,
                    headers: vec![Header::new(":status", "200")],
                    is_client: true
                },
            ]
        );
    }

    #[test]
    fn test_errors_carry_line() {
        let script = "{\"event\": \"close\", \"conn\": 1}\n\n{\"event\": \"nope\"}\n";
        let err = parse(script.as_bytes()).unwrap_err();
        assert!(matches!(err, ScriptError::Parse { line: 3, .. }), "{err}");
        assert!(err.to_string().starts_with("line 3: "));

        let script = r#"{"event": "send", "conn": 1, "data": "a", "data_b64": "YQ=="}"#;
        assert!(matches!(
            parse(script.as_bytes()),
            Err(ScriptError::AmbiguousPayload { line: 1 })
        ));

        let script = r#"{"event": "send", "conn": 1, "data_b64": "!!"}"#;
        assert!(matches!(
            parse(script.as_bytes()),
            Err(ScriptError::Base64 { line: 1, .. })
        ));
    }
}
