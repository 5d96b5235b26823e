// SPDX-FileCopyrightText: 2023 Jade Lovelace
//
// SPDX-License-Identifier: MPL-2.0

//! Drives a [`Recorder`] from a parsed event script.

use std::{collections::HashMap, sync::Arc};

use misc::Show;
use net_record::{ConnectionId, Direction, PeerAddr, Record, Recorder};
use tokio::{sync::mpsc, task::JoinSet};

use crate::{script::Event, Error};

const BODY_PREVIEW_LEN: usize = 60;

pub fn apply(rec: &Recorder, event: Event) {
    match event {
        Event::Connect {
            conn,
            host,
            port,
            tls,
        } => rec.on_connect(ConnectionId(conn), &PeerAddr::new(host, port), tls),
        Event::Wrap { conn, old, tls } => {
            rec.on_wrapped(ConnectionId(conn), ConnectionId(old), tls)
        }
        Event::Send { conn, data } => rec.on_bytes(ConnectionId(conn), Direction::Send, &data),
        Event::Recv { conn, data } => rec.on_bytes(ConnectionId(conn), Direction::Receive, &data),
        Event::Error {
            conn,
            stage,
            kind,
            message,
        } => rec.on_error(ConnectionId(conn), stage.exception(kind, &message)),
        Event::Close { conn } => rec.on_close(ConnectionId(conn)),
        Event::H2SendHeaders {
            conn,
            stream,
            headers,
        } => rec.h2_send_headers(ConnectionId(conn), stream, headers),
        Event::H2SendData { conn, stream, data } => {
            rec.h2_send_data(ConnectionId(conn), stream, &data)
        }
        Event::H2RecvHeaders {
            conn,
            stream,
            headers,
            is_client,
        } => rec.h2_on_headers(ConnectionId(conn), stream, headers, is_client),
        Event::H2RecvData {
            conn,
            stream,
            data,
            is_client,
        } => rec.h2_on_data(ConnectionId(conn), stream, &data, is_client),
    }
}

pub fn replay(rec: &Recorder, events: Vec<Event>) {
    for event in events {
        apply(rec, event);
    }
}

/// Replays each connection on its own task.
///
/// Events of one connection (and of whatever it gets wrapped into) go through
/// one channel, so they stay in order; different connections interleave
/// however the runtime likes.
pub async fn replay_parallel(rec: Arc<Recorder>, events: Vec<Event>) -> Result<(), Error> {
    let mut lanes: HashMap<u64, mpsc::UnboundedSender<Event>> = HashMap::new();
    let mut tasks = JoinSet::new();

    for event in events {
        let conn = event.conn();
        let lane = match &event {
            Event::Wrap { old, .. } => *old,
            _ => conn,
        };
        let tx = match lanes.get(&lane) {
            Some(tx) => tx.clone(),
            None => {
                let (tx, mut rx) = mpsc::unbounded_channel();
                let rec = rec.clone();
                tasks.spawn(async move {
                    while let Some(event) = rx.recv().await {
                        apply(&rec, event);
                        tokio::task::yield_now().await;
                    }
                });
                lanes.insert(lane, tx.clone());
                tx
            }
        };
        lanes.insert(conn, tx.clone());
        tx.send(event).map_err(|_| "replay task exited early")?;
    }

    drop(lanes);
    while let Some(res) = tasks.join_next().await {
        res?;
    }
    Ok(())
}

fn or_dash(s: &str) -> &str {
    if s.is_empty() {
        "-"
    } else {
        s
    }
}

/// One line per record: protocol, method, url, status, reason.
pub fn summary(record: &Record) -> String {
    let method = record.method();
    let mut line = format!(
        "{:<8} {:<7} {} {} {}",
        or_dash(record.protocol_label()),
        or_dash(&method),
        record.url(),
        record.status_code(),
        record.reason()
    );
    if record.in_progress() {
        line.push_str(" (incomplete)");
    }
    line
}

/// Short rendering of the response body for `--bodies`.
pub fn body_line(record: &Record) -> String {
    let preview = record.response.preview();
    if preview.image {
        return format!("<{}>", preview.content_type);
    }
    match preview.text {
        Some(text) => Show::truncated(text.as_bytes(), BODY_PREVIEW_LEN).to_string(),
        None => Show::truncated(&record.response.content(), BODY_PREVIEW_LEN).to_string(),
    }
}

#[cfg(test)]
mod test {
    use expect_test::expect;

    use super::*;
    use crate::script;

    const SCRIPT: &str = r#"
{"event": "connect", "conn": 1, "host": "example.com", "port": 443}
{"event": "wrap", "conn": 2, "old": 1}
{"event": "send", "conn": 2, "data": "GET /index.html HTTP/1.1\r\nHost: example.com\r\n\r\n"}
{"event": "recv", "conn": 2, "data": "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: 13\r\n\r\n<p>hello</p>\n"}
{"event": "send", "conn": 2, "data": "GET /big HTTP/1.1\r\nHost: example.com\r\n\r\n"}
{"event": "recv", "conn": 2, "data": "HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\npartial"}
{"event": "connect", "conn": 3, "host": "10.0.0.1", "port": 8080}
{"event": "error", "conn": 3, "stage": "connect", "kind": "ConnectionRefused"}
{"event": "connect", "conn": 4, "host": "example.org", "port": 443, "tls": true}
{"event": "h2_send_headers", "conn": 4, "stream": 1, "headers": [[":method", "GET"], [":scheme", "https"], [":authority", "example.org"], [":path", "/"]]}
{"event": "h2_recv_headers", "conn": 4, "stream": 1, "headers": [[":status", "204"]], "is_client": true}
"#;

    fn lines(rec: &Recorder) -> String {
        let mut out: Vec<String> = rec
            .records()
            .snapshot()
            .iter()
            .map(|r| summary(&r.read()))
            .collect();
        out.sort();
        out.join("\n")
    }

    #[test]
    fn test_replay() {
        let rec = Recorder::default();
        replay(&rec, script::parse(SCRIPT.as_bytes()).unwrap());
        expect![[r#"
            -        -       http://10.0.0.1:8080 -1 ConnectionRefused
            HTTP/1.1 GET     https://example.com/big 200 OK (incomplete)
            HTTP/1.1 GET     https://example.com/index.html 200 OK
            HTTP/2   GET     https://example.org/ 204 No Content"#]]
        .assert_eq(&lines(&rec));

        let first = rec.records().get(0).unwrap();
        expect![[r#""<p>hello</p>\n""#]].assert_eq(&body_line(&first.read()));
    }

    #[tokio::test]
    async fn test_parallel_matches_sequential() {
        let sequential = Recorder::default();
        replay(&sequential, script::parse(SCRIPT.as_bytes()).unwrap());

        let parallel = Arc::new(Recorder::default());
        replay_parallel(parallel.clone(), script::parse(SCRIPT.as_bytes()).unwrap())
            .await
            .unwrap();

        assert_eq!(lines(&sequential), lines(&parallel));
    }
}
