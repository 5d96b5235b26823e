// SPDX-FileCopyrightText: 2023 Jade Lovelace
//
// SPDX-License-Identifier: MPL-2.0

//! Decoding of `Transfer-Encoding: chunked` bodies.

/// Concatenates the chunk payloads of a chunked body.
///
/// The input may be incomplete or garbage: decoding stops quietly at the first
/// thing it can't make sense of and returns what it has so far, including a
/// partially received chunk. Callers re-run it as more bytes arrive. Trailers
/// after the terminating zero-size chunk are ignored.
pub fn decode_chunked(body: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut rest = body;

    loop {
        let (size_line_len, size) = match httparse::parse_chunk_size(rest) {
            Ok(httparse::Status::Complete(v)) => v,
            Ok(httparse::Status::Partial) => break,
            Err(err) => {
                tracing::trace!(?err, "giving up on chunked body");
                break;
            }
        };
        if size == 0 {
            break;
        }

        let data = &rest[size_line_len..];
        let size = usize::try_from(size).unwrap_or(usize::MAX);
        if data.len() < size {
            out.extend_from_slice(data);
            break;
        }
        out.extend_from_slice(&data[..size]);

        rest = match &data[size..] {
            [b'\r', b'\n', after @ ..] => after,
            _ => break,
        };
    }

    out
}
