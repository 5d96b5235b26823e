// SPDX-FileCopyrightText: 2023 Jade Lovelace
//
// SPDX-License-Identifier: MPL-2.0

//! Display-oriented decoding of bodies: undo `Content-Encoding`, then decide
//! whether it's text we can show.

use std::io::Read;

use flate2::read::{GzDecoder, ZlibDecoder};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Preview {
    pub content_type: String,
    pub image: bool,
    /// Present if the body decodes as text in its declared charset
    pub text: Option<String>,
}

/// Undoes `Content-Encoding`. Anything we can't decode is returned untouched.
pub fn decode_content(raw: &[u8], content_encoding: &str) -> Vec<u8> {
    let mut out = Vec::new();
    let res = match content_encoding.trim().to_ascii_lowercase().as_str() {
        "gzip" | "x-gzip" => GzDecoder::new(raw).read_to_end(&mut out),
        "deflate" => ZlibDecoder::new(raw).read_to_end(&mut out),
        "br" => brotli::Decompressor::new(raw, 4096).read_to_end(&mut out),
        _ => return raw.to_vec(),
    };
    match res {
        Ok(_) => out,
        Err(err) => {
            tracing::debug!(%err, content_encoding, "could not decode body, keeping it raw");
            raw.to_vec()
        }
    }
}

fn charset(content_type: &str) -> Option<&str> {
    content_type.split(';').skip(1).find_map(|directive| {
        let (k, v) = directive.split_once('=')?;
        k.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| v.trim().trim_matches('"'))
    })
}

pub fn generate(raw: &[u8], content_type: &str, content_encoding: &str) -> Preview {
    let mut preview = Preview {
        content_type: content_type.to_owned(),
        ..Default::default()
    };

    if content_type.to_ascii_lowercase().contains("image/") {
        preview.image = true;
        return preview;
    }

    let data = decode_content(raw, content_encoding);
    preview.text = match charset(content_type) {
        None => String::from_utf8(data).ok(),
        Some(cs) if cs.eq_ignore_ascii_case("utf-8") || cs.eq_ignore_ascii_case("utf8") => {
            String::from_utf8(data).ok()
        }
        Some(cs) if cs.eq_ignore_ascii_case("us-ascii") => {
            data.is_ascii().then(|| String::from_utf8_lossy(&data).into_owned())
        }
        Some(cs)
            if ["iso-8859-1", "latin-1", "latin1"]
                .iter()
                .any(|l| cs.eq_ignore_ascii_case(l)) =>
        {
            // Every byte is the code point of the same value
            Some(data.iter().map(|&b| char::from(b)).collect())
        }
        Some(_) => Some(String::from_utf8_lossy(&data).into_owned()),
    };
    preview
}

#[cfg(test)]
mod test {
    use std::io::Write;

    use flate2::{write::GzEncoder, Compression};

    use super::*;

    #[test]
    fn test_gzip_text() {
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(b"{\"hello\": 1}").unwrap();
        let gz = enc.finish().unwrap();

        let p = generate(&gz, "application/json; charset=utf-8", "gzip");
        assert_eq!(p.text.as_deref(), Some("{\"hello\": 1}"));
        assert!(!p.image);
    }

    #[test]
    fn test_bad_gzip_is_kept() {
        assert_eq!(decode_content(b"plain", "gzip"), b"plain");
        assert_eq!(decode_content(b"plain", "identity"), b"plain");
    }

    #[test]
    fn test_image_and_binary() {
        let p = generate(b"\x89PNG", "image/png", "");
        assert!(p.image);
        assert_eq!(p.text, None);

        let p = generate(b"\xff\xfe", "application/octet-stream", "");
        assert_eq!(p.text, None);
    }

    #[test]
    fn test_latin1() {
        let p = generate(b"caf\xe9 \xa9", "text/plain; charset=ISO-8859-1", "");
        assert_eq!(p.text.as_deref(), Some("café ©"));
        let p = generate(b"\xfc", "text/plain; charset=\"latin1\"", "");
        assert_eq!(p.text.as_deref(), Some("ü"));
    }
}
