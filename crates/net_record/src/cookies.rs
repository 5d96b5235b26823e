// SPDX-FileCopyrightText: 2023 Jade Lovelace
//
// SPDX-License-Identifier: MPL-2.0

//! Cookie extraction from `Cookie` and `Set-Cookie` headers.

use http::header::{COOKIE, SET_COOKIE};

use crate::record::Header;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CookieAttribute {
    pub name: String,
    /// Flags such as `Secure` have no value
    pub value: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub attributes: Vec<CookieAttribute>,
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

fn split_pair(pair: &str) -> Option<(&str, &str)> {
    let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
    let name = name.trim();
    if name.is_empty() {
        None
    } else {
        Some((name, unquote(value.trim())))
    }
}

/// Cookies sent by the client, in header order.
pub fn request_cookies(headers: &[Header]) -> Vec<Cookie> {
    headers
        .iter()
        .filter(|h| h.name.eq_ignore_ascii_case(COOKIE.as_str()))
        .flat_map(|h| h.value.split(';'))
        .filter_map(split_pair)
        .map(|(name, value)| Cookie {
            name: name.to_owned(),
            value: value.to_owned(),
            attributes: Vec::new(),
        })
        .collect()
}

/// Canonical spelling of the attributes we report; anything else is dropped.
fn known_attribute(name: &str) -> Option<&'static str> {
    const KNOWN: [&str; 8] = [
        "expires", "path", "comment", "domain", "max-age", "SameSite", "Secure", "HttpOnly",
    ];
    KNOWN
        .into_iter()
        .find(|known| known.eq_ignore_ascii_case(name))
}

/// Cookies set by the server, one per `Set-Cookie` header.
pub fn response_cookies(headers: &[Header]) -> Vec<Cookie> {
    headers
        .iter()
        .filter(|h| h.name.eq_ignore_ascii_case(SET_COOKIE.as_str()))
        .filter_map(|h| {
            let mut parts = h.value.split(';');
            let (name, value) = split_pair(parts.next()?)?;
            let attributes = parts
                .filter_map(|part| {
                    let (attr, value) = part.split_once('=').unwrap_or((part, ""));
                    let name = known_attribute(attr.trim())?;
                    let value = value.trim();
                    Some(CookieAttribute {
                        name: name.to_owned(),
                        value: (!value.is_empty()).then(|| value.to_owned()),
                    })
                })
                .collect();
            Some(Cookie {
                name: name.to_owned(),
                value: value.to_owned(),
                attributes,
            })
        })
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_request_cookies() {
        let headers = [
            Header::new("cookie", "a=1; b=\"two\""),
            Header::new("Accept", "*/*"),
            Header::new("Cookie", "c=3;;=bad"),
        ];
        let names: Vec<_> = request_cookies(&headers)
            .into_iter()
            .map(|c| (c.name, c.value))
            .collect();
        assert_eq!(
            names,
            vec![
                ("a".to_owned(), "1".to_owned()),
                ("b".to_owned(), "two".to_owned()),
                ("c".to_owned(), "3".to_owned()),
            ]
        );
    }

    #[test]
    fn test_response_cookies() {
        let headers = [Header::new(
            "Set-Cookie",
            "session=abc; Path=/; secure; HttpOnly; samesite=Lax; Priority=High",
        )];
        let cookies = response_cookies(&headers);
        assert_eq!(cookies.len(), 1);
        assert_eq!(cookies[0].name, "session");
        assert_eq!(cookies[0].value, "abc");
        assert_eq!(
            cookies[0].attributes,
            vec![
                CookieAttribute {
                    name: "path".into(),
                    value: Some("/".into())
                },
                CookieAttribute {
                    name: "Secure".into(),
                    value: None
                },
                CookieAttribute {
                    name: "HttpOnly".into(),
                    value: None
                },
                CookieAttribute {
                    name: "SameSite".into(),
                    value: Some("Lax".into())
                },
            ]
        );
    }
}
