// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Cookie header codec.
//!
//! Pure functions for reading a `Cookie` request header and producing
//! `Set-Cookie` values:
//!
//! ```text
//! name=urlEncodedValue; Max-Age=3600; Expires=Wed, 21 Oct 2026 07:28:00 GMT;
//! Path=/; Domain=example.com; Secure; HttpOnly; SameSite=Lax
//! ```
//!
//! Deleting a cookie is expressed as `name=; Max-Age=0; Path=/`.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;

/// `SameSite` attribute values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    /// `SameSite=Strict`
    Strict,
    /// `SameSite=Lax`
    Lax,
    /// `SameSite=None`
    None,
}

impl fmt::Display for SameSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SameSite::Strict => f.write_str("Strict"),
            SameSite::Lax => f.write_str("Lax"),
            SameSite::None => f.write_str("None"),
        }
    }
}

/// Attributes attached to a `Set-Cookie` value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CookieOptions {
    /// Lifetime in seconds.
    pub max_age: Option<i64>,
    /// Absolute expiry.
    pub expires: Option<DateTime<Utc>>,
    /// `Path` attribute.
    pub path: Option<String>,
    /// `Domain` attribute.
    pub domain: Option<String>,
    /// Emit `Secure`.
    pub secure: bool,
    /// Emit `HttpOnly`.
    pub http_only: bool,
    /// `SameSite` attribute.
    pub same_site: Option<SameSite>,
}

impl CookieOptions {
    /// Creates empty options (a session cookie without attributes).
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `Max-Age` in seconds.
    pub fn max_age(mut self, seconds: i64) -> Self {
        self.max_age = Some(seconds);
        self
    }

    /// Sets `Expires`.
    pub fn expires(mut self, at: DateTime<Utc>) -> Self {
        self.expires = Some(at);
        self
    }

    /// Sets `Path`.
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Sets `Domain`.
    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    /// Marks the cookie `Secure`.
    pub fn secure(mut self) -> Self {
        self.secure = true;
        self
    }

    /// Marks the cookie `HttpOnly`.
    pub fn http_only(mut self) -> Self {
        self.http_only = true;
        self
    }

    /// Sets `SameSite`.
    pub fn same_site(mut self, same_site: SameSite) -> Self {
        self.same_site = Some(same_site);
        self
    }
}

/// Parses a `Cookie` request header into a name/value map.
///
/// Values are percent-decoded; a value that is not valid UTF-8 after decoding
/// is kept as sent. Later duplicates win.
pub fn parse(header: &str) -> HashMap<String, String> {
    header
        .split(';')
        .filter_map(|pair| {
            let pair = pair.trim();
            if pair.is_empty() {
                return None;
            }
            let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            Some((name.to_string(), decode_value(value.trim())))
        })
        .collect()
}

/// Serializes a `Set-Cookie` header value.
pub fn serialize(name: &str, value: &str, options: &CookieOptions) -> String {
    let mut cookie = format!("{}={}", name, urlencoding::encode(value));

    if let Some(max_age) = options.max_age {
        cookie.push_str(&format!("; Max-Age={}", max_age));
    }
    if let Some(expires) = options.expires {
        cookie.push_str(&format!(
            "; Expires={}",
            expires.format("%a, %d %b %Y %H:%M:%S GMT")
        ));
    }
    if let Some(path) = &options.path {
        cookie.push_str(&format!("; Path={}", path));
    }
    if let Some(domain) = &options.domain {
        cookie.push_str(&format!("; Domain={}", domain));
    }
    if options.secure {
        cookie.push_str("; Secure");
    }
    if options.http_only {
        cookie.push_str("; HttpOnly");
    }
    if let Some(same_site) = options.same_site {
        cookie.push_str(&format!("; SameSite={}", same_site));
    }

    cookie
}

/// Serializes a `Set-Cookie` value that removes `name` from the client.
///
/// Works whether or not the cookie was ever set.
pub fn delete(name: &str) -> String {
    format!("{}=; Max-Age=0; Path=/", name)
}

fn decode_value(value: &str) -> String {
    let value = value.trim_matches('"');
    urlencoding::decode(value)
        .map(|v| v.into_owned())
        .unwrap_or_else(|_| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_header() {
        let cookies = parse("session=abc123; theme=dark; name=John%20Doe");
        assert_eq!(cookies.get("session"), Some(&"abc123".to_string()));
        assert_eq!(cookies.get("theme"), Some(&"dark".to_string()));
        assert_eq!(cookies.get("name"), Some(&"John Doe".to_string()));
    }

    #[test]
    fn test_parse_tolerates_noise() {
        let cookies = parse(" ; flag; a=1;;b= 2 ");
        assert_eq!(cookies.get("flag"), Some(&String::new()));
        assert_eq!(cookies.get("a"), Some(&"1".to_string()));
        assert_eq!(cookies.get("b"), Some(&"2".to_string()));
        assert_eq!(cookies.len(), 3);
    }

    #[test]
    fn test_parse_decodes_escaped_value() {
        let cookies = parse("access_token=tok%3Dxyz; other=1");
        assert_eq!(cookies.get("access_token"), Some(&"tok=xyz".to_string()));
        assert_eq!(cookies.get("missing"), None);
    }

    #[test]
    fn test_serialize_plain() {
        assert_eq!(serialize("a", "hello world", &CookieOptions::new()), "a=hello%20world");
    }

    #[test]
    fn test_serialize_all_attributes() {
        let expires = Utc.with_ymd_and_hms(2026, 10, 21, 7, 28, 0).unwrap();
        let options = CookieOptions::new()
            .max_age(3600)
            .expires(expires)
            .path("/")
            .domain("example.com")
            .secure()
            .http_only()
            .same_site(SameSite::Lax);

        assert_eq!(
            serialize("session", "v", &options),
            "session=v; Max-Age=3600; Expires=Wed, 21 Oct 2026 07:28:00 GMT; \
             Path=/; Domain=example.com; Secure; HttpOnly; SameSite=Lax"
        );
    }

    #[test]
    fn test_delete_unset_cookie() {
        let header = delete("never_set");
        assert_eq!(header, "never_set=; Max-Age=0; Path=/");
        assert!(http::HeaderValue::from_str(&header).is_ok());
    }
}
