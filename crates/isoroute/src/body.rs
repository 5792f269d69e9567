// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Request body decoding by content type.

use serde_json::{Map, Value as JsonValue};

/// Decodes a JSON, urlencoded or multipart body into a JSON value.
///
/// Unknown content types are tried as JSON. Returns `None` when nothing
/// could be decoded. Multipart file parts are skipped.
pub fn parse_structured_body(body: &[u8], content_type: Option<&str>) -> Option<JsonValue> {
    let content_type = content_type.unwrap_or("");

    if content_type.contains("application/x-www-form-urlencoded") {
        return Some(parse_form_urlencoded(body));
    }
    if content_type.contains("multipart/form-data") {
        return parse_multipart(body, content_type);
    }
    serde_json::from_slice(body).ok()
}

fn parse_form_urlencoded(bytes: &[u8]) -> JsonValue {
    let fields: Map<String, JsonValue> = form_urlencoded::parse(bytes)
        .map(|(k, v)| (k.into_owned(), JsonValue::String(v.into_owned())))
        .collect();
    JsonValue::Object(fields)
}

fn parse_multipart(bytes: &[u8], content_type: &str) -> Option<JsonValue> {
    let boundary = content_type
        .split(';')
        .find_map(|s| s.trim().strip_prefix("boundary="))?
        .trim_matches('"');
    let delimiter = format!("--{}", boundary);

    let text = String::from_utf8_lossy(bytes);
    let mut fields = Map::new();

    for part in text.split(delimiter.as_str()) {
        if part.trim().is_empty() || part.starts_with("--") {
            continue;
        }
        let Some((headers, content)) = part.split_once("\r\n\r\n") else {
            continue;
        };
        if headers.contains("filename=") {
            continue;
        }
        if let Some(name) = field_name(headers) {
            let content = content.trim_end_matches("\r\n");
            fields.insert(name.to_string(), JsonValue::String(content.to_string()));
        }
    }

    Some(JsonValue::Object(fields))
}

fn field_name(headers: &str) -> Option<&str> {
    headers
        .lines()
        .find(|line| line.to_ascii_lowercase().starts_with("content-disposition:"))?
        .split(';')
        .find_map(|s| s.trim().strip_prefix("name="))
        .map(|name| name.trim_matches('"'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_body() {
        let parsed = parse_structured_body(br#"{"a":1}"#, Some("application/json"));
        assert_eq!(parsed, Some(json!({ "a": 1 })));
    }

    #[test]
    fn test_urlencoded_body() {
        let parsed = parse_structured_body(
            b"name=Ada+Lovelace&lang=en",
            Some("application/x-www-form-urlencoded"),
        );
        assert_eq!(parsed, Some(json!({ "name": "Ada Lovelace", "lang": "en" })));
    }

    #[test]
    fn test_multipart_skips_files() {
        let body = "--xyz\r\nContent-Disposition: form-data; name=\"title\"\r\n\r\nHello\r\n\
                    --xyz\r\nContent-Disposition: form-data; name=\"file\"; filename=\"a.txt\"\r\n\r\ndata\r\n\
                    --xyz--\r\n";
        let parsed = parse_structured_body(body.as_bytes(), Some("multipart/form-data; boundary=xyz"));
        assert_eq!(parsed, Some(json!({ "title": "Hello" })));
    }

    #[test]
    fn test_unknown_body() {
        assert_eq!(parse_structured_body(b"plain words", Some("text/plain")), None);
    }
}
