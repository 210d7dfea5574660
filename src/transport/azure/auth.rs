//! Shared Key authorization for the Blob service.

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Request;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const MS_VERSION: &str = "2021-08-06";

/// Standard headers that appear, in this order, in the string to sign.
const SIGNED_STANDARD_HEADERS: [&str; 10] = [
    "content-encoding",
    "content-language",
    "content-length",
    "content-md5",
    "content-type",
    "date",
    "if-modified-since",
    "if-match",
    "if-none-match",
    "if-unmodified-since",
];

pub fn ms_date(now: DateTime<Utc>) -> String {
    now.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers.get(name).and_then(|v| v.to_str().ok()).unwrap_or("")
}

/// Build the canonical string for `request`.
pub fn string_to_sign(account: &str, request: &Request) -> String {
    let headers = request.headers();
    let mut out = String::new();
    out.push_str(request.method().as_str());
    out.push('\n');

    let body_len = request.body().and_then(|b| b.as_bytes()).map(|b| b.len()).unwrap_or(0);
    for name in SIGNED_STANDARD_HEADERS {
        if name == "content-length" {
            // Zero length is signed as the empty string.
            if body_len > 0 {
                out.push_str(&body_len.to_string());
            }
        } else {
            out.push_str(header_str(headers, name));
        }
        out.push('\n');
    }
    out.push_str(header_str(headers, "range"));
    out.push('\n');

    let mut ms_headers: Vec<(String, &str)> = headers
        .iter()
        .filter(|(name, _)| name.as_str().starts_with("x-ms-"))
        .map(|(name, value)| (name.as_str().to_ascii_lowercase(), value.to_str().unwrap_or("").trim()))
        .collect();
    ms_headers.sort();
    for (name, value) in ms_headers {
        out.push_str(&name);
        out.push(':');
        out.push_str(value);
        out.push('\n');
    }

    out.push('/');
    out.push_str(account);
    out.push_str(request.url().path());

    let mut params: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (key, value) in request.url().query_pairs() {
        params.entry(key.to_ascii_lowercase()).or_default().push(value.into_owned());
    }
    for (key, mut values) in params {
        values.sort();
        out.push('\n');
        out.push_str(&key);
        out.push(':');
        out.push_str(&values.join(","));
    }
    out
}

pub fn sign(key: &[u8], string_to_sign: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(string_to_sign.as_bytes());
    STANDARD.encode(mac.finalize().into_bytes())
}

/// Attach the `Authorization` header. The request must already carry
/// `x-ms-date` and `x-ms-version`.
pub fn authorize(account: &str, key: &[u8], request: &mut Request) {
    let canonical = string_to_sign(account, request);
    tracing::debug!(%account, canonical = %canonical.replace('\n', "\\n"), "Signing request");
    let value = format!("SharedKey {}:{}", account, sign(key, &canonical));
    if let Ok(value) = HeaderValue::from_str(&value) {
        request.headers_mut().insert(AUTHORIZATION, value);
    }
}
