//! AK/SK request signing (`SDK-HMAC-SHA256`)
//!
//! The canonical request is
//!
//! ```text
//! METHOD\nCANONICAL_URI\nCANONICAL_QUERY\nCANONICAL_HEADERS\nSIGNED_HEADERS\nHEX(SHA256(body))
//! ```
//!
//! and the signature is `HEX(HMAC-SHA256(secret_key, string_to_sign))`.

use crate::error::{Result, TransportError};
use crate::request::HttpRequest;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::header::{AUTHORIZATION, HeaderName, HeaderValue};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

pub const ALGORITHM: &str = "SDK-HMAC-SHA256";
pub const DATE_HEADER: &str = "x-sdk-date";
pub const SECURITY_TOKEN_HEADER: &str = "x-security-token";
const DATE_FORMAT: &str = "%Y%m%dT%H%M%SZ";

type HmacSha256 = Hmac<Sha256>;

/// Access/secret key material used to sign every request of a client.
#[derive(Clone, PartialEq, Eq)]
pub struct Signer {
    access_key: String,
    secret_key: String,
    security_token: Option<String>,
}

impl fmt::Debug for Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signer")
            .field("temporary", &self.security_token.is_some())
            .finish_non_exhaustive()
    }
}

impl Signer {
    pub fn new(
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
        security_token: Option<String>,
    ) -> Self {
        Self {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
            security_token,
        }
    }

    pub fn access_key(&self) -> &str {
        &self.access_key
    }

    /// Values the redactor must scrub.
    pub fn secrets(&self) -> Vec<String> {
        let mut out = vec![self.access_key.clone(), self.secret_key.clone()];
        out.extend(self.security_token.clone());
        out
    }

    /// Signs `request` in place, replacing any earlier signature.
    pub fn sign(&self, request: &mut HttpRequest, now: DateTime<Utc>) -> Result<()> {
        let date = now.format(DATE_FORMAT).to_string();
        insert(request, DATE_HEADER, &date)?;
        if let Some(token) = &self.security_token {
            insert(request, SECURITY_TOKEN_HEADER, token)?;
        }
        request.headers.remove(AUTHORIZATION);

        let headers = canonical_header_map(request);
        let signed_headers = headers.keys().cloned().collect::<Vec<_>>().join(";");
        let canonical = canonical_request(request, &headers, &signed_headers);
        let string_to_sign = format!(
            "{ALGORITHM}\n{date}\n{}",
            hex::encode(Sha256::digest(canonical.as_bytes()))
        );

        let mut mac = HmacSha256::new_from_slice(self.secret_key.as_bytes())
            .map_err(|e| TransportError::InvalidRequest(format!("signing key: {e}")))?;
        mac.update(string_to_sign.as_bytes());
        let signature = hex::encode(mac.finalize().into_bytes());

        let authorization = format!(
            "{ALGORITHM} Access={}, SignedHeaders={signed_headers}, Signature={signature}",
            self.access_key
        );
        let value = HeaderValue::from_str(&authorization)
            .map_err(|e| TransportError::InvalidRequest(format!("authorization header: {e}")))?;
        request.headers.insert(AUTHORIZATION, value);
        Ok(())
    }
}

fn insert(request: &mut HttpRequest, name: &'static str, value: &str) -> Result<()> {
    let value = HeaderValue::from_str(value)
        .map_err(|e| TransportError::InvalidRequest(format!("header {name}: {e}")))?;
    request
        .headers
        .insert(HeaderName::from_static(name), value);
    Ok(())
}

fn host_of(url: &url::Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    }
}

fn canonical_header_map(request: &HttpRequest) -> BTreeMap<String, String> {
    let mut headers = BTreeMap::new();
    for (name, value) in &request.headers {
        if let Ok(value) = value.to_str() {
            headers.insert(name.as_str().to_string(), value.trim().to_string());
        }
    }
    headers
        .entry("host".to_string())
        .or_insert_with(|| host_of(&request.url));
    headers
}

fn canonical_request(
    request: &HttpRequest,
    headers: &BTreeMap<String, String>,
    signed_headers: &str,
) -> String {
    let mut uri = request
        .url
        .path_segments()
        .map(|segments| {
            segments
                .map(|s| escape(&percent_decode(s)))
                .collect::<Vec<_>>()
                .join("/")
        })
        .unwrap_or_default();
    if !uri.starts_with('/') {
        uri.insert(0, '/');
    }
    if !uri.ends_with('/') {
        uri.push('/');
    }

    let mut query: Vec<(String, String)> = request
        .url
        .query_pairs()
        .map(|(k, v)| (escape(&k), escape(&v)))
        .collect();
    query.sort();
    let query = query
        .into_iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");

    let canonical_headers: String = headers
        .iter()
        .map(|(k, v)| format!("{k}:{v}\n"))
        .collect();

    format!(
        "{}\n{uri}\n{query}\n{canonical_headers}\n{signed_headers}\n{}",
        request.method.as_str(),
        hex::encode(Sha256::digest(request.body_bytes()))
    )
}

/// RFC 3986 escaping of everything except unreserved characters.
fn escape(input: &str) -> String {
    urlencoding::encode(input).into_owned()
}

/// Invalid escapes are kept as they are; invalid UTF-8 is replaced.
fn percent_decode(input: &str) -> String {
    let bytes = urlencoding::decode_binary(input.as_bytes());
    String::from_utf8_lossy(&bytes).into_owned()
}
