//! Log redaction
//!
//! Request and response bodies are logged with their JSON shape intact but
//! sensitive values elided. Configured secret values are additionally
//! scrubbed from any text, JSON or not.

use reqwest::header::HeaderMap;
use serde_json::Value;
use url::Url;

pub const MASK: &str = "***";

const SENSITIVE_HEADERS: &[&str] = &[
    "authorization",
    "x-auth-token",
    "x-subject-token",
    "x-security-token",
    "x-auth-key",
    "x-storage-token",
    "proxy-authorization",
];

const SENSITIVE_QUERY: &[&str] = &[
    "signature",
    "x-amz-signature",
    "x-obs-signature",
    "accesskeyid",
    "awsaccesskeyid",
    "x-obs-security-token",
    "x-amz-security-token",
];

/// Secret-aware redactor shared by the pipeline and error formatting.
#[derive(Clone, Default)]
pub struct Redactor {
    secrets: Vec<String>,
}

impl std::fmt::Debug for Redactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Redactor")
            .field("secrets", &self.secrets.len())
            .finish()
    }
}

fn is_sensitive_key(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    matches!(
        key.as_str(),
        "access" | "access_key" | "accesskey" | "ak" | "sk" | "id_token" | "credential"
    ) || key.contains("password")
        || key.contains("secret")
        || key.contains("token")
        || key.contains("signature")
}

impl Redactor {
    /// Builds a redactor that also scrubs the given literal values.
    pub fn new(secrets: impl IntoIterator<Item = String>) -> Self {
        let mut secrets: Vec<String> = secrets.into_iter().filter(|s| !s.is_empty()).collect();
        // Longest first so a secret containing another is masked whole.
        secrets.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        secrets.dedup();
        Self { secrets }
    }

    /// A copy that additionally scrubs `secrets`.
    pub fn extended(&self, secrets: impl IntoIterator<Item = String>) -> Self {
        Self::new(self.secrets.iter().cloned().chain(secrets))
    }

    /// Replaces every configured secret value in `text`.
    pub fn scrub(&self, text: &str) -> String {
        let mut out = text.to_string();
        for secret in &self.secrets {
            if out.contains(secret.as_str()) {
                out = out.replace(secret.as_str(), MASK);
            }
        }
        out
    }

    pub fn headers(&self, headers: &HeaderMap) -> Vec<(String, String)> {
        headers
            .iter()
            .map(|(name, value)| {
                let name = name.as_str().to_string();
                let value = if SENSITIVE_HEADERS.contains(&name.as_str()) {
                    MASK.to_string()
                } else {
                    self.scrub(&String::from_utf8_lossy(value.as_bytes()))
                };
                (name, value)
            })
            .collect()
    }

    pub fn url(&self, url: &Url) -> String {
        if url.query().is_none() {
            return self.scrub(url.as_str());
        }
        let mut masked = url.clone();
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| {
                let v = if SENSITIVE_QUERY.contains(&k.to_ascii_lowercase().as_str()) {
                    MASK.to_string()
                } else {
                    v.into_owned()
                };
                (k.into_owned(), v)
            })
            .collect();
        masked.query_pairs_mut().clear().extend_pairs(pairs);
        self.scrub(masked.as_str())
    }

    /// Redacts a body. JSON keeps its shape; anything else is only scrubbed.
    pub fn body(&self, body: &[u8]) -> String {
        if body.is_empty() {
            return String::new();
        }
        match serde_json::from_slice::<Value>(body) {
            Ok(mut value) => {
                mask_value(&mut value, false);
                self.scrub(&value.to_string())
            }
            Err(_) => self.scrub(&String::from_utf8_lossy(body)),
        }
    }
}

fn mask_value(value: &mut Value, inherited: bool) {
    match value {
        Value::Object(map) => {
            for (key, child) in map.iter_mut() {
                mask_value(child, inherited || is_sensitive_key(key));
            }
        }
        Value::Array(items) => {
            for item in items {
                mask_value(item, inherited);
            }
        }
        Value::String(s) if inherited => *s = MASK.to_string(),
        Value::Number(_) | Value::Bool(_) if inherited => *value = Value::String(MASK.to_string()),
        _ => {}
    }
}
