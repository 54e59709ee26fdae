//! TLS material for the shared HTTP client

use crate::error::{Result, TransportError};
use stratoform_config::Config;

/// TLS settings applied once when the pipeline's client is built.
///
/// `ca_cert`, `client_cert` and `client_key` each accept either a file path
/// or inline PEM content.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TlsSettings {
    pub ca_cert: Option<String>,
    pub client_cert: Option<String>,
    pub client_key: Option<String>,
    pub insecure: bool,
}

impl TlsSettings {
    pub fn from_config(config: &Config) -> Self {
        fn opt(value: &str) -> Option<String> {
            (!value.is_empty()).then(|| value.to_string())
        }
        Self {
            ca_cert: opt(&config.ca_cert_path),
            client_cert: opt(&config.client_cert_path),
            client_key: opt(&config.client_key_path),
            insecure: config.insecure,
        }
    }

    /// Applies the settings to a client builder.
    ///
    /// A configured CA bundle replaces the built-in roots entirely.
    pub fn apply(&self, mut builder: reqwest::ClientBuilder) -> Result<reqwest::ClientBuilder> {
        if let Some(ca) = &self.ca_cert {
            let pem = load_pem(ca, "CA certificate")?;
            let certs = reqwest::Certificate::from_pem_bundle(&pem)
                .map_err(|e| TransportError::Tls(format!("invalid CA certificate: {e}")))?;
            if certs.is_empty() {
                return Err(TransportError::Tls(
                    "CA certificate bundle contains no certificates".to_string(),
                ));
            }
            builder = builder.tls_built_in_root_certs(false);
            for cert in certs {
                builder = builder.add_root_certificate(cert);
            }
        }

        match (&self.client_cert, &self.client_key) {
            (Some(cert), Some(key)) => {
                let mut pem = load_pem(cert, "client certificate")?;
                pem.push(b'\n');
                pem.extend(load_pem(key, "client key")?);
                let identity = reqwest::Identity::from_pem(&pem)
                    .map_err(|e| TransportError::Tls(format!("invalid client identity: {e}")))?;
                builder = builder.identity(identity);
            }
            (None, None) => {}
            _ => {
                return Err(TransportError::Tls(
                    "client certificate and key must be configured together".to_string(),
                ));
            }
        }

        if self.insecure {
            builder = builder.danger_accept_invalid_certs(true);
        }
        Ok(builder)
    }
}

fn is_inline_pem(value: &str) -> bool {
    value.trim_start().starts_with("-----BEGIN")
}

fn load_pem(value: &str, what: &str) -> Result<Vec<u8>> {
    if is_inline_pem(value) {
        return Ok(value.as_bytes().to_vec());
    }
    std::fs::read(value)
        .map_err(|e| TransportError::Tls(format!("cannot read {what} {value}: {e}")))
}
