//! Stratoform transport
//!
//! The single HTTP round-tripper shared by every service client: TLS
//! material, AK/SK signing, redacted debug logging, retry with back-off and
//! redirect re-signing. See [`Pipeline`].

pub mod cancel;
pub mod error;
pub mod pipeline;
pub mod redact;
pub mod request;
pub mod retry;
pub mod signer;
pub mod tls;

pub use cancel::{CancelSource, CancelToken};
pub use error::{Result, TransportError};
pub use pipeline::{Pipeline, PipelineSettings, user_agent};
pub use redact::Redactor;
pub use request::{HttpRequest, HttpResponse, error_detail};
pub use retry::RetryPolicy;
pub use signer::Signer;
pub use tls::TlsSettings;

pub use reqwest::Method;
pub use url::Url;
