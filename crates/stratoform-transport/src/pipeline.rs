//! The shared HTTP pipeline
//!
//! One [`Pipeline`] exists per provider invocation and every service client
//! sends through it. Per request it:
//!
//! 1. attaches the user agent
//! 2. signs the request when the caller supplies a [`Signer`]
//! 3. logs the redacted request and response in debug mode
//! 4. follows redirects itself, re-signing each hop
//! 5. retries retryable failures with jittered exponential back-off
//!
//! Every blocking point observes the caller's [`CancelToken`].

use crate::cancel::CancelToken;
use crate::error::{Result, TransportError};
use crate::redact::Redactor;
use crate::request::{HttpRequest, HttpResponse, error_detail};
use crate::retry::{RetryPolicy, Verdict, classify_status};
use crate::signer::Signer;
use crate::tls::TlsSettings;
use chrono::Utc;
use reqwest::Method;
use reqwest::header::{HeaderValue, LOCATION, USER_AGENT};
use std::time::Duration;
use stratoform_config::Config;
use tracing::{debug, warn};

const MAX_REDIRECTS: usize = 10;
/// Credentials that must not follow an unsigned request to another origin.
const CREDENTIAL_HEADERS: &[&str] = &["authorization", "x-auth-token", "x-security-token"];
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Everything needed to build the pipeline.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub tls: TlsSettings,
    pub user_agent: String,
    pub debug: bool,
    pub retry: RetryPolicy,
    pub secrets: Vec<String>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            tls: TlsSettings::default(),
            user_agent: user_agent(""),
            debug: false,
            retry: RetryPolicy::default(),
            secrets: Vec::new(),
        }
    }
}

impl PipelineSettings {
    pub fn from_config(config: &Config, debug: bool) -> Self {
        Self {
            tls: TlsSettings::from_config(config),
            user_agent: user_agent(&config.host_version),
            debug,
            retry: RetryPolicy::with_max_retries(config.max_retries),
            secrets: config.secrets(),
        }
    }
}

/// Version-tagged user agent, optionally naming the host engine version.
pub fn user_agent(host_version: &str) -> String {
    let base = format!("stratoform/{}", env!("CARGO_PKG_VERSION"));
    if host_version.is_empty() {
        base
    } else {
        format!("{base} host/{host_version}")
    }
}

/// Outcome of one attempt before retry classification.
enum Attempt {
    Response(HttpResponse),
    Failed(TransportError),
}

#[derive(Debug, Clone)]
pub struct Pipeline {
    client: reqwest::Client,
    user_agent: HeaderValue,
    debug: bool,
    retry: RetryPolicy,
    redactor: Redactor,
}

impl Pipeline {
    pub fn new(settings: PipelineSettings) -> Result<Self> {
        let builder = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT);
        let client = settings
            .tls
            .apply(builder)?
            .build()
            .map_err(|e| TransportError::Tls(e.to_string()))?;
        let user_agent = HeaderValue::from_str(&settings.user_agent)
            .map_err(|e| TransportError::InvalidRequest(format!("user agent: {e}")))?;

        Ok(Self {
            client,
            user_agent,
            debug: settings.debug,
            retry: settings.retry,
            redactor: Redactor::new(settings.secrets),
        })
    }

    pub fn redactor(&self) -> &Redactor {
        &self.redactor
    }

    /// Returns a pipeline whose redactor also scrubs `secrets`.
    pub fn with_extra_secrets(&self, secrets: impl IntoIterator<Item = String>) -> Self {
        let mut next = self.clone();
        next.redactor = self.redactor.extended(secrets);
        next
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Sends `request` and returns the final successful response.
    ///
    /// Responses with status 400 or above are returned as
    /// [`TransportError::Status`] once they are no longer retryable.
    pub async fn execute(
        &self,
        request: HttpRequest,
        signer: Option<&Signer>,
        cancel: &CancelToken,
    ) -> Result<HttpResponse> {
        let mut request = request;
        if !request.headers.contains_key(USER_AGENT) {
            request.headers.insert(USER_AGENT, self.user_agent.clone());
        }

        let mut attempts = 0u32;
        loop {
            attempts += 1;
            let outcome = self.follow(&request, signer, cancel).await;
            let (verdict, outcome) = match outcome {
                Ok(response) => {
                    let (code, _) = error_detail(&response.body);
                    (
                        classify_status(response.status, code.as_deref()),
                        Attempt::Response(response),
                    )
                }
                Err(e @ TransportError::Network { .. }) => (Verdict::Retry, Attempt::Failed(e)),
                Err(e) => return Err(e),
            };

            if verdict == Verdict::Retry && attempts <= self.retry.max_retries {
                let delay = self.retry.jittered_delay(attempts - 1);
                warn!(
                    method = %request.method,
                    url = %self.redactor.url(&request.url),
                    attempt = attempts,
                    delay_ms = delay.as_millis() as u64,
                    "Retrying request"
                );
                cancel.sleep(delay).await?;
                continue;
            }

            let last = match outcome {
                Attempt::Response(mut response) if response.status < 400 => {
                    response.attempts = attempts;
                    return Ok(response);
                }
                Attempt::Response(response) => self.status_error(&request.method, &response),
                Attempt::Failed(error) => error,
            };

            return Err(if verdict == Verdict::Retry {
                TransportError::Exhausted {
                    attempts,
                    last: Box::new(last),
                }
            } else {
                last
            });
        }
    }

    fn status_error(&self, method: &Method, response: &HttpResponse) -> TransportError {
        let (code, message) = error_detail(&response.body);
        TransportError::Status {
            status: response.status,
            method: method.to_string(),
            url: self.redactor.url(&response.url),
            code,
            message: self.redactor.scrub(&message),
            body: self.redactor.body(&response.body),
        }
    }

    /// One attempt: sends the request and follows any redirects.
    async fn follow(
        &self,
        request: &HttpRequest,
        signer: Option<&Signer>,
        cancel: &CancelToken,
    ) -> Result<HttpResponse> {
        let mut current = request.clone();
        for _ in 0..=MAX_REDIRECTS {
            if let Some(signer) = signer {
                signer.sign(&mut current, Utc::now())?;
            }
            let response = self.send_once(&current, cancel).await?;

            let Some(next) = redirect_target(&response) else {
                return Ok(response);
            };
            debug!(
                status = response.status,
                location = %self.redactor.url(&next),
                resign = signer.is_some(),
                "Following redirect"
            );
            if response.status == 303 {
                current.method = Method::GET;
                current.body = None;
            }
            if signer.is_none() && next.origin() != current.url.origin() {
                for name in CREDENTIAL_HEADERS {
                    current.headers.remove(*name);
                }
            }
            current.url = next;
        }
        Err(TransportError::TooManyRedirects(
            self.redactor.url(&request.url),
        ))
    }

    async fn send_once(&self, request: &HttpRequest, cancel: &CancelToken) -> Result<HttpResponse> {
        if self.debug {
            debug!(
                method = %request.method,
                url = %self.redactor.url(&request.url),
                headers = ?self.redactor.headers(&request.headers),
                body = %self.redactor.body(request.body_bytes()),
                "HTTP request"
            );
        }

        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone())
            .headers(request.headers.clone());
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = cancel
            .run(builder.send())
            .await?
            .map_err(|e| self.network_error(request, e))?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let url = response.url().clone();
        let body = cancel
            .run(response.bytes())
            .await?
            .map_err(|e| self.network_error(request, e))?
            .to_vec();

        if self.debug {
            debug!(
                status,
                url = %self.redactor.url(&url),
                headers = ?self.redactor.headers(&headers),
                body = %self.redactor.body(&body),
                "HTTP response"
            );
        }

        Ok(HttpResponse {
            status,
            url,
            headers,
            body,
            attempts: 1,
        })
    }

    fn network_error(&self, request: &HttpRequest, error: reqwest::Error) -> TransportError {
        if error.is_builder() {
            return TransportError::InvalidRequest(self.redactor.scrub(&error.to_string()));
        }
        TransportError::Network {
            url: self.redactor.url(&request.url),
            message: self.redactor.scrub(&error.to_string()),
        }
    }
}

fn redirect_target(response: &HttpResponse) -> Option<url::Url> {
    if !matches!(response.status, 301 | 302 | 303 | 307 | 308) {
        return None;
    }
    let location = response.header(LOCATION.as_str())?;
    response.url.join(location).ok()
}
