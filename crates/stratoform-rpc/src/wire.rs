//! Wire envelopes
//!
//! One JSON object per line in each direction. Responses carry the `id`
//! of the request they answer and may arrive in any order.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use stratoform_provider::ProviderError;

/// Error code for envelopes the server cannot interpret.
pub const PROTOCOL_ERROR: &str = "protocol-error";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Request {
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Response {
    pub id: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

impl Response {
    pub fn ok(id: Value, result: Value) -> Self {
        Self {
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Value, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id,
            result: None,
            error: Some(ErrorBody {
                code: code.into(),
                message: message.into(),
            }),
        }
    }

    pub fn from_provider_error(id: Value, error: &ProviderError) -> Self {
        Self {
            id,
            result: None,
            error: Some(error.into()),
        }
    }
}

impl From<&ProviderError> for ErrorBody {
    fn from(error: &ProviderError) -> Self {
        Self {
            code: error.code().to_string(),
            message: error.to_string(),
        }
    }
}

impl From<ProviderError> for ErrorBody {
    fn from(error: ProviderError) -> Self {
        (&error).into()
    }
}

impl ErrorBody {
    pub fn protocol(message: impl Into<String>) -> Self {
        Self {
            code: PROTOCOL_ERROR.to_string(),
            message: message.into(),
        }
    }
}

// Method parameters.

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ConfigureParams {
    #[serde(default)]
    pub config: Value,
    #[serde(default)]
    pub host_version: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ValidateParams {
    pub type_name: String,
    #[serde(default)]
    pub config: Value,
    /// Validates a data source configuration instead of a resource one.
    #[serde(default)]
    pub data_source: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PlanParams {
    pub type_name: String,
    #[serde(default)]
    pub prior_state: Value,
    #[serde(default)]
    pub config: Value,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApplyParams {
    pub type_name: String,
    #[serde(default)]
    pub prior_state: Value,
    #[serde(default)]
    pub planned_state: Value,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ReadParams {
    pub type_name: String,
    #[serde(default)]
    pub state: Value,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ImportParams {
    pub type_name: String,
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DataSourceParams {
    pub type_name: String,
    #[serde(default)]
    pub config: Value,
}
