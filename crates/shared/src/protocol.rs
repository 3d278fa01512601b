use std::{fmt, str::FromStr};

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    domain::{SellerProfile, User},
    error::{ApiException, ApiFailure, FailureKind, ProtocolError},
};

pub const UNAUTHORIZED_CODE: i64 = 401;
pub const SUCCESS_CODE: i64 = 200;

/// Envelope family spoken by a backend deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseConvention {
    /// `{ success: bool, message?, data? }`
    SuccessFlag,
    /// `{ code: number, message?, data? }` with 200 = ok and 401 = unauthorized.
    StatusCode,
    /// Decide per response from the fields present.
    #[default]
    Auto,
}

impl FromStr for ResponseConvention {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "success_flag" | "success" | "a" => Ok(Self::SuccessFlag),
            "status_code" | "code" | "b" => Ok(Self::StatusCode),
            "auto" => Ok(Self::Auto),
            other => Err(format!("unknown response convention '{other}'")),
        }
    }
}

impl fmt::Display for ResponseConvention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::SuccessFlag => "success_flag",
            Self::StatusCode => "status_code",
            Self::Auto => "auto",
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessFlagEnvelope {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusCodeEnvelope {
    pub code: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// The one response shape handed to callers, whatever the backend speaks.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiResponse {
    Success {
        message: Option<String>,
        data: Option<Value>,
    },
    Failure(ApiFailure),
}

impl ApiResponse {
    pub fn success(data: Option<Value>) -> Self {
        Self::Success {
            message: None,
            data,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Failure(failure) if failure.is_unauthorized())
    }

    pub fn failure(&self) -> Option<&ApiFailure> {
        match self {
            Self::Failure(failure) => Some(failure),
            Self::Success { .. } => None,
        }
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Success { message, .. } => message.as_deref(),
            Self::Failure(failure) => Some(failure.message.as_str()),
        }
    }

    pub fn data(&self) -> Option<&Value> {
        match self {
            Self::Success { data, .. } => data.as_ref(),
            Self::Failure(_) => None,
        }
    }

    /// Payload of a successful response, `Value::Null` when the backend sent none.
    pub fn into_result(self) -> Result<Value, ApiException> {
        match self {
            Self::Success { data, .. } => Ok(data.unwrap_or(Value::Null)),
            Self::Failure(failure) => Err(failure.into()),
        }
    }

    /// Decodes the payload into `T`. A payload that does not fit is reported as
    /// a transport failure: the backend answered with something unexpected.
    pub fn into_data<T: DeserializeOwned>(self) -> Result<T, ApiException> {
        let value = self.into_result()?;
        serde_json::from_value(value).map_err(|err| ApiException {
            kind: FailureKind::Transport,
            code: None,
            message: format!("unexpected response payload: {err}"),
        })
    }
}

impl ResponseConvention {
    /// Maps a raw HTTP response onto [`ApiResponse`]. Unauthorized responses come
    /// back as failures of kind [`FailureKind::Unauthorized`]; the caller owns the
    /// session side effects.
    pub fn normalize(&self, http_status: u16, body: &str) -> Result<ApiResponse, ProtocolError> {
        let value: Value = match serde_json::from_str(body) {
            Ok(value) => value,
            Err(err) => {
                if i64::from(http_status) == UNAUTHORIZED_CODE {
                    return Ok(ApiResponse::Failure(ApiFailure::unauthorized(
                        body.trim().to_string(),
                    )));
                }
                return Err(ProtocolError::InvalidJson(err.to_string()));
            }
        };
        let Value::Object(object) = value else {
            return Err(ProtocolError::NotAnObject);
        };

        match self.resolve(&object)? {
            ResponseConvention::SuccessFlag => normalize_success_flag(http_status, object),
            ResponseConvention::StatusCode => normalize_status_code(object),
            ResponseConvention::Auto => Err(ProtocolError::UnknownEnvelope),
        }
    }

    fn resolve(&self, object: &Map<String, Value>) -> Result<ResponseConvention, ProtocolError> {
        match self {
            Self::Auto => {
                if object.get("success").is_some_and(Value::is_boolean) {
                    Ok(Self::SuccessFlag)
                } else if object.get("code").is_some_and(Value::is_i64) {
                    Ok(Self::StatusCode)
                } else {
                    Err(ProtocolError::UnknownEnvelope)
                }
            }
            other => Ok(*other),
        }
    }
}

fn normalize_success_flag(
    http_status: u16,
    object: Map<String, Value>,
) -> Result<ApiResponse, ProtocolError> {
    let envelope: SuccessFlagEnvelope = serde_json::from_value(Value::Object(object))
        .map_err(|_| ProtocolError::MissingField { expected: "success" })?;

    if envelope.success {
        return Ok(ApiResponse::Success {
            message: envelope.message,
            data: envelope.data,
        });
    }

    let status = i64::from(http_status);
    if status == UNAUTHORIZED_CODE {
        return Ok(ApiResponse::Failure(ApiFailure::unauthorized(
            envelope.message.unwrap_or_default(),
        )));
    }

    let code = (!(200..300).contains(&status)).then_some(status);
    Ok(ApiResponse::Failure(ApiFailure::application(
        code,
        envelope.message.unwrap_or_default(),
    )))
}

fn normalize_status_code(object: Map<String, Value>) -> Result<ApiResponse, ProtocolError> {
    let envelope: StatusCodeEnvelope = serde_json::from_value(Value::Object(object))
        .map_err(|_| ProtocolError::MissingField { expected: "code" })?;

    match envelope.code {
        SUCCESS_CODE => Ok(ApiResponse::Success {
            message: envelope.message,
            data: envelope.data,
        }),
        UNAUTHORIZED_CODE => Ok(ApiResponse::Failure(ApiFailure::unauthorized(
            envelope.message.unwrap_or_default(),
        ))),
        code => Ok(ApiResponse::Failure(ApiFailure::application(
            Some(code),
            envelope.message.unwrap_or_default(),
        ))),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// `data` of a successful login or register call.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthPayload {
    pub token: String,
    pub user: User,
    #[serde(default, alias = "seller_profile")]
    pub seller: Option<SellerProfile>,
}

/// `data` of `GET /auth/user`.
#[derive(Debug, Clone, Deserialize)]
pub struct CurrentUserPayload {
    pub user: User,
    #[serde(default, alias = "seller_profile")]
    pub seller: Option<SellerProfile>,
}

#[cfg(test)]
#[path = "tests/protocol_tests.rs"]
mod tests;
