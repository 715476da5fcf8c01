//! API error types for the campaigns service

use std::fmt;

/// Errors that can occur when talking to the campaigns API
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// 401 Unauthorized - token invalid or expired
    Unauthorized { endpoint: String },
    /// 403 Forbidden - role lacks permission for the action
    Forbidden { endpoint: String, message: String },
    /// 404 Not Found
    NotFound { endpoint: String },
    /// 400 Bad Request - includes status refusals ("Cannot approve ...")
    BadRequest { endpoint: String, message: String },
    /// 409 Conflict
    Conflict { endpoint: String, message: String },
    /// 429 Rate Limited
    RateLimited {
        endpoint: String,
        retry_after_secs: Option<u64>,
    },
    /// Network or timeout error
    NetworkError { endpoint: String, message: String },
    /// Response body did not match the expected shape
    DecodeError { endpoint: String, message: String },
    /// Other HTTP errors
    HttpError {
        endpoint: String,
        status: u16,
        message: String,
    },
}

impl ApiError {
    /// Check if this is an authentication error (401 or 403)
    pub fn is_auth_error(&self) -> bool {
        matches!(
            self,
            ApiError::Unauthorized { .. } | ApiError::Forbidden { .. }
        )
    }

    /// Check if the server refused a transition for the campaign's current state
    pub fn is_status_refusal(&self) -> bool {
        matches!(
            self,
            ApiError::BadRequest { .. } | ApiError::Conflict { .. }
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::NotFound { .. })
    }

    /// Get the endpoint that failed
    pub fn endpoint(&self) -> &str {
        match self {
            ApiError::Unauthorized { endpoint } => endpoint,
            ApiError::Forbidden { endpoint, .. } => endpoint,
            ApiError::NotFound { endpoint } => endpoint,
            ApiError::BadRequest { endpoint, .. } => endpoint,
            ApiError::Conflict { endpoint, .. } => endpoint,
            ApiError::RateLimited { endpoint, .. } => endpoint,
            ApiError::NetworkError { endpoint, .. } => endpoint,
            ApiError::DecodeError { endpoint, .. } => endpoint,
            ApiError::HttpError { endpoint, .. } => endpoint,
        }
    }

    /// Get retry-after seconds if rate limited
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            ApiError::RateLimited {
                retry_after_secs, ..
            } => *retry_after_secs,
            _ => None,
        }
    }

    pub fn unauthorized(endpoint: impl Into<String>) -> Self {
        ApiError::Unauthorized {
            endpoint: endpoint.into(),
        }
    }

    pub fn forbidden(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        ApiError::Forbidden {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    pub fn not_found(endpoint: impl Into<String>) -> Self {
        ApiError::NotFound {
            endpoint: endpoint.into(),
        }
    }

    pub fn bad_request(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        ApiError::BadRequest {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    pub fn conflict(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        ApiError::Conflict {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    pub fn rate_limited(endpoint: impl Into<String>, retry_after: Option<u64>) -> Self {
        ApiError::RateLimited {
            endpoint: endpoint.into(),
            retry_after_secs: retry_after,
        }
    }

    pub fn network(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        ApiError::NetworkError {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    pub fn decode(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        ApiError::DecodeError {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    pub fn http(endpoint: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        ApiError::HttpError {
            endpoint: endpoint.into(),
            status,
            message: message.into(),
        }
    }

    /// Map a non-success status and its body to an error
    pub fn from_status(
        endpoint: impl Into<String>,
        status: u16,
        body: &str,
        retry_after: Option<u64>,
    ) -> Self {
        let endpoint = endpoint.into();
        let message = error_message(body);
        match status {
            400 => ApiError::bad_request(endpoint, message),
            401 => ApiError::unauthorized(endpoint),
            403 => ApiError::forbidden(endpoint, message),
            404 => ApiError::not_found(endpoint),
            409 => ApiError::conflict(endpoint, message),
            429 => ApiError::rate_limited(endpoint, retry_after),
            _ => ApiError::http(endpoint, status, message),
        }
    }
}

/// Extract a readable message from a DRF error body.
///
/// Handles `{"error": ".."}`, `{"detail": ".."}` and field maps such as
/// `{"comments": ["This field is required."]}`.
pub fn error_message(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else {
        return body.trim().chars().take(200).collect();
    };

    if let Some(object) = value.as_object() {
        for key in ["error", "detail"] {
            if let Some(message) = object.get(key).and_then(|v| v.as_str()) {
                return message.to_string();
            }
        }
        let fields: Vec<String> = object
            .iter()
            .map(|(field, reasons)| {
                let reasons = match reasons {
                    serde_json::Value::Array(items) => items
                        .iter()
                        .map(|item| item.as_str().map_or_else(|| item.to_string(), String::from))
                        .collect::<Vec<_>>()
                        .join(" "),
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                format!("{field}: {reasons}")
            })
            .collect();
        if !fields.is_empty() {
            return fields.join("; ");
        }
    }
    value.to_string()
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Unauthorized { endpoint } => {
                write!(f, "{}: Unauthorized (401) - sign in again", endpoint)
            }
            ApiError::Forbidden { endpoint, message } => {
                write!(f, "{}: Forbidden (403) - {}", endpoint, message)
            }
            ApiError::NotFound { endpoint } => write!(f, "{}: Not found (404)", endpoint),
            ApiError::BadRequest { endpoint, message } => {
                write!(f, "{}: {}", endpoint, message)
            }
            ApiError::Conflict { endpoint, message } => {
                write!(f, "{}: Conflict (409) - {}", endpoint, message)
            }
            ApiError::RateLimited {
                endpoint,
                retry_after_secs,
            } => {
                if let Some(secs) = retry_after_secs {
                    write!(f, "{}: Rate limited - retry after {}s", endpoint, secs)
                } else {
                    write!(f, "{}: Rate limited", endpoint)
                }
            }
            ApiError::NetworkError { endpoint, message } => {
                write!(f, "{}: Network error - {}", endpoint, message)
            }
            ApiError::DecodeError { endpoint, message } => {
                write!(f, "{}: Unexpected response - {}", endpoint, message)
            }
            ApiError::HttpError {
                endpoint,
                status,
                message,
            } => {
                write!(f, "{}: HTTP {} - {}", endpoint, status, message)
            }
        }
    }
}

impl std::error::Error for ApiError {}
