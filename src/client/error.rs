use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

/// Errors surfaced by the API client.
///
/// `Clone` so one refresh result can be handed to every caller waiting on it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// Login was refused.
    #[error("Invalid username or password")]
    InvalidCredentials,

    /// The refresh token was refused; the stored session has been cleared.
    #[error("Session expired, please log in again")]
    ReauthenticationRequired,

    /// The server still answered 401 after a successful refresh.
    #[error("Request unauthorized")]
    Unauthorized,

    /// No session is stored.
    #[error("Not logged in")]
    NotAuthenticated,

    /// The server could not be reached.
    #[error("Network error: {0}")]
    Network(String),

    /// Any other non-success answer.
    #[error("API error {status} ({code}): {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    /// A body did not have the expected shape.
    #[error("Decode error: {0}")]
    Decode(String),
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: String,
    #[serde(default)]
    code: String,
}

impl ClientError {
    /// Whether retrying the same call later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, ClientError::Network(_))
    }

    /// Builds an `Api` error from a status and the server's JSON error body.
    pub fn from_response(status: StatusCode, body: &[u8]) -> Self {
        let parsed: ErrorBody = sonic_rs::from_slice(body).unwrap_or(ErrorBody {
            error: String::from_utf8_lossy(body).into_owned(),
            code: String::new(),
        });

        ClientError::Api {
            status: status.as_u16(),
            code: parsed.code,
            message: parsed.error,
        }
    }

    pub(crate) fn decode(e: impl std::fmt::Display) -> Self {
        ClientError::Decode(e.to_string())
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ClientError::Decode(e.to_string())
        } else {
            ClientError::Network(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_carries_server_code() {
        let err = ClientError::from_response(
            StatusCode::FORBIDDEN,
            br#"{"error":"Forbidden","code":"forbidden"}"#,
        );
        assert_eq!(
            err,
            ClientError::Api {
                status: 403,
                code: "forbidden".to_string(),
                message: "Forbidden".to_string(),
            }
        );
    }

    #[test]
    fn non_json_body_becomes_message() {
        let err = ClientError::from_response(StatusCode::BAD_GATEWAY, b"upstream down");
        assert!(matches!(err, ClientError::Api { status: 502, ref message, .. } if message == "upstream down"));
    }
}
