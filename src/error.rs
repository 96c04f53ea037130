use thiserror::Error;

/// Failures local to one chat invocation. None of these escape the gateway:
/// each one is written into the journal as an error section.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("{var} is not set. {hint}")]
    ConfigurationMissing {
        var: &'static str,
        hint: &'static str,
    },
    #[error("invalid provider setting: {0}")]
    InvalidSetting(String),
    #[error("malformed response from provider: {0}")]
    MalformedResponse(String),
    #[error("request to provider failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("failed to read response stream: {0}")]
    StreamRead(#[from] std::io::Error),
    #[error(
        "attempts to connect to the API backend using the specified URI resulted in this response code: {status}{}",
        status_detail(.body)
    )]
    HttpStatus { status: u16, body: String },
}

impl GatewayError {
    pub fn missing(var: &'static str, hint: &'static str) -> Self {
        Self::ConfigurationMissing { var, hint }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Self::ConfigurationMissing { .. } => ErrorCode::E001ConfigMissing,
            Self::InvalidSetting(_) => ErrorCode::E002InvalidSetting,
            Self::MalformedResponse(_) => ErrorCode::E003MalformedResponse,
            Self::Transport(_) | Self::StreamRead(_) => ErrorCode::E004Transport,
            Self::HttpStatus { .. } => ErrorCode::E005HttpStatus,
        }
    }

    /// Transport failures are journaled without any diagnostic body.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::StreamRead(_))
    }
}

fn status_detail(body: &str) -> String {
    let body = body.trim();
    if body.is_empty() {
        String::new()
    } else {
        format!(": {body}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    E001ConfigMissing,
    E002InvalidSetting,
    E003MalformedResponse,
    E004Transport,
    E005HttpStatus,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::E001ConfigMissing => "E001_CONFIG_MISSING",
            Self::E002InvalidSetting => "E002_INVALID_SETTING",
            Self::E003MalformedResponse => "E003_MALFORMED_RESPONSE",
            Self::E004Transport => "E004_TRANSPORT",
            Self::E005HttpStatus => "E005_HTTP_STATUS",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ErrorCode, GatewayError};

    #[test]
    fn configuration_missing_message_carries_hint() {
        let err = GatewayError::missing("VERTEXAI_PROJECT_ID", "See VertexAI tutorials.");
        assert_eq!(
            err.to_string(),
            "VERTEXAI_PROJECT_ID is not set. See VertexAI tutorials."
        );
        assert_eq!(err.code(), ErrorCode::E001ConfigMissing);
        assert!(!err.is_transport());
    }

    #[test]
    fn io_errors_classify_as_transport() {
        let err = GatewayError::from(std::io::Error::other("reset"));
        assert!(err.is_transport());
        assert_eq!(err.code().as_str(), "E004_TRANSPORT");
    }

    #[test]
    fn status_message_keeps_backend_body() {
        let err = GatewayError::HttpStatus {
            status: 404,
            body: " {\"error\":\"model 'x' not found, try pulling it first\"}\n".to_string(),
        };
        assert!(err.to_string().ends_with(
            "response code: 404: {\"error\":\"model 'x' not found, try pulling it first\"}"
        ));

        let bare = GatewayError::HttpStatus {
            status: 502,
            body: String::new(),
        };
        assert!(bare.to_string().ends_with("response code: 502"));
    }
}
