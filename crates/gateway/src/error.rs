use domain::GatewayKind;
use thiserror::Error;

/// Errors returned by gateway calls.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("Gateway request timed out")]
    Timeout,

    #[error("Network error: {0}")]
    Network(String),

    /// 5xx or rate limiting. The request may succeed if repeated.
    #[error("Gateway unavailable (HTTP {status}): {message}")]
    Unavailable { status: u16, message: String },

    /// The provider gave a definitive answer that repeating won't change.
    #[error("Gateway rejected request (HTTP {status}) {code}: {message}")]
    Rejected {
        status: u16,
        code: String,
        message: String,
    },

    #[error("Invalid gateway response: {0}")]
    InvalidResponse(String),

    #[error("No adapter registered for gateway {0}")]
    NotRegistered(GatewayKind),
}

impl GatewayError {
    /// True for failures where retrying the same call is safe.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            GatewayError::Timeout | GatewayError::Network(_) | GatewayError::Unavailable { .. }
        )
    }

    /// Short machine-readable code stored alongside failed records.
    pub fn code(&self) -> String {
        match self {
            GatewayError::Timeout => "TIMEOUT".to_string(),
            GatewayError::Network(_) => "NETWORK_ERROR".to_string(),
            GatewayError::Unavailable { status, .. } => format!("HTTP_{status}"),
            GatewayError::Rejected { code, .. } => code.clone(),
            GatewayError::InvalidResponse(_) => "INVALID_RESPONSE".to_string(),
            GatewayError::NotRegistered(_) => "NOT_REGISTERED".to_string(),
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            GatewayError::Timeout
        } else if e.is_decode() {
            GatewayError::InvalidResponse(e.to_string())
        } else {
            GatewayError::Network(e.to_string())
        }
    }
}
