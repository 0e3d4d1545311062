/// Errors that can occur while signing an account in or out.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The handle is empty or not a plausible domain name.
    #[error("invalid handle: {0}")]
    InvalidHandle(String),

    /// Neither DNS nor the handle's well-known document produced a DID.
    #[error("could not resolve handle {handle}: {reason}")]
    HandleResolution { handle: String, reason: String },

    /// The account's DID document, PDS or authorization server could not be found.
    #[error("discovery failed: {0}")]
    Discovery(String),

    /// DPoP key generation or proof signing failed.
    #[error("DPoP key error: {reason}")]
    DpopKey {
        /// Error description.
        reason: String,
    },

    /// Callback `state` does not match any sign-in started here.
    #[error("unknown or expired authorization state")]
    UnknownState,

    /// Callback came from a different authorization server than the one
    /// the user was sent to.
    #[error("issuer mismatch: expected {expected}, got {actual}")]
    IssuerMismatch { expected: String, actual: String },

    /// The authorization server authenticated a different account than the
    /// handle resolved to.
    #[error("account mismatch: expected {expected}, got {actual}")]
    AccountMismatch { expected: String, actual: String },

    /// OAuth token exchange or revocation failed.
    #[error("OAuth error ({status}): {message}")]
    OAuth {
        /// HTTP status code (0 if no response).
        status: u16,
        /// Error description.
        message: String,
    },
}

impl AuthError {
    /// Whether the failure is the user's input rather than ours or the server's.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidHandle(_)
                | Self::HandleResolution { .. }
                | Self::UnknownState
                | Self::IssuerMismatch { .. }
                | Self::AccountMismatch { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oauth_error_display() {
        let err = AuthError::OAuth {
            status: 400,
            message: "invalid_grant".to_string(),
        };
        assert_eq!(err.to_string(), "OAuth error (400): invalid_grant");
    }

    #[test]
    fn client_error_classification() {
        assert!(AuthError::InvalidHandle("".into()).is_client_error());
        assert!(AuthError::UnknownState.is_client_error());
        assert!(!AuthError::OAuth { status: 500, message: "boom".into() }.is_client_error());
    }
}
