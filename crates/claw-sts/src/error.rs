//! Token exchange error types.

use std::fmt;

use thiserror::Error;

/// Result type for token exchange operations.
pub type Result<T> = std::result::Result<T, StsError>;

/// Why a broker has no token exchange plugin bound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginUnavailable {
    /// The configured exchange type is not known.
    UnknownExchangeType(String),
    /// The platform identity lacks the project number the plugin needs.
    MissingPlatformIdentity,
    /// The plugin could be selected but failed to construct.
    ConstructionFailed(String),
}

impl fmt::Display for PluginUnavailable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownExchangeType(kind) => write!(f, "unknown token exchange type '{kind}'"),
            Self::MissingPlatformIdentity => {
                write!(f, "platform identity has no project number")
            }
            Self::ConstructionFailed(reason) => {
                write!(f, "plugin construction failed: {reason}")
            }
        }
    }
}

/// Token exchange error variants.
#[derive(Debug, Error)]
pub enum StsError {
    /// No plugin is bound to the broker.
    #[error("no plugin is found: {reason}")]
    NoPlugin {
        /// Why no plugin is bound.
        reason: PluginUnavailable,
    },

    /// The exchange request is malformed.
    #[error("invalid token exchange request: {0}")]
    InvalidRequest(String),

    /// Plugin configuration is invalid.
    #[error("invalid plugin configuration: {0}")]
    InvalidConfig(String),

    /// The HTTP request could not be sent or completed.
    #[error("token endpoint request failed: {0}")]
    Http(String),

    /// The token endpoint answered with a non-success status.
    #[error("token endpoint returned status {status}: {body}")]
    Endpoint {
        /// HTTP status code.
        status: u16,
        /// Response body.
        body: String,
    },

    /// The response could not be decoded.
    #[error("failed to decode token response: {0}")]
    Decode(String),

    /// A response or status blob could not be encoded.
    #[error("failed to encode: {0}")]
    Encode(String),
}

impl StsError {
    /// Returns `true` if the error means no plugin is available.
    #[must_use]
    pub const fn is_no_plugin(&self) -> bool {
        matches!(self, Self::NoPlugin { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_plugin_display_includes_reason() {
        let err = StsError::NoPlugin {
            reason: PluginUnavailable::UnknownExchangeType("Vault".into()),
        };
        assert_eq!(
            err.to_string(),
            "no plugin is found: unknown token exchange type 'Vault'"
        );
        assert!(err.is_no_plugin());
    }

    #[test]
    fn construction_failure_is_distinguishable() {
        let missing = PluginUnavailable::MissingPlatformIdentity;
        let failed = PluginUnavailable::ConstructionFailed("bad url".into());

        assert_ne!(missing, failed);
        assert_eq!(failed.to_string(), "plugin construction failed: bad url");
    }

    #[test]
    fn endpoint_error_display() {
        let err = StsError::Endpoint {
            status: 403,
            body: "denied".into(),
        };
        assert_eq!(err.to_string(), "token endpoint returned status 403: denied");
        assert!(!err.is_no_plugin());
    }
}
