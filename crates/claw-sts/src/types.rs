//! OAuth 2.0 token exchange (RFC 8693) request and response shapes.

use serde::{Deserialize, Serialize};

use crate::error::{Result, StsError};

/// Grant type of a token exchange request.
pub const TOKEN_EXCHANGE_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:token-exchange";

/// Token type URI of an OAuth access token.
pub const ACCESS_TOKEN_TYPE: &str = "urn:ietf:params:oauth:token-type:access_token";

/// Token type URI of a JWT.
pub const JWT_TOKEN_TYPE: &str = "urn:ietf:params:oauth:token-type:jwt";

/// Parameters of a token exchange request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StsRequestParameters {
    /// Must be [`TOKEN_EXCHANGE_GRANT_TYPE`].
    pub grant_type: String,
    /// Target service the token is requested for.
    #[serde(default)]
    pub resource: String,
    /// Logical name of the target service.
    #[serde(default)]
    pub audience: String,
    /// Requested scope.
    #[serde(default)]
    pub scope: String,
    /// Type of the requested token.
    #[serde(default)]
    pub requested_token_type: String,
    /// The local credential being exchanged.
    pub subject_token: String,
    /// Type of `subject_token`.
    pub subject_token_type: String,
    /// Optional actor credential.
    #[serde(default)]
    pub actor_token: String,
    /// Type of `actor_token`.
    #[serde(default)]
    pub actor_token_type: String,
}

impl StsRequestParameters {
    /// Creates a request exchanging the JWT `subject_token`.
    #[must_use]
    pub fn for_jwt(subject_token: impl Into<String>) -> Self {
        Self {
            grant_type: TOKEN_EXCHANGE_GRANT_TYPE.to_string(),
            subject_token: subject_token.into(),
            subject_token_type: JWT_TOKEN_TYPE.to_string(),
            ..Self::default()
        }
    }

    /// Checks the fields every exchange needs.
    ///
    /// # Errors
    ///
    /// Returns [`StsError::InvalidRequest`] if the grant type is wrong or the
    /// subject token is missing.
    pub fn validate(&self) -> Result<()> {
        if self.grant_type != TOKEN_EXCHANGE_GRANT_TYPE {
            return Err(StsError::InvalidRequest(format!(
                "unsupported grant type '{}'",
                self.grant_type
            )));
        }
        if self.subject_token.is_empty() {
            return Err(StsError::InvalidRequest("subject token is empty".into()));
        }
        Ok(())
    }
}

/// Successful token exchange response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StsResponseParameters {
    /// The issued token.
    pub access_token: String,
    /// Type of the issued token.
    pub issued_token_type: String,
    /// How the token is presented, usually `Bearer`.
    pub token_type: String,
    /// Lifetime of the token in seconds.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub expires_in: i64,
    /// Scope of the issued token.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub scope: String,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
const fn is_zero(v: &i64) -> bool {
    *v == 0
}
