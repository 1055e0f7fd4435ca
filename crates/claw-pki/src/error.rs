//! PKI error types.

use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Result type for PKI operations.
pub type Result<T> = std::result::Result<T, Error>;

/// PKI error variants.
#[derive(Debug, Error)]
pub enum Error {
    /// Certificate bytes could not be decoded as PEM or DER.
    #[error("certificate parsing failed: {0}")]
    Parse(String),

    /// Certificate has already expired.
    #[error("certificate already expired at {not_after}, but now is {now}")]
    Expired {
        /// Expiry of the certificate.
        not_after: DateTime<Utc>,
        /// Time the check was performed at.
        now: DateTime<Utc>,
    },

    /// Certificate is inside its grace window and must be renewed immediately.
    #[error(
        "certificate should be renewed now: expires at {not_after}, grace period {grace_period:?}, now is {now}"
    )]
    RenewNow {
        /// Expiry of the certificate.
        not_after: DateTime<Utc>,
        /// Grace period that was applied.
        grace_period: Duration,
        /// Time the check was performed at.
        now: DateTime<Utc>,
    },

    /// Grace period percentage outside of `0..=100`.
    #[error("invalid grace period percentage {0}: must be between 0 and 100")]
    InvalidGracePeriod(u8),
}

impl Error {
    /// Returns `true` if the error comes from malformed certificate input.
    #[must_use]
    pub const fn is_parse(&self) -> bool {
        matches!(self, Self::Parse(_))
    }

    /// Returns `true` if the error is a validity-window violation.
    #[must_use]
    pub const fn is_temporal(&self) -> bool {
        matches!(self, Self::Expired { .. } | Self::RenewNow { .. })
    }
}
