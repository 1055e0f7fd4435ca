//! Token exchange plugin interface.

use std::future::Future;
use std::pin::Pin;

use crate::error::{PluginUnavailable, Result, StsError};
use crate::types::StsRequestParameters;

/// A backend that exchanges a local credential for an externally trusted token.
///
/// Implementations may perform network I/O and own their retry policy.
pub trait TokenExchangePlugin: Send + Sync {
    /// Exchanges the subject token in `parameters`, returning the serialized
    /// response.
    ///
    /// # Errors
    ///
    /// Returns an error if the request is invalid or the exchange fails.
    fn exchange_token<'a>(
        &'a self,
        parameters: &'a StsRequestParameters,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<u8>>> + Send + 'a>>;

    /// Returns a diagnostic status blob.
    ///
    /// # Errors
    ///
    /// Returns an error if the status cannot be produced.
    fn dump_plugin_status(&self) -> Pin<Box<dyn Future<Output = Result<Vec<u8>>> + Send + '_>>;
}

/// Plugin bound when no real backend is available; every call fails with
/// [`StsError::NoPlugin`].
#[derive(Debug, Clone)]
pub struct NoPlugin {
    reason: PluginUnavailable,
}

impl NoPlugin {
    /// Creates a placeholder recording why no backend is bound.
    #[must_use]
    pub const fn new(reason: PluginUnavailable) -> Self {
        Self { reason }
    }

    /// Returns why no backend is bound.
    #[must_use]
    pub const fn reason(&self) -> &PluginUnavailable {
        &self.reason
    }

    fn error(&self) -> StsError {
        StsError::NoPlugin {
            reason: self.reason.clone(),
        }
    }
}

impl TokenExchangePlugin for NoPlugin {
    fn exchange_token<'a>(
        &'a self,
        _parameters: &'a StsRequestParameters,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<u8>>> + Send + 'a>> {
        Box::pin(async move { Err(self.error()) })
    }

    fn dump_plugin_status(&self) -> Pin<Box<dyn Future<Output = Result<Vec<u8>>> + Send + '_>> {
        Box::pin(async move { Err(self.error()) })
    }
}
