//! Token exchange broker.
//!
//! A [`TokenManager`] binds exactly one [`TokenExchangePlugin`] when it is
//! created and delegates every call to it. Construction never fails: when
//! the requested plugin cannot be built the manager binds [`NoPlugin`] and
//! records why, so callers get a stable [`StsError::NoPlugin`] at call time.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{PluginUnavailable, Result, StsError};
use crate::google::{GoogleExchangeConfig, GoogleTokenExchange};
use crate::platform::{platform_identity, PlatformIdentity};
use crate::plugin::{NoPlugin, TokenExchangePlugin};
use crate::types::StsRequestParameters;

/// Name selecting the Google token exchange plugin.
pub const GOOGLE_TOKEN_EXCHANGE: &str = "GoogleTokenExchange";

/// Known token exchange plugins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenExchangeType {
    /// [`GoogleTokenExchange`].
    Google,
}

impl TokenExchangeType {
    /// Returns the configuration name of this type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Google => GOOGLE_TOKEN_EXCHANGE,
        }
    }
}

impl fmt::Display for TokenExchangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TokenExchangeType {
    type Err = PluginUnavailable;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            GOOGLE_TOKEN_EXCHANGE => Ok(Self::Google),
            other => Err(PluginUnavailable::UnknownExchangeType(other.to_string())),
        }
    }
}

/// Broker configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenManagerConfig {
    /// Mesh trust domain.
    #[serde(default)]
    pub trust_domain: String,
}

impl TokenManagerConfig {
    /// Creates a configuration for `trust_domain`.
    #[must_use]
    pub fn new(trust_domain: impl Into<String>) -> Self {
        Self {
            trust_domain: trust_domain.into(),
        }
    }
}

/// What a [`TokenManager`] has bound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerStatus {
    /// A working plugin is bound.
    Bound {
        /// Plugin name.
        plugin: String,
    },
    /// No plugin is bound.
    Unavailable(PluginUnavailable),
}

impl BrokerStatus {
    /// Returns `true` if a working plugin is bound.
    #[must_use]
    pub const fn is_bound(&self) -> bool {
        matches!(self, Self::Bound { .. })
    }
}

/// Exchanges local credentials for external tokens through a bound plugin.
#[derive(Clone)]
pub struct TokenManager {
    plugin: Arc<dyn TokenExchangePlugin>,
    status: BrokerStatus,
}

impl fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenManager")
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

impl TokenManager {
    /// Creates a manager for the plugin named `kind`, using the process-wide
    /// platform identity.
    ///
    /// The platform identity is only consulted when `kind` names a known
    /// plugin, so unknown kinds never touch the metadata server.
    pub async fn create(kind: &str, config: &TokenManagerConfig) -> Self {
        match kind.parse::<TokenExchangeType>() {
            Ok(kind) => Self::bind(kind, config, platform_identity().await),
            Err(reason) => Self::unavailable(reason),
        }
    }

    /// Creates a manager for the plugin named `kind` from an explicit identity.
    #[must_use]
    pub fn create_with_identity(
        kind: &str,
        config: &TokenManagerConfig,
        identity: &PlatformIdentity,
    ) -> Self {
        match kind.parse::<TokenExchangeType>() {
            Ok(kind) => Self::bind(kind, config, identity),
            Err(reason) => Self::unavailable(reason),
        }
    }

    fn bind(
        kind: TokenExchangeType,
        config: &TokenManagerConfig,
        identity: &PlatformIdentity,
    ) -> Self {
        match kind {
            TokenExchangeType::Google => {
                let Some(project_number) = identity.project_number() else {
                    return Self::unavailable(PluginUnavailable::MissingPlatformIdentity);
                };
                let plugin_config = GoogleExchangeConfig::new(
                    config.trust_domain.clone(),
                    project_number,
                    identity.gke_cluster_url(),
                );
                match GoogleTokenExchange::new(plugin_config) {
                    Ok(plugin) => {
                        info!(
                            plugin = GoogleTokenExchange::NAME,
                            trust_domain = %config.trust_domain,
                            "bound token exchange plugin"
                        );
                        Self {
                            plugin: Arc::new(plugin),
                            status: BrokerStatus::Bound {
                                plugin: GoogleTokenExchange::NAME.to_string(),
                            },
                        }
                    }
                    Err(e) => {
                        warn!(
                            plugin = GoogleTokenExchange::NAME,
                            error = %e,
                            "failed to create token exchange plugin"
                        );
                        Self::unavailable(PluginUnavailable::ConstructionFailed(e.to_string()))
                    }
                }
            }
        }
    }

    fn unavailable(reason: PluginUnavailable) -> Self {
        debug!(%reason, "no token exchange plugin bound");
        Self {
            plugin: Arc::new(NoPlugin::new(reason.clone())),
            status: BrokerStatus::Unavailable(reason),
        }
    }

    /// Exchanges the subject token in `parameters` through the bound plugin.
    ///
    /// # Errors
    ///
    /// Returns [`StsError::NoPlugin`] if no plugin is bound, otherwise
    /// whatever the plugin returns.
    pub async fn exchange_token(&self, parameters: &StsRequestParameters) -> Result<Vec<u8>> {
        self.plugin.exchange_token(parameters).await
    }

    /// Returns the bound plugin's diagnostic status blob.
    ///
    /// # Errors
    ///
    /// Returns [`StsError::NoPlugin`] if no plugin is bound.
    pub async fn dump_status(&self) -> Result<Vec<u8>> {
        self.plugin.dump_plugin_status().await
    }

    /// Returns what this manager has bound.
    #[must_use]
    pub const fn status(&self) -> &BrokerStatus {
        &self.status
    }

    /// Replaces the bound plugin.
    #[cfg(any(test, feature = "test-util"))]
    pub fn set_plugin(&mut self, name: impl Into<String>, plugin: Arc<dyn TokenExchangePlugin>) {
        self.plugin = plugin;
        self.status = BrokerStatus::Bound {
            plugin: name.into(),
        };
    }
}

impl From<PluginUnavailable> for StsError {
    fn from(reason: PluginUnavailable) -> Self {
        Self::NoPlugin { reason }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use test_case::test_case;

    fn gke_identity() -> PlatformIdentity {
        PlatformIdentity::new(
            Some("1234567890".into()),
            Some("my-project".into()),
            Some("prod".into()),
            Some("us-central1".into()),
        )
    }

    #[derive(Default)]
    struct EchoPlugin {
        calls: AtomicUsize,
    }

    impl TokenExchangePlugin for EchoPlugin {
        fn exchange_token<'a>(
            &'a self,
            parameters: &'a StsRequestParameters,
        ) -> Pin<Box<dyn Future<Output = Result<Vec<u8>>> + Send + 'a>> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                tokio::task::yield_now().await;
                Ok(format!("token-for-{}", parameters.subject_token).into_bytes())
            })
        }

        fn dump_plugin_status(&self) -> Pin<Box<dyn Future<Output = Result<Vec<u8>>> + Send + '_>> {
            Box::pin(async move { Ok(b"echo".to_vec()) })
        }
    }

    #[test_case("GoogleTokenExchange", Ok(TokenExchangeType::Google) ; "google")]
    #[test_case("googletokenexchange", Err(PluginUnavailable::UnknownExchangeType("googletokenexchange".into())) ; "case sensitive")]
    #[test_case("", Err(PluginUnavailable::UnknownExchangeType(String::new())) ; "empty")]
    fn parse_exchange_type(
        name: &str,
        expected: std::result::Result<TokenExchangeType, PluginUnavailable>,
    ) {
        assert_eq!(name.parse::<TokenExchangeType>(), expected);
    }

    #[tokio::test]
    async fn unknown_type_binds_no_plugin() {
        // Never reaches the metadata server: the process-wide identity is
        // only consulted for known kinds.
        let manager = TokenManager::create("VaultExchange", &TokenManagerConfig::new("td")).await;

        let err = manager
            .exchange_token(&StsRequestParameters::for_jwt("jwt"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StsError::NoPlugin {
                reason: PluginUnavailable::UnknownExchangeType(ref kind)
            } if kind == "VaultExchange"
        ));
        assert!(manager.dump_status().await.unwrap_err().is_no_plugin());
        assert!(!manager.status().is_bound());
    }

    #[tokio::test]
    async fn google_binds_with_project_number() {
        let manager = TokenManager::create_with_identity(
            GOOGLE_TOKEN_EXCHANGE,
            &TokenManagerConfig::new("my-project.svc.id.goog"),
            &gke_identity(),
        );

        assert_eq!(
            manager.status(),
            &BrokerStatus::Bound {
                plugin: GoogleTokenExchange::NAME.into()
            }
        );
        let dump: serde_json::Value =
            serde_json::from_slice(&manager.dump_status().await.unwrap()).unwrap();
        assert_eq!(dump["trust_domain"], "my-project.svc.id.goog");

        // Bound plugin owns an HTTP client; dropping it inside the runtime is fine.
        drop(manager);
    }

    #[test]
    fn missing_project_number_binds_no_plugin() {
        let identity = PlatformIdentity::new(None, Some("my-project".into()), None, None);
        let manager = TokenManager::create_with_identity(
            GOOGLE_TOKEN_EXCHANGE,
            &TokenManagerConfig::new("td"),
            &identity,
        );

        assert_eq!(
            manager.status(),
            &BrokerStatus::Unavailable(PluginUnavailable::MissingPlatformIdentity)
        );
    }

    #[tokio::test]
    async fn construction_failure_is_recorded() {
        let manager = TokenManager::create_with_identity(
            GOOGLE_TOKEN_EXCHANGE,
            &TokenManagerConfig::default(),
            &gke_identity(),
        );

        assert!(matches!(
            manager.status(),
            BrokerStatus::Unavailable(PluginUnavailable::ConstructionFailed(reason))
                if reason.contains("trust domain")
        ));
        let err = manager
            .exchange_token(&StsRequestParameters::for_jwt("jwt"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StsError::NoPlugin {
                reason: PluginUnavailable::ConstructionFailed(_)
            }
        ));
    }

    #[tokio::test]
    async fn set_plugin_replaces_binding() {
        let mut manager = TokenManager::create("unknown", &TokenManagerConfig::default()).await;
        manager.set_plugin("echo", Arc::new(EchoPlugin::default()));

        let token = manager
            .exchange_token(&StsRequestParameters::for_jwt("jwt"))
            .await
            .unwrap();
        assert_eq!(token, b"token-for-jwt");
        assert_eq!(manager.dump_status().await.unwrap(), b"echo");
        assert!(manager.status().is_bound());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_calls_share_plugin() {
        let plugin = Arc::new(EchoPlugin::default());
        let mut manager = TokenManager::create("unknown", &TokenManagerConfig::default()).await;
        manager.set_plugin("echo", Arc::clone(&plugin) as Arc<dyn TokenExchangePlugin>);
        let manager = Arc::new(manager);

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let manager = Arc::clone(&manager);
                tokio::spawn(async move {
                    let params = StsRequestParameters::for_jwt(format!("jwt-{i}"));
                    manager.exchange_token(&params).await.unwrap()
                })
            })
            .collect();

        for (i, handle) in handles.into_iter().enumerate() {
            assert_eq!(handle.await.unwrap(), format!("token-for-jwt-{i}").into_bytes());
        }
        assert_eq!(plugin.calls.load(Ordering::SeqCst), 16);
    }

    #[test]
    fn config_deserializes_with_default() {
        let config: TokenManagerConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, TokenManagerConfig::default());
    }
}
