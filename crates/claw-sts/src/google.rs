//! Google token exchange plugin.
//!
//! Two-step exchange:
//!
//! 1. The workload's JWT is traded at the secure-token endpoint for a
//!    federated token scoped to the cluster's identity namespace.
//! 2. The federated token is traded at the IAM credentials endpoint for an
//!    access token of the project's mesh data-plane service account.
//!
//! Issued tokens are cached and reused until they come within
//! [`TOKEN_EXPIRY_BUFFER`] of expiring.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;

use crate::error::{Result, StsError};
use crate::plugin::TokenExchangePlugin;
use crate::types::{
    StsRequestParameters, StsResponseParameters, ACCESS_TOKEN_TYPE, JWT_TOKEN_TYPE,
    TOKEN_EXCHANGE_GRANT_TYPE,
};

/// Default secure-token endpoint issuing federated tokens.
pub const FEDERATED_TOKEN_ENDPOINT: &str =
    "https://securetoken.googleapis.com/v1/identitybindingtoken";

/// Default IAM credentials API base URL.
pub const IAM_CREDENTIALS_ENDPOINT: &str = "https://iamcredentials.googleapis.com";

/// Cached tokens closer than this to expiry are refreshed.
pub const TOKEN_EXPIRY_BUFFER: Duration = Duration::from_secs(5 * 60);

const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";
const ACCESS_TOKEN_LIFETIME: &str = "3600s";
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration of the Google token exchange plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoogleExchangeConfig {
    /// Mesh trust domain, e.g. `my-project.svc.id.goog`.
    pub trust_domain: String,
    /// Numeric project identifier.
    pub project_number: String,
    /// GKE cluster resource URL.
    pub cluster_url: String,
    /// Whether issued tokens are cached.
    #[serde(default = "default_enable_cache")]
    pub enable_cache: bool,
    /// Secure-token endpoint.
    #[serde(default = "default_federated_endpoint")]
    pub federated_token_endpoint: String,
    /// IAM credentials API base URL.
    #[serde(default = "default_iam_endpoint")]
    pub iam_credentials_endpoint: String,
}

const fn default_enable_cache() -> bool {
    true
}

fn default_federated_endpoint() -> String {
    FEDERATED_TOKEN_ENDPOINT.to_string()
}

fn default_iam_endpoint() -> String {
    IAM_CREDENTIALS_ENDPOINT.to_string()
}

impl GoogleExchangeConfig {
    /// Creates a configuration against the public Google endpoints.
    #[must_use]
    pub fn new(
        trust_domain: impl Into<String>,
        project_number: impl Into<String>,
        cluster_url: impl Into<String>,
    ) -> Self {
        Self {
            trust_domain: trust_domain.into(),
            project_number: project_number.into(),
            cluster_url: cluster_url.into(),
            enable_cache: default_enable_cache(),
            federated_token_endpoint: default_federated_endpoint(),
            iam_credentials_endpoint: default_iam_endpoint(),
        }
    }

    /// Overrides both token endpoints.
    #[must_use]
    pub fn with_endpoints(
        mut self,
        federated_token_endpoint: impl Into<String>,
        iam_credentials_endpoint: impl Into<String>,
    ) -> Self {
        self.federated_token_endpoint = federated_token_endpoint.into();
        self.iam_credentials_endpoint = iam_credentials_endpoint.into();
        self
    }

    /// Enables or disables token caching.
    #[must_use]
    pub const fn with_cache(mut self, enable_cache: bool) -> Self {
        self.enable_cache = enable_cache;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.trust_domain.is_empty() {
            return Err(StsError::InvalidConfig("trust domain is empty".into()));
        }
        if self.project_number.is_empty() {
            return Err(StsError::InvalidConfig("project number is empty".into()));
        }
        let cluster = Url::parse(&self.cluster_url).map_err(|e| {
            StsError::InvalidConfig(format!("invalid cluster URL '{}': {e}", self.cluster_url))
        })?;
        if cluster.scheme() != "https" {
            return Err(StsError::InvalidConfig(format!(
                "cluster URL '{}' must use https",
                self.cluster_url
            )));
        }
        for endpoint in [&self.federated_token_endpoint, &self.iam_credentials_endpoint] {
            Url::parse(endpoint).map_err(|e| {
                StsError::InvalidConfig(format!("invalid endpoint '{endpoint}': {e}"))
            })?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    issue_time: DateTime<Utc>,
    expire_time: DateTime<Utc>,
}

impl CachedToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        (self.expire_time - now)
            .to_std()
            .is_ok_and(|remaining| remaining > TOKEN_EXPIRY_BUFFER)
    }
}

#[derive(Debug, Default)]
struct TokenCache {
    federated: Option<CachedToken>,
    access: Option<CachedToken>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FederatedTokenRequest<'a> {
    audience: String,
    grant_type: &'a str,
    requested_token_type: &'a str,
    subject_token_type: &'a str,
    subject_token: &'a str,
    scope: &'a str,
}

#[derive(Deserialize)]
struct FederatedTokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Serialize)]
struct AccessTokenRequest<'a> {
    delegates: Vec<String>,
    scope: Vec<&'a str>,
    lifetime: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccessTokenResponse {
    access_token: String,
    expire_time: String,
}

#[derive(Serialize)]
struct TokenStatus<'a> {
    token_type: &'a str,
    issue_time: DateTime<Utc>,
    expire_time: DateTime<Utc>,
}

#[derive(Serialize)]
struct PluginStatus<'a> {
    plugin: &'a str,
    trust_domain: &'a str,
    tokens: Vec<TokenStatus<'a>>,
}

/// Exchanges workload JWTs for Google access tokens.
pub struct GoogleTokenExchange {
    config: GoogleExchangeConfig,
    client: reqwest::Client,
    cache: Mutex<TokenCache>,
}

impl std::fmt::Debug for GoogleTokenExchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleTokenExchange")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl GoogleTokenExchange {
    /// Plugin name reported in status dumps.
    pub const NAME: &'static str = "GoogleTokenExchange";

    /// Creates the plugin.
    ///
    /// # Errors
    ///
    /// Returns [`StsError::InvalidConfig`] if a field is empty, a URL does not
    /// parse, or the HTTP client cannot be built.
    pub fn new(config: GoogleExchangeConfig) -> Result<Self> {
        config.validate()?;

        let builder = reqwest::Client::builder().timeout(HTTP_TIMEOUT);
        // Tests talk to a loopback stub.
        #[cfg(test)]
        let builder = builder.no_proxy();
        let client = builder
            .build()
            .map_err(|e| StsError::InvalidConfig(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            config,
            client,
            cache: Mutex::new(TokenCache::default()),
        })
    }

    /// Returns the plugin configuration.
    #[must_use]
    pub const fn config(&self) -> &GoogleExchangeConfig {
        &self.config
    }

    /// Returns the audience of federated token requests.
    #[must_use]
    pub fn audience(&self) -> String {
        format!(
            "identitynamespace:{}:{}",
            self.config.trust_domain, self.config.cluster_url
        )
    }

    /// Returns the service account impersonated for access tokens.
    #[must_use]
    pub fn service_account(&self) -> String {
        format!(
            "service-{}@gcp-sa-meshdataplane.iam.gserviceaccount.com",
            self.config.project_number
        )
    }

    async fn fetch_federated_token(&self, subject_token: &str) -> Result<CachedToken> {
        let request = FederatedTokenRequest {
            audience: self.audience(),
            grant_type: TOKEN_EXCHANGE_GRANT_TYPE,
            requested_token_type: ACCESS_TOKEN_TYPE,
            subject_token_type: JWT_TOKEN_TYPE,
            subject_token,
            scope: CLOUD_PLATFORM_SCOPE,
        };

        let issue_time = Utc::now();
        let response: FederatedTokenResponse = self
            .post_json(&self.config.federated_token_endpoint, None, &request)
            .await?;
        debug!(expires_in = response.expires_in, "received federated token");

        let lifetime = chrono::Duration::try_seconds(response.expires_in).ok_or_else(|| {
            StsError::Decode(format!("expires_in out of range: {}", response.expires_in))
        })?;

        Ok(CachedToken {
            token: response.access_token,
            issue_time,
            expire_time: issue_time + lifetime,
        })
    }

    async fn fetch_access_token(&self, federated_token: &str) -> Result<CachedToken> {
        let url = format!(
            "{}/v1/projects/-/serviceAccounts/{}:generateAccessToken",
            self.config.iam_credentials_endpoint.trim_end_matches('/'),
            self.service_account()
        );
        let request = AccessTokenRequest {
            delegates: Vec::new(),
            scope: vec![CLOUD_PLATFORM_SCOPE],
            lifetime: ACCESS_TOKEN_LIFETIME,
        };

        let issue_time = Utc::now();
        let response: AccessTokenResponse = self
            .post_json(&url, Some(federated_token), &request)
            .await?;
        let expire_time = DateTime::parse_from_rfc3339(&response.expire_time)
            .map_err(|e| {
                StsError::Decode(format!("invalid expireTime '{}': {e}", response.expire_time))
            })?
            .with_timezone(&Utc);
        debug!(%expire_time, "received access token");

        Ok(CachedToken {
            token: response.access_token,
            issue_time,
            expire_time,
        })
    }

    async fn post_json<B: Serialize + Sync, R: DeserializeOwned>(
        &self,
        url: &str,
        bearer: Option<&str>,
        body: &B,
    ) -> Result<R> {
        let mut request = self.client.post(url).json(body);
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| StsError::Http(format!("POST {url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StsError::Endpoint {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json()
            .await
            .map_err(|e| StsError::Decode(format!("POST {url}: {e}")))
    }

    fn encode_response(token: &CachedToken) -> Result<Vec<u8>> {
        let response = StsResponseParameters {
            access_token: token.token.clone(),
            issued_token_type: ACCESS_TOKEN_TYPE.to_string(),
            token_type: "Bearer".to_string(),
            expires_in: (token.expire_time - Utc::now()).num_seconds().max(0),
            scope: String::new(),
        };
        serde_json::to_vec(&response).map_err(|e| StsError::Encode(e.to_string()))
    }
}

impl GoogleTokenExchange {
    fn cached_response(&self) -> Option<Result<Vec<u8>>> {
        let cache = self.cache.lock();
        cache
            .access
            .as_ref()
            .filter(|t| t.is_fresh(Utc::now()))
            .map(|token| {
                debug!("serving cached access token");
                Self::encode_response(token)
            })
    }

    fn store(&self, federated: CachedToken, access: CachedToken) {
        let mut cache = self.cache.lock();
        cache.federated = Some(federated);
        cache.access = Some(access);
    }

    fn status_json(&self) -> Result<Vec<u8>> {
        let cache = self.cache.lock();
        let tokens = [
            ("federated token", cache.federated.as_ref()),
            ("access token", cache.access.as_ref()),
        ]
        .into_iter()
        .filter_map(|(token_type, token)| {
            token.map(|t| TokenStatus {
                token_type,
                issue_time: t.issue_time,
                expire_time: t.expire_time,
            })
        })
        .collect();

        let status = PluginStatus {
            plugin: Self::NAME,
            trust_domain: &self.config.trust_domain,
            tokens,
        };
        serde_json::to_vec_pretty(&status).map_err(|e| StsError::Encode(e.to_string()))
    }
}

impl TokenExchangePlugin for GoogleTokenExchange {
    fn exchange_token<'a>(
        &'a self,
        parameters: &'a StsRequestParameters,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<u8>>> + Send + 'a>> {
        Box::pin(async move {
            parameters.validate()?;

            if self.config.enable_cache {
                if let Some(cached) = self.cached_response() {
                    return cached;
                }
            }

            let federated = self.fetch_federated_token(&parameters.subject_token).await?;
            let access = self.fetch_access_token(&federated.token).await?;
            info!(
                service_account = %self.service_account(),
                expire_time = %access.expire_time,
                "exchanged workload token for access token"
            );

            let encoded = Self::encode_response(&access)?;
            if self.config.enable_cache {
                self.store(federated, access);
            }
            Ok(encoded)
        })
    }

    fn dump_plugin_status(&self) -> Pin<Box<dyn Future<Output = Result<Vec<u8>>> + Send + '_>> {
        Box::pin(async move { self.status_json() })
    }
}
