//! Platform identity discovery and process-wide caching.
//!
//! Project and cluster facts never change for the lifetime of a workload,
//! and looking them up means talking to the metadata server. The cache
//! performs that lookup exactly once, however many callers race the first
//! call, and serves every later call from memory.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// Well-known metadata keys.
pub mod keys {
    /// Numeric project identifier.
    pub const GCP_PROJECT_NUMBER: &str = "gcp_project_number";
    /// Project identifier.
    pub const GCP_PROJECT: &str = "gcp_project";
    /// GKE cluster name.
    pub const GCP_CLUSTER: &str = "gcp_gke_cluster_name";
    /// GKE cluster location.
    pub const GCP_LOCATION: &str = "gcp_location";
}

/// Source of platform metadata.
pub trait MetadataSource: Send + Sync {
    /// Returns `true` if the process runs on the platform this source serves.
    fn on_platform(&self) -> Pin<Box<dyn Future<Output = bool> + Send + '_>>;

    /// Returns whatever metadata is available, keyed by [`keys`].
    ///
    /// Missing keys are not an error.
    fn metadata(&self) -> Pin<Box<dyn Future<Output = HashMap<String, String>> + Send + '_>>;
}

/// Immutable project and cluster facts of the hosting platform.
///
/// Every field is optional; an identity may be empty (off-platform) or
/// partially populated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformIdentity {
    project_number: Option<String>,
    project_id: Option<String>,
    cluster_name: Option<String>,
    cluster_location: Option<String>,
}

impl PlatformIdentity {
    /// Creates an identity from explicit values.
    #[must_use]
    pub const fn new(
        project_number: Option<String>,
        project_id: Option<String>,
        cluster_name: Option<String>,
        cluster_location: Option<String>,
    ) -> Self {
        Self {
            project_number,
            project_id,
            cluster_name,
            cluster_location,
        }
    }

    /// Builds an identity from a metadata map; empty values count as missing.
    #[must_use]
    pub fn from_metadata(md: &HashMap<String, String>) -> Self {
        let get = |key: &str| md.get(key).filter(|v| !v.is_empty()).cloned();
        Self {
            project_number: get(keys::GCP_PROJECT_NUMBER),
            project_id: get(keys::GCP_PROJECT),
            cluster_name: get(keys::GCP_CLUSTER),
            cluster_location: get(keys::GCP_LOCATION),
        }
    }

    /// Returns the numeric project identifier.
    #[must_use]
    pub fn project_number(&self) -> Option<&str> {
        self.project_number.as_deref()
    }

    /// Returns the project identifier.
    #[must_use]
    pub fn project_id(&self) -> Option<&str> {
        self.project_id.as_deref()
    }

    /// Returns the cluster name.
    #[must_use]
    pub fn cluster_name(&self) -> Option<&str> {
        self.cluster_name.as_deref()
    }

    /// Returns the cluster location.
    #[must_use]
    pub fn cluster_location(&self) -> Option<&str> {
        self.cluster_location.as_deref()
    }

    /// Returns `true` if no field is populated.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.project_number.is_none()
            && self.project_id.is_none()
            && self.cluster_name.is_none()
            && self.cluster_location.is_none()
    }

    /// Returns the GKE cluster resource URL. Missing fields render empty.
    #[must_use]
    pub fn gke_cluster_url(&self) -> String {
        format!(
            "https://container.googleapis.com/v1/projects/{}/locations/{}/clusters/{}",
            self.project_id().unwrap_or_default(),
            self.cluster_location().unwrap_or_default(),
            self.cluster_name().unwrap_or_default(),
        )
    }
}

/// Lazily populated, exactly-once cache of a [`PlatformIdentity`].
pub struct PlatformIdentityCache<S> {
    source: S,
    identity: OnceCell<PlatformIdentity>,
}

impl<S: MetadataSource> PlatformIdentityCache<S> {
    /// Creates an empty cache over `source`. No lookup happens yet.
    #[must_use]
    pub const fn new(source: S) -> Self {
        Self {
            source,
            identity: OnceCell::const_new(),
        }
    }

    /// Returns the cached identity, looking it up on first use.
    ///
    /// Concurrent first callers wait until the single lookup completes and
    /// then all observe the same value.
    pub async fn get(&self) -> &PlatformIdentity {
        self.identity
            .get_or_init(|| self.lookup())
            .await
    }

    async fn lookup(&self) -> PlatformIdentity {
        if !self.source.on_platform().await {
            debug!("not running on GCP, caching empty platform identity");
            return PlatformIdentity::default();
        }
        let identity = PlatformIdentity::from_metadata(&self.source.metadata().await);
        info!(
            project_id = identity.project_id().unwrap_or_default(),
            project_number = identity.project_number().unwrap_or_default(),
            cluster = identity.cluster_name().unwrap_or_default(),
            location = identity.cluster_location().unwrap_or_default(),
            "discovered platform identity"
        );
        identity
    }

    /// Returns `true` once the lookup has completed.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.identity.initialized()
    }
}

impl<S> std::fmt::Debug for PlatformIdentityCache<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlatformIdentityCache")
            .field("identity", &self.identity.get())
            .finish_non_exhaustive()
    }
}

static GCE_IDENTITY: Lazy<PlatformIdentityCache<GceMetadata>> =
    Lazy::new(|| PlatformIdentityCache::new(GceMetadata::from_env()));

/// Returns the process-wide platform identity, discovered from the GCE
/// metadata server on first call.
///
/// Never fails; off GCP the identity is empty.
pub async fn platform_identity() -> &'static PlatformIdentity {
    GCE_IDENTITY.get().await
}

/// Environment variable overriding the metadata server `host[:port]`.
pub const GCE_METADATA_HOST_ENV: &str = "GCE_METADATA_HOST";

const DEFAULT_METADATA_HOST: &str = "metadata.google.internal";
const METADATA_FLAVOR_HEADER: &str = "Metadata-Flavor";
const METADATA_FLAVOR: &str = "Google";
const METADATA_TIMEOUT: Duration = Duration::from_secs(5);

/// Metadata paths for each identity key.
const METADATA_PATHS: [(&str, &str); 4] = [
    (keys::GCP_PROJECT_NUMBER, "project/numeric-project-id"),
    (keys::GCP_PROJECT, "project/project-id"),
    (keys::GCP_CLUSTER, "instance/attributes/cluster-name"),
    (keys::GCP_LOCATION, "instance/attributes/cluster-location"),
];

/// [`MetadataSource`] backed by the GCE metadata server.
#[derive(Debug, Clone)]
pub struct GceMetadata {
    host: String,
    client: reqwest::Client,
}

impl GceMetadata {
    /// Uses `GCE_METADATA_HOST` if set, the well-known host otherwise.
    #[must_use]
    pub fn from_env() -> Self {
        Self::with_host(resolve_host(std::env::var(GCE_METADATA_HOST_ENV).ok()))
    }

    /// Uses the metadata server at `host[:port]`.
    #[must_use]
    pub fn with_host(host: impl Into<String>) -> Self {
        // The metadata server is link-local and never reached through a proxy.
        let client = reqwest::Client::builder()
            .timeout(METADATA_TIMEOUT)
            .no_proxy()
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            host: host.into(),
            client,
        }
    }

    /// Returns the metadata server `host[:port]`.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}/computeMetadata/v1/{path}", self.host)
    }

    async fn get(&self, path: &str) -> Option<String> {
        let response = self
            .client
            .get(self.url(path))
            .header(METADATA_FLAVOR_HEADER, METADATA_FLAVOR)
            .send()
            .await
            .map_err(|e| debug!(path, error = %e, "metadata request failed"))
            .ok()?;

        if !response.status().is_success() {
            debug!(path, status = %response.status(), "metadata key not available");
            return None;
        }
        response.text().await.ok().map(|v| v.trim().to_string())
    }
}

/// Picks the configured metadata host; unset and empty mean the default.
fn resolve_host(configured: Option<String>) -> String {
    configured
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| DEFAULT_METADATA_HOST.to_string())
}

impl MetadataSource for GceMetadata {
    fn on_platform(&self) -> Pin<Box<dyn Future<Output = bool> + Send + '_>> {
        Box::pin(async move {
            match self
                .client
                .get(self.url(""))
                .header(METADATA_FLAVOR_HEADER, METADATA_FLAVOR)
                .send()
                .await
            {
                Ok(response) => response
                    .headers()
                    .get(METADATA_FLAVOR_HEADER)
                    .is_some_and(|v| v == METADATA_FLAVOR),
                Err(e) => {
                    debug!(error = %e, "metadata server unreachable");
                    false
                }
            }
        })
    }

    fn metadata(&self) -> Pin<Box<dyn Future<Output = HashMap<String, String>> + Send + '_>> {
        Box::pin(async move {
            let mut md = HashMap::new();
            for (key, path) in METADATA_PATHS {
                if let Some(value) = self.get(path).await {
                    md.insert(key.to_string(), value);
                }
            }
            md
        })
    }
}
