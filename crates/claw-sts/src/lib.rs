//! Token exchange broker for Clawbernetes workload identity.
#![forbid(unsafe_code)]
//!
//! A [`TokenManager`] trades a workload's locally held credential for a
//! token an external certificate authority trusts. The backend is a
//! [`TokenExchangePlugin`] chosen once, when the manager is created, from
//! the configured exchange type and the platform identity discovered from
//! the metadata server.
//!
//! ```no_run
//! use claw_sts::{StsRequestParameters, TokenManager, TokenManagerConfig};
//!
//! # async fn run() {
//! let manager = TokenManager::create(
//!     "GoogleTokenExchange",
//!     &TokenManagerConfig::new("my-project.svc.id.goog"),
//! )
//! .await;
//!
//! let request = StsRequestParameters::for_jwt("header.payload.sig");
//! match manager.exchange_token(&request).await {
//!     Ok(token) => println!("{}", String::from_utf8_lossy(&token)),
//!     Err(e) if e.is_no_plugin() => println!("token exchange unavailable: {e}"),
//!     Err(e) => println!("exchange failed: {e}"),
//! }
//! # }
//! ```
//!
//! # Modules
//!
//! - [`manager`] - Plugin selection and delegation
//! - [`plugin`] - Plugin interface and the unavailable placeholder
//! - [`google`] - Google secure-token and IAM credentials exchange
//! - [`platform`] - Platform identity discovery and caching
//! - [`types`] - Token exchange request and response shapes
//! - [`error`] - Error types

pub mod error;
pub mod google;
pub mod manager;
pub mod platform;
pub mod plugin;
pub mod types;

#[cfg(test)]
mod testutil;

// Re-export commonly used types at crate root
pub use error::{PluginUnavailable, Result, StsError};
pub use google::{GoogleExchangeConfig, GoogleTokenExchange};
pub use manager::{
    BrokerStatus, TokenExchangeType, TokenManager, TokenManagerConfig, GOOGLE_TOKEN_EXCHANGE,
};
pub use platform::{
    platform_identity, GceMetadata, MetadataSource, PlatformIdentity, PlatformIdentityCache,
};
pub use plugin::{NoPlugin, TokenExchangePlugin};
pub use types::{StsRequestParameters, StsResponseParameters};
