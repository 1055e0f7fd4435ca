//! Signing outcome metrics for the Clawbernetes certificate authority.
#![forbid(unsafe_code)]
//!
//! `claw-metrics` provides a single, stable vocabulary for every terminal
//! outcome of a certificate signing attempt, exposed in Prometheus text
//! format for scraping.
//!
//! # Features
//!
//! - **Fixed taxonomy**: CSR received, authentication, parsing, identity
//!   extraction and signing failures, issuances, root rotations
//! - **Fail-fast registration**: registering a name twice is an error
//! - **Lock-free recording**: every increment and set is atomic
//!
//! # Example
//!
//! ```rust
//! use claw_metrics::{MetricsRegistry, SigningMetrics};
//!
//! // Once, at process start
//! let registry = MetricsRegistry::new();
//! let metrics = SigningMetrics::register(&registry).unwrap();
//!
//! // From request handlers
//! metrics.inc_csr();
//! metrics.inc_success();
//!
//! assert!(registry.encode().contains("citadel_server_csr_count_total 1"));
//! ```

#![doc(html_root_url = "https://docs.rs/claw-metrics/0.1.0")]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod error;
pub mod registry;
pub mod signing;

// Re-export main types at crate root
pub use error::{MetricsError, Result};
pub use registry::MetricsRegistry;
pub use signing::{names, ErrorLabels, SigningMetrics, ERROR_LABEL, ROOT_CERT_EXPIRY_UNKNOWN};
