//! Signing outcome metrics for the certificate authority.
//!
//! Every terminal outcome of a CSR signing attempt maps to exactly one of the
//! counters below, whichever component observed it. The names are scraped by
//! external dashboards and must stay stable.
//!
//! # Example
//!
//! ```rust
//! use claw_metrics::{MetricsRegistry, SigningMetrics};
//!
//! let registry = MetricsRegistry::new();
//! let metrics = SigningMetrics::register(&registry).unwrap();
//!
//! metrics.inc_csr();
//! metrics.inc_sign_error("backend-unreachable");
//!
//! let output = registry.encode();
//! assert!(output.contains("citadel_server_csr_sign_err_count"));
//! ```

use chrono::{DateTime, Utc};
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use tracing::warn;

use crate::error::Result;
use crate::registry::MetricsRegistry;

/// Name of the label partitioning signing failures by cause.
pub const ERROR_LABEL: &str = "error";

/// Value of the root expiry gauge when the expiry could not be determined.
pub const ROOT_CERT_EXPIRY_UNKNOWN: i64 = -1;

/// Metric names, part of the operational contract.
pub mod names {
    /// CSRs received.
    pub const CSR_COUNT: &str = "citadel_server_csr_count";
    /// Authentication failures.
    pub const AUTHN_FAILURE_COUNT: &str = "citadel_server_authentication_failure_count";
    /// CSR parsing failures.
    pub const CSR_PARSING_ERR_COUNT: &str = "citadel_server_csr_parsing_err_count";
    /// Identity extraction failures.
    pub const ID_EXTRACTION_ERR_COUNT: &str = "citadel_server_id_extraction_err_count";
    /// Signing failures, labelled by cause.
    pub const CSR_SIGN_ERR_COUNT: &str = "citadel_server_csr_sign_err_count";
    /// Successful issuances.
    pub const SUCCESS_CERT_ISSUANCE_COUNT: &str = "citadel_server_success_cert_issuance_count";
    /// Successful root certificate transitions.
    pub const ROOT_CERT_UPGRADE_COUNT: &str = "citadel_root_cert_upgrade_count";
    /// Failed root certificate transitions.
    pub const ROOT_CERT_UPGRADE_ERR_COUNT: &str = "citadel_root_cert_upgrade_err_count";
    /// Root certificate expiry, unix seconds.
    pub const ROOT_CERT_EXPIRY_TIMESTAMP: &str = "citadel_server_root_cert_expiry_timestamp";
}

const ALL_NAMES: [&str; 9] = [
    names::CSR_COUNT,
    names::AUTHN_FAILURE_COUNT,
    names::CSR_PARSING_ERR_COUNT,
    names::ID_EXTRACTION_ERR_COUNT,
    names::CSR_SIGN_ERR_COUNT,
    names::SUCCESS_CERT_ISSUANCE_COUNT,
    names::ROOT_CERT_EXPIRY_TIMESTAMP,
    names::ROOT_CERT_UPGRADE_COUNT,
    names::ROOT_CERT_UPGRADE_ERR_COUNT,
];

/// Label set for signing failures.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ErrorLabels {
    /// Low-cardinality cause of the failure, e.g. `"quota-exceeded"`.
    pub error: String,
}

/// Counters and gauges for certificate signing related operations.
///
/// Cheap to clone; clones record into the same series. Increments are atomic
/// per counter, with no atomicity across counters.
#[derive(Clone, Debug)]
pub struct SigningMetrics {
    csr: Counter,
    authn_error: Counter,
    csr_parsing_error: Counter,
    id_extraction_error: Counter,
    sign_errors: Family<ErrorLabels, Counter>,
    success: Counter,
    root_upgrade_success: Counter,
    root_upgrade_error: Counter,
    root_cert_expiry_timestamp: Gauge,
}

impl SigningMetrics {
    /// Creates the signing metrics and registers them with `registry`.
    ///
    /// Call once at process start.
    ///
    /// # Errors
    ///
    /// Returns [`crate::MetricsError::DuplicateMetric`] if any of the names is
    /// already registered, which happens when this is called twice against
    /// the same registry.
    pub fn register(registry: &MetricsRegistry) -> Result<Self> {
        registry.check_available(&ALL_NAMES)?;

        let metrics = Self {
            csr: Counter::default(),
            authn_error: Counter::default(),
            csr_parsing_error: Counter::default(),
            id_extraction_error: Counter::default(),
            sign_errors: Family::default(),
            success: Counter::default(),
            root_upgrade_success: Counter::default(),
            root_upgrade_error: Counter::default(),
            root_cert_expiry_timestamp: Gauge::default(),
        };

        registry.register(
            names::CSR_COUNT,
            "The number of CSRs received by the CA server",
            metrics.csr.clone(),
        )?;
        registry.register(
            names::AUTHN_FAILURE_COUNT,
            "The number of authentication failures",
            metrics.authn_error.clone(),
        )?;
        registry.register(
            names::CSR_PARSING_ERR_COUNT,
            "The number of errors occurred when parsing the CSR",
            metrics.csr_parsing_error.clone(),
        )?;
        registry.register(
            names::ID_EXTRACTION_ERR_COUNT,
            "The number of errors occurred when extracting the ID from CSR",
            metrics.id_extraction_error.clone(),
        )?;
        registry.register(
            names::CSR_SIGN_ERR_COUNT,
            "The number of errors occurred when signing the CSR",
            metrics.sign_errors.clone(),
        )?;
        registry.register(
            names::SUCCESS_CERT_ISSUANCE_COUNT,
            "The number of certificates issuances that have succeeded",
            metrics.success.clone(),
        )?;
        registry.register(
            names::ROOT_CERT_EXPIRY_TIMESTAMP,
            "The unix timestamp, in seconds, when the CA root cert will expire. \
             Set to negative in case of internal error",
            metrics.root_cert_expiry_timestamp.clone(),
        )?;
        registry.register(
            names::ROOT_CERT_UPGRADE_COUNT,
            "The number of self-signed root certificate transitions that have succeeded",
            metrics.root_upgrade_success.clone(),
        )?;
        registry.register(
            names::ROOT_CERT_UPGRADE_ERR_COUNT,
            "The number of self-signed root certificate transitions that have failed",
            metrics.root_upgrade_error.clone(),
        )?;

        Ok(metrics)
    }

    /// Records a received CSR.
    pub fn inc_csr(&self) {
        self.csr.inc();
    }

    /// Records an authentication failure.
    pub fn inc_authn_error(&self) {
        self.authn_error.inc();
    }

    /// Records a CSR that could not be parsed.
    pub fn inc_csr_parsing_error(&self) {
        self.csr_parsing_error.inc();
    }

    /// Records a CSR whose identity could not be extracted.
    pub fn inc_id_extraction_error(&self) {
        self.id_extraction_error.inc();
    }

    /// Records a signing failure with the given cause.
    ///
    /// Each distinct `error` opens a new series; pass a small fixed set of
    /// cause strings, never raw error text.
    pub fn inc_sign_error(&self, error: &str) {
        let labels = ErrorLabels {
            error: error.to_string(),
        };
        self.sign_errors.get_or_create(&labels).inc();
    }

    /// Records a successful issuance.
    pub fn inc_success(&self) {
        self.success.inc();
    }

    /// Records a successful root certificate transition.
    pub fn inc_root_upgrade_success(&self) {
        self.root_upgrade_success.inc();
    }

    /// Records a failed root certificate transition.
    pub fn inc_root_upgrade_error(&self) {
        self.root_upgrade_error.inc();
    }

    /// Sets the current root certificate's expiry.
    pub fn set_root_cert_expiry(&self, not_after: DateTime<Utc>) {
        self.root_cert_expiry_timestamp.set(not_after.timestamp());
    }

    /// Marks the root certificate expiry as unknown after an internal error.
    pub fn set_root_cert_expiry_error(&self) {
        warn!("root certificate expiry unknown, reporting sentinel value");
        self.root_cert_expiry_timestamp.set(ROOT_CERT_EXPIRY_UNKNOWN);
    }

    /// Gets the number of received CSRs.
    #[must_use]
    pub fn csr(&self) -> u64 {
        self.csr.get()
    }

    /// Gets the number of authentication failures.
    #[must_use]
    pub fn authn_errors(&self) -> u64 {
        self.authn_error.get()
    }

    /// Gets the number of CSR parsing failures.
    #[must_use]
    pub fn csr_parsing_errors(&self) -> u64 {
        self.csr_parsing_error.get()
    }

    /// Gets the number of identity extraction failures.
    #[must_use]
    pub fn id_extraction_errors(&self) -> u64 {
        self.id_extraction_error.get()
    }

    /// Gets the number of signing failures with the given cause.
    ///
    /// Reading never creates a series for a cause that has not failed.
    #[must_use]
    pub fn sign_errors(&self, error: &str) -> u64 {
        let labels = ErrorLabels {
            error: error.to_string(),
        };
        self.sign_errors.get(&labels).map_or(0, |counter| counter.get())
    }

    /// Gets the number of successful issuances.
    #[must_use]
    pub fn successes(&self) -> u64 {
        self.success.get()
    }

    /// Gets the number of successful root transitions.
    #[must_use]
    pub fn root_upgrade_successes(&self) -> u64 {
        self.root_upgrade_success.get()
    }

    /// Gets the number of failed root transitions.
    #[must_use]
    pub fn root_upgrade_errors(&self) -> u64 {
        self.root_upgrade_error.get()
    }

    /// Gets the root certificate expiry gauge.
    #[must_use]
    pub fn root_cert_expiry(&self) -> i64 {
        self.root_cert_expiry_timestamp.get()
    }
}
