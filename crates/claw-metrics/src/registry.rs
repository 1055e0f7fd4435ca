//! Prometheus registry that refuses to register a metric name twice.
//!
//! `prometheus-client` happily accepts duplicate registrations and then
//! exposes two series with the same name. The trust-lifecycle metric names
//! are an operational contract, so [`MetricsRegistry`] tracks every name it
//! has seen and turns a second registration into
//! [`MetricsError::DuplicateMetric`].

use std::collections::HashSet;
use std::io::Write;
use std::sync::Arc;

use parking_lot::RwLock;
use prometheus_client::encoding::text::encode;
use prometheus_client::registry::{Metric, Registry};
use tracing::debug;

use crate::error::{MetricsError, Result};

struct Inner {
    registry: Registry,
    names: HashSet<String>,
}

/// Process-wide metrics registry.
///
/// Created once during startup and handed to every component that records
/// outcomes. Clones share the same underlying registry.
#[derive(Clone)]
pub struct MetricsRegistry {
    inner: Arc<RwLock<Inner>>,
}

impl std::fmt::Debug for MetricsRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsRegistry")
            .field("metrics", &self.inner.read().names.len())
            .finish_non_exhaustive()
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner {
                registry: Registry::default(),
                names: HashSet::new(),
            })),
        }
    }

    /// Registers a metric under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError::InvalidMetricName`] if `name` is not a valid
    /// Prometheus metric name and [`MetricsError::DuplicateMetric`] if it was
    /// registered before.
    pub fn register(&self, name: &str, help: &str, metric: impl Metric) -> Result<()> {
        validate_name(name)?;

        let mut inner = self.inner.write();
        if !inner.names.insert(name.to_string()) {
            return Err(MetricsError::DuplicateMetric {
                name: name.to_string(),
            });
        }
        inner.registry.register(name, help, metric);
        debug!(metric = name, "registered metric");

        Ok(())
    }

    /// Checks that every name in `names` is valid and free, registering
    /// nothing.
    ///
    /// # Errors
    ///
    /// Returns the error [`MetricsRegistry::register`] would return for the
    /// first offending name, including a name repeated within `names`.
    pub fn check_available(&self, names: &[&str]) -> Result<()> {
        let inner = self.inner.read();
        let mut seen = HashSet::with_capacity(names.len());
        for &name in names {
            validate_name(name)?;
            if inner.names.contains(name) || !seen.insert(name) {
                return Err(MetricsError::DuplicateMetric {
                    name: name.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Returns `true` if a metric named `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.inner.read().names.contains(name)
    }

    /// Encodes all metrics in Prometheus text format.
    ///
    /// This output can be served directly from a `/metrics` HTTP endpoint.
    #[must_use]
    pub fn encode(&self) -> String {
        let inner = self.inner.read();
        let mut buffer = String::new();
        if encode(&mut buffer, &inner.registry).is_err() {
            tracing::error!("failed to encode prometheus metrics");
            return String::new();
        }
        buffer
    }

    /// Writes the encoded metrics to `writer`.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_all(self.encode().as_bytes())
    }

    /// Returns the Content-Type header value for Prometheus metrics.
    #[must_use]
    pub const fn content_type() -> &'static str {
        "text/plain; version=0.0.4; charset=utf-8"
    }
}

fn validate_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return Err(MetricsError::InvalidMetricName {
            reason: "empty name".to_string(),
        });
    };
    if !(first.is_ascii_alphabetic() || first == '_' || first == ':') {
        return Err(MetricsError::InvalidMetricName {
            reason: format!("'{name}' must start with a letter, '_' or ':'"),
        });
    }
    if let Some(bad) = chars.find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == ':')) {
        return Err(MetricsError::InvalidMetricName {
            reason: format!("'{name}' contains invalid character '{bad}'"),
        });
    }
    Ok(())
}
