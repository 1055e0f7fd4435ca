//! Read-only view of an X.509 certificate's validity window.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use x509_parser::prelude::*;

use crate::error::{Error, Result};

const PEM_CERTIFICATE_LABEL: &str = "CERTIFICATE";

/// A DER-encoded X.509 certificate with the metadata the trust lifecycle reads.
///
/// Certificates are never mutated; they are parsed from the bytes handed over
/// by the CA server or the renewal loop and inspected for their validity
/// window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Certificate {
    /// DER-encoded certificate bytes.
    der: Vec<u8>,
    /// Certificate validity start time.
    not_before: DateTime<Utc>,
    /// Certificate validity end time.
    not_after: DateTime<Utc>,
    /// Subject common name, empty when absent.
    subject: String,
    /// Issuer common name, empty when absent.
    issuer: String,
}

impl Certificate {
    /// Creates a certificate from raw DER bytes and metadata.
    #[must_use]
    pub const fn new(
        der: Vec<u8>,
        not_before: DateTime<Utc>,
        not_after: DateTime<Utc>,
        subject: String,
        issuer: String,
    ) -> Self {
        Self {
            der,
            not_before,
            not_after,
            subject,
            issuer,
        }
    }

    /// Parses the first `CERTIFICATE` block of a PEM-encoded byte sequence.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] if no PEM block is found, the block is not a
    /// certificate, or its contents are not a valid X.509 certificate.
    pub fn from_pem(pem: &[u8]) -> Result<Self> {
        let (_, block) = x509_parser::pem::parse_x509_pem(pem)
            .map_err(|e| Error::Parse(format!("failed to decode PEM: {e}")))?;

        if block.label != PEM_CERTIFICATE_LABEL {
            return Err(Error::Parse(format!(
                "unexpected PEM block '{}', expected '{PEM_CERTIFICATE_LABEL}'",
                block.label
            )));
        }

        Self::from_der(&block.contents)
    }

    /// Parses a certificate from DER-encoded bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] if parsing fails.
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let (_, cert) = X509Certificate::from_der(der)
            .map_err(|e| Error::Parse(format!("failed to parse certificate: {e}")))?;

        let not_before = DateTime::from_timestamp(cert.validity().not_before.timestamp(), 0)
            .ok_or_else(|| Error::Parse("invalid not_before timestamp".into()))?;
        let not_after = DateTime::from_timestamp(cert.validity().not_after.timestamp(), 0)
            .ok_or_else(|| Error::Parse("invalid not_after timestamp".into()))?;

        Ok(Self {
            der: der.to_vec(),
            not_before,
            not_after,
            subject: common_name(cert.subject()),
            issuer: common_name(cert.issuer()),
        })
    }

    /// Returns the DER-encoded certificate bytes.
    #[must_use]
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// Returns the PEM-encoded certificate.
    #[must_use]
    pub fn pem(&self) -> String {
        use base64::Engine;
        let b64 = base64::engine::general_purpose::STANDARD.encode(&self.der);
        format!(
            "-----BEGIN CERTIFICATE-----\n{}\n-----END CERTIFICATE-----\n",
            b64.as_bytes()
                .chunks(64)
                .map(|chunk| std::str::from_utf8(chunk).unwrap_or(""))
                .collect::<Vec<_>>()
                .join("\n")
        )
    }

    /// Returns the certificate validity start time.
    #[must_use]
    pub const fn not_before(&self) -> DateTime<Utc> {
        self.not_before
    }

    /// Returns the certificate validity end time.
    #[must_use]
    pub const fn not_after(&self) -> DateTime<Utc> {
        self.not_after
    }

    /// Returns the total validity window (`not_after - not_before`).
    #[must_use]
    pub fn lifetime(&self) -> chrono::Duration {
        self.not_after - self.not_before
    }

    /// Returns the subject common name.
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Returns the issuer common name.
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }
}

/// Workload certificates often carry an empty subject; that is not an error.
fn common_name(name: &X509Name<'_>) -> String {
    name.iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .map(String::from)
        .unwrap_or_default()
}
