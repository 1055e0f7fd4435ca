//! Root certificate rotation checks.

use tracing::debug;

use crate::types::Certificate;

/// Returns `true` if `candidate` supersedes `incumbent` as the trust anchor.
///
/// The candidate is newer iff its `not_before` is strictly after the
/// incumbent's. Unparsable input on either side is never treated as newer,
/// so a corrupt root never replaces a working one.
#[must_use]
pub fn is_newer(candidate_pem: &[u8], incumbent_pem: &[u8]) -> bool {
    let candidate = match Certificate::from_pem(candidate_pem) {
        Ok(cert) => cert,
        Err(e) => {
            debug!(error = %e, "candidate root certificate is unparsable");
            return false;
        }
    };
    let incumbent = match Certificate::from_pem(incumbent_pem) {
        Ok(cert) => cert,
        Err(e) => {
            debug!(error = %e, "incumbent root certificate is unparsable");
            return false;
        }
    };

    is_newer_certificate(&candidate, &incumbent)
}

/// Same as [`is_newer`] for already-parsed certificates.
#[must_use]
pub fn is_newer_certificate(candidate: &Certificate, incumbent: &Certificate) -> bool {
    candidate.not_before() > incumbent.not_before()
}
