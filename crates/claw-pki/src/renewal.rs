//! Certificate renewal timing.
//!
//! A certificate is renewed once it enters its grace period: the trailing
//! slice of its validity window sized as a percentage of the total lifetime,
//! never shorter than a caller-supplied floor.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::types::Certificate;

/// Computes how long a renewal loop may wait before renewing a certificate.
pub trait RenewalSchedule: Send + Sync {
    /// Returns the duration to wait before the certificate in `cert_pem`
    /// should be renewed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] for malformed input, [`Error::Expired`] if
    /// the certificate already expired and [`Error::RenewNow`] if it is
    /// inside its grace period.
    fn time_to_renew(
        &self,
        cert_pem: &[u8],
        now: DateTime<Utc>,
        min_grace_period: Duration,
    ) -> Result<Duration>;
}

/// Renewal policy shared by every certificate of one class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenewalPolicy {
    /// Share of the validity window, in percent, reserved as grace period.
    grace_period_percentage: u8,
}

impl RenewalPolicy {
    /// Creates a new renewal policy.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidGracePeriod`] if `grace_period_percentage`
    /// is above 100.
    pub fn new(grace_period_percentage: u8) -> Result<Self> {
        if grace_period_percentage > 100 {
            return Err(Error::InvalidGracePeriod(grace_period_percentage));
        }
        Ok(Self {
            grace_period_percentage,
        })
    }

    /// Returns the grace period percentage.
    #[must_use]
    pub const fn grace_period_percentage(&self) -> u8 {
        self.grace_period_percentage
    }

    /// Returns the grace period applied to `cert`, floored at `min_grace_period`.
    #[must_use]
    pub fn grace_period(&self, cert: &Certificate, min_grace_period: Duration) -> Duration {
        let lifetime_ms = cert.lifetime().num_milliseconds().max(0);
        let grace_ms = lifetime_ms * i64::from(self.grace_period_percentage) / 100;
        let grace = Duration::from_millis(grace_ms.unsigned_abs());

        grace.max(min_grace_period)
    }

    /// Computes the wait time for an already-parsed certificate.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Expired`] if `now` is past the certificate's expiry
    /// and [`Error::RenewNow`] if the certificate is inside its grace period.
    pub fn time_to_renew_certificate(
        &self,
        cert: &Certificate,
        now: DateTime<Utc>,
        min_grace_period: Duration,
    ) -> Result<Duration> {
        let not_after = cert.not_after();
        let time_to_expire = (not_after - now).to_std().map_err(|_| Error::Expired {
            not_after,
            now,
        })?;

        let grace_period = self.grace_period(cert, min_grace_period);

        // Zero wait is legitimate; only a negative wait means renewal is late.
        let wait = time_to_expire
            .checked_sub(grace_period)
            .ok_or(Error::RenewNow {
                not_after,
                grace_period,
                now,
            })?;

        debug!(
            subject = cert.subject(),
            %not_after,
            grace_period_secs = grace_period.as_secs(),
            wait_secs = wait.as_secs(),
            "computed certificate renewal wait time"
        );

        Ok(wait)
    }
}

impl Default for RenewalPolicy {
    fn default() -> Self {
        Self {
            grace_period_percentage: 50,
        }
    }
}

impl RenewalSchedule for RenewalPolicy {
    fn time_to_renew(
        &self,
        cert_pem: &[u8],
        now: DateTime<Utc>,
        min_grace_period: Duration,
    ) -> Result<Duration> {
        let cert = Certificate::from_pem(cert_pem)?;
        self.time_to_renew_certificate(&cert, now, min_grace_period)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::testutil::{pem_cert, t0};
    use chrono::Duration as ChronoDuration;
    use proptest::prelude::*;
    use test_case::test_case;

    fn cert(lifetime_secs: i64) -> Certificate {
        Certificate::new(
            vec![],
            t0(),
            t0() + ChronoDuration::seconds(lifetime_secs),
            "workload".into(),
            "ca".into(),
        )
    }

    fn at(offset_secs: i64) -> DateTime<Utc> {
        t0() + ChronoDuration::seconds(offset_secs)
    }

    #[test]
    fn policy_rejects_percentage_above_100() {
        assert!(matches!(
            RenewalPolicy::new(101),
            Err(Error::InvalidGracePeriod(101))
        ));
        assert!(RenewalPolicy::new(100).is_ok());
        assert!(RenewalPolicy::new(0).is_ok());
    }

    #[test]
    fn policy_default() {
        assert_eq!(RenewalPolicy::default().grace_period_percentage(), 50);
    }

    #[test]
    fn policy_serialization() {
        let policy = RenewalPolicy::new(20).unwrap();
        let json = serde_json::to_string(&policy).unwrap();
        assert_eq!(json, r#"{"grace_period_percentage":20}"#);

        let deserialized: RenewalPolicy = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, policy);
    }

    #[test_case(20, 50, 5, 30 ; "percentage exceeds floor")]
    #[test_case(0, 50, 5, 45 ; "zero percentage uses floor")]
    #[test_case(20, 50, 40, 10 ; "floor exceeds percentage")]
    #[test_case(20, 0, 5, 80 ; "fresh certificate")]
    #[test_case(100, 0, 0, 0 ; "whole lifetime is grace")]
    fn wait_time(percentage: u8, now_offset: i64, min_grace_secs: u64, expected_secs: u64) {
        let policy = RenewalPolicy::new(percentage).unwrap();
        let wait = policy
            .time_to_renew_certificate(
                &cert(100),
                at(now_offset),
                Duration::from_secs(min_grace_secs),
            )
            .unwrap();
        assert_eq!(wait, Duration::from_secs(expected_secs));
    }

    #[test]
    fn zero_wait_is_not_an_error() {
        let policy = RenewalPolicy::new(20).unwrap();
        let wait = policy
            .time_to_renew_certificate(&cert(100), at(80), Duration::from_secs(5))
            .unwrap();
        assert_eq!(wait, Duration::ZERO);
    }

    #[test]
    fn scenario_wait_thirty_seconds() {
        let policy = RenewalPolicy::new(20).unwrap();
        let pem = pem_cert(t0(), at(100));

        let wait = policy
            .time_to_renew(&pem, at(50), Duration::from_secs(5))
            .unwrap();
        assert_eq!(wait, Duration::from_secs(30));
    }

    #[test]
    fn scenario_inside_grace_window() {
        let policy = RenewalPolicy::new(20).unwrap();
        let pem = pem_cert(t0(), at(100));

        let err = policy
            .time_to_renew(&pem, at(95), Duration::from_secs(5))
            .unwrap_err();
        match err {
            Error::RenewNow {
                not_after,
                grace_period,
                now,
            } => {
                assert_eq!(not_after, at(100));
                assert_eq!(grace_period, Duration::from_secs(20));
                assert_eq!(now, at(95));
            }
            other => panic!("expected RenewNow, got {other:?}"),
        }
    }

    #[test]
    fn expired_certificate() {
        let policy = RenewalPolicy::new(20).unwrap();
        let pem = pem_cert(t0(), at(100));

        let err = policy
            .time_to_renew(&pem, at(101), Duration::ZERO)
            .unwrap_err();
        assert!(matches!(err, Error::Expired { not_after, now } if not_after == at(100) && now == at(101)));
    }

    #[test]
    fn malformed_pem_is_parse_error() {
        let policy = RenewalPolicy::default();
        let err = policy
            .time_to_renew(b"garbage", t0(), Duration::ZERO)
            .unwrap_err();
        assert!(err.is_parse());
        assert!(!err.is_temporal());
    }

    #[test]
    fn schedule_is_object_safe() {
        let schedule: Box<dyn RenewalSchedule> = Box::new(RenewalPolicy::new(20).unwrap());
        let pem = pem_cert(t0(), at(100));
        assert_eq!(
            schedule
                .time_to_renew(&pem, at(50), Duration::from_secs(5))
                .unwrap(),
            Duration::from_secs(30)
        );
    }

    proptest! {
        #[test]
        fn prop_wait_is_shorter_than_time_to_expiry(
            lifetime in 1i64..10_000_000,
            elapsed_permille in 0i64..1000,
            percentage in 0u8..=100,
            min_grace in 0u64..1_000_000,
        ) {
            let policy = RenewalPolicy::new(percentage).unwrap();
            let now = at(lifetime * elapsed_permille / 1000);
            let remaining = (t0() + ChronoDuration::seconds(lifetime) - now).to_std().unwrap();

            match policy.time_to_renew_certificate(&cert(lifetime), now, Duration::from_secs(min_grace)) {
                Ok(wait) => prop_assert!(wait <= remaining),
                Err(err) => prop_assert!(matches!(err, Error::RenewNow { .. }), "unexpected error: {:?}", err),
            }
        }

        #[test]
        fn prop_wait_strictly_shorter_with_nonzero_grace(
            lifetime in 1i64..10_000_000,
            elapsed_permille in 0i64..1000,
            percentage in 0u8..=100,
            min_grace in 1u64..1_000_000,
        ) {
            let policy = RenewalPolicy::new(percentage).unwrap();
            let now = at(lifetime * elapsed_permille / 1000);
            let remaining = (t0() + ChronoDuration::seconds(lifetime) - now).to_std().unwrap();

            if let Ok(wait) = policy.time_to_renew_certificate(&cert(lifetime), now, Duration::from_secs(min_grace)) {
                prop_assert!(wait < remaining);
            }
        }

        #[test]
        fn prop_expired_certificates_always_fail(
            lifetime in 1i64..10_000_000,
            past_expiry in 1i64..10_000_000,
            percentage in 0u8..=100,
        ) {
            let policy = RenewalPolicy::new(percentage).unwrap();
            let result = policy.time_to_renew_certificate(&cert(lifetime), at(lifetime + past_expiry), Duration::ZERO);
            prop_assert!(matches!(result, Err(Error::Expired { .. })), "expected Expired error");
        }

        #[test]
        fn prop_larger_floor_never_increases_wait(
            lifetime in 1i64..10_000_000,
            elapsed_permille in 0i64..1000,
            percentage in 0u8..=100,
            floor_a in 0u64..1_000_000,
            floor_b in 0u64..1_000_000,
        ) {
            let policy = RenewalPolicy::new(percentage).unwrap();
            let now = at(lifetime * elapsed_permille / 1000);
            let (low, high) = if floor_a <= floor_b { (floor_a, floor_b) } else { (floor_b, floor_a) };
            let c = cert(lifetime);

            let wait_low = policy.time_to_renew_certificate(&c, now, Duration::from_secs(low));
            let wait_high = policy.time_to_renew_certificate(&c, now, Duration::from_secs(high));
            match (wait_low, wait_high) {
                (Ok(lo), Ok(hi)) => prop_assert!(hi <= lo),
                (Err(_), Ok(_)) => prop_assert!(false, "larger floor succeeded where smaller failed"),
                _ => {}
            }
        }
    }
}
