//! Certificate lifecycle timing for Clawbernetes workload identity.
#![forbid(unsafe_code)]
//!
//! This crate answers the two questions a long-lived renewal loop asks about
//! the certificates it holds:
//!
//! - How long may I wait before renewing this certificate?
//! - Is this freshly observed root certificate newer than the one I trust?
//!
//! Both checks are pure functions of their inputs and safe to call from any
//! number of threads.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use chrono::Utc;
//! use claw_pki::{is_newer, RenewalPolicy, RenewalSchedule};
//!
//! # fn load(_: &str) -> Vec<u8> { Vec::new() }
//! let policy = RenewalPolicy::new(50).unwrap();
//! let leaf = load("leaf.pem");
//!
//! match policy.time_to_renew(&leaf, Utc::now(), Duration::from_secs(600)) {
//!     Ok(wait) => println!("renew in {wait:?}"),
//!     Err(e) if e.is_temporal() => println!("renew immediately: {e}"),
//!     Err(e) => println!("unusable certificate: {e}"),
//! }
//!
//! let (current_root, observed_root) = (load("root.pem"), load("new-root.pem"));
//! if is_newer(&observed_root, &current_root) {
//!     println!("swap trust anchor");
//! }
//! ```
//!
//! # Modules
//!
//! - [`renewal`] - Renewal policy and wait-time computation
//! - [`rotation`] - Root certificate rotation checks
//! - [`types`] - Parsed certificate view
//! - [`error`] - Error types

pub mod error;
pub mod renewal;
pub mod rotation;
pub mod types;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use renewal::{RenewalPolicy, RenewalSchedule};
pub use rotation::{is_newer, is_newer_certificate};
pub use types::Certificate;
