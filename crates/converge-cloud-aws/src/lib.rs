//! AWS CloudControl provider for Converge
//!
//! Drives resources through the `aws cloudcontrol` CLI under ambient AWS
//! credentials. CloudControl is uniformly asynchronous: create, update
//! and delete answer with a progress event whose request token is polled
//! to a terminal status, and update is patch-based (RFC 6902 against the
//! freshly read upstream state).

pub mod cloudcontrol;
pub mod provider;

// Re-exports
pub use cloudcontrol::{classify, parse_properties, CloudControlCli, RATE_LIMIT_MARKERS};
pub use provider::{default_string_typed_props, AwsCloudControlProvider, StringTypedProps};
