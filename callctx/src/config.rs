//! Validated configuration for contexts and the outstanding-call table.
//!
//! Parameters are `nutype` newtypes, so an invalid configuration cannot be
//! constructed; deserialized configuration is validated on the way in.

use nutype::nutype;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::types::DEFAULT_TIMEOUT;

/// A request timeout in milliseconds.
///
/// Validated to be at most 24 hours. Zero is allowed and means "no deadline"
/// when the timeout is bridged into a [`crate::scope::CallScope`].
#[nutype(
    validate(less_or_equal = 86_400_000),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Into,
        Serialize,
        Deserialize
    )
)]
pub struct TimeoutMs(u64);

impl TimeoutMs {
    /// Convert to a `Duration`.
    pub fn as_duration(self) -> Duration {
        Duration::from_millis(self.into())
    }
}

/// Maximum number of calls that may await a reply on one connection.
///
/// Validated to be between 1 and 1,000,000.
#[nutype(
    validate(greater_or_equal = 1, less_or_equal = 1_000_000),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Into,
        Serialize,
        Deserialize
    )
)]
pub struct MaxPendingCalls(usize);

/// Configuration shared by contexts and the demultiplexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallConfig {
    /// Timeout written into new contexts, and used when `_timeout` is unusable.
    pub default_timeout: TimeoutMs,
    /// Limit on outstanding calls per [`crate::demux::PendingCalls`].
    pub max_pending_calls: MaxPendingCalls,
}

impl CallConfig {
    /// Create a configuration with safe defaults: a 5 second timeout and up
    /// to 10,000 outstanding calls.
    ///
    /// # Errors
    ///
    /// Returns validation errors if any of the default values are invalid
    /// (which should never happen with proper constants).
    pub fn new() -> Result<Self, Box<dyn std::error::Error>> {
        let default_timeout = u64::try_from(DEFAULT_TIMEOUT.as_millis())?;
        Ok(Self {
            default_timeout: TimeoutMs::try_new(default_timeout)?,
            max_pending_calls: MaxPendingCalls::try_new(10_000)?,
        })
    }

    /// Set the default timeout.
    #[must_use]
    pub const fn with_default_timeout(mut self, timeout: TimeoutMs) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Set the outstanding-call limit.
    #[must_use]
    pub const fn with_max_pending_calls(mut self, limit: MaxPendingCalls) -> Self {
        self.max_pending_calls = limit;
        self
    }
}

impl Default for CallConfig {
    fn default() -> Self {
        Self::new().expect("Default call configuration should always be valid")
    }
}
