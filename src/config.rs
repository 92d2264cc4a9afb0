//! Configuration types for claims and cleanups.
//!
//! # Overview
//!
//! | Config Type | Purpose | Key Presets |
//! |-------------|---------|-------------|
//! | `ClaimConfig` | Attempt count, backoff and bounce pacing | `lan()`, `high_latency()`, `competitive()` |
//! | `CleanupConfig` | How long a transfer back to the system may take | `lan()`, `patient()` |
//!
//! # Example
//!
//! ```
//! use fortress_pool::{ClaimConfig, CleanupConfig};
//! use web_time::Duration;
//!
//! let claim = ClaimConfig {
//!     max_attempts: 5,
//!     ..ClaimConfig::high_latency()
//! };
//! assert!(claim.validate().is_ok());
//! assert_eq!(claim.attempt_timeout(1), Duration::from_secs(4));
//!
//! let cleanup = CleanupConfig::lan();
//! assert!(cleanup.timeout < CleanupConfig::default().timeout);
//! ```

use web_time::Duration;

use crate::PoolError;

/// Every claim makes at least this many attempts, whatever `max_attempts` says.
///
/// The first ownership transfer against a freshly started pool fails disproportionately
/// often, so a single attempt is never enough.
pub const MIN_CLAIM_ATTEMPTS: u32 = 2;

/// Upper bound accepted for `max_attempts`.
const MAX_CLAIM_ATTEMPTS: u32 = 16;

/// Configuration of the claim attempt loop.
///
/// The deadline of attempt `n` (1-based) is `min(2^n × base_timeout, max_timeout)`.
///
/// # Forward Compatibility
///
/// New fields may be added to this struct in future versions. Always use the
/// `..ClaimConfig::default()` pattern when constructing instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "ClaimConfig has no effect unless passed to PoolManagerBuilder::with_claim_config()"]
pub struct ClaimConfig {
    /// Backoff unit. Attempt `n` waits `2^n` of these for its acknowledgement.
    ///
    /// Default: 1s
    pub base_timeout: Duration,

    /// Cap on a single attempt's deadline.
    ///
    /// Default: 16s
    pub max_timeout: Duration,

    /// Number of attempts before giving up. Values below [`MIN_CLAIM_ATTEMPTS`] are raised to it.
    ///
    /// Default: 3
    pub max_attempts: u32,

    /// Pause before each hop of a bounce, letting the current registration settle.
    ///
    /// Default: 100ms
    pub bounce_delay: Duration,
}

impl Default for ClaimConfig {
    fn default() -> Self {
        Self {
            base_timeout: Duration::from_secs(1),
            max_timeout: Duration::from_secs(16),
            max_attempts: 3,
            bounce_delay: Duration::from_millis(100),
        }
    }
}

impl ClaimConfig {
    /// Creates a new `ClaimConfig` with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration preset for a host on the local network.
    ///
    /// Acknowledgements arrive within a few frames, so deadlines are short.
    pub fn lan() -> Self {
        Self {
            base_timeout: Duration::from_millis(250),
            max_timeout: Duration::from_secs(2),
            max_attempts: 3,
            bounce_delay: Duration::from_millis(50),
        }
    }

    /// Configuration preset for slow or congested hosts.
    ///
    /// Longer deadlines and more attempts; onboarding may take much longer to fail.
    pub fn high_latency() -> Self {
        Self {
            base_timeout: Duration::from_secs(2),
            max_timeout: Duration::from_secs(30),
            max_attempts: 5,
            bounce_delay: Duration::from_millis(200),
        }
    }

    /// Configuration preset that fails fast.
    ///
    /// Uses the minimum number of attempts; a player that cannot be onboarded quickly is
    /// removed instead of delaying the match.
    pub fn competitive() -> Self {
        Self {
            base_timeout: Duration::from_millis(500),
            max_timeout: Duration::from_secs(4),
            max_attempts: MIN_CLAIM_ATTEMPTS,
            bounce_delay: Duration::from_millis(50),
        }
    }

    /// The number of attempts a claim actually makes.
    ///
    /// ```
    /// use fortress_pool::{ClaimConfig, MIN_CLAIM_ATTEMPTS};
    ///
    /// let config = ClaimConfig { max_attempts: 1, ..ClaimConfig::default() };
    /// assert_eq!(config.effective_max_attempts(), MIN_CLAIM_ATTEMPTS);
    /// ```
    #[must_use]
    pub fn effective_max_attempts(&self) -> u32 {
        self.max_attempts.max(MIN_CLAIM_ATTEMPTS)
    }

    /// The acknowledgement deadline of the given 1-based attempt.
    ///
    /// ```
    /// use fortress_pool::ClaimConfig;
    /// use web_time::Duration;
    ///
    /// let config = ClaimConfig::default();
    /// assert_eq!(config.attempt_timeout(1), Duration::from_secs(2));
    /// assert_eq!(config.attempt_timeout(2), Duration::from_secs(4));
    /// assert_eq!(config.attempt_timeout(10), config.max_timeout);
    /// ```
    #[must_use]
    pub fn attempt_timeout(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_timeout
            .checked_mul(factor)
            .map_or(self.max_timeout, |timeout| timeout.min(self.max_timeout))
    }

    /// Validates the claim configuration.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::InvalidConfig` if any configuration value is out of range.
    pub fn validate(&self) -> Result<(), PoolError> {
        if self.base_timeout < Duration::from_millis(1) {
            return Err(PoolError::InvalidConfig {
                field: "base_timeout",
                info: format!(
                    "must be at least 1ms, got {}ms",
                    self.base_timeout.as_millis()
                ),
            });
        }
        if self.max_timeout < self.base_timeout {
            return Err(PoolError::InvalidConfig {
                field: "max_timeout",
                info: format!(
                    "must not be shorter than base_timeout ({}ms < {}ms)",
                    self.max_timeout.as_millis(),
                    self.base_timeout.as_millis()
                ),
            });
        }
        if self.max_attempts > MAX_CLAIM_ATTEMPTS {
            return Err(PoolError::InvalidConfig {
                field: "max_attempts",
                info: format!(
                    "must be at most {}, got {}",
                    MAX_CLAIM_ATTEMPTS, self.max_attempts
                ),
            });
        }
        // Both bounce hops must fit into the shortest attempt
        if self.bounce_delay.saturating_mul(2) >= self.attempt_timeout(1) {
            return Err(PoolError::InvalidConfig {
                field: "bounce_delay",
                info: format!(
                    "two bounce hops ({}ms each) do not fit into the first attempt ({}ms)",
                    self.bounce_delay.as_millis(),
                    self.attempt_timeout(1).as_millis()
                ),
            });
        }
        Ok(())
    }
}

/// Configuration of transfers back to the system authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "CleanupConfig has no effect unless passed to PoolManagerBuilder::with_cleanup_config()"]
pub struct CleanupConfig {
    /// How long a cleanup waits for the instance to re-register under the system authority.
    ///
    /// Default: 5s
    pub timeout: Duration,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
        }
    }
}

impl CleanupConfig {
    /// Creates a new `CleanupConfig` with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration preset for a host on the local network.
    pub fn lan() -> Self {
        Self {
            timeout: Duration::from_secs(1),
        }
    }

    /// Configuration preset for slow hosts.
    pub fn patient() -> Self {
        Self {
            timeout: Duration::from_secs(15),
        }
    }

    /// Validates the cleanup configuration.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::InvalidConfig` if the timeout lies outside 1ms to 5 minutes.
    pub fn validate(&self) -> Result<(), PoolError> {
        if self.timeout < Duration::from_millis(1) || self.timeout > Duration::from_secs(300) {
            return Err(PoolError::InvalidConfig {
                field: "timeout",
                info: format!(
                    "must lie between 1ms and 300000ms, got {}ms",
                    self.timeout.as_millis()
                ),
            });
        }
        Ok(())
    }
}
