//! [`ChaosTransfer`] wraps any [`OwnershipTransfer`] implementation to simulate an unreliable
//! host: requests that are silently lost (the acknowledgement never comes) and requests that
//! are delivered twice (the acknowledgement comes twice).
//!
//! Decisions come from a seeded [`Pcg32`], so a scenario replays identically for a given seed.
//!
//! # Example
//!
//! ```
//! use fortress_pool::{ChannelTransfer, ChaosConfig, ChaosTransfer, Config};
//!
//! # #[derive(Debug)]
//! # struct GameConfig;
//! # impl Config for GameConfig {
//! #     type Resource = u32;
//! # }
//! let (inner, _requests) = ChannelTransfer::<GameConfig>::new();
//! let transfer = ChaosTransfer::new(inner, ChaosConfig::lossy(0.2).with_seed(42));
//! assert_eq!(transfer.stats().requests, 0);
//! ```

use parking_lot::Mutex;

use crate::rng::Pcg32;
use crate::{Config, OwnershipTransfer, TransferRequest};

/// Configuration for host fault simulation.
///
/// All rates default to 0.0 (no effect).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChaosConfig {
    /// Probability of dropping a request (0.0 - 1.0, default: 0.0).
    pub drop_rate: f64,

    /// Probability of delivering a request twice (0.0 - 1.0, default: 0.0).
    pub duplicate_rate: f64,

    /// Seed of the decision generator (default: 0).
    pub seed: u64,
}

impl Default for ChaosConfig {
    fn default() -> Self {
        Self {
            drop_rate: 0.0,
            duplicate_rate: 0.0,
            seed: 0,
        }
    }
}

impl ChaosConfig {
    /// Creates a config with no chaos (passthrough mode).
    pub fn passthrough() -> Self {
        Self::default()
    }

    /// Creates a config that drops the given share of requests.
    pub fn lossy(drop_rate: f64) -> Self {
        Self {
            drop_rate,
            ..Self::default()
        }
    }

    /// Creates a config simulating a host that both loses and repeats requests.
    pub fn flaky() -> Self {
        Self {
            drop_rate: 0.15,
            duplicate_rate: 0.05,
            ..Self::default()
        }
    }

    /// Returns the config with the given seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// Counters of what a [`ChaosTransfer`] did to the requests passing through it.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ChaosStats {
    /// Requests handed to the wrapper.
    pub requests: u64,
    /// Requests that were swallowed.
    pub dropped: u64,
    /// Requests that were delivered twice.
    pub duplicated: u64,
}

/// Wraps any [`OwnershipTransfer`] implementation to drop or duplicate requests.
pub struct ChaosTransfer<X> {
    inner: X,
    config: ChaosConfig,
    state: Mutex<(Pcg32, ChaosStats)>,
}

impl<X> std::fmt::Debug for ChaosTransfer<X> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChaosTransfer")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl<X> ChaosTransfer<X> {
    /// Wraps `inner`.
    pub fn new(inner: X, config: ChaosConfig) -> Self {
        Self {
            inner,
            config,
            state: Mutex::new((Pcg32::seed_from_u64(config.seed), ChaosStats::default())),
        }
    }

    /// The wrapped transfer.
    pub fn inner(&self) -> &X {
        &self.inner
    }

    /// The active configuration.
    pub fn config(&self) -> &ChaosConfig {
        &self.config
    }

    /// A snapshot of the counters.
    pub fn stats(&self) -> ChaosStats {
        self.state.lock().1
    }
}

impl<T, X> OwnershipTransfer<T> for ChaosTransfer<X>
where
    T: Config,
    X: OwnershipTransfer<T>,
{
    fn transfer_ownership(&self, request: TransferRequest<T>) {
        let (lose, repeat) = {
            let mut state = self.state.lock();
            let (rng, stats) = &mut *state;
            stats.requests += 1;
            let lose = rng.gen_bool(self.config.drop_rate);
            let repeat = rng.gen_bool(self.config.duplicate_rate);
            if lose {
                stats.dropped += 1;
            } else if repeat {
                stats.duplicated += 1;
            }
            (lose, repeat)
        };

        if lose {
            tracing::debug!(
                resource_type = %request.resource_type,
                slot = request.slot,
                generation = %request.generation,
                "chaos: dropping transfer request"
            );
            return;
        }
        if repeat {
            self.inner.transfer_ownership(request.clone());
        }
        self.inner.transfer_ownership(request);
    }
}
