use std::collections::BTreeSet;
use std::sync::Arc;

use crate::{
    pool::manager::PoolManager, telemetry::ViolationObserver, ClaimConfig, CleanupConfig, Config,
    OwnershipTransfer, PoolError, ResourceTypeId,
};

/// Default number of player slots per pool.
const DEFAULT_MAX_PLAYERS: usize = 8;
/// Upper bound on player slots. Pools are pre-created, so every slot costs one host object
/// per resource type.
const MAX_PLAYERS_LIMIT: usize = 1024;

/// The [`PoolManagerBuilder`] declares the pools and configures a [`PoolManager`] before it
/// is built.
///
/// The builder only records settings; everything is validated in [`build`](Self::build).
pub struct PoolManagerBuilder<T>
where
    T: Config,
{
    max_players: usize,
    resource_types: Vec<ResourceTypeId>,
    claim_config: ClaimConfig,
    cleanup_config: CleanupConfig,
    violation_observer: Option<Arc<dyn ViolationObserver>>,
    _config: std::marker::PhantomData<T>,
}

impl<T: Config> std::fmt::Debug for PoolManagerBuilder<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Destructure to ensure all fields are included when new fields are added.
        let Self {
            max_players,
            resource_types,
            claim_config,
            cleanup_config,
            violation_observer,
            _config,
        } = self;

        f.debug_struct("PoolManagerBuilder")
            .field("max_players", max_players)
            .field("resource_types", resource_types)
            .field("claim_config", claim_config)
            .field("cleanup_config", cleanup_config)
            .field("has_violation_observer", &violation_observer.is_some())
            .finish()
    }
}

impl<T: Config> Default for PoolManagerBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Config> PoolManagerBuilder<T> {
    /// Construct a new builder with all values set to their defaults.
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_players: DEFAULT_MAX_PLAYERS,
            resource_types: Vec::new(),
            claim_config: ClaimConfig::default(),
            cleanup_config: CleanupConfig::default(),
            violation_observer: None,
            _config: std::marker::PhantomData,
        }
    }

    /// Change the maximum number of players, which is also the size of every pool. Default is 8.
    pub fn with_max_players(mut self, max_players: usize) -> Self {
        self.max_players = max_players;
        self
    }

    /// Declares a pool for `resource_type`.
    pub fn with_pool(mut self, resource_type: impl Into<ResourceTypeId>) -> Self {
        self.resource_types.push(resource_type.into());
        self
    }

    /// Declares a pool for each of the given resource types.
    ///
    /// # Example
    ///
    /// ```
    /// use fortress_pool::{Config, PoolManagerBuilder};
    ///
    /// # #[derive(Debug)]
    /// # struct MyConfig;
    /// # impl Config for MyConfig {
    /// #     type Resource = u64;
    /// # }
    /// let builder = PoolManagerBuilder::<MyConfig>::new()
    ///     .with_pools(["PlayerHUD", "Weapon1", "AbilityHandler"]);
    /// ```
    pub fn with_pools<I>(mut self, resource_types: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<ResourceTypeId>,
    {
        self.resource_types
            .extend(resource_types.into_iter().map(Into::into));
        self
    }

    /// Sets the claim attempt configuration.
    ///
    /// # Example
    ///
    /// ```
    /// use fortress_pool::{ClaimConfig, Config, PoolManagerBuilder};
    ///
    /// # #[derive(Debug)]
    /// # struct MyConfig;
    /// # impl Config for MyConfig {
    /// #     type Resource = u64;
    /// # }
    /// let builder = PoolManagerBuilder::<MyConfig>::new()
    ///     .with_claim_config(ClaimConfig::competitive());
    /// ```
    pub fn with_claim_config(mut self, claim_config: ClaimConfig) -> Self {
        self.claim_config = claim_config;
        self
    }

    /// Sets the cleanup configuration.
    pub fn with_cleanup_config(mut self, cleanup_config: CleanupConfig) -> Self {
        self.cleanup_config = cleanup_config;
        self
    }

    /// Sets a custom observer for claim failures and ownership anomalies.
    ///
    /// Without an observer every violation is logged through `tracing`.
    ///
    /// # Example
    ///
    /// ```
    /// use fortress_pool::{Config, PoolManagerBuilder, telemetry::CollectingObserver};
    /// use std::sync::Arc;
    ///
    /// # #[derive(Debug)]
    /// # struct MyConfig;
    /// # impl Config for MyConfig {
    /// #     type Resource = u64;
    /// # }
    /// let observer = Arc::new(CollectingObserver::new());
    /// let builder = PoolManagerBuilder::<MyConfig>::new()
    ///     .with_violation_observer(observer.clone());
    ///
    /// // After pool operations, check for violations
    /// // assert!(observer.violations().is_empty());
    /// ```
    pub fn with_violation_observer(mut self, observer: Arc<dyn ViolationObserver>) -> Self {
        self.violation_observer = Some(observer);
        self
    }

    /// Consumes the builder to construct a [`PoolManager`] that fires its transfers through
    /// `transfer`.
    ///
    /// # Errors
    ///
    /// - [`PoolError::InvalidRequest`] if the player count is 0 or above the supported limit,
    ///   if no pool was declared, if a pool was declared twice or for
    ///   [`ResourceTypeId::UNDEFINED`].
    /// - [`PoolError::InvalidConfig`] if the claim or cleanup configuration is invalid.
    pub fn build(
        self,
        transfer: impl OwnershipTransfer<T> + 'static,
    ) -> Result<PoolManager<T>, PoolError> {
        if self.max_players == 0 || self.max_players > MAX_PLAYERS_LIMIT {
            return Err(PoolError::InvalidRequest {
                info: format!(
                    "max_players must lie between 1 and {}, got {}",
                    MAX_PLAYERS_LIMIT, self.max_players
                ),
            });
        }
        if self.resource_types.is_empty() {
            return Err(PoolError::InvalidRequest {
                info: "at least one pool must be declared".to_owned(),
            });
        }
        let mut seen = BTreeSet::new();
        for resource_type in &self.resource_types {
            if resource_type.is_undefined() {
                return Err(PoolError::InvalidRequest {
                    info: format!("no pool can be declared for {resource_type}"),
                });
            }
            if !seen.insert(resource_type) {
                return Err(PoolError::InvalidRequest {
                    info: format!("pool {resource_type} was declared twice"),
                });
            }
        }

        // Validate configurations
        self.claim_config.validate()?;
        self.cleanup_config.validate()?;

        Ok(PoolManager::new(
            self.max_players,
            self.resource_types,
            self.claim_config,
            self.cleanup_config,
            Box::new(transfer),
            self.violation_observer,
        ))
    }
}
