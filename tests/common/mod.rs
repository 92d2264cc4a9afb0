//! Common test infrastructure shared across integration tests.
//!
//! This module provides:
//! - `host`: a scripted host that answers transfer requests the way a test tells it to
//! - [`Harness`]: a manager wired to a [`ChannelTransfer`] and a [`CollectingObserver`], with
//!   every pool already populated
//!
//! # Usage
//!
//! ```ignore
//! #[path = "common/mod.rs"]
//! mod common;
//! use common::{harness, Reply};
//! ```

pub mod host;

use std::sync::Arc;

use fortress_pool::telemetry::CollectingObserver;
use fortress_pool::{
    ChannelTransfer, ClaimConfig, CleanupConfig, Config, OwnershipTransfer, PoolManager,
    PoolManagerBuilder, ResourceTypeId, TransferRequest,
};
use tokio::sync::mpsc::UnboundedReceiver;

#[allow(unused_imports)]
pub use host::{ack, serve, Reply};

/// Player count every harness is built with unless a test asks otherwise.
pub const PLAYERS: usize = 4;

/// Resource types used throughout the integration tests.
pub const HUD: &str = "PlayerHUD";
pub const WEAPON: &str = "Weapon1";
pub const CAMERA: &str = "Camera";

#[derive(Debug)]
pub struct TestConfig;

impl Config for TestConfig {
    type Resource = u32;
}

pub type Requests = UnboundedReceiver<TransferRequest<TestConfig>>;

/// The instance id registered at `slot` of the `index`-th pool: `101` is slot 1 of pool 0.
pub fn resource_id(index: usize, slot: usize) -> u32 {
    ((index + 1) * 100 + slot) as u32
}

pub fn rt(name: &'static str) -> ResourceTypeId {
    ResourceTypeId::new(name)
}

pub struct Harness {
    pub manager: PoolManager<TestConfig>,
    pub requests: Requests,
    pub observer: Arc<CollectingObserver>,
}

/// Builds a manager over `pools` with default configs and registers every instance.
pub fn harness(pools: &[&'static str]) -> Harness {
    harness_with(pools, ClaimConfig::default(), CleanupConfig::default())
}

pub fn harness_with(
    pools: &[&'static str],
    claim_config: ClaimConfig,
    cleanup_config: CleanupConfig,
) -> Harness {
    let (transfer, requests) = ChannelTransfer::<TestConfig>::new();
    let (manager, observer) = manager_with(pools, claim_config, cleanup_config, transfer);
    populate(&manager, pools);
    Harness {
        manager,
        requests,
        observer,
    }
}

/// Builds a manager over `pools` on top of an arbitrary transfer. Nothing is registered.
pub fn manager_with(
    pools: &[&'static str],
    claim_config: ClaimConfig,
    cleanup_config: CleanupConfig,
    transfer: impl OwnershipTransfer<TestConfig> + 'static,
) -> (PoolManager<TestConfig>, Arc<CollectingObserver>) {
    let observer = Arc::new(CollectingObserver::new());
    let manager = PoolManagerBuilder::<TestConfig>::new()
        .with_max_players(PLAYERS)
        .with_pools(pools.iter().copied())
        .with_claim_config(claim_config)
        .with_cleanup_config(cleanup_config)
        .with_violation_observer(observer.clone())
        .build(transfer)
        .expect("valid test manager");
    (manager, observer)
}

/// Registers one instance per slot in each of `pools`, as every instance does at startup.
pub fn populate(manager: &PoolManager<TestConfig>, pools: &[&'static str]) {
    for (index, name) in pools.iter().enumerate() {
        for slot in 0..PLAYERS {
            manager
                .register_instance(rt(name), slot, resource_id(index, slot))
                .expect("startup registration");
        }
    }
}
