//! # Onboarding Players Against a Simulated Host
//!
//! This example wires a [`PoolManager`] to a host that is a little unreliable:
//!
//! - requests travel through a [`ChannelTransfer`] wrapped in a [`ChaosTransfer`] that loses
//!   some of them
//! - the host applies each transfer after a short delay and answers with a registration event
//! - weapons only trust their new owner after a bounce through the system authority
//!
//! Four players join, play, and one of them leaves again. Telemetry goes through the
//! tracing subscriber installed at the top of `main`.
//!
//! Run with: `cargo run --example onboarding`

// Allow example-specific patterns
#![allow(
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]

use std::sync::Arc;

use fortress_pool::rng::Pcg32;
use fortress_pool::telemetry::{
    CollectingObserver, CompositeObserver, TracingObserver, ViolationObserver,
};
use fortress_pool::{
    ChannelTransfer, ChaosConfig, ChaosTransfer, ClaimConfig, Config, PlayerHandle, PoolManager,
    PoolManagerBuilder, RegistrationEvent, ResourceTypeId, TransferRequest,
};
use futures::future::join_all;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::sleep;
use web_time::Duration;

#[derive(Debug)]
struct GameConfig;

impl Config for GameConfig {
    type Resource = u64;
}

const PLAYERS: usize = 4;
const POOLS: [&str; 3] = ["PlayerHUD", "Weapon1", "Camera"];

/// Applies every transfer after a jittered delay, asking for a bounce when a weapon changes
/// hands.
async fn run_host(
    manager: &PoolManager<GameConfig>,
    requests: &mut UnboundedReceiver<TransferRequest<GameConfig>>,
    max_latency_ms: u32,
) {
    let mut rng = Pcg32::seed_from_u64(1234);
    while let Some(request) = requests.recv().await {
        let latency = rng.next_u32() % max_latency_ms.max(1);
        sleep(Duration::from_millis(u64::from(latency))).await;
        let bounce = request.resource_type.as_str() == "Weapon1"
            && request.expected_owner.is_system()
            && !request.new_owner.is_system()
            && manager
                .handshake_state(&request.resource_type, request.slot)
                .is_ok_and(|state| !state.is_bouncing());
        let event = RegistrationEvent::acknowledging(&request, bounce);
        if let Err(error) = manager.handle_registration_event(event) {
            tracing::warn!(%error, "host could not report registration");
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .init();

    let collected = Arc::new(CollectingObserver::new());
    let observers: Vec<Arc<dyn ViolationObserver>> = vec![Arc::new(TracingObserver), collected.clone()];
    let observer = CompositeObserver::from_observers(observers);

    let (channel, mut requests) = ChannelTransfer::<GameConfig>::new();
    let transfer = Arc::new(ChaosTransfer::new(channel, ChaosConfig::lossy(0.2).with_seed(7)));

    let manager = PoolManagerBuilder::<GameConfig>::new()
        .with_max_players(PLAYERS)
        .with_pools(POOLS)
        .with_claim_config(ClaimConfig::lan())
        .with_violation_observer(Arc::new(observer))
        .build(transfer.clone())
        .expect("valid pool configuration");

    // Every instance registers once at startup
    for (index, name) in POOLS.iter().enumerate() {
        for slot in 0..PLAYERS {
            manager
                .register_instance(ResourceTypeId::new(*name), slot, (index * 100 + slot) as u64)
                .expect("startup registration");
        }
    }

    let resource_types: Vec<ResourceTypeId> = POOLS.iter().map(|name| ResourceTypeId::new(*name)).collect();
    let session = async {
        let joined = join_all(
            (0..PLAYERS).map(|slot| manager.onboard(PlayerHandle::new(slot), &resource_types)),
        )
        .await;
        for (slot, result) in joined.iter().enumerate() {
            match result {
                Ok(resources) => println!("player {slot} joined holding {resources:?}"),
                Err(error) => println!("player {slot} could not join: {error}"),
            }
        }

        let leaving = PlayerHandle::new(2);
        for (resource_type, outcome) in manager.offboard(leaving).await {
            println!("player {leaving} released {resource_type}: {outcome:?}");
        }
    };

    tokio::select! {
        () = session => {},
        () = run_host(&manager, &mut requests, 8) => {},
    }

    println!("\npool stats: {:#?}", manager.stats());
    println!("transfer stats: {:?}", transfer.stats());
    println!("violations reported: {}", collected.len());
}
