//! Claims against an unreliable host, simulated with [`ChaosTransfer`].

// Allow test-specific patterns that are appropriate for test code
#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]

use std::sync::Arc;

use fortress_pool::{
    assert_no_violations, ChannelTransfer, ChaosConfig, ChaosTransfer, ClaimConfig,
    CleanupConfig, PlayerHandle, PoolError, RegistrationOutcome,
};
use futures::future::join_all;

use crate::common::{
    ack, manager_with, populate, resource_id, rt, serve, Reply, TestConfig, HUD, PLAYERS, WEAPON,
};

#[tokio::test(start_paused = true)]
async fn duplicated_acknowledgements_are_stale() {
    let (channel, mut requests) = ChannelTransfer::<TestConfig>::new();
    let chaos = Arc::new(ChaosTransfer::new(
        channel,
        ChaosConfig {
            duplicate_rate: 1.0,
            ..ChaosConfig::default()
        },
    ));
    let (manager, observer) = manager_with(
        &[HUD],
        ClaimConfig::default(),
        CleanupConfig::default(),
        chaos.clone(),
    );
    populate(&manager, &[HUD]);
    let player = PlayerHandle::new(1);
    let hud = rt(HUD);
    let mut log = Vec::new();

    let claimed = tokio::select! {
        claimed = manager.claim(player, &hud) => claimed,
        () = serve(&manager, &mut requests, &mut log, |_| Reply::Ack) => unreachable!("the host never stops"),
    };
    assert_eq!(claimed.unwrap(), resource_id(0, 1));

    // The copy may still be queued if the claim finished first
    while let Ok(request) = requests.try_recv() {
        assert_eq!(ack(&manager, &request, false), RegistrationOutcome::Stale);
    }

    assert_eq!(chaos.stats().duplicated, 1);
    assert_eq!(manager.stats().stale_events, 1);
    assert_eq!(manager.stats().attempts, 1);
    assert_no_violations!(observer);
}

#[tokio::test(start_paused = true)]
async fn host_that_loses_everything_exhausts_the_claim() {
    let (channel, mut requests) = ChannelTransfer::<TestConfig>::new();
    let chaos = Arc::new(ChaosTransfer::new(channel, ChaosConfig::lossy(1.0)));
    let (manager, _observer) = manager_with(
        &[HUD],
        ClaimConfig::default(),
        CleanupConfig::default(),
        chaos.clone(),
    );
    populate(&manager, &[HUD]);
    let hud = rt(HUD);
    let mut log = Vec::new();

    let claimed = tokio::select! {
        claimed = manager.claim(PlayerHandle::new(0), &hud) => claimed,
        () = serve(&manager, &mut requests, &mut log, |_| Reply::Ack) => unreachable!("the host never stops"),
    };

    assert!(matches!(
        claimed,
        Err(PoolError::ClaimExhausted { attempts: 3, .. })
    ));
    assert!(log.is_empty());

    // Three claim attempts, each followed by a cleanup that is lost too
    let chaos_stats = chaos.stats();
    assert_eq!(chaos_stats.requests, 6);
    assert_eq!(chaos_stats.dropped, 6);
    let stats = manager.stats();
    assert_eq!(stats.cleanups_timed_out, 3);
    assert_eq!(stats.claims_exhausted, 1);
}

#[tokio::test(start_paused = true)]
async fn flaky_host_leaves_consistent_bookkeeping() {
    let (channel, mut requests) = ChannelTransfer::<TestConfig>::new();
    let chaos = Arc::new(ChaosTransfer::new(
        channel,
        ChaosConfig::flaky().with_seed(0xF00D),
    ));
    let pools = [HUD, WEAPON];
    let (manager, _observer) = manager_with(
        &pools,
        ClaimConfig::default(),
        CleanupConfig::default(),
        chaos.clone(),
    );
    populate(&manager, &pools);
    let types = [rt(HUD), rt(WEAPON)];
    let mut log = Vec::new();

    let results = tokio::select! {
        results = join_all((0..PLAYERS).map(|slot| manager.onboard(PlayerHandle::new(slot), &types))) => results,
        () = serve(&manager, &mut requests, &mut log, |_| Reply::Ack) => unreachable!("the host never stops"),
    };

    let stats = manager.stats();
    assert_eq!(stats.claims_unresolved(), 0);
    assert!(chaos.stats().requests > 0);
    for (slot, result) in results.into_iter().enumerate() {
        let player = PlayerHandle::new(slot);
        match result {
            Ok(resources) => {
                assert_eq!(resources, vec![resource_id(0, slot), resource_id(1, slot)]);
                for resource_type in &types {
                    assert!(manager.lookup(player, resource_type).is_ok());
                }
            },
            Err(error) => {
                assert!(matches!(error, PoolError::ClaimExhausted { .. }), "{error}");
                assert!(manager.claimed_types(player).is_empty());
            },
        }
    }
}
