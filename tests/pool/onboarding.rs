//! Claim sets: `claim_all`, onboarding a joining player and offboarding a leaving one.

// Allow test-specific patterns that are appropriate for test code
#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]

use fortress_pool::telemetry::ViolationKind;
use fortress_pool::{assert_no_violations, CleanupOutcome, Owner, PlayerHandle, PoolError};

use crate::common::{harness, resource_id, rt, serve, Harness, Reply, CAMERA, HUD, WEAPON};

#[tokio::test(start_paused = true)]
async fn claim_all_claims_every_type() {
    let Harness {
        manager,
        mut requests,
        observer,
    } = harness(&[HUD, WEAPON, CAMERA]);
    let player = PlayerHandle::new(1);
    let types = [rt(HUD), rt(WEAPON), rt(CAMERA)];
    let mut log = Vec::new();

    let claimed = tokio::select! {
        claimed = manager.claim_all(player, &types) => claimed,
        () = serve(&manager, &mut requests, &mut log, |_| Reply::Ack) => unreachable!("the host never stops"),
    };

    // Results come back in the order the types were asked for
    assert_eq!(
        claimed.unwrap(),
        vec![resource_id(0, 1), resource_id(1, 1), resource_id(2, 1)]
    );
    assert_eq!(manager.claimed_types(player).len(), 3);
    assert_eq!(log.len(), 3);
    assert_no_violations!(observer);
}

#[tokio::test(start_paused = true)]
async fn claim_all_rolls_back_after_a_failed_claim() {
    let Harness {
        manager,
        mut requests,
        observer,
    } = harness(&[HUD, WEAPON]);
    let player = PlayerHandle::new(2);
    let hud = rt(HUD);
    let weapon = rt(WEAPON);
    let types = [hud.clone(), weapon.clone()];
    let mut log = Vec::new();

    // The host never hands out weapons
    let claimed = tokio::select! {
        claimed = manager.claim_all(player, &types) => claimed,
        () = serve(&manager, &mut requests, &mut log, |request| {
            if request.resource_type.as_str() == WEAPON && !request.new_owner.is_system() {
                Reply::Ignore
            } else {
                Reply::Ack
            }
        }) => unreachable!("the host never stops"),
    };

    assert!(matches!(
        claimed,
        Err(PoolError::ClaimExhausted { ref resource_type, .. }) if *resource_type == weapon
    ));

    // The HUD claim that did succeed was released again
    assert!(manager.claimed_types(player).is_empty());
    assert_eq!(manager.owner_of(&hud, 2).unwrap(), Owner::System);
    assert!(log.iter().any(|request| request.resource_type == hud
        && request.expected_owner == Owner::Player(player)
        && request.new_owner.is_system()));
    assert_eq!(observer.count_of_kind(ViolationKind::ClaimExhausted), 1);
}

#[tokio::test(start_paused = true)]
async fn onboard_cleans_then_claims() {
    let Harness {
        manager,
        mut requests,
        ..
    } = harness(&[HUD, WEAPON]);
    let player = PlayerHandle::new(3);
    let types = [rt(HUD), rt(WEAPON)];
    let mut log = Vec::new();

    let onboarded = tokio::select! {
        onboarded = manager.onboard(player, &types) => onboarded,
        () = serve(&manager, &mut requests, &mut log, |_| Reply::Ack) => unreachable!("the host never stops"),
    };

    assert_eq!(
        onboarded.unwrap(),
        vec![resource_id(0, 3), resource_id(1, 3)]
    );
    // One cleanup per pool first, then one claim per type
    assert_eq!(log.len(), 4);
    assert!(log[..2].iter().all(|request| request.new_owner.is_system()));
    assert!(log[2..]
        .iter()
        .all(|request| request.new_owner == Owner::Player(player)));
    assert_eq!(manager.stats().cleanups_confirmed, 2);
}

#[tokio::test(start_paused = true)]
async fn onboard_fails_when_the_claim_set_cannot_be_satisfied() {
    let Harness {
        manager,
        mut requests,
        ..
    } = harness(&[HUD, WEAPON]);
    let player = PlayerHandle::new(0);
    let types = [rt(HUD), rt(WEAPON)];
    let mut log = Vec::new();

    let onboarded = tokio::select! {
        onboarded = manager.onboard(player, &types) => onboarded,
        () = serve(&manager, &mut requests, &mut log, |request| {
            if request.resource_type.as_str() == HUD && !request.new_owner.is_system() {
                Reply::Ignore
            } else {
                Reply::Ack
            }
        }) => unreachable!("the host never stops"),
    };

    assert!(matches!(onboarded, Err(PoolError::ClaimExhausted { .. })));
    assert!(manager.claimed_types(player).is_empty());
    assert_eq!(manager.stats().claims_exhausted, 1);
    assert_eq!(manager.stats().claims_succeeded, 1);
}

#[tokio::test(start_paused = true)]
async fn offboard_releases_everything() {
    let Harness {
        manager,
        mut requests,
        observer,
    } = harness(&[HUD, WEAPON, CAMERA]);
    let player = PlayerHandle::new(1);
    let types = [rt(HUD), rt(CAMERA)];
    let mut log = Vec::new();

    let released = tokio::select! {
        released = async {
            manager.claim_all(player, &types).await.unwrap();
            manager.offboard(player).await
        } => released,
        () = serve(&manager, &mut requests, &mut log, |_| Reply::Ack) => unreachable!("the host never stops"),
    };

    // Only what the player held; camera sorts before the HUD
    assert_eq!(
        released
            .into_iter()
            .map(|(resource_type, outcome)| (resource_type, outcome.unwrap()))
            .collect::<Vec<_>>(),
        vec![
            (rt(CAMERA), CleanupOutcome::Confirmed),
            (rt(HUD), CleanupOutcome::Confirmed),
        ]
    );
    assert!(manager.claimed_types(player).is_empty());
    assert_eq!(manager.owner_of(&rt(HUD), 1).unwrap(), Owner::System);
    assert_eq!(manager.owner_of(&rt(CAMERA), 1).unwrap(), Owner::System);
    assert_no_violations!(observer);
}

#[tokio::test(start_paused = true)]
async fn offboarding_a_player_without_claims_does_nothing() {
    let Harness {
        manager,
        mut requests,
        ..
    } = harness(&[HUD]);

    assert!(manager.offboard(PlayerHandle::new(2)).await.is_empty());
    assert!(requests.try_recv().is_err());
}
