//! Bounce-back handshakes: `player → System → player` before a claim is confirmed.

// Allow test-specific patterns that are appropriate for test code
#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]

use fortress_pool::telemetry::ViolationKind;
use fortress_pool::{
    assert_no_violations, HandshakeState, Owner, PlayerHandle, RegistrationOutcome,
};
use tokio::time::Instant;
use web_time::Duration;

use crate::common::{
    ack, harness, resource_id, rt, serve, Harness, Reply, HUD, WEAPON,
};

#[tokio::test(start_paused = true)]
async fn bounce_passes_through_system() {
    let Harness {
        manager,
        mut requests,
        observer,
    } = harness(&[HUD]);
    let player = PlayerHandle::new(2);
    let hud = rt(HUD);
    let start = Instant::now();
    let mut log = Vec::new();
    let mut first = true;

    let claimed = tokio::select! {
        claimed = manager.claim(player, &hud) => claimed,
        () = serve(&manager, &mut requests, &mut log, |_| {
            if std::mem::take(&mut first) { Reply::AckWithBounce } else { Reply::Ack }
        }) => unreachable!("the host never stops"),
    };

    assert_eq!(claimed.unwrap(), resource_id(0, 2));

    // The claim itself, then exactly two more transfers for the bounce
    assert_eq!(log.len(), 3);
    let generation = log[0].generation;
    assert_eq!(log[0].new_owner, Owner::Player(player));
    assert_eq!(log[1].expected_owner, Owner::Player(player));
    assert_eq!(log[1].new_owner, Owner::System);
    assert_eq!(log[2].expected_owner, Owner::System);
    assert_eq!(log[2].new_owner, Owner::Player(player));
    assert!(log.iter().all(|request| request.generation == generation));

    // One bounce delay before each hop
    assert!(start.elapsed() >= Duration::from_millis(200));

    assert_eq!(manager.owner_of(&hud, 2).unwrap(), Owner::Player(player));
    assert_eq!(manager.lookup(player, &hud).unwrap(), resource_id(0, 2));
    assert_eq!(manager.handshake_state(&hud, 2).unwrap(), HandshakeState::Idle);

    let stats = manager.stats();
    assert_eq!(stats.bounces, 1);
    assert_eq!(stats.attempts, 1);
    assert_eq!(stats.claims_succeeded, 1);
    assert_no_violations!(observer);
}

#[tokio::test(start_paused = true)]
async fn bounce_states_are_visible_between_hops() {
    let Harness {
        manager,
        mut requests,
        ..
    } = harness(&[WEAPON]);
    let player = PlayerHandle::new(1);
    let weapon = rt(WEAPON);

    let (claimed, ()) = tokio::join!(manager.claim(player, &weapon), async {
        let claim = requests.recv().await.unwrap();
        assert_eq!(
            ack(&manager, &claim, true),
            RegistrationOutcome::BounceRequested
        );
        assert_eq!(
            manager.handshake_state(&weapon, 1).unwrap(),
            HandshakeState::AwaitingBounceBack {
                generation: claim.generation,
                destination: player,
            }
        );
        // Not claimed until the round trip is over
        assert!(manager.lookup(player, &weapon).is_err());

        let back = requests.recv().await.unwrap();
        assert_eq!(
            ack(&manager, &back, false),
            RegistrationOutcome::BounceCompleted
        );
        assert_eq!(manager.owner_of(&weapon, 1).unwrap(), Owner::System);
        assert_eq!(
            manager.handshake_state(&weapon, 1).unwrap(),
            HandshakeState::BouncingForward {
                generation: claim.generation,
                destination: player,
            }
        );

        let forward = requests.recv().await.unwrap();
        assert_eq!(
            ack(&manager, &forward, false),
            RegistrationOutcome::ClaimConfirmed
        );
    });

    assert_eq!(claimed.unwrap(), resource_id(0, 1));
    assert!(requests.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn repeated_bounce_flags_do_not_start_a_second_bounce() {
    let Harness {
        manager,
        mut requests,
        ..
    } = harness(&[HUD]);
    let player = PlayerHandle::new(0);
    let hud = rt(HUD);
    let mut log = Vec::new();

    let claimed = tokio::select! {
        claimed = manager.claim(player, &hud) => claimed,
        () = serve(&manager, &mut requests, &mut log, |_| Reply::AckWithBounce) => unreachable!("the host never stops"),
    };

    assert_eq!(claimed.unwrap(), resource_id(0, 0));
    assert_eq!(log.len(), 3);
    assert_eq!(manager.stats().bounces, 1);
}

#[tokio::test(start_paused = true)]
async fn duplicated_bounce_acknowledgement_is_ignored() {
    let Harness {
        manager,
        mut requests,
        ..
    } = harness(&[HUD]);
    let player = PlayerHandle::new(3);
    let hud = rt(HUD);

    let (claimed, ()) = tokio::join!(manager.claim(player, &hud), async {
        let claim = requests.recv().await.unwrap();
        assert_eq!(
            ack(&manager, &claim, true),
            RegistrationOutcome::BounceRequested
        );
        assert_eq!(ack(&manager, &claim, true), RegistrationOutcome::Ignored);

        let back = requests.recv().await.unwrap();
        ack(&manager, &back, false);
        let forward = requests.recv().await.unwrap();
        ack(&manager, &forward, false);
    });

    assert!(claimed.is_ok());
    assert_eq!(manager.stats().bounces, 1);
}

#[tokio::test(start_paused = true)]
async fn stalled_bounce_is_retried() {
    let Harness {
        manager,
        mut requests,
        observer,
    } = harness(&[HUD]);
    let player = PlayerHandle::new(1);
    let hud = rt(HUD);
    let mut log = Vec::new();
    let mut bounced = None;

    // The host asks for a bounce, then never applies the hop back to System
    let claimed = tokio::select! {
        claimed = manager.claim(player, &hud) => claimed,
        () = serve(&manager, &mut requests, &mut log, |request| {
            match bounced {
                None => {
                    bounced = Some(request.generation);
                    Reply::AckWithBounce
                },
                Some(generation) if generation == request.generation => Reply::Ignore,
                Some(_) => Reply::Ack,
            }
        }) => unreachable!("the host never stops"),
    };

    assert_eq!(claimed.unwrap(), resource_id(0, 1));

    // Claim, bounce back (dropped), cleanup, claim
    assert_eq!(log.len(), 4);
    assert_eq!(log[1].generation, log[0].generation);
    assert_eq!(log[1].new_owner, Owner::System);
    assert_ne!(log[2].generation, log[0].generation);
    assert_eq!(log[2].expected_owner, Owner::Player(player));
    assert_eq!(log[2].new_owner, Owner::System);
    assert_eq!(log[3].new_owner, Owner::Player(player));

    let stats = manager.stats();
    assert_eq!(stats.attempts, 2);
    assert_eq!(stats.attempt_timeouts, 1);
    assert_eq!(stats.bounces, 1);
    assert_eq!(observer.count_of_kind(ViolationKind::ClaimTimeout), 1);
}
