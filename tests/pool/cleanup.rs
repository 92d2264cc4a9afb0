//! Returning instances to System: forced cleanup and cleanup on departure.

// Allow test-specific patterns that are appropriate for test code
#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]

use fortress_pool::telemetry::{ViolationKind, ViolationSeverity};
use fortress_pool::{
    assert_no_violations, ChannelTransfer, ClaimConfig, CleanupConfig, CleanupOutcome,
    HandshakeState, Owner, PlayerHandle, PoolError, RegistrationOutcome,
};
use tokio::time::Instant;
use web_time::Duration;

use crate::common::{
    ack, harness, manager_with, resource_id, rt, serve, Harness, Reply, TestConfig, HUD, WEAPON,
};

#[tokio::test(start_paused = true)]
async fn forced_cleanup_is_confirmed() {
    let Harness {
        manager,
        mut requests,
        observer,
    } = harness(&[HUD]);
    let hud = rt(HUD);

    let (outcome, ()) = tokio::join!(manager.force_cleanup(&hud, 2), async {
        let request = requests.recv().await.unwrap();
        assert_eq!(request.resource, resource_id(0, 2));
        assert_eq!(request.expected_owner, Owner::System);
        assert_eq!(request.new_owner, Owner::System);
        assert!(matches!(
            manager.handshake_state(&hud, 2).unwrap(),
            HandshakeState::CleanupPending { .. }
        ));
        assert_eq!(
            ack(&manager, &request, false),
            RegistrationOutcome::CleanupConfirmed
        );
    });

    assert_eq!(outcome.unwrap(), CleanupOutcome::Confirmed);
    assert_eq!(manager.stats().cleanups_confirmed, 1);
    assert_no_violations!(observer);
}

#[tokio::test(start_paused = true)]
async fn unanswered_cleanup_times_out() {
    let Harness {
        manager,
        mut requests,
        observer,
    } = harness(&[HUD]);
    let hud = rt(HUD);
    let start = Instant::now();

    let outcome = manager.force_cleanup(&hud, 0).await.unwrap();

    assert_eq!(outcome, CleanupOutcome::TimedOut);
    assert!(start.elapsed() >= Duration::from_secs(5));
    assert!(requests.try_recv().is_ok());
    assert_eq!(manager.handshake_state(&hud, 0).unwrap(), HandshakeState::Idle);
    assert_eq!(manager.stats().cleanups_timed_out, 1);

    let timeouts = observer.violations_of_kind(ViolationKind::CleanupTimeout);
    assert_eq!(timeouts.len(), 1);
    assert_eq!(timeouts[0].severity, ViolationSeverity::Warning);
    assert_eq!(timeouts[0].context.get("slot").map(String::as_str), Some("0"));
}

#[tokio::test(start_paused = true)]
async fn newer_cleanup_supersedes_an_older_one() {
    let Harness {
        manager,
        mut requests,
        ..
    } = harness(&[HUD]);
    let hud = rt(HUD);

    let (older, newer, ()) = tokio::join!(
        manager.force_cleanup(&hud, 1),
        manager.force_cleanup(&hud, 1),
        async {
            let first = requests.recv().await.unwrap();
            let second = requests.recv().await.unwrap();
            assert!(second.generation > first.generation);
            assert_eq!(ack(&manager, &first, false), RegistrationOutcome::Stale);
            assert_eq!(
                ack(&manager, &second, false),
                RegistrationOutcome::CleanupConfirmed
            );
        }
    );

    assert_eq!(older.unwrap(), CleanupOutcome::Superseded);
    assert_eq!(newer.unwrap(), CleanupOutcome::Confirmed);
}

#[tokio::test(start_paused = true)]
async fn cleanup_on_remove_releases_the_claim_immediately() {
    let Harness {
        manager,
        mut requests,
        observer,
    } = harness(&[HUD]);
    let player = PlayerHandle::new(1);
    let hud = rt(HUD);
    let mut log = Vec::new();

    let claimed = tokio::select! {
        claimed = manager.claim(player, &hud) => claimed,
        () = serve(&manager, &mut requests, &mut log, |_| Reply::Ack) => unreachable!("the host never stops"),
    };
    assert!(claimed.is_ok());

    let (outcome, ()) = tokio::join!(manager.cleanup_on_remove(player, &hud), async {
        let request = requests.recv().await.unwrap();
        assert_eq!(request.expected_owner, Owner::Player(player));
        assert_eq!(request.new_owner, Owner::System);
        // Gone from the participant map before the host confirms
        assert!(matches!(
            manager.lookup(player, &hud),
            Err(PoolError::NotClaimed { .. })
        ));
        ack(&manager, &request, false);
    });

    assert_eq!(outcome.unwrap(), CleanupOutcome::Confirmed);
    assert_eq!(manager.owner_of(&hud, 1).unwrap(), Owner::System);
    assert!(manager.claimed_types(player).is_empty());
    assert_no_violations!(observer);
}

#[tokio::test(start_paused = true)]
async fn cleanup_on_remove_without_a_claim_should_never_happen() {
    let Harness {
        manager,
        mut requests,
        observer,
    } = harness(&[HUD]);

    let result = manager
        .cleanup_on_remove(PlayerHandle::new(2), &rt(HUD))
        .await;

    assert!(matches!(result, Err(PoolError::ShouldNeverHappen { .. })));
    assert!(requests.try_recv().is_err());
    let critical = observer.violations_at_severity(ViolationSeverity::Critical);
    assert_eq!(critical.len(), 1);
    assert_eq!(critical[0].kind, ViolationKind::InternalError);
}

#[tokio::test(start_paused = true)]
async fn forced_cleanup_of_every_pool_skips_unregistered_instances() {
    let (transfer, mut requests) = ChannelTransfer::<TestConfig>::new();
    let (manager, _observer) = manager_with(
        &[HUD, WEAPON],
        ClaimConfig::default(),
        CleanupConfig::default(),
        transfer,
    );
    manager
        .register_instance(rt(HUD), 3, resource_id(0, 3))
        .unwrap();
    let mut log = Vec::new();

    let outcomes = tokio::select! {
        outcomes = manager.force_cleanup_all(PlayerHandle::new(3)) => outcomes,
        () = serve(&manager, &mut requests, &mut log, |_| Reply::Ack) => unreachable!("the host never stops"),
    };

    assert_eq!(
        outcomes.unwrap(),
        vec![(rt(HUD), CleanupOutcome::Confirmed)]
    );
    assert_eq!(log.len(), 1);
    assert!(matches!(
        manager.force_cleanup_all(PlayerHandle::new(7)).await,
        Err(PoolError::SlotOutOfRange { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn cleanup_supersedes_a_claim_in_flight() {
    let Harness {
        manager,
        mut requests,
        ..
    } = harness(&[HUD]);
    let player = PlayerHandle::new(2);
    let hud = rt(HUD);
    let mut log = Vec::new();

    // The first claim request is never answered; a cleanup takes the instance over instead
    let start = Instant::now();
    let mut claims = 0;
    let (claimed, cleaned) = tokio::select! {
        results = async {
            tokio::join!(manager.claim(player, &hud), async {
                tokio::time::sleep(Duration::from_millis(500)).await;
                manager.force_cleanup(&hud, 2).await
            })
        } => results,
        () = serve(&manager, &mut requests, &mut log, |request| {
            if request.new_owner.is_system() {
                return Reply::Ack;
            }
            claims += 1;
            if claims == 1 { Reply::Ignore } else { Reply::Ack }
        }) => unreachable!("the host never stops"),
    };

    // The claim's own cleanup after the lost attempt may in turn supersede this one
    assert!(matches!(
        cleaned.unwrap(),
        CleanupOutcome::Confirmed | CleanupOutcome::Superseded
    ));
    assert_eq!(claimed.unwrap(), resource_id(0, 2));

    // The superseded attempt ended at once instead of running into its 2s deadline
    assert!(start.elapsed() < Duration::from_secs(2));
    let stats = manager.stats();
    assert_eq!(stats.attempts, 2);
    assert_eq!(stats.attempt_timeouts, 1);
}
