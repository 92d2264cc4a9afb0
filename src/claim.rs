//! The claim attempt loop.
//!
//! One [`ClaimController`] drives a single `(player, resource type)` claim: it fires the
//! `System → player` transfer, waits for the handshake to report back, performs the two bounce
//! hops if the acknowledgement asks for them, and retries with exponential backoff after a
//! timed-out attempt. Every attempt carries a fresh [`Generation`], so an acknowledgement that
//! arrives after its attempt was abandoned can never resolve a later one.

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::{sleep, timeout};
use tracing::{debug, info};

use crate::handshake::tracker::HandshakeSignal;
use crate::pool::manager::{ClaimReservation, PoolManager};
use crate::telemetry::{violation, ViolationKind, ViolationSeverity};
use crate::{ClaimConfig, Config, Generation, PlayerHandle, PoolError, ResourceTypeId};

/// How an attempt ended before its deadline.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum AttemptEnd {
    Confirmed,
    /// A cleanup took over the instance; the attempt can never be confirmed.
    Superseded,
}

/// Clears the instance's claim reservation when the claim ends, however it ends.
struct ClaimGuard<'a, T>
where
    T: Config,
{
    manager: &'a PoolManager<T>,
    resource_type: &'a ResourceTypeId,
    slot: usize,
}

impl<T: Config> Drop for ClaimGuard<'_, T> {
    fn drop(&mut self) {
        self.manager.release_claim(self.resource_type, self.slot);
    }
}

pub(crate) struct ClaimController<'a, T>
where
    T: Config,
{
    manager: &'a PoolManager<T>,
    player: PlayerHandle,
    resource_type: &'a ResourceTypeId,
    config: ClaimConfig,
}

impl<'a, T: Config> ClaimController<'a, T> {
    pub(crate) fn new(
        manager: &'a PoolManager<T>,
        player: PlayerHandle,
        resource_type: &'a ResourceTypeId,
        config: ClaimConfig,
    ) -> Self {
        Self {
            manager,
            player,
            resource_type,
            config,
        }
    }

    pub(crate) async fn run(self) -> Result<T::Resource, PoolError> {
        let slot = self.player.slot();
        let needs_cleanup = match self.manager.reserve_claim(self.player, self.resource_type)? {
            ClaimReservation::Held(resource) => {
                debug!(player = %self.player, resource_type = %self.resource_type, "instance already held");
                return Ok(resource);
            },
            ClaimReservation::Reserved { needs_cleanup } => needs_cleanup,
        };
        let _guard = ClaimGuard {
            manager: self.manager,
            resource_type: self.resource_type,
            slot,
        };

        if needs_cleanup {
            debug!(
                player = %self.player,
                resource_type = %self.resource_type,
                "instance not under System, cleaning up before the first attempt"
            );
            self.manager.force_cleanup(self.resource_type, slot).await?;
        }

        let config = self.config;
        let max_attempts = config.effective_max_attempts();
        for attempt in 1..=max_attempts {
            let (request, signals) = self
                .manager
                .begin_claim_attempt(self.player, self.resource_type)?;
            let generation = request.generation;
            let deadline = config.attempt_timeout(attempt);
            debug!(
                player = %self.player,
                resource_type = %self.resource_type,
                attempt,
                deadline_ms = deadline.as_millis() as u64,
                %generation,
                "claim attempt"
            );
            self.manager.fire(request);

            let end = timeout(deadline, self.drive(signals, generation, config.bounce_delay)).await;
            if matches!(end, Ok(AttemptEnd::Confirmed)) {
                self.manager.update_stats(|stats| stats.claims_succeeded += 1);
                info!(
                    player = %self.player,
                    resource_type = %self.resource_type,
                    attempts = attempt,
                    "claim succeeded"
                );
                return self.manager.get_instance(self.resource_type, slot);
            }

            self.manager.abandon_transfer(self.resource_type, slot, generation);
            self.manager.update_stats(|stats| stats.attempt_timeouts += 1);
            let reason = if end.is_err() {
                "no acknowledgement before the deadline"
            } else {
                "superseded by a cleanup"
            };
            self.manager.report(
                &violation!(
                    ViolationSeverity::Warning,
                    ViolationKind::ClaimTimeout,
                    "claim of {} for player {} failed: {}",
                    self.resource_type,
                    self.player,
                    reason
                )
                .with_attempt(attempt)
                .with_context("player", self.player.to_string())
                .with_context("resource_type", self.resource_type.to_string())
                .with_context("deadline_ms", deadline.as_millis().to_string()),
            );
            // Start the next attempt, or hand the slot back, from a known System baseline
            self.manager.force_cleanup(self.resource_type, slot).await?;
        }

        self.manager.update_stats(|stats| stats.claims_exhausted += 1);
        self.manager.report(
            &violation!(
                ViolationSeverity::Error,
                ViolationKind::ClaimExhausted,
                "player {} could not claim {} after {} attempts",
                self.player,
                self.resource_type,
                max_attempts
            )
            .with_attempt(max_attempts)
            .with_context("player", self.player.to_string())
            .with_context("resource_type", self.resource_type.to_string()),
        );
        Err(PoolError::ClaimExhausted {
            player: self.player,
            resource_type: self.resource_type.clone(),
            attempts: max_attempts,
        })
    }

    /// Follows one attempt until it is confirmed or superseded. Bounce hops are fired from
    /// here after the configured delay, as long as the attempt is still current.
    async fn drive(
        &self,
        mut signals: UnboundedReceiver<HandshakeSignal>,
        generation: Generation,
        bounce_delay: web_time::Duration,
    ) -> AttemptEnd {
        let slot = self.player.slot();
        while let Some(signal) = signals.recv().await {
            match signal {
                HandshakeSignal::Confirmed => return AttemptEnd::Confirmed,
                HandshakeSignal::BounceBack { .. } | HandshakeSignal::BounceForward { .. } => {
                    sleep(bounce_delay).await;
                    match self
                        .manager
                        .bounce_request(self.resource_type, slot, generation, signal)
                    {
                        Some(request) => self.manager.fire(request),
                        None => {
                            debug!(
                                resource_type = %self.resource_type,
                                slot,
                                %generation,
                                "bounce hop no longer wanted"
                            );
                        },
                    }
                },
            }
        }
        AttemptEnd::Superseded
    }
}
