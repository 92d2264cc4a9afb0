//! The top-level orchestrator: owns every pool, exposes claim and cleanup operations and
//! routes registration events to the handshake of the instance they concern.
//!
//! # Locking
//!
//! All bookkeeping lives behind one `parking_lot` mutex. The lock is only ever taken inside
//! synchronous helpers, so it is never held across an `.await` and never held while a
//! [`TransferRequest`] is handed to the [`OwnershipTransfer`] primitive. Hosts are therefore
//! free to feed registration events back from inside `transfer_ownership`.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::join_all;
use parking_lot::Mutex;
use smallvec::SmallVec;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};

use crate::claim::ClaimController;
use crate::handshake::state::HandshakeState;
use crate::handshake::tracker::{HandshakeSignal, Observation, TrackerOutcome};
use crate::pool::participant_map::{ClaimedTypes, ParticipantResourceMap};
use crate::pool::resource_pool::{PooledInstance, ResourcePool};
use crate::pool::stats::PoolStats;
use crate::telemetry::{
    report_to_observer, violation, InvariantChecker, InvariantViolation, SpecViolation,
    ViolationKind, ViolationObserver, ViolationSeverity,
};
use crate::{
    ClaimConfig, CleanupConfig, Config, Generation, Owner, OwnershipTransfer, PlayerHandle,
    PoolError, RegistrationEvent, ResourceTypeId, TransferRequest,
};

type Violations = SmallVec<[SpecViolation; 2]>;

/// How a registration event was interpreted.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum RegistrationOutcome {
    /// The instance registered for the first time and now sits in its pool, owned by System.
    Registered,
    /// Nobody was waiting and the event repeated the owner already on record.
    Duplicate,
    /// The event confirmed a pending claim.
    ClaimConfirmed,
    /// The acknowledgement asked for a bounce; the instance is sent back to System next.
    BounceRequested,
    /// The instance is back under System; it is handed to the claimant again next.
    BounceCompleted,
    /// The event confirmed a pending cleanup.
    CleanupConfirmed,
    /// A transfer was pending but the event reported a different owner. The observed owner
    /// was recorded; the pending transfer keeps waiting.
    Ignored,
    /// The event belonged to a transfer that was already abandoned and was dropped.
    Stale,
    /// Nobody was waiting and the owner changed anyway. Bookkeeping was reconciled to the
    /// observed owner and the anomaly was reported.
    Anomaly,
}

/// How a cleanup ended. Cleanups are best-effort and never fail once started.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum CleanupOutcome {
    /// The instance re-registered under System.
    Confirmed,
    /// No confirmation arrived before the cleanup timeout.
    TimedOut,
    /// Another cleanup for the same instance started before this one was confirmed.
    Superseded,
}

/// Everything guarded by the manager's lock.
pub(crate) struct PoolState<T>
where
    T: Config,
{
    pools: BTreeMap<ResourceTypeId, ResourcePool<T>>,
    claims: ParticipantResourceMap<T>,
    last_generation: Generation,
    stats: PoolStats,
}

impl<T: Config> PoolState<T> {
    fn new(resource_types: Vec<ResourceTypeId>, pool_size: usize) -> Self {
        let pools = resource_types
            .into_iter()
            .map(|resource_type| {
                let pool = ResourcePool::new(resource_type.clone(), pool_size);
                (resource_type, pool)
            })
            .collect();
        Self {
            pools,
            claims: ParticipantResourceMap::new(),
            last_generation: Generation::default(),
            stats: PoolStats::new(),
        }
    }

    fn pool(&self, resource_type: &ResourceTypeId) -> Result<&ResourcePool<T>, PoolError> {
        self.pools
            .get(resource_type)
            .ok_or_else(|| PoolError::NoSuchPool {
                resource_type: resource_type.clone(),
            })
    }

    fn instance(
        &self,
        resource_type: &ResourceTypeId,
        slot: usize,
    ) -> Result<&PooledInstance<T>, PoolError> {
        self.pool(resource_type)?.get(slot)
    }

    fn instance_mut(
        &mut self,
        resource_type: &ResourceTypeId,
        slot: usize,
    ) -> Result<&mut PooledInstance<T>, PoolError> {
        self.pools
            .get_mut(resource_type)
            .ok_or_else(|| PoolError::NoSuchPool {
                resource_type: resource_type.clone(),
            })?
            .get_mut(slot)
    }

    fn allocate_generation(&mut self) -> Generation {
        self.last_generation = self.last_generation.next();
        self.last_generation
    }

    fn apply_registration(
        &mut self,
        event: RegistrationEvent<T>,
        violations: &mut Violations,
    ) -> Result<RegistrationOutcome, PoolError> {
        let RegistrationEvent {
            resource_type,
            slot,
            resource,
            owner,
            requires_bounce_back,
            generation,
        } = event;
        let Self {
            pools,
            claims,
            stats,
            ..
        } = self;

        let pool = pools
            .get_mut(&resource_type)
            .ok_or_else(|| PoolError::NoSuchPool {
                resource_type: resource_type.clone(),
            })?;
        let inserted = match pool.register(slot, &resource) {
            Ok(inserted) => inserted,
            Err(PoolError::AlreadyRegistered {
                resource_type,
                slot,
                registered_slot,
            }) => {
                violations.push(
                    violation!(
                        ViolationSeverity::Error,
                        ViolationKind::SlotMismatch,
                        "instance {:?} of {} registered at slot {} but already occupies slot {}",
                        resource,
                        resource_type,
                        slot,
                        registered_slot
                    )
                    .with_context("resource_type", resource_type.to_string())
                    .with_context("slot", slot.to_string())
                    .with_context("registered_slot", registered_slot.to_string()),
                );
                return Err(PoolError::AlreadyRegistered {
                    resource_type,
                    slot,
                    registered_slot,
                });
            },
            Err(error) => return Err(error),
        };
        if inserted {
            info!(%resource_type, slot, ?resource, "resource instance registered");
            if owner.is_system() {
                return Ok(RegistrationOutcome::Registered);
            }
        }

        let instance = pool.get_mut(slot)?;
        let previous_owner = instance.owner;
        let state_before = instance.tracker.state();
        let outcome = instance.tracker.on_registration(&Observation {
            owner,
            requires_bounce_back,
            generation,
        });

        if outcome == TrackerOutcome::Stale {
            stats.stale_events += 1;
            debug!(
                %resource_type,
                slot,
                ?generation,
                current = ?state_before.generation(),
                "dropping registration of an abandoned transfer"
            );
            return Ok(RegistrationOutcome::Stale);
        }

        if let Some(player) = owner.player().filter(|player| player.slot() != slot) {
            violations.push(
                violation!(
                    ViolationSeverity::Critical,
                    ViolationKind::SlotMismatch,
                    "instance {}[{}] reported owner {} which belongs to another slot",
                    resource_type,
                    slot,
                    player
                )
                .with_context("resource_type", resource_type.to_string())
                .with_context("slot", slot.to_string())
                .with_context("player", player.to_string()),
            );
        }

        let result = match outcome {
            TrackerOutcome::Stale => RegistrationOutcome::Stale,
            TrackerOutcome::Unexpected if owner == previous_owner => {
                stats.duplicate_registrations += 1;
                debug!(%resource_type, slot, %owner, "instance re-registered without changing owner");
                RegistrationOutcome::Duplicate
            },
            TrackerOutcome::Unexpected => {
                instance.owner = owner;
                stats.unexpected_ownership_changes += 1;
                violations.push(
                    violation!(
                        ViolationSeverity::Warning,
                        ViolationKind::UnexpectedOwnershipChange,
                        "instance {}[{}] changed owner from {} to {} while no transfer was pending",
                        resource_type,
                        slot,
                        previous_owner,
                        owner
                    )
                    .with_context("resource_type", resource_type.to_string())
                    .with_context("slot", slot.to_string())
                    .with_context("previous_owner", previous_owner.to_string())
                    .with_context("observed_owner", owner.to_string()),
                );
                claims.remove_instance(&resource_type, slot);
                if let Some(player) = owner.player().filter(|player| player.slot() == slot) {
                    claims.record(player, resource_type.clone(), instance.resource.clone());
                }
                RegistrationOutcome::Anomaly
            },
            TrackerOutcome::Mismatched => {
                if requires_bounce_back && state_before.is_bouncing() {
                    warn!(%resource_type, slot, state = %state_before, "ignoring repeated bounce request");
                } else {
                    debug!(
                        %resource_type,
                        slot,
                        %owner,
                        state = %state_before,
                        "registration does not match the pending transfer"
                    );
                }
                instance.owner = owner;
                RegistrationOutcome::Ignored
            },
            TrackerOutcome::BounceRequested { destination } => {
                instance.owner = owner;
                stats.bounces += 1;
                info!(%resource_type, slot, %destination, "acknowledgement requested a bounce through System");
                RegistrationOutcome::BounceRequested
            },
            TrackerOutcome::BounceCompleted { destination } => {
                instance.owner = owner;
                debug!(%resource_type, slot, %destination, "bounce reached System");
                RegistrationOutcome::BounceCompleted
            },
            TrackerOutcome::ClaimConfirmed { participant } => {
                if requires_bounce_back {
                    warn!(%resource_type, slot, player = %participant, "ignoring bounce request on the forward hop");
                }
                instance.owner = owner;
                claims.record(participant, resource_type.clone(), instance.resource.clone());
                info!(%resource_type, slot, player = %participant, "claim confirmed");
                RegistrationOutcome::ClaimConfirmed
            },
            TrackerOutcome::CleanupConfirmed => {
                instance.owner = Owner::System;
                stats.cleanups_confirmed += 1;
                claims.remove_instance(&resource_type, slot);
                info!(%resource_type, slot, "cleanup confirmed");
                RegistrationOutcome::CleanupConfirmed
            },
        };
        Ok(result)
    }
}

impl<T: Config> InvariantChecker for PoolState<T> {
    fn check_invariants(&self) -> Result<(), InvariantViolation> {
        for (player, resource_type, resource) in self.claims.iter() {
            let details = || format!("player={player}, resource_type={resource_type}");
            let instance = self
                .instance(resource_type, player.slot())
                .map_err(|_| {
                    InvariantViolation::new("PoolState", "participant map points at a missing instance")
                        .with_details(details())
                })?;
            if instance.resource != *resource {
                return Err(InvariantViolation::new(
                    "PoolState",
                    "participant map records a different instance than the pool",
                )
                .with_details(details()));
            }
            if instance.owner != Owner::Player(player) {
                return Err(InvariantViolation::new(
                    "PoolState",
                    "participant map entry disagrees with the recorded owner",
                )
                .with_details(format!("{}, owner={}", details(), instance.owner)));
            }
        }
        Ok(())
    }
}

/// Result of reserving an instance for a claim.
pub(crate) enum ClaimReservation<R> {
    /// The player already holds the instance; no transfer is needed.
    Held(R),
    /// The instance is reserved for the caller's claim loop.
    Reserved {
        /// The instance is not known to be under System and must be cleaned up first.
        needs_cleanup: bool,
    },
}

/// Hands out pooled resource instances to players and takes them back.
///
/// Built with [`PoolManagerBuilder`](crate::PoolManagerBuilder). Registration events are
/// handled synchronously; claims and cleanups are futures that complete once the host
/// confirmed the transfer or the configured deadline passed. Any number of claims and
/// cleanups for different instances may be polled concurrently on one task.
pub struct PoolManager<T>
where
    T: Config,
{
    max_players: usize,
    claim_config: ClaimConfig,
    cleanup_config: CleanupConfig,
    transfer: Box<dyn OwnershipTransfer<T>>,
    violation_observer: Option<Arc<dyn ViolationObserver>>,
    state: Mutex<PoolState<T>>,
}

impl<T: Config> std::fmt::Debug for PoolManager<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("PoolManager")
            .field("max_players", &self.max_players)
            .field("claim_config", &self.claim_config)
            .field("cleanup_config", &self.cleanup_config)
            .field("pools", &state.pools.values().collect::<Vec<_>>())
            .field("claims", &state.claims)
            .field("stats", &state.stats)
            .finish_non_exhaustive()
    }
}

impl<T: Config> PoolManager<T> {
    pub(crate) fn new(
        max_players: usize,
        resource_types: Vec<ResourceTypeId>,
        claim_config: ClaimConfig,
        cleanup_config: CleanupConfig,
        transfer: Box<dyn OwnershipTransfer<T>>,
        violation_observer: Option<Arc<dyn ViolationObserver>>,
    ) -> Self {
        Self {
            max_players,
            claim_config,
            cleanup_config,
            transfer,
            violation_observer,
            state: Mutex::new(PoolState::new(resource_types, max_players)),
        }
    }

    // ###############
    // # REGISTRATION #
    // ###############

    /// Registers the startup of a pre-created instance at `slot` of its pool.
    ///
    /// Equivalent to [`handle_registration_event`](Self::handle_registration_event) with
    /// [`RegistrationEvent::startup`]. Registering the same instance again is harmless.
    ///
    /// # Errors
    ///
    /// See [`handle_registration_event`](Self::handle_registration_event).
    pub fn register_instance(
        &self,
        resource_type: ResourceTypeId,
        slot: usize,
        resource: T::Resource,
    ) -> Result<RegistrationOutcome, PoolError> {
        self.handle_registration_event(RegistrationEvent::startup(resource_type, slot, resource))
    }

    /// Feeds a registration event into the manager.
    ///
    /// The first event for a slot stores the instance in its pool. Every later event is
    /// interpreted by the handshake of that instance: it may confirm a claim, continue a
    /// bounce, confirm a cleanup, get dropped as stale, or be reported as an unexpected
    /// ownership change and reconciled.
    ///
    /// # Errors
    ///
    /// - [`PoolError::NoSuchPool`] if no pool was declared for the event's resource type.
    /// - [`PoolError::SlotOutOfRange`] if the slot lies outside the pool.
    /// - [`PoolError::SlotOccupied`] if a different instance already registered at the slot.
    /// - [`PoolError::AlreadyRegistered`] if the instance already sits at another slot of its
    ///   pool. Also reported as a [`SlotMismatch`](ViolationKind::SlotMismatch) violation.
    pub fn handle_registration_event(
        &self,
        event: RegistrationEvent<T>,
    ) -> Result<RegistrationOutcome, PoolError> {
        trace!(
            resource_type = %event.resource_type,
            slot = event.slot,
            owner = %event.owner,
            requires_bounce_back = event.requires_bounce_back,
            generation = ?event.generation,
            "registration event"
        );
        let mut violations = Violations::new();
        let outcome = {
            let mut state = self.state.lock();
            let outcome = state.apply_registration(event, &mut violations);
            if outcome.is_ok() {
                crate::debug_check_invariants!(state, "after registration event");
            }
            outcome
        };
        for violation in &violations {
            self.report(violation);
        }
        outcome
    }

    // ###########
    // # LOOKUPS #
    // ###########

    /// Returns the instance stored at `slot` of the pool for `resource_type`.
    ///
    /// # Errors
    ///
    /// [`PoolError::NoSuchPool`], [`PoolError::SlotOutOfRange`] or [`PoolError::SlotVacant`].
    pub fn get_instance(
        &self,
        resource_type: &ResourceTypeId,
        slot: usize,
    ) -> Result<T::Resource, PoolError> {
        let state = self.state.lock();
        state
            .instance(resource_type, slot)
            .map(|instance| instance.resource.clone())
    }

    /// Returns the instance of `resource_type` that `player` currently holds.
    ///
    /// # Errors
    ///
    /// - [`PoolError::NoSuchPool`] if no pool was declared for `resource_type`.
    /// - [`PoolError::NotClaimed`] if the player holds no confirmed claim on the type.
    pub fn lookup(
        &self,
        player: PlayerHandle,
        resource_type: &ResourceTypeId,
    ) -> Result<T::Resource, PoolError> {
        let state = self.state.lock();
        state.pool(resource_type)?;
        state
            .claims
            .get(player, resource_type)
            .cloned()
            .ok_or_else(|| PoolError::NotClaimed {
                player,
                resource_type: resource_type.clone(),
            })
    }

    /// Returns the owner last observed or confirmed for the instance at `slot`.
    ///
    /// # Errors
    ///
    /// [`PoolError::NoSuchPool`], [`PoolError::SlotOutOfRange`] or [`PoolError::SlotVacant`].
    pub fn owner_of(&self, resource_type: &ResourceTypeId, slot: usize) -> Result<Owner, PoolError> {
        let state = self.state.lock();
        state
            .instance(resource_type, slot)
            .map(|instance| instance.owner)
    }

    /// Returns what the handshake of the instance at `slot` is currently waiting for.
    ///
    /// # Errors
    ///
    /// [`PoolError::NoSuchPool`], [`PoolError::SlotOutOfRange`] or [`PoolError::SlotVacant`].
    pub fn handshake_state(
        &self,
        resource_type: &ResourceTypeId,
        slot: usize,
    ) -> Result<HandshakeState, PoolError> {
        let state = self.state.lock();
        state
            .instance(resource_type, slot)
            .map(|instance| instance.tracker.state())
    }

    /// The resource types `player` currently holds a confirmed claim on.
    #[must_use]
    pub fn claimed_types(&self, player: PlayerHandle) -> ClaimedTypes {
        self.state.lock().claims.types_for(player)
    }

    /// Returns a snapshot of the manager's counters.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        self.state.lock().stats
    }

    /// The maximum number of players, which is also the size of every pool.
    #[must_use]
    pub fn max_players(&self) -> usize {
        self.max_players
    }

    /// The resource types with a declared pool, in order.
    #[must_use]
    pub fn resource_types(&self) -> Vec<ResourceTypeId> {
        self.state.lock().pools.keys().cloned().collect()
    }

    /// The number of slots of the pool for `resource_type`.
    ///
    /// # Errors
    ///
    /// [`PoolError::NoSuchPool`] if no pool was declared for `resource_type`.
    pub fn pool_size(&self, resource_type: &ResourceTypeId) -> Result<usize, PoolError> {
        self.state.lock().pool(resource_type).map(ResourcePool::size)
    }

    /// The number of instances registered into the pool for `resource_type`.
    ///
    /// # Errors
    ///
    /// [`PoolError::NoSuchPool`] if no pool was declared for `resource_type`.
    pub fn registered_count(&self, resource_type: &ResourceTypeId) -> Result<usize, PoolError> {
        self.state
            .lock()
            .pool(resource_type)
            .map(ResourcePool::registered_count)
    }

    /// The claim configuration in use.
    #[must_use]
    pub fn claim_config(&self) -> &ClaimConfig {
        &self.claim_config
    }

    /// The cleanup configuration in use.
    #[must_use]
    pub fn cleanup_config(&self) -> &CleanupConfig {
        &self.cleanup_config
    }

    // ##########
    // # CLAIMS #
    // ##########

    /// Transfers the instance at `player`'s slot of the `resource_type` pool to `player`.
    ///
    /// Makes up to [`ClaimConfig::effective_max_attempts`] attempts with exponential backoff.
    /// A timed-out attempt is followed by a forced cleanup so the next attempt starts from
    /// System ownership. Timeouts are only reported through telemetry; the future resolves
    /// once the host confirmed the transfer or every attempt failed.
    ///
    /// Returns immediately if the player already holds the instance.
    ///
    /// # Errors
    ///
    /// - [`PoolError::ClaimExhausted`] if every attempt timed out. The player should be removed
    ///   from the session.
    /// - [`PoolError::ClaimInProgress`] if another claim for the same instance is running.
    /// - [`PoolError::NoSuchPool`], [`PoolError::SlotOutOfRange`] or [`PoolError::SlotVacant`]
    ///   for requests that can never succeed. No transfer is attempted in that case.
    pub async fn claim(
        &self,
        player: PlayerHandle,
        resource_type: &ResourceTypeId,
    ) -> Result<T::Resource, PoolError> {
        ClaimController::new(self, player, resource_type, self.claim_config)
            .run()
            .await
    }

    /// Like [`claim`](Self::claim), with attempt deadlines and attempt count taken from
    /// `claim_config` instead of the manager's configuration.
    ///
    /// # Errors
    ///
    /// [`PoolError::InvalidConfig`] if `claim_config` does not validate, otherwise the same
    /// errors as [`claim`](Self::claim).
    pub async fn claim_with_config(
        &self,
        player: PlayerHandle,
        resource_type: &ResourceTypeId,
        claim_config: &ClaimConfig,
    ) -> Result<T::Resource, PoolError> {
        claim_config.validate()?;
        ClaimController::new(self, player, resource_type, *claim_config)
            .run()
            .await
    }

    /// Claims every listed resource type for `player` concurrently.
    ///
    /// Either every claim succeeds, or the claims that did succeed are released again with
    /// [`cleanup_on_remove`](Self::cleanup_on_remove) and the first error is returned.
    ///
    /// # Errors
    ///
    /// The first error of any individual [`claim`](Self::claim), in the order of
    /// `resource_types`.
    pub async fn claim_all(
        &self,
        player: PlayerHandle,
        resource_types: &[ResourceTypeId],
    ) -> Result<Vec<T::Resource>, PoolError> {
        let results = join_all(
            resource_types
                .iter()
                .map(|resource_type| self.claim(player, resource_type)),
        )
        .await;

        let mut resources = Vec::with_capacity(results.len());
        let mut claimed = ClaimedTypes::new();
        let mut first_error = None;
        for (resource_type, result) in resource_types.iter().zip(results) {
            match result {
                Ok(resource) => {
                    resources.push(resource);
                    claimed.push(resource_type.clone());
                },
                Err(error) => {
                    if first_error.is_none() {
                        first_error = Some(error);
                    }
                },
            }
        }

        let Some(error) = first_error else {
            return Ok(resources);
        };

        warn!(
            %player,
            %error,
            released = claimed.len(),
            "claim set incomplete, releasing the claims that succeeded"
        );
        let rollbacks = join_all(
            claimed
                .iter()
                .map(|resource_type| self.cleanup_on_remove(player, resource_type)),
        )
        .await;
        for (resource_type, rollback) in claimed.iter().zip(rollbacks) {
            if let Err(rollback_error) = rollback {
                warn!(%player, %resource_type, error = %rollback_error, "could not release claim");
            }
        }
        Err(error)
    }

    pub(crate) fn reserve_claim(
        &self,
        player: PlayerHandle,
        resource_type: &ResourceTypeId,
    ) -> Result<ClaimReservation<T::Resource>, PoolError> {
        let mut state = self.state.lock();
        let held = state.claims.get(player, resource_type).cloned();
        let PoolState { pools, stats, .. } = &mut *state;
        let pool = pools
            .get_mut(resource_type)
            .ok_or_else(|| PoolError::NoSuchPool {
                resource_type: resource_type.clone(),
            })?;
        let instance = pool.get_mut(player.slot())?;

        if instance.claim_active {
            return Err(PoolError::ClaimInProgress {
                player,
                resource_type: resource_type.clone(),
            });
        }
        let idle = instance.tracker.state().is_idle();
        if idle && instance.owner == Owner::Player(player) {
            if let Some(resource) = held {
                return Ok(ClaimReservation::Held(resource));
            }
        }

        instance.claim_active = true;
        stats.claims_started += 1;
        Ok(ClaimReservation::Reserved {
            needs_cleanup: !idle || !instance.owner.is_system(),
        })
    }

    pub(crate) fn release_claim(&self, resource_type: &ResourceTypeId, slot: usize) {
        if let Ok(instance) = self.state.lock().instance_mut(resource_type, slot) {
            instance.claim_active = false;
        }
    }

    /// Starts one claim attempt: draws a generation, arms the tracker and builds the
    /// `System → player` request. The caller fires it.
    pub(crate) fn begin_claim_attempt(
        &self,
        player: PlayerHandle,
        resource_type: &ResourceTypeId,
    ) -> Result<(TransferRequest<T>, UnboundedReceiver<HandshakeSignal>), PoolError> {
        let mut state = self.state.lock();
        let generation = state.allocate_generation();
        state.stats.attempts += 1;
        let slot = player.slot();
        let instance = state.instance_mut(resource_type, slot)?;
        let signals = instance.tracker.begin_claim(generation, player);
        let request = TransferRequest {
            resource_type: resource_type.clone(),
            slot,
            resource: instance.resource.clone(),
            expected_owner: Owner::System,
            new_owner: Owner::Player(player),
            generation,
        };
        Ok((request, signals))
    }

    /// Builds the request for the next bounce hop, if the attempt tagged `generation` is
    /// still waiting for it.
    pub(crate) fn bounce_request(
        &self,
        resource_type: &ResourceTypeId,
        slot: usize,
        generation: Generation,
        hop: HandshakeSignal,
    ) -> Option<TransferRequest<T>> {
        let state = self.state.lock();
        let instance = state.instance(resource_type, slot).ok()?;
        let (expected_owner, new_owner) = match (hop, instance.tracker.state()) {
            (
                HandshakeSignal::BounceBack { destination },
                HandshakeState::AwaitingBounceBack {
                    generation: current,
                    destination: pending,
                },
            ) if current == generation && pending == destination => {
                (Owner::Player(destination), Owner::System)
            },
            (
                HandshakeSignal::BounceForward { destination },
                HandshakeState::BouncingForward {
                    generation: current,
                    destination: pending,
                },
            ) if current == generation && pending == destination => {
                (Owner::System, Owner::Player(destination))
            },
            _ => return None,
        };
        Some(TransferRequest {
            resource_type: resource_type.clone(),
            slot,
            resource: instance.resource.clone(),
            expected_owner,
            new_owner,
            generation,
        })
    }

    /// Gives up on the transfer tagged `generation`. Returns `false` if it already resolved
    /// or was superseded.
    pub(crate) fn abandon_transfer(
        &self,
        resource_type: &ResourceTypeId,
        slot: usize,
        generation: Generation,
    ) -> bool {
        self.state
            .lock()
            .instance_mut(resource_type, slot)
            .is_ok_and(|instance| instance.tracker.abandon(generation))
    }

    pub(crate) fn update_stats(&self, update: impl FnOnce(&mut PoolStats)) {
        update(&mut self.state.lock().stats);
    }

    /// Hands a request to the host. Must be called without holding the lock.
    pub(crate) fn fire(&self, request: TransferRequest<T>) {
        debug!(
            resource_type = %request.resource_type,
            slot = request.slot,
            from = %request.expected_owner,
            to = %request.new_owner,
            generation = %request.generation,
            "firing ownership transfer"
        );
        self.transfer.transfer_ownership(request);
    }

    pub(crate) fn report(&self, violation: &SpecViolation) {
        report_to_observer(self.violation_observer.as_ref(), violation);
    }

    // ############
    // # CLEANUPS #
    // ############

    /// Sends the instance at `slot` of the `resource_type` pool back to System, whatever its
    /// believed state, and waits for the confirmation or the cleanup timeout.
    ///
    /// Supersedes any claim attempt or cleanup in flight for the instance.
    ///
    /// # Errors
    ///
    /// [`PoolError::NoSuchPool`], [`PoolError::SlotOutOfRange`] or [`PoolError::SlotVacant`].
    /// A missing confirmation is not an error; it yields [`CleanupOutcome::TimedOut`].
    pub async fn force_cleanup(
        &self,
        resource_type: &ResourceTypeId,
        slot: usize,
    ) -> Result<CleanupOutcome, PoolError> {
        self.run_cleanup(resource_type, slot, None).await
    }

    /// Force-cleans the instance at `player`'s slot of every pool, concurrently.
    ///
    /// Slots whose instance has not registered yet are skipped.
    ///
    /// # Errors
    ///
    /// [`PoolError::SlotOutOfRange`] if `player` does not fit into the pools.
    pub async fn force_cleanup_all(
        &self,
        player: PlayerHandle,
    ) -> Result<Vec<(ResourceTypeId, CleanupOutcome)>, PoolError> {
        let resource_types: Vec<ResourceTypeId> = {
            let state = self.state.lock();
            let mut resource_types = Vec::with_capacity(state.pools.len());
            for (resource_type, pool) in &state.pools {
                match pool.get(player.slot()) {
                    Ok(_) => resource_types.push(resource_type.clone()),
                    Err(PoolError::SlotVacant { .. }) => {
                        debug!(%player, %resource_type, "skipping cleanup of unregistered instance");
                    },
                    Err(error) => return Err(error),
                }
            }
            resource_types
        };

        let outcomes = join_all(
            resource_types
                .iter()
                .map(|resource_type| self.force_cleanup(resource_type, player.slot())),
        )
        .await;

        let mut results = Vec::with_capacity(outcomes.len());
        for (resource_type, outcome) in resource_types.into_iter().zip(outcomes) {
            match outcome {
                Ok(outcome) => results.push((resource_type, outcome)),
                Err(error) => {
                    warn!(%player, %resource_type, %error, "force cleanup failed");
                },
            }
        }
        Ok(results)
    }

    /// Sends the instance `player` holds for `resource_type` back to System, for a player
    /// leaving the session.
    ///
    /// The claim is removed from the participant map right away, before the host confirms.
    ///
    /// # Errors
    ///
    /// - [`PoolError::NoSuchPool`] if no pool was declared for `resource_type`.
    /// - [`PoolError::ShouldNeverHappen`] if the player holds no recorded claim on the type.
    ///   This is also reported as a critical violation.
    pub async fn cleanup_on_remove(
        &self,
        player: PlayerHandle,
        resource_type: &ResourceTypeId,
    ) -> Result<CleanupOutcome, PoolError> {
        let recorded = {
            let state = self.state.lock();
            state.pool(resource_type)?;
            state.claims.contains(player, resource_type)
        };
        if !recorded {
            let violation = violation!(
                ViolationSeverity::Critical,
                ViolationKind::InternalError,
                "player {} is leaving but holds no recorded {} instance",
                player,
                resource_type
            )
            .with_context("player", player.to_string())
            .with_context("resource_type", resource_type.to_string());
            self.report(&violation);
            return Err(PoolError::ShouldNeverHappen {
                context: violation.message,
            });
        }
        self.run_cleanup(resource_type, player.slot(), Some(Owner::Player(player)))
            .await
    }

    /// Runs [`cleanup_on_remove`](Self::cleanup_on_remove) for every resource type `player`
    /// holds, concurrently.
    pub async fn cleanup_on_remove_all(
        &self,
        player: PlayerHandle,
    ) -> Vec<(ResourceTypeId, Result<CleanupOutcome, PoolError>)> {
        let held = self.claimed_types(player);
        let outcomes = join_all(
            held.iter()
                .map(|resource_type| self.cleanup_on_remove(player, resource_type)),
        )
        .await;
        held.into_iter().zip(outcomes).collect()
    }

    fn begin_cleanup(
        &self,
        resource_type: &ResourceTypeId,
        slot: usize,
        expected_owner: Option<Owner>,
    ) -> Result<(TransferRequest<T>, UnboundedReceiver<HandshakeSignal>), PoolError> {
        let mut state = self.state.lock();
        state.instance(resource_type, slot)?;
        let generation = state.allocate_generation();
        state.claims.remove_instance(resource_type, slot);

        let instance = state.instance_mut(resource_type, slot)?;
        let superseded = instance.tracker.state();
        if !superseded.is_idle() {
            debug!(%resource_type, slot, state = %superseded, "cleanup supersedes transfer in flight");
        }
        let signals = instance.tracker.begin_cleanup(generation);
        let request = TransferRequest {
            resource_type: resource_type.clone(),
            slot,
            resource: instance.resource.clone(),
            expected_owner: expected_owner.unwrap_or(instance.owner),
            new_owner: Owner::System,
            generation,
        };
        crate::debug_check_invariants!(state, "after cleanup start");
        Ok((request, signals))
    }

    async fn run_cleanup(
        &self,
        resource_type: &ResourceTypeId,
        slot: usize,
        expected_owner: Option<Owner>,
    ) -> Result<CleanupOutcome, PoolError> {
        let (request, signals) = self.begin_cleanup(resource_type, slot, expected_owner)?;
        let generation = request.generation;
        self.fire(request);

        match timeout(self.cleanup_config.timeout, wait_for_confirmation(signals)).await {
            Ok(true) => Ok(CleanupOutcome::Confirmed),
            Ok(false) => {
                debug!(%resource_type, slot, %generation, "cleanup superseded");
                Ok(CleanupOutcome::Superseded)
            },
            Err(_elapsed) => {
                if !self.abandon_transfer(resource_type, slot, generation) {
                    return Ok(CleanupOutcome::Superseded);
                }
                self.update_stats(|stats| stats.cleanups_timed_out += 1);
                self.report(
                    &violation!(
                        ViolationSeverity::Warning,
                        ViolationKind::CleanupTimeout,
                        "instance {}[{}] did not return to System within {}ms",
                        resource_type,
                        slot,
                        self.cleanup_config.timeout.as_millis()
                    )
                    .with_context("resource_type", resource_type.to_string())
                    .with_context("slot", slot.to_string()),
                );
                Ok(CleanupOutcome::TimedOut)
            },
        }
    }

    // ##############
    // # ONBOARDING #
    // ##############

    /// Prepares a joining player: force-cleans its slot in every pool, then claims every
    /// listed resource type.
    ///
    /// # Errors
    ///
    /// Any error of [`force_cleanup_all`](Self::force_cleanup_all) or
    /// [`claim_all`](Self::claim_all). The player must then be removed from the session; the
    /// removal reason is logged.
    pub async fn onboard(
        &self,
        player: PlayerHandle,
        resource_types: &[ResourceTypeId],
    ) -> Result<Vec<T::Resource>, PoolError> {
        let onboarding = match self.force_cleanup_all(player).await {
            Ok(_) => self.claim_all(player, resource_types).await,
            Err(error) => Err(error),
        };
        match onboarding {
            Ok(resources) => {
                info!(%player, claimed = resources.len(), "player onboarded");
                Ok(resources)
            },
            Err(error) => {
                warn!(%player, %error, "removing player: onboarding claim set could not be satisfied");
                Err(error)
            },
        }
    }

    /// Releases everything a leaving player holds.
    ///
    /// Cleanup on departure is best-effort: failures are logged and returned, never retried.
    pub async fn offboard(
        &self,
        player: PlayerHandle,
    ) -> Vec<(ResourceTypeId, Result<CleanupOutcome, PoolError>)> {
        let outcomes = self.cleanup_on_remove_all(player).await;
        for (resource_type, outcome) in &outcomes {
            match outcome {
                Ok(CleanupOutcome::Confirmed) => {},
                Ok(outcome) => {
                    warn!(%player, %resource_type, ?outcome, "cleanup on departure was not confirmed");
                },
                Err(error) => {
                    warn!(%player, %resource_type, %error, "cleanup on departure failed");
                },
            }
        }
        info!(%player, released = outcomes.len(), "player offboarded");
        outcomes
    }
}

async fn wait_for_confirmation(mut signals: UnboundedReceiver<HandshakeSignal>) -> bool {
    while let Some(signal) = signals.recv().await {
        if signal == HandshakeSignal::Confirmed {
            return true;
        }
    }
    false
}
