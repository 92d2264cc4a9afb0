use std::error::Error;
use std::fmt;
use std::fmt::Display;

use crate::{PlayerHandle, ResourceTypeId};

/// This enum contains all error messages this library can return. Most API functions will generally return a [`Result<T, PoolError>`].
///
/// Per-attempt claim timeouts never show up here: they are recovered inside the claim loop and
/// only reported through [`telemetry`](crate::telemetry). Cleanup timeouts surface as
/// [`CleanupOutcome::TimedOut`](crate::CleanupOutcome::TimedOut).
///
/// [`Result<T, PoolError>`]: std::result::Result
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PoolError {
    /// No pool was declared for the given resource type.
    NoSuchPool {
        /// The resource type that has no pool.
        resource_type: ResourceTypeId,
    },
    /// The slot index lies outside the pool. Pools are sized to the maximum player count.
    SlotOutOfRange {
        /// The resource type of the pool.
        resource_type: ResourceTypeId,
        /// The requested slot.
        slot: usize,
        /// The number of slots in the pool.
        pool_size: usize,
    },
    /// The slot is in range but no instance has registered into it yet.
    SlotVacant {
        /// The resource type of the pool.
        resource_type: ResourceTypeId,
        /// The vacant slot.
        slot: usize,
    },
    /// A different instance already occupies the slot.
    SlotOccupied {
        /// The resource type of the pool.
        resource_type: ResourceTypeId,
        /// The occupied slot.
        slot: usize,
    },
    /// The instance is already registered at another slot of the same pool.
    AlreadyRegistered {
        /// The resource type of the pool.
        resource_type: ResourceTypeId,
        /// The slot the instance tried to register into.
        slot: usize,
        /// The slot the instance occupies.
        registered_slot: usize,
    },
    /// The player holds no recorded claim on the given resource type.
    NotClaimed {
        /// The player that was looked up.
        player: PlayerHandle,
        /// The resource type that was looked up.
        resource_type: ResourceTypeId,
    },
    /// Another claim for the same instance is still running. Repeated claims for the same
    /// (player, resource type) pair must be serialized by the caller.
    ClaimInProgress {
        /// The player whose claim was rejected.
        player: PlayerHandle,
        /// The resource type of the rejected claim.
        resource_type: ResourceTypeId,
    },
    /// Every claim attempt timed out. The player should be removed from the session instead of
    /// being left partially onboarded.
    ClaimExhausted {
        /// The player whose claim failed.
        player: PlayerHandle,
        /// The resource type that could not be claimed.
        resource_type: ResourceTypeId,
        /// The number of attempts that were made.
        attempts: u32,
    },
    /// Internal bookkeeping disagrees with what the caller was entitled to expect.
    /// If you encounter this error, please report it as a bug.
    ShouldNeverHappen {
        /// A description of the broken expectation.
        context: String,
    },
    /// You made an invalid request, usually by using wrong parameters for function calls.
    InvalidRequest {
        /// Further specifies why the request was invalid.
        info: String,
    },
    /// A configuration value is out of its accepted range.
    InvalidConfig {
        /// The offending field.
        field: &'static str,
        /// Why the value was rejected.
        info: String,
    },
}

impl PoolError {
    /// Returns `true` for errors caused by wrong usage of the API rather than by the host.
    ///
    /// These are returned immediately and are never retried.
    #[must_use]
    pub const fn is_programmer_error(&self) -> bool {
        !matches!(self, Self::ClaimExhausted { .. })
    }
}

impl Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolError::NoSuchPool { resource_type } => {
                write!(f, "No pool declared for resource type {}", resource_type)
            },
            PoolError::SlotOutOfRange {
                resource_type,
                slot,
                pool_size,
            } => {
                write!(
                    f,
                    "Slot {} is out of range for pool {} of size {}",
                    slot, resource_type, pool_size
                )
            },
            PoolError::SlotVacant {
                resource_type,
                slot,
            } => {
                write!(
                    f,
                    "No instance registered at slot {} of pool {}",
                    slot, resource_type
                )
            },
            PoolError::SlotOccupied {
                resource_type,
                slot,
            } => {
                write!(
                    f,
                    "Slot {} of pool {} is already occupied by a different instance",
                    slot, resource_type
                )
            },
            PoolError::AlreadyRegistered {
                resource_type,
                slot,
                registered_slot,
            } => {
                write!(
                    f,
                    "Instance registering at slot {} of pool {} already occupies slot {}",
                    slot, resource_type, registered_slot
                )
            },
            PoolError::NotClaimed {
                player,
                resource_type,
            } => {
                write!(
                    f,
                    "Player {} holds no claim on resource type {}",
                    player, resource_type
                )
            },
            PoolError::ClaimInProgress {
                player,
                resource_type,
            } => {
                write!(
                    f,
                    "A claim on resource type {} for player {} is already in progress",
                    resource_type, player
                )
            },
            PoolError::ClaimExhausted {
                player,
                resource_type,
                attempts,
            } => {
                write!(
                    f,
                    "Player {} could not claim resource type {} after {} attempts",
                    player, resource_type, attempts
                )
            },
            PoolError::ShouldNeverHappen { context } => {
                write!(f, "Internal error (please report as bug): {}", context)
            },
            PoolError::InvalidRequest { info } => {
                write!(f, "Invalid Request: {}", info)
            },
            PoolError::InvalidConfig { field, info } => {
                write!(f, "Invalid configuration for {}: {}", field, info)
            },
        }
    }
}

impl Error for PoolError {}
