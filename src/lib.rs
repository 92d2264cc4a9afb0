//! # Fortress Pool
//!
//! Fortress Pool hands pre-created, per-player resources (HUD panels, weapons, ability
//! handlers, ...) to joining players and takes them back when they leave.
//!
//! Every resource type has a pool with one instance per player slot, created once at startup.
//! Claiming moves the ownership of `pool[type][slot]` from the [`Owner::System`] authority to
//! the player at that slot. The host only offers a fire-and-forget "set owner" primitive
//! ([`OwnershipTransfer`]); the instance later re-registers itself with the
//! [`PoolManager`] once it finished re-initializing under its new owner. The manager turns
//! those registrations into a per-instance handshake state machine with bounded retries,
//! exponential backoff, an optional bounce through the system authority, and self-healing of
//! unexpected ownership changes.
//!
//! ```text
//! claim(player, type) ──► attempt loop ──► transfer_ownership(System → player)
//!                             ▲                        │ (host, asynchronously)
//!                             │                        ▼
//!                   resolve / timeout ◄── handle_registration_event(instance)
//! ```
//!
//! # Example
//!
//! ```
//! use fortress_pool::{ClaimConfig, Config, PlayerHandle, PoolManagerBuilder, ResourceTypeId};
//! use fortress_pool::transfer::channel::ChannelTransfer;
//!
//! #[derive(Debug, Clone, PartialEq, Eq)]
//! struct GameConfig;
//!
//! impl Config for GameConfig {
//!     type Resource = u32;
//! }
//!
//! let (transfer, _requests) = ChannelTransfer::<GameConfig>::new();
//! let manager = PoolManagerBuilder::<GameConfig>::new()
//!     .with_max_players(4)
//!     .with_pool(ResourceTypeId::new("PlayerHUD"))
//!     .with_claim_config(ClaimConfig::lan())
//!     .build(transfer)
//!     .unwrap();
//!
//! manager.register_instance(ResourceTypeId::new("PlayerHUD"), 2, 1002).unwrap();
//! assert_eq!(manager.get_instance(&ResourceTypeId::new("PlayerHUD"), 2).unwrap(), 1002);
//! assert!(manager.lookup(PlayerHandle::new(2), &ResourceTypeId::new("PlayerHUD")).is_err());
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
use std::borrow::Cow;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

pub use config::{ClaimConfig, CleanupConfig, MIN_CLAIM_ATTEMPTS};
pub use error::PoolError;
pub use handshake::state::HandshakeState;
pub use pool::builder::PoolManagerBuilder;
pub use pool::manager::{CleanupOutcome, PoolManager, RegistrationOutcome};
pub use pool::stats::PoolStats;
pub use transfer::chaos::{ChaosConfig, ChaosStats, ChaosTransfer};
pub use transfer::channel::ChannelTransfer;

mod claim;
pub mod config;
#[doc(hidden)]
pub mod error;
/// Seeded PCG32 generator used for deterministic fault injection.
pub mod rng;
pub mod telemetry;
#[doc(hidden)]
pub mod handshake {
    pub mod state;
    #[doc(hidden)]
    pub mod tracker;
}
#[doc(hidden)]
pub mod pool {
    pub mod builder;
    pub mod manager;
    #[doc(hidden)]
    pub mod participant_map;
    #[doc(hidden)]
    pub mod resource_pool;
    pub mod stats;
}
/// Adapters implementing [`OwnershipTransfer`](crate::OwnershipTransfer).
pub mod transfer {
    /// Fault-injecting wrapper around another transfer primitive.
    pub mod chaos;
    /// Forwards transfer requests into a tokio channel.
    pub mod channel;
}

/// Internal module exposing implementation details for testing and benchmarking.
///
/// **This module is NOT part of the public API.** Everything here may change without notice.
#[doc(hidden)]
pub mod __internal {
    pub use crate::handshake::tracker::{HandshakeSignal, HandshakeTracker, Observation, TrackerOutcome};
    pub use crate::pool::participant_map::ParticipantResourceMap;
    pub use crate::pool::resource_pool::{PooledInstance, ResourcePool};
}

// #############
// #   TYPES   #
// #############

/// The stable slot index of a player for the duration of its session membership.
///
/// Slot indices are dense and bounded by the maximum player count. A player may only ever
/// claim the instance stored at its own slot of every pool.
///
/// # Examples
///
/// ```
/// use fortress_pool::PlayerHandle;
///
/// let player = PlayerHandle::new(2);
/// assert_eq!(player.slot(), 2);
/// assert!(player.is_valid_player_for(4));
/// assert!(!player.is_valid_player_for(2));
/// ```
#[derive(
    Debug,
    Copy,
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    serde::Serialize,
    serde::Deserialize,
)]
pub struct PlayerHandle(usize);

impl PlayerHandle {
    /// Creates a new `PlayerHandle` from a slot index.
    #[inline]
    #[must_use]
    pub const fn new(slot: usize) -> Self {
        PlayerHandle(slot)
    }

    /// Returns the slot index this player occupies in every pool.
    #[inline]
    #[must_use]
    pub const fn slot(self) -> usize {
        self.0
    }

    /// Returns `true` if this handle fits into pools sized for `max_players`.
    #[inline]
    #[must_use]
    pub const fn is_valid_player_for(self, max_players: usize) -> bool {
        self.0 < max_players
    }
}

impl std::fmt::Display for PlayerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<usize> for PlayerHandle {
    #[inline]
    fn from(value: usize) -> Self {
        PlayerHandle(value)
    }
}

impl From<PlayerHandle> for usize {
    #[inline]
    fn from(handle: PlayerHandle) -> Self {
        handle.0
    }
}

/// The owner of a resource instance: either the system authority or exactly one player.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Owner {
    /// The host authority. Every instance starts out owned by the system.
    #[default]
    System,
    /// A joined player, identified by its slot.
    Player(PlayerHandle),
}

impl Owner {
    /// Returns `true` if the system authority owns the instance.
    #[inline]
    #[must_use]
    pub const fn is_system(self) -> bool {
        matches!(self, Owner::System)
    }

    /// Returns the owning player, if any.
    #[inline]
    #[must_use]
    pub const fn player(self) -> Option<PlayerHandle> {
        match self {
            Owner::System => None,
            Owner::Player(handle) => Some(handle),
        }
    }
}

impl std::fmt::Display for Owner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Owner::System => write!(f, "System"),
            Owner::Player(handle) => write!(f, "Player({handle})"),
        }
    }
}

impl From<PlayerHandle> for Owner {
    #[inline]
    fn from(handle: PlayerHandle) -> Self {
        Owner::Player(handle)
    }
}

/// Identifies a category of pooled resource, e.g. `"PlayerHUD"` or `"Weapon1"`.
///
/// [`ResourceTypeId::UNDEFINED`] is a reserved placeholder; no pool can be declared for it.
///
/// ```
/// use fortress_pool::ResourceTypeId;
///
/// let hud = ResourceTypeId::new("PlayerHUD");
/// assert_eq!(hud.as_str(), "PlayerHUD");
/// assert!(!hud.is_undefined());
/// assert!(ResourceTypeId::UNDEFINED.is_undefined());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceTypeId(Cow<'static, str>);

impl ResourceTypeId {
    /// The placeholder type that never names a pool.
    pub const UNDEFINED: ResourceTypeId = ResourceTypeId(Cow::Borrowed("Undefined"));

    /// Creates a resource type identifier.
    #[must_use]
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    /// Returns the name of the resource type.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` for the reserved placeholder.
    #[must_use]
    pub fn is_undefined(&self) -> bool {
        *self == Self::UNDEFINED
    }
}

impl std::fmt::Display for ResourceTypeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&'static str> for ResourceTypeId {
    fn from(value: &'static str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ResourceTypeId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Ticket attached to every transfer request.
///
/// Each claim attempt and each cleanup draws a fresh generation. Hosts echo it back in the
/// [`RegistrationEvent`] caused by that transfer, which lets the manager drop acknowledgements
/// that belong to an attempt that has already timed out.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Generation(u64);

impl Generation {
    /// Creates a generation from its raw value.
    #[inline]
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    #[inline]
    pub(crate) const fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

impl std::fmt::Display for Generation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "g{}", self.0)
    }
}

/// A request for the host to change the owner of one resource instance.
///
/// Delivered through [`OwnershipTransfer::transfer_ownership`]. There is no synchronous
/// answer; the host reports completion by feeding a [`RegistrationEvent`] back into
/// [`PoolManager::handle_registration_event`].
pub struct TransferRequest<T>
where
    T: Config,
{
    /// Resource type of the pool holding the instance.
    pub resource_type: ResourceTypeId,
    /// Slot of the instance inside its pool.
    pub slot: usize,
    /// The instance itself.
    pub resource: T::Resource,
    /// Who the manager believes owns the instance right now.
    pub expected_owner: Owner,
    /// Who should own the instance afterwards.
    pub new_owner: Owner,
    /// Ticket to echo back in the resulting registration event.
    pub generation: Generation,
}

// Manual impls: deriving would put bounds on the `Config` marker type itself.
impl<T: Config> Clone for TransferRequest<T> {
    fn clone(&self) -> Self {
        Self {
            resource_type: self.resource_type.clone(),
            slot: self.slot,
            resource: self.resource.clone(),
            expected_owner: self.expected_owner,
            new_owner: self.new_owner,
            generation: self.generation,
        }
    }
}

impl<T: Config> PartialEq for TransferRequest<T> {
    fn eq(&self, other: &Self) -> bool {
        self.resource_type == other.resource_type
            && self.slot == other.slot
            && self.resource == other.resource
            && self.expected_owner == other.expected_owner
            && self.new_owner == other.new_owner
            && self.generation == other.generation
    }
}

impl<T: Config> Eq for TransferRequest<T> {}

impl<T: Config> Debug for TransferRequest<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferRequest")
            .field("resource_type", &self.resource_type)
            .field("slot", &self.slot)
            .field("resource", &self.resource)
            .field("expected_owner", &self.expected_owner)
            .field("new_owner", &self.new_owner)
            .field("generation", &self.generation)
            .finish()
    }
}

/// Emitted by a resource instance whenever it finished its local (re)initialization,
/// including the very first time at startup.
pub struct RegistrationEvent<T>
where
    T: Config,
{
    /// Resource type of the pool the instance belongs to.
    pub resource_type: ResourceTypeId,
    /// Slot of the instance inside its pool.
    pub slot: usize,
    /// The instance itself.
    pub resource: T::Resource,
    /// The owner the instance observed after re-initializing.
    pub owner: Owner,
    /// Set when this transfer has to visibly pass back through the system authority before
    /// the player-side binding can be trusted.
    pub requires_bounce_back: bool,
    /// Ticket of the transfer that caused this registration, if the host tracks it.
    ///
    /// Events without a ticket are matched against the pending handshake by observed owner.
    /// Late acknowledgements are only recognized as stale when they carry their ticket: an
    /// untagged acknowledgement of an abandoned attempt that reports the owner a later attempt
    /// waits for resolves that later attempt. Hosts that retry transfers should echo tickets.
    pub generation: Option<Generation>,
}

impl<T: Config> RegistrationEvent<T> {
    /// The registration every instance sends once at startup: owned by the system, no bounce.
    #[must_use]
    pub fn startup(resource_type: ResourceTypeId, slot: usize, resource: T::Resource) -> Self {
        Self {
            resource_type,
            slot,
            resource,
            owner: Owner::System,
            requires_bounce_back: false,
            generation: None,
        }
    }

    /// The registration a host sends after completing `request`.
    #[must_use]
    pub fn acknowledging(request: &TransferRequest<T>, requires_bounce_back: bool) -> Self {
        Self {
            resource_type: request.resource_type.clone(),
            slot: request.slot,
            resource: request.resource.clone(),
            owner: request.new_owner,
            requires_bounce_back,
            generation: Some(request.generation),
        }
    }
}

impl<T: Config> Clone for RegistrationEvent<T> {
    fn clone(&self) -> Self {
        Self {
            resource_type: self.resource_type.clone(),
            slot: self.slot,
            resource: self.resource.clone(),
            owner: self.owner,
            requires_bounce_back: self.requires_bounce_back,
            generation: self.generation,
        }
    }
}

impl<T: Config> PartialEq for RegistrationEvent<T> {
    fn eq(&self, other: &Self) -> bool {
        self.resource_type == other.resource_type
            && self.slot == other.slot
            && self.resource == other.resource
            && self.owner == other.owner
            && self.requires_bounce_back == other.requires_bounce_back
            && self.generation == other.generation
    }
}

impl<T: Config> Eq for RegistrationEvent<T> {}

impl<T: Config> Debug for RegistrationEvent<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistrationEvent")
            .field("resource_type", &self.resource_type)
            .field("slot", &self.slot)
            .field("resource", &self.resource)
            .field("owner", &self.owner)
            .field("requires_bounce_back", &self.requires_bounce_back)
            .field("generation", &self.generation)
            .finish()
    }
}

// #############
// #  TRAITS   #
// #############

/// Compile time parameterization for pool managers.
///
/// # Example
///
/// ```
/// use fortress_pool::Config;
///
/// // Instances are identified by the host's numeric object ids
/// #[derive(Debug, Clone, PartialEq, Eq)]
/// struct GameConfig;
///
/// impl Config for GameConfig {
///     type Resource = u64;
/// }
/// ```
#[cfg(feature = "sync-send")]
pub trait Config: 'static + Send + Sync {
    /// Handle identifying one pre-created resource instance on the host.
    type Resource: Clone + PartialEq + Eq + Hash + Debug + Send + Sync;
}

/// Compile time parameterization for pool managers.
#[cfg(not(feature = "sync-send"))]
pub trait Config: 'static {
    /// Handle identifying one pre-created resource instance on the host.
    type Resource: Clone + PartialEq + Eq + Hash + Debug;
}

/// The host's fire-and-forget "set owner" capability.
///
/// Implementations must not block and must not report success synchronously. They may call
/// back into the [`PoolManager`] from inside `transfer_ownership`; the manager never holds
/// its internal lock while firing a request.
#[cfg(feature = "sync-send")]
pub trait OwnershipTransfer<T>: Send + Sync
where
    T: Config,
{
    /// Asks the host to move `request.resource` from `request.expected_owner` to
    /// `request.new_owner`.
    fn transfer_ownership(&self, request: TransferRequest<T>);
}

/// The host's fire-and-forget "set owner" capability.
///
/// Implementations must not block and must not report success synchronously. They may call
/// back into the [`PoolManager`] from inside `transfer_ownership`; the manager never holds
/// its internal lock while firing a request.
#[cfg(not(feature = "sync-send"))]
pub trait OwnershipTransfer<T>
where
    T: Config,
{
    /// Asks the host to move `request.resource` from `request.expected_owner` to
    /// `request.new_owner`.
    fn transfer_ownership(&self, request: TransferRequest<T>);
}

impl<T, X> OwnershipTransfer<T> for Arc<X>
where
    T: Config,
    X: OwnershipTransfer<T> + ?Sized,
{
    fn transfer_ownership(&self, request: TransferRequest<T>) {
        (**self).transfer_ownership(request);
    }
}

// ###################
// # UNIT TESTS      #
// ###################
