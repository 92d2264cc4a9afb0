//! Participant resource map: which player holds which instance of which resource type.
//!
//! This module provides the [`ParticipantResourceMap`] struct. An entry is recorded only
//! when a claim is confirmed (or an observed ownership change is reconciled) and removed
//! as soon as a cleanup for the instance begins.

use smallvec::SmallVec;
use std::collections::BTreeMap;

use crate::{Config, PlayerHandle, ResourceTypeId};

/// Resource types claimed by one player. Most games hand out only a handful per player.
pub type ClaimedTypes = SmallVec<[ResourceTypeId; 8]>;

/// Map from player to the instances that player currently holds, per resource type.
///
/// Entries are keyed by player handle; since a player only ever holds the instance at its
/// own slot, the slot of an entry is always the player's slot.
///
/// # Note
///
/// This type is re-exported in [`__internal`](crate::__internal) for testing and benchmarking.
/// It is not part of the stable public API.
pub struct ParticipantResourceMap<T>
where
    T: Config,
{
    claims: BTreeMap<PlayerHandle, BTreeMap<ResourceTypeId, T::Resource>>,
}

impl<T> std::fmt::Debug for ParticipantResourceMap<T>
where
    T: Config,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map().entries(self.claims.iter()).finish()
    }
}

impl<T: Config> Default for ParticipantResourceMap<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Config> ParticipantResourceMap<T> {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self {
            claims: BTreeMap::new(),
        }
    }

    /// Records that `player` holds `resource` for `resource_type`.
    ///
    /// Returns the instance previously recorded for the pair, if any.
    pub fn record(
        &mut self,
        player: PlayerHandle,
        resource_type: ResourceTypeId,
        resource: T::Resource,
    ) -> Option<T::Resource> {
        self.claims
            .entry(player)
            .or_default()
            .insert(resource_type, resource)
    }

    /// Returns the instance `player` holds for `resource_type`.
    #[must_use]
    pub fn get(&self, player: PlayerHandle, resource_type: &ResourceTypeId) -> Option<&T::Resource> {
        self.claims.get(&player)?.get(resource_type)
    }

    /// Returns `true` if `player` holds an instance of `resource_type`.
    #[must_use]
    pub fn contains(&self, player: PlayerHandle, resource_type: &ResourceTypeId) -> bool {
        self.get(player, resource_type).is_some()
    }

    /// Removes the entry for the pair, returning the instance it recorded.
    pub fn remove(
        &mut self,
        player: PlayerHandle,
        resource_type: &ResourceTypeId,
    ) -> Option<T::Resource> {
        let types = self.claims.get_mut(&player)?;
        let removed = types.remove(resource_type);
        if types.is_empty() {
            self.claims.remove(&player);
        }
        removed
    }

    /// Removes whatever entry points at the instance stored at `slot` of `resource_type`.
    pub fn remove_instance(
        &mut self,
        resource_type: &ResourceTypeId,
        slot: usize,
    ) -> Option<T::Resource> {
        self.remove(PlayerHandle::new(slot), resource_type)
    }

    /// The resource types `player` currently holds, in order.
    #[must_use]
    pub fn types_for(&self, player: PlayerHandle) -> ClaimedTypes {
        self.claims
            .get(&player)
            .map(|types| types.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Iterates over every `(player, resource type, instance)` entry.
    pub fn iter(&self) -> impl Iterator<Item = (PlayerHandle, &ResourceTypeId, &T::Resource)> + '_ {
        self.claims.iter().flat_map(|(player, types)| {
            types
                .iter()
                .map(move |(resource_type, resource)| (*player, resource_type, resource))
        })
    }

    /// The total number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.claims.values().map(BTreeMap::len).sum()
    }

    /// Returns `true` if nobody holds anything.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.claims.is_empty()
    }
}
