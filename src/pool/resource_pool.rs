//! Fixed-size pool of pre-created instances of one resource type.
//!
//! This module provides the [`ResourcePool`] struct that stores one [`PooledInstance`] per
//! player slot together with its recorded owner and handshake bookkeeping.

use crate::error::PoolError;
use crate::handshake::tracker::HandshakeTracker;
use crate::{Config, Owner, ResourceTypeId};

/// One pre-created resource instance and everything the manager knows about it.
pub struct PooledInstance<T>
where
    T: Config,
{
    /// The instance handle. Never changes once registered.
    pub resource: T::Resource,
    /// The owner last observed or confirmed for the instance.
    pub owner: Owner,
    /// Handshake state of the transfer in flight, if any.
    pub tracker: HandshakeTracker,
    /// Set while a claim loop is running for this instance.
    pub claim_active: bool,
}

impl<T: Config> PooledInstance<T> {
    /// A freshly registered instance, owned by the system authority.
    #[must_use]
    pub fn new(resource: T::Resource) -> Self {
        Self {
            resource,
            owner: Owner::System,
            tracker: HandshakeTracker::new(),
            claim_active: false,
        }
    }
}

impl<T> std::fmt::Debug for PooledInstance<T>
where
    T: Config,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let Self {
            resource,
            owner,
            tracker,
            claim_active,
        } = self;

        f.debug_struct("PooledInstance")
            .field("resource", resource)
            .field("owner", owner)
            .field("state", &tracker.state())
            .field("claim_active", claim_active)
            .finish()
    }
}

/// The instances of one resource type, indexed by player slot.
///
/// Slots are filled lazily as instances send their startup registration. A slot never
/// changes its instance once filled.
///
/// # Note
///
/// This type is re-exported in [`__internal`](crate::__internal) for testing and benchmarking.
/// It is not part of the stable public API.
pub struct ResourcePool<T>
where
    T: Config,
{
    resource_type: ResourceTypeId,
    slots: Vec<Option<PooledInstance<T>>>,
}

impl<T> std::fmt::Debug for ResourcePool<T>
where
    T: Config,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourcePool")
            .field("resource_type", &self.resource_type)
            .field("size", &self.slots.len())
            .field("registered", &self.registered_count())
            .finish()
    }
}

impl<T: Config> ResourcePool<T> {
    /// Creates an empty pool with `size` slots.
    #[must_use]
    pub fn new(resource_type: ResourceTypeId, size: usize) -> Self {
        let mut slots = Vec::with_capacity(size);
        slots.resize_with(size, || None);
        Self {
            resource_type,
            slots,
        }
    }

    /// The resource type stored in this pool.
    #[must_use]
    pub fn resource_type(&self) -> &ResourceTypeId {
        &self.resource_type
    }

    /// The number of slots, equal to the maximum player count.
    #[must_use]
    pub fn size(&self) -> usize {
        self.slots.len()
    }

    /// The number of slots whose instance has registered.
    #[must_use]
    pub fn registered_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    fn check_slot(&self, slot: usize) -> Result<(), PoolError> {
        if slot >= self.slots.len() {
            return Err(PoolError::SlotOutOfRange {
                resource_type: self.resource_type.clone(),
                slot,
                pool_size: self.slots.len(),
            });
        }
        Ok(())
    }

    /// Stores `resource` at `slot` unless that slot already holds it.
    ///
    /// Returns `true` if the instance was newly inserted. An instance lives in exactly one
    /// slot of its pool.
    ///
    /// # Errors
    ///
    /// - [`PoolError::SlotOutOfRange`] if `slot` lies outside the pool.
    /// - [`PoolError::AlreadyRegistered`] if the instance already sits at another slot.
    /// - [`PoolError::SlotOccupied`] if a different instance already sits at `slot`.
    pub fn register(&mut self, slot: usize, resource: &T::Resource) -> Result<bool, PoolError> {
        self.check_slot(slot)?;
        if matches!(&self.slots[slot], Some(existing) if existing.resource == *resource) {
            return Ok(false);
        }
        if let Some(registered_slot) = self.slot_of(resource) {
            return Err(PoolError::AlreadyRegistered {
                resource_type: self.resource_type.clone(),
                slot,
                registered_slot,
            });
        }
        if self.slots[slot].is_some() {
            return Err(PoolError::SlotOccupied {
                resource_type: self.resource_type.clone(),
                slot,
            });
        }
        self.slots[slot] = Some(PooledInstance::new(resource.clone()));
        Ok(true)
    }

    /// The slot `resource` is registered at, if any.
    #[must_use]
    pub fn slot_of(&self, resource: &T::Resource) -> Option<usize> {
        self.iter()
            .find(|(_, instance)| instance.resource == *resource)
            .map(|(slot, _)| slot)
    }

    /// Returns the instance at `slot`.
    ///
    /// # Errors
    ///
    /// [`PoolError::SlotOutOfRange`] or [`PoolError::SlotVacant`].
    pub fn get(&self, slot: usize) -> Result<&PooledInstance<T>, PoolError> {
        self.check_slot(slot)?;
        self.slots[slot]
            .as_ref()
            .ok_or_else(|| PoolError::SlotVacant {
                resource_type: self.resource_type.clone(),
                slot,
            })
    }

    /// Returns the instance at `slot` mutably.
    ///
    /// # Errors
    ///
    /// [`PoolError::SlotOutOfRange`] or [`PoolError::SlotVacant`].
    pub fn get_mut(&mut self, slot: usize) -> Result<&mut PooledInstance<T>, PoolError> {
        self.check_slot(slot)?;
        let resource_type = &self.resource_type;
        self.slots[slot]
            .as_mut()
            .ok_or_else(|| PoolError::SlotVacant {
                resource_type: resource_type.clone(),
                slot,
            })
    }

    /// Iterates over the registered instances and their slots.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &PooledInstance<T>)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(slot, instance)| instance.as_ref().map(|instance| (slot, instance)))
    }
}
