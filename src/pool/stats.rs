/// Counters describing what a [`PoolManager`](crate::PoolManager) has done so far.
///
/// Obtained through [`PoolManager::stats`](crate::PoolManager::stats). All counters only
/// ever grow.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[must_use = "PoolStats should be inspected or used after being queried"]
pub struct PoolStats {
    /// Claims that entered the attempt loop.
    pub claims_started: u64,
    /// Claims that ended with a confirmed transfer.
    pub claims_succeeded: u64,
    /// Claims that gave up after their last attempt.
    ///
    /// This is the "claim exhausted" metric: every increment corresponds to a player that
    /// should be removed from the session.
    pub claims_exhausted: u64,
    /// Individual claim attempts, including retries.
    pub attempts: u64,
    /// Attempts whose acknowledgement did not arrive before the deadline.
    pub attempt_timeouts: u64,
    /// Acknowledgements that asked for a bounce through the system authority.
    pub bounces: u64,
    /// Cleanups confirmed by a registration under the system authority.
    pub cleanups_confirmed: u64,
    /// Cleanups that gave up waiting for their confirmation.
    pub cleanups_timed_out: u64,
    /// Registration events that arrived while nobody was waiting and reported a new owner.
    pub unexpected_ownership_changes: u64,
    /// Registration events that repeated the owner already on record while nobody was waiting.
    pub duplicate_registrations: u64,
    /// Acknowledgements dropped because they belonged to an abandoned transfer.
    pub stale_events: u64,
}

impl PoolStats {
    /// Creates zeroed statistics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims that have neither succeeded nor been exhausted. Includes claims that ended
    /// early with an error other than exhaustion.
    #[must_use]
    pub fn claims_unresolved(&self) -> u64 {
        self.claims_started
            .saturating_sub(self.claims_succeeded)
            .saturating_sub(self.claims_exhausted)
    }
}
