//! Interprets registration events for one resource instance.
//!
//! The tracker owns the instance's [`HandshakeState`] and the sending half of the signal
//! channel the waiting claim or cleanup listens on. The pool manager feeds it every
//! registration event for the instance, in arrival order, and applies the bookkeeping
//! described by the returned [`TrackerOutcome`].

use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use crate::handshake::state::HandshakeState;
use crate::{Generation, Owner, PlayerHandle};

/// Progress reported to the claim or cleanup waiting on an instance.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum HandshakeSignal {
    /// The transfer completed; the waiter can resolve.
    Confirmed,
    /// Send the instance back to System, then wait.
    BounceBack {
        /// The player that gets the instance after the bounce.
        destination: PlayerHandle,
    },
    /// The instance is back under System; hand it to the destination again.
    BounceForward {
        /// The player that gets the instance.
        destination: PlayerHandle,
    },
}

/// The parts of a registration event the tracker cares about.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Observation {
    /// The owner the instance observed after re-initializing.
    pub owner: Owner,
    /// The instance asks for a bounce through System.
    pub requires_bounce_back: bool,
    /// Ticket of the transfer that caused the registration, if the host echoed it.
    ///
    /// Without a ticket the tracker cannot tell a late acknowledgement from a current one.
    pub generation: Option<Generation>,
}

/// What a registration event meant for the handshake.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TrackerOutcome {
    /// The event belongs to an abandoned transfer. Nothing changed.
    Stale,
    /// Nobody was waiting on the instance.
    Unexpected,
    /// Something was pending, but the event does not report the awaited owner.
    Mismatched,
    /// The acknowledgement asked for a bounce; the instance goes back to System first.
    BounceRequested {
        /// The player that gets the instance after the bounce.
        destination: PlayerHandle,
    },
    /// The instance is back under System; it is being handed forward again.
    BounceCompleted {
        /// The player that gets the instance.
        destination: PlayerHandle,
    },
    /// The claim attempt resolved: the participant owns the instance.
    ClaimConfirmed {
        /// The new owner.
        participant: PlayerHandle,
    },
    /// The cleanup resolved: System owns the instance.
    CleanupConfirmed,
}

impl TrackerOutcome {
    /// Returns `true` if the event moved the pending transfer forward.
    #[must_use]
    pub const fn advances_handshake(&self) -> bool {
        matches!(
            self,
            Self::BounceRequested { .. }
                | Self::BounceCompleted { .. }
                | Self::ClaimConfirmed { .. }
                | Self::CleanupConfirmed
        )
    }
}

/// Handshake bookkeeping for a single resource instance.
#[derive(Debug, Default)]
pub struct HandshakeTracker {
    state: HandshakeState,
    signals: Option<UnboundedSender<HandshakeSignal>>,
    registrations: u32,
}

impl HandshakeTracker {
    /// Creates an idle tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The current handshake state.
    #[must_use]
    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// Registrations accepted since the current transfer began.
    #[must_use]
    pub fn registrations_observed(&self) -> u32 {
        self.registrations
    }

    /// Returns `true` if `generation` is the transfer currently in flight.
    #[must_use]
    pub fn is_current(&self, generation: Generation) -> bool {
        self.state.generation() == Some(generation)
    }

    /// Starts waiting for `participant` to acknowledge the transfer tagged `generation`.
    ///
    /// Supersedes anything in flight: its waiter sees the channel close.
    pub fn begin_claim(
        &mut self,
        generation: Generation,
        participant: PlayerHandle,
    ) -> UnboundedReceiver<HandshakeSignal> {
        self.begin(HandshakeState::ClaimPending {
            generation,
            participant,
        })
    }

    /// Starts waiting for the instance to re-register under System.
    ///
    /// Supersedes anything in flight: its waiter sees the channel close.
    pub fn begin_cleanup(&mut self, generation: Generation) -> UnboundedReceiver<HandshakeSignal> {
        self.begin(HandshakeState::CleanupPending { generation })
    }

    fn begin(&mut self, state: HandshakeState) -> UnboundedReceiver<HandshakeSignal> {
        let (tx, rx) = unbounded_channel();
        self.state = state;
        self.signals = Some(tx);
        self.registrations = 0;
        rx
    }

    /// Gives up on the transfer tagged `generation` after its deadline passed.
    ///
    /// Returns `false` if that transfer was already resolved or superseded.
    pub fn abandon(&mut self, generation: Generation) -> bool {
        if !self.is_current(generation) {
            return false;
        }
        self.state = HandshakeState::Idle;
        self.signals = None;
        true
    }

    /// Interprets one registration event.
    pub fn on_registration(&mut self, observation: &Observation) -> TrackerOutcome {
        if let Some(generation) = observation.generation {
            if !self.is_current(generation) {
                return TrackerOutcome::Stale;
            }
        }

        let outcome = self.transition(observation);
        if outcome.advances_handshake() {
            self.registrations = self.registrations.saturating_add(1);
        }
        outcome
    }

    fn transition(&mut self, observation: &Observation) -> TrackerOutcome {
        match self.state {
            HandshakeState::Idle => TrackerOutcome::Unexpected,
            HandshakeState::ClaimPending {
                generation,
                participant,
            } => {
                if observation.owner != Owner::Player(participant) {
                    return TrackerOutcome::Mismatched;
                }
                if observation.requires_bounce_back {
                    self.state = HandshakeState::AwaitingBounceBack {
                        generation,
                        destination: participant,
                    };
                    self.signal(HandshakeSignal::BounceBack {
                        destination: participant,
                    });
                    TrackerOutcome::BounceRequested {
                        destination: participant,
                    }
                } else {
                    self.finish();
                    TrackerOutcome::ClaimConfirmed { participant }
                }
            },
            HandshakeState::AwaitingBounceBack {
                generation,
                destination,
            } => {
                // A repeated bounce acknowledgement must not start a second bounce
                if !observation.owner.is_system() {
                    return TrackerOutcome::Mismatched;
                }
                self.state = HandshakeState::BouncingForward {
                    generation,
                    destination,
                };
                self.signal(HandshakeSignal::BounceForward { destination });
                TrackerOutcome::BounceCompleted { destination }
            },
            HandshakeState::BouncingForward { destination, .. } => {
                if observation.owner != Owner::Player(destination) {
                    return TrackerOutcome::Mismatched;
                }
                self.finish();
                TrackerOutcome::ClaimConfirmed {
                    participant: destination,
                }
            },
            HandshakeState::CleanupPending { .. } => {
                if !observation.owner.is_system() {
                    return TrackerOutcome::Mismatched;
                }
                self.finish();
                TrackerOutcome::CleanupConfirmed
            },
        }
    }

    fn signal(&self, signal: HandshakeSignal) {
        if let Some(tx) = &self.signals {
            // The waiter may have timed out already; it abandons the transfer right after.
            let _ = tx.send(signal);
        }
    }

    fn finish(&mut self) {
        self.signal(HandshakeSignal::Confirmed);
        self.state = HandshakeState::Idle;
        self.signals = None;
    }
}
