//! Per-instance handshake state machine.
//!
//! # State Machine Diagram
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────────┐
//! │                   Ownership Handshake State Machine                      │
//! │                                                                          │
//! │          begin claim          ┌──────────────┐   ack (no bounce)         │
//! │   ┌──────┐ ─────────────────► │ ClaimPending │ ─────────────────┐        │
//! │   │ Idle │                    └──────┬───────┘                  │        │
//! │   └──────┘ ◄──────────┐              │ ack (requires bounce)    │        │
//! │      ▲  │             │              ▼                          │        │
//! │      │  │             │    ┌────────────────────┐               │        │
//! │      │  │             │    │ AwaitingBounceBack │               │        │
//! │      │  │             │    └─────────┬──────────┘               │        │
//! │      │  │             │              │ registration (System)    │        │
//! │      │  │             │              ▼                          │        │
//! │      │  │             │    ┌─────────────────┐  ack (player)    │        │
//! │      │  │             │    │ BouncingForward │ ─────────────────┤        │
//! │      │  │             │    └─────────────────┘                  │        │
//! │      │  │             └─────────────────────────────────────────┘        │
//! │      │  │ begin cleanup  ┌────────────────┐                              │
//! │      │  └──────────────► │ CleanupPending │                              │
//! │      └────────────────── └────────────────┘ registration (System)        │
//! └──────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Any non-idle state returns to `Idle` when its attempt is abandoned after a timeout.
//! Beginning a cleanup supersedes whatever the instance was doing.
//!
//! ## State Transitions
//!
//! | From               | To                 | Trigger                                   |
//! |--------------------|--------------------|-------------------------------------------|
//! | Idle               | ClaimPending       | claim attempt fires `System → player`     |
//! | ClaimPending       | Idle               | acknowledgement without bounce flag       |
//! | ClaimPending       | AwaitingBounceBack | acknowledgement with bounce flag          |
//! | AwaitingBounceBack | BouncingForward    | next registration (back under System)     |
//! | BouncingForward    | Idle               | acknowledgement from the destination      |
//! | any                | CleanupPending     | cleanup fires `→ System`                  |
//! | CleanupPending     | Idle               | registration under System                 |
//! | any                | Idle               | attempt abandoned after its timeout       |

use crate::{Generation, PlayerHandle};

/// What the handshake of one resource instance is currently waiting for.
///
/// Every non-idle state carries the [`Generation`] of the transfer it belongs to, so a
/// registration event tagged with an older generation can be told apart and dropped.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum HandshakeState {
    /// Nobody is waiting on this instance. A registration event arriving now is an anomaly.
    #[default]
    Idle,

    /// A claim attempt fired `System → participant` and waits for the acknowledgement.
    ClaimPending {
        /// Ticket of the attempt.
        generation: Generation,
        /// The player the instance is being handed to.
        participant: PlayerHandle,
    },

    /// The acknowledgement asked for a bounce; the instance is on its way back to System.
    ///
    /// While in this state a second bounce can never start: the next registration
    /// completes this one.
    AwaitingBounceBack {
        /// Ticket of the attempt.
        generation: Generation,
        /// The player the instance goes to once the bounce completes.
        destination: PlayerHandle,
    },

    /// The instance went back through System and is being handed to the destination again.
    BouncingForward {
        /// Ticket of the attempt.
        generation: Generation,
        /// The player the instance is being handed to.
        destination: PlayerHandle,
    },

    /// A cleanup fired `→ System` and waits for the instance to re-register under System.
    CleanupPending {
        /// Ticket of the cleanup.
        generation: Generation,
    },
}

impl HandshakeState {
    /// Returns `true` when nothing is in flight for the instance.
    #[must_use]
    pub const fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    /// Returns `true` while a bounce is in progress (either hop).
    #[must_use]
    pub const fn is_bouncing(&self) -> bool {
        matches!(
            self,
            Self::AwaitingBounceBack { .. } | Self::BouncingForward { .. }
        )
    }

    /// The generation of the transfer in flight, if any.
    #[must_use]
    pub const fn generation(&self) -> Option<Generation> {
        match self {
            Self::Idle => None,
            Self::ClaimPending { generation, .. }
            | Self::AwaitingBounceBack { generation, .. }
            | Self::BouncingForward { generation, .. }
            | Self::CleanupPending { generation } => Some(*generation),
        }
    }

    /// The player a claim in flight is handing the instance to, if any.
    #[must_use]
    pub const fn claimant(&self) -> Option<PlayerHandle> {
        match self {
            Self::ClaimPending { participant, .. } => Some(*participant),
            Self::AwaitingBounceBack { destination, .. }
            | Self::BouncingForward { destination, .. } => Some(*destination),
            Self::Idle | Self::CleanupPending { .. } => None,
        }
    }

    /// Returns a short label suitable for logging.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::ClaimPending { .. } => "claim_pending",
            Self::AwaitingBounceBack { .. } => "awaiting_bounce_back",
            Self::BouncingForward { .. } => "bouncing_forward",
            Self::CleanupPending { .. } => "cleanup_pending",
        }
    }
}

impl std::fmt::Display for HandshakeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
