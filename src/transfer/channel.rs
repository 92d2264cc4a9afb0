//! An [`OwnershipTransfer`] that forwards every request into a tokio channel.
//!
//! The receiving half belongs to whatever applies ownership changes on the host: a game loop
//! draining it once per frame, a task bridging to the engine, or a test script acknowledging
//! requests by hand.
//!
//! ```
//! use fortress_pool::{Config, ChannelTransfer, OwnershipTransfer, Owner, ResourceTypeId, TransferRequest, Generation};
//!
//! #[derive(Debug)]
//! struct GameConfig;
//! impl Config for GameConfig {
//!     type Resource = u32;
//! }
//!
//! let (transfer, mut requests) = ChannelTransfer::<GameConfig>::new();
//! transfer.transfer_ownership(TransferRequest {
//!     resource_type: ResourceTypeId::new("PlayerHUD"),
//!     slot: 0,
//!     resource: 7,
//!     expected_owner: Owner::System,
//!     new_owner: Owner::System,
//!     generation: Generation::new(1),
//! });
//! assert_eq!(requests.try_recv().unwrap().resource, 7);
//! ```

use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use crate::{
    report_violation,
    telemetry::{ViolationKind, ViolationSeverity},
    Config, OwnershipTransfer, TransferRequest,
};

/// Sends transfer requests to an unbounded channel.
pub struct ChannelTransfer<T>
where
    T: Config,
{
    requests: UnboundedSender<TransferRequest<T>>,
}

impl<T: Config> std::fmt::Debug for ChannelTransfer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelTransfer")
            .field("closed", &self.requests.is_closed())
            .finish()
    }
}

impl<T: Config> ChannelTransfer<T> {
    /// Creates the transfer and the receiver its requests arrive on.
    #[must_use]
    pub fn new() -> (Self, UnboundedReceiver<TransferRequest<T>>) {
        let (requests, receiver) = unbounded_channel();
        (Self { requests }, receiver)
    }
}

impl<T: Config> OwnershipTransfer<T> for ChannelTransfer<T> {
    fn transfer_ownership(&self, request: TransferRequest<T>) {
        if let Err(error) = self.requests.send(request) {
            let request = error.0;
            report_violation!(
                ViolationSeverity::Warning,
                ViolationKind::Transfer,
                "transfer of {}[{}] to {} dropped, nobody receives requests anymore",
                request.resource_type,
                request.slot,
                request.new_owner
            );
        }
    }
}
