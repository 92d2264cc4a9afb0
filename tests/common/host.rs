//! A scripted host.
//!
//! Real hosts apply a transfer and, once the instance has re-initialized, feed a registration
//! event back into the manager. [`serve`] does the same for every request arriving on the
//! channel, answering each one the way the test's policy says.

use fortress_pool::{
    PoolManager, RegistrationEvent, RegistrationOutcome, TransferRequest,
};
use tokio::time::sleep;
use web_time::Duration;

use super::{Requests, TestConfig};

/// How the scripted host answers one transfer request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(dead_code)]
pub enum Reply {
    /// Apply the transfer and register right away.
    Ack,
    /// Apply the transfer and register, asking for a bounce.
    AckWithBounce,
    /// Apply the transfer and register after a delay. Later requests wait behind it.
    AckAfter(Duration),
    /// Never answer.
    Ignore,
}

/// Acknowledges `request` and returns how the manager interpreted it.
pub fn ack(
    manager: &PoolManager<TestConfig>,
    request: &TransferRequest<TestConfig>,
    requires_bounce_back: bool,
) -> RegistrationOutcome {
    manager
        .handle_registration_event(RegistrationEvent::acknowledging(request, requires_bounce_back))
        .expect("acknowledgement of a known instance")
}

/// Answers every request according to `policy` until the channel closes. Every request is
/// appended to `log` before it is answered.
///
/// Run it next to the operation under test with `tokio::select!`; it never returns on its own
/// while the manager is alive.
#[allow(dead_code)]
pub async fn serve<F>(
    manager: &PoolManager<TestConfig>,
    requests: &mut Requests,
    log: &mut Vec<TransferRequest<TestConfig>>,
    mut policy: F,
) where
    F: FnMut(&TransferRequest<TestConfig>) -> Reply,
{
    while let Some(request) = requests.recv().await {
        let reply = policy(&request);
        log.push(request.clone());
        match reply {
            Reply::Ack => {
                ack(manager, &request, false);
            },
            Reply::AckWithBounce => {
                ack(manager, &request, true);
            },
            Reply::AckAfter(delay) => {
                sleep(delay).await;
                ack(manager, &request, false);
            },
            Reply::Ignore => {},
        }
    }
}
