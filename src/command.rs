//! Commands sent to the session worker

use std::sync::mpsc::{self, Receiver, SyncSender};

use crate::{BridgeError, ContractSpec, Direction, Instrument, OrderRequest};

/// Result delivered back to the caller that issued a command
pub type CommandResult<T> = Result<T, BridgeError>;

/// One-shot reply path owned by a single command.
///
/// The receiving half belongs to exactly one caller, so a reply can never be
/// read by anyone else. If that caller has already given up, the reply is
/// dropped.
pub struct ReplyTo<T>(SyncSender<CommandResult<T>>);

impl<T> ReplyTo<T> {
    /// Create a reply path and its receiving half
    pub fn channel() -> (Self, Receiver<CommandResult<T>>) {
        let (tx, rx) = mpsc::sync_channel(1);
        (Self(tx), rx)
    }

    /// Deliver the result. Returns false if the caller stopped waiting
    pub fn send(self, result: CommandResult<T>) -> bool {
        self.0.send(result).is_ok()
    }
}

impl<T> std::fmt::Debug for ReplyTo<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ReplyTo")
    }
}

/// Work item for the session worker
#[derive(Debug)]
pub enum Command {
    /// Qualify the first candidate the venue accepts
    ResolveInstrument {
        symbol: Box<str>,
        /// Ordered candidates, tried front to back
        candidates: Vec<ContractSpec>,
        reply_to: ReplyTo<Instrument>,
    },

    /// Qualify a probe contract to check market data permissions
    TestPermissions {
        probe: ContractSpec,
        reply_to: ReplyTo<String>,
    },

    /// Does a position of at least `minimum` exist in `direction`
    CheckPosition {
        direction: Direction,
        instrument: Instrument,
        minimum: f64,
        reply_to: ReplyTo<bool>,
    },

    /// Place an order and report its settled status
    SubmitOrder {
        request: OrderRequest,
        reply_to: ReplyTo<String>,
    },

    /// Leave the serve loop. No reply
    Stop,
}

impl Command {
    /// Command name for logs
    pub fn name(&self) -> &'static str {
        match self {
            Self::ResolveInstrument { .. } => "resolve_instrument",
            Self::TestPermissions { .. } => "test_permissions",
            Self::CheckPosition { .. } => "check_position",
            Self::SubmitOrder { .. } => "submit_order",
            Self::Stop => "stop",
        }
    }
}
