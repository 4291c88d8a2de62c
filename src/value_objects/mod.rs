//! Value objects for the dialog engine

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub mod activity;

pub use activity::{Activity, ActivityType, EndOfConversationCode};

/// Event name a parent agent uses to ask a skill to reprompt
pub const REPROMPT_REQUEST_EVENT: &str = "reprompt-request";

/// Outcome status of a dialog operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DialogTurnStatus {
    /// The stack had no active dialog
    Empty,
    /// The active dialog is waiting for the next turn
    Waiting,
    /// The dialog finished normally
    Complete,
    /// The dialog was cancelled
    Cancelled,
}

impl DialogTurnStatus {
    /// Complete and Cancelled end the frame that produced them
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Cancelled)
    }
}

/// Result of a begin, continue, resume or cancel operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogTurnResult {
    /// Status of the stack after the operation
    pub status: DialogTurnStatus,
    /// Value produced by a finished dialog
    pub result: Option<Value>,
}

impl DialogTurnResult {
    pub fn new(status: DialogTurnStatus, result: Option<Value>) -> Self {
        Self { status, result }
    }

    pub fn empty() -> Self {
        Self::new(DialogTurnStatus::Empty, None)
    }

    pub fn waiting() -> Self {
        Self::new(DialogTurnStatus::Waiting, None)
    }

    pub fn complete(result: Option<Value>) -> Self {
        Self::new(DialogTurnStatus::Complete, result)
    }

    pub fn cancelled(result: Option<Value>) -> Self {
        Self::new(DialogTurnStatus::Cancelled, result)
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Why a dialog is being ended or resumed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DialogReason {
    /// The dialog finished on its own
    EndCalled,
    /// The dialog was replaced by another at the same depth
    ReplaceCalled,
    /// The dialog was cancelled
    CancelCalled,
}

impl DialogReason {
    /// Reason that accompanies a terminal status through the pop/resume cascade
    pub fn for_status(status: DialogTurnStatus) -> Self {
        match status {
            DialogTurnStatus::Cancelled => Self::CancelCalled,
            _ => Self::EndCalled,
        }
    }
}
