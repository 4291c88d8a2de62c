//! Dialog events
//!
//! Events are delivered to dialogs on the active path, innermost first. They
//! carry recovery (`error`), cancellation and version-change notifications
//! without unwinding the stack.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::DialogError;

/// Raised when a turn fails; the value describes the failure
pub const ERROR_EVENT: &str = "error";

/// Sent to each dialog popped by `cancel_all_dialogs(true)`
pub const CANCEL_DIALOG_EVENT: &str = "cancelDialog";

/// Raised when the registry fingerprint differs from the persisted one
pub const VERSION_CHANGED_EVENT: &str = "versionChanged";

/// A named event travelling through the dialog stack
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogEvent {
    /// Event name
    pub name: String,
    /// Event payload
    pub value: Option<Value>,
    /// Whether unhandled events continue to outer frames
    pub bubble: bool,
}

impl DialogEvent {
    pub fn new(name: impl Into<String>, value: Option<Value>, bubble: bool) -> Self {
        Self {
            name: name.into(),
            value,
            bubble,
        }
    }

    /// Bubbling error event describing a turn failure
    pub fn error(failure: &DialogError) -> Self {
        let payload = json!({
            "kind": failure.kind(),
            "message": failure.to_string(),
        });
        Self::new(ERROR_EVENT, Some(payload), true)
    }
}
