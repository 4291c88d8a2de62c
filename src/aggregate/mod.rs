//! Persisted dialog stack
//!
//! `ConversationState` is the aggregate saved per conversation. It owns the
//! root `DialogState`; composite dialogs embed their own nested `DialogState`
//! inside their frame, so the whole tree persists as one document.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One frame on the dialog stack
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DialogInstance {
    /// Id of the dialog executing this frame
    pub id: String,

    /// State privately owned by that dialog
    #[serde(default)]
    pub state: Map<String, Value>,

    /// Nested stack of a composite dialog
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inner: Option<DialogState>,
}

impl DialogInstance {
    /// Create a frame with empty state
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            state: Map::new(),
            inner: None,
        }
    }

    /// Nested stack, created on first access
    pub fn inner_mut(&mut self) -> &mut DialogState {
        self.inner.get_or_insert_with(DialogState::default)
    }
}

/// An ordered call stack of dialog frames; the last frame is the active one
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DialogState {
    #[serde(default)]
    pub dialog_stack: Vec<DialogInstance>,
}

impl DialogState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of frames
    pub fn len(&self) -> usize {
        self.dialog_stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dialog_stack.is_empty()
    }

    /// The active (most recently pushed) frame
    pub fn active(&self) -> Option<&DialogInstance> {
        self.dialog_stack.last()
    }

    pub fn active_mut(&mut self) -> Option<&mut DialogInstance> {
        self.dialog_stack.last_mut()
    }

    pub fn push(&mut self, instance: DialogInstance) {
        self.dialog_stack.push(instance);
    }

    pub fn pop(&mut self) -> Option<DialogInstance> {
        self.dialog_stack.pop()
    }

    /// Frame at `index`, counted from the bottom
    pub fn get(&self, index: usize) -> Option<&DialogInstance> {
        self.dialog_stack.get(index)
    }

    /// Ids from the bottom frame to the active one
    pub fn ids(&self) -> Vec<&str> {
        self.dialog_stack.iter().map(|f| f.id.as_str()).collect()
    }

    /// Drop every frame
    pub fn clear(&mut self) {
        self.dialog_stack.clear();
    }
}

/// Dialog state persisted for one conversation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    /// Root dialog stack
    #[serde(default)]
    pub dialog_stack: DialogState,

    /// Registry fingerprint the stack was built against
    #[serde(default)]
    pub dialogs_version: Option<String>,

    /// When a turn last touched this conversation
    #[serde(default)]
    pub last_access: Option<DateTime<Utc>>,

    /// Version for optimistic concurrency
    #[serde(default)]
    pub version: u64,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the conversation has been idle longer than `expire_after`
    pub fn is_expired(&self, now: DateTime<Utc>, expire_after: chrono::Duration) -> bool {
        self.last_access
            .map(|last| now.signed_duration_since(last) > expire_after)
            .unwrap_or(false)
    }
}
