//! Dialog engine error types.

use thiserror::Error;

/// Result alias used throughout the engine.
pub type Result<T, E = DialogError> = std::result::Result<T, E>;

/// Errors that can occur while orchestrating dialogs.
#[derive(Error, Debug)]
pub enum DialogError {
    /// A begin or lookup referenced an id absent from the registry
    #[error("dialog not registered: {0}")]
    UnregisteredDialog(String),

    /// Caller supplied an unusable argument
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// An operation was attempted in a state that does not permit it
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// The turn's cancellation signal fired
    #[error("turn cancelled")]
    Cancelled,

    /// A dialog's own logic failed
    #[error("dialog '{dialog_id}' failed: {source}")]
    Dialog {
        dialog_id: String,
        #[source]
        source: anyhow::Error,
    },

    /// The skill transport could not deliver an activity
    #[error("skill '{skill}' transport error: {message}")]
    SkillTransport { skill: String, message: String },

    /// A skill callback referenced a correlation token nobody owns
    #[error("unknown skill conversation: {0}")]
    UnknownSkillConversation(String),

    /// Optimistic concurrency check failed while saving state
    #[error(
        "state conflict for conversation {conversation_id}: expected version {expected}, found {found}"
    )]
    StateConflict {
        conversation_id: String,
        expected: u64,
        found: u64,
    },

    /// State or options could not be (de)serialized
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The error event handler itself failed while recovering from `original`
    #[error("error handling failed: {secondary} (while recovering from: {original})")]
    Recovery {
        original: Box<DialogError>,
        secondary: Box<DialogError>,
    },
}

impl DialogError {
    /// Wrap a failure raised by a dialog's own logic.
    pub fn dialog(dialog_id: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Self::Dialog {
            dialog_id: dialog_id.into(),
            source: source.into(),
        }
    }

    /// Stable label for the error kind, used in error event payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnregisteredDialog(_) => "unregistered_dialog",
            Self::InvalidArgument(_) => "invalid_argument",
            Self::InvalidState(_) => "invalid_state",
            Self::Cancelled => "cancelled",
            Self::Dialog { .. } => "dialog",
            Self::SkillTransport { .. } => "skill_transport",
            Self::UnknownSkillConversation(_) => "unknown_skill_conversation",
            Self::StateConflict { .. } => "state_conflict",
            Self::Serialization(_) => "serialization",
            Self::Recovery { .. } => "recovery",
        }
    }

    /// Whether this error is the turn's cancellation signal.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
