//! Conversation state persistence
//!
//! The engine never owns storage; hosts provide a [`DialogStateStore`].
//! Saves are checked against the version that was loaded so two turns racing
//! on one conversation cannot silently overwrite each other.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::aggregate::ConversationState;
use crate::error::{DialogError, Result};

/// Repository for per-conversation dialog state
#[async_trait]
pub trait DialogStateStore: Send + Sync {
    /// Load the state of a conversation, or a fresh one if none was saved
    async fn get_or_create(&self, conversation_id: &str) -> Result<ConversationState>;

    /// Persist `state`
    ///
    /// Fails with `StateConflict` when the stored version no longer matches
    /// `state.version`.
    async fn save(&self, conversation_id: &str, state: &ConversationState) -> Result<()>;
}

/// In-memory implementation of [`DialogStateStore`]
#[derive(Debug, Default, Clone)]
pub struct MemoryDialogStateStore {
    states: Arc<RwLock<HashMap<String, ConversationState>>>,
}

impl MemoryDialogStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored state of a conversation, without creating one
    pub async fn get(&self, conversation_id: &str) -> Option<ConversationState> {
        self.states.read().await.get(conversation_id).cloned()
    }

    /// Remove a conversation's state
    pub async fn delete(&self, conversation_id: &str) {
        self.states.write().await.remove(conversation_id);
    }
}

#[async_trait]
impl DialogStateStore for MemoryDialogStateStore {
    async fn get_or_create(&self, conversation_id: &str) -> Result<ConversationState> {
        let states = self.states.read().await;
        Ok(states.get(conversation_id).cloned().unwrap_or_default())
    }

    async fn save(&self, conversation_id: &str, state: &ConversationState) -> Result<()> {
        let mut states = self.states.write().await;
        let found = states.get(conversation_id).map(|stored| stored.version).unwrap_or(0);
        if found != state.version {
            return Err(DialogError::StateConflict {
                conversation_id: conversation_id.to_string(),
                expected: state.version,
                found,
            });
        }

        let mut stored = state.clone();
        stored.version = state.version + 1;
        debug!(conversation_id, version = stored.version, depth = stored.dialog_stack.len(), "Saved dialog state");
        states.insert(conversation_id.to_string(), stored);
        Ok(())
    }
}
