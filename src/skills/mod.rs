//! Skill plumbing
//!
//! A skill is a remote agent this one delegates a sub-conversation to. The
//! engine talks to it through a [`SkillClient`] and remembers each delegated
//! conversation as a [`SkillLinkage`] keyed by the correlation token the
//! transport returned, so the remote agent's answer can be routed back.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::{DialogError, Result};
use crate::value_objects::{Activity, EndOfConversationCode};

pub mod claims;

pub use claims::ClaimsIdentity;

/// Skill context markers of a conversation opened by a parent agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillConversationReference {
    /// The parent's conversation id
    pub conversation_id: String,
    /// OAuth scope the parent used; a channel scope means the parent is a channel
    pub oauth_scope: String,
}

impl SkillConversationReference {
    pub fn new(conversation_id: impl Into<String>, oauth_scope: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            oauth_scope: oauth_scope.into(),
        }
    }
}

/// Transport delivering activities to remote agents
#[async_trait]
pub trait SkillClient: Send + Sync {
    /// Deliver `activity` to `skill`; returns the correlation token of the
    /// delegated conversation
    async fn send_activity(&self, skill: &str, activity: &Activity) -> Result<String>;
}

/// Record tying a delegated conversation back to the frame that opened it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillLinkage {
    pub correlation_token: String,
    /// Local conversation the skill was called from
    pub conversation_id: String,
    /// Id of the delegating dialog
    pub dialog_id: String,
    pub skill: String,
}

/// Persistence for skill linkages
#[async_trait]
pub trait SkillLinkageStore: Send + Sync {
    async fn save(&self, linkage: SkillLinkage) -> Result<()>;

    async fn get(&self, correlation_token: &str) -> Result<Option<SkillLinkage>>;

    async fn delete(&self, correlation_token: &str) -> Result<()>;
}

/// In-memory linkage store
#[derive(Debug, Default, Clone)]
pub struct MemorySkillLinkageStore {
    linkages: Arc<RwLock<HashMap<String, SkillLinkage>>>,
}

impl MemorySkillLinkageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of open delegations
    pub async fn len(&self) -> usize {
        self.linkages.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.linkages.read().await.is_empty()
    }
}

#[async_trait]
impl SkillLinkageStore for MemorySkillLinkageStore {
    async fn save(&self, linkage: SkillLinkage) -> Result<()> {
        let mut linkages = self.linkages.write().await;
        linkages.insert(linkage.correlation_token.clone(), linkage);
        Ok(())
    }

    async fn get(&self, correlation_token: &str) -> Result<Option<SkillLinkage>> {
        let linkages = self.linkages.read().await;
        Ok(linkages.get(correlation_token).cloned())
    }

    async fn delete(&self, correlation_token: &str) -> Result<()> {
        let mut linkages = self.linkages.write().await;
        linkages.remove(correlation_token);
        Ok(())
    }
}

/// Host-side entry point for activities a remote agent sends back on its own
pub struct SkillCallbackHandler {
    linkage: Arc<dyn SkillLinkageStore>,
}

impl SkillCallbackHandler {
    pub fn new(linkage: Arc<dyn SkillLinkageStore>) -> Self {
        Self { linkage }
    }

    /// Translate a remote end-of-conversation into the local activity that
    /// ends the delegating frame
    ///
    /// The returned activity is addressed to the conversation the skill was
    /// called from and should be run through the turn handler as an inbound
    /// activity.
    pub async fn on_remote_end_of_conversation(
        &self,
        correlation_token: &str,
        remote: Activity,
    ) -> Result<Activity> {
        let linkage = self
            .linkage
            .get(correlation_token)
            .await?
            .ok_or_else(|| DialogError::UnknownSkillConversation(correlation_token.to_string()))?;

        let code = remote.code.unwrap_or(EndOfConversationCode::CompletedSuccessfully);
        info!(
            skill = %linkage.skill,
            conversation_id = %linkage.conversation_id,
            dialog_id = %linkage.dialog_id,
            ?code,
            "Skill ended its conversation"
        );

        let mut local = Activity::end_of_conversation(&linkage.conversation_id, code)
            .with_value(remote.value)
            .with_locale(remote.locale)
            .relating_to(correlation_token);
        local.properties = remote.properties;
        debug!(activity_id = %local.id, "Routed skill callback");
        Ok(local)
    }
}
