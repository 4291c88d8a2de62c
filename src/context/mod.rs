//! Turn and dialog contexts
//!
//! A [`TurnContext`] is what the channel collaborator hands the engine for one
//! inbound activity. A [`DialogContext`] binds that turn to a dialog stack and
//! a registry and is the only thing that mutates the stack.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{DialogError, Result};
use crate::skills::{ClaimsIdentity, SkillConversationReference, SkillLinkageStore};
use crate::value_objects::Activity;

pub mod dialog_context;

pub use dialog_context::DialogContext;

/// Outbound half of the channel collaborator
#[async_trait]
pub trait ActivitySender: Send + Sync {
    /// Deliver an activity to the conversation the turn belongs to
    async fn send_activity(&self, activity: Activity) -> Result<()>;
}

/// Skill linkage to delete once the turn is committed
struct LinkageRelease {
    store: Arc<dyn SkillLinkageStore>,
    correlation_token: String,
}

/// Everything the engine may know about the inbound turn
pub struct TurnContext {
    activity: Activity,
    identity: Option<ClaimsIdentity>,
    skill_reference: Option<SkillConversationReference>,
    sender: Arc<dyn ActivitySender>,
    cancellation: CancellationToken,
    releases: Mutex<Vec<LinkageRelease>>,
}

impl TurnContext {
    /// Create a turn for `activity` replying through `sender`
    pub fn new(activity: Activity, sender: Arc<dyn ActivitySender>) -> Self {
        Self {
            activity,
            identity: None,
            skill_reference: None,
            sender,
            cancellation: CancellationToken::new(),
            releases: Mutex::new(Vec::new()),
        }
    }

    /// Attach the caller's claims
    pub fn with_identity(mut self, identity: ClaimsIdentity) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Attach the skill context markers of this conversation
    pub fn with_skill_reference(mut self, reference: SkillConversationReference) -> Self {
        self.skill_reference = Some(reference);
        self
    }

    /// Use an externally owned cancellation signal
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// The inbound activity
    pub fn activity(&self) -> &Activity {
        &self.activity
    }

    pub fn conversation_id(&self) -> &str {
        &self.activity.conversation_id
    }

    /// Caller's claims, when the channel authenticated it
    pub fn identity(&self) -> Option<&ClaimsIdentity> {
        self.identity.as_ref()
    }

    /// Skill context markers, present when this conversation was opened by a parent agent
    pub fn skill_reference(&self) -> Option<&SkillConversationReference> {
        self.skill_reference.as_ref()
    }

    /// Whether the caller is itself a delegating agent
    pub fn is_skill_call(&self) -> bool {
        self.identity
            .as_ref()
            .map(ClaimsIdentity::is_skill_claim)
            .unwrap_or(false)
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Fail with `Cancelled` once the turn's cancellation signal has fired
    pub fn ensure_active(&self) -> Result<()> {
        if self.cancellation.is_cancelled() {
            return Err(DialogError::Cancelled);
        }
        Ok(())
    }

    /// Send an activity to the conversation
    pub async fn send_activity(&self, activity: Activity) -> Result<()> {
        self.ensure_active()?;
        debug!(
            conversation_id = %activity.conversation_id,
            activity_type = ?activity.activity_type,
            "Sending activity"
        );
        self.sender.send_activity(activity).await
    }

    /// Queue a skill linkage for deletion when the turn commits
    ///
    /// The record stays until the stack that dropped the token is kept; a
    /// rolled back cycle discards its releases.
    pub fn release_linkage(
        &self,
        store: Arc<dyn SkillLinkageStore>,
        correlation_token: impl Into<String>,
    ) {
        self.releases.lock().push(LinkageRelease {
            store,
            correlation_token: correlation_token.into(),
        });
    }

    /// Number of linkage releases queued so far
    pub fn pending_releases(&self) -> usize {
        self.releases.lock().len()
    }

    /// Forget releases queued after `mark`
    pub fn discard_releases_from(&self, mark: usize) {
        self.releases.lock().truncate(mark);
    }

    /// Apply the queued linkage releases
    pub async fn commit(&self) -> Result<()> {
        let releases = std::mem::take(&mut *self.releases.lock());
        for release in releases {
            debug!(correlation_token = %release.correlation_token, "Releasing skill linkage");
            release.store.delete(&release.correlation_token).await?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for TurnContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TurnContext")
            .field("activity", &self.activity)
            .field("identity", &self.identity)
            .field("skill_reference", &self.skill_reference)
            .field("cancelled", &self.cancellation.is_cancelled())
            .field("pending_releases", &self.pending_releases())
            .finish()
    }
}
