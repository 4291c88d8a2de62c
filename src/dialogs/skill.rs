//! Skill delegation dialog
//!
//! Hands the conversation to a remote agent. While the frame is active every
//! inbound activity is forwarded to the skill; the frame ends when the skill's
//! own end-of-conversation comes back correlated to it.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::aggregate::DialogInstance;
use crate::context::{DialogContext, TurnContext};
use crate::dialogs::{Dialog, DialogIdentity};
use crate::error::{DialogError, Result};
use crate::skills::{SkillClient, SkillLinkage, SkillLinkageStore};
use crate::value_objects::{
    Activity, DialogReason, DialogTurnResult, EndOfConversationCode, REPROMPT_REQUEST_EVENT,
};

/// Frame state key holding the delegated conversation's correlation token
pub const CORRELATION_TOKEN_STATE: &str = "correlationToken";

/// Activity property carrying the OAuth connection name for token exchange
pub const SSO_CONNECTION_NAME_PROPERTY: &str = "ssoConnectionName";

/// Options accepted by [`SkillDialog`] on begin
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SkillDialogOptions {
    /// Activity to send instead of the inbound one
    #[serde(default)]
    pub activity: Option<Activity>,
}

/// Dialog that delegates to a remote agent
pub struct SkillDialog {
    identity: DialogIdentity,
    skill: String,
    client: Arc<dyn SkillClient>,
    linkage: Arc<dyn SkillLinkageStore>,
    connection_name: Option<String>,
}

impl SkillDialog {
    pub fn new(
        id: impl Into<String>,
        skill: impl Into<String>,
        client: Arc<dyn SkillClient>,
        linkage: Arc<dyn SkillLinkageStore>,
    ) -> Self {
        Self {
            identity: DialogIdentity::new(id),
            skill: skill.into(),
            client,
            linkage,
            connection_name: None,
        }
    }

    /// Forward this OAuth connection name so the skill can exchange tokens
    pub fn with_connection_name(mut self, connection_name: impl Into<String>) -> Self {
        self.connection_name = Some(connection_name.into());
        self
    }

    /// Name of the remote agent
    pub fn skill(&self) -> &str {
        &self.skill
    }

    fn correlation_token(instance: &DialogInstance) -> Option<String> {
        instance
            .state
            .get(CORRELATION_TOKEN_STATE)
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    /// Deliver an activity to the skill, racing the turn's cancellation signal
    async fn send_to_skill(&self, turn: &TurnContext, activity: &Activity) -> Result<String> {
        tokio::select! {
            biased;
            _ = turn.cancellation().cancelled() => Err(DialogError::Cancelled),
            sent = self.client.send_activity(&self.skill, activity) => sent,
        }
    }

    /// Terminal result for a delegation the transport could not reach
    fn transport_failed(&self, err: &DialogError) -> DialogTurnResult {
        DialogTurnResult::cancelled(Some(json!({
            "skill": self.skill,
            "error": err.to_string(),
        })))
    }

    async fn request_reprompt(&self, turn: &TurnContext) -> Result<()> {
        let activity = Activity::event(turn.conversation_id(), REPROMPT_REQUEST_EVENT);
        self.send_to_skill(turn, &activity).await?;
        Ok(())
    }

    async fn forward(
        &self,
        dc: &mut DialogContext<'_>,
        mut activity: Activity,
    ) -> Result<DialogTurnResult> {
        if let Some(connection_name) = &self.connection_name {
            activity.properties.insert(
                SSO_CONNECTION_NAME_PROPERTY.to_string(),
                Value::String(connection_name.clone()),
            );
        }

        let turn = dc.turn();
        let token = match self.send_to_skill(turn, &activity).await {
            Ok(token) => token,
            Err(DialogError::Cancelled) => return Err(DialogError::Cancelled),
            Err(err) => {
                warn!(skill = %self.skill, error = %err, "Skill forward failed, ending delegation");
                return Ok(self.transport_failed(&err));
            }
        };

        let frame = dc.active_dialog_mut().ok_or_else(|| {
            DialogError::InvalidState(format!("skill dialog '{}' has no frame", self.id()))
        })?;
        let previous = Self::correlation_token(frame);
        frame
            .state
            .insert(CORRELATION_TOKEN_STATE.to_string(), Value::String(token.clone()));

        if let Some(previous) = previous.filter(|previous| *previous != token) {
            turn.release_linkage(self.linkage.clone(), previous);
        }
        self.linkage
            .save(SkillLinkage {
                correlation_token: token.clone(),
                conversation_id: turn.conversation_id().to_string(),
                dialog_id: self.id(),
                skill: self.skill.clone(),
            })
            .await?;

        debug!(skill = %self.skill, correlation_token = %token, "Forwarded activity to skill");
        Ok(DialogTurnResult::waiting())
    }
}

#[async_trait]
impl Dialog for SkillDialog {
    fn identity(&self) -> &DialogIdentity {
        &self.identity
    }

    async fn begin_dialog(
        &self,
        dc: &mut DialogContext<'_>,
        options: Option<Value>,
    ) -> Result<DialogTurnResult> {
        let options: SkillDialogOptions = match options {
            Some(options) => serde_json::from_value(options)?,
            None => SkillDialogOptions::default(),
        };
        let activity = options
            .activity
            .unwrap_or_else(|| dc.turn().activity().clone());

        info!(skill = %self.skill, dialog_id = %self.id(), "Delegating to skill");
        self.forward(dc, activity).await
    }

    async fn continue_dialog(&self, dc: &mut DialogContext<'_>) -> Result<DialogTurnResult> {
        let activity = dc.turn().activity().clone();

        if activity.is_end_of_conversation() {
            if let Some(relates_to) = activity.relates_to.as_deref() {
                let own = dc.active_dialog().and_then(Self::correlation_token);
                if own.as_deref() != Some(relates_to) {
                    debug!(skill = %self.skill, relates_to, "Ignoring end of conversation for another delegation");
                    return Ok(DialogTurnResult::waiting());
                }

                // Ended by the skill itself, nothing to notify on end
                if let Some(frame) = dc.active_dialog_mut() {
                    frame.state.remove(CORRELATION_TOKEN_STATE);
                }
                dc.turn().release_linkage(self.linkage.clone(), relates_to);
                info!(skill = %self.skill, code = ?activity.code, "Skill finished");
                return Ok(match activity.code {
                    None | Some(EndOfConversationCode::CompletedSuccessfully) => {
                        DialogTurnResult::complete(activity.value)
                    }
                    Some(_) => DialogTurnResult::cancelled(activity.value),
                });
            }
        }

        self.forward(dc, activity).await
    }

    async fn resume_dialog(
        &self,
        dc: &mut DialogContext<'_>,
        _reason: DialogReason,
        _result: Option<Value>,
    ) -> Result<DialogTurnResult> {
        let turn = dc.turn();
        turn.ensure_active()?;
        match self.request_reprompt(turn).await {
            Ok(()) => Ok(DialogTurnResult::waiting()),
            Err(DialogError::Cancelled) => Err(DialogError::Cancelled),
            Err(err) => {
                warn!(skill = %self.skill, error = %err, "Skill unreachable on resume, ending delegation");
                Ok(self.transport_failed(&err))
            }
        }
    }

    async fn reprompt_dialog(&self, turn: &TurnContext, _instance: &mut DialogInstance) -> Result<()> {
        match self.request_reprompt(turn).await {
            Err(DialogError::Cancelled) => Err(DialogError::Cancelled),
            Err(err) => {
                warn!(skill = %self.skill, error = %err, "Could not ask skill to reprompt");
                Ok(())
            }
            Ok(()) => Ok(()),
        }
    }

    async fn end_dialog(
        &self,
        turn: &TurnContext,
        instance: &mut DialogInstance,
        reason: DialogReason,
    ) -> Result<()> {
        if reason != DialogReason::CancelCalled {
            return Ok(());
        }
        let Some(token) = Self::correlation_token(instance) else {
            return Ok(());
        };

        let activity = Activity::end_of_conversation(
            turn.conversation_id(),
            EndOfConversationCode::UserCancelled,
        )
        .with_locale(turn.activity().locale.clone());
        match self.send_to_skill(turn, &activity).await {
            Ok(_) => debug!(skill = %self.skill, "Notified skill of cancellation"),
            Err(DialogError::Cancelled) => return Err(DialogError::Cancelled),
            Err(err) => warn!(skill = %self.skill, error = %err, "Could not notify skill of cancellation"),
        }

        turn.release_linkage(self.linkage.clone(), token);
        Ok(())
    }
}

impl std::fmt::Debug for SkillDialog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SkillDialog")
            .field("id", &self.id())
            .field("skill", &self.skill)
            .field("connection_name", &self.connection_name)
            .finish()
    }
}
