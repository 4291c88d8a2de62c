//! Shared fixtures for the integration tests
#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use cim_dialog_engine::{
    Activity, ActivitySender, ClaimsIdentity, Dialog, DialogContext, DialogError, DialogEvent,
    DialogIdentity, DialogInstance, DialogReason, DialogTurnResult, Result, SkillClient,
    TurnContext,
};
use parking_lot::Mutex;
use serde_json::Value;

/// Ordered record of lifecycle calls, e.g. `begin:main`, `end:child:CancelCalled`
#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    pub fn count(&self, entry: &str) -> usize {
        self.0.lock().iter().filter(|e| *e == entry).count()
    }

    pub fn clear(&self) {
        self.0.lock().clear();
    }
}

/// What a scripted dialog does when one of its lifecycle steps runs
#[derive(Clone, Debug)]
pub enum Step {
    Wait,
    Complete(Option<Value>),
    Cancel(Option<Value>),
    Fail(&'static str),
    /// Begin another dialog and return whatever the stack settles to
    Begin(&'static str),
    /// Complete with the result handed to resume
    PassThrough,
}

/// How a scripted dialog reacts to events
#[derive(Clone, Debug)]
pub enum OnEvent {
    Ignore,
    Consume,
    /// Consume by beginning another dialog at this level
    Restart(&'static str),
}

/// Dialog whose behavior is fixed up front and whose calls are logged
pub struct ScriptedDialog {
    identity: DialogIdentity,
    log: CallLog,
    on_begin: Step,
    on_continue: Step,
    on_resume: Step,
    on_event: OnEvent,
}

impl ScriptedDialog {
    pub fn new(id: &str, log: &CallLog) -> Self {
        Self {
            identity: DialogIdentity::new(id),
            log: log.clone(),
            on_begin: Step::Wait,
            on_continue: Step::Wait,
            on_resume: Step::PassThrough,
            on_event: OnEvent::Ignore,
        }
    }

    pub fn on_begin(mut self, step: Step) -> Self {
        self.on_begin = step;
        self
    }

    pub fn on_continue(mut self, step: Step) -> Self {
        self.on_continue = step;
        self
    }

    pub fn on_resume(mut self, step: Step) -> Self {
        self.on_resume = step;
        self
    }

    pub fn on_event(mut self, on_event: OnEvent) -> Self {
        self.on_event = on_event;
        self
    }

    pub fn build(self) -> Arc<dyn Dialog> {
        Arc::new(self)
    }

    async fn run(
        &self,
        step: &Step,
        dc: &mut DialogContext<'_>,
        resumed_with: Option<Value>,
    ) -> Result<DialogTurnResult> {
        match step {
            Step::Wait => Ok(DialogTurnResult::waiting()),
            Step::Complete(value) => Ok(DialogTurnResult::complete(value.clone())),
            Step::Cancel(value) => Ok(DialogTurnResult::cancelled(value.clone())),
            Step::Fail(message) => Err(DialogError::dialog(self.id(), anyhow::anyhow!(*message))),
            Step::Begin(child) => dc.begin_dialog(child, None).await,
            Step::PassThrough => Ok(DialogTurnResult::complete(resumed_with)),
        }
    }
}

#[async_trait]
impl Dialog for ScriptedDialog {
    fn identity(&self) -> &DialogIdentity {
        &self.identity
    }

    async fn begin_dialog(
        &self,
        dc: &mut DialogContext<'_>,
        _options: Option<Value>,
    ) -> Result<DialogTurnResult> {
        self.log.push(format!("begin:{}", self.id()));
        self.run(&self.on_begin, dc, None).await
    }

    async fn continue_dialog(&self, dc: &mut DialogContext<'_>) -> Result<DialogTurnResult> {
        self.log.push(format!("continue:{}", self.id()));
        self.run(&self.on_continue, dc, None).await
    }

    async fn resume_dialog(
        &self,
        dc: &mut DialogContext<'_>,
        reason: DialogReason,
        result: Option<Value>,
    ) -> Result<DialogTurnResult> {
        self.log.push(format!("resume:{}:{:?}", self.id(), reason));
        self.run(&self.on_resume, dc, result).await
    }

    async fn reprompt_dialog(&self, _turn: &TurnContext, _instance: &mut DialogInstance) -> Result<()> {
        self.log.push(format!("reprompt:{}", self.id()));
        Ok(())
    }

    async fn end_dialog(
        &self,
        _turn: &TurnContext,
        _instance: &mut DialogInstance,
        reason: DialogReason,
    ) -> Result<()> {
        self.log.push(format!("end:{}:{:?}", self.id(), reason));
        Ok(())
    }

    async fn on_dialog_event(&self, dc: &mut DialogContext<'_>, event: &DialogEvent) -> Result<bool> {
        self.log.push(format!("event:{}:{}", self.id(), event.name));
        match self.on_event {
            OnEvent::Ignore => Ok(false),
            OnEvent::Consume => Ok(true),
            OnEvent::Restart(next) => {
                dc.begin_dialog(next, None).await?;
                Ok(true)
            }
        }
    }
}

/// Sender that keeps every outbound activity
#[derive(Default)]
pub struct RecordingSender {
    sent: Mutex<Vec<Activity>>,
}

impl RecordingSender {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn sent(&self) -> Vec<Activity> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl ActivitySender for RecordingSender {
    async fn send_activity(&self, activity: Activity) -> Result<()> {
        self.sent.lock().push(activity);
        Ok(())
    }
}

/// Skill transport that records deliveries and hands out a fixed token
pub struct MockSkillClient {
    token: String,
    fail_with: Mutex<Option<String>>,
    sent: Mutex<Vec<(String, Activity)>>,
}

impl MockSkillClient {
    pub fn new(token: &str) -> Arc<Self> {
        Arc::new(Self {
            token: token.to_string(),
            fail_with: Mutex::new(None),
            sent: Mutex::new(Vec::new()),
        })
    }

    /// Make every following delivery fail with a transport error
    pub fn fail(&self, message: &str) {
        *self.fail_with.lock() = Some(message.to_string());
    }

    pub fn sent(&self) -> Vec<(String, Activity)> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl SkillClient for MockSkillClient {
    async fn send_activity(&self, skill: &str, activity: &Activity) -> Result<String> {
        if let Some(message) = self.fail_with.lock().clone() {
            return Err(DialogError::SkillTransport {
                skill: skill.to_string(),
                message,
            });
        }
        self.sent.lock().push((skill.to_string(), activity.clone()));
        Ok(self.token.clone())
    }
}

/// Claims of a parent agent calling this one
pub fn skill_claims() -> ClaimsIdentity {
    ClaimsIdentity::new()
        .with_claim("ver", "1.0")
        .with_claim("aud", "this-agent")
        .with_claim("appid", "parent-agent")
}

pub fn message_turn(sender: &Arc<RecordingSender>, text: &str) -> TurnContext {
    TurnContext::new(Activity::message("conv-1", text), sender.clone())
}
