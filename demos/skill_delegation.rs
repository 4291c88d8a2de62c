//! Skill delegation example
//!
//! This example demonstrates how to:
//! - Run a parent agent whose root dialog delegates to a skill
//! - Host the skill as a second agent with its own dialog stack
//! - Route the skill's end-of-conversation back to the parent
//! - Resume the parent dialog with the skill's result

use std::sync::Arc;

use async_trait::async_trait;
use cim_dialog_engine::{
    Activity, ActivitySender, ClaimsIdentity, Dialog, DialogContext, DialogIdentity,
    DialogManager, DialogReason, DialogTurnResult, MemoryDialogStateStore,
    MemorySkillLinkageStore, Result, SkillCallbackHandler, SkillClient,
    SkillConversationReference, SkillDialog, TurnContext,
};
use parking_lot::Mutex;
use serde_json::Value;

/// Parent root dialog: hands off to the travel skill, then confirms
struct TripPlanner {
    identity: DialogIdentity,
}

#[async_trait]
impl Dialog for TripPlanner {
    fn identity(&self) -> &DialogIdentity {
        &self.identity
    }

    async fn begin_dialog(
        &self,
        dc: &mut DialogContext<'_>,
        _options: Option<Value>,
    ) -> Result<DialogTurnResult> {
        dc.begin_dialog("travel", None).await
    }

    async fn resume_dialog(
        &self,
        dc: &mut DialogContext<'_>,
        reason: DialogReason,
        result: Option<Value>,
    ) -> Result<DialogTurnResult> {
        let turn = dc.turn();
        let text = match (reason, result.as_ref().and_then(Value::as_str)) {
            (DialogReason::EndCalled, Some(destination)) => format!("Booked a trip to {destination}."),
            _ => "No trip booked.".to_string(),
        };
        turn.send_activity(Activity::message(turn.conversation_id(), text)).await?;
        Ok(DialogTurnResult::complete(result))
    }
}

/// Skill root dialog: asks for a destination and returns it
struct CollectDestination {
    identity: DialogIdentity,
}

#[async_trait]
impl Dialog for CollectDestination {
    fn identity(&self) -> &DialogIdentity {
        &self.identity
    }

    async fn begin_dialog(
        &self,
        dc: &mut DialogContext<'_>,
        _options: Option<Value>,
    ) -> Result<DialogTurnResult> {
        let turn = dc.turn();
        turn.send_activity(Activity::message(turn.conversation_id(), "Where to?")).await?;
        Ok(DialogTurnResult::waiting())
    }

    async fn continue_dialog(&self, dc: &mut DialogContext<'_>) -> Result<DialogTurnResult> {
        let destination = dc.turn().activity().text.clone().unwrap_or_default();
        Ok(DialogTurnResult::complete(Some(Value::String(destination))))
    }
}

/// Collects everything an agent sends
struct Outbox {
    name: &'static str,
    activities: Mutex<Vec<Activity>>,
}

impl Outbox {
    fn new(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            activities: Mutex::new(Vec::new()),
        })
    }

    fn drain(&self) -> Vec<Activity> {
        std::mem::take(&mut *self.activities.lock())
    }
}

#[async_trait]
impl ActivitySender for Outbox {
    async fn send_activity(&self, activity: Activity) -> Result<()> {
        if let Some(text) = &activity.text {
            println!("   [{}] {}", self.name, text);
        }
        self.activities.lock().push(activity);
        Ok(())
    }
}

/// Skill transport that runs the skill agent in-process
struct InProcessSkill {
    agent: DialogManager,
    outbox: Arc<Outbox>,
}

#[async_trait]
impl SkillClient for InProcessSkill {
    async fn send_activity(&self, skill: &str, activity: &Activity) -> Result<String> {
        let caller = ClaimsIdentity::new()
            .with_claim("ver", "1.0")
            .with_claim("aud", skill)
            .with_claim("appid", "trip-planner");
        let turn = TurnContext::new(activity.clone(), self.outbox.clone())
            .with_identity(caller)
            .with_skill_reference(SkillConversationReference::new(
                activity.conversation_id.clone(),
                "api://trip-planner",
            ));

        self.agent.on_turn(&turn).await?;
        Ok(format!("{skill}:{}", activity.conversation_id))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    println!("=== Skill Delegation Example ===\n");

    // Skill agent
    let skill_outbox = Outbox::new("skill");
    let skill_agent = DialogManager::new(
        Arc::new(CollectDestination {
            identity: DialogIdentity::new("collect-destination"),
        }),
        Arc::new(MemoryDialogStateStore::new()),
    )?;
    let client = Arc::new(InProcessSkill {
        agent: skill_agent,
        outbox: skill_outbox.clone(),
    });

    // Parent agent
    let linkage = Arc::new(MemorySkillLinkageStore::new());
    let mut parent = DialogManager::new(
        Arc::new(TripPlanner {
            identity: DialogIdentity::new("trip-planner"),
        }),
        Arc::new(MemoryDialogStateStore::new()),
    )?;
    parent.add_dialog(Arc::new(SkillDialog::new(
        "travel",
        "travel-skill",
        client,
        linkage.clone(),
    )))?;
    let parent_outbox = Outbox::new("parent");
    let callback = SkillCallbackHandler::new(linkage.clone());

    println!("1. User starts planning...");
    let turn = TurnContext::new(Activity::message("conv-1", "I need a trip"), parent_outbox.clone());
    let result = parent.on_turn(&turn).await?;
    println!("   parent status: {:?}\n", result.status);

    println!("2. User answers the skill...");
    let turn = TurnContext::new(Activity::message("conv-1", "Oslo"), parent_outbox.clone());
    let result = parent.on_turn(&turn).await?;
    println!("   parent status: {:?}\n", result.status);

    println!("3. Routing the skill's end of conversation back...");
    for remote in skill_outbox.drain() {
        if !remote.is_end_of_conversation() {
            continue;
        }
        let token = format!("travel-skill:{}", remote.conversation_id);
        let local = callback.on_remote_end_of_conversation(&token, remote).await?;
        let turn = TurnContext::new(local, parent_outbox.clone());
        let result = parent.on_turn(&turn).await?;
        println!("   parent status: {:?} -> {:?}", result.status, result.result);
    }

    println!("\n   open delegations: {}", linkage.len().await);
    println!("   parent sent {} activities", parent_outbox.drain().len());

    Ok(())
}
