//! Dialog units
//!
//! A dialog is one polymorphic building block of conversational logic. The
//! engine never inspects concrete types: it resolves units by id through a
//! [`DialogSet`](crate::registry::DialogSet) and drives them through the
//! lifecycle below. A dialog owns no persisted state itself; everything it
//! remembers between turns lives in the [`DialogInstance`] frame assigned to it.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;

use crate::aggregate::DialogInstance;
use crate::context::{DialogContext, TurnContext};
use crate::error::Result;
use crate::events::DialogEvent;
use crate::registry::DialogSet;
use crate::value_objects::{DialogReason, DialogTurnResult};

pub mod component;
pub mod skill;

pub use component::ComponentDialog;
pub use skill::{SkillDialog, SkillDialogOptions};

/// Id of a dialog
///
/// The registry may rename a dialog whose id collides with another one, so the
/// id is interior-mutable even though dialogs are shared behind `Arc`.
#[derive(Debug, Default)]
pub struct DialogIdentity(RwLock<String>);

impl DialogIdentity {
    pub fn new(id: impl Into<String>) -> Self {
        Self(RwLock::new(id.into()))
    }

    pub fn get(&self) -> String {
        self.0.read().clone()
    }

    pub fn set(&self, id: impl Into<String>) {
        *self.0.write() = id.into();
    }
}

/// The contract every dialog implements
///
/// Terminal results (`Complete`, `Cancelled`) returned from `begin_dialog`,
/// `continue_dialog` or `resume_dialog` make the controller pop the frame and
/// resume the parent; a dialog never pops itself.
#[async_trait]
pub trait Dialog: Send + Sync {
    /// Identity holder for this dialog
    fn identity(&self) -> &DialogIdentity;

    /// Current id
    fn id(&self) -> String {
        self.identity().get()
    }

    /// Version string contributing to the registry fingerprint
    fn version(&self) -> String {
        self.id()
    }

    /// Dialogs that must be registered alongside this one
    fn dependencies(&self) -> Vec<Arc<dyn Dialog>> {
        Vec::new()
    }

    /// Registry of a composite dialog whose frame carries a nested stack
    fn inner_dialogs(&self) -> Option<Arc<DialogSet>> {
        None
    }

    /// Called when the dialog is pushed onto the stack
    async fn begin_dialog(
        &self,
        dc: &mut DialogContext<'_>,
        options: Option<Value>,
    ) -> Result<DialogTurnResult>;

    /// Called when the dialog is active and a new turn arrives
    async fn continue_dialog(&self, _dc: &mut DialogContext<'_>) -> Result<DialogTurnResult> {
        Ok(DialogTurnResult::complete(None))
    }

    /// Called when a dialog this one started has ended
    async fn resume_dialog(
        &self,
        _dc: &mut DialogContext<'_>,
        _reason: DialogReason,
        result: Option<Value>,
    ) -> Result<DialogTurnResult> {
        Ok(DialogTurnResult::complete(result))
    }

    /// Ask the user again for whatever the dialog is waiting on
    async fn reprompt_dialog(
        &self,
        _turn: &TurnContext,
        _instance: &mut DialogInstance,
    ) -> Result<()> {
        Ok(())
    }

    /// Called as the frame leaves the stack
    async fn end_dialog(
        &self,
        _turn: &TurnContext,
        _instance: &mut DialogInstance,
        _reason: DialogReason,
    ) -> Result<()> {
        Ok(())
    }

    /// Handle an event; returning `true` consumes it
    async fn on_dialog_event(
        &self,
        _dc: &mut DialogContext<'_>,
        _event: &DialogEvent,
    ) -> Result<bool> {
        Ok(false)
    }
}
