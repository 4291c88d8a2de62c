//! Composite dialog
//!
//! A `ComponentDialog` runs a private set of dialogs on a nested stack kept in
//! its own frame. To its parent it looks like any other dialog; it completes
//! when its nested stack runs dry. Reprompts and cancellation reach the nested
//! stack through the controller, which opens it as a child context.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::context::DialogContext;
use crate::dialogs::{Dialog, DialogIdentity};
use crate::error::{DialogError, Result};
use crate::registry::DialogSet;
use crate::value_objects::{DialogReason, DialogTurnResult, DialogTurnStatus};

/// Dialog composed of other dialogs
#[derive(Debug)]
pub struct ComponentDialog {
    identity: DialogIdentity,
    initial_dialog_id: Option<String>,
    dialogs: Arc<DialogSet>,
}

impl ComponentDialog {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            identity: DialogIdentity::new(id),
            initial_dialog_id: None,
            dialogs: Arc::new(DialogSet::new()),
        }
    }

    /// Register an inner dialog; the first one added becomes the initial dialog
    /// unless [`with_initial_dialog`](Self::with_initial_dialog) says otherwise
    pub fn add_dialog(&mut self, dialog: Arc<dyn Dialog>) -> Result<String> {
        let id = Arc::make_mut(&mut self.dialogs).add(dialog)?;
        if self.initial_dialog_id.is_none() {
            self.initial_dialog_id = Some(id.clone());
        }
        Ok(id)
    }

    /// Builder form of [`add_dialog`](Self::add_dialog)
    pub fn with_dialog(mut self, dialog: Arc<dyn Dialog>) -> Result<Self> {
        self.add_dialog(dialog)?;
        Ok(self)
    }

    pub fn with_initial_dialog(mut self, dialog_id: impl Into<String>) -> Self {
        self.initial_dialog_id = Some(dialog_id.into());
        self
    }

    pub fn initial_dialog_id(&self) -> Option<&str> {
        self.initial_dialog_id.as_deref()
    }

    /// Map the nested stack's outcome onto this dialog's outcome
    fn end_component(result: DialogTurnResult) -> DialogTurnResult {
        match result.status {
            DialogTurnStatus::Waiting => DialogTurnResult::waiting(),
            _ => DialogTurnResult::complete(result.result),
        }
    }
}

#[async_trait]
impl Dialog for ComponentDialog {
    fn identity(&self) -> &DialogIdentity {
        &self.identity
    }

    fn version(&self) -> String {
        format!("{}{}", self.id(), self.dialogs.version())
    }

    fn inner_dialogs(&self) -> Option<Arc<DialogSet>> {
        Some(self.dialogs.clone())
    }

    async fn begin_dialog(
        &self,
        dc: &mut DialogContext<'_>,
        options: Option<Value>,
    ) -> Result<DialogTurnResult> {
        let initial = self.initial_dialog_id.clone().ok_or_else(|| {
            DialogError::InvalidState(format!("component '{}' has no dialogs", self.id()))
        })?;
        let mut inner = dc
            .child()
            .ok_or_else(|| DialogError::InvalidState(format!("component '{}' is not active", self.id())))?;

        debug!(component = %self.id(), initial = %initial, "Starting inner dialog");
        let result = inner.begin_dialog(&initial, options).await?;
        Ok(Self::end_component(result))
    }

    async fn continue_dialog(&self, dc: &mut DialogContext<'_>) -> Result<DialogTurnResult> {
        let mut inner = dc
            .child()
            .ok_or_else(|| DialogError::InvalidState(format!("component '{}' is not active", self.id())))?;

        let result = inner.continue_dialog().await?;
        Ok(Self::end_component(result))
    }

    async fn resume_dialog(
        &self,
        dc: &mut DialogContext<'_>,
        _reason: DialogReason,
        _result: Option<Value>,
    ) -> Result<DialogTurnResult> {
        dc.reprompt_dialog().await?;
        Ok(DialogTurnResult::waiting())
    }
}
