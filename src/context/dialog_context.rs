//! The dialog stack controller
//!
//! `DialogContext` pairs one mutable [`DialogState`] with the registry that
//! resolves its frames and the turn being processed. Composite dialogs keep a
//! nested stack inside their own frame; the controller for that nested stack
//! (the "child") is opened on demand from the active frame rather than stored,
//! so the chain can never point at a frame that has already been popped.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::aggregate::{DialogInstance, DialogState};
use crate::context::TurnContext;
use crate::dialogs::Dialog;
use crate::error::{DialogError, Result};
use crate::events::{CANCEL_DIALOG_EVENT, DialogEvent};
use crate::registry::DialogSet;
use crate::value_objects::{DialogReason, DialogTurnResult};

/// Controller over one dialog stack for the duration of a turn
pub struct DialogContext<'a> {
    dialogs: Arc<DialogSet>,
    /// Registries of the enclosing contexts, outermost first
    ancestors: Vec<Arc<DialogSet>>,
    turn: &'a TurnContext,
    stack: &'a mut DialogState,
}

impl<'a> DialogContext<'a> {
    /// Bind `stack` to `dialogs` for the given turn
    pub fn new(dialogs: Arc<DialogSet>, turn: &'a TurnContext, stack: &'a mut DialogState) -> Self {
        Self {
            dialogs,
            ancestors: Vec::new(),
            turn,
            stack,
        }
    }

    /// Registry resolving this stack's frames
    pub fn dialogs(&self) -> &Arc<DialogSet> {
        &self.dialogs
    }

    /// The turn being processed
    pub fn turn(&self) -> &'a TurnContext {
        self.turn
    }

    pub fn stack(&self) -> &DialogState {
        self.stack
    }

    /// Frame of the dialog currently in control
    pub fn active_dialog(&self) -> Option<&DialogInstance> {
        self.stack.active()
    }

    pub fn active_dialog_mut(&mut self) -> Option<&mut DialogInstance> {
        self.stack.active_mut()
    }

    /// Copy of the stack, used to roll back a failed cycle
    pub fn snapshot(&self) -> DialogState {
        self.stack.clone()
    }

    /// Replace the stack with a previously taken snapshot
    pub fn restore(&mut self, snapshot: DialogState) {
        *self.stack = snapshot;
    }

    /// Resolve a dialog in this registry, then in the enclosing ones
    pub fn find_dialog(&self, id: &str) -> Option<Arc<dyn Dialog>> {
        if let Ok(Some(dialog)) = self.dialogs.find(id) {
            return Some(dialog);
        }
        self.ancestors
            .iter()
            .rev()
            .find_map(|set| set.find(id).ok().flatten())
    }

    /// Short-lived controller over the same stack
    pub fn reborrow(&mut self) -> DialogContext<'_> {
        DialogContext {
            dialogs: self.dialogs.clone(),
            ancestors: self.ancestors.clone(),
            turn: self.turn,
            stack: &mut *self.stack,
        }
    }

    /// Open the controller for the nested stack of the active frame
    ///
    /// Only frames run by a composite dialog have a child; otherwise the
    /// context is handed back unchanged.
    pub fn into_child(self) -> std::result::Result<DialogContext<'a>, DialogContext<'a>> {
        let inner_dialogs = self
            .stack
            .active()
            .and_then(|frame| self.find_dialog(&frame.id))
            .and_then(|dialog| dialog.inner_dialogs());
        let Some(inner_dialogs) = inner_dialogs else {
            return Err(self);
        };

        let DialogContext {
            dialogs,
            mut ancestors,
            turn,
            stack,
        } = self;
        ancestors.push(dialogs);

        let top = stack.len() - 1;
        let frame = &mut stack.dialog_stack[top];
        Ok(DialogContext {
            dialogs: inner_dialogs,
            ancestors,
            turn,
            stack: frame.inner_mut(),
        })
    }

    /// Child controller of the active frame, if that frame is composite
    pub fn child(&mut self) -> Option<DialogContext<'_>> {
        self.reborrow().into_child().ok()
    }

    /// Whether the active frame is composite and its nested stack is non-empty
    pub fn has_active_child(&self) -> bool {
        let Some(frame) = self.stack.active() else {
            return false;
        };
        let nested = frame.inner.as_ref().is_some_and(|inner| !inner.is_empty());
        nested
            && self
                .find_dialog(&frame.id)
                .is_some_and(|dialog| dialog.inner_dialogs().is_some())
    }

    /// Innermost context that currently has a dialog in control
    pub fn active_leaf(&mut self) -> DialogContext<'_> {
        let mut dc = self.reborrow();
        loop {
            if !dc.has_active_child() {
                return dc;
            }
            match dc.into_child() {
                Ok(child) => dc = child,
                Err(leaf) => return leaf,
            }
        }
    }

    /// Push `dialog_id` and run its begin step
    pub async fn begin_dialog(
        &mut self,
        dialog_id: &str,
        options: Option<Value>,
    ) -> Result<DialogTurnResult> {
        self.turn.ensure_active()?;
        let dialog = self.resolve(dialog_id)?;

        self.stack.push(DialogInstance::new(dialog_id));
        let depth = self.stack.len();
        debug!(dialog_id, depth, "Beginning dialog");

        let result = dialog.begin_dialog(self, options).await?;
        self.settle(depth, result).await
    }

    /// Run the active dialog's continue step
    ///
    /// Returns `Empty` without touching anything when no dialog is active.
    pub async fn continue_dialog(&mut self) -> Result<DialogTurnResult> {
        self.turn.ensure_active()?;
        let Some(dialog_id) = self.stack.active().map(|frame| frame.id.clone()) else {
            return Ok(DialogTurnResult::empty());
        };
        let dialog = self.resolve(&dialog_id)?;

        let depth = self.stack.len();
        debug!(dialog_id = %dialog_id, depth, "Continuing dialog");

        let result = dialog.continue_dialog(self).await?;
        self.settle(depth, result).await
    }

    /// End the active dialog and begin another in its place
    pub async fn replace_dialog(
        &mut self,
        dialog_id: &str,
        options: Option<Value>,
    ) -> Result<DialogTurnResult> {
        self.turn.ensure_active()?;
        self.resolve(dialog_id)?;

        self.end_active(DialogReason::ReplaceCalled).await?;
        self.begin_dialog(dialog_id, options).await
    }

    /// Ask the active dialog to reprompt; the stack depth is unchanged
    ///
    /// A composite frame with a running nested stack is reprompted through
    /// its innermost active dialog.
    pub async fn reprompt_dialog(&mut self) -> Result<()> {
        self.turn.ensure_active()?;
        self.active_leaf().reprompt_active().await
    }

    async fn reprompt_active(&mut self) -> Result<()> {
        let Some(dialog_id) = self.stack.active().map(|frame| frame.id.clone()) else {
            return Ok(());
        };
        let dialog = self.resolve(&dialog_id)?;

        let turn = self.turn;
        if let Some(instance) = self.stack.active_mut() {
            dialog.reprompt_dialog(turn, instance).await?;
        }
        Ok(())
    }

    /// Pop every frame, top to bottom, ending each with `CancelCalled`
    ///
    /// With `send_cancellation_event` each dialog first receives a
    /// non-bubbling `cancelDialog` event. An empty stack yields `Empty` and
    /// calls nothing.
    pub async fn cancel_all_dialogs(
        &mut self,
        send_cancellation_event: bool,
    ) -> Result<DialogTurnResult> {
        self.turn.ensure_active()?;
        if self.stack.is_empty() {
            return Ok(DialogTurnResult::empty());
        }
        debug!(depth = self.stack.len(), "Cancelling all dialogs");

        while let Some(dialog_id) = self.stack.active().map(|frame| frame.id.clone()) {
            if send_cancellation_event {
                if let Some(dialog) = self.find_dialog(&dialog_id) {
                    let event = DialogEvent::new(CANCEL_DIALOG_EVENT, None, false);
                    dialog.on_dialog_event(self, &event).await?;
                }
            }
            self.end_active(DialogReason::CancelCalled).await?;
        }

        Ok(DialogTurnResult::cancelled(None))
    }

    /// Deliver a named event along the active path
    ///
    /// Delivery starts at the active frame of this context, or of the deepest
    /// active child when `from_leaf` is set. When `bubble` is set an unhandled
    /// event moves outward frame by frame until a dialog consumes it. Returns
    /// whether any dialog did.
    pub async fn emit_event(
        &mut self,
        name: &str,
        value: Option<Value>,
        bubble: bool,
        from_leaf: bool,
    ) -> Result<bool> {
        self.turn.ensure_active()?;
        let event = DialogEvent::new(name, value, bubble);
        self.dispatch_event(&event, from_leaf).await
    }

    /// Deliver an already built event; see [`emit_event`](Self::emit_event)
    pub async fn dispatch_event(&mut self, event: &DialogEvent, from_leaf: bool) -> Result<bool> {
        let route = self.event_route(from_leaf);

        for (level, index) in route {
            let Some(mut dc) = self.reborrow().descend(level) else {
                continue;
            };
            let Some(dialog) = dc.stack.get(index).and_then(|frame| dc.find_dialog(&frame.id)) else {
                continue;
            };

            debug!(event = %event.name, dialog_id = %dialog.id(), level, "Delivering dialog event");
            if dialog.on_dialog_event(&mut dc, event).await? {
                return Ok(true);
            }
            if !event.bubble {
                break;
            }
        }

        Ok(false)
    }

    /// Ordered (level, frame index) targets, innermost first
    fn event_route(&mut self, from_leaf: bool) -> Vec<(usize, usize)> {
        let mut depths = vec![self.stack.len()];
        if from_leaf {
            let mut dc = self.reborrow();
            while dc.has_active_child() {
                match dc.into_child() {
                    Ok(child) => {
                        depths.push(child.stack.len());
                        dc = child;
                    }
                    Err(_) => break,
                }
            }
        }

        let mut route = Vec::new();
        for (level, len) in depths.iter().enumerate().rev() {
            for index in (0..*len).rev() {
                route.push((level, index));
            }
        }
        route
    }

    fn descend(self, levels: usize) -> Option<DialogContext<'a>> {
        let mut dc = self;
        for _ in 0..levels {
            dc = dc.into_child().ok()?;
        }
        Some(dc)
    }

    fn resolve(&self, dialog_id: &str) -> Result<Arc<dyn Dialog>> {
        if dialog_id.trim().is_empty() {
            return Err(DialogError::InvalidArgument(
                "dialog id must not be blank".to_string(),
            ));
        }
        self.find_dialog(dialog_id)
            .ok_or_else(|| DialogError::UnregisteredDialog(dialog_id.to_string()))
    }

    /// Pop finished frames and resume their parents until something waits
    ///
    /// `depth` is the stack height at which `result` was produced. A frame is
    /// only popped while it is still at that height, so a dialog whose frame
    /// was already unwound by a nested cascade is not ended twice.
    async fn settle(&mut self, mut depth: usize, mut result: DialogTurnResult) -> Result<DialogTurnResult> {
        while result.is_terminal() && depth > 0 && self.stack.len() == depth {
            let reason = DialogReason::for_status(result.status);
            self.end_active(reason).await?;
            depth -= 1;

            let Some(parent_id) = self.stack.active().map(|frame| frame.id.clone()) else {
                break;
            };
            let parent = self.resolve(&parent_id)?;
            debug!(dialog_id = %parent_id, ?reason, depth, "Resuming parent dialog");
            result = parent.resume_dialog(self, reason, result.result).await?;
        }
        Ok(result)
    }

    async fn end_active(&mut self, reason: DialogReason) -> Result<()> {
        if reason == DialogReason::CancelCalled {
            self.unwind_nested().await?;
        }
        self.end_frame(reason).await
    }

    /// Cancel the nested stacks under the active frame, innermost frame first
    async fn unwind_nested(&mut self) -> Result<()> {
        while self.has_active_child() {
            let mut leaf = self.active_leaf();
            leaf.end_frame(DialogReason::CancelCalled).await?;
        }
        Ok(())
    }

    async fn end_frame(&mut self, reason: DialogReason) -> Result<()> {
        let Some(mut instance) = self.stack.pop() else {
            return Ok(());
        };
        debug!(dialog_id = %instance.id, ?reason, depth = self.stack.len(), "Ending dialog");

        match self.find_dialog(&instance.id) {
            Some(dialog) => dialog.end_dialog(self.turn, &mut instance, reason).await,
            None => {
                warn!(dialog_id = %instance.id, "Dropping frame of unregistered dialog");
                Ok(())
            }
        }
    }
}

impl std::fmt::Debug for DialogContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DialogContext")
            .field("stack", &self.stack.ids())
            .field("nesting", &self.ancestors.len())
            .finish()
    }
}
