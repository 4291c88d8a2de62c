//! Turn handlers
//!
//! [`run_turn`] drives one inbound activity through a dialog stack.
//! [`DialogManager`] wraps it with state loading and saving for hosts that
//! want the whole load/run/save cycle handled for them.

use tracing::{info, instrument, warn};

use crate::config::EngineConfig;
use crate::context::DialogContext;
use crate::error::{DialogError, Result};
use crate::events::DialogEvent;
use crate::value_objects::{Activity, DialogTurnResult, DialogTurnStatus, EndOfConversationCode};

pub mod dialog_manager;

pub use dialog_manager::DialogManager;

/// Run a turn with the default configuration
pub async fn run_turn(root_dialog_id: &str, dc: &mut DialogContext<'_>) -> Result<DialogTurnResult> {
    run_turn_with(root_dialog_id, dc, &EngineConfig::default()).await
}

/// Run a turn: continue the active dialog or begin `root_dialog_id`
///
/// A failure rolls the stack back to where the cycle started and raises a
/// bubbling `error` event from the innermost active dialog. If a dialog
/// handles it by changing the stack, the turn ends with that outcome; a
/// handler that leaves the stack alone gets the turn run again. Unhandled
/// failures are returned. Skill linkages released by the turn are deleted
/// once it succeeds.
pub async fn run_turn_with(
    root_dialog_id: &str,
    dc: &mut DialogContext<'_>,
    config: &EngineConfig,
) -> Result<DialogTurnResult> {
    let result = drive_turn(root_dialog_id, dc, config).await?;
    dc.turn().commit().await?;
    Ok(result)
}

/// The run loop without committing the turn's linkage releases
#[instrument(skip(dc, config), fields(conversation_id = %dc.turn().conversation_id()))]
pub(crate) async fn drive_turn(
    root_dialog_id: &str,
    dc: &mut DialogContext<'_>,
    config: &EngineConfig,
) -> Result<DialogTurnResult> {
    let mut handle_parent_signals = true;

    loop {
        let checkpoint = dc.snapshot();
        let released = dc.turn().pending_releases();
        let failure = match run_cycle(root_dialog_id, dc, config, handle_parent_signals).await {
            Ok(result) => return Ok(result),
            Err(failure) => failure,
        };

        dc.restore(checkpoint.clone());
        dc.turn().discard_releases_from(released);
        if failure.is_cancelled() {
            return Err(failure);
        }

        warn!(error = %failure, kind = failure.kind(), "Turn failed, raising error event");
        let handled = match dc.dispatch_event(&DialogEvent::error(&failure), true).await {
            Ok(handled) => handled,
            Err(secondary) => {
                return Err(DialogError::Recovery {
                    original: Box::new(failure),
                    secondary: Box::new(secondary),
                });
            }
        };

        if !handled {
            return Err(failure);
        }

        if *dc.stack() != checkpoint {
            info!(depth = dc.stack().len(), "Turn failure handled by a dialog");
            let result = if dc.stack().is_empty() {
                DialogTurnResult::complete(None)
            } else {
                DialogTurnResult::waiting()
            };
            end_with_parent(dc, &result, config).await?;
            return Ok(result);
        }

        info!("Turn failure handled by a dialog, running turn again");
        handle_parent_signals = false;
    }
}

async fn run_cycle(
    root_dialog_id: &str,
    dc: &mut DialogContext<'_>,
    config: &EngineConfig,
    handle_parent_signals: bool,
) -> Result<DialogTurnResult> {
    let turn = dc.turn();

    if handle_parent_signals && turn.is_skill_call() && turn.skill_reference().is_some() {
        let activity = turn.activity();

        if activity.is_end_of_conversation() {
            if dc.stack().is_empty() {
                return Ok(DialogTurnResult::empty());
            }
            info!(code = ?activity.code, "Parent ended the conversation, cancelling active dialogs");
            return dc.active_leaf().cancel_all_dialogs(true).await;
        }

        if activity.is_reprompt_request() {
            if dc.stack().is_empty() {
                return Ok(DialogTurnResult::empty());
            }
            dc.reprompt_dialog().await?;
            return Ok(DialogTurnResult::waiting());
        }
    }

    let mut result = dc.continue_dialog().await?;
    if result.status == DialogTurnStatus::Empty {
        result = dc.begin_dialog(root_dialog_id, None).await?;
    }
    end_with_parent(dc, &result, config).await?;
    Ok(result)
}

/// Tell a delegating parent that the stack has finished
async fn end_with_parent(
    dc: &DialogContext<'_>,
    result: &DialogTurnResult,
    config: &EngineConfig,
) -> Result<()> {
    let turn = dc.turn();
    if result.is_terminal() && turn.is_skill_call() {
        let parent_is_channel = turn
            .skill_reference()
            .is_some_and(|reference| config.is_root_scope(&reference.oauth_scope));

        if !parent_is_channel {
            let code = match result.status {
                DialogTurnStatus::Cancelled => EndOfConversationCode::UserCancelled,
                _ => EndOfConversationCode::CompletedSuccessfully,
            };
            info!(?code, "Dialog stack finished, ending conversation with parent");
            let end = Activity::end_of_conversation(turn.conversation_id(), code)
                .with_value(result.result.clone())
                .with_locale(turn.activity().locale.clone());
            turn.send_activity(end).await?;
        }
    }
    Ok(())
}
