//! Tests for the dialog stack controller

mod common;

use std::sync::Arc;

use cim_dialog_engine::{
    ComponentDialog, Dialog, DialogContext, DialogError, DialogSet, DialogState, DialogTurnStatus,
};
use common::{CallLog, OnEvent, RecordingSender, ScriptedDialog, Step, message_turn};
use serde_json::json;
use tokio_util::sync::CancellationToken;

fn registry(dialogs: Vec<Arc<dyn Dialog>>) -> Arc<DialogSet> {
    let mut set = DialogSet::new();
    for dialog in dialogs {
        set.add(dialog).unwrap();
    }
    Arc::new(set)
}

#[tokio::test]
async fn test_child_completion_resumes_parent_once() {
    let log = CallLog::new();
    let dialogs = registry(vec![
        ScriptedDialog::new("main", &log)
            .on_begin(Step::Begin("child"))
            .on_resume(Step::Wait)
            .build(),
        ScriptedDialog::new("child", &log)
            .on_continue(Step::Complete(Some(json!(42))))
            .build(),
    ]);
    let sender = RecordingSender::new();
    let mut state = DialogState::new();

    let turn = message_turn(&sender, "start");
    let mut dc = DialogContext::new(dialogs.clone(), &turn, &mut state);
    let result = dc.begin_dialog("main", None).await.unwrap();
    assert_eq!(result.status, DialogTurnStatus::Waiting);
    assert_eq!(state.ids(), vec!["main", "child"]);

    log.clear();
    let turn = message_turn(&sender, "answer");
    let mut dc = DialogContext::new(dialogs, &turn, &mut state);
    let result = dc.continue_dialog().await.unwrap();

    assert_eq!(result.status, DialogTurnStatus::Waiting);
    assert_eq!(
        log.entries(),
        vec!["continue:child", "end:child:EndCalled", "resume:main:EndCalled"]
    );
    assert_eq!(log.count("resume:main:EndCalled"), 1);
    assert_eq!(state.ids(), vec!["main"]);
}

#[tokio::test]
async fn test_nested_begin_that_finishes_immediately_pops_each_frame_once() {
    let log = CallLog::new();
    let dialogs = registry(vec![
        ScriptedDialog::new("main", &log)
            .on_begin(Step::Begin("child"))
            .build(),
        ScriptedDialog::new("child", &log)
            .on_begin(Step::Complete(Some(json!("done"))))
            .build(),
    ]);
    let sender = RecordingSender::new();
    let turn = message_turn(&sender, "go");
    let mut state = DialogState::new();
    let mut dc = DialogContext::new(dialogs, &turn, &mut state);

    let result = dc.begin_dialog("main", None).await.unwrap();

    assert_eq!(result.status, DialogTurnStatus::Complete);
    assert_eq!(result.result, Some(json!("done")));
    assert!(state.is_empty());
    assert_eq!(log.count("end:child:EndCalled"), 1);
    assert_eq!(log.count("end:main:EndCalled"), 1);
}

#[tokio::test]
async fn test_continue_on_empty_stack_does_nothing() {
    let log = CallLog::new();
    let dialogs = registry(vec![ScriptedDialog::new("main", &log).build()]);
    let sender = RecordingSender::new();
    let turn = message_turn(&sender, "hi");
    let mut state = DialogState::new();
    let mut dc = DialogContext::new(dialogs, &turn, &mut state);

    let result = dc.continue_dialog().await.unwrap();

    assert_eq!(result.status, DialogTurnStatus::Empty);
    assert!(log.entries().is_empty());
}

#[tokio::test]
async fn test_cancel_all_on_empty_stack_is_idempotent() {
    let log = CallLog::new();
    let dialogs = registry(vec![ScriptedDialog::new("main", &log).build()]);
    let sender = RecordingSender::new();
    let turn = message_turn(&sender, "hi");
    let mut state = DialogState::new();
    let mut dc = DialogContext::new(dialogs, &turn, &mut state);

    for _ in 0..2 {
        let result = dc.cancel_all_dialogs(true).await.unwrap();
        assert_eq!(result.status, DialogTurnStatus::Empty);
    }
    assert!(log.entries().is_empty());
}

#[tokio::test]
async fn test_cancel_all_unwinds_top_to_bottom() {
    let log = CallLog::new();
    let dialogs = registry(vec![
        ScriptedDialog::new("main", &log)
            .on_begin(Step::Begin("child"))
            .build(),
        ScriptedDialog::new("child", &log).build(),
    ]);
    let sender = RecordingSender::new();
    let turn = message_turn(&sender, "hi");
    let mut state = DialogState::new();
    let mut dc = DialogContext::new(dialogs, &turn, &mut state);
    dc.begin_dialog("main", None).await.unwrap();
    log.clear();

    let result = dc.cancel_all_dialogs(true).await.unwrap();

    assert_eq!(result.status, DialogTurnStatus::Cancelled);
    assert_eq!(
        log.entries(),
        vec![
            "event:child:cancelDialog",
            "end:child:CancelCalled",
            "event:main:cancelDialog",
            "end:main:CancelCalled",
        ]
    );
    assert!(state.is_empty());
}

#[tokio::test]
async fn test_begin_rejects_unknown_and_blank_ids() {
    let log = CallLog::new();
    let dialogs = registry(vec![ScriptedDialog::new("main", &log).build()]);
    let sender = RecordingSender::new();
    let turn = message_turn(&sender, "hi");
    let mut state = DialogState::new();
    let mut dc = DialogContext::new(dialogs, &turn, &mut state);

    let err = dc.begin_dialog("missing", None).await.unwrap_err();
    assert!(matches!(err, DialogError::UnregisteredDialog(id) if id == "missing"));

    let err = dc.begin_dialog(" ", None).await.unwrap_err();
    assert!(matches!(err, DialogError::InvalidArgument(_)));

    assert!(state.is_empty());
}

#[tokio::test]
async fn test_replace_does_not_resume_parent() {
    let log = CallLog::new();
    let dialogs = registry(vec![
        ScriptedDialog::new("main", &log)
            .on_begin(Step::Begin("first"))
            .build(),
        ScriptedDialog::new("first", &log).build(),
        ScriptedDialog::new("second", &log).build(),
    ]);
    let sender = RecordingSender::new();
    let turn = message_turn(&sender, "hi");
    let mut state = DialogState::new();
    let mut dc = DialogContext::new(dialogs, &turn, &mut state);
    dc.begin_dialog("main", None).await.unwrap();
    log.clear();

    let result = dc.replace_dialog("second", None).await.unwrap();

    assert_eq!(result.status, DialogTurnStatus::Waiting);
    assert_eq!(log.entries(), vec!["end:first:ReplaceCalled", "begin:second"]);
    assert_eq!(state.ids(), vec!["main", "second"]);
}

#[tokio::test]
async fn test_reprompt_touches_active_frame_only() {
    let log = CallLog::new();
    let dialogs = registry(vec![
        ScriptedDialog::new("main", &log)
            .on_begin(Step::Begin("child"))
            .build(),
        ScriptedDialog::new("child", &log).build(),
    ]);
    let sender = RecordingSender::new();
    let turn = message_turn(&sender, "hi");
    let mut state = DialogState::new();
    let mut dc = DialogContext::new(dialogs, &turn, &mut state);
    dc.begin_dialog("main", None).await.unwrap();
    log.clear();

    dc.reprompt_dialog().await.unwrap();

    assert_eq!(log.entries(), vec!["reprompt:child"]);
    assert_eq!(state.len(), 2);
}

#[tokio::test]
async fn test_events_bubble_until_consumed() {
    let log = CallLog::new();
    let dialogs = registry(vec![
        ScriptedDialog::new("root", &log)
            .on_begin(Step::Begin("main"))
            .on_event(OnEvent::Consume)
            .build(),
        ScriptedDialog::new("main", &log)
            .on_begin(Step::Begin("child"))
            .build(),
        ScriptedDialog::new("child", &log).build(),
    ]);
    let sender = RecordingSender::new();
    let turn = message_turn(&sender, "hi");
    let mut state = DialogState::new();
    let mut dc = DialogContext::new(dialogs, &turn, &mut state);
    dc.begin_dialog("root", None).await.unwrap();
    log.clear();

    let handled = dc.emit_event("custom", None, true, false).await.unwrap();
    assert!(handled);
    assert_eq!(
        log.entries(),
        vec!["event:child:custom", "event:main:custom", "event:root:custom"]
    );

    log.clear();
    let handled = dc.emit_event("custom", None, false, false).await.unwrap();
    assert!(!handled);
    assert_eq!(log.entries(), vec!["event:child:custom"]);
}

#[tokio::test]
async fn test_component_runs_nested_stack() {
    let log = CallLog::new();
    let mut component = ComponentDialog::new("booking");
    component
        .add_dialog(
            ScriptedDialog::new("ask-date", &log)
                .on_continue(Step::Complete(Some(json!("2026-10-20"))))
                .build(),
        )
        .unwrap();
    let dialogs = registry(vec![
        ScriptedDialog::new("main", &log)
            .on_begin(Step::Begin("booking"))
            .on_resume(Step::Wait)
            .build(),
        Arc::new(component) as Arc<dyn Dialog>,
    ]);
    let sender = RecordingSender::new();
    let mut state = DialogState::new();

    let turn = message_turn(&sender, "book");
    let mut dc = DialogContext::new(dialogs.clone(), &turn, &mut state);
    dc.begin_dialog("main", None).await.unwrap();

    assert_eq!(state.ids(), vec!["main", "booking"]);
    let inner = state.active().unwrap().inner.as_ref().unwrap();
    assert_eq!(inner.ids(), vec!["ask-date"]);

    log.clear();
    let turn = message_turn(&sender, "the 20th");
    let mut dc = DialogContext::new(dialogs, &turn, &mut state);
    let result = dc.continue_dialog().await.unwrap();

    assert_eq!(result.status, DialogTurnStatus::Waiting);
    assert_eq!(
        log.entries(),
        vec!["continue:ask-date", "end:ask-date:EndCalled", "resume:main:EndCalled"]
    );
    assert_eq!(state.ids(), vec!["main"]);
}

#[tokio::test]
async fn test_leaf_events_start_inside_components() {
    let log = CallLog::new();
    let mut component = ComponentDialog::new("booking");
    component
        .add_dialog(ScriptedDialog::new("ask-date", &log).build())
        .unwrap();
    let dialogs = registry(vec![
        ScriptedDialog::new("main", &log)
            .on_begin(Step::Begin("booking"))
            .build(),
        Arc::new(component) as Arc<dyn Dialog>,
    ]);
    let sender = RecordingSender::new();
    let turn = message_turn(&sender, "book");
    let mut state = DialogState::new();
    let mut dc = DialogContext::new(dialogs, &turn, &mut state);
    dc.begin_dialog("main", None).await.unwrap();
    log.clear();

    assert!(dc.has_active_child());
    let leaf = dc.active_leaf();
    assert_eq!(leaf.stack().ids(), vec!["ask-date"]);
    assert!(leaf.find_dialog("main").is_some());

    let handled = dc.emit_event("ping", None, true, true).await.unwrap();
    assert!(!handled);
    assert_eq!(log.entries(), vec!["event:ask-date:ping", "event:main:ping"]);

    let handled = dc.emit_event("ping", None, true, false).await.unwrap();
    assert!(!handled);
    assert_eq!(log.count("event:ask-date:ping"), 1);
}

#[tokio::test]
async fn test_cancelling_component_cancels_inner_stack() {
    let log = CallLog::new();
    let mut component = ComponentDialog::new("booking");
    component
        .add_dialog(ScriptedDialog::new("ask-date", &log).build())
        .unwrap();
    let dialogs = registry(vec![Arc::new(component) as Arc<dyn Dialog>]);
    let sender = RecordingSender::new();
    let turn = message_turn(&sender, "book");
    let mut state = DialogState::new();
    let mut dc = DialogContext::new(dialogs, &turn, &mut state);
    dc.begin_dialog("booking", None).await.unwrap();
    log.clear();

    dc.cancel_all_dialogs(false).await.unwrap();

    assert_eq!(log.entries(), vec!["end:ask-date:CancelCalled"]);
    assert!(state.is_empty());
}

#[tokio::test]
async fn test_component_frames_resolved_from_outer_registry() {
    let log = CallLog::new();
    let mut component = ComponentDialog::new("booking");
    component
        .add_dialog(
            ScriptedDialog::new("ask", &log)
                .on_begin(Step::Begin("confirm"))
                .build(),
        )
        .unwrap();
    // "confirm" is only known to the outer registry
    let dialogs = registry(vec![
        ScriptedDialog::new("main", &log)
            .on_begin(Step::Begin("booking"))
            .build(),
        Arc::new(component) as Arc<dyn Dialog>,
        ScriptedDialog::new("confirm", &log).build(),
    ]);
    let sender = RecordingSender::new();
    let turn = message_turn(&sender, "book");
    let mut state = DialogState::new();
    let mut dc = DialogContext::new(dialogs, &turn, &mut state);
    dc.begin_dialog("main", None).await.unwrap();
    assert_eq!(dc.active_leaf().stack().ids(), vec!["ask", "confirm"]);
    log.clear();

    dc.reprompt_dialog().await.unwrap();
    assert_eq!(log.entries(), vec!["reprompt:confirm"]);
    log.clear();

    dc.cancel_all_dialogs(false).await.unwrap();
    assert_eq!(
        log.entries(),
        vec![
            "end:confirm:CancelCalled",
            "end:ask:CancelCalled",
            "end:main:CancelCalled",
        ]
    );
    assert!(state.is_empty());
}

#[tokio::test]
async fn test_operations_fail_once_turn_is_cancelled() {
    let log = CallLog::new();
    let dialogs = registry(vec![ScriptedDialog::new("main", &log).build()]);
    let sender = RecordingSender::new();
    let token = CancellationToken::new();
    let turn = message_turn(&sender, "hi").with_cancellation(token.clone());
    let mut state = DialogState::new();
    let mut dc = DialogContext::new(dialogs, &turn, &mut state);

    token.cancel();

    assert!(dc.begin_dialog("main", None).await.unwrap_err().is_cancelled());
    assert!(dc.continue_dialog().await.unwrap_err().is_cancelled());
    assert!(log.entries().is_empty());
    assert!(state.is_empty());
}
