//! Dialog orchestration engine
//!
//! This crate manages multi-turn conversations as a stack of dialogs. It
//! provides:
//! - A registry of polymorphic dialog units with collision-free ids and a
//!   version fingerprint
//! - A stack controller that begins, continues, cancels and reprompts dialogs
//!   and bubbles events from the innermost active dialog outward
//! - A turn run loop with error recovery and skill-boundary handling
//! - Delegation of sub-conversations to remote agents (skills)
//! - A load/run/save turn handler over a pluggable state store
//!
//! The engine is the memory of a conversation: everything a dialog remembers
//! between turns lives in the persisted stack, so any host process can pick a
//! conversation up where the last one left it.

pub mod aggregate;
pub mod config;
pub mod context;
pub mod dialogs;
pub mod error;
pub mod events;
pub mod handlers;
pub mod registry;
pub mod skills;
pub mod storage;
pub mod value_objects;

// Re-export main types
pub use aggregate::{ConversationState, DialogInstance, DialogState};

pub use config::EngineConfig;

pub use context::{ActivitySender, DialogContext, TurnContext};

pub use dialogs::{ComponentDialog, Dialog, DialogIdentity, SkillDialog, SkillDialogOptions};

pub use error::{DialogError, Result};

pub use events::{CANCEL_DIALOG_EVENT, DialogEvent, ERROR_EVENT, VERSION_CHANGED_EVENT};

pub use handlers::{DialogManager, run_turn, run_turn_with};

pub use registry::DialogSet;

pub use skills::{
    ClaimsIdentity, MemorySkillLinkageStore, SkillCallbackHandler, SkillClient,
    SkillConversationReference, SkillLinkage, SkillLinkageStore,
};

pub use storage::{DialogStateStore, MemoryDialogStateStore};

pub use value_objects::{
    Activity, ActivityType, DialogReason, DialogTurnResult, DialogTurnStatus,
    EndOfConversationCode, REPROMPT_REQUEST_EVENT,
};
