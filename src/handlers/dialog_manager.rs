//! Host-facing turn handler

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::{info, instrument, warn};

use crate::config::EngineConfig;
use crate::context::{DialogContext, TurnContext};
use crate::dialogs::Dialog;
use crate::error::Result;
use crate::events::VERSION_CHANGED_EVENT;
use crate::handlers::drive_turn;
use crate::registry::DialogSet;
use crate::storage::DialogStateStore;
use crate::value_objects::DialogTurnResult;

/// Loads a conversation's stack, runs the turn against it and saves it back
///
/// ```rust
/// use std::sync::Arc;
///
/// use async_trait::async_trait;
/// use cim_dialog_engine::{
///     Activity, ActivitySender, Dialog, DialogContext, DialogIdentity, DialogManager,
///     DialogTurnResult, DialogTurnStatus, MemoryDialogStateStore, Result, TurnContext,
/// };
/// use serde_json::Value;
///
/// struct Greeting {
///     identity: DialogIdentity,
/// }
///
/// #[async_trait]
/// impl Dialog for Greeting {
///     fn identity(&self) -> &DialogIdentity {
///         &self.identity
///     }
///
///     async fn begin_dialog(
///         &self,
///         dc: &mut DialogContext<'_>,
///         _options: Option<Value>,
///     ) -> Result<DialogTurnResult> {
///         let turn = dc.turn();
///         turn.send_activity(Activity::message(turn.conversation_id(), "Hello!")).await?;
///         Ok(DialogTurnResult::complete(None))
///     }
/// }
///
/// struct Console;
///
/// #[async_trait]
/// impl ActivitySender for Console {
///     async fn send_activity(&self, activity: Activity) -> Result<()> {
///         println!("{}", activity.text.unwrap_or_default());
///         Ok(())
///     }
/// }
///
/// # tokio_test::block_on(async {
/// let greeting = Arc::new(Greeting { identity: DialogIdentity::new("greeting") });
/// let manager = DialogManager::new(greeting, Arc::new(MemoryDialogStateStore::new())).unwrap();
///
/// let turn = TurnContext::new(Activity::message("conv-1", "hi"), Arc::new(Console));
/// let result = manager.on_turn(&turn).await.unwrap();
/// assert_eq!(result.status, DialogTurnStatus::Complete);
/// # })
/// ```
pub struct DialogManager {
    root_dialog_id: String,
    dialogs: Arc<DialogSet>,
    store: Arc<dyn DialogStateStore>,
    config: EngineConfig,
}

impl DialogManager {
    /// Create a manager whose root dialog is `root_dialog`
    pub fn new(root_dialog: Arc<dyn Dialog>, store: Arc<dyn DialogStateStore>) -> Result<Self> {
        let mut dialogs = DialogSet::new();
        let root_dialog_id = dialogs.add(root_dialog)?;
        Ok(Self {
            root_dialog_id,
            dialogs: Arc::new(dialogs),
            store,
            config: EngineConfig::default(),
        })
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Register another top-level dialog
    pub fn add_dialog(&mut self, dialog: Arc<dyn Dialog>) -> Result<String> {
        Arc::make_mut(&mut self.dialogs).add(dialog)
    }

    pub fn root_dialog_id(&self) -> &str {
        &self.root_dialog_id
    }

    pub fn dialogs(&self) -> &Arc<DialogSet> {
        &self.dialogs
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Process one inbound turn
    ///
    /// Nothing is saved when the turn fails, so the previously persisted
    /// stack stays authoritative. Skill linkages released by the turn are
    /// only deleted after the save.
    #[instrument(skip(self, turn), fields(conversation_id = %turn.conversation_id()))]
    pub async fn on_turn(&self, turn: &TurnContext) -> Result<DialogTurnResult> {
        let released = turn.pending_releases();
        match self.run_and_save(turn).await {
            Ok(result) => {
                turn.commit().await?;
                Ok(result)
            }
            Err(err) => {
                turn.discard_releases_from(released);
                Err(err)
            }
        }
    }

    async fn run_and_save(&self, turn: &TurnContext) -> Result<DialogTurnResult> {
        let conversation_id = turn.conversation_id().to_string();
        let mut state = self.store.get_or_create(&conversation_id).await?;

        let now = Utc::now();
        let expired = self
            .config
            .expire_after()
            .is_some_and(|expire_after| state.is_expired(now, expire_after));
        let current_version = self.dialogs.version().to_string();
        let stored_version = state.dialogs_version.clone();

        let result = {
            let mut dc = DialogContext::new(self.dialogs.clone(), turn, &mut state.dialog_stack);

            if expired && !dc.stack().is_empty() {
                info!(depth = dc.stack().len(), "Conversation expired, cancelling dialogs");
                dc.cancel_all_dialogs(true).await?;
            }

            if !dc.stack().is_empty() && stored_version.as_deref() != Some(current_version.as_str()) {
                let change = json!({
                    "previous": stored_version,
                    "current": current_version,
                });
                let handled = dc
                    .emit_event(VERSION_CHANGED_EVENT, Some(change), true, true)
                    .await?;
                if !handled {
                    warn!(
                        previous = ?stored_version,
                        current = %current_version,
                        "Dialogs changed under an active stack, cancelling"
                    );
                    dc.cancel_all_dialogs(false).await?;
                }
            }

            drive_turn(&self.root_dialog_id, &mut dc, &self.config).await?
        };

        state.last_access = Some(now);
        state.dialogs_version = Some(current_version);
        self.store.save(&conversation_id, &state).await?;

        Ok(result)
    }
}

impl std::fmt::Debug for DialogManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DialogManager")
            .field("root_dialog_id", &self.root_dialog_id)
            .field("dialogs", &self.dialogs)
            .field("config", &self.config)
            .finish()
    }
}
