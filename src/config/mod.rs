//! Engine configuration
//!
//! Settings are plain serde data so hosts can embed them in whatever
//! configuration document they already load.

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// OAuth scope used by a channel-facing (root) agent.
pub const TO_CHANNEL_FROM_BOT_OAUTH_SCOPE: &str = "https://api.botframework.com";

/// OAuth scope used by a channel-facing (root) agent in the government cloud.
pub const GOV_TO_CHANNEL_FROM_BOT_OAUTH_SCOPE: &str = "https://api.botframework.us";

/// Configuration for the turn handler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// OAuth scopes that identify the parent as a channel (this agent is the root)
    pub root_oauth_scopes: Vec<String>,

    /// Cancel the stack when the conversation was idle longer than this
    pub expire_after_secs: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            root_oauth_scopes: vec![
                TO_CHANNEL_FROM_BOT_OAUTH_SCOPE.to_string(),
                GOV_TO_CHANNEL_FROM_BOT_OAUTH_SCOPE.to_string(),
            ],
            expire_after_secs: None,
        }
    }
}

impl EngineConfig {
    /// Parse a configuration document, filling unspecified fields with defaults
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Set the idle expiry
    pub fn with_expire_after_secs(mut self, secs: u64) -> Self {
        self.expire_after_secs = Some(secs);
        self
    }

    /// Replace the recognized root scopes
    pub fn with_root_oauth_scopes(mut self, scopes: Vec<String>) -> Self {
        self.root_oauth_scopes = scopes;
        self
    }

    /// Idle expiry as a duration
    pub fn expire_after(&self) -> Option<Duration> {
        self.expire_after_secs
            .and_then(|secs| i64::try_from(secs).ok())
            .map(Duration::seconds)
    }

    /// Whether `scope` belongs to a channel rather than a parent agent
    pub fn is_root_scope(&self, scope: &str) -> bool {
        self.root_oauth_scopes.iter().any(|s| s == scope)
    }
}
