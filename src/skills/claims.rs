//! Caller claims
//!
//! The channel collaborator authenticates the caller and hands the engine the
//! resulting claims. The engine only needs to know whether the caller is
//! another agent delegating to this one.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::config::TO_CHANNEL_FROM_BOT_OAUTH_SCOPE;

/// App id used by skills running without authentication
pub const ANONYMOUS_SKILL_APP_ID: &str = "AnonymousSkill";

pub const VERSION_CLAIM: &str = "ver";
pub const AUDIENCE_CLAIM: &str = "aud";
pub const APP_ID_CLAIM: &str = "appid";
pub const AUTHORIZED_PARTY_CLAIM: &str = "azp";

/// Authenticated claims of the caller
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimsIdentity {
    pub claims: HashMap<String, String>,
}

impl ClaimsIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a claim
    pub fn with_claim(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.claims.insert(name.into(), value.into());
        self
    }

    pub fn claim(&self, name: &str) -> Option<&str> {
        self.claims.get(name).map(String::as_str)
    }

    /// App id of the caller; v1.0 tokens use `appid`, v2.0 tokens use `azp`
    pub fn app_id(&self) -> Option<&str> {
        match self.claim(VERSION_CLAIM)? {
            "1.0" => self.claim(APP_ID_CLAIM),
            "2.0" => self.claim(AUTHORIZED_PARTY_CLAIM),
            _ => None,
        }
    }

    /// Whether these claims belong to an agent calling this one as a skill
    pub fn is_skill_claim(&self) -> bool {
        if self.claim(APP_ID_CLAIM) == Some(ANONYMOUS_SKILL_APP_ID) {
            return true;
        }

        if self.claim(VERSION_CLAIM).is_none_or(str::is_empty) {
            return false;
        }

        let Some(audience) = self.claim(AUDIENCE_CLAIM).filter(|aud| !aud.is_empty()) else {
            return false;
        };
        if audience == TO_CHANNEL_FROM_BOT_OAUTH_SCOPE {
            return false;
        }

        match self.app_id() {
            Some(app_id) if !app_id.is_empty() => app_id != audience,
            _ => false,
        }
    }
}
