//! Activities exchanged with channels and skills
//!
//! Only the fields the engine reads or writes are modelled; everything else a
//! transport carries travels in `properties`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::REPROMPT_REQUEST_EVENT;

/// Type of an activity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActivityType {
    /// User or agent message
    Message,
    /// Named event
    Event,
    /// Conversation is over
    EndOfConversation,
    /// Request expecting a response
    Invoke,
    /// Diagnostic trace
    Trace,
}

/// Codes carried by an end-of-conversation activity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EndOfConversationCode {
    Unknown,
    CompletedSuccessfully,
    UserCancelled,
    BotTimedOut,
    BotIssuedInvalidMessage,
    ChannelFailed,
}

/// An inbound or outbound activity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    /// Unique identifier
    pub id: String,
    /// Type of this activity
    #[serde(rename = "type")]
    pub activity_type: ActivityType,
    /// Event name
    pub name: Option<String>,
    /// Message text
    pub text: Option<String>,
    /// Structured payload
    pub value: Option<Value>,
    /// End-of-conversation code
    pub code: Option<EndOfConversationCode>,
    /// Conversation this activity belongs to
    pub conversation_id: String,
    /// Locale of the sender
    pub locale: Option<String>,
    /// Skill correlation token this activity answers
    pub relates_to: Option<String>,
    /// When the activity was created
    pub timestamp: DateTime<Utc>,
    /// Transport-specific extras
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub properties: Map<String, Value>,
}

impl Activity {
    /// Create an activity of the given type
    pub fn new(activity_type: ActivityType, conversation_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            activity_type,
            name: None,
            text: None,
            value: None,
            code: None,
            conversation_id: conversation_id.into(),
            locale: None,
            relates_to: None,
            timestamp: Utc::now(),
            properties: Map::new(),
        }
    }

    /// Create a text message
    pub fn message(conversation_id: impl Into<String>, text: impl Into<String>) -> Self {
        let mut activity = Self::new(ActivityType::Message, conversation_id);
        activity.text = Some(text.into());
        activity
    }

    /// Create a named event
    pub fn event(conversation_id: impl Into<String>, name: impl Into<String>) -> Self {
        let mut activity = Self::new(ActivityType::Event, conversation_id);
        activity.name = Some(name.into());
        activity
    }

    /// Create an end-of-conversation activity
    pub fn end_of_conversation(
        conversation_id: impl Into<String>,
        code: EndOfConversationCode,
    ) -> Self {
        let mut activity = Self::new(ActivityType::EndOfConversation, conversation_id);
        activity.code = Some(code);
        activity
    }

    /// Attach a payload
    pub fn with_value(mut self, value: Option<Value>) -> Self {
        self.value = value;
        self
    }

    /// Attach a locale
    pub fn with_locale(mut self, locale: Option<String>) -> Self {
        self.locale = locale;
        self
    }

    /// Mark this activity as the answer to a skill correlation token
    pub fn relating_to(mut self, token: impl Into<String>) -> Self {
        self.relates_to = Some(token.into());
        self
    }

    pub fn is_end_of_conversation(&self) -> bool {
        self.activity_type == ActivityType::EndOfConversation
    }

    /// Whether this is the parent's request for the active dialog to reprompt
    pub fn is_reprompt_request(&self) -> bool {
        self.activity_type == ActivityType::Event
            && self.name.as_deref() == Some(REPROMPT_REQUEST_EVENT)
    }
}
