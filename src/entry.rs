//! Conversation entry data model.
//!
//! A `ConversationEntry` is one unit of a chat timeline: a message, a system
//! event or a status change. Entries come from the backend push feed or from a
//! local optimistic send; only locally-originated entries carry a `SendState`.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Opaque entry identifier, unique within a conversation's timeline.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(String);

impl EntryId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh locally-unique identifier for an outbound entry.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntryId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for EntryId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Primary entry format reported by the backend.
///
/// Formats this client does not know are preserved in `Other`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EntryFormat {
    Attachments,
    ImageMessage,
    ListPicker,
    QuickReplies,
    RichLink,
    Selections,
    Unspecified,
    WebView,
    TextMessage,
    Other(String),
}

impl EntryFormat {
    /// Every format with a direct mapping, in wire-name order.
    pub const KNOWN: [EntryFormat; 9] = [
        EntryFormat::Attachments,
        EntryFormat::ImageMessage,
        EntryFormat::ListPicker,
        EntryFormat::QuickReplies,
        EntryFormat::RichLink,
        EntryFormat::Selections,
        EntryFormat::Unspecified,
        EntryFormat::WebView,
        EntryFormat::TextMessage,
    ];

    pub fn parse(name: &str) -> Self {
        match name {
            "attachments" => Self::Attachments,
            "imageMessage" => Self::ImageMessage,
            "listPicker" => Self::ListPicker,
            "quickReplies" => Self::QuickReplies,
            "richLink" => Self::RichLink,
            "selections" => Self::Selections,
            "unspecified" => Self::Unspecified,
            "webView" => Self::WebView,
            "textMessage" => Self::TextMessage,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Attachments => "attachments",
            Self::ImageMessage => "imageMessage",
            Self::ListPicker => "listPicker",
            Self::QuickReplies => "quickReplies",
            Self::RichLink => "richLink",
            Self::Selections => "selections",
            Self::Unspecified => "unspecified",
            Self::WebView => "webView",
            Self::TextMessage => "textMessage",
            Self::Other(name) => name,
        }
    }
}

impl From<String> for EntryFormat {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

impl From<EntryFormat> for String {
    fn from(f: EntryFormat) -> Self {
        f.as_str().to_string()
    }
}

/// Secondary classifier, consulted only when the format is `Unspecified`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EntryType {
    Message,
    ParticipantChanged,
    TypingIndicator,
    RoutingRequest,
    RoutingResult,
    DeliveryAcknowledgement,
    ReadAcknowledgement,
    Other(String),
}

impl EntryType {
    pub const KNOWN: [EntryType; 7] = [
        EntryType::Message,
        EntryType::ParticipantChanged,
        EntryType::TypingIndicator,
        EntryType::RoutingRequest,
        EntryType::RoutingResult,
        EntryType::DeliveryAcknowledgement,
        EntryType::ReadAcknowledgement,
    ];

    pub fn parse(name: &str) -> Self {
        match name {
            "message" => Self::Message,
            "participantChanged" => Self::ParticipantChanged,
            "typingIndicator" => Self::TypingIndicator,
            "routingRequest" => Self::RoutingRequest,
            "routingResult" => Self::RoutingResult,
            "deliveryAcknowledgement" => Self::DeliveryAcknowledgement,
            "readAcknowledgement" => Self::ReadAcknowledgement,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Message => "message",
            Self::ParticipantChanged => "participantChanged",
            Self::TypingIndicator => "typingIndicator",
            Self::RoutingRequest => "routingRequest",
            Self::RoutingResult => "routingResult",
            Self::DeliveryAcknowledgement => "deliveryAcknowledgement",
            Self::ReadAcknowledgement => "readAcknowledgement",
            Self::Other(name) => name,
        }
    }
}

impl From<String> for EntryType {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

impl From<EntryType> for String {
    fn from(t: EntryType) -> Self {
        t.as_str().to_string()
    }
}

/// Role of the participant that produced an entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ParticipantRole {
    Agent,
    Chatbot,
    User,
    System,
}

impl ParticipantRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Agent => "agent",
            Self::Chatbot => "chatbot",
            Self::User => "user",
            Self::System => "system",
        }
    }

    /// Agents and chatbots share the "remote participant" presentation.
    pub fn is_agent_like(&self) -> bool {
        matches!(self, Self::Agent | Self::Chatbot)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sender {
    pub role: ParticipantRole,
    #[serde(default)]
    pub display_name: Option<String>,
}

impl Sender {
    pub fn new(role: ParticipantRole) -> Self {
        Self {
            role,
            display_name: None,
        }
    }
}

/// Variant data carried by an entry. Its shape depends on the entry format.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "camelCase")]
pub enum EntryPayload {
    /// Decoded text message body
    Text { text: String },
    /// Payload this client does not decode, kept verbatim
    Raw(Value),
    Empty,
}

impl EntryPayload {
    /// Decode the payload as message text, if it has that shape.
    ///
    /// Undecoded payloads are accepted when they are a JSON object with a
    /// string `text` field.
    pub fn decode_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            Self::Raw(value) => value.get("text").and_then(Value::as_str),
            Self::Empty => None,
        }
    }
}

/// Delivery state of a locally-originated entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SendState {
    Pending,
    Confirmed,
    Failed,
}

/// One entry of the conversation timeline.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConversationEntry {
    pub identifier: EntryId,
    pub format: EntryFormat,
    #[serde(rename = "type")]
    pub entry_type: EntryType,
    pub sender: Sender,
    pub payload: EntryPayload,
    pub timestamp: DateTime<Utc>,
    /// Present only for entries created by the local send pipeline
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub send_state: Option<SendState>,
}

impl ConversationEntry {
    pub fn new(
        identifier: EntryId,
        format: EntryFormat,
        entry_type: EntryType,
        role: ParticipantRole,
        payload: EntryPayload,
    ) -> Self {
        Self {
            identifier,
            format,
            entry_type,
            sender: Sender::new(role),
            payload,
            timestamp: Utc::now(),
            send_state: None,
        }
    }

    /// A text message received from the backend.
    pub fn text(
        identifier: impl Into<EntryId>,
        role: ParticipantRole,
        text: impl Into<String>,
    ) -> Self {
        Self::new(
            identifier.into(),
            EntryFormat::TextMessage,
            EntryType::Message,
            role,
            EntryPayload::Text { text: text.into() },
        )
    }

    /// A system event (unspecified format) of the given type.
    pub fn system(identifier: impl Into<EntryId>, entry_type: EntryType) -> Self {
        Self::new(
            identifier.into(),
            EntryFormat::Unspecified,
            entry_type,
            ParticipantRole::System,
            EntryPayload::Empty,
        )
    }

    /// A user text entry awaiting backend acknowledgment.
    pub fn outbound(identifier: EntryId, text: impl Into<String>) -> Self {
        Self::text(identifier, ParticipantRole::User, text).with_send_state(SendState::Pending)
    }

    pub fn with_send_state(mut self, state: SendState) -> Self {
        self.send_state = Some(state);
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.sender.display_name = Some(name.into());
        self
    }

    pub fn role(&self) -> ParticipantRole {
        self.sender.role
    }

    /// Whether this entry was created by the local send pipeline.
    pub fn is_local(&self) -> bool {
        self.send_state.is_some()
    }

    pub fn is_pending(&self) -> bool {
        self.send_state == Some(SendState::Pending)
    }

    pub fn text_body(&self) -> Option<&str> {
        self.payload.decode_text()
    }
}
