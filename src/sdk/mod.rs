//! Boundary to the messaging transport SDK.
//!
//! The SDK owns connection management, authentication and push delivery.
//! This crate only consumes it through [`MessagingSdk`].

pub mod loopback;

pub use loopback::LoopbackSdk;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc::UnboundedReceiver;
use uuid::Uuid;

use crate::entry::{ConversationEntry, EntryId};

/// Identifier of one conversation with the backend.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(String);

impl ConversationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Mint a fresh client-side conversation identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Backend acknowledgment of an outbound text message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SendAck {
    /// Canonical identifier; may differ from the local one
    pub assigned_id: EntryId,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessHours {
    pub within_hours: bool,
    pub configured: bool,
}

/// Exported conversation transcript.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transcript {
    pub conversation_id: ConversationId,
    pub content_type: String,
    pub data: Vec<u8>,
}

impl Transcript {
    /// File extension matching the transcript content type.
    pub fn extension(&self) -> &'static str {
        match self.content_type.as_str() {
            "application/pdf" => "pdf",
            "text/plain" => "txt",
            "application/json" => "json",
            _ => "bin",
        }
    }
}

/// Push feed of entries for one conversation.
pub type EntryFeed = UnboundedReceiver<ConversationEntry>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SdkError {
    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("Unknown conversation '{0}'")]
    UnknownConversation(ConversationId),
}

/// Asynchronous contract of the messaging SDK.
///
/// Implementations must be shareable across tasks; every call may suspend for
/// as long as the transport needs. No timeout is imposed by the caller.
#[async_trait]
pub trait MessagingSdk: Send + Sync {
    /// Open the conversation with the requested identifier, or resume it.
    ///
    /// The backend may answer with a different canonical identifier.
    async fn open_or_resume_conversation(
        &self,
        requested: &ConversationId,
    ) -> Result<ConversationId, SdkError>;

    /// Entries already present in the conversation, in delivery order.
    async fn fetch_entries(&self, id: &ConversationId) -> Result<Vec<ConversationEntry>, SdkError>;

    /// Subscribe to entries pushed for the conversation from now on.
    async fn stream_entries(&self, id: &ConversationId) -> Result<EntryFeed, SdkError>;

    async fn send_text(
        &self,
        id: &ConversationId,
        local_id: &EntryId,
        text: &str,
    ) -> Result<SendAck, SdkError>;

    async fn check_business_hours(&self, id: &ConversationId) -> Result<BusinessHours, SdkError>;

    async fn reset_conversation(&self, id: &ConversationId) -> Result<(), SdkError>;

    async fn fetch_transcript(&self, id: &ConversationId) -> Result<Transcript, SdkError>;
}
