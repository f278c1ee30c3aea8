//! Messages exchanged between the front end and the conversation engine.

use crate::sdk::{ConversationId, Transcript};
use crate::session_status::{Banner, SessionStatus};
use crate::timeline::Snapshot;

/// Actions sent from the front end to the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientAction {
    /// Open or resume the conversation ("Speak with an Agent")
    OpenConversation,
    /// Send user-composed text
    SendMessage(String),
    /// Discard the conversation identifier and clear the timeline
    ResetConversation,
    /// Fetch the transcript of the active conversation
    RetrieveTranscript,
    /// Re-run the business-hours check
    RefreshStatus,
    /// Stop the engine thread
    Shutdown,
}

/// Events sent from the engine to the front end
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// The conversation is active and its history is in the timeline
    Opened {
        conversation_id: ConversationId,
        entries: usize,
    },
    /// A fetch is already in progress
    AlreadyOpening,
    /// The conversation was reset; the timeline is empty
    Reset,
    /// New timeline snapshot after a committed mutation
    TimelineUpdated(Snapshot),
    /// Business-hours status after a refresh
    StatusChanged { status: SessionStatus, banner: Banner },
    /// A send was acknowledged
    MessageSent { entry_id: String },
    TranscriptReady(Transcript),
    /// Operation failure, already formatted for display
    Error(String),
    /// Informational line for the system log
    Info(String),
    /// The engine loop has exited
    Stopped,
}
