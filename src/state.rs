//! Front-end view model, separated from terminal I/O.
//!
//! `ClientState` mirrors what the engine has reported: the rendered timeline,
//! the banner, and a system log. It is updated only by `events::process_event`.

use std::collections::HashSet;
use std::path::PathBuf;

use crate::entry::{EntryId, SendState};
use crate::logging::Logger;
use crate::render::RenderedEntry;
use crate::sdk::ConversationId;
use crate::session_status::Banner;

/// System log lines kept in memory
pub const MAX_SYSTEM_LOG: usize = 500;

#[derive(Default)]
pub struct ClientState {
    /// Conversation shown in the timeline, once opened
    pub conversation_id: Option<ConversationId>,

    /// Rendered timeline, index-aligned with the engine's snapshot.
    pub timeline: Vec<RenderedEntry>,

    /// Latest banner; `None` until the first status report.
    pub banner: Option<Banner>,

    pub system_log: Vec<String>,

    /// Where the last retrieved transcript was saved.
    pub last_transcript: Option<PathBuf>,

    /// Overrides the platform data directory for saved transcripts.
    pub transcript_dir: Option<PathBuf>,

    /// Entries already written to the chat log.
    pub logged: HashSet<EntryId>,

    pub logger: Option<Logger>,
}

impl ClientState {
    pub fn new(logger: Option<Logger>) -> Self {
        Self {
            system_log: vec!["Welcome! Type /open to speak with an agent.".into()],
            logger,
            ..Self::default()
        }
    }

    pub fn is_open(&self) -> bool {
        self.conversation_id.is_some()
    }

    /// Whether the composer's send affordance is enabled for `text`.
    pub fn can_send(&self, text: &str) -> bool {
        self.is_open() && !text.trim().is_empty()
    }

    /// Text of the most recent failed send, for `/retry`.
    pub fn last_failed_text(&self) -> Option<&str> {
        self.timeline
            .iter()
            .rev()
            .find(|entry| entry.send_state == Some(SendState::Failed))
            .map(|entry| entry.text.as_str())
    }

    pub fn log_system(&mut self, line: impl Into<String>) {
        self.system_log.push(line.into());
        if self.system_log.len() > MAX_SYSTEM_LOG {
            self.system_log.remove(0);
        }
    }

    /// Forget everything about the current conversation.
    pub fn clear_conversation(&mut self) {
        self.conversation_id = None;
        self.timeline.clear();
        self.banner = None;
        self.logged.clear();
    }
}
