//! Render-ready representation of timeline entries.
//!
//! Several variants are placeholders: the client shows a fixed label for
//! them instead of the real content.

use std::fmt;

use crate::classify::{classify_entry, RenderVariant};
use crate::entry::{ConversationEntry, EntryId, ParticipantRole, SendState};

/// Horizontal placement of an entry bubble.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Alignment {
    /// Remote participants (agent, chatbot) and rich-content placeholders
    Leading,
    /// The local user
    Trailing,
    /// System notices
    Center,
}

/// An entry prepared for display, with timestamp, sender label and text.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderedEntry {
    pub identifier: EntryId,
    pub timestamp: String,
    pub variant: RenderVariant,
    pub alignment: Alignment,
    pub sender: String,
    pub text: String,
    pub send_state: Option<SendState>,
}

impl RenderedEntry {
    /// Whether the UI should offer a retry affordance for this entry.
    pub fn can_retry(&self) -> bool {
        self.send_state == Some(SendState::Failed)
    }
}

impl fmt::Display for RenderedEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.alignment {
            Alignment::Center => write!(f, "[{}] -- {} --", self.timestamp, self.text)?,
            Alignment::Trailing => {
                write!(f, "[{}] {:>40} <{}>", self.timestamp, self.text, self.sender)?
            }
            Alignment::Leading => {
                write!(f, "[{}] <{}> {}", self.timestamp, self.sender, self.text)?
            }
        }
        match self.send_state {
            Some(SendState::Pending) => write!(f, " (sending...)"),
            Some(SendState::Failed) => write!(f, " (failed, /retry to resend)"),
            _ => Ok(()),
        }
    }
}

fn centered(text: &str) -> (Alignment, String) {
    (Alignment::Center, text.to_string())
}

/// Render a single entry, dispatching on its classified variant.
pub fn render_entry(entry: &ConversationEntry) -> RenderedEntry {
    let variant = classify_entry(entry);
    let (alignment, text) = match variant {
        RenderVariant::Attachment => (Alignment::Leading, "📎 Attachment".to_string()),
        RenderVariant::Image => (Alignment::Leading, "🖼 Image".to_string()),
        RenderVariant::ListPicker => centered("List Picker - Not implemented"),
        RenderVariant::QuickReplies => centered("Quick Replies - Not implemented"),
        RenderVariant::RichLink => centered("Rich Link - Not implemented"),
        RenderVariant::Selections => centered("Selections - Not implemented"),
        RenderVariant::WebView => centered("WebView - Not implemented"),
        RenderVariant::SystemParticipantChanged => centered("Participant changed"),
        RenderVariant::SystemTyping => (Alignment::Leading, "...".to_string()),
        RenderVariant::SystemRouting => centered("Routing result"),
        RenderVariant::SystemGeneric => centered("System message"),
        RenderVariant::Text => {
            let text = entry.text_body().unwrap_or_default().to_string();
            (text_alignment(entry.role()), text)
        }
        RenderVariant::Unhandled => centered("Unhandled message type"),
    };

    RenderedEntry {
        identifier: entry.identifier.clone(),
        timestamp: entry.timestamp.format("%H:%M:%S").to_string(),
        variant,
        alignment,
        sender: sender_label(entry),
        text,
        send_state: entry.send_state,
    }
}

pub fn render_timeline(entries: &[ConversationEntry]) -> Vec<RenderedEntry> {
    entries.iter().map(render_entry).collect()
}

fn text_alignment(role: ParticipantRole) -> Alignment {
    match role {
        ParticipantRole::Agent | ParticipantRole::Chatbot => Alignment::Leading,
        ParticipantRole::User => Alignment::Trailing,
        ParticipantRole::System => Alignment::Center,
    }
}

fn sender_label(entry: &ConversationEntry) -> String {
    match &entry.sender.display_name {
        Some(name) if !name.trim().is_empty() => name.clone(),
        _ => entry.role().as_str().to_string(),
    }
}
