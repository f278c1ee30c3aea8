//! Entry classification into render variants.
//!
//! The format is checked first against its direct mapping. `Unspecified`
//! defers to the entry type. Anything the client cannot render degrades to
//! `Unhandled` or `SystemGeneric`; classification never fails.

use crate::entry::{ConversationEntry, EntryFormat, EntryPayload, EntryType};

/// Closed set of rendering strategies for a timeline entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RenderVariant {
    Attachment,
    Image,
    ListPicker,
    QuickReplies,
    RichLink,
    Selections,
    WebView,
    Text,
    SystemParticipantChanged,
    SystemTyping,
    SystemRouting,
    SystemGeneric,
    Unhandled,
}

impl RenderVariant {
    pub const ALL: [RenderVariant; 13] = [
        RenderVariant::Attachment,
        RenderVariant::Image,
        RenderVariant::ListPicker,
        RenderVariant::QuickReplies,
        RenderVariant::RichLink,
        RenderVariant::Selections,
        RenderVariant::WebView,
        RenderVariant::Text,
        RenderVariant::SystemParticipantChanged,
        RenderVariant::SystemTyping,
        RenderVariant::SystemRouting,
        RenderVariant::SystemGeneric,
        RenderVariant::Unhandled,
    ];

    /// Variants produced from `Unspecified`-format entries.
    pub fn is_system(&self) -> bool {
        matches!(
            self,
            Self::SystemParticipantChanged
                | Self::SystemTyping
                | Self::SystemRouting
                | Self::SystemGeneric
        )
    }

    /// Whether the fallback path was taken instead of a real mapping.
    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Unhandled | Self::SystemGeneric)
    }
}

/// Map a `(format, type, payload)` descriptor to its render variant.
pub fn classify(
    format: &EntryFormat,
    entry_type: &EntryType,
    payload: &EntryPayload,
) -> RenderVariant {
    match format {
        EntryFormat::Attachments => RenderVariant::Attachment,
        EntryFormat::ImageMessage => RenderVariant::Image,
        EntryFormat::ListPicker => RenderVariant::ListPicker,
        EntryFormat::QuickReplies => RenderVariant::QuickReplies,
        EntryFormat::RichLink => RenderVariant::RichLink,
        EntryFormat::Selections => RenderVariant::Selections,
        EntryFormat::WebView => RenderVariant::WebView,
        EntryFormat::Unspecified => classify_system(entry_type),
        EntryFormat::TextMessage => match payload.decode_text() {
            Some(_) => RenderVariant::Text,
            None => RenderVariant::Unhandled,
        },
        EntryFormat::Other(_) => RenderVariant::Unhandled,
    }
}

fn classify_system(entry_type: &EntryType) -> RenderVariant {
    match entry_type {
        EntryType::ParticipantChanged => RenderVariant::SystemParticipantChanged,
        EntryType::TypingIndicator => RenderVariant::SystemTyping,
        EntryType::RoutingResult => RenderVariant::SystemRouting,
        _ => RenderVariant::SystemGeneric,
    }
}

pub fn classify_entry(entry: &ConversationEntry) -> RenderVariant {
    classify(&entry.format, &entry.entry_type, &entry.payload)
}
