//! Engine event processing (timeline updates, status, transcripts, errors).

use chrono::Local;
use crossbeam_channel::Receiver;

use crate::classify::RenderVariant;
use crate::entry::SendState;
use crate::logging::{self, LogEntry};
use crate::protocol::ClientEvent;
use crate::render::render_timeline;
use crate::state::ClientState;

/// Process all pending events from the engine, returning the lines to display.
pub fn process_events(event_rx: &Receiver<ClientEvent>, state: &mut ClientState) -> Vec<String> {
    let mut lines = Vec::new();
    while let Ok(event) = event_rx.try_recv() {
        lines.extend(process_event(event, state));
    }
    lines
}

/// Apply one engine event to `state`, returning the lines to display.
pub fn process_event(event: ClientEvent, state: &mut ClientState) -> Vec<String> {
    let mut lines = Vec::new();

    match event {
        ClientEvent::Opened {
            conversation_id,
            entries,
        } => {
            lines.push(system_line(
                state,
                format!("✓ Conversation {} open ({} entries)", conversation_id, entries),
            ));
            state.conversation_id = Some(conversation_id);
            log_settled_entries(state);
        }

        ClientEvent::AlreadyOpening => {
            lines.push(system_line(state, "Conversation is already opening...".to_string()));
        }

        ClientEvent::Reset => {
            state.clear_conversation();
            lines.push(system_line(state, "Conversation reset".to_string()));
        }

        ClientEvent::TimelineUpdated(snapshot) => {
            let rendered = render_timeline(&snapshot);
            for (index, entry) in rendered.iter().enumerate() {
                if state.timeline.get(index) != Some(entry) {
                    lines.push(entry.to_string());
                }
            }
            state.timeline = rendered;
            log_settled_entries(state);
        }

        ClientEvent::StatusChanged { banner, .. } => {
            if banner.visible {
                let marker = if banner.within_hours { "✓" } else { "⚠" };
                lines.push(system_line(state, format!("{} {}", marker, banner.message)));
            }
            state.banner = Some(banner);
        }

        ClientEvent::MessageSent { entry_id } => {
            tracing::debug!(entry = %entry_id, "send acknowledged");
        }

        ClientEvent::TranscriptReady(transcript) => {
            let saved = match &state.transcript_dir {
                Some(dir) => logging::save_transcript_in(dir, &transcript),
                None => logging::save_transcript(&transcript),
            };
            match saved {
                Ok(path) => {
                    let line = format!("Transcript saved to {}", path.display());
                    lines.push(system_line(state, line));
                    state.last_transcript = Some(path);
                }
                Err(e) => lines.push(system_line(state, format!("⚠ Error: {}", e))),
            }
        }

        ClientEvent::Error(msg) => {
            lines.push(system_line(state, format!("⚠ Error: {}", msg)));
        }

        ClientEvent::Info(msg) => {
            lines.push(system_line(state, msg));
        }

        ClientEvent::Stopped => {
            state.clear_conversation();
            lines.push(system_line(state, "✗ Engine stopped".to_string()));
        }
    }

    lines
}

/// Timestamp `msg`, record it in the system log and return it for display.
fn system_line(state: &mut ClientState, msg: String) -> String {
    let ts = Local::now().format("%H:%M:%S").to_string();
    let line = format!("[{}] {}", ts, msg);
    state.log_system(line.clone());
    line
}

/// Queue text entries that will no longer change for the chat log.
fn log_settled_entries(state: &mut ClientState) {
    let (Some(logger), Some(conversation)) = (&state.logger, &state.conversation_id) else {
        return;
    };

    for shown in &state.timeline {
        let settled = matches!(shown.send_state, None | Some(SendState::Confirmed));
        let eligible = shown.variant == RenderVariant::Text && settled;
        if !eligible || state.logged.contains(&shown.identifier) {
            continue;
        }
        logger.log(LogEntry {
            conversation: conversation.to_string(),
            timestamp: shown.timestamp.clone(),
            sender: shown.sender.clone(),
            message: shown.text.clone(),
        });
        state.logged.insert(shown.identifier.clone());
    }
}
