//! Composer input handling (/open, /reset, /transcript, etc.).

use crossbeam_channel::Sender;

use crate::protocol::ClientAction;
use crate::state::ClientState;

pub const HELP_TEXT: &str = "Commands: /open (speak with an agent), \
/reset (reset conversation ID), /transcript (retrieve transcript), /status, /retry, \
/help, /quit. Anything else is sent as a message.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputOutcome {
    /// Input consumed; keep reading
    Handled,
    /// Nothing to do (blank input or send not possible)
    Ignored,
    /// The user asked to leave
    Quit,
}

/// Handle one line typed into the composer.
pub fn handle_input(
    input: &str,
    state: &mut ClientState,
    action_tx: &Sender<ClientAction>,
) -> InputOutcome {
    let s = input.trim();
    if s.starts_with('/') {
        return handle_user_command(s, state, action_tx);
    }

    if !state.can_send(s) {
        if !s.is_empty() {
            state.log_system("Open a conversation first (/open)");
        }
        return InputOutcome::Ignored;
    }
    let _ = action_tx.send(ClientAction::SendMessage(s.to_string()));
    InputOutcome::Handled
}

/// Handle user commands starting with '/'.
pub fn handle_user_command(
    input: &str,
    state: &mut ClientState,
    action_tx: &Sender<ClientAction>,
) -> InputOutcome {
    let cmdline = input.trim().trim_start_matches('/');
    let cmd = cmdline
        .split_whitespace()
        .next()
        .unwrap_or("")
        .to_lowercase();

    match cmd.as_str() {
        "open" | "agent" => {
            let _ = action_tx.send(ClientAction::OpenConversation);
        }
        "reset" => {
            let _ = action_tx.send(ClientAction::ResetConversation);
        }
        "transcript" => {
            if state.is_open() {
                let _ = action_tx.send(ClientAction::RetrieveTranscript);
            } else {
                state.log_system("No open conversation to export");
            }
        }
        "status" => {
            if state.is_open() {
                let _ = action_tx.send(ClientAction::RefreshStatus);
            } else {
                state.log_system("No open conversation");
            }
        }
        "retry" => match state.last_failed_text().map(str::to_string) {
            Some(text) => {
                let _ = action_tx.send(ClientAction::SendMessage(text));
            }
            None => state.log_system("Nothing to retry"),
        },
        "quit" | "exit" => {
            let _ = action_tx.send(ClientAction::Shutdown);
            return InputOutcome::Quit;
        }
        "help" => {
            state.log_system(HELP_TEXT);
        }
        unknown => {
            state.log_system(format!("Unknown command: /{}", unknown));
        }
    }
    InputOutcome::Handled
}
