//! Outbound send pipeline with optimistic local echo.
//!
//! A send is split in two halves around the backend call so that the
//! timeline lock is never held while the network request is in flight:
//! [`begin_send`] appends a pending entry immediately, [`complete_send`]
//! applies the backend's answer to that same entry. Each [`PendingSend`] owns
//! exactly one entry's state transitions and is consumed on completion.

use tracing::{debug, info, warn};

use crate::entry::{ConversationEntry, EntryId, SendState};
use crate::error::{ClientError, Result};
use crate::sdk::{ConversationId, SdkError, SendAck};
use crate::timeline::{TimelineStore, UpdateOutcome};
use crate::validation;

/// An optimistic entry awaiting the backend's answer.
#[derive(Debug)]
pub struct PendingSend {
    pub local_id: EntryId,
    pub conversation_id: ConversationId,
    pub text: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SendOutcome {
    /// Acknowledged; the entry now carries the canonical identifier
    Confirmed { id: EntryId },
    /// Rejected or not delivered; the entry stays visible as failed
    Failed { id: EntryId, error: ClientError },
    /// The conversation was reset before the answer arrived
    Discarded { id: EntryId, delivered: bool },
}

/// Validate user-composed text. Rejections have no side effect.
pub fn prepare_text(text: &str) -> Result<String> {
    validation::prepare_outbound(text).map_err(ClientError::validation)
}

/// Append the optimistic `Pending` entry and hand back its ownership token.
pub fn begin_send(
    timeline: &mut TimelineStore,
    conversation_id: &ConversationId,
    text: String,
) -> PendingSend {
    let local_id = EntryId::generate();
    timeline.append(ConversationEntry::outbound(local_id.clone(), text.clone()));
    debug!(entry = %local_id, conversation = %conversation_id, "optimistic entry appended");
    PendingSend {
        local_id,
        conversation_id: conversation_id.clone(),
        text,
    }
}

/// Apply the backend's answer to the entry owned by `pending`.
///
/// `current` is the conversation the timeline belongs to now; an answer for
/// any other conversation is dropped without touching the timeline.
pub fn complete_send(
    timeline: &mut TimelineStore,
    current: Option<&ConversationId>,
    pending: PendingSend,
    result: std::result::Result<SendAck, SdkError>,
) -> SendOutcome {
    let PendingSend {
        local_id,
        conversation_id,
        ..
    } = pending;

    if current != Some(&conversation_id) {
        debug!(entry = %local_id, "send answer arrived after reset, discarding");
        return SendOutcome::Discarded {
            id: local_id,
            delivered: result.is_ok(),
        };
    }

    match result {
        Ok(ack) => confirm(timeline, local_id, ack),
        Err(err) => {
            let error = ClientError::from_sdk("send", err);
            warn!(entry = %local_id, %error, "send failed");
            match timeline.update(&local_id, |e| e.send_state = Some(SendState::Failed)) {
                UpdateOutcome::Missing => SendOutcome::Discarded {
                    id: local_id,
                    delivered: false,
                },
                _ => SendOutcome::Failed { id: local_id, error },
            }
        }
    }
}

fn confirm(timeline: &mut TimelineStore, local_id: EntryId, ack: SendAck) -> SendOutcome {
    let assigned = ack.assigned_id;
    let outcome = timeline.update(&local_id, |e| {
        e.send_state = Some(SendState::Confirmed);
        e.identifier = assigned.clone();
    });

    match outcome {
        UpdateOutcome::Updated { .. } => {
            info!(entry = %assigned, "send confirmed");
            SendOutcome::Confirmed { id: assigned }
        }
        UpdateOutcome::Missing => SendOutcome::Discarded {
            id: local_id,
            delivered: true,
        },
        UpdateOutcome::Conflict => {
            // The pushed copy already sits under the canonical identifier.
            debug!(local = %local_id, canonical = %assigned, "server copy arrived before ack");
            match timeline.merge_duplicate(&local_id, &assigned) {
                UpdateOutcome::Missing => SendOutcome::Discarded {
                    id: local_id,
                    delivered: true,
                },
                _ => SendOutcome::Confirmed { id: assigned },
            }
        }
    }
}
