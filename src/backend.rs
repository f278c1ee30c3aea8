//! Conversation engine thread.
//!
//! The engine owns a Tokio runtime and the `ConversationController`. The front
//! end talks to it only through crossbeam channels: `ClientAction`s in,
//! `ClientEvent`s out. The state transition of each action is applied on the
//! dispatch loop in the order the actions arrive; only the backend round
//! trips run as tasks, so a slow fetch never blocks a reset or a send.

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, TryRecvError};
use tokio::runtime::Runtime;
use tracing::{debug, info, warn};

use crate::controller::{ConversationController, OpenOutcome, OpenTicket};
use crate::error::ClientError;
use crate::protocol::{ClientAction, ClientEvent};
use crate::sdk::MessagingSdk;
use crate::session_status::BannerText;

const ACTION_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Run the engine loop on a fresh Tokio runtime until `Shutdown` is received
/// or the action channel is closed.
pub fn run_backend(
    sdk: Arc<dyn MessagingSdk>,
    banner: BannerText,
    action_rx: Receiver<ClientAction>,
    event_tx: Sender<ClientEvent>,
) {
    let rt = match Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            let _ = event_tx.send(ClientEvent::Error(format!(
                "Failed to create Tokio runtime: {}",
                e
            )));
            return;
        }
    };

    let controller = Arc::new(ConversationController::new(sdk, banner));
    let timeline_tx = event_tx.clone();
    controller.subscribe(Box::new(move |snapshot| {
        let _ = timeline_tx.send(ClientEvent::TimelineUpdated(snapshot.clone()));
    }));

    rt.block_on(async {
        info!("conversation engine started");
        loop {
            match action_rx.try_recv() {
                Ok(ClientAction::Shutdown) => break,
                Ok(action) => {
                    debug!(?action, "dispatching action");
                    dispatch(action, &controller, &event_tx);
                }
                Err(TryRecvError::Empty) => tokio::time::sleep(ACTION_POLL_INTERVAL).await,
                Err(TryRecvError::Disconnected) => break,
            }
        }
        info!("conversation engine stopping");
    });

    // Dropping the runtime cancels in-flight tasks and feed pumps.
    drop(rt);
    let _ = event_tx.send(ClientEvent::Stopped);
}

/// Apply the synchronous half of `action` now and spawn the rest.
fn dispatch(
    action: ClientAction,
    controller: &Arc<ConversationController>,
    event_tx: &Sender<ClientEvent>,
) {
    let controller = controller.clone();
    let event_tx = event_tx.clone();
    match action {
        ClientAction::OpenConversation => {
            let ticket = controller.begin_open();
            tokio::spawn(async move {
                if let Err(err) = open(&controller, &event_tx, ticket).await {
                    report(&controller, &event_tx, err);
                }
            });
        }
        ClientAction::SendMessage(text) => match controller.stage_send(&text) {
            Ok(pending) => {
                tokio::spawn(async move {
                    match controller.deliver(pending).await {
                        Ok(id) => {
                            let _ = event_tx.send(ClientEvent::MessageSent {
                                entry_id: id.to_string(),
                            });
                        }
                        Err(err) => report(&controller, &event_tx, err),
                    }
                });
            }
            Err(err) => report(&controller, &event_tx, err),
        },
        ClientAction::ResetConversation => match controller.begin_reset() {
            Ok(ticket) => {
                tokio::spawn(async move {
                    let result = controller.finish_reset(ticket).await;
                    // The local reset has happened even if the backend refused it.
                    let _ = event_tx.send(ClientEvent::Reset);
                    if let Err(err) = result {
                        report(&controller, &event_tx, err);
                    }
                });
            }
            Err(err) => report(&controller, &event_tx, err),
        },
        ClientAction::RetrieveTranscript => {
            tokio::spawn(async move {
                match controller.retrieve_transcript().await {
                    Ok(t) => {
                        let _ = event_tx.send(ClientEvent::TranscriptReady(t));
                    }
                    Err(err) => report(&controller, &event_tx, err),
                }
            });
        }
        ClientAction::RefreshStatus => {
            tokio::spawn(async move {
                match controller.refresh_session_status().await {
                    Ok(_) => emit_status(&controller, &event_tx),
                    Err(err) => report(&controller, &event_tx, err),
                }
            });
        }
        ClientAction::Shutdown => {}
    }
}

async fn open(
    controller: &Arc<ConversationController>,
    event_tx: &Sender<ClientEvent>,
    ticket: OpenTicket,
) -> Result<(), ClientError> {
    match controller.finish_open(ticket).await? {
        OpenOutcome::Opened {
            conversation_id,
            entries,
            status,
            feed,
        } => {
            let _ = event_tx.send(ClientEvent::Opened {
                conversation_id: conversation_id.clone(),
                entries,
            });
            if status.is_some() {
                emit_status(controller, event_tx);
            } else {
                let _ = event_tx.send(ClientEvent::Info(
                    "Business hours could not be checked".to_string(),
                ));
            }
            // The pump ends by itself once the conversation is replaced.
            let pump = controller.clone();
            tokio::spawn(async move { pump.pump_feed(conversation_id, feed).await });
        }
        OpenOutcome::AlreadyFetching => {
            let _ = event_tx.send(ClientEvent::AlreadyOpening);
        }
        OpenOutcome::Refreshed { status } => {
            if status.is_some() {
                emit_status(controller, event_tx);
            }
        }
        OpenOutcome::Superseded => {
            debug!("open superseded by reset");
        }
    }
    Ok(())
}

fn emit_status(controller: &ConversationController, event_tx: &Sender<ClientEvent>) {
    let _ = event_tx.send(ClientEvent::StatusChanged {
        status: controller.current_status(),
        banner: controller.banner(),
    });
}

fn report(controller: &ConversationController, event_tx: &Sender<ClientEvent>, err: ClientError) {
    if err.is_retryable() {
        warn!(%err, phase = %controller.phase(), "operation failed");
    } else {
        debug!(%err, "operation rejected");
    }
    let _ = event_tx.send(ClientEvent::Error(err.to_string()));
}
