//! Conversation lifecycle controller.
//!
//! `ConversationController` owns the timeline and the session status gate of
//! a single conversation and drives them through
//! `Idle -> Fetching -> Active -> Resetting -> Idle`.
//!
//! All mutations go through one mutex, which is never held across an
//! `.await`. This is the serialization point between user-initiated calls and
//! entries pushed by the backend from another task. Every fetch is tagged with
//! the conversation identifier it was issued for, and results whose tag no
//! longer matches the current state are dropped.
//!
//! Opening, sending and resetting each come in two halves: a synchronous
//! `begin_*`/`stage_*` step that applies the state transition, and an async
//! step that talks to the backend. Callers that must preserve the order of
//! user actions run the first halves in order and only spawn the second.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::classify::classify_entry;
use crate::entry::{ConversationEntry, EntryId};
use crate::error::{ClientError, Result};
use crate::sdk::{ConversationId, EntryFeed, MessagingSdk, SdkError, Transcript};
use crate::send::{self, PendingSend, SendOutcome};
use crate::session_status::{Banner, BannerText, SessionStatus, SessionStatusGate};
use crate::timeline::{Observer, Snapshot, SubscriptionId, TimelineStore};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConversationPhase {
    Idle,
    Fetching,
    Active,
    Resetting,
}

impl fmt::Display for ConversationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Fetching => "fetching",
            Self::Active => "active",
            Self::Resetting => "resetting",
        };
        f.write_str(name)
    }
}

/// Result of `open_conversation`.
#[derive(Debug)]
pub enum OpenOutcome {
    /// The fetch completed and the conversation is active.
    ///
    /// `feed` carries entries pushed from the moment of subscription; hand it
    /// to [`ConversationController::pump_feed`]. `status` is `None` when the
    /// business-hours check failed.
    Opened {
        conversation_id: ConversationId,
        entries: usize,
        status: Option<SessionStatus>,
        feed: EntryFeed,
    },
    /// A fetch was already in flight; this call is satisfied by it.
    AlreadyFetching,
    /// Already active; only the business-hours status was refreshed.
    Refreshed { status: Option<SessionStatus> },
    /// The conversation was reset while the fetch was in flight; its result was dropped.
    Superseded,
}

/// Transition applied by [`ConversationController::begin_open`].
pub struct OpenTicket(OpenStep);

enum OpenStep {
    Fetch(ConversationId),
    Coalesced,
    Refresh,
    AfterReset(watch::Receiver<ConversationPhase>),
}

/// A started reset; hand it to [`ConversationController::finish_reset`].
#[must_use = "the conversation stays in the resetting phase until the reset is finished"]
#[derive(Debug)]
pub struct ResetTicket {
    previous: Option<ConversationId>,
}

struct ConversationState {
    phase: ConversationPhase,
    phase_tx: watch::Sender<ConversationPhase>,
    conversation_id: Option<ConversationId>,
    timeline: TimelineStore,
    status: SessionStatusGate,
}

impl ConversationState {
    fn set_phase(&mut self, phase: ConversationPhase) {
        self.phase = phase;
        self.phase_tx.send_replace(phase);
    }

    /// The conversation identifier, if the conversation is active.
    fn active_id(&self) -> Option<&ConversationId> {
        match self.phase {
            ConversationPhase::Active => self.conversation_id.as_ref(),
            _ => None,
        }
    }
}

pub struct ConversationController {
    sdk: Arc<dyn MessagingSdk>,
    state: Mutex<ConversationState>,
}

impl ConversationController {
    pub fn new(sdk: Arc<dyn MessagingSdk>, banner: BannerText) -> Self {
        let (phase_tx, _) = watch::channel(ConversationPhase::Idle);
        Self {
            sdk,
            state: Mutex::new(ConversationState {
                phase: ConversationPhase::Idle,
                phase_tx,
                conversation_id: None,
                timeline: TimelineStore::new(),
                status: SessionStatusGate::new(banner),
            }),
        }
    }

    /// Use a known conversation identifier for the next open instead of minting one.
    pub fn with_conversation_id(self, id: ConversationId) -> Self {
        self.lock().conversation_id = Some(id);
        self
    }

    fn lock(&self) -> MutexGuard<'_, ConversationState> {
        // A panicking observer must not wedge the conversation.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn phase(&self) -> ConversationPhase {
        self.lock().phase
    }

    pub fn conversation_id(&self) -> Option<ConversationId> {
        self.lock().conversation_id.clone()
    }

    pub fn snapshot(&self) -> Snapshot {
        self.lock().timeline.snapshot()
    }

    pub fn current_status(&self) -> SessionStatus {
        self.lock().status.current_status()
    }

    pub fn banner(&self) -> Banner {
        self.lock().status.banner()
    }

    /// Register a timeline observer.
    ///
    /// Observers run synchronously while the controller's state is locked and
    /// must not call back into the controller.
    pub fn subscribe(&self, observer: Observer) -> SubscriptionId {
        self.lock().timeline.subscribe(observer)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.lock().timeline.unsubscribe(id)
    }

    /// Open the conversation, or refresh its status if it is already open.
    ///
    /// An open issued during a reset waits for the reset to finish and then
    /// starts a fresh conversation.
    pub async fn open_conversation(&self) -> Result<OpenOutcome> {
        let ticket = self.begin_open();
        self.finish_open(ticket).await
    }

    /// Apply the phase transition of an open without waiting on the backend.
    pub fn begin_open(&self) -> OpenTicket {
        let mut state = self.lock();
        let step = match state.phase {
            ConversationPhase::Fetching => {
                debug!("open requested while fetching, coalescing");
                OpenStep::Coalesced
            }
            ConversationPhase::Resetting => {
                debug!("open requested while resetting, waiting for the reset");
                OpenStep::AfterReset(state.phase_tx.subscribe())
            }
            ConversationPhase::Active => OpenStep::Refresh,
            ConversationPhase::Idle => {
                let id = state
                    .conversation_id
                    .get_or_insert_with(ConversationId::generate)
                    .clone();
                state.set_phase(ConversationPhase::Fetching);
                OpenStep::Fetch(id)
            }
        };
        OpenTicket(step)
    }

    /// Run the backend side of an open started with [`Self::begin_open`].
    pub async fn finish_open(&self, ticket: OpenTicket) -> Result<OpenOutcome> {
        let mut step = ticket.0;
        let requested = loop {
            match step {
                OpenStep::Fetch(id) => break id,
                OpenStep::Coalesced => return Ok(OpenOutcome::AlreadyFetching),
                OpenStep::Refresh => {
                    debug!("open requested while active, refreshing session status only");
                    let status = self.refresh_session_status().await.ok();
                    return Ok(OpenOutcome::Refreshed { status });
                }
                OpenStep::AfterReset(mut phase) => {
                    let settled = phase
                        .wait_for(|p| *p != ConversationPhase::Resetting)
                        .await
                        .is_ok();
                    if !settled {
                        return Err(ClientError::state(
                            "open conversation",
                            ConversationPhase::Resetting,
                        ));
                    }
                    step = self.begin_open().0;
                }
            }
        };

        info!(conversation = %requested, "opening conversation");
        let fetched = self.fetch(&requested).await;

        let (conversation_id, entries, feed) = {
            let mut state = self.lock();
            if state.phase != ConversationPhase::Fetching
                || state.conversation_id.as_ref() != Some(&requested)
            {
                info!(
                    conversation = %requested,
                    "discarding fetch result for superseded conversation"
                );
                return Ok(OpenOutcome::Superseded);
            }

            match fetched {
                Err(err) => {
                    state.set_phase(ConversationPhase::Idle);
                    warn!(conversation = %requested, %err, "conversation fetch failed");
                    return Err(ClientError::from_sdk("open conversation", err));
                }
                Ok((canonical, history, feed)) => {
                    if canonical != requested {
                        debug!(
                            requested = %requested,
                            canonical = %canonical,
                            "backend assigned conversation id"
                        );
                    }
                    state.conversation_id = Some(canonical.clone());
                    let count = history.len();
                    for entry in history {
                        state.timeline.append(entry);
                    }
                    state.set_phase(ConversationPhase::Active);
                    info!(conversation = %canonical, entries = count, "conversation active");
                    (canonical, count, feed)
                }
            }
        };

        let status = self.refresh_session_status().await.ok();
        Ok(OpenOutcome::Opened {
            conversation_id,
            entries,
            status,
            feed,
        })
    }

    /// Open or resume, subscribe to pushes, then load history.
    ///
    /// The push subscription precedes the history read so nothing delivered in
    /// between is lost; overlaps merge by identifier.
    async fn fetch(
        &self,
        requested: &ConversationId,
    ) -> std::result::Result<(ConversationId, Vec<ConversationEntry>, EntryFeed), SdkError> {
        let canonical = self.sdk.open_or_resume_conversation(requested).await?;
        let feed = self.sdk.stream_entries(&canonical).await?;
        let history = self.sdk.fetch_entries(&canonical).await?;
        Ok((canonical, history, feed))
    }

    /// Re-run the business-hours check for the active conversation.
    ///
    /// On failure the last-known status is kept.
    pub async fn refresh_session_status(&self) -> Result<SessionStatus> {
        let id = {
            let state = self.lock();
            match state.active_id() {
                Some(id) => id.clone(),
                None => return Err(ClientError::state("refresh session status", state.phase)),
            }
        };

        let reported = self.sdk.check_business_hours(&id).await;

        let mut state = self.lock();
        if state.active_id() != Some(&id) {
            debug!(conversation = %id, "discarding business-hours result, conversation changed");
            return Err(ClientError::state("refresh session status", state.phase));
        }
        match reported {
            Ok(hours) => Ok(state.status.refresh(hours)),
            Err(err) => {
                warn!(conversation = %id, %err, "business-hours check failed, keeping last status");
                Err(ClientError::from_sdk("check business hours", err))
            }
        }
    }

    /// Send user-composed text with optimistic local echo.
    ///
    /// Returns the canonical entry identifier once the backend acknowledged
    /// it. On transport failure the entry stays in the timeline as failed.
    pub async fn send(&self, text: &str) -> Result<EntryId> {
        let pending = self.stage_send(text)?;
        self.deliver(pending).await
    }

    /// Validate `text` and append its pending entry to the timeline.
    ///
    /// Entries staged in sequence appear in the timeline in that sequence,
    /// whatever order the backend answers in.
    pub fn stage_send(&self, text: &str) -> Result<PendingSend> {
        let text = send::prepare_text(text)?;
        let mut guard = self.lock();
        let state = &mut *guard;
        let Some(id) = state.active_id().cloned() else {
            return Err(ClientError::state("send", state.phase));
        };
        Ok(send::begin_send(&mut state.timeline, &id, text))
    }

    /// Submit a staged entry and apply the backend's answer to it.
    pub async fn deliver(&self, pending: PendingSend) -> Result<EntryId> {
        let result = self
            .sdk
            .send_text(&pending.conversation_id, &pending.local_id, &pending.text)
            .await;

        let outcome = {
            let mut guard = self.lock();
            let state = &mut *guard;
            let current = state.active_id().cloned();
            send::complete_send(&mut state.timeline, current.as_ref(), pending, result)
        };

        match outcome {
            SendOutcome::Confirmed { id } => Ok(id),
            SendOutcome::Failed { error, .. } => Err(error),
            SendOutcome::Discarded { id, delivered: true } => Ok(id),
            SendOutcome::Discarded { delivered: false, .. } => Err(ClientError::transport(
                "send",
                "conversation was reset before the message was delivered",
            )),
        }
    }

    /// Apply one entry pushed by the backend.
    ///
    /// Returns false, without touching the timeline, if `conversation_id` is
    /// not the active conversation.
    pub fn receive_entry(
        &self,
        conversation_id: &ConversationId,
        entry: ConversationEntry,
    ) -> bool {
        let mut state = self.lock();
        if state.active_id() != Some(conversation_id) {
            debug!(
                conversation = %conversation_id,
                entry = %entry.identifier,
                "dropping pushed entry for inactive conversation"
            );
            return false;
        }
        let variant = classify_entry(&entry);
        debug!(entry = %entry.identifier, ?variant, "pushed entry received");
        state.timeline.append(entry);
        true
    }

    /// Forward a push feed into the timeline until it closes or the
    /// conversation is replaced. Returns the number of entries applied.
    pub async fn pump_feed(&self, conversation_id: ConversationId, mut feed: EntryFeed) -> usize {
        let mut applied = 0;
        while let Some(entry) = feed.recv().await {
            if !self.receive_entry(&conversation_id, entry) {
                break;
            }
            applied += 1;
        }
        debug!(conversation = %conversation_id, applied, "push feed finished");
        applied
    }

    /// Clear the timeline and discard the conversation identifier.
    ///
    /// The local reset always completes; an error only reports that the
    /// backend could not be told.
    pub async fn reset_conversation(&self) -> Result<()> {
        let ticket = self.begin_reset()?;
        self.finish_reset(ticket).await
    }

    /// Enter `Resetting`: clear the timeline, the status and the identifier.
    pub fn begin_reset(&self) -> Result<ResetTicket> {
        let mut state = self.lock();
        let from = state.phase;
        if from == ConversationPhase::Resetting {
            return Err(ClientError::state("reset conversation", from));
        }
        state.set_phase(ConversationPhase::Resetting);
        let id = state.conversation_id.take();
        state.timeline.reset();
        state.status.clear();
        info!(from = %from, "conversation reset");
        Ok(ResetTicket {
            previous: id.filter(|_| from != ConversationPhase::Idle),
        })
    }

    /// Tell the backend about a reset started with [`Self::begin_reset`] and
    /// return to `Idle`, whatever the backend answers.
    pub async fn finish_reset(&self, ticket: ResetTicket) -> Result<()> {
        let result = match &ticket.previous {
            Some(id) => self.sdk.reset_conversation(id).await,
            None => Ok(()),
        };

        self.lock().set_phase(ConversationPhase::Idle);

        result.map_err(|err| {
            warn!(%err, "backend reset failed");
            ClientError::from_sdk("reset conversation", err)
        })
    }

    /// Fetch the transcript of the active conversation. Does not touch the timeline.
    pub async fn retrieve_transcript(&self) -> Result<Transcript> {
        let id = {
            let state = self.lock();
            match state.active_id() {
                Some(id) => id.clone(),
                None => return Err(ClientError::state("retrieve transcript", state.phase)),
            }
        };
        self.sdk
            .fetch_transcript(&id)
            .await
            .map_err(|err| ClientError::from_sdk("retrieve transcript", err))
    }
}

impl fmt::Debug for ConversationController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("ConversationController")
            .field("phase", &state.phase)
            .field("conversation_id", &state.conversation_id)
            .field("timeline", &state.timeline)
            .finish()
    }
}
