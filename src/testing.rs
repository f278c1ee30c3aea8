//! Test doubles shared by the unit and engine tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use crate::controller::ConversationController;
use crate::entry::{ConversationEntry, EntryId};
use crate::sdk::{
    BusinessHours, ConversationId, EntryFeed, MessagingSdk, SdkError, SendAck, Transcript,
};

/// Scriptable in-memory SDK.
///
/// Calls can be held on a oneshot gate to interleave them with other
/// operations, and every call is counted.
#[derive(Default)]
pub struct MockSdk {
    history: Mutex<Vec<ConversationEntry>>,
    hours: Mutex<BusinessHours>,
    open_error: Mutex<Option<SdkError>>,
    send_error: Mutex<Option<SdkError>>,
    hours_error: Mutex<Option<SdkError>>,
    reset_error: Mutex<Option<SdkError>>,
    open_gate: Mutex<Option<oneshot::Receiver<()>>>,
    send_gate: Mutex<Option<oneshot::Receiver<()>>>,
    reset_gate: Mutex<Option<oneshot::Receiver<()>>>,
    feeds: Mutex<Vec<(ConversationId, mpsc::UnboundedSender<ConversationEntry>)>>,
    pub open_calls: AtomicUsize,
    pub send_calls: AtomicUsize,
    pub hours_calls: AtomicUsize,
    pub reset_calls: AtomicUsize,
    pub transcript_calls: AtomicUsize,
}

impl MockSdk {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_history(&self, entries: Vec<ConversationEntry>) {
        *self.history.lock().unwrap() = entries;
    }

    pub fn set_hours(&self, hours: BusinessHours) {
        *self.hours.lock().unwrap() = hours;
    }

    pub fn fail_open(&self, err: SdkError) {
        *self.open_error.lock().unwrap() = Some(err);
    }

    pub fn clear_open_failure(&self) {
        *self.open_error.lock().unwrap() = None;
    }

    pub fn fail_sends(&self, err: SdkError) {
        *self.send_error.lock().unwrap() = Some(err);
    }

    pub fn clear_send_failure(&self) {
        *self.send_error.lock().unwrap() = None;
    }

    pub fn fail_hours(&self, err: SdkError) {
        *self.hours_error.lock().unwrap() = Some(err);
    }

    pub fn fail_reset(&self, err: SdkError) {
        *self.reset_error.lock().unwrap() = Some(err);
    }

    /// Hold the next `open_or_resume_conversation` until the sender fires.
    pub fn hold_open(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.open_gate.lock().unwrap() = Some(rx);
        tx
    }

    /// Hold the next `send_text` until the sender fires.
    pub fn hold_send(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.send_gate.lock().unwrap() = Some(rx);
        tx
    }

    /// Hold the next `reset_conversation` until the sender fires.
    pub fn hold_reset(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.reset_gate.lock().unwrap() = Some(rx);
        tx
    }

    /// Deliver an entry to every subscriber of `id`.
    pub fn push(&self, id: &ConversationId, entry: ConversationEntry) {
        let feeds = self.feeds.lock().unwrap();
        for (_, tx) in feeds.iter().filter(|(conv, _)| conv == id) {
            let _ = tx.send(entry.clone());
        }
    }
}

#[async_trait]
impl MessagingSdk for MockSdk {
    async fn open_or_resume_conversation(
        &self,
        requested: &ConversationId,
    ) -> Result<ConversationId, SdkError> {
        self.open_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.open_gate.lock().unwrap().take();
        if let Some(rx) = gate {
            let _ = rx.await;
        }
        match self.open_error.lock().unwrap().clone() {
            Some(err) => Err(err),
            None => Ok(requested.clone()),
        }
    }

    async fn fetch_entries(
        &self,
        _id: &ConversationId,
    ) -> Result<Vec<ConversationEntry>, SdkError> {
        Ok(self.history.lock().unwrap().clone())
    }

    async fn stream_entries(&self, id: &ConversationId) -> Result<EntryFeed, SdkError> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.feeds.lock().unwrap().push((id.clone(), tx));
        Ok(rx)
    }

    async fn send_text(
        &self,
        _id: &ConversationId,
        local_id: &EntryId,
        _text: &str,
    ) -> Result<SendAck, SdkError> {
        self.send_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.send_gate.lock().unwrap().take();
        if let Some(rx) = gate {
            let _ = rx.await;
        }
        match self.send_error.lock().unwrap().clone() {
            Some(err) => Err(err),
            None => Ok(SendAck {
                assigned_id: local_id.clone(),
            }),
        }
    }

    async fn check_business_hours(&self, _id: &ConversationId) -> Result<BusinessHours, SdkError> {
        self.hours_calls.fetch_add(1, Ordering::SeqCst);
        match self.hours_error.lock().unwrap().clone() {
            Some(err) => Err(err),
            None => Ok(*self.hours.lock().unwrap()),
        }
    }

    async fn reset_conversation(&self, _id: &ConversationId) -> Result<(), SdkError> {
        self.reset_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.reset_gate.lock().unwrap().take();
        if let Some(rx) = gate {
            let _ = rx.await;
        }
        match self.reset_error.lock().unwrap().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn fetch_transcript(&self, id: &ConversationId) -> Result<Transcript, SdkError> {
        self.transcript_calls.fetch_add(1, Ordering::SeqCst);
        Ok(Transcript {
            conversation_id: id.clone(),
            content_type: "text/plain".to_string(),
            data: b"transcript".to_vec(),
        })
    }
}

/// Count timeline notifications delivered by `controller`.
pub fn counting_observer(controller: &ConversationController) -> Arc<AtomicUsize> {
    let count = Arc::new(AtomicUsize::new(0));
    let seen = count.clone();
    controller.subscribe(Box::new(move |_| {
        seen.fetch_add(1, Ordering::SeqCst);
    }));
    count
}

/// Poll `condition` until it holds, failing the test after two seconds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        assert!(tokio::time::Instant::now() < deadline, "condition not reached in time");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
