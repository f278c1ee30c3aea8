//! In-process messaging backend.
//!
//! Keeps conversations in memory, echoes every sent message back through the
//! push feed and answers it with a short chatbot reply. Used by the binary when
//! no remote service is wired in, and by the engine tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc::{self, UnboundedSender};
use tracing::{debug, info};

use super::{BusinessHours, ConversationId, EntryFeed, MessagingSdk, SdkError, SendAck, Transcript};
use crate::entry::{ConversationEntry, EntryId, EntryType, ParticipantRole};

#[derive(Clone, Debug)]
pub struct LoopbackOptions {
    pub hours: BusinessHours,
    pub agent_name: String,
    /// Delay before the typing indicator; the reply follows after the same delay again
    pub reply_delay: Duration,
}

impl Default for LoopbackOptions {
    fn default() -> Self {
        Self {
            hours: BusinessHours::default(),
            agent_name: "Assistant".to_string(),
            reply_delay: Duration::from_millis(600),
        }
    }
}

#[derive(Default)]
struct LoopbackConversation {
    entries: Vec<ConversationEntry>,
    feeds: Vec<UnboundedSender<ConversationEntry>>,
}

impl LoopbackConversation {
    fn publish(&mut self, entry: ConversationEntry) {
        self.feeds.retain(|tx| tx.send(entry.clone()).is_ok());
        self.entries.push(entry);
    }
}

type Conversations = Arc<Mutex<HashMap<ConversationId, LoopbackConversation>>>;

pub struct LoopbackSdk {
    options: LoopbackOptions,
    conversations: Conversations,
}

impl LoopbackSdk {
    pub fn new(options: LoopbackOptions) -> Self {
        Self {
            options,
            conversations: Arc::default(),
        }
    }

    fn with_conversation<T>(
        &self,
        id: &ConversationId,
        f: impl FnOnce(&mut LoopbackConversation) -> T,
    ) -> Result<T, SdkError> {
        let mut conversations = lock(&self.conversations);
        match conversations.get_mut(id) {
            Some(conversation) => Ok(f(conversation)),
            None => Err(SdkError::UnknownConversation(id.clone())),
        }
    }

    fn greeting(&self) -> Vec<ConversationEntry> {
        vec![
            ConversationEntry::system(EntryId::generate(), EntryType::ParticipantChanged),
            ConversationEntry::text(
                EntryId::generate(),
                ParticipantRole::Chatbot,
                "Hello! How can I help you today?",
            )
            .with_display_name(self.options.agent_name.clone()),
        ]
    }

    fn schedule_reply(&self, id: ConversationId, text: String) {
        let conversations = self.conversations.clone();
        let delay = self.options.reply_delay;
        let agent = self.options.agent_name.clone();

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let typing = ConversationEntry::system(EntryId::generate(), EntryType::TypingIndicator);
            if !publish(&conversations, &id, typing) {
                return;
            }

            tokio::time::sleep(delay).await;
            let reply = ConversationEntry::text(
                EntryId::generate(),
                ParticipantRole::Chatbot,
                format!("You said: {}", text),
            )
            .with_display_name(agent);
            publish(&conversations, &id, reply);
        });
    }
}

impl Default for LoopbackSdk {
    fn default() -> Self {
        Self::new(LoopbackOptions::default())
    }
}

fn lock(
    conversations: &Conversations,
) -> MutexGuard<'_, HashMap<ConversationId, LoopbackConversation>> {
    conversations.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Returns false if the conversation no longer exists.
fn publish(conversations: &Conversations, id: &ConversationId, entry: ConversationEntry) -> bool {
    match lock(conversations).get_mut(id) {
        Some(conversation) => {
            conversation.publish(entry);
            true
        }
        None => false,
    }
}

#[async_trait]
impl MessagingSdk for LoopbackSdk {
    async fn open_or_resume_conversation(
        &self,
        requested: &ConversationId,
    ) -> Result<ConversationId, SdkError> {
        let mut conversations = lock(&self.conversations);
        if !conversations.contains_key(requested) {
            info!(conversation = %requested, "loopback conversation created");
            let conversation = LoopbackConversation {
                entries: self.greeting(),
                feeds: Vec::new(),
            };
            conversations.insert(requested.clone(), conversation);
        }
        Ok(requested.clone())
    }

    async fn fetch_entries(&self, id: &ConversationId) -> Result<Vec<ConversationEntry>, SdkError> {
        self.with_conversation(id, |c| c.entries.clone())
    }

    async fn stream_entries(&self, id: &ConversationId) -> Result<EntryFeed, SdkError> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.with_conversation(id, |c| c.feeds.push(tx))?;
        Ok(rx)
    }

    async fn send_text(
        &self,
        id: &ConversationId,
        local_id: &EntryId,
        text: &str,
    ) -> Result<SendAck, SdkError> {
        let echo = ConversationEntry::text(local_id.clone(), ParticipantRole::User, text);
        self.with_conversation(id, |c| c.publish(echo))?;
        debug!(conversation = %id, entry = %local_id, "loopback accepted message");
        self.schedule_reply(id.clone(), text.to_string());
        Ok(SendAck {
            assigned_id: local_id.clone(),
        })
    }

    async fn check_business_hours(&self, id: &ConversationId) -> Result<BusinessHours, SdkError> {
        self.with_conversation(id, |_| self.options.hours)
    }

    async fn reset_conversation(&self, id: &ConversationId) -> Result<(), SdkError> {
        // Dropping the conversation closes its feeds.
        if lock(&self.conversations).remove(id).is_some() {
            info!(conversation = %id, "loopback conversation removed");
        }
        Ok(())
    }

    async fn fetch_transcript(&self, id: &ConversationId) -> Result<Transcript, SdkError> {
        let body = self.with_conversation(id, |c| {
            c.entries
                .iter()
                .filter_map(|entry| {
                    entry.text_body().map(|text| {
                        format!(
                            "[{}] {}: {}\n",
                            entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
                            entry.role().as_str(),
                            text
                        )
                    })
                })
                .collect::<String>()
        })?;
        Ok(Transcript {
            conversation_id: id.clone(),
            content_type: "text/plain".to_string(),
            data: body.into_bytes(),
        })
    }
}
