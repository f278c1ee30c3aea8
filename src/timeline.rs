//! Ordered, observable log of conversation entries.
//!
//! Order is insertion order as observed by the client. Re-delivery of an
//! identifier already in the log updates that entry where it stands; nothing
//! is ever reordered. Every committed mutation synchronously notifies each
//! subscriber with the new snapshot, one callback per mutation.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::entry::{ConversationEntry, EntryId, SendState};

/// Immutable view of the timeline at one point in time.
pub type Snapshot = Arc<Vec<ConversationEntry>>;

/// Callback invoked after every committed mutation.
pub type Observer = Box<dyn FnMut(&Snapshot) + Send>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AppendOutcome {
    Appended { index: usize },
    Updated { index: usize },
}

impl AppendOutcome {
    pub fn index(&self) -> usize {
        match self {
            Self::Appended { index } | Self::Updated { index } => *index,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdateOutcome {
    Updated { index: usize },
    /// No entry with that identifier (e.g. the timeline was reset meanwhile)
    Missing,
    /// The closure tried to re-key onto an identifier held by another entry;
    /// the change was discarded.
    Conflict,
}

#[derive(Default)]
pub struct TimelineStore {
    entries: Snapshot,
    index: HashMap<EntryId, usize>,
    observers: Vec<(SubscriptionId, Observer)>,
    next_subscription: u64,
}

impl TimelineStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry, or merge it into the existing entry with the same identifier.
    ///
    /// A backend copy of a locally-originated entry confirms it: the entry
    /// keeps its local origin and moves to `Confirmed`.
    pub fn append(&mut self, mut entry: ConversationEntry) -> AppendOutcome {
        let outcome = match self.index.get(&entry.identifier).copied() {
            Some(index) => {
                let entries = Arc::make_mut(&mut self.entries);
                let existing = &mut entries[index];
                if existing.is_local() && !entry.is_local() {
                    entry.send_state = Some(SendState::Confirmed);
                }
                *existing = entry;
                AppendOutcome::Updated { index }
            }
            None => {
                let entries = Arc::make_mut(&mut self.entries);
                let index = entries.len();
                self.index.insert(entry.identifier.clone(), index);
                entries.push(entry);
                AppendOutcome::Appended { index }
            }
        };
        self.notify();
        outcome
    }

    /// Mutate the entry with the given identifier in place.
    ///
    /// The closure may change the entry's identifier; the index follows it as
    /// long as the new identifier is not already taken.
    pub fn update<F>(&mut self, id: &EntryId, f: F) -> UpdateOutcome
    where
        F: FnOnce(&mut ConversationEntry),
    {
        let Some(index) = self.index.get(id).copied() else {
            return UpdateOutcome::Missing;
        };

        let mut updated = self.entries[index].clone();
        f(&mut updated);

        if updated.identifier != *id {
            if self.index.contains_key(&updated.identifier) {
                warn!(
                    old = %id,
                    new = %updated.identifier,
                    "refusing to re-key timeline entry onto an existing identifier"
                );
                return UpdateOutcome::Conflict;
            }
            self.index.remove(id);
            self.index.insert(updated.identifier.clone(), index);
        }

        Arc::make_mut(&mut self.entries)[index] = updated;
        self.notify();
        UpdateOutcome::Updated { index }
    }

    /// Fold two copies of one message into a single entry.
    ///
    /// The entry holding `canonical` (the backend copy) replaces the entry at
    /// `local`'s position, confirmed, and its own slot is removed. Relative
    /// order of every other entry is unchanged. Subscribers are notified once.
    pub fn merge_duplicate(&mut self, local: &EntryId, canonical: &EntryId) -> UpdateOutcome {
        let (Some(keep), Some(dropped)) = (self.position(local), self.position(canonical)) else {
            return UpdateOutcome::Missing;
        };
        if keep == dropped {
            return UpdateOutcome::Updated { index: keep };
        }

        let entries = Arc::make_mut(&mut self.entries);
        let mut server_copy = entries.remove(dropped);
        server_copy.send_state = Some(SendState::Confirmed);
        let keep = if dropped < keep { keep - 1 } else { keep };
        entries[keep] = server_copy;
        self.reindex();
        self.notify();
        UpdateOutcome::Updated { index: keep }
    }

    pub fn snapshot(&self) -> Snapshot {
        Arc::clone(&self.entries)
    }

    pub fn get(&self, id: &EntryId) -> Option<&ConversationEntry> {
        self.index.get(id).map(|&i| &self.entries[i])
    }

    pub fn position(&self, id: &EntryId) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn contains(&self, id: &EntryId) -> bool {
        self.index.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Register an observer. It is not called until the next mutation.
    pub fn subscribe(&mut self, observer: Observer) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.observers.push((id, observer));
        debug!(subscribers = self.observers.len(), "timeline observer added");
        id
    }

    /// Remove an observer. Returns false if it was not registered.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(sid, _)| *sid != id);
        let removed = self.observers.len() != before;
        if removed {
            debug!(subscribers = self.observers.len(), "timeline observer removed");
        }
        removed
    }

    pub fn subscriber_count(&self) -> usize {
        self.observers.len()
    }

    /// Drop every entry and notify subscribers with an empty snapshot.
    pub fn reset(&mut self) {
        self.entries = Arc::new(Vec::new());
        self.index.clear();
        self.notify();
    }

    fn reindex(&mut self) {
        self.index = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.identifier.clone(), i))
            .collect();
    }

    fn notify(&mut self) {
        let snapshot = self.snapshot();
        for (_, observer) in self.observers.iter_mut() {
            observer(&snapshot);
        }
    }
}

impl fmt::Debug for TimelineStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimelineStore")
            .field("entries", &self.entries.len())
            .field("subscribers", &self.observers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::ParticipantRole;
    use std::sync::Mutex;

    fn text(id: &str, body: &str) -> ConversationEntry {
        ConversationEntry::text(id, ParticipantRole::Agent, body)
    }

    fn ids(snapshot: &Snapshot) -> Vec<String> {
        snapshot.iter().map(|e| e.identifier.to_string()).collect()
    }

    fn recorder(store: &mut TimelineStore) -> (SubscriptionId, Arc<Mutex<Vec<Vec<String>>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let id = store.subscribe(Box::new(move |snap: &Snapshot| {
            sink.lock().unwrap().push(ids(snap));
        }));
        (id, seen)
    }

    #[test]
    fn test_snapshot_order_matches_append_order() {
        let mut store = TimelineStore::new();
        let order = ["e5", "e1", "e9", "e3", "e2"];
        for id in order {
            store.append(text(id, "x"));
        }
        assert_eq!(ids(&store.snapshot()), order);
    }

    #[test]
    fn test_reappend_updates_in_place() {
        let mut store = TimelineStore::new();
        store.append(text("a", "first"));
        store.append(text("b", "second"));
        store.append(text("c", "third"));

        let outcome = store.append(text("b", "second, edited"));
        assert_eq!(outcome, AppendOutcome::Updated { index: 1 });
        assert_eq!(store.len(), 3);
        assert_eq!(ids(&store.snapshot()), ["a", "b", "c"]);
        assert_eq!(
            store.get(&"b".into()).and_then(|e| e.text_body()),
            Some("second, edited")
        );
    }

    #[test]
    fn test_backend_copy_confirms_local_entry() {
        let mut store = TimelineStore::new();
        store.append(ConversationEntry::outbound("local-1".into(), "hello"));
        store.append(text("other", "x"));

        store.append(ConversationEntry::text("local-1", ParticipantRole::User, "hello"));
        let entry = store.get(&"local-1".into()).unwrap();
        assert_eq!(entry.send_state, Some(SendState::Confirmed));
        assert_eq!(store.position(&"local-1".into()), Some(0));
    }

    #[test]
    fn test_held_snapshot_is_not_mutated() {
        let mut store = TimelineStore::new();
        store.append(text("a", "x"));
        let held = store.snapshot();
        store.append(text("b", "y"));
        store.update(&"a".into(), |e| e.send_state = Some(SendState::Failed));
        assert_eq!(held.len(), 1);
        assert_eq!(held[0].send_state, None);
    }

    #[test]
    fn test_one_notification_per_mutation() {
        let mut store = TimelineStore::new();
        let (_, seen) = recorder(&mut store);
        for i in 0..5 {
            store.append(text(&format!("e{i}"), "x"));
        }
        store.append(text("e2", "again"));
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 6);
        assert_eq!(seen[0], ["e0"]);
        assert_eq!(seen[4], ["e0", "e1", "e2", "e3", "e4"]);
    }

    #[test]
    fn test_update_rekeys_entry() {
        let mut store = TimelineStore::new();
        store.append(ConversationEntry::outbound("local".into(), "hi"));
        store.append(text("z", "x"));
        let outcome = store.update(&"local".into(), |e| {
            e.identifier = "server-7".into();
            e.send_state = Some(SendState::Confirmed);
        });
        assert_eq!(outcome, UpdateOutcome::Updated { index: 0 });
        assert!(!store.contains(&"local".into()));
        assert_eq!(store.position(&"server-7".into()), Some(0));

        // A later re-delivery of the server copy merges rather than appends.
        store.append(ConversationEntry::text("server-7", ParticipantRole::User, "hi"));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_update_conflict_and_missing() {
        let mut store = TimelineStore::new();
        store.append(text("a", "x"));
        store.append(text("b", "y"));
        let (_, seen) = recorder(&mut store);

        let outcome = store.update(&"a".into(), |e| e.identifier = "b".into());
        assert_eq!(outcome, UpdateOutcome::Conflict);
        assert_eq!(ids(&store.snapshot()), ["a", "b"]);

        assert_eq!(store.update(&"nope".into(), |_| {}), UpdateOutcome::Missing);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_merge_duplicate_keeps_local_position() {
        let mut store = TimelineStore::new();
        store.append(text("a", "x"));
        store.append(ConversationEntry::outbound("local".into(), "hi"));
        store.append(text("b", "y"));
        store.append(ConversationEntry::text("srv-9", ParticipantRole::User, "hi"));
        store.append(text("c", "z"));
        let (_, seen) = recorder(&mut store);

        let outcome = store.merge_duplicate(&"local".into(), &"srv-9".into());
        assert_eq!(outcome, UpdateOutcome::Updated { index: 1 });
        assert_eq!(ids(&store.snapshot()), ["a", "srv-9", "b", "c"]);
        assert_eq!(
            store.get(&"srv-9".into()).unwrap().send_state,
            Some(SendState::Confirmed)
        );
        assert!(!store.contains(&"local".into()));
        assert_eq!(store.position(&"c".into()), Some(3));
        assert_eq!(seen.lock().unwrap().len(), 1);

        assert_eq!(
            store.merge_duplicate(&"gone".into(), &"srv-9".into()),
            UpdateOutcome::Missing
        );
    }

    #[test]
    fn test_reset_notifies_empty_snapshot() {
        let mut store = TimelineStore::new();
        store.append(text("a", "x"));
        let (_, seen) = recorder(&mut store);
        store.reset();
        assert!(store.is_empty());
        assert_eq!(seen.lock().unwrap().last().unwrap().len(), 0);

        // Identifiers are free again after reset.
        assert_eq!(store.append(text("a", "x")), AppendOutcome::Appended { index: 0 });
    }

    #[test]
    fn test_unsubscribe_stops_notifications() {
        let mut store = TimelineStore::new();
        let (sub, seen) = recorder(&mut store);
        store.append(text("a", "x"));
        assert!(store.unsubscribe(sub));
        assert!(!store.unsubscribe(sub));
        store.append(text("b", "x"));
        assert_eq!(seen.lock().unwrap().len(), 1);
        assert_eq!(store.subscriber_count(), 0);
    }
}
