//! Engine thread tests: actions in, events out, over real crossbeam channels

use crossbeam_channel::{unbounded, Receiver, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::protocol::{ClientAction, ClientEvent};
use crate::sdk::loopback::{LoopbackOptions, LoopbackSdk};
use crate::sdk::{BusinessHours, MessagingSdk, SdkError};
use crate::session_status::BannerText;
use crate::testing::MockSdk;

fn start(
    sdk: Arc<dyn MessagingSdk>,
) -> (Sender<ClientAction>, Receiver<ClientEvent>, JoinHandle<()>) {
    let (action_tx, action_rx) = unbounded::<ClientAction>();
    let (event_tx, event_rx) = unbounded::<ClientEvent>();
    let handle = std::thread::spawn(move || {
        crate::backend::run_backend(sdk, BannerText::default(), action_rx, event_tx);
    });
    (action_tx, event_rx, handle)
}

fn loopback(hours: BusinessHours) -> Arc<dyn MessagingSdk> {
    Arc::new(LoopbackSdk::new(LoopbackOptions {
        hours,
        reply_delay: Duration::from_millis(10),
        ..LoopbackOptions::default()
    }))
}

/// Receive events until one matches, failing after a few seconds.
fn wait_for(rx: &Receiver<ClientEvent>, mut pred: impl FnMut(&ClientEvent) -> bool) -> ClientEvent {
    let deadline = Instant::now() + Duration::from_secs(3);
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match rx.recv_timeout(remaining) {
            Ok(event) if pred(&event) => return event,
            Ok(_) => continue,
            Err(e) => panic!("expected event not received: {}", e),
        }
    }
}

fn error_text(event: ClientEvent) -> String {
    match event {
        ClientEvent::Error(msg) => msg,
        other => panic!("expected error, got {:?}", other),
    }
}

#[test]
fn test_engine_stops_on_shutdown() {
    let (action_tx, event_rx, handle) = start(loopback(BusinessHours::default()));
    action_tx.send(ClientAction::Shutdown).unwrap();
    wait_for(&event_rx, |e| matches!(e, ClientEvent::Stopped));
    handle.join().unwrap();
}

#[test]
fn test_engine_stops_when_front_end_goes_away() {
    let (action_tx, event_rx, handle) = start(loopback(BusinessHours::default()));
    drop(action_tx);
    wait_for(&event_rx, |e| matches!(e, ClientEvent::Stopped));
    handle.join().unwrap();
}

#[test]
fn test_open_emits_history_and_banner() {
    let (action_tx, event_rx, _handle) = start(loopback(BusinessHours {
        within_hours: true,
        configured: true,
    }));
    action_tx.send(ClientAction::OpenConversation).unwrap();

    match wait_for(&event_rx, |e| matches!(e, ClientEvent::Opened { .. })) {
        ClientEvent::Opened { entries, .. } => assert_eq!(entries, 2),
        _ => unreachable!(),
    }
    match wait_for(&event_rx, |e| matches!(e, ClientEvent::StatusChanged { .. })) {
        ClientEvent::StatusChanged { status, banner } => {
            assert!(status.within_business_hours);
            assert!(banner.visible);
            assert_eq!(banner.message, "You are within business hours");
        }
        _ => unreachable!(),
    }
    action_tx.send(ClientAction::Shutdown).unwrap();
}

#[test]
fn test_send_round_trip_through_loopback() {
    let (action_tx, event_rx, _handle) = start(loopback(BusinessHours::default()));
    action_tx.send(ClientAction::OpenConversation).unwrap();
    wait_for(&event_rx, |e| matches!(e, ClientEvent::Opened { .. }));

    action_tx.send(ClientAction::SendMessage("ping".into())).unwrap();
    let event = wait_for(&event_rx, |e| match e {
        ClientEvent::TimelineUpdated(snapshot) => snapshot
            .last()
            .and_then(|entry| entry.text_body())
            .map_or(false, |text| text == "You said: ping"),
        _ => false,
    });

    let ClientEvent::TimelineUpdated(snapshot) = event else {
        unreachable!()
    };
    let user_entries: Vec<_> = snapshot
        .iter()
        .filter(|e| e.role() == crate::entry::ParticipantRole::User)
        .collect();
    assert_eq!(user_entries.len(), 1);
    assert_eq!(
        user_entries[0].send_state,
        Some(crate::entry::SendState::Confirmed)
    );
    action_tx.send(ClientAction::Shutdown).unwrap();
}

#[test]
fn test_transcript_before_open_is_rejected() {
    let (action_tx, event_rx, _handle) = start(loopback(BusinessHours::default()));
    action_tx.send(ClientAction::RetrieveTranscript).unwrap();
    let msg = error_text(wait_for(&event_rx, |e| matches!(e, ClientEvent::Error(_))));
    assert_eq!(msg, "Cannot retrieve transcript while idle");
    action_tx.send(ClientAction::Shutdown).unwrap();
}

#[test]
fn test_blank_send_is_rejected() {
    let (action_tx, event_rx, _handle) = start(loopback(BusinessHours::default()));
    action_tx.send(ClientAction::SendMessage("   ".into())).unwrap();
    let msg = error_text(wait_for(&event_rx, |e| matches!(e, ClientEvent::Error(_))));
    assert_eq!(msg, "Validation error: Message cannot be empty");
    action_tx.send(ClientAction::Shutdown).unwrap();
}

#[test]
fn test_reset_clears_timeline() {
    let (action_tx, event_rx, _handle) = start(loopback(BusinessHours::default()));
    action_tx.send(ClientAction::OpenConversation).unwrap();
    wait_for(&event_rx, |e| matches!(e, ClientEvent::Opened { .. }));

    action_tx.send(ClientAction::ResetConversation).unwrap();
    wait_for(&event_rx, |e| matches!(e, ClientEvent::TimelineUpdated(s) if s.is_empty()));
    wait_for(&event_rx, |e| matches!(e, ClientEvent::Reset));

    action_tx.send(ClientAction::RetrieveTranscript).unwrap();
    let msg = error_text(wait_for(&event_rx, |e| matches!(e, ClientEvent::Error(_))));
    assert!(msg.starts_with("Cannot retrieve transcript"));
    action_tx.send(ClientAction::Shutdown).unwrap();
}

#[test]
fn test_fetch_failure_is_reported() {
    let sdk = Arc::new(MockSdk::new());
    sdk.fail_open(SdkError::Unavailable("offline".into()));
    let (action_tx, event_rx, _handle) = start(sdk);

    action_tx.send(ClientAction::OpenConversation).unwrap();
    let msg = error_text(wait_for(&event_rx, |e| matches!(e, ClientEvent::Error(_))));
    assert_eq!(
        msg,
        "Transport error during open conversation: Backend unavailable: offline"
    );
    action_tx.send(ClientAction::Shutdown).unwrap();
}

#[test]
fn test_transcript_is_delivered() {
    let (action_tx, event_rx, _handle) = start(loopback(BusinessHours::default()));
    action_tx.send(ClientAction::OpenConversation).unwrap();
    let opened = wait_for(&event_rx, |e| matches!(e, ClientEvent::Opened { .. }));
    let ClientEvent::Opened { conversation_id, .. } = opened else {
        unreachable!()
    };

    action_tx.send(ClientAction::RetrieveTranscript).unwrap();
    match wait_for(&event_rx, |e| matches!(e, ClientEvent::TranscriptReady(_))) {
        ClientEvent::TranscriptReady(transcript) => {
            assert_eq!(transcript.conversation_id, conversation_id);
            assert_eq!(transcript.content_type, "text/plain");
        }
        _ => unreachable!(),
    }
    action_tx.send(ClientAction::Shutdown).unwrap();
}

fn opened_id(event: ClientEvent) -> crate::sdk::ConversationId {
    match event {
        ClientEvent::Opened { conversation_id, .. } => conversation_id,
        other => panic!("expected open, got {:?}", other),
    }
}

fn no_errors(event: &ClientEvent) {
    if let ClientEvent::Error(msg) = event {
        panic!("unexpected error: {}", msg);
    }
}

#[test]
fn test_reset_then_open_while_backend_reset_is_slow() {
    let sdk = Arc::new(MockSdk::new());
    let (action_tx, event_rx, _handle) = start(sdk.clone());
    action_tx.send(ClientAction::OpenConversation).unwrap();
    let first = opened_id(wait_for(&event_rx, |e| matches!(e, ClientEvent::Opened { .. })));

    let release = sdk.hold_reset();
    action_tx.send(ClientAction::ResetConversation).unwrap();
    action_tx.send(ClientAction::OpenConversation).unwrap();
    std::thread::sleep(Duration::from_millis(150));
    release.send(()).unwrap();

    // The reopen may overtake the Reset notification; both must arrive.
    let mut saw_reset = false;
    let second = opened_id(wait_for(&event_rx, |e| {
        no_errors(e);
        saw_reset |= matches!(e, ClientEvent::Reset);
        matches!(e, ClientEvent::Opened { .. })
    }));
    if !saw_reset {
        wait_for(&event_rx, |e| matches!(e, ClientEvent::Reset));
    }
    assert_ne!(first, second);
    action_tx.send(ClientAction::Shutdown).unwrap();
}

#[test]
fn test_back_to_back_sends_keep_order() {
    let sdk = Arc::new(MockSdk::new());
    let (action_tx, event_rx, _handle) = start(sdk);
    action_tx.send(ClientAction::OpenConversation).unwrap();
    wait_for(&event_rx, |e| matches!(e, ClientEvent::Opened { .. }));

    let words = ["one", "two", "three", "four", "five"];
    for word in words {
        action_tx.send(ClientAction::SendMessage(word.into())).unwrap();
    }
    let event = wait_for(&event_rx, |e| match e {
        ClientEvent::TimelineUpdated(snapshot) => {
            snapshot.len() == words.len()
                && snapshot
                    .iter()
                    .all(|e| e.send_state == Some(crate::entry::SendState::Confirmed))
        }
        _ => false,
    });
    let ClientEvent::TimelineUpdated(snapshot) = event else {
        unreachable!()
    };
    let texts: Vec<_> = snapshot.iter().filter_map(|e| e.text_body()).collect();
    assert_eq!(texts, words);
    action_tx.send(ClientAction::Shutdown).unwrap();
}

#[test]
fn test_failed_backend_reset_still_closes_front_end() {
    let sdk = Arc::new(MockSdk::new());
    sdk.fail_reset(SdkError::Unavailable("offline".into()));
    let (action_tx, event_rx, _handle) = start(sdk);
    let mut state = crate::state::ClientState::new(None);

    action_tx.send(ClientAction::OpenConversation).unwrap();
    let opened = wait_for(&event_rx, |e| matches!(e, ClientEvent::Opened { .. }));
    crate::events::process_event(opened, &mut state);
    assert!(state.can_send("hi"));

    action_tx.send(ClientAction::ResetConversation).unwrap();
    let reset = wait_for(&event_rx, |e| {
        no_errors(e);
        matches!(e, ClientEvent::Reset)
    });
    crate::events::process_event(reset, &mut state);
    let msg = error_text(wait_for(&event_rx, |e| matches!(e, ClientEvent::Error(_))));
    assert_eq!(
        msg,
        "Transport error during reset conversation: Backend unavailable: offline"
    );
    assert!(!state.is_open());
    assert!(!state.can_send("hi"));
    action_tx.send(ClientAction::Shutdown).unwrap();
}
