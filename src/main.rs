//! msgcore-client - terminal front end for the conversation engine
//!
//! Architecture:
//! - Main thread: prints the timeline and system lines, dispatches composer input
//! - Input thread: blocking stdin reader
//! - Engine thread: runs a Tokio runtime driving the conversation controller
//! - Communication via crossbeam channels

use std::io::{self, BufRead};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{select, unbounded};

use msgcore_client::backend;
use msgcore_client::commands::{self, InputOutcome};
use msgcore_client::config;
use msgcore_client::events;
use msgcore_client::logging::{self, Logger};
use msgcore_client::protocol::{ClientAction, ClientEvent};
use msgcore_client::sdk::loopback::{LoopbackOptions, LoopbackSdk};
use msgcore_client::state::ClientState;

fn main() {
    let mut settings = config::load_settings().unwrap_or_default();
    logging::init_tracing(&settings.log_filter);
    tracing::info!(
        service = %settings.service_api_url,
        organization = %settings.organization_id,
        developer = %settings.developer_name,
        "starting msgcore-client"
    );

    let sdk = Arc::new(LoopbackSdk::new(LoopbackOptions {
        hours: settings.business_hours(),
        ..LoopbackOptions::default()
    }));

    let (action_tx, action_rx) = unbounded::<ClientAction>();
    let (event_tx, event_rx) = unbounded::<ClientEvent>();
    let banner = settings.banner.clone();
    let engine = thread::spawn(move || backend::run_backend(sdk, banner, action_rx, event_tx));

    let (line_tx, line_rx) = unbounded::<String>();
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if line_tx.send(line).is_err() {
                break;
            }
        }
    });

    let logger = if settings.chat_log {
        match Logger::new() {
            Ok(logger) => Some(logger),
            Err(e) => {
                tracing::warn!("Chat log disabled: {}", e);
                None
            }
        }
    } else {
        None
    };

    let mut state = ClientState::new(logger);
    for line in &state.system_log {
        println!("{}", line);
    }
    println!("{}", commands::HELP_TEXT);

    loop {
        select! {
            recv(line_rx) -> line => {
                let Ok(line) = line else {
                    // stdin closed
                    let _ = action_tx.send(ClientAction::Shutdown);
                    break;
                };
                let before = state.system_log.len();
                let outcome = commands::handle_input(&line, &mut state, &action_tx);
                for msg in state.system_log.iter().skip(before) {
                    println!("{}", msg);
                }
                match outcome {
                    InputOutcome::Quit => break,
                    InputOutcome::Handled if !line.trim_start().starts_with('/') => {
                        settings.remember(line.trim());
                    }
                    _ => {}
                }
            }
            recv(event_rx) -> event => {
                let Ok(event) = event else { break };
                let stopped = matches!(event, ClientEvent::Stopped);
                for msg in events::process_event(event, &mut state) {
                    println!("{}", msg);
                }
                if stopped {
                    break;
                }
            }
        }
    }

    drop(action_tx);
    let _ = engine.join();

    if let Err(e) = config::save_settings(&settings) {
        tracing::warn!("Failed to save settings: {}", e);
    }
}
