//! msgcore-client library.
//!
//! The conversation core (`entry`, `classify`, `timeline`, `session_status`,
//! `send`, `controller`) is UI-agnostic. `backend`, `protocol`, `state`,
//! `events` and `commands` glue it to a front end over crossbeam channels.

pub mod backend;
pub mod classify;
pub mod commands;
pub mod config;
pub mod controller;
pub mod entry;
pub mod error;
pub mod events;
pub mod logging;
pub mod protocol;
pub mod render;
pub mod sdk;
pub mod send;
pub mod session_status;
pub mod state;
pub mod timeline;
pub mod validation;

pub use controller::{
    ConversationController, ConversationPhase, OpenOutcome, OpenTicket, ResetTicket,
};
pub use error::{ClientError, Result};

#[cfg(test)]
mod testing;

#[cfg(test)]
mod backend_tests;
