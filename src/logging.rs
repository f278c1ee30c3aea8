//! Diagnostics and chat persistence.
//!
//! Diagnostics go through `tracing` to stderr. Conversation text is appended to
//! daily files by a background thread, under the platform data directory:
//! `msgcore-client/logs/<conversation>/YYYY-MM-DD.log`. Transcripts are saved
//! next to them under `msgcore-client/transcripts/`.

use chrono::{Local, Utc};
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::thread;
use tracing_subscriber::EnvFilter;

use crate::sdk::Transcript;

/// Install the stderr `tracing` subscriber. `RUST_LOG` overrides `default_filter`.
pub fn init_tracing(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// A chat line to be written to disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub conversation: String,
    pub timestamp: String,
    pub sender: String,
    pub message: String,
}

/// Writes chat lines on a background thread so the front end never blocks on I/O
pub struct Logger {
    tx: Sender<LogEntry>,
}

impl Logger {
    pub fn new() -> Result<Self, String> {
        Self::with_directory(data_directory()?.join("logs"))
    }

    pub fn with_directory(log_dir: PathBuf) -> Result<Self, String> {
        fs::create_dir_all(&log_dir)
            .map_err(|e| format!("Failed to create log directory: {}", e))?;

        let (tx, rx) = unbounded::<LogEntry>();
        thread::spawn(move || {
            run_logger_thread(rx, log_dir);
        });

        Ok(Self { tx })
    }

    /// Queue a line for writing. Lines are dropped if the writer thread has stopped.
    pub fn log(&self, entry: LogEntry) {
        let _ = self.tx.send(entry);
    }
}

fn run_logger_thread(rx: Receiver<LogEntry>, log_dir: PathBuf) {
    let mut file_cache: HashMap<String, BufWriter<File>> = HashMap::new();

    while let Ok(entry) = rx.recv() {
        if let Err(e) = write_log_entry(&mut file_cache, &log_dir, &entry) {
            tracing::warn!("Chat log error: {}", e);
        }
    }

    for (_, mut writer) in file_cache.drain() {
        let _ = writer.flush();
    }
}

fn write_log_entry(
    file_cache: &mut HashMap<String, BufWriter<File>>,
    log_dir: &Path,
    entry: &LogEntry,
) -> Result<(), String> {
    let date = Local::now().format("%Y-%m-%d").to_string();
    let conversation = sanitize_filename(&entry.conversation);
    let cache_key = format!("{}/{}", conversation, date);

    let writer = match file_cache.entry(cache_key) {
        std::collections::hash_map::Entry::Occupied(slot) => slot.into_mut(),
        std::collections::hash_map::Entry::Vacant(slot) => {
            let conversation_dir = log_dir.join(&conversation);
            fs::create_dir_all(&conversation_dir)
                .map_err(|e| format!("Failed to create conversation directory: {}", e))?;
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(conversation_dir.join(format!("{}.log", date)))
                .map_err(|e| format!("Failed to open log file: {}", e))?;
            slot.insert(BufWriter::new(file))
        }
    };

    // Format: [HH:MM:SS] <sender> message
    writeln!(writer, "[{}] <{}> {}", entry.timestamp, entry.sender, entry.message)
        .map_err(|e| format!("Failed to write log entry: {}", e))?;
    writer
        .flush()
        .map_err(|e| format!("Failed to flush log: {}", e))?;

    Ok(())
}

/// Save a transcript under the platform data directory; returns the written path.
pub fn save_transcript(transcript: &Transcript) -> Result<PathBuf, String> {
    save_transcript_in(&data_directory()?.join("transcripts"), transcript)
}

pub fn save_transcript_in(dir: &Path, transcript: &Transcript) -> Result<PathBuf, String> {
    fs::create_dir_all(dir).map_err(|e| format!("Failed to create transcript directory: {}", e))?;
    let name = format!(
        "{}-{}.{}",
        sanitize_filename(transcript.conversation_id.as_str()),
        Utc::now().format("%Y%m%dT%H%M%S"),
        transcript.extension()
    );
    let path = dir.join(name);
    fs::write(&path, &transcript.data).map_err(|e| format!("Failed to write transcript: {}", e))?;
    Ok(path)
}

fn data_directory() -> Result<PathBuf, String> {
    let base = directories::BaseDirs::new().ok_or("Failed to determine home directory")?;
    Ok(base.data_dir().join("msgcore-client"))
}

fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            _ => c,
        })
        .collect()
}
