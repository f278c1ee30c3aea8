use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::PathBuf;

use crate::sdk::BusinessHours;
use crate::session_status::BannerText;

pub const DEFAULT_LOG_FILTER: &str = "info";
/// Composer history entries kept across runs
pub const MAX_HISTORY: usize = 100;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Messaging service endpoint, passed through to the SDK
    pub service_api_url: String,
    pub organization_id: String,
    pub developer_name: String,
    pub banner: BannerText,
    pub business_hours_configured: bool,
    pub within_business_hours: bool,
    /// Append confirmed and received messages to daily log files
    pub chat_log: bool,
    /// Default tracing filter when RUST_LOG is not set
    pub log_filter: String,
    pub history: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            service_api_url: String::new(),
            organization_id: String::new(),
            developer_name: String::new(),
            banner: BannerText::default(),
            business_hours_configured: false,
            within_business_hours: false,
            chat_log: true,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            history: Vec::new(),
        }
    }
}

impl Settings {
    /// Business-hours answer reported by the loopback backend.
    pub fn business_hours(&self) -> BusinessHours {
        BusinessHours {
            within_hours: self.within_business_hours,
            configured: self.business_hours_configured,
        }
    }

    /// Record a sent message in the composer history, newest last.
    pub fn remember(&mut self, text: &str) {
        self.history.retain(|h| h != text);
        self.history.push(text.to_string());
        if self.history.len() > MAX_HISTORY {
            let excess = self.history.len() - MAX_HISTORY;
            self.history.drain(..excess);
        }
    }
}

pub fn settings_path() -> Option<PathBuf> {
    if let Some(proj) = ProjectDirs::from("com", "msgcore", "msgcore-client") {
        let dir = proj.config_dir();
        if let Err(e) = fs::create_dir_all(dir) {
            tracing::warn!("Failed to create config dir: {}", e);
            return None;
        }
        return Some(dir.join("settings.json"));
    }
    None
}

pub fn load_settings() -> Option<Settings> {
    let path = settings_path()?;
    let content = fs::read_to_string(path).ok()?;
    parse_settings(&content)
}

/// Parse settings JSON; missing fields take their defaults.
pub fn parse_settings(content: &str) -> Option<Settings> {
    match serde_json::from_str(content) {
        Ok(settings) => Some(settings),
        Err(e) => {
            tracing::warn!("Ignoring malformed settings: {}", e);
            None
        }
    }
}

pub fn save_settings(settings: &Settings) -> std::io::Result<()> {
    if let Some(path) = settings_path() {
        let data = serde_json::to_string_pretty(settings)?;
        let mut file = fs::File::create(path)?;
        file.write_all(data.as_bytes())?;
    }
    Ok(())
}
