//! Business-hours session status and the banner derived from it.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::sdk::BusinessHours;

/// Last-known session configuration status.
///
/// The default (not within hours, not configured) hides the banner.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStatus {
    pub within_business_hours: bool,
    pub is_configured: bool,
}

impl SessionStatus {
    pub fn banner_visible(&self) -> bool {
        self.is_configured
    }
}

impl From<BusinessHours> for SessionStatus {
    fn from(hours: BusinessHours) -> Self {
        Self {
            within_business_hours: hours.within_hours,
            is_configured: hours.configured,
        }
    }
}

/// Banner strings, configurable through settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BannerText {
    pub within_hours: String,
    pub outside_hours: String,
    /// Shown before any status has been reported
    pub unknown: String,
}

impl Default for BannerText {
    fn default() -> Self {
        Self {
            within_hours: "You are within business hours".to_string(),
            outside_hours: "You are not within business hours".to_string(),
            unknown: "Not within business hours".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Banner {
    pub visible: bool,
    pub message: String,
    /// Drives the banner colour (positive vs. warning)
    pub within_hours: bool,
}

/// Tracks the business-hours status of the open conversation.
///
/// Refreshed by the lifecycle controller once per conversation open; there is
/// no polling.
#[derive(Debug, Default)]
pub struct SessionStatusGate {
    status: SessionStatus,
    refreshed: bool,
    text: BannerText,
}

impl SessionStatusGate {
    pub fn new(text: BannerText) -> Self {
        Self {
            status: SessionStatus::default(),
            refreshed: false,
            text,
        }
    }

    /// Apply the result of a business-hours check.
    pub fn refresh(&mut self, reported: BusinessHours) -> SessionStatus {
        self.status = reported.into();
        self.refreshed = true;
        debug!(
            within_hours = self.status.within_business_hours,
            configured = self.status.is_configured,
            "session status refreshed"
        );
        self.status
    }

    pub fn current_status(&self) -> SessionStatus {
        self.status
    }

    pub fn has_refreshed(&self) -> bool {
        self.refreshed
    }

    pub fn banner(&self) -> Banner {
        let message = if !self.refreshed {
            &self.text.unknown
        } else if self.status.within_business_hours {
            &self.text.within_hours
        } else {
            &self.text.outside_hours
        };
        Banner {
            visible: self.status.banner_visible(),
            message: message.clone(),
            within_hours: self.status.within_business_hours,
        }
    }

    /// Forget the last-known status (used on conversation reset).
    pub fn clear(&mut self) {
        self.status = SessionStatus::default();
        self.refreshed = false;
    }
}
