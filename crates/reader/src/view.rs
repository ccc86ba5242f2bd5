//! Document view and presence indicator that only log

use scroll_control::{DocumentView, PresenceIndicator};
use tracing::{debug, info};

/// Tracks the scroll offset a real view would have applied
#[derive(Debug, Default)]
pub struct LoggingDocumentView {
    offset: f32,
    relayouts: u64,
}

impl LoggingDocumentView {
    pub fn offset(&self) -> f32 {
        self.offset
    }

    pub fn relayouts(&self) -> u64 {
        self.relayouts
    }
}

impl DocumentView for LoggingDocumentView {
    fn apply_scroll_delta(&mut self, dy: f32) {
        self.offset += dy;
        info!("Scroll {:+.1}px (offset {:.1})", dy, self.offset);
    }

    fn request_page_relayout(&mut self) {
        self.relayouts += 1;
        debug!("Page relayout #{}", self.relayouts);
    }
}

/// Logs "gaze detected" transitions
#[derive(Debug, Default)]
pub struct LoggingIndicator {
    detected: Option<bool>,
}

impl LoggingIndicator {
    pub fn detected(&self) -> bool {
        self.detected.unwrap_or(false)
    }
}

impl PresenceIndicator for LoggingIndicator {
    fn set_gaze_detected(&mut self, detected: bool) {
        if self.detected != Some(detected) {
            info!("Gaze {}", if detected { "detected" } else { "lost" });
        }
        self.detected = Some(detected);
    }
}
