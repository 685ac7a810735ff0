//! User-facing progress output.
//!
//! Everything a person running torshare needs to see goes to stdout here;
//! diagnostics go through `tracing` instead.

use console::style;
use tracing::warn;

use super::StopReason;
use crate::error::{ReleaseError, SessionError};
use crate::privacy::PublishedService;
use crate::transcode::SizeReport;
use crate::utils::pretty_size;

pub struct Announcer {
    quiet: bool,
    copy_to_clipboard: bool,
    // Held for the whole session: on X11 the clipboard owner must stay alive
    // for pastes to work.
    clipboard: Option<arboard::Clipboard>,
}

impl Announcer {
    pub fn new(copy_to_clipboard: bool) -> Self {
        Self {
            quiet: false,
            copy_to_clipboard,
            clipboard: None,
        }
    }

    /// No output and no clipboard access.
    pub fn silent() -> Self {
        Self {
            quiet: true,
            copy_to_clipboard: false,
            clipboard: None,
        }
    }

    fn line(&self, text: impl std::fmt::Display) {
        if !self.quiet {
            println!("{}", text);
        }
    }

    pub fn compressing(&self) {
        self.line("Compressing video... (This may take a long time and consume resources)");
    }

    pub fn sizes(&self, sizes: &SizeReport) {
        self.line(format!("Uncompressed size: {}", pretty_size(sizes.original)));
        self.line(format!("Compressed size: {}", pretty_size(sizes.compressed)));
    }

    pub fn connecting(&self) {
        self.line("Connecting to tor...");
    }

    pub fn starting_service(&self) {
        self.line("Starting onion service...");
    }

    /// Print the onion URL and copy it to the clipboard if enabled.
    pub fn published(&mut self, service: &PublishedService) {
        let url = service.url();
        self.line(format!("{} {}", style("URL:").bold(), style(&url).cyan()));

        if !self.copy_to_clipboard {
            return;
        }
        match self.copy(&url) {
            Ok(()) => self.line(style("Copied to clipboard!").green()),
            Err(e) => {
                warn!("Clipboard copy failed: {}", e);
                self.line(format!("Error copying to clipboard: {}", e));
            }
        }
    }

    fn copy(&mut self, text: &str) -> Result<(), arboard::Error> {
        let mut clipboard = match self.clipboard.take() {
            Some(clipboard) => clipboard,
            None => arboard::Clipboard::new()?,
        };
        let result = clipboard.set_text(text.to_string());
        self.clipboard = Some(clipboard);
        result
    }

    pub fn stopped(&self, reason: StopReason) {
        let text = match reason {
            StopReason::Timeout => "Stopped: time limit reached",
            StopReason::UserStop => "Stopped: requested by user",
            StopReason::Error => "Stopped: session failed",
        };
        self.line(format!("\n{}", text));
    }

    pub fn failure(&self, error: &SessionError) {
        self.line(format!("{} {}", style("Error:").red().bold(), error));
    }

    pub fn release_failure(&self, error: &ReleaseError) {
        self.line(format!("{} {}", style("Error:").red().bold(), error));
    }
}
