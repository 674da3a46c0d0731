//! Terminal progress display.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use tracing::info;

use super::ProgressSink;

/// Progress bar on stderr; every log line also goes to `tracing` so it lands
/// in the run's log file.
pub struct ConsoleProgress {
    bar: ProgressBar,
}

impl ConsoleProgress {
    pub fn new() -> Self {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} {prefix} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .expect("valid template")
                .progress_chars("#>-"),
        );
        Self { bar }
    }

    /// A sink that draws nothing; log lines still reach `tracing`.
    pub fn hidden() -> Self {
        let progress = Self::new();
        progress.bar.set_draw_target(ProgressDrawTarget::hidden());
        progress
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl Default for ConsoleProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for ConsoleProgress {
    fn log(&self, message: &str) {
        self.bar.suspend(|| info!("{message}"));
    }

    fn set_main_status(&self, status: &str) {
        self.bar.set_prefix(status.to_string());
        self.log(status);
    }

    fn set_progress(&self, done: u64, total: u64) {
        self.bar.set_length(total);
        self.bar.set_position(done);
    }

    fn set_substatus(&self, text: &str) {
        self.bar.set_message(text.to_string());
    }
}
