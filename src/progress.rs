use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::sync::Arc;

/// Progress callback: `(message, current, total)`.
pub type ProgressCallback = Arc<dyn Fn(&str, usize, usize) + Send + Sync>;

/// Invoke an optional callback.
pub fn report(progress: &Option<ProgressCallback>, message: &str, current: usize, total: usize) {
    if let Some(cb) = progress {
        cb(message, current, total);
    }
}

/// Terminal progress for scans and builds, with a separate log line
#[derive(Debug, Clone)]
pub struct ConsoleProgress {
    log_line: ProgressBar,
    progress_bar: ProgressBar,
}

impl ConsoleProgress {
    /// Create new progress tracker with separate log and progress lines
    pub fn new(title: &str) -> Self {
        let multi = MultiProgress::new();

        // Top line for log messages
        let log_line = multi.add(ProgressBar::new_spinner());
        log_line.set_style(ProgressStyle::default_spinner().template("{msg}").unwrap());
        log_line.set_message(title.to_string());

        let progress_bar = multi.add(ProgressBar::new(0));
        progress_bar.set_style(
            ProgressStyle::default_bar()
                .template("[{bar:40.cyan/blue}] {pos}/{len} ({percent}%) | {msg}")
                .unwrap()
                .progress_chars("█▓░"),
        );

        Self { log_line, progress_bar }
    }

    /// Hidden tracker (for `--quiet` and non-terminal output)
    pub fn hidden() -> Self {
        Self {
            log_line: ProgressBar::hidden(),
            progress_bar: ProgressBar::hidden(),
        }
    }

    pub fn update(&self, message: &str, current: usize, total: usize) {
        self.progress_bar.set_length(total as u64);
        self.progress_bar.set_position(current as u64);
        self.progress_bar.set_message(message.to_string());
    }

    pub fn set_status(&self, message: &str) {
        self.log_line.set_message(message.to_string());
    }

    /// Callback feeding this tracker
    pub fn callback(&self) -> ProgressCallback {
        let this = self.clone();
        Arc::new(move |msg: &str, cur: usize, total: usize| this.update(msg, cur, total))
    }

    pub fn finish(&self, message: &str) {
        self.progress_bar.finish_and_clear();
        self.log_line.finish_with_message(message.to_string());
    }
}
