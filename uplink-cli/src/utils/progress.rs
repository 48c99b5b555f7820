use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

fn upload_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{spinner:.green} {msg}\n[{elapsed_precise}] [{bar:40.green/white}] {bytes}/{total_bytes} @ {bytes_per_sec}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ")
}

/// Progress bar fed by an upload's fractional progress
#[derive(Clone)]
pub struct UploadProgress {
    bar: ProgressBar,
    total: u64,
}

impl UploadProgress {
    pub fn new(total: u64, message: String) -> Self {
        let bar = ProgressBar::new(total);
        bar.set_style(upload_style());
        bar.set_message(message);
        bar.enable_steady_tick(Duration::from_millis(500));
        Self { bar, total }
    }

    pub fn new_disabled(total: u64) -> Self {
        Self {
            bar: ProgressBar::hidden(),
            total,
        }
    }

    /// Observer to attach to an upload handle
    pub fn observer(&self) -> impl Fn(f64) + Send + Sync + 'static {
        let bar = self.bar.clone();
        let total = self.total;
        move |fraction| bar.set_position((fraction * total as f64).round() as u64)
    }

    pub fn finish(&self, message: String) {
        self.bar.finish_with_message(message);
    }

    pub fn abandon(&self, message: String) {
        self.bar.abandon_with_message(message);
    }
}
