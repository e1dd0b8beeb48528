//! Progress reporting for downloads and tree operations.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use crate::downloader::DownloadObserver;

/// Manages one progress bar per download on a shared `MultiProgress`
pub struct ProgressManager {
    multi: MultiProgress,
    enabled: bool,
    bars: Mutex<HashMap<String, ProgressBar>>,
}

impl ProgressManager {
    /// Create a new progress manager
    pub fn new(enabled: bool) -> Self {
        Self {
            multi: MultiProgress::new(),
            enabled,
            bars: Mutex::new(HashMap::new()),
        }
    }

    /// Create a download progress bar; an unknown size shows a byte counter
    pub fn create_download_bar(&self, name: &str, total: Option<u64>) -> ProgressBar {
        if !self.enabled {
            return ProgressBar::hidden();
        }

        let pb = match total {
            Some(total) => {
                let pb = self.multi.add(ProgressBar::new(total));
                pb.set_style(
                    ProgressStyle::default_bar()
                        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}")
                        .unwrap_or_else(|_| ProgressStyle::default_bar())
                        .progress_chars("#>-"),
                );
                pb
            }
            None => {
                let pb = self.multi.add(ProgressBar::new_spinner());
                pb.set_style(
                    ProgressStyle::default_spinner()
                        .template("{spinner:.green} [{elapsed_precise}] {bytes} {msg}")
                        .unwrap_or_else(|_| ProgressStyle::default_spinner()),
                );
                pb
            }
        };
        pb.set_message(name.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }

    fn with_bars<R>(&self, f: impl FnOnce(&mut HashMap<String, ProgressBar>) -> R) -> R {
        // A poisoned lock only means another bar update panicked
        let mut bars = match self.bars.lock() {
            Ok(bars) => bars,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut bars)
    }
}

impl Default for ProgressManager {
    fn default() -> Self {
        Self::new(true)
    }
}

impl DownloadObserver for ProgressManager {
    fn started(&self, name: &str, total: Option<u64>) {
        let pb = self.create_download_bar(name, total);
        self.with_bars(|bars| bars.insert(name.to_string(), pb));
    }

    fn advanced(&self, name: &str, downloaded: u64, _total: Option<u64>) {
        self.with_bars(|bars| {
            if let Some(pb) = bars.get(name) {
                pb.set_position(downloaded);
            }
        });
    }

    fn finished(&self, name: &str) {
        if let Some(pb) = self.with_bars(|bars| bars.remove(name)) {
            pb.finish_with_message(format!("{} done", name));
        }
    }
}

/// Helper to format bytes for display
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
