//! Upload progress indicator.
//!
//! Progress only moves forward within one upload. Observers follow it through
//! a `watch` channel; after the upload settles the indicator is cleared with a
//! delay so the final state stays visible for a moment.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// How long the final progress state stays visible.
pub const CLEAR_DELAY: Duration = Duration::from_secs(2);

pub const UPLOAD_START: u8 = 10;
pub const UPLOAD_END: u8 = 70;
pub const PROCESSING: u8 = 80;
pub const UPDATING: u8 = 90;
pub const COMPLETE: u8 = 100;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressState {
    /// An upload is running or its final state is still shown.
    pub active: bool,
    pub percent: u8,
    pub label: String,
}

#[derive(Debug, Clone)]
pub struct UploadProgress {
    tx: Arc<watch::Sender<ProgressState>>,
}

impl Default for UploadProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl UploadProgress {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(ProgressState::default());
        Self { tx: Arc::new(tx) }
    }

    pub fn subscribe(&self) -> watch::Receiver<ProgressState> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> ProgressState {
        self.tx.borrow().clone()
    }

    pub fn is_active(&self) -> bool {
        self.tx.borrow().active
    }

    /// Reset to 0% for a new upload.
    pub fn start(&self) {
        self.tx.send_replace(ProgressState {
            active: true,
            percent: 0,
            label: "Starting file processing...".to_string(),
        });
    }

    /// Move to `percent` with a new label. Lower values than the current one are ignored.
    pub fn advance(&self, percent: u8, label: impl Into<String>) {
        let percent = percent.min(COMPLETE);
        let label = label.into();
        self.tx.send_if_modified(|state| {
            if !state.active || percent < state.percent {
                return false;
            }
            state.percent = percent;
            state.label = label;
            true
        });
    }

    /// Report bytes sent, scaled into the upload band.
    pub fn upload(&self, sent: u64, total: u64) {
        let completed = upload_percent(sent, total);
        let scaled = UPLOAD_START as f64 + completed as f64 * (UPLOAD_END - UPLOAD_START) as f64 / 100.0;
        self.advance(scaled.round() as u8, format!("Uploading: {}%", completed));
    }

    /// Clear the indicator after `delay`, without blocking the caller.
    pub fn clear_after(&self, delay: Duration) -> JoinHandle<()> {
        let tx = Arc::clone(&self.tx);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            tx.send_replace(ProgressState::default());
        })
    }
}

/// Whole percent of `total` sent. An unknown total counts as one byte.
fn upload_percent(sent: u64, total: u64) -> u8 {
    let total = total.max(1);
    (((sent.min(total) as f64) * 100.0 / total as f64).round()) as u8
}
