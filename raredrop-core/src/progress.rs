//! Progress events emitted by long-running operations.

use serde::Serialize;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

pub const ETA_PENDING: &str = "Calculating...";

/// One status update: text, overall percent and ETA text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressEvent {
    pub message: String,
    pub percent: u8,
    pub eta: String,
}

/// Sending half of a progress stream. A silent reporter drops every event.
#[derive(Debug, Clone, Default)]
pub struct ProgressReporter {
    tx: Option<UnboundedSender<ProgressEvent>>,
}

impl ProgressReporter {
    pub fn channel() -> (Self, UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    pub fn silent() -> Self {
        Self { tx: None }
    }

    pub fn report(&self, message: impl Into<String>, percent: u8, eta: impl Into<String>) {
        let event = ProgressEvent {
            message: message.into(),
            percent: percent.min(100),
            eta: eta.into(),
        };
        tracing::debug!("[{:>3}%] {} ({})", event.percent, event.message, event.eta);
        if let Some(tx) = &self.tx {
            // A dropped receiver only means nobody is watching.
            let _ = tx.send(event);
        }
    }
}

/// Tracks rows written against the planned total and extrapolates the remaining time.
#[derive(Debug)]
pub struct EtaTracker {
    started: Instant,
    total: usize,
    written: usize,
}

impl EtaTracker {
    pub fn start(total: usize) -> Self {
        Self { started: Instant::now(), total, written: 0 }
    }

    pub fn record(&mut self, rows: usize) {
        self.written = (self.written + rows).min(self.total);
    }

    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        ((self.written * 100) / self.total) as u8
    }

    /// Remaining time given `elapsed`, or `None` before the first row lands.
    pub fn remaining_after(&self, elapsed: Duration) -> Option<Duration> {
        if self.written == 0 {
            return None;
        }
        let remaining = (self.total - self.written) as f64;
        Some(Duration::from_secs_f64(
            elapsed.as_secs_f64() * remaining / self.written as f64,
        ))
    }

    pub fn eta_text(&self) -> String {
        match self.remaining_after(self.started.elapsed()) {
            Some(remaining) => format_eta(remaining),
            None => ETA_PENDING.to_string(),
        }
    }
}

/// `45s`, `2m 5s` or `1h 3m`.
pub fn format_eta(remaining: Duration) -> String {
    let secs = remaining.as_secs();
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    }
}

/// `12s` or `3m 4s`.
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    if secs >= 60 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}s", secs)
    }
}
