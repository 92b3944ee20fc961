//! Event seam between the session logic and whatever renders it.
//!
//! The cores never touch a screen; they emit [`UiEvent`]s through a
//! [`UiHandle`] and the consumer decides what a status line or a settings
//! field looks like. The headless binary drains the channel into `tracing`.

use crate::device::LiveReading;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    /// Status-line text; `error` selects the error styling.
    Status { text: String, error: bool },
    /// Device acknowledgment text, surfaced verbatim.
    Ack(String),
    /// A settings control should display `value` (populate, default restore,
    /// or invalid-edit revert).
    SetField { key: String, value: String },
    /// Refreshed log file listing.
    Logs(Vec<String>),
    /// One tick of the live averages poll.
    Live(LiveReading),
}

/// Cloneable sender half handed to the session and the synchronizer.
///
/// Emits are fire-and-forget: a closed receiver means the front end is gone,
/// which is not this side's problem.
#[derive(Clone)]
pub struct UiHandle {
    tx: mpsc::UnboundedSender<UiEvent>,
}

impl UiHandle {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<UiEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn status(&self, text: impl Into<String>) {
        let _ = self.tx.send(UiEvent::Status {
            text: text.into(),
            error: false,
        });
    }

    pub fn error(&self, text: impl Into<String>) {
        let _ = self.tx.send(UiEvent::Status {
            text: text.into(),
            error: true,
        });
    }

    pub fn ack(&self, text: impl Into<String>) {
        let _ = self.tx.send(UiEvent::Ack(text.into()));
    }

    pub fn set_field(&self, key: impl Into<String>, value: impl Into<String>) {
        let _ = self.tx.send(UiEvent::SetField {
            key: key.into(),
            value: value.into(),
        });
    }

    pub fn logs(&self, files: Vec<String>) {
        let _ = self.tx.send(UiEvent::Logs(files));
    }

    pub fn live(&self, reading: LiveReading) {
        let _ = self.tx.send(UiEvent::Live(reading));
    }
}

/// Console renderer for the headless binary.
pub fn spawn_ui_logger(mut rx: mpsc::UnboundedReceiver<UiEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                UiEvent::Status { text, error: false } => tracing::info!("{text}"),
                UiEvent::Status { text, error: true } => tracing::warn!("{text}"),
                UiEvent::Ack(text) => tracing::info!("ACK: {text}"),
                UiEvent::SetField { key, value } => {
                    tracing::debug!("field {key} = {value}");
                }
                UiEvent::Logs(files) => tracing::info!("{} log file(s) on device", files.len()),
                UiEvent::Live(reading) => tracing::debug!(?reading, "live"),
            }
        }
    })
}
