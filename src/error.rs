use std::path::PathBuf;

use thiserror::Error;

/// Failure to hand an alert to the notification sink. Never fatal to a session.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("webhook unreachable: {0}")]
    Unreachable(#[from] reqwest::Error),

    #[error("webhook rejected the alert with status {status}")]
    Rejected { status: u16 },
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid target: {0}")]
    InvalidTarget(String),

    #[error("capture unavailable on '{interface}': {reason}")]
    CaptureUnavailable { interface: String, reason: String },

    #[error("malformed packet: {0}")]
    MalformedPacket(&'static str),

    #[error(transparent)]
    Delivery(#[from] DeliveryError),

    #[error("failed to write capture log to {}: {source}", .path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("capture session already ran")]
    SessionOver,

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("webhook store {}: {reason}", .path.display())]
    Store { path: PathBuf, reason: String },

    #[error("no webhook URL configured; use `rushx config <url>` to set one")]
    NoWebhook,

    #[error("reverse lookup failed: {0}")]
    Lookup(String),
}

pub type Result<T> = std::result::Result<T, Error>;
