use std::time::Duration;

use log::debug;
use reqwest::StatusCode;
use reqwest::blocking::Client;
use serde::Serialize;

use crate::error::{DeliveryError, Result};

/// The only status treated as a delivered alert. Webhooks answer 204 unless
/// the caller asks to wait for the created message, which we never do.
pub const DELIVERED_STATUS: StatusCode = StatusCode::NO_CONTENT;

/// A best-effort alert sink. Called inline from the capture loop, so a slow
/// sink slows capture down; implementations must not buffer or retry.
pub trait Notifier {
    fn notify(&self, message: &str) -> std::result::Result<(), DeliveryError>;
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    content: &'a str,
}

/// Posts `{"content": message}` to a chat webhook.
pub struct WebhookNotifier {
    client: Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(DeliveryError::from)?;
        Ok(Self::with_client(url, client))
    }

    pub fn with_client(url: impl Into<String>, client: Client) -> Self {
        WebhookNotifier { client, url: url.into() }
    }
}

impl Notifier for WebhookNotifier {
    fn notify(&self, message: &str) -> std::result::Result<(), DeliveryError> {
        let response = self
            .client
            .post(&self.url)
            .json(&WebhookPayload { content: message })
            .send()?;

        let status = response.status();
        if status == DELIVERED_STATUS {
            debug!("Alert delivered ({} bytes)", message.len());
            Ok(())
        } else {
            Err(DeliveryError::Rejected { status: status.as_u16() })
        }
    }
}
