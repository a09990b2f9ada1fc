use std::fs::{self, File};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use log::info;
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredConfig {
    webhook_url: Option<String>,
}

/// The webhook URL remembered between runs, kept in a small YAML file.
pub struct WebhookStore {
    path: PathBuf,
}

impl WebhookStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        WebhookStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `None` when nothing has been configured yet.
    pub fn load(&self) -> Result<Option<String>> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.error(e)),
        };
        let stored: StoredConfig = serde_yaml::from_reader(file).map_err(|e| self.error(e))?;
        Ok(stored.webhook_url)
    }

    /// Validates and stores `url`, replacing any previous one.
    pub fn save(&self, url: &str) -> Result<()> {
        let parsed = Url::parse(url).map_err(|e| self.error(format!("invalid webhook URL '{}': {}", url, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(self.error(format!("webhook URL must be http or https, got '{}'", parsed.scheme())));
        }

        let stored = StoredConfig {
            webhook_url: Some(url.to_string()),
        };
        let file = File::create(&self.path).map_err(|e| self.error(e))?;
        serde_yaml::to_writer(file, &stored).map_err(|e| self.error(e))?;
        info!("Webhook URL stored in {}", self.path.display());
        Ok(())
    }

    /// Forgets the stored URL. Returns whether there was one.
    pub fn remove(&self) -> Result<bool> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(self.error(e)),
        }
    }

    fn error(&self, reason: impl ToString) -> Error {
        Error::Store {
            path: self.path.clone(),
            reason: reason.to_string(),
        }
    }
}
