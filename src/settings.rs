use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;

const DEFAULT_CONFIG_FILE: &str = "config/default.toml";

/// Tuning for the live pcap source.
#[derive(Debug, Clone, Deserialize)]
pub struct CaptureSettings {
    pub snaplen: i32,
    pub promiscuous: bool,
    pub read_timeout_ms: i32,
    /// Frames buffered between the capture thread and the controller.
    pub queue_capacity: usize,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        CaptureSettings {
            snaplen: 65535,
            promiscuous: true,
            read_timeout_ms: 1000,
            queue_capacity: 1024,
        }
    }
}

// The struct that holds the application's configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub log_level: String,
    pub interface: Option<String>,
    pub output_path: String,
    pub webhook_url: Option<String>,
    pub webhook_store_path: String,
    pub http_timeout_secs: u64,
    pub nameserver: String,
    pub lookup_timeout_ms: u64,
    pub capture: CaptureSettings,
}

impl Settings {
    /// Defaults, then `config/default.toml` if present, then `RUSHX_*`
    /// environment variables (`RUSHX_CAPTURE__SNAPLEN` for nested keys).
    pub fn new() -> Result<Self, ConfigError> {
        Self::builder()?
            .add_source(File::with_name(DEFAULT_CONFIG_FILE).required(false))
            .add_source(Environment::with_prefix("RUSHX").prefix_separator("_").separator("__"))
            .build()?
            .try_deserialize()
    }

    /// Defaults overlaid with an inline TOML document.
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        Self::builder()?
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?
            .try_deserialize()
    }

    fn builder() -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        let capture = CaptureSettings::default();
        Config::builder()
            .set_default("log_level", "info")?
            .set_default("output_path", "captured_packets.txt")?
            .set_default("webhook_store_path", "rushx.yaml")?
            .set_default("http_timeout_secs", 10)?
            .set_default("nameserver", "1.1.1.1:53")?
            .set_default("lookup_timeout_ms", 2000)?
            .set_default("capture.snaplen", capture.snaplen)?
            .set_default("capture.promiscuous", capture.promiscuous)?
            .set_default("capture.read_timeout_ms", capture.read_timeout_ms)?
            .set_default("capture.queue_capacity", capture.queue_capacity as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_any_source() {
        let settings = Settings::from_toml("").unwrap();
        assert_eq!(settings.log_level, "info");
        assert_eq!(settings.output_path, "captured_packets.txt");
        assert_eq!(settings.interface, None);
        assert_eq!(settings.webhook_url, None);
        assert_eq!(settings.capture.snaplen, 65535);
        assert_eq!(settings.capture.queue_capacity, 1024);
        assert!(settings.capture.promiscuous);
    }

    #[test]
    fn test_file_overrides_defaults() {
        let settings = Settings::from_toml(
            r#"
            log_level = "debug"
            interface = "eth0"
            webhook_url = "https://example.invalid/hook"

            [capture]
            queue_capacity = 16
            promiscuous = false
            "#,
        )
        .unwrap();

        assert_eq!(settings.log_level, "debug");
        assert_eq!(settings.interface.as_deref(), Some("eth0"));
        assert_eq!(settings.webhook_url.as_deref(), Some("https://example.invalid/hook"));
        assert_eq!(settings.capture.queue_capacity, 16);
        assert!(!settings.capture.promiscuous);
        assert_eq!(settings.capture.read_timeout_ms, 1000);
    }
}
