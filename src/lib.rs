mod capture;
mod controller;
mod error;
mod filter;
mod lookup;
mod notify;
mod parser;
mod report;
mod session;
mod settings;
mod stats;
mod store;

pub mod cli;

pub use capture::{LiveCapture, PacketSource, list_devices};
pub use controller::{CaptureController, Clock, SessionState, SessionSummary, StopReason, SystemClock};
pub use error::{DeliveryError, Error, Result};
pub use filter::matches;
pub use lookup::{HostLookup, HostReport};
pub use notify::{DELIVERED_STATUS, Notifier, WebhookNotifier};
pub use parser::{CapturedPacket, MatchedEvent, Protocol, extract};
pub use report::{Persister, ReportPrinter};
pub use session::{Interrupt, Session, Target};
pub use settings::{CaptureSettings, Settings};
pub use stats::{StatsAggregator, Tally, TrafficStats};
pub use store::WebhookStore;
