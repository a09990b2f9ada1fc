//! Command-line interface.

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "rushx")]
#[command(version, about = "Watch traffic from a host to a port and forward every hit to a webhook", long_about = None)]
pub struct Cli {
    /// Override the log filter (e.g. "debug", "rushx=trace")
    #[arg(long, global = true, value_name = "FILTER")]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Capture traffic from a target host to a target port
    Watch(WatchArgs),

    /// Send a message to the configured webhook
    Send {
        /// Message content
        #[arg(long)]
        content: String,
    },

    /// Print a reverse-lookup report for an address
    Info {
        #[arg(long)]
        ip: String,
    },

    /// Send a reverse-lookup report for an address to the webhook
    Scan {
        #[arg(long)]
        ip: String,
    },

    /// Store the webhook URL
    Config {
        /// Webhook URL
        url: String,
    },

    /// Replace the stored webhook URL
    Edit {
        /// Webhook URL
        url: String,
    },

    /// Show the stored webhook URL
    List,

    /// Forget the stored webhook URL
    Remove,

    /// List capture devices
    Interfaces,
}

#[derive(Args, Debug, Default)]
pub struct WatchArgs {
    /// Source address to watch (prompted for when omitted)
    #[arg(long, value_name = "IPV4")]
    pub ip: Option<String>,

    /// Destination port to watch (prompted for when omitted)
    #[arg(long)]
    pub port: Option<u16>,

    /// Capture duration in seconds, 0 for continuous capture (prompted for when omitted)
    #[arg(short, long, value_name = "SECONDS")]
    pub duration: Option<u64>,

    /// Echo every matched packet to the console
    #[arg(short, long)]
    pub verbose: bool,

    /// Capture device (picked interactively when neither this nor the config sets one)
    #[arg(short = 'I', long)]
    pub interface: Option<String>,

    /// Webhook URL for this run only
    #[arg(long)]
    pub webhook: Option<String>,

    /// Where the capture log is written
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<String>,
}
