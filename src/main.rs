use std::error::Error;
use std::io::{self, Write};
use std::net::IpAddr;
use std::str::FromStr;
use std::time::Duration;

use clap::Parser;
use log::{error, info, warn};

use rushx::cli::{Cli, Commands, WatchArgs};
use rushx::{
    CaptureController, HostLookup, Interrupt, LiveCapture, Notifier, Session, Settings, Target, WebhookNotifier,
    WebhookStore, list_devices,
};

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let settings = Settings::new()?;

    env_logger::Builder::new()
        .parse_filters(cli.log_level.as_deref().unwrap_or(&settings.log_level))
        .init();

    let store = WebhookStore::new(&settings.webhook_store_path);

    match cli.command {
        Commands::Watch(args) => watch(args, &settings, &store)?,
        Commands::Send { content } => {
            let notifier = webhook(None, &settings, &store)?;
            notifier.notify(&content)?;
            println!("Message sent to the webhook successfully.");
        }
        Commands::Info { ip } => {
            let report = host_lookup(&settings)?.report(parse_ip(&ip)?)?;
            println!("{}", report);
        }
        Commands::Scan { ip } => {
            let notifier = webhook(None, &settings, &store)?;
            // A failed lookup is still reported to the webhook.
            notifier.notify(&host_lookup(&settings)?.scan_message(&ip))?;
            println!("Scan report for {} sent to the webhook.", ip);
        }
        Commands::Config { url } | Commands::Edit { url } => {
            store.save(&url)?;
            println!("Webhook URL configured: {}", url);
        }
        Commands::List => match store.load()? {
            Some(url) => println!("Webhook URL: {}", url),
            None => println!("Webhook URL is not configured."),
        },
        Commands::Remove => {
            if store.remove()? {
                println!("Webhook URL removed.");
            } else {
                println!("Webhook URL is not configured.");
            }
        }
        Commands::Interfaces => {
            for (i, device) in list_devices()?.iter().enumerate() {
                println!("[{}] {} {}", i, device.name, device.desc.as_deref().unwrap_or(""));
            }
        }
    }

    Ok(())
}

fn watch(args: WatchArgs, settings: &Settings, store: &WebhookStore) -> Result<(), Box<dyn Error>> {
    let notifier = webhook(args.webhook.clone(), settings, store)?;

    let ip = match args.ip {
        Some(ip) => ip,
        None => prompt("Enter the target IP address: ")?,
    };
    let port = match args.port {
        Some(port) => port,
        None => prompt_parsed::<u16>("Enter the target port: ")?,
    };
    let duration = match args.duration {
        Some(duration) => duration,
        None => prompt_parsed::<u64>("Enter capture duration (seconds, 0 for continuous capture): ")?,
    };

    // Validated before any device is touched.
    let target = Target::parse(&ip, port)?;

    let interface = match args.interface.or_else(|| settings.interface.clone()) {
        Some(interface) => interface,
        None => select_device()?,
    };

    let session = Session {
        target,
        duration_limit_secs: duration,
        verbose: args.verbose,
        notifier: Box::new(notifier),
        output_path: args.output.unwrap_or_else(|| settings.output_path.clone()).into(),
    };

    let interrupt = Interrupt::new();
    {
        let interrupt = interrupt.clone();
        ctrlc::set_handler(move || interrupt.raise())?;
    }

    println!("Monitoring traffic. Press Ctrl-C to stop.");
    let mut controller = CaptureController::new(session, interrupt.clone());
    let summary = controller.run(|filter| LiveCapture::open(&interface, filter, &settings.capture, &interrupt))?;

    match summary.persisted {
        Some(lines) => info!("Session ended ({}), {} events saved", summary.reason, lines),
        None => warn!("Session ended ({}), capture log was not saved", summary.reason),
    }
    Ok(())
}

// Command line first, then settings/environment, then the stored URL.
fn webhook(
    explicit: Option<String>,
    settings: &Settings,
    store: &WebhookStore,
) -> Result<WebhookNotifier, Box<dyn Error>> {
    let url = match explicit.or_else(|| settings.webhook_url.clone()) {
        Some(url) => url,
        None => store.load()?.ok_or(rushx::Error::NoWebhook)?,
    };
    Ok(WebhookNotifier::new(url, Duration::from_secs(settings.http_timeout_secs))?)
}

fn host_lookup(settings: &Settings) -> Result<HostLookup, Box<dyn Error>> {
    Ok(HostLookup::new(
        &settings.nameserver,
        Duration::from_millis(settings.lookup_timeout_ms),
    )?)
}

fn parse_ip(ip: &str) -> Result<IpAddr, Box<dyn Error>> {
    ip.trim()
        .parse()
        .map_err(|_| format!("'{}' is not an IP address", ip.trim()).into())
}

fn prompt(question: &str) -> io::Result<String> {
    print!("{}", question);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}

fn prompt_parsed<T: FromStr>(question: &str) -> io::Result<T> {
    loop {
        match prompt(question)?.parse::<T>() {
            Ok(value) => return Ok(value),
            Err(_) => eprintln!("Please enter a valid number."),
        }
    }
}

fn select_device() -> Result<String, Box<dyn Error>> {
    info!("Finding network devices...");
    let devices = list_devices()?;

    if devices.is_empty() {
        error!("No network devices found. Try running with sudo or as an administrator");
        return Err("No network devices found.".into());
    }

    println!("Available network devices:");
    for (i, device) in devices.iter().enumerate() {
        println!("[{}] {}", i, device.name);
    }

    loop {
        match prompt_parsed::<usize>("Enter the number of the device to capture on: ")? {
            index if index < devices.len() => return Ok(devices[index].name.clone()),
            _ => eprintln!("Invalid device number. Please try again."),
        }
    }
}
