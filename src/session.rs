use std::fmt;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, bounded};

use crate::error::{Error, Result};
use crate::notify::Notifier;

/// The host/port pair a session watches for. Fixed for the whole session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Target {
    pub ip: Ipv4Addr,
    pub port: u16,
}

impl Target {
    /// Validates operator input. Only IPv4 is accepted since the match
    /// predicate never looks at anything else.
    pub fn parse(ip: &str, port: u16) -> Result<Self> {
        let ip = ip
            .trim()
            .parse::<Ipv4Addr>()
            .map_err(|_| Error::InvalidTarget(format!("'{}' is not an IPv4 address", ip.trim())))?;
        Ok(Target { ip, port })
    }

    /// BPF expression that scopes the capture device to this target.
    pub fn filter_expression(&self) -> String {
        format!("host {} and port {}", self.ip, self.port)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

/// Everything the capture controller needs for one run. Read-only once built.
pub struct Session {
    pub target: Target,
    /// Seconds; 0 keeps the session running until interrupted.
    pub duration_limit_secs: u64,
    pub verbose: bool,
    pub notifier: Box<dyn Notifier>,
    pub output_path: PathBuf,
}

impl Session {
    pub fn duration_limit(&self) -> Option<Duration> {
        match self.duration_limit_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

/// Cooperative cancellation shared between the Ctrl-C handler, the
/// controller and a blocking packet source.
#[derive(Debug, Clone)]
pub struct Interrupt {
    raised: Arc<AtomicBool>,
    wake_tx: Sender<()>,
    wake_rx: Receiver<()>,
}

impl Interrupt {
    pub fn new() -> Self {
        let (wake_tx, wake_rx) = bounded(1);
        Interrupt {
            raised: Arc::new(AtomicBool::new(false)),
            wake_tx,
            wake_rx,
        }
    }

    /// Raises the flag and wakes whoever is parked on `waker()`. Repeated
    /// calls are harmless.
    pub fn raise(&self) {
        if !self.raised.swap(true, Ordering::SeqCst) {
            let _ = self.wake_tx.try_send(());
        }
    }

    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::SeqCst)
    }

    /// Receives a single message once the interrupt is raised.
    pub fn waker(&self) -> Receiver<()> {
        self.wake_rx.clone()
    }
}

impl Default for Interrupt {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_parse_accepts_ipv4() {
        let target = Target::parse(" 10.0.0.5 ", 80).unwrap();
        assert_eq!(target.ip, Ipv4Addr::new(10, 0, 0, 5));
        assert_eq!(target.port, 80);
        assert_eq!(target.filter_expression(), "host 10.0.0.5 and port 80");
    }

    #[test]
    fn test_target_parse_rejects_garbage_and_ipv6() {
        assert!(matches!(Target::parse("not-an-ip", 80), Err(Error::InvalidTarget(_))));
        assert!(matches!(Target::parse("::1", 80), Err(Error::InvalidTarget(_))));
    }

    #[test]
    fn test_interrupt_wakes_once() {
        let interrupt = Interrupt::new();
        let waker = interrupt.waker();
        assert!(!interrupt.is_raised());

        interrupt.raise();
        interrupt.raise();

        assert!(interrupt.is_raised());
        assert!(waker.try_recv().is_ok());
        assert!(waker.try_recv().is_err(), "second raise should not queue another wake-up");
    }
}
