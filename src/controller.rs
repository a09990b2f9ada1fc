use std::fmt;
use std::io::{self, Write};

use chrono::{DateTime, Local};
use log::{debug, error, info, warn};

use crate::capture::PacketSource;
use crate::error::{Error, Result};
use crate::filter;
use crate::parser::{self, CapturedPacket, MatchedEvent};
use crate::report::{Persister, ReportPrinter};
use crate::session::{Interrupt, Session};
use crate::stats::{StatsAggregator, TrafficStats};

/// Wall-clock source for event timestamps and the duration cutoff.
pub trait Clock {
    fn now(&self) -> DateTime<Local>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The duration limit was reached after a matched event.
    Timeout,
    /// The operator interrupted the session.
    Interrupt,
    /// The packet source ended by itself.
    SourceClosed,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Timeout => f.write_str("capture duration reached"),
            StopReason::Interrupt => f.write_str("interrupted"),
            StopReason::SourceClosed => f.write_str("packet source closed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Init,
    Running,
    Stopping(StopReason),
    Stopped,
}

/// What a completed session hands back to its caller.
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub reason: StopReason,
    pub stats: TrafficStats,
    /// Lines written to the capture log, or `None` if saving failed.
    pub persisted: Option<usize>,
}

/// Drives one capture session from `Init` to `Stopped`.
///
/// The controller is the only writer of the capture log and the statistics,
/// so neither needs a lock. Alerts are forwarded inline; a failed delivery is
/// logged and the loop carries on.
pub struct CaptureController<C: Clock = SystemClock> {
    session: Session,
    interrupt: Interrupt,
    clock: C,
    console: Box<dyn Write>,
    persister: Persister,
    state: SessionState,
    log: Vec<MatchedEvent>,
    stats: StatsAggregator,
    finished: bool,
}

impl CaptureController<SystemClock> {
    pub fn new(session: Session, interrupt: Interrupt) -> Self {
        Self::with_clock(session, interrupt, SystemClock)
    }
}

impl<C: Clock> CaptureController<C> {
    pub fn with_clock(session: Session, interrupt: Interrupt, clock: C) -> Self {
        let persister = Persister::new(session.output_path.clone());
        CaptureController {
            session,
            interrupt,
            clock,
            console: Box::new(io::stdout()),
            persister,
            state: SessionState::Init,
            log: Vec::new(),
            stats: StatsAggregator::new(),
            finished: false,
        }
    }

    /// Where verbose events and the final report are written. Stdout by default.
    pub fn with_console(mut self, console: Box<dyn Write>) -> Self {
        self.console = console;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn log(&self) -> &[MatchedEvent] {
        &self.log
    }

    pub fn stats(&self) -> &TrafficStats {
        self.stats.snapshot()
    }

    /// Opens the source with the target's filter expression and captures
    /// until the duration limit, an interrupt, or the source running dry.
    /// The report and the capture log are produced before returning.
    ///
    /// A source that cannot be opened ends the session immediately with
    /// `CaptureUnavailable`; nothing is reported or saved in that case.
    pub fn run<S, F>(&mut self, open: F) -> Result<SessionSummary>
    where
        S: PacketSource,
        F: FnOnce(&str) -> Result<S>,
    {
        if self.state != SessionState::Init {
            return Err(Error::SessionOver);
        }

        let filter = self.session.target.filter_expression();
        let mut source = match open(&filter) {
            Ok(source) => source,
            Err(e) => {
                error!("Could not start capture: {}", e);
                self.state = SessionState::Stopped;
                self.finished = true;
                return Err(e);
            }
        };

        self.state = SessionState::Running;
        let started = self.clock.now();
        match self.session.duration_limit() {
            Some(limit) => info!("Monitoring {} for {}s", self.session.target, limit.as_secs()),
            None => info!("Monitoring {} until interrupted", self.session.target),
        }

        let reason = self.pump(&mut source, started);

        self.state = SessionState::Stopping(reason);
        info!("Traffic monitoring stopped: {}", reason);
        source.stop();
        self.state = SessionState::Stopped;

        let persisted = self.finish().and_then(|saved| saved.ok());
        Ok(SessionSummary {
            reason,
            stats: self.stats.snapshot().clone(),
            persisted,
        })
    }

    /// Prints the report and saves the capture log, once. Returns `None`
    /// when the session is not stopped yet or this already happened.
    pub fn finish(&mut self) -> Option<Result<usize>> {
        if self.state != SessionState::Stopped || self.finished {
            return None;
        }
        self.finished = true;

        if let Err(e) = ReportPrinter::print(self.stats.snapshot(), &mut self.console) {
            warn!("Could not print traffic summary: {}", e);
        }

        let saved = self.persister.save(&self.log);
        if let Err(e) = &saved {
            error!("{}", e);
        }
        Some(saved)
    }

    fn pump<S: PacketSource>(&mut self, source: &mut S, started: DateTime<Local>) -> StopReason {
        loop {
            if self.interrupt.is_raised() {
                return StopReason::Interrupt;
            }
            let Some(packet) = source.next_packet() else {
                return if self.interrupt.is_raised() {
                    StopReason::Interrupt
                } else {
                    StopReason::SourceClosed
                };
            };
            if let Some(reason) = self.process(&packet, started) {
                return reason;
            }
        }
    }

    // Handles one frame. Returns a stop reason when the duration limit has
    // been reached after this frame.
    fn process(&mut self, packet: &CapturedPacket, started: DateTime<Local>) -> Option<StopReason> {
        if !filter::matches(packet, &self.session.target) {
            return None;
        }

        let event = match parser::extract(packet, self.clock.now()) {
            Ok(event) => event,
            Err(e) => {
                warn!("Skipping packet: {}", e);
                return None;
            }
        };

        self.log.push(event);
        let event = &self.log[self.log.len() - 1];
        self.stats.record(event);

        if let Err(e) = self.session.notifier.notify(&event.summary) {
            warn!("Alert not delivered: {}", e);
        }
        if self.session.verbose {
            if let Err(e) = writeln!(self.console, "{}", event) {
                debug!("Console write failed: {}", e);
            }
        }

        let limit = self.session.duration_limit()?;
        let elapsed = (self.clock.now() - started).to_std().unwrap_or_default();
        (elapsed >= limit).then_some(StopReason::Timeout)
    }
}
