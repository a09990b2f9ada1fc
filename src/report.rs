use std::fmt::Display;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use log::info;

use crate::error::{Error, Result};
use crate::parser::MatchedEvent;
use crate::stats::TrafficStats;

/// Renders the end-of-session traffic summary.
pub struct ReportPrinter;

impl ReportPrinter {
    pub fn render(stats: &TrafficStats) -> String {
        format!(
            "\nTraffic Summary:\n\
             Total Packets: {}\n\
             Source IPs: {}\n\
             Destination IPs: {}\n\
             Source Ports: {}\n\
             Destination Ports: {}\n",
            stats.total,
            join(stats.source_ips.distinct()),
            join(stats.destination_ips.distinct()),
            join(stats.source_ports.distinct()),
            join(stats.destination_ports.distinct()),
        )
    }

    pub fn print<W: Write>(stats: &TrafficStats, out: &mut W) -> io::Result<()> {
        out.write_all(Self::render(stats).as_bytes())?;
        out.flush()
    }
}

fn join<T: Display>(values: &[T]) -> String {
    values
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Dumps the capture log to a flat text file, one event per line.
pub struct Persister {
    path: PathBuf,
}

impl Persister {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Persister { path: path.into() }
    }

    /// Truncates the file and writes every event in arrival order. Returns
    /// the number of lines written.
    pub fn save(&self, log: &[MatchedEvent]) -> Result<usize> {
        self.write_lines(log).map_err(|source| Error::Persist {
            path: self.path.clone(),
            source,
        })?;
        info!("Saved {} captured packets to {}", log.len(), self.path.display());
        Ok(log.len())
    }

    fn write_lines(&self, log: &[MatchedEvent]) -> io::Result<()> {
        let mut writer = BufWriter::new(File::create(&self.path)?);
        for event in log {
            writeln!(writer, "{}", event)?;
        }
        writer.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::extract;
    use crate::parser::testing::tcp_frame;
    use crate::stats::StatsAggregator;
    use chrono::{Local, TimeZone};
    use std::fs;

    fn scratch_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("rushx_report_{}_{}", std::process::id(), name))
    }

    fn event(src: &str, dst: &str, sport: u16, dport: u16, second: u32) -> MatchedEvent {
        let when = Local.with_ymd_and_hms(2024, 3, 1, 9, 0, second).unwrap();
        extract(&tcp_frame(src, dst, sport, dport), when).unwrap()
    }

    #[test]
    fn test_render_lists_values_in_first_seen_order() {
        let mut aggregator = StatsAggregator::new();
        aggregator.record(&event("10.0.0.5", "10.0.0.2", 40001, 80, 0));
        aggregator.record(&event("10.0.0.5", "10.0.0.1", 40000, 80, 1));
        aggregator.record(&event("10.0.0.5", "10.0.0.2", 40001, 80, 2));

        let report = ReportPrinter::render(aggregator.snapshot());

        assert!(report.contains("Total Packets: 3\n"));
        assert!(report.contains("Source IPs: 10.0.0.5\n"));
        assert!(report.contains("Destination IPs: 10.0.0.2, 10.0.0.1\n"));
        assert!(report.contains("Source Ports: 40001, 40000\n"));
        assert!(report.contains("Destination Ports: 80\n"));
    }

    #[test]
    fn test_render_empty_session() {
        let report = ReportPrinter::render(&TrafficStats::default());
        assert!(report.contains("Total Packets: 0\n"));
        assert!(report.contains("Source IPs: \n"));
        assert!(report.contains("Destination Ports: \n"));
    }

    #[test]
    fn test_save_overwrites_with_one_line_per_event() {
        let path = scratch_path("overwrite.txt");
        fs::write(&path, "stale contents\nfrom an older run\nand more\n").unwrap();
        let log = vec![
            event("10.0.0.5", "10.0.0.1", 40000, 80, 1),
            event("10.0.0.5", "10.0.0.1", 40002, 80, 2),
        ];

        let written = Persister::new(&path).save(&log).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(written, 2);
        assert_eq!(lines, vec![log[0].summary.as_str(), log[1].summary.as_str()]);
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_save_empty_log_writes_empty_file() {
        let path = scratch_path("empty.txt");
        let written = Persister::new(&path).save(&[]).unwrap();
        assert_eq!(written, 0);
        assert_eq!(fs::read_to_string(&path).unwrap(), "");
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_save_to_missing_directory_is_persist_error() {
        let path = scratch_path("no_such_dir").join("captured_packets.txt");
        let result = Persister::new(&path).save(&[]);
        assert!(matches!(result, Err(Error::Persist { .. })));
    }
}
