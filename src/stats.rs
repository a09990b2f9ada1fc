use std::collections::HashMap;
use std::hash::Hash;
use std::net::Ipv4Addr;

use crate::parser::MatchedEvent;

/// Occurrence counts for one category of values, remembering the order in
/// which each distinct value was first seen.
#[derive(Debug, Clone)]
pub struct Tally<K> {
    counts: HashMap<K, u64>,
    order: Vec<K>,
}

impl<K: Copy + Eq + Hash> Tally<K> {
    pub fn new() -> Self {
        Tally {
            counts: HashMap::new(),
            order: Vec::new(),
        }
    }

    pub fn increment(&mut self, key: K) {
        let count = self.counts.entry(key).or_insert_with(|| {
            self.order.push(key);
            0
        });
        *count += 1;
    }

    pub fn count(&self, key: &K) -> u64 {
        self.counts.get(key).copied().unwrap_or(0)
    }

    /// Distinct values in first-encountered order.
    pub fn distinct(&self) -> &[K] {
        &self.order
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl<K: Copy + Eq + Hash> Default for Tally<K> {
    fn default() -> Self {
        Self::new()
    }
}

/// Running frequency statistics over matched events.
#[derive(Debug, Clone, Default)]
pub struct TrafficStats {
    pub total: u64,
    pub source_ips: Tally<Ipv4Addr>,
    pub destination_ips: Tally<Ipv4Addr>,
    pub source_ports: Tally<u16>,
    pub destination_ports: Tally<u16>,
}

/// Owns the session's `TrafficStats`. Counters only ever go up.
#[derive(Debug, Default)]
pub struct StatsAggregator {
    stats: TrafficStats,
}

impl StatsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, event: &MatchedEvent) {
        self.stats.total += 1;
        self.stats.source_ips.increment(event.src_ip);
        self.stats.destination_ips.increment(event.dst_ip);
        self.stats.source_ports.increment(event.src_port);
        self.stats.destination_ports.increment(event.dst_port);
    }

    pub fn snapshot(&self) -> &TrafficStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{CapturedPacket, extract};
    use crate::parser::testing::tcp_frame;
    use chrono::Local;

    fn event(src: &str, dst: &str, sport: u16, dport: u16) -> MatchedEvent {
        let packet: CapturedPacket = tcp_frame(src, dst, sport, dport);
        extract(&packet, Local::now()).unwrap()
    }

    #[test]
    fn test_tally_keeps_first_seen_order() {
        let mut tally = Tally::new();
        for port in [443u16, 80, 443, 22, 80] {
            tally.increment(port);
        }
        assert_eq!(tally.distinct(), &[443, 80, 22]);
        assert_eq!(tally.count(&443), 2);
        assert_eq!(tally.count(&22), 1);
        assert_eq!(tally.count(&8080), 0);
    }

    #[test]
    fn test_record_updates_every_category() {
        let mut aggregator = StatsAggregator::new();
        aggregator.record(&event("10.0.0.5", "10.0.0.1", 40000, 80));
        aggregator.record(&event("10.0.0.5", "10.0.0.2", 40001, 80));

        let stats = aggregator.snapshot();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.source_ips.distinct(), &["10.0.0.5".parse::<Ipv4Addr>().unwrap()]);
        assert_eq!(stats.source_ips.count(&"10.0.0.5".parse().unwrap()), 2);
        assert_eq!(stats.destination_ips.distinct().len(), 2);
        assert_eq!(stats.source_ports.distinct(), &[40000, 40001]);
        assert_eq!(stats.destination_ports.distinct(), &[80]);
        assert_eq!(stats.destination_ports.count(&80), 2);
    }

    #[test]
    fn test_empty_snapshot() {
        let aggregator = StatsAggregator::new();
        let stats = aggregator.snapshot();
        assert_eq!(stats.total, 0);
        assert!(stats.source_ips.is_empty());
        assert!(stats.destination_ips.is_empty());
        assert!(stats.source_ports.is_empty());
        assert!(stats.destination_ports.is_empty());
    }
}
