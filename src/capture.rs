use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded, select};
use log::{debug, error, info, warn};
use pcap::{Activated, Capture, Device};

use crate::error::{Error, Result};
use crate::parser::CapturedPacket;
use crate::session::Interrupt;
use crate::settings::CaptureSettings;

/// Where the capture controller gets its frames from.
pub trait PacketSource {
    /// Blocks until a frame is available. `None` means end-of-stream: the
    /// source was stopped, closed on its own, or the session was interrupted.
    fn next_packet(&mut self) -> Option<CapturedPacket>;

    /// Releases the underlying device. Safe to call more than once.
    fn stop(&mut self);
}

/// Live pcap capture on one interface.
///
/// pcap reads block, so they run on a dedicated thread that feeds a bounded
/// channel. When the consumer falls behind and the channel is full, the
/// newest frame is dropped and counted; the count is reported on `stop`.
pub struct LiveCapture {
    interface: String,
    packets: Receiver<CapturedPacket>,
    wake: Receiver<()>,
    interrupt: Interrupt,
    running: Arc<AtomicBool>,
    dropped: Arc<AtomicU64>,
    worker: Option<JoinHandle<()>>,
}

impl LiveCapture {
    /// Opens `interface` in filtered listening mode. Any failure here is
    /// `CaptureUnavailable` and happens before a single frame is read.
    pub fn open(interface: &str, filter: &str, settings: &CaptureSettings, interrupt: &Interrupt) -> Result<Self> {
        let unavailable = |reason: String| Error::CaptureUnavailable {
            interface: interface.to_string(),
            reason,
        };

        let mut cap = Capture::from_device(interface)
            .map_err(|e| unavailable(e.to_string()))?
            .promisc(settings.promiscuous)
            .snaplen(settings.snaplen)
            .timeout(settings.read_timeout_ms)
            .immediate_mode(true)
            .open()
            .map_err(|e| unavailable(e.to_string()))?;

        cap.filter(filter, true)
            .map_err(|e| unavailable(format!("invalid filter '{}': {}", filter, e)))?;
        info!("Listening on {} with filter '{}'", interface, filter);

        Self::spawn(interface, cap, settings.queue_capacity, interrupt)
    }

    // Moves an already activated capture onto its reader thread.
    fn spawn<T>(interface: &str, cap: Capture<T>, queue_capacity: usize, interrupt: &Interrupt) -> Result<Self>
    where
        T: Activated + 'static,
        Capture<T>: Send,
    {
        let (tx, rx) = bounded(queue_capacity.max(1));
        let running = Arc::new(AtomicBool::new(true));
        let dropped = Arc::new(AtomicU64::new(0));

        let worker = {
            let running = Arc::clone(&running);
            let dropped = Arc::clone(&dropped);
            thread::Builder::new()
                .name(format!("capture-{}", interface))
                .spawn(move || {
                    capture_loop(cap, tx, running, dropped);
                })
                .map_err(|e| Error::CaptureUnavailable {
                    interface: interface.to_string(),
                    reason: e.to_string(),
                })?
        };

        Ok(LiveCapture {
            interface: interface.to_string(),
            packets: rx,
            wake: interrupt.waker(),
            interrupt: interrupt.clone(),
            running,
            dropped,
            worker: Some(worker),
        })
    }

    /// Frames discarded because the hand-off queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl PacketSource for LiveCapture {
    fn next_packet(&mut self) -> Option<CapturedPacket> {
        if self.interrupt.is_raised() || self.worker.is_none() {
            return None;
        }
        select! {
            recv(self.packets) -> packet => packet.ok(),
            recv(self.wake) -> _ => None,
        }
    }

    fn stop(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        self.running.store(false, Ordering::SeqCst);
        if worker.join().is_err() {
            error!("Capture thread for {} panicked", self.interface);
        }

        let dropped = self.dropped();
        if dropped > 0 {
            warn!("Dropped {} packets on {}: consumer could not keep up", dropped, self.interface);
        }
        info!("Capture on {} stopped", self.interface);
    }
}

impl Drop for LiveCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

// Runs until `running` is cleared, the consumer goes away, or pcap fails.
// The read timeout makes sure `running` is rechecked on an idle link.
// Returns the number of frames read from pcap.
fn capture_loop<T: Activated + ?Sized>(
    mut cap: Capture<T>,
    tx: Sender<CapturedPacket>,
    running: Arc<AtomicBool>,
    dropped: Arc<AtomicU64>,
) -> u64 {
    let mut read = 0;
    while running.load(Ordering::SeqCst) {
        match cap.next_packet() {
            Ok(packet) => {
                read += 1;
                match tx.try_send(CapturedPacket::new(packet.data.to_vec())) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        dropped.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(TrySendError::Disconnected(_)) => {
                        info!("Channel closed, shutting down capture thread.");
                        break;
                    }
                }
            }
            Err(pcap::Error::TimeoutExpired) => continue,
            Err(pcap::Error::NoMorePackets) => {
                info!("End of capture reached");
                break;
            }
            Err(e) => {
                error!("Capture error: {}", e);
                break;
            }
        }
    }
    debug!("Capture thread exiting after {} frames", read);
    read
}

/// Capture devices visible to pcap.
pub fn list_devices() -> Result<Vec<Device>> {
    Device::list().map_err(|e| Error::CaptureUnavailable {
        interface: "<any>".to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::testing::tcp_frame;
    use std::fs;
    use std::path::PathBuf;
    use std::time::Duration;

    // Writes a classic little-endian pcap savefile with an Ethernet link type.
    fn savefile(name: &str, frames: &[CapturedPacket]) -> PathBuf {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&0xa1b2_c3d4u32.to_le_bytes());
        bytes.extend_from_slice(&2u16.to_le_bytes());
        bytes.extend_from_slice(&4u16.to_le_bytes());
        bytes.extend_from_slice(&0i32.to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(&65535u32.to_le_bytes());
        bytes.extend_from_slice(&1u32.to_le_bytes());
        for (i, frame) in frames.iter().enumerate() {
            let len = frame.data.len() as u32;
            bytes.extend_from_slice(&(1_700_000_000u32 + i as u32).to_le_bytes());
            bytes.extend_from_slice(&0u32.to_le_bytes());
            bytes.extend_from_slice(&len.to_le_bytes());
            bytes.extend_from_slice(&len.to_le_bytes());
            bytes.extend_from_slice(&frame.data);
        }

        let path = std::env::temp_dir().join(format!("rushx_capture_{}_{}.pcap", std::process::id(), name));
        fs::write(&path, bytes).unwrap();
        path
    }

    fn frames(n: u16) -> Vec<CapturedPacket> {
        (0..n).map(|i| tcp_frame("10.0.0.5", "10.0.0.1", 40000 + i, 80)).collect()
    }

    fn flags() -> (Arc<AtomicBool>, Arc<AtomicU64>) {
        (Arc::new(AtomicBool::new(true)), Arc::new(AtomicU64::new(0)))
    }

    #[test]
    fn test_full_queue_drops_newest_frames() {
        // ARRANGE
        let sent = frames(5);
        let path = savefile("full", &sent);
        let cap = Capture::from_file(&path).unwrap();
        let (tx, rx) = bounded(1);
        let (running, dropped) = flags();

        // ACT: nobody drains the queue while the loop runs
        let read = capture_loop(cap, tx, running, Arc::clone(&dropped));

        // ASSERT
        assert_eq!(read, 5);
        assert_eq!(dropped.load(Ordering::Relaxed), 4);
        assert_eq!(rx.len(), 1);
        assert_eq!(rx.recv().unwrap().data, sent[0].data);
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_closed_consumer_ends_loop() {
        let path = savefile("closed", &frames(5));
        let cap = Capture::from_file(&path).unwrap();
        let (tx, rx) = bounded(8);
        drop(rx);
        let (running, dropped) = flags();

        let read = capture_loop(cap, tx, running, Arc::clone(&dropped));

        assert_eq!(read, 1);
        assert_eq!(dropped.load(Ordering::Relaxed), 0);
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_cleared_running_flag_reads_nothing() {
        let path = savefile("halted", &frames(3));
        let cap = Capture::from_file(&path).unwrap();
        let (tx, _rx) = bounded(8);
        let (running, dropped) = flags();
        running.store(false, Ordering::SeqCst);

        assert_eq!(capture_loop(cap, tx, running, dropped), 0);
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_stop_after_overflow_keeps_drop_count() {
        // ARRANGE
        let sent = frames(4);
        let path = savefile("overflow", &sent);
        let cap = Capture::from_file(&path).unwrap();
        let mut capture = LiveCapture::spawn("savefile", cap, 1, &Interrupt::new()).unwrap();

        // Let the reader thread hit the end of the file before draining.
        while !capture.worker.as_ref().unwrap().is_finished() {
            thread::sleep(Duration::from_millis(5));
        }

        // ACT + ASSERT
        assert_eq!(capture.dropped(), 3);
        assert_eq!(capture.next_packet().unwrap().data, sent[0].data);
        assert!(capture.next_packet().is_none());

        capture.stop();
        capture.stop();
        assert_eq!(capture.dropped(), 3);
        assert!(capture.next_packet().is_none());
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_interrupt_wakes_parked_reader() {
        // ARRANGE: an idle link that never delivers a frame
        let (tx, rx) = bounded::<CapturedPacket>(1);
        let (running, dropped) = flags();
        let worker = {
            let running = Arc::clone(&running);
            thread::spawn(move || {
                let _tx = tx;
                while running.load(Ordering::SeqCst) {
                    thread::sleep(Duration::from_millis(5));
                }
            })
        };
        let interrupt = Interrupt::new();
        let mut capture = LiveCapture {
            interface: "idle".to_string(),
            packets: rx,
            wake: interrupt.waker(),
            interrupt: interrupt.clone(),
            running,
            dropped,
            worker: Some(worker),
        };

        let raiser = {
            let interrupt = interrupt.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(50));
                interrupt.raise();
            })
        };

        // ACT: blocks until the interrupt fires
        let packet = capture.next_packet();
        raiser.join().unwrap();

        // ASSERT
        assert!(packet.is_none());
        assert!(interrupt.is_raised());
        capture.stop();
        assert!(capture.worker.is_none());
    }
}
