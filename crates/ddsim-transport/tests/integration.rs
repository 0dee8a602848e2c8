//! # Integration tests: send → fault pipeline → scheduler → channel → receiver
//!
//! Everything runs in-process through the public API: a `SimulatedTransport`
//! with real receive and delivery threads, observed through a collecting
//! receiver.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use ddsim_transport::descriptor::{DelayPattern, LossPattern};
use ddsim_transport::{
    Locator, SimulatedDescriptor, SimulatedTransport, SimulationContext, Transport,
    TransportReceiver,
};

// ─── Helpers ────────────────────────────────────────────────────────────────

#[derive(Default)]
struct Collector {
    frames: Mutex<Vec<(Vec<u8>, Locator, Locator)>>,
}

impl TransportReceiver for Collector {
    fn on_data_received(&self, data: &[u8], local: &Locator, remote: &Locator) {
        self.frames
            .lock()
            .unwrap()
            .push((data.to_vec(), *local, *remote));
    }
}

impl Collector {
    fn payloads(&self) -> Vec<Vec<u8>> {
        self.frames
            .lock()
            .unwrap()
            .iter()
            .map(|(d, _, _)| d.clone())
            .collect()
    }

    fn count(&self) -> usize {
        self.frames.lock().unwrap().len()
    }
}

fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    cond()
}

/// Route library logs to the test harness; `RUST_LOG=debug` shows them.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn endpoint() -> Locator {
    Locator::udp_v4([127, 0, 0, 1], 7412)
}

/// Transport with one input channel and one output channel on `endpoint()`.
fn loopback(desc: SimulatedDescriptor) -> (SimulatedTransport, Arc<Collector>) {
    init_tracing();
    let transport = SimulatedTransport::new(desc, Arc::new(SimulationContext::new())).unwrap();
    let collector = Arc::new(Collector::default());
    transport
        .open_input_channel(&endpoint(), collector.clone(), 65_536)
        .unwrap();
    transport.open_output_channel(&endpoint()).unwrap();
    (transport, collector)
}

fn numbered(i: u32) -> Vec<u8> {
    let mut v = b"RTPS".to_vec();
    v.extend_from_slice(&i.to_le_bytes());
    v.extend_from_slice(&[0xAB; 24]);
    v
}

// ─── Loss ───────────────────────────────────────────────────────────────────

#[test]
fn full_loss_delivers_nothing() {
    let (transport, collector) = loopback(SimulatedDescriptor {
        packet_loss_rate: 1.0,
        ..Default::default()
    });
    for i in 0..1000 {
        assert!(transport.send(&numbered(i), &endpoint()));
    }
    thread::sleep(Duration::from_millis(100));
    assert_eq!(collector.count(), 0);
    let stats = transport.stats();
    assert_eq!(stats.frames_sent, 1000);
    assert_eq!(stats.frames_dropped, 1000);
    assert_eq!(stats.frames_delivered, 0);
}

#[test]
fn zero_loss_delivers_everything_in_order() {
    let (transport, collector) = loopback(SimulatedDescriptor::default());
    for i in 0..1000 {
        assert!(transport.send(&numbered(i), &endpoint()));
    }
    assert!(wait_until(Duration::from_secs(10), || collector.count() == 1000));

    let expected: Vec<Vec<u8>> = (0..1000).map(numbered).collect();
    assert_eq!(collector.payloads(), expected);

    let (_, local, remote) = collector.frames.lock().unwrap()[0].clone();
    assert_eq!(local, endpoint());
    assert_eq!(remote, endpoint());
}

#[test]
fn seeded_runs_lose_the_same_frames() {
    let desc = SimulatedDescriptor {
        packet_loss_rate: 0.3,
        packet_loss_pattern: LossPattern::Burst,
        packet_loss_burst_length: 2,
        seed: 77,
        ..Default::default()
    };

    let mut runs = Vec::new();
    for _ in 0..2 {
        let (transport, collector) = loopback(desc.clone());
        for i in 0..300 {
            transport.send(&numbered(i), &endpoint());
        }
        let expected = 300 - transport.stats().frames_dropped as usize;
        assert!(wait_until(Duration::from_secs(10), || collector.count() == expected));
        runs.push(collector.payloads());
    }
    assert_eq!(runs[0], runs[1]);
    assert!(runs[0].len() < 300);
}

// ─── Corruption ─────────────────────────────────────────────────────────────

#[test]
fn full_corruption_changes_every_frame_but_not_its_length() {
    let (transport, collector) = loopback(SimulatedDescriptor {
        packet_corruption_rate: 1.0,
        corruption_data_ratio: 0.5,
        ..Default::default()
    });
    for i in 0..200 {
        transport.send(&numbered(i), &endpoint());
    }
    assert!(wait_until(Duration::from_secs(10), || collector.count() == 200));

    for (i, payload) in collector.payloads().iter().enumerate() {
        let original = numbered(i as u32);
        assert_eq!(payload.len(), original.len());
        assert_ne!(payload, &original, "frame {i} arrived intact");
    }
    assert_eq!(transport.stats().frames_corrupted, 200);
}

// ─── Delay ──────────────────────────────────────────────────────────────────

#[test]
fn jitter_never_reorders_a_channel() {
    let (transport, collector) = loopback(SimulatedDescriptor {
        network_delay_ms: 5,
        delay_jitter_ms: 5,
        delay_pattern: DelayPattern::Normal,
        seed: 3,
        ..Default::default()
    });
    for i in 0..100 {
        transport.send(&numbered(i), &endpoint());
    }
    assert!(wait_until(Duration::from_secs(10), || collector.count() == 100));
    let expected: Vec<Vec<u8>> = (0..100).map(numbered).collect();
    assert_eq!(collector.payloads(), expected);
}

#[test]
fn delay_does_not_block_the_sender() {
    let (transport, collector) = loopback(SimulatedDescriptor {
        network_delay_ms: 300,
        ..Default::default()
    });
    let start = Instant::now();
    for i in 0..50 {
        transport.send(&numbered(i), &endpoint());
    }
    assert!(start.elapsed() < Duration::from_millis(200));
    assert_eq!(collector.count(), 0);
    assert!(wait_until(Duration::from_secs(10), || collector.count() == 50));
    assert_eq!(transport.stats().frames_delayed, 50);
}

#[test]
fn concurrent_senders_all_arrive() {
    let (transport, collector) = loopback(SimulatedDescriptor::default());
    let transport = Arc::new(transport);
    let handles: Vec<_> = (0..4u32)
        .map(|t| {
            let transport = transport.clone();
            thread::spawn(move || {
                for i in 0..250 {
                    assert!(transport.send(&numbered(t * 1000 + i), &endpoint()));
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    assert!(wait_until(Duration::from_secs(10), || collector.count() == 1000));

    // Per-sender order survives interleaving.
    let payloads = collector.payloads();
    for t in 0..4u32 {
        let mine: Vec<u32> = payloads
            .iter()
            .map(|p| u32::from_le_bytes([p[4], p[5], p[6], p[7]]))
            .filter(|n| n / 1000 == t)
            .collect();
        let expected: Vec<u32> = (0..250).map(|i| t * 1000 + i).collect();
        assert_eq!(mine, expected);
    }
}

// ─── Capture & injection ────────────────────────────────────────────────────

#[test]
fn capture_log_keeps_the_newest_capacity_records() {
    let (transport, _collector) = loopback(SimulatedDescriptor {
        enable_packet_capture: true,
        capture_capacity: 50,
        ..Default::default()
    });
    for i in 0..57 {
        transport.send(&numbered(i), &endpoint());
    }
    let all = transport.all_captures();
    assert_eq!(all.len(), 50);
    assert_eq!(all[0].data.as_ref(), numbered(7).as_slice());
    assert_eq!(all[49].data.as_ref(), numbered(56).as_slice());
    assert_eq!(transport.context().captures().summary().evicted, 7);
}

#[test]
fn injected_frame_is_captured_exactly_once() {
    let (transport, collector) = loopback(SimulatedDescriptor::default());
    let data = numbered(999);

    assert!(transport.inject(&data, "127.0.0.1:7412"));
    assert!(transport.start_monitoring());
    assert!(wait_until(Duration::from_secs(5), || transport.capture_count() == 1));

    // Identical bytes to the identical destination: deduplicated.
    assert!(transport.inject(&data, "127.0.0.1:7412"));
    thread::sleep(Duration::from_millis(50));
    assert_eq!(transport.capture_count(), 1);

    let record = transport.capture_at(0).unwrap();
    assert_eq!(record.destination, "127.0.0.1:7412");
    assert_eq!(record.data.as_ref(), data.as_slice());

    let summary = transport.stop_monitoring().unwrap();
    assert_eq!(summary.total_captured, 1);
    assert_eq!(summary.protocol_frames, 1);

    // Both injections still reached the receiver.
    assert!(wait_until(Duration::from_secs(5), || collector.count() == 2));
}

#[test]
fn monitor_sees_sent_frames_even_when_lost() {
    let (transport, collector) = loopback(SimulatedDescriptor {
        packet_loss_rate: 1.0,
        ..Default::default()
    });
    assert!(transport.start_monitoring());
    transport.send(&numbered(1), &endpoint());
    assert!(wait_until(Duration::from_secs(5), || transport.capture_count() == 1));
    transport.stop_monitoring();
    assert_eq!(collector.count(), 0);
}

// ─── Channel lifecycle ──────────────────────────────────────────────────────

#[test]
fn closing_a_blocked_channel_is_bounded() {
    let (transport, _collector) = loopback(SimulatedDescriptor::default());
    assert!(transport.is_input_channel_open(&endpoint()));

    // The receive loop is idle, waiting for data that never comes.
    thread::sleep(Duration::from_millis(20));
    let start = Instant::now();
    transport.close_input_channel(&endpoint()).unwrap();
    assert!(start.elapsed() < Duration::from_secs(1));
    assert!(!transport.is_input_channel_open(&endpoint()));
    assert!(transport.close_input_channel(&endpoint()).is_err());
}

#[test]
fn frames_scheduled_for_a_closed_channel_are_discarded() {
    let (transport, collector) = loopback(SimulatedDescriptor {
        network_delay_ms: 100,
        ..Default::default()
    });
    for i in 0..10 {
        transport.send(&numbered(i), &endpoint());
    }
    transport.close_input_channel(&endpoint()).unwrap();
    assert!(wait_until(Duration::from_secs(5), || {
        transport.stats().frames_discarded == 10
    }));
    assert_eq!(collector.count(), 0);
}

struct SelfClosing {
    transport: Mutex<Option<Arc<SimulatedTransport>>>,
    seen: Mutex<usize>,
}

impl TransportReceiver for SelfClosing {
    fn on_data_received(&self, _data: &[u8], local: &Locator, _remote: &Locator) {
        *self.seen.lock().unwrap() += 1;
        if let Some(transport) = self.transport.lock().unwrap().as_ref() {
            let _ = transport.close_input_channel(local);
        }
    }
}

#[test]
fn receiver_can_close_its_own_channel() {
    let transport = Arc::new(
        SimulatedTransport::new(
            SimulatedDescriptor::default(),
            Arc::new(SimulationContext::new()),
        )
        .unwrap(),
    );
    let receiver = Arc::new(SelfClosing {
        transport: Mutex::new(Some(transport.clone())),
        seen: Mutex::new(0),
    });
    transport
        .open_input_channel(&endpoint(), receiver.clone(), 1024)
        .unwrap();

    assert!(transport.inject(b"first", "127.0.0.1:7412"));
    assert!(wait_until(Duration::from_secs(5), || {
        !transport.is_input_channel_open(&endpoint())
    }));
    assert_eq!(*receiver.seen.lock().unwrap(), 1);

    // Break the Arc cycle before the transport drops.
    receiver.transport.lock().unwrap().take();
}

#[test]
fn shutdown_closes_everything() {
    let (transport, _collector) = loopback(SimulatedDescriptor {
        network_delay_ms: 1000,
        ..Default::default()
    });
    let other = Locator::udp_v4([127, 0, 0, 1], 7413);
    transport
        .open_input_channel(&other, Arc::new(Collector::default()), 1024)
        .unwrap();
    transport.send(&numbered(0), &endpoint());

    let start = Instant::now();
    transport.shutdown();
    assert!(start.elapsed() < Duration::from_secs(1));
    assert!(!transport.is_input_channel_open(&endpoint()));
    assert!(!transport.is_input_channel_open(&other));
    assert_eq!(transport.stats().frames_discarded, 1);
}
