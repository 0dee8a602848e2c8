//! End-to-end HelloWorld runs over the simulated transport.

use std::time::Duration;

use ddsim_sim::{HelloWorldSimulator, SimulatorConfig};
use ddsim_transport::descriptor::CorruptionPattern;
use ddsim_transport::SimulatedDescriptor;

fn quick_config(samples: u32, port: u16) -> SimulatorConfig {
    SimulatorConfig {
        samples,
        interval: Duration::from_millis(5),
        subscriber_endpoint: ddsim_transport::Locator::udp_v4([127, 0, 0, 1], port),
        receive_timeout: Duration::from_secs(3),
        injection_timeout: Duration::from_secs(3),
        ..Default::default()
    }
}

#[test]
fn clean_network_delivers_every_sample() {
    let sim = HelloWorldSimulator::new(quick_config(10, 17410), SimulatedDescriptor::default())
        .unwrap();
    let report = sim.run().unwrap();

    assert_eq!(report.published, 10);
    assert_eq!(report.received, 10);
    assert_eq!(report.undecodable, 0);
    assert_eq!(report.last_index, Some(10));
    assert!(report.injected_received);
    assert_eq!(report.transport.frames_dropped, 0);
    assert_eq!(report.simulated_time.to_nanoseconds(), 50_000_000);

    let captures = report.captures.expect("monitoring was enabled");
    // The monitor polls, so back-to-back frames may coalesce.
    assert!(captures.total_captured > 0, "{captures}");
    assert_eq!(captures.protocol_frames, captures.total_captured);
}

#[test]
fn total_loss_still_sees_injected_sample() {
    let descriptor = SimulatedDescriptor {
        packet_loss_rate: 1.0,
        seed: 3,
        ..Default::default()
    };
    let sim = HelloWorldSimulator::new(quick_config(8, 17411), descriptor).unwrap();
    let report = sim.run().unwrap();

    assert_eq!(report.published, 8);
    assert_eq!(report.received, 0);
    assert_eq!(report.last_index, None);
    assert_eq!(report.transport.frames_dropped, 8);
    assert!(report.injected_received);
}

#[test]
fn corrupted_headers_are_undecodable() {
    let descriptor = SimulatedDescriptor {
        packet_corruption_rate: 1.0,
        corruption_pattern: CorruptionPattern::HeaderCorrupt,
        corruption_data_ratio: 1.0,
        corruption_header_len: 4,
        seed: 11,
        ..Default::default()
    };
    let sim = HelloWorldSimulator::new(quick_config(6, 17412), descriptor).unwrap();
    let report = sim.run().unwrap();

    assert_eq!(report.published, 6);
    assert_eq!(report.received, 0);
    assert_eq!(report.undecodable, 6);
    assert_eq!(report.transport.frames_corrupted, 6);
    assert!(report.injected_received);
}

#[test]
fn report_serializes_to_json() {
    let mut config = quick_config(2, 17413);
    config.monitor = false;
    let sim = HelloWorldSimulator::new(config, SimulatedDescriptor::default()).unwrap();
    let report = sim.run().unwrap();
    assert!(report.captures.is_none());

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["published"], 2);
    assert_eq!(json["received"], 2);
    assert!(json["transport"]["frames_sent"].as_u64().unwrap() >= 2);
}
