//! Full matches over the loopback network.
//!
//! Clients assert on every checksum they confirm, so reaching the end of a
//! run means every confirmed frame matched the server bit for bit.

use asteroid_harness::{HarnessConfig, MatchDriver, MatchOutcome, NetworkConditions};
use asteroid_replay::{VerifyOptions, read_replay, verify_replay, write_replay};
use asteroid_server::EndReason;
use asteroid_sim::INVALID_PLAYER;

fn config(seed: u64, max_frames: u32) -> HarnessConfig {
    HarnessConfig {
        seed,
        max_frames,
        start_delay_ms: 100,
        ..HarnessConfig::default()
    }
}

fn run(config: &HarnessConfig, conditions: NetworkConditions) -> MatchOutcome {
    let mut driver = MatchDriver::with_conditions(config, conditions);
    driver.run().expect("all datagrams decode");
    driver.finish()
}

fn assert_progressed(outcome: &MatchOutcome, max_frames: u32) {
    assert!(
        outcome.final_frame >= max_frames || outcome.end_reason == EndReason::Complete,
        "server stopped at frame {} ({:?})",
        outcome.final_frame,
        outcome.end_reason
    );
    for &frame in &outcome.client_frames {
        assert!(frame > 0, "a client never confirmed a frame");
        assert!(frame <= outcome.final_frame);
    }
}

#[test]
fn test_perfect_network_match() {
    let config = config(1, 300);
    let outcome = run(&config, NetworkConditions::PERFECT);

    assert_progressed(&outcome, 300);
    assert_eq!(outcome.network.dropped, 0);
    if outcome.end_reason == EndReason::Aborted {
        assert_eq!(outcome.winner, INVALID_PLAYER);
    }
}

#[test]
fn test_lossy_network_match() {
    let config = HarnessConfig {
        packet_loss: 0.1,
        ..config(7, 400)
    };
    let mut driver = MatchDriver::new(&config);
    driver.run().unwrap();

    for client in driver.clients() {
        assert!(client.current_frame() >= client.last_validate_frame());
    }
    let outcome = driver.finish();
    assert_progressed(&outcome, 400);
    assert!(outcome.network.dropped > 0);
}

#[test]
fn test_high_latency_match() {
    let config = config(3, 300);
    let conditions = NetworkConditions {
        reliable_latency_ms: 200,
        unreliable_latency_ms: 200,
        unreliable_margin_ms: 100,
        packet_loss: 0.2,
    };
    let outcome = run(&config, conditions);
    assert_progressed(&outcome, 300);
}

#[test]
fn test_same_seed_same_match() {
    let config = config(11, 250);
    let conditions = NetworkConditions {
        reliable_latency_ms: 40,
        unreliable_latency_ms: 60,
        unreliable_margin_ms: 30,
        packet_loss: 0.05,
    };
    let first = run(&config, conditions);
    let second = run(&config, conditions);
    assert_eq!(first, second);
}

#[test]
fn test_recorded_replay_verifies_from_disk() {
    let config = config(5, 300);
    let outcome = run(&config, NetworkConditions::PERFECT);
    let artifact = outcome.replay.expect("server records replays");
    assert_eq!(artifact.final_frame, outcome.final_frame);
    assert_eq!(artifact.spawns.len(), 2);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("match.replay");
    write_replay(&artifact, &path).unwrap();
    let loaded = read_replay(&path).unwrap();
    assert_eq!(loaded, artifact);
    verify_replay(&loaded, &VerifyOptions::default()).unwrap();
}
