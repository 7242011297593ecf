//! Performance benchmarks for the snapshot and schema hot paths

use server::arena::ArenaLand;
use server::config::ServerConfig;
use server::land::Land;
use server::runtime::LandRuntime;
use shared::metrics::{compute_change_metrics, estimate_object_count, ChangeRateState, MetricsConfig};
use shared::schema::{flatten, path_hash, ProtocolSchema, SchemaBuildContext};
use shared::sync::StateNode;
use shared::{Packet, PlayerId, SnapshotValue};
use std::time::Instant;

fn players(count: usize) -> Vec<PlayerId> {
    (0..count).map(|i| PlayerId::new(format!("player-{}", i))).collect()
}

fn populated_runtime(count: usize) -> (LandRuntime<ArenaLand>, Vec<PlayerId>) {
    let mut runtime = LandRuntime::new(ArenaLand::new(7, 10_000), &ServerConfig::default()).unwrap();
    let viewers = players(count);
    for viewer in &viewers {
        runtime.join(viewer).unwrap();
    }
    (runtime, viewers)
}

/// Benchmarks per-viewer snapshot fan-out over a full land
#[test]
fn benchmark_snapshot_fanout() {
    let (runtime, viewers) = populated_runtime(64);

    let iterations = 100;
    let start = Instant::now();

    for _ in 0..iterations {
        let snapshots = runtime.state().snapshot_for_sync(&viewers, None);
        assert!(snapshots.broadcast.is_ok());
        assert_eq!(snapshots.per_player.len(), viewers.len());
    }

    let duration = start.elapsed();
    println!(
        "Snapshot fan-out (64 viewers): {} iterations in {:?} ({:.2} μs/iter)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    // Generous bound for debug builds
    assert!(duration.as_secs() < 10);
}

/// Benchmarks complete sync rounds with every player acting each tick
#[test]
fn benchmark_sync_rounds() {
    let (mut runtime, viewers) = populated_runtime(32);
    let turn = SnapshotValue::from_json(serde_json::json!({"degrees": 15.0}));

    let iterations = 200;
    let start = Instant::now();

    for _ in 0..iterations {
        for viewer in &viewers {
            runtime.apply_action(viewer, "turn", &turn).unwrap();
        }
        runtime.tick();
        let round = runtime.sync_round(&viewers).unwrap();
        assert!(round.is_some());
    }

    let duration = start.elapsed();
    println!(
        "Sync rounds (32 players): {} iterations in {:?} ({:.2} μs/iter)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    assert!(duration.as_secs() < 10);
}

/// Benchmarks schema extraction, flattening and hashing
#[test]
fn benchmark_schema_build() {
    let land = ArenaLand::new(1, 600);

    let iterations = 500;
    let start = Instant::now();

    let mut last_hash = String::new();
    for _ in 0..iterations {
        let schema = ProtocolSchema::builder()
            .land(land.definition())
            .build()
            .unwrap();
        last_hash = schema.schema_hash;
    }

    let duration = start.elapsed();
    println!(
        "Schema build: {} iterations in {:?} ({:.2} μs/iter)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    assert_eq!(last_hash.len(), 16);
    assert!(duration.as_secs() < 10);
}

/// Benchmarks path flattening alone over the demo land's definitions
#[test]
fn benchmark_flattening() {
    let land = ArenaLand::new(1, 600);
    let mut ctx = SchemaBuildContext::new();
    let _ = ctx.convert(&land.definition().state, None);

    let iterations = 2_000;
    let start = Instant::now();

    for _ in 0..iterations {
        let table = flatten("ArenaState", ctx.defs());
        assert!(table.contains_key("players.*.position"));
    }

    let duration = start.elapsed();
    println!(
        "Flattening: {} iterations in {:?} ({:.2} μs/iter)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    assert!(duration.as_secs() < 10);
}

/// Benchmarks path hashing throughput
#[test]
fn benchmark_path_hashing() {
    let paths: Vec<String> = (0..100)
        .map(|i| format!("players.*.inventory.{}.name", i))
        .collect();

    let iterations = 1_000;
    let start = Instant::now();

    let mut acc = 0u32;
    for _ in 0..iterations {
        for path in &paths {
            acc ^= path_hash(path);
        }
    }

    let duration = start.elapsed();
    println!(
        "Path hashing: {} hashes in {:?} ({:.2} ns/hash)",
        iterations * paths.len(),
        duration,
        duration.as_nanos() as f64 / (iterations * paths.len()) as f64
    );

    // even number of rounds cancels out
    assert_eq!(acc, 0);
    assert!(duration.as_secs() < 5);
}

/// Benchmarks change-rate estimation over a large snapshot
#[test]
fn benchmark_change_metrics() {
    let (runtime, _) = populated_runtime(128);
    let snapshot = runtime.state().broadcast_snapshot(None).unwrap();
    let paths: Vec<String> = (0..64)
        .map(|i| format!("players.player-{}.position", i))
        .collect();
    let config = MetricsConfig::default();
    let mut state = ChangeRateState::new();

    let iterations = 1_000;
    let start = Instant::now();

    for _ in 0..iterations {
        let metrics = compute_change_metrics(
            paths.as_slice(),
            &snapshot,
            &mut state,
            &config,
            estimate_object_count,
        );
        assert_eq!(metrics.changed_objects, 64);
    }

    let duration = start.elapsed();
    println!(
        "Change metrics: {} iterations in {:?} ({:.2} μs/iter)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    assert_eq!(state.sync_count, iterations as u64);
    assert!(duration.as_secs() < 10);
}

/// Benchmarks bincode encoding of per-viewer sync packets
#[test]
fn benchmark_packet_serialization() {
    let (mut runtime, viewers) = populated_runtime(32);
    let round = runtime.sync_round(&viewers).unwrap().unwrap();

    let iterations = 1_000;
    let start = Instant::now();
    let mut bytes = 0usize;

    for _ in 0..iterations {
        for part in round.per_player.values() {
            let packet = Packet::StateSync {
                tick: round.tick,
                mode: round.mode,
                broadcast: round.broadcast.clone(),
                per_player: part.clone(),
            };
            bytes += bincode::serialize(&packet).unwrap().len();
        }
    }

    let duration = start.elapsed();
    println!(
        "Packet serialization: {} packets ({} bytes) in {:?}",
        iterations * round.per_player.len(),
        bytes,
        duration
    );

    assert!(bytes > 0);
    assert!(duration.as_secs() < 20);
}
