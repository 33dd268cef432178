//! Benchmarks for l2_data frame parsing
//!
//! Target: one pointer-walk per field plus one numeric conversion

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

use l2_recorder::parsing::{find_byte, CoinbaseParser};

// Realistic frame shapes from the level2 channel
const SINGLE_UPDATE: &[u8] = br#"{"channel":"l2_data","client_id":"","timestamp":"2024-06-01T12:00:00.1Z","sequence_num":7,"events":[{"type":"update","product_id":"BTC-USD","updates":[{"side":"bid","event_time":"2024-06-01T12:00:00.123456789Z","price_level":"69420.50","new_quantity":"0.25"}]}]}"#;

const HEARTBEAT: &[u8] = br#"{"channel":"heartbeats","client_id":"","timestamp":"2024-06-01T12:00:00.1Z","sequence_num":8}"#;

fn burst_frame(updates: usize) -> Vec<u8> {
    let mut frame = br#"{"channel":"l2_data","events":[{"updates":["#.to_vec();
    for i in 0..updates {
        if i > 0 {
            frame.push(b',');
        }
        let side = if i % 2 == 0 { "bid" } else { "offer" };
        frame.extend_from_slice(
            format!(
                r#"{{"side":"{}","event_time":"2024-06-01T12:00:{:02}.{:09}Z","price_level":"{}.{:02}","new_quantity":"0.{:03}"}}"#,
                side,
                i % 60,
                i * 1_000,
                69_000 + i,
                i % 100,
                i + 1,
            )
            .as_bytes(),
        );
    }
    frame.extend_from_slice(b"]}]}");
    frame
}

fn bench_single_update(c: &mut Criterion) {
    let mut group = c.benchmark_group("l2_parse");
    group.throughput(Throughput::Bytes(SINGLE_UPDATE.len() as u64));

    group.bench_function("single_update", |b| {
        b.iter(|| {
            let mut count = 0usize;
            CoinbaseParser::parse_frame(black_box(SINGLE_UPDATE), |row| {
                count += 1;
                black_box(row);
            });
            black_box(count);
        })
    });

    group.finish();
}

fn bench_burst(c: &mut Criterion) {
    let frame = burst_frame(50);
    let mut group = c.benchmark_group("l2_parse");
    group.throughput(Throughput::Bytes(frame.len() as u64));

    group.bench_function("burst_50", |b| {
        b.iter(|| {
            let mut count = 0usize;
            CoinbaseParser::parse_frame(black_box(&frame), |row| {
                count += 1;
                black_box(row);
            });
            black_box(count);
        })
    });

    group.finish();
}

fn bench_rejection(c: &mut Criterion) {
    let mut group = c.benchmark_group("l2_parse");

    group.bench_function("heartbeat_reject", |b| {
        b.iter(|| {
            let n = CoinbaseParser::parse_frame(black_box(HEARTBEAT), |_| {});
            black_box(n);
        })
    });

    group.finish();
}

fn bench_find_byte(c: &mut Criterion) {
    let hay = burst_frame(50);
    let mut group = c.benchmark_group("find_byte");
    group.throughput(Throughput::Bytes(hay.len() as u64));

    group.bench_function("scan_terminator", |b| {
        b.iter(|| {
            let pos = find_byte(black_box(&hay), b']');
            black_box(pos);
        })
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_single_update,
    bench_burst,
    bench_rejection,
    bench_find_byte
);

criterion_main!(benches);
