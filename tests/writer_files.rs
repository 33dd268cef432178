//! End-to-end writer scenarios over temporary directories
//!
//! Rows are enqueued before the writer starts, then the queue is drained on
//! stop, so every scenario is deterministic.

use std::path::Path;
use std::time::{Duration, Instant};

use l2_recorder::core::{L2Row, Side};
use l2_recorder::parsing::CoinbaseParser;
use l2_recorder::writer::{L2Writer, WriterOpt, HEADER_SIZE, MAGIC};

/// 2024-06-01T12:00:00Z
const HOUR: u64 = 1_717_243_200;

struct Header {
    magic: [u8; 6],
    header_size: u16,
    version: u16,
    product: Vec<u8>,
    hour_epoch_start: u64,
    rows: u64,
    capacity: u64,
    col_off: [u64; 4],
    col_sz: [u64; 4],
}

fn u16_at(b: &[u8], off: usize) -> u16 {
    u16::from_le_bytes([b[off], b[off + 1]])
}

fn u32_at(b: &[u8], off: usize) -> u32 {
    let mut v = [0u8; 4];
    v.copy_from_slice(&b[off..off + 4]);
    u32::from_le_bytes(v)
}

fn u64_at(b: &[u8], off: usize) -> u64 {
    let mut v = [0u8; 8];
    v.copy_from_slice(&b[off..off + 8]);
    u64::from_le_bytes(v)
}

fn read_header(bytes: &[u8]) -> Header {
    let mut magic = [0u8; 6];
    magic.copy_from_slice(&bytes[..6]);
    let mut col_off = [0u64; 4];
    let mut col_sz = [0u64; 4];
    for i in 0..4 {
        col_off[i] = u64_at(bytes, 56 + i * 8);
        col_sz[i] = u64_at(bytes, 88 + i * 8);
    }
    Header {
        magic,
        header_size: u16_at(bytes, 6),
        version: u16_at(bytes, 8),
        product: bytes[16..32].to_vec(),
        hour_epoch_start: u64_at(bytes, 32),
        rows: u64_at(bytes, 40),
        capacity: u64_at(bytes, 48),
        col_off,
        col_sz,
    }
}

fn row_at(bytes: &[u8], hdr: &Header, idx: usize) -> (u64, u32, f32, u8) {
    let ts = u64_at(bytes, hdr.col_off[0] as usize + idx * 8);
    let px = u32_at(bytes, hdr.col_off[1] as usize + idx * 4);
    let qty = f32::from_bits(u32_at(bytes, hdr.col_off[2] as usize + idx * 4));
    let side = bytes[hdr.col_off[3] as usize + idx];
    (ts, px, qty, side)
}

fn drain(writer: &mut L2Writer) {
    writer.start();
    writer.stop();
    writer.join();
}

fn file_for_hour(base: &Path, hour_s: u64) -> std::path::PathBuf {
    let t = chrono::DateTime::<chrono::Utc>::from_timestamp(hour_s as i64, 0).unwrap();
    base.join(t.format("%Y%m%d").to_string())
        .join(t.format("%H00.bin").to_string())
}

#[test]
fn single_update_produces_one_file() {
    let dir = tempfile::tempdir().unwrap();
    let opt = WriterOpt::new(dir.path(), "BTC-USD").capacity(1024);
    let mut writer = L2Writer::new(opt);

    let row = L2Row::new(HOUR * 1_000_000_000, 10050, 0.25, Side::Bid);
    assert!(writer.enqueue(row));
    drain(&mut writer);

    let path = file_for_hour(dir.path(), HOUR);
    let bytes = std::fs::read(&path).unwrap();
    let hdr = read_header(&bytes);

    assert_eq!(&hdr.magic, MAGIC);
    assert_eq!(hdr.header_size as usize, HEADER_SIZE);
    assert_eq!(hdr.version, 1);
    assert_eq!(&hdr.product[..7], b"BTC-USD");
    assert!(hdr.product[7..].iter().all(|&b| b == 0));
    assert_eq!(hdr.hour_epoch_start, HOUR);
    assert_eq!(hdr.rows, 1);
    assert_eq!(hdr.capacity, 1024);

    // columns are contiguous from the end of the header
    assert_eq!(hdr.col_off[0] as usize, HEADER_SIZE);
    for i in 0..3 {
        assert_eq!(hdr.col_off[i] + hdr.col_sz[i], hdr.col_off[i + 1]);
    }
    assert_eq!(
        bytes.len() as u64,
        hdr.col_off[3] + hdr.col_sz[3],
        "file sized to header + columns"
    );

    let (ts, px, qty, side) = row_at(&bytes, &hdr, 0);
    assert_eq!(ts, HOUR * 1_000_000_000);
    assert_eq!(px, 10050);
    assert_eq!(qty, 0.25);
    assert_eq!(side, 0);

    assert_eq!(writer.dropped(), 0);
}

#[test]
fn rows_persist_in_insertion_order() {
    let dir = tempfile::tempdir().unwrap();
    let opt = WriterOpt::new(dir.path(), "BTC-USD").capacity(1024);
    let mut writer = L2Writer::new(opt);

    for i in 0..100u64 {
        let side = if i % 2 == 0 { Side::Bid } else { Side::Ask };
        let row = L2Row::new(
            HOUR * 1_000_000_000 + i,
            10000 + i as u32,
            i as f32 * 0.5,
            side,
        );
        assert!(writer.enqueue(row));
    }
    drain(&mut writer);

    let bytes = std::fs::read(file_for_hour(dir.path(), HOUR)).unwrap();
    let hdr = read_header(&bytes);
    assert_eq!(hdr.rows, 100);

    for i in 0..100usize {
        let (ts, px, qty, side) = row_at(&bytes, &hdr, i);
        assert_eq!(ts, HOUR * 1_000_000_000 + i as u64);
        assert_eq!(px, 10000 + i as u32);
        assert_eq!(qty, i as f32 * 0.5);
        assert_eq!(side, (i % 2) as u8);
    }
}

#[test]
fn hour_rotation_closes_and_opens() {
    let dir = tempfile::tempdir().unwrap();
    let opt = WriterOpt::new(dir.path(), "BTC-USD").capacity(1024);
    let mut writer = L2Writer::new(opt);

    let next_hour = HOUR + 3600;
    writer.enqueue(L2Row::new(HOUR * 1_000_000_000, 10050, 0.25, Side::Bid));
    writer.enqueue(L2Row::new(next_hour * 1_000_000_000, 10100, 1.5, Side::Ask));
    drain(&mut writer);

    let first = std::fs::read(file_for_hour(dir.path(), HOUR)).unwrap();
    let second = std::fs::read(file_for_hour(dir.path(), next_hour)).unwrap();

    let h1 = read_header(&first);
    let h2 = read_header(&second);
    assert_eq!(h1.rows, 1);
    assert_eq!(h1.hour_epoch_start, HOUR);
    assert_eq!(h2.rows, 1);
    assert_eq!(h2.hour_epoch_start, next_hour);

    let (_, px, _, side) = row_at(&second, &h2, 0);
    assert_eq!(px, 10100);
    assert_eq!(side, 1);
}

#[test]
fn burst_beyond_capacity_drops() {
    let dir = tempfile::tempdir().unwrap();
    let opt = WriterOpt::new(dir.path(), "BTC-USD").capacity(64);
    let mut writer = L2Writer::new(opt);

    for i in 0..69u64 {
        let row = L2Row::new(HOUR * 1_000_000_000 + i, 10000, 1.0, Side::Bid);
        assert!(writer.enqueue(row));
    }
    drain(&mut writer);

    let bytes = std::fs::read(file_for_hour(dir.path(), HOUR)).unwrap();
    let hdr = read_header(&bytes);
    assert_eq!(hdr.rows, 64);
    assert_eq!(writer.dropped(), 5);
}

#[test]
fn periodic_fsync_publishes_row_count() {
    let dir = tempfile::tempdir().unwrap();
    let opt = WriterOpt::new(dir.path(), "BTC-USD")
        .capacity(1024)
        .fsync_every_rows(4);
    let mut writer = L2Writer::new(opt);

    for i in 0..8u64 {
        writer.enqueue(L2Row::new(HOUR * 1_000_000_000 + i, 10000, 1.0, Side::Bid));
    }
    writer.start();

    // wait for the writer to drain without stopping it
    let deadline = Instant::now() + Duration::from_secs(5);
    while writer.rows() < 8 {
        assert!(Instant::now() < deadline, "writer did not drain in time");
        std::thread::sleep(Duration::from_millis(1));
    }

    // a fresh read of the still-open file sees the synced count
    let bytes = std::fs::read(file_for_hour(dir.path(), HOUR)).unwrap();
    let hdr = read_header(&bytes);
    assert!(hdr.rows >= 4, "expected a synced row count, got {}", hdr.rows);

    writer.stop();
    writer.join();

    let bytes = std::fs::read(file_for_hour(dir.path(), HOUR)).unwrap();
    assert_eq!(read_header(&bytes).rows, 8);
}

#[test]
fn parser_to_writer_end_to_end() {
    let frame = br#"{"channel":"l2_data","events":[{"updates":[{"side":"bid","event_time":"2024-06-01T12:00:00.000000000Z","price_level":"100.50","new_quantity":"0.25"},{"side":"offer","event_time":"2024-06-01T12:00:01Z","price_level":"100.75","new_quantity":"0"}]}]}"#;

    let dir = tempfile::tempdir().unwrap();
    let opt = WriterOpt::new(dir.path(), "BTC-USD").capacity(1024);
    let mut writer = L2Writer::new(opt);

    let handle = writer.handle();
    let emitted = CoinbaseParser::parse_frame(frame, |row| {
        handle.enqueue(row);
    });
    assert_eq!(emitted, 2);
    drain(&mut writer);

    let bytes = std::fs::read(file_for_hour(dir.path(), HOUR)).unwrap();
    let hdr = read_header(&bytes);
    assert_eq!(hdr.rows, 2);

    let (ts, px, qty, side) = row_at(&bytes, &hdr, 0);
    assert_eq!(ts, HOUR * 1_000_000_000);
    assert_eq!(px, 10050);
    assert_eq!(qty, 0.25);
    assert_eq!(side, 0);

    let (ts, px, qty, side) = row_at(&bytes, &hdr, 1);
    assert_eq!(ts, (HOUR + 1) * 1_000_000_000);
    assert_eq!(px, 10075);
    assert_eq!(qty, 0.0);
    assert_eq!(side, 1);
}
