//! Columnar hourly writer
//!
//! Owns the writer thread: dequeues rows from the handoff queue, rotates
//! hourly files on hour boundaries, appends the four columns in place and
//! keeps the header row count durable.

pub mod file;

pub use file::{HourFile, L2ColFileHeader, COL_COUNT, HEADER_SIZE, MAGIC};

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{error, info, warn};

use crate::core::{L2Row, SpscQueue};

/// Rows per hourly file
pub const ROWS_PER_HOUR: u64 = 1 << 24;

/// Handoff queue capacity (power of two)
pub const QUEUE_CAPACITY: usize = 1 << 18;

/// Sleep between dequeue attempts when the queue is empty
const IDLE_SLEEP: Duration = Duration::from_micros(50);

/// Sentinel for "no file open"
const NO_HOUR: u64 = u64::MAX;

/// Hour containing `ts_ns`, as epoch seconds aligned to 3600
#[inline(always)]
pub fn hour_start_from_ns(ts_ns: u64) -> u64 {
    let s = ts_ns / 1_000_000_000;
    (s / 3600) * 3600
}

/// Writer options
#[derive(Debug, Clone)]
pub struct WriterOpt {
    pub base_dir: PathBuf,
    pub product: String,
    /// Rows per hourly file
    pub capacity: u64,
    /// fdatasync the header row count every N appends (0 disables)
    pub fsync_every_rows: u32,
}

impl WriterOpt {
    pub fn new(base_dir: impl Into<PathBuf>, product: impl Into<String>) -> Self {
        Self {
            base_dir: base_dir.into(),
            product: product.into(),
            capacity: ROWS_PER_HOUR,
            fsync_every_rows: 0,
        }
    }

    pub fn capacity(mut self, capacity: u64) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn fsync_every_rows(mut self, n: u32) -> Self {
        self.fsync_every_rows = n;
        self
    }
}

struct WriterShared {
    queue: SpscQueue<L2Row>,
    rows: AtomicU64,
    dropped: AtomicU64,
    hour_s: AtomicU64,
    stop: AtomicBool,
    opt: WriterOpt,
}

/// Consumes rows from the queue and persists them to one open hourly file,
/// rotating when rows cross hour boundaries.
pub struct L2Writer {
    shared: Arc<WriterShared>,
    thread: Option<JoinHandle<()>>,
}

impl L2Writer {
    pub fn new(opt: WriterOpt) -> Self {
        let shared = Arc::new(WriterShared {
            queue: SpscQueue::with_capacity(QUEUE_CAPACITY),
            rows: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            hour_s: AtomicU64::new(NO_HOUR),
            stop: AtomicBool::new(false),
            opt,
        });
        Self {
            shared,
            thread: None,
        }
    }

    /// Non-blocking enqueue from the producer thread. Returns false when
    /// the queue is full and the row was dropped.
    #[inline]
    pub fn enqueue(&self, row: L2Row) -> bool {
        self.shared.queue.enqueue(row)
    }

    /// Cloneable producer-side handle for the feed thread
    pub fn handle(&self) -> WriterHandle {
        WriterHandle {
            shared: self.shared.clone(),
        }
    }

    /// Spawn the writer thread; idempotent.
    pub fn start(&mut self) {
        if self.thread.is_some() {
            return;
        }
        self.shared.stop.store(false, Ordering::Release);
        let shared = self.shared.clone();
        match thread::Builder::new()
            .name("l2-writer".to_string())
            .spawn(move || run(shared))
        {
            Ok(handle) => self.thread = Some(handle),
            Err(e) => error!(error = %e, "failed to spawn writer thread"),
        }
    }

    /// Signal the writer thread to drain the queue and exit
    pub fn stop(&self) {
        self.shared.stop.store(true, Ordering::Release);
    }

    /// Wait for the writer thread to terminate
    pub fn join(&mut self) {
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }

    /// Rows appended to the currently open file
    pub fn rows(&self) -> u64 {
        self.shared.rows.load(Ordering::Acquire)
    }

    /// Rows discarded by the writer (file at capacity or rotation failure)
    pub fn dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    /// Hour of the open file in epoch seconds, or u64::MAX when none
    pub fn hour_s(&self) -> u64 {
        self.shared.hour_s.load(Ordering::Acquire)
    }
}

impl Drop for L2Writer {
    fn drop(&mut self) {
        self.stop();
        self.join();
    }
}

/// Producer-side handle: enqueue only, plus counters
#[derive(Clone)]
pub struct WriterHandle {
    shared: Arc<WriterShared>,
}

impl WriterHandle {
    #[inline]
    pub fn enqueue(&self, row: L2Row) -> bool {
        self.shared.queue.enqueue(row)
    }

    pub fn rows(&self) -> u64 {
        self.shared.rows.load(Ordering::Acquire)
    }

    pub fn dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }
}

/// Writer thread body. Runs until stop is signaled and the queue is
/// drained, then closes the open file.
fn run(shared: Arc<WriterShared>) {
    let mut open: Option<HourFile> = None;
    let mut since_sync: u32 = 0;

    loop {
        let row = match shared.queue.dequeue() {
            Some(row) => row,
            None => {
                if shared.stop.load(Ordering::Acquire) {
                    break;
                }
                thread::sleep(IDLE_SLEEP);
                continue;
            }
        };

        let hour = hour_start_from_ns(row.ts_ns);
        if open.as_ref().map(|f| f.hour_s()) != Some(hour) {
            if let Some(f) = open.take() {
                close_file(f, &shared);
            }
            match HourFile::open(
                &shared.opt.base_dir,
                &shared.opt.product,
                hour,
                shared.opt.capacity,
            ) {
                Ok(f) => {
                    info!(hour_s = hour, "opened hourly file");
                    shared.hour_s.store(hour, Ordering::Release);
                    shared.rows.store(0, Ordering::Release);
                    since_sync = 0;
                    open = Some(f);
                }
                Err(e) => {
                    warn!(error = %e, hour_s = hour, "rotation failed, dropping row");
                    shared.dropped.fetch_add(1, Ordering::Relaxed);
                    continue;
                }
            }
        }

        if let Some(f) = open.as_mut() {
            if !f.append(&row) {
                shared.dropped.fetch_add(1, Ordering::Relaxed);
                continue;
            }
            shared.rows.store(f.rows(), Ordering::Release);
            since_sync += 1;
            if shared.opt.fsync_every_rows != 0 && since_sync >= shared.opt.fsync_every_rows {
                f.sync_rows();
                since_sync = 0;
            }
        }
    }

    if let Some(f) = open.take() {
        close_file(f, &shared);
    }
}

fn close_file(f: HourFile, shared: &WriterShared) {
    info!(hour_s = f.hour_s(), rows = f.rows(), "closing hourly file");
    f.close();
    shared.rows.store(0, Ordering::Release);
    shared.hour_s.store(NO_HOUR, Ordering::Release);
}
