//! Hourly columnar file
//!
//! One memory-mapped file per clock hour: a 256-byte header followed by
//! four dense column arrays in TS, PX, QTY, SIDE order. The header's row
//! count is the source of truth for readers; only indices `[0, rows)` of
//! each column are valid.

use std::fs::{File, OpenOptions};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use memmap2::{MmapMut, MmapOptions};
use tracing::warn;

use crate::core::L2Row;
use crate::Result;

/// Header size in bytes; the first column starts here
pub const HEADER_SIZE: usize = 256;

/// File magic
pub const MAGIC: &[u8; 6] = b"L2COL\n";

/// On-disk format version
pub const FORMAT_VERSION: u16 = 1;

/// Column order within the file
pub const COL_TS: usize = 0;
pub const COL_PX: usize = 1;
pub const COL_QTY: usize = 2;
pub const COL_SIDE: usize = 3;
pub const COL_COUNT: usize = 4;

/// On-disk file header, little-endian fields.
///
/// All padding is explicit so the struct can be copied byte-for-byte into
/// the map head.
#[repr(C, align(64))]
#[derive(Debug, Clone, Copy)]
pub struct L2ColFileHeader {
    pub magic: [u8; 6],
    pub header_size: u16,
    pub version: u16,
    pub pad16: u16,
    pub pad32: u32,
    /// Product name, ASCII, null-padded
    pub product: [u8; 16],
    /// File hour in epoch seconds, aligned to 3600
    pub hour_epoch_start: u64,
    /// Valid rows; never exceeds what is physically written
    pub rows: u64,
    pub capacity: u64,
    pub col_off: [u64; COL_COUNT],
    pub col_sz: [u64; COL_COUNT],
    pub pad: [u8; 136],
}

const _: () = assert!(std::mem::size_of::<L2ColFileHeader>() == HEADER_SIZE);

impl L2ColFileHeader {
    fn new(
        product: &str,
        hour_s: u64,
        capacity: u64,
        col_off: [u64; COL_COUNT],
        col_sz: [u64; COL_COUNT],
    ) -> Self {
        let mut name = [0u8; 16];
        let n = product.len().min(name.len());
        name[..n].copy_from_slice(&product.as_bytes()[..n]);
        Self {
            magic: *MAGIC,
            header_size: HEADER_SIZE as u16,
            version: FORMAT_VERSION,
            pad16: 0,
            pad32: 0,
            product: name,
            hour_epoch_start: hour_s,
            rows: 0,
            capacity,
            col_off,
            col_sz,
            pad: [0; 136],
        }
    }
}

/// An open hourly file: fd, mapping and cached column pointers.
///
/// Owned exclusively by the writer thread; external consumers map the file
/// read-only and consult the header's row count.
pub struct HourFile {
    file: File,
    map: MmapMut,
    base: *mut u8,
    hdr: L2ColFileHeader,
    hour_s: u64,
    capacity: u64,
    rows: u64,
    ts: *mut u64,
    price: *mut u32,
    qty: *mut f32,
    side: *mut u8,
}

// SAFETY: the raw pointers alias only the owned mapping, and HourFile is
// used from a single thread at a time.
unsafe impl Send for HourFile {}

impl HourFile {
    /// `<base>/YYYYMMDD/HH00.bin`; date and hour are derived in UTC so the
    /// path always agrees with `hour_epoch_start`.
    pub fn path_for_hour(base: &Path, hour_s: u64) -> PathBuf {
        let t = DateTime::<Utc>::from_timestamp(hour_s as i64, 0).unwrap_or_default();
        base.join(t.format("%Y%m%d").to_string())
            .join(t.format("%H00.bin").to_string())
    }

    /// Create, preallocate, map and header-initialize the file for an hour.
    pub fn open(base: &Path, product: &str, hour_s: u64, capacity: u64) -> Result<Self> {
        let ts_bytes = capacity * std::mem::size_of::<u64>() as u64;
        let px_bytes = capacity * std::mem::size_of::<u32>() as u64;
        let qty_bytes = capacity * std::mem::size_of::<f32>() as u64;
        let side_bytes = capacity;

        let mut col_off = [0u64; COL_COUNT];
        let mut col_sz = [0u64; COL_COUNT];
        col_off[COL_TS] = HEADER_SIZE as u64;
        col_sz[COL_TS] = ts_bytes;
        col_off[COL_PX] = col_off[COL_TS] + col_sz[COL_TS];
        col_sz[COL_PX] = px_bytes;
        col_off[COL_QTY] = col_off[COL_PX] + col_sz[COL_PX];
        col_sz[COL_QTY] = qty_bytes;
        col_off[COL_SIDE] = col_off[COL_QTY] + col_sz[COL_QTY];
        col_sz[COL_SIDE] = side_bytes;

        let total = (col_off[COL_SIDE] + col_sz[COL_SIDE]) as usize;

        let path = Self::path_for_hour(base, hour_s);
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o644)
            .open(&path)?;

        preallocate(&file, total)?;

        // SAFETY: the file was just sized to `total` bytes
        let mut map = unsafe { MmapOptions::new().len(total).map_mut(&file)? };
        let base_ptr = map.as_mut_ptr();

        let hdr = L2ColFileHeader::new(product, hour_s, capacity, col_off, col_sz);
        // SAFETY: hdr is repr(C) with explicit padding and HEADER_SIZE bytes
        // fit at the map head
        unsafe {
            std::ptr::copy_nonoverlapping(
                &hdr as *const L2ColFileHeader as *const u8,
                base_ptr,
                HEADER_SIZE,
            );
        }

        // SAFETY: every column lies within the mapping and starts at an
        // offset naturally aligned for its element type
        let (ts, price, qty, side) = unsafe {
            (
                base_ptr.add(col_off[COL_TS] as usize) as *mut u64,
                base_ptr.add(col_off[COL_PX] as usize) as *mut u32,
                base_ptr.add(col_off[COL_QTY] as usize) as *mut f32,
                base_ptr.add(col_off[COL_SIDE] as usize),
            )
        };

        Ok(Self {
            file,
            map,
            base: base_ptr,
            hdr,
            hour_s,
            capacity,
            rows: 0,
            ts,
            price,
            qty,
            side,
        })
    }

    /// Hour this file covers, epoch seconds
    #[inline(always)]
    pub fn hour_s(&self) -> u64 {
        self.hour_s
    }

    /// Rows appended so far
    #[inline(always)]
    pub fn rows(&self) -> u64 {
        self.rows
    }

    /// Append one row at the current index. Returns false when the file is
    /// at capacity; the caller counts the drop.
    #[inline]
    pub fn append(&mut self, row: &L2Row) -> bool {
        let idx = self.rows;
        if idx >= self.capacity {
            return false;
        }
        let i = idx as usize;
        // SAFETY: idx < capacity and each column holds `capacity` entries
        unsafe {
            self.ts.add(i).write(row.ts_ns);
            self.price.add(i).write(row.price);
            self.qty.add(i).write(row.qty);
            self.side.add(i).write(row.side.as_u8());
        }
        self.rows = idx + 1;
        self.hdr.rows = self.rows;
        true
    }

    /// Rewrite the header's row count in the map and fdatasync the file.
    /// Durability is best-effort; failures are logged and ignored.
    pub fn sync_rows(&mut self) {
        self.store_rows_in_header();
        if let Err(e) = self.file.sync_data() {
            warn!(error = %e, hour_s = self.hour_s, "fdatasync failed");
        }
    }

    /// Finalize the header, msync, munmap, fsync and close.
    pub fn close(mut self) {
        self.hdr.rows = self.rows;
        self.store_rows_in_header();
        if let Err(e) = self.map.flush() {
            warn!(error = %e, hour_s = self.hour_s, "msync failed");
        }
        if let Err(e) = self.file.sync_all() {
            warn!(error = %e, hour_s = self.hour_s, "fsync failed");
        }
        // map and fd are released on drop, after header finalization
    }

    fn store_rows_in_header(&mut self) {
        let off = std::mem::offset_of!(L2ColFileHeader, rows);
        // SAFETY: the rows field lies inside the mapped header
        unsafe {
            std::ptr::copy_nonoverlapping(
                &self.hdr.rows as *const u64 as *const u8,
                self.base.add(off),
                std::mem::size_of::<u64>(),
            );
        }
    }
}

/// Preallocate with posix_fallocate, falling back to ftruncate
fn preallocate(file: &File, bytes: usize) -> Result<()> {
    // SAFETY: fallocate on an owned, writable fd
    let rc = unsafe { libc::posix_fallocate(file.as_raw_fd(), 0, bytes as libc::off_t) };
    if rc == 0 {
        return Ok(());
    }
    file.set_len(bytes as u64)?;
    Ok(())
}
