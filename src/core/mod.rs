//! Core types for the recording hot path
//!
//! This module contains the fundamental types used throughout the system:
//! - L2Row: one persisted price-level change
//! - Side: bid/ask tag
//! - SpscQueue: single-producer single-consumer handoff queue

pub mod row;
pub mod spsc;

pub use row::{L2Row, Side};
pub use spsc::SpscQueue;
