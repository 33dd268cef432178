//! Coinbase l2_data frame parser
//!
//! Walks one reassembled text frame and emits one L2Row per update element.
//! Field keys have known lengths, so after locating a key's opening quote
//! the value starts a fixed distance later; no per-field key scanning.

use super::{find_byte, parse_price, parse_qty, parse_rfc3339_ns};
use crate::core::{L2Row, Side};

/// Frames must start with this literal to be parsed at all
const L2_PREFIX: &[u8] = br#"{"channel":"l2_data""#;

/// Marks the start of the update array
const UPDATES_KEY: &[u8] = br#""updates":["#;

// Key lengths for the fixed-offset value jump: skip the key itself plus
// closing quote, colon and the value's opening quote.
const SIDE_KEY: usize = 4;
const EVENT_TIME_KEY: usize = 10;
const PRICE_LEVEL_KEY: usize = 11;
const NEW_QUANTITY_KEY: usize = 12;

/// Coinbase level2 message parser
pub struct CoinbaseParser;

impl CoinbaseParser {
    /// Check for the l2_data channel prefix (fast path)
    #[inline(always)]
    pub fn is_l2_data(frame: &[u8]) -> bool {
        frame.len() >= L2_PREFIX.len() && &frame[..L2_PREFIX.len()] == L2_PREFIX
    }

    /// Parse one frame, invoking `sink` for every well-formed update element
    /// in array order. Returns the number of rows emitted.
    ///
    /// Non-l2_data frames emit nothing. A structurally broken element stops
    /// the frame; rows already emitted are kept.
    pub fn parse_frame(frame: &[u8], mut sink: impl FnMut(L2Row)) -> usize {
        if !Self::is_l2_data(frame) {
            return 0;
        }
        // empty update array: payload ends "[]}"
        let len = frame.len();
        if len >= 3 && frame[len - 3] == b'[' && frame[len - 2] == b']' {
            return 0;
        }

        let Some(at) = frame
            .windows(UPDATES_KEY.len())
            .position(|w| w == UPDATES_KEY)
        else {
            return 0;
        };

        let end = frame.len();
        let mut p = at + UPDATES_KEY.len();
        let mut emitted = 0usize;

        while p < end && frame[p] != b']' {
            let Some(open) = find_byte(&frame[p..end], b'{') else {
                break;
            };
            p += open + 1;
            let Some(close) = find_byte(&frame[p..end], b'}') else {
                break;
            };
            let obj_end = p + close;

            // side
            let Some(k) = find_byte(&frame[p..obj_end], b'"') else {
                return emitted;
            };
            let v = p + k + 1 + SIDE_KEY + 2 + 1;
            if v >= obj_end {
                return emitted;
            }
            let side = Side::from_first_byte(frame[v]);
            let Some(q) = find_byte(&frame[v..obj_end], b'"') else {
                return emitted;
            };
            p = v + q + 1;

            // event_time
            let Some(k) = find_byte(&frame[p..obj_end], b'"') else {
                return emitted;
            };
            let v = p + k + 1 + EVENT_TIME_KEY + 2 + 1;
            if v >= obj_end {
                return emitted;
            }
            let Some(q) = find_byte(&frame[v..obj_end], b'"') else {
                return emitted;
            };
            let Some(ts_ns) = parse_rfc3339_ns(&frame[v..v + q]) else {
                return emitted;
            };
            p = v + q + 1;

            // price_level
            let Some(k) = find_byte(&frame[p..obj_end], b'"') else {
                return emitted;
            };
            let v = p + k + 1 + PRICE_LEVEL_KEY + 2 + 1;
            if v >= obj_end {
                return emitted;
            }
            let price = parse_price(&frame[v..obj_end]);
            let Some(q) = find_byte(&frame[v..obj_end], b'"') else {
                return emitted;
            };
            p = v + q + 1;

            // new_quantity, with a fast path for removed levels
            let Some(k) = find_byte(&frame[p..obj_end], b'"') else {
                return emitted;
            };
            let v = p + k + 1 + NEW_QUANTITY_KEY + 2 + 1;
            if v >= obj_end {
                return emitted;
            }
            let qty = if frame[v] == b'0' && (v + 1 >= obj_end || frame[v + 1] != b'.') {
                0.0
            } else {
                parse_qty(&frame[v..obj_end])
            };
            if find_byte(&frame[v..obj_end], b'"').is_none() {
                return emitted;
            }

            sink(L2Row::new(ts_ns, price, qty, side));
            emitted += 1;

            p = obj_end + 1;
        }

        emitted
    }
}
