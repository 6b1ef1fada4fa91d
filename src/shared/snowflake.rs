//! Snowflake ID Generator
//!
//! Time-ordered unique ID generation for every persisted entity.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;

/// Custom epoch (2024-01-01T00:00:00.000Z)
pub const EPOCH_MS: u64 = 1704067200000;

const SEQUENCE_BITS: u64 = 12;
const SEQUENCE_MASK: u64 = (1 << SEQUENCE_BITS) - 1;

/// Snowflake ID generator
///
/// Layout: 41 bits of milliseconds since [`EPOCH_MS`], 10 bits of machine id,
/// 12 bits of sequence. The last issued `(timestamp, sequence)` pair is kept
/// in one atomic word so concurrent callers never observe the same value.
pub struct SnowflakeGenerator {
    machine_id: u64,
    state: AtomicU64,
}

impl SnowflakeGenerator {
    /// Create a new snowflake generator
    pub fn new(machine_id: u64) -> Self {
        Self {
            machine_id: machine_id & 0x3FF, // 10 bits
            state: AtomicU64::new(0),
        }
    }

    /// Generate a new snowflake ID
    pub fn generate(&self) -> i64 {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            let now = current_offset_ms();
            let last_ts = current >> SEQUENCE_BITS;
            let last_seq = current & SEQUENCE_MASK;

            // Clock regressions and sequence overflow borrow from the next millisecond.
            let next = if now > last_ts {
                now << SEQUENCE_BITS
            } else if last_seq < SEQUENCE_MASK {
                current + 1
            } else {
                (last_ts + 1) << SEQUENCE_BITS
            };

            match self
                .state
                .compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => {
                    let ts = next >> SEQUENCE_BITS;
                    let seq = next & SEQUENCE_MASK;
                    return ((ts << 22) | (self.machine_id << SEQUENCE_BITS) | seq) as i64;
                }
                Err(observed) => current = observed,
            }
        }
    }
}

impl Default for SnowflakeGenerator {
    fn default() -> Self {
        Self::new(1)
    }
}

fn current_offset_ms() -> u64 {
    (Utc::now().timestamp_millis() as u64).saturating_sub(EPOCH_MS)
}

/// Extract timestamp (unix milliseconds) from snowflake ID
pub fn extract_timestamp(snowflake: i64) -> u64 {
    ((snowflake as u64) >> 22) + EPOCH_MS
}
