//! Timestamp encoding shared by timeline attributes and note records.
//!
//! Instants are persisted as a pair: UTC ticks (100 ns intervals since
//! 0001-01-01T00:00:00Z) and the UTC offset in hours.

use chrono::{DateTime, FixedOffset};

/// Caller-resolved timestamp with its original UTC offset.
pub type Timestamp = DateTime<FixedOffset>;

pub const TICKS_PER_SECOND: i64 = 10_000_000;
const NANOS_PER_TICK: u32 = 100;
/// Ticks between 0001-01-01 and 1970-01-01.
const UNIX_EPOCH_TICKS: i64 = 621_355_968_000_000_000;
const MAX_OFFSET_SECONDS: f64 = 86_400.0;

/// Returns UTC ticks, or `None` when the instant does not fit in 64 bits.
pub fn to_utc_ticks(timestamp: &Timestamp) -> Option<i64> {
    timestamp
        .timestamp()
        .checked_mul(TICKS_PER_SECOND)?
        .checked_add(i64::from(timestamp.timestamp_subsec_nanos() / NANOS_PER_TICK))?
        .checked_add(UNIX_EPOCH_TICKS)
}

/// Whether `timestamp` is stored without loss: a whole number of ticks and
/// no leap-second nanoseconds.
pub fn is_tick_exact(timestamp: &Timestamp) -> bool {
    let nanos = timestamp.timestamp_subsec_nanos();
    nanos < 1_000_000_000 && nanos % NANOS_PER_TICK == 0
}

pub fn utc_offset_hours(timestamp: &Timestamp) -> f64 {
    f64::from(timestamp.offset().local_minus_utc()) / 3600.0
}

/// Rebuilds a timestamp from its persisted pair.
///
/// Returns `None` for out-of-range ticks or offsets beyond one day.
pub fn from_utc_ticks(ticks: i64, offset_hours: f64) -> Option<Timestamp> {
    if !offset_hours.is_finite() {
        return None;
    }
    let offset_seconds = (offset_hours * 3600.0).round();
    if offset_seconds.abs() >= MAX_OFFSET_SECONDS {
        return None;
    }
    let offset = FixedOffset::east_opt(offset_seconds as i32)?;

    let relative = ticks.checked_sub(UNIX_EPOCH_TICKS)?;
    let seconds = relative.div_euclid(TICKS_PER_SECOND);
    let nanos = (relative.rem_euclid(TICKS_PER_SECOND) as u32) * NANOS_PER_TICK;
    let utc = DateTime::from_timestamp(seconds, nanos)?;
    Some(utc.with_timezone(&offset))
}
