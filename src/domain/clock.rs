use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicI64, Ordering};

static LAST_TIMESTAMP_MICROS: AtomicI64 = AtomicI64::new(i64::MIN);

/// Current wall-clock time that never goes backwards within the process.
///
/// If the system clock steps back, the most recent timestamp handed out is reused.
pub fn now() -> DateTime<Utc> {
    let wall = Utc::now();
    let micros = wall.timestamp_micros();
    let previous = LAST_TIMESTAMP_MICROS.fetch_max(micros, Ordering::AcqRel);

    if previous > micros {
        DateTime::from_timestamp_micros(previous).unwrap_or(wall)
    } else {
        wall
    }
}
