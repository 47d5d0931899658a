//! Recording file names.
//!
//! A session gets a base name once at start: `rec_YYYYMMDD_HHMMSS` when the
//! wall clock is trustworthy, otherwise `rec_NNN` with NNN one past the
//! highest number already on disk. Parts after the first carry `_p<n>`.

use std::fs;
use std::path::Path;

use chrono::{DateTime, Datelike, Local};

use crate::error::{RecorderError, Result};

pub const NAME_PREFIX: &str = "rec_";
pub const EXTENSION: &str = "wav";

/// Earliest year a clock reading is believed. An unsynchronised RTC starts
/// at the epoch.
pub const MIN_TRUSTED_YEAR: i32 = 2024;

pub trait WallClock: Send {
    /// Current local time, or `None` if the clock has not been set.
    fn now(&self) -> Option<DateTime<Local>>;
}

pub struct SystemClock;

impl WallClock for SystemClock {
    fn now(&self) -> Option<DateTime<Local>> {
        let now = Local::now();
        (now.year() >= MIN_TRUSTED_YEAR).then_some(now)
    }
}

/// A clock that is never set.
pub struct NoClock;

impl WallClock for NoClock {
    fn now(&self) -> Option<DateTime<Local>> {
        None
    }
}

pub fn timestamp_base_name(at: &DateTime<Local>) -> String {
    format!("{}{}", NAME_PREFIX, at.format("%Y%m%d_%H%M%S"))
}

/// File name of part `part` (1-based) of a session.
pub fn part_file_name(base: &str, part: u32) -> String {
    if part <= 1 {
        format!("{}.{}", base, EXTENSION)
    } else {
        format!("{}_p{}.{}", base, part, EXTENSION)
    }
}

/// Sequence number of a `rec_NNN.wav` or `rec_NNN_pK.wav` name.
fn sequence_number(file_name: &str) -> Option<u64> {
    let stem = file_name
        .strip_prefix(NAME_PREFIX)?
        .strip_suffix(EXTENSION)?
        .strip_suffix('.')?;
    let digits = match stem.split_once("_p") {
        Some((digits, part)) if !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit()) => {
            digits
        }
        Some(_) => return None,
        None => stem,
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// `rec_NNN` one past the highest sequence number in `dir`.
pub fn next_sequential_base_name(dir: &Path) -> Result<String> {
    let mut highest = None;
    if dir.exists() {
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if let Some(n) = entry.file_name().to_str().and_then(sequence_number) {
                highest = highest.max(Some(n));
            }
        }
    }
    let next = match highest {
        None => 1,
        Some(n) => n.checked_add(1).ok_or_else(|| {
            RecorderError::Other(anyhow::anyhow!(
                "no sequence number left after {}{}",
                NAME_PREFIX,
                n
            ))
        })?,
    };
    Ok(format!("{}{:03}", NAME_PREFIX, next))
}

/// Pick a base name for a new session, preferring the clock. Falls back to
/// the sequential scheme if the time-based first part already exists.
pub fn choose_base_name(dir: &Path, clock: &dyn WallClock) -> Result<String> {
    if let Some(now) = clock.now() {
        let base = timestamp_base_name(&now);
        if !dir.join(part_file_name(&base, 1)).exists() {
            return Ok(base);
        }
    }
    next_sequential_base_name(dir)
}
