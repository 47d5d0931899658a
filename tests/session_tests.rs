// Integration tests for the recording session manager
//
// These tests drive SessionManager directly against a temporary recordings
// directory and check what lands on disk.

use anyhow::Result;
use chrono::{DateTime, Local, TimeZone};
use sentinel_recorder::container::{read_container, Encoding};
use sentinel_recorder::recording::{
    CloseReason, FixedProbe, NoClock, Provenance, QuotaProbe, SessionConfig, SessionManager,
    WallClock,
};
use sentinel_recorder::RecorderError;
use std::fs;
use tempfile::TempDir;

struct FixedClock(DateTime<Local>);

impl WallClock for FixedClock {
    fn now(&self) -> Option<DateTime<Local>> {
        Some(self.0)
    }
}

fn ramp(len: usize) -> Vec<i16> {
    (0..len).map(|i| (i % 30_000) as i16).collect()
}

#[test]
fn test_split_produces_sequential_parts() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let mut config = SessionConfig::new(temp_dir.path(), 20_000);
    config.split_samples = 20_000; // one second per part
    let mut sessions =
        SessionManager::new(config, Box::new(FixedProbe(u64::MAX)), Box::new(NoClock));

    sessions.request_start(Provenance::Automatic, Encoding::Linear)?;
    let samples = ramp(25_000);
    for chunk in samples.chunks(400) {
        sessions.append(chunk)?;
    }
    let closed = sessions.request_stop()?;

    assert_eq!(closed.base_name, "rec_001");
    assert_eq!(closed.provenance, Provenance::Automatic);
    assert_eq!(closed.parts.len(), 2);
    assert_eq!(closed.total_samples(), 25_000);

    let first = read_container(temp_dir.path().join("rec_001.wav"))?;
    let second = read_container(temp_dir.path().join("rec_001_p2.wav"))?;
    assert_eq!(first.samples.len(), 20_000);
    assert_eq!(second.samples.len(), 5_000);
    assert_eq!(first.samples, samples[..20_000]);
    assert_eq!(second.samples, samples[20_000..]);

    Ok(())
}

#[test]
fn test_many_parts_keep_base_name() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let mut config = SessionConfig::new(temp_dir.path(), 1_000);
    config.split_samples = 1_000;
    config.write_buffer_samples = 300;
    let mut sessions =
        SessionManager::new(config, Box::new(FixedProbe(u64::MAX)), Box::new(NoClock));

    sessions.request_start(Provenance::Manual, Encoding::MuLaw)?;
    // one append spanning several parts
    sessions.append(&ramp(3_500))?;
    let closed = sessions.request_stop()?;

    let names: Vec<String> = closed
        .parts
        .iter()
        .filter_map(|p| p.path.as_ref())
        .filter_map(|p| p.file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .collect();
    assert_eq!(
        names,
        ["rec_001.wav", "rec_001_p2.wav", "rec_001_p3.wav", "rec_001_p4.wav"]
    );
    let sizes: Vec<u64> = closed.parts.iter().map(|p| p.data_size).collect();
    assert_eq!(sizes, [1_000, 1_000, 1_000, 500]);

    Ok(())
}

#[test]
fn test_time_based_name_when_clock_is_set() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let at = Local.with_ymd_and_hms(2025, 6, 1, 8, 30, 0).unwrap();
    let mut sessions = SessionManager::new(
        SessionConfig::new(temp_dir.path(), 20_000),
        Box::new(FixedProbe(u64::MAX)),
        Box::new(FixedClock(at)),
    );

    let info = sessions.request_start(Provenance::Manual, Encoding::Linear)?;
    assert_eq!(info.file_name, "rec_20250601_083000.wav");
    assert_eq!(info.started_at, Some(at));
    sessions.request_stop()?;

    // same second again: the sequential scheme takes over
    let info = sessions.request_start(Provenance::Manual, Encoding::Linear)?;
    assert_eq!(info.file_name, "rec_001.wav");

    Ok(())
}

#[test]
fn test_sequential_name_continues_after_existing_files() -> Result<()> {
    let temp_dir = TempDir::new()?;
    fs::write(temp_dir.path().join("rec_012.wav"), b"")?;
    fs::write(temp_dir.path().join("rec_003_p2.wav"), b"")?;

    let mut sessions = SessionManager::new(
        SessionConfig::new(temp_dir.path(), 20_000),
        Box::new(FixedProbe(u64::MAX)),
        Box::new(NoClock),
    );
    let info = sessions.request_start(Provenance::Manual, Encoding::Linear)?;
    assert_eq!(info.file_name, "rec_013.wav");
    assert!(info.started_at.is_none());

    Ok(())
}

#[test]
fn test_quota_fills_and_forces_stop() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let mut config = SessionConfig::new(temp_dir.path(), 20_000);
    config.min_free_start_bytes = 64 * 1024;
    config.min_free_continue_bytes = 16 * 1024;
    config.space_check_interval_chunks = 1;
    config.write_buffer_samples = 400;
    let mut sessions = SessionManager::new(
        config,
        Box::new(QuotaProbe::new(temp_dir.path(), 100 * 1024)),
        Box::new(NoClock),
    );

    sessions.request_start(Provenance::Automatic, Encoding::Linear)?;

    // 800 bytes per chunk; stop once under 16 KiB of the 100 KiB quota is left
    let mut forced = None;
    for _ in 0..200 {
        sessions.append(&[1000; 400])?;
        if let Some(closed) = sessions.tick()? {
            forced = Some(closed);
            break;
        }
    }
    let closed = forced.expect("quota never ran out");
    assert_eq!(closed.reason, CloseReason::SpaceLow);
    let free = sessions.last_free_bytes().unwrap_or(u64::MAX);
    assert!(free < 16 * 1024);

    // hysteresis: a new start needs the higher watermark
    match sessions.request_start(Provenance::Automatic, Encoding::Linear) {
        Err(RecorderError::StorageFull { required_bytes, .. }) => {
            assert_eq!(required_bytes, 64 * 1024)
        }
        other => panic!("expected StorageFull, got {other:?}"),
    }

    Ok(())
}

#[test]
fn test_each_buffer_flush_reaches_disk() -> Result<()> {
    for (encoding, bytes_per_sample) in [(Encoding::MuLaw, 1u64), (Encoding::Linear, 2)] {
        let temp_dir = TempDir::new()?;
        let mut config = SessionConfig::new(temp_dir.path(), 20_000);
        config.write_buffer_samples = 8_000;
        let mut sessions =
            SessionManager::new(config, Box::new(FixedProbe(u64::MAX)), Box::new(NoClock));

        sessions.request_start(Provenance::Manual, encoding)?;
        let path = temp_dir.path().join("rec_001.wav");
        // header is on disk before any audio
        assert_eq!(fs::metadata(&path)?.len(), 44);

        // exactly one full buffer, session still open
        sessions.append(&ramp(8_000))?;
        assert_eq!(fs::metadata(&path)?.len(), 44 + 8_000 * bytes_per_sample);

        // a partial buffer stays in memory until the next flush
        sessions.append(&ramp(100))?;
        assert_eq!(fs::metadata(&path)?.len(), 44 + 8_000 * bytes_per_sample);

        sessions.request_stop()?;
        assert_eq!(fs::metadata(&path)?.len(), 44 + 8_100 * bytes_per_sample);
    }

    Ok(())
}
