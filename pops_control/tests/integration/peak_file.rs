//! Integration test: output file set contents and the peak file converter.

use chrono::{TimeZone, Utc};
use pops_common::types::ParticleEvent;
use pops_control::persist::{OutputFileSet, PeakRecord, PersistError};
use std::fs::{self, File};
use std::io::BufReader;
use std::process::Command;
use tempfile::TempDir;

// ── Helpers ─────────────────────────────────────────────────────────

fn events(n: u16) -> Vec<ParticleEvent> {
    (0..n)
        .map(|i| ParticleEvent {
            peak: 1_000 + i,
            width: 10 + i,
            dt_micros: 1_000 * u32::from(i + 1),
        })
        .collect()
}

fn read_all(path: &std::path::Path) -> Result<Vec<PeakRecord>, PersistError> {
    let mut reader = BufReader::new(File::open(path).unwrap());
    let mut records = Vec::new();
    while let Some(record) = PeakRecord::read_from(&mut reader)? {
        records.push(record);
    }
    Ok(records)
}

// ── Tests ───────────────────────────────────────────────────────────

#[test]
fn file_set_layout_and_records() {
    let tmp = TempDir::new().unwrap();
    let config = tmp.path().join("POPS_BBB.toml");
    fs::write(&config, "[bins]\nnbins = 16\n").unwrap();
    let time = Utc.with_ymd_and_hms(2024, 7, 9, 18, 30, 5).unwrap();

    let set = OutputFileSet::create(tmp.path(), Some(&config), &time, "DateTime\r\n").unwrap();
    assert_eq!(set.dir(), tmp.path().join("Data").join("F20240709"));
    assert_eq!(set.peak_file_short(), "Peak_20240709x001.b");
    assert!(set.dir().join("POPS_BBB.toml").exists());

    let fullsec = time.timestamp() as f64;
    set.append_peak(fullsec, &events(3)).unwrap();
    set.append_peak(fullsec + 1.0, &[]).unwrap();
    set.append_peak(fullsec + 2.0, &events(1)).unwrap();
    // count + time + 3 × 12, then two more records.
    assert_eq!(fs::metadata(set.peak_path()).unwrap().len(), 48 + 12 + 24);
    assert!(set.rotate_needed(83));
    assert!(!set.rotate_needed(84));

    let records = read_all(set.peak_path()).unwrap();
    assert_eq!(records.len(), 3);
    assert_eq!(records[0].fullsec, fullsec);
    assert_eq!(records[0].events[2], [1_002, 12, 3_000]);
    assert!(records[1].events.is_empty());

    set.append_raw(&[0x8fc, 0xbb8]).unwrap();
    assert_eq!(
        fs::read(set.raw_path()).unwrap(),
        [0xfc, 0x08, 0, 0, 0xb8, 0x0b, 0, 0]
    );
}

#[test]
fn truncated_peak_file_is_malformed() {
    let tmp = TempDir::new().unwrap();
    let time = Utc.with_ymd_and_hms(2024, 7, 9, 0, 0, 0).unwrap();
    let set = OutputFileSet::create(tmp.path(), None, &time, "h\r\n").unwrap();
    set.append_peak(1.0, &events(2)).unwrap();

    let bytes = fs::read(set.peak_path()).unwrap();
    fs::write(set.peak_path(), &bytes[..bytes.len() - 5]).unwrap();
    assert!(matches!(
        read_all(set.peak_path()),
        Err(PersistError::Malformed(_))
    ));
}

#[test]
fn converter_writes_csv_next_to_the_peak_file() {
    let tmp = TempDir::new().unwrap();
    // 10:00:00 UTC
    let time = Utc.with_ymd_and_hms(2024, 7, 9, 10, 0, 0).unwrap();
    let set = OutputFileSet::create(tmp.path(), None, &time, "h\r\n").unwrap();
    set.append_peak(time.timestamp() as f64, &events(2)).unwrap();

    let status = Command::new(env!("CARGO_BIN_EXE_pops_peak2csv"))
        .arg(set.peak_path())
        .status()
        .unwrap();
    assert!(status.success());

    let csv = fs::read_to_string(set.peak_path().with_extension("txt")).unwrap();
    assert_eq!(
        csv,
        "DateTime,Peak,Width,dT\r\n36000.001000,1000,10,1000\r\n36000.003000,1001,11,2000\r\n"
    );
}

#[test]
fn converter_fails_on_missing_input() {
    let tmp = TempDir::new().unwrap();
    let status = Command::new(env!("CARGO_BIN_EXE_pops_peak2csv"))
        .arg(tmp.path().join("Peak_missing.b"))
        .status()
        .unwrap();
    assert!(!status.success());
}
