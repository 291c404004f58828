//! Output file set, binary peak records, the message log and pump life.
//!
//! A file set lives in `<base>/Data/F<YYYYMMDD>/` and shares one version
//! suffix (`x001`, `x002`, ...) taken from the directory's `Version` file:
//!
//! | File | Content |
//! |------|---------|
//! | `HK_<date><ver>.csv` | one housekeeping row per second |
//! | `Peak_<date><ver>.b` | binary peak records |
//! | `Log_<date><ver>.txt` | timestamped messages |
//! | `RawPK_<date><ver>.b` | saved raw windows, u32 LE per sample |
//!
//! Peak record layout (little-endian): `u32 count`, `f64 fullsec`, then
//! `count` triples of `u32 peak, u32 width, u32 dt`.

use chrono::{DateTime, Utc};
use pops_common::consts::PUMP_HOURS_PER_CYCLE;
use pops_common::types::ParticleEvent;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

use crate::telemetry::datestamp;

/// Name of the per-day version file.
pub const VERSION_FILE: &str = "Version";

/// Errors writing or reading the output files.
#[derive(Debug, Error)]
pub enum PersistError {
    /// A file or directory operation failed.
    #[error("{}: {source}", path.display())]
    Io {
        /// File or directory involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// A binary peak record is truncated or inconsistent.
    #[error("malformed peak record: {0}")]
    Malformed(String),
}

impl PersistError {
    /// I/O failure on `path`.
    pub fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

// ─── File set ───────────────────────────────────────────────────────

/// The four output files of one acquisition run.
#[derive(Debug, Clone)]
pub struct OutputFileSet {
    dir: PathBuf,
    version: String,
    housekeeping: PathBuf,
    peak: PathBuf,
    log: PathBuf,
    raw: PathBuf,
    peak_short: String,
}

impl OutputFileSet {
    /// Create a new file set for the day of `time` and write the
    /// housekeeping header.
    ///
    /// The configuration file, when given, is copied into the directory.
    ///
    /// # Errors
    /// `PersistError::Io` if the directory, version file or header cannot be written.
    pub fn create(
        base_dir: &Path,
        config_path: Option<&Path>,
        time: &DateTime<Utc>,
        header: &str,
    ) -> Result<Self, PersistError> {
        let date = datestamp(time);
        let dir = base_dir.join("Data").join(format!("F{date}"));
        fs::create_dir_all(&dir).map_err(|e| PersistError::io(&dir, e))?;

        if let Some(config) = config_path {
            if let Some(name) = config.file_name() {
                let target = dir.join(name);
                // A missing configuration file is not fatal: defaults were used.
                if let Err(e) = fs::copy(config, &target) {
                    debug!("Config copy to {} skipped: {e}", target.display());
                }
            }
        }

        let version = next_version(&dir.join(VERSION_FILE))?;
        let stem = format!("{date}{version}");
        let peak_short = format!("Peak_{stem}.b");
        let set = Self {
            housekeeping: dir.join(format!("HK_{stem}.csv")),
            peak: dir.join(&peak_short),
            log: dir.join(format!("Log_{stem}.txt")),
            raw: dir.join(format!("RawPK_{stem}.b")),
            peak_short,
            version,
            dir,
        };

        fs::write(&set.housekeeping, header).map_err(|e| PersistError::io(&set.housekeeping, e))?;
        info!("New file set {} in {}", set.version, set.dir.display());
        Ok(set)
    }

    /// Directory holding the set.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Version suffix, e.g. `x003`.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Housekeeping CSV path.
    pub fn housekeeping_path(&self) -> &Path {
        &self.housekeeping
    }

    /// Binary peak file path.
    pub fn peak_path(&self) -> &Path {
        &self.peak
    }

    /// Message log path.
    pub fn log_path(&self) -> &Path {
        &self.log
    }

    /// Raw capture path.
    pub fn raw_path(&self) -> &Path {
        &self.raw
    }

    /// Peak file name without the directory.
    pub fn peak_file_short(&self) -> &str {
        &self.peak_short
    }

    /// Whether the peak file has grown past `limit` bytes.
    pub fn rotate_needed(&self, limit: u64) -> bool {
        fs::metadata(&self.peak).is_ok_and(|m| m.len() > limit)
    }

    /// Append one housekeeping row.
    pub fn append_housekeeping(&self, row: &str) -> Result<(), PersistError> {
        append(&self.housekeeping, row.as_bytes())
    }

    /// Flush queued messages into the log file.
    pub fn append_log(&self, log: &mut EventLog) -> Result<(), PersistError> {
        if log.is_empty() {
            return Ok(());
        }
        let mut text = String::new();
        for line in log.drain() {
            text.push_str(&line);
        }
        append(&self.log, text.as_bytes())
    }

    /// Append one second of events to the peak file.
    pub fn append_peak(&self, fullsec: f64, events: &[ParticleEvent]) -> Result<(), PersistError> {
        let file = open_append(&self.peak)?;
        let mut out = BufWriter::new(file);
        write_peak_record(&mut out, fullsec, events)
            .and_then(|()| out.flush())
            .map_err(|e| PersistError::io(&self.peak, e))
    }

    /// Append a raw window as u32 samples.
    pub fn append_raw(&self, samples: &[u16]) -> Result<(), PersistError> {
        let mut bytes = Vec::with_capacity(samples.len() * 4);
        for &s in samples {
            bytes.extend_from_slice(&u32::from(s).to_le_bytes());
        }
        append(&self.raw, &bytes)
    }
}

/// Read the last `xNNN` token of the version file, append the next one and
/// return it. An empty or unreadable history starts at `x001`.
fn next_version(path: &Path) -> Result<String, PersistError> {
    let previous = fs::read_to_string(path)
        .ok()
        .and_then(|text| {
            text.split_whitespace()
                .filter_map(|token| token.strip_prefix('x')?.parse::<u32>().ok())
                .last()
        })
        .unwrap_or(0);
    let version = format!("x{:03}", previous + 1);
    append(path, format!("{version}\n").as_bytes())?;
    Ok(version)
}

fn open_append(path: &Path) -> Result<File, PersistError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| PersistError::io(path, e))
}

fn append(path: &Path, bytes: &[u8]) -> Result<(), PersistError> {
    open_append(path)?
        .write_all(bytes)
        .map_err(|e| PersistError::io(path, e))
}

// ─── Peak records ───────────────────────────────────────────────────

/// Serialize one peak record.
pub fn write_peak_record<W: Write>(
    out: &mut W,
    fullsec: f64,
    events: &[ParticleEvent],
) -> io::Result<()> {
    let count = u32::try_from(events.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "too many events"))?;
    out.write_all(&count.to_le_bytes())?;
    out.write_all(&fullsec.to_le_bytes())?;
    for e in events {
        out.write_all(&u32::from(e.peak).to_le_bytes())?;
        out.write_all(&u32::from(e.width).to_le_bytes())?;
        out.write_all(&e.dt_micros.to_le_bytes())?;
    }
    Ok(())
}

/// One decoded peak record.
#[derive(Debug, Clone, PartialEq)]
pub struct PeakRecord {
    /// Seconds since the epoch of the record.
    pub fullsec: f64,
    /// Per-event `(peak, width, dt)` values as stored.
    pub events: Vec<[u32; 3]>,
}

impl PeakRecord {
    /// Read the next record. `Ok(None)` at a clean end of file.
    ///
    /// # Errors
    /// `PersistError::Malformed` if the stream ends inside a record.
    pub fn read_from<R: Read>(input: &mut R) -> Result<Option<Self>, PersistError> {
        let mut count = [0u8; 4];
        match read_full(input, &mut count) {
            Ok(0) => return Ok(None),
            Ok(4) => {}
            Ok(n) => return Err(PersistError::Malformed(format!("{n}-byte count field"))),
            Err(e) => return Err(PersistError::Malformed(e.to_string())),
        }
        let count = u32::from_le_bytes(count);

        let mut time = [0u8; 8];
        input
            .read_exact(&mut time)
            .map_err(|e| PersistError::Malformed(format!("timestamp: {e}")))?;
        let fullsec = f64::from_le_bytes(time);

        let mut events = Vec::with_capacity(count.min(65_536) as usize);
        let mut triple = [0u8; 12];
        for i in 0..count {
            input
                .read_exact(&mut triple)
                .map_err(|e| PersistError::Malformed(format!("event {i} of {count}: {e}")))?;
            events.push([
                u32::from_le_bytes([triple[0], triple[1], triple[2], triple[3]]),
                u32::from_le_bytes([triple[4], triple[5], triple[6], triple[7]]),
                u32::from_le_bytes([triple[8], triple[9], triple[10], triple[11]]),
            ]);
        }
        Ok(Some(Self { fullsec, events }))
    }
}

/// Fill `buf` as far as the stream allows; returns the bytes read.
fn read_full<R: Read>(input: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match input.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

// ─── Skip-save ──────────────────────────────────────────────────────

/// Saves one peak record out of every `skip + 1` seconds, starting with the first.
#[derive(Debug, Clone, Default)]
pub struct SkipCounter {
    remaining: i32,
}

impl SkipCounter {
    /// Whether this second's record is saved.
    pub fn should_save(&mut self, skip: i32) -> bool {
        if self.remaining <= 0 {
            self.remaining = skip;
            true
        } else {
            self.remaining -= 1;
            false
        }
    }
}

// ─── Message log ────────────────────────────────────────────────────

/// Messages queued during a cycle and written to the log file once per cycle.
#[derive(Debug, Default)]
pub struct EventLog {
    lines: Vec<String>,
}

impl EventLog {
    /// Empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a message stamped with `time`.
    pub fn push(&mut self, time: &DateTime<Utc>, message: &str) {
        self.lines.push(format!(
            "{}   {message}\r\n",
            time.format("%Y-%m-%d %H:%M:%S")
        ));
    }

    /// Queued line count.
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Remove and return all queued lines.
    pub fn drain(&mut self) -> std::vec::Drain<'_, String> {
        self.lines.drain(..)
    }
}

// ─── Pump life ──────────────────────────────────────────────────────

/// Accumulated pump hours, persisted after every cycle.
#[derive(Debug, Clone)]
pub struct PumpLife {
    path: PathBuf,
    hours: f64,
}

impl PumpLife {
    /// Load the counter; a missing or unreadable file starts at zero.
    pub fn load(path: &Path) -> Self {
        let hours = fs::read_to_string(path)
            .ok()
            .and_then(|text| text.split_whitespace().next()?.parse::<f64>().ok())
            .unwrap_or(0.0);
        Self {
            path: path.to_path_buf(),
            hours,
        }
    }

    /// Accumulated hours.
    pub fn hours(&self) -> f64 {
        self.hours
    }

    /// Add one cycle and rewrite the file.
    pub fn increment_and_save(&mut self) -> Result<(), PersistError> {
        self.hours += PUMP_HOURS_PER_CYCLE;
        fs::write(&self.path, format!("{:4.8}\r\n", self.hours))
            .map_err(|e| PersistError::io(&self.path, e))
    }
}
