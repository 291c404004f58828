//! # POPS Peak2CSV
//!
//! Converts a binary `Peak_*.b` file into a CSV text file next to it. Each
//! event row carries the time of day in seconds, accumulated from the
//! record's timestamp by the event inter-arrival times.

use clap::Parser;
use pops_control::persist::{PeakRecord, PersistError};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process;
use tracing::{Level, error, info};
use tracing_subscriber::EnvFilter;

const SECONDS_PER_DAY: f64 = 86_400.0;
const CSV_HEADER: &str = "DateTime,Peak,Width,dT\r\n";

/// POPS Peak2CSV: peak file converter
#[derive(Parser, Debug)]
#[command(name = "pops_peak2csv")]
#[command(author = "RTS007")]
#[command(version)]
#[command(about = "Convert a binary POPS peak file to CSV")]
struct Args {
    /// Peak file to convert.
    input: PathBuf,

    /// Enable verbose logging (DEBUG level).
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let args = Args::parse();
    setup_tracing(&args);

    match convert(&args.input) {
        Ok((output, records, events)) => info!(
            "{} records, {} events written to {}",
            records,
            events,
            output.display()
        ),
        Err(e) => {
            error!("FATAL: {e}");
            process::exit(1);
        }
    }
}

/// Convert `input`; returns the output path, record count and event count.
fn convert(input: &Path) -> Result<(PathBuf, usize, usize), PersistError> {
    let output = input.with_extension("txt");
    let file = File::open(input).map_err(|e| PersistError::io(input, e))?;
    let mut reader = BufReader::new(file);
    let out = File::create(&output).map_err(|e| PersistError::io(&output, e))?;
    let mut writer = BufWriter::new(out);

    let (records, events) = write_csv(&mut reader, &mut writer)
        .map_err(|e| match e {
            CsvError::Read(e) => e,
            CsvError::Write(e) => PersistError::io(&output, e),
        })?;
    writer.flush().map_err(|e| PersistError::io(&output, e))?;
    Ok((output, records, events))
}

#[derive(Debug)]
enum CsvError {
    Read(PersistError),
    Write(std::io::Error),
}

/// Stream every record of `reader` as CSV rows.
fn write_csv<R: std::io::Read, W: Write>(
    reader: &mut R,
    writer: &mut W,
) -> Result<(usize, usize), CsvError> {
    writer.write_all(CSV_HEADER.as_bytes()).map_err(CsvError::Write)?;
    let (mut records, mut events) = (0, 0);
    while let Some(record) = PeakRecord::read_from(reader).map_err(CsvError::Read)? {
        let mut time_of_day = record.fullsec % SECONDS_PER_DAY;
        for [peak, width, dt] in &record.events {
            time_of_day += f64::from(*dt) / 1e6;
            write!(writer, "{time_of_day:.6},{peak},{width},{dt}\r\n").map_err(CsvError::Write)?;
        }
        records += 1;
        events += record.events.len();
    }
    Ok((records, events))
}

/// Setup tracing subscriber based on CLI arguments.
fn setup_tracing(args: &Args) {
    let level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let filter = EnvFilter::from_default_env().add_directive(level.into());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .compact()
        .init();
}
