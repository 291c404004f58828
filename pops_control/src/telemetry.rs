//! Telemetry and housekeeping encoders.
//!
//! Every encoder is a pure function of an [`AggregateState`] snapshot taken
//! at the end of a second. The status frame has one encoding per
//! [`StatusType`]; the full record, housekeeping row and raw frame are the
//! same for every status type.
//!
//! Fixed-precision fields print non-finite values the way the ground
//! software expects them (`nan`, `inf`).

use crate::baseline::BaselineState;
use crate::binning::{Histogram, WidthStats};
use chrono::{DateTime, Utc};
use pops_common::consts::{AI_CHANNELS, AO_CHANNELS};
use pops_common::types::{InstrumentStatus, StatusType};
use std::fmt::{self, Write};

/// Prefix of compact radiosonde frames.
const XDATA_PREFIX: &str = "xdata=3801";

/// Prefix of CSV frames.
const CSV_PREFIX: &str = "POPS,";

/// Aircraft feed columns added to the housekeeping header.
const AIRCRAFT_COLUMNS: &str = "ACDateTime,Lat,Lon,GPS_MSL_Alt,WGS_84_Alt,Press_Alt,Radar_Alt,\
Grnd_Spd,True_Airspd,Ind_Airspd,Mach,Vert_Vel,True_Hdg,Track,Drift,Pitch,\
Roll,SideSlip,AngleOfAttack,Ambient_T,DewPoint,Total_T,\
Static_P,Dynamic_P,Cabin_P,WindSpd,WindDir,VertWindSpd,\
SolarZenith,SunElevAC,SunAzGrnd,SunAz_AC";

// ─── Snapshot ───────────────────────────────────────────────────────

/// Everything a second of telemetry reports.
#[derive(Debug, Clone, Copy)]
pub struct AggregateState<'a> {
    /// Wall-clock time of the second (UTC).
    pub time: DateTime<Utc>,
    /// Configured status type name, echoed in the full record.
    pub status_type: &'a str,
    /// Instrument status code.
    pub status: InstrumentStatus,
    /// Events counted this second.
    pub part_num: u32,
    /// Particles per cc.
    pub concentration: f64,
    /// Latest baseline statistics.
    pub baseline: BaselineState,
    /// Ambient pressure, mbar.
    pub pressure: f64,
    /// Ambient temperature, °C.
    pub temperature: f64,
    /// Accumulated pump hours.
    pub pump_life: f64,
    /// Width statistics of this second.
    pub width: WidthStats,
    /// Analog inputs in engineering units.
    pub analog_in: &'a [f64; AI_CHANNELS],
    /// Analog output set-points, volts.
    pub analog_out: [f64; AO_CHANNELS],
    /// Baseline seeded at startup.
    pub bl_start: u32,
    /// Histogram of this second.
    pub histogram: &'a Histogram,
    /// Skip-save setting.
    pub skip_save: i32,
    /// Minimum samples per peak.
    pub min_peak_pts: u32,
    /// Maximum samples per peak.
    pub max_peak_pts: u32,
    /// Samples per raw frame.
    pub raw_pts: usize,
    /// Full path of the current peak file.
    pub peak_file: &'a str,
    /// File name of the current peak file.
    pub peak_file_short: &'a str,
    /// Latest aircraft feed line, if any.
    pub aircraft: Option<&'a str>,
}

/// Seconds since the epoch with microsecond fraction.
pub fn fullsec(time: &DateTime<Utc>) -> f64 {
    time.timestamp() as f64 + f64::from(time.timestamp_subsec_micros()) / 1_000_000.0
}

/// `YYYYMMDDThhmmss`.
pub fn timestamp(time: &DateTime<Utc>) -> String {
    time.format("%Y%m%dT%H%M%S").to_string()
}

/// `YYYYMMDD`.
pub fn datestamp(time: &DateTime<Utc>) -> String {
    time.format("%Y%m%d").to_string()
}

/// Fixed-precision float that prints `nan` for NaN.
#[derive(Debug, Clone, Copy)]
struct Fixed(f64, usize);

impl fmt::Display for Fixed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_nan() {
            f.write_str("nan")
        } else {
            write!(f, "{:.*}", self.1, self.0)
        }
    }
}

fn f2(v: f64) -> Fixed {
    Fixed(v, 2)
}

/// Saturating float-to-int truncation used by hex fields (NaN gives 0).
#[inline]
fn trunc(v: f64) -> i32 {
    v as i32
}

// ─── Status frames ──────────────────────────────────────────────────

/// Encode the status frame for `kind`.
pub fn encode_status(kind: StatusType, s: &AggregateState<'_>) -> String {
    let mut out = String::with_capacity(256);
    // Writing into a String cannot fail.
    let _ = write_status(&mut out, kind, s);
    out
}

fn write_status(out: &mut String, kind: StatusType, s: &AggregateState<'_>) -> fmt::Result {
    match kind {
        StatusType::IMet => {
            out.push_str(XDATA_PREFIX);
            write!(out, "{:04X}", trunc(s.concentration))?;
            write_flow_byte(out, s.analog_in[0])?;
            write!(out, "{:02X}", trunc(100.0 + s.analog_in[5]))?;
            write_hex_bins(out, &s.histogram.compress_bins())?;
        }
        StatusType::IMetTrm => {
            out.push_str(XDATA_PREFIX);
            write_flow_byte(out, s.analog_in[0])?;
            write_hex_bins(out, &s.histogram.compress_bins())?;
        }
        StatusType::IMetAng => {
            let ai = s.analog_in;
            out.push_str(XDATA_PREFIX);
            write!(out, "{:04X}", s.part_num)?;
            write!(out, "{:04X}", trunc(s.concentration))?;
            write!(out, "{:04X}", s.baseline.baseline)?;
            write!(out, "{:04X}", s.baseline.baseline_plus_threshold)?;
            write!(out, "{:04X}", trunc(s.baseline.std_dev))?;
            write!(out, "{:04X}", trunc(s.pressure * 10.0))?;
            write!(out, "{:04X}", trunc(100.0 + s.temperature))?;
            write!(out, "{:04X}", trunc(10.0 * ai[0]))?;
            write!(out, "{:04X}", trunc(ai[1]))?;
            write!(out, "{:04X}", trunc(100.0 + ai[2]))?;
            write!(out, "{:04X}", trunc(10.0 * ai[3]))?;
            write!(out, "{:04X}", trunc(10.0 * ai[4]))?;
            if ai[5].is_nan() {
                out.push_str("0000");
            } else {
                write!(out, "{:04X}", trunc(100.0 + ai[5]))?;
            }
            write!(out, "{:04X}", trunc(10.0 * ai[6]))?;
            write_hex_bins(out, s.histogram.bins())?;
        }
        StatusType::Uav => {
            out.push_str(CSV_PREFIX);
            out.push_str(&timestamp(&s.time));
            write!(out, ",{},{}", s.part_num, f2(s.concentration))?;
            write!(out, ",{},{}", s.baseline.baseline, f2(s.baseline.std_dev))?;
            for v in [
                s.pressure,
                s.analog_in[0],
                s.analog_in[2],
                s.analog_in[4],
                s.analog_in[5],
            ] {
                write!(out, ",{}", f2(v))?;
            }
        }
        StatusType::Manta => {
            out.push_str(CSV_PREFIX);
            out.push_str(&timestamp(&s.time));
            write!(
                out,
                ",{},{},{}",
                s.status.code(),
                s.part_num,
                f2(s.concentration)
            )?;
            write!(out, ",{}", f2(s.analog_in[0]))?;
            write!(out, ",{},{}", s.baseline.baseline, f2(s.baseline.std_dev))?;
            write_csv_bins(out, s.histogram.bins())?;
        }
        StatusType::Wb57 => {
            out.push_str(CSV_PREFIX);
            write!(out, "{}", f2(s.concentration))?;
            write_csv_bins(out, &s.histogram.compress_bins())?;
        }
        StatusType::Display => {
            out.push_str(&s.time.format("%Y-%m-%d %H:%M:%S   ").to_string());
            out.push_str(s.peak_file_short);
            write!(out, "  {} Pump hrs", f2(s.pump_life))?;
            for v in [s.concentration, s.analog_in[0], s.pressure, s.analog_in[5]] {
                write!(out, ",{}", f2(v))?;
            }
            write!(out, ",{}", s.skip_save)?;
            write!(out, ",{}", s.histogram.nbins())?;
            write!(
                out,
                ",{},{}",
                Fixed(s.histogram.logmin(), 3),
                Fixed(s.histogram.logmax(), 3)
            )?;
            write!(out, ",{}", f2(s.pump_life))?;
            write_csv_bins(out, s.histogram.bins())?;
        }
        StatusType::Legacy => {
            // The temperature byte slot repeats the flow byte.
            out.push_str(XDATA_PREFIX);
            write!(out, "{:04X}", trunc(s.concentration))?;
            write_flow_byte(out, s.analog_in[0])?;
            write_flow_byte(out, s.analog_in[0])?;
            write_hex_bins(out, s.histogram.bins())?;
        }
    }
    out.push_str("\r\n");
    Ok(())
}

/// Flow in tenths of cc/s as one hex byte, `00` outside 0..10.
fn write_flow_byte(out: &mut String, flow: f64) -> fmt::Result {
    if (0.0..10.0).contains(&flow) {
        write!(out, "{:02X}", trunc(10.0 * flow))
    } else {
        out.push_str("00");
        Ok(())
    }
}

fn write_hex_bins(out: &mut String, bins: &[u32]) -> fmt::Result {
    for b in bins {
        write!(out, "{b:04X}")?;
    }
    Ok(())
}

fn write_csv_bins(out: &mut String, bins: &[u32]) -> fmt::Result {
    for b in bins {
        write!(out, ",{b}")?;
    }
    Ok(())
}

// ─── Full record and housekeeping ───────────────────────────────────

/// Fields shared by the full record and the housekeeping row.
fn write_common_fields(out: &mut String, s: &AggregateState<'_>) -> fmt::Result {
    write!(
        out,
        ",{},{},{}",
        s.status.code(),
        s.part_num,
        f2(s.concentration)
    )?;
    write!(
        out,
        ",{},{},{}",
        s.baseline.baseline,
        s.baseline.baseline_plus_threshold,
        f2(s.baseline.std_dev)
    )?;
    write!(out, ",{},{}", f2(s.pressure), f2(s.temperature))?;
    write!(
        out,
        ",{},{},{}",
        f2(s.pump_life),
        f2(s.width.std_dev),
        f2(s.width.mean)
    )?;
    for v in s.analog_in {
        write!(out, ",{}", f2(*v))?;
    }
    for v in s.analog_out {
        write!(out, ",{}", f2(v))?;
    }
    write!(
        out,
        ",{},{},{},{},{}",
        s.bl_start,
        Fixed(s.baseline.threshold_multiplier, 1),
        s.histogram.nbins(),
        f2(s.histogram.logmin()),
        f2(s.histogram.logmax())
    )?;
    write!(
        out,
        ",{},{},{},{}",
        s.skip_save, s.min_peak_pts, s.max_peak_pts, s.raw_pts
    )
}

/// Verbose full-data record sent on full-data links.
pub fn encode_full(s: &AggregateState<'_>) -> String {
    let mut out = String::with_capacity(1024);
    let _ = write_full(&mut out, s);
    out
}

fn write_full(out: &mut String, s: &AggregateState<'_>) -> fmt::Result {
    out.push_str(CSV_PREFIX);
    out.push_str(s.status_type);
    out.push(',');
    out.push_str(s.peak_file);
    out.push(',');
    out.push_str(&timestamp(&s.time));
    write_common_fields(out, s)?;
    write_csv_bins(out, s.histogram.bins())?;
    out.push_str("\r\n");
    Ok(())
}

/// One housekeeping CSV row.
pub fn encode_housekeeping(s: &AggregateState<'_>) -> String {
    let mut out = String::with_capacity(1024);
    let _ = write_housekeeping(&mut out, s);
    out
}

fn write_housekeeping(out: &mut String, s: &AggregateState<'_>) -> fmt::Result {
    write!(out, "{}", Fixed(fullsec(&s.time), 3))?;
    write_common_fields(out, s)?;
    out.push(',');
    if let Some(line) = s
        .aircraft
        .and_then(|feed| feed.split('\n').find(|part| !part.is_empty()))
    {
        out.push_str(line);
        out.push(',');
    }
    write_csv_bins(out, s.histogram.bins())?;
    out.push_str("\r\n");
    Ok(())
}

/// Header line of the housekeeping file.
pub fn housekeeping_header(
    ai_names: &[&str],
    ao_names: &[&str],
    aircraft_columns: bool,
    nbins: usize,
) -> String {
    let mut out = String::from(
        "DateTime,Status,PartCt,PartCon,BL,BLTH,STD,P,TofP,PumpLife_hrs,WidthSTD,AveWidth",
    );
    for name in ai_names.iter().chain(ao_names) {
        out.push_str(", ");
        out.push_str(name);
    }
    out.push_str(",BL_Start,TH_Mult,nbins,logmin,logmax,Skip_Save,");
    out.push_str("MinPeakPts,MaxPeakPts,RawPts,");
    if aircraft_columns {
        out.push_str(AIRCRAFT_COLUMNS);
    }
    for i in 0..nbins {
        let _ = write!(out, ",b{i}");
    }
    out.push_str("\r\n");
    out
}

/// Raw waveform frame: `RawData` then each sample in lowercase hex.
pub fn encode_raw(samples: &[u16]) -> String {
    let mut out = String::with_capacity(8 + samples.len() * 5);
    out.push_str("RawData");
    for s in samples {
        let _ = write!(out, ",{s:x}");
    }
    out
}
