//! Remote command protocol.
//!
//! Two ASCII grammars arrive over the links:
//!
//! | Link role | Grammar | Example |
//! |-----------|---------|---------|
//! | status    | single digit | `3` (skip 4 of 5 seconds) |
//! | full      | `key=value`  | `nbins=16` |
//!
//! Both accept `LFE_<cc/min>` to set an externally measured flow. Keys are
//! case-sensitive; unknown keys are ignored. The shared [`CommandBuffer`] is
//! cleared after every decode attempt, matched or not.

use heapless::Vec as FixedVec;
use pops_common::config::PopsConfig;
use pops_common::consts::{AO_CHANNELS, COMMAND_BUFFER_BYTES, MAX_BINS, RAW_SAMPLES};
use tracing::debug;

/// Grammar accepted on a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    /// Single-digit commands.
    Digit,
    /// `key=value` commands.
    Text,
}

/// A decoded command.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    /// Start a new output file set.
    NewFile,
    /// Save one second of peaks out of `n + 1`.
    SkipSave(i32),
    /// Histogram bin count.
    Nbins(usize),
    /// log10 of the lowest binned peak.
    LogMin(f64),
    /// log10 of the highest binned peak.
    LogMax(f64),
    /// Threshold multiplier.
    ThMult(f64),
    /// Maximum samples per peak.
    MaxPts(u32),
    /// Minimum samples per peak.
    MinPts(u32),
    /// New analog output set-point, applied immediately.
    AnalogOut {
        /// Output channel.
        channel: usize,
        /// Set-point in volts.
        volts: f64,
    },
    /// Baseline start value.
    BlStart(u32),
    /// Send raw frames on full-data links.
    ViewRaw(bool),
    /// Samples per raw frame.
    RawPts(usize),
    /// Externally measured flow in cc/s.
    ExternalFlow(f64),
    /// Stop and halt.
    Shutdown,
    /// Stop and reboot.
    Reboot,
}

/// Side effect the scheduler must carry out after a command was applied.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CommandEffect {
    /// Parameters changed; nothing else to do.
    ParamsChanged,
    /// Rotate the output file set.
    NewFile,
    /// Store a new set-point and push it, using the set-point itself as
    /// the closed-loop reference reading.
    SetAnalogOutput {
        /// Output channel.
        channel: usize,
        /// Set-point in volts.
        volts: f64,
    },
    /// Store the externally measured flow.
    ExternalFlow(f64),
    /// Bin layout changed; rebuild the histogram.
    BinsChanged,
    /// Stop and halt.
    Shutdown,
    /// Stop and reboot.
    Reboot,
}

// ─── Decoding ───────────────────────────────────────────────────────

/// Decode one command. Returns `None` for unknown or malformed input.
pub fn decode(buffer: &[u8], kind: ChannelKind) -> Option<Command> {
    let text = std::str::from_utf8(buffer).ok()?;
    let text = text.trim_start_matches('\0');

    if let Some(rest) = text.strip_prefix("LFE_") {
        let value = rest.split('_').next().map_or(0.0, parse_leading_f64);
        return Some(Command::ExternalFlow(value / 60.0));
    }

    match kind {
        ChannelKind::Digit => decode_digit(text),
        ChannelKind::Text => decode_key_value(text),
    }
}

fn decode_digit(text: &str) -> Option<Command> {
    match text.as_bytes().first()? {
        b'0' => Some(Command::NewFile),
        b'1' => Some(Command::SkipSave(0)),
        b'2' => Some(Command::SkipSave(1)),
        b'3' => Some(Command::SkipSave(4)),
        b'4' => Some(Command::SkipSave(9)),
        b'8' => Some(Command::Shutdown),
        b'9' => Some(Command::Reboot),
        _ => None,
    }
}

fn decode_key_value(text: &str) -> Option<Command> {
    let (key, value) = match text.split_once('=') {
        Some((k, v)) => (k.trim(), parse_leading_f64(v)),
        None => (text.trim(), 0.0),
    };

    let cmd = match key {
        "NewFile" => Command::NewFile,
        "Skip" => Command::SkipSave(value as i32),
        "nbins" => {
            let n = value as i64;
            if n < 1 || n > MAX_BINS as i64 {
                debug!("Ignoring nbins={n}");
                return None;
            }
            Command::Nbins(n as usize)
        }
        "logmin" => Command::LogMin(value),
        "logmax" => Command::LogMax(value),
        "TH_mult" => Command::ThMult(value),
        "MaxPts" => Command::MaxPts(value as u32),
        "MinPts" => Command::MinPts(value as u32),
        "AO0" => Command::AnalogOut {
            channel: 0,
            volts: value,
        },
        "AO1" => Command::AnalogOut {
            channel: 1,
            volts: value,
        },
        "BLStart" => Command::BlStart(value as u32),
        "ViewRaw" => Command::ViewRaw(value >= 0.0),
        "RawPts" => Command::RawPts((value as i64).clamp(0, RAW_SAMPLES as i64) as usize),
        "Shutdown" => Command::Shutdown,
        "Reboot" => Command::Reboot,
        _ => return None,
    };
    Some(cmd)
}

/// Parse the longest leading decimal number, `0.0` if there is none.
pub fn parse_leading_f64(text: &str) -> f64 {
    let text = text.trim_start();
    let mut end = 0;
    let mut seen_digit = false;
    let mut seen_dot = false;
    let mut seen_exp = false;
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        match b {
            b'0'..=b'9' => {
                seen_digit = true;
                end = i + 1;
            }
            b'+' | b'-' if i == 0 => {}
            b'.' if !seen_dot && !seen_exp => seen_dot = true,
            b'e' | b'E' if seen_digit && !seen_exp => {
                seen_exp = true;
                if matches!(bytes.get(i + 1), Some(b'+' | b'-')) {
                    i += 1;
                }
            }
            _ => break,
        }
        i += 1;
    }
    // `end` only advances on digits, so the prefix never ends in a sign,
    // dot or exponent marker.
    text[..end].parse().unwrap_or(0.0)
}

// ─── Live parameters ────────────────────────────────────────────────

/// Operating parameters that commands may change at run time.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveParams {
    /// Seconds skipped between saved peak records.
    pub skip_save: i32,
    /// Histogram bin count.
    pub nbins: usize,
    /// log10 of the lowest binned peak.
    pub logmin: f64,
    /// log10 of the highest binned peak.
    pub logmax: f64,
    /// Threshold multiplier.
    pub th_mult: f64,
    /// Minimum samples per peak.
    pub min_peak_pts: u32,
    /// Maximum samples per peak.
    pub max_peak_pts: u32,
    /// Baseline start value.
    pub bl_start: u32,
    /// Send raw frames.
    pub raw_view: bool,
    /// Save raw frames.
    pub raw_save: bool,
    /// Samples per raw frame.
    pub raw_pts: usize,
}

impl LiveParams {
    /// Initial parameters from configuration.
    pub fn from_config(config: &PopsConfig) -> Self {
        Self {
            skip_save: config.storage.skip_save,
            nbins: config.bins.nbins,
            logmin: config.bins.logmin,
            logmax: config.bins.logmax,
            th_mult: config.baseline.th_mult,
            min_peak_pts: config.peak.min_peak_pts,
            max_peak_pts: config.peak.max_peak_pts,
            bl_start: config.baseline.bl_start,
            raw_view: config.raw.view,
            raw_save: config.raw.save,
            raw_pts: config.raw.pts,
        }
    }

    /// Apply a command and report what the scheduler still has to do.
    pub fn apply(&mut self, cmd: Command) -> CommandEffect {
        match cmd {
            Command::NewFile => CommandEffect::NewFile,
            Command::SkipSave(n) => {
                self.skip_save = n;
                CommandEffect::ParamsChanged
            }
            Command::Nbins(n) => {
                self.nbins = n;
                CommandEffect::BinsChanged
            }
            Command::LogMin(v) => {
                self.logmin = v;
                CommandEffect::BinsChanged
            }
            Command::LogMax(v) => {
                self.logmax = v;
                CommandEffect::BinsChanged
            }
            Command::ThMult(v) => {
                self.th_mult = v;
                CommandEffect::ParamsChanged
            }
            Command::MaxPts(v) => {
                self.max_peak_pts = v;
                CommandEffect::ParamsChanged
            }
            Command::MinPts(v) => {
                self.min_peak_pts = v;
                CommandEffect::ParamsChanged
            }
            Command::AnalogOut { channel, volts } => CommandEffect::SetAnalogOutput {
                channel: channel.min(AO_CHANNELS - 1),
                volts,
            },
            Command::BlStart(v) => {
                self.bl_start = v;
                CommandEffect::ParamsChanged
            }
            Command::ViewRaw(on) => {
                self.raw_view = on;
                CommandEffect::ParamsChanged
            }
            Command::RawPts(n) => {
                self.raw_pts = n;
                CommandEffect::ParamsChanged
            }
            Command::ExternalFlow(v) => CommandEffect::ExternalFlow(v),
            Command::Shutdown => CommandEffect::Shutdown,
            Command::Reboot => CommandEffect::Reboot,
        }
    }
}

// ─── Command buffer ─────────────────────────────────────────────────

/// Inbound command bytes shared by all links.
#[derive(Debug, Default)]
pub struct CommandBuffer {
    bytes: FixedVec<u8, COMMAND_BUFFER_BYTES>,
}

impl CommandBuffer {
    /// Empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the contents with `bytes`, truncated to the buffer size.
    pub fn load(&mut self, bytes: &[u8]) {
        self.bytes.clear();
        let n = bytes.len().min(COMMAND_BUFFER_BYTES);
        // Cannot fail: `n` fits the capacity.
        let _ = self.bytes.extend_from_slice(&bytes[..n]);
    }

    /// Current contents.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Whether the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Decode the buffered command, clear the buffer and apply the command.
    pub fn dispatch(&mut self, kind: ChannelKind, params: &mut LiveParams) -> Option<CommandEffect> {
        let cmd = decode(&self.bytes, kind);
        self.bytes.clear();
        cmd.map(|cmd| {
            debug!("Command {:?}", cmd);
            params.apply(cmd)
        })
    }
}
