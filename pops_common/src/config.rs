//! Configuration loading traits and types.
//!
//! This module provides a standardized way to load TOML configuration files
//! and defines [`PopsConfig`], the complete instrument configuration.
//!
//! # Usage
//!
//! ```rust,no_run
//! use pops_common::config::{ConfigLoader, PopsConfig, ConfigError};
//! use std::path::Path;
//!
//! fn main() -> Result<(), ConfigError> {
//!     let config = PopsConfig::load(Path::new("POPS_BBB.toml"))?;
//!     config.validate()?;
//!     println!("Status type: {}", config.instrument.status_type);
//!     Ok(())
//! }
//! ```

use crate::consts::{AI_CHANNELS, AO_CHANNELS, DEFAULT_ROTATE_BYTES, MAX_BINS, RAW_SAMPLES};
use crate::types::{AnalogConversion, FlowCalibration, StatusType};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Error type for configuration loading operations.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file not found at specified path.
    #[error("Configuration file not found")]
    FileNotFound,

    /// TOML parsing failed.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Semantic validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Log level for application logging.
///
/// Uses lowercase serde values for TOML compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Most verbose, detailed tracing information.
    Trace,
    /// Debug information useful during development.
    Debug,
    /// General information about application operation.
    #[default]
    Info,
    /// Warning messages for potentially problematic situations.
    Warn,
    /// Error messages for serious problems.
    Error,
}

impl LogLevel {
    /// Directive string understood by `tracing_subscriber::EnvFilter`.
    pub const fn as_directive(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Common configuration fields shared across all POPS applications.
///
/// # TOML Example
///
/// ```toml
/// [shared]
/// log_level = "debug"
/// service_name = "pops-bbb-01"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedConfig {
    /// Logging verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Application instance identifier.
    pub service_name: String,
}

impl Default for SharedConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            service_name: "pops".to_string(),
        }
    }
}

impl SharedConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if `service_name` is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.is_empty() {
            return Err(ConfigError::ValidationError(
                "service_name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Trait for loading configuration from TOML files.
///
/// Blanket-implemented for every `serde::de::DeserializeOwned` type.
///
/// # Contract
///
/// - Returns `ConfigError::FileNotFound` if the file does not exist
/// - Returns `ConfigError::ParseError` if TOML syntax is invalid
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    /// Load configuration from a TOML file.
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound
            } else {
                ConfigError::ParseError(e.to_string())
            }
        })?;

        Self::parse(&content)
    }

    /// Parse configuration from TOML text.
    fn parse(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}

// ─── Instrument configuration ───────────────────────────────────────

/// Complete POPS instrument configuration.
///
/// Every section is optional; missing sections and fields take the
/// instrument defaults.
///
/// ```toml
/// [instrument]
/// status_type = "iMet"
///
/// [bins]
/// nbins = 16
/// logmin = 1.75
/// logmax = 4.806
///
/// [[udp]]
/// ip = "10.1.1.255"
/// port = 5100
/// role = "status"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PopsConfig {
    /// Logging and service identity.
    pub shared: SharedConfig,
    /// Instrument identity and telemetry variant.
    pub instrument: InstrumentConfig,
    /// Data directory and file policy.
    pub storage: StorageConfig,
    /// Flow channel calibration.
    pub flow: FlowCalibration,
    /// Histogram layout.
    pub bins: BinsConfig,
    /// Baseline start and threshold multiplier.
    pub baseline: BaselineConfig,
    /// Peak detection limits reported with the data.
    pub peak: PeakConfig,
    /// Raw sample capture.
    pub raw: RawConfig,
    /// Analog input channels (7).
    pub analog_inputs: AnalogInputs,
    /// Analog output channels (2).
    pub analog_outputs: AnalogOutputs,
    /// Pressure-dependent pump voltage schedule.
    pub flow_step: FlowStepConfig,
    /// Serial links.
    pub serial_ports: SerialPorts,
    /// UDP links.
    pub udp: Vec<UdpLinkConfig>,
    /// Loop timing.
    pub timing: TimingConfig,
    /// Hardware driver selection and device paths.
    pub hardware: HardwareConfig,
}

impl PopsConfig {
    /// Resolved status-frame variant.
    pub fn status_type(&self) -> StatusType {
        StatusType::from_name(&self.instrument.status_type)
    }

    /// Apply layout rules that depend on other fields.
    ///
    /// The `iMet` frame compresses a 16-bin histogram, so that status type
    /// forces `nbins = 16`. Short channel lists are padded with defaults.
    pub fn normalize(&mut self) {
        if self.status_type() == StatusType::IMet {
            self.bins.nbins = 16;
        }
        let ai_defaults = AnalogInputs::default().0;
        while self.analog_inputs.0.len() < AI_CHANNELS {
            let i = self.analog_inputs.0.len();
            self.analog_inputs.0.push(ai_defaults[i].clone());
        }
        self.analog_inputs.0.truncate(AI_CHANNELS);

        let ao_defaults = AnalogOutputs::default().0;
        while self.analog_outputs.0.len() < AO_CHANNELS {
            let i = self.analog_outputs.0.len();
            self.analog_outputs.0.push(ao_defaults[i].clone());
        }
        self.analog_outputs.0.truncate(AO_CHANNELS);
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` describing the first invalid field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;
        self.bins.validate()?;

        if self.raw.pts > RAW_SAMPLES {
            return Err(ConfigError::ValidationError(format!(
                "raw.pts {} exceeds {RAW_SAMPLES}",
                self.raw.pts
            )));
        }
        for (i, ao) in self.analog_outputs.0.iter().enumerate() {
            if ao.max_v <= 0.0 {
                return Err(ConfigError::ValidationError(format!(
                    "analog_outputs[{i}].max_v must be positive"
                )));
            }
            if ao.min_v > ao.max_v {
                return Err(ConfigError::ValidationError(format!(
                    "analog_outputs[{i}].min_v exceeds max_v"
                )));
            }
        }
        if self.timing.period_ms == 0 {
            return Err(ConfigError::ValidationError(
                "timing.period_ms must be positive".to_string(),
            ));
        }
        if self.storage.max_peak_file_bytes == 0 {
            return Err(ConfigError::ValidationError(
                "storage.max_peak_file_bytes must be positive".to_string(),
            ));
        }
        if self.flow.divisor == 0.0 {
            return Err(ConfigError::ValidationError(
                "flow.divisor cannot be zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Instrument identity and telemetry variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InstrumentConfig {
    /// Host board serial number.
    pub bbb_sn: String,
    /// Instrument serial number.
    pub pops_sn: String,
    /// Daughter board revision.
    pub daughter_board: String,
    /// Version string recorded in the log.
    pub code_version: String,
    /// Status frame variant name (`iMet`, `iMet_TRM`, `iMet_ANG`, `UAV`,
    /// `Manta`, `WB57`, `Display`).
    pub status_type: String,
    /// Flow below which the status code reports low flow (0 disables).
    pub low_flow_threshold: f64,
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        Self {
            bbb_sn: "Snoopy#".to_string(),
            pops_sn: "POPS#".to_string(),
            daughter_board: "Rev2".to_string(),
            code_version: "CodeVer_3.0".to_string(),
            status_type: "UAV".to_string(),
            low_flow_threshold: 0.0,
        }
    }
}

/// Data directory and file policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Storage media name, recorded in the log.
    pub media: String,
    /// Directory holding `Data/`.
    pub base_dir: PathBuf,
    /// Accumulated pump hours file.
    pub pump_life_file: PathBuf,
    /// Binary peak file size that triggers a new file set.
    pub max_peak_file_bytes: u64,
    /// Seconds skipped between saved peak records.
    pub skip_save: i32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            media: "uSD".to_string(),
            base_dir: PathBuf::from("/media/uSD"),
            pump_life_file: PathBuf::from("/media/uSD/gPumpFile.txt"),
            max_peak_file_bytes: DEFAULT_ROTATE_BYTES,
            skip_save: 0,
        }
    }
}

/// Histogram layout.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BinsConfig {
    /// Number of bins.
    pub nbins: usize,
    /// log10 of the lowest binned peak.
    pub logmin: f64,
    /// log10 of the highest binned peak.
    pub logmax: f64,
}

impl Default for BinsConfig {
    fn default() -> Self {
        Self {
            nbins: 8,
            logmin: 1.4,
            logmax: 4.817,
        }
    }
}

impl BinsConfig {
    /// Validate the layout.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if `nbins` is outside
    /// `1..=MAX_BINS` or `logmax <= logmin`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.nbins == 0 || self.nbins > MAX_BINS {
            return Err(ConfigError::ValidationError(format!(
                "bins.nbins must be in 1..={MAX_BINS}, got {}",
                self.nbins
            )));
        }
        if !(self.logmax > self.logmin) {
            return Err(ConfigError::ValidationError(format!(
                "bins.logmax ({}) must exceed bins.logmin ({})",
                self.logmax, self.logmin
            )));
        }
        Ok(())
    }
}

/// Baseline start value and threshold multiplier.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct BaselineConfig {
    /// Baseline seeded into the coprocessor at startup.
    pub bl_start: u32,
    /// Standard deviations above baseline for the detection threshold.
    pub th_mult: f64,
}

impl Default for BaselineConfig {
    fn default() -> Self {
        Self {
            bl_start: 2300,
            th_mult: 2.0,
        }
    }
}

/// Peak width limits.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct PeakConfig {
    /// Minimum samples in a peak.
    pub min_peak_pts: u32,
    /// Maximum samples in a peak.
    pub max_peak_pts: u32,
}

impl Default for PeakConfig {
    fn default() -> Self {
        Self {
            min_peak_pts: 5,
            max_peak_pts: 255,
        }
    }
}

/// Raw sample capture.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct RawConfig {
    /// Send raw frames on full-data links.
    pub view: bool,
    /// Append raw frames to the raw file.
    pub save: bool,
    /// Samples per raw frame.
    pub pts: usize,
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            view: true,
            save: false,
            pts: 256,
        }
    }
}

/// One analog input channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalogInputConfig {
    /// Column name in the housekeeping header.
    pub name: String,
    /// Engineering-unit conversion.
    #[serde(default)]
    pub conv: AnalogConversion,
}

/// The seven analog input channels.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnalogInputs(pub Vec<AnalogInputConfig>);

impl Default for AnalogInputs {
    fn default() -> Self {
        Self(
            (0..AI_CHANNELS)
                .map(|i| AnalogInputConfig {
                    name: format!("AI[{i}]"),
                    conv: AnalogConversion::Volts,
                })
                .collect(),
        )
    }
}

/// One analog output channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalogOutputConfig {
    /// Column name in the housekeeping header.
    pub name: String,
    /// Initial set-point in volts.
    #[serde(default)]
    pub set_v: f64,
    /// Full-scale volts.
    pub max_v: f64,
    /// Lowest allowed set-point.
    #[serde(default)]
    pub min_v: f64,
    /// Integral gain.
    #[serde(default)]
    pub ki: f64,
    /// Apply integral correction against a reference reading.
    #[serde(default)]
    pub use_pid: bool,
}

/// The two analog output channels.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnalogOutputs(pub Vec<AnalogOutputConfig>);

impl Default for AnalogOutputs {
    fn default() -> Self {
        Self(
            (0..AO_CHANNELS)
                .map(|i| AnalogOutputConfig {
                    name: format!("AO[{i}]"),
                    set_v: 0.0,
                    max_v: 5.0,
                    min_v: 0.0,
                    ki: 0.0,
                    use_pid: false,
                })
                .collect(),
        )
    }
}

/// One entry of the pressure schedule.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FlowStep {
    /// Upper pressure bound of this step, mbar.
    pub press: f64,
    /// Pump voltage applied at or below `press`.
    pub pump_v: f64,
}

/// Pressure-dependent pump voltage schedule.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct FlowStepConfig {
    /// Enable the schedule.
    pub enabled: bool,
    /// Steps ordered by decreasing pressure.
    pub steps: Vec<FlowStep>,
}

/// Role of a telemetry link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkRole {
    /// Sends the status frame, accepts single-digit commands.
    Status,
    /// Sends the full record and raw frames, accepts `key=value` commands.
    Full,
    /// Receives the aircraft navigation feed.
    Aircraft,
}

/// One serial link.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialPortConfig {
    /// UART number (`/dev/ttyO<port>`).
    pub port: u8,
    /// Baud rate.
    pub baud: u32,
    /// Link role.
    pub role: LinkRole,
    /// Open and service this link.
    #[serde(rename = "use", default = "default_true")]
    pub enabled: bool,
}

/// The serial links.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SerialPorts(pub Vec<SerialPortConfig>);

impl Default for SerialPorts {
    fn default() -> Self {
        Self(vec![
            SerialPortConfig {
                port: 1,
                baud: 9600,
                role: LinkRole::Status,
                enabled: true,
            },
            SerialPortConfig {
                port: 2,
                baud: 115_200,
                role: LinkRole::Full,
                enabled: true,
            },
        ])
    }
}

/// One UDP link.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UdpLinkConfig {
    /// Destination address (broadcast allowed).
    pub ip: String,
    /// Port used for both sending and receiving.
    pub port: u16,
    /// Link role.
    pub role: LinkRole,
    /// Open and service this link.
    #[serde(rename = "use", default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

/// Loop timing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Macro-cycle period.
    pub period_ms: u64,
    /// Sleep between drains in the tail loop.
    pub tail_sleep_us: u64,
    /// Hardware watchdog timeout.
    pub watchdog_timeout_s: u32,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            period_ms: 1000,
            tail_sleep_us: 1000,
            watchdog_timeout_s: 5,
        }
    }
}

/// Hardware driver selection and device paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HardwareConfig {
    /// Registered driver name (`beaglebone` or `simulation`).
    pub driver: String,
    /// Analog input files; `{}` is replaced by the channel number.
    pub ain_path: String,
    /// Pressure file (kPa).
    pub pressure_path: PathBuf,
    /// Temperature file (milli-°C).
    pub temperature_path: PathBuf,
    /// I2C bus of the output DAC.
    pub dac_bus: PathBuf,
    /// I2C address of the output DAC.
    pub dac_address: u16,
    /// GPIO number of the heartbeat LED.
    pub heartbeat_gpio: u32,
    /// GPIO number of the analog range alarm.
    pub alarm_gpio: u32,
    /// Watchdog device.
    pub watchdog_device: PathBuf,
    /// Serial device prefix; the UART number is appended.
    pub serial_prefix: String,
    /// Physical memory device for the coprocessor regions.
    pub mem_device: PathBuf,
    /// remoteproc directories for the two coprocessors.
    pub remoteproc: Vec<PathBuf>,
    /// Firmware names loaded into the coprocessors.
    pub firmware: Vec<String>,
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            driver: "beaglebone".to_string(),
            ain_path: "/sys/devices/ocp.3/helper.12/AIN{}".to_string(),
            pressure_path: PathBuf::from("/sys/bus/iio/devices/iio:device1/in_pressure_input"),
            temperature_path: PathBuf::from("/sys/bus/iio/devices/iio:device1/in_temp_input"),
            dac_bus: PathBuf::from("/dev/i2c-1"),
            dac_address: 0x0F,
            heartbeat_gpio: 23,
            alarm_gpio: 26,
            watchdog_device: PathBuf::from("/dev/watchdog"),
            serial_prefix: "/dev/ttyO".to_string(),
            mem_device: PathBuf::from("/dev/mem"),
            remoteproc: vec![
                PathBuf::from("/sys/class/remoteproc/remoteproc1"),
                PathBuf::from("/sys/class/remoteproc/remoteproc2"),
            ],
            firmware: vec![
                "pops-pru0-fw".to_string(),
                "pops-pru1-fw".to_string(),
            ],
        }
    }
}
