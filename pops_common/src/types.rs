//! Shared data types: particle events, status selectors and analog conversions.

use serde::{Deserialize, Serialize};
use std::fmt;

// ─── Particle events ────────────────────────────────────────────────

/// Tick rate of the coprocessor timer, in ticks per microsecond.
const TICKS_PER_MICROSECOND: u32 = 200;

/// Rounding bias applied before the tick conversion.
const TICK_ROUNDING: u32 = 16;

/// One detected particle, decoded from a two-word ring record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ParticleEvent {
    /// Peak height above zero, in ADC counts.
    pub peak: u16,
    /// Pulse width, in samples.
    pub width: u16,
    /// Time since the previous event, in microseconds.
    pub dt_micros: u32,
}

impl ParticleEvent {
    /// Decode a ring record: word0 = width (high 16) | peak (low 16),
    /// word1 = raw inter-arrival tick count.
    #[inline]
    pub const fn from_words(word0: u32, word1: u32) -> Self {
        Self {
            peak: (word0 & 0xFFFF) as u16,
            width: (word0 >> 16) as u16,
            dt_micros: ticks_to_micros(word1),
        }
    }

    /// Encode as the two ring words the producer writes, given raw ticks.
    #[inline]
    pub const fn to_words(peak: u16, width: u16, raw_ticks: u32) -> (u32, u32) {
        (((width as u32) << 16) | peak as u32, raw_ticks)
    }
}

/// Convert raw coprocessor ticks to microseconds.
#[inline]
pub const fn ticks_to_micros(raw: u32) -> u32 {
    raw.wrapping_add(TICK_ROUNDING) / TICKS_PER_MICROSECOND
}

// ─── Status type ────────────────────────────────────────────────────

/// Telemetry status-frame variant selected by configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusType {
    /// Radiosonde hex frame with concentration, flow, temperature, 8 bins.
    IMet,
    /// Radiosonde hex frame with flow and 8 bins.
    IMetTrm,
    /// Radiosonde hex frame with the full housekeeping set.
    IMetAng,
    /// UAV CSV status line without histogram.
    Uav,
    /// Manta CSV status line with histogram.
    Manta,
    /// Minimal CSV line: concentration and 8 bins.
    Wb57,
    /// Ground display line.
    Display,
    /// Any other name: the legacy default hex frame.
    Legacy,
}

impl StatusType {
    /// Map a configured name to its variant. Unknown names select [`StatusType::Legacy`].
    pub fn from_name(name: &str) -> Self {
        match name {
            "iMet" => Self::IMet,
            "iMet_TRM" => Self::IMetTrm,
            "iMet_ANG" => Self::IMetAng,
            "UAV" => Self::Uav,
            "Manta" => Self::Manta,
            "WB57" => Self::Wb57,
            "Display" => Self::Display,
            _ => Self::Legacy,
        }
    }

    /// Whether the status frame uses the compressed 8-bin histogram.
    pub const fn uses_compressed_bins(self) -> bool {
        matches!(self, Self::IMet | Self::IMetTrm | Self::Wb57)
    }

    /// Whether channel 0 (flow) is supplied externally instead of read.
    pub const fn external_flow(self) -> bool {
        matches!(self, Self::Manta)
    }
}

// ─── Instrument status code ─────────────────────────────────────────

/// Instrument status code reported in telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(i32)]
pub enum InstrumentStatus {
    /// First cycle after power-up.
    #[default]
    Startup = 1,
    /// Normal acquisition.
    Running = 3,
    /// Flow below the configured minimum.
    LowFlow = 17,
    /// Hardware failure.
    Failed = 32,
}

impl InstrumentStatus {
    /// Numeric code as sent on the wire.
    pub const fn code(self) -> i32 {
        self as i32
    }
}

impl fmt::Display for InstrumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

// ─── Analog input conversion ────────────────────────────────────────

/// Millivolts at the instrument connector per millivolt at the ADC pin.
const DIVIDER_GAIN: f64 = 2.79787;

/// Battery divider scale, volts per ADC millivolt.
const BATTERY_SCALE: f64 = 0.011_176_991_15;

/// Full-scale relative-humidity sensor voltage.
const RH_FULL_SCALE_V: f64 = 5.03617;

/// Pressure transducer scale, mbar per volt.
const PRESSURE_SCALE: f64 = 1013.25;

// Steinhart–Hart coefficients of the board thermistor.
const THERM_A: f64 = 1.132_069_757_264_44e-3;
const THERM_B: f64 = 2.334_310_805_264_47e-4;
const THERM_C: f64 = 9.434_704_161_575_94e-8;
const THERM_D: f64 = -2.637_223_847_778_03e-11;

/// Flow calibration applied by [`AnalogConversion::Flow`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FlowCalibration {
    /// Volts subtracted before scaling.
    #[serde(default)]
    pub offset: f64,
    /// Volts per unit flow.
    #[serde(default = "default_divisor")]
    pub divisor: f64,
}

fn default_divisor() -> f64 {
    1.0
}

impl Default for FlowCalibration {
    fn default() -> Self {
        Self {
            offset: 0.0,
            divisor: default_divisor(),
        }
    }
}

/// Engineering-unit conversion of one analog input channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum AnalogConversion {
    /// Raw ADC millivolts (0–1800).
    #[serde(rename = "rawai")]
    Raw,
    /// Connector millivolts.
    #[serde(rename = "mV")]
    MilliVolts,
    /// Connector volts.
    #[default]
    #[serde(rename = "V")]
    Volts,
    /// Thermistor temperature in °C.
    #[serde(rename = "Therm")]
    Thermistor,
    /// Battery volts.
    #[serde(rename = "BatV")]
    Battery,
    /// Flow with offset and divisor.
    #[serde(rename = "Flow")]
    Flow,
    /// Relative humidity in percent.
    #[serde(rename = "RH_pct")]
    RelativeHumidity,
    /// Pressure in mbar.
    #[serde(rename = "Pres")]
    Pressure,
}

impl AnalogConversion {
    /// Convert an ADC reading in millivolts to engineering units.
    pub fn convert(self, millivolts: i32, flow: &FlowCalibration) -> f64 {
        let mv = f64::from(millivolts);
        let volts = mv * DIVIDER_GAIN / 1000.0;
        match self {
            Self::Raw => mv,
            Self::MilliVolts => mv * DIVIDER_GAIN,
            Self::Volts => volts,
            Self::Pressure => volts * PRESSURE_SCALE,
            Self::Battery => mv * BATTERY_SCALE,
            Self::Flow => (volts - flow.offset) / flow.divisor,
            Self::RelativeHumidity => volts * 100.0 / RH_FULL_SCALE_V,
            Self::Thermistor => {
                let lr = (1.24 * ((3601.6 / mv) - 1.0) * 1000.0).ln();
                let denom =
                    THERM_A + THERM_B * lr + THERM_C * lr.powi(3) + THERM_D * lr.powi(5);
                1.0 / denom - 273.15
            }
        }
    }
}
