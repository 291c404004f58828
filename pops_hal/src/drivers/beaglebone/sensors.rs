//! sysfs readers for analog inputs and the pressure/temperature sensor.

use pops_common::hal::driver::HalError;
use std::path::Path;

/// Read an integer from a sysfs attribute.
pub fn read_int(path: &Path) -> Result<i64, HalError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| HalError::CommunicationError(format!("{}: {e}", path.display())))?;
    text.trim()
        .parse()
        .map_err(|e| HalError::CommunicationError(format!("{}: {e}", path.display())))
}

/// Read a floating-point value from a sysfs attribute.
pub fn read_float(path: &Path) -> Result<f64, HalError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| HalError::CommunicationError(format!("{}: {e}", path.display())))?;
    text.trim()
        .parse()
        .map_err(|e| HalError::CommunicationError(format!("{}: {e}", path.display())))
}

/// Expand the `{}` placeholder of an analog input path template.
pub fn ain_path(template: &str, channel: usize) -> String {
    template.replace("{}", &channel.to_string())
}

/// Pressure in mbar from an IIO `in_pressure_input` attribute (kPa).
pub fn read_pressure_mbar(path: &Path) -> Result<f64, HalError> {
    Ok(read_float(path)? * 10.0)
}

/// Temperature in °C from an IIO `in_temp_input` attribute (milli-°C).
pub fn read_temperature_c(path: &Path) -> Result<f64, HalError> {
    Ok(read_float(path)? / 1000.0)
}
