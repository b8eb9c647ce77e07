//! Adapters for the sensors on the diagnostic box
//!
//! | Sensor   | Address | Measurements                               |
//! |----------|---------|--------------------------------------------|
//! | PMSA003I | 0x12    | PM1.0 / PM2.5 / PM10 (env and standard)    |
//! | MCP9808  | 0x18    | Temperature                                |
//! | INA219   | 0x40    | Current, power, bus voltage                |
//! | SCD30    | 0x61    | CO2, relative humidity, temperature        |
//! | BME680   | 0x77    | Gas resistance, humidity, pressure, temp   |
//!
//! Every adapter returns its values in the order of the role's parameter
//! list, so the sampling loop can treat all of them the same way.
pub mod bme680;
pub mod ina219;
pub mod mcp9808;
pub mod pm25;
pub mod scd30;

use std::path::Path;

use crate::error::SensorError;
use crate::i2c::bus::I2cBus;
use crate::models::SensorKind;

pub use bme680::Bme680;
pub use ina219::Ina219;
pub use mcp9808::Mcp9808;
pub use pm25::Pmsa003i;
pub use scd30::Scd30;

/// Uniform read contract for every sensor adapter
pub trait Sensor {
    /// One reading of every parameter, ordered like the role's parameters
    ///
    /// A non-finite value marks a single parameter as missing this cycle.
    fn read(&mut self, bus: &mut dyn I2cBus) -> Result<Vec<f64>, SensorError>;

    fn name(&self) -> &'static str;
}

/// Fresh driver for a role
///
/// `bus_path` is only used by drivers that open their own device handle.
pub fn driver_for(kind: SensorKind, address: u16, bus_path: &Path) -> Box<dyn Sensor> {
    match kind {
        SensorKind::Pmsa003i => Box::new(Pmsa003i::new(address)),
        SensorKind::Mcp9808 => Box::new(Mcp9808::new(address)),
        SensorKind::Ina219 => Box::new(Ina219::new(address)),
        SensorKind::Scd30 => Box::new(Scd30::new(address, bus_path)),
        SensorKind::Bme680 => Box::new(Bme680::new(address)),
    }
}

/// Big-endian u16 at `offset`
pub(crate) fn be_u16(bytes: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([bytes[offset], bytes[offset + 1]])
}
