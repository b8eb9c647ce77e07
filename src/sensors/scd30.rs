use std::path::{Path, PathBuf};

use i2cdev::linux::LinuxI2CDevice;
use log::info;
use scd30_i2c::scd30::{Scd30 as Scd30Device, Scd30Error};

use crate::error::SensorError;
use crate::i2c::bus::I2cBus;
use crate::sensors::Sensor;

const MEASUREMENT_INTERVAL_SECS: u16 = 2;

/// Transactions the adapter needs from an SCD30
pub trait Scd30Link {
    fn start(&mut self, interval_secs: u16) -> Result<(), Scd30Error>;
    fn data_ready(&mut self) -> Result<bool, Scd30Error>;
    /// CO2 (ppm), temperature (°C), relative humidity (%)
    fn measurements(&mut self) -> Result<(f32, f32, f32), Scd30Error>;
}

impl Scd30Link for Scd30Device {
    fn start(&mut self, interval_secs: u16) -> Result<(), Scd30Error> {
        self.trigger_cont_measurements()?;
        self.set_measurements_interval(interval_secs)
    }

    fn data_ready(&mut self) -> Result<bool, Scd30Error> {
        self.get_data_ready()
    }

    fn measurements(&mut self) -> Result<(f32, f32, f32), Scd30Error> {
        self.get_measurements()
    }
}

/// SCD30 NDIR CO2 sensor in continuous-measurement mode
///
/// The sensor only produces a new value every measurement interval; asking
/// earlier yields "data not ready", which maps to `SensorError::Unavailable`.
/// The device gets its own handle on the bus file, so it is reached through
/// whichever mux channel was selected before the read.
pub struct Scd30 {
    address: u16,
    bus_path: PathBuf,
    link: Option<Box<dyn Scd30Link>>,
    started: bool,
}

impl Scd30 {
    pub fn new(address: u16, bus_path: &Path) -> Self {
        Scd30 {
            address,
            bus_path: bus_path.to_path_buf(),
            link: None,
            started: false,
        }
    }

    #[cfg(test)]
    fn with_link(address: u16, link: Box<dyn Scd30Link>) -> Self {
        Scd30 {
            address,
            bus_path: PathBuf::new(),
            link: Some(link),
            started: false,
        }
    }

    fn error(&self, err: Scd30Error) -> SensorError {
        match err {
            Scd30Error::ChecksumError => SensorError::invalid("SCD30", "checksum mismatch"),
            other => SensorError::hardware(self.address, other),
        }
    }

    fn link(&mut self) -> Result<&mut Box<dyn Scd30Link>, SensorError> {
        if self.link.is_none() {
            let i2cdev = LinuxI2CDevice::new(&self.bus_path, self.address)
                .map_err(|e| SensorError::hardware(self.address, e))?;
            info!("Opened SCD30 at 0x{:02x} on {}", self.address, self.bus_path.display());
            self.link = Some(Box::new(Scd30Device { i2cdev }));
        }
        self.link
            .as_mut()
            .ok_or_else(|| SensorError::hardware(self.address, "device handle missing"))
    }

    pub fn measure(&mut self) -> Result<(f32, f32, f32), SensorError> {
        if !self.started {
            let result = self.link()?.start(MEASUREMENT_INTERVAL_SECS);
            result.map_err(|e| self.error(e))?;
            self.started = true;
        }

        let ready = self.link()?.data_ready();
        if !ready.map_err(|e| self.error(e))? {
            return Err(SensorError::Unavailable { sensor: "SCD30" });
        }

        let measurements = self.link()?.measurements();
        measurements.map_err(|e| self.error(e))
    }
}

impl Sensor for Scd30 {
    fn read(&mut self, _bus: &mut dyn I2cBus) -> Result<Vec<f64>, SensorError> {
        let (co2, temperature, humidity) = self.measure()?;
        Ok(vec![f64::from(co2), f64::from(humidity), f64::from(temperature)])
    }

    fn name(&self) -> &'static str {
        "SCD30"
    }
}
