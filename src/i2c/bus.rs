/// Raw I2C transactions against the Linux character device
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use i2cdev::core::I2CDevice;
use i2cdev::linux::LinuxI2CDevice;
use log::debug;

use crate::error::SensorError;

/// Minimal set of transactions the mux and sensor adapters need
///
/// Every call is one blocking transaction. Implementations are not expected
/// to be shared between threads; the bus is lent `&mut` to whoever talks to it.
pub trait I2cBus {
    fn write(&mut self, address: u16, bytes: &[u8]) -> Result<(), SensorError>;

    fn read(&mut self, address: u16, buffer: &mut [u8]) -> Result<(), SensorError>;

    /// Register-pointer write followed by a separate read
    fn write_read(
        &mut self,
        address: u16,
        bytes: &[u8],
        buffer: &mut [u8],
    ) -> Result<(), SensorError> {
        self.write(address, bytes)?;
        self.read(address, buffer)
    }

    /// Returns true if a device acknowledges at `address`
    fn probe(&mut self, address: u16) -> bool;
}

/// I2C bus backed by `/dev/i2c-N`
///
/// `i2cdev` binds one file handle to one slave address, so handles are
/// opened lazily and kept per address.
pub struct LinuxBus {
    path: PathBuf,
    devices: HashMap<u16, LinuxI2CDevice>,
}

impl LinuxBus {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SensorError> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Err(SensorError::HardwareIo {
                address: 0,
                message: format!("{} does not exist (is I2C enabled?)", path.display()),
            });
        }
        Ok(LinuxBus {
            path,
            devices: HashMap::new(),
        })
    }

    fn device(&mut self, address: u16) -> Result<&mut LinuxI2CDevice, SensorError> {
        if !self.devices.contains_key(&address) {
            let device = LinuxI2CDevice::new(&self.path, address)
                .map_err(|e| SensorError::hardware(address, e))?;
            self.devices.insert(address, device);
        }
        self.devices
            .get_mut(&address)
            .ok_or_else(|| SensorError::hardware(address, "device handle missing"))
    }
}

impl I2cBus for LinuxBus {
    fn write(&mut self, address: u16, bytes: &[u8]) -> Result<(), SensorError> {
        self.device(address)?
            .write(bytes)
            .map_err(|e| SensorError::hardware(address, e))
    }

    fn read(&mut self, address: u16, buffer: &mut [u8]) -> Result<(), SensorError> {
        self.device(address)?
            .read(buffer)
            .map_err(|e| SensorError::hardware(address, e))
    }

    fn probe(&mut self, address: u16) -> bool {
        let device = match self.device(address) {
            Ok(device) => device,
            Err(e) => {
                debug!("Probe 0x{:02x}: {}", address, e);
                return false;
            }
        };

        // Same choice as i2cdetect: quick write is unsafe for EEPROM ranges
        let acked = if (0x30..=0x37).contains(&address) || (0x50..=0x5f).contains(&address) {
            device.smbus_read_byte().is_ok()
        } else {
            device.smbus_write_quick(false).is_ok()
        };

        if !acked {
            self.devices.remove(&address);
        }
        acked
    }
}
