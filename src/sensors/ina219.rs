use crate::error::SensorError;
use crate::i2c::bus::I2cBus;
use crate::sensors::{be_u16, Sensor};

const REG_CONFIG: u8 = 0x00;
const REG_BUS_VOLTAGE: u8 = 0x02;
const REG_POWER: u8 = 0x03;
const REG_CURRENT: u8 = 0x04;
const REG_CALIBRATION: u8 = 0x05;

// 32V bus range, /8 shunt gain, 12-bit ADCs, continuous shunt and bus
const CONFIG_32V_2A: u16 = 0x399f;
const CALIBRATION_32V_2A: u16 = 4096;

const CURRENT_LSB_MA: f64 = 0.1;
const POWER_LSB_W: f64 = 0.002;
const BUS_VOLTAGE_LSB_V: f64 = 0.004;

/// INA219 current / power monitor on one supply rail
pub struct Ina219 {
    address: u16,
    configured: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RailReading {
    pub current_ma: f64,
    pub power_w: f64,
    pub bus_voltage_v: f64,
}

impl Ina219 {
    pub fn new(address: u16) -> Self {
        Ina219 {
            address,
            configured: false,
        }
    }

    fn write_register(&mut self, bus: &mut dyn I2cBus, reg: u8, value: u16) -> Result<(), SensorError> {
        let [hi, lo] = value.to_be_bytes();
        bus.write(self.address, &[reg, hi, lo])
    }

    fn read_register(&mut self, bus: &mut dyn I2cBus, reg: u8) -> Result<u16, SensorError> {
        let mut raw = [0u8; 2];
        bus.write_read(self.address, &[reg], &mut raw)?;
        Ok(be_u16(&raw, 0))
    }

    pub fn measure(&mut self, bus: &mut dyn I2cBus) -> Result<RailReading, SensorError> {
        if !self.configured {
            self.write_register(bus, REG_CONFIG, CONFIG_32V_2A)?;
            self.configured = true;
        }
        // A brown-out resets the calibration register, which zeroes current and power
        self.write_register(bus, REG_CALIBRATION, CALIBRATION_32V_2A)?;

        let bus_voltage = self.read_register(bus, REG_BUS_VOLTAGE)?;
        let power = self.read_register(bus, REG_POWER)?;
        let current = self.read_register(bus, REG_CURRENT)? as i16;

        Ok(RailReading {
            current_ma: f64::from(current) * CURRENT_LSB_MA,
            power_w: f64::from(power) * POWER_LSB_W,
            bus_voltage_v: f64::from(bus_voltage >> 3) * BUS_VOLTAGE_LSB_V,
        })
    }
}

impl Sensor for Ina219 {
    fn read(&mut self, bus: &mut dyn I2cBus) -> Result<Vec<f64>, SensorError> {
        let rail = self.measure(bus)?;
        Ok(vec![rail.current_ma, rail.power_w, rail.bus_voltage_v])
    }

    fn name(&self) -> &'static str {
        "INA219"
    }
}
