use crate::error::SensorError;
use crate::i2c::bus::I2cBus;
use crate::sensors::Sensor;

const REG_AMBIENT_TEMP: u8 = 0x05;

/// MCP9808 precision temperature sensor
pub struct Mcp9808 {
    address: u16,
}

impl Mcp9808 {
    pub fn new(address: u16) -> Self {
        Mcp9808 { address }
    }

    pub fn temperature(&mut self, bus: &mut dyn I2cBus) -> Result<f64, SensorError> {
        let mut raw = [0u8; 2];
        bus.write_read(self.address, &[REG_AMBIENT_TEMP], &mut raw)?;
        Ok(decode_temperature(raw[0], raw[1]))
    }
}

/// Ambient temperature register to °C
///
/// Upper three bits are alert flags, bit 12 is the sign, LSB is 1/16 °C.
pub fn decode_temperature(upper: u8, lower: u8) -> f64 {
    let magnitude = f64::from(upper & 0x0f) * 16.0 + f64::from(lower) / 16.0;
    if upper & 0x10 != 0 {
        magnitude - 256.0
    } else {
        magnitude
    }
}

impl Sensor for Mcp9808 {
    fn read(&mut self, bus: &mut dyn I2cBus) -> Result<Vec<f64>, SensorError> {
        Ok(vec![self.temperature(bus)?])
    }

    fn name(&self) -> &'static str {
        "MCP9808"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::i2c::bus::mock::MockBus;

    #[test]
    fn decodes_positive_and_negative() {
        assert_eq!(decode_temperature(0x01, 0x94), 25.25);
        assert_eq!(decode_temperature(0x1f, 0xf0), -1.0);
        // alert flags do not leak into the value
        assert_eq!(decode_temperature(0xe1, 0x94), 25.25);
    }

    #[test]
    fn reads_ambient_register() {
        let mut bus = MockBus::new();
        bus.queue(0x18, &[0x01, 0x50]);

        let values = Mcp9808::new(0x18).read(&mut bus).unwrap();

        assert_eq!(values, vec![21.0]);
        assert_eq!(bus.writes_to(0x18), vec![vec![REG_AMBIENT_TEMP]]);
    }
}
