use crate::error::SensorError;
use crate::i2c::bus::I2cBus;
use crate::sensors::{be_u16, Sensor};

const FRAME_LEN: usize = 32;
const FRAME_HEADER: [u8; 2] = [0x42, 0x4d];

/// PMSA003I particulate sensor
///
/// The sensor streams a fixed 32-byte frame; it holds the clock while a new
/// frame is being assembled, so reads faster than ~1 s apart tend to fail.
pub struct Pmsa003i {
    address: u16,
}

/// Mass concentrations in µg/m³
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PmReading {
    pub pm10_standard: u16,
    pub pm25_standard: u16,
    pub pm100_standard: u16,
    pub pm10_env: u16,
    pub pm25_env: u16,
    pub pm100_env: u16,
}

impl Pmsa003i {
    pub fn new(address: u16) -> Self {
        Pmsa003i { address }
    }

    pub fn measure(&mut self, bus: &mut dyn I2cBus) -> Result<PmReading, SensorError> {
        let mut frame = [0u8; FRAME_LEN];
        bus.read(self.address, &mut frame)?;
        decode_frame(&frame)
    }
}

/// Validate and unpack one sensor frame
pub fn decode_frame(frame: &[u8]) -> Result<PmReading, SensorError> {
    if frame.len() < FRAME_LEN || frame[..2] != FRAME_HEADER {
        return Err(SensorError::Unavailable { sensor: "PMSA003I" });
    }

    let expected = be_u16(frame, 30);
    let sum = frame[..30]
        .iter()
        .fold(0u16, |acc, &b| acc.wrapping_add(u16::from(b)));
    if sum != expected {
        return Err(SensorError::invalid(
            "PMSA003I",
            format!("checksum 0x{:04x} != 0x{:04x}", sum, expected),
        ));
    }

    Ok(PmReading {
        pm10_standard: be_u16(frame, 4),
        pm25_standard: be_u16(frame, 6),
        pm100_standard: be_u16(frame, 8),
        pm10_env: be_u16(frame, 10),
        pm25_env: be_u16(frame, 12),
        pm100_env: be_u16(frame, 14),
    })
}

impl Sensor for Pmsa003i {
    fn read(&mut self, bus: &mut dyn I2cBus) -> Result<Vec<f64>, SensorError> {
        let pm = self.measure(bus)?;
        Ok([
            pm.pm10_env,
            pm.pm25_env,
            pm.pm100_env,
            pm.pm10_standard,
            pm.pm25_standard,
            pm.pm100_standard,
        ]
        .into_iter()
        .map(f64::from)
        .collect())
    }

    fn name(&self) -> &'static str {
        "PMSA003I"
    }
}
