/// TCA9548A 8-channel I2C multiplexer
use std::collections::BTreeSet;
use std::thread;
use std::time::Duration;

use log::{debug, info};

use crate::error::{Error, SensorError};
use crate::i2c::bus::I2cBus;

pub const MUX_ADDRESS: u16 = 0x70;
pub const CHANNEL_COUNT: u8 = 8;

// Lines need time to come up after the control register changes
const ENABLE_SETTLE: Duration = Duration::from_secs(1);

// 7-bit address space that i2cdetect walks by default
const SCAN_FIRST: u16 = 0x08;
const SCAN_LAST: u16 = 0x77;

/// Channel gateway for devices that share one bus address
///
/// Every channel is disabled after power-on, so `enable` must run once
/// before any channel-scoped read.
pub struct Tca9548a {
    address: u16,
    settle: Duration,
}

impl Tca9548a {
    pub fn new(address: u16) -> Self {
        Tca9548a {
            address,
            settle: ENABLE_SETTLE,
        }
    }

    #[cfg(test)]
    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    /// Turn on the given lines and wait for them to settle
    ///
    /// The command and the delay are re-issued even when the lines are
    /// already on.
    pub fn enable(&mut self, bus: &mut dyn I2cBus, channels: &[u8]) -> Result<(), Error> {
        let mask = channel_mask(channels)?;
        info!("Enabling channels {:?}", channels);
        bus.write(self.address, &[mask])?;
        if !self.settle.is_zero() {
            thread::sleep(self.settle);
        }
        Ok(())
    }

    /// Route the bus to exactly one channel for the next transactions
    pub fn select(&mut self, bus: &mut dyn I2cBus, channel: u8) -> Result<(), SensorError> {
        if channel >= CHANNEL_COUNT {
            return Err(SensorError::hardware(
                self.address,
                format!("channel {} out of range", channel),
            ));
        }
        bus.write(self.address, &[1 << channel])
    }

    /// Read back the control register
    pub fn status(&mut self, bus: &mut dyn I2cBus) -> Result<u8, SensorError> {
        let mut mask = [0u8; 1];
        bus.read(self.address, &mut mask)?;
        Ok(mask[0])
    }

    /// Addresses currently acknowledging on the enabled lines
    pub fn scan(&mut self, bus: &mut dyn I2cBus) -> BTreeSet<u16> {
        let found: BTreeSet<u16> = (SCAN_FIRST..=SCAN_LAST)
            .filter(|&address| bus.probe(address))
            .collect();
        debug!(
            "Scan found: {}",
            found
                .iter()
                .map(|a| format!("0x{:02x}", a))
                .collect::<Vec<_>>()
                .join(", ")
        );
        found
    }
}

/// Build the control-register mask for a channel list
pub fn channel_mask(channels: &[u8]) -> Result<u8, Error> {
    channels.iter().try_fold(0u8, |mask, &channel| {
        if channel >= CHANNEL_COUNT {
            Err(Error::Config(format!(
                "mux channel {} out of range 0-{}",
                channel,
                CHANNEL_COUNT - 1
            )))
        } else {
            Ok(mask | (1 << channel))
        }
    })
}

/// One "Channel N: enabled/disabled" line per channel
pub fn describe_status(mask: u8) -> Vec<String> {
    (0..CHANNEL_COUNT)
        .map(|channel| {
            let state = if mask & (1 << channel) != 0 {
                "enabled"
            } else {
                "disabled"
            };
            format!("Channel {}: {}", channel, state)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::i2c::bus::mock::MockBus;

    fn mux() -> Tca9548a {
        Tca9548a::new(MUX_ADDRESS).with_settle(Duration::ZERO)
    }

    #[test]
    fn enable_writes_mask_every_time() {
        let mut bus = MockBus::new();
        let mut mux = mux();

        mux.enable(&mut bus, &[0, 3, 4, 7]).unwrap();
        mux.enable(&mut bus, &[0, 3, 4, 7]).unwrap();

        assert_eq!(bus.writes_to(MUX_ADDRESS), vec![vec![0b1001_1001]; 2]);
    }

    #[test]
    fn enable_rejects_channel_out_of_range() {
        let mut bus = MockBus::new();
        let err = mux().enable(&mut bus, &[1, 8]).unwrap_err();

        assert!(matches!(err, Error::Config(_)));
        assert!(bus.writes.is_empty());
    }

    #[test]
    fn enable_surfaces_bus_failure() {
        let mut bus = MockBus::new();
        bus.failing.insert(MUX_ADDRESS);

        let err = mux().enable(&mut bus, &[0]).unwrap_err();

        assert!(matches!(
            err,
            Error::Sensor(SensorError::HardwareIo { address: 0x70, .. })
        ));
    }

    #[test]
    fn select_routes_single_channel() {
        let mut bus = MockBus::new();
        let mut mux = mux();

        mux.select(&mut bus, 5).unwrap();

        assert_eq!(bus.writes_to(MUX_ADDRESS), vec![vec![0b0010_0000]]);
        assert!(mux.select(&mut bus, 9).is_err());
    }

    #[test]
    fn scan_returns_acknowledging_addresses() {
        let mut bus = MockBus::with_devices(&[0x12, 0x40, 0x70, 0x77, 0x03]);

        let found = mux().scan(&mut bus);

        assert_eq!(found.into_iter().collect::<Vec<_>>(), vec![0x12, 0x40, 0x70, 0x77]);
    }

    #[test]
    fn status_lines_follow_mask() {
        let mut bus = MockBus::new();
        bus.queue(MUX_ADDRESS, &[0b1000_0001]);

        let mask = mux().status(&mut bus).unwrap();
        let lines = describe_status(mask);

        assert_eq!(lines.len(), 8);
        assert_eq!(lines[0], "Channel 0: enabled");
        assert_eq!(lines[1], "Channel 1: disabled");
        assert_eq!(lines[7], "Channel 7: enabled");
    }
}
