/// Map detected bus addresses to the sensor roles wired on the box
use std::collections::BTreeSet;
use std::path::Path;

use log::{debug, info, warn};

use crate::i2c::mux::MUX_ADDRESS;
use crate::models::{SensorKind, SensorRole};
use crate::sensors::{self, Sensor};

const PM: &[&str] = &[
    "PM1.0 ENV",
    "PM2.5 ENV",
    "PM10.0 ENV",
    "PM1.0 ST",
    "PM2.5 ST",
    "PM10.0 ST",
];
const TEMP: &[&str] = &["Temp"];
const RAIL: &[&str] = &["Current", "Power", "Voltage"];
const CO2: &[&str] = &["CO2", "RH", "Temp"];
const ENV: &[&str] = &["Gas", "RH", "Pressure", "Temp"];

const fn role(
    name: &'static str,
    parameters: &'static [&'static str],
    channel: u8,
    address: u16,
    kind: SensorKind,
) -> SensorRole {
    SensorRole {
        name,
        parameters,
        channel,
        address,
        kind,
    }
}

/// Every role the box knows about, in CSV column order
///
/// The five INA219 rail monitors all answer at 0x40; only the mux channel
/// tells them apart.
pub const KNOWN_ROLES: &[SensorRole] = &[
    role("PM", PM, 5, 0x12, SensorKind::Pmsa003i),
    role("MCP", TEMP, 6, 0x18, SensorKind::Mcp9808),
    role("Purpleair", RAIL, 0, 0x40, SensorKind::Ina219),
    role("WIFI", RAIL, 7, 0x40, SensorKind::Ina219),
    role("RPI", RAIL, 4, 0x40, SensorKind::Ina219),
    role("Comms", RAIL, 3, 0x40, SensorKind::Ina219),
    role("Fans", RAIL, 2, 0x40, SensorKind::Ina219),
    role("SCD", CO2, 5, 0x61, SensorKind::Scd30),
    role("BME", ENV, 5, 0x77, SensorKind::Bme680),
];

/// A role paired with the driver instance that reads it
pub struct RoleProbe {
    pub role: SensorRole,
    pub sensor: Box<dyn Sensor>,
}

/// Roles present on the bus, in table order
///
/// Addresses without a known role are ignored.
pub fn build(addresses: &BTreeSet<u16>) -> Vec<SensorRole> {
    for address in addresses {
        if *address == MUX_ADDRESS {
            info!("MUX breakout connected");
        } else if !KNOWN_ROLES.iter().any(|r| r.address == *address) {
            debug!("Ignoring unknown device at 0x{:02x}", address);
        }
    }

    let roles: Vec<SensorRole> = KNOWN_ROLES
        .iter()
        .filter(|r| addresses.contains(&r.address))
        .cloned()
        .collect();

    for role in &roles {
        info!(
            "{} connected (0x{:02x}, channel {})",
            role.name, role.address, role.channel
        );
    }
    roles
}

/// Drop roles whose mux channel is not enabled
pub fn restrict_to_channels(roles: Vec<SensorRole>, channels: &[u8]) -> Vec<SensorRole> {
    roles
        .into_iter()
        .filter(|role| {
            let enabled = channels.contains(&role.channel);
            if !enabled {
                warn!(
                    "{} is wired to channel {}, which is not enabled; skipping",
                    role.name, role.channel
                );
            }
            enabled
        })
        .collect()
}

pub fn attach_drivers(roles: &[SensorRole], bus_path: &Path) -> Vec<RoleProbe> {
    roles
        .iter()
        .map(|role| RoleProbe {
            role: role.clone(),
            sensor: sensors::driver_for(role.kind, role.address, bus_path),
        })
        .collect()
}
