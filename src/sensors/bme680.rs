use std::thread;
use std::time::Duration;

use crate::error::SensorError;
use crate::i2c::bus::I2cBus;
use crate::sensors::Sensor;

mod regs {
    pub const RES_HEAT_VAL: u8 = 0x00;
    pub const RES_HEAT_RANGE: u8 = 0x02;
    pub const RANGE_SW_ERR: u8 = 0x04;
    pub const EAS_STATUS_0: u8 = 0x1d;
    pub const PRESS_MSB: u8 = 0x1f;
    pub const RES_HEAT_0: u8 = 0x5a;
    pub const GAS_WAIT_0: u8 = 0x64;
    pub const CTRL_GAS_1: u8 = 0x71;
    pub const CTRL_HUM: u8 = 0x72;
    pub const CTRL_MEAS: u8 = 0x74;
    pub const CONFIG: u8 = 0x75;
    pub const CALIB_0: u8 = 0x89;
    pub const ID: u8 = 0xd0;
    pub const RESET: u8 = 0xe0;
    pub const CALIB_1: u8 = 0xe1;
}

const CHIP_ID: u8 = 0x61;
const SOFT_RESET: u8 = 0xb6;

const CALIB_0_LEN: usize = 25;
const CALIB_1_LEN: usize = 16;
const RAW_DATA_LEN: usize = 13;

// Oversampling: humidity x2, temperature x8, pressure x4; IIR filter size 3
const OSRS_H: u8 = 0b010;
const OSRS_T: u8 = 0b100;
const OSRS_P: u8 = 0b011;
const FILTER: u8 = 0b010;
const MODE_FORCED: u8 = 0b01;
const RUN_GAS: u8 = 0x10;

const HEATER_TEMP_C: f64 = 320.0;
const HEATER_MS: u16 = 150;
const AMBIENT_C: f64 = 25.0;

const GAS_RANGE_K1: [f64; 16] = [
    1.0, 1.0, 1.0, 1.0, 1.0, 0.99, 1.0, 0.992, 1.0, 1.0, 0.998, 0.995, 1.0, 0.99, 1.0, 1.0,
];
const GAS_RANGE_K2: [f64; 16] = [
    8_000_000.0,
    4_000_000.0,
    2_000_000.0,
    1_000_000.0,
    499_500.4995,
    248_262.1648,
    125_000.0,
    63_004.032_26,
    31_281.281_28,
    15_625.0,
    7_812.5,
    3_906.25,
    1_953.125,
    976.5625,
    488.281_25,
    244.140_625,
];

/// Factory-fused compensation coefficients
#[derive(Debug, Clone, Default)]
pub struct Calibration {
    pub par_t1: u16,
    pub par_t2: i16,
    pub par_t3: i8,
    pub par_p1: u16,
    pub par_p2: i16,
    pub par_p3: i8,
    pub par_p4: i16,
    pub par_p5: i16,
    pub par_p6: i8,
    pub par_p7: i8,
    pub par_p8: i16,
    pub par_p9: i16,
    pub par_p10: u8,
    pub par_h1: u16,
    pub par_h2: u16,
    pub par_h3: i8,
    pub par_h4: i8,
    pub par_h5: i8,
    pub par_h6: u8,
    pub par_h7: i8,
    pub par_g1: i8,
    pub par_g2: i16,
    pub par_g3: i8,
    pub res_heat_val: i8,
    pub res_heat_range: u8,
    pub range_sw_err: i8,
}

impl Calibration {
    /// Map the two coefficient blocks (0x89.. and 0xE1..) to parameters
    fn from_blocks(buf: &[u8; CALIB_0_LEN + CALIB_1_LEN]) -> Self {
        let le = |lo: usize, hi: usize| u16::from(buf[lo]) | (u16::from(buf[hi]) << 8);
        Calibration {
            par_t1: le(33, 34),
            par_t2: le(1, 2) as i16,
            par_t3: buf[3] as i8,
            par_p1: le(5, 6),
            par_p2: le(7, 8) as i16,
            par_p3: buf[9] as i8,
            par_p4: le(11, 12) as i16,
            par_p5: le(13, 14) as i16,
            par_p6: buf[16] as i8,
            par_p7: buf[15] as i8,
            par_p8: le(19, 20) as i16,
            par_p9: le(21, 22) as i16,
            par_p10: buf[23],
            par_h1: u16::from(buf[26] & 0x0f) | (u16::from(buf[27]) << 4),
            par_h2: u16::from(buf[26] >> 4) | (u16::from(buf[25]) << 4),
            par_h3: buf[28] as i8,
            par_h4: buf[29] as i8,
            par_h5: buf[30] as i8,
            par_h6: buf[31],
            par_h7: buf[32] as i8,
            par_g1: buf[37] as i8,
            par_g2: le(35, 36) as i16,
            par_g3: buf[38] as i8,
            ..Default::default()
        }
    }

    /// Returns (°C, t_fine)
    pub fn temperature(&self, adc: u32) -> (f64, f64) {
        let adc = f64::from(adc);
        let t1 = f64::from(self.par_t1);
        let var1 = (adc / 16384.0 - t1 / 1024.0) * f64::from(self.par_t2);
        let var2 = (adc / 131072.0 - t1 / 8192.0).powi(2) * (f64::from(self.par_t3) * 16.0);
        let t_fine = var1 + var2;
        (t_fine / 5120.0, t_fine)
    }

    /// Pressure in hPa
    pub fn pressure(&self, adc: u32, t_fine: f64) -> f64 {
        let mut var1 = t_fine / 2.0 - 64000.0;
        let mut var2 = var1 * var1 * (f64::from(self.par_p6) / 131072.0);
        var2 += var1 * f64::from(self.par_p5) * 2.0;
        var2 = var2 / 4.0 + f64::from(self.par_p4) * 65536.0;
        var1 = (f64::from(self.par_p3) * var1 * var1 / 16384.0 + f64::from(self.par_p2) * var1)
            / 524288.0;
        var1 = (1.0 + var1 / 32768.0) * f64::from(self.par_p1);
        if var1 == 0.0 {
            return 0.0;
        }
        let mut p = 1048576.0 - f64::from(adc);
        p = (p - var2 / 4096.0) * 6250.0 / var1;
        let var1 = f64::from(self.par_p9) * p * p / 2147483648.0;
        let var2 = p * (f64::from(self.par_p8) / 32768.0);
        let var3 = (p / 256.0).powi(3) * (f64::from(self.par_p10) / 131072.0);
        let pa = p + (var1 + var2 + var3 + f64::from(self.par_p7) * 128.0) / 16.0;
        pa / 100.0
    }

    /// Relative humidity in %, clamped to 0..=100
    pub fn humidity(&self, adc: u16, temp_c: f64) -> f64 {
        let var1 = f64::from(adc)
            - (f64::from(self.par_h1) * 16.0 + f64::from(self.par_h3) / 2.0 * temp_c);
        let var2 = var1
            * (f64::from(self.par_h2) / 262144.0
                * (1.0
                    + f64::from(self.par_h4) / 16384.0 * temp_c
                    + f64::from(self.par_h5) / 1048576.0 * temp_c * temp_c));
        let var3 = f64::from(self.par_h6) / 16384.0;
        let var4 = f64::from(self.par_h7) / 2097152.0;
        let rh = var2 + (var3 + var4 * temp_c) * var2 * var2;
        rh.clamp(0.0, 100.0)
    }

    /// Gas resistance in ohms
    pub fn gas_resistance(&self, adc: u16, range: u8) -> f64 {
        let range = usize::from(range & 0x0f);
        let var1 = (1340.0 + 5.0 * f64::from(self.range_sw_err)) * GAS_RANGE_K1[range];
        var1 * GAS_RANGE_K2[range] / (f64::from(adc) - 512.0 + var1)
    }

    /// Heater resistance register value for a target temperature
    pub fn heater_resistance(&self, target_c: f64, ambient_c: f64) -> u8 {
        let var1 = f64::from(self.par_g1) / 16.0 + 49.0;
        let var2 = f64::from(self.par_g2) / 32768.0 * 0.0005 + 0.00235;
        let var3 = f64::from(self.par_g3) / 1024.0;
        let var4 = var1 * (1.0 + var2 * target_c);
        let var5 = var4 + var3 * ambient_c;
        let res = 3.4
            * (var5
                * (4.0 / (4.0 + f64::from(self.res_heat_range)))
                * (1.0 / (1.0 + f64::from(self.res_heat_val) * 0.002))
                - 25.0);
        res.clamp(0.0, 255.0) as u8
    }
}

/// Gas wait register: 6-bit value with a x1/x4/x16/x64 multiplier
pub fn heater_duration(mut ms: u16) -> u8 {
    if ms >= 0xfc0 {
        return 0xff;
    }
    let mut factor = 0u8;
    while ms > 0x3f {
        ms /= 4;
        factor += 1;
    }
    ms as u8 + factor * 64
}

/// BME680 / BME688 gas, humidity, pressure and temperature sensor
pub struct Bme680 {
    address: u16,
    calibration: Option<Calibration>,
    cycle_delay: Duration,
    poll_delay: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnvReading {
    /// `None` when the heater was not stable or the conversion invalid
    pub gas_ohms: Option<f64>,
    pub humidity_pct: f64,
    pub pressure_hpa: f64,
    pub temperature_c: f64,
}

impl Bme680 {
    pub fn new(address: u16) -> Self {
        Bme680 {
            address,
            calibration: None,
            // TPH conversions plus the heater phase
            cycle_delay: Duration::from_millis(u64::from(HEATER_MS) + 50),
            poll_delay: Duration::from_millis(10),
        }
    }

    #[cfg(test)]
    fn without_delay(mut self) -> Self {
        self.cycle_delay = Duration::ZERO;
        self.poll_delay = Duration::ZERO;
        self
    }

    fn read_reg(&mut self, bus: &mut dyn I2cBus, reg: u8, buf: &mut [u8]) -> Result<(), SensorError> {
        bus.write_read(self.address, &[reg], buf)
    }

    fn read_byte(&mut self, bus: &mut dyn I2cBus, reg: u8) -> Result<u8, SensorError> {
        let mut b = [0u8; 1];
        self.read_reg(bus, reg, &mut b)?;
        Ok(b[0])
    }

    fn write_reg(&mut self, bus: &mut dyn I2cBus, reg: u8, value: u8) -> Result<(), SensorError> {
        bus.write(self.address, &[reg, value])
    }

    fn init(&mut self, bus: &mut dyn I2cBus) -> Result<Calibration, SensorError> {
        let id = self.read_byte(bus, regs::ID)?;
        if id != CHIP_ID {
            return Err(SensorError::invalid(
                "BME680",
                format!("unexpected chip id 0x{:02x}", id),
            ));
        }
        self.write_reg(bus, regs::RESET, SOFT_RESET)?;
        if !self.poll_delay.is_zero() {
            thread::sleep(self.poll_delay);
        }

        let mut blocks = [0u8; CALIB_0_LEN + CALIB_1_LEN];
        self.read_reg(bus, regs::CALIB_0, &mut blocks[..CALIB_0_LEN])?;
        self.read_reg(bus, regs::CALIB_1, &mut blocks[CALIB_0_LEN..])?;
        let mut calibration = Calibration::from_blocks(&blocks);
        calibration.res_heat_val = self.read_byte(bus, regs::RES_HEAT_VAL)? as i8;
        calibration.res_heat_range = (self.read_byte(bus, regs::RES_HEAT_RANGE)? & 0x30) >> 4;
        calibration.range_sw_err = (self.read_byte(bus, regs::RANGE_SW_ERR)? as i8) >> 4;

        self.write_reg(bus, regs::CTRL_HUM, OSRS_H)?;
        self.write_reg(bus, regs::CONFIG, FILTER << 2)?;
        self.write_reg(
            bus,
            regs::RES_HEAT_0,
            calibration.heater_resistance(HEATER_TEMP_C, AMBIENT_C),
        )?;
        self.write_reg(bus, regs::GAS_WAIT_0, heater_duration(HEATER_MS))?;
        self.write_reg(bus, regs::CTRL_GAS_1, RUN_GAS)?;

        Ok(calibration)
    }

    pub fn measure(&mut self, bus: &mut dyn I2cBus) -> Result<EnvReading, SensorError> {
        let calibration = match self.calibration.take() {
            Some(calibration) => calibration,
            None => self.init(bus)?,
        };
        let reading = self.forced_cycle(bus, &calibration);
        self.calibration = Some(calibration);
        reading
    }

    fn forced_cycle(&mut self, bus: &mut dyn I2cBus, cal: &Calibration) -> Result<EnvReading, SensorError> {
        self.write_reg(bus, regs::CTRL_MEAS, (OSRS_T << 5) | (OSRS_P << 2) | MODE_FORCED)?;
        if !self.cycle_delay.is_zero() {
            thread::sleep(self.cycle_delay);
        }

        let mut attempts = 10;
        while self.read_byte(bus, regs::EAS_STATUS_0)? & 0x80 == 0 {
            attempts -= 1;
            if attempts == 0 {
                return Err(SensorError::Unavailable { sensor: "BME680" });
            }
            thread::sleep(self.poll_delay);
        }

        let mut raw = [0u8; RAW_DATA_LEN];
        self.read_reg(bus, regs::PRESS_MSB, &mut raw)?;

        let press_adc =
            (u32::from(raw[0]) << 12) | (u32::from(raw[1]) << 4) | (u32::from(raw[2]) >> 4);
        let temp_adc =
            (u32::from(raw[3]) << 12) | (u32::from(raw[4]) << 4) | (u32::from(raw[5]) >> 4);
        let hum_adc = u16::from_be_bytes([raw[6], raw[7]]);
        let gas_adc = (u16::from(raw[11]) << 2) | (u16::from(raw[12]) >> 6);
        let gas_range = raw[12] & 0x0f;
        let gas_valid = raw[12] & 0x20 != 0;
        let heat_stable = raw[12] & 0x10 != 0;

        let (temperature_c, t_fine) = cal.temperature(temp_adc);
        Ok(EnvReading {
            gas_ohms: (gas_valid && heat_stable).then(|| cal.gas_resistance(gas_adc, gas_range)),
            humidity_pct: cal.humidity(hum_adc, temperature_c),
            pressure_hpa: cal.pressure(press_adc, t_fine),
            temperature_c,
        })
    }
}

impl Sensor for Bme680 {
    fn read(&mut self, bus: &mut dyn I2cBus) -> Result<Vec<f64>, SensorError> {
        let env = self.measure(bus)?;
        Ok(vec![
            env.gas_ohms.unwrap_or(f64::NAN),
            env.humidity_pct,
            env.pressure_hpa,
            env.temperature_c,
        ])
    }

    fn name(&self) -> &'static str {
        "BME680"
    }
}
