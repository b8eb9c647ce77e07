use std::ops::Deref;
use std::path::PathBuf;
use std::time::Duration;

use clap::builder::BoolishValueParser;
use clap::{ArgAction, Parser};

use crate::i2c::mux::CHANNEL_COUNT;
use crate::sampler::SamplingPlan;

// Clock-stretching sensors (PM, CO2) need at least this long between reads
pub const MIN_WAIT_SECS: u64 = 2;

/// How many averaging windows to run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowLimit {
    /// Run until the process is killed
    Forever,
    Count(u64),
}

impl WindowLimit {
    pub fn allows(self, completed: u64) -> bool {
        match self {
            WindowLimit::Forever => true,
            WindowLimit::Count(limit) => completed < limit,
        }
    }
}

/// Mux channels to enable, in the order given and without duplicates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSet(Vec<u8>);

impl Deref for ChannelSet {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

/// Diagnostic capture for the PurpleAir box
///
/// Every option can also come from the environment or a `.env` file;
/// flags win over both.
#[derive(Parser, Debug, Clone, PartialEq)]
#[command(name = "purpleair-diagnostic", version)]
pub struct CaptureConfig {
    /// Seconds between reads, at least 2
    #[arg(short = 'w', long = "wait-time", env = "PA_WAIT_TIME", default_value = "2", value_parser = parse_wait)]
    pub wait_time: Duration,

    /// Reads averaged into one CSV row
    #[arg(
        short = 'n',
        long = "n-points",
        env = "PA_N_POINTS",
        default_value_t = 300,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub points: u32,

    /// Averaging windows to run, -1 runs forever
    #[arg(
        short = 't',
        long = "n-windows",
        env = "PA_N_WINDOWS",
        default_value = "-1",
        allow_negative_numbers = true,
        value_parser = parse_windows
    )]
    pub windows: WindowLimit,

    /// Mux channels to enable, e.g. 0,3,4,7 or all
    #[arg(short = 'c', long = "channels", env = "PA_CHANNELS", default_value = "all", value_parser = parse_channels)]
    pub channels: ChannelSet,

    /// Log to <data-dir>/<host>.log instead of stderr
    #[arg(
        short = 'l',
        long = "log-to-file",
        env = "PA_LOG_TO_FILE",
        action = ArgAction::SetTrue,
        value_parser = BoolishValueParser::new()
    )]
    pub log_to_file: bool,

    /// Output directory
    #[arg(short = 'd', long = "data-dir", env = "PA_DATA_DIR", default_value = "data")]
    pub data_dir: PathBuf,

    /// I2C character device
    #[arg(short = 'b', long = "bus", env = "PA_I2C_BUS", default_value = "/dev/i2c-1")]
    pub bus_path: PathBuf,

    /// Host id used in file names [default: hostname]
    #[arg(long = "host", env = "PA_HOST_ID")]
    pub host_id: Option<String>,

    /// Log every raw reading
    #[arg(
        short = 'p',
        long = "print",
        env = "PA_PRINT_READINGS",
        action = ArgAction::SetTrue,
        value_parser = BoolishValueParser::new()
    )]
    pub print_readings: bool,
}

impl CaptureConfig {
    /// Load `.env`, then parse flags over the environment
    ///
    /// Exits with usage on `--help` or invalid values.
    pub fn load() -> Self {
        // Load environment variables
        dotenv::dotenv().ok();

        CaptureConfig::parse()
    }

    pub fn sampling_plan(&self) -> SamplingPlan {
        SamplingPlan {
            tick_interval: self.wait_time,
            points: self.points,
            print_readings: self.print_readings,
        }
    }
}

fn parse_wait(value: &str) -> Result<Duration, String> {
    let secs: u64 = value
        .trim()
        .parse()
        .map_err(|_| format!("invalid wait time '{}'", value))?;
    if secs < MIN_WAIT_SECS {
        return Err(format!(
            "wait time must be at least {} seconds, got {}",
            MIN_WAIT_SECS, secs
        ));
    }
    Ok(Duration::from_secs(secs))
}

fn parse_windows(value: &str) -> Result<WindowLimit, String> {
    match value.trim().parse::<i64>() {
        Ok(-1) => Ok(WindowLimit::Forever),
        Ok(n) if n > 0 => Ok(WindowLimit::Count(n as u64)),
        _ => Err(format!("must be positive or -1, got '{}'", value)),
    }
}

/// "0,3,4,7", "[0, 3]" or "all"
fn parse_channels(value: &str) -> Result<ChannelSet, String> {
    let value = value.trim().trim_start_matches('[').trim_end_matches(']');
    if value.eq_ignore_ascii_case("all") {
        return Ok(ChannelSet((0..CHANNEL_COUNT).collect()));
    }

    let mut channels = Vec::new();
    for part in value.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let channel: u8 = part
            .parse()
            .map_err(|_| format!("invalid channel '{}'", part))?;
        if channel >= CHANNEL_COUNT {
            return Err(format!(
                "channel {} out of range 0-{}",
                channel,
                CHANNEL_COUNT - 1
            ));
        }
        if !channels.contains(&channel) {
            channels.push(channel);
        }
    }

    if channels.is_empty() {
        return Err("channel list is empty".into());
    }
    Ok(ChannelSet(channels))
}

#[cfg(test)]
mod tests {
    use std::env;

    use clap::error::ErrorKind;

    use super::*;

    fn parse(args: &[&str]) -> Result<CaptureConfig, clap::Error> {
        CaptureConfig::try_parse_from(std::iter::once("purpleair-diagnostic").chain(args.iter().copied()))
    }

    // All PA_* variables are touched in this one test so parallel tests
    // never see each other's environment.
    #[test]
    fn environment_then_flags() {
        let vars = [
            ("PA_WAIT_TIME", "5"),
            ("PA_N_POINTS", "60"),
            ("PA_N_WINDOWS", "3"),
            ("PA_CHANNELS", "[0, 3, 4, 7]"),
            ("PA_LOG_TO_FILE", "yes"),
            ("PA_HOST_ID", "rig-2"),
        ];

        let defaults = parse(&[]).unwrap();
        assert_eq!(defaults.wait_time, Duration::from_secs(2));
        assert_eq!(defaults.points, 300);
        assert_eq!(defaults.windows, WindowLimit::Forever);
        assert_eq!(&*defaults.channels, &[0, 1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(defaults.data_dir, PathBuf::from("data"));
        assert!(!defaults.log_to_file);

        for (key, value) in vars {
            env::set_var(key, value);
        }
        let from_env = parse(&[]);
        let overridden = parse(&["-n", "10", "--wait-time=4", "-t", "-1", "--host", "bench"]);
        env::set_var("PA_LOG_TO_FILE", "0");
        let flag_off = parse(&[]);
        for (key, _) in vars {
            env::remove_var(key);
        }

        let config = from_env.unwrap();
        assert_eq!(config.wait_time, Duration::from_secs(5));
        assert_eq!(config.points, 60);
        assert_eq!(config.windows, WindowLimit::Count(3));
        assert_eq!(&*config.channels, &[0, 3, 4, 7]);
        assert!(config.log_to_file);
        assert_eq!(config.host_id.as_deref(), Some("rig-2"));

        let config = overridden.unwrap();
        assert_eq!(config.points, 10);
        assert_eq!(config.wait_time, Duration::from_secs(4));
        assert_eq!(config.windows, WindowLimit::Forever);
        assert_eq!(&*config.channels, &[0, 3, 4, 7]);
        assert_eq!(config.host_id.as_deref(), Some("bench"));

        assert!(!flag_off.unwrap().log_to_file);
    }

    #[test]
    fn wait_time_below_two_seconds_is_rejected() {
        assert!(parse(&["-w", "1"]).is_err());
        assert!(parse(&["--wait-time", "0"]).is_err());
        assert!(parse(&["-w", "2"]).is_ok());
    }

    #[test]
    fn invalid_counts_and_channels_are_rejected() {
        assert!(parse(&["-n", "0"]).is_err());
        assert!(parse(&["-t", "0"]).is_err());
        assert!(parse(&["-t", "-2"]).is_err());
        assert!(parse(&["-c", "1,9"]).is_err());
        assert!(parse(&["-c", ""]).is_err());
    }

    #[test]
    fn channel_list_forms() {
        let config = parse(&["-c", "5,6,5", "-l", "--print"]).unwrap();

        assert_eq!(&*config.channels, &[5, 6]);
        assert!(config.log_to_file);
        assert!(config.print_readings);
        assert_eq!(&*parse(&["-c", "ALL"]).unwrap().channels, &[0, 1, 2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn help_and_unknown_flags() {
        assert_eq!(parse(&["--help"]).unwrap_err().kind(), ErrorKind::DisplayHelp);
        assert_eq!(parse(&["--bogus"]).unwrap_err().kind(), ErrorKind::UnknownArgument);
        assert!(parse(&["-n"]).is_err());
    }

    #[test]
    fn window_limit_counts_completed_windows() {
        assert!(WindowLimit::Forever.allows(u64::MAX));
        assert!(WindowLimit::Count(2).allows(1));
        assert!(!WindowLimit::Count(2).allows(2));
    }

    #[test]
    fn sampling_plan_carries_cadence() {
        let config = parse(&["-w", "3", "-n", "20"]).unwrap();

        let plan = config.sampling_plan();

        assert_eq!(plan.tick_interval, Duration::from_secs(3));
        assert_eq!(plan.points, 20);
    }
}
