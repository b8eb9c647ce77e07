mod averaging;
mod config;
mod error;
mod i2c;
mod models;
mod registry;
mod sampler;
mod sensors;
mod storage;
mod utils;

use std::fs::{self, OpenOptions};
use std::path::Path;
use std::process::ExitCode;

use log::{error, info, warn};

use averaging::reduce;
use config::CaptureConfig;
use error::Error;
use i2c::mux::describe_status;
use i2c::{LinuxBus, Tca9548a, MUX_ADDRESS};
use models::Schema;
use sampler::{capture_window, SystemClock};
use storage::{append_record, csv_path, AppendOutcome};
use utils::{host_name, log_summary};

/// Route log output to stderr, or to `<data_dir>/<host>.log` when asked
fn init_logging(log_file: Option<&Path>) -> Result<(), Error> {
    let mut builder = env_logger::Builder::from_default_env();
    builder
        .filter_level(log::LevelFilter::Info)
        .format_timestamp_secs();

    if let Some(path) = log_file {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(|e| Error::file(dir, e))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| Error::file(path, e))?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }

    builder.init();
    Ok(())
}

fn run(config: CaptureConfig, host: String) -> Result<(), Error> {
    info!("Starting PurpleAir diagnostic capture on {}", host);
    info!(
        "Wait time {}s, {} points per window ({}s average)",
        config.wait_time.as_secs(),
        config.points,
        config.wait_time.as_secs() * u64::from(config.points)
    );

    let mut bus = LinuxBus::open(&config.bus_path)?;
    let mut mux = Tca9548a::new(MUX_ADDRESS);

    mux.enable(&mut bus, &config.channels)?;
    match mux.status(&mut bus) {
        Ok(mask) => {
            for line in describe_status(mask) {
                info!("{}", line);
            }
        }
        Err(e) => warn!("Could not read channel status: {}", e),
    }

    let addresses = mux.scan(&mut bus);
    let roles = registry::restrict_to_channels(registry::build(&addresses), &config.channels);
    let schema = Schema::from_roles(&roles);
    if schema.is_empty() {
        warn!("No known sensors found; rows will only carry the timestamp");
    }
    let mut probes = registry::attach_drivers(&roles, &config.bus_path);

    let plan = config.sampling_plan();
    let clock = SystemClock::new();
    let mut completed: u64 = 0;

    while config.windows.allows(completed) {
        let window = capture_window(&mut bus, &mut mux, &mut probes, &schema, &plan, &clock);
        let record = reduce(&window);
        log_summary(&record);

        let path = csv_path(&config.data_dir, &host, record.started.date());
        match append_record(&record, &path) {
            Ok(AppendOutcome::Created) => info!("Created {}", path.display()),
            Ok(AppendOutcome::Appended) => info!("Appended row to {}", path.display()),
            Err(e) => error!("Failed to store window: {}", e),
        }

        completed += 1;
    }

    info!("Completed {} averaging windows", completed);
    Ok(())
}

fn main() -> ExitCode {
    let config = CaptureConfig::load();

    let host = config.host_id.clone().unwrap_or_else(host_name);
    let log_file = config
        .log_to_file
        .then(|| config.data_dir.join(format!("{}.log", host)));
    if let Err(e) = init_logging(log_file.as_deref()) {
        let _ = init_logging(None);
        error!("Failed to open log file: {}", e);
        return ExitCode::FAILURE;
    }

    match run(config, host) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Fatal error: {}", e);
            ExitCode::FAILURE
        }
    }
}
