/// Utility functions for timestamps, host identity and window summaries
use std::fs;

use log::{info, warn};
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{Date, OffsetDateTime};

use crate::models::{Average, AveragedRecord};

/// Layout of the `Time` column: fixed width, month first
const RECORD_TIME: &[BorrowedFormatItem<'static>] =
    format_description!("[month]:[day]:[year] [hour]:[minute]:[second]");

/// Date part of the daily CSV file name
const FILE_DATE: &[BorrowedFormatItem<'static>] = format_description!("[month][day][year]");

/// Local wall-clock time, falling back to UTC when the offset is unknown
pub fn now_local() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
}

/// Format a timestamp as MM:DD:YYYY HH:MM:SS
///
/// Falls back to default string representation if formatting fails.
pub fn format_datetime(dt: &OffsetDateTime) -> String {
    dt.format(RECORD_TIME).unwrap_or_else(|_| dt.to_string())
}

/// MMDDYYYY stamp for file names
pub fn file_date(date: Date) -> String {
    date.format(FILE_DATE).unwrap_or_else(|_| date.to_string())
}

/// Kernel host name, as the CSV files are keyed by it
pub fn host_name() -> String {
    let from_kernel = fs::read_to_string("/proc/sys/kernel/hostname")
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    from_kernel
        .or_else(|| std::env::var("HOSTNAME").ok().filter(|s| !s.is_empty()))
        .unwrap_or_else(|| {
            warn!("Could not determine host name, using \"unknown\"");
            "unknown".to_string()
        })
}

/// Log the averaged values of one window
pub fn log_summary(record: &AveragedRecord) {
    info!("Summary for window starting {}:", format_datetime(&record.started));
    for entry in &record.entries {
        match entry.average {
            Average::Mean(value) => info!(
                "  Device: {:<10} Data: {:<10} Value: {:<10.2} ({} samples)",
                entry.column.role, entry.column.parameter, value, entry.samples
            ),
            Average::Unavailable => info!(
                "  Device: {:<10} Data: {:<10} Value: unavailable",
                entry.column.role, entry.column.parameter
            ),
        }
    }
    if record.entries.is_empty() {
        warn!("No sensors recorded during this window!");
    }
}
