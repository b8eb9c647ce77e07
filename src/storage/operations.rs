/// Append averaged records to the daily CSV file
use std::fs::{self, OpenOptions};
use std::path::Path;

use csv::WriterBuilder;
use log::warn;

use crate::error::Error;
use crate::models::{Average, AveragedRecord};
use crate::storage::file::read_header;
use crate::utils::format_datetime;

pub const TIME_COLUMN: &str = "Time";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// File was new; header and first row written
    Created,
    /// Row appended under an existing header
    Appended,
}

/// Header row and data row of a record, from one pass over its entries
///
/// Both lists come out of the same traversal so their orders cannot drift.
pub fn record_fields(record: &AveragedRecord) -> (Vec<String>, Vec<String>) {
    let mut header = vec![TIME_COLUMN.to_string()];
    let mut row = vec![format_datetime(&record.started)];
    for entry in &record.entries {
        header.push(entry.column.label());
        row.push(entry.average.to_string());
    }
    (header, row)
}

/// Values of `record` laid out under a header written by an earlier run
///
/// Columns the header does not know are dropped; header columns the record
/// lacks are written as `NA`.
fn remap_row(record: &AveragedRecord, existing: &[String]) -> Vec<String> {
    let (header, row) = record_fields(record);

    for label in header.iter().filter(|l| !existing.contains(l)) {
        warn!("Column \"{}\" is not in the existing header; dropping it", label);
    }

    existing
        .iter()
        .map(|label| {
            header
                .iter()
                .position(|l| l == label)
                .map(|i| row[i].clone())
                .unwrap_or_else(|| Average::Unavailable.to_string())
        })
        .collect()
}

/// Store one averaged record
///
/// A new (or empty) file gets the header first. An existing file keeps
/// its header and gets a row in that header's column order.
///
/// # Returns
/// Whether the file was created or appended to
pub fn append_record(record: &AveragedRecord, path: &Path) -> Result<AppendOutcome, Error> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).map_err(|e| Error::file(dir, e))?;
    }

    let existing = read_header(path)?;

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| Error::file(path, e))?;
    let mut writer = WriterBuilder::new().has_headers(false).from_writer(file);

    let (header, row) = record_fields(record);
    let outcome = match existing {
        None => {
            writer.write_record(&header).map_err(|e| Error::csv(path, e))?;
            writer.write_record(&row).map_err(|e| Error::csv(path, e))?;
            AppendOutcome::Created
        }
        Some(existing) if existing == header => {
            writer.write_record(&row).map_err(|e| Error::csv(path, e))?;
            AppendOutcome::Appended
        }
        Some(existing) => {
            warn!(
                "{} was started with a different sensor set; writing under its header",
                path.display()
            );
            writer
                .write_record(remap_row(record, &existing))
                .map_err(|e| Error::csv(path, e))?;
            AppendOutcome::Appended
        }
    };

    writer.flush().map_err(|e| Error::file(path, e))?;
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::path::PathBuf;

    use time::macros::datetime;
    use time::OffsetDateTime;

    use super::*;
    use crate::models::{Column, RecordEntry};
    use crate::averaging::reduce;
    use crate::models::{Schema, WindowBuffers};
    use crate::registry::{self, KNOWN_ROLES};

    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "pa-diag-{}-{}",
            name,
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    fn record(started: OffsetDateTime, entries: &[(&'static str, &'static str, Average)]) -> AveragedRecord {
        AveragedRecord {
            started,
            entries: entries
                .iter()
                .map(|&(role, parameter, average)| RecordEntry {
                    column: Column { role, parameter },
                    average,
                    samples: 1,
                })
                .collect(),
        }
    }

    fn lines(path: &Path) -> Vec<String> {
        fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn header_and_row_share_key_order() {
        let r = record(
            datetime!(2024-03-05 10:00:00 UTC),
            &[
                ("SCD", "CO2", Average::Unavailable),
                ("Fans", "Power", Average::Mean(1.25)),
                ("MCP", "Temp", Average::Mean(21.0)),
            ],
        );

        let (header, row) = record_fields(&r);
        let consumed: Vec<String> = r.entries.iter().map(|e| e.column.label()).collect();

        assert_eq!(header[1..], consumed[..]);
        assert_eq!(header.len(), row.len());
        assert_eq!(row, ["03:05:2024 10:00:00", "NA", "1.25", "21.0"]);
    }

    fn records(path: &Path) -> Vec<Vec<String>> {
        csv::ReaderBuilder::new()
            .has_headers(false)
            .from_path(path)
            .unwrap()
            .records()
            .map(|r| r.unwrap().iter().map(str::to_string).collect())
            .collect()
    }

    #[test]
    fn header_and_row_agree_for_every_sensor_subset() {
        let mut addresses: Vec<u16> = KNOWN_ROLES.iter().map(|r| r.address).collect();
        addresses.dedup();

        for subset in 0..(1u32 << addresses.len()) {
            let present: BTreeSet<u16> = addresses
                .iter()
                .enumerate()
                .filter(|(i, _)| subset & (1 << i) != 0)
                .map(|(_, &a)| a)
                .collect();
            let schema = Schema::from_roles(&registry::build(&present));
            let mut window = WindowBuffers::new(schema.clone(), datetime!(2024-03-05 10:00:00 UTC));
            // every third column stays empty so NA cells are mixed in
            for column in (0..schema.len()).filter(|c| c % 3 != 0) {
                window.push(column, column as f64 + 0.5);
            }

            let record = reduce(&window);
            let (header, row) = record_fields(&record);

            assert_eq!(header.len(), schema.len() + 1, "subset {:#b}", subset);
            assert_eq!(row.len(), header.len(), "subset {:#b}", subset);
            assert_eq!(header[0], TIME_COLUMN);
            for (i, column) in schema.columns().iter().enumerate() {
                assert_eq!(header[i + 1], column.label());
                let expected = if i % 3 == 0 {
                    "NA".to_string()
                } else {
                    format!("{:?}", i as f64 + 0.5)
                };
                assert_eq!(row[i + 1], expected, "{} in subset {:#b}", column.label(), subset);
            }
        }
    }

    #[test]
    fn labels_with_commas_round_trip() {
        let dir = scratch("quoting");
        let path = dir.join("box.csv");
        let r = record(
            datetime!(2024-03-05 10:00:00 UTC),
            &[("odd, role", "say \"hi\"", Average::Mean(1.5))],
        );

        append_record(&r, &path).unwrap();
        append_record(&r, &path).unwrap();

        assert_eq!(lines(&path)[0], "Time,\"odd, role say \"\"hi\"\"\"");
        assert_eq!(records(&path).len(), 3);
        assert_eq!(lines(&path).len(), 3);
        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn n_appends_give_one_header_and_n_rows() {
        let dir = scratch("n-appends");
        let path = dir.join("host03052024.csv");
        let start = datetime!(2024-03-05 10:00:00 UTC);

        let outcomes: Vec<AppendOutcome> = (0..4)
            .map(|i| {
                let r = record(
                    start + time::Duration::minutes(10 * i),
                    &[("temp", "C", Average::Mean(20.0 + i as f64)), ("PM", "PM2.5 ST", Average::Unavailable)],
                );
                append_record(&r, &path).unwrap()
            })
            .collect();

        assert_eq!(outcomes[0], AppendOutcome::Created);
        assert!(outcomes[1..].iter().all(|o| *o == AppendOutcome::Appended));
        let lines = lines(&path);
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[0], "Time,temp C,PM PM2.5 ST");
        assert!(records(&path).iter().all(|r| r.len() == 3));
        assert_eq!(lines[4], "03:05:2024 10:30:00,23.0,NA");
        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn two_runs_same_day_share_one_header() {
        let dir = scratch("two-runs");
        let path = dir.join("nested").join("box03052024.csv");

        let first = record(datetime!(2024-03-05 08:00:00 UTC), &[("temp", "C", Average::Mean(20.5))]);
        let second = record(datetime!(2024-03-05 08:10:00 UTC), &[("temp", "C", Average::Mean(21.5))]);
        append_record(&first, &path).unwrap();
        append_record(&second, &path).unwrap();

        assert_eq!(
            lines(&path),
            [
                "Time,temp C",
                "03:05:2024 08:00:00,20.5",
                "03:05:2024 08:10:00,21.5"
            ]
        );
        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn changed_sensor_set_follows_existing_header() {
        let dir = scratch("remap");
        let path = dir.join("box03052024.csv");
        let t = datetime!(2024-03-05 08:00:00 UTC);

        append_record(
            &record(t, &[("MCP", "Temp", Average::Mean(20.0)), ("Fans", "Power", Average::Mean(1.0))]),
            &path,
        )
        .unwrap();
        // next run lost the fan monitor and gained a CO2 sensor, in a different order
        append_record(
            &record(t, &[("SCD", "CO2", Average::Mean(415.0)), ("MCP", "Temp", Average::Mean(22.0))]),
            &path,
        )
        .unwrap();

        let lines = lines(&path);
        assert_eq!(lines[0], "Time,MCP Temp,Fans Power");
        assert_eq!(lines[2], "03:05:2024 08:00:00,22.0,NA");
        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn unwritable_path_is_file_error() {
        let dir = scratch("blocked");
        fs::create_dir_all(&dir).unwrap();
        let blocker = dir.join("not-a-dir");
        fs::write(&blocker, "x").unwrap();

        let r = record(datetime!(2024-03-05 08:00:00 UTC), &[("temp", "C", Average::Mean(1.0))]);
        let err = append_record(&r, &blocker.join("out.csv")).unwrap_err();

        assert!(matches!(err, Error::FileIo { .. }));
        fs::remove_dir_all(dir).unwrap();
    }
}
