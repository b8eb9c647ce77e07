use std::fs::File;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use csv::ReaderBuilder;
use time::Date;

use crate::error::Error;
use crate::utils::file_date;

/// `<data_dir>/<host><MMDDYYYY>.csv`
pub fn csv_path(data_dir: &Path, host: &str, date: Date) -> PathBuf {
    data_dir.join(format!("{}{}.csv", host, file_date(date)))
}

/// Header row of an existing file, or `None` if the file is missing or empty
pub fn read_header(path: &Path) -> Result<Option<Vec<String>>, Error> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(Error::file(path, e)),
    };

    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(file);

    match reader.records().next() {
        None => Ok(None),
        Some(Ok(record)) => Ok(Some(record.iter().map(str::to_string).collect())),
        Some(Err(e)) => Err(Error::csv(path, e)),
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use time::macros::date;

    use super::*;

    #[test]
    fn path_is_host_then_date() {
        let path = csv_path(Path::new("data"), "pa-box-3", date!(2024-11-02));

        assert_eq!(path, PathBuf::from("data/pa-box-311022024.csv"));
    }

    #[test]
    fn missing_file_has_no_header() {
        let path = std::env::temp_dir().join("pa-diag-definitely-missing.csv");

        assert_eq!(read_header(&path).unwrap(), None);
    }

    #[test]
    fn quoted_header_fields_are_unescaped() {
        let dir = std::env::temp_dir().join(format!("pa-diag-header-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("quoted.csv");
        fs::write(&path, "Time,\"odd, label\",\"say \"\"hi\"\"\"\n01:02:2024 00:00:00,1.0,NA\n").unwrap();

        let header = read_header(&path).unwrap().unwrap();

        assert_eq!(header, ["Time", "odd, label", "say \"hi\""]);
        fs::write(&path, "").unwrap();
        assert_eq!(read_header(&path).unwrap(), None);
        fs::remove_dir_all(dir).unwrap();
    }
}
