pub mod file;
pub mod operations;

pub use file::csv_path;
pub use operations::{append_record, AppendOutcome};
