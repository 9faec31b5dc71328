//! Destinations for completed search results.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use log::info;

use crate::error::Result;
use crate::types::MpptRecord;

/// Header written to an empty CSV file
pub const CSV_HEADER: &str = "timestamp,voltage_v,current_a,power_w";

/// Accepts one record per completed search
pub trait ResultSink {
    fn append_result(&mut self, record: &MpptRecord) -> Result<()>;
}

/// Keeps records in memory
impl ResultSink for Vec<MpptRecord> {
    fn append_result(&mut self, record: &MpptRecord) -> Result<()> {
        self.push(*record);
        Ok(())
    }
}

/// Appends records to a CSV file, writing the header when the file is empty
#[derive(Debug, Clone)]
pub struct CsvResultLog {
    path: PathBuf,
}

impl CsvResultLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        CsvResultLog { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// One CSV line, without the trailing newline
pub fn format_record(record: &MpptRecord) -> String {
    format!(
        "{},{:.3},{:.3},{:.3}",
        record.timestamp.format("%Y-%m-%d %H:%M:%S"),
        record.voltage,
        record.current,
        record.power
    )
}

impl ResultSink for CsvResultLog {
    fn append_result(&mut self, record: &MpptRecord) -> Result<()> {
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        if file.metadata()?.len() == 0 {
            writeln!(file, "{}", CSV_HEADER)?;
        }
        writeln!(file, "{}", format_record(record))?;
        info!("Result appended to {}", self.path.display());
        Ok(())
    }
}
