//! Synchronous CSV readers
//!
//! Provides a streaming iterator over ride script events and an eager loader
//! for the fleet seed file. Delegates CSV format concerns to the csv_format
//! module.
//!
//! # Iterator Interface
//!
//! SyncReader implements the Iterator trait, yielding Result<ScriptEvent, String>
//! for each CSV row:
//!
//! ```no_run
//! use bikeshare_engine::io::sync_reader::SyncReader;
//! use std::path::Path;
//!
//! let reader = SyncReader::new(Path::new("script.csv")).unwrap();
//! for result in reader {
//!     match result {
//!         Ok(event) => println!("Replaying: {:?}", event),
//!         Err(e) => eprintln!("Error: {}", e),
//!     }
//! }
//! ```
//!
//! # Error Handling
//!
//! - Fatal errors (file not found, I/O errors) are returned from `new()`
//! - Individual script rows that fail to parse are yielded as Err variants
//! - Fleet rows are all-or-nothing: one bad row fails the whole load
//! - Line numbers are included in error messages for debugging

use crate::io::csv_format::{convert_fleet_record, convert_script_record, FleetCsvRecord, ScriptCsvRecord};
use crate::types::{Bike, EngineError, ScriptEvent};
use csv::{ReaderBuilder, Trim};
use std::fs::File;
use std::path::Path;

fn open(path: &Path) -> Result<csv::Reader<File>, EngineError> {
    let file = File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => EngineError::FileNotFound {
            path: path.display().to_string(),
        },
        _ => EngineError::from(e),
    })?;

    Ok(ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .buffer_capacity(8 * 1024)
        .from_reader(file))
}

/// Streaming reader over a ride script
#[derive(Debug)]
pub struct SyncReader {
    reader: csv::Reader<File>,
    line_num: usize,
}

impl SyncReader {
    /// Open a ride script for streaming iteration
    ///
    /// # Returns
    ///
    /// * `Ok(SyncReader)` if file opened successfully
    /// * `Err(String)` if file could not be opened
    pub fn new(path: &Path) -> Result<Self, String> {
        let reader = open(path).map_err(|e| format!("Failed to open file '{}': {}", path.display(), e))?;

        Ok(Self {
            reader,
            line_num: 0,
        })
    }
}

impl Iterator for SyncReader {
    type Item = Result<ScriptEvent, String>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut deserializer = self.reader.deserialize::<ScriptCsvRecord>();

        let row = deserializer.next()?;
        self.line_num += 1;
        // +1 for the header row
        let line = self.line_num + 1;
        Some(match row {
            Ok(record) => convert_script_record(record).map_err(|e| format!("Line {}: {}", line, e)),
            Err(e) => Err(format!("Line {}: CSV parse error: {}", line, e)),
        })
    }
}

/// Load every bike from a fleet seed file
///
/// # Errors
///
/// * `FileNotFound` - the path does not exist
/// * `ParseError` - a row is malformed; carries the line number
pub fn read_fleet(path: &Path) -> Result<Vec<Bike>, EngineError> {
    let mut reader = open(path)?;
    let mut bikes = Vec::new();

    for (index, row) in reader.deserialize::<FleetCsvRecord>().enumerate() {
        let record = row?;
        let bike = convert_fleet_record(record).map_err(|message| EngineError::ParseError {
            line: Some(index as u64 + 2),
            message,
        })?;
        bikes.push(bike);
    }

    Ok(bikes)
}
