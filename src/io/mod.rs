//! I/O module
//!
//! Handles the simulation's input files and the ride table output.
//!
//! # Components
//!
//! - `csv_format` - CSV format handling (record conversion, ride table serialization)
//! - `sync_reader` - Script iterator and fleet seed loader
//! - `async_reader` - Asynchronous script reader with batch interface
//! - `zones` - Zone catalogue JSON loader

pub mod async_reader;
pub mod csv_format;
pub mod sync_reader;
pub mod zones;

pub use async_reader::AsyncReader;
pub use csv_format::{convert_fleet_record, convert_script_record, write_rides_csv, TripRow};
pub use sync_reader::{read_fleet, SyncReader};
pub use zones::{load_zones, parse_zones};
