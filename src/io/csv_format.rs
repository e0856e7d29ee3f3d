//! CSV format handling for fleet seeds, ride scripts and the ride table
//!
//! This module centralizes all CSV format concerns, providing:
//! - Record structures for deserialization
//! - Conversion from CSV records to domain types
//! - Ride table serialization
//!
//! All functions are pure (no I/O) for easy testing.

use crate::types::{
    Bike, BikeId, BikeStatus, GeoPoint, Ride, RiderId, ScriptAction, ScriptEvent, TelemetrySample,
};
use serde::Deserialize;
use std::io::Write;

/// Fleet seed row: `id,qr_public_id,status,battery_pct,lat,lon`
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct FleetCsvRecord {
    pub id: BikeId,
    pub qr_public_id: String,
    pub status: Option<String>,
    pub battery_pct: Option<u8>,
    pub lat: f64,
    pub lon: f64,
}

/// Convert a fleet row into a locked bike at version 0
///
/// A missing status means in service; a missing battery reading means full.
pub fn convert_fleet_record(record: FleetCsvRecord) -> Result<Bike, String> {
    if record.qr_public_id.is_empty() {
        return Err(format!("Bike {} has an empty scan code", record.id));
    }

    let status = match record.status.as_deref().map(str::to_lowercase).as_deref() {
        None | Some("") | Some("ok") => BikeStatus::Ok,
        Some("maintenance") => BikeStatus::Maintenance,
        Some(other) => return Err(format!("Invalid status '{}' for bike {}", other, record.id)),
    };

    let position = GeoPoint::new(record.lat, record.lon);
    if !position.is_valid() {
        return Err(format!(
            "Bike {} has invalid position ({}, {})",
            record.id, record.lat, record.lon
        ));
    }

    let mut bike = Bike::new(record.id, record.qr_public_id, position);
    bike.status = status;
    bike.battery_pct = record.battery_pct.unwrap_or(100).min(100);
    Ok(bike)
}

/// Ride script row: `trip,op,key,rider,qr,lat,lon,speed,ts`
///
/// Only the columns an operation needs must be filled in.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ScriptCsvRecord {
    pub trip: String,
    pub op: String,
    pub key: Option<String>,
    pub rider: Option<RiderId>,
    pub qr: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub speed: Option<f64>,
    pub ts: Option<f64>,
}

fn required<T>(value: Option<T>, field: &str, record: &ScriptCsvRecord) -> Result<T, String> {
    value.ok_or_else(|| {
        format!(
            "{} event for trip '{}' requires '{}'",
            record.op, record.trip, field
        )
    })
}

fn required_text(value: &Option<String>, field: &str, record: &ScriptCsvRecord) -> Result<String, String> {
    match value.as_deref() {
        Some(text) if !text.is_empty() => Ok(text.to_string()),
        _ => Err(format!(
            "{} event for trip '{}' requires '{}'",
            record.op, record.trip, field
        )),
    }
}

/// Convert a script row into a script event
///
/// # Returns
///
/// Result containing either:
/// - Ok(ScriptEvent) - Successfully converted event
/// - Err(String) - Error message describing the conversion failure
pub fn convert_script_record(record: ScriptCsvRecord) -> Result<ScriptEvent, String> {
    if record.trip.is_empty() {
        return Err(format!("{} event has no trip label", record.op));
    }

    let action = match record.op.to_lowercase().as_str() {
        "unlock" => ScriptAction::Unlock {
            key: required_text(&record.key, "key", &record)?,
            rider: required(record.rider, "rider", &record)?,
            qr_public_id: required_text(&record.qr, "qr", &record)?,
        },
        "telemetry" => ScriptAction::Telemetry(TelemetrySample::new(
            required(record.lat, "lat", &record)?,
            required(record.lon, "lon", &record)?,
            record.speed.unwrap_or(0.0),
            required(record.ts, "ts", &record)?,
        )),
        "lock" => ScriptAction::Lock {
            key: required_text(&record.key, "key", &record)?,
            position: GeoPoint::new(
                required(record.lat, "lat", &record)?,
                required(record.lon, "lon", &record)?,
            ),
        },
        "capture" => ScriptAction::Capture,
        "refund" => ScriptAction::Refund,
        _ => {
            return Err(format!(
                "Invalid operation: '{}' for trip '{}'",
                record.op, record.trip
            ))
        }
    };

    Ok(ScriptEvent {
        trip: record.trip,
        action,
    })
}

/// One line of the ride table: a trip label and the ride it produced
#[derive(Debug, Clone, PartialEq)]
pub struct TripRow {
    pub trip: String,
    pub ride: Ride,
}

/// Write the ride table to CSV
///
/// Columns: trip, ride, bike, rider, state, meters, seconds, energy_kcal,
/// fare_cents, pricing_version. Rows are sorted by trip label for
/// deterministic output.
pub fn write_rides_csv(rows: &[TripRow], output: &mut dyn Write) -> Result<(), String> {
    use csv::Writer;

    let mut writer = Writer::from_writer(output);

    writer
        .write_record([
            "trip",
            "ride",
            "bike",
            "rider",
            "state",
            "meters",
            "seconds",
            "energy_kcal",
            "fare_cents",
            "pricing_version",
        ])
        .map_err(|e| format!("Failed to write CSV header: {}", e))?;

    let mut sorted_rows = rows.to_vec();
    sorted_rows.sort_by(|a, b| a.trip.cmp(&b.trip));

    for row in sorted_rows {
        let ride = &row.ride;
        writer
            .write_record(&[
                row.trip.clone(),
                ride.id.to_string(),
                ride.bike.to_string(),
                ride.rider.to_string(),
                ride.state.as_str().to_string(),
                format!("{:.1}", ride.metrics.meters),
                format!("{:.1}", ride.metrics.seconds),
                format!("{:.2}", ride.metrics.energy_kcal),
                ride.metrics.fare_cents.to_string(),
                ride.metrics.pricing_version.to_string(),
            ])
            .map_err(|e| format!("Failed to write ride record: {}", e))?;
    }

    writer
        .flush()
        .map_err(|e| format!("Failed to flush output: {}", e))?;

    Ok(())
}
