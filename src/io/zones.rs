//! Zone catalogue loader
//!
//! The catalogue is a JSON array of zones whose rings use GeoJSON
//! coordinate order, `[lon, lat]`:
//!
//! ```json
//! [{"id": 1, "name": "Depot", "kind": "parking",
//!   "polygon": [[103.85, 1.30], [103.86, 1.30], [103.86, 1.31]]}]
//! ```

use crate::types::{EngineError, GeoPoint, Polygon, Zone, ZoneId, ZoneKind};
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct ZoneJson {
    id: ZoneId,
    name: String,
    kind: ZoneKind,
    polygon: Vec<[f64; 2]>,
}

impl ZoneJson {
    fn into_zone(self) -> Result<Zone, String> {
        let mut vertices: Vec<GeoPoint> = self
            .polygon
            .iter()
            .map(|[lon, lat]| GeoPoint::new(*lat, *lon))
            .collect();

        if let Some(bad) = vertices.iter().find(|p| !p.is_valid()) {
            return Err(format!(
                "zone {} has an invalid vertex ({}, {})",
                self.id, bad.lat, bad.lon
            ));
        }
        // GeoJSON rings repeat the first vertex at the end
        if vertices.len() > 1 && vertices.first() == vertices.last() {
            vertices.pop();
        }

        Ok(Zone {
            id: self.id,
            name: self.name,
            kind: self.kind,
            polygon: Polygon::new(vertices),
        })
    }
}

/// Parse a zone catalogue from JSON text
///
/// # Errors
///
/// `ParseError` for malformed JSON, invalid vertices or duplicate zone ids.
pub fn parse_zones(json: &str) -> Result<Vec<Zone>, EngineError> {
    let raw: Vec<ZoneJson> = serde_json::from_str(json)?;
    let mut seen = HashSet::new();
    let mut zones = Vec::with_capacity(raw.len());

    for entry in raw {
        if !seen.insert(entry.id) {
            return Err(EngineError::ParseError {
                line: None,
                message: format!("duplicate zone id {}", entry.id),
            });
        }
        let zone = entry
            .into_zone()
            .map_err(|message| EngineError::ParseError { line: None, message })?;
        zones.push(zone);
    }

    Ok(zones)
}

/// Read and parse a zone catalogue file
pub fn load_zones(path: &Path) -> Result<Vec<Zone>, EngineError> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
            return Err(EngineError::FileNotFound {
                path: path.display().to_string(),
            })
        }
        Err(error) => return Err(error.into()),
    };
    parse_zones(&contents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const CATALOGUE: &str = r#"[
        {"id": 1, "name": "Depot", "kind": "parking",
         "polygon": [[103.85, 1.30], [103.86, 1.30], [103.86, 1.31], [103.85, 1.31], [103.85, 1.30]]},
        {"id": 2, "name": "Fountain", "kind": "no_park",
         "polygon": [[103.855, 1.305], [103.856, 1.305], [103.856, 1.306]]}
    ]"#;

    #[test]
    fn test_parse_zones_swaps_to_lat_lon_and_drops_closing_vertex() {
        let zones = parse_zones(CATALOGUE).unwrap();

        assert_eq!(zones.len(), 2);
        assert_eq!(zones[0].kind, ZoneKind::Parking);
        assert_eq!(zones[0].polygon.vertices.len(), 4);
        assert_eq!(zones[0].polygon.vertices[0], GeoPoint::new(1.30, 103.85));
        assert_eq!(zones[1].kind, ZoneKind::NoPark);
    }

    #[test]
    fn test_parse_zones_rejects_duplicates() {
        let json = r#"[
            {"id": 1, "name": "a", "kind": "parking", "polygon": [[0,0],[0,1],[1,1]]},
            {"id": 1, "name": "b", "kind": "parking", "polygon": [[0,0],[0,1],[1,1]]}
        ]"#;

        assert!(matches!(parse_zones(json), Err(EngineError::ParseError { .. })));
    }

    #[test]
    fn test_parse_zones_rejects_bad_vertex() {
        let json = r#"[{"id": 1, "name": "a", "kind": "parking", "polygon": [[0,0],[0,95],[1,1]]}]"#;

        let err = parse_zones(json).unwrap_err();

        assert!(err.to_string().contains("invalid vertex"));
    }

    #[test]
    fn test_parse_zones_rejects_unknown_kind() {
        let json = r#"[{"id": 1, "name": "a", "kind": "garage", "polygon": []}]"#;
        assert!(matches!(parse_zones(json), Err(EngineError::ParseError { .. })));
    }

    #[test]
    fn test_load_zones_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(CATALOGUE.as_bytes()).unwrap();

        let zones = load_zones(file.path()).unwrap();

        assert_eq!(zones.len(), 2);
    }

    #[test]
    fn test_load_zones_missing_file() {
        assert!(matches!(
            load_zones(Path::new("missing-zones.json")),
            Err(EngineError::FileNotFound { .. })
        ));
    }
}
