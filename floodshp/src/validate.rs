//! Filtrage des enregistrements par emprise géographique

use crate::types::FloodRecord;

/// Emprise géographique en degrés (bornes incluses)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    /// Emprise approximative de la Grèce
    pub const GREECE: BoundingBox = BoundingBox {
        min_lat: 34.0,
        max_lat: 42.0,
        min_lon: 19.0,
        max_lon: 30.0,
    };

    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        self.min_lat <= lat && lat <= self.max_lat && self.min_lon <= lon && lon <= self.max_lon
    }
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::GREECE
    }
}

/// Accepte un enregistrement projeté situé dans l'emprise
///
/// Un enregistrement sans latitude/longitude est toujours rejeté.
pub fn accept(record: &FloodRecord, bounds: &BoundingBox) -> bool {
    match (record.latitude, record.longitude) {
        (Some(lat), Some(lon)) => bounds.contains(lat, lon),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn projected(lat: Option<f64>, lon: Option<f64>) -> FloodRecord {
        FloodRecord {
            id: 1,
            attributes: HashMap::new(),
            x: Some(476000.0),
            y: Some(4205000.0),
            latitude: lat,
            longitude: lon,
        }
    }

    #[test]
    fn test_inside_greece() {
        assert!(accept(&projected(Some(38.0), Some(23.7)), &BoundingBox::GREECE));
    }

    #[test]
    fn test_outside_latitude() {
        assert!(!accept(&projected(Some(50.0), Some(23.7)), &BoundingBox::GREECE));
        assert!(!accept(&projected(Some(0.0), Some(24.0)), &BoundingBox::GREECE));
    }

    #[test]
    fn test_outside_longitude() {
        assert!(!accept(&projected(Some(38.0), Some(18.3)), &BoundingBox::GREECE));
    }

    #[test]
    fn test_bounds_are_inclusive() {
        let bounds = BoundingBox::GREECE;
        assert!(accept(&projected(Some(34.0), Some(19.0)), &bounds));
        assert!(accept(&projected(Some(42.0), Some(30.0)), &bounds));
    }

    #[test]
    fn test_missing_coordinates_rejected() {
        assert!(!accept(&projected(None, None), &BoundingBox::GREECE));
        assert!(!accept(&projected(Some(38.0), None), &BoundingBox::GREECE));
        assert!(!accept(&projected(Some(f64::NAN), Some(23.7)), &BoundingBox::GREECE));
    }
}
