//! Reprojection de la grille nationale vers WGS84 en Rust pur
//!
//! Projection source par défaut : Greek Grid / GGRS87 (EPSG:2100),
//! Mercator transverse sur l'ellipsoïde GRS80.
//!
//! Cible : latitude/longitude en degrés.

mod ellipsoid;
mod tm;

pub use ellipsoid::Ellipsoid;

use crate::types::FloodRecord;

/// Point en coordonnées géographiques (degrés)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Geographic {
    pub lat: f64,
    pub lon: f64,
}

impl Geographic {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// Paramètres d'une projection Mercator transverse
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransverseMercator {
    /// Faux est en mètres
    pub false_easting: f64,

    /// Faux nord en mètres
    pub false_northing: f64,

    /// Méridien central en degrés
    pub central_meridian: f64,

    /// Facteur d'échelle sur le méridien central
    pub scale_factor: f64,

    pub ellipsoid: Ellipsoid,
}

impl TransverseMercator {
    /// Greek Grid (EPSG:2100)
    pub const GREEK_GRID: TransverseMercator = TransverseMercator {
        false_easting: 500000.0,
        false_northing: 0.0,
        central_meridian: 24.0,
        scale_factor: 0.9996,
        ellipsoid: Ellipsoid::GRS80,
    };

    /// Convertit une coordonnée de grille (mètres) en latitude/longitude (degrés)
    ///
    /// Fonction totale sur les entrées finies ; le résultat n'a de sens que
    /// dans le domaine de validité de la projection.
    pub fn to_geographic(&self, x: f64, y: f64) -> Geographic {
        tm::inverse(self, x, y)
    }

    /// Projette un enregistrement assemblé
    ///
    /// Renseigne latitude/longitude si la coordonnée planaire est exploitable,
    /// retourne `false` sinon (l'enregistrement n'est pas modifié).
    pub fn project_record(&self, record: &mut FloodRecord) -> bool {
        let Some(coord) = record.planar() else {
            return false;
        };
        let geo = self.to_geographic(coord.x, coord.y);
        record.latitude = Some(geo.lat);
        record.longitude = Some(geo.lon);
        true
    }
}

impl Default for TransverseMercator {
    fn default() -> Self {
        Self::GREEK_GRID
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn record(x: Option<f64>, y: Option<f64>) -> FloodRecord {
        FloodRecord {
            id: 1,
            attributes: HashMap::new(),
            x,
            y,
            latitude: None,
            longitude: None,
        }
    }

    #[test]
    fn test_project_record() {
        let mut r = record(Some(476000.0), Some(4205000.0));
        assert!(TransverseMercator::GREEK_GRID.project_record(&mut r));
        let lat = r.latitude.unwrap();
        let lon = r.longitude.unwrap();
        // Athènes
        assert!((lat - 37.99).abs() < 0.01, "lat={}", lat);
        assert!((lon - 23.73).abs() < 0.01, "lon={}", lon);
    }

    #[test]
    fn test_project_record_without_coordinates() {
        let mut r = record(None, None);
        assert!(!TransverseMercator::GREEK_GRID.project_record(&mut r));
        assert!(r.latitude.is_none());
        assert!(r.longitude.is_none());
    }
}
