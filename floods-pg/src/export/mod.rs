//! Modules d'export (PostgreSQL, GeoJSON, base distante)

pub mod geojson;
pub mod pool;
pub mod postgres;
pub mod upload;
