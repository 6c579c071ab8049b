//! # floods-pg
//!
//! Import des inondations historiques de Grèce (shapefile ponctuel en
//! grille EPSG:2100) vers PostGIS.
//!
//! ## Features
//!
//! - Import dans PostgreSQL/PostGIS via COPY + staging, sans doublons
//! - Skip des imports inchangés (checksum blake3)
//! - Export GeoJSON standalone
//! - Transfert par lots vers une base distante
//!
//! ## Usage CLI
//!
//! ```bash
//! # Import vers PostGIS
//! floods-pg --path ./data/Floods_GR
//!
//! # Export GeoJSON (sans base de données)
//! floods-pg to-geojson --path ./data/Floods_GR.shp --output floods.geojson
//!
//! # Transfert vers la base distante (variables REMOTE_PG*)
//! floods-pg upload --batch-size 100
//! ```

pub mod config;
pub mod export;
pub mod report;

pub use config::Config;
pub use export::pool::{create_pool, DatabaseConfig};
pub use report::{ImportReport, ImportStatus};
