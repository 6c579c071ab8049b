//! Parsers binaires des fichiers du shapefile

pub mod dbf;
pub mod shp;
