//! # floodshp
//!
//! Lecteur de shapefiles ponctuels (SHP + DBF) avec reprojection de la
//! grille grecque (EPSG:2100) vers WGS84.
//!
//! ## Features
//!
//! - Décodage de la table attributaire DBF (champs `C` et `F`)
//! - Décodage du flux SHP (points uniquement, autres formes ignorées)
//! - Mercator transverse inverse en Rust pur, sans PROJ
//! - Filtrage par emprise géographique
//!
//! ## Usage
//!
//! ```rust,ignore
//! use floodshp::{parse, ReadOptions, ShapefilePaths};
//!
//! let paths = ShapefilePaths::from_base("data/Floods_GR");
//! let result = parse(&paths, &ReadOptions::default())?;
//! println!("{} records accepted", result.records.len());
//!
//! for record in &result.records {
//!     println!("{}: {:?}, {:?}", record.id, record.latitude, record.longitude);
//! }
//! ```

pub mod assemble;
pub mod error;
pub mod parser;
pub mod projection;
pub mod types;
pub mod validate;

pub use error::FloodError;
pub use projection::{Ellipsoid, Geographic, TransverseMercator};
pub use types::{
    AttributeRecord, DbfHeader, FieldDescriptor, FieldType, FieldValue, FloodRecord,
    GeometryRecord, ParseResult, ReadOptions,
};
pub use validate::BoundingBox;

use std::path::{Path, PathBuf};

use tracing::{debug, info};

/// Chemins de la paire de fichiers d'un shapefile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapefilePaths {
    pub shp: PathBuf,
    pub dbf: PathBuf,
}

impl ShapefilePaths {
    /// Dérive `.shp` et `.dbf` depuis un nom de base commun
    ///
    /// Accepte `Floods_GR`, `Floods_GR.shp` ou `Floods_GR.dbf`.
    pub fn from_base(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let base = match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("shp") || ext.eq_ignore_ascii_case("dbf") => {
                path.with_extension("")
            }
            _ => path.to_path_buf(),
        };

        Self {
            shp: append_extension(&base, "shp"),
            dbf: append_extension(&base, "dbf"),
        }
    }

    /// Nom de base du jeu de données (sans extension)
    pub fn dataset_name(&self) -> String {
        self.shp
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "unknown".to_string())
    }
}

fn append_extension(base: &Path, ext: &str) -> PathBuf {
    let mut name = base.as_os_str().to_owned();
    name.push(".");
    name.push(ext);
    PathBuf::from(name)
}

/// Lit une paire SHP/DBF et retourne les enregistrements géoréférencés.
///
/// # Arguments
///
/// * `paths` - Chemins du `.shp` et du `.dbf`
/// * `options` - Encodage, projection source et emprise d'acceptation
///
/// # Errors
///
/// Retourne `FloodError` si un fichier est absent ou illisible, ou si
/// l'en-tête DBF est trop court. Les anomalies de contenu ne sont pas des
/// erreurs : elles sont listées dans `ParseResult::warnings`.
pub fn parse(paths: &ShapefilePaths, options: &ReadOptions) -> Result<ParseResult, FloodError> {
    let dbf = read_file(&paths.dbf)?;
    let shp = read_file(&paths.shp)?;

    debug!(
        dbf = %paths.dbf.display(),
        dbf_bytes = dbf.len(),
        shp = %paths.shp.display(),
        shp_bytes = shp.len(),
        "Shapefile loaded"
    );

    parse_bytes(&dbf, &shp, options)
}

/// Variante de [`parse`] sur des contenus déjà en mémoire
pub fn parse_bytes(dbf: &[u8], shp: &[u8], options: &ReadOptions) -> Result<ParseResult, FloodError> {
    // 1. Table attributaire et flux géométrique, indépendamment
    let table = parser::dbf::parse(dbf, options.encoding, options.numeric_as_float)?;
    let stream = parser::shp::parse(shp);

    let attribute_records = table.records.len();
    let geometry_records = stream.records.len();

    let mut warnings = Vec::new();
    if let Some(fault) = stream.fault {
        warnings.push(fault);
    }
    if attribute_records != geometry_records {
        warnings.push(FloodError::LengthMismatch {
            attributes: attribute_records,
            geometries: geometry_records,
        });
    }

    // 2. Jointure positionnelle
    let assembled = assemble::assemble(table.records, &stream.records);

    // 3. Projection puis filtrage
    let mut records = Vec::with_capacity(assembled.len());
    let mut without_coordinates = 0;
    let mut out_of_bounds = 0;

    for mut record in assembled {
        if !options.projection.project_record(&mut record) {
            without_coordinates += 1;
            continue;
        }
        if !validate::accept(&record, &options.bounds) {
            out_of_bounds += 1;
            continue;
        }
        records.push(record);
    }

    info!(
        attributes = attribute_records,
        geometries = geometry_records,
        accepted = records.len(),
        without_coordinates,
        out_of_bounds,
        "Shapefile processed"
    );

    Ok(ParseResult {
        records,
        fields: table.fields,
        header: table.header,
        attribute_records,
        geometry_records,
        without_coordinates,
        out_of_bounds,
        warnings,
    })
}

fn read_file(path: &Path) -> Result<Vec<u8>, FloodError> {
    std::fs::read(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => FloodError::MissingFile(path.display().to_string()),
        _ => FloodError::Io(e),
    })
}
