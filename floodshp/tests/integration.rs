//! Tests d'intégration sur des shapefiles synthétiques écrits sur disque

use std::path::PathBuf;

use byteorder::{BigEndian, LittleEndian, WriteBytesExt};
use floodshp::{parse, FloodError, ReadOptions, ShapefilePaths};

const FIELDS: &[(&str, u8, u8)] = &[("Location_N", b'C', 16), ("Deaths_Tol", b'F', 8)];

fn workdir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("floodshp-{}-{}", name, std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn dbf_bytes(rows: &[(&str, &str)], declared: Option<u32>) -> Vec<u8> {
    let header_length = 32 + FIELDS.len() * 32 + 1;
    let record_length = 1 + FIELDS.iter().map(|f| f.2 as usize).sum::<usize>();

    let mut data = vec![0x03, 124, 6, 1];
    data.write_u32::<LittleEndian>(declared.unwrap_or(rows.len() as u32))
        .unwrap();
    data.write_u16::<LittleEndian>(header_length as u16).unwrap();
    data.write_u16::<LittleEndian>(record_length as u16).unwrap();
    data.resize(32, 0);

    for (name, kind, len) in FIELDS {
        let mut desc = [0u8; 32];
        desc[..name.len()].copy_from_slice(name.as_bytes());
        desc[11] = *kind;
        desc[16] = *len;
        data.extend_from_slice(&desc);
    }
    data.push(0x0D);

    for (location, deaths) in rows {
        data.push(b' ');
        data.extend_from_slice(format!("{:<16}", location).as_bytes());
        data.extend_from_slice(format!("{:>8}", deaths).as_bytes());
    }
    data.push(0x1A);
    data
}

fn shp_bytes(points: &[(f64, f64)]) -> Vec<u8> {
    let mut data = Vec::new();
    data.write_u32::<BigEndian>(9994).unwrap();
    data.resize(100, 0);

    for (i, (x, y)) in points.iter().enumerate() {
        data.write_u32::<BigEndian>(i as u32 + 1).unwrap();
        data.write_u32::<BigEndian>(10).unwrap();
        data.write_u32::<LittleEndian>(1).unwrap();
        data.write_f64::<LittleEndian>(*x).unwrap();
        data.write_f64::<LittleEndian>(*y).unwrap();
    }
    data
}

fn write_pair(name: &str, dbf: &[u8], shp: &[u8]) -> ShapefilePaths {
    let paths = ShapefilePaths::from_base(workdir(name).join("Floods_GR"));
    std::fs::write(&paths.dbf, dbf).unwrap();
    std::fs::write(&paths.shp, shp).unwrap();
    paths
}

#[test]
fn test_end_to_end_keeps_points_inside_greece() {
    let paths = write_pair(
        "e2e",
        &dbf_bytes(&[("Athens", "3"), ("Null Island", "")], None),
        &shp_bytes(&[(476000.0, 4205000.0), (500000.0, 0.0)]),
    );

    let result = parse(&paths, &ReadOptions::default()).unwrap();

    assert_eq!(result.attribute_records, 2);
    assert_eq!(result.geometry_records, 2);
    assert_eq!(result.records.len(), 1);

    let athens = &result.records[0];
    assert_eq!(athens.id, 1);
    assert_eq!(athens.text("Location_N"), "Athens");
    assert_eq!(
        athens.attributes.get("Deaths_Tol").and_then(|v| v.as_number()),
        Some(3.0)
    );
    assert!((athens.latitude.unwrap() - 37.9923367043281).abs() < 1e-9);
    assert!((athens.longitude.unwrap() - 23.726671855988883).abs() < 1e-9);

    // La fausse origine porte une ordonnée nulle : considérée sans coordonnée
    assert_eq!(result.without_coordinates, 1);
    assert!(result.warnings.is_empty());
}

#[test]
fn test_missing_dbf() {
    let dir = workdir("missing");
    let paths = ShapefilePaths::from_base(dir.join("absent"));
    std::fs::write(&paths.shp, shp_bytes(&[(476000.0, 4205000.0)])).unwrap();

    match parse(&paths, &ReadOptions::default()) {
        Err(FloodError::MissingFile(path)) => assert!(path.ends_with("absent.dbf")),
        other => panic!("expected MissingFile, got {:?}", other.map(|r| r.records.len())),
    }
}

#[test]
fn test_attributes_stop_at_declared_count() {
    // Trois lignes physiques, deux déclarées : la troisième ne doit pas être lue
    let paths = write_pair(
        "bounded",
        &dbf_bytes(&[("Patra", "1"), ("Volos", "2"), ("Ghost", "9")], Some(2)),
        &shp_bytes(&[
            (300000.0, 4230000.0),
            (400000.0, 4360000.0),
            (450000.0, 4400000.0),
        ]),
    );

    let result = parse(&paths, &ReadOptions::default()).unwrap();

    assert_eq!(result.attribute_records, 2);
    assert_eq!(result.geometry_records, 3);
    assert_eq!(result.records.len(), 2);
    assert!(result.records.iter().all(|r| r.text("Location_N") != "Ghost"));
    assert!(matches!(
        result.warnings.as_slice(),
        [FloodError::LengthMismatch {
            attributes: 2,
            geometries: 3
        }]
    ));
}

#[test]
fn test_shp_extension_is_accepted() {
    let paths = write_pair(
        "ext",
        &dbf_bytes(&[("Larisa", "0")], None),
        &shp_bytes(&[(400000.0, 4390000.0)]),
    );

    let result = parse(
        &ShapefilePaths::from_base(&paths.shp),
        &ReadOptions::default(),
    )
    .unwrap();
    assert_eq!(result.records.len(), 1);
    assert_eq!(result.header.last_update_iso(), "2024-06-01");
}
