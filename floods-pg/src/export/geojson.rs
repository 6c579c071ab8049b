//! Export vers GeoJSON avec geozero (streaming)

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use geozero::geojson::GeoJsonWriter;
use geozero::GeozeroGeometry;

use floodshp::FloodRecord;

use crate::config::Config;

/// Exporte des enregistrements en FeatureCollection (EPSG:4326)
///
/// Retourne le nombre de features écrites ; les enregistrements sans
/// coordonnées géographiques sont ignorés.
pub fn export_to_geojson(records: &[FloodRecord], config: &Config, output_path: &Path) -> Result<usize> {
    let file = File::create(output_path)
        .context(format!("Failed to create file: {}", output_path.display()))?;
    let mut writer = BufWriter::new(file);

    let written = write_collection(&mut writer, records, config)?;
    writer.flush()?;

    Ok(written)
}

fn write_collection<W: Write>(writer: &mut W, records: &[FloodRecord], config: &Config) -> Result<usize> {
    write!(
        writer,
        r#"{{"type":"FeatureCollection","crs":{{"type":"name","properties":{{"name":"urn:ogc:def:crs:EPSG::4326"}}}},"features":["#
    )?;

    let mut written = 0;
    for record in records {
        if record.point().is_none() {
            continue;
        }
        if written > 0 {
            write!(writer, ",")?;
        }
        write_feature(writer, record, config)?;
        written += 1;
    }

    write!(writer, "]}}")?;
    Ok(written)
}

/// Écrit une feature en GeoJSON
fn write_feature<W: Write>(writer: &mut W, record: &FloodRecord, config: &Config) -> Result<()> {
    let Some(point) = record.point() else {
        return Ok(());
    };

    write!(writer, r#"{{"type":"Feature","id":{},"#, record.id)?;

    write!(writer, r#""geometry":"#)?;
    let mut geom_buf = Vec::new();
    let mut geom_writer = GeoJsonWriter::new(&mut geom_buf);
    geo::Geometry::Point(point).process_geom(&mut geom_writer)?;
    writer.write_all(&geom_buf)?;

    write!(writer, r#","properties":{{"id":{}"#, record.id)?;
    for field in &config.fields {
        write!(
            writer,
            r#","{}":"{}""#,
            escape_json(&field.target),
            escape_json(&record.text(&field.source))
        )?;
    }
    for (key, value) in [
        ("x_original", record.x),
        ("y_original", record.y),
        ("latitude", record.latitude),
        ("longitude", record.longitude),
    ] {
        match value.filter(|v| v.is_finite()) {
            Some(v) => write!(writer, r#","{}":{}"#, key, v)?,
            None => write!(writer, r#","{}":null"#, key)?,
        }
    }
    write!(writer, "}}}}")?;

    Ok(())
}

/// Échappe une chaîne pour JSON
fn escape_json(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => result.push_str("\\\""),
            '\\' => result.push_str("\\\\"),
            '\n' => result.push_str("\\n"),
            '\r' => result.push_str("\\r"),
            '\t' => result.push_str("\\t"),
            c if c.is_control() => {
                result.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => result.push(c),
        }
    }
    result
}
