//! Parser pour le flux géométrique SHP (points uniquement)
//!
//! ```text
//! [100 octets]  En-tête du fichier (ignoré)
//! Pour chaque enregistrement :
//!   [8 octets]  En-tête : numéro (BE u32), longueur du contenu en mots de 16 bits (BE u32)
//!   [4 octets]  Type de forme (LE u32)
//!   [16 octets] x, y (LE f64) si type = 1, sinon contenu sauté sans décodage
//! ```

use std::io::{Cursor, Read};

use byteorder::{BigEndian, ByteOrder, LittleEndian, ReadBytesExt};
use geo::Coord;
use tracing::{trace, warn};

use crate::types::GeometryRecord;
use crate::FloodError;

const FILE_HEADER_LEN: u64 = 100;
const RECORD_HEADER_LEN: usize = 8;

/// Type de forme "Point" dans la spécification ESRI
pub const SHAPE_POINT: u32 = 1;

/// Flux géométrique décodé
#[derive(Debug, Default)]
pub struct GeometryStream {
    /// Enregistrements lus, dans l'ordre du fichier
    pub records: Vec<GeometryRecord>,

    /// Cause de l'arrêt anticipé, le cas échéant
    pub fault: Option<FloodError>,
}

/// Parse le flux géométrique
///
/// Ne retourne jamais d'erreur : une anomalie interrompt la lecture et
/// les enregistrements déjà produits sont conservés.
pub fn parse(data: &[u8]) -> GeometryStream {
    let mut cursor = Cursor::new(data);
    cursor.set_position(FILE_HEADER_LEN);

    let mut stream = GeometryStream::default();

    loop {
        let remaining = data.len() as u64 - cursor.position().min(data.len() as u64);
        if remaining < RECORD_HEADER_LEN as u64 {
            break;
        }

        let index = stream.records.len();
        match read_record(&mut cursor, data.len() as u64) {
            Ok(record) => stream.records.push(record),
            Err(reason) => {
                warn!(record = index, %reason, "Geometry stream stopped early");
                stream.fault = Some(FloodError::geometry_fault(index, reason));
                break;
            }
        }
    }

    trace!(records = stream.records.len(), "SHP stream decoded");
    stream
}

/// Lit un enregistrement à la position courante
fn read_record(cursor: &mut Cursor<&[u8]>, len: u64) -> Result<GeometryRecord, String> {
    let mut header = [0u8; RECORD_HEADER_LEN];
    cursor
        .read_exact(&mut header)
        .map_err(|e| format!("record header: {e}"))?;
    let content_words = BigEndian::read_u32(&header[4..8]);

    let shape_type = cursor
        .read_u32::<LittleEndian>()
        .map_err(|e| format!("shape type: {e}"))?;

    if shape_type == SHAPE_POINT {
        // Toujours 16 octets, quelle que soit la longueur déclarée
        let x = cursor
            .read_f64::<LittleEndian>()
            .map_err(|e| format!("point x: {e}"))?;
        let y = cursor
            .read_f64::<LittleEndian>()
            .map_err(|e| format!("point y: {e}"))?;
        return Ok(GeometryRecord {
            shape_type,
            coordinate: Some(Coord { x, y }),
        });
    }

    // La longueur déclarée inclut les 4 octets du type de forme
    let skip = (content_words as u64 * 2)
        .checked_sub(4)
        .ok_or_else(|| format!("content length {content_words} shorter than shape type"))?;
    let target = cursor.position() + skip;
    if target > len {
        return Err(format!("seek to {target} past end of stream ({len} bytes)"));
    }
    cursor.set_position(target);

    Ok(GeometryRecord {
        shape_type,
        coordinate: None,
    })
}
