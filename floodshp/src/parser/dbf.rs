//! Parser pour les tables attributaires DBF (dBASE III)
//!
//! Structure du fichier :
//! ```text
//! [32 octets]      En-tête (nombre d'enregistrements @4, taille en-tête @8, taille enregistrement @10)
//! [32 octets × n]  Descripteurs de champs, terminés par 0x0D
//! [L octets × N]   Enregistrements à partir de l'offset déclaré (1er octet = drapeau de suppression)
//! ```

use std::borrow::Cow;
use std::collections::HashMap;

use byteorder::{ByteOrder, LittleEndian};
use encoding_rs::Encoding;
use tracing::{debug, trace};

use crate::types::{AttributeRecord, DbfHeader, FieldDescriptor, FieldType, FieldValue};
use crate::FloodError;

const HEADER_LEN: usize = 32;
const DESCRIPTOR_LEN: usize = 32;
const DESCRIPTOR_TERMINATOR: u8 = 0x0D;

/// Table attributaire décodée
#[derive(Debug, Clone)]
pub struct AttributeTable {
    pub header: DbfHeader,
    pub fields: Vec<FieldDescriptor>,
    pub records: Vec<AttributeRecord>,
}

/// Parse une table DBF complète
///
/// Un fichier tronqué n'est pas une erreur : la lecture s'arrête au dernier
/// enregistrement complet.
pub fn parse(
    data: &[u8],
    encoding: &'static Encoding,
    numeric_as_float: bool,
) -> Result<AttributeTable, FloodError> {
    let header = parse_header(data)?;
    let fields = parse_descriptors(data, encoding);

    debug!(
        version = header.version,
        last_update = %header.last_update_iso(),
        records = header.record_count,
        header_length = header.header_length,
        record_length = header.record_length,
        fields = fields.len(),
        "DBF header"
    );

    let records = parse_records(data, &header, &fields, encoding, numeric_as_float);

    Ok(AttributeTable {
        header,
        fields,
        records,
    })
}

/// Lit l'en-tête fixe de 32 octets
pub fn parse_header(data: &[u8]) -> Result<DbfHeader, FloodError> {
    if data.len() < HEADER_LEN {
        return Err(FloodError::invalid_header(
            "DBF",
            format!("expected {} bytes, got {}", HEADER_LEN, data.len()),
        ));
    }

    Ok(DbfHeader {
        version: data[0],
        last_update: (data[1], data[2], data[3]),
        record_count: LittleEndian::read_u32(&data[4..8]),
        header_length: LittleEndian::read_u16(&data[8..10]),
        record_length: LittleEndian::read_u16(&data[10..12]),
    })
}

/// Lit les descripteurs de champs à partir de l'offset 32
pub fn parse_descriptors(data: &[u8], encoding: &'static Encoding) -> Vec<FieldDescriptor> {
    data[HEADER_LEN.min(data.len())..]
        .chunks_exact(DESCRIPTOR_LEN)
        .take_while(|desc| desc[0] != DESCRIPTOR_TERMINATOR)
        .map(|desc| FieldDescriptor {
            name: decode_text(trim_trailing(&desc[..11], b"\0"), encoding).into_owned(),
            field_type: FieldType::from_byte(desc[11]),
            length: desc[16],
        })
        .collect()
}

fn parse_records(
    data: &[u8],
    header: &DbfHeader,
    fields: &[FieldDescriptor],
    encoding: &'static Encoding,
    numeric_as_float: bool,
) -> Vec<AttributeRecord> {
    let start = header.header_length as usize;
    let record_length = header.record_length as usize;
    // Longueur nulle : aucune donnée à lire, quel que soit le nombre déclaré
    if record_length == 0 {
        return Vec::new();
    }
    let mut records = Vec::with_capacity((header.record_count as usize).min(data.len()));

    for i in 0..header.record_count as usize {
        let begin = start + i * record_length;
        let Some(raw) = data.get(begin..begin + record_length) else {
            trace!(read = i, declared = header.record_count, "DBF truncated");
            break;
        };

        // Le drapeau de suppression est ignoré : les lignes supprimées sont lues comme les autres
        let row = raw.get(1..).unwrap_or(&[]);

        let mut values = HashMap::with_capacity(fields.len());
        let mut pos = 0;
        for field in fields {
            let len = field.length as usize;
            let slice = &row[pos.min(row.len())..(pos + len).min(row.len())];
            pos += len;

            values.insert(
                field.name.clone(),
                decode_field(slice, field.field_type, encoding, numeric_as_float),
            );
        }

        records.push(AttributeRecord {
            sequence_index: (i + 1) as u32,
            fields: values,
        });
    }

    records
}

/// Décode la valeur d'un champ selon son type
pub fn decode_field(
    bytes: &[u8],
    field_type: FieldType,
    encoding: &'static Encoding,
    numeric_as_float: bool,
) -> FieldValue {
    match field_type {
        FieldType::Character => {
            FieldValue::Text(decode_text(trim_trailing(bytes, b"\0 "), encoding).into_owned())
        }
        FieldType::Numeric => FieldValue::Number(parse_number(bytes)),
        FieldType::Other(b'N') if numeric_as_float => FieldValue::Number(parse_number(bytes)),
        FieldType::Other(_) => FieldValue::Text(decode_text(bytes, encoding).into_owned()),
    }
}

/// Parse un flottant DBF (cadré à droite, complété par des espaces ou des zéros)
///
/// Contenu vide ou illisible → `None`
pub fn parse_number(bytes: &[u8]) -> Option<f64> {
    let trimmed = trim_trailing(bytes, b"\0 ");
    let text = String::from_utf8_lossy(trimmed);
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    fast_float::parse(text).ok()
}

/// Décodage permissif : les séquences invalides sont remplacées
fn decode_text<'a>(bytes: &'a [u8], encoding: &'static Encoding) -> Cow<'a, str> {
    if encoding == encoding_rs::UTF_8 {
        if let Ok(s) = simdutf8::basic::from_utf8(bytes) {
            return Cow::Borrowed(s);
        }
    }
    let (decoded, _) = encoding.decode_without_bom_handling(bytes);
    decoded
}

fn trim_trailing<'a>(bytes: &'a [u8], set: &[u8]) -> &'a [u8] {
    let end = bytes
        .iter()
        .rposition(|b| !set.contains(b))
        .map_or(0, |p| p + 1);
    &bytes[..end]
}
