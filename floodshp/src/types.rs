//! Types de données pour le crate floodshp

use std::collections::HashMap;

use encoding_rs::Encoding;
use geo::{Coord, Point};

use crate::projection::TransverseMercator;
use crate::validate::BoundingBox;
use crate::FloodError;

/// Type d'un champ DBF
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    /// `C` : texte
    Character,
    /// `F` : flottant décimal
    Numeric,
    /// Tout autre type déclaré (N, D, L, M...), conservé brut
    Other(u8),
}

impl FieldType {
    /// Interprète l'octet de type d'un descripteur de champ
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            b'C' => Self::Character,
            b'F' => Self::Numeric,
            other => Self::Other(other),
        }
    }

    /// Caractère déclaré dans le fichier
    pub fn as_char(self) -> char {
        match self {
            Self::Character => 'C',
            Self::Numeric => 'F',
            Self::Other(b) => b as char,
        }
    }
}

/// Descripteur d'un champ de la table attributaire
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    /// Nom du champ (11 octets max dans le fichier)
    pub name: String,

    /// Type déclaré
    pub field_type: FieldType,

    /// Longueur en octets dans chaque enregistrement
    pub length: u8,
}

/// Valeur décodée d'un champ
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    /// Absent si le contenu est vide ou illisible
    Number(Option<f64>),
}

impl FieldValue {
    /// Rendu texte de la valeur (chaîne vide pour un nombre absent)
    pub fn as_text(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Number(Some(n)) => n.to_string(),
            Self::Number(None) => String::new(),
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => *n,
            Self::Text(_) => None,
        }
    }
}

/// En-tête d'une table DBF
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DbfHeader {
    /// Octet de version (0x03 pour dBASE III)
    pub version: u8,

    /// Date de dernière mise à jour (année depuis 1900, mois, jour)
    pub last_update: (u8, u8, u8),

    /// Nombre d'enregistrements déclarés
    pub record_count: u32,

    /// Taille de l'en-tête en octets (offset du premier enregistrement)
    pub header_length: u16,

    /// Taille d'un enregistrement en octets (drapeau de suppression inclus)
    pub record_length: u16,
}

impl DbfHeader {
    /// Date de mise à jour au format ISO (YYYY-MM-DD)
    pub fn last_update_iso(&self) -> String {
        let (yy, mm, dd) = self.last_update;
        format!("{:04}-{:02}-{:02}", 1900 + yy as u32, mm, dd)
    }

    /// Offset de fin théorique des données
    pub fn data_end(&self) -> usize {
        self.header_length as usize + self.record_count as usize * self.record_length as usize
    }
}

/// Ligne de la table attributaire
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeRecord {
    /// Position 1-based dans le fichier, clé de jointure avec le SHP
    pub sequence_index: u32,

    /// Valeurs par nom de champ
    pub fields: HashMap<String, FieldValue>,
}

/// Entrée du flux géométrique
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeometryRecord {
    /// Type de forme déclaré (1 = point)
    pub shape_type: u32,

    /// Coordonnée planaire, présente uniquement pour les points
    pub coordinate: Option<Coord<f64>>,
}

/// Enregistrement d'inondation assemblé et géoréférencé
#[derive(Debug, Clone, PartialEq)]
pub struct FloodRecord {
    pub id: u32,

    pub attributes: HashMap<String, FieldValue>,

    /// Coordonnées dans la grille source (mètres)
    pub x: Option<f64>,
    pub y: Option<f64>,

    /// Coordonnées géographiques (degrés)
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl FloodRecord {
    /// Valeur texte d'un attribut, chaîne vide si absent
    pub fn text(&self, field: &str) -> String {
        self.attributes
            .get(field)
            .map(FieldValue::as_text)
            .unwrap_or_default()
    }

    /// Coordonnée planaire exploitable (présente, finie et non nulle)
    pub fn planar(&self) -> Option<Coord<f64>> {
        match (self.x, self.y) {
            (Some(x), Some(y)) if x.is_finite() && y.is_finite() && x != 0.0 && y != 0.0 => {
                Some(Coord { x, y })
            }
            _ => None,
        }
    }

    /// Point WGS84 (lon, lat) si la projection a abouti
    pub fn point(&self) -> Option<Point<f64>> {
        Some(Point::new(self.longitude?, self.latitude?))
    }
}

/// Options de lecture
#[derive(Debug, Clone, Copy)]
pub struct ReadOptions {
    /// Encodage des champs texte
    pub encoding: &'static Encoding,

    /// Décoder aussi les champs `N` comme des flottants
    pub numeric_as_float: bool,

    /// Projection de la grille source
    pub projection: TransverseMercator,

    /// Emprise d'acceptation en degrés
    pub bounds: BoundingBox,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            encoding: encoding_rs::UTF_8,
            numeric_as_float: false,
            projection: TransverseMercator::GREEK_GRID,
            bounds: BoundingBox::GREECE,
        }
    }
}

impl ReadOptions {
    /// Sélectionne l'encodage depuis un label (`utf-8`, `windows-1253`, `iso-8859-7`...)
    pub fn with_encoding_label(mut self, label: &str) -> Result<Self, FloodError> {
        self.encoding = Encoding::for_label(label.trim().as_bytes())
            .ok_or_else(|| FloodError::UnsupportedEncoding(label.to_string()))?;
        Ok(self)
    }
}

/// Résultat de la lecture d'une paire SHP/DBF
#[derive(Debug)]
pub struct ParseResult {
    /// Enregistrements acceptés, dans l'ordre du fichier
    pub records: Vec<FloodRecord>,

    /// Descripteurs de champs dans l'ordre du DBF
    pub fields: Vec<FieldDescriptor>,

    pub header: DbfHeader,

    /// Lignes lues dans le DBF
    pub attribute_records: usize,

    /// Entrées lues dans le SHP
    pub geometry_records: usize,

    /// Enregistrements sans coordonnée planaire exploitable
    pub without_coordinates: usize,

    /// Enregistrements projetés hors de l'emprise
    pub out_of_bounds: usize,

    /// Erreurs non fatales rencontrées
    pub warnings: Vec<FloodError>,
}

impl ParseResult {
    /// Enregistrements assemblés (jointure positionnelle)
    pub fn assembled(&self) -> usize {
        self.attribute_records.min(self.geometry_records)
    }
}
