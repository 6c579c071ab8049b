//! Jointure positionnelle des attributs et des géométries

use tracing::warn;

use crate::types::{AttributeRecord, FloodRecord, GeometryRecord};

/// Assemble les enregistrements par position (le n-ième attribut avec la n-ième géométrie)
///
/// Le résultat a la longueur de la plus courte des deux séquences ; le
/// surplus est ignoré sans erreur. Aucune vérification de cohérence n'est
/// faite entre les deux fichiers.
pub fn assemble(attributes: Vec<AttributeRecord>, geometries: &[GeometryRecord]) -> Vec<FloodRecord> {
    if attributes.len() != geometries.len() {
        warn!(
            attributes = attributes.len(),
            geometries = geometries.len(),
            "Attribute and geometry counts differ, extra records dropped"
        );
    }

    attributes
        .into_iter()
        .zip(geometries)
        .map(|(attr, geom)| FloodRecord {
            id: attr.sequence_index,
            attributes: attr.fields,
            x: geom.coordinate.map(|c| c.x),
            y: geom.coordinate.map(|c| c.y),
            latitude: None,
            longitude: None,
        })
        .collect()
}
