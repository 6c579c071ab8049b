//! Types d'erreurs pour le crate floodshp

use thiserror::Error;

/// Erreurs pouvant survenir lors de la lecture d'un shapefile
///
/// `Io`, `MissingFile`, `InvalidHeader` et `UnsupportedEncoding` sont
/// fatales. Les autres variantes sont collectées dans
/// [`crate::ParseResult::warnings`].
#[derive(Debug, Error)]
pub enum FloodError {
    /// Erreur d'I/O lors de la lecture d'un fichier
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Fichier compagnon manquant (.shp ou .dbf)
    #[error("Missing required file: {0}")]
    MissingFile(String),

    /// En-tête trop court ou incohérent
    #[error("Invalid header in {file}: {reason}")]
    InvalidHeader { file: String, reason: String },

    /// Lecture des géométries interrompue (les enregistrements déjà lus restent valides)
    #[error("Geometry stream stopped at record {index}: {reason}")]
    GeometryFault { index: usize, reason: String },

    /// Nombre d'enregistrements différent entre le DBF et le SHP
    #[error("Record count mismatch: {attributes} attribute rows, {geometries} geometries")]
    LengthMismatch { attributes: usize, geometries: usize },

    /// Encodage non supporté
    #[error("Unsupported encoding: {0}")]
    UnsupportedEncoding(String),
}

impl FloodError {
    /// Crée une erreur d'en-tête avec contexte
    pub fn invalid_header(file: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidHeader {
            file: file.into(),
            reason: reason.into(),
        }
    }

    /// Crée une erreur de flux géométrique
    pub fn geometry_fault(index: usize, reason: impl Into<String>) -> Self {
        Self::GeometryFault {
            index,
            reason: reason.into(),
        }
    }

    /// Indique si l'erreur interrompt tout le traitement
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Io(_) | Self::MissingFile(_) | Self::InvalidHeader { .. } | Self::UnsupportedEncoding(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(FloodError::MissingFile("x.dbf".into()).is_fatal());
        assert!(FloodError::invalid_header("x.dbf", "too short").is_fatal());
        assert!(FloodError::UnsupportedEncoding("klingon".into()).is_fatal());
        assert!(!FloodError::geometry_fault(3, "truncated").is_fatal());
        assert!(!FloodError::LengthMismatch {
            attributes: 5,
            geometries: 3
        }
        .is_fatal());
    }

    #[test]
    fn test_display() {
        let err = FloodError::geometry_fault(7, "truncated point");
        assert_eq!(
            err.to_string(),
            "Geometry stream stopped at record 7: truncated point"
        );
    }
}
