//! Configuration du mapping DBF → colonnes SQL

use serde::{Deserialize, Serialize};
use std::path::Path;

use anyhow::{Context, Result};

/// Colonnes gérées par l'import, hors mapping
pub const RESERVED_COLUMNS: &[&str] = &[
    "id",
    "x_original",
    "y_original",
    "latitude",
    "longitude",
    "geometry",
    "imported_at",
];

/// Configuration principale
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Nom de la table PostgreSQL cible par défaut
    #[serde(default = "default_table")]
    pub table: String,

    /// Mapping des champs DBF vers colonnes SQL, dans l'ordre des colonnes
    pub fields: Vec<FieldMapping>,
}

/// Mapping d'un champ
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct FieldMapping {
    /// Nom du champ DBF source
    pub source: String,

    /// Nom de la colonne SQL cible
    pub target: String,

    /// Type de données (text, integer, double precision)
    #[serde(default = "default_type")]
    pub data_type: String,
}

fn default_table() -> String {
    "floods".to_string()
}

fn default_type() -> String {
    "text".to_string()
}

impl Config {
    /// Charge une configuration depuis un fichier
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .context(format!("Failed to read config file: {}", path.display()))?;

        let config: Self = serde_json::from_str(&content).context("Failed to parse config JSON")?;
        config.validate()?;
        Ok(config)
    }

    /// Charge une configuration depuis un preset embarqué
    pub fn from_preset(preset: &str) -> Result<Self> {
        match preset {
            "floods-gr" => Self::load_embedded(include_str!("presets/floods-gr.json")),
            _ => anyhow::bail!("Unknown preset: {}. Use: floods-gr", preset),
        }
    }

    /// Preset embarqué ou chemin vers un fichier JSON
    pub fn resolve(spec: &str) -> Result<Self> {
        match spec {
            "floods-gr" => Self::from_preset(spec),
            _ => Self::load(Path::new(spec)),
        }
    }

    fn load_embedded(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse embedded config")
    }

    /// Vérifie que les colonnes cibles sont utilisables telles quelles en SQL
    pub fn validate(&self) -> Result<()> {
        validate_identifier(&self.table)?;
        let mut seen = std::collections::HashSet::new();
        for field in &self.fields {
            validate_identifier(&field.target)?;
            if RESERVED_COLUMNS.contains(&field.target.as_str()) {
                anyhow::bail!("Column '{}' is managed by the importer", field.target);
            }
            if !seen.insert(field.target.as_str()) {
                anyhow::bail!("Column '{}' is mapped twice", field.target);
            }
        }
        Ok(())
    }

    /// Noms des colonnes mappées, dans l'ordre
    pub fn columns(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.target.clone()).collect()
    }
}

/// Type SQL d'une colonne mappée
pub fn pg_type_for(data_type: &str) -> &'static str {
    match data_type.to_ascii_lowercase().as_str() {
        "text" | "varchar" => "TEXT",
        "integer" | "int" => "INTEGER",
        "bigint" => "BIGINT",
        "float" | "double" | "double precision" => "DOUBLE PRECISION",
        _ => "TEXT",
    }
}

/// Valide un identifiant SQL non quoté (schéma, table, colonne)
pub fn validate_identifier(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(c) if c.is_ascii_lowercase() || c == '_' => {
            chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        }
        _ => false,
    };

    if !valid || name.len() > 63 {
        anyhow::bail!(
            "Invalid SQL identifier: '{}'. Use lowercase letters, digits and '_'",
            name
        );
    }
    Ok(())
}
