//! Rapport d'import avec graceful degradation
//!
//! Collecte les compteurs du parsing et de l'écriture en base, ainsi que
//! les anomalies non fatales rencontrées en chemin.

use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use serde::Serialize;

use floodshp::{FloodError, ParseResult};

use crate::export::postgres::CopyOutcome;

/// Statut global de l'import
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ImportStatus {
    /// Import réussi sans erreur
    Success,
    /// Import réussi avec des erreurs non-fatales
    PartialSuccess,
    /// Import échoué
    Failed,
    /// Jeu de données inchangé depuis le dernier import
    Skipped,
}

/// Niveau de sévérité des anomalies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorLevel {
    /// Erreur fatale: import abandonné
    Fatal,
    /// Erreur: enregistrements perdus
    Error,
    /// Warning: import complet malgré une incohérence
    Warning,
}

/// Anomalie d'import avec contexte
#[derive(Debug, Clone, Serialize)]
pub struct ImportIssue {
    pub level: ErrorLevel,
    /// Identifiant de l'enregistrement concerné (optionnel)
    pub record: Option<u32>,
    pub message: String,
}

/// Rapport complet d'import
#[derive(Debug, Clone, Serialize)]
pub struct ImportReport {
    /// Nom du jeu de données (nom de base du shapefile)
    pub dataset: String,
    /// Checksum blake3 de la paire SHP/DBF
    pub checksum: Option<String>,
    pub duration_secs: f64,
    pub status: ImportStatus,

    // Parsing
    pub attribute_records: usize,
    pub geometry_records: usize,
    pub without_coordinates: usize,
    pub out_of_bounds: usize,
    pub accepted: usize,

    // Écriture
    pub staged: u64,
    pub inserted: u64,
    pub duplicates: u64,

    pub issues: Vec<ImportIssue>,
}

impl ImportReport {
    pub fn new(dataset: &str) -> Self {
        Self {
            dataset: dataset.to_string(),
            checksum: None,
            duration_secs: 0.0,
            status: ImportStatus::Success,
            attribute_records: 0,
            geometry_records: 0,
            without_coordinates: 0,
            out_of_bounds: 0,
            accepted: 0,
            staged: 0,
            inserted: 0,
            duplicates: 0,
            issues: Vec::new(),
        }
    }

    /// Reprend les compteurs et warnings du parsing
    pub fn record_parse(&mut self, result: &ParseResult) {
        self.attribute_records = result.attribute_records;
        self.geometry_records = result.geometry_records;
        self.without_coordinates = result.without_coordinates;
        self.out_of_bounds = result.out_of_bounds;
        self.accepted = result.records.len();

        for warning in &result.warnings {
            let level = match warning {
                FloodError::GeometryFault { .. } => ErrorLevel::Error,
                e if e.is_fatal() => ErrorLevel::Fatal,
                _ => ErrorLevel::Warning,
            };
            self.issues.push(ImportIssue {
                level,
                record: None,
                message: warning.to_string(),
            });
        }
    }

    /// Reprend le bilan du COPY + merge
    pub fn record_copy(&mut self, outcome: CopyOutcome) {
        self.staged = outcome.staged;
        self.inserted = outcome.inserted;
        self.duplicates = outcome.duplicates();
    }

    /// Enregistrement non écrit en base
    pub fn record_error(&mut self, record: u32, message: impl Into<String>) {
        self.issues.push(ImportIssue {
            level: ErrorLevel::Error,
            record: Some(record),
            message: message.into(),
        });
    }

    /// Erreur ayant interrompu l'import
    pub fn record_fatal(&mut self, message: impl Into<String>) {
        self.issues.push(ImportIssue {
            level: ErrorLevel::Fatal,
            record: None,
            message: message.into(),
        });
    }

    pub fn mark_skipped(&mut self) {
        self.status = ImportStatus::Skipped;
    }

    pub fn set_duration(&mut self, duration: Duration) {
        self.duration_secs = duration.as_secs_f64();
    }

    fn count(&self, level: ErrorLevel) -> usize {
        self.issues.iter().filter(|i| i.level == level).count()
    }

    /// Détermine le statut final basé sur les anomalies
    pub fn finalize(&mut self) {
        if self.status == ImportStatus::Skipped {
            return;
        }

        let has_fatal = self.count(ErrorLevel::Fatal) > 0;
        let has_errors = self.count(ErrorLevel::Error) > 0;
        let has_success = self.staged > 0;

        self.status = if has_fatal {
            ImportStatus::Failed
        } else if has_errors && has_success {
            ImportStatus::PartialSuccess
        } else if has_errors {
            ImportStatus::Failed
        } else {
            ImportStatus::Success
        };
    }

    /// Affiche le rapport sur la console
    pub fn display(&self) {
        println!("\n{}", "=".repeat(60));
        println!("IMPORT REPORT - {}", self.dataset);
        println!("{}", "=".repeat(60));

        println!("\nStatus: {:?}", self.status);
        println!("Duration: {:.2}s", self.duration_secs);
        if let Some(checksum) = &self.checksum {
            println!("Checksum: {}", checksum);
        }

        if self.status == ImportStatus::Skipped {
            println!("\nDataset unchanged since last import, nothing to do.");
            println!("\n{}", "=".repeat(60));
            return;
        }

        println!("\n--- PARSING ---");
        println!(
            "Records: {} attribute rows, {} geometries",
            self.attribute_records, self.geometry_records
        );
        println!(
            "Accepted: {} ({} without coordinates, {} outside bounds)",
            self.accepted, self.without_coordinates, self.out_of_bounds
        );

        println!("\n--- DATABASE ---");
        println!(
            "Rows: {} staged, {} inserted, {} duplicates",
            self.staged, self.inserted, self.duplicates
        );

        if !self.issues.is_empty() {
            println!("\n--- ISSUES ({}) ---", self.issues.len());
            for issue in self.issues.iter().take(20) {
                match issue.record {
                    Some(id) => println!("  {:?} [{}] {}", issue.level, id, issue.message),
                    None => println!("  {:?} {}", issue.level, issue.message),
                }
            }
            if self.issues.len() > 20 {
                println!("  ... and {} more", self.issues.len() - 20);
            }
        }

        println!("\n{}", "=".repeat(60));
    }

    /// Sauvegarde le rapport en JSON
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Affichage compact pour le résumé
    pub fn summary(&self) -> String {
        format!(
            "{}: {} accepted, {} inserted, {} duplicates, {} issues",
            self.dataset,
            self.accepted,
            self.inserted,
            self.duplicates,
            self.issues.len()
        )
    }
}
