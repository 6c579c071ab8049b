//! Transfert des lignes importées vers une base PostgreSQL distante
//!
//! Les lignes sont relues depuis la table locale puis insérées par lots
//! avec un INSERT multi-lignes paramétré. Un lot en échec est compté et
//! journalisé, les lots suivants sont tout de même envoyés.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use deadpool_postgres::Pool;
use tokio_postgres::types::ToSql;
use tracing::{info, warn};

use super::postgres::TableLayout;

/// Taille de lot par défaut
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Limite de paramètres du protocole PostgreSQL
const MAX_PARAMETERS: usize = u16::MAX as usize;

/// Ligne relue depuis la table locale
#[derive(Debug, Clone, PartialEq)]
pub struct FloodRow {
    pub id: i32,
    /// Colonnes mappées, rendues en texte, dans l'ordre du layout
    pub values: Vec<Option<String>>,
    /// x_original, y_original, latitude, longitude
    pub coordinates: [Option<f64>; 4],
}

/// Bilan d'un transfert
#[derive(Debug, Clone, Default)]
pub struct UploadSummary {
    pub total: usize,
    pub inserted: usize,
    pub failed: usize,
    pub batches: usize,
    pub failed_batches: usize,
    pub elapsed: Duration,
}

impl UploadSummary {
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    /// Affiche le bilan sur la console
    pub fn display(&self) {
        println!("\n=== Upload Summary ===");
        println!("Total records processed: {}", self.total);
        println!("Successfully inserted: {}", self.inserted);
        println!(
            "Failed insertions: {} ({} of {} batches)",
            self.failed, self.failed_batches, self.batches
        );
        println!("Execution time: {:.2}s", self.elapsed.as_secs_f64());
    }
}

/// Colonnes envoyées, dans l'ordre des paramètres
fn upload_columns(layout: &TableLayout) -> Vec<&str> {
    layout
        .copy_columns()
        .into_iter()
        .filter(|c| *c != "geometry")
        .collect()
}

/// Taille de lot maximale pour un layout donné
pub fn max_batch_size(layout: &TableLayout) -> usize {
    MAX_PARAMETERS / upload_columns(layout).len()
}

/// Relit toutes les lignes de la table locale, triées par id
pub async fn fetch_rows(pool: &Pool, layout: &TableLayout) -> Result<Vec<FloodRow>> {
    let client = pool.get().await?;

    let mapped: Vec<String> = layout
        .columns
        .iter()
        .map(|c| format!("{}::text", c.name))
        .collect();
    let mut select = vec!["id".to_string()];
    select.extend(mapped);
    select.extend(
        ["x_original", "y_original", "latitude", "longitude"]
            .iter()
            .map(|c| c.to_string()),
    );

    let sql = format!(
        "SELECT {} FROM {} ORDER BY id",
        select.join(", "),
        layout.qualified()
    );
    let rows = client
        .query(sql.as_str(), &[])
        .await
        .with_context(|| format!("Failed to read rows from {}", layout.qualified()))?;

    let n = layout.columns.len();
    let records = rows
        .iter()
        .map(|row| FloodRow {
            id: row.get(0),
            values: (1..=n).map(|i| row.get::<_, Option<String>>(i)).collect(),
            coordinates: [
                row.get(n + 1),
                row.get(n + 2),
                row.get(n + 3),
                row.get(n + 4),
            ],
        })
        .collect::<Vec<_>>();

    info!(rows = records.len(), table = %layout.qualified(), "Rows loaded for upload");
    Ok(records)
}

/// INSERT multi-lignes pour `rows` lignes
pub fn insert_sql(layout: &TableLayout, rows: usize) -> String {
    let columns = upload_columns(layout);
    let width = columns.len();
    let mapped_types: Vec<&str> = layout.columns.iter().map(|c| c.pg_type.as_str()).collect();

    let tuples: Vec<String> = (0..rows)
        .map(|r| {
            let base = r * width;
            let mut params = Vec::with_capacity(width);
            params.push(format!("${}", base + 1));
            for (i, pg_type) in mapped_types.iter().enumerate() {
                // Relues en texte, reconverties vers le type de la colonne
                params.push(format!("CAST(${}::text AS {})", base + 2 + i, pg_type));
            }
            for i in 0..4 {
                params.push(format!("${}", base + 2 + mapped_types.len() + i));
            }
            format!("({})", params.join(", "))
        })
        .collect();

    format!(
        "INSERT INTO {} ({}) VALUES {}",
        layout.qualified(),
        columns.join(", "),
        tuples.join(", ")
    )
}

async fn insert_batch(pool: &Pool, layout: &TableLayout, batch: &[FloodRow]) -> Result<u64> {
    let client = pool.get().await.context("Failed to get remote connection")?;

    let mut params: Vec<&(dyn ToSql + Sync)> = Vec::new();
    for row in batch {
        params.push(&row.id);
        for value in &row.values {
            params.push(value);
        }
        for value in &row.coordinates {
            params.push(value);
        }
    }

    let sql = insert_sql(layout, batch.len());
    let inserted = client.execute(sql.as_str(), &params).await?;
    Ok(inserted)
}

/// Insère les lignes par lots de `batch_size` dans la table distante
pub async fn upload_rows(
    pool: &Pool,
    layout: &TableLayout,
    rows: &[FloodRow],
    batch_size: usize,
) -> UploadSummary {
    let started = Instant::now();
    let batch_size = batch_size.clamp(1, max_batch_size(layout));
    let total_batches = rows.len().div_ceil(batch_size);

    let mut summary = UploadSummary {
        total: rows.len(),
        ..Default::default()
    };

    for (i, batch) in rows.chunks(batch_size).enumerate() {
        summary.batches += 1;
        match insert_batch(pool, layout, batch).await {
            Ok(_) => {
                summary.inserted += batch.len();
                info!(
                    batch = i + 1,
                    total_batches,
                    rows = batch.len(),
                    inserted = summary.inserted,
                    "Inserted batch"
                );
            }
            Err(e) => {
                summary.failed += batch.len();
                summary.failed_batches += 1;
                warn!(batch = i + 1, total_batches, error = %format!("{e:#}"), "Batch insert failed");
            }
        }
    }

    summary.elapsed = started.elapsed();
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn layout() -> TableLayout {
        TableLayout::from_config("public", "floods", &Config::from_preset("floods-gr").unwrap())
    }

    #[test]
    fn test_upload_columns_skip_geometry() {
        let layout = layout();
        let cols = upload_columns(&layout);
        assert_eq!(cols.len(), 19);
        assert!(!cols.contains(&"geometry"));
        assert_eq!(cols[18], "longitude");
    }

    #[test]
    fn test_insert_sql_placeholders() {
        let layout = layout();
        let sql = insert_sql(&layout, 2);

        assert!(sql.starts_with("INSERT INTO public.floods (id, date_of_commencement"));
        assert!(sql.contains("VALUES ($1, CAST($2::text AS TEXT)"));
        assert!(sql.contains("$19)"));
        assert!(sql.contains("($20, CAST($21::text AS TEXT)"));
        assert!(sql.ends_with("$38)"));
        assert!(!sql.contains("$39"));
    }

    #[test]
    fn test_max_batch_size() {
        let layout = layout();
        assert_eq!(max_batch_size(&layout), 65535 / 19);
        assert!(DEFAULT_BATCH_SIZE <= max_batch_size(&layout));
    }

    #[test]
    fn test_summary_success() {
        let mut summary = UploadSummary {
            total: 250,
            inserted: 250,
            batches: 3,
            ..Default::default()
        };
        assert!(summary.is_success());

        summary.inserted = 150;
        summary.failed = 100;
        summary.failed_batches = 1;
        assert!(!summary.is_success());
    }
}
