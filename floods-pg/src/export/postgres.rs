//! Export vers PostgreSQL/PostGIS

use anyhow::{Context, Result};
use bytes::BytesMut;
use deadpool_postgres::Pool;
use futures::SinkExt;
use geozero::wkt::WktWriter;
use geozero::GeozeroGeometry;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use floodshp::FloodRecord;

use crate::config::{pg_type_for, Config};

/// SRID des géométries stockées
pub const TARGET_SRID: u32 = 4326;

/// Colonnes de coordonnées, après les colonnes mappées
const COORDINATE_COLUMNS: &[&str] = &["x_original", "y_original", "latitude", "longitude"];

/// Index de filtrage créés si la colonne est mappée
const FILTER_INDEXES: &[(&str, &str)] = &[
    ("year", "year"),
    ("location_name", "location_name"),
    ("cause_of_flood", "cause"),
];

/// Layout d'une table d'inondations
#[derive(Debug, Clone)]
pub struct TableLayout {
    pub schema: String,
    pub name: String,
    pub columns: Vec<ColumnConfig>,
}

/// Colonne mappée depuis un champ DBF
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnConfig {
    pub name: String,
    pub pg_type: String,
    pub source: String,
}

/// Chunk CSV pré-formaté pour COPY
#[derive(Debug)]
pub struct CopyChunk {
    pub data: bytes::Bytes,
    pub rows: u64,
}

/// Bilan d'un COPY + merge
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CopyOutcome {
    /// Lignes chargées dans la table de staging
    pub staged: u64,
    /// Lignes réellement ajoutées à la table finale
    pub inserted: u64,
}

impl CopyOutcome {
    /// Lignes ignorées car déjà présentes (même id)
    pub fn duplicates(&self) -> u64 {
        self.staged.saturating_sub(self.inserted)
    }
}

impl TableLayout {
    pub fn from_config(schema: &str, table: &str, config: &Config) -> Self {
        Self {
            schema: schema.to_string(),
            name: table.to_string(),
            columns: config
                .fields
                .iter()
                .map(|f| ColumnConfig {
                    name: f.target.clone(),
                    pg_type: pg_type_for(&f.data_type).to_string(),
                    source: f.source.clone(),
                })
                .collect(),
        }
    }

    pub fn qualified(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }

    pub fn staging(&self) -> String {
        format!("{}._staging_{}", self.schema, self.name)
    }

    /// Table des checksums d'import, partagée par les tables du schéma
    pub fn checksums(&self) -> String {
        format!("{}._import_checksums", self.schema)
    }

    /// Colonnes écrites par l'import, dans l'ordre du COPY
    pub fn copy_columns(&self) -> Vec<&str> {
        let mut cols = Vec::with_capacity(self.columns.len() + 6);
        cols.push("id");
        cols.extend(self.columns.iter().map(|c| c.name.as_str()));
        cols.extend_from_slice(COORDINATE_COLUMNS);
        cols.push("geometry");
        cols
    }

    fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    /// DDL de la table finale
    pub fn create_table_sql(&self) -> String {
        let mapped: String = self
            .columns
            .iter()
            .map(|c| format!("{} {},\n            ", c.name, c.pg_type))
            .collect();

        format!(
            r#"
        CREATE TABLE IF NOT EXISTS {} (
            id INTEGER PRIMARY KEY,
            {}x_original DOUBLE PRECISION,
            y_original DOUBLE PRECISION,
            latitude DOUBLE PRECISION,
            longitude DOUBLE PRECISION,
            geometry geometry(Point, {}),
            imported_at TIMESTAMPTZ DEFAULT NOW()
        )
        "#,
            self.qualified(),
            mapped,
            TARGET_SRID
        )
    }

    fn checksums_table_sql(&self) -> String {
        format!(
            r#"
        CREATE TABLE IF NOT EXISTS {} (
            dataset_name TEXT NOT NULL,
            table_name TEXT NOT NULL,
            checksum TEXT NOT NULL,
            imported_at TIMESTAMPTZ DEFAULT NOW(),
            PRIMARY KEY (dataset_name, table_name)
        )
        "#,
            self.checksums()
        )
    }

    /// Recrée la staging à partir des colonnes actuelles de la table finale
    fn staging_table_sql(&self) -> String {
        format!(
            "DROP TABLE IF EXISTS {staging};\n\
             CREATE UNLOGGED TABLE {staging} (LIKE {} INCLUDING DEFAULTS)",
            self.qualified(),
            staging = self.staging()
        )
    }

    /// Supprime la table finale et une éventuelle staging restée en place
    fn drop_tables_sql(&self) -> String {
        format!(
            "DROP TABLE IF EXISTS {};\nDROP TABLE IF EXISTS {} CASCADE",
            self.staging(),
            self.qualified()
        )
    }

    fn copy_sql(&self) -> String {
        format!(
            "COPY {} ({}) FROM STDIN WITH (FORMAT csv, DELIMITER '|', QUOTE '\"', ESCAPE '\"', NULL '')",
            self.staging(),
            self.copy_columns().join(", ")
        )
    }

    fn merge_sql(&self) -> String {
        let cols = self.copy_columns().join(", ");
        format!(
            r#"
        INSERT INTO {} ({cols})
        SELECT {cols} FROM {}
        ON CONFLICT (id) DO NOTHING
        "#,
            self.qualified(),
            self.staging()
        )
    }
}

/// Crée le schéma, la table finale et la table des checksums
pub async fn create_schema(pool: &Pool, layout: &TableLayout) -> Result<()> {
    let client = pool.get().await?;

    client
        .execute(&format!("CREATE SCHEMA IF NOT EXISTS {}", layout.schema), &[])
        .await
        .context("Failed to create schema")?;

    // PostGIS peut exister sans que l'utilisateur ait le droit de le (re)créer
    match client
        .execute("CREATE EXTENSION IF NOT EXISTS postgis", &[])
        .await
    {
        Ok(_) => {}
        Err(e) => {
            warn!("CREATE EXTENSION postgis failed (will check if already installed): {e}");
            let exists = client
                .query_opt("SELECT 1 FROM pg_extension WHERE extname = 'postgis'", &[])
                .await
                .context("Failed to check pg_extension")?
                .is_some();
            if !exists {
                return Err(anyhow::anyhow!(
                    "PostGIS extension is not installed and could not be created: {e}"
                ));
            }
        }
    }

    client
        .execute(&layout.create_table_sql(), &[])
        .await
        .with_context(|| format!("Failed to create table {}", layout.qualified()))?;
    info!("Created table {}", layout.qualified());

    client
        .execute(&layout.checksums_table_sql(), &[])
        .await
        .context("Failed to create _import_checksums table")?;

    Ok(())
}

/// Supprime la table finale et sa staging (le schéma est conservé)
pub async fn drop_table(pool: &Pool, layout: &TableLayout) -> Result<()> {
    let client = pool.get().await?;
    client
        .batch_execute(&layout.drop_tables_sql())
        .await
        .with_context(|| format!("Failed to drop table {}", layout.qualified()))?;
    Ok(())
}

/// Crée la table de staging (sans contraintes) utilisée pour COPY
///
/// Une staging laissée par un import interrompu est remplacée.
pub async fn create_staging_table(pool: &Pool, layout: &TableLayout) -> Result<()> {
    let client = pool.get().await?;
    client
        .batch_execute(&layout.staging_table_sql())
        .await
        .with_context(|| format!("Failed to create staging table {}", layout.staging()))?;
    Ok(())
}

/// Supprime la table de staging
pub async fn drop_staging_table(pool: &Pool, layout: &TableLayout) -> Result<()> {
    let client = pool.get().await?;
    client
        .execute(&format!("DROP TABLE IF EXISTS {}", layout.staging()), &[])
        .await
        .with_context(|| format!("Failed to drop staging table {}", layout.staging()))?;
    Ok(())
}

/// Charge les chunks CSV en staging puis fusionne vers la table finale.
///
/// Vidage de la staging, COPY et merge (`ON CONFLICT (id) DO NOTHING`) sont
/// faits dans une seule transaction : un échec n'ajoute aucune ligne.
pub async fn copy_records(
    pool: &Pool,
    layout: &TableLayout,
    mut rx: mpsc::Receiver<CopyChunk>,
) -> Result<CopyOutcome> {
    let mut client = pool.get().await?;
    let tx = client.transaction().await?;

    tx.execute(&format!("TRUNCATE TABLE {}", layout.staging()), &[])
        .await
        .with_context(|| format!("Failed to truncate {}", layout.staging()))?;

    let copy_in = tx.copy_in(&layout.copy_sql()).await?;
    let mut pinned = std::pin::pin!(copy_in);

    let mut staged: u64 = 0;
    while let Some(chunk) = rx.recv().await {
        if chunk.data.is_empty() {
            continue;
        }
        pinned
            .as_mut()
            .send(chunk.data)
            .await
            .context("Failed to send COPY chunk")?;
        staged += chunk.rows;
    }
    pinned.close().await.context("COPY into staging failed")?;

    let inserted = tx
        .execute(&layout.merge_sql(), &[])
        .await
        .with_context(|| format!("Failed to merge staging into {}", layout.qualified()))?;

    tx.commit().await?;

    debug!(staged, inserted, table = %layout.qualified(), "Staging merged");
    Ok(CopyOutcome { staged, inserted })
}

/// Crée les index après import
pub async fn create_indexes(pool: &Pool, layout: &TableLayout) -> Result<()> {
    let client = pool.get().await?;
    let table = &layout.name;

    let mut statements = vec![
        format!(
            "CREATE INDEX IF NOT EXISTS idx_{table}_location ON {} (latitude, longitude)",
            layout.qualified()
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS idx_{table}_geom ON {} USING GIST (geometry)",
            layout.qualified()
        ),
    ];
    for (column, suffix) in FILTER_INDEXES {
        if layout.has_column(column) {
            statements.push(format!(
                "CREATE INDEX IF NOT EXISTS idx_{table}_{suffix} ON {} ({column})",
                layout.qualified()
            ));
        }
    }

    for sql in &statements {
        client
            .execute(sql.as_str(), &[])
            .await
            .with_context(|| format!("Failed to create index on {}: {}", layout.qualified(), sql))?;
    }

    info!(count = statements.len(), table = %layout.qualified(), "Indexes created");
    Ok(())
}

/// Vérifie si un jeu de données a déjà été importé dans cette table (checksum identique)
pub async fn is_already_imported(
    pool: &Pool,
    layout: &TableLayout,
    dataset_name: &str,
    checksum: &str,
) -> Result<bool> {
    let client = pool.get().await?;

    let row = client
        .query_opt(
            &format!(
                "SELECT 1 FROM {} WHERE dataset_name = $1 AND table_name = $2 AND checksum = $3",
                layout.checksums()
            ),
            &[&dataset_name, &layout.name, &checksum],
        )
        .await?;

    Ok(row.is_some())
}

/// Enregistre le checksum d'un jeu de données après import réussi
pub async fn record_checksum(
    pool: &Pool,
    layout: &TableLayout,
    dataset_name: &str,
    checksum: &str,
) -> Result<()> {
    let client = pool.get().await?;

    client
        .execute(
            &format!(
                r#"
                INSERT INTO {} (dataset_name, table_name, checksum)
                VALUES ($1, $2, $3)
                ON CONFLICT (dataset_name, table_name)
                DO UPDATE SET checksum = $3, imported_at = NOW()
                "#,
                layout.checksums()
            ),
            &[&dataset_name, &layout.name, &checksum],
        )
        .await
        .context("Failed to record import checksum")?;

    Ok(())
}

fn push_csv_text_field(buf: &mut BytesMut, value: &str) {
    buf.extend_from_slice(b"\"");
    for b in value.as_bytes() {
        match *b {
            b'"' => buf.extend_from_slice(b"\"\""),
            _ => buf.extend_from_slice(&[*b]),
        }
    }
    buf.extend_from_slice(b"\"");
}

fn push_number(buf: &mut BytesMut, value: Option<f64>) {
    if let Some(n) = value.filter(|n| n.is_finite()) {
        buf.extend_from_slice(n.to_string().as_bytes());
    }
}

/// Écrit une ligne CSV pour COPY, dans l'ordre de [`TableLayout::copy_columns`]
///
/// En cas d'erreur, le buffer est restauré à sa longueur initiale.
pub fn encode_copy_row(
    buf: &mut BytesMut,
    record: &FloodRecord,
    layout: &TableLayout,
    wkt_buf: &mut Vec<u8>,
) -> Result<()> {
    let start_len = buf.len();

    let res: Result<()> = (|| {
        let point = record
            .point()
            .ok_or_else(|| anyhow::anyhow!("Record {} has no coordinates", record.id))?;

        buf.extend_from_slice(record.id.to_string().as_bytes());

        for col in &layout.columns {
            buf.extend_from_slice(b"|");
            let value = record.attributes.get(&col.source);
            match col.pg_type.as_str() {
                "INTEGER" | "BIGINT" => {
                    let n = value.and_then(numeric_value);
                    push_number(buf, n.map(f64::trunc));
                }
                "DOUBLE PRECISION" => push_number(buf, value.and_then(numeric_value)),
                _ => push_csv_text_field(buf, &record.text(&col.source)),
            }
        }

        for value in [record.x, record.y, record.latitude, record.longitude] {
            buf.extend_from_slice(b"|");
            push_number(buf, value);
        }

        // geometry (EWKT: SRID=...;WKT)
        buf.extend_from_slice(b"|");
        wkt_buf.clear();
        {
            let mut writer = WktWriter::new(&mut *wkt_buf);
            geo::Geometry::Point(point)
                .process_geom(&mut writer)
                .context("Failed to encode geometry to WKT")?;
        }
        buf.extend_from_slice(format!("\"SRID={};", TARGET_SRID).as_bytes());
        buf.extend_from_slice(&wkt_buf[..]);
        buf.extend_from_slice(b"\"\n");
        Ok(())
    })();

    if res.is_err() {
        buf.truncate(start_len);
    }

    res
}

fn numeric_value(value: &floodshp::FieldValue) -> Option<f64> {
    match value {
        floodshp::FieldValue::Number(n) => *n,
        floodshp::FieldValue::Text(s) => floodshp::parser::dbf::parse_number(s.as_bytes()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use floodshp::FieldValue;
    use std::collections::HashMap;

    fn layout() -> TableLayout {
        TableLayout::from_config("floods", "floods", &Config::from_preset("floods-gr").unwrap())
    }

    fn record() -> FloodRecord {
        let mut attributes = HashMap::new();
        attributes.insert(
            "Location_N".to_string(),
            FieldValue::Text("Agia \"Marina\"".into()),
        );
        attributes.insert("Year".to_string(), FieldValue::Number(Some(1994.0)));
        attributes.insert("Cause_of_F".to_string(), FieldValue::Text("heavy\nrain".into()));
        FloodRecord {
            id: 7,
            attributes,
            x: Some(476000.0),
            y: Some(4205000.0),
            latitude: Some(37.99),
            longitude: Some(23.72),
        }
    }

    #[test]
    fn test_copy_columns_order() {
        let layout = layout();
        let cols = layout.copy_columns();
        assert_eq!(cols.first(), Some(&"id"));
        assert_eq!(cols[1], "date_of_commencement");
        assert_eq!(cols.last(), Some(&"geometry"));
        assert_eq!(cols.len(), 1 + 14 + 4 + 1);
    }

    #[test]
    fn test_create_table_sql() {
        let sql = layout().create_table_sql();
        assert!(sql.contains("CREATE TABLE IF NOT EXISTS floods.floods"));
        assert!(sql.contains("id INTEGER PRIMARY KEY"));
        assert!(sql.contains("location_name TEXT"));
        assert!(sql.contains("geometry geometry(Point, 4326)"));
        assert!(sql.contains("imported_at TIMESTAMPTZ"));
    }

    #[test]
    fn test_merge_ignores_duplicates() {
        let sql = layout().merge_sql();
        assert!(sql.contains("INSERT INTO floods.floods"));
        assert!(sql.contains("FROM floods._staging_floods"));
        assert!(sql.contains("ON CONFLICT (id) DO NOTHING"));
    }

    #[test]
    fn test_encode_copy_row() {
        let layout = layout();
        let mut buf = BytesMut::new();
        let mut wkt = Vec::new();
        encode_copy_row(&mut buf, &record(), &layout, &mut wkt).unwrap();

        let line = String::from_utf8(buf.to_vec()).unwrap();
        assert!(line.starts_with("7|\"\"|\"1994\"|\"Agia \"\"Marina\"\"\"|"));
        // Le retour à la ligne reste dans le champ entre guillemets
        assert!(line.contains("|\"heavy\nrain\"|"));
        assert!(line.contains("|476000|4205000|37.99|23.72|"));
        assert!(line.contains("\"SRID=4326;POINT"));
        assert!(line.ends_with("\"\n"));
        assert_eq!(line.matches('\n').count(), 2);
    }

    #[test]
    fn test_staging_is_recreated() {
        let sql = layout().staging_table_sql();
        let drop = sql.find("DROP TABLE IF EXISTS floods._staging_floods").unwrap();
        let create = sql
            .find("CREATE UNLOGGED TABLE floods._staging_floods (LIKE floods.floods")
            .unwrap();
        assert!(drop < create);
        assert!(!sql.contains("IF NOT EXISTS"));
    }

    #[test]
    fn test_drop_table_includes_staging() {
        let sql = layout().drop_tables_sql();
        assert!(sql.contains("DROP TABLE IF EXISTS floods._staging_floods;"));
        assert!(sql.contains("DROP TABLE IF EXISTS floods.floods CASCADE"));
    }

    #[test]
    fn test_checksums_keyed_by_table() {
        let layout = layout();
        assert_eq!(layout.checksums(), "floods._import_checksums");
        let sql = layout.checksums_table_sql();
        assert!(sql.contains("table_name TEXT NOT NULL"));
        assert!(sql.contains("PRIMARY KEY (dataset_name, table_name)"));
    }

    #[test]
    fn test_encode_copy_row_typed_columns() {
        let mut layout = layout();
        layout.columns.truncate(2);
        layout.columns[1].pg_type = "INTEGER".into();
        let mut buf = BytesMut::new();
        let mut wkt = Vec::new();
        encode_copy_row(&mut buf, &record(), &layout, &mut wkt).unwrap();

        let line = String::from_utf8(buf.to_vec()).unwrap();
        assert!(line.starts_with("7|\"\"|1994|476000|"));
    }

    #[test]
    fn test_encode_copy_row_without_coordinates() {
        let layout = layout();
        let mut buf = BytesMut::from(&b"previous\n"[..]);
        let mut wkt = Vec::new();
        let mut rec = record();
        rec.latitude = None;

        assert!(encode_copy_row(&mut buf, &rec, &layout, &mut wkt).is_err());
        assert_eq!(&buf[..], b"previous\n");
    }

    #[test]
    fn test_copy_outcome_duplicates() {
        let outcome = CopyOutcome {
            staged: 10,
            inserted: 7,
        };
        assert_eq!(outcome.duplicates(), 3);
    }
}
