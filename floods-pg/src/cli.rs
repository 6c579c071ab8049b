//! Définition et implémentation des commandes CLI
//!
//! - défaut : shapefile → PostGIS (COPY + staging, skip si inchangé)
//! - `to-geojson` : shapefile → GeoJSON (sans DB)
//! - `upload` : table locale → base distante, par lots

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use bytes::BytesMut;
use clap::{Args, Subcommand};
use deadpool_postgres::Pool;
use tokio::sync::mpsc;
use tracing::{info, warn};

use floodshp::{FloodRecord, ParseResult, ReadOptions, ShapefilePaths};
use floods_pg::config::{validate_identifier, Config};
use floods_pg::export::pool::{self, DatabaseConfig};
use floods_pg::export::postgres::{self, CopyChunk, TableLayout};
use floods_pg::export::{geojson, upload};
use floods_pg::ImportReport;

/// Lignes par chunk COPY
const COPY_BATCH_ROWS: u64 = 5000;

#[derive(Subcommand)]
pub enum Commands {
    /// Export the shapefile to GeoJSON (no database required)
    ToGeojson {
        /// Shapefile base path (with or without .shp/.dbf extension)
        #[arg(short, long)]
        path: PathBuf,

        /// Output GeoJSON file
        #[arg(short, long)]
        output: PathBuf,

        /// Config preset name (floods-gr) or path to a JSON config
        #[arg(long, default_value = "floods-gr")]
        config: String,

        /// Encoding of DBF text fields (utf-8, windows-1253, iso-8859-7...)
        #[arg(long, default_value = "utf-8")]
        encoding: String,
    },

    /// Copy the imported table to a remote PostgreSQL (env REMOTE_PG*)
    Upload {
        /// Local schema
        #[arg(long, default_value = "floods")]
        schema: String,

        /// Local table
        #[arg(long, default_value = "floods")]
        table: String,

        /// Remote schema
        #[arg(long, default_value = "public")]
        remote_schema: String,

        /// Remote table (défaut : même nom que la table locale)
        #[arg(long)]
        remote_table: Option<String>,

        /// Rows per INSERT
        #[arg(long, default_value_t = upload::DEFAULT_BATCH_SIZE)]
        batch_size: usize,

        /// Config preset name (floods-gr) or path to a JSON config
        #[arg(long, default_value = "floods-gr")]
        config: String,

        #[command(flatten)]
        db: DatabaseArgs,
    },
}

/// Arguments de l'import PostGIS (commande par défaut)
#[derive(Args, Debug)]
pub struct ImportArgs {
    /// Shapefile base path (with or without .shp/.dbf extension)
    #[arg(short, long)]
    pub path: PathBuf,

    /// Target PostgreSQL schema
    #[arg(long, default_value = "floods")]
    pub schema: String,

    /// Target table (défaut : table du config)
    #[arg(long)]
    pub table: Option<String>,

    /// Config preset name (floods-gr) or path to a JSON config
    #[arg(long, default_value = "floods-gr")]
    pub config: String,

    /// Encoding of DBF text fields (utf-8, windows-1253, iso-8859-7...)
    #[arg(long, default_value = "utf-8")]
    pub encoding: String,

    /// Drop the final table before import
    #[arg(long)]
    pub drop_table: bool,

    /// Skip index creation at the end of the import
    #[arg(long)]
    pub skip_indexes: bool,

    /// Import even if the same files were already imported
    #[arg(long)]
    pub force: bool,

    /// Save the import report as JSON
    #[arg(long)]
    pub report: Option<PathBuf>,

    #[command(flatten)]
    pub db: DatabaseArgs,
}

/// Surcharges de connexion PostgreSQL
#[derive(Args, Debug, Default)]
pub struct DatabaseArgs {
    /// PostgreSQL host (défaut : env PGHOST / localhost)
    #[arg(long)]
    pub host: Option<String>,

    /// PostgreSQL database name (défaut : env PGDATABASE / floods)
    #[arg(long)]
    pub database: Option<String>,

    /// PostgreSQL user (défaut : env PGUSER / postgres)
    #[arg(long)]
    pub user: Option<String>,

    /// PostgreSQL password (défaut : env PGPASSWORD)
    #[arg(long)]
    pub password: Option<String>,

    /// PostgreSQL port (défaut : env PGPORT / 5432)
    #[arg(long)]
    pub port: Option<u16>,

    /// SSL mode: disable, prefer, require (défaut : env PGSSLMODE / disable)
    #[arg(long)]
    pub ssl: Option<String>,
}

/// Exécute l'import PostGIS
pub async fn cmd_import(args: ImportArgs) -> Result<ImportReport> {
    validate_identifier(&args.schema)?;
    let config = Config::resolve(&args.config)?;
    let table = args.table.clone().unwrap_or_else(|| config.table.clone());
    validate_identifier(&table)?;

    let options = ReadOptions::default().with_encoding_label(&args.encoding)?;
    let paths = ShapefilePaths::from_base(&args.path);
    let layout = TableLayout::from_config(&args.schema, &table, &config);

    info!(
        shp = %paths.shp.display(),
        dbf = %paths.dbf.display(),
        table = %layout.qualified(),
        config = %args.config,
        "Starting import"
    );

    let started = Instant::now();
    let mut report = ImportReport::new(&paths.dataset_name());

    let outcome = run_import(&args, &paths, options, &layout, &mut report).await;

    report.set_duration(started.elapsed());
    if let Err(e) = &outcome {
        report.record_fatal(format!("{e:#}"));
    }
    report.finalize();
    report.display();

    if let Some(path) = &args.report {
        report
            .save_to_file(path)
            .with_context(|| format!("Failed to save report to {}", path.display()))?;
        println!("Report saved to {}", path.display());
    }

    outcome?;
    info!("{}", report.summary());
    Ok(report)
}

async fn run_import(
    args: &ImportArgs,
    paths: &ShapefilePaths,
    options: ReadOptions,
    layout: &TableLayout,
    report: &mut ImportReport,
) -> Result<()> {
    let checksum = tokio::task::spawn_blocking({
        let paths = paths.clone();
        move || compute_pair_checksum(&paths)
    })
    .await??;
    report.checksum = Some(checksum.clone());

    let mut db_config = DatabaseConfig::from_env();
    apply_database_overrides(&mut db_config, &args.db);
    println!("Database: {}", db_config.describe());

    let pool = pool::create_pool(&db_config).await?;
    pool::test_connection(&pool).await?;
    println!("Connected to PostgreSQL");

    if args.drop_table {
        postgres::drop_table(&pool, layout).await?;
    }
    postgres::create_schema(&pool, layout).await?;

    let dataset = paths.dataset_name();
    if !args.force
        && !args.drop_table
        && postgres::is_already_imported(&pool, layout, &dataset, &checksum).await?
    {
        info!(dataset = %dataset, "Dataset unchanged since last import, skipping");
        report.mark_skipped();
        return Ok(());
    }

    let result: ParseResult = tokio::task::spawn_blocking({
        let paths = paths.clone();
        move || floodshp::parse(&paths, &options)
    })
    .await??;
    report.record_parse(&result);

    for warning in &result.warnings {
        warn!("{}", warning);
    }

    postgres::create_staging_table(&pool, layout).await?;
    let loaded = load_records(&pool, layout, &result, report).await;
    if let Err(e) = postgres::drop_staging_table(&pool, layout).await {
        warn!(staging = %layout.staging(), error = %format!("{e:#}"), "Staging table left in place");
    }
    loaded?;

    if !args.skip_indexes {
        postgres::create_indexes(&pool, layout).await?;
    }

    postgres::record_checksum(&pool, layout, &dataset, &checksum).await?;
    Ok(())
}

/// COPY des enregistrements vers la staging puis merge vers la table finale
async fn load_records(
    pool: &Pool,
    layout: &TableLayout,
    result: &ParseResult,
    report: &mut ImportReport,
) -> Result<()> {
    let (tx, rx) = mpsc::channel::<CopyChunk>(16);
    let copy_handle = tokio::spawn({
        let pool = pool.clone();
        let layout = layout.clone();
        async move { postgres::copy_records(&pool, &layout, rx).await }
    });

    let sent = stream_records(&result.records, layout, tx, report).await;
    let outcome = copy_handle
        .await?
        .with_context(|| format!("COPY failed for {}", layout.qualified()))?;
    info!(sent, staged = outcome.staged, inserted = outcome.inserted, "COPY complete");
    report.record_copy(outcome);
    Ok(())
}

/// Encode les enregistrements en chunks CSV et les pousse vers le COPY.
///
/// Retourne le nombre de lignes envoyées. Un enregistrement non encodable
/// est consigné dans le rapport et ignoré.
async fn stream_records(
    records: &[FloodRecord],
    layout: &TableLayout,
    tx: mpsc::Sender<CopyChunk>,
    report: &mut ImportReport,
) -> u64 {
    let mut buf = BytesMut::with_capacity(64 * 1024);
    let mut wkt_buf: Vec<u8> = Vec::with_capacity(64);
    let mut rows: u64 = 0;
    let mut sent: u64 = 0;

    for record in records {
        if let Err(e) = postgres::encode_copy_row(&mut buf, record, layout, &mut wkt_buf) {
            warn!(id = record.id, "Failed to encode row: {e:#}");
            report.record_error(record.id, format!("{e:#}"));
            continue;
        }
        rows += 1;

        if rows >= COPY_BATCH_ROWS {
            let data = buf.split().freeze();
            if tx.send(CopyChunk { data, rows }).await.is_err() {
                warn!("COPY stream closed early");
                return sent;
            }
            sent += rows;
            rows = 0;
        }
    }

    if rows > 0 {
        let data = buf.freeze();
        if tx.send(CopyChunk { data, rows }).await.is_err() {
            warn!("COPY stream closed early");
            return sent;
        }
        sent += rows;
    }

    sent
}

/// Exécute l'export GeoJSON
pub async fn cmd_to_geojson(path: &Path, output: &Path, config_spec: &str, encoding: &str) -> Result<()> {
    let config = Config::resolve(config_spec)?;
    let options = ReadOptions::default().with_encoding_label(encoding)?;
    let paths = ShapefilePaths::from_base(path);

    let result = tokio::task::spawn_blocking({
        let paths = paths.clone();
        move || floodshp::parse(&paths, &options)
    })
    .await??;

    for warning in &result.warnings {
        warn!("{}", warning);
    }

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let written = geojson::export_to_geojson(&result.records, &config, output)?;

    println!(
        "Exported {} features to {} ({} without coordinates, {} outside bounds)",
        written,
        output.display(),
        result.without_coordinates,
        result.out_of_bounds
    );
    Ok(())
}

/// Options de la commande upload
pub struct UploadArgs {
    pub schema: String,
    pub table: String,
    pub remote_schema: String,
    pub remote_table: Option<String>,
    pub batch_size: usize,
    pub config: String,
    pub db: DatabaseArgs,
}

/// Exécute le transfert vers la base distante
pub async fn cmd_upload(args: UploadArgs) -> Result<()> {
    let remote_table = args.remote_table.clone().unwrap_or_else(|| args.table.clone());
    for name in [&args.schema, &args.table, &args.remote_schema, &remote_table] {
        validate_identifier(name)?;
    }

    let config = Config::resolve(&args.config)?;
    let local = TableLayout::from_config(&args.schema, &args.table, &config);
    let remote = TableLayout::from_config(&args.remote_schema, &remote_table, &config);

    let max = upload::max_batch_size(&remote);
    if args.batch_size == 0 || args.batch_size > max {
        anyhow::bail!("Batch size must be between 1 and {}, got {}", max, args.batch_size);
    }

    let mut local_config = DatabaseConfig::from_env();
    apply_database_overrides(&mut local_config, &args.db);
    let remote_config = DatabaseConfig::from_env_prefixed("REMOTE_");

    println!("Source: {} ({})", local.qualified(), local_config.describe());
    println!("Target: {} ({})", remote.qualified(), remote_config.describe());

    let local_pool = pool::create_pool(&local_config).await?;
    pool::test_connection(&local_pool).await?;
    let remote_pool = pool::create_pool(&remote_config).await?;
    pool::test_connection(&remote_pool)
        .await
        .context("Remote database unreachable")?;

    let rows = upload::fetch_rows(&local_pool, &local).await?;
    if rows.is_empty() {
        println!("No records found in {}. Nothing to upload.", local.qualified());
        return Ok(());
    }

    let summary = upload::upload_rows(&remote_pool, &remote, &rows, args.batch_size).await;
    summary.display();

    if !summary.is_success() {
        anyhow::bail!(
            "{} records failed to upload ({} batches)",
            summary.failed,
            summary.failed_batches
        );
    }

    println!("Upload completed successfully.");
    Ok(())
}

fn apply_database_overrides(config: &mut DatabaseConfig, args: &DatabaseArgs) {
    if let Some(host) = &args.host {
        config.host = host.clone();
    }
    if let Some(database) = &args.database {
        config.dbname = database.clone();
    }
    if let Some(user) = &args.user {
        config.user = user.clone();
    }
    if let Some(password) = &args.password {
        config.password = Some(password.clone());
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(ssl) = &args.ssl {
        match ssl.parse() {
            Ok(mode) => config.ssl_mode = mode,
            Err(e) => warn!("{e}, keeping {:?}", config.ssl_mode),
        }
    }
}

/// Checksum blake3 de la paire DBF + SHP
fn compute_pair_checksum(paths: &ShapefilePaths) -> Result<String> {
    use std::fs::File;
    use std::io::Read;

    let mut hasher = blake3::Hasher::new();
    let mut buffer = [0u8; 65536];

    for path in [&paths.dbf, &paths.shp] {
        let mut file =
            File::open(path).with_context(|| format!("Cannot open {}", path.display()))?;
        loop {
            let bytes_read = file.read(&mut buffer)?;
            if bytes_read == 0 {
                break;
            }
            hasher.update(&buffer[..bytes_read]);
        }
    }

    Ok(hex::encode(hasher.finalize().as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use floodshp::FieldValue;
    use floods_pg::export::pool::SslMode;
    use std::collections::HashMap;

    fn write_pair(name: &str, dbf: &[u8], shp: &[u8]) -> ShapefilePaths {
        let dir = std::env::temp_dir().join(format!("floods-cli-{}-{}", name, std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let paths = ShapefilePaths::from_base(dir.join("Floods_GR"));
        std::fs::write(&paths.dbf, dbf).unwrap();
        std::fs::write(&paths.shp, shp).unwrap();
        paths
    }

    fn record(id: u32, located: bool) -> FloodRecord {
        let mut attributes = HashMap::new();
        attributes.insert("Year".to_string(), FieldValue::Number(Some(2017.0)));
        FloodRecord {
            id,
            attributes,
            x: Some(476000.0),
            y: Some(4205000.0),
            latitude: located.then_some(37.99),
            longitude: located.then_some(23.73),
        }
    }

    #[test]
    fn test_checksum_covers_both_files() {
        let a = write_pair("a", b"dbf-content", b"shp-content");
        let b = write_pair("b", b"dbf-content", b"shp-content");
        let c = write_pair("c", b"dbf-content", b"shp-changed");

        let checksum_a = compute_pair_checksum(&a).unwrap();
        assert_eq!(checksum_a.len(), 64);
        assert_eq!(checksum_a, compute_pair_checksum(&b).unwrap());
        assert_ne!(checksum_a, compute_pair_checksum(&c).unwrap());
    }

    #[test]
    fn test_checksum_missing_file() {
        let paths = ShapefilePaths::from_base("/nonexistent/Floods_GR");
        assert!(compute_pair_checksum(&paths).is_err());
    }

    #[test]
    fn test_apply_database_overrides() {
        let mut config = DatabaseConfig::default();
        let args = DatabaseArgs {
            host: Some("db.internal".into()),
            port: Some(6432),
            ssl: Some("require".into()),
            ..Default::default()
        };
        apply_database_overrides(&mut config, &args);

        assert_eq!(config.host, "db.internal");
        assert_eq!(config.port, 6432);
        assert_eq!(config.ssl_mode, SslMode::Require);
        assert_eq!(config.user, "postgres");
    }

    #[test]
    fn test_invalid_ssl_override_is_ignored() {
        let mut config = DatabaseConfig::default();
        let args = DatabaseArgs {
            ssl: Some("sometimes".into()),
            ..Default::default()
        };
        apply_database_overrides(&mut config, &args);
        assert_eq!(config.ssl_mode, SslMode::Disable);
    }

    #[tokio::test]
    async fn test_stream_records_skips_unlocated() {
        let layout = TableLayout::from_config("floods", "floods", &Config::from_preset("floods-gr").unwrap());
        let records = vec![record(1, true), record(2, false), record(3, true)];
        let (tx, mut rx) = mpsc::channel(4);
        let mut report = ImportReport::new("test");

        let sent = stream_records(&records, &layout, tx, &mut report).await;
        assert_eq!(sent, 2);
        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.issues[0].record, Some(2));

        let chunk = rx.recv().await.unwrap();
        assert_eq!(chunk.rows, 2);
        let text = String::from_utf8(chunk.data.to_vec()).unwrap();
        assert!(text.starts_with("1|"));
        assert!(text.contains("\n3|"));
        assert!(rx.recv().await.is_none());
    }
}
