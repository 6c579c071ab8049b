//! Point d'entrée CLI pour floods-pg

use anyhow::Result;
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::{fmt, EnvFilter};

// Charger .env au démarrage
fn load_env() {
    if dotenvy::dotenv().is_err() {
        // Essayer depuis le répertoire du binaire
        if let Ok(exe) = std::env::current_exe() {
            if let Some(dir) = exe.parent() {
                let _ = dotenvy::from_path(dir.join(".env"));
            }
        }
    }
}

mod cli;

use cli::{Commands, ImportArgs, UploadArgs};

/// Importer les inondations historiques de Grèce vers PostGIS ou GeoJSON
#[derive(Parser)]
#[command(name = "floods-pg")]
#[command(author, version)]
#[command(about = "Importer le shapefile des inondations de Grèce vers PostGIS (défaut) ou GeoJSON")]
#[command(long_about = "Lit une paire SHP/DBF en grille grecque (EPSG:2100), reprojette en WGS84 et importe dans PostGIS.\n\nPar défaut, importe vers PostGIS. Utilisez 'to-geojson' pour exporter en GeoJSON et 'upload' pour copier la table vers une base distante.")]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    /// Augmenter la verbosité (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Mode silencieux
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Sous-commande (défaut: import vers PostGIS)
    #[command(subcommand)]
    command: Option<Commands>,

    /// Arguments pour l'import PostGIS (commande par défaut)
    #[command(flatten)]
    import: Option<ImportArgs>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Charger .env avant tout
    load_env();

    let cli = Cli::parse();

    init_logging(cli.verbose, cli.quiet);

    match cli.command {
        Some(Commands::ToGeojson {
            path,
            output,
            config,
            encoding,
        }) => {
            info!(path = %path.display(), output = %output.display(), "Export vers GeoJSON");
            cli::cmd_to_geojson(&path, &output, &config, &encoding).await?;
        }
        Some(Commands::Upload {
            schema,
            table,
            remote_schema,
            remote_table,
            batch_size,
            config,
            db,
        }) => {
            info!(schema = %schema, table = %table, batch_size, "Upload vers la base distante");
            cli::cmd_upload(UploadArgs {
                schema,
                table,
                remote_schema,
                remote_table,
                batch_size,
                config,
                db,
            })
            .await?;
        }
        None => {
            let Some(args) = cli.import else {
                anyhow::bail!("Missing --path. Run with --help for usage.");
            };
            info!(path = %args.path.display(), schema = %args.schema, "Import vers PostGIS");
            cli::cmd_import(args).await?;
        }
    }

    Ok(())
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => Level::WARN,
        (_, 0) => Level::INFO,
        (_, 1) => Level::DEBUG,
        (_, _) => Level::TRACE,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .init();
}
