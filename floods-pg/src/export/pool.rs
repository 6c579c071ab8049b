//! Pool de connexions PostgreSQL

use anyhow::{Context, Result};
use deadpool_postgres::{Config, Pool, PoolConfig, Runtime, Timeouts};
use std::time::Duration;
use tokio_postgres::NoTls;
use tokio_postgres_rustls::MakeRustlsConnect;
use tracing::debug;

/// Mode SSL pour la connexion PostgreSQL
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SslMode {
    /// Pas de SSL (défaut)
    #[default]
    Disable,
    /// SSL préféré mais non requis
    Prefer,
    /// SSL requis
    Require,
}

impl std::str::FromStr for SslMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "disable" | "off" | "false" | "no" => Ok(SslMode::Disable),
            "prefer" => Ok(SslMode::Prefer),
            "require" | "on" | "true" | "yes" => Ok(SslMode::Require),
            _ => Err(format!("Invalid SSL mode: {}. Use: disable, prefer, require", s)),
        }
    }
}

/// Configuration de la base de données
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub user: String,
    pub password: Option<String>,
    pub pool_size: usize,
    pub ssl_mode: SslMode,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 5432,
            dbname: "floods".into(),
            user: "postgres".into(),
            password: None,
            pool_size: 4,
            ssl_mode: SslMode::Disable,
        }
    }
}

impl DatabaseConfig {
    /// Charge la configuration depuis les variables d'environnement
    pub fn from_env() -> Self {
        Self::from_env_prefixed("")
    }

    /// Même lecture que [`from_env`](Self::from_env), clés préfixées
    /// (`REMOTE_PGHOST`, `REMOTE_PGPORT`...)
    pub fn from_env_prefixed(prefix: &str) -> Self {
        let var = |key: &str| std::env::var(format!("{prefix}{key}")).ok();
        let defaults = Self::default();

        Self {
            host: var("PGHOST").unwrap_or(defaults.host),
            port: var("PGPORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            dbname: var("PGDATABASE").unwrap_or(defaults.dbname),
            user: var("PGUSER").unwrap_or(defaults.user),
            password: var("PGPASSWORD"),
            pool_size: var("POOL_SIZE")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.pool_size),
            ssl_mode: var("PGSSLMODE")
                .and_then(|s| s.parse().ok())
                .unwrap_or_default(),
        }
    }

    /// Rendu sans mot de passe, pour les logs
    pub fn describe(&self) -> String {
        format!(
            "{}@{}:{}/{} (SSL: {:?})",
            self.user, self.host, self.port, self.dbname, self.ssl_mode
        )
    }
}

/// Crée la configuration TLS pour rustls
fn make_tls_connector() -> MakeRustlsConnect {
    let root_store =
        rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let config = rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    MakeRustlsConnect::new(config)
}

/// Crée un pool de connexions
pub async fn create_pool(config: &DatabaseConfig) -> Result<Pool> {
    let mut cfg = Config::new();
    cfg.host = Some(config.host.clone());
    cfg.port = Some(config.port);
    cfg.dbname = Some(config.dbname.clone());
    cfg.user = Some(config.user.clone());
    cfg.password = config.password.clone();

    cfg.pool = Some(PoolConfig {
        max_size: config.pool_size,
        timeouts: Timeouts {
            wait: Some(Duration::from_secs(30)),
            create: Some(Duration::from_secs(10)),
            recycle: Some(Duration::from_secs(30)),
        },
        ..Default::default()
    });

    debug!(database = %config.describe(), "Creating pool");

    match config.ssl_mode {
        SslMode::Disable => cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .context("Failed to create database pool"),
        SslMode::Prefer | SslMode::Require => cfg
            .create_pool(Some(Runtime::Tokio1), make_tls_connector())
            .context("Failed to create database pool with TLS"),
    }
}

/// Teste la connexion à la base
pub async fn test_connection(pool: &Pool) -> Result<()> {
    let client = pool
        .get()
        .await
        .context("Failed to get connection from pool")?;
    client
        .execute("SELECT 1", &[])
        .await
        .context("Connection test failed")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ssl_mode_from_str() {
        assert_eq!("require".parse::<SslMode>(), Ok(SslMode::Require));
        assert_eq!("ON".parse::<SslMode>(), Ok(SslMode::Require));
        assert_eq!("prefer".parse::<SslMode>(), Ok(SslMode::Prefer));
        assert_eq!("no".parse::<SslMode>(), Ok(SslMode::Disable));
        assert!("verify-full".parse::<SslMode>().is_err());
    }

    #[test]
    fn test_from_env_prefixed() {
        // Préfixe propre au test pour ne pas interférer avec l'environnement
        let prefix = "FLOODS_POOL_TEST_";
        std::env::set_var(format!("{prefix}PGHOST"), "db.example.org");
        std::env::set_var(format!("{prefix}PGPORT"), "6543");
        std::env::set_var(format!("{prefix}PGSSLMODE"), "require");
        std::env::set_var(format!("{prefix}POOL_SIZE"), "not-a-number");

        let config = DatabaseConfig::from_env_prefixed(prefix);
        assert_eq!(config.host, "db.example.org");
        assert_eq!(config.port, 6543);
        assert_eq!(config.ssl_mode, SslMode::Require);
        assert_eq!(config.pool_size, 4);
        assert_eq!(config.dbname, "floods");
        assert!(config.password.is_none());
    }

    #[test]
    fn test_describe_hides_password() {
        let config = DatabaseConfig {
            password: Some("secret".into()),
            ..Default::default()
        };
        let text = config.describe();
        assert!(text.contains("postgres@localhost:5432/floods"));
        assert!(!text.contains("secret"));
    }
}
