use anyhow::{Context, Result};
use clap::Parser;
use std::env;

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: String,
    pub database_url: String,
    pub url_secret: String,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Collaborative project-sharing API")]
pub struct Args {
    /// Host to bind to (overrides TRACKROOM_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides TRACKROOM_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where blobs are stored (overrides TRACKROOM_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Database URL (overrides TRACKROOM_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Secret for signing download URLs (overrides TRACKROOM_URL_SECRET)
    #[arg(long)]
    pub url_secret: Option<String>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        // Parse CLI once
        let args = Args::parse();

        // --- Environment fallback ---
        let env_host = env::var("TRACKROOM_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = match env::var("TRACKROOM_PORT") {
            Ok(value) => value
                .parse::<u16>()
                .with_context(|| format!("parsing TRACKROOM_PORT value `{}`", value))?,
            Err(env::VarError::NotPresent) => 3000,
            Err(err) => return Err(err).context("reading TRACKROOM_PORT"),
        };
        let env_storage =
            env::var("TRACKROOM_STORAGE_DIR").unwrap_or_else(|_| "./data/blobs".into());
        let env_db = env::var("TRACKROOM_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./data/meta/trackroom.db".into());
        let env_secret =
            env::var("TRACKROOM_URL_SECRET").unwrap_or_else(|_| "dev-only-secret".into());

        // --- Merge ---
        let cfg = Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            storage_dir: args.storage_dir.unwrap_or(env_storage),
            database_url: args.database_url.unwrap_or(env_db),
            url_secret: args.url_secret.unwrap_or(env_secret),
        };

        Ok((cfg, args.migrate))
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
