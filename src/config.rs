use anyhow::{Context, Result};
use clap::Parser;
use std::env;

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub upload_dir: String,
    pub processed_dir: String,
    pub database_url: String,
    pub separator_cmd: String,
    pub chord_cmd: String,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Audio upload, stem separation and chord timeline service")]
pub struct Args {
    /// Host to bind to (overrides CHORDTRACK_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides CHORDTRACK_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where raw uploads are stored (overrides CHORDTRACK_UPLOAD_DIR)
    #[arg(long)]
    pub upload_dir: Option<String>,

    /// Directory where separated stems and chord artifacts are written
    /// (overrides CHORDTRACK_PROCESSED_DIR)
    #[arg(long)]
    pub processed_dir: Option<String>,

    /// Database URL (overrides CHORDTRACK_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Separation tool command (overrides CHORDTRACK_SEPARATOR_CMD)
    #[arg(long)]
    pub separator_cmd: Option<String>,

    /// Chord extraction tool command (overrides CHORDTRACK_CHORD_CMD)
    #[arg(long)]
    pub chord_cmd: Option<String>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        let args = Args::parse();
        let migrate = args.migrate;
        let cfg = Self::from_env(args)?;
        Ok((cfg, migrate))
    }

    /// Merge parsed args over the environment fallback. Split out so tests
    /// can build a config without touching the process arguments.
    pub fn from_env(args: Args) -> Result<Self> {
        let env_host = env::var("CHORDTRACK_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = match env::var("CHORDTRACK_PORT") {
            Ok(value) => value
                .parse::<u16>()
                .with_context(|| format!("parsing CHORDTRACK_PORT value `{}`", value))?,
            Err(env::VarError::NotPresent) => 3000,
            Err(err) => return Err(err).context("reading CHORDTRACK_PORT"),
        };
        let env_upload = env::var("CHORDTRACK_UPLOAD_DIR").unwrap_or_else(|_| "./data/uploads".into());
        let env_processed =
            env::var("CHORDTRACK_PROCESSED_DIR").unwrap_or_else(|_| "./data/processed".into());
        let env_db = env::var("CHORDTRACK_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./data/meta/chordtrack.db".into());
        let env_separator =
            env::var("CHORDTRACK_SEPARATOR_CMD").unwrap_or_else(|_| "./tools/separate_audio".into());
        let env_chord =
            env::var("CHORDTRACK_CHORD_CMD").unwrap_or_else(|_| "./tools/extract_chords".into());

        Ok(Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            upload_dir: args.upload_dir.unwrap_or(env_upload),
            processed_dir: args.processed_dir.unwrap_or(env_processed),
            database_url: args.database_url.unwrap_or(env_db),
            separator_cmd: args.separator_cmd.unwrap_or(env_separator),
            chord_cmd: args.chord_cmd.unwrap_or(env_chord),
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
