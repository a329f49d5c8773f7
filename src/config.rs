use anyhow::{Context, Result};
use clap::Parser;
use std::{env, str::FromStr};

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: String,
    pub database_url: String,
    pub admin_token: Option<String>,
    pub page_size: usize,
    pub max_upload_bytes: usize,
    pub stale_after_hours: i64,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Folder-oriented file manager over a flat object store")]
pub struct Args {
    /// Host to bind to (overrides FOLDER_STORE_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides FOLDER_STORE_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where object payloads are stored (overrides FOLDER_STORE_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Database URL (overrides FOLDER_STORE_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Bearer token required for mutations (overrides FOLDER_STORE_ADMIN_TOKEN)
    #[arg(long)]
    pub admin_token: Option<String>,

    /// Keys requested per list call, 1-1000 (overrides FOLDER_STORE_PAGE_SIZE)
    #[arg(long)]
    pub page_size: Option<usize>,

    /// Largest accepted upload body in bytes (overrides FOLDER_STORE_MAX_UPLOAD_BYTES)
    #[arg(long)]
    pub max_upload_bytes: Option<usize>,

    /// Hours before the size counter is reconciled again (overrides FOLDER_STORE_STALE_AFTER_HOURS)
    #[arg(long)]
    pub stale_after_hours: Option<i64>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        // Parse CLI once
        let args = Args::parse();
        let migrate = args.migrate;
        Ok((Self::merge(args)?, migrate))
    }

    /// CLI values win over environment values, which win over defaults.
    pub fn merge(args: Args) -> Result<Self> {
        // --- Environment fallback ---
        let env_host = env::var("FOLDER_STORE_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = env_parse("FOLDER_STORE_PORT", 3000u16)?;
        let env_storage =
            env::var("FOLDER_STORE_STORAGE_DIR").unwrap_or_else(|_| "./data/objects".into());
        let env_db = env::var("FOLDER_STORE_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./data/meta/folder_store.db".into());
        let env_token = env::var("FOLDER_STORE_ADMIN_TOKEN").ok();
        let env_page_size = env_parse("FOLDER_STORE_PAGE_SIZE", 1000usize)?;
        let env_max_upload = env_parse("FOLDER_STORE_MAX_UPLOAD_BYTES", 100 * 1024 * 1024usize)?;
        let env_stale = env_parse("FOLDER_STORE_STALE_AFTER_HOURS", 24i64)?;

        // --- Merge ---
        let cfg = Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            storage_dir: args.storage_dir.unwrap_or(env_storage),
            database_url: args.database_url.unwrap_or(env_db),
            admin_token: args.admin_token.or(env_token).filter(|t| !t.is_empty()),
            page_size: args.page_size.unwrap_or(env_page_size).clamp(1, 1000),
            max_upload_bytes: args.max_upload_bytes.unwrap_or(env_max_upload),
            stale_after_hours: args.stale_after_hours.unwrap_or(env_stale).max(1),
        };

        Ok(cfg)
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Read `name` from the environment, falling back to `default` when unset.
fn env_parse<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(value) => value
            .parse::<T>()
            .with_context(|| format!("parsing {} value `{}`", name, value)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {}", name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_values_override_and_are_clamped() {
        let cfg = AppConfig::merge(Args {
            port: Some(8080),
            page_size: Some(5000),
            admin_token: Some(String::new()),
            stale_after_hours: Some(0),
            ..Args::default()
        })
        .unwrap();
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.page_size, 1000);
        assert_eq!(cfg.stale_after_hours, 1);
        assert!(cfg.admin_token.is_none());
    }

    #[test]
    fn args_parse_from_command_line() {
        let args = Args::parse_from(["folder-store", "--port", "9000", "--migrate"]);
        assert_eq!(args.port, Some(9000));
        assert!(args.migrate);
    }
}
