use anyhow::{Context, Result};
use clap::Parser;
use std::{env, path::PathBuf};

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: PathBuf,
    pub credentials_file: PathBuf,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Bucket/object storage service with token auth")]
pub struct Args {
    /// Host to bind to (overrides BUCKET_STORE_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides BUCKET_STORE_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory holding one subdirectory per bucket (overrides BUCKET_STORE_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<PathBuf>,

    /// JSON file mapping client ids to secrets (overrides BUCKET_STORE_CREDENTIALS)
    #[arg(long)]
    pub credentials: Option<PathBuf>,

    /// Print the current token for CLIENT_ID and exit
    #[arg(long, value_name = "CLIENT_ID")]
    pub print_token: Option<String>,
}

impl AppConfig {
    /// Parse CLI args and the process environment into AppConfig and the
    /// optional client id whose token should be printed.
    pub fn from_env_and_args() -> Result<(Self, Option<String>)> {
        let mut args = Args::parse();
        let print_token = args.print_token.take();
        let cfg = Self::merge(args, |key| env::var(key).ok())?;
        Ok((cfg, print_token))
    }

    /// CLI values win over environment values, which win over defaults.
    fn merge(args: Args, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let env_host = lookup("BUCKET_STORE_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let env_port = match lookup("BUCKET_STORE_PORT") {
            Some(value) => value
                .parse::<u16>()
                .with_context(|| format!("parsing BUCKET_STORE_PORT value `{}`", value))?,
            None => 5020,
        };
        let env_storage = lookup("BUCKET_STORE_STORAGE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| "./data/storage".into());
        let env_credentials = lookup("BUCKET_STORE_CREDENTIALS")
            .map(PathBuf::from)
            .unwrap_or_else(|| "./auth.json".into());

        Ok(Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            storage_dir: args.storage_dir.unwrap_or(env_storage),
            credentials_file: args.credentials.unwrap_or(env_credentials),
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_set() {
        let cfg = AppConfig::merge(Args::default(), env_of(&[])).unwrap();
        assert_eq!(cfg.addr(), "0.0.0.0:5020");
        assert_eq!(cfg.storage_dir, PathBuf::from("./data/storage"));
        assert_eq!(cfg.credentials_file, PathBuf::from("./auth.json"));
    }

    #[test]
    fn args_override_environment() {
        let env = env_of(&[
            ("BUCKET_STORE_HOST", "10.0.0.1"),
            ("BUCKET_STORE_PORT", "8080"),
            ("BUCKET_STORE_STORAGE_DIR", "/srv/buckets"),
        ]);
        let args = Args {
            port: Some(9000),
            ..Args::default()
        };
        let cfg = AppConfig::merge(args, env).unwrap();
        assert_eq!(cfg.addr(), "10.0.0.1:9000");
        assert_eq!(cfg.storage_dir, PathBuf::from("/srv/buckets"));
    }

    #[test]
    fn bad_port_is_an_error() {
        let err = AppConfig::merge(Args::default(), env_of(&[("BUCKET_STORE_PORT", "http")]))
            .unwrap_err();
        assert!(err.to_string().contains("BUCKET_STORE_PORT"));
    }
}
