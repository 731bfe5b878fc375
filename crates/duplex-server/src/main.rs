use std::env;

use duplex_server::config::loader::load_config;
use duplex_server::ReconcilerBuilder;

/// How the configuration path was determined.
#[derive(Debug, Clone, Copy)]
enum ConfigSource {
    /// From --config CLI argument
    CliArgument,
    /// From DUPLEX_CONFIG environment variable
    EnvironmentVariable,
    /// Default path (duplex.toml)
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CliArgument => write!(f, "CLI argument (--config)"),
            Self::EnvironmentVariable => write!(f, "environment variable (DUPLEX_CONFIG)"),
            Self::Default => write!(f, "default"),
        }
    }
}

#[tokio::main]
async fn main() {
    // Load .env file if present (before anything else)
    if let Err(e) = dotenvy::dotenv() {
        // A missing .env is fine
        if !matches!(e, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound)
        {
            eprintln!("Warning: Failed to load .env file: {e}");
        }
    }

    let (config_path, source) = resolve_config_path();

    let cfg = match load_config(Some(&config_path)) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(2);
        }
    };

    duplex_server::init_tracing(&cfg.logging);

    tracing::info!(
        path = %config_path,
        source = %source,
        clusters = cfg.clusters.len(),
        "Configuration loaded"
    );

    let reconciler = match ReconcilerBuilder::new().with_config(cfg).build().await {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Reconciler initialization failed: {e}");
            std::process::exit(2);
        }
    };

    if let Err(err) = reconciler.run().await {
        tracing::error!(error = %err, "Reconciler stopped with an error");
        std::process::exit(1);
    }
}

/// Resolve the configuration file path.
///
/// Priority order:
/// 1. CLI argument: --config <path>
/// 2. Environment variable: DUPLEX_CONFIG
/// 3. Default: duplex.toml
fn resolve_config_path() -> (String, ConfigSource) {
    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            if let Some(path) = args.next() {
                return (path, ConfigSource::CliArgument);
            }
        }
    }

    if let Ok(path) = env::var("DUPLEX_CONFIG") {
        if !path.is_empty() {
            return (path, ConfigSource::EnvironmentVariable);
        }
    }

    ("duplex.toml".to_string(), ConfigSource::Default)
}
