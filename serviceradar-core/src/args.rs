//! CLI argument parsing for the ingest core.

use std::path::PathBuf;

use clap::Parser;

/// Command-line arguments for `serviceradar-core`.
#[derive(Parser, Debug, Clone)]
#[command(about = "ServiceRadar ingest core")]
pub struct CoreArgs {
    /// Path to configuration file.
    #[arg(short, long, default_value = "serviceradar-core.json5")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long)]
    pub log_level: Option<String>,
}

impl CoreArgs {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_path_is_set() {
        let args = CoreArgs {
            config: PathBuf::from("serviceradar-core.json5"),
            log_level: None,
        };
        assert_eq!(args.config, PathBuf::from("serviceradar-core.json5"));
    }
}
