//! nodeset-lite - inspect, convert and round-trip UANodeSet documents
//!
//! Usage:
//!   nodeset-lite inspect Opc.Ua.NodeSet2.xml pumps.xml
//!   nodeset-lite convert pumps.xml --library-dir ./nodesets --to schema -o pumps.json
//!   nodeset-lite roundtrip pumps.xml --library-dir ./nodesets

mod commands;
mod library;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use nodeset_lite_core::config::BatchConfig;

#[derive(Parser, Debug)]
#[command(name = "nodeset-lite")]
#[command(about = "Convert OPC UA nodesets between XML, records and typed-library schema")]
struct Cli {
    /// YAML batch configuration
    #[arg(long, global = true, env = "NODESET_LITE_CONFIG")]
    config: Option<PathBuf>,

    /// Directory of nodeset files used to resolve missing dependencies
    #[arg(long, global = true)]
    library_dir: Option<PathBuf>,

    /// Only accept dependencies whose publication date matches exactly
    #[arg(long, global = true)]
    exact: bool,

    /// Overwrite records that already exist
    #[arg(long, global = true)]
    update_existing: bool,

    /// Dependency fetch timeout in milliseconds
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Resolve and build nodesets, then summarise each namespace
    Inspect {
        files: Vec<PathBuf>,
        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Import nodesets into records and export one namespace
    Convert {
        files: Vec<PathBuf>,
        #[arg(long, value_enum, default_value = "nodeset")]
        to: Target,
        /// Namespace to export (default: per config index into the supplied files)
        #[arg(long)]
        namespace: Option<String>,
        /// Output file (default: stdout)
        #[arg(long, short = 'o')]
        out: Option<PathBuf>,
    },

    /// Check that XML and record round trips rebuild the same graph
    Roundtrip {
        files: Vec<PathBuf>,
        #[arg(long)]
        namespace: Option<String>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Target {
    Nodeset,
    Schema,
}

impl Cli {
    fn batch_config(&self) -> Result<BatchConfig> {
        let mut config = match &self.config {
            Some(path) => BatchConfig::load(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => BatchConfig::default(),
        };
        if let Some(dir) = &self.library_dir {
            config.library_dir = Some(dir.clone());
        }
        if self.exact {
            config.exact_match_only = true;
        }
        if self.update_existing {
            config.update_existing = true;
        }
        if let Some(ms) = self.timeout_ms {
            config.fetch_timeout_ms = ms;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "nodeset_lite=info,nodeset_lite_core=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.batch_config()?;

    match cli.command {
        Command::Inspect { files, json } => commands::inspect(&config, &files, json).await,
        Command::Convert {
            files,
            to,
            namespace,
            out,
        } => commands::convert(&config, &files, to, namespace, out).await,
        Command::Roundtrip { files, namespace } => {
            let clean = commands::roundtrip(&config, &files, namespace).await?;
            if !clean {
                std::process::exit(1);
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("batch.yaml");
        std::fs::write(&path, "fetch_timeout_ms: 100\nexact_match_only: false\n").unwrap();
        let cli = Cli::parse_from([
            "nodeset-lite",
            "--config",
            path.to_str().unwrap(),
            "--exact",
            "inspect",
            "a.xml",
        ]);
        let config = cli.batch_config().unwrap();
        assert!(config.exact_match_only);
        assert_eq!(config.fetch_timeout_ms, 100);
    }

    #[test]
    fn convert_defaults_to_nodeset() {
        let cli = Cli::parse_from(["nodeset-lite", "convert", "a.xml"]);
        match cli.command {
            Command::Convert { to, out, .. } => {
                assert_eq!(to, Target::Nodeset);
                assert!(out.is_none());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
