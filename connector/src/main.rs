use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;

/// Publishes ThreatConnect indicators as a Carbon Black Response threat feed.
#[derive(Debug, Parser)]
#[command(version)]
struct Cli {
  /// Location of the config file
  #[arg(long = "config-file", value_name = "PATH")]
  config_file: PathBuf,
}

fn main() -> anyhow::Result<()> {
  let cli = Cli::parse();
  connector::run(&cli.config_file)
    .with_context(|| format!("run connector with {}", cli.config_file.display()))
}
