use std::path::PathBuf;
use std::str::FromStr;

use clap::{Args as ClapArgs, Parser, Subcommand};
use diagkit_core::listener::{parse_keywords, EnableOptions, EventLevel};

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Jsonl,
}

#[derive(Parser, Debug)]
#[command(name = "diagkit", version, about = "Stream trace events from a diagnostics endpoint")]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file to use instead of the default search path.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Enable providers and print their events until Ctrl-C or stream end.
    Listen(ListenArgs),
    /// Print the resolved configuration as TOML.
    Config,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct ListenArgs {
    /// NAME[:KEYWORDS[:LEVEL]]; keywords as 0x-hex or decimal, level as a
    /// name (error, warning, info, verbose, ...) or 0-5.
    /// Can be specified multiple times.
    #[arg(long = "provider", required = true, action = clap::ArgAction::Append)]
    pub providers: Vec<ProviderSpec>,

    /// Diagnostics endpoint (`host:port` or a socket path); overrides config.
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Target process id. Defaults to this process.
    #[arg(long)]
    pub pid: Option<u32>,

    /// Request a rundown when sessions stop.
    #[arg(long)]
    pub rundown: bool,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

/// One `--provider` value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderSpec {
    pub name: String,
    pub options: EnableOptions,
}

impl FromStr for ProviderSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, ':');
        let name = parts.next().unwrap_or_default().trim();
        if name.is_empty() {
            return Err("provider name must not be empty".to_string());
        }

        let mut options = EnableOptions::default();
        if let Some(kw) = parts.next().map(str::trim).filter(|s| !s.is_empty()) {
            options.keywords = parse_keywords(kw)?;
        }
        if let Some(level) = parts.next().map(str::trim).filter(|s| !s.is_empty()) {
            options.level = level.parse::<EventLevel>()?;
        }

        Ok(Self {
            name: name.to_string(),
            options,
        })
    }
}
