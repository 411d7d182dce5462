use std::path::PathBuf;

/// Forest statistics harmonization CLI (argument schema only)
#[derive(clap::Parser, Debug)]
#[command(name = "forest_puller", version, about, propagate_version = true)]
pub struct Cli {
    /// Increase output verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Cache directory, overrides FOREST_PULLER_CACHE
    #[arg(long, global = true, value_hint = clap::ValueHint::DirPath)]
    pub cache: Option<PathBuf>,

    /// JSON configuration file
    #[arg(long, global = true, value_hint = clap::ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    /// Comma-separated ISO2 codes, overrides FOREST_PULLER_COUNTRIES
    #[arg(long, global = true)]
    pub countries: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(clap::Subcommand, Debug)]
pub enum Commands {
    /// Download a provider's raw archives into the cache
    Refresh(RefreshArgs),

    /// Compute conversion factors and increments for the configured countries
    Derive,

    /// Write the aggregated cross-country tables as CSV
    Tables(TablesArgs),
}

#[derive(clap::Args, Debug)]
pub struct RefreshArgs {
    /// Source name (soef_fellings), provider (soef) or "all"
    pub source: String,
}

#[derive(clap::Args, Debug)]
pub struct TablesArgs {
    /// Restrict to a source name or provider, defaults to every source
    #[arg(default_value = "all")]
    pub source: String,
}
