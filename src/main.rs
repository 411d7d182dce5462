mod cli;
mod commands;

use cli::{Cli, Commands};
use tracing_subscriber::filter::LevelFilter;

/// Routes the library's `log` records to stderr; `-v` raises the level to info, `-vv` to debug.
fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        _ => LevelFilter::DEBUG,
    };
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

pub fn run() -> anyhow::Result<()> {
    use clap::Parser;

    let cli = Cli::parse();
    init_logging(cli.verbose);
    match &cli.command {
        Commands::Refresh(args) => commands::refresh(&cli, args),
        Commands::Derive => commands::derive(&cli),
        Commands::Tables(args) => commands::tables(&cli, args),
    }
}

fn main() -> anyhow::Result<()> { run() }
