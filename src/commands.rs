use anyhow::{bail, Context as _, Result};
use log::info;

use forest_puller::{
    config::parse_country_list,
    export_tables, select_sources, Config, Context,
};

use crate::cli::{Cli, RefreshArgs, TablesArgs};

/// Config file (or defaults), then the environment, then command-line flags.
pub fn load_config(cli: &Cli) -> Result<Config> {
    let config = match &cli.config {
        Some(path) => Config::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => Config::default(),
    };
    let mut config = config.with_env(|key| std::env::var(key).ok());
    if let Some(cache) = &cli.cache {
        config.cache_dir = Some(cache.clone());
    }
    if let Some(list) = &cli.countries {
        config.countries = parse_country_list(list);
    }
    Ok(config)
}

fn context(cli: &Cli) -> Result<Context> {
    let config = load_config(cli)?;
    Context::new(config).context("setting up the pipeline")
}

pub fn refresh(cli: &Cli, args: &RefreshArgs) -> Result<()> {
    let ctx = context(cli)?;
    let sources = select_sources(&args.source);
    if sources.is_empty() {
        bail!("unknown source '{}'", args.source);
    }
    for source in sources {
        if source.provider() == "cbm" && ctx.config.cbm_dir.is_none() {
            info!("[refresh] skipping cbm, no output directory configured");
            continue;
        }
        info!("[refresh] {}", source.name());
        source.refresh_raw(&ctx).with_context(|| format!("refreshing {}", source.name()))?;
    }
    Ok(())
}

pub fn derive(cli: &Cli) -> Result<()> {
    let ctx = context(cli)?;
    let bcef = ctx.country_bcef().context("computing BCEF")?;
    info!("[derive] bcef: {} observed rows", bcef.by_country_year.height());
    let roots = ctx.country_root_ratio().context("computing root ratios")?;
    info!("[derive] root_ratio: {} observed rows", roots.by_country_year.height());

    for iso2 in ctx.countries() {
        let country = ctx.country(iso2)?;
        let increments = country.increments_df().with_context(|| format!("increments of {iso2}"))?;
        let soef = country.soef_carbon().with_context(|| format!("SOEF carbon of {iso2}"))?;
        let faostat = country.faostat_carbon().with_context(|| format!("FAOSTAT carbon of {iso2}"))?;
        info!(
            "[derive] {iso2}: {} increment rows, {} + {} carbon rows",
            increments.height(),
            soef.height(),
            faostat.height()
        );
    }
    Ok(())
}

pub fn tables(cli: &Cli, args: &TablesArgs) -> Result<()> {
    let ctx = context(cli)?;
    let mut sources = select_sources(&args.source);
    if sources.is_empty() {
        bail!("unknown source '{}'", args.source);
    }
    if ctx.config.cbm_dir.is_none() {
        sources.retain(|s| s.provider() != "cbm");
    }
    let written = export_tables(&ctx, &sources).context("writing tables")?;
    println!("Wrote {} tables", written.len());
    Ok(())
}
