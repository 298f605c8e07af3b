//! Collect command implementation.
//!
//! Runs a single refresh against the configured source and prints the
//! extracted templates.

use bbs_discovery::{CacheRegistry, Collection, ConfigCollector};
use serde::Serialize;
use tracing::info;

use crate::cli::OutputFormat;
use crate::config::{configure_cache, Config};

#[derive(Debug, Serialize)]
struct CollectOutput<'a> {
    generation: u64,
    templates: &'a [bbs_discovery::ConfigTemplate],
    #[serde(skip_serializing_if = "Option::is_none")]
    errors: Option<Vec<String>>,
}

/// Refreshes once and prints the templates of the resulting snapshot.
pub async fn command_collect(config: &Config, format: OutputFormat, errors: bool) -> anyhow::Result<()> {
    let registry = CacheRegistry::new();
    let cache = configure_cache(&registry, config)?;
    cache.refresh_once().await?;

    let collector = ConfigCollector::new(cache);
    let collection = collector.collect_with_errors();
    info!(
        "Collected {} template(s), {} error(s)",
        collection.templates.len(),
        collection.errors.len()
    );

    print!("{}", render_collection(&collection, format, errors)?);
    Ok(())
}

fn render_collection(collection: &Collection, format: OutputFormat, errors: bool) -> anyhow::Result<String> {
    let output = CollectOutput {
        generation: collection.generation,
        templates: &collection.templates,
        errors: errors.then(|| collection.errors.iter().map(ToString::to_string).collect()),
    };

    Ok(match format {
        OutputFormat::Json => format!("{}\n", serde_json::to_string_pretty(&output)?),
        OutputFormat::Yaml => serde_yaml::to_string(&output)?,
    })
}
