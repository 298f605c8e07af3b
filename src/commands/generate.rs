//! Generate fixture command implementation.
//!
//! Writes a synthetic BBS fixture that `--fixture-file` can serve.

use bbs_discovery::fixture::generate_fixture;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fs;
use std::path::PathBuf;
use tracing::debug;

/// Generates a synthetic fixture JSON file for local runs and tests.
pub fn command_generate_fixture(
    output: PathBuf,
    apps: usize,
    instances_per_app: usize,
    seed: Option<u64>,
) -> anyhow::Result<()> {
    debug!(
        "Generating fixture: apps={}, instances_per_app={}, seed={:?}, output={}",
        apps,
        instances_per_app,
        seed,
        output.display()
    );

    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let fixture = generate_fixture(&mut rng, apps, instances_per_app);

    let json_content = serde_json::to_string_pretty(&fixture)?;
    fs::write(&output, &json_content)?;

    println!(
        "✅ Generated fixture: {} desired and {} actual LRPs in {}",
        fixture.desired_lrps.len(),
        fixture.actual_lrps.len(),
        output.display()
    );

    Ok(())
}
