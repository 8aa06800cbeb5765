//! `toolbridge tools`: List discovered tools.

use std::path::Path;
use toolbridge_tools::ManifestLoader;

use super::{CommandResult, load_config};

pub async fn run(explicit: Option<&Path>) -> CommandResult {
    let config = load_config(explicit)?;
    let loader = ManifestLoader::from_config(&config.tools)?;

    let manifest = loader
        .load_with_retry(config.tools.discovery_retries, std::time::Duration::from_secs(1))
        .await
        .map_err(|e| format!("Tool discovery at {} failed: {e}", loader.discovery_url()))?;

    println!("🧰 {} tool(s) at {}\n", manifest.len(), loader.discovery_url());
    for tool in manifest.descriptors() {
        println!("  {:<28} {:<5} {}", tool.name, tool.method, tool.endpoint);
        if !tool.description.is_empty() {
            println!("  {:<28} {}", "", tool.description);
        }
    }
    println!();

    Ok(())
}
