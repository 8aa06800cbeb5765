//! `toolbridge doctor`: Diagnose configuration and connectivity.

use std::path::Path;
use std::time::Duration;
use toolbridge_tools::{ManifestLoader, check_health};

use super::{CommandResult, config_path, load_config};

pub async fn run(explicit: Option<&Path>) -> CommandResult {
    println!("🩺 toolbridge doctor");
    println!("===================\n");

    let mut issues = 0;

    let path = config_path(explicit);
    if path.exists() {
        println!("  ✅ Config file found: {}", path.display());
    } else {
        println!("  ⚠️  No config file, using defaults (run `toolbridge onboard`)");
    }

    let config = match load_config(explicit) {
        Ok(config) => {
            println!("  ✅ Config valid");
            config
        }
        Err(e) => {
            println!("  ❌ {e}");
            println!("\n  ⚠️  Cannot continue without a valid config.");
            return Ok(());
        }
    };

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.tools.timeout_secs))
        .build()?;
    let health_url = config.tools.health_url();
    if check_health(&client, &health_url).await {
        println!("  ✅ Tool layer healthy: {health_url}");
    } else {
        println!("  ❌ Tool layer not healthy: {health_url}");
        issues += 1;
    }

    let loader = ManifestLoader::from_config(&config.tools)?;
    match loader.load().await {
        Ok(manifest) => println!("  ✅ Tool manifest loaded ({} tools)", manifest.len()),
        Err(e) => {
            println!("  ❌ Tool manifest: {e}");
            issues += 1;
        }
    }

    if config.retrieval.enabled {
        println!(
            "  ✅ Retrieval enabled: {}",
            config.retrieval.url.as_deref().unwrap_or_default()
        );
    } else {
        println!("  ➖ Retrieval disabled");
    }

    if !config.has_api_key() {
        println!("  ⚠️  No API key configured, set ANTHROPIC_API_KEY");
        issues += 1;
    } else {
        match toolbridge_providers::build_from_config(&config.reasoning) {
            Ok(service) => match service.health_check().await {
                Ok(true) => println!("  ✅ Reasoning service reachable ({})", service.name()),
                Ok(false) => {
                    println!("  ❌ Reasoning service rejected the API key");
                    issues += 1;
                }
                Err(e) => {
                    println!("  ❌ Reasoning service: {e}");
                    issues += 1;
                }
            },
            Err(e) => {
                println!("  ❌ {e}");
                issues += 1;
            }
        }
    }

    println!();
    if issues == 0 {
        println!("  🎉 All checks passed!");
    } else {
        println!("  ⚠️  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}
