//! `toolbridge onboard`: First-time setup.

use std::path::Path;
use toolbridge_config::AppConfig;

use super::{CommandResult, config_path};

pub async fn run(explicit: Option<&Path>) -> CommandResult {
    let path = config_path(explicit);

    println!("🔧 toolbridge: First-Time Setup");
    println!("================================\n");

    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        if !dir.exists() {
            std::fs::create_dir_all(dir)?;
            println!("✅ Created config directory: {}", dir.display());
        } else {
            println!("  Config directory exists: {}", dir.display());
        }
    }

    if path.exists() {
        println!("\n⚠️  Config already exists at: {}", path.display());
        println!("   Edit it manually or delete and re-run onboard.\n");
        return Ok(());
    }

    std::fs::write(&path, AppConfig::default_toml())?;
    println!("✅ Created config.toml at: {}", path.display());
    println!("\n📝 Next steps:");
    println!("   1. Set ANTHROPIC_API_KEY or add reasoning.api_key to {}", path.display());
    println!("   2. Point tools.base_url at your tool layer");
    println!("   3. Run: toolbridge doctor, then toolbridge chat\n");

    Ok(())
}
