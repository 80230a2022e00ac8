//! `procmem init`: write a default config file.

use procmem_config::AppConfig;
use std::path::Path;

pub async fn run(path: Option<&Path>, force: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = path.map(Path::to_path_buf).unwrap_or_else(AppConfig::config_path);

    if config_path.exists() && !force {
        println!("⚠️  Config already exists at: {}", config_path.display());
        println!("   Re-run with --force to overwrite it.");
        return Ok(());
    }

    if let Some(dir) = config_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::write(&config_path, AppConfig::default_toml())?;
    println!("✅ Created config at: {}", config_path.display());
    println!("\n📝 Next steps:");
    println!("   1. Set PROCMEM_API_KEY (or provider.api_key) for learn/consolidate");
    println!("   2. Seed procedures: procmem memory add --title ... --content ...");
    println!("   3. Build a context: procmem context build --task ... --domain-model model.json");

    Ok(())
}
