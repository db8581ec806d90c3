//! `tpforge init`: First-time setup.

use tpforge_config::AppConfig;
use tpforge_pipeline::BuiltinTemplates;

const KNOWLEDGE_FOLDERS: &[&str] = &["India", "US", "global"];

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config_dir = AppConfig::config_dir();
    let config_path = config_dir.join("config.toml");

    println!("tpforge - First-Time Setup");
    println!("==========================\n");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
        println!("✅ Created config directory: {}", config_dir.display());
    } else {
        println!("  Config directory exists: {}", config_dir.display());
    }

    let templates_dir = config_dir.join("templates");
    std::fs::create_dir_all(&templates_dir)?;
    let written = BuiltinTemplates::write_to(&templates_dir)?;
    println!(
        "✅ Templates: {} written to {} (existing files kept)",
        written,
        templates_dir.display()
    );

    let knowledge_dir = config_dir.join("knowledge");
    for folder in KNOWLEDGE_FOLDERS {
        std::fs::create_dir_all(knowledge_dir.join(folder))?;
    }
    println!("✅ Knowledge directory: {}", knowledge_dir.display());
    println!("   Put regulation text files under India/, US/ or global/");

    if config_path.exists() {
        println!("\n⚠️  Config already exists at: {}", config_path.display());
        println!("   Edit it manually or delete and re-run init.\n");
    } else {
        std::fs::write(&config_path, AppConfig::default_toml())?;
        println!("✅ Created config.toml at: {}", config_path.display());
        println!("\n📝 Next steps:");
        println!("   1. Start Ollama, or set default_provider and api_key in {}", config_path.display());
        println!("   2. To use the copied templates, set generation.templates_dir = \"{}\"", templates_dir.display());
        println!("   3. Run: tpforge doctor\n");
    }

    Ok(())
}
