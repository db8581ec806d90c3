//! `tpforge doctor`: Diagnose system health.

use tpforge_config::AppConfig;
use tpforge_core::section::SectionName;
use tpforge_pipeline::bootstrap;
use tpforge_pipeline::TemplateStore;
use tpforge_pipeline::template::placeholders;
use tpforge_providers::build_from_config;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    println!("🩺 tpforge Doctor - System Diagnostics");
    println!("======================================\n");

    let mut issues = 0;

    let config_path = AppConfig::config_dir().join("config.toml");
    if !config_path.exists() {
        println!("  ⚠️  No config file - using defaults (run `tpforge init`)");
        issues += 1;
    }
    let config = match AppConfig::load() {
        Ok(config) => {
            println!("  ✅ Config valid");
            config
        }
        Err(e) => {
            println!("  ❌ Config invalid: {e}");
            println!("\n  ⚠️  Fix the config before running other checks.");
            return Ok(());
        }
    };

    // Templates
    let templates = bootstrap::build_templates(&config);
    let mut template_errors = 0;
    for name in SectionName::ALL {
        let result = templates
            .load(name)
            .and_then(|source| placeholders(name.as_str(), &source));
        if let Err(e) = result {
            println!("  ❌ Template {name}: {e}");
            template_errors += 1;
        }
    }
    if template_errors == 0 {
        println!("  ✅ Templates ({}) parse", templates.name());
    }
    issues += template_errors;

    // Knowledge base
    let router = build_from_config(&config);
    match bootstrap::build_retriever(&config, &router).await {
        Ok(kb) => {
            let stats = kb.stats().await;
            if stats.is_empty() {
                println!("  ⚠️  Knowledge base is empty: {}", config.chunks_dir().display());
                issues += 1;
            } else {
                let summary: Vec<String> = stats.iter().map(|(j, n)| format!("{j}={n}")).collect();
                println!("  ✅ Knowledge base: {} ({:?} mode)", summary.join(", "), kb.mode());
            }
        }
        Err(e) => {
            println!("  ❌ Knowledge base: {e}");
            issues += 1;
        }
    }

    // Provider
    match router.require(None) {
        Ok(provider) => match provider.health_check().await {
            Ok(true) => println!("  ✅ Provider {} reachable", provider.name()),
            Ok(false) => {
                println!("  ⚠️  Provider {} did not answer", provider.name());
                issues += 1;
            }
            Err(e) => {
                println!("  ❌ Provider {}: {e}", provider.name());
                issues += 1;
            }
        },
        Err(e) => {
            println!("  ❌ {e}");
            issues += 1;
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
