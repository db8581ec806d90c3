//! `tpforge regenerate`: Regenerate one section of a stored policy.

use tpforge_config::AppConfig;
use tpforge_core::section::SectionName;
use tpforge_pipeline::bootstrap;

pub async fn run(policy_id: i64, section: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let name: SectionName = section.parse()?;

    let service = bootstrap::build_service(&config).await?;
    eprintln!("  Regenerating {name} for policy {policy_id}...");
    let policy = service.regenerate_section(policy_id, name).await?;

    let entry = policy.sections.get(name);
    println!("Policy {} - version {}", policy.id, policy.version);
    println!("Section: {} ({})", name.title(), entry.status);
    if policy.failed_sections.contains(&name) {
        for err in policy.errors.iter().filter(|e| e.starts_with(name.as_str())) {
            println!("  ❌ {err}");
        }
    } else {
        println!();
        println!("{}", entry.content);
        if !entry.citations.is_empty() {
            println!("\nSources: {}", entry.citations.join(", "));
        }
    }

    Ok(())
}
