use anyhow::Result;

use crate::config::Config;

/// Show index statistics for a project
pub async fn show_stats(project: String, verbose: bool) -> Result<()> {
    let coordinator = super::open_coordinator(&project)?;

    println!("codectx statistics v{}", env!("CARGO_PKG_VERSION"));
    println!("Project: {}", project);

    let stats = coordinator.structured().statistics()?;
    println!("\nIndex statistics:");
    println!("  Elements: {}", stats.total_elements);
    println!("  Files: {}", stats.file_count);
    println!("  Vector records: {}", coordinator.vectors().len());

    let db_path = Config::structured_db_path(coordinator.root());
    if let Ok(meta) = std::fs::metadata(&db_path) {
        println!("  Store size: {:.2} MB", meta.len() as f64 / (1024.0 * 1024.0));
    }

    if let Some(manifest) = coordinator.structured().load_manifest()? {
        println!("  Last updated: {}", manifest.last_updated.to_rfc3339());
    }

    if verbose {
        let mut kinds: Vec<(&String, &u64)> = stats.by_kind.iter().collect();
        kinds.sort_by(|a, b| b.1.cmp(a.1));
        if !kinds.is_empty() {
            println!("\n  Elements by kind:");
            for (kind, count) in kinds {
                println!("    {}: {}", kind, count);
            }
        }

        let mut languages: Vec<(&String, &u64)> = stats.by_language.iter().collect();
        languages.sort_by(|a, b| b.1.cmp(a.1));
        if !languages.is_empty() {
            println!("\n  Elements by language:");
            for (language, count) in languages {
                println!("    {}: {}", language, count);
            }
        }
    }

    Ok(())
}
