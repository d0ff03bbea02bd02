use anyhow::Result;

use crate::query::QueryEngine;

/// Print import/export edges and dependency manifests
pub async fn show_dependencies(project: String, json: bool) -> Result<()> {
    let coordinator = super::open_coordinator(&project)?;
    let engine = QueryEngine::for_coordinator(&coordinator);

    let report = engine.dependencies()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("{} dependency edges", report.edges.len());
    for edge in &report.edges {
        println!("  {} {} {}", edge.file_path, edge.kind, edge.name);
    }
    if !report.manifest_files.is_empty() {
        println!("Manifest files ({}):", report.manifest_files.len());
        for manifest in &report.manifest_files {
            println!("  {}", manifest);
        }
    }

    Ok(())
}
