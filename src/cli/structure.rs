use anyhow::Result;

use crate::query::QueryEngine;

/// Print the project tree with per-file element counts
pub async fn show_structure(project: String) -> Result<()> {
    let coordinator = super::open_coordinator(&project)?;
    let engine = QueryEngine::for_coordinator(&coordinator);

    let structure = engine.project_structure()?;
    println!("{}", serde_json::to_string_pretty(&structure)?);

    Ok(())
}
