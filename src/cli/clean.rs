use std::path::Path;

use anyhow::Result;

use crate::indexer::clean_project;

/// Remove persisted index state for a project
pub async fn clean(project: String, dry_run: bool) -> Result<()> {
    let report = clean_project(Path::new(&project), dry_run)?;

    if report.removed {
        println!(
            "Removed {} ({} elements, {} vector records)",
            report.state_dir, report.elements, report.vector_records
        );
    } else if dry_run && (report.elements > 0 || report.vector_records > 0) {
        println!(
            "Would remove {} ({} elements, {} vector records)",
            report.state_dir, report.elements, report.vector_records
        );
        println!("Run again with --yes to delete.");
    } else {
        println!("No index state at {}", report.state_dir);
    }

    Ok(())
}
