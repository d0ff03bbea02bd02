use anyhow::Result;

use crate::query::QueryEngine;

/// Show the indexed context around one file
pub async fn show_context(project: String, file: String, radius: usize, json: bool) -> Result<()> {
    let coordinator = super::open_coordinator(&project)?;
    let engine = QueryEngine::for_coordinator(&coordinator);

    let context = engine.context_for_file(&file, radius)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&context)?);
        return Ok(());
    }

    if context.elements.is_empty() {
        println!("File {} not found in index", file);
        return Ok(());
    }

    println!("{}: {} elements", context.file_path, context.elements.len());
    for element in &context.elements {
        println!(
            "  {}-{} {} ({})",
            element.start_line,
            element.end_line,
            element.name,
            element.kind.as_str()
        );
    }
    if !context.importees.is_empty() {
        println!("Imports: {}", context.importees.join(", "));
    }
    if !context.related_files.is_empty() {
        println!("Imported by: {}", context.related_files.join(", "));
    }

    Ok(())
}
