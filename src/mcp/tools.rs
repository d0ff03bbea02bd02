// MCP tool handlers

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::indexer::{clean_project, IndexingCoordinator};
use crate::model::ElementKind;
use crate::query::QueryEngine;
use crate::store::{SemanticFilters, StructuralFilters};

fn text_result(text: String) -> Value {
    json!({
        "content": [{
            "type": "text",
            "text": text
        }]
    })
}

fn kind_arg(args: &HashMap<String, Value>) -> Result<Option<ElementKind>> {
    match args.get("kind").and_then(|v| v.as_str()) {
        Some(kind) => Ok(Some(ElementKind::from_str(kind)?)),
        None => Ok(None),
    }
}

/// Run a full indexing pass and report statistics
pub async fn index_project(
    coordinator: &Arc<IndexingCoordinator>,
    args: &HashMap<String, Value>,
) -> Result<Value> {
    let rebuild = args.get("rebuild").and_then(|v| v.as_bool()).unwrap_or(false);

    let cancel = CancellationToken::new();
    let report = coordinator.index_project(rebuild, &cancel).await?;

    let mut lines = vec![
        format!("Indexed {} files in {} ms", report.files_indexed, report.duration_ms),
        format!(
            "Elements: {}, chunks embedded: {}, batches failed: {}",
            report.elements_indexed, report.chunks_embedded, report.batches_failed
        ),
    ];
    if !report.files_skipped.is_empty() {
        lines.push(format!("Skipped {} files:", report.files_skipped.len()));
        for skipped in report.files_skipped.iter().take(20) {
            lines.push(format!("  {} ({})", skipped.path, skipped.reason));
        }
    }

    Ok(text_result(lines.join("\n")))
}

/// Semantic search over project content
pub async fn search_semantic(engine: &QueryEngine, args: &HashMap<String, Value>) -> Result<Value> {
    let query = args
        .get("query")
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow::anyhow!("Missing query"))?;
    let threshold = args
        .get("threshold")
        .and_then(|v| v.as_f64())
        .unwrap_or(0.3) as f32;
    let limit = args.get("limit").and_then(|v| v.as_u64()).unwrap_or(10) as usize;

    let filters = SemanticFilters {
        kind: kind_arg(args)?,
        language: args
            .get("language")
            .and_then(|v| v.as_str())
            .map(str::to_string),
        path_prefix: args
            .get("path_prefix")
            .and_then(|v| v.as_str())
            .map(str::to_string),
    };

    let results = engine.search_semantic(query, threshold, limit, &filters).await?;

    if results.is_empty() {
        return Ok(text_result(format!("No results for '{query}'")));
    }

    let mut lines = vec![format!("Found {} results for '{}':", results.len(), query)];
    for result in &results {
        let m = &result.metadata;
        lines.push(format!(
            "  {:.3}  {}:{}-{}  {} ({})",
            result.similarity,
            m.file_path,
            m.start_line,
            m.end_line,
            m.name,
            m.kind.as_str(),
        ));
        let snippet: String = result.chunk_text.chars().take(160).collect();
        if !snippet.trim().is_empty() {
            lines.push(format!("        {}", snippet.replace('\n', " ")));
        }
    }

    Ok(text_result(lines.join("\n")))
}

/// Structural search over element metadata
pub async fn search_structural(
    engine: &QueryEngine,
    args: &HashMap<String, Value>,
) -> Result<Value> {
    let pattern = args
        .get("pattern")
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow::anyhow!("Missing pattern"))?;
    let limit = args.get("limit").and_then(|v| v.as_u64()).unwrap_or(25) as usize;

    let filters = StructuralFilters {
        kind: kind_arg(args)?,
        language: args
            .get("language")
            .and_then(|v| v.as_str())
            .map(str::to_string),
        file: args.get("file").and_then(|v| v.as_str()).map(str::to_string),
    };

    let results = engine.search_structural(pattern, &filters, limit)?;

    if results.is_empty() {
        return Ok(text_result(format!("No elements match '{pattern}'")));
    }

    let mut lines = vec![format!("Found {} elements matching '{}':", results.len(), pattern)];
    for element in &results {
        lines.push(format!(
            "  {}:{} - {} ({})",
            element.file_path,
            element.start_line,
            element.name,
            element.kind.as_str(),
        ));
    }

    Ok(text_result(lines.join("\n")))
}

/// Elements of a file plus importers/importees
pub async fn get_context_for_file(
    engine: &QueryEngine,
    args: &HashMap<String, Value>,
) -> Result<Value> {
    let file_path = args
        .get("file_path")
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow::anyhow!("Missing file_path"))?;
    let radius = args.get("radius").and_then(|v| v.as_u64()).unwrap_or(1) as usize;

    let context = engine.context_for_file(file_path, radius)?;

    if context.elements.is_empty() {
        return Ok(text_result(format!("File {file_path} not found in index")));
    }

    let mut lines = vec![format!("{}: {} elements", context.file_path, context.elements.len())];
    for element in &context.elements {
        lines.push(format!(
            "  {}:{}-{} {} ({})",
            element.file_path,
            element.start_line,
            element.end_line,
            element.name,
            element.kind.as_str(),
        ));
    }
    if !context.importees.is_empty() {
        lines.push(format!("Imports: {}", context.importees.join(", ")));
    }
    if !context.related_files.is_empty() {
        lines.push(format!("Imported by: {}", context.related_files.join(", ")));
    }

    Ok(text_result(lines.join("\n")))
}

/// Directory tree with per-file element counts
pub async fn get_project_structure(engine: &QueryEngine) -> Result<Value> {
    let structure = engine.project_structure()?;
    Ok(text_result(serde_json::to_string_pretty(&structure)?))
}

/// Import/export edges plus dependency manifests
pub async fn get_dependencies(engine: &QueryEngine) -> Result<Value> {
    let report = engine.dependencies()?;

    let mut lines = vec![format!("{} dependency edges", report.edges.len())];
    for edge in &report.edges {
        lines.push(format!("  {} {} {}", edge.file_path, edge.kind, edge.name));
    }
    if !report.manifest_files.is_empty() {
        lines.push(format!("Manifest files ({}):", report.manifest_files.len()));
        for manifest in &report.manifest_files {
            lines.push(format!("  {manifest}"));
        }
    }

    Ok(text_result(lines.join("\n")))
}

/// Remove persisted index state (dry-run by default)
pub async fn clean(
    coordinator: &Arc<IndexingCoordinator>,
    args: &HashMap<String, Value>,
) -> Result<Value> {
    let dry_run = args.get("dry_run").and_then(|v| v.as_bool()).unwrap_or(true);

    let report = clean_project(coordinator.root(), dry_run)?;
    let text = if report.removed {
        format!(
            "Removed {} ({} elements, {} vector records)",
            report.state_dir, report.elements, report.vector_records
        )
    } else if dry_run {
        format!(
            "Would remove {} ({} elements, {} vector records)",
            report.state_dir, report.elements, report.vector_records
        )
    } else {
        format!("No index state at {}", report.state_dir)
    };

    Ok(text_result(text))
}

/// Index statistics
pub async fn stats(engine: &QueryEngine) -> Result<Value> {
    let stats = engine.statistics()?;

    let mut lines = vec![
        format!("Elements: {}", stats.total_elements),
        format!("Files: {}", stats.file_count),
    ];
    if !stats.by_kind.is_empty() {
        let mut kinds: Vec<(&String, &u64)> = stats.by_kind.iter().collect();
        kinds.sort_by(|a, b| b.1.cmp(a.1));
        lines.push("By kind:".to_string());
        for (kind, count) in kinds {
            lines.push(format!("  {kind}: {count}"));
        }
    }
    if !stats.by_language.is_empty() {
        let mut languages: Vec<(&String, &u64)> = stats.by_language.iter().collect();
        languages.sort_by(|a, b| b.1.cmp(a.1));
        lines.push("By language:".to_string());
        for (language, count) in languages {
            lines.push(format!("  {language}: {count}"));
        }
    }

    Ok(text_result(lines.join("\n")))
}
