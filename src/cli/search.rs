use anyhow::Result;

use crate::model::ElementKind;
use crate::query::QueryEngine;
use crate::store::{SemanticFilters, StructuralFilters};

/// Query the index from the command line. Semantic by default, structural
/// with `--structural` (patterns may be globs).
#[allow(clippy::too_many_arguments)]
pub async fn run_search(
    project: String,
    query: String,
    structural: bool,
    kind: Option<String>,
    language: Option<String>,
    threshold: Option<f32>,
    limit: usize,
    json: bool,
) -> Result<()> {
    let coordinator = super::open_coordinator(&project)?;
    let engine = QueryEngine::for_coordinator(&coordinator);
    let kind = kind.map(|k| ElementKind::from_str(&k)).transpose()?;

    if structural {
        let filters = StructuralFilters {
            kind,
            language,
            file: None,
        };
        let results = engine.search_structural(&query, &filters, limit)?;

        if json {
            println!("{}", serde_json::to_string_pretty(&results)?);
            return Ok(());
        }
        if results.is_empty() {
            println!("No elements match '{}'", query);
            return Ok(());
        }
        println!("Found {} elements matching '{}':", results.len(), query);
        for element in results {
            println!(
                "  {}:{} - {} ({})",
                element.file_path,
                element.start_line,
                element.name,
                element.kind.as_str()
            );
        }
        return Ok(());
    }

    let threshold = threshold.unwrap_or(coordinator.config().query.similarity_threshold);
    let filters = SemanticFilters {
        kind,
        language,
        path_prefix: None,
    };
    let results = engine.search_semantic(&query, threshold, limit, &filters).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }
    if results.is_empty() {
        println!("No results for '{}' at threshold {}", query, threshold);
        return Ok(());
    }
    println!("Found {} results for '{}':", results.len(), query);
    for result in results {
        let m = &result.metadata;
        println!(
            "  {:.3}  {}:{}-{}  {} ({})",
            result.similarity,
            m.file_path,
            m.start_line,
            m.end_line,
            m.name,
            m.kind.as_str()
        );
    }

    Ok(())
}
