use std::sync::Arc;

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::indexer::watcher::ProjectWatcher;

/// Run a full indexing pass, optionally watching afterwards
pub async fn index_project(project: String, watch: bool, rebuild: bool) -> Result<()> {
    info!("Indexing project: {}", project);

    let coordinator = Arc::new(super::open_coordinator(&project)?);

    println!("codectx indexer v{}", env!("CARGO_PKG_VERSION"));
    println!("Project: {}", project);
    println!("Rebuild: {}", rebuild);

    let cancel = CancellationToken::new();
    let report = coordinator.index_project(rebuild, &cancel).await?;

    println!("\nIndexing complete in {} ms", report.duration_ms);
    println!("Files indexed: {}", report.files_indexed);
    println!("Elements: {}", report.elements_indexed);
    println!("Chunks embedded: {}", report.chunks_embedded);
    if report.batches_failed > 0 {
        println!("Embedding batches failed: {}", report.batches_failed);
    }
    if !report.files_skipped.is_empty() {
        println!("Skipped files ({}):", report.files_skipped.len());
        for skipped in &report.files_skipped {
            println!("  {} ({})", skipped.path, skipped.reason);
        }
    }

    if watch {
        println!("\nWatching for changes. Press Ctrl+C to stop.");
        let watcher = ProjectWatcher::new(coordinator);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(async move { watcher.watch(cancel).await });

        tokio::signal::ctrl_c().await?;
        handle.abort();
        println!("Stopped.");
    }

    Ok(())
}
