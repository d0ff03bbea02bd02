use std::sync::Arc;

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::indexer::watcher::ProjectWatcher;
use crate::mcp::server::McpServer;

/// Start the MCP server with auto-indexing and optional watch mode
pub async fn start_server(project: String, watch: bool, rebuild: bool) -> Result<()> {
    info!("Starting codectx for project: {}", project);

    let coordinator = Arc::new(super::open_coordinator(&project)?);

    println!("codectx MCP server v{}", env!("CARGO_PKG_VERSION"));
    println!("Project: {}", project);
    println!("Watch mode: {}", if watch { "enabled" } else { "disabled" });

    // Index when the store is empty or a rebuild was requested
    let stats = coordinator.structured().statistics()?;
    if rebuild || stats.total_elements == 0 {
        println!("\nIndexing project...");
        let cancel = CancellationToken::new();
        let report = coordinator.index_project(rebuild, &cancel).await?;
        println!(
            "Index ready: {} files, {} elements, {} chunks embedded",
            report.files_indexed, report.elements_indexed, report.chunks_embedded
        );
        if !report.files_skipped.is_empty() {
            println!("Skipped {} files", report.files_skipped.len());
        }
    } else {
        println!(
            "\nUsing existing index: {} elements, {} files",
            stats.total_elements, stats.file_count
        );
    }

    let watch_cancel = CancellationToken::new();
    if watch {
        let watcher = ProjectWatcher::new(Arc::clone(&coordinator));
        let cancel = watch_cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = watcher.watch(cancel).await {
                eprintln!("File watcher error: {}", e);
            }
        });
        println!("File watching enabled");
    }

    println!("\ncodectx is ready. Listening for MCP requests on stdio...\n");
    let server = McpServer::new(coordinator);
    let result = server.run().await;

    watch_cancel.cancel();
    result
}
