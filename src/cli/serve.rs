use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use crate::mcp::server::McpServer;

/// Start the MCP server without indexing first
pub async fn serve_stdio(project: String) -> Result<()> {
    info!("MCP server (stdio) for project: {}", project);

    let coordinator = Arc::new(super::open_coordinator(&project)?);

    let stats = coordinator.structured().statistics()?;
    if stats.total_elements == 0 {
        eprintln!(
            "Warning: index is empty. Run 'codectx index --project {}' first.",
            project
        );
    }

    let server = McpServer::new(coordinator);
    server.run().await
}
