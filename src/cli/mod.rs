// CLI command implementations

pub mod clean;
pub mod context;
pub mod deps;
pub mod index;
pub mod search;
pub mod serve;
pub mod start;
pub mod stats;
pub mod structure;

use anyhow::Result;

use crate::config::Config;
use crate::embed::embedder_for_model;
use crate::indexer::IndexingCoordinator;

/// Open a coordinator for a project directory using its configuration
pub(crate) fn open_coordinator(project: &str) -> Result<IndexingCoordinator> {
    let config = Config::from_project_dir(project);
    config.validate()?;
    let embedder = embedder_for_model(&config.embedding.model_id);
    Ok(IndexingCoordinator::open(project, config, embedder)?)
}
