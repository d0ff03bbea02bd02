// Query layer over the structured and vector stores

pub mod engine;

pub use engine::{DependencyReport, FileContext, QueryEngine, SemanticSearchResult};
