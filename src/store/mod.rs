// Dual-store persistence: relational structured index + vector index

pub mod schema;
pub mod structured;
pub mod vector;

pub use structured::{IndexStatistics, StructuralFilters, StructuredIndex};
pub use vector::{
    chunk_record_id, ChunkMetadata, SemanticFilters, SemanticHit, VectorIndex, VectorRecord,
};
