// src/cli/vector.rs
// vector init: create the Qdrant collection.

use limbodancer::config::Settings;
use limbodancer::stores::vector::{QdrantVectorIndex, VectorIndex};

use super::CliError;

pub async fn run_init(settings: &Settings) -> Result<(), CliError> {
    let index = QdrantVectorIndex::connect(&settings.qdrant_url, &settings.qdrant_collection)
        .map_err(|e| CliError::DependencyUnavailable(format!("vector index: {e}")))?;
    index
        .ensure_index(settings.vector_dim)
        .await
        .map_err(|e| CliError::DependencyUnavailable(format!("vector index: {e}")))?;
    println!(
        "vector collection '{}' ready ({} dims)",
        settings.qdrant_collection, settings.vector_dim
    );
    Ok(())
}
