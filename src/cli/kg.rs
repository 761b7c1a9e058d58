// src/cli/kg.rs
// kg ping: probe graph store connectivity.

use limbodancer::stores::graph::{GraphStore, InMemoryGraphStore};

use super::CliError;

pub async fn run_ping() -> Result<(), CliError> {
    // The production graph backend is an external collaborator behind the
    // GraphStore trait; the default wiring probes the in-process store.
    let store = InMemoryGraphStore::new();
    store
        .ping()
        .await
        .map_err(|e| CliError::DependencyUnavailable(format!("graph store: {e}")))?;
    println!("knowledge graph reachable");
    Ok(())
}
