// src/stores/mod.rs
// Narrow interfaces over the external collaborators: SQL history store,
// vector search index, graph store. The core depends only on the traits;
// each concrete client lives next to its trait.

pub mod graph;
pub mod history;
pub mod vector;

pub use graph::{
    Direction, FilterOp, GraphFilter, GraphStore, InMemoryGraphStore, Traversal, Vertex,
};
pub use history::{HistoryStore, NewMessage, SqliteHistoryStore, StoredMessage};
pub use vector::{MemoryHit, QdrantVectorIndex, SearchRequest, VectorIndex};
