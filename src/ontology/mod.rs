// src/ontology/mod.rs
// Ontology runtime: per-scope catalogs of typed vocabulary definitions,
// loaded from a repository and served read-only to the tool handlers.

pub mod curie;
pub mod export;
pub mod governance;
pub mod mapper;
pub mod repository;
pub mod store;
pub mod types;

pub use curie::PrefixTable;
pub use mapper::PropertyKeyMapper;
pub use repository::{InMemoryOntologyRepository, OntologyRepository};
pub use store::{Catalog, OntologyStore};
pub use types::{
    AliasDef, DefKind, Definition, EntityDef, EnumDef, Governance, PropertyConstraint, PropertyDef,
    Range, RelationDef, ShapeDef, Status,
};
