// src/ontology/mapper.rs
// Property key mapper: resolves a predicate written in ontology terms
// (local name, CURIE, or absolute IRI) to the concrete graph property key.
// Precedence: exact key match > canonical URI > local-name fallback.

use std::collections::HashMap;

use tracing::warn;

use super::curie::{LDM_NS, PrefixTable};
use super::store::Catalog;

#[derive(Debug, Clone)]
pub struct PropertyKeyMapper {
    /// Graph property key by exact predicate string.
    exact: HashMap<String, String>,
    /// Graph property key by expanded canonical URI.
    by_uri: HashMap<String, String>,
    prefixes: PrefixTable,
}

impl PropertyKeyMapper {
    /// Build the mapper from a catalog: properties and relations both map
    /// to graph keys (vertex property keys and edge labels share the same
    /// namespace in the graph store).
    pub fn from_catalog(catalog: &Catalog, prefixes: &PrefixTable) -> Self {
        let mut exact = HashMap::new();
        let mut by_uri = HashMap::new();

        for property in catalog.list_properties() {
            let key = property.local_name.clone();
            exact.insert(key.clone(), key.clone());
            by_uri.insert(format!("{LDM_NS}{}", property.local_name), key);
        }
        for relation in catalog.list_relations() {
            let key = relation.local_name.clone();
            exact.insert(key.clone(), key.clone());
            by_uri.insert(format!("{LDM_NS}{}", relation.local_name), key);
        }
        for entity in catalog.list_entities() {
            // Entities are not predicates, but their canonical URIs still
            // resolve so preconditions can reference rdf:type-style checks.
            by_uri
                .entry(entity.canonical_uri.clone())
                .or_insert_with(|| entity.local_name.clone());
        }

        Self {
            exact,
            by_uri,
            prefixes: prefixes.clone(),
        }
    }

    /// Resolve a predicate to a graph property key. Returns None when the
    /// predicate maps to nothing in this catalog; the caller decides
    /// whether that fails closed (preconditions) or is skipped (effects).
    pub fn resolve(&self, predicate: &str) -> Option<String> {
        if let Some(key) = self.exact.get(predicate) {
            return Some(key.clone());
        }

        // CURIE or absolute IRI: expand, then try the canonical URI table.
        if let Ok(expanded) = self.prefixes.expand(predicate) {
            if let Some(key) = self.by_uri.get(&expanded) {
                return Some(key.clone());
            }
            // Local-name fallback: the fragment after the last '#' or '/'.
            if expanded != predicate || predicate.contains(':') {
                let local = expanded
                    .rsplit(['#', '/'])
                    .next()
                    .unwrap_or(expanded.as_str());
                if let Some(key) = self.exact.get(local) {
                    return Some(key.clone());
                }
            }
        }

        warn!(predicate, "Predicate does not map to any graph property key");
        None
    }
}
