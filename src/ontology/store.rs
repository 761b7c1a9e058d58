// src/ontology/store.rs
// Per-scope catalog cache. Loads all definition kinds concurrently from the
// repository, validates referential integrity, then swaps the scope's
// Arc<Catalog> in one step so readers see either the old or the new catalog,
// never a partial one.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::error::{Result, ServerError};
use crate::tenancy::TenantScope;

use super::curie::PrefixTable;
use super::repository::OntologyRepository;
use super::types::{AliasDef, EntityDef, EnumDef, PropertyDef, Range, RelationDef, ShapeDef};

/// Immutable snapshot of one scope's vocabulary. Entities and relations
/// reference each other by local name through the lookup maps; there are no
/// pointer cycles, resolution happens at lookup time.
#[derive(Debug, Clone)]
pub struct Catalog {
    pub scope: TenantScope,
    entities: HashMap<String, EntityDef>,
    /// Keyed by (owner, local name).
    properties: HashMap<(String, String), PropertyDef>,
    relations: HashMap<String, RelationDef>,
    enums: HashMap<String, EnumDef>,
    aliases: Vec<AliasDef>,
    /// Keyed by the entity the shape applies to.
    shapes: HashMap<String, ShapeDef>,
}

impl Catalog {
    pub fn empty(scope: TenantScope) -> Self {
        Self {
            scope,
            entities: HashMap::new(),
            properties: HashMap::new(),
            relations: HashMap::new(),
            enums: HashMap::new(),
            aliases: Vec::new(),
            shapes: HashMap::new(),
        }
    }

    pub fn get_entity(&self, local_name: &str) -> Option<&EntityDef> {
        self.entities.get(local_name)
    }

    /// Entities sorted by local name, so repeated listings are order-stable.
    pub fn list_entities(&self) -> Vec<&EntityDef> {
        let mut out: Vec<_> = self.entities.values().collect();
        out.sort_by(|a, b| a.local_name.cmp(&b.local_name));
        out
    }

    pub fn get_property(&self, owner: &str, local_name: &str) -> Option<&PropertyDef> {
        self.properties
            .get(&(owner.to_string(), local_name.to_string()))
    }

    pub fn list_properties(&self) -> Vec<&PropertyDef> {
        let mut out: Vec<_> = self.properties.values().collect();
        out.sort_by(|a, b| (&a.owner, &a.local_name).cmp(&(&b.owner, &b.local_name)));
        out
    }

    pub fn get_relation(&self, local_name: &str) -> Option<&RelationDef> {
        self.relations.get(local_name)
    }

    pub fn list_relations(&self) -> Vec<&RelationDef> {
        let mut out: Vec<_> = self.relations.values().collect();
        out.sort_by(|a, b| a.local_name.cmp(&b.local_name));
        out
    }

    pub fn get_enum(&self, local_name: &str) -> Option<&EnumDef> {
        self.enums.get(local_name)
    }

    pub fn get_shape(&self, entity: &str) -> Option<&ShapeDef> {
        self.shapes.get(entity)
    }

    pub fn aliases(&self) -> &[AliasDef] {
        &self.aliases
    }

    pub fn list_enums(&self) -> Vec<&EnumDef> {
        let mut out: Vec<_> = self.enums.values().collect();
        out.sort_by(|a, b| a.local_name.cmp(&b.local_name));
        out
    }

    pub fn list_shapes(&self) -> Vec<&ShapeDef> {
        let mut out: Vec<_> = self.shapes.values().collect();
        out.sort_by(|a, b| a.applies_to_entity.cmp(&b.applies_to_entity));
        out
    }

    /// Resolve an alias or synonym to its canonical term; unknown terms map
    /// to themselves.
    pub fn resolve_alias<'a>(&'a self, term: &'a str) -> &'a str {
        for alias in &self.aliases {
            if alias.canonical == term || alias.aliases.iter().any(|a| a == term) {
                return &alias.canonical;
            }
        }
        term
    }

    fn from_parts(
        scope: TenantScope,
        entities: Vec<EntityDef>,
        properties: Vec<PropertyDef>,
        relations: Vec<RelationDef>,
        enums: Vec<EnumDef>,
        aliases: Vec<AliasDef>,
        shapes: Vec<ShapeDef>,
    ) -> Self {
        Self {
            scope,
            entities: entities
                .into_iter()
                .map(|e| (e.local_name.clone(), e))
                .collect(),
            properties: properties
                .into_iter()
                .map(|p| ((p.owner.clone(), p.local_name.clone()), p))
                .collect(),
            relations: relations
                .into_iter()
                .map(|r| (r.local_name.clone(), r))
                .collect(),
            enums: enums.into_iter().map(|e| (e.local_name.clone(), e)).collect(),
            aliases,
            shapes: shapes
                .into_iter()
                .map(|s| (s.applies_to_entity.clone(), s))
                .collect(),
        }
    }

    /// Test constructor bypassing the repository round-trip.
    #[cfg(test)]
    pub(crate) fn for_tests(
        scope: TenantScope,
        entities: Vec<EntityDef>,
        properties: Vec<PropertyDef>,
        relations: Vec<RelationDef>,
        enums: Vec<EnumDef>,
        aliases: Vec<AliasDef>,
        shapes: Vec<ShapeDef>,
    ) -> Self {
        Self::from_parts(scope, entities, properties, relations, enums, aliases, shapes)
    }

    /// Referential integrity checks: every failure is collected so the
    /// caller can report all of them at once.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        for entity in self.entities.values() {
            for parent in &entity.parents {
                if !self.entities.contains_key(parent) {
                    errors.push(format!(
                        "entity '{}' references missing parent '{}'",
                        entity.local_name, parent
                    ));
                }
            }
        }

        for property in self.properties.values() {
            if !self.entities.contains_key(&property.owner) {
                errors.push(format!(
                    "property '{}.{}' has missing owner entity '{}'",
                    property.owner, property.local_name, property.owner
                ));
            }
            if let Range::Entity(target) = &property.range
                && !self.entities.contains_key(target)
            {
                errors.push(format!(
                    "property '{}.{}' ranges over missing entity '{}'",
                    property.owner, property.local_name, target
                ));
            }
        }

        for relation in self.relations.values() {
            for (end, name) in [
                ("from", &relation.from_entity),
                ("to", &relation.to_entity),
            ] {
                if !self.entities.contains_key(name) {
                    errors.push(format!(
                        "relation '{}' has missing {} entity '{}'",
                        relation.local_name, end, name
                    ));
                }
            }
        }

        for shape in self.shapes.values() {
            if !self.entities.contains_key(&shape.applies_to_entity) {
                errors.push(format!(
                    "shape applies to missing entity '{}'",
                    shape.applies_to_entity
                ));
            }
        }

        errors
    }
}

/// Shared read store of catalogs, one per scope. Reload is copy-then-swap.
pub struct OntologyStore {
    repository: Arc<dyn OntologyRepository>,
    prefixes: PrefixTable,
    catalogs: RwLock<HashMap<TenantScope, Arc<Catalog>>>,
}

impl OntologyStore {
    pub fn new(repository: Arc<dyn OntologyRepository>) -> Self {
        Self {
            repository,
            prefixes: PrefixTable::default(),
            catalogs: RwLock::new(HashMap::new()),
        }
    }

    pub fn prefixes(&self) -> &PrefixTable {
        &self.prefixes
    }

    pub fn repository(&self) -> &Arc<dyn OntologyRepository> {
        &self.repository
    }

    /// Current snapshot for a scope, if one has been loaded.
    pub async fn catalog(&self, scope: &TenantScope) -> Option<Arc<Catalog>> {
        self.catalogs.read().await.get(scope).cloned()
    }

    /// Snapshot for a scope, loading it on first access.
    pub async fn get_or_load(&self, scope: &TenantScope) -> Result<Arc<Catalog>> {
        if let Some(catalog) = self.catalog(scope).await {
            return Ok(catalog);
        }
        self.load(scope).await
    }

    /// Load (or reload) a scope's catalog. All kinds are fetched
    /// concurrently; validation failure leaves the previous catalog in
    /// place and returns `ontology-invalid`.
    pub async fn load(&self, scope: &TenantScope) -> Result<Arc<Catalog>> {
        let (entities, properties, relations, enums, aliases, shapes) = tokio::try_join!(
            self.repository.list_entities(scope),
            self.repository.list_properties(scope),
            self.repository.list_relations(scope),
            self.repository.list_enums(scope),
            self.repository.list_aliases(scope),
            self.repository.list_shapes(scope),
        )?;

        let catalog = Catalog::from_parts(
            scope.clone(),
            entities,
            properties,
            relations,
            enums,
            aliases,
            shapes,
        );

        let errors = catalog.validate();
        if !errors.is_empty() {
            warn!(scope = %scope, errors = errors.len(), "Ontology load failed validation");
            return Err(ServerError::OntologyInvalid(errors));
        }

        let catalog = Arc::new(catalog);
        self.catalogs
            .write()
            .await
            .insert(scope.clone(), catalog.clone());
        info!(
            scope = %scope,
            entities = catalog.entities.len(),
            properties = catalog.properties.len(),
            relations = catalog.relations.len(),
            "Ontology catalog loaded"
        );
        Ok(catalog)
    }

    /// Validate a scope's repository contents without swapping anything in.
    pub async fn validate(&self, scope: &TenantScope) -> Result<Vec<String>> {
        let (entities, properties, relations, enums, aliases, shapes) = tokio::try_join!(
            self.repository.list_entities(scope),
            self.repository.list_properties(scope),
            self.repository.list_relations(scope),
            self.repository.list_enums(scope),
            self.repository.list_aliases(scope),
            self.repository.list_shapes(scope),
        )?;
        let catalog = Catalog::from_parts(
            scope.clone(),
            entities,
            properties,
            relations,
            enums,
            aliases,
            shapes,
        );
        Ok(catalog.validate())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ontology::repository::InMemoryOntologyRepository;
    use crate::ontology::types::{DefKind, Definition, Governance};

    fn scope() -> TenantScope {
        TenantScope::new("acme", "core", "main").unwrap()
    }

    fn entity(name: &str, parents: Vec<&str>) -> Definition {
        Definition::Entity(EntityDef {
            local_name: name.into(),
            canonical_uri: format!("https://limbodancer.ai/ontology/{name}"),
            parents: parents.into_iter().map(String::from).collect(),
            annotations: Default::default(),
            governance: Governance::default(),
        })
    }

    async fn seeded_repo() -> Arc<InMemoryOntologyRepository> {
        let repo = Arc::new(InMemoryOntologyRepository::default());
        repo.upsert(&scope(), entity("Agent", vec![])).await.unwrap();
        repo.upsert(&scope(), entity("Person", vec!["Agent"]))
            .await
            .unwrap();
        repo
    }

    #[tokio::test]
    async fn load_builds_queryable_catalog() {
        let store = OntologyStore::new(seeded_repo().await);
        let catalog = store.load(&scope()).await.unwrap();
        assert!(catalog.get_entity("Person").is_some());
        let names: Vec<_> = catalog
            .list_entities()
            .iter()
            .map(|e| e.local_name.clone())
            .collect();
        assert_eq!(names, vec!["Agent", "Person"]);
    }

    #[tokio::test]
    async fn missing_parent_aborts_load_and_keeps_previous_catalog() {
        let repo = seeded_repo().await;
        let store = OntologyStore::new(repo.clone());
        store.load(&scope()).await.unwrap();

        // Delete the parent out from under Person, then reload.
        repo.delete(&scope(), DefKind::Entity, "Agent").await.unwrap();
        let err = store.load(&scope()).await.unwrap_err();
        assert!(matches!(err, ServerError::OntologyInvalid(_)));

        // Readers still see the previous complete catalog.
        let catalog = store.catalog(&scope()).await.unwrap();
        assert!(catalog.get_entity("Agent").is_some());
        assert!(catalog.get_entity("Person").is_some());
    }

    #[tokio::test]
    async fn alias_resolution_falls_through_to_input() {
        let catalog = Catalog::empty(scope());
        assert_eq!(catalog.resolve_alias("whatever"), "whatever");
    }
}
