// src/ontology/repository.rs
// Repository contract for ontology definitions, plus the in-memory
// implementation used by default wiring and tests. Strong consistency per
// scope: every method sees all prior writes to the same scope.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{Result, ServerError};
use crate::tenancy::TenantScope;

use super::governance::GovernanceGates;
use super::types::{
    AliasDef, DefKind, Definition, EntityDef, EnumDef, PropertyDef, RelationDef, ShapeDef, Status,
};

/// Narrow persistence interface for the ontology catalog. The production
/// backend is an external collaborator; the server only depends on this
/// trait.
#[async_trait]
pub trait OntologyRepository: Send + Sync {
    async fn list_entities(&self, scope: &TenantScope) -> Result<Vec<EntityDef>>;
    async fn list_properties(&self, scope: &TenantScope) -> Result<Vec<PropertyDef>>;
    async fn list_relations(&self, scope: &TenantScope) -> Result<Vec<RelationDef>>;
    async fn list_enums(&self, scope: &TenantScope) -> Result<Vec<EnumDef>>;
    async fn list_aliases(&self, scope: &TenantScope) -> Result<Vec<AliasDef>>;
    async fn list_shapes(&self, scope: &TenantScope) -> Result<Vec<ShapeDef>>;

    /// Fetch one definition by kind and key (`owner.localName` for
    /// properties, target entity for shapes, canonical term for aliases).
    async fn get(&self, scope: &TenantScope, kind: DefKind, key: &str)
    -> Result<Option<Definition>>;

    /// Insert or replace a definition. The governance gate runs here: the
    /// stored status is the gate's verdict, and rejected definitions are
    /// persisted as Rejected so the proposal trail survives.
    async fn upsert(&self, scope: &TenantScope, def: Definition) -> Result<Status>;

    async fn delete(&self, scope: &TenantScope, kind: DefKind, key: &str) -> Result<()>;

    /// Connectivity probe for readiness checks.
    async fn ping(&self) -> Result<()>;
}

#[derive(Debug, Default, Clone)]
struct ScopeData {
    defs: HashMap<DefKind, HashMap<String, Definition>>,
}

/// In-memory repository keyed by scope. Mutations take the write lock;
/// list operations clone out under the read lock.
#[derive(Default)]
pub struct InMemoryOntologyRepository {
    gates: GovernanceGates,
    scopes: RwLock<HashMap<TenantScope, ScopeData>>,
}

impl InMemoryOntologyRepository {
    pub fn new(gates: GovernanceGates) -> Self {
        Self {
            gates,
            scopes: RwLock::new(HashMap::new()),
        }
    }

    async fn list_kind<T, F>(&self, scope: &TenantScope, kind: DefKind, unwrap: F) -> Result<Vec<T>>
    where
        F: Fn(&Definition) -> Option<T>,
    {
        let scopes = self.scopes.read().await;
        let out: Vec<T> = scopes
            .get(scope)
            .and_then(|data| data.defs.get(&kind))
            .map(|defs| defs.values().filter_map(&unwrap).collect())
            .unwrap_or_default();
        Ok(out)
    }
}

#[async_trait]
impl OntologyRepository for InMemoryOntologyRepository {
    async fn list_entities(&self, scope: &TenantScope) -> Result<Vec<EntityDef>> {
        self.list_kind(scope, DefKind::Entity, |d| match d {
            Definition::Entity(e) => Some(e.clone()),
            _ => None,
        })
        .await
    }

    async fn list_properties(&self, scope: &TenantScope) -> Result<Vec<PropertyDef>> {
        self.list_kind(scope, DefKind::Property, |d| match d {
            Definition::Property(p) => Some(p.clone()),
            _ => None,
        })
        .await
    }

    async fn list_relations(&self, scope: &TenantScope) -> Result<Vec<RelationDef>> {
        self.list_kind(scope, DefKind::Relation, |d| match d {
            Definition::Relation(r) => Some(r.clone()),
            _ => None,
        })
        .await
    }

    async fn list_enums(&self, scope: &TenantScope) -> Result<Vec<EnumDef>> {
        self.list_kind(scope, DefKind::Enum, |d| match d {
            Definition::Enum(e) => Some(e.clone()),
            _ => None,
        })
        .await
    }

    async fn list_aliases(&self, scope: &TenantScope) -> Result<Vec<AliasDef>> {
        self.list_kind(scope, DefKind::Alias, |d| match d {
            Definition::Alias(a) => Some(a.clone()),
            _ => None,
        })
        .await
    }

    async fn list_shapes(&self, scope: &TenantScope) -> Result<Vec<ShapeDef>> {
        self.list_kind(scope, DefKind::Shape, |d| match d {
            Definition::Shape(s) => Some(s.clone()),
            _ => None,
        })
        .await
    }

    async fn get(
        &self,
        scope: &TenantScope,
        kind: DefKind,
        key: &str,
    ) -> Result<Option<Definition>> {
        let scopes = self.scopes.read().await;
        Ok(scopes
            .get(scope)
            .and_then(|data| data.defs.get(&kind))
            .and_then(|defs| defs.get(key))
            .cloned())
    }

    async fn upsert(&self, scope: &TenantScope, mut def: Definition) -> Result<Status> {
        let status = self.gates.evaluate(def.governance());
        {
            let g = def.governance_mut();
            g.status = status;
            g.updated_at = chrono::Utc::now();
        }
        let mut scopes = self.scopes.write().await;
        let data = scopes.entry(scope.clone()).or_default();
        let defs = data.defs.entry(def.kind()).or_default();
        if let Some(prev) = defs.get(&def.key()) {
            let g = def.governance_mut();
            g.version = prev.governance().version + 1;
            g.created_at = prev.governance().created_at;
        }
        defs.insert(def.key(), def);
        Ok(status)
    }

    async fn delete(&self, scope: &TenantScope, kind: DefKind, key: &str) -> Result<()> {
        let mut scopes = self.scopes.write().await;
        let removed = scopes
            .get_mut(scope)
            .and_then(|data| data.defs.get_mut(&kind))
            .and_then(|defs| defs.remove(key));
        match removed {
            Some(_) => Ok(()),
            None => Err(ServerError::NotFound(format!(
                "{kind:?} definition {key:?} in scope {scope}"
            ))),
        }
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ontology::types::Governance;

    fn scope() -> TenantScope {
        TenantScope::new("acme", "core", "main").unwrap()
    }

    fn entity(name: &str, confidence: f64) -> Definition {
        Definition::Entity(EntityDef {
            local_name: name.into(),
            canonical_uri: format!("https://limbodancer.ai/ontology/{name}"),
            parents: vec![],
            annotations: Default::default(),
            governance: Governance::new(confidence, 2, 1, "test"),
        })
    }

    #[tokio::test]
    async fn upsert_applies_governance_gate() {
        let repo = InMemoryOntologyRepository::default();
        let status = repo.upsert(&scope(), entity("Person", 0.95)).await.unwrap();
        assert_eq!(status, Status::Published);

        let status = repo.upsert(&scope(), entity("Maybe", 0.6)).await.unwrap();
        assert_eq!(status, Status::Proposed);

        let status = repo.upsert(&scope(), entity("Junk", 0.1)).await.unwrap();
        assert_eq!(status, Status::Rejected);

        let entities = repo.list_entities(&scope()).await.unwrap();
        assert_eq!(entities.len(), 3);
    }

    #[tokio::test]
    async fn upsert_bumps_version_and_keeps_created_at() {
        let repo = InMemoryOntologyRepository::default();
        repo.upsert(&scope(), entity("Person", 0.95)).await.unwrap();
        repo.upsert(&scope(), entity("Person", 0.95)).await.unwrap();

        let entities = repo.list_entities(&scope()).await.unwrap();
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].governance.version, 2);
    }

    #[tokio::test]
    async fn scopes_are_isolated() {
        let repo = InMemoryOntologyRepository::default();
        repo.upsert(&scope(), entity("Person", 0.95)).await.unwrap();

        let other = TenantScope::new("rival", "core", "main").unwrap();
        assert!(repo.list_entities(&other).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn get_returns_the_stored_definition() {
        let repo = InMemoryOntologyRepository::default();
        repo.upsert(&scope(), entity("Person", 0.95)).await.unwrap();

        let fetched = repo
            .get(&scope(), DefKind::Entity, "Person")
            .await
            .unwrap();
        assert!(matches!(
            fetched,
            Some(Definition::Entity(e)) if e.local_name == "Person"
        ));
        assert!(
            repo.get(&scope(), DefKind::Entity, "Ghost")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn delete_missing_is_not_found() {
        let repo = InMemoryOntologyRepository::default();
        let err = repo
            .delete(&scope(), DefKind::Entity, "Ghost")
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::NotFound(_)));
    }
}
