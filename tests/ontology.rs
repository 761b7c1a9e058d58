//! Ontology runtime integration: load atomicity under concurrent mutation,
//! export round-trips, and governance gating through the repository.

use std::sync::Arc;

use limbodancer::error::ServerError;
use limbodancer::ontology::export;
use limbodancer::ontology::types::{
    DefKind, Definition, EntityDef, Governance, PropertyDef, Range, Status,
};
use limbodancer::ontology::{
    InMemoryOntologyRepository, OntologyRepository, OntologyStore, PrefixTable,
};
use limbodancer::tenancy::TenantScope;

fn scope() -> TenantScope {
    TenantScope::new("acme", "core", "main").unwrap()
}

fn entity(name: &str, parents: Vec<&str>) -> Definition {
    Definition::Entity(EntityDef {
        local_name: name.into(),
        canonical_uri: format!("https://limbodancer.ai/ontology/{name}"),
        parents: parents.into_iter().map(String::from).collect(),
        annotations: Default::default(),
        governance: Governance::new(0.95, 2, 1, "test"),
    })
}

fn property(owner: &str, name: &str) -> Definition {
    Definition::Property(PropertyDef {
        owner: owner.into(),
        local_name: name.into(),
        range: Range::Xsd("xsd:string".into()),
        min_card: 0,
        max_card: Some(1),
        annotations: Default::default(),
        governance: Governance::new(0.95, 2, 1, "test"),
    })
}

async fn seeded_repo() -> Arc<InMemoryOntologyRepository> {
    let repo = Arc::new(InMemoryOntologyRepository::default());
    repo.upsert(&scope(), entity("Agent", vec![])).await.unwrap();
    repo.upsert(&scope(), entity("Person", vec!["Agent"]))
        .await
        .unwrap();
    repo.upsert(&scope(), property("Person", "displayName"))
        .await
        .unwrap();
    repo
}

#[tokio::test]
async fn load_failure_under_concurrent_delete_keeps_previous_catalog() {
    let repo = seeded_repo().await;
    let store = Arc::new(OntologyStore::new(repo.clone()));
    store.load(&scope()).await.unwrap();

    // Concurrently delete the parent entity while reloads are running.
    let store2 = store.clone();
    let loader = tokio::spawn(async move {
        let mut outcomes = Vec::new();
        for _ in 0..20 {
            outcomes.push(store2.load(&scope()).await.is_ok());
            tokio::task::yield_now().await;
        }
        outcomes
    });
    repo.delete(&scope(), DefKind::Entity, "Agent").await.unwrap();
    let _ = loader.await.unwrap();

    // Once the delete lands, further loads fail with ontology-invalid...
    let err = store.load(&scope()).await.unwrap_err();
    assert!(matches!(err, ServerError::OntologyInvalid(_)));

    // ...but readers still see a complete catalog, never a partial one.
    let catalog = store.catalog(&scope()).await.unwrap();
    assert!(catalog.get_entity("Person").is_some());
    assert!(catalog.get_entity("Agent").is_some());
    assert!(catalog.get_property("Person", "displayName").is_some());
}

#[tokio::test]
async fn validate_reports_errors_without_swapping_state() {
    let repo = seeded_repo().await;
    let store = OntologyStore::new(repo.clone());
    store.load(&scope()).await.unwrap();

    repo.delete(&scope(), DefKind::Entity, "Agent").await.unwrap();
    let errors = store.validate(&scope()).await.unwrap();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("missing parent"));

    // validate never replaces the served catalog.
    assert!(store.catalog(&scope()).await.unwrap().get_entity("Agent").is_some());
}

#[tokio::test]
async fn jsonld_export_reimport_reproduces_the_catalog() {
    let repo = seeded_repo().await;
    let store = OntologyStore::new(repo);
    let catalog = store.load(&scope()).await.unwrap();

    let doc = export::to_jsonld(&catalog, &PrefixTable::default()).unwrap();
    let defs = export::from_jsonld(&doc).unwrap();

    // Re-import into a fresh repository and load.
    let fresh = Arc::new(InMemoryOntologyRepository::default());
    for def in defs {
        fresh.upsert(&scope(), def).await.unwrap();
    }
    let reloaded = OntologyStore::new(fresh).load(&scope()).await.unwrap();

    let names = |c: &limbodancer::ontology::Catalog| -> Vec<String> {
        c.list_entities()
            .iter()
            .map(|e| e.local_name.clone())
            .collect()
    };
    assert_eq!(names(&catalog), names(&reloaded));
    assert_eq!(
        reloaded.get_entity("Person").unwrap().parents,
        vec!["Agent".to_string()]
    );
    assert_eq!(
        reloaded.get_property("Person", "displayName").unwrap().range,
        Range::Xsd("xsd:string".into())
    );
}

#[tokio::test]
async fn governance_gates_set_status_on_upsert() {
    let repo = InMemoryOntologyRepository::default();

    let mut strong = entity("Strong", vec![]);
    strong.governance_mut().confidence = 0.9;
    assert_eq!(repo.upsert(&scope(), strong).await.unwrap(), Status::Published);

    let mut middling = entity("Middling", vec![]);
    middling.governance_mut().confidence = 0.6;
    assert_eq!(repo.upsert(&scope(), middling).await.unwrap(), Status::Proposed);

    let mut weak = entity("Weak", vec![]);
    weak.governance_mut().confidence = 0.2;
    assert_eq!(repo.upsert(&scope(), weak).await.unwrap(), Status::Rejected);
}

#[tokio::test]
async fn turtle_export_mentions_every_definition() {
    let repo = seeded_repo().await;
    let store = OntologyStore::new(repo);
    let catalog = store.load(&scope()).await.unwrap();

    let ttl = export::to_turtle(&catalog, &PrefixTable::default());
    assert!(ttl.contains("Agent"));
    assert!(ttl.contains("Person"));
    assert!(ttl.contains("ldm:displayName a owl:DatatypeProperty"));
}
