// src/cli/ontology.rs
// ontology validate | export against the configured repository.

use std::sync::Arc;

use limbodancer::config::Settings;
use limbodancer::error::ServerError;
use limbodancer::ontology::export::{self, ExportFormat};
use limbodancer::ontology::governance::GovernanceGates;
use limbodancer::ontology::{InMemoryOntologyRepository, OntologyStore};
use limbodancer::tenancy::TenantScope;

use super::CliError;

fn store(settings: &Settings) -> OntologyStore {
    OntologyStore::new(Arc::new(InMemoryOntologyRepository::new(
        GovernanceGates::from_settings(settings),
    )))
}

fn scope_of(tenant: &str, package: &str, channel: &str) -> Result<TenantScope, CliError> {
    TenantScope::new(tenant, package, channel)
        .map_err(|e| CliError::Generic(anyhow::anyhow!("{e}")))
}

pub async fn run_validate(
    settings: &Settings,
    tenant: &str,
    package: &str,
    channel: &str,
) -> Result<(), CliError> {
    let scope = scope_of(tenant, package, channel)?;
    let store = store(settings);

    match store.validate(&scope).await {
        Ok(errors) if errors.is_empty() => {
            println!("{scope}: catalog valid");
            Ok(())
        }
        Ok(errors) => {
            for error in &errors {
                eprintln!("  {error}");
            }
            Err(CliError::Generic(anyhow::anyhow!(
                "{scope}: {} validation errors",
                errors.len()
            )))
        }
        Err(ServerError::Upstream { message, .. }) => Err(CliError::DependencyUnavailable(message)),
        Err(e) => Err(CliError::Generic(anyhow::anyhow!("{e}"))),
    }
}

pub async fn run_export(
    settings: &Settings,
    tenant: &str,
    package: &str,
    channel: &str,
    format: &str,
) -> Result<(), CliError> {
    let scope = scope_of(tenant, package, channel)?;
    let Some(format) = ExportFormat::parse(format) else {
        return Err(CliError::Generic(anyhow::anyhow!(
            "unknown format {format:?}; expected jsonld or turtle"
        )));
    };

    let store = store(settings);
    let catalog = store
        .get_or_load(&scope)
        .await
        .map_err(|e| CliError::Generic(anyhow::anyhow!("{e}")))?;
    if catalog.list_entities().is_empty() {
        return Err(CliError::EndpointMissing(format!(
            "no catalog published for scope {scope}"
        )));
    }

    match format {
        ExportFormat::JsonLd => {
            let doc = export::to_jsonld(&catalog, store.prefixes())
                .map_err(|e| CliError::Generic(anyhow::anyhow!("{e}")))?;
            println!(
                "{}",
                serde_json::to_string_pretty(&doc).unwrap_or_default()
            );
        }
        ExportFormat::Turtle => {
            println!("{}", export::to_turtle(&catalog, store.prefixes()));
        }
    }
    Ok(())
}
