// src/ontology/export.rs
// Catalog snapshots as JSON-LD and RDF Turtle. The JSON-LD document carries
// the full definition graph so a repository re-import reproduces the
// catalog; Turtle is a human-readable projection.

use serde_json::{Map, Value, json};

use crate::error::Result;

use super::curie::PrefixTable;
use super::store::Catalog;
use super::types::{Definition, Range};

/// Serialization format for catalog export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    JsonLd,
    Turtle,
}

impl ExportFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "jsonld" => Some(Self::JsonLd),
            "turtle" => Some(Self::Turtle),
            _ => None,
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Self::JsonLd => "application/ld+json",
            Self::Turtle => "text/turtle",
        }
    }
}

fn all_definitions(catalog: &Catalog) -> Vec<Definition> {
    let mut defs: Vec<Definition> = Vec::new();
    defs.extend(catalog.list_entities().into_iter().cloned().map(Definition::Entity));
    defs.extend(
        catalog
            .list_properties()
            .into_iter()
            .cloned()
            .map(Definition::Property),
    );
    defs.extend(
        catalog
            .list_relations()
            .into_iter()
            .cloned()
            .map(Definition::Relation),
    );
    defs.extend(catalog.list_enums().into_iter().cloned().map(Definition::Enum));
    defs.extend(catalog.aliases().iter().cloned().map(Definition::Alias));
    defs.extend(catalog.list_shapes().into_iter().cloned().map(Definition::Shape));
    defs
}

/// JSON-LD document: `@context` maps prefixes and every term to its IRI;
/// `@graph` carries the definitions themselves.
pub fn to_jsonld(catalog: &Catalog, prefixes: &PrefixTable) -> Result<Value> {
    let mut context = Map::new();
    for (prefix, ns) in prefixes.iter() {
        context.insert(prefix.to_string(), json!(ns));
    }
    for entity in catalog.list_entities() {
        context.insert(
            entity.local_name.clone(),
            json!({ "@id": entity.canonical_uri }),
        );
    }
    for property in catalog.list_properties() {
        let term = match &property.range {
            Range::Xsd(dt) => json!({
                "@id": format!("ldm:{}", property.local_name),
                "@type": dt,
            }),
            Range::Entity(_) => json!({
                "@id": format!("ldm:{}", property.local_name),
                "@type": "@id",
            }),
        };
        context.insert(property.local_name.clone(), term);
    }

    let graph = serde_json::to_value(all_definitions(catalog))?;

    Ok(json!({
        "@context": Value::Object(context),
        "scope": catalog.scope.canonical(),
        "@graph": graph,
    }))
}

/// Parse a JSON-LD export back into the definition list, for repository
/// re-import. Timestamps survive serialization, so import-after-export is
/// identity on definitions.
pub fn from_jsonld(doc: &Value) -> Result<Vec<Definition>> {
    let graph = doc.get("@graph").cloned().unwrap_or(Value::Array(vec![]));
    Ok(serde_json::from_value(graph)?)
}

/// Turtle rendering: prefix block, then one stanza per definition.
pub fn to_turtle(catalog: &Catalog, prefixes: &PrefixTable) -> String {
    let mut out = String::new();
    let mut prefix_lines: Vec<_> = prefixes
        .iter()
        .map(|(p, ns)| format!("@prefix {p}: <{ns}> ."))
        .collect();
    prefix_lines.sort();
    for line in prefix_lines {
        out.push_str(&line);
        out.push('\n');
    }
    out.push('\n');

    for entity in catalog.list_entities() {
        out.push_str(&format!("<{}> a owl:Class", entity.canonical_uri));
        for parent in &entity.parents {
            if let Some(parent_def) = catalog.get_entity(parent) {
                out.push_str(&format!(
                    " ;\n    rdfs:subClassOf <{}>",
                    parent_def.canonical_uri
                ));
            }
        }
        out.push_str(" .\n");
    }
    out.push('\n');

    for property in catalog.list_properties() {
        let (kind, range) = match &property.range {
            Range::Xsd(dt) => ("owl:DatatypeProperty", dt.clone()),
            Range::Entity(target) => ("owl:ObjectProperty", format!("ldm:{target}")),
        };
        out.push_str(&format!(
            "ldm:{} a {kind} ;\n    rdfs:domain ldm:{} ;\n    rdfs:range {range} .\n",
            property.local_name, property.owner
        ));
    }
    out.push('\n');

    for relation in catalog.list_relations() {
        out.push_str(&format!(
            "ldm:{} a owl:ObjectProperty ;\n    rdfs:domain ldm:{} ;\n    rdfs:range ldm:{} .\n",
            relation.local_name, relation.from_entity, relation.to_entity
        ));
    }

    for enum_def in catalog.list_enums() {
        let values: Vec<String> = enum_def.values.iter().map(|v| format!("\"{v}\"")).collect();
        out.push_str(&format!(
            "ldm:{} a rdfs:Datatype ;\n    owl:oneOf ( {} ) .\n",
            enum_def.local_name,
            values.join(" ")
        ));
    }

    out
}
