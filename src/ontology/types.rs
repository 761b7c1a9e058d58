// src/ontology/types.rs
// Definition types for the per-scope ontology catalog.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    Proposed,
    Published,
    Rejected,
}

/// Governance fields carried by every definition kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Governance {
    pub confidence: f64,
    pub complexity: u32,
    pub depth: u32,
    pub status: Status,
    pub version: u32,
    pub provenance: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Governance {
    pub fn new(confidence: f64, complexity: u32, depth: u32, provenance: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            confidence,
            complexity,
            depth,
            status: Status::Proposed,
            version: 1,
            provenance: provenance.into(),
            created_at: now,
            updated_at: now,
        }
    }
}

impl Default for Governance {
    fn default() -> Self {
        Self::new(1.0, 1, 1, "manual")
    }
}

/// Range of a property: either an XSD datatype tag (e.g. `xsd:string`) or
/// the local name of another entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Range {
    Xsd(String),
    Entity(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDef {
    pub local_name: String,
    pub canonical_uri: String,
    #[serde(default)]
    pub parents: Vec<String>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    pub governance: Governance,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyDef {
    /// Local name of the owning entity.
    pub owner: String,
    pub local_name: String,
    pub range: Range,
    pub min_card: u32,
    /// None means unbounded.
    pub max_card: Option<u32>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    pub governance: Governance,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationDef {
    pub local_name: String,
    pub from_entity: String,
    pub to_entity: String,
    pub min_card: u32,
    pub max_card: Option<u32>,
    pub governance: Governance,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumDef {
    pub local_name: String,
    pub values: Vec<String>,
    pub governance: Governance,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AliasDef {
    pub canonical: String,
    pub aliases: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    pub governance: Governance,
}

/// Constraint a shape places on one property of its target entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyConstraint {
    pub property: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    /// Closed value set (`in` in SHACL terms).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub one_of: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_card: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_card: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapeDef {
    pub applies_to_entity: String,
    pub property_constraints: Vec<PropertyConstraint>,
    pub governance: Governance,
}

/// Definition kind discriminant, used by delete and by the export format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefKind {
    Entity,
    Property,
    Relation,
    Enum,
    Alias,
    Shape,
}

/// A definition of any kind, used by the repository upsert surface and the
/// JSON-LD graph serialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "@type")]
pub enum Definition {
    Entity(EntityDef),
    Property(PropertyDef),
    Relation(RelationDef),
    Enum(EnumDef),
    Alias(AliasDef),
    Shape(ShapeDef),
}

impl Definition {
    pub fn kind(&self) -> DefKind {
        match self {
            Definition::Entity(_) => DefKind::Entity,
            Definition::Property(_) => DefKind::Property,
            Definition::Relation(_) => DefKind::Relation,
            Definition::Enum(_) => DefKind::Enum,
            Definition::Alias(_) => DefKind::Alias,
            Definition::Shape(_) => DefKind::Shape,
        }
    }

    /// Identity of the definition within its kind. Properties are keyed by
    /// `owner.localName`; shapes by their target entity; aliases by their
    /// canonical term.
    pub fn key(&self) -> String {
        match self {
            Definition::Entity(d) => d.local_name.clone(),
            Definition::Property(d) => format!("{}.{}", d.owner, d.local_name),
            Definition::Relation(d) => d.local_name.clone(),
            Definition::Enum(d) => d.local_name.clone(),
            Definition::Alias(d) => d.canonical.clone(),
            Definition::Shape(d) => d.applies_to_entity.clone(),
        }
    }

    pub fn governance(&self) -> &Governance {
        match self {
            Definition::Entity(d) => &d.governance,
            Definition::Property(d) => &d.governance,
            Definition::Relation(d) => &d.governance,
            Definition::Enum(d) => &d.governance,
            Definition::Alias(d) => &d.governance,
            Definition::Shape(d) => &d.governance,
        }
    }

    pub fn governance_mut(&mut self) -> &mut Governance {
        match self {
            Definition::Entity(d) => &mut d.governance,
            Definition::Property(d) => &mut d.governance,
            Definition::Relation(d) => &mut d.governance,
            Definition::Enum(d) => &mut d.governance,
            Definition::Alias(d) => &mut d.governance,
            Definition::Shape(d) => &mut d.governance,
        }
    }
}
