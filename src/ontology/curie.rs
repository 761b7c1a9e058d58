// src/ontology/curie.rs
// CURIE expansion against a prefix table.

use std::collections::HashMap;

use crate::error::{Result, ServerError};

/// Default namespace for LimboDancer-owned terms.
pub const LDM_NS: &str = "https://limbodancer.ai/ontology/";

/// Prefix table used to expand `prefix:local` CURIEs. Absolute IRIs pass
/// through unchanged.
#[derive(Debug, Clone)]
pub struct PrefixTable {
    prefixes: HashMap<String, String>,
}

impl Default for PrefixTable {
    fn default() -> Self {
        let mut prefixes = HashMap::new();
        prefixes.insert("ldm".into(), LDM_NS.into());
        prefixes.insert("rdf".into(), "http://www.w3.org/1999/02/22-rdf-syntax-ns#".into());
        prefixes.insert("rdfs".into(), "http://www.w3.org/2000/01/rdf-schema#".into());
        prefixes.insert("xsd".into(), "http://www.w3.org/2001/XMLSchema#".into());
        prefixes.insert("owl".into(), "http://www.w3.org/2002/07/owl#".into());
        Self { prefixes }
    }
}

impl PrefixTable {
    pub fn with_prefix(mut self, prefix: impl Into<String>, ns: impl Into<String>) -> Self {
        self.prefixes.insert(prefix.into(), ns.into());
        self
    }

    pub fn namespace(&self, prefix: &str) -> Option<&str> {
        self.prefixes.get(prefix).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.prefixes.iter().map(|(p, ns)| (p.as_str(), ns.as_str()))
    }

    /// Expand a term. `prefix:local` resolves through the table; absolute
    /// IRIs are returned unchanged; a term with no colon is returned as-is
    /// (callers treat it as a local name).
    pub fn expand(&self, term: &str) -> Result<String> {
        if term.contains("://") {
            return Ok(term.to_string());
        }
        match term.split_once(':') {
            Some((prefix, local)) => match self.prefixes.get(prefix) {
                Some(ns) => Ok(format!("{ns}{local}")),
                None => Err(ServerError::UnknownPrefix(prefix.to_string())),
            },
            None => Ok(term.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_known_prefixes() {
        let table = PrefixTable::default();
        assert_eq!(
            table.expand("ldm:Person").unwrap(),
            format!("{LDM_NS}Person")
        );
        assert_eq!(
            table.expand("xsd:string").unwrap(),
            "http://www.w3.org/2001/XMLSchema#string"
        );
    }

    #[test]
    fn absolute_iris_pass_through() {
        let table = PrefixTable::default();
        let iri = "https://example.com/x#y";
        assert_eq!(table.expand(iri).unwrap(), iri);
    }

    #[test]
    fn unknown_prefix_errors() {
        let table = PrefixTable::default();
        let err = table.expand("nope:thing").unwrap_err();
        assert!(matches!(err, ServerError::UnknownPrefix(p) if p == "nope"));
    }

    #[test]
    fn bare_local_name_passes_through() {
        let table = PrefixTable::default();
        assert_eq!(table.expand("Person").unwrap(), "Person");
    }
}
