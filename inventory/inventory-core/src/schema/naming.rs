//! Wire-name translation.
//!
//! Wire names are lower-case and hyphenated (`p-interface`). Identifiers are
//! UpperCamel (`PInterface`). Collections are plural wire names (`pservers`).
//! A handful of types don't follow the generic rules; those live in explicit
//! exception tables that are consulted first in both directions.

use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct NamingTable {
    plural: HashMap<String, String>,
    singular: HashMap<String, String>,
    identifier: HashMap<String, String>,
    wire: HashMap<String, String>,
}

impl Default for NamingTable {
    fn default() -> Self {
        Self::empty()
            .with_plural_exception("metadatum", "metadata")
            .with_plural_exception("cvlan-tag-entry", "cvlan-tags")
            .with_plural_exception("l3-interface-ipv4-address-list", "l3-interface-ipv4-address-list")
            .with_plural_exception("l3-interface-ipv6-address-list", "l3-interface-ipv6-address-list")
            .with_identifier_exception("vnfc", "VNFC")
            .with_identifier_exception("pnf", "PNF")
    }
}

impl NamingTable {
    /// A table with no exceptions
    pub fn empty() -> Self {
        Self {
            plural: HashMap::new(),
            singular: HashMap::new(),
            identifier: HashMap::new(),
            wire: HashMap::new(),
        }
    }

    /// Register an irregular singular/plural pair
    pub fn with_plural_exception(mut self, singular: &str, plural: &str) -> Self {
        self.plural.insert(singular.to_string(), plural.to_string());
        self.singular.insert(plural.to_string(), singular.to_string());
        self
    }

    /// Register an irregular wire/identifier pair
    pub fn with_identifier_exception(mut self, wire: &str, identifier: &str) -> Self {
        self.identifier.insert(wire.to_string(), identifier.to_string());
        self.wire.insert(identifier.to_string(), wire.to_string());
        self
    }

    pub fn pluralize(&self, singular: &str) -> String {
        if let Some(plural) = self.plural.get(singular) {
            return plural.clone();
        }
        if let Some(stem) = singular.strip_suffix('y') {
            if !stem.ends_with(['a', 'e', 'i', 'o', 'u']) {
                return format!("{}ies", stem);
            }
        }
        if ["s", "x", "ch", "sh"].iter().any(|s| singular.ends_with(s)) {
            return format!("{}es", singular);
        }
        format!("{}s", singular)
    }

    pub fn singularize(&self, plural: &str) -> String {
        if let Some(singular) = self.singular.get(plural) {
            return singular.clone();
        }
        if let Some(stem) = plural.strip_suffix("ies") {
            return format!("{}y", stem);
        }
        for suffix in ["ses", "xes", "ches", "shes"] {
            if plural.ends_with(suffix) {
                return plural[..plural.len() - 2].to_string();
            }
        }
        plural.strip_suffix('s').unwrap_or(plural).to_string()
    }

    /// `p-interface` -> `PInterface`
    pub fn to_identifier(&self, wire: &str) -> String {
        if let Some(identifier) = self.identifier.get(wire) {
            return identifier.clone();
        }
        wire.split('-')
            .filter(|s| !s.is_empty())
            .map(|segment| {
                let mut chars = segment.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                    None => String::new(),
                }
            })
            .collect()
    }

    /// `PInterface` or `pInterface` -> `p-interface`
    pub fn to_wire(&self, identifier: &str) -> String {
        if let Some(wire) = self.wire.get(identifier) {
            return wire.clone();
        }
        let mut out = String::with_capacity(identifier.len() + 4);
        for (i, c) in identifier.chars().enumerate() {
            if c.is_ascii_uppercase() {
                if i > 0 {
                    out.push('-');
                }
                out.push(c.to_ascii_lowercase());
            } else {
                out.push(c);
            }
        }
        out
    }
}
