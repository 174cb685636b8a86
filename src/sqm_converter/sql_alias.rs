//! SQL alias allocation.
//!
//! Each from-element gets an alias base built from an acronym stem plus a
//! per-stem counter (`Employee` → `e1`, `e2`; `lineItems` → `li1`). Tables of
//! the group are numbered below it: `e1_0`, `e1_1`.

use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlAliasBase {
    alias_stem: String,
    next_table: u32,
}

impl SqlAliasBase {
    pub fn alias_stem(&self) -> &str {
        &self.alias_stem
    }

    pub fn generate_new_alias(&mut self) -> String {
        let alias = format!("{}_{}", self.alias_stem, self.next_table);
        self.next_table += 1;
        alias
    }
}

#[derive(Debug, Default)]
pub struct SqlAliasBaseManager {
    counters: HashMap<String, u32>,
}

impl SqlAliasBaseManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_alias_base(&mut self, stem: &str) -> SqlAliasBase {
        let counter = self.counters.entry(stem.to_string()).or_insert(0);
        *counter += 1;
        SqlAliasBase {
            alias_stem: format!("{}{}", stem, counter),
            next_table: 0,
        }
    }
}

/// `com.acme.CustomerOrder` → `co`
pub fn stem_from_entity_name(entity_name: &str) -> String {
    let unqualified = entity_name.rsplit('.').next().unwrap_or(entity_name);
    acronym(unqualified)
}

/// `lineItems` → `li`
pub fn stem_from_attribute_name(attribute_name: &str) -> String {
    acronym(attribute_name)
}

fn acronym(name: &str) -> String {
    let mut stem = String::new();
    for (i, ch) in name.chars().enumerate() {
        if !ch.is_alphanumeric() {
            continue;
        }
        if i == 0 || ch.is_uppercase() {
            stem.extend(ch.to_lowercase());
        }
    }
    if stem.is_empty() || !stem.starts_with(|c: char| c.is_alphabetic()) {
        stem.insert(0, 't');
    }
    stem
}
