//! Old-to-new identifier maps.

use std::collections::HashMap;

use serde::Serialize;

use crate::core::value::Identifier;

/// Mapping from source identifiers to destination identifiers for one table.
///
/// Keeps insertion order for logging. `rows` counts inserted rows, which can
/// exceed `len()` when several rows share a key (geometry parts with one link).
#[derive(Debug, Clone, Default, Serialize)]
pub struct IdentifierMap {
    /// Logical table name.
    pub table: String,
    /// Source field the keys were read from.
    pub in_field: String,
    /// Destination field the values were written to.
    pub out_field: String,
    /// Rows inserted into the destination.
    pub rows: usize,
    entries: Vec<(Identifier, Identifier)>,
    #[serde(skip)]
    index: HashMap<Identifier, usize>,
}

impl IdentifierMap {
    pub fn new(table: impl Into<String>, in_field: impl Into<String>, out_field: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            in_field: in_field.into(),
            out_field: out_field.into(),
            ..Default::default()
        }
    }

    /// Record a copied row. A repeated key keeps its first mapping.
    pub fn record(&mut self, old: Identifier, new: Identifier) {
        self.rows += 1;
        if !self.index.contains_key(&old) {
            self.index.insert(old.clone(), self.entries.len());
            self.entries.push((old, new));
        }
    }

    /// The new identifier for `old`, minting one with `mint` on first use.
    pub fn get_or_mint(&mut self, old: &Identifier, mint: impl FnOnce() -> Identifier) -> Identifier {
        if let Some(new) = self.get(old) {
            return new.clone();
        }
        let new = mint();
        self.index.insert(old.clone(), self.entries.len());
        self.entries.push((old.clone(), new.clone()));
        new
    }

    pub fn get(&self, old: &Identifier) -> Option<&Identifier> {
        self.index.get(old).map(|i| &self.entries[*i].1)
    }

    pub fn contains(&self, old: &Identifier) -> bool {
        self.index.contains_key(old)
    }

    /// Number of distinct source identifiers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `(old, new)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &(Identifier, Identifier)> {
        self.entries.iter()
    }

    /// Source identifiers in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &Identifier> {
        self.entries.iter().map(|(old, _)| old)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_keeps_first_mapping_and_counts_rows() {
        let mut map = IdentifierMap::new("REVTABLEPOINT", "LINKID", "LINKGUID");
        map.record(Identifier::Int(1), Identifier::Int(10));
        map.record(Identifier::Int(1), Identifier::Int(11));
        map.record(Identifier::Int(2), Identifier::Int(20));
        assert_eq!(map.len(), 2);
        assert_eq!(map.rows, 3);
        assert_eq!(map.get(&Identifier::Int(1)), Some(&Identifier::Int(10)));
        assert_eq!(map.keys().cloned().collect::<Vec<_>>(), vec![Identifier::Int(1), Identifier::Int(2)]);
    }

    #[test]
    fn test_get_or_mint_is_memoized() {
        let mut map = IdentifierMap::new("REVCHECKRUNTABLE", "CHECKRUNID", "CHECKRUNID");
        let a = map.get_or_mint(&Identifier::Int(7), Identifier::new_guid);
        let b = map.get_or_mint(&Identifier::Int(7), Identifier::new_guid);
        assert_eq!(a, b);
        assert_eq!(map.len(), 1);
        assert_eq!(map.rows, 0);
    }
}
