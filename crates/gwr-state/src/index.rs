//! Index layer.
//!
//! Every table declares its indexes statically (see [`crate::schema`]). All
//! three index kinds answer the same question, "which record ids sit under
//! this value", so lookups and enumeration share one path in the table.

use std::collections::BTreeMap;

use gwr_schemas::Entity;

/// Extracts the indexed value from a record. `None` means "not indexed".
pub type FieldFn = fn(&Entity) -> Option<String>;

/// Decides membership of a conditional index.
pub type PredicateFn = fn(&Entity) -> bool;

/// Bucket value under which conditional indexes file matching records.
pub const CONDITION_TRUE: &str = "true";

#[derive(Clone, Copy)]
pub enum Indexer {
    /// One value maps to exactly one record.
    Unique(FieldFn),
    /// One value maps to many records, kept in insertion order.
    Association(FieldFn),
    /// Records for which the predicate holds, under [`CONDITION_TRUE`].
    Conditional(PredicateFn),
}

impl Indexer {
    pub fn key(&self, entity: &Entity) -> Option<String> {
        match self {
            Indexer::Unique(f) | Indexer::Association(f) => f(entity),
            Indexer::Conditional(p) => p(entity).then(|| CONDITION_TRUE.to_string()),
        }
    }

    pub fn is_unique(&self) -> bool {
        matches!(self, Indexer::Unique(_))
    }
}

pub struct IndexSchema {
    pub name: &'static str,
    pub indexer: Indexer,
}

#[derive(Clone, Debug)]
pub(crate) enum IndexData {
    Unique(BTreeMap<String, String>),
    Multi(BTreeMap<String, Vec<String>>),
}

impl IndexData {
    pub(crate) fn for_indexer(indexer: &Indexer) -> Self {
        if indexer.is_unique() {
            IndexData::Unique(BTreeMap::new())
        } else {
            IndexData::Multi(BTreeMap::new())
        }
    }

    pub(crate) fn ids(&self, value: &str) -> Vec<&str> {
        match self {
            IndexData::Unique(m) => m.get(value).map(|id| vec![id.as_str()]).unwrap_or_default(),
            IndexData::Multi(m) => m
                .get(value)
                .map(|ids| ids.iter().map(String::as_str).collect())
                .unwrap_or_default(),
        }
    }

    /// Owner of `value` in a unique index.
    pub(crate) fn owner(&self, value: &str) -> Option<&str> {
        match self {
            IndexData::Unique(m) => m.get(value).map(String::as_str),
            IndexData::Multi(_) => None,
        }
    }

    pub(crate) fn add(&mut self, value: String, id: &str) {
        match self {
            IndexData::Unique(m) => {
                m.insert(value, id.to_string());
            }
            IndexData::Multi(m) => {
                let bucket = m.entry(value).or_default();
                if !bucket.iter().any(|x| x == id) {
                    bucket.push(id.to_string());
                }
            }
        }
    }

    pub(crate) fn remove(&mut self, value: &str, id: &str) {
        match self {
            IndexData::Unique(m) => {
                if m.get(value).map(String::as_str) == Some(id) {
                    m.remove(value);
                }
            }
            IndexData::Multi(m) => {
                let empty = match m.get_mut(value) {
                    Some(bucket) => {
                        bucket.retain(|x| x != id);
                        bucket.is_empty()
                    }
                    None => false,
                };
                if empty {
                    m.remove(value);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multi_bucket_keeps_insertion_order_and_drops_empty_buckets() {
        let mut idx = IndexData::Multi(BTreeMap::new());
        idx.add("s1".into(), "r2");
        idx.add("s1".into(), "r1");
        idx.add("s1".into(), "r2");
        assert_eq!(idx.ids("s1"), vec!["r2", "r1"]);

        idx.remove("s1", "r2");
        idx.remove("s1", "r1");
        match &idx {
            IndexData::Multi(m) => assert!(m.is_empty()),
            IndexData::Unique(_) => unreachable!(),
        }
    }

    #[test]
    fn unique_remove_ignores_foreign_owner() {
        let mut idx = IndexData::Unique(BTreeMap::new());
        idx.add("svc".into(), "s1");
        idx.remove("svc", "s2");
        assert_eq!(idx.owner("svc"), Some("s1"));
    }
}
