use std::collections::BTreeMap;

use serde_json::Value;

/// A point-in-time copy of one collection: child key -> stored value.
///
/// Values are kept as raw JSON so callers decide how to treat malformed entries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    children: BTreeMap<String, Value>,
}

impl Snapshot {
    pub fn new(children: BTreeMap<String, Value>) -> Self {
        Self { children }
    }

    pub fn exists(&self, child: &str) -> bool {
        self.children.contains_key(child)
    }

    pub fn num_children(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn get(&self, child: &str) -> Option<&Value> {
        self.children.get(child)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.children.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl FromIterator<(String, Value)> for Snapshot {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            children: iter.into_iter().collect(),
        }
    }
}
