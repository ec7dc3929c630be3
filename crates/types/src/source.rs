//! External input requests

use std::collections::BTreeMap;

use osforge_hash::Checksum;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Items to fetch from one source origin (`org.osforge.curl`, ...).
///
/// Each item is keyed by the checksum it must hash to; the value is the
/// origin-specific description of where to get it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRequest {
    #[serde(skip)]
    pub name: String,
    #[serde(default)]
    pub items: BTreeMap<Checksum, Value>,
    #[serde(default)]
    pub options: Map<String, Value>,
}

impl SourceRequest {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            items: BTreeMap::new(),
            options: Map::new(),
        }
    }

    #[must_use]
    pub fn with_item(mut self, checksum: Checksum, desc: impl Into<Value>) -> Self {
        self.items.insert(checksum, desc.into());
        self
    }

    #[must_use]
    pub fn contains(&self, checksum: &Checksum) -> bool {
        self.items.contains_key(checksum)
    }

    /// The item map in its wire form, `{checksum: description}`.
    #[must_use]
    pub fn items_json(&self) -> Value {
        Value::Object(
            self.items
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        )
    }
}
