use crate::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Named script variables shared by the flows of one session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Variables {
    values: BTreeMap<String, Value>,
}

impl Variables {
    pub fn new() -> Self {
        Self::default()
    }

    /// A name is valid when it is non-empty and not taken yet
    pub fn name_valid(&self, name: &str) -> bool {
        !name.is_empty() && !self.values.contains_key(name)
    }

    /// Create a variable; returns `false` for an invalid name
    pub fn create(&mut self, name: &str, value: Value) -> bool {
        if !self.name_valid(name) {
            return false;
        }
        self.values.insert(name.to_string(), value);
        true
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Set an existing variable; returns `false` if it does not exist
    pub fn set(&mut self, name: &str, value: Value) -> bool {
        match self.values.get_mut(name) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    pub fn delete(&mut self, name: &str) -> Option<Value> {
        self.values.remove(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}
