use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::KeyValue;

/// Ordered environment of a service.
///
/// Serialized as a plain `[{key, value}]` array. A later entry for a key
/// overrides earlier ones, so layering environments is concatenation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceEnv(Vec<KeyValue>);

impl ServiceEnv {
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.push(KeyValue::new(key, value));
    }

    /// Effective value of `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.iter().rfind(|kv| kv.key() == key).map(KeyValue::value)
    }

    /// `self` overlaid with `over`.
    pub fn merged(&self, over: &ServiceEnv) -> ServiceEnv {
        Self(self.0.iter().chain(&over.0).cloned().collect())
    }

    /// One pair per key with its effective value, in first-seen key order.
    pub fn resolved(&self) -> Vec<(String, String)> {
        let mut slots: HashMap<&str, usize> = HashMap::new();
        let mut out: Vec<(String, String)> = Vec::new();
        for kv in &self.0 {
            match slots.get(kv.key()) {
                Some(&i) => out[i].1 = kv.value().to_string(),
                None => {
                    slots.insert(kv.key(), out.len());
                    out.push((kv.key().to_string(), kv.value().to_string()));
                }
            }
        }
        out
    }

    /// `KEY=VALUE` strings as container engines take them.
    pub fn to_engine_vars(&self) -> Vec<String> {
        self.resolved()
            .into_iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect()
    }
}

impl<K, V> FromIterator<(K, V)> for ServiceEnv
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| KeyValue::new(k, v)).collect())
    }
}
