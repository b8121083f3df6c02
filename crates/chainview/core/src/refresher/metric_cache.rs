use parking_lot::RwLock;
use serde::{Serialize, de::DeserializeOwned};
use std::{collections::HashMap, sync::Arc};

/// Flat store of slow aggregates, keyed by metric name.
///
/// Values are kept as JSON and replaced wholesale on every refresh; readers get the last
/// complete value.
#[derive(Debug, Default)]
pub struct MetricCache {
    values: RwLock<HashMap<&'static str, Arc<serde_json::Value>>>,
}

impl MetricCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the value stored under `name`.
    pub fn set<T: Serialize>(&self, name: &'static str, value: &T) -> Result<(), serde_json::Error> {
        let value = Arc::new(serde_json::to_value(value)?);
        self.values.write().insert(name, value);
        Ok(())
    }

    /// Raw JSON stored under `name`.
    pub fn get_raw(&self, name: &str) -> Option<Arc<serde_json::Value>> {
        self.values.read().get(name).cloned()
    }

    /// Decodes the value stored under `name`.
    pub fn get<T: DeserializeOwned>(&self, name: &str) -> Option<Result<T, serde_json::Error>> {
        let value = self.get_raw(name)?;
        Some(T::deserialize(value.as_ref()))
    }
}
