//! Request-scoped execution context
//!
//! An [`ExecutionContext`] is built once per top-level request (from the
//! caller's base context plus whatever the context factory derives from the
//! transport request) and handed to the executor for every operation of that
//! request. It holds:
//!
//! - string-keyed JSON entries, e.g. propagated headers
//! - typed extensions keyed by Rust type, for values that are not JSON
//!   (auth principals, database handles, ...)
//! - the batch coordination entry the request handler installs when the
//!   executor supports synchronized data-loader dispatch
//!
//! Values can be added and merged but never removed.

use crate::core::dataloader::BatchCoordination;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Request-scoped key/value bag passed to the executor
#[derive(Clone, Default)]
pub struct ExecutionContext {
    entries: HashMap<String, Value>,
    extensions: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
    batch_coordination: Option<Arc<BatchCoordination>>,
}

impl ExecutionContext {
    /// Create an empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a JSON entry, replacing any previous value under the same key
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.entries.insert(key.into(), value.into());
    }

    /// Builder-style [`insert`](Self::insert)
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Get an entry deserialized into `T`
    ///
    /// Returns `None` when the key is missing or the value has another shape.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.entries
            .get(key)
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Insert a typed extension, replacing any previous value of the same type
    pub fn insert_extension<T: Send + Sync + 'static>(&mut self, value: T) {
        self.extensions.insert(TypeId::of::<T>(), Arc::new(value));
    }

    /// Builder-style [`insert_extension`](Self::insert_extension)
    pub fn with_extension<T: Send + Sync + 'static>(mut self, value: T) -> Self {
        self.insert_extension(value);
        self
    }

    pub fn extension<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.extensions
            .get(&TypeId::of::<T>())
            .and_then(|value| value.downcast_ref::<T>())
    }

    /// Merge `other` into a copy of this context
    ///
    /// On key collisions the values of `other` win. The batch coordination
    /// entry of `other` replaces this one only if `other` has one.
    pub fn merge(&self, other: &ExecutionContext) -> ExecutionContext {
        let mut merged = self.clone();
        merged
            .entries
            .extend(other.entries.iter().map(|(k, v)| (k.clone(), v.clone())));
        merged
            .extensions
            .extend(other.extensions.iter().map(|(k, v)| (*k, v.clone())));
        if other.batch_coordination.is_some() {
            merged.batch_coordination = other.batch_coordination.clone();
        }
        merged
    }

    /// Copy of this context carrying the given batch coordination entry
    pub fn with_batch_coordination(&self, coordination: Option<Arc<BatchCoordination>>) -> Self {
        let mut context = self.clone();
        context.batch_coordination = coordination;
        context
    }

    pub fn batch_coordination(&self) -> Option<&Arc<BatchCoordination>> {
        self.batch_coordination.as_ref()
    }

    /// Number of JSON entries plus typed extensions
    pub fn len(&self) -> usize {
        self.entries.len() + self.extensions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.extensions.is_empty()
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("entries", &self.entries)
            .field("extension_count", &self.extensions.len())
            .field(
                "batch_size",
                &self.batch_coordination.as_ref().map(|c| c.size()),
            )
            .finish()
    }
}
