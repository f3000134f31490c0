//! Named collaborator registries and the shared execution context.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use crate::collaborators::{Parser, Source, Storage, Tagger};
use crate::error::TaskError;

/// A name -> collaborator map for one collaborator kind.
pub struct Registry<T: ?Sized> {
    kind: &'static str,
    entries: BTreeMap<String, Arc<T>>,
}

impl<T: ?Sized> Registry<T> {
    /// Creates an empty registry; `kind` names the collaborator kind in errors.
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            entries: BTreeMap::new(),
        }
    }

    /// Registers a collaborator, replacing and returning any previous entry.
    pub fn register(&mut self, name: impl Into<String>, collaborator: Arc<T>) -> Option<Arc<T>> {
        self.entries.insert(name.into(), collaborator)
    }

    pub fn get(&self, name: &str) -> Option<Arc<T>> {
        self.entries.get(name).cloned()
    }

    /// Looks up a collaborator, failing with `CollaboratorNotRegistered`.
    pub fn require(&self, name: &str) -> Result<Arc<T>, TaskError> {
        self.get(name).ok_or_else(|| TaskError::CollaboratorNotRegistered {
            kind: self.kind,
            name: name.to_string(),
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }
}

impl<T: ?Sized> Clone for Registry<T> {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            entries: self.entries.clone(),
        }
    }
}

impl<T: ?Sized> fmt::Debug for Registry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("kind", &self.kind)
            .field("names", &self.names())
            .finish()
    }
}

/// The four collaborator registries a pipeline resolves stages against.
#[derive(Clone, Debug)]
pub struct Collaborators {
    pub sources: Registry<dyn Source>,
    pub parsers: Registry<dyn Parser>,
    pub taggers: Registry<dyn Tagger>,
    pub storages: Registry<dyn Storage>,
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            sources: Registry::new("Source"),
            parsers: Registry::new("Parser"),
            taggers: Registry::new("Tagger"),
            storages: Registry::new("Storage"),
        }
    }
}

/// Context handed to every task of a pipeline run.
///
/// Holds the collaborator registries plus free-form values added with
/// `Pipeline::add_context`.
#[derive(Clone, Debug, Default)]
pub struct ExecutionContext {
    collaborators: Collaborators,
    data: HashMap<String, serde_json::Value>,
}

impl ExecutionContext {
    pub fn new(collaborators: Collaborators) -> Self {
        Self {
            collaborators,
            data: HashMap::new(),
        }
    }

    pub fn collaborators(&self) -> &Collaborators {
        &self.collaborators
    }

    pub fn set_collaborators(&mut self, collaborators: Collaborators) {
        self.collaborators = collaborators;
    }

    pub fn insert(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.data.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.data.get(key)
    }
}
