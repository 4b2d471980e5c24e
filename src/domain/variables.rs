use crate::error::{ResolveError, ScopeKind};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

/// A value stored in a scope's variable bag
pub type Value = Arc<dyn Any + Send + Sync>;

/// Key/value bag shared between the setup steps of one scope.
///
/// Hooks write into it (typically a discovered host port) and resolvers read
/// from it later in the same or a following phase.
pub struct Variables {
    scope: ScopeKind,
    values: RwLock<HashMap<String, Value>>,
}

impl Variables {
    pub fn new(scope: ScopeKind) -> Self {
        Self {
            scope,
            values: RwLock::new(HashMap::new()),
        }
    }

    pub fn set<V: Any + Send + Sync>(&self, key: impl Into<String>, value: V) {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), Arc::new(value));
    }

    /// `None` when the key was never set
    pub fn get(&self, key: &str) -> Option<Value> {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Reads a string variable, accepting both `String` and `&'static str`
    pub fn get_string(&self, key: &str) -> Result<String, ResolveError> {
        let value = self.get(key).ok_or_else(|| ResolveError::NotFound {
            kind: "variable",
            name: key.to_string(),
            scope: self.scope,
        })?;

        if let Some(s) = value.downcast_ref::<String>() {
            return Ok(s.clone());
        }
        if let Some(s) = value.downcast_ref::<&'static str>() {
            return Ok((*s).to_string());
        }

        Err(ResolveError::TypeMismatch {
            kind: "variable",
            name: key.to_string(),
            scope: self.scope,
        })
    }

    pub fn len(&self) -> usize {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for Variables {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let values = self.values.read().unwrap_or_else(PoisonError::into_inner);
        let mut keys: Vec<_> = values.keys().collect();
        keys.sort();
        f.debug_struct("Variables")
            .field("scope", &self.scope)
            .field("keys", &keys)
            .finish()
    }
}
