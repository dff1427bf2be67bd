//! Name → filter table
//!
//! Built once at startup and then shared read-only. Registration conflicts
//! are reported immediately, never deferred to evaluation.

use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::{format, text, validators};
use crate::error::{FilterError, RegistryError};
use crate::value::Value;

/// Signature of every filter: current value and raw parameter text in,
/// new value out
pub type FilterFn = Arc<dyn Fn(&Value, &str) -> Result<Value, FilterError> + Send + Sync>;

/// A registered filter with its user-facing documentation
#[derive(Clone)]
pub struct Filter {
    pub name: String,
    pub description: String,
    pub usage: String,
    function: FilterFn,
}

impl Filter {
    pub fn call(&self, value: &Value, params: &str) -> Result<Value, FilterError> {
        (self.function)(value, params)
    }
}

impl fmt::Debug for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Filter")
            .field("name", &self.name)
            .field("usage", &self.usage)
            .finish_non_exhaustive()
    }
}

/// Listing entry returned by [`FilterRegistry::describe`]
#[derive(Debug, Clone, Serialize)]
pub struct FilterInfo {
    pub name: String,
    pub description: String,
    pub usage: String,
}

#[derive(Debug, Clone, Default)]
pub struct FilterRegistry {
    filters: HashMap<String, Filter>,
}

impl FilterRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every built-in transform and validator
    pub fn builtin() -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        text::install(&mut registry)?;
        format::install(&mut registry)?;
        validators::install(&mut registry)?;
        Ok(registry)
    }

    /// Adds a filter under a new name
    pub fn register<F>(
        &mut self,
        name: &str,
        description: &str,
        usage: &str,
        function: F,
    ) -> Result<&mut Self, RegistryError>
    where
        F: Fn(&Value, &str) -> Result<Value, FilterError> + Send + Sync + 'static,
    {
        if self.filters.contains_key(name) {
            return Err(RegistryError::AlreadyRegistered(name.to_string()));
        }
        self.insert(name, description, usage, Arc::new(function));
        Ok(self)
    }

    /// Overrides an existing filter
    pub fn replace<F>(
        &mut self,
        name: &str,
        description: &str,
        usage: &str,
        function: F,
    ) -> Result<&mut Self, RegistryError>
    where
        F: Fn(&Value, &str) -> Result<Value, FilterError> + Send + Sync + 'static,
    {
        if !self.filters.contains_key(name) {
            return Err(RegistryError::NotRegistered(name.to_string()));
        }
        self.insert(name, description, usage, Arc::new(function));
        Ok(self)
    }

    fn insert(&mut self, name: &str, description: &str, usage: &str, function: FilterFn) {
        self.filters.insert(
            name.to_string(),
            Filter {
                name: name.to_string(),
                description: description.to_string(),
                usage: usage.to_string(),
                function,
            },
        );
    }

    pub fn get(&self, name: &str) -> Option<&Filter> {
        self.filters.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.filters.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Calls one filter by name
    pub fn apply(&self, name: &str, value: &Value, params: &str) -> Result<Value, FilterError> {
        match self.filters.get(name) {
            Some(filter) => filter.call(value, params),
            None => Err(FilterError::NotFound(name.to_string())),
        }
    }

    /// All filters sorted by name
    pub fn describe(&self) -> Vec<FilterInfo> {
        let mut infos: Vec<FilterInfo> = self
            .filters
            .values()
            .map(|f| FilterInfo {
                name: f.name.clone(),
                description: f.description.clone(),
                usage: f.usage.clone(),
            })
            .collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shout(value: &Value, _params: &str) -> Result<Value, FilterError> {
        super::super::map_text(value, |s| Ok(s.to_uppercase()))
    }

    #[test]
    fn test_register_conflict() {
        let mut registry = FilterRegistry::new();
        registry.register("shout", "upper case", "shout", shout).unwrap();

        let err = registry.register("shout", "again", "shout", shout).unwrap_err();
        assert_eq!(err, RegistryError::AlreadyRegistered("shout".to_string()));
    }

    #[test]
    fn test_replace_requires_existing() {
        let mut registry = FilterRegistry::new();
        let err = registry.replace("shout", "upper case", "shout", shout).unwrap_err();
        assert_eq!(err, RegistryError::NotRegistered("shout".to_string()));

        registry.register("shout", "upper case", "shout", shout).unwrap();
        registry
            .replace("shout", "lower case", "shout", |v, _| {
                super::super::map_text(v, |s| Ok(s.to_lowercase()))
            })
            .unwrap();
        assert_eq!(registry.apply("shout", &Value::from("AbC"), "").unwrap(), Value::from("abc"));
    }

    #[test]
    fn test_builtin_table() {
        let registry = FilterRegistry::builtin().unwrap();
        for name in ["preadd", "trimspace", "paging", "sprintfmap", "quote", "_required", "_match2"] {
            assert!(registry.contains(name), "missing {}", name);
        }

        let listing = registry.describe();
        assert_eq!(listing.len(), registry.len());
        assert!(listing.windows(2).all(|w| w[0].name < w[1].name));
    }

    #[test]
    fn test_unknown_filter() {
        let registry = FilterRegistry::new();
        assert_eq!(
            registry.apply("nope", &Value::from("x"), ""),
            Err(FilterError::NotFound("nope".to_string()))
        );
    }
}
