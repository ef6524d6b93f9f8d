//! Service references
//!
//! TigerStyle: Identity-based equality, immutable shared properties.

use crate::constants::{COMPONENT_ID_PROPERTY, COMPONENT_NAME_PROPERTY};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Identity of a registered service, issued by the service directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ServiceId(u64);

impl ServiceId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of a live component instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ComponentId(u64);

impl ComponentId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Handle to a service in the service directory
///
/// Two references are equal when they point at the same service, whatever
/// properties each copy carries.
#[derive(Clone)]
pub struct ServiceRef {
    id: ServiceId,
    properties: Arc<BTreeMap<String, Value>>,
}

impl ServiceRef {
    pub fn new(id: ServiceId) -> Self {
        Self {
            id,
            properties: Arc::new(BTreeMap::new()),
        }
    }

    /// Create a reference with the given properties
    pub fn with_properties(id: ServiceId, properties: BTreeMap<String, Value>) -> Self {
        Self {
            id,
            properties: Arc::new(properties),
        }
    }

    /// Add a property, returning the updated reference
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        Arc::make_mut(&mut self.properties).insert(key.into(), value.into());
        self
    }

    pub fn id(&self) -> ServiceId {
        self.id
    }

    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    pub fn properties(&self) -> &BTreeMap<String, Value> {
        &self.properties
    }

    /// Name of the component that registered this service, if any
    pub fn component_name(&self) -> Option<&str> {
        self.property(COMPONENT_NAME_PROPERTY)
            .and_then(Value::as_str)
    }

    /// True when the service was registered by a component of this runtime
    pub fn is_component_service(&self) -> bool {
        self.properties.contains_key(COMPONENT_NAME_PROPERTY)
            && self.properties.contains_key(COMPONENT_ID_PROPERTY)
    }
}

impl PartialEq for ServiceRef {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ServiceRef {}

impl Hash for ServiceRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for ServiceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceRef")
            .field("id", &self.id)
            .field("component", &self.component_name())
            .finish()
    }
}

impl fmt::Display for ServiceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.component_name() {
            Some(name) => write!(f, "service {} ({})", self.id, name),
            None => write!(f, "service {}", self.id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_equality_by_id() {
        let a = ServiceRef::new(ServiceId::new(1)).with_property("x", 1);
        let b = ServiceRef::new(ServiceId::new(1)).with_property("x", 2);
        let c = ServiceRef::new(ServiceId::new(2));

        assert_eq!(a, b);
        assert_ne!(a, c);

        let set: HashSet<_> = [a, b, c].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_component_service_requires_name_and_id() {
        let plain = ServiceRef::new(ServiceId::new(5));
        assert!(!plain.is_component_service());

        let named = plain.clone().with_property(COMPONENT_NAME_PROPERTY, "Foo");
        assert!(!named.is_component_service());
        assert_eq!(named.component_name(), Some("Foo"));

        let full = named.with_property(COMPONENT_ID_PROPERTY, 12);
        assert!(full.is_component_service());
        assert_eq!(full.to_string(), "service 5 (Foo)");
    }

    #[test]
    fn test_with_property_does_not_affect_clones() {
        let base = ServiceRef::new(ServiceId::new(1));
        let copy = base.clone().with_property("k", "v");
        assert!(base.property("k").is_none());
        assert_eq!(copy.property("k"), Some(&Value::from("v")));
    }
}
