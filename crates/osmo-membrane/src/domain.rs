//! Domain names

use std::sync::Arc;

/// Identifier of an isolated object graph
///
/// Cheap to clone and compare; two domains are equal iff their names are.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Domain(Arc<str>);

impl Domain {
    /// Create a domain identifier from a name
    pub fn new(name: &str) -> Self {
        Self(Arc::from(name))
    }

    /// The domain name
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Domain {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl std::fmt::Display for Domain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Debug for Domain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Domain({})", self.0)
    }
}
