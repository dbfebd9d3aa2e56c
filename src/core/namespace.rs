//! Tenant/scenario namespace, the unit of data isolation.
//!
//! Every index directory, cache instance, and statistics counter is keyed
//! by a [`Namespace`]. Nothing loaded under one namespace is ever visible
//! to a request running under another; isolation is structural, not
//! checked at query time.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// The `(tenant_id, scenario_id)` pair that scopes all data access.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Namespace {
    /// Opaque tenant identifier.
    pub tenant_id: String,
    /// Opaque scenario identifier (e.g. `tender`, `enterprise`).
    pub scenario_id: String,
}

impl Namespace {
    /// Creates a namespace from tenant and scenario identifiers.
    #[must_use]
    pub fn new(tenant_id: impl Into<String>, scenario_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            scenario_id: scenario_id.into(),
        }
    }

    /// Directory holding this namespace's vector index files.
    ///
    /// `<root>/databases/vector_dbs/<tenant_id>/<scenario_id>/`
    #[must_use]
    pub fn vector_dir(&self, root: &std::path::Path) -> PathBuf {
        root.join("databases")
            .join("vector_dbs")
            .join(&self.tenant_id)
            .join(&self.scenario_id)
    }

    /// Directory holding this namespace's BM25 bundles.
    ///
    /// `<root>/databases/bm25/<tenant_id>/<scenario_id>/`
    #[must_use]
    pub fn bm25_dir(&self, root: &std::path::Path) -> PathBuf {
        root.join("databases")
            .join("bm25")
            .join(&self.tenant_id)
            .join(&self.scenario_id)
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.tenant_id, self.scenario_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_namespace_display() {
        let ns = Namespace::new("t1", "tender");
        assert_eq!(ns.to_string(), "t1/tender");
    }

    #[test]
    fn test_namespace_paths() {
        let ns = Namespace::new("t1", "tender");
        let root = Path::new("/data");
        assert_eq!(
            ns.vector_dir(root),
            PathBuf::from("/data/databases/vector_dbs/t1/tender")
        );
        assert_eq!(
            ns.bm25_dir(root),
            PathBuf::from("/data/databases/bm25/t1/tender")
        );
    }

    #[test]
    fn test_namespace_equality_and_hash() {
        use std::collections::HashMap;
        let mut map = HashMap::new();
        map.insert(Namespace::new("a", "s"), 1);
        assert_eq!(map.get(&Namespace::new("a", "s")), Some(&1));
        assert_eq!(map.get(&Namespace::new("b", "s")), None);
    }
}
