//! Web-server topology interface consumed by the correlator.
//!
//! The correlator only needs three queries: list sites, list application
//! pools, and resolve the pool serving a site + path. [`Topology`] is the
//! in-memory snapshot answering them; [`TopologyEnumerator`] is implemented by
//! whatever produces a snapshot (a live host, a JSON fixture).

use anyhow::Context;
use async_trait::async_trait;
use iisrecon_report_schema::{
    normalize_application_path, EnumerationError, TopologyApplicationPool, TopologySite,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// The topology source could not be reached at all.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TopologyError {
    #[error("Topology enumeration unavailable: {0}")]
    EnumerationUnavailable(String),
}

/// Query surface over an enumerated topology.
pub trait TopologyQuery {
    fn sites(&self) -> &[TopologySite];

    fn pools(&self) -> &[TopologyApplicationPool];

    /// Pool serving `application_path` on `site_name`. The root path resolves
    /// to the site's default pool; other paths to the matching application's
    /// pool, or `None` when no such application exists.
    fn resolve_pool(&self, site_name: &str, application_path: &str) -> Option<String>;

    /// Site lookup, ignoring ASCII case.
    fn find_site(&self, name: &str) -> Option<&TopologySite> {
        self.sites().iter().find(|s| s.name.eq_ignore_ascii_case(name))
    }

    fn find_pool(&self, name: &str) -> Option<&TopologyApplicationPool> {
        self.pools().iter().find(|p| p.name.eq_ignore_ascii_case(name))
    }

    /// Whether `application_path` exists under `site_name`. The root always
    /// exists when the site does.
    fn has_application(&self, site_name: &str, application_path: &str) -> bool {
        let Some(site) = self.find_site(site_name) else {
            return false;
        };
        let path = normalize_application_path(application_path);
        path == "/"
            || site
                .applications
                .iter()
                .any(|a| normalize_application_path(&a.path).eq_ignore_ascii_case(&path))
    }
}

/// Enumerated sites and pools, plus the entities that failed to enumerate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topology {
    pub sites: Vec<TopologySite>,
    pub pools: Vec<TopologyApplicationPool>,
    #[serde(default)]
    pub errors: Vec<EnumerationError>,
}

impl Topology {
    pub fn new(sites: Vec<TopologySite>, pools: Vec<TopologyApplicationPool>) -> Self {
        Self {
            sites,
            pools,
            errors: Vec::new(),
        }
    }

    pub fn with_errors(mut self, errors: Vec<EnumerationError>) -> Self {
        self.errors = errors;
        self
    }

    /// Load a topology snapshot from a JSON file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read topology file {:?}", path))?;
        serde_json::from_str(&content).context("Failed to parse topology JSON")
    }
}

impl TopologyQuery for Topology {
    fn sites(&self) -> &[TopologySite] {
        &self.sites
    }

    fn pools(&self) -> &[TopologyApplicationPool] {
        &self.pools
    }

    fn resolve_pool(&self, site_name: &str, application_path: &str) -> Option<String> {
        let site = self.find_site(site_name)?;
        let path = normalize_application_path(application_path);
        if path == "/" {
            return site.default_pool.clone();
        }
        site.applications
            .iter()
            .find(|a| normalize_application_path(&a.path).eq_ignore_ascii_case(&path))
            .and_then(|a| a.pool.clone())
    }
}

/// Produces a topology snapshot. Implementations may block on I/O; retry
/// policy belongs to the implementation.
#[async_trait]
pub trait TopologyEnumerator: Send + Sync {
    async fn enumerate(&self) -> Result<Topology, TopologyError>;
}

/// Enumerator returning a fixed snapshot (or a fixed failure).
#[derive(Debug, Clone)]
pub struct StaticTopology {
    result: Result<Topology, TopologyError>,
}

impl StaticTopology {
    pub fn new(topology: Topology) -> Self {
        Self { result: Ok(topology) }
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            result: Err(TopologyError::EnumerationUnavailable(reason.into())),
        }
    }
}

#[async_trait]
impl TopologyEnumerator for StaticTopology {
    async fn enumerate(&self) -> Result<Topology, TopologyError> {
        self.result.clone()
    }
}

/// Run `enumerator` under a hard time bound. Expiry counts as the topology
/// being unavailable.
pub async fn enumerate_with_timeout(
    enumerator: &dyn TopologyEnumerator,
    timeout: Duration,
) -> Result<Topology, TopologyError> {
    match tokio::time::timeout(timeout, enumerator.enumerate()).await {
        Ok(result) => result,
        Err(_) => {
            warn!("Topology enumeration exceeded {:?}", timeout);
            Err(TopologyError::EnumerationUnavailable(format!(
                "enumeration timed out after {}s",
                timeout.as_secs()
            )))
        }
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    fn topology() -> Topology {
        Topology::new(
            vec![with_app(
                site("Default Web Site", 1, "DefaultAppPool"),
                "/Orders",
                "OrdersPool",
            )],
            vec![pool("DefaultAppPool"), pool("OrdersPool")],
        )
    }

    #[test]
    fn test_resolve_root_to_default_pool() {
        let t = topology();
        assert_eq!(t.resolve_pool("Default Web Site", "/"), Some("DefaultAppPool".to_string()));
        assert_eq!(t.resolve_pool("default web site", ""), Some("DefaultAppPool".to_string()));
    }

    #[test]
    fn test_resolve_sub_application() {
        let t = topology();
        assert_eq!(t.resolve_pool("Default Web Site", "orders/"), Some("OrdersPool".to_string()));
        assert_eq!(t.resolve_pool("Default Web Site", "/missing"), None);
        assert_eq!(t.resolve_pool("GhostSite", "/"), None);
    }

    #[test]
    fn test_has_application() {
        let t = topology();
        assert!(t.has_application("Default Web Site", "/"));
        assert!(t.has_application("Default Web Site", "/orders"));
        assert!(!t.has_application("Default Web Site", "/cart"));
        assert!(!t.has_application("GhostSite", "/"));
    }

    #[test]
    fn test_topology_json_errors_optional() {
        let json = r#"{"sites": [], "pools": []}"#;
        let t: Topology = serde_json::from_str(json).unwrap();
        assert!(t.errors.is_empty());
    }

    #[test]
    fn test_load_snapshot_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("topology.json");
        std::fs::write(&path, serde_json::to_string(&topology()).unwrap()).unwrap();

        let loaded = Topology::load(&path).unwrap();
        assert_eq!(loaded, topology());
        assert!(Topology::load(&dir.path().join("absent.json")).is_err());
    }

    #[tokio::test]
    async fn test_static_topology() {
        let ok = StaticTopology::new(topology());
        assert_eq!(ok.enumerate().await.unwrap().sites.len(), 1);

        let down = StaticTopology::unavailable("WAS service stopped");
        assert!(matches!(
            down.enumerate().await,
            Err(TopologyError::EnumerationUnavailable(_))
        ));
    }

    struct Hanging;

    #[async_trait]
    impl TopologyEnumerator for Hanging {
        async fn enumerate(&self) -> Result<Topology, TopologyError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(Topology::default())
        }
    }

    #[tokio::test]
    async fn test_enumerate_with_timeout_expires() {
        let result = enumerate_with_timeout(&Hanging, Duration::from_millis(20)).await;
        assert!(matches!(result, Err(TopologyError::EnumerationUnavailable(m)) if m.contains("timed out")));
    }
}
