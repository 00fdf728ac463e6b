//! Per-session state: the binding index and the memoized caches shared by every
//! generalizer and instance call in one repair session.
//!
//! All caches tolerate concurrent read/populate. Two threads missing on the same
//! key both compute the value; the second insert wins and both results are equal.

use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use tracing::debug;

use crate::config::EngineConfig;
use crate::ir::binding::BindingIndex;
use crate::ir::kind::JoinCache;
use crate::ir::node::Node;
use crate::ir::site::Site;
use crate::ir::types::TypeSystem;
use crate::scope::{RefInventory, ScopeAnalyzer};

/// Cache sizes, for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub joins: usize,
    pub inventories: usize,
    pub judgments: usize,
}

#[derive(Debug)]
pub struct Session {
    config: EngineConfig,
    types: TypeSystem,
    joins: JoinCache,
    // Keyed by node address; the Arc is kept so the address cannot be reused.
    inventories: DashMap<usize, (Arc<Node>, Arc<RefInventory>)>,
}

impl Session {
    pub fn new(index: BindingIndex, config: EngineConfig) -> Self {
        Session {
            config,
            types: TypeSystem::new(Arc::new(index)),
            joins: JoinCache::new(),
            inventories: DashMap::new(),
        }
    }

    /// Session over `(file, compilation unit)` pairs.
    pub fn from_units(units: &[(String, Arc<Node>)], config: EngineConfig) -> Self {
        let index = BindingIndex::from_units(units.iter().map(|(file, unit)| (file.as_str(), unit)));
        debug!("Session indexed {} compilation units", units.len());
        Session::new(index, config)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn index(&self) -> &BindingIndex {
        self.types.index()
    }

    pub fn types(&self) -> &TypeSystem {
        &self.types
    }

    pub fn joins(&self) -> &JoinCache {
        &self.joins
    }

    /// Memoized reference inventory of `node`.
    pub fn inventory(&self, node: &Arc<Node>) -> Arc<RefInventory> {
        let key = Arc::as_ptr(node) as usize;
        if let Some(entry) = self.inventories.get(&key) {
            return Arc::clone(&entry.1);
        }
        let inventory = Arc::new(RefInventory::collect(node));
        self.inventories.insert(key, (Arc::clone(node), Arc::clone(&inventory)));
        inventory
    }

    /// Scope analyzer for the fragment at `site`.
    pub fn analyzer(&self, site: &Site) -> ScopeAnalyzer<'_> {
        ScopeAnalyzer::new(self, site)
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            joins: self.joins.len(),
            inventories: self.inventories.len(),
            judgments: self.types.cached_judgments(),
        }
    }
}
