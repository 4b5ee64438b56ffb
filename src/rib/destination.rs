use std::fmt;
use std::sync::Arc;

use ipnetwork::IpNetwork;

use super::bestpath;
use super::{Family, Path, PathKey, PathStore};
use crate::config::GlobalConfig;

/// All paths for one (Family, Prefix) together with their best path set.
///
/// Only built by [`Destination::select`], so the best set always corresponds
/// to the candidates it is stored with.
#[derive(Clone, Debug)]
pub struct Destination {
    family: Family,
    prefix: IpNetwork,
    store: PathStore,
    best: Vec<Arc<Path>>,
}

impl Destination {
    /// Run the decision process over a candidate set, `None` if it is empty
    pub fn select(
        family: Family,
        prefix: IpNetwork,
        store: PathStore,
        config: &GlobalConfig,
    ) -> Option<Self> {
        if store.is_empty() {
            return None;
        }
        let candidates: Vec<Arc<Path>> = store.candidates().cloned().collect();
        let best = bestpath::best_paths(&candidates, config);
        debug_assert!(!best.is_empty(), "non-empty candidates without a best path");
        Some(Self {
            family,
            prefix,
            store,
            best,
        })
    }

    pub fn family(&self) -> Family {
        self.family
    }

    pub fn prefix(&self) -> IpNetwork {
        self.prefix
    }

    /// Winner of the decision process
    pub fn best(&self) -> &Arc<Path> {
        &self.best[0]
    }

    /// Winner first, followed by the rest of the multipath class
    pub fn best_paths(&self) -> &[Arc<Path>] {
        &self.best
    }

    pub fn is_best(&self, key: &PathKey) -> bool {
        self.best.iter().any(|path| &path.key() == key)
    }

    pub fn store(&self) -> &PathStore {
        &self.store
    }

    pub fn candidates(&self) -> Vec<Arc<Path>> {
        self.store.candidates().cloned().collect()
    }

    /// Every candidate, best paths first then by decision process preference
    pub fn ranked(&self, config: &GlobalConfig) -> Vec<Arc<Path>> {
        let mut ranked = self.best.clone();
        let rest: Vec<Arc<Path>> = self
            .store
            .candidates()
            .filter(|path| !self.is_best(&path.key()))
            .cloned()
            .collect();
        ranked.extend(bestpath::rank(&rest, config));
        ranked
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "<Destination {} {} paths={} best={}>",
            self.family,
            self.prefix,
            self.store.len(),
            self.best.len(),
        )
    }
}
