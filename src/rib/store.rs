use std::collections::BTreeMap;
use std::sync::Arc;

use log::trace;

use super::{Path, PathKey};

/// Candidate paths of a single destination, one per [`PathKey`].
///
/// A store that was mutated has no best path until it is handed to
/// [`Destination::select`](super::Destination::select), which is the only
/// way to get a store back into a RIB table.
#[derive(Clone, Debug, Default)]
pub struct PathStore {
    paths: BTreeMap<PathKey, Arc<Path>>,
}

impl PathStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a path, replacing (and returning) any path with the same key
    pub fn insert(&mut self, path: Arc<Path>) -> Option<Arc<Path>> {
        let replaced = self.paths.insert(path.key(), path);
        if let Some(prior) = &replaced {
            trace!("Replaced {} (seq {})", prior, prior.sequence());
        }
        replaced
    }

    /// Remove a path, `None` when there was nothing to remove
    pub fn remove(&mut self, key: &PathKey) -> Option<Arc<Path>> {
        self.paths.remove(key)
    }

    /// Remove every path matching the predicate, returning how many were removed
    pub fn remove_where<F>(&mut self, mut predicate: F) -> usize
    where
        F: FnMut(&Path) -> bool,
    {
        let before = self.paths.len();
        self.paths.retain(|_, path| !predicate(path));
        before - self.paths.len()
    }

    pub fn get(&self, key: &PathKey) -> Option<&Arc<Path>> {
        self.paths.get(key)
    }

    pub fn candidates(&self) -> impl Iterator<Item = &Arc<Path>> {
        self.paths.values()
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rib::{Family, PathAttributes, PathSource};

    fn path(identifier: u32, source: PathSource) -> Arc<Path> {
        Arc::new(Path::new(
            Family::IPV6_UNICAST,
            "2001:db8::/48".parse().unwrap(),
            PathAttributes::default(),
            identifier,
            source,
        ))
    }

    #[test]
    fn test_insert_replaces_same_key() {
        let mut store = PathStore::new();
        assert!(store.insert(path(100, PathSource::Api)).is_none());
        assert!(store.insert(path(101, PathSource::Api)).is_none());
        // Same identifier from a different source is a distinct path
        assert!(store.insert(path(100, PathSource::Config)).is_none());
        assert_eq!(store.len(), 3);

        let prior = store.insert(path(100, PathSource::Api));
        assert_eq!(prior.map(|p| p.identifier), Some(100));
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_remove_unknown_is_none() {
        let mut store = PathStore::new();
        store.insert(path(100, PathSource::Api));
        assert!(store
            .remove(&PathKey::new(PathSource::Api, 999))
            .is_none());
        assert_eq!(store.len(), 1);
        assert!(store
            .remove(&PathKey::new(PathSource::Api, 100))
            .is_some());
        assert!(store.is_empty());
        assert_eq!(store.candidates().count(), 0);
    }

    #[test]
    fn test_remove_where() {
        let mut store = PathStore::new();
        store.insert(path(1, PathSource::Api));
        store.insert(path(2, PathSource::Api));
        store.insert(path(1, PathSource::Config));
        assert_eq!(store.remove_where(|p| p.source == PathSource::Api), 2);
        assert_eq!(store.len(), 1);
    }
}
