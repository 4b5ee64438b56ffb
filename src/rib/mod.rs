pub mod attributes;
mod bestpath;
pub mod community;
mod destination;
pub mod families;
mod path;
mod store;

pub use attributes::{Attribute, AttributeError, AttributeKind, MpReachNlri, PathAttributes};
pub use community::{Community, CommunityList};
pub use destination::Destination;
pub use families::{Families, Family};
pub use path::{normalize_prefix, Path, PathKey, PathSource};
pub use store::PathStore;

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ipnetwork::IpNetwork;
use log::{debug, trace};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::config::GlobalConfig;

#[derive(Debug, Error, PartialEq)]
pub enum RibError {
    #[error("Unsupported family {0}")]
    UnsupportedFamily(Family),
    #[error("Invalid family '{0}'")]
    InvalidFamily(String),
    #[error("Prefix {prefix} doesn't belong to {family}")]
    PrefixFamilyMismatch { family: Family, prefix: IpNetwork },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LookupKind {
    /// Destination prefix equals the lookup prefix
    Exact,
    /// Destination prefix is covered by the lookup prefix
    Longer,
    /// Destination prefix covers the lookup prefix
    Shorter,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PrefixLookup {
    pub prefix: IpNetwork,
    pub kind: LookupKind,
}

impl PrefixLookup {
    pub fn exact(prefix: IpNetwork) -> Self {
        Self {
            prefix: normalize_prefix(prefix),
            kind: LookupKind::Exact,
        }
    }

    fn matches(&self, prefix: &IpNetwork) -> bool {
        match self.kind {
            LookupKind::Exact => &self.prefix == prefix,
            LookupKind::Longer => covers(&self.prefix, prefix),
            LookupKind::Shorter => covers(prefix, &self.prefix),
        }
    }
}

/// Which destinations (and paths within them) a listing returns
#[derive(Clone, Debug, Default)]
pub struct PathFilter {
    /// Any of these prefixes, all destinations when empty
    pub prefixes: Vec<PrefixLookup>,
    /// Only paths learned from this neighbor
    pub neighbor: Option<IpAddr>,
}

impl PathFilter {
    pub fn matches_prefix(&self, prefix: &IpNetwork) -> bool {
        self.prefixes.is_empty() || self.prefixes.iter().any(|lookup| lookup.matches(prefix))
    }

    pub fn matches_path(&self, path: &Path) -> bool {
        match self.neighbor {
            Some(neighbor) => path.source.neighbor() == Some(neighbor),
            None => true,
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct TableInfo {
    pub destinations: u64,
    pub paths: u64,
}

/// Point-in-time listing of destinations, later RIB changes are not observed
#[derive(Debug)]
pub struct RibSnapshot {
    destinations: std::vec::IntoIter<Arc<Destination>>,
}

impl Iterator for RibSnapshot {
    type Item = Arc<Destination>;

    fn next(&mut self) -> Option<Self::Item> {
        self.destinations.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.destinations.size_hint()
    }
}

#[derive(Debug, Default)]
struct Table {
    destinations: BTreeMap<IpNetwork, Arc<Destination>>,
}

impl Table {
    fn paths(&self) -> usize {
        self.destinations.values().map(|d| d.len()).sum()
    }
}

/// Routing Information Base: one table per family.
///
/// Destinations are immutable snapshots. Every change builds a new candidate
/// set, runs best path selection on it and swaps the result in while holding
/// the write lock, so readers only ever see consistent destinations.
pub struct Rib {
    config: Arc<GlobalConfig>,
    tables: RwLock<HashMap<Family, Table>>,
    sequence: AtomicU64,
}

impl Rib {
    pub fn new(config: Arc<GlobalConfig>) -> Self {
        Self {
            config,
            tables: RwLock::new(HashMap::with_capacity(2)),
            sequence: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &GlobalConfig {
        &self.config
    }

    fn check_family(&self, family: Family) -> Result<(), RibError> {
        if self.config.families.contains(family) {
            Ok(())
        } else {
            Err(RibError::UnsupportedFamily(family))
        }
    }

    /// Insert (or replace) a path and recompute the best path of its destination
    pub async fn add_path(&self, mut path: Path) -> Result<Arc<Destination>, RibError> {
        let family = path.family;
        self.check_family(family)?;
        if !family.matches_prefix(&path.prefix) {
            return Err(RibError::PrefixFamilyMismatch {
                family,
                prefix: path.prefix,
            });
        }
        let prefix = path.prefix;

        let mut tables = self.tables.write().await;
        // Assigned under the write lock so the order matches insertion order
        path.sequence = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let path = Arc::new(path);

        let table = tables.entry(family).or_default();
        let mut store = table
            .destinations
            .get(&prefix)
            .map(|dest| dest.store().clone())
            .unwrap_or_default();
        if let Some(prior) = store.insert(Arc::clone(&path)) {
            debug!("{} replaced by {}", prior, path);
        } else {
            debug!("Added {}", path);
        }

        let destination = match Destination::select(family, prefix, store, &self.config) {
            Some(destination) => Arc::new(destination),
            None => unreachable!("Destination {} empty after insert", prefix),
        };
        trace!("{} best: {}", destination, destination.best());
        table.destinations.insert(prefix, Arc::clone(&destination));
        Ok(destination)
    }

    /// Withdraw a path. Unknown paths are not an error and change nothing.
    pub async fn delete_path(
        &self,
        family: Family,
        prefix: IpNetwork,
        key: &PathKey,
    ) -> Result<Option<Arc<Path>>, RibError> {
        self.check_family(family)?;
        let prefix = normalize_prefix(prefix);

        let mut tables = self.tables.write().await;
        let table = match tables.get_mut(&family) {
            Some(table) => table,
            None => return Ok(None),
        };
        let mut store = match table.destinations.get(&prefix) {
            Some(destination) if destination.store().get(key).is_some() => {
                destination.store().clone()
            }
            _ => {
                trace!("Nothing to withdraw for {} {:?}", prefix, key);
                return Ok(None);
            }
        };
        let removed = store.remove(key);
        Self::commit(table, family, prefix, store, &self.config);
        if table.destinations.is_empty() {
            tables.remove(&family);
        }
        if let Some(path) = &removed {
            debug!("Withdrew {}", path);
        }
        Ok(removed)
    }

    /// Withdraw every path of a source in a family, returning how many were removed
    pub async fn delete_source(&self, family: Family, source: PathSource) -> Result<usize, RibError> {
        self.check_family(family)?;
        let mut tables = self.tables.write().await;
        let table = match tables.get_mut(&family) {
            Some(table) => table,
            None => return Ok(0),
        };
        let affected: Vec<(IpNetwork, PathStore)> = table
            .destinations
            .iter()
            .filter(|(_, dest)| dest.store().candidates().any(|p| p.source == source))
            .map(|(prefix, dest)| (*prefix, dest.store().clone()))
            .collect();

        let mut removed = 0;
        for (prefix, mut store) in affected {
            removed += store.remove_where(|path| path.source == source);
            Self::commit(table, family, prefix, store, &self.config);
        }
        if table.destinations.is_empty() {
            tables.remove(&family);
        }
        debug!("Withdrew {} {} paths from {}", removed, family, source);
        Ok(removed)
    }

    /// Replace a destination after its candidates changed, or drop it if empty
    fn commit(
        table: &mut Table,
        family: Family,
        prefix: IpNetwork,
        store: PathStore,
        config: &GlobalConfig,
    ) {
        match Destination::select(family, prefix, store, config) {
            Some(destination) => {
                table.destinations.insert(prefix, Arc::new(destination));
            }
            None => {
                trace!("Removing empty destination {}", prefix);
                table.destinations.remove(&prefix);
            }
        }
    }

    /// Snapshot of the destinations in a family matching the filter
    pub async fn list_paths(
        &self,
        family: Family,
        filter: &PathFilter,
    ) -> Result<RibSnapshot, RibError> {
        self.check_family(family)?;
        let tables = self.tables.read().await;
        let destinations: Vec<Arc<Destination>> = match tables.get(&family) {
            Some(table) => table
                .destinations
                .iter()
                .filter(|(prefix, _)| filter.matches_prefix(prefix))
                .filter(|(_, dest)| {
                    filter.neighbor.is_none()
                        || dest.store().candidates().any(|p| filter.matches_path(p))
                })
                .map(|(_, dest)| Arc::clone(dest))
                .collect(),
            None => vec![],
        };
        Ok(RibSnapshot {
            destinations: destinations.into_iter(),
        })
    }

    pub async fn destination(&self, family: Family, prefix: IpNetwork) -> Option<Arc<Destination>> {
        let prefix = normalize_prefix(prefix);
        let tables = self.tables.read().await;
        tables
            .get(&family)
            .and_then(|table| table.destinations.get(&prefix))
            .cloned()
    }

    /// Current candidates for a destination, empty if there are none
    pub async fn candidates(&self, family: Family, prefix: IpNetwork) -> Vec<Arc<Path>> {
        self.destination(family, prefix)
            .await
            .map(|dest| dest.candidates())
            .unwrap_or_default()
    }

    pub async fn table_info(&self, family: Family) -> Result<TableInfo, RibError> {
        self.check_family(family)?;
        let tables = self.tables.read().await;
        Ok(tables
            .get(&family)
            .map(|table| TableInfo {
                destinations: table.destinations.len() as u64,
                paths: table.paths() as u64,
            })
            .unwrap_or_default())
    }

    /// Families with at least one destination
    pub async fn active_families(&self) -> Vec<Family> {
        let tables = self.tables.read().await;
        let mut families: Vec<Family> = tables.keys().cloned().collect();
        families.sort_by_key(Family::sort_key);
        families
    }
}

impl fmt::Debug for Rib {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "<Rib asn={} router_id={}>", self.config.asn, self.config.router_id)
    }
}

/// Does `outer` contain every address of `inner`
fn covers(outer: &IpNetwork, inner: &IpNetwork) -> bool {
    outer.prefix() <= inner.prefix() && outer.contains(inner.network())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bgp_rs::Origin;

    fn config(multipath: bool) -> Arc<GlobalConfig> {
        let mut config = GlobalConfig::new(65003, "10.0.255.254".parse().unwrap());
        config.families = Families::new(vec![Family::IPV6_UNICAST]);
        config.use_multiple_paths = multipath;
        Arc::new(config)
    }

    fn path(prefix: &str, next_hop: &str, identifier: u32) -> Path {
        let prefix: IpNetwork = prefix.parse().unwrap();
        let attributes = PathAttributes::from_attributes(vec![
            Attribute::Origin(Origin::IGP),
            Attribute::MpReachNlri(MpReachNlri {
                family: Family::IPV6_UNICAST,
                next_hops: vec![next_hop.parse().unwrap()],
                nlris: vec![prefix],
            }),
        ])
        .unwrap();
        Path::new(Family::IPV6_UNICAST, prefix, attributes, identifier, PathSource::Api)
    }

    fn ids(paths: &[Arc<Path>]) -> Vec<u32> {
        paths.iter().map(|p| p.identifier).collect()
    }

    #[tokio::test]
    async fn test_multipath_equivalence_class() {
        let rib = Rib::new(config(true));
        rib.add_path(path("2001:db8::/48", "2001:db8::1", 100)).await.unwrap();
        rib.add_path(path("2001:db8::/48", "2001:db8::2", 101)).await.unwrap();

        let filter = PathFilter {
            prefixes: vec![PrefixLookup::exact("2001:db8::/48".parse().unwrap())],
            neighbor: None,
        };
        let dests: Vec<_> = rib
            .list_paths(Family::IPV6_UNICAST, &filter)
            .await
            .unwrap()
            .collect();
        assert_eq!(dests.len(), 1);
        assert_eq!(ids(dests[0].best_paths()), vec![100, 101]);
        assert_eq!(dests[0].len(), 2);
    }

    #[tokio::test]
    async fn test_single_best_without_multipath() {
        let rib = Rib::new(config(false));
        rib.add_path(path("2001:db8::/48", "2001:db8::1", 100)).await.unwrap();
        let dest = rib
            .add_path(path("2001:db8::/48", "2001:db8::2", 101))
            .await
            .unwrap();
        assert_eq!(ids(dest.best_paths()), vec![100]);
        assert_eq!(dest.best().attributes.next_hop(), Some("2001:db8::1".parse().unwrap()));
        assert_eq!(ids(&dest.ranked(rib.config())), vec![100, 101]);
    }

    #[tokio::test]
    async fn test_added_path_is_listed() {
        let rib = Rib::new(config(false));
        let dest = rib.add_path(path("2001:db8:1::/48", "2001:db8::1", 7)).await.unwrap();
        assert_eq!(dest.prefix(), "2001:db8:1::/48".parse::<IpNetwork>().unwrap());
        let candidates = rib
            .candidates(Family::IPV6_UNICAST, "2001:db8:1::/48".parse().unwrap())
            .await;
        assert_eq!(ids(&candidates), vec![7]);
        assert!(candidates[0].sequence() > 0);
    }

    #[tokio::test]
    async fn test_replace_same_identifier() {
        let rib = Rib::new(config(false));
        rib.add_path(path("2001:db8::/48", "2001:db8::1", 100)).await.unwrap();
        let dest = rib
            .add_path(path("2001:db8::/48", "2001:db8::9", 100))
            .await
            .unwrap();
        assert_eq!(dest.len(), 1);
        assert_eq!(dest.best().attributes.next_hop(), Some("2001:db8::9".parse().unwrap()));
    }

    #[tokio::test]
    async fn test_unsupported_family() {
        let rib = Rib::new(config(false));
        let mut v4 = path("2001:db8::/48", "2001:db8::1", 1);
        v4.family = Family::IPV4_UNICAST;
        assert_eq!(
            rib.add_path(v4).await.unwrap_err(),
            RibError::UnsupportedFamily(Family::IPV4_UNICAST)
        );
        assert!(rib.active_families().await.is_empty());

        // Prefix version must match the family
        let mut mismatched = path("2001:db8::/48", "2001:db8::1", 1);
        mismatched.prefix = "10.0.0.0/8".parse().unwrap();
        assert!(matches!(
            rib.add_path(mismatched).await,
            Err(RibError::PrefixFamilyMismatch { .. })
        ));
        assert_eq!(
            rib.table_info(Family::IPV6_UNICAST).await.unwrap(),
            TableInfo::default()
        );
    }

    #[tokio::test]
    async fn test_withdraw_unknown_is_noop() {
        let rib = Rib::new(config(false));
        rib.add_path(path("2001:db8::/48", "2001:db8::1", 100)).await.unwrap();
        let before = rib.destination(Family::IPV6_UNICAST, "2001:db8::/48".parse().unwrap()).await.unwrap();

        let removed = rib
            .delete_path(
                Family::IPV6_UNICAST,
                "2001:db8::/48".parse().unwrap(),
                &PathKey::new(PathSource::Api, 999),
            )
            .await
            .unwrap();
        assert!(removed.is_none());
        let removed = rib
            .delete_path(
                Family::IPV6_UNICAST,
                "2001:db8:ffff::/48".parse().unwrap(),
                &PathKey::new(PathSource::Api, 100),
            )
            .await
            .unwrap();
        assert!(removed.is_none());

        let after = rib.destination(Family::IPV6_UNICAST, "2001:db8::/48".parse().unwrap()).await.unwrap();
        // Untouched, still the very same snapshot
        assert!(Arc::ptr_eq(&before, &after));
    }

    #[tokio::test]
    async fn test_withdraw_all_removes_destination() {
        let rib = Rib::new(config(true));
        rib.add_path(path("2001:db8::/48", "2001:db8::1", 100)).await.unwrap();
        rib.add_path(path("2001:db8::/48", "2001:db8::2", 101)).await.unwrap();
        let prefix: IpNetwork = "2001:db8::/48".parse().unwrap();

        rib.delete_path(Family::IPV6_UNICAST, prefix, &PathKey::new(PathSource::Api, 100))
            .await
            .unwrap();
        let dest = rib.destination(Family::IPV6_UNICAST, prefix).await.unwrap();
        assert_eq!(ids(dest.best_paths()), vec![101]);

        let removed = rib
            .delete_path(Family::IPV6_UNICAST, prefix, &PathKey::new(PathSource::Api, 101))
            .await
            .unwrap();
        assert_eq!(removed.map(|p| p.identifier), Some(101));
        assert!(rib.destination(Family::IPV6_UNICAST, prefix).await.is_none());
        let listed = rib
            .list_paths(Family::IPV6_UNICAST, &PathFilter::default())
            .await
            .unwrap();
        assert_eq!(listed.count(), 0);
        assert!(rib.active_families().await.is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_is_point_in_time() {
        let rib = Rib::new(config(false));
        rib.add_path(path("2001:db8:1::/48", "2001:db8::1", 1)).await.unwrap();
        rib.add_path(path("2001:db8:2::/48", "2001:db8::1", 1)).await.unwrap();

        let mut snapshot = rib
            .list_paths(Family::IPV6_UNICAST, &PathFilter::default())
            .await
            .unwrap();
        let first = snapshot.next().unwrap();
        // Changes made while iterating aren't observed
        rib.add_path(path("2001:db8:3::/48", "2001:db8::1", 1)).await.unwrap();
        rib.delete_path(
            Family::IPV6_UNICAST,
            "2001:db8:2::/48".parse().unwrap(),
            &PathKey::new(PathSource::Api, 1),
        )
        .await
        .unwrap();
        let rest: Vec<_> = snapshot.collect();
        assert_eq!(first.prefix(), "2001:db8:1::/48".parse::<IpNetwork>().unwrap());
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].prefix(), "2001:db8:2::/48".parse::<IpNetwork>().unwrap());
    }

    #[tokio::test]
    async fn test_prefix_lookups() {
        let rib = Rib::new(config(false));
        for prefix in &["2001:db8::/32", "2001:db8:1::/48", "2001:db8:1:1::/64", "2001:db9::/32"] {
            rib.add_path(path(prefix, "2001:db8::1", 1)).await.unwrap();
        }
        let lookup = |prefix: &str, kind| PathFilter {
            prefixes: vec![PrefixLookup {
                prefix: prefix.parse().unwrap(),
                kind,
            }],
            neighbor: None,
        };
        let count = |filter: PathFilter| {
            let rib = &rib;
            async move {
                rib.list_paths(Family::IPV6_UNICAST, &filter)
                    .await
                    .unwrap()
                    .count()
            }
        };
        assert_eq!(count(lookup("2001:db8:1::/48", LookupKind::Exact)).await, 1);
        assert_eq!(count(lookup("2001:db8:1::/48", LookupKind::Longer)).await, 2);
        assert_eq!(count(lookup("2001:db8:1::/48", LookupKind::Shorter)).await, 2);
        assert_eq!(count(lookup("2001:db8::/31", LookupKind::Longer)).await, 4);
    }

    #[tokio::test]
    async fn test_delete_source() {
        let rib = Rib::new(config(false));
        rib.add_path(path("2001:db8:1::/48", "2001:db8::1", 1)).await.unwrap();
        rib.add_path(path("2001:db8:2::/48", "2001:db8::1", 1)).await.unwrap();
        let mut from_config = path("2001:db8:2::/48", "2001:db8::1", 1);
        from_config.source = PathSource::Config;
        rib.add_path(from_config).await.unwrap();

        let removed = rib
            .delete_source(Family::IPV6_UNICAST, PathSource::Api)
            .await
            .unwrap();
        assert_eq!(removed, 2);
        let info = rib.table_info(Family::IPV6_UNICAST).await.unwrap();
        assert_eq!(info, TableInfo { destinations: 1, paths: 1 });
    }

    #[tokio::test]
    async fn test_concurrent_adds() {
        let rib = Arc::new(Rib::new(config(true)));
        let handles: Vec<_> = (0..16u32)
            .map(|i| {
                let rib = Arc::clone(&rib);
                tokio::spawn(async move {
                    rib.add_path(path("2001:db8::/48", "2001:db8::1", i)).await.unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }
        let dest = rib
            .destination(Family::IPV6_UNICAST, "2001:db8::/48".parse().unwrap())
            .await
            .unwrap();
        assert_eq!(dest.len(), 16);
        // Every path ties, the class is ordered by insertion sequence
        let sequences: Vec<u64> = dest.best_paths().iter().map(|p| p.sequence()).collect();
        let mut sorted = sequences.clone();
        sorted.sort_unstable();
        assert_eq!(sequences, sorted);
        assert_eq!(dest.best_paths().len(), 16);
    }
}
