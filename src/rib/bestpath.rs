use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::sync::Arc;

use itertools::Itertools;

use super::attributes::{as_path_length, as_path_neighbor, origin_rank};
use super::{Path, PathSource};
use crate::config::GlobalConfig;

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum RouteType {
    Internal,
    External,
}

/// The best path set for a destination.
///
/// Candidates are filtered as a set, one decision step at a time, so the
/// result only depends on which paths are present (never on their order):
///
/// - highest LOCAL_PREF (missing uses the configured default)
/// - shortest AS_PATH
/// - lowest ORIGIN
/// - lowest MED, compared only among paths from the same neighboring AS
/// - external (and locally originated) over internal
///
/// The survivors form the multipath equivalence class. They are ordered by
/// IGP metric to the next hop (when every survivor has one), originating
/// router-id and finally insertion sequence, and the first is the winner.
/// Without multipath only the winner is returned.
pub fn best_paths(candidates: &[Arc<Path>], config: &GlobalConfig) -> Vec<Arc<Path>> {
    let class = equivalence_class(candidates.iter().collect(), config);
    let ordered = tie_break(class, config);
    if config.use_multiple_paths {
        ordered
    } else {
        ordered.into_iter().take(1).collect()
    }
}

/// Every candidate in preference order: the multipath class of the whole
/// set first, then the class of what remains, and so on.
pub fn rank(candidates: &[Arc<Path>], config: &GlobalConfig) -> Vec<Arc<Path>> {
    let mut remaining: Vec<Arc<Path>> = candidates.to_vec();
    let mut ranked = Vec::with_capacity(candidates.len());
    while !remaining.is_empty() {
        let class = tie_break(equivalence_class(remaining.iter().collect(), config), config);
        remaining.retain(|path| !class.iter().any(|c| c.key() == path.key()));
        ranked.extend(class);
    }
    ranked
}

fn equivalence_class<'a>(candidates: Vec<&'a Arc<Path>>, config: &GlobalConfig) -> Vec<&'a Arc<Path>> {
    if candidates.len() <= 1 {
        return candidates;
    }

    let candidates = candidates
        .into_iter()
        .max_set_by_key(|path| local_pref(path, config));

    let candidates = candidates.into_iter().min_set_by_key(|path| {
        path.attributes
            .as_path()
            .map(as_path_length)
            .unwrap_or(0)
    });

    let candidates = candidates
        .into_iter()
        .min_set_by_key(|path| origin_rank(&path.attributes.origin()));

    // MED is only comparable between paths from the same neighboring AS
    let mut as_groups: BTreeMap<u32, Vec<&Arc<Path>>> = BTreeMap::new();
    for path in candidates {
        as_groups
            .entry(neighbor_as(path, config))
            .or_default()
            .push(path);
    }
    let candidates: Vec<_> = as_groups
        .into_values()
        .flat_map(|paths| {
            paths
                .into_iter()
                .min_set_by_key(|path| path.attributes.multi_exit_disc().unwrap_or(0))
        })
        .collect();

    candidates
        .into_iter()
        .max_set_by_key(|path| route_type(path, config))
}

fn tie_break(class: Vec<&Arc<Path>>, config: &GlobalConfig) -> Vec<Arc<Path>> {
    let compare_igp = class.iter().all(|path| path.igp_metric.is_some());
    class
        .into_iter()
        .sorted_by_key(|path| {
            (
                if compare_igp { path.igp_metric } else { None },
                originator_id(path, config),
                path.sequence,
            )
        })
        .cloned()
        .collect()
}

fn local_pref(path: &Path, config: &GlobalConfig) -> u32 {
    path.attributes
        .local_pref()
        .unwrap_or(config.default_local_pref)
}

fn neighbor_as(path: &Path, config: &GlobalConfig) -> u32 {
    path.attributes
        .as_path()
        .and_then(as_path_neighbor)
        .unwrap_or(match path.source {
            PathSource::Peer { asn, .. } => asn,
            _ => config.asn,
        })
}

fn route_type(path: &Path, config: &GlobalConfig) -> RouteType {
    match path.source {
        PathSource::Peer { asn, .. } if asn == config.asn => RouteType::Internal,
        _ => RouteType::External,
    }
}

fn originator_id(path: &Path, config: &GlobalConfig) -> Ipv4Addr {
    match path.source {
        PathSource::Peer { router_id, .. } => router_id,
        _ => config.router_id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rib::{Attribute, Family, PathAttributes};
    use bgp_rs::{ASPath, Origin, Segment};
    use itertools::Itertools;

    fn config(multipath: bool) -> GlobalConfig {
        let mut config = GlobalConfig::new(65003, "10.0.255.254".parse().unwrap());
        config.use_multiple_paths = multipath;
        config
    }

    fn peer(last_octet: u8, asn: u32) -> PathSource {
        PathSource::Peer {
            address: format!("192.0.2.{}", last_octet).parse().unwrap(),
            asn,
            router_id: format!("10.0.0.{}", last_octet).parse().unwrap(),
        }
    }

    fn path(identifier: u32, source: PathSource, sequence: u64, attrs: Vec<Attribute>) -> Arc<Path> {
        let mut path = Path::new(
            Family::IPV6_UNICAST,
            "2001:db8::/48".parse().unwrap(),
            PathAttributes::from_attributes(attrs).unwrap(),
            identifier,
            source,
        );
        path.sequence = sequence;
        Arc::new(path)
    }

    fn as_path(asns: Vec<u32>) -> Attribute {
        Attribute::AsPath(ASPath {
            segments: vec![Segment::AS_SEQUENCE(asns)],
        })
    }

    fn ids(paths: &[Arc<Path>]) -> Vec<u32> {
        paths.iter().map(|p| p.identifier).collect()
    }

    #[test]
    fn test_empty_and_single() {
        let config = config(false);
        assert!(best_paths(&[], &config).is_empty());
        let a = path(1, PathSource::Api, 1, vec![]);
        assert_eq!(ids(&best_paths(&[a], &config)), vec![1]);
    }

    #[test]
    fn test_local_pref() {
        let config = config(true);
        let a = path(1, PathSource::Api, 1, vec![Attribute::LocalPref(100)]);
        let b = path(2, PathSource::Api, 2, vec![Attribute::LocalPref(200)]);
        // Missing LOCAL_PREF takes the default (100)
        let c = path(3, PathSource::Api, 3, vec![]);
        assert_eq!(ids(&best_paths(&[a.clone(), b, c.clone()], &config)), vec![2]);
        assert_eq!(ids(&best_paths(&[a, c], &config)), vec![1, 3]);
    }

    #[test]
    fn test_as_path_then_origin() {
        let config = config(false);
        let a = path(1, PathSource::Api, 1, vec![as_path(vec![100, 200])]);
        let b = path(2, PathSource::Api, 2, vec![as_path(vec![300])]);
        assert_eq!(ids(&best_paths(&[a, b], &config)), vec![2]);

        let a = path(1, PathSource::Api, 1, vec![Attribute::Origin(Origin::INCOMPLETE)]);
        let b = path(2, PathSource::Api, 2, vec![Attribute::Origin(Origin::EGP)]);
        let c = path(3, PathSource::Api, 3, vec![Attribute::Origin(Origin::IGP)]);
        assert_eq!(ids(&best_paths(&[a, b, c], &config)), vec![3]);
    }

    #[test]
    fn test_med_only_within_neighbor_as() {
        let config = config(true);
        let a = path(1, peer(1, 65010), 1, vec![as_path(vec![65010]), Attribute::MultiExitDisc(50)]);
        let b = path(2, peer(2, 65010), 2, vec![as_path(vec![65010]), Attribute::MultiExitDisc(10)]);
        // Different neighbor AS, its higher MED is not compared against 65010
        let c = path(3, peer(3, 65020), 3, vec![as_path(vec![65020]), Attribute::MultiExitDisc(90)]);
        let best = best_paths(&[a, b, c], &config);
        assert_eq!(best.len(), 2);
        assert!(ids(&best).contains(&2));
        assert!(ids(&best).contains(&3));
    }

    #[test]
    fn test_external_over_internal() {
        let config = config(false);
        let ibgp = path(1, peer(1, 65003), 1, vec![as_path(vec![65100])]);
        let ebgp = path(2, peer(9, 65100), 2, vec![as_path(vec![65100])]);
        assert_eq!(ids(&best_paths(&[ibgp, ebgp], &config)), vec![2]);
    }

    #[test]
    fn test_igp_metric_then_router_id() {
        let config = config(false);
        let a = Arc::new(
            Arc::try_unwrap(path(1, peer(1, 65100), 1, vec![as_path(vec![65100])]))
                .unwrap()
                .with_igp_metric(20),
        );
        let b = Arc::new(
            Arc::try_unwrap(path(2, peer(2, 65100), 2, vec![as_path(vec![65100])]))
                .unwrap()
                .with_igp_metric(10),
        );
        assert_eq!(ids(&best_paths(&[a, b], &config)), vec![2]);

        // Without metrics, lowest router-id wins regardless of sequence
        let a = path(1, peer(5, 65100), 1, vec![as_path(vec![65100])]);
        let b = path(2, peer(4, 65100), 2, vec![as_path(vec![65100])]);
        assert_eq!(ids(&best_paths(&[a, b], &config)), vec![2]);
    }

    #[test]
    fn test_local_paths_tie_on_sequence() {
        // Identical locally originated paths, only the sequence differs
        let origin = || vec![Attribute::Origin(Origin::IGP)];
        let a = path(100, PathSource::Api, 1, origin());
        let b = path(101, PathSource::Api, 2, origin());

        let best = best_paths(&[b.clone(), a.clone()], &config(false));
        assert_eq!(ids(&best), vec![100]);

        let best = best_paths(&[b, a], &config(true));
        assert_eq!(ids(&best), vec![100, 101]);
    }

    #[test]
    fn test_selection_is_order_independent() {
        let config = config(false);
        let candidates = vec![
            path(1, peer(1, 65010), 1, vec![as_path(vec![65010, 1]), Attribute::MultiExitDisc(5)]),
            path(2, peer(2, 65010), 2, vec![as_path(vec![65010, 2]), Attribute::MultiExitDisc(1)]),
            path(3, peer(3, 65020), 3, vec![as_path(vec![65020, 3])]),
            path(4, PathSource::Api, 4, vec![as_path(vec![65030, 4])]),
            path(5, peer(5, 65003), 5, vec![as_path(vec![65040, 5]), Attribute::LocalPref(100)]),
        ];
        let expected = ids(&best_paths(&candidates, &config));
        let expected_rank = ids(&rank(&candidates, &config));
        for permutation in candidates.iter().cloned().permutations(candidates.len()) {
            assert_eq!(ids(&best_paths(&permutation, &config)), expected);
            assert_eq!(ids(&rank(&permutation, &config)), expected_rank);
        }
    }

    #[test]
    fn test_rank_orders_every_candidate() {
        let config = config(false);
        let a = path(1, PathSource::Api, 1, vec![Attribute::LocalPref(50)]);
        let b = path(2, PathSource::Api, 2, vec![Attribute::LocalPref(300)]);
        let c = path(3, PathSource::Api, 3, vec![Attribute::LocalPref(100)]);
        assert_eq!(ids(&rank(&[a, b, c], &config)), vec![2, 3, 1]);
    }
}
