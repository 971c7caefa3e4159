//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;
use std::sync::Arc;

use holo_bgp_rib::config::PathSelectionMode;
use holo_bgp_rib::entry::{
    Candidate, PathId, RouteEntry, SelectionCxt, select_best,
};
use holo_bgp_rib::peer::PeerRole;
use holo_bgp_rib::selection::{Decision, compare};
use holo_utils::bgp::Origin;
use proptest::collection::vec;
use proptest::prelude::*;

use super::{LOCAL_AS, attrs, peer};

#[derive(Clone, Debug)]
struct PathParams {
    ibgp: bool,
    nbr_as: u32,
    extra_len: u32,
    local_pref: Option<u32>,
    origin: Origin,
    med: Option<u32>,
    depref: bool,
}

// Strategy for generating path attributes with plenty of ties.
fn path_params() -> impl Strategy<Value = PathParams> {
    (
        any::<bool>(),
        0u32..3,
        0u32..3,
        proptest::option::of(0u32..3),
        prop_oneof![
            Just(Origin::Igp),
            Just(Origin::Egp),
            Just(Origin::Incomplete)
        ],
        proptest::option::of(0u32..3),
        proptest::bool::weighted(0.2),
    )
        .prop_map(
            |(ibgp, nbr_as, extra_len, local_pref, origin, med, depref)| {
                PathParams {
                    ibgp,
                    nbr_as,
                    extra_len,
                    local_pref,
                    origin,
                    med,
                    depref,
                }
            },
        )
}

// Strategy for generating paths along with a random insertion order.
fn params_and_order() -> impl Strategy<Value = (Vec<PathParams>, Vec<usize>)> {
    vec(path_params(), 1..12).prop_flat_map(|params| {
        let order = (0..params.len()).collect::<Vec<_>>();
        (Just(params), Just(order).prop_shuffle())
    })
}

// Builds the candidate received from the i-th peer.
fn candidate(i: usize, params: &PathParams) -> Candidate {
    let id = Ipv4Addr::new(10, 0, 0, i as u8 + 1);
    let nbr_as = 65001 + params.nbr_as;
    let peer = if params.ibgp {
        peer(id, PeerRole::Internal, LOCAL_AS)
    } else {
        peer(id, PeerRole::External, nbr_as)
    };

    let as_path = std::iter::once(nbr_as)
        .chain((0..params.extra_len).map(|n| 65100 + n))
        .collect::<Vec<_>>();
    let mut attrs = attrs(&as_path);
    attrs.base.local_pref = params.local_pref;
    attrs.base.origin = params.origin;
    attrs.base.med = params.med;
    attrs.depref = params.depref;
    Candidate::new(Arc::new(peer), None, Arc::new(attrs))
}

fn candidates(params: &[PathParams]) -> Vec<Candidate> {
    params
        .iter()
        .enumerate()
        .map(|(i, params)| candidate(i, params))
        .collect()
}

fn is_preferred(a: &Candidate, b: &Candidate) -> bool {
    matches!(compare(a, b, LOCAL_AS), Decision::Preferred(_))
}

// Checks every ordering of three candidates.
fn is_transitive(c: &[Candidate]) -> bool {
    const ORDERINGS: [(usize, usize, usize); 6] =
        [(0, 1, 2), (0, 2, 1), (1, 0, 2), (1, 2, 0), (2, 0, 1), (2, 1, 0)];
    ORDERINGS.iter().all(|(a, b, z)| {
        !(is_preferred(&c[*a], &c[*b]) && is_preferred(&c[*b], &c[*z]))
            || is_preferred(&c[*a], &c[*z])
    })
}

fn selected(entry: &RouteEntry) -> Vec<PathId> {
    entry.best_paths().map(|best| best.path_id).collect()
}

proptest! {
    // Property: the best path doesn't depend on the order candidates are
    // presented in.
    #[test]
    fn prop_selection_is_deterministic((params, order) in params_and_order()) {
        let candidates = candidates(&params);
        let best1 = select_best(candidates.iter(), LOCAL_AS).unwrap();
        let best2 =
            select_best(order.iter().map(|i| &candidates[*i]), LOCAL_AS)
                .unwrap();
        prop_assert_eq!(best1.path_id, best2.path_id);

        // Same for a Route Entry populated in either order.
        let mode = PathSelectionMode::NPaths(3);
        let cxt = SelectionCxt::new(LOCAL_AS, mode, 64);
        let mut entry1 = RouteEntry::default();
        for candidate in &candidates {
            entry1.upsert(&cxt, candidate.clone()).unwrap();
        }
        let mut entry2 = RouteEntry::default();
        for i in &order {
            entry2.upsert(&cxt, candidates[*i].clone()).unwrap();
        }
        prop_assert_eq!(selected(&entry1), selected(&entry2));
        prop_assert_eq!(selected(&entry1)[0], best1.path_id);
    }

    // Property: comparisons are antisymmetric and never tie for distinct
    // paths.
    #[test]
    fn prop_comparison_is_antisymmetric(
        a in path_params(),
        b in path_params(),
    ) {
        let a = candidate(0, &a);
        let b = candidate(1, &b);
        let ab = compare(&a, &b, LOCAL_AS);
        prop_assert_ne!(ab, Decision::Equal);
        prop_assert_eq!(ab, compare(&b, &a, LOCAL_AS).reverse());
    }

    // Property: comparisons between paths from the same neighboring AS are
    // transitive.
    #[test]
    fn prop_comparison_is_transitive_same_nbr_as(
        params in vec(path_params(), 3),
    ) {
        let params = params
            .into_iter()
            .map(|params| PathParams { nbr_as: 0, ..params })
            .collect::<Vec<_>>();
        let c = candidates(&params);
        prop_assert!(is_transitive(&c));
    }

    // Property: comparisons between paths from distinct neighboring ASes
    // are transitive.
    #[test]
    fn prop_comparison_is_transitive_distinct_nbr_as(
        params in vec(path_params(), 3),
    ) {
        let params = params
            .into_iter()
            .enumerate()
            .map(|(i, params)| PathParams { nbr_as: i as u32, ..params })
            .collect::<Vec<_>>();
        let c = candidates(&params);
        prop_assert!(is_transitive(&c));
    }

    // Property: a depreferenced path never beats one that isn't.
    #[test]
    fn prop_depreference_is_absolute(a in path_params(), b in path_params()) {
        let a = candidate(0, &PathParams { depref: true, ..a });
        let b = candidate(1, &PathParams { depref: false, ..b });
        prop_assert!(is_preferred(&b, &a));
    }

    // Property: the cached selection after any sequence of updates matches
    // a selection computed from scratch.
    #[test]
    fn prop_incremental_selection_matches_scratch(
        ops in vec((0usize..6, proptest::option::of(path_params())), 1..32),
    ) {
        let cxt = SelectionCxt::new(LOCAL_AS, PathSelectionMode::Best, 64);
        let mut entry = RouteEntry::default();
        for (i, params) in &ops {
            match params {
                Some(params) => {
                    entry.upsert(&cxt, candidate(*i, params)).unwrap();
                }
                None => {
                    let id = Ipv4Addr::new(10, 0, 0, *i as u8 + 1);
                    let path_id = PathId::new(id.into(), None);
                    let change = entry.remove(&cxt, &path_id);
                    prop_assert_eq!(change.empty, entry.is_empty());
                }
            }
        }

        let best = select_best(entry.candidates(), LOCAL_AS)
            .map(|best| best.path_id);
        prop_assert_eq!(entry.best_path().map(|best| best.path_id), best);

        let mut candidates = entry.candidates().cloned().collect::<Vec<_>>();
        candidates.reverse();
        let mut scratch = RouteEntry::default();
        for candidate in candidates {
            scratch.upsert(&cxt, candidate).unwrap();
        }
        prop_assert_eq!(selected(&scratch), selected(&entry));
    }
}
