//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::cmp::Ordering;
use std::net::Ipv4Addr;

use holo_utils::bgp::RouteType;
use serde::{Deserialize, Serialize};

use crate::entry::Candidate;

// Tie-break step that decided a comparison between two candidate paths.
//
// Variants are declared in evaluation order.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SelectionStep {
    Depreference,
    LocalPref,
    AsPathLength,
    Origin,
    Med,
    PreferExternal,
    RouterId,
    ClusterListLength,
    PeerId,
    PathId,
}

// Outcome of comparing path `a` against path `b`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum Decision {
    // `a` is preferred over `b`.
    Preferred(SelectionStep),
    // `b` is preferred over `a`.
    LessPreferred(SelectionStep),
    // Both paths share the same path identifier and attributes.
    Equal,
}

// ===== impl SelectionStep =====

impl std::fmt::Display for SelectionStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SelectionStep::Depreference => write!(f, "depreferenced"),
            SelectionStep::LocalPref => write!(f, "local-pref-lower"),
            SelectionStep::AsPathLength => write!(f, "as-path-longer"),
            SelectionStep::Origin => write!(f, "origin-type-higher"),
            SelectionStep::Med => write!(f, "med-higher"),
            SelectionStep::PreferExternal => write!(f, "prefer-external"),
            SelectionStep::RouterId => write!(f, "higher-router-id"),
            SelectionStep::ClusterListLength => {
                write!(f, "cluster-list-longer")
            }
            SelectionStep::PeerId => write!(f, "higher-peer-id"),
            SelectionStep::PathId => write!(f, "higher-path-id"),
        }
    }
}

// ===== impl Decision =====

impl Decision {
    pub fn step(&self) -> Option<SelectionStep> {
        match self {
            Decision::Preferred(step) | Decision::LessPreferred(step) => {
                Some(*step)
            }
            Decision::Equal => None,
        }
    }

    pub fn reverse(self) -> Decision {
        match self {
            Decision::Preferred(step) => Decision::LessPreferred(step),
            Decision::LessPreferred(step) => Decision::Preferred(step),
            Decision::Equal => Decision::Equal,
        }
    }

    // Maps the decision to an ordering where the preferred path sorts first.
    pub fn ordering(&self) -> Ordering {
        match self {
            Decision::Preferred(_) => Ordering::Less,
            Decision::LessPreferred(_) => Ordering::Greater,
            Decision::Equal => Ordering::Equal,
        }
    }
}

// ===== global functions =====

// Compares two candidate paths using the BGP tie-break chain.
//
// Two candidates of the same Route Entry never compare as `Equal`. The
// relation is transitive among paths from the same neighboring AS and among
// paths from pairwise distinct ones, but not across a mix of both since MED
// is only compared within a neighboring AS. Use `entry::select_best` to pick
// a best path out of arbitrary candidates.
pub fn compare(a: &Candidate, b: &Candidate, local_as: u32) -> Decision {
    // Depreferenced paths always lose.
    let a_depref = a.attrs.is_depreferenced();
    let b_depref = b.attrs.is_depreferenced();
    if a_depref != b_depref {
        return decide(b_depref, SelectionStep::Depreference);
    }

    // Compare LOCAL_PREFERENCE attributes. Higher wins, and a present value
    // wins over an absent one.
    let a_lpref = a.attrs.base.local_pref;
    let b_lpref = b.attrs.base.local_pref;
    match (a_lpref, b_lpref) {
        (Some(a), Some(b)) if a != b => {
            return decide(a > b, SelectionStep::LocalPref);
        }
        (Some(_), None) | (None, Some(_)) => {
            return decide(a_lpref.is_some(), SelectionStep::LocalPref);
        }
        _ => {
            // Move to next tie-breaker.
        }
    }

    // Compare AS_PATH lengths.
    let a_len = a.attrs.base.as_path.path_length();
    let b_len = b.attrs.base.as_path.path_length();
    if a_len != b_len {
        return decide(a_len < b_len, SelectionStep::AsPathLength);
    }

    // Compare ORIGIN attributes.
    let a_origin = a.attrs.base.origin;
    let b_origin = b.attrs.base.origin;
    if a_origin != b_origin {
        return decide(a_origin < b_origin, SelectionStep::Origin);
    }

    // Compare MULTI_EXIT_DISC attributes, only for paths received from the
    // same neighboring AS.
    let a_nbr_as = a.attrs.peer_as();
    let b_nbr_as = b.attrs.peer_as();
    if a_nbr_as == b_nbr_as {
        let a_med = a.attrs.base.med;
        let b_med = b.attrs.base.med;
        match (a_med, b_med) {
            (Some(a), Some(b)) if a != b => {
                return decide(a < b, SelectionStep::Med);
            }
            (Some(_), None) | (None, Some(_)) => {
                return decide(a_med.is_some(), SelectionStep::Med);
            }
            _ => {
                // Move to next tie-breaker.
            }
        }
    } else {
        // Prefer eBGP routes.
        let a_type = a.source.route_type(local_as);
        let b_type = b.source.route_type(local_as);
        if a_type != b_type {
            return decide(
                a_type == RouteType::External,
                SelectionStep::PreferExternal,
            );
        }
    }

    // Compare the effective originators: ORIGINATOR_ID when present,
    // otherwise the BGP identifier of the advertising peer.
    let a_originator = originator(a);
    let b_originator = originator(b);
    if a_originator != b_originator {
        return decide(a_originator < b_originator, SelectionStep::RouterId);
    }

    // Compare CLUSTER_LIST lengths.
    let a_len = cluster_list_len(a);
    let b_len = cluster_list_len(b);
    if a_len != b_len {
        return decide(a_len < b_len, SelectionStep::ClusterListLength);
    }

    // Compare peer identifiers.
    if a.path_id.peer_id != b.path_id.peer_id {
        return decide(
            a.path_id.peer_id < b.path_id.peer_id,
            SelectionStep::PeerId,
        );
    }

    // Compare Add-Path identifiers.
    if a.path_id.discriminator != b.path_id.discriminator {
        return decide(
            a.path_id.discriminator < b.path_id.discriminator,
            SelectionStep::PathId,
        );
    }

    Decision::Equal
}

// Returns whether the current best path should be kept when challenged by
// another candidate.
pub(crate) fn keep_existing(
    best: &Candidate,
    challenger: &Candidate,
    local_as: u32,
) -> bool {
    !matches!(
        compare(challenger, best, local_as),
        Decision::Preferred(_)
    )
}

// ===== helper functions =====

fn decide(a_wins: bool, step: SelectionStep) -> Decision {
    if a_wins {
        Decision::Preferred(step)
    } else {
        Decision::LessPreferred(step)
    }
}

fn originator(candidate: &Candidate) -> Ipv4Addr {
    candidate
        .attrs
        .base
        .originator_id
        .unwrap_or(candidate.path_id.peer_id.0)
}

fn cluster_list_len(candidate: &Candidate) -> usize {
    candidate
        .attrs
        .base
        .cluster_list
        .as_ref()
        .map(|cluster_list| cluster_list.len())
        .unwrap_or(0)
}
