//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::sync::Arc;

use holo_utils::bgp::AfiSafi;

use crate::attribute::Attrs;
use crate::peer::{Peer, PeerRole};
use crate::policy::RoutingPolicy;

// Reason why a path isn't advertised to a peer.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FilterReject {
    SplitHorizon,
    IbgpSplitHorizon,
    TableNotSupported,
    PolicyDenied,
}

// ===== impl FilterReject =====

impl std::fmt::Display for FilterReject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FilterReject::SplitHorizon => write!(f, "split horizon"),
            FilterReject::IbgpSplitHorizon => write!(f, "iBGP split horizon"),
            FilterReject::TableNotSupported => write!(f, "table not supported"),
            FilterReject::PolicyDenied => write!(f, "denied by policy"),
        }
    }
}

// ===== global functions =====

// Checks whether a path learned from `source` can be distributed to
// `target`, before any export policy is applied.
pub fn distribute_filter(
    afi_safi: AfiSafi,
    source: &Peer,
    target: &Peer,
) -> Result<(), FilterReject> {
    // Never send a path back to the peer it was learned from.
    if source.id == target.id {
        return Err(FilterReject::SplitHorizon);
    }

    // Paths learned from non-client iBGP peers aren't sent to other
    // non-client iBGP peers.
    if source.role == PeerRole::Internal && target.role == PeerRole::Internal
    {
        return Err(FilterReject::IbgpSplitHorizon);
    }

    if !target.supports_table(afi_safi) {
        return Err(FilterReject::TableNotSupported);
    }

    Ok(())
}

// Runs the distribution filter followed by the export policy, returning the
// attributes to advertise.
pub fn advertise_filter(
    afi_safi: AfiSafi,
    attrs: &Arc<Attrs>,
    source: &Peer,
    target: &Peer,
    policy: &dyn RoutingPolicy,
) -> Result<Arc<Attrs>, FilterReject> {
    distribute_filter(afi_safi, source, target)?;
    policy
        .export(afi_safi, attrs, source, target)
        .accepted()
        .ok_or(FilterReject::PolicyDenied)
}
