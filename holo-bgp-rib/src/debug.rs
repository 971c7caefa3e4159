//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use holo_utils::bgp::AfiSafi;
use tracing::{debug, debug_span};

use crate::af::Nlri;
use crate::entry::Route;
use crate::peer::{Peer, PeerId};

// RIB debug messages.
#[derive(Debug)]
pub enum Debug<'a> {
    PeerRegister(&'a Peer),
    PeerDeregister(&'a Peer),
    PeerTeardown(PeerId, AfiSafi, usize),
    DecisionProcessStart(AfiSafi, usize),
    BestPathFound(&'a Route),
    BestPathNotFound(&'a Nlri),
    RouteAdvertise(PeerId, &'a Route),
    RouteWithdraw(PeerId, &'a Nlri, Option<u32>),
    RouteRefresh(PeerId, AfiSafi, usize),
}

// ===== impl Debug =====

impl Debug<'_> {
    // Log debug message using the tracing API.
    pub(crate) fn log(&self) {
        match self {
            Debug::PeerRegister(peer) | Debug::PeerDeregister(peer) => {
                // Parent span(s): rib
                debug_span!("peer", peer_id = %peer.id).in_scope(|| {
                    let role = &peer.role;
                    let peer_as = peer.peer_as;
                    debug!(%role, %peer_as, "{}", self);
                });
            }
            Debug::PeerTeardown(peer_id, afi_safi, count) => {
                // Parent span(s): rib
                debug_span!("peer", %peer_id).in_scope(|| {
                    debug!(%afi_safi, %count, "{}", self);
                });
            }
            Debug::DecisionProcessStart(afi_safi, count) => {
                // Parent span(s): rib
                debug_span!("table", %afi_safi).in_scope(|| {
                    debug!(%count, "{}", self);
                });
            }
            Debug::BestPathFound(route) => {
                // Parent span(s): rib
                let afi_safi = route.nlri.afi_safi();
                debug_span!("table", %afi_safi).in_scope(|| {
                    debug!(
                        nlri = %route.nlri,
                        source = %route.source,
                        as_path = %route.attrs.base.as_path,
                        "{}", self
                    );
                });
            }
            Debug::BestPathNotFound(nlri) => {
                // Parent span(s): rib
                let afi_safi = nlri.afi_safi();
                debug_span!("table", %afi_safi).in_scope(|| {
                    debug!(%nlri, "{}", self);
                });
            }
            Debug::RouteAdvertise(peer_id, route) => {
                // Parent span(s): rib
                debug_span!("peer", %peer_id).in_scope(|| {
                    debug_span!("output").in_scope(|| {
                        let data = serde_json::to_string(&route).unwrap();
                        debug!(%data, "{}", self);
                    })
                });
            }
            Debug::RouteWithdraw(peer_id, nlri, path_id) => {
                // Parent span(s): rib
                debug_span!("peer", %peer_id).in_scope(|| {
                    debug_span!("output").in_scope(|| {
                        debug!(%nlri, ?path_id, "{}", self);
                    })
                });
            }
            Debug::RouteRefresh(peer_id, afi_safi, count) => {
                // Parent span(s): rib
                debug_span!("peer", %peer_id).in_scope(|| {
                    debug!(%afi_safi, %count, "{}", self);
                });
            }
        }
    }
}

impl std::fmt::Display for Debug<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Debug::PeerRegister(..) => {
                write!(f, "peer registered")
            }
            Debug::PeerDeregister(..) => {
                write!(f, "peer deregistered")
            }
            Debug::PeerTeardown(..) => {
                write!(f, "removed paths learned from peer")
            }
            Debug::DecisionProcessStart(..) => {
                write!(f, "starting decision process")
            }
            Debug::BestPathFound(..) => {
                write!(f, "best path found")
            }
            Debug::BestPathNotFound(..) => {
                write!(f, "best path not found")
            }
            Debug::RouteAdvertise(..) => {
                write!(f, "advertising route")
            }
            Debug::RouteWithdraw(..) => {
                write!(f, "withdrawing route")
            }
            Debug::RouteRefresh(..) => {
                write!(f, "resending advertised routes")
            }
        }
    }
}
