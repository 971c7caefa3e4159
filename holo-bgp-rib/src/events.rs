//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::sync::Arc;

use holo_utils::UnboundedSender;
use holo_utils::bgp::AfiSafi;

use crate::af::{AddressFamily, Ipv4Unicast, Ipv6Unicast, L3VpnIpv4Unicast};
use crate::debug::Debug;
use crate::entry::{Candidate, PathId, Route, RouteEntry};
use crate::error::Error;
use crate::filter;
use crate::peer::{Peer, PeerId};
use crate::rib::Rib;
use crate::tasks::messages::input::{PathUpdate, PathUpdates, UpdateMsg};
use crate::tasks::messages::{RibInputMsg, RibOutMsg};
use crate::tracker::PeerEntry;

// ===== RIB input message =====

// Processes a message received from a peer session.
//
// Returns whether the decision process needs to run. Errors are logged and
// never propagated to the session.
pub fn process_msg(rib: &Rib, msg: RibInputMsg) -> bool {
    let result = match msg {
        RibInputMsg::PeerUp(msg) => {
            process_peer_up(rib, msg.peer, msg.tx).map(|_| false)
        }
        RibInputMsg::PeerDown(msg) => {
            process_peer_down(rib, msg.peer_id).map(|_| true)
        }
        RibInputMsg::Update(msg) => process_update_msg(rib, msg).map(|_| true),
        RibInputMsg::RouteRefresh(msg) => {
            route_refresh(rib, msg.peer_id, msg.afi_safi).map(|_| false)
        }
    };

    match result {
        Ok(decision_process) => decision_process,
        Err(error) => {
            error.log();
            false
        }
    }
}

// ===== peer session up =====

// Registers a peer and sends it the current content of every table it
// supports, each one followed by an End-of-RIB marker.
pub fn process_peer_up(
    rib: &Rib,
    peer: Peer,
    tx: UnboundedSender<RibOutMsg>,
) -> Result<(), Error> {
    let target = rib.tracker.register(peer, tx)?;
    for afi_safi in AfiSafi::ALL {
        if !target.peer.supports_table(afi_safi) {
            continue;
        }

        match afi_safi {
            AfiSafi::Ipv4Unicast => initial_sync::<Ipv4Unicast>(rib, &target)?,
            AfiSafi::Ipv6Unicast => initial_sync::<Ipv6Unicast>(rib, &target)?,
            AfiSafi::L3VpnIpv4Unicast => {
                initial_sync::<L3VpnIpv4Unicast>(rib, &target)?
            }
        }
    }

    Ok(())
}

fn initial_sync<A>(rib: &Rib, target: &PeerEntry) -> Result<(), Error>
where
    A: AddressFamily,
{
    let table = A::table(&rib.tables);

    // Keep the decision process out while the table is walked.
    let _checkpoint = table.checkpoint();

    let updates = table
        .entries()
        .into_iter()
        .map(|(key, handle)| {
            let entry = handle.lock().unwrap();
            let routes = peer_routes::<A>(rib, &key, &entry, &target.peer);
            (key, routes)
        })
        .collect();
    advertise::<A>(target, updates)?;
    target.send(vec![RibOutMsg::EndOfRib(A::AFI_SAFI)])
}

// ===== peer session down =====

// Removes a peer along with every path learned from it.
//
// The peer is fenced first, so that updates still in flight complete before
// the teardown and later ones are rejected.
pub fn process_peer_down(rib: &Rib, peer_id: PeerId) -> Result<(), Error> {
    let target = rib.tracker.deactivate(peer_id)?;
    for afi_safi in AfiSafi::ALL {
        if !target.peer.supports_table(afi_safi) {
            continue;
        }

        let count = match afi_safi {
            AfiSafi::Ipv4Unicast => teardown::<Ipv4Unicast>(rib, peer_id),
            AfiSafi::Ipv6Unicast => teardown::<Ipv6Unicast>(rib, peer_id),
            AfiSafi::L3VpnIpv4Unicast => {
                teardown::<L3VpnIpv4Unicast>(rib, peer_id)
            }
        };
        Debug::PeerTeardown(peer_id, afi_safi, count).log();
    }
    rib.tracker.deregister(peer_id);

    Ok(())
}

fn teardown<A>(rib: &Rib, peer_id: PeerId) -> usize
where
    A: AddressFamily,
{
    let cxt = rib.selection_cxt(A::AFI_SAFI);
    A::table(&rib.tables).remove_peer(&cxt, peer_id)
}

// ===== peer route updates =====

fn process_update_msg(rib: &Rib, msg: UpdateMsg) -> Result<(), Error> {
    match msg.paths {
        PathUpdates::Ipv4Unicast(paths) => {
            process_update::<Ipv4Unicast>(rib, msg.peer_id, paths)
        }
        PathUpdates::Ipv6Unicast(paths) => {
            process_update::<Ipv6Unicast>(rib, msg.peer_id, paths)
        }
        PathUpdates::L3VpnIpv4Unicast(paths) => {
            process_update::<L3VpnIpv4Unicast>(rib, msg.peer_id, paths)
        }
    }
}

// Applies a batch of path updates received from a peer.
//
// Paths rejected by the import policy are handled as withdrawals. Updates
// from peers that aren't registered, or that are being torn down, are
// rejected as a whole.
pub fn process_update<A>(
    rib: &Rib,
    peer_id: PeerId,
    paths: Vec<PathUpdate<A>>,
) -> Result<(), Error>
where
    A: AddressFamily,
{
    let table = A::table(&rib.tables);
    let cxt = rib.selection_cxt(A::AFI_SAFI);

    rib.tracker.with_active(peer_id, |source| {
        if !source.peer.supports_table(A::AFI_SAFI) {
            return Err(Error::TableNotSupported(peer_id, A::AFI_SAFI));
        }

        for path in paths {
            let attrs = path.attrs.and_then(|attrs| {
                rib.policy
                    .import(A::AFI_SAFI, attrs, &source.peer)
                    .accepted()
            });
            match attrs {
                Some(attrs) => {
                    let candidate = Candidate::new(
                        source.peer.clone(),
                        path.path_id,
                        Arc::new(attrs),
                    );
                    if let Err(error) = table.upsert(&cxt, &path.key, candidate)
                    {
                        error.log();
                    }
                }
                None => {
                    let path_id = PathId::new(peer_id, path.path_id);
                    table.remove_path(&cxt, &path.key, &path_id);
                }
            }
        }

        Ok(())
    })?
}

// ===== peer route refresh =====

// Re-sends the Adj-RIB-Out of a peer for the given table.
pub fn route_refresh(
    rib: &Rib,
    peer_id: PeerId,
    afi_safi: AfiSafi,
) -> Result<(), Error> {
    let target = rib
        .tracker
        .get(peer_id)
        .filter(|target| target.is_active())
        .ok_or(Error::PeerNotRegistered(peer_id))?;
    if !target.peer.supports_table(afi_safi) {
        return Err(Error::TableNotSupported(peer_id, afi_safi));
    }

    match afi_safi {
        AfiSafi::Ipv4Unicast => resend_adj_rib_out::<Ipv4Unicast>(&target),
        AfiSafi::Ipv6Unicast => resend_adj_rib_out::<Ipv6Unicast>(&target),
        AfiSafi::L3VpnIpv4Unicast => {
            resend_adj_rib_out::<L3VpnIpv4Unicast>(&target)
        }
    }
}

fn resend_adj_rib_out<A>(target: &PeerEntry) -> Result<(), Error>
where
    A: AddressFamily,
{
    let adj_rib_out = A::adj_rib_out(&target.adj_rib_out).lock();
    let msgs = adj_rib_out
        .advertised()
        .cloned()
        .map(RibOutMsg::Update)
        .collect::<Vec<_>>();
    Debug::RouteRefresh(target.peer.id, A::AFI_SAFI, msgs.len()).log();
    target.send(msgs)
}

// ===== BGP decision process =====

pub fn decision_process_all(rib: &Rib) {
    decision_process::<Ipv4Unicast>(rib);
    decision_process::<Ipv6Unicast>(rib);
    decision_process::<L3VpnIpv4Unicast>(rib);
}

// Propagates the selection changes of a table to every eligible peer.
//
// Only destinations whose selection changed since the previous run are
// visited. Each one is reconciled against the Adj-RIB-Out of every peer,
// so flaps that happened in between coalesce into a single net transition.
pub fn decision_process<A>(rib: &Rib)
where
    A: AddressFamily,
{
    let table = A::table(&rib.tables);
    let mut checkpoint = table.checkpoint();
    let (keys, marker) = table.changed_destinations(*checkpoint);
    if keys.is_empty() {
        return;
    }
    Debug::DecisionProcessStart(A::AFI_SAFI, keys.len()).log();

    // Peers eligible to receive routes from this table.
    let peers = rib.tracker.peers();
    let targets = peers
        .values()
        .filter(|target| {
            target.is_active() && target.peer.supports_table(A::AFI_SAFI)
        })
        .collect::<Vec<_>>();

    // Phase 1: compute the routes each peer should have.
    let mut updates = targets.iter().map(|_| vec![]).collect::<Vec<_>>();
    for key in keys {
        let handle = table.get(&key);
        let entry = handle.as_ref().map(|handle| handle.lock().unwrap());
        let best = entry
            .as_ref()
            .and_then(|entry| Some((entry, entry.best_path()?)));
        match best {
            Some((entry, best)) => {
                let route = entry.create_route::<A>(&key, best);
                Debug::BestPathFound(&route).log();
            }
            None => {
                Debug::BestPathNotFound(&A::nlri(&key)).log();
            }
        }

        for (target, peer_updates) in targets.iter().zip(updates.iter_mut()) {
            let routes = match &entry {
                Some(entry) => {
                    peer_routes::<A>(rib, &key, entry, &target.peer)
                }
                None => vec![],
            };
            peer_updates.push((key.clone(), routes));
        }
    }

    // Phase 2: reconcile the Adj-RIB-Out of each peer.
    for (target, peer_updates) in targets.into_iter().zip(updates) {
        if let Err(error) = advertise::<A>(target, peer_updates) {
            error.log();
        }
    }

    table.prune_changes(marker);
    *checkpoint = marker;
}

// ===== helper functions =====

// Computes the routes that should be advertised to a peer for a
// destination.
//
// Add-Path peers get every selected path, others only the primary best
// path. Paths rejected by the distribution filter or the export policy are
// left out, resulting in their withdrawal.
fn peer_routes<A>(
    rib: &Rib,
    key: &A::Key,
    entry: &RouteEntry,
    target: &Peer,
) -> Vec<Route>
where
    A: AddressFamily,
{
    let count = if target.add_path_enabled(A::AFI_SAFI) {
        usize::MAX
    } else {
        1
    };

    entry
        .best_paths()
        .take(count)
        .filter_map(|best| {
            let attrs = filter::advertise_filter(
                A::AFI_SAFI,
                &best.attrs,
                &best.source,
                target,
                rib.policy.as_ref(),
            )
            .ok()?;
            let mut route = entry.create_route_for_peer::<A>(key, target, best);
            route.attrs = attrs;
            Some(route)
        })
        .collect()
}

// Updates the Adj-RIB-Out of a peer and enqueues the resulting messages.
//
// Messages are enqueued while the Adj-RIB-Out is locked, so the peer sees
// them in the same order as the state transitions.
fn advertise<A>(
    target: &PeerEntry,
    updates: Vec<(A::Key, Vec<Route>)>,
) -> Result<(), Error>
where
    A: AddressFamily,
{
    let peer_id = target.peer.id;
    let mut adj_rib_out = A::adj_rib_out(&target.adj_rib_out).lock();

    let mut msgs = vec![];
    for (key, routes) in updates {
        msgs.extend(adj_rib_out.update(&key, routes));
    }
    adj_rib_out.finish_pass();
    if msgs.is_empty() {
        return Ok(());
    }

    for msg in &msgs {
        match msg {
            RibOutMsg::Update(route) => {
                Debug::RouteAdvertise(peer_id, route).log();
            }
            RibOutMsg::Withdraw { nlri, path_id } => {
                Debug::RouteWithdraw(peer_id, nlri, *path_id).log();
            }
            RibOutMsg::EndOfRib(_) => (),
        }
    }
    target.send(msgs)
}
