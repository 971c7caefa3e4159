//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use arc_swap::ArcSwap;
use holo_utils::UnboundedSender;
use holo_utils::bgp::AfiSafi;

use crate::adj_rib_out::AdjRibOuts;
use crate::debug::Debug;
use crate::error::Error;
use crate::peer::{Peer, PeerId, PeerRole};
use crate::tasks::messages::RibOutMsg;

pub type Peers = BTreeMap<PeerId, Arc<PeerEntry>>;

// Registry of established peers.
//
// Lookups are lock-free. Registration and deregistration replace the whole
// map, which only happens on session transitions.
#[derive(Debug, Default)]
pub struct PeerTracker {
    peers: ArcSwap<Peers>,
}

#[derive(Debug)]
pub struct PeerEntry {
    pub peer: Arc<Peer>,
    pub adj_rib_out: AdjRibOuts,
    tx: UnboundedSender<RibOutMsg>,
    // Deregistration fence. Route updates hold the read side while they
    // mutate the RIB; deregistration flips the flag under the write side.
    active: RwLock<bool>,
}

// ===== impl PeerTracker =====

impl PeerTracker {
    pub fn register(
        &self,
        peer: Peer,
        tx: UnboundedSender<RibOutMsg>,
    ) -> Result<Arc<PeerEntry>, Error> {
        let peer_id = peer.id;
        let entry = Arc::new(PeerEntry {
            peer: Arc::new(peer),
            adj_rib_out: Default::default(),
            tx,
            active: RwLock::new(true),
        });

        let mut exists = false;
        self.peers.rcu(|peers| {
            let mut peers = Peers::clone(peers);
            exists = peers.contains_key(&peer_id);
            if !exists {
                peers.insert(peer_id, entry.clone());
            }
            peers
        });
        if exists {
            return Err(Error::PeerAlreadyRegistered(peer_id));
        }

        Debug::PeerRegister(&entry.peer).log();
        Ok(entry)
    }

    // Closes the deregistration fence of a peer.
    //
    // Once this returns, every in-flight update of the peer has completed
    // and later ones are rejected. The peer stays in the registry until
    // `deregister` is called, so that a new session with the same identity
    // can't be registered while the old candidates are torn down.
    pub(crate) fn deactivate(
        &self,
        peer_id: PeerId,
    ) -> Result<Arc<PeerEntry>, Error> {
        let entry = self
            .get(peer_id)
            .ok_or(Error::PeerNotRegistered(peer_id))?;
        *entry.active.write().unwrap() = false;
        Ok(entry)
    }

    // Removes a peer from the registry.
    //
    // The peer's candidates are left untouched. Session teardown goes
    // through `events::process_peer_down`, which fences the peer, removes
    // its paths from every table and then calls this.
    pub(crate) fn deregister(&self, peer_id: PeerId) -> Option<Arc<PeerEntry>> {
        let mut removed = None;
        self.peers.rcu(|peers| {
            let mut peers = Peers::clone(peers);
            removed = peers.remove(&peer_id);
            peers
        });
        if let Some(entry) = &removed {
            Debug::PeerDeregister(&entry.peer).log();
        }
        removed
    }

    pub fn get(&self, peer_id: PeerId) -> Option<Arc<PeerEntry>> {
        self.peers.load().get(&peer_id).cloned()
    }

    // Returns a snapshot of the registered peers.
    pub fn peers(&self) -> Arc<Peers> {
        self.peers.load_full()
    }

    pub fn role_of(&self, peer_id: PeerId) -> Option<PeerRole> {
        self.peers.load().get(&peer_id).map(|entry| entry.peer.role)
    }

    pub fn supports_table(&self, peer_id: PeerId, afi_safi: AfiSafi) -> bool {
        self.peers
            .load()
            .get(&peer_id)
            .is_some_and(|entry| entry.peer.supports_table(afi_safi))
    }

    pub fn len(&self) -> usize {
        self.peers.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.load().is_empty()
    }

    // Runs `f` on behalf of an active peer, holding its deregistration fence
    // open for the duration of the call.
    pub fn with_active<F, R>(&self, peer_id: PeerId, f: F) -> Result<R, Error>
    where
        F: FnOnce(&PeerEntry) -> R,
    {
        let entry = self
            .get(peer_id)
            .ok_or(Error::PeerNotRegistered(peer_id))?;
        let active = entry.active.read().unwrap();
        if !*active {
            return Err(Error::PeerNotRegistered(peer_id));
        }
        Ok(f(&entry))
    }
}

// ===== impl PeerEntry =====

impl PeerEntry {
    pub fn is_active(&self) -> bool {
        *self.active.read().unwrap()
    }

    // Enqueues messages for transmission. Never blocks.
    pub fn send(&self, msgs: Vec<RibOutMsg>) -> Result<(), Error> {
        for msg in msgs {
            self.tx
                .send(msg)
                .map_err(|_| Error::PeerChannelClosed(self.peer.id))?;
        }
        Ok(())
    }
}
