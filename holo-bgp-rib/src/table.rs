//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeMap;
use std::hash::{BuildHasher, BuildHasherDefault, DefaultHasher};
use std::sync::atomic::{self, AtomicU64};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use crate::af::{AddressFamily, Ipv4Unicast, Ipv6Unicast, L3VpnIpv4Unicast};
use crate::entry::{Candidate, EntryChange, PathId, RouteEntry, SelectionCxt};
use crate::error::Error;
use crate::peer::PeerId;

pub type EntryHandle = Arc<Mutex<RouteEntry>>;

// Position in the change log of a routing table.
pub type ChangeMarker = u64;

#[derive(Debug)]
pub struct RoutingTables {
    pub ipv4_unicast: RoutingTable<Ipv4Unicast>,
    pub ipv6_unicast: RoutingTable<Ipv6Unicast>,
    pub l3vpn_ipv4_unicast: RoutingTable<L3VpnIpv4Unicast>,
}

// Route Entries of one (AFI, SAFI), keyed by destination.
//
// Destinations are spread over independently locked shards. Each Route Entry
// has its own lock, so updates for different destinations never contend
// beyond the brief shard map lookup.
//
// Lock order: shard entries, then Route Entry, then shard changes.
#[derive(Debug)]
pub struct RoutingTable<A: AddressFamily> {
    shards: Box<[Shard<A::Key>]>,
    hasher: BuildHasherDefault<DefaultHasher>,
    // Last change marker handed out.
    epoch: AtomicU64,
    // Marker up to which changes were processed by the decision process.
    checkpoint: Mutex<ChangeMarker>,
}

#[derive(Debug)]
struct Shard<K> {
    entries: Mutex<BTreeMap<K, EntryHandle>>,
    // Destinations whose selection changed, with the marker of the last
    // change.
    changes: Mutex<BTreeMap<K, ChangeMarker>>,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct TableStatistics {
    pub destinations: usize,
    pub candidates: usize,
    pub selected: usize,
}

// ===== impl RoutingTables =====

impl RoutingTables {
    pub fn new(shards: usize) -> RoutingTables {
        RoutingTables {
            ipv4_unicast: RoutingTable::new(shards),
            ipv6_unicast: RoutingTable::new(shards),
            l3vpn_ipv4_unicast: RoutingTable::new(shards),
        }
    }
}

// ===== impl RoutingTable =====

impl<A> RoutingTable<A>
where
    A: AddressFamily,
{
    pub fn new(shards: usize) -> RoutingTable<A> {
        let shards = (0..shards.max(1))
            .map(|_| Shard {
                entries: Default::default(),
                changes: Default::default(),
            })
            .collect();
        RoutingTable {
            shards,
            hasher: Default::default(),
            epoch: AtomicU64::new(0),
            checkpoint: Mutex::new(0),
        }
    }

    // Returns the Route Entry of the given destination, creating it if
    // necessary.
    pub fn route_entry_for(&self, key: &A::Key) -> EntryHandle {
        let shard = self.shard(key);
        let mut entries = shard.entries.lock().unwrap();
        entries.entry(key.clone()).or_default().clone()
    }

    pub fn get(&self, key: &A::Key) -> Option<EntryHandle> {
        let shard = self.shard(key);
        let entries = shard.entries.lock().unwrap();
        entries.get(key).cloned()
    }

    // Inserts or replaces a candidate path of the given destination.
    pub fn upsert(
        &self,
        cxt: &SelectionCxt,
        key: &A::Key,
        candidate: Candidate,
    ) -> Result<EntryChange, Error> {
        loop {
            let handle = self.route_entry_for(key);
            let mut entry = handle.lock().unwrap();

            // The entry was reaped after the lookup. Retry with a new one.
            if entry.reaped {
                continue;
            }

            let change = entry.upsert(cxt, candidate)?;
            if change.best_changed {
                self.record_change(key);
            }
            return Ok(change);
        }
    }

    // Removes a candidate path of the given destination, reaping the Route
    // Entry once it's empty.
    pub fn remove_path(
        &self,
        cxt: &SelectionCxt,
        key: &A::Key,
        path_id: &PathId,
    ) -> EntryChange {
        let Some(handle) = self.get(key) else {
            return EntryChange::default();
        };

        let change = {
            let mut entry = handle.lock().unwrap();
            let change = entry.remove(cxt, path_id);
            if change.best_changed {
                self.record_change(key);
            }
            change
        };
        if change.empty {
            self.remove(key);
        }
        change
    }

    // Removes all candidate paths received from the given peer, returning
    // the number of affected destinations.
    pub fn remove_peer(&self, cxt: &SelectionCxt, peer_id: PeerId) -> usize {
        let mut count = 0;
        for shard in self.shards.iter() {
            let entries = shard
                .entries
                .lock()
                .unwrap()
                .iter()
                .map(|(key, handle)| (key.clone(), handle.clone()))
                .collect::<Vec<_>>();

            for (key, handle) in entries {
                let change = {
                    let mut entry = handle.lock().unwrap();
                    let change = entry.remove_peer(cxt, peer_id);
                    if change.best_changed {
                        self.record_change(&key);
                    }
                    change
                };
                if change.changed {
                    count += 1;
                }
                if change.empty {
                    self.remove(&key);
                }
            }
        }
        count
    }

    // Removes the Route Entry of the given destination if it's empty.
    //
    // Returns whether the entry was removed.
    pub fn remove(&self, key: &A::Key) -> bool {
        let shard = self.shard(key);
        let mut entries = shard.entries.lock().unwrap();
        let Some(handle) = entries.get(key) else {
            return false;
        };

        let mut entry = handle.lock().unwrap();
        if !entry.is_empty() {
            return false;
        }
        entry.reaped = true;
        drop(entry);
        entries.remove(key);
        true
    }

    // Returns the destinations whose selection changed after `since`, along
    // with the marker to use on the next call.
    pub fn changed_destinations(
        &self,
        since: ChangeMarker,
    ) -> (Vec<A::Key>, ChangeMarker) {
        let marker = self.epoch.load(atomic::Ordering::Acquire);
        let range = since + 1..=marker;
        let mut keys = vec![];
        for shard in self.shards.iter() {
            let changes = shard.changes.lock().unwrap();
            keys.extend(
                changes
                    .iter()
                    .filter(|(_, change)| range.contains(*change))
                    .map(|(key, _)| key.clone()),
            );
        }
        keys.sort();
        (keys, marker)
    }

    // Discards change records up to the given marker.
    pub fn prune_changes(&self, marker: ChangeMarker) {
        for shard in self.shards.iter() {
            let mut changes = shard.changes.lock().unwrap();
            changes.retain(|_, change| *change > marker);
        }
    }

    // Locks the decision process checkpoint of this table.
    //
    // The guard is held for a whole decision process run, so that runs for
    // the same table never overlap.
    pub fn checkpoint(&self) -> MutexGuard<'_, ChangeMarker> {
        self.checkpoint.lock().unwrap()
    }

    // Returns a snapshot of all destinations and their Route Entries.
    pub fn entries(&self) -> Vec<(A::Key, EntryHandle)> {
        let mut entries = vec![];
        for shard in self.shards.iter() {
            let shard_entries = shard.entries.lock().unwrap();
            entries.extend(
                shard_entries
                    .iter()
                    .map(|(key, handle)| (key.clone(), handle.clone())),
            );
        }
        entries.sort_by(|(a, _), (b, _)| a.cmp(b));
        entries
    }

    pub fn len(&self) -> usize {
        self.shards
            .iter()
            .map(|shard| shard.entries.lock().unwrap().len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn statistics(&self) -> TableStatistics {
        let mut stats = TableStatistics::default();
        for (_, handle) in self.entries() {
            let entry = handle.lock().unwrap();
            stats.destinations += 1;
            stats.candidates += entry.len();
            stats.selected += entry.best_paths().count();
        }
        stats
    }

    fn shard(&self, key: &A::Key) -> &Shard<A::Key> {
        let hash = self.hasher.hash_one(key);
        &self.shards[(hash % self.shards.len() as u64) as usize]
    }

    // Records a selection change. The marker is taken while holding the
    // shard's change lock so that readers never miss it.
    fn record_change(&self, key: &A::Key) {
        let shard = self.shard(key);
        let mut changes = shard.changes.lock().unwrap();
        let marker = self.epoch.fetch_add(1, atomic::Ordering::AcqRel) + 1;
        changes.insert(key.clone(), marker);
    }
}
