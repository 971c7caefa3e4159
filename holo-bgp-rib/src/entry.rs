//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::btree_map;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use derive_new::new;
use holo_utils::bgp::RouteType;
use serde::{Deserialize, Serialize};

use crate::af::{AddressFamily, Nlri};
use crate::attribute::Attrs;
use crate::config::PathSelectionMode;
use crate::error::Error;
use crate::peer::{Peer, PeerId};
use crate::selection::{self, SelectionStep};

// Identifies one candidate path of a destination.
//
// The ordering (peer first, then add-path discriminator with absent first)
// allows efficient range scans over all paths of a given peer.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
#[derive(new)]
pub struct PathId {
    pub peer_id: PeerId,
    pub discriminator: Option<u32>,
}

// A candidate path received from a peer.
#[derive(Clone, Debug)]
pub struct Candidate {
    pub path_id: PathId,
    pub source: Arc<Peer>,
    pub attrs: Arc<Attrs>,
    // Path identifier used when advertising this path to Add-Path peers.
    pub local_path_id: u32,
}

// Per-destination aggregate of candidate paths and their cached selection.
#[derive(Debug, Default)]
pub struct RouteEntry {
    candidates: BTreeMap<PathId, Candidate>,
    // Selected paths, primary best path first.
    selected: Vec<PathId>,
    next_local_path_id: u32,
    local_path_id_wrapped: bool,
    // Set once the entry was detached from its table.
    pub(crate) reaped: bool,
}

// Parameters driving the path selection of a table.
#[derive(Clone, Copy, Debug)]
#[derive(new)]
pub struct SelectionCxt {
    pub local_as: u32,
    pub mode: PathSelectionMode,
    pub max_candidates: usize,
}

// Outcome of a Route Entry mutation.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct EntryChange {
    // The candidate set was modified.
    pub changed: bool,
    // The selection, or the attributes of a selected path, changed.
    pub best_changed: bool,
    // The candidate set is now empty.
    pub empty: bool,
}

// Externally visible representation of a selected path.
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct Route {
    pub nlri: Nlri,
    pub path_id: Option<u32>,
    pub source: PeerId,
    pub route_type: RouteType,
    pub attrs: Arc<Attrs>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct CandidateExplain {
    pub path_id: PathId,
    pub local_path_id: u32,
    pub selected: bool,
    // Tie-break step at which the candidate lost against the primary best
    // path.
    pub lost_at: Option<SelectionStep>,
}

// ===== impl Candidate =====

impl Candidate {
    pub fn new(
        source: Arc<Peer>,
        discriminator: Option<u32>,
        attrs: Arc<Attrs>,
    ) -> Candidate {
        Candidate {
            path_id: PathId::new(source.id, discriminator),
            source,
            attrs,
            local_path_id: 0,
        }
    }
}

// ===== impl RouteEntry =====

impl RouteEntry {
    // Inserts or replaces the candidate identified by `candidate.path_id`.
    //
    // New candidates beyond the configured limit are dropped.
    pub fn upsert(
        &mut self,
        cxt: &SelectionCxt,
        mut candidate: Candidate,
    ) -> Result<EntryChange, Error> {
        let path_id = candidate.path_id;
        match self.candidates.get(&path_id) {
            Some(old) => {
                // Re-advertisement of the same attributes.
                if old.attrs == candidate.attrs {
                    return Ok(EntryChange::default());
                }
                candidate.local_path_id = old.local_path_id;
            }
            None => {
                if self.candidates.len() >= cxt.max_candidates {
                    return Err(Error::CandidateLimit(
                        path_id.peer_id,
                        cxt.max_candidates,
                    ));
                }
                candidate.local_path_id = self.alloc_local_path_id();
            }
        }

        let was_selected = self.selected.contains(&path_id);
        self.candidates.insert(path_id, candidate);
        let best_changed = self.recompute(cxt) || was_selected;

        Ok(EntryChange {
            changed: true,
            best_changed,
            empty: false,
        })
    }

    // Removes a candidate. Removing an unknown path is a no-op.
    pub fn remove(
        &mut self,
        cxt: &SelectionCxt,
        path_id: &PathId,
    ) -> EntryChange {
        if self.candidates.remove(path_id).is_none() {
            return EntryChange {
                empty: self.candidates.is_empty(),
                ..Default::default()
            };
        }

        let best_changed = self.recompute(cxt);
        EntryChange {
            changed: true,
            best_changed,
            empty: self.candidates.is_empty(),
        }
    }

    // Removes all candidates received from the given peer.
    pub fn remove_peer(
        &mut self,
        cxt: &SelectionCxt,
        peer_id: PeerId,
    ) -> EntryChange {
        let range = PathId::new(peer_id, None)
            ..=PathId::new(peer_id, Some(u32::MAX));
        let path_ids = self
            .candidates
            .range(range)
            .map(|(path_id, _)| *path_id)
            .collect::<Vec<_>>();
        if path_ids.is_empty() {
            return EntryChange {
                empty: self.candidates.is_empty(),
                ..Default::default()
            };
        }
        for path_id in &path_ids {
            self.candidates.remove(path_id);
        }

        let best_changed = self.recompute(cxt);
        EntryChange {
            changed: true,
            best_changed,
            empty: self.candidates.is_empty(),
        }
    }

    // Returns the cached selection, primary best path first.
    pub fn best_paths(&self) -> impl Iterator<Item = &Candidate> + '_ {
        self.selected
            .iter()
            .filter_map(|path_id| self.candidates.get(path_id))
    }

    pub fn best_path(&self) -> Option<&Candidate> {
        self.best_paths().next()
    }

    pub fn candidate(&self, path_id: &PathId) -> Option<&Candidate> {
        self.candidates.get(path_id)
    }

    pub fn candidates(&self) -> impl Iterator<Item = &Candidate> + '_ {
        self.candidates.values()
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    // Builds the route advertised to `peer` for the given selected path.
    //
    // Add-Path peers get the local path identifier attached.
    pub fn create_route_for_peer<A>(
        &self,
        key: &A::Key,
        peer: &Peer,
        best: &Candidate,
    ) -> Route
    where
        A: AddressFamily,
    {
        let path_id = peer
            .add_path_enabled(A::AFI_SAFI)
            .then_some(best.local_path_id);
        Route {
            nlri: A::nlri(key),
            path_id,
            source: best.path_id.peer_id,
            route_type: best.source.route_type(peer.local_as),
            attrs: best.attrs.clone(),
        }
    }

    // Builds the Loc-RIB view of a selected path.
    pub fn create_route<A>(&self, key: &A::Key, best: &Candidate) -> Route
    where
        A: AddressFamily,
    {
        Route {
            nlri: A::nlri(key),
            path_id: None,
            source: best.path_id.peer_id,
            route_type: best.source.route_type(best.source.local_as),
            attrs: best.attrs.clone(),
        }
    }

    // Lists all candidates ranked by preference, along with the tie-break
    // step that made each one lose against the primary best path.
    pub fn explain(&self, cxt: &SelectionCxt) -> Vec<CandidateExplain> {
        let Some(best) = self.best_path() else {
            return vec![];
        };

        let mut remaining =
            self.candidates.keys().copied().collect::<BTreeSet<_>>();
        let mut ranking = Vec::with_capacity(remaining.len());
        loop {
            let candidates = remaining
                .iter()
                .filter_map(|path_id| self.candidates.get(path_id));
            let Some(next) = select_best(candidates, cxt.local_as) else {
                break;
            };
            ranking.push(CandidateExplain {
                path_id: next.path_id,
                local_path_id: next.local_path_id,
                selected: self.selected.contains(&next.path_id),
                lost_at: selection::compare(best, next, cxt.local_as).step(),
            });
            remaining.remove(&next.path_id);
        }
        ranking
    }

    // Recomputes the selection, returning whether it changed.
    fn recompute(&mut self, cxt: &SelectionCxt) -> bool {
        let selected = match cxt.mode {
            PathSelectionMode::Best => {
                select_best(self.candidates.values(), cxt.local_as)
                    .map(|best| vec![best.path_id])
                    .unwrap_or_default()
            }
            PathSelectionMode::NPaths(n) => {
                // The arity can be much larger than the candidate set.
                let n = (n as usize).min(self.candidates.len());
                let mut selected = Vec::with_capacity(n);
                while selected.len() < n {
                    let remaining = self
                        .candidates
                        .values()
                        .filter(|c| !selected.contains(&c.path_id));
                    let Some(best) = select_best(remaining, cxt.local_as)
                    else {
                        break;
                    };
                    selected.push(best.path_id);
                }
                selected
            }
            PathSelectionMode::AllPaths => {
                match select_best(self.candidates.values(), cxt.local_as) {
                    Some(best) => {
                        let best = best.path_id;
                        std::iter::once(best)
                            .chain(
                                self.candidates
                                    .keys()
                                    .copied()
                                    .filter(|path_id| *path_id != best),
                            )
                            .collect()
                    }
                    None => vec![],
                }
            }
        };

        let changed = selected != self.selected;
        self.selected = selected;
        changed
    }

    fn alloc_local_path_id(&mut self) -> u32 {
        loop {
            let local_path_id = self.next_local_path_id.wrapping_add(1);
            self.next_local_path_id = local_path_id;
            if local_path_id == 0 {
                self.local_path_id_wrapped = true;
                continue;
            }

            // After a wrap-around, skip identifiers still in use.
            if self.local_path_id_wrapped
                && self
                    .candidates
                    .values()
                    .any(|c| c.local_path_id == local_path_id)
            {
                continue;
            }
            return local_path_id;
        }
    }
}

// ===== global functions =====

// Selects the best path out of the provided candidates.
//
// Paths are first grouped by neighboring AS, where MED is comparable, and the
// group winners are then compared against each other. This keeps the result
// independent of the iteration order even though MED comparisons across
// neighboring ASes aren't transitive.
pub fn select_best<'a>(
    candidates: impl Iterator<Item = &'a Candidate>,
    local_as: u32,
) -> Option<&'a Candidate> {
    let mut groups: BTreeMap<Option<u32>, &'a Candidate> = BTreeMap::new();
    for candidate in candidates {
        match groups.entry(candidate.attrs.peer_as()) {
            btree_map::Entry::Vacant(e) => {
                e.insert(candidate);
            }
            btree_map::Entry::Occupied(mut e) => {
                if !selection::keep_existing(e.get(), candidate, local_as) {
                    e.insert(candidate);
                }
            }
        }
    }

    groups.into_values().reduce(|best, candidate| {
        if selection::keep_existing(best, candidate, local_as) {
            best
        } else {
            candidate
        }
    })
}
