//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use crate::af::{AddressFamily, Ipv4Unicast, Ipv6Unicast, L3VpnIpv4Unicast};
use crate::entry::Route;
use crate::tasks::messages::RibOutMsg;

// Per-peer Adj-RIB-Out of every supported address family.
#[derive(Debug, Default)]
pub struct AdjRibOuts {
    pub ipv4_unicast: AdjRibOut<Ipv4Unicast>,
    pub ipv6_unicast: AdjRibOut<Ipv6Unicast>,
    pub l3vpn_ipv4_unicast: AdjRibOut<L3VpnIpv4Unicast>,
}

// Advertised state of one peer for one address family.
//
// The lock serializes all transitions for this peer and table.
#[derive(Debug)]
pub struct AdjRibOut<A: AddressFamily> {
    table: Mutex<AdjRibOutTable<A>>,
}

#[derive(Debug)]
pub struct AdjRibOutTable<A: AddressFamily> {
    // Records keyed by destination and advertised path identifier (present
    // for Add-Path peers only).
    routes: BTreeMap<A::Key, BTreeMap<Option<u32>, AdvState>>,
}

// Advertised state of one (destination, path identifier) pair.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum AdvState {
    NotAdvertised,
    Advertised(Route),
    // Withdrawal enqueued, pending cleanup.
    Withdrawn,
}

// ===== impl AdjRibOut =====

impl<A> AdjRibOut<A>
where
    A: AddressFamily,
{
    pub fn lock(&self) -> MutexGuard<'_, AdjRibOutTable<A>> {
        self.table.lock().unwrap()
    }
}

impl<A> Default for AdjRibOut<A>
where
    A: AddressFamily,
{
    fn default() -> AdjRibOut<A> {
        AdjRibOut {
            table: Mutex::new(AdjRibOutTable {
                routes: Default::default(),
            }),
        }
    }
}

// ===== impl AdjRibOutTable =====

impl<A> AdjRibOutTable<A>
where
    A: AddressFamily,
{
    // Reconciles the advertised state of a destination with the routes that
    // should currently be advertised, returning the messages to send.
    //
    // Unchanged routes produce no message, changed attributes produce a
    // direct replacement and routes no longer desired are withdrawn.
    pub fn update(
        &mut self,
        key: &A::Key,
        desired: Vec<Route>,
    ) -> Vec<RibOutMsg> {
        let mut msgs = vec![];
        let records = self.routes.entry(key.clone()).or_default();

        // Withdraw routes that are no longer desired.
        for (path_id, state) in records.iter_mut() {
            if let AdvState::Advertised(route) = state
                && !desired.iter().any(|r| r.path_id == *path_id)
            {
                msgs.push(RibOutMsg::Withdraw {
                    nlri: route.nlri.clone(),
                    path_id: *path_id,
                });
                *state = AdvState::Withdrawn;
            }
        }

        // Advertise new routes and replace changed ones.
        for route in desired {
            let state = records
                .entry(route.path_id)
                .or_insert(AdvState::NotAdvertised);
            // Same attributes from another source: nothing to send, but the
            // record must follow the new source.
            if let AdvState::Advertised(old) = state
                && old.attrs == route.attrs
            {
                *old = route;
                continue;
            }
            msgs.push(RibOutMsg::Update(route.clone()));
            *state = AdvState::Advertised(route);
        }

        if records.is_empty() {
            self.routes.remove(key);
        }
        msgs
    }

    // Completes the withdrawals enqueued since the last call.
    pub fn finish_pass(&mut self) {
        self.routes.retain(|_, records| {
            records.retain(|_, state| matches!(state, AdvState::Advertised(_)));
            !records.is_empty()
        });
    }

    pub fn state(&self, key: &A::Key, path_id: Option<u32>) -> AdvState {
        self.routes
            .get(key)
            .and_then(|records| records.get(&path_id))
            .cloned()
            .unwrap_or(AdvState::NotAdvertised)
    }

    // Iterates over all routes currently advertised.
    pub fn advertised(&self) -> impl Iterator<Item = &Route> + '_ {
        self.routes.values().flat_map(|records| {
            records.values().filter_map(|state| match state {
                AdvState::Advertised(route) => Some(route),
                _ => None,
            })
        })
    }

    pub fn is_advertised(&self, key: &A::Key) -> bool {
        self.routes.get(key).is_some_and(|records| {
            records
                .values()
                .any(|state| matches!(state, AdvState::Advertised(_)))
        })
    }

    pub fn len(&self) -> usize {
        self.advertised().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
