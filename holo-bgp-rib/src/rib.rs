//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::sync::Arc;

use holo_utils::bgp::AfiSafi;

use crate::af::{AddressFamily, Ipv4Unicast, Ipv6Unicast, L3VpnIpv4Unicast};
use crate::config::RibConfig;
use crate::entry::{CandidateExplain, Route, SelectionCxt};
use crate::error::Error;
use crate::policy::{DefaultPolicy, RoutingPolicy};
use crate::table::{RoutingTables, TableStatistics};
use crate::tracker::PeerTracker;

// BGP Routing Information Base.
//
// Constructed once and shared by reference between peer sessions and the
// RIB task.
#[derive(Debug)]
pub struct Rib {
    pub config: RibConfig,
    pub tracker: PeerTracker,
    pub tables: RoutingTables,
    pub policy: Arc<dyn RoutingPolicy>,
}

// ===== impl Rib =====

impl Rib {
    pub fn new(
        config: RibConfig,
        policy: Arc<dyn RoutingPolicy>,
    ) -> Result<Rib, Error> {
        config.validate()?;
        let tables = RoutingTables::new(config.table_shards);
        Ok(Rib {
            config,
            tracker: Default::default(),
            tables,
            policy,
        })
    }

    // Creates a RIB using the standard import and export rules.
    pub fn with_default_policy(config: RibConfig) -> Result<Rib, Error> {
        let policy = Arc::new(DefaultPolicy::new(&config));
        Rib::new(config, policy)
    }

    pub fn selection_cxt(&self, afi_safi: AfiSafi) -> SelectionCxt {
        self.config.selection_cxt(afi_safi)
    }

    // Returns the selected paths of every destination of a table.
    pub fn loc_rib<A>(&self) -> Vec<Route>
    where
        A: AddressFamily,
    {
        let table = A::table(&self.tables);
        let mut routes = vec![];
        for (key, handle) in table.entries() {
            let entry = handle.lock().unwrap();
            routes.extend(
                entry
                    .best_paths()
                    .map(|best| entry.create_route::<A>(&key, best)),
            );
        }
        routes
    }

    // Returns the ranked candidates of a destination.
    pub fn explain<A>(&self, key: &A::Key) -> Vec<CandidateExplain>
    where
        A: AddressFamily,
    {
        let cxt = self.selection_cxt(A::AFI_SAFI);
        A::table(&self.tables)
            .get(key)
            .map(|handle| handle.lock().unwrap().explain(&cxt))
            .unwrap_or_default()
    }

    pub fn statistics(&self, afi_safi: AfiSafi) -> TableStatistics {
        match afi_safi {
            AfiSafi::Ipv4Unicast => {
                Ipv4Unicast::table(&self.tables).statistics()
            }
            AfiSafi::Ipv6Unicast => {
                Ipv6Unicast::table(&self.tables).statistics()
            }
            AfiSafi::L3VpnIpv4Unicast => {
                L3VpnIpv4Unicast::table(&self.tables).statistics()
            }
        }
    }
}
