//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;
use std::sync::Arc;

use holo_utils::bgp::{AfiSafi, RouteType, WellKnownCommunities};
use holo_utils::policy::{DefaultPolicyType, PolicyResult};

use crate::attribute::{Attrs, ClusterList};
use crate::config::RibConfig;
use crate::peer::Peer;

// Import and export routing policy.
//
// Implementations must be free of side effects: the same input always
// yields the same result, and rejection is the only way to veto a path.
pub trait RoutingPolicy: Send + Sync + std::fmt::Debug {
    // Applied to every path received from `from` before it becomes a
    // candidate. A rejected path is handled as a withdrawal.
    fn import(
        &self,
        afi_safi: AfiSafi,
        attrs: Attrs,
        from: &Peer,
    ) -> PolicyResult<Attrs>;

    // Applied to every selected path before it's advertised to `to`. A
    // rejected path is withdrawn from the peer.
    fn export(
        &self,
        afi_safi: AfiSafi,
        attrs: &Arc<Attrs>,
        from: &Peer,
        to: &Peer,
    ) -> PolicyResult<Arc<Attrs>>;
}

// Policy that accepts everything unmodified.
#[derive(Debug, Default)]
pub struct AcceptAll;

// Policy implementing the standard BGP import and export rules.
#[derive(Debug)]
pub struct DefaultPolicy {
    pub local_as: u32,
    pub router_id: Ipv4Addr,
    pub cluster_id: Ipv4Addr,
    pub default_import: DefaultPolicyType,
    pub default_export: DefaultPolicyType,
}

// ===== impl AcceptAll =====

impl RoutingPolicy for AcceptAll {
    fn import(
        &self,
        _afi_safi: AfiSafi,
        attrs: Attrs,
        _from: &Peer,
    ) -> PolicyResult<Attrs> {
        PolicyResult::Accept(attrs)
    }

    fn export(
        &self,
        _afi_safi: AfiSafi,
        attrs: &Arc<Attrs>,
        _from: &Peer,
        _to: &Peer,
    ) -> PolicyResult<Arc<Attrs>> {
        PolicyResult::Accept(attrs.clone())
    }
}

// ===== impl DefaultPolicy =====

impl DefaultPolicy {
    pub const DFLT_LOCAL_PREF: u32 = 100;

    pub fn new(config: &RibConfig) -> DefaultPolicy {
        DefaultPolicy {
            local_as: config.local_as,
            router_id: config.router_id,
            cluster_id: config.cluster_id(),
            default_import: config.default_import_policy,
            default_export: config.default_export_policy,
        }
    }

    fn cluster_id(&self, peer: &Peer) -> Ipv4Addr {
        peer.cluster_id.unwrap_or(self.cluster_id)
    }
}

impl RoutingPolicy for DefaultPolicy {
    fn import(
        &self,
        _afi_safi: AfiSafi,
        attrs: Attrs,
        from: &Peer,
    ) -> PolicyResult<Attrs> {
        // AS loop.
        if from.route_type(self.local_as) == RouteType::External
            && attrs.base.as_path.contains(self.local_as)
        {
            return PolicyResult::Reject;
        }

        // Originator loop (RFC 4456).
        if attrs.base.originator_id == Some(self.router_id) {
            return PolicyResult::Reject;
        }

        // Cluster loop (RFC 4456).
        if let Some(cluster_list) = &attrs.base.cluster_list
            && cluster_list.contains(&self.cluster_id(from))
        {
            return PolicyResult::Reject;
        }

        self.default_import.apply(attrs)
    }

    fn export(
        &self,
        _afi_safi: AfiSafi,
        attrs: &Arc<Attrs>,
        from: &Peer,
        to: &Peer,
    ) -> PolicyResult<Arc<Attrs>> {
        let to_external = to.route_type(self.local_as) == RouteType::External;

        // Well-known communities.
        if attrs.has_comm(WellKnownCommunities::NoAdvertise) {
            return PolicyResult::Reject;
        }
        if to_external
            && (attrs.has_comm(WellKnownCommunities::NoExport)
                || attrs.has_comm(WellKnownCommunities::NoExportSubconfed))
        {
            return PolicyResult::Reject;
        }

        let mut attrs = Attrs::clone(attrs);
        if to_external {
            // eBGP export (RFC 4271).
            attrs.base.as_path.prepend(self.local_as);
            attrs.base.local_pref = None;
            attrs.base.originator_id = None;
            attrs.base.cluster_list = None;
        } else {
            // Route reflection (RFC 4456).
            if from.route_type(self.local_as) == RouteType::Internal {
                attrs.base.originator_id.get_or_insert(from.id.0);
                attrs
                    .base
                    .cluster_list
                    .get_or_insert_with(|| ClusterList(vec![]))
                    .prepend(self.cluster_id(to));
            }
            attrs.base.local_pref.get_or_insert(Self::DFLT_LOCAL_PREF);
        }

        self.default_export.apply(Arc::new(attrs))
    }
}
