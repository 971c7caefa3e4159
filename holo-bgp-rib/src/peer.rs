//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeSet;
use std::net::Ipv4Addr;

use holo_utils::bgp::{AfiSafi, RouteType};
use serde::{Deserialize, Serialize};

// Peer identity: the BGP identifier (router-id) of the remote speaker.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub struct PeerId(pub Ipv4Addr);

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PeerRole {
    // iBGP peer that isn't a route-reflector client.
    Internal,
    // eBGP peer.
    External,
    // iBGP peer acting as a route-reflector client of the local speaker.
    #[serde(rename = "route-reflector-client")]
    RrClient,
}

// Peer descriptor, supplied by the session layer on session establishment.
//
// The descriptor never changes while the session is up; a capability or
// role change is modelled as a session down followed by a new session up.
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct Peer {
    pub id: PeerId,
    pub role: PeerRole,
    pub local_as: u32,
    pub peer_as: u32,
    pub cluster_id: Option<Ipv4Addr>,
    // Tables negotiated for this session.
    pub tables: BTreeSet<AfiSafi>,
    // Tables for which the peer can receive multiple paths (Add-Path send).
    pub add_path: BTreeSet<AfiSafi>,
}

// ===== impl PeerId =====

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}

impl From<Ipv4Addr> for PeerId {
    fn from(addr: Ipv4Addr) -> PeerId {
        PeerId(addr)
    }
}

// ===== impl PeerRole =====

impl PeerRole {
    pub fn route_type(&self) -> RouteType {
        match self {
            PeerRole::External => RouteType::External,
            PeerRole::Internal | PeerRole::RrClient => RouteType::Internal,
        }
    }
}

impl std::fmt::Display for PeerRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PeerRole::Internal => write!(f, "internal"),
            PeerRole::External => write!(f, "external"),
            PeerRole::RrClient => write!(f, "route-reflector-client"),
        }
    }
}

// ===== impl Peer =====

impl Peer {
    pub fn new(
        id: impl Into<PeerId>,
        role: PeerRole,
        local_as: u32,
        peer_as: u32,
    ) -> Peer {
        Peer {
            id: id.into(),
            role,
            local_as,
            peer_as,
            cluster_id: None,
            tables: AfiSafi::ALL.into_iter().collect(),
            add_path: Default::default(),
        }
    }

    pub fn supports_table(&self, afi_safi: AfiSafi) -> bool {
        self.tables.contains(&afi_safi)
    }

    pub fn add_path_enabled(&self, afi_safi: AfiSafi) -> bool {
        self.add_path.contains(&afi_safi)
    }

    // Paths received from a peer in the given local AS are internal,
    // regardless of the configured role.
    pub fn route_type(&self, local_as: u32) -> RouteType {
        if self.peer_as == local_as {
            RouteType::Internal
        } else {
            self.role.route_type()
        }
    }
}
