//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::fmt::{Debug, Display};
use std::hash::Hash;
use std::net::Ipv4Addr;

use holo_utils::bgp::AfiSafi;
use ipnetwork::{Ipv4Network, Ipv6Network};
use serde::{Deserialize, Serialize};

use crate::adj_rib_out::{AdjRibOut, AdjRibOuts};
use crate::table::{RoutingTable, RoutingTables};

// BGP address-family specific code.
//
// The decision process is fully generic over the address family. Only the
// destination key type and the accessors to per-family containers live here.
pub trait AddressFamily: Sized + Send + Sync + 'static {
    // Combined AFI and SAFI.
    const AFI_SAFI: AfiSafi;

    // Destination key (NLRI) used by this address family.
    type Key: Clone
        + Debug
        + Display
        + Eq
        + Hash
        + Ord
        + Send
        + Sync
        + 'static;

    // Get the routing table for this address family from the provided
    // `RoutingTables`.
    fn table(tables: &RoutingTables) -> &RoutingTable<Self>;

    // Get the Adj-RIB-Out for this address family from the provided
    // `AdjRibOuts`.
    fn adj_rib_out(ribs: &AdjRibOuts) -> &AdjRibOut<Self>;

    // Render a destination key into its family-independent form.
    fn nlri(key: &Self::Key) -> Nlri;
}

#[derive(Debug)]
pub struct Ipv4Unicast;

#[derive(Debug)]
pub struct Ipv6Unicast;

#[derive(Debug)]
pub struct L3VpnIpv4Unicast;

// Family-independent representation of a destination key.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Nlri {
    Ipv4Unicast(Ipv4Network),
    Ipv6Unicast(Ipv6Network),
    L3VpnIpv4Unicast(VpnIpv4Prefix),
}

// Route Distinguisher (RFC 4364), kept in its 8-byte wire form.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub struct RouteDistinguisher(pub u64);

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub struct VpnIpv4Prefix {
    pub rd: RouteDistinguisher,
    pub prefix: Ipv4Network,
}

// ===== impl Ipv4Unicast =====

impl AddressFamily for Ipv4Unicast {
    const AFI_SAFI: AfiSafi = AfiSafi::Ipv4Unicast;

    type Key = Ipv4Network;

    fn table(tables: &RoutingTables) -> &RoutingTable<Self> {
        &tables.ipv4_unicast
    }

    fn adj_rib_out(ribs: &AdjRibOuts) -> &AdjRibOut<Self> {
        &ribs.ipv4_unicast
    }

    fn nlri(key: &Ipv4Network) -> Nlri {
        Nlri::Ipv4Unicast(*key)
    }
}

// ===== impl Ipv6Unicast =====

impl AddressFamily for Ipv6Unicast {
    const AFI_SAFI: AfiSafi = AfiSafi::Ipv6Unicast;

    type Key = Ipv6Network;

    fn table(tables: &RoutingTables) -> &RoutingTable<Self> {
        &tables.ipv6_unicast
    }

    fn adj_rib_out(ribs: &AdjRibOuts) -> &AdjRibOut<Self> {
        &ribs.ipv6_unicast
    }

    fn nlri(key: &Ipv6Network) -> Nlri {
        Nlri::Ipv6Unicast(*key)
    }
}

// ===== impl L3VpnIpv4Unicast =====

impl AddressFamily for L3VpnIpv4Unicast {
    const AFI_SAFI: AfiSafi = AfiSafi::L3VpnIpv4Unicast;

    type Key = VpnIpv4Prefix;

    fn table(tables: &RoutingTables) -> &RoutingTable<Self> {
        &tables.l3vpn_ipv4_unicast
    }

    fn adj_rib_out(ribs: &AdjRibOuts) -> &AdjRibOut<Self> {
        &ribs.l3vpn_ipv4_unicast
    }

    fn nlri(key: &VpnIpv4Prefix) -> Nlri {
        Nlri::L3VpnIpv4Unicast(*key)
    }
}

// ===== impl Nlri =====

impl Nlri {
    pub fn afi_safi(&self) -> AfiSafi {
        match self {
            Nlri::Ipv4Unicast(_) => AfiSafi::Ipv4Unicast,
            Nlri::Ipv6Unicast(_) => AfiSafi::Ipv6Unicast,
            Nlri::L3VpnIpv4Unicast(_) => AfiSafi::L3VpnIpv4Unicast,
        }
    }
}

impl std::fmt::Display for Nlri {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Nlri::Ipv4Unicast(prefix) => Display::fmt(prefix, f),
            Nlri::Ipv6Unicast(prefix) => Display::fmt(prefix, f),
            Nlri::L3VpnIpv4Unicast(prefix) => Display::fmt(prefix, f),
        }
    }
}

// ===== impl RouteDistinguisher =====

impl RouteDistinguisher {
    pub fn rd_type(&self) -> u16 {
        (self.0 >> 48) as u16
    }
}

impl std::fmt::Display for RouteDistinguisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let value = self.0 & 0x0000_FFFF_FFFF_FFFF;
        match self.rd_type() {
            // 2-octet ASN : 4-octet assigned number.
            0 => write!(f, "{}:{}", value >> 32, value & 0xFFFF_FFFF),
            // IPv4 address : 2-octet assigned number.
            1 => {
                let addr = Ipv4Addr::from((value >> 16) as u32);
                write!(f, "{}:{}", addr, value & 0xFFFF)
            }
            // 4-octet ASN : 2-octet assigned number.
            2 => write!(f, "{}:{}", value >> 16, value & 0xFFFF),
            rd_type => write!(f, "{rd_type}:{value:#x}"),
        }
    }
}

// ===== impl VpnIpv4Prefix =====

impl std::fmt::Display for VpnIpv4Prefix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.rd, self.prefix)
    }
}
