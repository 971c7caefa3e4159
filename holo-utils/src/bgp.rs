//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! BGP definitions shared between the RIB engine and the external
//! collaborators that feed it (session layer, policy engine, renderers).

use num_derive::{FromPrimitive, ToPrimitive};
use serde::{Deserialize, Serialize};

// Address Family Identifiers.
//
// IANA registry:
// https://www.iana.org/assignments/address-family-numbers/address-family-numbers.xhtml
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
#[derive(FromPrimitive, ToPrimitive)]
#[derive(Deserialize, Serialize)]
pub enum Afi {
    Ipv4 = 1,
    Ipv6 = 2,
}

// Subsequent Address Family Identifiers.
//
// IANA registry:
// https://www.iana.org/assignments/safi-namespace/safi-namespace.xhtml
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
#[derive(FromPrimitive, ToPrimitive)]
#[derive(Deserialize, Serialize)]
pub enum Safi {
    Unicast = 1,
    LabeledVpnUnicast = 128,
}

// Supported (AFI,SAFI) tuples.
//
// Each tuple selects one independent routing table.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(FromPrimitive, ToPrimitive)]
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AfiSafi {
    Ipv4Unicast,
    Ipv6Unicast,
    L3VpnIpv4Unicast,
}

#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub enum RouteType {
    Internal,
    External,
}

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(FromPrimitive, ToPrimitive)]
#[derive(Deserialize, Serialize)]
pub enum Origin {
    Igp = 0,
    Egp = 1,
    Incomplete = 2,
}

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub struct Comm(pub u32);

// BGP Well-known Communities.
//
// IANA registry:
// https://www.iana.org/assignments/bgp-well-known-communities/bgp-well-known-communities.xhtml
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(FromPrimitive, ToPrimitive)]
#[derive(Deserialize, Serialize)]
#[repr(u32)]
pub enum WellKnownCommunities {
    LlgrStale = 0xFFFF0006,
    NoExport = 0xFFFFFF01,
    NoAdvertise = 0xFFFFFF02,
    NoExportSubconfed = 0xFFFFFF03,
}

// ===== impl AfiSafi =====

impl AfiSafi {
    pub const ALL: [AfiSafi; 3] = [
        AfiSafi::Ipv4Unicast,
        AfiSafi::Ipv6Unicast,
        AfiSafi::L3VpnIpv4Unicast,
    ];

    pub const fn afi(&self) -> Afi {
        match self {
            AfiSafi::Ipv4Unicast | AfiSafi::L3VpnIpv4Unicast => Afi::Ipv4,
            AfiSafi::Ipv6Unicast => Afi::Ipv6,
        }
    }

    pub const fn safi(&self) -> Safi {
        match self {
            AfiSafi::Ipv4Unicast | AfiSafi::Ipv6Unicast => Safi::Unicast,
            AfiSafi::L3VpnIpv4Unicast => Safi::LabeledVpnUnicast,
        }
    }
}

impl std::fmt::Display for AfiSafi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AfiSafi::Ipv4Unicast => write!(f, "ipv4-unicast"),
            AfiSafi::Ipv6Unicast => write!(f, "ipv6-unicast"),
            AfiSafi::L3VpnIpv4Unicast => write!(f, "l3vpn-ipv4-unicast"),
        }
    }
}

// ===== impl Origin =====

impl std::fmt::Display for Origin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Origin::Igp => write!(f, "igp"),
            Origin::Egp => write!(f, "egp"),
            Origin::Incomplete => write!(f, "incomplete"),
        }
    }
}

// ===== impl Comm =====

impl Comm {
    pub fn is(&self, wkc: WellKnownCommunities) -> bool {
        self.0 == wkc as u32
    }
}

impl From<WellKnownCommunities> for Comm {
    fn from(wkc: WellKnownCommunities) -> Comm {
        Comm(wkc as u32)
    }
}

impl std::fmt::Display for Comm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let asn = self.0 >> 16;
        let local = self.0 & 0xFFFF;
        write!(f, "{asn}:{local}")
    }
}
