//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::{BTreeSet, VecDeque};
use std::net::{IpAddr, Ipv4Addr};

use bytes::Bytes;
use derive_new::new;
use holo_utils::bgp::{Comm, Origin, WellKnownCommunities};
use serde::{Deserialize, Serialize};

// Maximum number of members in a single AS_PATH segment.
const AS_PATH_SEGMENT_MAX_LEN: usize = 255;

// Path attributes of a candidate path.
//
// Instances are immutable once handed over to the RIB. A re-advertisement
// replaces the whole container.
#[derive(Clone, Debug, Eq, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub struct Attrs {
    pub base: BaseAttrs,
    pub comm: Option<Comms>,
    // Explicit depreference marker (draft-ietf-idr-long-lived-gr).
    pub depref: bool,
    // Opaque attributes passed through unexamined.
    pub unknown: Box<[UnknownAttr]>,
}

#[derive(Clone, Debug, Eq, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub struct BaseAttrs {
    pub origin: Origin,
    pub as_path: AsPath,
    pub nexthop: Option<IpAddr>,
    pub med: Option<u32>,
    pub local_pref: Option<u32>,
    pub originator_id: Option<Ipv4Addr>,
    pub cluster_list: Option<ClusterList>,
}

#[derive(Clone, Debug, Default, Eq, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub struct AsPath {
    pub segments: VecDeque<AsPathSegment>,
}

#[derive(Clone, Debug, Eq, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub struct AsPathSegment {
    pub seg_type: AsPathSegmentType,
    pub members: VecDeque<u32>,
}

#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub enum AsPathSegmentType {
    Set = 1,
    Sequence = 2,
}

// CLUSTER_LIST attribute (RFC 4456).
//
// Kept in wire order: the most recently traversed cluster comes first.
#[derive(Clone, Debug, Default, Eq, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub struct ClusterList(pub Vec<Ipv4Addr>);

#[derive(Clone, Debug, Default, Eq, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub struct CommList<T: Ord>(pub BTreeSet<T>);

#[derive(Clone, Debug, Eq, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
#[derive(new)]
pub struct UnknownAttr {
    pub attr_type: u8,
    pub flags: u8,
    pub value: Bytes,
}

// Useful type definitions.
pub type Comms = CommList<Comm>;

// ===== impl Attrs =====

impl Attrs {
    pub fn new(base: BaseAttrs) -> Attrs {
        Attrs {
            base,
            comm: None,
            depref: false,
            unknown: Default::default(),
        }
    }

    // A path is depreferenced when explicitly flagged or when it carries the
    // LLGR_STALE well-known community.
    pub fn is_depreferenced(&self) -> bool {
        self.depref || self.has_comm(WellKnownCommunities::LlgrStale)
    }

    // AS of the neighbor that sent the path, taken from the leftmost
    // AS_SEQUENCE. Locally originated and iBGP paths may have none.
    pub fn peer_as(&self) -> Option<u32> {
        self.base.as_path.first()
    }

    pub fn has_comm(&self, wkc: WellKnownCommunities) -> bool {
        self.comm.as_ref().is_some_and(|comm| comm.contains(wkc))
    }
}

// ===== impl BaseAttrs =====

impl Default for BaseAttrs {
    fn default() -> BaseAttrs {
        BaseAttrs {
            origin: Origin::Igp,
            as_path: Default::default(),
            nexthop: None,
            med: None,
            local_pref: None,
            originator_id: None,
            cluster_list: None,
        }
    }
}

// ===== impl AsPath =====

impl AsPath {
    // Builds an AS_PATH made of a single AS_SEQUENCE.
    pub fn from_sequence(members: impl IntoIterator<Item = u32>) -> AsPath {
        let members = members.into_iter().collect::<VecDeque<_>>();
        let mut segments = VecDeque::new();
        if !members.is_empty() {
            segments.push_back(AsPathSegment {
                seg_type: AsPathSegmentType::Sequence,
                members,
            });
        }
        AsPath { segments }
    }

    // Length used by the decision process. Every AS_SEQUENCE member counts
    // as one, while all AS_SET segments together count as one.
    pub fn path_length(&self) -> u32 {
        let mut has_set = false;
        let mut length = 0;
        for segment in &self.segments {
            match segment.seg_type {
                AsPathSegmentType::Set => has_set = true,
                AsPathSegmentType::Sequence => {
                    length += segment.members.len() as u32;
                }
            }
        }
        length + has_set as u32
    }

    pub fn first(&self) -> Option<u32> {
        self.segments
            .front()
            .filter(|segment| segment.seg_type == AsPathSegmentType::Sequence)
            .and_then(|segment| segment.members.front().copied())
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.segments
            .iter()
            .flat_map(|segment| segment.members.iter().copied())
    }

    pub fn contains(&self, asn: u32) -> bool {
        self.iter().any(|member| member == asn)
    }

    pub fn prepend(&mut self, asn: u32) {
        // Add to the first segment if it's a sequence with spare room.
        if let Some(segment) = self.segments.front_mut()
            && segment.seg_type == AsPathSegmentType::Sequence
            && segment.members.len() < AS_PATH_SEGMENT_MAX_LEN
        {
            segment.members.push_front(asn);
            return;
        }

        // Otherwise create a new segment.
        self.segments.push_front(AsPathSegment {
            seg_type: AsPathSegmentType::Sequence,
            members: [asn].into(),
        });
    }
}

impl std::fmt::Display for AsPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for segment in &self.segments {
            if !first {
                write!(f, " ")?;
            }
            first = false;

            let members = segment
                .members
                .iter()
                .map(|asn| asn.to_string())
                .collect::<Vec<_>>()
                .join(" ");
            match segment.seg_type {
                AsPathSegmentType::Set => write!(f, "{{{members}}}")?,
                AsPathSegmentType::Sequence => write!(f, "{members}")?,
            }
        }
        Ok(())
    }
}

// ===== impl ClusterList =====

impl ClusterList {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, cluster_id: &Ipv4Addr) -> bool {
        self.0.contains(cluster_id)
    }

    pub fn prepend(&mut self, cluster_id: Ipv4Addr) {
        self.0.insert(0, cluster_id);
    }
}

// ===== impl CommList =====

impl CommList<Comm> {
    pub fn contains(&self, wkc: WellKnownCommunities) -> bool {
        self.0.iter().any(|comm| comm.is(wkc))
    }
}

impl<T: Ord> FromIterator<T> for CommList<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> CommList<T> {
        CommList(iter.into_iter().collect())
    }
}
