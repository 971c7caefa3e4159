//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::sync::Arc;
use std::time::Duration;

use const_addrs::ip4;
use holo_bgp_rib::af::{Ipv4Unicast, Ipv6Unicast, Nlri};
use holo_bgp_rib::attribute::AsPath;
use holo_bgp_rib::config::{PathSelectionMode, RibConfig};
use holo_bgp_rib::error::Error;
use holo_bgp_rib::events;
use holo_bgp_rib::peer::{Peer, PeerId, PeerRole};
use holo_bgp_rib::rib::Rib;
use holo_bgp_rib::tasks;
use holo_bgp_rib::tasks::messages::input::{
    PathUpdate, PathUpdates, PeerUpMsg, UpdateMsg,
};
use holo_bgp_rib::tasks::messages::{RibInputMsg, RibOutMsg};
use holo_utils::bgp::AfiSafi;
use holo_utils::policy::DefaultPolicyType;
use ipnetwork::Ipv4Network;
use tokio::sync::mpsc;

use super::*;

fn rib() -> Rib {
    let config = RibConfig {
        local_as: LOCAL_AS,
        router_id: ip4!("10.0.0.1"),
        ..Default::default()
    };
    Rib::with_default_policy(config).unwrap()
}

fn peer_up(rib: &Rib, peer: Peer) -> UnboundedReceiver<RibOutMsg> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    events::process_peer_up(rib, peer, tx).unwrap();
    drain(&mut rx);
    rx
}

fn announce(
    rib: &Rib,
    peer_id: PeerId,
    key: Ipv4Network,
    as_path: &[u32],
) -> Result<(), Error> {
    let path = PathUpdate::reach(key, None, attrs(as_path));
    events::process_update::<Ipv4Unicast>(rib, peer_id, vec![path])
}

fn withdraw(
    rib: &Rib,
    peer_id: PeerId,
    key: Ipv4Network,
) -> Result<(), Error> {
    let path = PathUpdate::unreach(key, None);
    events::process_update::<Ipv4Unicast>(rib, peer_id, vec![path])
}

fn best_source(rib: &Rib, key: &Ipv4Network) -> Option<PeerId> {
    let handle = rib.tables.ipv4_unicast.get(key)?;
    let entry = handle.lock().unwrap();
    entry.best_path().map(|best| best.path_id.peer_id)
}

fn updates(msgs: &[RibOutMsg]) -> Vec<&holo_bgp_rib::entry::Route> {
    msgs.iter()
        .filter_map(|msg| match msg {
            RibOutMsg::Update(route) => Some(route),
            _ => None,
        })
        .collect()
}

#[test]
fn best_path_follows_withdrawals() {
    let rib = rib();
    let p1 = peer(ip4!("1.1.1.1"), PeerRole::External, 65001);
    let p2 = peer(ip4!("2.2.2.2"), PeerRole::External, 65002);
    let p3 = peer(ip4!("3.3.3.3"), PeerRole::Internal, LOCAL_AS);
    let (p1_id, p2_id) = (p1.id, p2.id);
    let mut p1_rx = peer_up(&rib, p1);
    let mut p2_rx = peer_up(&rib, p2);
    let mut p3_rx = peer_up(&rib, p3);
    let key = prefix("10.0.0.0/8");
    let nlri = Nlri::Ipv4Unicast(key);

    announce(&rib, p1_id, key, &[65001, 65010]).unwrap();
    announce(&rib, p2_id, key, &[65002]).unwrap();
    events::decision_process::<Ipv4Unicast>(&rib);
    assert_eq!(best_source(&rib, &key), Some(p2_id));

    // The iBGP peer learns the path as is, with a default LOCAL_PREF.
    let msgs = drain(&mut p3_rx);
    let routes = updates(&msgs);
    assert_eq!(routes.len(), 1);
    assert_eq!(routes[0].source, p2_id);
    assert_eq!(routes[0].attrs.base.as_path, AsPath::from_sequence([65002]));
    assert_eq!(routes[0].attrs.base.local_pref, Some(100));

    // eBGP peers get the local AS prepended. The source peer gets nothing.
    let msgs = drain(&mut p1_rx);
    let routes = updates(&msgs);
    assert_eq!(routes.len(), 1);
    assert_eq!(
        routes[0].attrs.base.as_path,
        AsPath::from_sequence([LOCAL_AS, 65002])
    );
    assert!(drain(&mut p2_rx).is_empty());

    // P2 withdraws: P1 becomes the best path.
    withdraw(&rib, p2_id, key).unwrap();
    events::decision_process::<Ipv4Unicast>(&rib);
    assert_eq!(best_source(&rib, &key), Some(p1_id));
    let msgs = drain(&mut p3_rx);
    assert!(matches!(&msgs[..], [RibOutMsg::Update(r)] if r.source == p1_id));
    assert_eq!(
        drain(&mut p1_rx),
        vec![RibOutMsg::Withdraw {
            nlri: nlri.clone(),
            path_id: None
        }]
    );
    assert_eq!(updates(&drain(&mut p2_rx)).len(), 1);

    // P1 withdraws: the destination goes away.
    withdraw(&rib, p1_id, key).unwrap();
    events::decision_process::<Ipv4Unicast>(&rib);
    assert!(rib.tables.ipv4_unicast.get(&key).is_none());
    let withdrawal = RibOutMsg::Withdraw {
        nlri,
        path_id: None,
    };
    assert_eq!(drain(&mut p3_rx), vec![withdrawal.clone()]);
    assert_eq!(drain(&mut p2_rx), vec![withdrawal]);
    assert!(drain(&mut p1_rx).is_empty());
}

#[test]
fn flaps_coalesce_between_runs() {
    let rib = rib();
    let p1 = peer(ip4!("1.1.1.1"), PeerRole::External, 65001);
    let p3 = peer(ip4!("3.3.3.3"), PeerRole::Internal, LOCAL_AS);
    let p1_id = p1.id;
    let _p1_rx = peer_up(&rib, p1);
    let mut p3_rx = peer_up(&rib, p3);
    let key = prefix("10.0.0.0/8");

    announce(&rib, p1_id, key, &[65001]).unwrap();
    events::decision_process::<Ipv4Unicast>(&rib);
    assert_eq!(updates(&drain(&mut p3_rx)).len(), 1);

    // Withdraw and re-announce the same path before the next run.
    withdraw(&rib, p1_id, key).unwrap();
    announce(&rib, p1_id, key, &[65001]).unwrap();
    events::decision_process::<Ipv4Unicast>(&rib);
    assert!(drain(&mut p3_rx).is_empty());
}

#[test]
fn withdrawal_of_unknown_path_is_noop() {
    let rib = rib();
    let p1 = peer(ip4!("1.1.1.1"), PeerRole::External, 65001);
    let p1_id = p1.id;
    let _p1_rx = peer_up(&rib, p1);
    let table = &rib.tables.ipv4_unicast;

    withdraw(&rib, p1_id, prefix("10.0.0.0/8")).unwrap();
    assert!(table.is_empty());
    assert!(table.changed_destinations(0).0.is_empty());
}

#[test]
fn import_denial_is_a_withdrawal() {
    let rib = rib();
    let p1 = peer(ip4!("1.1.1.1"), PeerRole::External, 65001);
    let p1_id = p1.id;
    let _p1_rx = peer_up(&rib, p1);
    let key = prefix("10.0.0.0/8");

    announce(&rib, p1_id, key, &[65001]).unwrap();
    assert_eq!(best_source(&rib, &key), Some(p1_id));

    // AS loop.
    announce(&rib, p1_id, key, &[65001, LOCAL_AS]).unwrap();
    assert!(rib.tables.ipv4_unicast.get(&key).is_none());
}

#[test]
fn peer_teardown_is_complete() {
    let rib = rib();
    let p1 = peer(ip4!("1.1.1.1"), PeerRole::External, 65001);
    let p2 = peer(ip4!("2.2.2.2"), PeerRole::External, 65002);
    let p3 = peer(ip4!("3.3.3.3"), PeerRole::Internal, LOCAL_AS);
    let (p1_id, p2_id) = (p1.id, p2.id);
    let _p1_rx = peer_up(&rib, p1);
    let _p2_rx = peer_up(&rib, p2);
    let mut p3_rx = peer_up(&rib, p3);

    for i in 0..64 {
        let key = Ipv4Network::new(std::net::Ipv4Addr::new(10, i, 0, 0), 16)
            .unwrap();
        announce(&rib, p1_id, key, &[65001]).unwrap();
        if i % 2 == 0 {
            announce(&rib, p2_id, key, &[65002, 65020]).unwrap();
        }
    }
    events::decision_process::<Ipv4Unicast>(&rib);
    assert_eq!(updates(&drain(&mut p3_rx)).len(), 64);

    events::process_peer_down(&rib, p1_id).unwrap();
    assert!(rib.tracker.get(p1_id).is_none());
    let stats = rib.statistics(AfiSafi::Ipv4Unicast);
    assert_eq!(stats.destinations, 32);
    assert_eq!(stats.candidates, 32);
    for (_, handle) in rib.tables.ipv4_unicast.entries() {
        let entry = handle.lock().unwrap();
        assert!(entry.candidates().all(|c| c.path_id.peer_id == p2_id));
    }

    // Updates from the stale session are rejected.
    assert!(matches!(
        announce(&rib, p1_id, prefix("10.0.0.0/16"), &[65001]),
        Err(Error::PeerNotRegistered(_))
    ));

    // Half of the destinations are withdrawn, the other half now point to
    // P2.
    events::decision_process::<Ipv4Unicast>(&rib);
    let msgs = drain(&mut p3_rx);
    let withdrawals = msgs
        .iter()
        .filter(|msg| matches!(msg, RibOutMsg::Withdraw { .. }))
        .count();
    assert_eq!(withdrawals, 32);
    assert!(updates(&msgs).iter().all(|route| route.source == p2_id));
    assert_eq!(updates(&msgs).len(), 32);
}

#[test]
fn concurrent_updates_and_teardown() {
    let rib = rib();
    let peers = (1..=4u8)
        .map(|i| {
            let id = std::net::Ipv4Addr::new(i, i, i, i);
            peer(id, PeerRole::External, 65000 + i as u32)
        })
        .collect::<Vec<_>>();
    let mut rxs = vec![];
    for peer in &peers {
        rxs.push(peer_up(&rib, peer.clone()));
    }
    let victim = peers[0].id;

    std::thread::scope(|s| {
        for peer in &peers {
            let rib = &rib;
            s.spawn(move || {
                for i in 0..256u16 {
                    let addr = std::net::Ipv4Addr::from(
                        0x0a00_0000 | (u32::from(i) << 8),
                    );
                    let key = Ipv4Network::new(addr, 24).unwrap();
                    let _ = announce(rib, peer.id, key, &[peer.peer_as]);
                }
            });
        }
        s.spawn(|| {
            events::process_peer_down(&rib, victim).unwrap();
        });
    });

    // Nothing learned from the torn down peer survives.
    for (_, handle) in rib.tables.ipv4_unicast.entries() {
        let entry = handle.lock().unwrap();
        assert!(entry.candidates().all(|c| c.path_id.peer_id != victim));
        assert_eq!(entry.len(), 3);
    }
    assert_eq!(rib.statistics(AfiSafi::Ipv4Unicast).destinations, 256);
}

#[test]
fn unsupported_table_is_rejected() {
    let rib = rib();
    let mut p1 = peer(ip4!("1.1.1.1"), PeerRole::External, 65001);
    p1.tables = [AfiSafi::Ipv4Unicast].into();
    let p1_id = p1.id;
    let _p1_rx = peer_up(&rib, p1);

    let key = "2001:db8::/32".parse().unwrap();
    let path = PathUpdate::reach(key, None, attrs(&[65001]));
    assert!(matches!(
        events::process_update::<Ipv6Unicast>(&rib, p1_id, vec![path]),
        Err(Error::TableNotSupported(_, AfiSafi::Ipv6Unicast))
    ));
}

#[test]
fn initial_sync_and_route_refresh() {
    let rib = rib();
    let p1 = peer(ip4!("1.1.1.1"), PeerRole::External, 65001);
    let p1_id = p1.id;
    let _p1_rx = peer_up(&rib, p1);
    announce(&rib, p1_id, prefix("10.1.0.0/16"), &[65001]).unwrap();
    announce(&rib, p1_id, prefix("10.2.0.0/16"), &[65001]).unwrap();
    events::decision_process::<Ipv4Unicast>(&rib);

    // A late peer receives the current table, then an End-of-RIB marker
    // for every table it supports.
    let mut p2 = peer(ip4!("2.2.2.2"), PeerRole::External, 65002);
    p2.tables = [AfiSafi::Ipv4Unicast].into();
    let p2_id = p2.id;
    let (tx, mut p2_rx) = mpsc::unbounded_channel();
    events::process_peer_up(&rib, p2, tx).unwrap();
    let msgs = drain(&mut p2_rx);
    assert_eq!(updates(&msgs).len(), 2);
    assert_eq!(
        msgs.last(),
        Some(&RibOutMsg::EndOfRib(AfiSafi::Ipv4Unicast))
    );

    // Nothing changed: the decision process has nothing to send.
    events::decision_process::<Ipv4Unicast>(&rib);
    assert!(drain(&mut p2_rx).is_empty());

    // Route refresh re-sends the whole Adj-RIB-Out.
    events::route_refresh(&rib, p2_id, AfiSafi::Ipv4Unicast).unwrap();
    assert_eq!(updates(&drain(&mut p2_rx)).len(), 2);
    assert!(matches!(
        events::route_refresh(&rib, p2_id, AfiSafi::Ipv6Unicast),
        Err(Error::TableNotSupported(..))
    ));
}

#[test]
fn add_path_peers_receive_all_paths() {
    let mut config = RibConfig {
        local_as: LOCAL_AS,
        router_id: ip4!("10.0.0.1"),
        ..Default::default()
    };
    config.afi_safi.ipv4_unicast.path_selection = PathSelectionMode::AllPaths;
    let rib = Rib::with_default_policy(config).unwrap();

    let p1 = peer(ip4!("1.1.1.1"), PeerRole::External, 65001);
    let p2 = peer(ip4!("2.2.2.2"), PeerRole::External, 65002);
    let mut p3 = peer(ip4!("3.3.3.3"), PeerRole::RrClient, LOCAL_AS);
    p3.add_path = [AfiSafi::Ipv4Unicast].into();
    let p4 = peer(ip4!("4.4.4.4"), PeerRole::Internal, LOCAL_AS);
    let (p1_id, p2_id) = (p1.id, p2.id);
    let _p1_rx = peer_up(&rib, p1);
    let _p2_rx = peer_up(&rib, p2);
    let mut p3_rx = peer_up(&rib, p3);
    let mut p4_rx = peer_up(&rib, p4);
    let key = prefix("10.0.0.0/8");

    announce(&rib, p1_id, key, &[65001, 65010]).unwrap();
    announce(&rib, p2_id, key, &[65002]).unwrap();
    events::decision_process::<Ipv4Unicast>(&rib);

    // Add-Path peer: both paths, tagged with their local path ids.
    let msgs = drain(&mut p3_rx);
    let mut path_ids = updates(&msgs)
        .iter()
        .map(|route| route.path_id)
        .collect::<Vec<_>>();
    path_ids.sort();
    assert_eq!(path_ids, vec![Some(1), Some(2)]);

    // Regular peer: primary best path only.
    let msgs = drain(&mut p4_rx);
    let routes = updates(&msgs);
    assert_eq!(routes.len(), 1);
    assert_eq!(routes[0].source, p2_id);
    assert_eq!(routes[0].path_id, None);

    // The secondary path goes away and is withdrawn by its id.
    withdraw(&rib, p1_id, key).unwrap();
    events::decision_process::<Ipv4Unicast>(&rib);
    assert_eq!(
        drain(&mut p3_rx),
        vec![RibOutMsg::Withdraw {
            nlri: Nlri::Ipv4Unicast(key),
            path_id: Some(1),
        }]
    );
    assert!(drain(&mut p4_rx).is_empty());
}

#[test]
fn export_policy_rejection() {
    let config = RibConfig {
        local_as: LOCAL_AS,
        router_id: ip4!("10.0.0.1"),
        default_export_policy: DefaultPolicyType::RejectRoute,
        ..Default::default()
    };
    let rib = Rib::with_default_policy(config).unwrap();
    let p1 = peer(ip4!("1.1.1.1"), PeerRole::External, 65001);
    let p2 = peer(ip4!("2.2.2.2"), PeerRole::External, 65002);
    let p1_id = p1.id;
    let _p1_rx = peer_up(&rib, p1);
    let mut p2_rx = peer_up(&rib, p2);

    announce(&rib, p1_id, prefix("10.0.0.0/8"), &[65001]).unwrap();
    events::decision_process::<Ipv4Unicast>(&rib);
    assert!(drain(&mut p2_rx).is_empty());
}

#[tokio::test]
async fn rib_task_runs_decision_process() {
    init_tracing();
    let config = RibConfig {
        local_as: LOCAL_AS,
        router_id: ip4!("10.0.0.1"),
        decision_delay_ms: 10,
        ..Default::default()
    };
    let rib = Arc::new(Rib::with_default_policy(config).unwrap());
    let (input_tx, input_rx) = mpsc::unbounded_channel();
    let _task = tasks::rib_task(rib.clone(), input_rx);

    let p1 = peer(ip4!("1.1.1.1"), PeerRole::External, 65001);
    let p2 = peer(ip4!("2.2.2.2"), PeerRole::Internal, LOCAL_AS);
    let p1_id = p1.id;
    let (p1_tx, _p1_rx) = mpsc::unbounded_channel();
    let (p2_tx, mut p2_rx) = mpsc::unbounded_channel();
    for (peer, tx) in [(p1, p1_tx), (p2, p2_tx)] {
        let msg = RibInputMsg::PeerUp(PeerUpMsg { peer, tx });
        input_tx.send(msg).unwrap();
    }

    let key = prefix("10.0.0.0/8");
    let msg = RibInputMsg::Update(UpdateMsg {
        peer_id: p1_id,
        paths: PathUpdates::Ipv4Unicast(vec![PathUpdate::reach(
            key,
            None,
            attrs(&[65001]),
        )]),
    });
    input_tx.send(msg).unwrap();

    // Skip the End-of-RIB markers of the initial sync.
    let route = loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), p2_rx.recv())
            .await
            .unwrap()
            .unwrap();
        if let RibOutMsg::Update(route) = msg {
            break route;
        }
    };
    assert_eq!(route.nlri, Nlri::Ipv4Unicast(key));
    assert_eq!(route.source, p1_id);
}
