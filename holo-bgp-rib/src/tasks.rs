//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::sync::Arc;
use std::time::Duration;

use holo_utils::task::{Task, TimeoutTask};
use holo_utils::{Sender, UnboundedReceiver};
use tokio::sync::mpsc;
use tracing::{Instrument, debug_span};

use crate::events;
use crate::rib::Rib;
use crate::tasks::messages::RibInputMsg;

//
// RIB tasks diagram:
//
//                                     +--------------+
//                     peer_rx (Nx) -> |              | -> (Nx) peer_tx
//                                     |     rib      |
// schedule_decision_process (0/1x) -> |              |
//                                     +--------------+
//

// RIB inter-task message types.
pub mod messages {
    use holo_utils::UnboundedSender;
    use holo_utils::bgp::AfiSafi;
    use serde::{Deserialize, Serialize};

    use crate::af::{AddressFamily, Ipv4Unicast, Ipv6Unicast, L3VpnIpv4Unicast};
    use crate::attribute::Attrs;
    use crate::peer::{Peer, PeerId};

    // Type aliases.
    pub type RibInputMsg = input::RibMsg;
    pub type RibOutMsg = output::RibMsg;

    // Input messages (peer session -> RIB).
    pub mod input {
        use super::*;

        #[derive(Debug)]
        pub enum RibMsg {
            PeerUp(PeerUpMsg),
            PeerDown(PeerDownMsg),
            Update(UpdateMsg),
            RouteRefresh(RouteRefreshMsg),
        }

        #[derive(Debug)]
        pub struct PeerUpMsg {
            pub peer: Peer,
            pub tx: UnboundedSender<super::RibOutMsg>,
        }

        #[derive(Debug, Deserialize, Serialize)]
        pub struct PeerDownMsg {
            pub peer_id: PeerId,
        }

        // Batch of decoded path updates received from a peer.
        #[derive(Debug)]
        pub struct UpdateMsg {
            pub peer_id: PeerId,
            pub paths: PathUpdates,
        }

        #[derive(Debug)]
        pub enum PathUpdates {
            Ipv4Unicast(Vec<PathUpdate<Ipv4Unicast>>),
            Ipv6Unicast(Vec<PathUpdate<Ipv6Unicast>>),
            L3VpnIpv4Unicast(Vec<PathUpdate<L3VpnIpv4Unicast>>),
        }

        // A path advertisement, or a withdrawal when no attributes are
        // present.
        #[derive(Debug)]
        pub struct PathUpdate<A: AddressFamily> {
            pub key: A::Key,
            pub path_id: Option<u32>,
            pub attrs: Option<Attrs>,
        }

        #[derive(Debug, Deserialize, Serialize)]
        pub struct RouteRefreshMsg {
            pub peer_id: PeerId,
            pub afi_safi: AfiSafi,
        }

        impl<A> PathUpdate<A>
        where
            A: AddressFamily,
        {
            pub fn reach(
                key: A::Key,
                path_id: Option<u32>,
                attrs: Attrs,
            ) -> PathUpdate<A> {
                PathUpdate {
                    key,
                    path_id,
                    attrs: Some(attrs),
                }
            }

            pub fn unreach(
                key: A::Key,
                path_id: Option<u32>,
            ) -> PathUpdate<A> {
                PathUpdate {
                    key,
                    path_id,
                    attrs: None,
                }
            }
        }
    }

    // Output messages (RIB -> peer session).
    pub mod output {
        use super::*;
        use crate::af::Nlri;
        use crate::entry::Route;

        #[derive(Clone, Debug, Eq, PartialEq)]
        #[derive(Deserialize, Serialize)]
        pub enum RibMsg {
            Update(Route),
            Withdraw { nlri: Nlri, path_id: Option<u32> },
            EndOfRib(AfiSafi),
        }
    }
}

// ===== RIB task =====

// Spawns the RIB task, which applies the messages received from peer
// sessions and runs the decision process once bursts of updates settle.
pub fn rib_task(
    rib: Arc<Rib>,
    mut input_rx: UnboundedReceiver<RibInputMsg>,
) -> Task<()> {
    Task::spawn(
        async move {
            let (decision_processp, mut decision_processc) =
                mpsc::channel(1);
            let delay = rib.config.decision_delay();
            let mut decision_timeout = None;

            loop {
                tokio::select! {
                    msg = input_rx.recv() => {
                        let Some(msg) = msg else {
                            break;
                        };
                        if events::process_msg(&rib, msg)
                            && decision_timeout.is_none()
                        {
                            decision_timeout =
                                Some(schedule_decision_process(
                                    &decision_processp,
                                    delay,
                                ));
                        }
                    }
                    Some(()) = decision_processc.recv() => {
                        decision_timeout = None;
                        events::decision_process_all(&rib);
                    }
                }
            }

            // Flush pending changes before exiting.
            if decision_timeout.is_some() {
                events::decision_process_all(&rib);
            }
        }
        .instrument(debug_span!("rib")),
    )
}

// Timeout to trigger the decision process.
pub(crate) fn schedule_decision_process(
    decision_processp: &Sender<()>,
    delay: Duration,
) -> TimeoutTask {
    let decision_processp = decision_processp.clone();
    TimeoutTask::new(delay, move || async move {
        let _ = decision_processp.send(()).await;
    })
}
