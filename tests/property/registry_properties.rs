//! Property-based tests for the presence lifecycle.
//!
//! Uses proptest to verify, for arbitrary interleavings of connect and
//! disconnect events across a small set of users:
//! 1. The snapshot equals the set of users whose latest event was a connect.
//! 2. An online user resolves to the handle of their latest connection.
//! 3. Every identified disconnect produces exactly one broadcast per
//!    remaining party.

use std::collections::{BTreeSet, HashMap};

use axum::extract::ws::Message;
use livechat_proto::UserId;
use livechat_server::presence::{PresenceHub, Session};
use livechat_server::registry::{ConnectionHandle, ConnectionId};
use proptest::prelude::*;
use tokio::sync::mpsc::UnboundedReceiver;

const USERS: [&str; 4] = ["alice", "bob", "carol", "dave"];

#[derive(Debug, Clone)]
enum Event {
    Connect(usize),
    Disconnect(usize),
}

fn arb_event() -> impl Strategy<Value = Event> {
    prop_oneof![
        (0..USERS.len()).prop_map(Event::Connect),
        (0..USERS.len()).prop_map(Event::Disconnect),
    ]
}

struct Open {
    session: Session,
    id: ConnectionId,
    rx: UnboundedReceiver<Message>,
}

fn count_frames(rx: &mut UnboundedReceiver<Message>) -> usize {
    let mut n = 0;
    while rx.try_recv().is_ok() {
        n += 1;
    }
    n
}

proptest! {
    #[test]
    fn snapshot_matches_latest_events(events in prop::collection::vec(arb_event(), 0..64)) {
        let hub = PresenceHub::new();
        // Open sessions per user, most recent last.
        let mut open: HashMap<usize, Vec<Open>> = HashMap::new();
        let mut online: BTreeSet<UserId> = BTreeSet::new();

        for event in events {
            match event {
                Event::Connect(u) => {
                    let (handle, rx) = ConnectionHandle::channel();
                    let id = handle.id();
                    let session = hub.connect(handle, Some(UserId::new(USERS[u])));
                    open.entry(u).or_default().push(Open { session, id, rx });
                    online.insert(UserId::new(USERS[u]));
                }
                Event::Disconnect(u) => {
                    let Some(mut closing) = open.get_mut(&u).and_then(Vec::pop) else {
                        continue;
                    };
                    for party in open.values_mut().flatten() {
                        count_frames(&mut party.rx);
                    }

                    prop_assert!(hub.disconnect(&mut closing.session));
                    online.remove(&UserId::new(USERS[u]));

                    for party in open.values_mut().flatten() {
                        prop_assert_eq!(count_frames(&mut party.rx), 1);
                    }
                }
            }

            let snapshot: BTreeSet<UserId> = hub.snapshot().into_iter().collect();
            prop_assert_eq!(&snapshot, &online);
            prop_assert_eq!(hub.snapshot().len(), online.len());

            for (u, sessions) in &open {
                let user = UserId::new(USERS[*u]);
                if online.contains(&user) {
                    let latest = sessions.last().map(|o| o.id);
                    prop_assert_eq!(hub.lookup(&user).map(|h| h.id()), latest);
                }
            }
        }
    }

    #[test]
    fn duplicate_registration_leaves_one_entry(repeats in 1usize..8) {
        let hub = PresenceHub::new();
        let mut last = None;
        let mut receivers = Vec::new();
        for _ in 0..repeats {
            let (handle, rx) = ConnectionHandle::channel();
            last = Some(handle.id());
            hub.connect(handle, Some(UserId::new("alice")));
            receivers.push(rx);
        }
        prop_assert_eq!(hub.snapshot(), vec![UserId::new("alice")]);
        prop_assert_eq!(hub.lookup(&UserId::new("alice")).map(|h| h.id()), last);
        prop_assert_eq!(hub.connection_count(), repeats);
    }
}
