use std::{
    net::{IpAddr, SocketAddr},
    sync::atomic::{AtomicU64, Ordering},
};

use ahash::HashMap;
use bytes::Bytes;
use tokio::{sync::mpsc, task::JoinHandle};

use crate::session::Event;

static NEXT_SUBSCRIBER_ID: AtomicU64 = AtomicU64::new(0);

/// A data indication delivered to a subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundData {
    /// the peer the data came from, as reported by the server.
    pub from: SocketAddr,
    pub data: Bytes,
}

/// A local consumer of inbound data indications.
///
/// A subscriber is registered against one or more peer IPs and receives
/// every data indication from those peers on its channel.  Dropping the
/// receiving end counts as death: the session notices and removes the
/// subscriber everywhere.
///
/// Clones share the identity of the original, so a subscriber can be
/// registered under several peers and removed with any clone.
#[derive(Debug, Clone)]
pub struct Subscriber {
    id: u64,
    tx: mpsc::Sender<InboundData>,
}

impl Subscriber {
    /// create a subscriber and the receiving end of its channel.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<InboundData>) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            Self {
                id: NEXT_SUBSCRIBER_ID.fetch_add(1, Ordering::Relaxed),
                tx,
            },
            rx,
        )
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

// the subscriber plus the liveness watch guarding it for one peer entry.
// aborting the watch on drop keeps exactly one watch per (peer,
// subscriber) pair alive.
struct Entry {
    subscriber: Subscriber,
    watch: JoinHandle<()>,
}

impl Drop for Entry {
    fn drop(&mut self) {
        self.watch.abort();
    }
}

/// Routing table for inbound data indications.
///
/// Maps peer IP to the subscribers interested in it.  An inner map never
/// stays empty: the outer entry is pruned as soon as its last subscriber
/// leaves.
#[derive(Default)]
pub struct Subscriptions(HashMap<IpAddr, HashMap<u64, Entry>>);

impl Subscriptions {
    /// register a subscriber for a peer IP.
    ///
    /// registering the same pair twice is a no-op, the existing liveness
    /// watch stays in place.
    pub fn subscribe(&mut self, peer: IpAddr, subscriber: Subscriber, queue: mpsc::Sender<Event>) {
        let entries = self.0.entry(peer).or_default();
        if entries.contains_key(&subscriber.id) {
            return;
        }

        let id = subscriber.id;
        let tx = subscriber.tx.clone();
        let watch = tokio::spawn(async move {
            tx.closed().await;
            let _ = queue.send(Event::SubscriberDown(id)).await;
        });

        entries.insert(id, Entry { subscriber, watch });
    }

    /// remove one (peer, subscriber) pair.
    ///
    /// removing an absent pair is a no-op.
    pub fn unsubscribe(&mut self, peer: IpAddr, id: u64) {
        if let Some(entries) = self.0.get_mut(&peer) {
            entries.remove(&id);
            if entries.is_empty() {
                self.0.remove(&peer);
            }
        }
    }

    /// remove a dead subscriber from every peer it was registered under.
    pub fn remove_subscriber(&mut self, id: u64) {
        self.0.retain(|_, entries| {
            entries.remove(&id);
            !entries.is_empty()
        });
    }

    /// deliver a data indication to every subscriber of the peer's IP.
    pub fn dispatch(&self, from: SocketAddr, data: &[u8]) {
        let Some(entries) = self.0.get(&from.ip()) else {
            return;
        };

        let data = Bytes::copy_from_slice(data);
        for entry in entries.values() {
            if entry
                .subscriber
                .tx
                .try_send(InboundData {
                    from,
                    data: data.clone(),
                })
                .is_err()
            {
                log::warn!("subscriber {} receive buffer full", entry.subscriber.id);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
