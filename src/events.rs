// LNC Core Library implementing a non-custodial Lightning Network client
//
// Written in 2023-2026 by
//     LNC Contributors
//
// To the extent possible under law, the author(s) have dedicated all
// copyright and related and neighboring rights to this software to
// the public domain worldwide. This software is distributed without
// any warranty.
//
// You should have received a copy of the MIT License
// along with this software.
// If not, see <https://opensource.org/licenses/MIT>.

//! Typed channel events. The embedding application subscribes to the
//! [`EventBus`] instead of injecting callbacks into the channel; channels
//! stay serializable and the fan-out point is explicit.

use amplify::Slice32;
use bitcoin::Transaction;
use lnc_p2p::bolt::{ChannelId, HashPreimage};
use tokio::sync::broadcast;

use crate::channel::Lifecycle;

/// Capacity of the event channel; stale subscribers lose oldest events
/// first
const EVENT_BUS_CAPACITY: usize = 256;

/// Events published by channel actors and the watchtower
#[derive(Clone, Debug)]
pub enum ChannelEvent {
    /// The channel moved to a new lifecycle stage
    StageChanged {
        /// Raw channel id bytes (temporary or final)
        channel_id: Slice32,
        stage: Lifecycle,
    },

    /// The channel is open and usable for payments
    Active { channel_id: ChannelId },

    /// Balances changed after a completed commitment exchange
    BalanceChanged {
        channel_id: ChannelId,
        local_msat: u64,
        remote_msat: u64,
    },

    /// An HTLC we offered was settled; the preimage is the proof of
    /// payment
    HtlcSettled {
        channel_id: ChannelId,
        htlc_id: u64,
        preimage: HashPreimage,
    },

    /// An HTLC we offered was failed
    HtlcFailed {
        channel_id: ChannelId,
        htlc_id: u64,
        reason: Vec<u8>,
    },

    /// The peer revoked a commitment; the watchtower must start
    /// monitoring it
    Revoked {
        channel_id: ChannelId,
        ctn: u64,
        secret: Slice32,
    },

    /// A mutual closing transaction is ready for broadcast
    BroadcastClosing {
        channel_id: ChannelId,
        tx: Transaction,
    },

    /// A unilateral commitment broadcast is requested
    BroadcastForceClose {
        channel_id: ChannelId,
        tx: Transaction,
    },

    /// The watchtower detected a revoked commitment on-chain and
    /// published the justice transaction
    BreachPunished {
        channel_id: ChannelId,
        ctn: u64,
        justice_txid: bitcoin::Txid,
    },
}

/// Broadcast bus distributing [`ChannelEvent`]s to any number of
/// application subscribers
#[derive(Clone, Debug)]
pub struct EventBus {
    sender: broadcast::Sender<ChannelEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        EventBus::new()
    }
}

impl EventBus {
    pub fn new() -> EventBus {
        let (sender, _) = broadcast::channel(EVENT_BUS_CAPACITY);
        EventBus { sender }
    }

    /// Publishes an event; events published with no live subscriber are
    /// dropped silently
    pub fn publish(&self, event: ChannelEvent) {
        let _ = self.sender.send(event);
    }

    /// Publishes every event drained from a channel actor
    pub fn publish_all(
        &self,
        events: impl IntoIterator<Item = ChannelEvent>,
    ) {
        for event in events {
            self.publish(event);
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChannelEvent> {
        self.sender.subscribe()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn events_reach_subscribers() {
        let bus = EventBus::new();
        let mut subscriber = bus.subscribe();
        bus.publish(ChannelEvent::Active {
            channel_id: ChannelId::wildcard(),
        });
        match subscriber.recv().await.unwrap() {
            ChannelEvent::Active { channel_id } => {
                assert!(channel_id.is_wildcard())
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn publish_without_subscribers_is_silent() {
        let bus = EventBus::new();
        bus.publish(ChannelEvent::Active {
            channel_id: ChannelId::wildcard(),
        });
    }
}
