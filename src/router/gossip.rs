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

//! The public channel graph: validated ingestion of gossip messages and
//! periodic pruning of stale data. A single ingestor task mutates the
//! graph; pathfinding readers work on snapshots.

use std::collections::BTreeMap;

use lnc_p2p::bolt::{
    Alias, ChainHash, ChannelAnnouncement, ChannelId, ChannelUpdate,
    FeatureVector, NodeAddress, NodeAnnouncement, NodeColor,
    ShortChannelId,
};
use secp256k1::{PublicKey, SECP256K1};

/// Channels whose funding output is buried deeper than the chain tip
/// minus this many blocks without any fresh update are pruned
pub const CHANNEL_PRUNE_BLOCKS: u32 = 2016;

/// Gossip records older than two weeks are pruned
pub const GOSSIP_PRUNE_SECONDS: u32 = 14 * 24 * 3600;

/// Gossip validation errors. Invalid messages are dropped; the sending
/// peer receives a warning at most.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Display, Error)]
#[display(doc_comments)]
pub enum Error {
    /// signature by {signer} over the {message} message is invalid
    InvalidSignature {
        message: &'static str,
        signer: &'static str,
    },

    /// gossip message refers to chain different from the graph's chain
    WrongChain,

    /// node ids within the channel announcement are not in ascending
    /// order
    UnorderedNodeIds,

    /// announcement refers to unknown channel {0}
    UnknownChannel(ShortChannelId),

    /// announcement comes from a node without any known channel
    UnknownNode,
}

/// Forwarding policy of one channel direction, from `channel_update`
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct DirectionalPolicy {
    /// Timestamp of the most recent update for this direction
    pub timestamp: u32,

    pub cltv_expiry_delta: u16,
    pub htlc_minimum_msat: u64,
    pub htlc_maximum_msat: u64,
    pub fee_base_msat: u32,
    pub fee_proportional_millionths: u32,

    /// The direction is administratively disabled for forwarding
    pub disabled: bool,
}

impl From<&ChannelUpdate> for DirectionalPolicy {
    fn from(update: &ChannelUpdate) -> Self {
        DirectionalPolicy {
            timestamp: update.timestamp,
            cltv_expiry_delta: update.cltv_expiry_delta,
            htlc_minimum_msat: update.htlc_minimum_msat,
            htlc_maximum_msat: update.htlc_maximum_msat,
            fee_base_msat: update.fee_base_msat,
            fee_proportional_millionths: update
                .fee_proportional_millionths,
            disabled: update.is_disabled(),
        }
    }
}

/// A channel of the public graph
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct GossipChannelInfo {
    /// Endpoint node ids, in the ascending order of the announcement
    pub nodes: (PublicKey, PublicKey),

    pub short_channel_id: ShortChannelId,

    /// Channel capacity when known from chain data
    pub capacity_sats: Option<u64>,

    /// Forwarding policy per direction: `.0` describes forwarding from
    /// `nodes.0`, `.1` from `nodes.1`
    pub policies: (Option<DirectionalPolicy>, Option<DirectionalPolicy>),

    pub features: FeatureVector,
}

impl GossipChannelInfo {
    /// Most recent update timestamp across both directions
    fn last_update(&self) -> u32 {
        let timestamp =
            |policy: &Option<DirectionalPolicy>| -> u32 {
                policy.map(|policy| policy.timestamp).unwrap_or_default()
            };
        timestamp(&self.policies.0).max(timestamp(&self.policies.1))
    }

    /// Policy of the direction leading *from* the given node
    pub fn policy_from(
        &self,
        node: &PublicKey,
    ) -> Option<&DirectionalPolicy> {
        if *node == self.nodes.0 {
            self.policies.0.as_ref()
        } else if *node == self.nodes.1 {
            self.policies.1.as_ref()
        } else {
            None
        }
    }

    /// The other endpoint of the channel
    pub fn other_node(&self, node: &PublicKey) -> Option<PublicKey> {
        if *node == self.nodes.0 {
            Some(self.nodes.1)
        } else if *node == self.nodes.1 {
            Some(self.nodes.0)
        } else {
            None
        }
    }
}

/// A node of the public graph
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct GossipNodeInfo {
    pub node_id: PublicKey,
    pub features: FeatureVector,
    pub addresses: Vec<NodeAddress>,
    pub alias: Alias,
    pub rgb_color: NodeColor,
    pub last_update: u32,
}

/// One of our own channels, injected into pathfinding as a zero-fee
/// first hop
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct LocalChannelInfo {
    pub remote_node: PublicKey,
    pub channel_id: ChannelId,
    pub short_channel_id: ShortChannelId,
    pub outbound_capacity_msat: u64,
    pub inbound_capacity_msat: u64,
}

/// The public routing graph, plus our own channels
#[derive(Clone, PartialEq, Debug)]
pub struct GossipGraph {
    chain_hash: ChainHash,
    nodes: BTreeMap<PublicKey, GossipNodeInfo>,
    channels: BTreeMap<ShortChannelId, GossipChannelInfo>,
    local_channels: Vec<LocalChannelInfo>,
}

impl GossipGraph {
    pub fn new(chain_hash: ChainHash) -> GossipGraph {
        GossipGraph {
            chain_hash,
            nodes: empty!(),
            channels: empty!(),
            local_channels: vec![],
        }
    }

    #[inline]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    #[inline]
    pub fn channel(
        &self,
        short_channel_id: &ShortChannelId,
    ) -> Option<&GossipChannelInfo> {
        self.channels.get(short_channel_id)
    }

    #[inline]
    pub fn node(&self, node_id: &PublicKey) -> Option<&GossipNodeInfo> {
        self.nodes.get(node_id)
    }

    pub fn channels(
        &self,
    ) -> impl Iterator<Item = &GossipChannelInfo> {
        self.channels.values()
    }

    #[inline]
    pub fn local_channels(&self) -> &[LocalChannelInfo] {
        &self.local_channels
    }

    /// Registers one of our own channels for route construction
    pub fn upsert_local_channel(&mut self, info: LocalChannelInfo) {
        if let Some(existing) = self
            .local_channels
            .iter_mut()
            .find(|local| local.channel_id == info.channel_id)
        {
            *existing = info;
        } else {
            self.local_channels.push(info);
        }
    }

    pub fn remove_local_channel(&mut self, channel_id: &ChannelId) {
        self.local_channels
            .retain(|local| local.channel_id != *channel_id);
    }

    /// Validates and ingests a `channel_announcement`. Returns `false`
    /// when the channel was already known.
    pub fn process_channel_announcement(
        &mut self,
        announcement: &ChannelAnnouncement,
        capacity_sats: Option<u64>,
    ) -> Result<bool, Error> {
        if announcement.chain_hash != self.chain_hash {
            return Err(Error::WrongChain);
        }
        if announcement.node_id_1.serialize()
            >= announcement.node_id_2.serialize()
        {
            return Err(Error::UnorderedNodeIds);
        }
        let digest = announcement.signature_digest();
        for (signature, signer, name) in [
            (
                &announcement.node_signature_1,
                &announcement.node_id_1,
                "node_id_1",
            ),
            (
                &announcement.node_signature_2,
                &announcement.node_id_2,
                "node_id_2",
            ),
            (
                &announcement.bitcoin_signature_1,
                &announcement.bitcoin_key_1,
                "bitcoin_key_1",
            ),
            (
                &announcement.bitcoin_signature_2,
                &announcement.bitcoin_key_2,
                "bitcoin_key_2",
            ),
        ] {
            if SECP256K1
                .verify_ecdsa(&digest, signature, signer)
                .is_err()
            {
                return Err(Error::InvalidSignature {
                    message: "channel_announcement",
                    signer: name,
                });
            }
        }

        let known = self
            .channels
            .insert(announcement.short_channel_id, GossipChannelInfo {
                nodes: (announcement.node_id_1, announcement.node_id_2),
                short_channel_id: announcement.short_channel_id,
                capacity_sats,
                policies: (None, None),
                features: announcement.features.clone(),
            })
            .is_some();
        debug!(
            "gossip: channel {} announced between {} and {}",
            announcement.short_channel_id,
            announcement.node_id_1,
            announcement.node_id_2
        );
        Ok(!known)
    }

    /// Validates and ingests a `node_announcement`. Announcements from
    /// nodes without a single known channel are rejected as required by
    /// BOLT-7.
    pub fn process_node_announcement(
        &mut self,
        announcement: &NodeAnnouncement,
    ) -> Result<bool, Error> {
        let has_channel = self.channels.values().any(|channel| {
            channel.nodes.0 == announcement.node_id
                || channel.nodes.1 == announcement.node_id
        });
        if !has_channel {
            return Err(Error::UnknownNode);
        }
        if SECP256K1
            .verify_ecdsa(
                &announcement.signature_digest(),
                &announcement.signature,
                &announcement.node_id,
            )
            .is_err()
        {
            return Err(Error::InvalidSignature {
                message: "node_announcement",
                signer: "node_id",
            });
        }
        if let Some(existing) = self.nodes.get(&announcement.node_id) {
            if existing.last_update >= announcement.timestamp {
                // stale update: drop silently
                return Ok(false);
            }
        }
        self.nodes.insert(announcement.node_id, GossipNodeInfo {
            node_id: announcement.node_id,
            features: announcement.features.clone(),
            addresses: announcement.addresses.clone(),
            alias: announcement.alias,
            rgb_color: announcement.rgb_color,
            last_update: announcement.timestamp,
        });
        Ok(true)
    }

    /// Validates and ingests a `channel_update`. Stale updates (same or
    /// older timestamp for the direction) are dropped.
    pub fn process_channel_update(
        &mut self,
        update: &ChannelUpdate,
    ) -> Result<bool, Error> {
        if update.chain_hash != self.chain_hash {
            return Err(Error::WrongChain);
        }
        let channel = self
            .channels
            .get_mut(&update.short_channel_id)
            .ok_or(Error::UnknownChannel(update.short_channel_id))?;
        let signer = if update.direction() {
            channel.nodes.1
        } else {
            channel.nodes.0
        };
        if SECP256K1
            .verify_ecdsa(
                &update.signature_digest(),
                &update.signature,
                &signer,
            )
            .is_err()
        {
            return Err(Error::InvalidSignature {
                message: "channel_update",
                signer: "direction node",
            });
        }
        let slot = if update.direction() {
            &mut channel.policies.1
        } else {
            &mut channel.policies.0
        };
        if let Some(existing) = slot {
            if existing.timestamp >= update.timestamp {
                return Ok(false);
            }
        }
        *slot = Some(DirectionalPolicy::from(update));
        Ok(true)
    }

    /// Prunes against the current wall clock; the periodic maintenance
    /// entry point of the gossip ingestor task
    pub fn prune_now(&mut self, tip_height: u32) {
        let now = chrono::Utc::now().timestamp() as u32;
        self.prune(now, tip_height)
    }

    /// Prunes stale data: channels buried below `tip_height -
    /// CHANNEL_PRUNE_BLOCKS` with no update in two weeks, updates older
    /// than two weeks, and nodes left without channels.
    pub fn prune(&mut self, now: u32, tip_height: u32) {
        let height_floor =
            tip_height.saturating_sub(CHANNEL_PRUNE_BLOCKS);
        let time_floor = now.saturating_sub(GOSSIP_PRUNE_SECONDS);

        self.channels.retain(|short_channel_id, channel| {
            let fresh = channel.last_update() >= time_floor;
            let recent_funding =
                short_channel_id.block_height >= height_floor;
            if !(fresh || recent_funding) {
                debug!("gossip: pruning channel {}", short_channel_id);
            }
            fresh || recent_funding
        });

        let channels = &self.channels;
        self.nodes.retain(|node_id, node| {
            node.last_update >= time_floor
                && channels.values().any(|channel| {
                    channel.nodes.0 == *node_id
                        || channel.nodes.1 == *node_id
                })
        });
    }
}

#[cfg(test)]
pub(crate) mod test {
    use lnc_p2p::bolt::CHANNEL_FLAG_DIRECTION;
    use secp256k1::ecdsa::Signature;
    use secp256k1::{Message, SecretKey};

    use super::*;

    pub fn node_key(byte: u8) -> SecretKey {
        SecretKey::from_slice(&[byte; 32]).unwrap()
    }

    fn sign(digest: Message, key: &SecretKey) -> Signature {
        SECP256K1.sign_ecdsa(&digest, key)
    }

    fn dumb_signed<T>(
        mut message: T,
        update: impl Fn(&mut T, Signature),
        digest: impl Fn(&T) -> Message,
        key: &SecretKey,
    ) -> T {
        let placeholder = sign(
            Message::from_slice(&[42u8; 32]).unwrap(),
            key,
        );
        update(&mut message, placeholder);
        let signature = sign(digest(&message), key);
        update(&mut message, signature);
        message
    }

    /// Builds a validly-signed channel announcement between two nodes
    pub fn make_channel(
        key_1: &SecretKey,
        key_2: &SecretKey,
        short_channel_id: ShortChannelId,
        chain_hash: ChainHash,
    ) -> ChannelAnnouncement {
        let node_id_1 = PublicKey::from_secret_key(SECP256K1, key_1);
        let node_id_2 = PublicKey::from_secret_key(SECP256K1, key_2);
        let (key_1, key_2, node_id_1, node_id_2) =
            if node_id_1.serialize() < node_id_2.serialize() {
                (key_1, key_2, node_id_1, node_id_2)
            } else {
                (key_2, key_1, node_id_2, node_id_1)
            };
        let placeholder = sign(
            Message::from_slice(&[42u8; 32]).unwrap(),
            key_1,
        );
        let mut announcement = ChannelAnnouncement {
            node_signature_1: placeholder,
            node_signature_2: placeholder,
            bitcoin_signature_1: placeholder,
            bitcoin_signature_2: placeholder,
            features: FeatureVector::new(),
            chain_hash,
            short_channel_id,
            node_id_1,
            node_id_2,
            // funding keys reuse node keys in tests
            bitcoin_key_1: node_id_1,
            bitcoin_key_2: node_id_2,
        };
        let digest = announcement.signature_digest();
        announcement.node_signature_1 = sign(digest, key_1);
        announcement.node_signature_2 = sign(digest, key_2);
        announcement.bitcoin_signature_1 = sign(digest, key_1);
        announcement.bitcoin_signature_2 = sign(digest, key_2);
        announcement
    }

    /// Builds a validly-signed channel update for one direction
    #[allow(clippy::too_many_arguments)]
    pub fn make_update(
        signer: &SecretKey,
        direction: bool,
        short_channel_id: ShortChannelId,
        chain_hash: ChainHash,
        timestamp: u32,
        fee_base_msat: u32,
        fee_proportional_millionths: u32,
        cltv_expiry_delta: u16,
    ) -> ChannelUpdate {
        dumb_signed(
            ChannelUpdate {
                signature: sign(
                    Message::from_slice(&[42u8; 32]).unwrap(),
                    signer,
                ),
                chain_hash,
                short_channel_id,
                timestamp,
                message_flags: 1,
                channel_flags: if direction {
                    CHANNEL_FLAG_DIRECTION
                } else {
                    0
                },
                cltv_expiry_delta,
                htlc_minimum_msat: 1,
                fee_base_msat,
                fee_proportional_millionths,
                htlc_maximum_msat: 10_000_000_000,
            },
            |update, signature| update.signature = signature,
            |update| update.signature_digest(),
            signer,
        )
    }

    #[test]
    fn announcement_ingestion() {
        let mut graph = GossipGraph::new(ChainHash::regtest());
        let announcement = make_channel(
            &node_key(1),
            &node_key(2),
            ShortChannelId::with(100, 1, 0),
            ChainHash::regtest(),
        );
        assert!(graph
            .process_channel_announcement(&announcement, Some(1_000_000))
            .unwrap());
        assert_eq!(graph.channel_count(), 1);
        // duplicate
        assert!(!graph
            .process_channel_announcement(&announcement, None)
            .unwrap());
    }

    #[test]
    fn bad_signature_rejected() {
        let mut graph = GossipGraph::new(ChainHash::regtest());
        let mut announcement = make_channel(
            &node_key(1),
            &node_key(2),
            ShortChannelId::with(100, 1, 0),
            ChainHash::regtest(),
        );
        announcement.node_signature_1 =
            announcement.node_signature_2;
        let result =
            graph.process_channel_announcement(&announcement, None);
        // either signature slot may fail depending on key ordering
        assert!(matches!(
            result,
            Err(Error::InvalidSignature { .. })
        ));
    }

    #[test]
    fn stale_update_dropped() {
        let mut graph = GossipGraph::new(ChainHash::regtest());
        let scid = ShortChannelId::with(100, 1, 0);
        let announcement = make_channel(
            &node_key(1),
            &node_key(2),
            scid,
            ChainHash::regtest(),
        );
        graph
            .process_channel_announcement(&announcement, None)
            .unwrap();
        let node_1_key = if PublicKey::from_secret_key(
            SECP256K1,
            &node_key(1),
        ) == announcement.node_id_1
        {
            node_key(1)
        } else {
            node_key(2)
        };
        let update = make_update(
            &node_1_key,
            false,
            scid,
            ChainHash::regtest(),
            1_000,
            1_000,
            1,
            40,
        );
        assert!(graph.process_channel_update(&update).unwrap());
        // same timestamp: stale
        assert!(!graph.process_channel_update(&update).unwrap());
        // older timestamp: stale
        let old_update = make_update(
            &node_1_key,
            false,
            scid,
            ChainHash::regtest(),
            999,
            2_000,
            2,
            40,
        );
        assert!(!graph.process_channel_update(&old_update).unwrap());
    }

    #[test]
    fn pruning_by_height_and_age() {
        let mut graph = GossipGraph::new(ChainHash::regtest());
        let old_scid = ShortChannelId::with(100, 1, 0);
        let fresh_scid = ShortChannelId::with(3_000, 1, 0);
        for scid in [old_scid, fresh_scid] {
            let announcement = make_channel(
                &node_key(1),
                &node_key(2),
                scid,
                ChainHash::regtest(),
            );
            graph
                .process_channel_announcement(&announcement, None)
                .unwrap();
        }
        // tip 2116: floor at 100; the old channel sits exactly at the
        // boundary and is retained
        graph.prune(GOSSIP_PRUNE_SECONDS + 1, 2_116);
        assert_eq!(graph.channel_count(), 2);
        // one block later the old channel falls below the floor
        graph.prune(GOSSIP_PRUNE_SECONDS + 1, 2_117);
        assert_eq!(graph.channel_count(), 1);
        assert!(graph.channel(&fresh_scid).is_some());
    }
}
