// LNC P2P library implementing lightning network peer protocol messages
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

use std::io;

use bitcoin::hashes::{sha256d, Hash};
use lnc_encoding::{self, LightningDecode, LightningEncode};
use secp256k1::ecdsa::Signature;
use secp256k1::{Message, PublicKey};

use super::{
    Alias, ChainHash, ChannelId, FeatureVector, NodeAddress, NodeColor,
    ShortChannelId,
};

/// Bit of `channel_update.channel_flags` carrying the direction of the
/// update: 0 if the update comes from `node_id_1`, 1 from `node_id_2`.
pub const CHANNEL_FLAG_DIRECTION: u8 = 0x01;

/// Bit of `channel_update.channel_flags` marking the direction as disabled
/// for forwarding.
pub const CHANNEL_FLAG_DISABLED: u8 = 0x02;

// All gossip signatures commit to the double-SHA256 of the message body
// following the signature fields.
fn gossip_digest(unsigned_data: &[u8]) -> Message {
    let digest = sha256d::Hash::hash(unsigned_data);
    Message::from_slice(&digest.into_inner())
        .expect("32-byte hash is a valid message")
}

/// Both endpoints of a not-yet-announced channel exchange signatures over
/// its future `channel_announcement` through this message.
///
/// # Specification
/// <https://github.com/lightning/bolts/blob/master/07-routing-gossip.md#the-announcement_signatures-message>
#[derive(Clone, PartialEq, Eq, Debug, Display)]
#[display("announcement_signatures({channel_id}, {short_channel_id}, ...)")]
pub struct AnnouncementSignatures {
    /// The channel ID
    pub channel_id: ChannelId,

    /// On-chain position of the funding output
    pub short_channel_id: ShortChannelId,

    /// Signature by the sender's node key
    pub node_signature: Signature,

    /// Signature by the sender's funding (bitcoin) key
    pub bitcoin_signature: Signature,
}

impl LightningEncode for AnnouncementSignatures {
    fn lightning_encode<E: io::Write>(
        &self,
        mut e: E,
    ) -> Result<usize, lnc_encoding::Error> {
        let mut len = self.channel_id.lightning_encode(&mut e)?;
        len += self.short_channel_id.lightning_encode(&mut e)?;
        len += self.node_signature.lightning_encode(&mut e)?;
        len += self.bitcoin_signature.lightning_encode(&mut e)?;
        Ok(len)
    }
}

impl LightningDecode for AnnouncementSignatures {
    fn lightning_decode<D: io::Read>(
        mut d: D,
    ) -> Result<Self, lnc_encoding::Error> {
        Ok(AnnouncementSignatures {
            channel_id: ChannelId::lightning_decode(&mut d)?,
            short_channel_id: ShortChannelId::lightning_decode(&mut d)?,
            node_signature: Signature::lightning_decode(&mut d)?,
            bitcoin_signature: Signature::lightning_decode(&mut d)?,
        })
    }
}

/// Proves the existence of a channel between two nodes: carries signatures
/// by both node keys and both funding keys over the announcement body.
///
/// # Specification
/// <https://github.com/lightning/bolts/blob/master/07-routing-gossip.md#the-channel_announcement-message>
#[derive(Clone, PartialEq, Eq, Debug, Display)]
#[display("channel_announcement({short_channel_id}, {node_id_1}, {node_id_2})")]
pub struct ChannelAnnouncement {
    /// Signature by `node_id_1`
    pub node_signature_1: Signature,

    /// Signature by `node_id_2`
    pub node_signature_2: Signature,

    /// Signature by `bitcoin_key_1`
    pub bitcoin_signature_1: Signature,

    /// Signature by `bitcoin_key_2`
    pub bitcoin_signature_2: Signature,

    /// Channel features
    pub features: FeatureVector,

    /// The chain the channel was opened within
    pub chain_hash: ChainHash,

    /// On-chain position of the funding output
    pub short_channel_id: ShortChannelId,

    /// Numerically lesser of the two endpoint node ids
    pub node_id_1: PublicKey,

    /// Numerically greater of the two endpoint node ids
    pub node_id_2: PublicKey,

    /// Funding key of `node_id_1`
    pub bitcoin_key_1: PublicKey,

    /// Funding key of `node_id_2`
    pub bitcoin_key_2: PublicKey,
}

impl ChannelAnnouncement {
    /// Serializes the message body covered by the four signatures.
    pub fn unsigned_data(&self) -> Vec<u8> {
        let mut data = vec![];
        let _ = self
            .features
            .lightning_encode(&mut data)
            .and_then(|_| self.chain_hash.lightning_encode(&mut data))
            .and_then(|_| self.short_channel_id.lightning_encode(&mut data))
            .and_then(|_| self.node_id_1.lightning_encode(&mut data))
            .and_then(|_| self.node_id_2.lightning_encode(&mut data))
            .and_then(|_| self.bitcoin_key_1.lightning_encode(&mut data))
            .and_then(|_| self.bitcoin_key_2.lightning_encode(&mut data))
            .expect("memory encoders do not fail");
        data
    }

    /// Message digest all four signatures must be valid for.
    pub fn signature_digest(&self) -> Message {
        gossip_digest(&self.unsigned_data())
    }
}

impl LightningEncode for ChannelAnnouncement {
    fn lightning_encode<E: io::Write>(
        &self,
        mut e: E,
    ) -> Result<usize, lnc_encoding::Error> {
        let mut len = self.node_signature_1.lightning_encode(&mut e)?;
        len += self.node_signature_2.lightning_encode(&mut e)?;
        len += self.bitcoin_signature_1.lightning_encode(&mut e)?;
        len += self.bitcoin_signature_2.lightning_encode(&mut e)?;
        len += self.features.lightning_encode(&mut e)?;
        len += self.chain_hash.lightning_encode(&mut e)?;
        len += self.short_channel_id.lightning_encode(&mut e)?;
        len += self.node_id_1.lightning_encode(&mut e)?;
        len += self.node_id_2.lightning_encode(&mut e)?;
        len += self.bitcoin_key_1.lightning_encode(&mut e)?;
        len += self.bitcoin_key_2.lightning_encode(&mut e)?;
        Ok(len)
    }
}

impl LightningDecode for ChannelAnnouncement {
    fn lightning_decode<D: io::Read>(
        mut d: D,
    ) -> Result<Self, lnc_encoding::Error> {
        Ok(ChannelAnnouncement {
            node_signature_1: Signature::lightning_decode(&mut d)?,
            node_signature_2: Signature::lightning_decode(&mut d)?,
            bitcoin_signature_1: Signature::lightning_decode(&mut d)?,
            bitcoin_signature_2: Signature::lightning_decode(&mut d)?,
            features: FeatureVector::lightning_decode(&mut d)?,
            chain_hash: ChainHash::lightning_decode(&mut d)?,
            short_channel_id: ShortChannelId::lightning_decode(&mut d)?,
            node_id_1: PublicKey::lightning_decode(&mut d)?,
            node_id_2: PublicKey::lightning_decode(&mut d)?,
            bitcoin_key_1: PublicKey::lightning_decode(&mut d)?,
            bitcoin_key_2: PublicKey::lightning_decode(&mut d)?,
        })
    }
}

/// Allows a node to announce its presence, public keys, network addresses
/// and supported features.
///
/// # Specification
/// <https://github.com/lightning/bolts/blob/master/07-routing-gossip.md#the-node_announcement-message>
#[derive(Clone, PartialEq, Eq, Debug, Display)]
#[display("node_announcement({node_id}, {timestamp})")]
pub struct NodeAnnouncement {
    /// Signature by the announced node key
    pub signature: Signature,

    /// Node features
    pub features: FeatureVector,

    /// UNIX timestamp of the announcement, used for update ordering
    pub timestamp: u32,

    /// The announced node id
    pub node_id: PublicKey,

    /// Color for rendering the node in visualizations
    pub rgb_color: NodeColor,

    /// Zero-padded UTF-8 node name
    pub alias: Alias,

    /// Announced network addresses
    pub addresses: Vec<NodeAddress>,
}

impl NodeAnnouncement {
    fn encode_addresses(&self) -> Result<Vec<u8>, lnc_encoding::Error> {
        let mut block = vec![];
        for address in &self.addresses {
            address.lightning_encode(&mut block)?;
        }
        Ok(block)
    }

    /// Serializes the message body covered by the signature.
    pub fn unsigned_data(&self) -> Vec<u8> {
        let mut data = vec![];
        let _ = self
            .features
            .lightning_encode(&mut data)
            .and_then(|_| self.timestamp.lightning_encode(&mut data))
            .and_then(|_| self.node_id.lightning_encode(&mut data))
            .and_then(|_| self.rgb_color.lightning_encode(&mut data))
            .and_then(|_| self.alias.lightning_encode(&mut data))
            .and_then(|_| self.encode_addresses()?.lightning_encode(&mut data))
            .expect("memory encoders do not fail");
        data
    }

    /// Message digest the node signature must be valid for.
    pub fn signature_digest(&self) -> Message {
        gossip_digest(&self.unsigned_data())
    }
}

impl LightningEncode for NodeAnnouncement {
    fn lightning_encode<E: io::Write>(
        &self,
        mut e: E,
    ) -> Result<usize, lnc_encoding::Error> {
        let mut len = self.signature.lightning_encode(&mut e)?;
        len += self.features.lightning_encode(&mut e)?;
        len += self.timestamp.lightning_encode(&mut e)?;
        len += self.node_id.lightning_encode(&mut e)?;
        len += self.rgb_color.lightning_encode(&mut e)?;
        len += self.alias.lightning_encode(&mut e)?;
        len += self.encode_addresses()?.lightning_encode(&mut e)?;
        Ok(len)
    }
}

impl LightningDecode for NodeAnnouncement {
    fn lightning_decode<D: io::Read>(
        mut d: D,
    ) -> Result<Self, lnc_encoding::Error> {
        let signature = Signature::lightning_decode(&mut d)?;
        let features = FeatureVector::lightning_decode(&mut d)?;
        let timestamp = u32::lightning_decode(&mut d)?;
        let node_id = PublicKey::lightning_decode(&mut d)?;
        let rgb_color = NodeColor::lightning_decode(&mut d)?;
        let alias = Alias::lightning_decode(&mut d)?;
        let block = Vec::<u8>::lightning_decode(&mut d)?;
        let mut addresses = vec![];
        let mut cursor = io::Cursor::new(&block);
        while (cursor.position() as usize) < block.len() {
            addresses.push(NodeAddress::lightning_decode(&mut cursor)?);
        }
        Ok(NodeAnnouncement {
            signature,
            features,
            timestamp,
            node_id,
            rgb_color,
            alias,
            addresses,
        })
    }
}

/// Describes (and re-describes, after updates) the forwarding policy of one
/// direction of a channel.
///
/// # Specification
/// <https://github.com/lightning/bolts/blob/master/07-routing-gossip.md#the-channel_update-message>
#[derive(Clone, Copy, PartialEq, Eq, Debug, Display)]
#[derive(StrictEncode, StrictDecode)]
#[display("channel_update({short_channel_id}, {timestamp}, {channel_flags})")]
pub struct ChannelUpdate {
    /// Signature by the node announcing the direction
    pub signature: Signature,

    /// The chain the channel was opened within
    pub chain_hash: ChainHash,

    /// On-chain position of the funding output
    pub short_channel_id: ShortChannelId,

    /// UNIX timestamp of the update, used for update ordering
    pub timestamp: u32,

    /// Even bit signals presence of `htlc_maximum_msat` (always set by
    /// modern nodes)
    pub message_flags: u8,

    /// Direction and disabled bits
    pub channel_flags: u8,

    /// Blocks the forwarding node adds to the incoming CLTV
    pub cltv_expiry_delta: u16,

    /// Smallest forwardable HTLC, in millisatoshi
    pub htlc_minimum_msat: u64,

    /// Flat forwarding fee, in millisatoshi
    pub fee_base_msat: u32,

    /// Proportional forwarding fee, in millionths
    pub fee_proportional_millionths: u32,

    /// Largest forwardable HTLC, in millisatoshi
    pub htlc_maximum_msat: u64,
}

impl ChannelUpdate {
    /// Direction the update describes: `false` for the direction announced
    /// by `node_id_1`, `true` for `node_id_2`.
    #[inline]
    pub fn direction(&self) -> bool {
        self.channel_flags & CHANNEL_FLAG_DIRECTION != 0
    }

    /// Whether the direction is disabled for forwarding
    #[inline]
    pub fn is_disabled(&self) -> bool {
        self.channel_flags & CHANNEL_FLAG_DISABLED != 0
    }

    /// Serializes the message body covered by the signature.
    pub fn unsigned_data(&self) -> Vec<u8> {
        let mut data = vec![];
        let _ = self
            .chain_hash
            .lightning_encode(&mut data)
            .and_then(|_| self.short_channel_id.lightning_encode(&mut data))
            .and_then(|_| self.timestamp.lightning_encode(&mut data))
            .and_then(|_| self.message_flags.lightning_encode(&mut data))
            .and_then(|_| self.channel_flags.lightning_encode(&mut data))
            .and_then(|_| self.cltv_expiry_delta.lightning_encode(&mut data))
            .and_then(|_| self.htlc_minimum_msat.lightning_encode(&mut data))
            .and_then(|_| self.fee_base_msat.lightning_encode(&mut data))
            .and_then(|_| {
                self.fee_proportional_millionths.lightning_encode(&mut data)
            })
            .and_then(|_| self.htlc_maximum_msat.lightning_encode(&mut data))
            .expect("memory encoders do not fail");
        data
    }

    /// Message digest the announcing node's signature must be valid for.
    pub fn signature_digest(&self) -> Message {
        gossip_digest(&self.unsigned_data())
    }
}

impl LightningEncode for ChannelUpdate {
    fn lightning_encode<E: io::Write>(
        &self,
        mut e: E,
    ) -> Result<usize, lnc_encoding::Error> {
        let mut len = self.signature.lightning_encode(&mut e)?;
        let unsigned = self.unsigned_data();
        e.write_all(&unsigned)?;
        len += unsigned.len();
        Ok(len)
    }
}

impl LightningDecode for ChannelUpdate {
    fn lightning_decode<D: io::Read>(
        mut d: D,
    ) -> Result<Self, lnc_encoding::Error> {
        Ok(ChannelUpdate {
            signature: Signature::lightning_decode(&mut d)?,
            chain_hash: ChainHash::lightning_decode(&mut d)?,
            short_channel_id: ShortChannelId::lightning_decode(&mut d)?,
            timestamp: u32::lightning_decode(&mut d)?,
            message_flags: u8::lightning_decode(&mut d)?,
            channel_flags: u8::lightning_decode(&mut d)?,
            cltv_expiry_delta: u16::lightning_decode(&mut d)?,
            htlc_minimum_msat: u64::lightning_decode(&mut d)?,
            fee_base_msat: u32::lightning_decode(&mut d)?,
            fee_proportional_millionths: u32::lightning_decode(&mut d)?,
            htlc_maximum_msat: u64::lightning_decode(&mut d)?,
        })
    }
}

// Short channel id lists in gossip queries are prefixed with a one-byte
// encoding discriminant; only the uncompressed form (0x00) is produced and
// accepted here.
fn encode_short_ids<E: io::Write>(
    short_ids: &[ShortChannelId],
    mut e: E,
) -> Result<usize, lnc_encoding::Error> {
    let len = 1 + short_ids.len() * 8;
    let mut written = len.lightning_encode(&mut e)?;
    written += 0u8.lightning_encode(&mut e)?;
    for short_id in short_ids {
        written += short_id.lightning_encode(&mut e)?;
    }
    Ok(written)
}

fn decode_short_ids<D: io::Read>(
    mut d: D,
) -> Result<Vec<ShortChannelId>, lnc_encoding::Error> {
    let block = Vec::<u8>::lightning_decode(&mut d)?;
    if block.is_empty() {
        return Ok(vec![]);
    }
    if block[0] != 0 {
        return Err(lnc_encoding::Error::DataIntegrityError(format!(
            "unsupported short channel id encoding {:#04x}",
            block[0]
        )));
    }
    if (block.len() - 1) % 8 != 0 {
        return Err(lnc_encoding::Error::DataIntegrityError(s!(
            "short channel id list length is not a multiple of 8"
        )));
    }
    block[1..]
        .chunks(8)
        .map(ShortChannelId::lightning_deserialize)
        .collect()
}

/// Requests `channel_announcement` and `channel_update` messages for
/// specific channels.
#[derive(Clone, PartialEq, Eq, Debug, Display)]
#[display("query_short_channel_ids({chain_hash}, ...)")]
pub struct QueryShortChannelIds {
    /// The chain the query refers to
    pub chain_hash: ChainHash,

    /// Channels the sender wants announcements for
    pub short_ids: Vec<ShortChannelId>,
}

impl LightningEncode for QueryShortChannelIds {
    fn lightning_encode<E: io::Write>(
        &self,
        mut e: E,
    ) -> Result<usize, lnc_encoding::Error> {
        let mut len = self.chain_hash.lightning_encode(&mut e)?;
        len += encode_short_ids(&self.short_ids, &mut e)?;
        Ok(len)
    }
}

impl LightningDecode for QueryShortChannelIds {
    fn lightning_decode<D: io::Read>(
        mut d: D,
    ) -> Result<Self, lnc_encoding::Error> {
        Ok(QueryShortChannelIds {
            chain_hash: ChainHash::lightning_decode(&mut d)?,
            short_ids: decode_short_ids(&mut d)?,
        })
    }
}

/// Signals that all announcements for a preceding `query_short_channel_ids`
/// have been sent.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Display)]
#[display("reply_short_channel_ids_end({chain_hash}, {full_information})")]
pub struct ReplyShortChannelIdsEnd {
    /// The chain the reply refers to
    pub chain_hash: ChainHash,

    /// Whether the sender maintains complete information for the chain
    pub full_information: bool,
}

impl LightningEncode for ReplyShortChannelIdsEnd {
    fn lightning_encode<E: io::Write>(
        &self,
        mut e: E,
    ) -> Result<usize, lnc_encoding::Error> {
        let mut len = self.chain_hash.lightning_encode(&mut e)?;
        len += (self.full_information as u8).lightning_encode(&mut e)?;
        Ok(len)
    }
}

impl LightningDecode for ReplyShortChannelIdsEnd {
    fn lightning_decode<D: io::Read>(
        mut d: D,
    ) -> Result<Self, lnc_encoding::Error> {
        Ok(ReplyShortChannelIdsEnd {
            chain_hash: ChainHash::lightning_decode(&mut d)?,
            full_information: u8::lightning_decode(&mut d)? != 0,
        })
    }
}

/// Requests the list of channels opened within a block range.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Display)]
#[display(
    "query_channel_range({chain_hash}, {first_blocknum}, {number_of_blocks})"
)]
pub struct QueryChannelRange {
    /// The chain the query refers to
    pub chain_hash: ChainHash,

    /// First block of the queried range
    pub first_blocknum: u32,

    /// Number of blocks in the queried range
    pub number_of_blocks: u32,
}

impl LightningEncode for QueryChannelRange {
    fn lightning_encode<E: io::Write>(
        &self,
        mut e: E,
    ) -> Result<usize, lnc_encoding::Error> {
        let mut len = self.chain_hash.lightning_encode(&mut e)?;
        len += self.first_blocknum.lightning_encode(&mut e)?;
        len += self.number_of_blocks.lightning_encode(&mut e)?;
        Ok(len)
    }
}

impl LightningDecode for QueryChannelRange {
    fn lightning_decode<D: io::Read>(
        mut d: D,
    ) -> Result<Self, lnc_encoding::Error> {
        Ok(QueryChannelRange {
            chain_hash: ChainHash::lightning_decode(&mut d)?,
            first_blocknum: u32::lightning_decode(&mut d)?,
            number_of_blocks: u32::lightning_decode(&mut d)?,
        })
    }
}

/// Reply to [`QueryChannelRange`] listing the short channel ids of the
/// requested range, possibly split over multiple messages.
#[derive(Clone, PartialEq, Eq, Debug, Display)]
#[display(
    "reply_channel_range({chain_hash}, {first_blocknum}, \
     {number_of_blocks}, {sync_complete})"
)]
pub struct ReplyChannelRange {
    /// The chain the reply refers to
    pub chain_hash: ChainHash,

    /// First block of the covered range
    pub first_blocknum: u32,

    /// Number of blocks in the covered range
    pub number_of_blocks: u32,

    /// Whether this is the final reply for the queried range
    pub sync_complete: bool,

    /// Channels within the covered range
    pub short_ids: Vec<ShortChannelId>,
}

impl LightningEncode for ReplyChannelRange {
    fn lightning_encode<E: io::Write>(
        &self,
        mut e: E,
    ) -> Result<usize, lnc_encoding::Error> {
        let mut len = self.chain_hash.lightning_encode(&mut e)?;
        len += self.first_blocknum.lightning_encode(&mut e)?;
        len += self.number_of_blocks.lightning_encode(&mut e)?;
        len += (self.sync_complete as u8).lightning_encode(&mut e)?;
        len += encode_short_ids(&self.short_ids, &mut e)?;
        Ok(len)
    }
}

impl LightningDecode for ReplyChannelRange {
    fn lightning_decode<D: io::Read>(
        mut d: D,
    ) -> Result<Self, lnc_encoding::Error> {
        Ok(ReplyChannelRange {
            chain_hash: ChainHash::lightning_decode(&mut d)?,
            first_blocknum: u32::lightning_decode(&mut d)?,
            number_of_blocks: u32::lightning_decode(&mut d)?,
            sync_complete: u8::lightning_decode(&mut d)? != 0,
            short_ids: decode_short_ids(&mut d)?,
        })
    }
}

/// Restricts future gossip to messages newer than the given timestamp.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Display)]
#[display(
    "gossip_timestamp_filter({chain_hash}, {first_timestamp}, \
     {timestamp_range})"
)]
pub struct GossipTimestampFilter {
    /// The chain the filter refers to
    pub chain_hash: ChainHash,

    /// Earliest timestamp of interest
    pub first_timestamp: u32,

    /// Width of the timestamp window of interest
    pub timestamp_range: u32,
}

impl LightningEncode for GossipTimestampFilter {
    fn lightning_encode<E: io::Write>(
        &self,
        mut e: E,
    ) -> Result<usize, lnc_encoding::Error> {
        let mut len = self.chain_hash.lightning_encode(&mut e)?;
        len += self.first_timestamp.lightning_encode(&mut e)?;
        len += self.timestamp_range.lightning_encode(&mut e)?;
        Ok(len)
    }
}

impl LightningDecode for GossipTimestampFilter {
    fn lightning_decode<D: io::Read>(
        mut d: D,
    ) -> Result<Self, lnc_encoding::Error> {
        Ok(GossipTimestampFilter {
            chain_hash: ChainHash::lightning_decode(&mut d)?,
            first_timestamp: u32::lightning_decode(&mut d)?,
            timestamp_range: u32::lightning_decode(&mut d)?,
        })
    }
}

#[cfg(test)]
mod test {
    use secp256k1::{SecretKey, SECP256K1};

    use super::*;

    fn sign(digest: Message, sk: &SecretKey) -> Signature {
        SECP256K1.sign_ecdsa(&digest, sk)
    }

    #[test]
    fn channel_update_signature_verifies_after_roundtrip() {
        let sk = SecretKey::from_slice(&[9u8; 32]).unwrap();
        let node_id = PublicKey::from_secret_key(SECP256K1, &sk);
        let mut update = ChannelUpdate {
            signature: sign(gossip_digest(&[]), &sk),
            chain_hash: ChainHash::regtest(),
            short_channel_id: ShortChannelId::with(500_000, 4, 1),
            timestamp: 1_700_000_000,
            message_flags: 1,
            channel_flags: CHANNEL_FLAG_DIRECTION,
            cltv_expiry_delta: 40,
            htlc_minimum_msat: 1_000,
            fee_base_msat: 1_000,
            fee_proportional_millionths: 1,
            htlc_maximum_msat: 100_000_000,
        };
        update.signature = sign(update.signature_digest(), &sk);

        let data = lnc_encoding::lightning_serialize(&update).unwrap();
        let decoded = ChannelUpdate::lightning_deserialize(data).unwrap();
        assert_eq!(decoded, update);
        assert!(SECP256K1
            .verify_ecdsa(
                &decoded.signature_digest(),
                &decoded.signature,
                &node_id
            )
            .is_ok());
        assert!(decoded.direction());
        assert!(!decoded.is_disabled());
    }

    #[test]
    fn node_announcement_addresses_roundtrip() {
        let sk = SecretKey::from_slice(&[5u8; 32]).unwrap();
        let announcement = NodeAnnouncement {
            signature: sign(gossip_digest(&[]), &sk),
            features: FeatureVector::new(),
            timestamp: 1_700_000_000,
            node_id: PublicKey::from_secret_key(SECP256K1, &sk),
            rgb_color: NodeColor::from([0xFF, 0x88, 0x00]),
            alias: Alias::default(),
            addresses: vec![
                NodeAddress::Ipv4([127, 0, 0, 1].into(), 9735),
                NodeAddress::Ipv6(
                    [0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1].into(),
                    9736,
                ),
            ],
        };
        let data = lnc_encoding::lightning_serialize(&announcement).unwrap();
        assert_eq!(
            NodeAnnouncement::lightning_deserialize(data).unwrap(),
            announcement
        );
    }

    #[test]
    fn short_id_list_roundtrip() {
        let query = QueryShortChannelIds {
            chain_hash: ChainHash::mainnet(),
            short_ids: vec![
                ShortChannelId::with(100, 1, 0),
                ShortChannelId::with(200, 2, 1),
            ],
        };
        let data = lnc_encoding::lightning_serialize(&query).unwrap();
        assert_eq!(
            QueryShortChannelIds::lightning_deserialize(data).unwrap(),
            query
        );
    }

    #[test]
    fn compressed_short_id_list_rejected() {
        let mut data = vec![];
        ChainHash::mainnet().lightning_encode(&mut data).unwrap();
        // length 1, zlib encoding marker
        data.extend_from_slice(&[0x00, 0x01, 0x01]);
        assert!(QueryShortChannelIds::lightning_deserialize(data).is_err());
    }
}
