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
use std::str::FromStr;

use amplify::{DumbDefault, Slice32, Wrapper};
use bitcoin::{Script, Txid};
use lnc_encoding::{self, tlv, LightningDecode, LightningEncode};
use secp256k1::ecdsa::Signature;
use secp256k1::{PublicKey, SecretKey};

use super::{
    ChainHash, ChannelId, HashLock, HashPreimage, OnionPacket,
    ShortChannelId, TempChannelId,
};

/// Bit of `open_channel.channel_flags` requesting a public channel
/// announcement.
pub const CHANNEL_FLAG_ANNOUNCE_CHANNEL: u8 = 0x01;

/// TLV type for the upfront shutdown script in `open_channel` and
/// `accept_channel`
const CHANNEL_TLV_UPFRONT_SHUTDOWN: u64 = 0;
/// TLV type for `channel_type` in `open_channel` and `accept_channel`
const CHANNEL_TLV_CHANNEL_TYPE: u64 = 1;
/// TLV type for the short channel id alias inside `channel_ready`
const CHANNEL_READY_TLV_ALIAS: u64 = 1;

/// Channel types are an explicit enumeration: for convenience of future
/// definitions they reuse even feature bits, but they are not an arbitrary
/// combination (they represent the persistent features which affect the
/// channel operation).
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Display)]
#[derive(StrictEncode, StrictDecode)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
pub enum ChannelType {
    /// no features (no bits set)
    #[display("basic")]
    Basic,

    /// option_static_remotekey (bit 12)
    #[display("static_remotekey")]
    StaticRemotekey,

    /// option_anchor_outputs and option_static_remotekey (bits 20 and 12)
    #[display("anchored")]
    AnchorOutputsStaticRemotekey,

    /// option_anchors_zero_fee_htlc_tx and option_static_remotekey (bits 22
    /// and 12)
    #[display("anchored_zero_fee")]
    AnchorsZeroFeeHtlcTxStaticRemotekey,
}

impl ChannelType {
    /// Detects whether channel has `option_static_remotekey` set
    #[inline]
    pub fn has_static_remotekey(self) -> bool {
        self != ChannelType::Basic
    }

    /// Detects whether channel has `option_anchor_outputs` set
    #[inline]
    pub fn has_anchor_outputs(self) -> bool {
        self == ChannelType::AnchorOutputsStaticRemotekey
    }

    /// Detects whether channel has `option_anchors_zero_fee_htlc_tx` set
    #[inline]
    pub fn has_anchors_zero_fee_htlc_tx(self) -> bool {
        self == ChannelType::AnchorsZeroFeeHtlcTxStaticRemotekey
    }

    /// Detects whether commitments contain any form of anchor outputs
    #[inline]
    pub fn has_anchors(self) -> bool {
        self.has_anchor_outputs() || self.has_anchors_zero_fee_htlc_tx()
    }

    /// Converts default channel type into `None` and non-default into
    /// `Some(ChannelType)`
    #[inline]
    pub fn into_option(self) -> Option<ChannelType> {
        match self {
            ChannelType::Basic => None,
            _ => Some(self),
        }
    }

    fn to_wire_bytes(self) -> Vec<u8> {
        // channel_type is a feature-bit vector in wire (big-endian) order
        match self {
            ChannelType::Basic => vec![],
            ChannelType::StaticRemotekey => vec![0x10, 0x00],
            ChannelType::AnchorOutputsStaticRemotekey => {
                vec![0x10, 0x10, 0x00]
            }
            ChannelType::AnchorsZeroFeeHtlcTxStaticRemotekey => {
                vec![0x40, 0x10, 0x00]
            }
        }
    }

    fn from_wire_bytes(data: &[u8]) -> Result<Self, lnc_encoding::Error> {
        match data {
            [] => Ok(ChannelType::Basic),
            [0x10, 0x00] => Ok(ChannelType::StaticRemotekey),
            [0x10, 0x10, 0x00] => {
                Ok(ChannelType::AnchorOutputsStaticRemotekey)
            }
            [0x40, 0x10, 0x00] => {
                Ok(ChannelType::AnchorsZeroFeeHtlcTxStaticRemotekey)
            }
            _ => Err(lnc_encoding::Error::DataIntegrityError(s!(
                "invalid or non-minimal combination of channel type flags"
            ))),
        }
    }
}

impl Default for ChannelType {
    #[inline]
    fn default() -> Self {
        ChannelType::Basic
    }
}

/// Error parsing [`ChannelType`] from strings
#[derive(Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug, Display, Error)]
#[display("unknown channel type name `{0}`")]
pub struct ChannelTypeParseError(String);

impl FromStr for ChannelType {
    type Err = ChannelTypeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_lowercase().as_str() {
            "basic" => ChannelType::Basic,
            "static_remotekey" => ChannelType::StaticRemotekey,
            "anchored" => ChannelType::AnchorOutputsStaticRemotekey,
            "anchored_zero_fee" => {
                ChannelType::AnchorsZeroFeeHtlcTxStaticRemotekey
            }
            _ => return Err(ChannelTypeParseError(s.to_owned())),
        })
    }
}

// Shared TLV tail of `open_channel` and `accept_channel`
fn encode_channel_tlvs<E: io::Write>(
    shutdown_scriptpubkey: &Option<Script>,
    channel_type: Option<ChannelType>,
    e: E,
) -> Result<usize, lnc_encoding::Error> {
    let mut stream = tlv::Stream::new();
    if let Some(script) = shutdown_scriptpubkey {
        stream.insert(CHANNEL_TLV_UPFRONT_SHUTDOWN, script.to_bytes())?;
    }
    if let Some(channel_type) = channel_type {
        stream
            .insert(CHANNEL_TLV_CHANNEL_TYPE, channel_type.to_wire_bytes())?;
    }
    stream.lightning_encode(e)
}

fn decode_channel_tlvs<D: io::Read>(
    d: D,
) -> Result<(Option<Script>, Option<ChannelType>), lnc_encoding::Error> {
    let mut stream = tlv::Stream::lightning_decode(d)?;
    let shutdown_scriptpubkey = stream
        .remove(CHANNEL_TLV_UPFRONT_SHUTDOWN)
        .map(|value| Script::from(value.into_inner()));
    let channel_type = stream
        .remove(CHANNEL_TLV_CHANNEL_TYPE)
        .map(|value| ChannelType::from_wire_bytes(value.as_inner()))
        .transpose()?;
    stream.check_no_unknown_even(&[])?;
    Ok((shutdown_scriptpubkey, channel_type))
}

/// This message contains information about a node and indicates its desire
/// to set up a new channel. This is the first step toward creating the
/// funding transaction and both versions of the commitment transaction.
///
/// # Specification
/// <https://github.com/lightning/bolts/blob/master/02-peer-protocol.md#the-open_channel-message>
#[derive(Clone, PartialEq, Eq, Debug, Display)]
#[display(
    "open_channel({chain_hash}, {temporary_channel_id}, \
     {funding_satoshis}, {channel_flags}, ...)"
)]
pub struct OpenChannel {
    /// The genesis hash of the blockchain where the channel is to be opened
    pub chain_hash: ChainHash,

    /// A temporary channel ID, until the funding outpoint is announced
    pub temporary_channel_id: TempChannelId,

    /// The channel value
    pub funding_satoshis: u64,

    /// The amount to push to the counter-party as part of the open, in
    /// millisatoshi
    pub push_msat: u64,

    /// The threshold below which outputs on transactions broadcast by
    /// sender will be omitted
    pub dust_limit_satoshis: u64,

    /// The maximum inbound HTLC value in flight towards sender, in
    /// millisatoshi
    pub max_htlc_value_in_flight_msat: u64,

    /// The minimum value unencumbered by HTLCs for the counterparty to
    /// keep in the channel
    pub channel_reserve_satoshis: u64,

    /// The minimum HTLC size incoming to sender, in milli-satoshi
    pub htlc_minimum_msat: u64,

    /// The fee rate per 1000-weight of sender generated transactions,
    /// until updated by update_fee
    pub feerate_per_kw: u32,

    /// The number of blocks which the counterparty will have to wait to
    /// claim on-chain funds if they broadcast a commitment transaction
    pub to_self_delay: u16,

    /// The maximum number of inbound HTLCs towards sender
    pub max_accepted_htlcs: u16,

    /// The sender's key controlling the funding transaction
    pub funding_pubkey: PublicKey,

    /// Used to derive a revocation key for transactions broadcast by
    /// counterparty
    pub revocation_basepoint: PublicKey,

    /// A payment key to sender for transactions broadcast by counterparty
    pub payment_point: PublicKey,

    /// Used to derive a payment key to sender for transactions broadcast
    /// by sender
    pub delayed_payment_basepoint: PublicKey,

    /// Used to derive an HTLC payment key to sender
    pub htlc_basepoint: PublicKey,

    /// The first to-be-broadcast-by-sender transaction's per commitment
    /// point
    pub first_per_commitment_point: PublicKey,

    /// Channel flags; only the least-significant (announce_channel) bit is
    /// defined
    pub channel_flags: u8,

    /// Optionally, a request to pre-set the to-sender output's
    /// scriptPubkey for when we collaboratively close
    pub shutdown_scriptpubkey: Option<Script>,

    /// Channel type negotiated via TLV
    pub channel_type: Option<ChannelType>,
}

impl OpenChannel {
    /// Detects whether the initiator requests a public channel
    #[inline]
    pub fn should_announce_channel(&self) -> bool {
        self.channel_flags & CHANNEL_FLAG_ANNOUNCE_CHANNEL != 0
    }

    /// Detects anchor outputs presence from the negotiated channel type
    #[inline]
    pub fn has_anchors(&self) -> bool {
        self.channel_type
            .map(ChannelType::has_anchors)
            .unwrap_or_default()
    }
}

impl DumbDefault for OpenChannel {
    fn dumb_default() -> Self {
        OpenChannel {
            chain_hash: ChainHash::default(),
            temporary_channel_id: TempChannelId::dumb_default(),
            funding_satoshis: 0,
            push_msat: 0,
            dust_limit_satoshis: 0,
            max_htlc_value_in_flight_msat: 0,
            channel_reserve_satoshis: 0,
            htlc_minimum_msat: 0,
            feerate_per_kw: 0,
            to_self_delay: 0,
            max_accepted_htlcs: 0,
            funding_pubkey: dumb_pubkey!(),
            revocation_basepoint: dumb_pubkey!(),
            payment_point: dumb_pubkey!(),
            delayed_payment_basepoint: dumb_pubkey!(),
            htlc_basepoint: dumb_pubkey!(),
            first_per_commitment_point: dumb_pubkey!(),
            channel_flags: 0,
            shutdown_scriptpubkey: None,
            channel_type: None,
        }
    }
}

impl LightningEncode for OpenChannel {
    fn lightning_encode<E: io::Write>(
        &self,
        mut e: E,
    ) -> Result<usize, lnc_encoding::Error> {
        let mut len = self.chain_hash.lightning_encode(&mut e)?;
        len += self.temporary_channel_id.lightning_encode(&mut e)?;
        len += self.funding_satoshis.lightning_encode(&mut e)?;
        len += self.push_msat.lightning_encode(&mut e)?;
        len += self.dust_limit_satoshis.lightning_encode(&mut e)?;
        len += self.max_htlc_value_in_flight_msat.lightning_encode(&mut e)?;
        len += self.channel_reserve_satoshis.lightning_encode(&mut e)?;
        len += self.htlc_minimum_msat.lightning_encode(&mut e)?;
        len += self.feerate_per_kw.lightning_encode(&mut e)?;
        len += self.to_self_delay.lightning_encode(&mut e)?;
        len += self.max_accepted_htlcs.lightning_encode(&mut e)?;
        len += self.funding_pubkey.lightning_encode(&mut e)?;
        len += self.revocation_basepoint.lightning_encode(&mut e)?;
        len += self.payment_point.lightning_encode(&mut e)?;
        len += self.delayed_payment_basepoint.lightning_encode(&mut e)?;
        len += self.htlc_basepoint.lightning_encode(&mut e)?;
        len += self.first_per_commitment_point.lightning_encode(&mut e)?;
        len += self.channel_flags.lightning_encode(&mut e)?;
        len += encode_channel_tlvs(
            &self.shutdown_scriptpubkey,
            self.channel_type,
            &mut e,
        )?;
        Ok(len)
    }
}

impl LightningDecode for OpenChannel {
    fn lightning_decode<D: io::Read>(
        mut d: D,
    ) -> Result<Self, lnc_encoding::Error> {
        let chain_hash = ChainHash::lightning_decode(&mut d)?;
        let temporary_channel_id = TempChannelId::lightning_decode(&mut d)?;
        let funding_satoshis = u64::lightning_decode(&mut d)?;
        let push_msat = u64::lightning_decode(&mut d)?;
        let dust_limit_satoshis = u64::lightning_decode(&mut d)?;
        let max_htlc_value_in_flight_msat = u64::lightning_decode(&mut d)?;
        let channel_reserve_satoshis = u64::lightning_decode(&mut d)?;
        let htlc_minimum_msat = u64::lightning_decode(&mut d)?;
        let feerate_per_kw = u32::lightning_decode(&mut d)?;
        let to_self_delay = u16::lightning_decode(&mut d)?;
        let max_accepted_htlcs = u16::lightning_decode(&mut d)?;
        let funding_pubkey = PublicKey::lightning_decode(&mut d)?;
        let revocation_basepoint = PublicKey::lightning_decode(&mut d)?;
        let payment_point = PublicKey::lightning_decode(&mut d)?;
        let delayed_payment_basepoint = PublicKey::lightning_decode(&mut d)?;
        let htlc_basepoint = PublicKey::lightning_decode(&mut d)?;
        let first_per_commitment_point = PublicKey::lightning_decode(&mut d)?;
        let channel_flags = u8::lightning_decode(&mut d)?;
        let (shutdown_scriptpubkey, channel_type) =
            decode_channel_tlvs(&mut d)?;
        Ok(OpenChannel {
            chain_hash,
            temporary_channel_id,
            funding_satoshis,
            push_msat,
            dust_limit_satoshis,
            max_htlc_value_in_flight_msat,
            channel_reserve_satoshis,
            htlc_minimum_msat,
            feerate_per_kw,
            to_self_delay,
            max_accepted_htlcs,
            funding_pubkey,
            revocation_basepoint,
            payment_point,
            delayed_payment_basepoint,
            htlc_basepoint,
            first_per_commitment_point,
            channel_flags,
            shutdown_scriptpubkey,
            channel_type,
        })
    }
}

/// This message contains information about a node and indicates its
/// acceptance of the new channel. This is the second step toward creating
/// the funding transaction and both versions of the commitment transaction.
///
/// # Specification
/// <https://github.com/lightning/bolts/blob/master/02-peer-protocol.md#the-accept_channel-message>
#[derive(Clone, PartialEq, Eq, Debug, Display)]
#[display("accept_channel({temporary_channel_id}, {minimum_depth}, ...)")]
pub struct AcceptChannel {
    /// A temporary channel ID, until the funding outpoint is announced
    pub temporary_channel_id: TempChannelId,

    /// The threshold below which outputs on transactions broadcast by
    /// sender will be omitted
    pub dust_limit_satoshis: u64,

    /// The maximum inbound HTLC value in flight towards sender, in
    /// millisatoshi
    pub max_htlc_value_in_flight_msat: u64,

    /// The minimum value unencumbered by HTLCs for the counterparty to
    /// keep in the channel
    pub channel_reserve_satoshis: u64,

    /// The minimum HTLC size incoming to sender, in milli-satoshi
    pub htlc_minimum_msat: u64,

    /// The number of confirmations the funding transaction needs before
    /// the channel is usable
    pub minimum_depth: u32,

    /// The number of blocks which the counterparty will have to wait to
    /// claim on-chain funds if they broadcast a commitment transaction
    pub to_self_delay: u16,

    /// The maximum number of inbound HTLCs towards sender
    pub max_accepted_htlcs: u16,

    /// The sender's key controlling the funding transaction
    pub funding_pubkey: PublicKey,

    /// Used to derive a revocation key for transactions broadcast by
    /// counterparty
    pub revocation_basepoint: PublicKey,

    /// A payment key to sender for transactions broadcast by counterparty
    pub payment_point: PublicKey,

    /// Used to derive a payment key to sender for transactions broadcast
    /// by sender
    pub delayed_payment_basepoint: PublicKey,

    /// Used to derive an HTLC payment key to sender
    pub htlc_basepoint: PublicKey,

    /// The first to-be-broadcast-by-sender transaction's per commitment
    /// point
    pub first_per_commitment_point: PublicKey,

    /// Optionally, a request to pre-set the to-sender output's
    /// scriptPubkey for when we collaboratively close
    pub shutdown_scriptpubkey: Option<Script>,

    /// Channel type negotiated via TLV
    pub channel_type: Option<ChannelType>,
}

impl LightningEncode for AcceptChannel {
    fn lightning_encode<E: io::Write>(
        &self,
        mut e: E,
    ) -> Result<usize, lnc_encoding::Error> {
        let mut len = self.temporary_channel_id.lightning_encode(&mut e)?;
        len += self.dust_limit_satoshis.lightning_encode(&mut e)?;
        len += self.max_htlc_value_in_flight_msat.lightning_encode(&mut e)?;
        len += self.channel_reserve_satoshis.lightning_encode(&mut e)?;
        len += self.htlc_minimum_msat.lightning_encode(&mut e)?;
        len += self.minimum_depth.lightning_encode(&mut e)?;
        len += self.to_self_delay.lightning_encode(&mut e)?;
        len += self.max_accepted_htlcs.lightning_encode(&mut e)?;
        len += self.funding_pubkey.lightning_encode(&mut e)?;
        len += self.revocation_basepoint.lightning_encode(&mut e)?;
        len += self.payment_point.lightning_encode(&mut e)?;
        len += self.delayed_payment_basepoint.lightning_encode(&mut e)?;
        len += self.htlc_basepoint.lightning_encode(&mut e)?;
        len += self.first_per_commitment_point.lightning_encode(&mut e)?;
        len += encode_channel_tlvs(
            &self.shutdown_scriptpubkey,
            self.channel_type,
            &mut e,
        )?;
        Ok(len)
    }
}

impl LightningDecode for AcceptChannel {
    fn lightning_decode<D: io::Read>(
        mut d: D,
    ) -> Result<Self, lnc_encoding::Error> {
        let temporary_channel_id = TempChannelId::lightning_decode(&mut d)?;
        let dust_limit_satoshis = u64::lightning_decode(&mut d)?;
        let max_htlc_value_in_flight_msat = u64::lightning_decode(&mut d)?;
        let channel_reserve_satoshis = u64::lightning_decode(&mut d)?;
        let htlc_minimum_msat = u64::lightning_decode(&mut d)?;
        let minimum_depth = u32::lightning_decode(&mut d)?;
        let to_self_delay = u16::lightning_decode(&mut d)?;
        let max_accepted_htlcs = u16::lightning_decode(&mut d)?;
        let funding_pubkey = PublicKey::lightning_decode(&mut d)?;
        let revocation_basepoint = PublicKey::lightning_decode(&mut d)?;
        let payment_point = PublicKey::lightning_decode(&mut d)?;
        let delayed_payment_basepoint = PublicKey::lightning_decode(&mut d)?;
        let htlc_basepoint = PublicKey::lightning_decode(&mut d)?;
        let first_per_commitment_point = PublicKey::lightning_decode(&mut d)?;
        let (shutdown_scriptpubkey, channel_type) =
            decode_channel_tlvs(&mut d)?;
        Ok(AcceptChannel {
            temporary_channel_id,
            dust_limit_satoshis,
            max_htlc_value_in_flight_msat,
            channel_reserve_satoshis,
            htlc_minimum_msat,
            minimum_depth,
            to_self_delay,
            max_accepted_htlcs,
            funding_pubkey,
            revocation_basepoint,
            payment_point,
            delayed_payment_basepoint,
            htlc_basepoint,
            first_per_commitment_point,
            shutdown_scriptpubkey,
            channel_type,
        })
    }
}

/// This message describes the outpoint which the funder has created for the
/// initial commitment transactions. After receiving the peer's signature,
/// via `funding_signed`, it will broadcast the funding transaction.
///
/// # Specification
/// <https://github.com/lightning/bolts/blob/master/02-peer-protocol.md#the-funding_created-message>
#[derive(Clone, PartialEq, Eq, Debug, Display)]
#[display(
    "funding_created({temporary_channel_id}, \
     {funding_txid}:{funding_output_index}, ...signature)"
)]
pub struct FundingCreated {
    /// A temporary channel ID, until the funding is established
    pub temporary_channel_id: TempChannelId,

    /// The funding transaction ID
    pub funding_txid: Txid,

    /// The specific output index funding this channel
    pub funding_output_index: u16,

    /// The signature of the channel initiator on the funding transaction
    pub signature: Signature,
}

impl LightningEncode for FundingCreated {
    fn lightning_encode<E: io::Write>(
        &self,
        mut e: E,
    ) -> Result<usize, lnc_encoding::Error> {
        let mut len = self.temporary_channel_id.lightning_encode(&mut e)?;
        len += self.funding_txid.lightning_encode(&mut e)?;
        len += self.funding_output_index.lightning_encode(&mut e)?;
        len += self.signature.lightning_encode(&mut e)?;
        Ok(len)
    }
}

impl LightningDecode for FundingCreated {
    fn lightning_decode<D: io::Read>(
        mut d: D,
    ) -> Result<Self, lnc_encoding::Error> {
        Ok(FundingCreated {
            temporary_channel_id: TempChannelId::lightning_decode(&mut d)?,
            funding_txid: Txid::lightning_decode(&mut d)?,
            funding_output_index: u16::lightning_decode(&mut d)?,
            signature: Signature::lightning_decode(&mut d)?,
        })
    }
}

/// This message gives the funder the signature it needs for the first
/// commitment transaction, so it can broadcast the transaction knowing that
/// funds can be redeemed, if need be.
///
/// # Specification
/// <https://github.com/lightning/bolts/blob/master/02-peer-protocol.md#the-funding_signed-message>
#[derive(Clone, PartialEq, Eq, Debug, Display)]
#[display("funding_signed({channel_id}, ...signature)")]
pub struct FundingSigned {
    /// The channel ID, derived from the funding outpoint
    pub channel_id: ChannelId,

    /// The signature of the channel acceptor on the initiator's first
    /// commitment transaction
    pub signature: Signature,
}

impl LightningEncode for FundingSigned {
    fn lightning_encode<E: io::Write>(
        &self,
        mut e: E,
    ) -> Result<usize, lnc_encoding::Error> {
        let mut len = self.channel_id.lightning_encode(&mut e)?;
        len += self.signature.lightning_encode(&mut e)?;
        Ok(len)
    }
}

impl LightningDecode for FundingSigned {
    fn lightning_decode<D: io::Read>(
        mut d: D,
    ) -> Result<Self, lnc_encoding::Error> {
        Ok(FundingSigned {
            channel_id: ChannelId::lightning_decode(&mut d)?,
            signature: Signature::lightning_decode(&mut d)?,
        })
    }
}

/// This message indicates that the funding transaction has reached the
/// `minimum_depth` asked for in `accept_channel`. Once both nodes have
/// sent this, the channel enters normal operating mode.
///
/// # Specification
/// <https://github.com/lightning/bolts/blob/master/02-peer-protocol.md#the-channel_ready-message>
#[derive(Clone, PartialEq, Eq, Debug, Display)]
#[display("channel_ready({channel_id}, {next_per_commitment_point})")]
pub struct ChannelReady {
    /// The channel ID
    pub channel_id: ChannelId,

    /// The per-commitment point of the sender's next commitment
    pub next_per_commitment_point: PublicKey,

    /// Optional short channel id alias for routing before (or instead of)
    /// announcement, TLV type 1
    pub alias: Option<ShortChannelId>,
}

impl LightningEncode for ChannelReady {
    fn lightning_encode<E: io::Write>(
        &self,
        mut e: E,
    ) -> Result<usize, lnc_encoding::Error> {
        let mut len = self.channel_id.lightning_encode(&mut e)?;
        len += self.next_per_commitment_point.lightning_encode(&mut e)?;
        let mut stream = tlv::Stream::new();
        if let Some(alias) = self.alias {
            stream.insert(
                CHANNEL_READY_TLV_ALIAS,
                alias.to_u64().to_be_bytes().to_vec(),
            )?;
        }
        len += stream.lightning_encode(&mut e)?;
        Ok(len)
    }
}

impl LightningDecode for ChannelReady {
    fn lightning_decode<D: io::Read>(
        mut d: D,
    ) -> Result<Self, lnc_encoding::Error> {
        let channel_id = ChannelId::lightning_decode(&mut d)?;
        let next_per_commitment_point = PublicKey::lightning_decode(&mut d)?;
        let mut stream = tlv::Stream::lightning_decode(&mut d)?;
        let alias = stream
            .remove(CHANNEL_READY_TLV_ALIAS)
            .map(|value| {
                <[u8; 8]>::lightning_deserialize(value.as_inner())
                    .map(u64::from_be_bytes)
                    .map(ShortChannelId::from_u64)
            })
            .transpose()?;
        stream.check_no_unknown_even(&[])?;
        Ok(ChannelReady {
            channel_id,
            next_per_commitment_point,
            alias,
        })
    }
}

/// This message initiates a cooperative close: after it is exchanged in
/// both directions and all pending HTLCs are resolved, the nodes negotiate
/// the closing transaction fee.
///
/// # Specification
/// <https://github.com/lightning/bolts/blob/master/02-peer-protocol.md#closing-initiation-shutdown>
#[derive(Clone, PartialEq, Eq, Debug, Display)]
#[display("shutdown({channel_id}, ...scriptpubkey)")]
pub struct Shutdown {
    /// The channel ID
    pub channel_id: ChannelId,

    /// The destination of the closing transaction output of this node
    pub scriptpubkey: Script,
}

impl LightningEncode for Shutdown {
    fn lightning_encode<E: io::Write>(
        &self,
        mut e: E,
    ) -> Result<usize, lnc_encoding::Error> {
        let mut len = self.channel_id.lightning_encode(&mut e)?;
        len += self.scriptpubkey.lightning_encode(&mut e)?;
        Ok(len)
    }
}

impl LightningDecode for Shutdown {
    fn lightning_decode<D: io::Read>(
        mut d: D,
    ) -> Result<Self, lnc_encoding::Error> {
        Ok(Shutdown {
            channel_id: ChannelId::lightning_decode(&mut d)?,
            scriptpubkey: Script::lightning_decode(&mut d)?,
        })
    }
}

/// Fee negotiation round of the cooperative close: each side proposes a
/// closing fee until both propose the same value.
///
/// # Specification
/// <https://github.com/lightning/bolts/blob/master/02-peer-protocol.md#closing-negotiation-closing_signed>
#[derive(Clone, PartialEq, Eq, Debug, Display)]
#[display("closing_signed({channel_id}, {fee_satoshis}, ...signature)")]
pub struct ClosingSigned {
    /// The channel ID
    pub channel_id: ChannelId,

    /// The proposed total fee for the closing transaction
    pub fee_satoshis: u64,

    /// A signature on the closing transaction with the proposed fee
    pub signature: Signature,
}

impl LightningEncode for ClosingSigned {
    fn lightning_encode<E: io::Write>(
        &self,
        mut e: E,
    ) -> Result<usize, lnc_encoding::Error> {
        let mut len = self.channel_id.lightning_encode(&mut e)?;
        len += self.fee_satoshis.lightning_encode(&mut e)?;
        len += self.signature.lightning_encode(&mut e)?;
        Ok(len)
    }
}

impl LightningDecode for ClosingSigned {
    fn lightning_decode<D: io::Read>(
        mut d: D,
    ) -> Result<Self, lnc_encoding::Error> {
        Ok(ClosingSigned {
            channel_id: ChannelId::lightning_decode(&mut d)?,
            fee_satoshis: u64::lightning_decode(&mut d)?,
            signature: Signature::lightning_decode(&mut d)?,
        })
    }
}

/// Either node can offer an HTLC to the other, which is redeemable in
/// return for a payment preimage. Amounts are in millisatoshi, though
/// on-chain enforcement is only possible for whole satoshi amounts greater
/// than the dust limit.
///
/// # Specification
/// <https://github.com/lightning/bolts/blob/master/02-peer-protocol.md#adding-an-htlc-update_add_htlc>
#[derive(Clone, PartialEq, Eq, Debug, Display)]
#[display(
    "update_add_htlc({channel_id}, {htlc_id}, {amount_msat}, \
     {payment_hash}, {cltv_expiry}, ...onion)"
)]
pub struct UpdateAddHtlc {
    /// The channel ID
    pub channel_id: ChannelId,

    /// The HTLC ID, monotonically increasing per channel direction
    pub htlc_id: u64,

    /// The HTLC value in millisatoshi
    pub amount_msat: u64,

    /// The payment hash, locking the HTLC output
    pub payment_hash: HashLock,

    /// The absolute block height at which the HTLC expires
    pub cltv_expiry: u32,

    /// Sphinx routing packet for the next hops
    pub onion_routing_packet: OnionPacket,
}

impl LightningEncode for UpdateAddHtlc {
    fn lightning_encode<E: io::Write>(
        &self,
        mut e: E,
    ) -> Result<usize, lnc_encoding::Error> {
        let mut len = self.channel_id.lightning_encode(&mut e)?;
        len += self.htlc_id.lightning_encode(&mut e)?;
        len += self.amount_msat.lightning_encode(&mut e)?;
        len += self.payment_hash.lightning_encode(&mut e)?;
        len += self.cltv_expiry.lightning_encode(&mut e)?;
        len += self.onion_routing_packet.lightning_encode(&mut e)?;
        Ok(len)
    }
}

impl LightningDecode for UpdateAddHtlc {
    fn lightning_decode<D: io::Read>(
        mut d: D,
    ) -> Result<Self, lnc_encoding::Error> {
        Ok(UpdateAddHtlc {
            channel_id: ChannelId::lightning_decode(&mut d)?,
            htlc_id: u64::lightning_decode(&mut d)?,
            amount_msat: u64::lightning_decode(&mut d)?,
            payment_hash: HashLock::lightning_decode(&mut d)?,
            cltv_expiry: u32::lightning_decode(&mut d)?,
            onion_routing_packet: OnionPacket::lightning_decode(&mut d)?,
        })
    }
}

/// Settles a received HTLC by revealing its payment preimage.
///
/// # Specification
/// <https://github.com/lightning/bolts/blob/master/02-peer-protocol.md#removing-an-htlc-update_fulfill_htlc-update_fail_htlc-and-update_fail_malformed_htlc>
#[derive(Clone, PartialEq, Eq, Debug, Display)]
#[display("update_fulfill_htlc({channel_id}, {htlc_id}, ...preimage)")]
pub struct UpdateFulfillHtlc {
    /// The channel ID
    pub channel_id: ChannelId,

    /// The HTLC ID
    pub htlc_id: u64,

    /// The preimage hashing to the HTLC `payment_hash`
    pub payment_preimage: HashPreimage,
}

impl LightningEncode for UpdateFulfillHtlc {
    fn lightning_encode<E: io::Write>(
        &self,
        mut e: E,
    ) -> Result<usize, lnc_encoding::Error> {
        let mut len = self.channel_id.lightning_encode(&mut e)?;
        len += self.htlc_id.lightning_encode(&mut e)?;
        len += self.payment_preimage.lightning_encode(&mut e)?;
        Ok(len)
    }
}

impl LightningDecode for UpdateFulfillHtlc {
    fn lightning_decode<D: io::Read>(
        mut d: D,
    ) -> Result<Self, lnc_encoding::Error> {
        Ok(UpdateFulfillHtlc {
            channel_id: ChannelId::lightning_decode(&mut d)?,
            htlc_id: u64::lightning_decode(&mut d)?,
            payment_preimage: HashPreimage::lightning_decode(&mut d)?,
        })
    }
}

/// Fails a received HTLC, carrying an onion-encrypted reason for the
/// origin node.
#[derive(Clone, PartialEq, Eq, Debug, Display)]
#[display("update_fail_htlc({channel_id}, {htlc_id}, ...reason)")]
pub struct UpdateFailHtlc {
    /// The channel ID
    pub channel_id: ChannelId,

    /// The HTLC ID
    pub htlc_id: u64,

    /// Failure reason encrypted backwards along the route
    pub reason: Vec<u8>,
}

impl LightningEncode for UpdateFailHtlc {
    fn lightning_encode<E: io::Write>(
        &self,
        mut e: E,
    ) -> Result<usize, lnc_encoding::Error> {
        let mut len = self.channel_id.lightning_encode(&mut e)?;
        len += self.htlc_id.lightning_encode(&mut e)?;
        len += self.reason.lightning_encode(&mut e)?;
        Ok(len)
    }
}

impl LightningDecode for UpdateFailHtlc {
    fn lightning_decode<D: io::Read>(
        mut d: D,
    ) -> Result<Self, lnc_encoding::Error> {
        Ok(UpdateFailHtlc {
            channel_id: ChannelId::lightning_decode(&mut d)?,
            htlc_id: u64::lightning_decode(&mut d)?,
            reason: Vec::<u8>::lightning_decode(&mut d)?,
        })
    }
}

/// Fails an HTLC whose onion could not be parsed by the forwarding node,
/// reporting the hash of the onion so the origin can verify the claim.
#[derive(Clone, PartialEq, Eq, Debug, Display)]
#[display(
    "update_fail_malformed_htlc({channel_id}, {htlc_id}, {failure_code})"
)]
pub struct UpdateFailMalformedHtlc {
    /// The channel ID
    pub channel_id: ChannelId,

    /// The HTLC ID
    pub htlc_id: u64,

    /// SHA256 of the onion the sender could not process
    pub sha256_of_onion: Slice32,

    /// The failure code; must have the BADONION bit set
    pub failure_code: u16,
}

impl LightningEncode for UpdateFailMalformedHtlc {
    fn lightning_encode<E: io::Write>(
        &self,
        mut e: E,
    ) -> Result<usize, lnc_encoding::Error> {
        let mut len = self.channel_id.lightning_encode(&mut e)?;
        len += self.htlc_id.lightning_encode(&mut e)?;
        len += self.sha256_of_onion.lightning_encode(&mut e)?;
        len += self.failure_code.lightning_encode(&mut e)?;
        Ok(len)
    }
}

impl LightningDecode for UpdateFailMalformedHtlc {
    fn lightning_decode<D: io::Read>(
        mut d: D,
    ) -> Result<Self, lnc_encoding::Error> {
        Ok(UpdateFailMalformedHtlc {
            channel_id: ChannelId::lightning_decode(&mut d)?,
            htlc_id: u64::lightning_decode(&mut d)?,
            sha256_of_onion: Slice32::lightning_decode(&mut d)?,
            failure_code: u16::lightning_decode(&mut d)?,
        })
    }
}

/// Commits to the current set of outstanding updates: carries the funding
/// input signature for the remote commitment transaction plus one HTLC
/// signature per HTLC output it contains.
///
/// # Specification
/// <https://github.com/lightning/bolts/blob/master/02-peer-protocol.md#committing-updates-so-far-commitment_signed>
#[derive(Clone, PartialEq, Eq, Debug, Display)]
#[display("commitment_signed({channel_id}, ...signatures)")]
pub struct CommitmentSigned {
    /// The channel ID
    pub channel_id: ChannelId,

    /// A signature on the remote commitment transaction
    pub signature: Signature,

    /// Signatures on the HTLC transactions spending the remote commitment,
    /// in BIP-69+CLTV output order
    pub htlc_signatures: Vec<Signature>,
}

impl LightningEncode for CommitmentSigned {
    fn lightning_encode<E: io::Write>(
        &self,
        mut e: E,
    ) -> Result<usize, lnc_encoding::Error> {
        let mut len = self.channel_id.lightning_encode(&mut e)?;
        len += self.signature.lightning_encode(&mut e)?;
        len += self.htlc_signatures.lightning_encode(&mut e)?;
        Ok(len)
    }
}

impl LightningDecode for CommitmentSigned {
    fn lightning_decode<D: io::Read>(
        mut d: D,
    ) -> Result<Self, lnc_encoding::Error> {
        Ok(CommitmentSigned {
            channel_id: ChannelId::lightning_decode(&mut d)?,
            signature: Signature::lightning_decode(&mut d)?,
            htlc_signatures: Vec::<Signature>::lightning_decode(&mut d)?,
        })
    }
}

/// Revokes the previous commitment by revealing its per-commitment secret
/// and provides the point for the commitment after the next one.
///
/// # Specification
/// <https://github.com/lightning/bolts/blob/master/02-peer-protocol.md#completing-the-transition-to-the-updated-state-revoke_and_ack>
#[derive(Clone, PartialEq, Eq, Debug, Display)]
#[display("revoke_and_ack({channel_id}, {next_per_commitment_point}, ...)")]
pub struct RevokeAndAck {
    /// The channel ID
    pub channel_id: ChannelId,

    /// The secret of the now-revoked commitment
    pub per_commitment_secret: SecretKey,

    /// The per-commitment point for the commitment number two ahead of the
    /// one being revoked
    pub next_per_commitment_point: PublicKey,
}

impl LightningEncode for RevokeAndAck {
    fn lightning_encode<E: io::Write>(
        &self,
        mut e: E,
    ) -> Result<usize, lnc_encoding::Error> {
        let mut len = self.channel_id.lightning_encode(&mut e)?;
        len += self.per_commitment_secret.lightning_encode(&mut e)?;
        len += self.next_per_commitment_point.lightning_encode(&mut e)?;
        Ok(len)
    }
}

impl LightningDecode for RevokeAndAck {
    fn lightning_decode<D: io::Read>(
        mut d: D,
    ) -> Result<Self, lnc_encoding::Error> {
        Ok(RevokeAndAck {
            channel_id: ChannelId::lightning_decode(&mut d)?,
            per_commitment_secret: SecretKey::lightning_decode(&mut d)?,
            next_per_commitment_point: PublicKey::lightning_decode(&mut d)?,
        })
    }
}

/// The node paying the commitment fee announces a new fee rate for the
/// channel; only the funder may send this message.
#[derive(Clone, PartialEq, Eq, Debug, Display)]
#[display("update_fee({channel_id}, {feerate_per_kw})")]
pub struct UpdateFee {
    /// The channel ID
    pub channel_id: ChannelId,

    /// The new fee rate in satoshi per 1000-weight
    pub feerate_per_kw: u32,
}

impl LightningEncode for UpdateFee {
    fn lightning_encode<E: io::Write>(
        &self,
        mut e: E,
    ) -> Result<usize, lnc_encoding::Error> {
        let mut len = self.channel_id.lightning_encode(&mut e)?;
        len += self.feerate_per_kw.lightning_encode(&mut e)?;
        Ok(len)
    }
}

impl LightningDecode for UpdateFee {
    fn lightning_decode<D: io::Read>(
        mut d: D,
    ) -> Result<Self, lnc_encoding::Error> {
        Ok(UpdateFee {
            channel_id: ChannelId::lightning_decode(&mut d)?,
            feerate_per_kw: u32::lightning_decode(&mut d)?,
        })
    }
}

/// Exchanged on reconnection so both nodes can detect lost
/// `commitment_signed` or `revoke_and_ack` messages and retransmit them.
///
/// # Specification
/// <https://github.com/lightning/bolts/blob/master/02-peer-protocol.md#message-retransmission>
#[derive(Clone, PartialEq, Eq, Debug, Display)]
#[display(
    "channel_reestablish({channel_id}, {next_commitment_number}, \
     {next_revocation_number}, ...)"
)]
pub struct ChannelReestablish {
    /// The channel ID
    pub channel_id: ChannelId,

    /// The commitment number of the next commitment_signed the sender
    /// expects to receive
    pub next_commitment_number: u64,

    /// The commitment number of the next revoke_and_ack the sender expects
    /// to receive
    pub next_revocation_number: u64,

    /// Proof that the sender knows the peer's revoked commitment secret;
    /// all-zero for a fresh channel
    pub your_last_per_commitment_secret: Slice32,

    /// The sender's current per-commitment point
    pub my_current_per_commitment_point: PublicKey,
}

impl LightningEncode for ChannelReestablish {
    fn lightning_encode<E: io::Write>(
        &self,
        mut e: E,
    ) -> Result<usize, lnc_encoding::Error> {
        let mut len = self.channel_id.lightning_encode(&mut e)?;
        len += self.next_commitment_number.lightning_encode(&mut e)?;
        len += self.next_revocation_number.lightning_encode(&mut e)?;
        len +=
            self.your_last_per_commitment_secret.lightning_encode(&mut e)?;
        len +=
            self.my_current_per_commitment_point.lightning_encode(&mut e)?;
        Ok(len)
    }
}

impl LightningDecode for ChannelReestablish {
    fn lightning_decode<D: io::Read>(
        mut d: D,
    ) -> Result<Self, lnc_encoding::Error> {
        Ok(ChannelReestablish {
            channel_id: ChannelId::lightning_decode(&mut d)?,
            next_commitment_number: u64::lightning_decode(&mut d)?,
            next_revocation_number: u64::lightning_decode(&mut d)?,
            your_last_per_commitment_secret: Slice32::lightning_decode(
                &mut d,
            )?,
            my_current_per_commitment_point: PublicKey::lightning_decode(
                &mut d,
            )?,
        })
    }
}

/// Proposes adding or removing funds from an existing channel; only valid
/// when feature bit 62/63 was negotiated.
#[derive(Clone, PartialEq, Eq, Debug, Display)]
#[display("splice_init({channel_id}, {funding_contribution_satoshis}, ...)")]
pub struct SpliceInit {
    /// The channel ID
    pub channel_id: ChannelId,

    /// Satoshis the sender adds to (positive) or removes from (negative)
    /// the channel, encoded as two's complement
    pub funding_contribution_satoshis: i64,

    /// Fee rate for the splice transaction
    pub funding_feerate_per_kw: u32,

    /// Locktime for the splice transaction
    pub locktime: u32,

    /// The key the sender will use for the new funding output
    pub funding_pubkey: PublicKey,
}

impl LightningEncode for SpliceInit {
    fn lightning_encode<E: io::Write>(
        &self,
        mut e: E,
    ) -> Result<usize, lnc_encoding::Error> {
        let mut len = self.channel_id.lightning_encode(&mut e)?;
        len += (self.funding_contribution_satoshis as u64)
            .lightning_encode(&mut e)?;
        len += self.funding_feerate_per_kw.lightning_encode(&mut e)?;
        len += self.locktime.lightning_encode(&mut e)?;
        len += self.funding_pubkey.lightning_encode(&mut e)?;
        Ok(len)
    }
}

impl LightningDecode for SpliceInit {
    fn lightning_decode<D: io::Read>(
        mut d: D,
    ) -> Result<Self, lnc_encoding::Error> {
        Ok(SpliceInit {
            channel_id: ChannelId::lightning_decode(&mut d)?,
            funding_contribution_satoshis: u64::lightning_decode(&mut d)?
                as i64,
            funding_feerate_per_kw: u32::lightning_decode(&mut d)?,
            locktime: u32::lightning_decode(&mut d)?,
            funding_pubkey: PublicKey::lightning_decode(&mut d)?,
        })
    }
}

/// Accepts a proposed splice with the sender's own contribution.
#[derive(Clone, PartialEq, Eq, Debug, Display)]
#[display("splice_ack({channel_id}, {funding_contribution_satoshis}, ...)")]
pub struct SpliceAck {
    /// The channel ID
    pub channel_id: ChannelId,

    /// Satoshis the sender adds to the channel
    pub funding_contribution_satoshis: i64,

    /// The key the sender will use for the new funding output
    pub funding_pubkey: PublicKey,
}

impl LightningEncode for SpliceAck {
    fn lightning_encode<E: io::Write>(
        &self,
        mut e: E,
    ) -> Result<usize, lnc_encoding::Error> {
        let mut len = self.channel_id.lightning_encode(&mut e)?;
        len += (self.funding_contribution_satoshis as u64)
            .lightning_encode(&mut e)?;
        len += self.funding_pubkey.lightning_encode(&mut e)?;
        Ok(len)
    }
}

impl LightningDecode for SpliceAck {
    fn lightning_decode<D: io::Read>(
        mut d: D,
    ) -> Result<Self, lnc_encoding::Error> {
        Ok(SpliceAck {
            channel_id: ChannelId::lightning_decode(&mut d)?,
            funding_contribution_satoshis: u64::lightning_decode(&mut d)?
                as i64,
            funding_pubkey: PublicKey::lightning_decode(&mut d)?,
        })
    }
}

/// Announces that the splice transaction reached the required depth and
/// the spliced channel can be used.
#[derive(Clone, PartialEq, Eq, Debug, Display)]
#[display("splice_locked({channel_id}, {splice_txid})")]
pub struct SpliceLocked {
    /// The channel ID
    pub channel_id: ChannelId,

    /// The id of the confirmed splice transaction
    pub splice_txid: Txid,
}

impl LightningEncode for SpliceLocked {
    fn lightning_encode<E: io::Write>(
        &self,
        mut e: E,
    ) -> Result<usize, lnc_encoding::Error> {
        let mut len = self.channel_id.lightning_encode(&mut e)?;
        len += self.splice_txid.lightning_encode(&mut e)?;
        Ok(len)
    }
}

impl LightningDecode for SpliceLocked {
    fn lightning_decode<D: io::Read>(
        mut d: D,
    ) -> Result<Self, lnc_encoding::Error> {
        Ok(SpliceLocked {
            channel_id: ChannelId::lightning_decode(&mut d)?,
            splice_txid: Txid::lightning_decode(&mut d)?,
        })
    }
}
