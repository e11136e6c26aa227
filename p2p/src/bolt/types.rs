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

use std::fmt::{self, Display, Formatter};
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use amplify::hex::{self, FromHex};
use amplify::{DumbDefault, Slice32, Wrapper};
use bitcoin::hashes::{sha256, Hash};
use bitcoin::OutPoint;
use lnc_encoding::{self, LightningDecode, LightningEncode};
use secp256k1::PublicKey;
use strict_encoding::{StrictDecode, StrictEncode};

/// Total length of the payment Sphinx routing info field
pub const PAYMENT_SPHINX_LEN: usize = 1300;

/// Lightning network channel id: 256-bit number representing funding
/// txid XOR'ed with the 16-bit funding output number at bytes 30-31
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", transparent)
)]
#[derive(
    Wrapper,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Debug,
    Display,
    Default,
    From
)]
#[derive(StrictEncode, StrictDecode)]
#[display(LowerHex)]
#[wrapper(FromStr, LowerHex, UpperHex)]
pub struct ChannelId(Slice32);

impl FromHex for ChannelId {
    fn from_byte_iter<I>(iter: I) -> Result<Self, hex::Error>
    where
        I: Iterator<Item = Result<u8, hex::Error>>
            + ExactSizeIterator
            + DoubleEndedIterator,
    {
        Ok(Self(Slice32::from_byte_iter(iter)?))
    }
}

impl LightningEncode for ChannelId {
    #[inline]
    fn lightning_encode<E: io::Write>(
        &self,
        e: E,
    ) -> Result<usize, lnc_encoding::Error> {
        self.0.lightning_encode(e)
    }
}

impl LightningDecode for ChannelId {
    #[inline]
    fn lightning_decode<D: io::Read>(
        d: D,
    ) -> Result<Self, lnc_encoding::Error> {
        Slice32::lightning_decode(d).map(Self)
    }
}

impl ChannelId {
    /// Constructs the final channel id from the funding outpoint: the txid
    /// with its last two bytes XORed with the big-endian funding output
    /// index.
    pub fn with(funding_outpoint: OutPoint) -> Self {
        let mut slice = funding_outpoint.txid.into_inner();
        let vout = (funding_outpoint.vout as u16).to_be_bytes();
        slice[30] ^= vout[0];
        slice[31] ^= vout[1];
        ChannelId::from_inner(Slice32::from_inner(slice))
    }

    /// With some lightning messages (like error) channel id consisting of all
    /// zeros has a special meaning of "applicable to all opened channels".
    /// This function allows to detect this kind of [`ChannelId`]
    pub fn is_wildcard(&self) -> bool {
        self.to_inner().to_inner() == [0u8; 32]
    }

    /// All-zero channel id referring to all channels of a peer.
    pub fn wildcard() -> Self {
        ChannelId::default()
    }
}

/// Lightning network temporary channel Id used before the funding outpoint
/// is known
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", transparent)
)]
#[derive(
    Wrapper,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Debug,
    Display,
    From
)]
#[derive(StrictEncode, StrictDecode)]
#[display(LowerHex)]
#[wrapper(FromStr, LowerHex, UpperHex)]
pub struct TempChannelId(Slice32);

impl From<TempChannelId> for ChannelId {
    fn from(temp: TempChannelId) -> Self {
        Self(temp.into_inner())
    }
}

impl FromHex for TempChannelId {
    fn from_byte_iter<I>(iter: I) -> Result<Self, hex::Error>
    where
        I: Iterator<Item = Result<u8, hex::Error>>
            + ExactSizeIterator
            + DoubleEndedIterator,
    {
        Ok(Self(Slice32::from_byte_iter(iter)?))
    }
}

impl TempChannelId {
    pub fn random() -> Self {
        TempChannelId::from_inner(Slice32::random())
    }
}

impl DumbDefault for TempChannelId {
    fn dumb_default() -> Self {
        Self(Default::default())
    }
}

impl LightningEncode for TempChannelId {
    #[inline]
    fn lightning_encode<E: io::Write>(
        &self,
        e: E,
    ) -> Result<usize, lnc_encoding::Error> {
        self.0.lightning_encode(e)
    }
}

impl LightningDecode for TempChannelId {
    #[inline]
    fn lightning_decode<D: io::Read>(
        d: D,
    ) -> Result<Self, lnc_encoding::Error> {
        Slice32::lightning_decode(d).map(Self)
    }
}

/// Channel id which is either temporary (before the funding transaction is
/// constructed) or final.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Display, From)]
#[derive(StrictEncode, StrictDecode)]
pub enum ActiveChannelId {
    /// Temporary channel id used during the opening dance
    #[display(inner)]
    #[from]
    Temporary(TempChannelId),

    /// Final channel id derived from the funding outpoint
    #[display(inner)]
    #[from]
    Static(ChannelId),
}

impl ActiveChannelId {
    /// Generates a new random temporary channel id
    #[inline]
    pub fn random() -> Self {
        ActiveChannelId::Temporary(TempChannelId::random())
    }

    /// Constructs the final variant out of the funding outpoint
    #[inline]
    pub fn with(funding_outpoint: OutPoint) -> Self {
        ActiveChannelId::Static(ChannelId::with(funding_outpoint))
    }

    /// Returns the raw 32 bytes of whichever id is active
    #[inline]
    pub fn as_slice32(self) -> Slice32 {
        match self {
            ActiveChannelId::Temporary(id) => id.into_inner(),
            ActiveChannelId::Static(id) => id.into_inner(),
        }
    }

    /// Returns the final channel id, if the channel is already funded
    #[inline]
    pub fn channel_id(self) -> Option<ChannelId> {
        match self {
            ActiveChannelId::Temporary(_) => None,
            ActiveChannelId::Static(id) => Some(id),
        }
    }

    /// Returns the temporary channel id, if the funding is not yet set
    #[inline]
    pub fn temp_channel_id(self) -> Option<TempChannelId> {
        match self {
            ActiveChannelId::Temporary(id) => Some(id),
            ActiveChannelId::Static(_) => None,
        }
    }
}

/// Hash of the genesis block identifying the blockchain a channel resides
/// within, transmitted in consensus byte order.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", transparent)
)]
#[derive(
    Wrapper,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Debug,
    Display,
    Default,
    From
)]
#[derive(StrictEncode, StrictDecode)]
#[display(LowerHex)]
#[wrapper(FromStr, LowerHex, UpperHex)]
pub struct ChainHash(Slice32);

impl LightningEncode for ChainHash {
    #[inline]
    fn lightning_encode<E: io::Write>(
        &self,
        e: E,
    ) -> Result<usize, lnc_encoding::Error> {
        self.0.lightning_encode(e)
    }
}

impl LightningDecode for ChainHash {
    #[inline]
    fn lightning_decode<D: io::Read>(
        d: D,
    ) -> Result<Self, lnc_encoding::Error> {
        Slice32::lightning_decode(d).map(Self)
    }
}

impl ChainHash {
    /// Bitcoin mainnet genesis hash
    pub fn mainnet() -> ChainHash {
        ChainHash(Slice32::from_inner([
            0x6f, 0xe2, 0x8c, 0x0a, 0xb6, 0xf1, 0xb3, 0x72, 0xc1, 0xa6, 0xa2,
            0x46, 0xae, 0x63, 0xf7, 0x4f, 0x93, 0x1e, 0x83, 0x65, 0xe1, 0x5a,
            0x08, 0x9c, 0x68, 0xd6, 0x19, 0x00, 0x00, 0x00, 0x00, 0x00,
        ]))
    }

    /// Bitcoin testnet3 genesis hash
    pub fn testnet() -> ChainHash {
        ChainHash(Slice32::from_inner([
            0x43, 0x49, 0x7f, 0xd7, 0xf8, 0x26, 0x95, 0x71, 0x08, 0xf4, 0xa3,
            0x0f, 0xd9, 0xce, 0xc3, 0xae, 0xba, 0x79, 0x97, 0x20, 0x84, 0xe9,
            0x0e, 0xad, 0x01, 0xea, 0x33, 0x09, 0x00, 0x00, 0x00, 0x00,
        ]))
    }

    /// Bitcoin signet genesis hash
    pub fn signet() -> ChainHash {
        ChainHash(Slice32::from_inner([
            0xf6, 0x1e, 0xee, 0x3b, 0x63, 0xa3, 0x80, 0xa4, 0x77, 0xa0, 0x63,
            0xaf, 0x32, 0xb2, 0xbb, 0xc9, 0x7c, 0x9f, 0xf9, 0xf0, 0x1f, 0x2c,
            0x42, 0x25, 0xe9, 0x73, 0x98, 0x81, 0x08, 0x00, 0x00, 0x00,
        ]))
    }

    /// Bitcoin regtest genesis hash
    pub fn regtest() -> ChainHash {
        ChainHash(Slice32::from_inner([
            0x06, 0x22, 0x6e, 0x46, 0x11, 0x1a, 0x0b, 0x59, 0xca, 0xaf, 0x12,
            0x60, 0x43, 0xeb, 0x5b, 0xbf, 0x28, 0xc3, 0x4f, 0x3a, 0x5e, 0x33,
            0x2a, 0x1f, 0xc7, 0xb2, 0xb7, 0x3c, 0xf1, 0x88, 0x91, 0x0f,
        ]))
    }

    /// Detects whether the hash belongs to one of the four recognized
    /// bitcoin networks.
    pub fn is_recognized(self) -> bool {
        [
            ChainHash::mainnet(),
            ChainHash::testnet(),
            ChainHash::signet(),
            ChainHash::regtest(),
        ]
        .contains(&self)
    }
}

/// HTLC payment hash: SHA256 of the payment preimage locking an HTLC output
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", transparent)
)]
#[derive(
    Wrapper,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Debug,
    Display,
    Default,
    From
)]
#[derive(StrictEncode, StrictDecode)]
#[display(LowerHex)]
#[wrapper(FromStr, LowerHex, UpperHex)]
pub struct HashLock(Slice32);

impl From<HashPreimage> for HashLock {
    fn from(preimage: HashPreimage) -> Self {
        let hash = sha256::Hash::hash(preimage.as_ref());
        HashLock::from_inner(Slice32::from_inner(hash.into_inner()))
    }
}

impl AsRef<[u8]> for HashLock {
    #[inline]
    fn as_ref(&self) -> &[u8] {
        &self.0.as_inner()[..]
    }
}

impl LightningEncode for HashLock {
    #[inline]
    fn lightning_encode<E: io::Write>(
        &self,
        e: E,
    ) -> Result<usize, lnc_encoding::Error> {
        self.0.lightning_encode(e)
    }
}

impl LightningDecode for HashLock {
    #[inline]
    fn lightning_decode<D: io::Read>(
        d: D,
    ) -> Result<Self, lnc_encoding::Error> {
        Slice32::lightning_decode(d).map(Self)
    }
}

/// HTLC payment preimage revealed by a `update_fulfill_htlc` message
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", transparent)
)]
#[derive(
    Wrapper,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Debug,
    Display,
    Default,
    From
)]
#[derive(StrictEncode, StrictDecode)]
#[display(LowerHex)]
#[wrapper(FromStr, LowerHex, UpperHex)]
pub struct HashPreimage(Slice32);

impl HashPreimage {
    pub fn random() -> Self {
        HashPreimage::from_inner(Slice32::random())
    }
}

impl AsRef<[u8]> for HashPreimage {
    #[inline]
    fn as_ref(&self) -> &[u8] {
        &self.0.as_inner()[..]
    }
}

impl LightningEncode for HashPreimage {
    #[inline]
    fn lightning_encode<E: io::Write>(
        &self,
        e: E,
    ) -> Result<usize, lnc_encoding::Error> {
        self.0.lightning_encode(e)
    }
}

impl LightningDecode for HashPreimage {
    #[inline]
    fn lightning_decode<D: io::Read>(
        d: D,
    ) -> Result<Self, lnc_encoding::Error> {
        Slice32::lightning_decode(d).map(Self)
    }
}

/// Lightning network short channel Id as per BOLT-7: the position of the
/// funding output in the blockchain.
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default
)]
#[derive(StrictEncode, StrictDecode)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
pub struct ShortChannelId {
    pub block_height: u32,
    pub tx_index: u32,
    pub output_index: u16,
}

impl ShortChannelId {
    pub fn with(
        block_height: u32,
        tx_index: u32,
        output_index: u16,
    ) -> ShortChannelId {
        ShortChannelId {
            block_height: block_height & 0x00FF_FFFF,
            tx_index: tx_index & 0x00FF_FFFF,
            output_index,
        }
    }

    /// Packs the id into the 8-byte wire representation.
    pub fn to_u64(self) -> u64 {
        ((self.block_height as u64) << 40)
            | ((self.tx_index as u64) << 16)
            | self.output_index as u64
    }

    pub fn from_u64(value: u64) -> ShortChannelId {
        ShortChannelId {
            block_height: ((value >> 40) & 0xFF_FFFF) as u32,
            tx_index: ((value >> 16) & 0xFF_FFFF) as u32,
            output_index: (value & 0xFFFF) as u16,
        }
    }
}

impl Display for ShortChannelId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{}x{}",
            self.block_height, self.tx_index, self.output_index
        )
    }
}

/// Error parsing [`ShortChannelId`] from a `BxTxO` string
#[derive(
    Clone, Copy, Ord, PartialOrd, Eq, PartialEq, Hash, Debug, Display, Error
)]
#[display("malformed short channel id string; `block x tx x vout` expected")]
pub struct ShortChannelIdParseError;

impl FromStr for ShortChannelId {
    type Err = ShortChannelIdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut split = s.split('x');
        match (split.next(), split.next(), split.next(), split.next()) {
            (Some(block), Some(tx), Some(vout), None) => {
                Ok(ShortChannelId::with(
                    block.parse().map_err(|_| ShortChannelIdParseError)?,
                    tx.parse().map_err(|_| ShortChannelIdParseError)?,
                    vout.parse().map_err(|_| ShortChannelIdParseError)?,
                ))
            }
            _ => Err(ShortChannelIdParseError),
        }
    }
}

impl LightningEncode for ShortChannelId {
    #[inline]
    fn lightning_encode<E: io::Write>(
        &self,
        e: E,
    ) -> Result<usize, lnc_encoding::Error> {
        self.to_u64().lightning_encode(e)
    }
}

impl LightningDecode for ShortChannelId {
    #[inline]
    fn lightning_decode<D: io::Read>(
        d: D,
    ) -> Result<Self, lnc_encoding::Error> {
        u64::lightning_decode(d).map(ShortChannelId::from_u64)
    }
}

/// Node color used in `node_announcement` visualizations
#[derive(
    Wrapper, Clone, Copy, PartialEq, Eq, Hash, Debug, Default, From
)]
#[derive(StrictEncode, StrictDecode)]
pub struct NodeColor([u8; 3]);

impl LightningEncode for NodeColor {
    fn lightning_encode<E: io::Write>(
        &self,
        mut e: E,
    ) -> Result<usize, lnc_encoding::Error> {
        e.write_all(self.as_inner())?;
        Ok(3)
    }
}

impl LightningDecode for NodeColor {
    fn lightning_decode<D: io::Read>(
        mut d: D,
    ) -> Result<Self, lnc_encoding::Error> {
        let mut buf = [0u8; 3];
        d.read_exact(&mut buf)?;
        Ok(Self::from_inner(buf))
    }
}

/// Zero-padded UTF-8 node alias from `node_announcement`
#[derive(
    Wrapper,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Debug,
    Display,
    Default,
    From
)]
#[derive(StrictEncode, StrictDecode)]
#[display(LowerHex)]
#[wrapper(FromStr, LowerHex, UpperHex)]
pub struct Alias(Slice32);

impl LightningEncode for Alias {
    #[inline]
    fn lightning_encode<E: io::Write>(
        &self,
        e: E,
    ) -> Result<usize, lnc_encoding::Error> {
        self.0.lightning_encode(e)
    }
}

impl LightningDecode for Alias {
    #[inline]
    fn lightning_decode<D: io::Read>(
        d: D,
    ) -> Result<Self, lnc_encoding::Error> {
        Slice32::lightning_decode(d).map(Self)
    }
}

/// Network address of a lightning node announced via `node_announcement`.
///
/// Address descriptors which are not recognized (Tor v2, DNS hostnames) are
/// retained as raw bytes so the announcement re-serializes byte-exactly.
#[derive(Clone, PartialEq, Eq, Hash, Debug, Display)]
pub enum NodeAddress {
    /// IPv4 address and port
    #[display("{0}:{1}")]
    Ipv4(Ipv4Addr, u16),

    /// IPv6 address and port
    #[display("[{0}]:{1}")]
    Ipv6(Ipv6Addr, u16),

    /// Tor v3 onion service: 32-byte ed25519 pubkey, 2-byte checksum,
    /// version byte and port
    #[display("onion3(...)")]
    TorV3([u8; 35], u16),

    /// Unrecognized address descriptor kept as raw data
    #[display("unknown({0})")]
    Unknown(u8, Vec<u8>),
}

impl NodeAddress {
    fn descriptor_type(&self) -> u8 {
        match self {
            NodeAddress::Ipv4(..) => 1,
            NodeAddress::Ipv6(..) => 2,
            NodeAddress::TorV3(..) => 4,
            NodeAddress::Unknown(ty, _) => *ty,
        }
    }
}

impl LightningEncode for NodeAddress {
    fn lightning_encode<E: io::Write>(
        &self,
        mut e: E,
    ) -> Result<usize, lnc_encoding::Error> {
        e.write_all(&[self.descriptor_type()])?;
        match self {
            NodeAddress::Ipv4(ip, port) => {
                e.write_all(&ip.octets())?;
                e.write_all(&port.to_be_bytes())?;
                Ok(7)
            }
            NodeAddress::Ipv6(ip, port) => {
                e.write_all(&ip.octets())?;
                e.write_all(&port.to_be_bytes())?;
                Ok(19)
            }
            NodeAddress::TorV3(onion, port) => {
                e.write_all(&onion[..])?;
                e.write_all(&port.to_be_bytes())?;
                Ok(38)
            }
            NodeAddress::Unknown(_, raw) => {
                e.write_all(raw)?;
                Ok(1 + raw.len())
            }
        }
    }
}

impl LightningDecode for NodeAddress {
    fn lightning_decode<D: io::Read>(
        mut d: D,
    ) -> Result<Self, lnc_encoding::Error> {
        let ty = u8::lightning_decode(&mut d)?;
        match ty {
            1 => {
                let mut ip = [0u8; 4];
                d.read_exact(&mut ip)?;
                let port = u16::lightning_decode(&mut d)?;
                Ok(NodeAddress::Ipv4(Ipv4Addr::from(ip), port))
            }
            2 => {
                let mut ip = [0u8; 16];
                d.read_exact(&mut ip)?;
                let port = u16::lightning_decode(&mut d)?;
                Ok(NodeAddress::Ipv6(Ipv6Addr::from(ip), port))
            }
            4 => {
                let mut onion = [0u8; 35];
                d.read_exact(&mut onion)?;
                let port = u16::lightning_decode(&mut d)?;
                Ok(NodeAddress::TorV3(onion, port))
            }
            unknown => {
                // Unknown descriptors consume the rest of the address block;
                // the caller slices the address data before decoding.
                let mut raw = vec![];
                d.read_to_end(&mut raw)?;
                Ok(NodeAddress::Unknown(unknown, raw))
            }
        }
    }
}

/// Sphinx onion packet carried by `update_add_htlc`, defined in BOLT-4.
///
/// The packet is a fixed 1366 bytes: version, ephemeral session key, 1300
/// bytes of layered routing info and the outermost HMAC.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct OnionPacket {
    /// Onion protocol version; only 0 is defined
    pub version: u8,

    /// Ephemeral session public key for the ECDH chain
    pub public_key: PublicKey,

    /// Layered per-hop routing info
    pub hop_data: [u8; PAYMENT_SPHINX_LEN],

    /// HMAC over `hop_data` keyed for the first hop
    pub hmac: Slice32,
}

impl DumbDefault for OnionPacket {
    fn dumb_default() -> Self {
        OnionPacket {
            version: 0,
            public_key: dumb_pubkey!(),
            hop_data: [0u8; PAYMENT_SPHINX_LEN],
            hmac: Slice32::default(),
        }
    }
}

impl LightningEncode for OnionPacket {
    fn lightning_encode<E: io::Write>(
        &self,
        mut e: E,
    ) -> Result<usize, lnc_encoding::Error> {
        let mut len = self.version.lightning_encode(&mut e)?;
        len += self.public_key.lightning_encode(&mut e)?;
        e.write_all(&self.hop_data)?;
        len += self.hop_data.len();
        len += self.hmac.lightning_encode(&mut e)?;
        Ok(len)
    }
}

impl LightningDecode for OnionPacket {
    fn lightning_decode<D: io::Read>(
        mut d: D,
    ) -> Result<Self, lnc_encoding::Error> {
        let version = u8::lightning_decode(&mut d)?;
        let public_key = PublicKey::lightning_decode(&mut d)?;
        let mut hop_data = [0u8; PAYMENT_SPHINX_LEN];
        d.read_exact(&mut hop_data)?;
        let hmac = Slice32::lightning_decode(&mut d)?;
        Ok(OnionPacket {
            version,
            public_key,
            hop_data,
            hmac,
        })
    }
}

impl StrictEncode for OnionPacket {
    fn strict_encode<E: io::Write>(
        &self,
        mut e: E,
    ) -> Result<usize, strict_encoding::Error> {
        let mut len = self.version.strict_encode(&mut e)?;
        len += self.public_key.strict_encode(&mut e)?;
        e.write_all(&self.hop_data)?;
        len += self.hop_data.len();
        len += self.hmac.strict_encode(&mut e)?;
        Ok(len)
    }
}

impl StrictDecode for OnionPacket {
    fn strict_decode<D: io::Read>(
        mut d: D,
    ) -> Result<Self, strict_encoding::Error> {
        let version = u8::strict_decode(&mut d)?;
        let public_key = secp256k1::PublicKey::strict_decode(&mut d)?;
        let mut hop_data = [0u8; PAYMENT_SPHINX_LEN];
        d.read_exact(&mut hop_data)?;
        let hmac = Slice32::strict_decode(&mut d)?;
        Ok(OnionPacket {
            version,
            public_key,
            hop_data,
            hmac,
        })
    }
}

#[cfg(test)]
mod test {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn channel_id_from_outpoint() {
        let outpoint = OutPoint {
            txid: bitcoin::Txid::from_slice(&[0x11; 32]).unwrap(),
            vout: 5,
        };
        let channel_id = ChannelId::with(outpoint);
        let bytes = channel_id.as_inner().as_inner();
        assert_eq!(bytes[..30], [0x11; 30]);
        assert_eq!(bytes[30], 0x11);
        assert_eq!(bytes[31], 0x11 ^ 0x05);
    }

    #[test]
    fn channel_id_high_vout_uses_both_bytes() {
        let outpoint = OutPoint {
            txid: bitcoin::Txid::from_slice(&[0x00; 32]).unwrap(),
            vout: 0x0203,
        };
        let channel_id = ChannelId::with(outpoint);
        let bytes = channel_id.as_inner().as_inner();
        assert_eq!(bytes[30], 0x02);
        assert_eq!(bytes[31], 0x03);
    }

    #[test]
    fn wildcard_channel_id() {
        assert!(ChannelId::wildcard().is_wildcard());
        assert!(!ChannelId::with(OutPoint {
            txid: bitcoin::Txid::from_slice(&[0x11; 32]).unwrap(),
            vout: 0,
        })
        .is_wildcard());
    }

    #[test]
    fn short_channel_id_packing() {
        let scid = ShortChannelId::with(606567, 1234, 2);
        assert_eq!(ShortChannelId::from_u64(scid.to_u64()), scid);
        assert_eq!(scid.to_string(), "606567x1234x2");
        assert_eq!(ShortChannelId::from_str("606567x1234x2").unwrap(), scid);
    }

    #[test]
    fn preimage_hashes_to_lock() {
        let preimage = HashPreimage::from_inner(Slice32::from_inner([0u8; 32]));
        let lock = HashLock::from(preimage);
        // SHA256 of 32 zero bytes
        assert_eq!(
            lock.to_string(),
            "66687aadf862bd776c8fc18b8e9f8e20089714856ee233b3902a591d0d5f2925"
        );
    }

    #[test]
    fn chain_hashes_recognized() {
        assert!(ChainHash::mainnet().is_recognized());
        assert!(ChainHash::testnet().is_recognized());
        assert!(ChainHash::signet().is_recognized());
        assert!(ChainHash::regtest().is_recognized());
        assert!(!ChainHash::default().is_recognized());
    }
}
