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
use std::str::FromStr;

use amplify::flags::FlagVec;
use lnc_encoding::{self, LightningDecode, LightningEncode};

/// Specific named feature flags from the BOLT-9 registry.
///
/// The discriminant is the even ("required") bit number; the odd
/// ("optional") variant of the same feature is the discriminant plus one.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Display)]
#[non_exhaustive]
#[repr(u16)]
pub enum Feature {
    /// Requires or supports extra `channel_reestablish` fields
    #[display("option_data_loss_protect", alt = "0/1")]
    OptionDataLossProtect = 0,

    /// Sending node needs a complete routing information dump
    #[display("initial_routing_sync", alt = "3")]
    InitialRoutingSync = 2,

    /// Commits to a shutdown scriptpubkey when opening channel
    #[display("option_upfront_shutdown_script", alt = "4/5")]
    OptionUpfrontShutdownScript = 4,

    /// More sophisticated gossip control
    #[display("gossip_queries", alt = "6/7")]
    GossipQueries = 6,

    /// Requires/supports variable-length routing onion payloads
    #[display("var_onion_optin", alt = "8/9")]
    VarOnionOptin = 8,

    /// Gossip queries can include additional information
    #[display("gossip_queries_ex", alt = "10/11")]
    GossipQueriesEx = 10,

    /// Static key for remote output
    #[display("option_static_remotekey", alt = "12/13")]
    OptionStaticRemotekey = 12,

    /// Node supports `payment_secret` field
    #[display("payment_secret", alt = "14/15")]
    PaymentSecret = 14,

    /// Node can receive basic multi-part payments
    #[display("basic_mpp", alt = "16/17")]
    BasicMpp = 16,

    /// Can create large channels
    #[display("option_support_large_channel", alt = "18/19")]
    OptionSupportLargeChannel = 18,

    /// Anchor outputs
    #[display("option_anchor_outputs", alt = "20/21")]
    OptionAnchorOutputs = 20,

    /// Anchor commitment type with zero fee HTLC transactions
    #[display("option_anchors_zero_fee_htlc_tx", alt = "22/23")]
    OptionAnchorsZeroFeeHtlcTx = 22,

    /// Future segwit versions allowed in shutdown
    #[display("option_shutdown_anysegwit", alt = "26/27")]
    OptionShutdownAnySegwit = 26,

    /// Node supports the channel_type field in open/accept
    #[display("option_channel_type", alt = "44/45")]
    OptionChannelType = 44,

    /// Supply channel aliases for routing
    #[display("option_scid_alias", alt = "46/47")]
    OptionScidAlias = 46,

    /// Understands zeroconf channel types
    #[display("option_zeroconf", alt = "50/51")]
    OptionZeroConf = 50,

    /// Supports channel splicing
    #[display("option_splice", alt = "62/63")]
    OptionSplice = 62,
    // NB: When adding new feature INCLUDE it into Feature::all
}

impl Feature {
    pub fn all() -> &'static [Feature] {
        &[
            Feature::OptionDataLossProtect,
            Feature::InitialRoutingSync,
            Feature::OptionUpfrontShutdownScript,
            Feature::GossipQueries,
            Feature::VarOnionOptin,
            Feature::GossipQueriesEx,
            Feature::OptionStaticRemotekey,
            Feature::PaymentSecret,
            Feature::BasicMpp,
            Feature::OptionSupportLargeChannel,
            Feature::OptionAnchorOutputs,
            Feature::OptionAnchorsZeroFeeHtlcTx,
            Feature::OptionShutdownAnySegwit,
            Feature::OptionChannelType,
            Feature::OptionScidAlias,
            Feature::OptionZeroConf,
            Feature::OptionSplice,
        ]
    }

    /// Returns number of bit that is set by the flag
    ///
    /// # Arguments
    /// `required`: which type of flag bit should be returned:
    /// - `true` for even (required) bit variant
    /// - `false` for odd (optional) bit variant
    ///
    /// # Returns
    /// Bit number in the feature vector if the feature is allowed for the
    /// provided `required` condition; `None` otherwise.
    pub fn bit(self, required: bool) -> Option<u16> {
        if self == Feature::InitialRoutingSync && required {
            return None;
        }
        Some(self as u16 + !required as u16)
    }
}

/// Error reporting unrecognized feature name
#[derive(
    Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug, Display, Error, From
)]
#[display("the provided feature name is not known: {0}")]
pub struct UnknownFeatureError(pub String);

impl FromStr for Feature {
    type Err = UnknownFeatureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Feature::all()
            .iter()
            .find(|feature| feature.to_string() == s)
            .copied()
            .ok_or_else(|| UnknownFeatureError(s.to_owned()))
    }
}

/// Feature vector as transmitted in `init`, `node_announcement` and
/// `channel_announcement` messages.
///
/// Flags are numbered from the least-significant bit at bit 0 (an even bit).
/// They are generally assigned in pairs so that features can be introduced
/// as optional (odd bits) and later upgraded to be compulsory (even bits),
/// which will be refused by outdated nodes: see BOLT #1: The `init` message.
///
/// On the wire the vector is big-endian: the *last* byte of the serialized
/// field carries bits 0-7.
#[derive(Clone, PartialEq, Eq, Hash, Debug, Default)]
pub struct FeatureVector {
    flags: FlagVec,
}

impl FeatureVector {
    /// Constructs an empty feature vector
    #[inline]
    pub fn new() -> FeatureVector {
        FeatureVector::default()
    }

    /// Sets the given feature, either in its required (even) or optional
    /// (odd) form. Returns `false` if the feature has no bit of the
    /// requested parity (`initial_routing_sync`).
    pub fn set(&mut self, feature: Feature, required: bool) -> bool {
        match feature.bit(required) {
            Some(bit) => {
                self.flags.set(bit);
                true
            }
            None => false,
        }
    }

    /// Sets a raw bit number
    #[inline]
    pub fn set_bit(&mut self, bit: u16) {
        self.flags.set(bit);
    }

    #[inline]
    pub fn is_bit_set(&self, bit: u16) -> bool {
        self.flags.is_set(bit)
    }

    /// Detects whether the feature is present in either required or optional
    /// form
    pub fn supports(&self, feature: Feature) -> bool {
        feature
            .bit(true)
            .map(|bit| self.flags.is_set(bit))
            .unwrap_or_default()
            || feature
                .bit(false)
                .map(|bit| self.flags.is_set(bit))
                .unwrap_or_default()
    }

    /// Detects whether the feature is present in its required (even bit)
    /// form
    pub fn requires(&self, feature: Feature) -> bool {
        feature
            .bit(true)
            .map(|bit| self.flags.is_set(bit))
            .unwrap_or_default()
    }

    /// Lists even bits which are set but not present in the known-feature
    /// registry. A non-empty result means the peer (or channel) must be
    /// rejected according to BOLT-1.
    pub fn unknown_even_bits(&self) -> Vec<u16> {
        self.flags
            .iter()
            .filter(|bit| bit % 2 == 0)
            .filter(|bit| {
                Feature::all()
                    .iter()
                    .all(|feature| *feature as u16 != *bit)
            })
            .collect()
    }

    /// Iterates over all set bit numbers
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = u16> + '_ {
        self.flags.iter()
    }

    /// Serializes the vector into wire byte order (big-endian, shrunk to
    /// the minimal length)
    pub fn to_wire_bytes(&self) -> Vec<u8> {
        let mut bytes = self.flags.shrunk().as_inner().to_vec();
        bytes.reverse();
        bytes
    }

    /// Reconstructs the vector from wire byte order
    pub fn from_wire_bytes(data: &[u8]) -> FeatureVector {
        let mut bytes = data.to_vec();
        bytes.reverse();
        let mut flags = FlagVec::from_inner(bytes);
        flags.shrink();
        FeatureVector { flags }
    }
}

impl Display for FeatureVector {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for bit in self.flags.iter() {
            if !first {
                f.write_str(", ")?;
            }
            first = false;
            let known = Feature::all()
                .iter()
                .find(|feature| **feature as u16 == bit & !1);
            match known {
                Some(feature) => {
                    write!(f, "{}", feature)?;
                    if bit % 2 == 0 {
                        f.write_str("!")?;
                    }
                }
                None => write!(f, "unknown({})", bit)?,
            }
        }
        Ok(())
    }
}

impl LightningEncode for FeatureVector {
    fn lightning_encode<E: io::Write>(
        &self,
        mut e: E,
    ) -> Result<usize, lnc_encoding::Error> {
        self.to_wire_bytes().lightning_encode(&mut e)
    }
}

impl LightningDecode for FeatureVector {
    fn lightning_decode<D: io::Read>(
        d: D,
    ) -> Result<Self, lnc_encoding::Error> {
        let bytes = Vec::<u8>::lightning_decode(d)?;
        Ok(FeatureVector::from_wire_bytes(&bytes))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use lnc_encoding::lightning_serialize;

    #[test]
    fn wire_order_is_big_endian() {
        let mut features = FeatureVector::new();
        features.set(Feature::OptionStaticRemotekey, true);
        // bit 12 -> 0x1000 -> bytes [0x10, 0x00] with 2-byte length prefix
        assert_eq!(lightning_serialize(&features).unwrap(), [
            0x00, 0x02, 0x10, 0x00
        ]);
    }

    #[test]
    fn roundtrip() {
        let mut features = FeatureVector::new();
        features.set(Feature::OptionDataLossProtect, false);
        features.set(Feature::VarOnionOptin, false);
        features.set(Feature::OptionStaticRemotekey, true);
        features.set(Feature::OptionAnchorOutputs, false);
        let data = lightning_serialize(&features).unwrap();
        let decoded = FeatureVector::lightning_deserialize(data).unwrap();
        assert_eq!(decoded, features);
        assert!(decoded.supports(Feature::OptionAnchorOutputs));
        assert!(decoded.requires(Feature::OptionStaticRemotekey));
        assert!(!decoded.requires(Feature::OptionAnchorOutputs));
    }

    #[test]
    fn unknown_even_bits_detected() {
        let mut features = FeatureVector::new();
        features.set_bit(12);
        features.set_bit(98);
        features.set_bit(101);
        assert_eq!(features.unknown_even_bits(), vec![98]);
    }

    #[test]
    fn initial_routing_sync_has_no_required_bit() {
        let mut features = FeatureVector::new();
        assert!(!features.set(Feature::InitialRoutingSync, true));
        assert!(features.set(Feature::InitialRoutingSync, false));
        assert!(features.is_bit_set(3));
    }

    #[test]
    fn splice_feature_bit() {
        let mut features = FeatureVector::new();
        features.set(Feature::OptionSplice, false);
        assert!(features.is_bit_set(63));
        assert!(features.supports(Feature::OptionSplice));
    }
}
