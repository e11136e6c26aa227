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

use lnc_p2p::bolt::{AcceptChannel, ChannelType, OpenChannel};

/// Limit for the maximum number of the accepted HTLCs towards some node
pub const BOLT3_MAX_ACCEPTED_HTLC_LIMIT: u16 = 483;

/// BOLT-3 dust limit
pub const BOLT3_DUST_LIMIT: u64 = 354;

/// Minimum channel reserve as a fraction of the funding amount (1%)
pub const RESERVE_DENOMINATOR: u64 = 100;

/// Errors from BOLT-2 policy validations of `open_channel` and
/// `accept_channel` messages.
#[derive(
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Debug,
    Display,
    Error,
    StrictEncode,
    StrictDecode
)]
#[display(doc_comments)]
pub enum PolicyError {
    /// proposed `to_self_delay` value {proposed} is unreasonably large and
    /// exceeds node policy limit of {allowed_maximum}; rejecting the
    /// channel according to BOLT-2
    ToSelfDelayUnreasonablyLarge { proposed: u16, allowed_maximum: u16 },

    /// proposed limit for maximum accepted number of HTLCs {0} exceeds
    /// BOLT-3 requirement to be below 483; rejecting the channel according
    /// to BOLT-2
    MaxAcceptedHtlcLimitExceeded(u16),

    /// proposed fee rate {proposed} sat/kw is outside of the fee rate
    /// policy of the local node ({lowest_accepted}..{highest_accepted}
    /// sat/kw); rejecting the channel according to BOLT-2
    FeeRateUnreasonable {
        proposed: u32,
        lowest_accepted: u32,
        highest_accepted: u32,
    },

    /// proposed channel reserve limit {reserve} sat is less than dust
    /// limit {dust_limit} sat; rejecting the channel according to BOLT-2
    ChannelReserveLessDust { reserve: u64, dust_limit: u64 },

    /// channel reserve {reserve} sat is below the required minimum of
    /// {required} sat (1% of the funding); rejecting the channel
    ChannelReserveTooSmall { reserve: u64, required: u64 },

    /// dust limit {0} sat is less than protocol minimum requirement of 354
    /// sat; rejecting the channel according to BOLT-2
    DustLimitTooSmall(u64),

    /// offered channel funding of {proposed} sat is too small and less
    /// than {required_minimum} required by the node policy; rejecting the
    /// channel according to BOLT-2
    ChannelFundingTooSmall {
        proposed: u64,
        required_minimum: u64,
    },

    /// pushed amount of {push_msat} msat exceeds the channel funding of
    /// {funding_satoshis} sat; rejecting the channel according to BOLT-2
    PushExceedsFunding {
        push_msat: u64,
        funding_satoshis: u64,
    },

    /// HTLC minimum of zero msat is not on-chain enforceable; rejecting
    /// the channel
    HtlcMinimumZero,

    /// HTLC minimum {proposed} is too large and exceeds node policy
    /// requirements ({allowed_maximum}); rejecting the channel according
    /// to BOLT-2
    HtlcMinimumTooLarge { proposed: u64, allowed_maximum: u64 },

    /// HTLC-in-flight maximum requirement of {proposed} is too small and
    /// does not match the node policy; the smallest requirement is
    /// {required_minimum}; rejecting the channel according to BOLT-2
    HtlcInFlightMaximumTooSmall {
        proposed: u64,
        required_minimum: u64,
    },

    /// minimum depth of {proposed} requested by the remote peer exceeds
    /// local policy limit of {allowed_maximum}; rejecting the channel
    /// according to BOLT-2
    UnreasonableMinDepth { proposed: u32, allowed_maximum: u32 },

    /// zero minimum depth requires the zeroconf channel type which was not
    /// negotiated; rejecting the channel
    ZeroDepthNotNegotiated,

    /// channel type {0} proposed by the peer is not supported by the local
    /// node
    UnsupportedChannelType(ChannelType),
}

/// Parameters commonly shaping both sides of the channel, negotiated
/// during the opening dance
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[derive(StrictEncode, StrictDecode)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
pub struct CommonParams {
    /// Minimum depth of the funding transaction before the channel is
    /// usable
    pub minimum_depth: u32,

    /// Initial fee rate in satoshi per 1000-weight applied to commitment
    /// and HTLC transactions; changed later by `update_fee`
    pub feerate_per_kw: u32,

    /// Whether the channel should be announced through gossip
    pub announce_channel: bool,

    /// The negotiated channel type
    pub channel_type: ChannelType,
}

impl Default for CommonParams {
    fn default() -> Self {
        CommonParams {
            minimum_depth: 3,
            feerate_per_kw: 253,
            announce_channel: false,
            channel_type: ChannelType::StaticRemotekey,
        }
    }
}

impl CommonParams {
    /// Extracts common parameters from the received `open_channel` message
    pub fn with(open_channel: &OpenChannel, minimum_depth: u32) -> Self {
        CommonParams {
            minimum_depth,
            feerate_per_kw: open_channel.feerate_per_kw,
            announce_channel: open_channel.should_announce_channel(),
            channel_type: open_channel.channel_type.unwrap_or_default(),
        }
    }
}

/// Channel parameters of one side, fixed in `open_channel` or
/// `accept_channel`
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[derive(StrictEncode, StrictDecode)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
pub struct PeerParams {
    /// The threshold below which outputs should not be generated for this
    /// node's commitment or HTLC transactions
    pub dust_limit_satoshis: u64,

    /// The maximum inbound HTLC value in flight towards this node, in
    /// milli-satoshi
    pub max_htlc_value_in_flight_msat: u64,

    /// The minimum value unencumbered by HTLCs for the counterparty to
    /// keep in the channel, in satoshis
    pub channel_reserve_satoshis: u64,

    /// The minimum HTLC size incoming to this node, in milli-satoshi
    pub htlc_minimum_msat: u64,

    /// The number of blocks which the counterparty will have to wait to
    /// claim on-chain funds if they broadcast a commitment transaction
    pub to_self_delay: u16,

    /// The maximum number of inbound HTLCs towards this node
    pub max_accepted_htlcs: u16,
}

impl Default for PeerParams {
    /// Sets reasonable values for the channel parameters requested from
    /// the other peer in `open_channel` or `accept_channel` messages
    fn default() -> Self {
        PeerParams {
            dust_limit_satoshis: BOLT3_DUST_LIMIT,
            max_htlc_value_in_flight_msat: 10_000_000_000,
            channel_reserve_satoshis: 10_000,
            htlc_minimum_msat: 1,
            to_self_delay: 144,
            max_accepted_htlcs: BOLT3_MAX_ACCEPTED_HTLC_LIMIT,
        }
    }
}

impl From<&OpenChannel> for PeerParams {
    fn from(open_channel: &OpenChannel) -> Self {
        PeerParams {
            dust_limit_satoshis: open_channel.dust_limit_satoshis,
            max_htlc_value_in_flight_msat: open_channel
                .max_htlc_value_in_flight_msat,
            channel_reserve_satoshis: open_channel.channel_reserve_satoshis,
            htlc_minimum_msat: open_channel.htlc_minimum_msat,
            to_self_delay: open_channel.to_self_delay,
            max_accepted_htlcs: open_channel.max_accepted_htlcs,
        }
    }
}

impl From<&AcceptChannel> for PeerParams {
    fn from(accept_channel: &AcceptChannel) -> Self {
        PeerParams {
            dust_limit_satoshis: accept_channel.dust_limit_satoshis,
            max_htlc_value_in_flight_msat: accept_channel
                .max_htlc_value_in_flight_msat,
            channel_reserve_satoshis: accept_channel
                .channel_reserve_satoshis,
            htlc_minimum_msat: accept_channel.htlc_minimum_msat,
            to_self_delay: accept_channel.to_self_delay,
            max_accepted_htlcs: accept_channel.max_accepted_htlcs,
        }
    }
}

/// The local node policy for accepting channels proposed by remote peers
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
#[derive(StrictEncode, StrictDecode)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
pub struct Policy {
    /// Smallest channel funding the node agrees to open or accept
    pub minimum_funding_satoshis: u64,

    /// Largest `to_self_delay` the node tolerates being imposed on itself
    pub maximum_to_self_delay: u16,

    /// Largest `minimum_depth` the node tolerates waiting for
    pub maximum_minimum_depth: u32,

    /// Accepted fee rate range, sat per 1000-weight
    pub feerate_per_kw_range: (u32, u32),

    /// Largest `htlc_minimum_msat` the node accepts from a peer
    pub maximum_htlc_minimum_msat: u64,

    /// Smallest in-flight HTLC allowance the node accepts from a peer
    pub minimum_max_htlc_value_in_flight_msat: u64,

    /// Channel types the node is willing to operate
    pub supported_channel_types: Vec<ChannelType>,
}

impl Default for Policy {
    fn default() -> Self {
        Policy {
            minimum_funding_satoshis: 20_000,
            maximum_to_self_delay: 2016,
            maximum_minimum_depth: 6,
            feerate_per_kw_range: (253, 100_000),
            maximum_htlc_minimum_msat: 100_000,
            minimum_max_htlc_value_in_flight_msat: 1_000_000,
            supported_channel_types: vec![
                ChannelType::StaticRemotekey,
                ChannelType::AnchorOutputsStaticRemotekey,
                ChannelType::AnchorsZeroFeeHtlcTxStaticRemotekey,
            ],
        }
    }
}

impl Policy {
    /// Validates parameters common to `open_channel` and `accept_channel`
    fn validate_peer_params(
        &self,
        params: PeerParams,
        funding_satoshis: u64,
    ) -> Result<(), PolicyError> {
        if params.dust_limit_satoshis < BOLT3_DUST_LIMIT {
            return Err(PolicyError::DustLimitTooSmall(
                params.dust_limit_satoshis,
            ));
        }
        if params.channel_reserve_satoshis < params.dust_limit_satoshis {
            return Err(PolicyError::ChannelReserveLessDust {
                reserve: params.channel_reserve_satoshis,
                dust_limit: params.dust_limit_satoshis,
            });
        }
        let required_reserve = funding_satoshis / RESERVE_DENOMINATOR;
        if params.channel_reserve_satoshis < required_reserve {
            return Err(PolicyError::ChannelReserveTooSmall {
                reserve: params.channel_reserve_satoshis,
                required: required_reserve,
            });
        }
        if params.htlc_minimum_msat == 0 {
            return Err(PolicyError::HtlcMinimumZero);
        }
        if params.htlc_minimum_msat > self.maximum_htlc_minimum_msat {
            return Err(PolicyError::HtlcMinimumTooLarge {
                proposed: params.htlc_minimum_msat,
                allowed_maximum: self.maximum_htlc_minimum_msat,
            });
        }
        if params.max_htlc_value_in_flight_msat
            < self.minimum_max_htlc_value_in_flight_msat
        {
            return Err(PolicyError::HtlcInFlightMaximumTooSmall {
                proposed: params.max_htlc_value_in_flight_msat,
                required_minimum: self
                    .minimum_max_htlc_value_in_flight_msat,
            });
        }
        if params.to_self_delay > self.maximum_to_self_delay {
            return Err(PolicyError::ToSelfDelayUnreasonablyLarge {
                proposed: params.to_self_delay,
                allowed_maximum: self.maximum_to_self_delay,
            });
        }
        if params.max_accepted_htlcs > BOLT3_MAX_ACCEPTED_HTLC_LIMIT {
            return Err(PolicyError::MaxAcceptedHtlcLimitExceeded(
                params.max_accepted_htlcs,
            ));
        }
        Ok(())
    }

    fn validate_channel_type(
        &self,
        channel_type: Option<ChannelType>,
    ) -> Result<(), PolicyError> {
        if let Some(channel_type) = channel_type {
            if !self.supported_channel_types.contains(&channel_type) {
                return Err(PolicyError::UnsupportedChannelType(
                    channel_type,
                ));
            }
        }
        Ok(())
    }

    /// Validates an inbound `open_channel` proposal
    pub fn validate_inbound(
        &self,
        open_channel: &OpenChannel,
    ) -> Result<(), PolicyError> {
        if open_channel.funding_satoshis < self.minimum_funding_satoshis {
            return Err(PolicyError::ChannelFundingTooSmall {
                proposed: open_channel.funding_satoshis,
                required_minimum: self.minimum_funding_satoshis,
            });
        }
        if open_channel.push_msat > open_channel.funding_satoshis * 1000 {
            return Err(PolicyError::PushExceedsFunding {
                push_msat: open_channel.push_msat,
                funding_satoshis: open_channel.funding_satoshis,
            });
        }
        let (lowest, highest) = self.feerate_per_kw_range;
        if open_channel.feerate_per_kw < lowest
            || open_channel.feerate_per_kw > highest
        {
            return Err(PolicyError::FeeRateUnreasonable {
                proposed: open_channel.feerate_per_kw,
                lowest_accepted: lowest,
                highest_accepted: highest,
            });
        }
        self.validate_channel_type(open_channel.channel_type)?;
        self.validate_peer_params(
            PeerParams::from(open_channel),
            open_channel.funding_satoshis,
        )
    }

    /// Validates an `accept_channel` reply against the `open_channel` we
    /// have sent
    pub fn validate_outbound(
        &self,
        open_channel: &OpenChannel,
        accept_channel: &AcceptChannel,
    ) -> Result<(), PolicyError> {
        if accept_channel.minimum_depth > self.maximum_minimum_depth {
            return Err(PolicyError::UnreasonableMinDepth {
                proposed: accept_channel.minimum_depth,
                allowed_maximum: self.maximum_minimum_depth,
            });
        }
        if accept_channel.minimum_depth == 0
            && open_channel.channel_type.is_some()
        {
            // zeroconf acceptance requires explicit negotiation; reject a
            // peer lowering the depth on its own
            return Err(PolicyError::ZeroDepthNotNegotiated);
        }
        self.validate_channel_type(accept_channel.channel_type)?;
        self.validate_peer_params(
            PeerParams::from(accept_channel),
            open_channel.funding_satoshis,
        )
    }
}

#[cfg(test)]
mod test {
    use amplify::DumbDefault;
    use lnc_p2p::bolt::OpenChannel;

    use super::*;

    fn valid_open_channel() -> OpenChannel {
        let mut open_channel = OpenChannel::dumb_default();
        open_channel.funding_satoshis = 200_000;
        open_channel.push_msat = 0;
        open_channel.dust_limit_satoshis = BOLT3_DUST_LIMIT;
        open_channel.max_htlc_value_in_flight_msat = 100_000_000;
        open_channel.channel_reserve_satoshis = 2_000;
        open_channel.htlc_minimum_msat = 1;
        open_channel.feerate_per_kw = 253;
        open_channel.to_self_delay = 144;
        open_channel.max_accepted_htlcs = 483;
        open_channel
    }

    #[test]
    fn accepts_reasonable_proposal() {
        Policy::default()
            .validate_inbound(&valid_open_channel())
            .unwrap();
    }

    #[test]
    fn rejects_dust_below_protocol_minimum() {
        let mut open_channel = valid_open_channel();
        open_channel.dust_limit_satoshis = 353;
        assert_eq!(
            Policy::default().validate_inbound(&open_channel),
            Err(PolicyError::DustLimitTooSmall(353))
        );
    }

    #[test]
    fn rejects_reserve_below_dust() {
        let mut open_channel = valid_open_channel();
        open_channel.channel_reserve_satoshis = 300;
        assert!(matches!(
            Policy::default().validate_inbound(&open_channel),
            Err(PolicyError::ChannelReserveLessDust { .. })
        ));
    }

    #[test]
    fn rejects_reserve_below_one_percent() {
        let mut open_channel = valid_open_channel();
        open_channel.channel_reserve_satoshis = 1_000; // < 1% of 200k
        assert_eq!(
            Policy::default().validate_inbound(&open_channel),
            Err(PolicyError::ChannelReserveTooSmall {
                reserve: 1_000,
                required: 2_000,
            })
        );
    }

    #[test]
    fn rejects_zero_htlc_minimum() {
        let mut open_channel = valid_open_channel();
        open_channel.htlc_minimum_msat = 0;
        assert_eq!(
            Policy::default().validate_inbound(&open_channel),
            Err(PolicyError::HtlcMinimumZero)
        );
    }

    #[test]
    fn rejects_excessive_to_self_delay() {
        let mut open_channel = valid_open_channel();
        open_channel.to_self_delay = 5_000;
        assert!(matches!(
            Policy::default().validate_inbound(&open_channel),
            Err(PolicyError::ToSelfDelayUnreasonablyLarge { .. })
        ));
    }

    #[test]
    fn rejects_push_above_funding() {
        let mut open_channel = valid_open_channel();
        open_channel.push_msat = 200_000_001 * 1000;
        assert!(matches!(
            Policy::default().validate_inbound(&open_channel),
            Err(PolicyError::PushExceedsFunding { .. })
        ));
    }

    #[test]
    fn rejects_htlc_limit_above_483() {
        let mut open_channel = valid_open_channel();
        open_channel.max_accepted_htlcs = 484;
        assert_eq!(
            Policy::default().validate_inbound(&open_channel),
            Err(PolicyError::MaxAcceptedHtlcLimitExceeded(484))
        );
    }
}
