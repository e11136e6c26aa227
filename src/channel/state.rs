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

use amplify::{DumbDefault, Slice32};
use bitcoin::{OutPoint, Script, Txid};
use lnc_p2p::bolt::{ActiveChannelId, ChainHash, TempChannelId};
use secp256k1::PublicKey;

use super::htlc::HtlcQueues;
use super::keyset::{LocalKeyset, RemoteKeyset};
use super::policy::{CommonParams, PeerParams, Policy};
use crate::secrets::RevocationStore;

/// Channel lifecycle: states of the channel state machine
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Display)]
#[derive(StrictEncode, StrictDecode)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[repr(u8)]
pub enum Lifecycle {
    /// Channel object created, no messages exchanged yet
    #[display("PREOPENING")]
    Preopening,

    /// `open_channel` sent or received, negotiating parameters
    #[display("OPENING")]
    Opening,

    /// `accept_channel` exchanged, constructing the funding transaction
    #[display("FUNDED")]
    Funded,

    /// `funding_created`/`funding_signed` exchanged, waiting for
    /// confirmations
    #[display("WAITING_FOR_FUNDING_CONFIRMED")]
    WaitingForFundingConfirmed,

    /// Funding buried, waiting for both `channel_ready` messages
    #[display("WAITING_FOR_CHANNEL_READY")]
    WaitingForChannelReady,

    /// Normal operating mode
    #[display("OPEN")]
    Open,

    /// `shutdown` sent or received, draining HTLCs
    #[display("SHUTDOWN")]
    Shutdown,

    /// All HTLCs resolved, exchanging `closing_signed`
    #[display("NEGOTIATING_CLOSING")]
    NegotiatingClosing,

    /// Mutual closing transaction broadcast, waiting for burial
    #[display("CLOSING")]
    Closing,

    /// Commitment broadcast unilaterally, sweeping outputs
    #[display("FORCE_CLOSING")]
    ForceClosing,

    /// Terminal: channel fully resolved on-chain
    #[display("CLOSED")]
    Closed,

    /// Reconnected, exchanging `channel_reestablish`
    #[display("REESTABLISHING")]
    Reestablishing,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Lifecycle::Preopening
    }
}

impl Lifecycle {
    /// States the channel may transition into from the current one. Any
    /// transition not in this table is a fatal protocol error.
    pub fn allowed_transitions(self) -> &'static [Lifecycle] {
        match self {
            Lifecycle::Preopening => &[Lifecycle::Opening],
            Lifecycle::Opening => {
                &[Lifecycle::Funded, Lifecycle::Closed]
            }
            Lifecycle::Funded => &[
                Lifecycle::WaitingForFundingConfirmed,
                Lifecycle::Closed,
            ],
            Lifecycle::WaitingForFundingConfirmed => &[
                Lifecycle::WaitingForChannelReady,
                Lifecycle::ForceClosing,
                Lifecycle::Closed,
            ],
            Lifecycle::WaitingForChannelReady => &[
                Lifecycle::Open,
                Lifecycle::ForceClosing,
                Lifecycle::Closed,
            ],
            Lifecycle::Open => &[
                Lifecycle::Shutdown,
                Lifecycle::ForceClosing,
                Lifecycle::Reestablishing,
            ],
            Lifecycle::Shutdown => &[
                Lifecycle::NegotiatingClosing,
                Lifecycle::ForceClosing,
                Lifecycle::Closed,
            ],
            Lifecycle::NegotiatingClosing => {
                &[Lifecycle::Closing, Lifecycle::ForceClosing]
            }
            Lifecycle::Closing => &[Lifecycle::Closed],
            Lifecycle::ForceClosing => &[Lifecycle::Closed],
            Lifecycle::Closed => &[],
            Lifecycle::Reestablishing => &[
                Lifecycle::Open,
                Lifecycle::ForceClosing,
                Lifecycle::Closed,
            ],
        }
    }

    #[inline]
    pub fn can_transit_to(self, target: Lifecycle) -> bool {
        self.allowed_transitions().contains(&target)
    }
}

/// Channel direction
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Display)]
#[derive(StrictEncode, StrictDecode)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
pub enum Direction {
    /// Inbound channels accepted by the local node.
    ///
    /// Launched in response to received `open_channel` messages
    #[display("inbound")]
    Inbound,

    /// Outbound channels proposed to a remote node.
    ///
    /// Created by sending `open_channel` message
    #[display("outbound")]
    Outbound,
}

impl Direction {
    /// Detects if the channel is inbound
    #[inline]
    pub fn is_inbound(self) -> bool {
        self == Direction::Inbound
    }

    /// Detects if the channel is outbound
    #[inline]
    pub fn is_outbound(self) -> bool {
        self == Direction::Outbound
    }
}

/// State of the cooperative close fee negotiation
#[derive(Clone, PartialEq, Eq, Debug, Default)]
#[derive(StrictEncode, StrictDecode)]
pub struct ClosingState {
    /// Script we announced in our `shutdown`
    pub local_shutdown_script: Option<Script>,

    /// Script the peer announced in its `shutdown`
    pub remote_shutdown_script: Option<Script>,

    /// Last fee we proposed
    pub last_fee_proposed: Option<u64>,

    /// Last fee the peer proposed
    pub last_fee_received: Option<u64>,

    /// Txid of the final mutual closing transaction
    pub closing_txid: Option<Txid>,
}

/// The complete persisted state of one channel: everything needed to
/// resume operation (or punish the peer) after a restart.
#[derive(Clone, PartialEq, Debug)]
#[derive(StrictEncode, StrictDecode)]
pub struct ChannelState {
    /// Current channel lifecycle stage
    pub stage: Lifecycle,

    /// The chain the channel operates within
    pub chain_hash: ChainHash,

    /// Channel id used by the channel; first temporary and later final
    pub active_channel_id: ActiveChannelId,

    /// Funding outpoint; default until the funding transaction is built
    pub funding_outpoint: OutPoint,

    /// Funding amount in satoshis
    pub funding_satoshis: u64,

    /// Whether the local node funded (and thus pays commitment fees)
    pub direction: Direction,

    /// The policy the channel was validated against
    pub policy: Policy,

    /// Common parameters applying to both nodes
    pub common_params: CommonParams,

    /// Channel parameters imposed by the local node
    pub local_params: PeerParams,

    /// Channel parameters imposed by the remote node
    pub remote_params: PeerParams,

    /// Set of locally-derived public keys for channel transactions
    pub local_keys: LocalKeyset,

    /// Set of keys received from the remote node
    pub remote_keys: RemoteKeyset,

    /// Seed of our per-commitment secret tree
    pub per_commitment_seed: Slice32,

    /// The peer's per-commitment point for its latest committed
    /// commitment (number `ctn_remote`); revocations are verified
    /// against it
    pub remote_current_per_commitment_point: PublicKey,

    /// The peer's per-commitment point for its next commitment (number
    /// `ctn_remote + 1`), updated by each of its `revoke_and_ack`
    /// messages
    pub remote_next_per_commitment_point: PublicKey,

    /// The peer's signature over our latest commitment, needed to
    /// force-close
    pub remote_commitment_sig: Option<secp256k1::ecdsa::Signature>,

    /// The peer's signatures over the second-stage transactions of our
    /// latest commitment, in output order
    pub remote_htlc_sigs: Vec<secp256k1::ecdsa::Signature>,

    /// Released secrets of the peer's revoked commitments
    pub revocation_store: RevocationStore,

    /// The HTLC and fee update log
    pub htlc_queues: HtlcQueues,

    /// Whether we have an unrevoked `commitment_signed` in flight
    pub awaiting_revoke: bool,

    /// Whether the peer has sent `channel_ready`
    pub remote_channel_ready: bool,

    /// Whether we have sent `channel_ready`
    pub local_channel_ready: bool,

    /// Cooperative close progress
    pub closing: ClosingState,
}

impl DumbDefault for ChannelState {
    fn dumb_default() -> Self {
        ChannelState {
            stage: Lifecycle::default(),
            chain_hash: ChainHash::default(),
            active_channel_id: ActiveChannelId::Temporary(
                TempChannelId::dumb_default(),
            ),
            funding_outpoint: OutPoint::default(),
            funding_satoshis: 0,
            direction: Direction::Outbound,
            policy: Policy::default(),
            common_params: CommonParams::default(),
            local_params: PeerParams::default(),
            remote_params: PeerParams::default(),
            local_keys: LocalKeyset::dumb_default(),
            remote_keys: RemoteKeyset::dumb_default(),
            per_commitment_seed: Slice32::default(),
            remote_current_per_commitment_point: dumb_pubkey!(),
            remote_next_per_commitment_point: dumb_pubkey!(),
            remote_commitment_sig: None,
            remote_htlc_sigs: vec![],
            revocation_store: RevocationStore::new(),
            htlc_queues: HtlcQueues::new(
                0,
                0,
                0,
                default!(),
                default!(),
            ),
            awaiting_revoke: false,
            remote_channel_ready: false,
            local_channel_ready: false,
            closing: ClosingState::default(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn terminal_state_has_no_transitions() {
        assert!(Lifecycle::Closed.allowed_transitions().is_empty());
    }

    #[test]
    fn transition_graph_matches_design() {
        assert!(Lifecycle::Preopening.can_transit_to(Lifecycle::Opening));
        assert!(Lifecycle::Open.can_transit_to(Lifecycle::Shutdown));
        assert!(Lifecycle::Open.can_transit_to(Lifecycle::Reestablishing));
        assert!(Lifecycle::Reestablishing.can_transit_to(Lifecycle::Open));
        assert!(!Lifecycle::Open.can_transit_to(Lifecycle::Closed));
        assert!(!Lifecycle::Preopening.can_transit_to(Lifecycle::Open));
        assert!(
            !Lifecycle::Closing.can_transit_to(Lifecycle::ForceClosing)
        );
    }

    #[test]
    fn every_nonterminal_state_reaches_closed() {
        // walk the graph from every state; CLOSED must be reachable
        for stage in [
            Lifecycle::Preopening,
            Lifecycle::Opening,
            Lifecycle::Funded,
            Lifecycle::WaitingForFundingConfirmed,
            Lifecycle::WaitingForChannelReady,
            Lifecycle::Open,
            Lifecycle::Shutdown,
            Lifecycle::NegotiatingClosing,
            Lifecycle::Closing,
            Lifecycle::ForceClosing,
            Lifecycle::Reestablishing,
        ] {
            let mut frontier = vec![stage];
            let mut visited = vec![];
            let mut reaches_closed = false;
            while let Some(current) = frontier.pop() {
                if current == Lifecycle::Closed {
                    reaches_closed = true;
                    break;
                }
                if visited.contains(&current) {
                    continue;
                }
                visited.push(current);
                frontier.extend(current.allowed_transitions());
            }
            assert!(reaches_closed, "{} cannot reach CLOSED", stage);
        }
    }
}
