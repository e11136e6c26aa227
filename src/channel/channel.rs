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

//! The BOLT-2 channel state machine: opening dance, HTLC pipeline with
//! commitment/revocation exchange, cooperative and forced closure, and
//! reestablishment after reconnect.

use std::collections::VecDeque;

use amplify::{DumbDefault, Slice32, Wrapper};
use bitcoin::{OutPoint, PackedLockTime, Script, Sequence, Transaction, TxIn, TxOut, Witness};
use lnc_p2p::bolt::{
    AcceptChannel, ActiveChannelId, ChainHash, ChannelId, ChannelReady,
    ChannelReestablish, ClosingSigned, CommitmentSigned, FundingCreated,
    FundingSigned, HashLock, HashPreimage, Messages, OnionPacket,
    OpenChannel, RevokeAndAck, Shutdown, UpdateAddHtlc, UpdateFailHtlc,
    UpdateFailMalformedHtlc, UpdateFee, UpdateFulfillHtlc,
};
use secp256k1::ecdsa::Signature;
use secp256k1::{PublicKey, SecretKey, SECP256K1};

use super::htlc::{DirectionLimits, Htlc, HtlcQueues, Viewpoint};
use super::keyset::{LocalKeyset, RemoteKeyset};
use super::policy::{CommonParams, PeerParams, Policy, PolicyError};
use super::state::{ChannelState, Direction, Lifecycle};
use crate::bolt3::{
    self, funding_input_sighash, htlc_output_sighash, htlc_success_tx,
    htlc_timeout_tx, spend_funding_witness, CommitmentBuilder,
    CommitmentKeys, CommitmentTemplate, HtlcInfo, ScriptGenerators,
};
use crate::events::ChannelEvent;
use crate::keys::{
    self, derive_privkey, derive_pubkey, derive_revocation_pubkey,
    sign_hash, verify_hash_sig, ChannelSecrets,
};
use crate::secrets::{
    self, commitment_to_index, per_commitment_point, per_commitment_secret,
};

/// Channel operation errors. Protocol violations always carry enough
/// context to compose the outgoing BOLT `error` message.
#[derive(Clone, PartialEq, Eq, Debug, Display, Error, From)]
#[display(doc_comments)]
pub enum Error {
    /// Policy errors happening during channel negotiation
    #[from]
    #[display(inner)]
    Policy(PolicyError),

    /// HTLC bookkeeping error
    #[from]
    #[display(inner)]
    Htlc(super::htlc::Error),

    /// Key derivation failure
    #[from]
    #[display(inner)]
    Keys(keys::Error),

    /// Revocation secret management failure
    #[from]
    #[display(inner)]
    Secrets(secrets::Error),

    /// Commitment construction failure
    #[from]
    #[display(inner)]
    Commitment(bolt3::Error),

    /// channel is in a state {current} incompatible with the requested
    /// operation
    LifecycleMismatch {
        current: Lifecycle,
        required: &'static [Lifecycle],
    },

    /// the channel does not have a permanent channel_id assigned yet
    NoChannelId,

    /// message `{0}` is not expected in the current channel state
    UnexpectedMessage(&'static str),

    /// channel uses unknown chain {0}
    UnknownChain(ChainHash),

    /// peer signature over commitment {ctn} is invalid
    InvalidCommitmentSignature { ctn: u64 },

    /// peer signature over the second-stage transaction of HTLC output
    /// {index} is invalid
    InvalidHtlcSignature { index: usize },

    /// `commitment_signed` carries {received} HTLC signatures while the
    /// commitment has {expected} HTLC outputs
    WrongHtlcSignatureCount { expected: usize, received: usize },

    /// a `commitment_signed` is already outstanding; the peer must
    /// revoke first
    CommitmentOutstanding,

    /// `commitment_signed` must not be sent when no updates are pending
    NoUpdates,

    /// revocation secret revealed by the peer does not match its
    /// announced per-commitment point for commitment {ctn}
    InvalidRevocationSecret { ctn: u64 },

    /// received `revoke_and_ack` while no commitment was outstanding
    UnexpectedRevocation,

    /// HTLC expiry {cltv_expiry} is not beyond the current height
    /// {height}
    ExpiryTooSoon { cltv_expiry: u32, height: u32 },

    /// operation would leave {available_msat} msat, below the channel
    /// reserve of {reserve_msat} msat
    WouldDipBelowReserve {
        available_msat: u64,
        reserve_msat: u64,
    },

    /// `update_fee` received from the non-funding peer
    UpdateFeeFromFundee,

    /// closing fee of {proposed} sat proposed by the peer is not
    /// strictly between the previous offers {lower}..{upper}
    ClosingFeeOutOfBounds {
        proposed: u64,
        lower: u64,
        upper: u64,
    },

    /// peer announced commitment numbers (local {remote_next_commitment},
    /// revocation {remote_next_revocation}) which cannot be recovered
    /// from; force-closing
    ReestablishUnrecoverable {
        remote_next_commitment: u64,
        remote_next_revocation: u64,
    },

    /// shutdown script announced by the peer changed between messages
    ShutdownScriptMismatch,
}

impl Error {
    /// Whether the error is a protocol violation requiring an `error`
    /// message and channel failure, as opposed to a local precondition
    /// surfaced to the caller only.
    pub fn is_protocol_violation(&self) -> bool {
        !matches!(
            self,
            Error::ExpiryTooSoon { .. }
                | Error::WouldDipBelowReserve { .. }
                | Error::NoUpdates
                | Error::LifecycleMismatch { .. }
                | Error::NoChannelId
        )
    }
}

/// The state machine of a single BOLT channel.
///
/// The channel owns its bookkeeper, revocation store and signing secrets;
/// it communicates with the peer session only through returned messages
/// and with the application through drained [`ChannelEvent`]s. All
/// methods are synchronous: persistence and I/O happen in the owning
/// actor between calls.
#[derive(Debug)]
pub struct BoltChannel {
    state: ChannelState,
    channel_secrets: ChannelSecrets,
    events: VecDeque<ChannelEvent>,
}

impl BoltChannel {
    /// Constructs the channel for an outgoing `open_channel` proposal
    #[allow(clippy::too_many_arguments)]
    pub fn new_outbound(
        chain_hash: ChainHash,
        policy: Policy,
        common_params: CommonParams,
        local_params: PeerParams,
        channel_secrets: ChannelSecrets,
        funding_satoshis: u64,
        push_msat: u64,
        shutdown_scriptpubkey: Option<Script>,
    ) -> Result<(BoltChannel, OpenChannel), Error> {
        let local_keys = LocalKeyset::with(
            SECP256K1,
            &channel_secrets,
            shutdown_scriptpubkey,
        )?;

        let mut state = ChannelState::dumb_default();
        state.stage = Lifecycle::Opening;
        state.chain_hash = chain_hash;
        state.active_channel_id = ActiveChannelId::random();
        state.funding_satoshis = funding_satoshis;
        state.direction = Direction::Outbound;
        state.policy = policy;
        state.common_params = common_params;
        state.local_params = local_params;
        state.local_keys = local_keys.clone();
        state.per_commitment_seed = channel_secrets.per_commitment_seed;

        let temporary_channel_id = state
            .active_channel_id
            .temp_channel_id()
            .expect("freshly created channel id is temporary");

        let open_channel = OpenChannel {
            chain_hash,
            temporary_channel_id,
            funding_satoshis,
            push_msat,
            dust_limit_satoshis: local_params.dust_limit_satoshis,
            max_htlc_value_in_flight_msat: local_params
                .max_htlc_value_in_flight_msat,
            channel_reserve_satoshis: local_params.channel_reserve_satoshis,
            htlc_minimum_msat: local_params.htlc_minimum_msat,
            feerate_per_kw: common_params.feerate_per_kw,
            to_self_delay: local_params.to_self_delay,
            max_accepted_htlcs: local_params.max_accepted_htlcs,
            funding_pubkey: local_keys.funding_pubkey,
            revocation_basepoint: local_keys.revocation_basepoint,
            payment_point: local_keys.payment_basepoint,
            delayed_payment_basepoint: local_keys.delayed_payment_basepoint,
            htlc_basepoint: local_keys.htlc_basepoint,
            first_per_commitment_point: local_keys
                .first_per_commitment_point,
            channel_flags: if common_params.announce_channel {
                lnc_p2p::bolt::CHANNEL_FLAG_ANNOUNCE_CHANNEL
            } else {
                0
            },
            shutdown_scriptpubkey: local_keys.shutdown_scriptpubkey.clone(),
            channel_type: common_params.channel_type.into_option(),
        };

        let channel = BoltChannel {
            state,
            channel_secrets,
            events: VecDeque::new(),
        };
        Ok((channel, open_channel))
    }

    /// Constructs the channel in response to a received `open_channel`,
    /// validating it against local policy
    pub fn new_inbound(
        policy: Policy,
        local_params: PeerParams,
        channel_secrets: ChannelSecrets,
        open_channel: &OpenChannel,
        minimum_depth: u32,
        shutdown_scriptpubkey: Option<Script>,
    ) -> Result<(BoltChannel, AcceptChannel), Error> {
        if !open_channel.chain_hash.is_recognized() {
            return Err(Error::UnknownChain(open_channel.chain_hash));
        }
        policy.validate_inbound(open_channel)?;

        let local_keys = LocalKeyset::with(
            SECP256K1,
            &channel_secrets,
            shutdown_scriptpubkey,
        )?;

        let mut state = ChannelState::dumb_default();
        state.stage = Lifecycle::Opening;
        state.chain_hash = open_channel.chain_hash;
        state.active_channel_id =
            ActiveChannelId::Temporary(open_channel.temporary_channel_id);
        state.funding_satoshis = open_channel.funding_satoshis;
        state.direction = Direction::Inbound;
        state.policy = policy;
        state.common_params = CommonParams::with(open_channel, minimum_depth);
        state.local_params = local_params;
        state.remote_params = PeerParams::from(open_channel);
        state.local_keys = local_keys.clone();
        state.remote_keys = RemoteKeyset::from(open_channel);
        state.per_commitment_seed = channel_secrets.per_commitment_seed;
        state.remote_current_per_commitment_point =
            open_channel.first_per_commitment_point;
        state.remote_next_per_commitment_point =
            open_channel.first_per_commitment_point;
        state.htlc_queues = HtlcQueues::new(
            open_channel.push_msat,
            open_channel.funding_satoshis * 1000 - open_channel.push_msat,
            open_channel.feerate_per_kw,
            Self::direction_limits(&local_params),
            Self::direction_limits(&state.remote_params),
        );

        let accept_channel = AcceptChannel {
            temporary_channel_id: open_channel.temporary_channel_id,
            dust_limit_satoshis: local_params.dust_limit_satoshis,
            max_htlc_value_in_flight_msat: local_params
                .max_htlc_value_in_flight_msat,
            channel_reserve_satoshis: local_params.channel_reserve_satoshis,
            htlc_minimum_msat: local_params.htlc_minimum_msat,
            minimum_depth,
            to_self_delay: local_params.to_self_delay,
            max_accepted_htlcs: local_params.max_accepted_htlcs,
            funding_pubkey: local_keys.funding_pubkey,
            revocation_basepoint: local_keys.revocation_basepoint,
            payment_point: local_keys.payment_basepoint,
            delayed_payment_basepoint: local_keys.delayed_payment_basepoint,
            htlc_basepoint: local_keys.htlc_basepoint,
            first_per_commitment_point: local_keys
                .first_per_commitment_point,
            shutdown_scriptpubkey: local_keys.shutdown_scriptpubkey.clone(),
            channel_type: open_channel.channel_type,
        };

        let channel = BoltChannel {
            state,
            channel_secrets,
            events: VecDeque::new(),
        };
        Ok((channel, accept_channel))
    }

    fn direction_limits(params: &PeerParams) -> DirectionLimits {
        DirectionLimits {
            htlc_minimum_msat: params.htlc_minimum_msat,
            max_accepted_htlcs: params.max_accepted_htlcs,
            max_htlc_value_in_flight_msat: params
                .max_htlc_value_in_flight_msat,
        }
    }

    /// Read access to the full channel state (for persistence)
    #[inline]
    pub fn state(&self) -> &ChannelState {
        &self.state
    }

    /// Restores a channel from its persisted state
    pub fn restore(
        state: ChannelState,
        channel_secrets: ChannelSecrets,
    ) -> BoltChannel {
        BoltChannel {
            state,
            channel_secrets,
            events: VecDeque::new(),
        }
    }

    /// The id the channel is currently addressed by
    #[inline]
    pub fn active_channel_id(&self) -> ActiveChannelId {
        self.state.active_channel_id
    }

    /// The final channel id, available once funding is set
    #[inline]
    pub fn channel_id(&self) -> Result<ChannelId, Error> {
        self.state
            .active_channel_id
            .channel_id()
            .ok_or(Error::NoChannelId)
    }

    #[inline]
    pub fn stage(&self) -> Lifecycle {
        self.state.stage
    }

    /// Whether the channel is usable for payments
    #[inline]
    pub fn is_active(&self) -> bool {
        self.state.stage == Lifecycle::Open
    }

    /// Local balance in millisatoshi at the latest local commitment
    pub fn local_balance_msat(&self) -> u64 {
        let queues = &self.state.htlc_queues;
        queues.balance_in_view(
            Viewpoint::Local,
            Viewpoint::Local,
            queues.ctn(Viewpoint::Local),
        )
    }

    /// Remote balance in millisatoshi at the latest local commitment
    pub fn remote_balance_msat(&self) -> u64 {
        let queues = &self.state.htlc_queues;
        queues.balance_in_view(
            Viewpoint::Remote,
            Viewpoint::Local,
            queues.ctn(Viewpoint::Local),
        )
    }

    /// Takes the events produced since the last drain
    pub fn drain_events(&mut self) -> Vec<ChannelEvent> {
        self.events.drain(..).collect()
    }

    fn transition(&mut self, target: Lifecycle) -> Result<(), Error> {
        if !self.state.stage.can_transit_to(target) {
            return Err(Error::LifecycleMismatch {
                current: self.state.stage,
                required: &[],
            });
        }
        trace!(
            "channel {} transitions {} -> {}",
            self.state.active_channel_id,
            self.state.stage,
            target
        );
        self.state.stage = target;
        self.events.push_back(ChannelEvent::StageChanged {
            channel_id: self.state.active_channel_id.as_slice32(),
            stage: target,
        });
        Ok(())
    }

    fn require_stage(
        &self,
        required: &'static [Lifecycle],
    ) -> Result<(), Error> {
        if !required.contains(&self.state.stage) {
            return Err(Error::LifecycleMismatch {
                current: self.state.stage,
                required,
            });
        }
        Ok(())
    }

    fn anchors(&self) -> bool {
        self.state.common_params.channel_type.has_anchors()
    }

    fn funding_script(&self) -> Script {
        Script::ln_funding(
            self.state.funding_satoshis,
            self.state.local_keys.funding_pubkey,
            self.state.remote_keys.funding_pubkey,
        )
    }

    fn obscuring_factor(&self) -> u64 {
        // the open_channel sender's payment basepoint comes first
        let (open_bp, accept_bp) = match self.state.direction {
            Direction::Outbound => (
                self.state.local_keys.payment_basepoint,
                self.state.remote_keys.payment_basepoint,
            ),
            Direction::Inbound => (
                self.state.remote_keys.payment_basepoint,
                self.state.local_keys.payment_basepoint,
            ),
        };
        bolt3::obscuring_factor(&open_bp, &accept_bp)
    }

    fn commitment_builder(&self, owner: Viewpoint) -> CommitmentBuilder {
        let funder_side = match self.state.direction {
            Direction::Outbound => Viewpoint::Local,
            Direction::Inbound => Viewpoint::Remote,
        };
        let (dust_limit, to_self_delay) = match owner {
            // each side's own dust limit applies to its commitment; the
            // CSV delay is the one demanded by the other side
            Viewpoint::Local => (
                self.state.local_params.dust_limit_satoshis,
                self.state.remote_params.to_self_delay,
            ),
            Viewpoint::Remote => (
                self.state.remote_params.dust_limit_satoshis,
                self.state.local_params.to_self_delay,
            ),
        };
        let (local_funding, remote_funding) = match owner {
            Viewpoint::Local => (
                self.state.local_keys.funding_pubkey,
                self.state.remote_keys.funding_pubkey,
            ),
            Viewpoint::Remote => (
                self.state.remote_keys.funding_pubkey,
                self.state.local_keys.funding_pubkey,
            ),
        };
        CommitmentBuilder {
            funding_outpoint: self.state.funding_outpoint,
            funding_amount: self.state.funding_satoshis,
            obscuring_factor: self.obscuring_factor(),
            dust_limit,
            to_self_delay,
            owner_is_funder: owner == funder_side,
            anchors: self.anchors(),
            local_funding_pubkey: local_funding,
            remote_funding_pubkey: remote_funding,
        }
    }

    fn commitment_keys(
        &self,
        owner: Viewpoint,
        per_commitment_point: &PublicKey,
    ) -> Result<CommitmentKeys, Error> {
        let (owner_keys, other_keys): (
            &dyn BasepointSource,
            &dyn BasepointSource,
        ) = match owner {
            Viewpoint::Local => {
                (&self.state.local_keys, &self.state.remote_keys)
            }
            Viewpoint::Remote => {
                (&self.state.remote_keys, &self.state.local_keys)
            }
        };
        Ok(CommitmentKeys {
            revocation_pubkey: derive_revocation_pubkey(
                SECP256K1,
                &other_keys.revocation_basepoint(),
                per_commitment_point,
            )?,
            local_delayed_pubkey: derive_pubkey(
                SECP256K1,
                &owner_keys.delayed_payment_basepoint(),
                per_commitment_point,
            )?,
            // static_remotekey: to_remote pays directly to the other
            // side's payment basepoint
            remote_payment_key: other_keys.payment_basepoint(),
            local_htlc_pubkey: derive_pubkey(
                SECP256K1,
                &owner_keys.htlc_basepoint(),
                per_commitment_point,
            )?,
            remote_htlc_pubkey: derive_pubkey(
                SECP256K1,
                &other_keys.htlc_basepoint(),
                per_commitment_point,
            )?,
        })
    }

    fn local_point(&self, ctn: u64) -> Result<PublicKey, Error> {
        let index = commitment_to_index(ctn);
        let secret = per_commitment_secret(
            self.state.per_commitment_seed,
            index,
        )?;
        Ok(per_commitment_point(SECP256K1, secret, index)?)
    }

    fn build_commitment(
        &self,
        owner: Viewpoint,
        ctn: u64,
        per_commitment_point: &PublicKey,
    ) -> Result<CommitmentTemplate, Error> {
        let queues = &self.state.htlc_queues;
        let keys = self.commitment_keys(owner, per_commitment_point)?;
        let htlcs: Vec<HtlcInfo> = queues
            .htlcs_in_view(owner, ctn)
            .into_iter()
            .map(|(offerer, htlc)| HtlcInfo {
                id: htlc.id,
                offered: offerer == owner,
                amount_msat: htlc.amount_msat,
                payment_hash: htlc.payment_hash,
                cltv_expiry: htlc.cltv_expiry,
            })
            .collect();
        let to_local =
            queues.balance_in_view(owner, owner, ctn);
        let to_remote =
            queues.balance_in_view(owner.other(), owner, ctn);
        Ok(self.commitment_builder(owner).build(
            ctn,
            to_local,
            to_remote,
            queues.feerate_in_view(owner, ctn),
            &keys,
            &htlcs,
        )?)
    }

    // ========================================================= opening

    /// Processes the peer's `accept_channel` answer to our proposal
    pub fn recv_accept_channel(
        &mut self,
        accept_channel: &AcceptChannel,
        open_channel: &OpenChannel,
    ) -> Result<(), Error> {
        self.require_stage(&[Lifecycle::Opening])?;
        self.state
            .policy
            .validate_outbound(open_channel, accept_channel)?;
        self.state.common_params.minimum_depth =
            accept_channel.minimum_depth;
        self.state.remote_params = PeerParams::from(accept_channel);
        self.state.remote_keys = RemoteKeyset::from(accept_channel);
        self.state.remote_current_per_commitment_point =
            accept_channel.first_per_commitment_point;
        self.state.remote_next_per_commitment_point =
            accept_channel.first_per_commitment_point;
        self.state.htlc_queues = HtlcQueues::new(
            open_channel.funding_satoshis * 1000 - open_channel.push_msat,
            open_channel.push_msat,
            open_channel.feerate_per_kw,
            Self::direction_limits(&self.state.local_params),
            Self::direction_limits(&self.state.remote_params),
        );
        Ok(())
    }

    /// Called by the funder once the external wallet has constructed the
    /// funding transaction; signs the peer's first commitment.
    pub fn funding_constructed(
        &mut self,
        funding_txid: bitcoin::Txid,
        funding_output_index: u16,
    ) -> Result<FundingCreated, Error> {
        self.require_stage(&[Lifecycle::Opening])?;
        let temporary_channel_id = self
            .state
            .active_channel_id
            .temp_channel_id()
            .ok_or(Error::NoChannelId)?;

        self.state.funding_outpoint = OutPoint {
            txid: funding_txid,
            vout: funding_output_index as u32,
        };

        let remote_point = self.state.remote_current_per_commitment_point;
        let template =
            self.build_commitment(Viewpoint::Remote, 0, &remote_point)?;
        let sighash = funding_input_sighash(
            &template.tx,
            &self.funding_script(),
            self.state.funding_satoshis,
        );
        let signature = sign_hash(
            SECP256K1,
            sighash,
            &self.channel_secrets.funding_key,
        );

        self.transition(Lifecycle::Funded)?;
        Ok(FundingCreated {
            temporary_channel_id,
            funding_txid,
            funding_output_index,
            signature,
        })
    }

    /// Acceptor side: verifies the funder's signature over our first
    /// commitment and signs theirs
    pub fn recv_funding_created(
        &mut self,
        funding_created: &FundingCreated,
    ) -> Result<FundingSigned, Error> {
        self.require_stage(&[Lifecycle::Opening])?;

        self.state.funding_outpoint = OutPoint {
            txid: funding_created.funding_txid,
            vout: funding_created.funding_output_index as u32,
        };

        // their signature covers our commitment 0
        let local_point = self.local_point(0)?;
        let local_template =
            self.build_commitment(Viewpoint::Local, 0, &local_point)?;
        let sighash = funding_input_sighash(
            &local_template.tx,
            &self.funding_script(),
            self.state.funding_satoshis,
        );
        if !verify_hash_sig(
            SECP256K1,
            sighash,
            &funding_created.signature,
            &self.state.remote_keys.funding_pubkey,
        ) {
            return Err(Error::InvalidCommitmentSignature { ctn: 0 });
        }
        self.state.remote_commitment_sig =
            Some(funding_created.signature);

        // our signature covers their commitment 0
        let remote_point = self.state.remote_current_per_commitment_point;
        let remote_template =
            self.build_commitment(Viewpoint::Remote, 0, &remote_point)?;
        let remote_sighash = funding_input_sighash(
            &remote_template.tx,
            &self.funding_script(),
            self.state.funding_satoshis,
        );
        let signature = sign_hash(
            SECP256K1,
            remote_sighash,
            &self.channel_secrets.funding_key,
        );

        let channel_id = ChannelId::with(self.state.funding_outpoint);
        self.state.active_channel_id = ActiveChannelId::Static(channel_id);
        self.transition(Lifecycle::Funded)?;
        self.transition(Lifecycle::WaitingForFundingConfirmed)?;

        Ok(FundingSigned {
            channel_id,
            signature,
        })
    }

    /// Funder side: verifies the acceptor's signature over our first
    /// commitment; the funding transaction may now be broadcast.
    pub fn recv_funding_signed(
        &mut self,
        funding_signed: &FundingSigned,
    ) -> Result<(), Error> {
        self.require_stage(&[Lifecycle::Funded])?;

        let channel_id = ChannelId::with(self.state.funding_outpoint);
        if funding_signed.channel_id != channel_id {
            return Err(Error::UnexpectedMessage("funding_signed"));
        }

        let local_point = self.local_point(0)?;
        let template =
            self.build_commitment(Viewpoint::Local, 0, &local_point)?;
        let sighash = funding_input_sighash(
            &template.tx,
            &self.funding_script(),
            self.state.funding_satoshis,
        );
        if !verify_hash_sig(
            SECP256K1,
            sighash,
            &funding_signed.signature,
            &self.state.remote_keys.funding_pubkey,
        ) {
            return Err(Error::InvalidCommitmentSignature { ctn: 0 });
        }
        self.state.remote_commitment_sig = Some(funding_signed.signature);
        self.state.active_channel_id = ActiveChannelId::Static(channel_id);
        self.transition(Lifecycle::WaitingForFundingConfirmed)?;
        Ok(())
    }

    /// Called when the chain client reports `minimum_depth`
    /// confirmations of the funding transaction
    pub fn funding_confirmed(&mut self) -> Result<ChannelReady, Error> {
        self.require_stage(&[Lifecycle::WaitingForFundingConfirmed])?;
        self.transition(Lifecycle::WaitingForChannelReady)?;
        self.state.local_channel_ready = true;
        let channel_ready = ChannelReady {
            channel_id: self.channel_id()?,
            next_per_commitment_point: self.local_point(1)?,
            alias: None,
        };
        self.maybe_activate()?;
        Ok(channel_ready)
    }

    /// Processes the peer's `channel_ready`
    pub fn recv_channel_ready(
        &mut self,
        channel_ready: &ChannelReady,
    ) -> Result<(), Error> {
        self.require_stage(&[
            Lifecycle::WaitingForFundingConfirmed,
            Lifecycle::WaitingForChannelReady,
        ])?;
        self.state.remote_channel_ready = true;
        self.state.remote_next_per_commitment_point =
            channel_ready.next_per_commitment_point;
        self.maybe_activate()
    }

    fn maybe_activate(&mut self) -> Result<(), Error> {
        if self.state.local_channel_ready
            && self.state.remote_channel_ready
            && self.state.stage == Lifecycle::WaitingForChannelReady
        {
            self.transition(Lifecycle::Open)?;
            self.events.push_back(ChannelEvent::Active {
                channel_id: self.channel_id()?,
            });
        }
        Ok(())
    }

    // ======================================================= operating

    fn check_reserve_for_send(
        &self,
        amount_msat: u64,
    ) -> Result<(), Error> {
        let queues = &self.state.htlc_queues;
        let balance = queues.balance_in_view(
            Viewpoint::Local,
            Viewpoint::Remote,
            queues.ctn(Viewpoint::Remote) + 1,
        );
        let pending =
            queues.pending_unassigned_msat(Viewpoint::Local);
        let reserve_msat =
            self.state.remote_params.channel_reserve_satoshis * 1000;
        let fee_msat = if self.state.direction.is_outbound() {
            let feerate = queues.feerate_in_view(
                Viewpoint::Remote,
                queues.ctn(Viewpoint::Remote) + 1,
            );
            bolt3::commit_tx_fee(feerate, 1, self.anchors()) * 1000
        } else {
            0
        };
        let required = amount_msat + reserve_msat + fee_msat;
        let available = balance.saturating_sub(pending);
        if available < required {
            return Err(Error::WouldDipBelowReserve {
                available_msat: available.saturating_sub(amount_msat),
                reserve_msat: reserve_msat + fee_msat,
            });
        }
        Ok(())
    }

    /// Offers an HTLC to the peer
    pub fn send_htlc(
        &mut self,
        amount_msat: u64,
        payment_hash: HashLock,
        cltv_expiry: u32,
        onion: OnionPacket,
        current_height: u32,
    ) -> Result<UpdateAddHtlc, Error> {
        self.require_stage(&[Lifecycle::Open])?;
        if cltv_expiry <= current_height {
            return Err(Error::ExpiryTooSoon {
                cltv_expiry,
                height: current_height,
            });
        }
        self.check_reserve_for_send(amount_msat)?;
        let htlc_id = self.state.htlc_queues.send_add(
            amount_msat,
            payment_hash,
            cltv_expiry,
            onion,
        )?;
        Ok(UpdateAddHtlc {
            channel_id: self.channel_id()?,
            htlc_id,
            amount_msat,
            payment_hash,
            cltv_expiry,
            onion_routing_packet: onion,
        })
    }

    /// Processes an HTLC offered by the peer
    pub fn recv_htlc(
        &mut self,
        update_add: &UpdateAddHtlc,
    ) -> Result<(), Error> {
        self.require_stage(&[Lifecycle::Open])?;
        // the peer dipping below its own reserve is a protocol error
        let queues = &self.state.htlc_queues;
        let their_balance = queues.balance_in_view(
            Viewpoint::Remote,
            Viewpoint::Local,
            queues.ctn(Viewpoint::Local) + 1,
        );
        let their_pending =
            queues.pending_unassigned_msat(Viewpoint::Remote);
        let reserve_msat =
            self.state.local_params.channel_reserve_satoshis * 1000;
        if their_balance
            .saturating_sub(their_pending)
            .saturating_sub(update_add.amount_msat)
            < reserve_msat
        {
            return Err(Error::WouldDipBelowReserve {
                available_msat: their_balance
                    .saturating_sub(their_pending)
                    .saturating_sub(update_add.amount_msat),
                reserve_msat,
            });
        }
        self.state.htlc_queues.recv_add(Htlc {
            id: update_add.htlc_id,
            amount_msat: update_add.amount_msat,
            payment_hash: update_add.payment_hash,
            cltv_expiry: update_add.cltv_expiry,
            onion: update_add.onion_routing_packet,
        })?;
        Ok(())
    }

    /// Settles a received HTLC by revealing its preimage
    pub fn settle_htlc(
        &mut self,
        htlc_id: u64,
        payment_preimage: HashPreimage,
    ) -> Result<UpdateFulfillHtlc, Error> {
        self.require_stage(&[Lifecycle::Open, Lifecycle::Shutdown])?;
        self.state
            .htlc_queues
            .send_settle(htlc_id, payment_preimage)?;
        Ok(UpdateFulfillHtlc {
            channel_id: self.channel_id()?,
            htlc_id,
            payment_preimage,
        })
    }

    /// Fails a received HTLC
    pub fn fail_htlc(
        &mut self,
        htlc_id: u64,
        reason: Vec<u8>,
    ) -> Result<UpdateFailHtlc, Error> {
        self.require_stage(&[Lifecycle::Open, Lifecycle::Shutdown])?;
        self.state.htlc_queues.send_fail(htlc_id)?;
        Ok(UpdateFailHtlc {
            channel_id: self.channel_id()?,
            htlc_id,
            reason,
        })
    }

    /// Processes the peer settling one of our HTLCs
    pub fn recv_htlc_fulfill(
        &mut self,
        fulfill: &UpdateFulfillHtlc,
    ) -> Result<(), Error> {
        self.require_stage(&[Lifecycle::Open, Lifecycle::Shutdown])?;
        self.state
            .htlc_queues
            .recv_settle(fulfill.htlc_id, fulfill.payment_preimage)?;
        self.events.push_back(ChannelEvent::HtlcSettled {
            channel_id: self.channel_id()?,
            htlc_id: fulfill.htlc_id,
            preimage: fulfill.payment_preimage,
        });
        Ok(())
    }

    /// Processes the peer failing one of our HTLCs
    pub fn recv_htlc_fail(
        &mut self,
        fail: &UpdateFailHtlc,
    ) -> Result<(), Error> {
        self.require_stage(&[Lifecycle::Open, Lifecycle::Shutdown])?;
        self.state.htlc_queues.recv_fail(fail.htlc_id)?;
        self.events.push_back(ChannelEvent::HtlcFailed {
            channel_id: self.channel_id()?,
            htlc_id: fail.htlc_id,
            reason: fail.reason.clone(),
        });
        Ok(())
    }

    /// Processes a malformed-HTLC report from the peer; treated as a
    /// fail
    pub fn recv_htlc_fail_malformed(
        &mut self,
        fail: &UpdateFailMalformedHtlc,
    ) -> Result<(), Error> {
        self.require_stage(&[Lifecycle::Open, Lifecycle::Shutdown])?;
        self.state.htlc_queues.recv_fail(fail.htlc_id)?;
        self.events.push_back(ChannelEvent::HtlcFailed {
            channel_id: self.channel_id()?,
            htlc_id: fail.htlc_id,
            reason: vec![],
        });
        Ok(())
    }

    /// Proposes a fee rate change; only the funder may do this
    pub fn send_update_fee(
        &mut self,
        feerate_per_kw: u32,
    ) -> Result<UpdateFee, Error> {
        self.require_stage(&[Lifecycle::Open])?;
        if !self.state.direction.is_outbound() {
            return Err(Error::UpdateFeeFromFundee);
        }
        self.check_fee_affordable(feerate_per_kw)?;
        self.state.htlc_queues.add_fee_update(feerate_per_kw);
        Ok(UpdateFee {
            channel_id: self.channel_id()?,
            feerate_per_kw,
        })
    }

    /// Processes a fee rate change from the funding peer
    pub fn recv_update_fee(
        &mut self,
        update_fee: &UpdateFee,
    ) -> Result<(), Error> {
        self.require_stage(&[Lifecycle::Open])?;
        if self.state.direction.is_outbound() {
            return Err(Error::UpdateFeeFromFundee);
        }
        self.check_fee_affordable(update_fee.feerate_per_kw)?;
        self.state
            .htlc_queues
            .add_fee_update(update_fee.feerate_per_kw);
        Ok(())
    }

    // The funder must afford the new fee on top of its reserve at the
    // prospective HTLC count.
    fn check_fee_affordable(
        &self,
        feerate_per_kw: u32,
    ) -> Result<(), Error> {
        let queues = &self.state.htlc_queues;
        let funder = match self.state.direction {
            Direction::Outbound => Viewpoint::Local,
            Direction::Inbound => Viewpoint::Remote,
        };
        let ctn = queues.ctn(Viewpoint::Local) + 1;
        let htlc_count =
            queues.htlcs_in_view(Viewpoint::Local, ctn).len();
        let fee_msat =
            bolt3::commit_tx_fee(feerate_per_kw, htlc_count, self.anchors())
                * 1000;
        let reserve_msat = match funder {
            Viewpoint::Local => {
                self.state.remote_params.channel_reserve_satoshis * 1000
            }
            Viewpoint::Remote => {
                self.state.local_params.channel_reserve_satoshis * 1000
            }
        };
        let balance =
            queues.balance_in_view(funder, Viewpoint::Local, ctn);
        if balance < fee_msat + reserve_msat {
            return Err(Error::WouldDipBelowReserve {
                available_msat: balance.saturating_sub(fee_msat),
                reserve_msat,
            });
        }
        Ok(())
    }

    /// Signs the peer's next commitment covering all pending updates
    pub fn send_commitment(
        &mut self,
    ) -> Result<CommitmentSigned, Error> {
        self.require_stage(&[
            Lifecycle::Open,
            Lifecycle::Shutdown,
            Lifecycle::Reestablishing,
        ])?;
        if self.state.awaiting_revoke {
            return Err(Error::CommitmentOutstanding);
        }
        if !self
            .state
            .htlc_queues
            .has_pending_updates(Viewpoint::Remote)
        {
            return Err(Error::NoUpdates);
        }
        self.state.htlc_queues.send_commitment();
        self.state.awaiting_revoke = true;
        self.compose_commitment_signed()
    }

    // Builds and signs the peer's commitment at `ctn_remote + 1`;
    // separated from `send_commitment` so reestablishment can retransmit
    // the identical message.
    fn compose_commitment_signed(
        &self,
    ) -> Result<CommitmentSigned, Error> {
        let queues = &self.state.htlc_queues;
        let ctn = queues.ctn(Viewpoint::Remote) + 1;
        let remote_point = self.state.remote_next_per_commitment_point;
        let template =
            self.build_commitment(Viewpoint::Remote, ctn, &remote_point)?;

        let sighash = funding_input_sighash(
            &template.tx,
            &self.funding_script(),
            self.state.funding_satoshis,
        );
        let signature = sign_hash(
            SECP256K1,
            sighash,
            &self.channel_secrets.funding_key,
        );

        let htlc_privkey = derive_privkey(
            SECP256K1,
            &self.channel_secrets.htlc_basepoint_secret,
            &remote_point,
        )?;
        let htlc_signatures = self.sign_htlc_transactions(
            &template,
            Viewpoint::Remote,
            &remote_point,
            &htlc_privkey,
        )?;

        Ok(CommitmentSigned {
            channel_id: self.channel_id()?,
            signature,
            htlc_signatures,
        })
    }

    // Signatures over the second-stage transactions of each HTLC output
    // of `owner`'s commitment, in output order.
    fn sign_htlc_transactions(
        &self,
        template: &CommitmentTemplate,
        owner: Viewpoint,
        per_commitment_point: &PublicKey,
        htlc_privkey: &SecretKey,
    ) -> Result<Vec<Signature>, Error> {
        let keys = self.commitment_keys(owner, per_commitment_point)?;
        let to_self_delay = match owner {
            Viewpoint::Local => self.state.remote_params.to_self_delay,
            Viewpoint::Remote => self.state.local_params.to_self_delay,
        };
        let feerate = self
            .state
            .htlc_queues
            .feerate_in_view(owner, self.state.htlc_queues.ctn(owner) + 1);
        let commitment_txid = template.tx.txid();

        let mut signatures = Vec::with_capacity(template.htlc_outputs.len());
        for htlc_output in &template.htlc_outputs {
            let second_stage = if htlc_output.htlc.offered {
                htlc_timeout_tx(
                    commitment_txid,
                    htlc_output,
                    feerate,
                    keys.revocation_pubkey,
                    keys.local_delayed_pubkey,
                    to_self_delay,
                    self.anchors(),
                )
            } else {
                htlc_success_tx(
                    commitment_txid,
                    htlc_output,
                    feerate,
                    keys.revocation_pubkey,
                    keys.local_delayed_pubkey,
                    to_self_delay,
                    self.anchors(),
                )
            };
            let sighash = htlc_output_sighash(
                &second_stage,
                0,
                &htlc_output.witness_script,
                htlc_output.htlc.amount_msat / 1000,
            );
            signatures.push(sign_hash(SECP256K1, sighash, htlc_privkey));
        }
        Ok(signatures)
    }

    /// Verifies a received `commitment_signed` over our next commitment
    /// and replies with the revocation of the previous one
    pub fn recv_commitment(
        &mut self,
        commitment_signed: &CommitmentSigned,
    ) -> Result<RevokeAndAck, Error> {
        self.require_stage(&[
            Lifecycle::Open,
            Lifecycle::Shutdown,
            Lifecycle::Reestablishing,
        ])?;

        let queues = &self.state.htlc_queues;
        let old_ctn = queues.ctn(Viewpoint::Local);
        let new_ctn = old_ctn + 1;

        // verify against the prospective local commitment including every
        // update seen so far
        let mut prospective = self.state.htlc_queues.clone();
        prospective.recv_commitment();
        let local_point = self.local_point(new_ctn)?;
        let keys =
            self.commitment_keys(Viewpoint::Local, &local_point)?;
        let htlcs: Vec<HtlcInfo> = prospective
            .htlcs_in_view(Viewpoint::Local, new_ctn)
            .into_iter()
            .map(|(offerer, htlc)| HtlcInfo {
                id: htlc.id,
                offered: offerer == Viewpoint::Local,
                amount_msat: htlc.amount_msat,
                payment_hash: htlc.payment_hash,
                cltv_expiry: htlc.cltv_expiry,
            })
            .collect();
        let template = self.commitment_builder(Viewpoint::Local).build(
            new_ctn,
            prospective.balance_in_view(
                Viewpoint::Local,
                Viewpoint::Local,
                new_ctn,
            ),
            prospective.balance_in_view(
                Viewpoint::Remote,
                Viewpoint::Local,
                new_ctn,
            ),
            prospective.feerate_in_view(Viewpoint::Local, new_ctn),
            &keys,
            &htlcs,
        )?;

        let sighash = funding_input_sighash(
            &template.tx,
            &self.funding_script(),
            self.state.funding_satoshis,
        );
        if !verify_hash_sig(
            SECP256K1,
            sighash,
            &commitment_signed.signature,
            &self.state.remote_keys.funding_pubkey,
        ) {
            return Err(Error::InvalidCommitmentSignature { ctn: new_ctn });
        }

        if commitment_signed.htlc_signatures.len()
            != template.htlc_outputs.len()
        {
            return Err(Error::WrongHtlcSignatureCount {
                expected: template.htlc_outputs.len(),
                received: commitment_signed.htlc_signatures.len(),
            });
        }
        let remote_htlc_pubkey = keys.remote_htlc_pubkey;
        let to_self_delay = self.state.remote_params.to_self_delay;
        let feerate =
            prospective.feerate_in_view(Viewpoint::Local, new_ctn);
        let commitment_txid = template.tx.txid();
        for (index, (htlc_output, signature)) in template
            .htlc_outputs
            .iter()
            .zip(&commitment_signed.htlc_signatures)
            .enumerate()
        {
            let second_stage = if htlc_output.htlc.offered {
                htlc_timeout_tx(
                    commitment_txid,
                    htlc_output,
                    feerate,
                    keys.revocation_pubkey,
                    keys.local_delayed_pubkey,
                    to_self_delay,
                    self.anchors(),
                )
            } else {
                htlc_success_tx(
                    commitment_txid,
                    htlc_output,
                    feerate,
                    keys.revocation_pubkey,
                    keys.local_delayed_pubkey,
                    to_self_delay,
                    self.anchors(),
                )
            };
            let htlc_sighash = htlc_output_sighash(
                &second_stage,
                0,
                &htlc_output.witness_script,
                htlc_output.htlc.amount_msat / 1000,
            );
            if !verify_hash_sig(
                SECP256K1,
                htlc_sighash,
                signature,
                &remote_htlc_pubkey,
            ) {
                return Err(Error::InvalidHtlcSignature { index });
            }
        }

        // all signatures valid: atomically advance the local state
        self.state.htlc_queues = prospective;
        self.state.remote_commitment_sig =
            Some(commitment_signed.signature);
        self.state.remote_htlc_sigs =
            commitment_signed.htlc_signatures.clone();
        self.state.htlc_queues.send_revoke();

        self.compose_revoke(old_ctn)
    }

    // Reveals the secret of `revoked_ctn` and announces the point for
    // `revoked_ctn + 2`.
    fn compose_revoke(
        &self,
        revoked_ctn: u64,
    ) -> Result<RevokeAndAck, Error> {
        let index = commitment_to_index(revoked_ctn);
        let secret = per_commitment_secret(
            self.state.per_commitment_seed,
            index,
        )?;
        let per_commitment_secret =
            SecretKey::from_slice(secret.as_inner())
                .expect("tree-derived secrets are valid scalars");
        Ok(RevokeAndAck {
            channel_id: self.channel_id()?,
            per_commitment_secret,
            next_per_commitment_point: self
                .local_point(revoked_ctn + 2)?,
        })
    }

    /// Verifies the peer's revocation of its previous commitment
    pub fn recv_revoke(
        &mut self,
        revoke: &RevokeAndAck,
    ) -> Result<(), Error> {
        self.require_stage(&[
            Lifecycle::Open,
            Lifecycle::Shutdown,
            Lifecycle::Reestablishing,
        ])?;
        if !self.state.awaiting_revoke {
            return Err(Error::UnexpectedRevocation);
        }
        let revoked_ctn = self.state.htlc_queues.ctn(Viewpoint::Remote);
        let index = commitment_to_index(revoked_ctn);
        let secret =
            Slice32::from_inner(revoke.per_commitment_secret.secret_bytes());

        // the revealed secret must match the commitment point the peer
        // used for the revoked commitment
        let revealed_point = per_commitment_point(
            SECP256K1,
            secret,
            index,
        )?;
        if revealed_point
            != self.state.remote_current_per_commitment_point
        {
            return Err(Error::InvalidRevocationSecret {
                ctn: revoked_ctn,
            });
        }

        self.state.revocation_store.insert(index, secret)?;
        self.state.htlc_queues.recv_revoke();
        self.state.remote_current_per_commitment_point =
            self.state.remote_next_per_commitment_point;
        self.state.remote_next_per_commitment_point =
            revoke.next_per_commitment_point;
        self.state.awaiting_revoke = false;

        self.events.push_back(ChannelEvent::Revoked {
            channel_id: self.channel_id()?,
            ctn: revoked_ctn,
            secret,
        });
        self.events.push_back(ChannelEvent::BalanceChanged {
            channel_id: self.channel_id()?,
            local_msat: self.local_balance_msat(),
            remote_msat: self.remote_balance_msat(),
        });
        Ok(())
    }

    // ==================================================== cooperative close

    /// Initiates (or acknowledges) a cooperative shutdown
    pub fn shutdown(
        &mut self,
        scriptpubkey: Script,
    ) -> Result<Shutdown, Error> {
        self.require_stage(&[Lifecycle::Open, Lifecycle::Shutdown])?;
        if self.state.stage == Lifecycle::Open {
            self.transition(Lifecycle::Shutdown)?;
        }
        self.state.closing.local_shutdown_script =
            Some(scriptpubkey.clone());
        Ok(Shutdown {
            channel_id: self.channel_id()?,
            scriptpubkey,
        })
    }

    /// Processes the peer's `shutdown`; replies with our own shutdown
    /// when we have not sent one yet, and starts fee negotiation when
    /// the channel is drained and we are the funder.
    pub fn recv_shutdown(
        &mut self,
        shutdown: &Shutdown,
        local_script: Script,
    ) -> Result<Vec<Messages>, Error> {
        self.require_stage(&[Lifecycle::Open, Lifecycle::Shutdown])?;
        if let Some(ref previous) =
            self.state.closing.remote_shutdown_script
        {
            if previous != &shutdown.scriptpubkey {
                return Err(Error::ShutdownScriptMismatch);
            }
        }
        if let Some(ref upfront) =
            self.state.remote_keys.shutdown_scriptpubkey
        {
            if upfront != &shutdown.scriptpubkey {
                return Err(Error::ShutdownScriptMismatch);
            }
        }
        self.state.closing.remote_shutdown_script =
            Some(shutdown.scriptpubkey.clone());

        let mut replies = vec![];
        if self.state.closing.local_shutdown_script.is_none() {
            replies
                .push(Messages::Shutdown(self.shutdown(local_script)?));
        } else if self.state.stage == Lifecycle::Open {
            self.transition(Lifecycle::Shutdown)?;
        }
        replies.extend(self.maybe_start_closing()?);
        Ok(replies)
    }

    /// Called after HTLC resolution progress to begin fee negotiation
    /// once the channel is drained
    pub fn maybe_start_closing(
        &mut self,
    ) -> Result<Vec<Messages>, Error> {
        let queues = &self.state.htlc_queues;
        let drained = queues
            .htlcs_in_view(
                Viewpoint::Local,
                queues.ctn(Viewpoint::Local),
            )
            .is_empty()
            && queues
                .htlcs_in_view(
                    Viewpoint::Remote,
                    queues.ctn(Viewpoint::Remote),
                )
                .is_empty();
        if self.state.stage != Lifecycle::Shutdown
            || !drained
            || self.state.closing.local_shutdown_script.is_none()
            || self.state.closing.remote_shutdown_script.is_none()
        {
            return Ok(vec![]);
        }
        self.transition(Lifecycle::NegotiatingClosing)?;
        if !self.state.direction.is_outbound() {
            // the funder sends the first closing_signed
            return Ok(vec![]);
        }
        let feerate = self
            .state
            .htlc_queues
            .feerate_in_view(
                Viewpoint::Local,
                self.state.htlc_queues.ctn(Viewpoint::Local),
            );
        // closing tx is ~724 WU less HTLC machinery; reuse base weight
        let fee = bolt3::weight_to_fee(
            bolt3::BASE_COMMITMENT_WEIGHT,
            feerate,
        );
        let closing_signed = self.compose_closing_signed(fee)?;
        self.state.closing.last_fee_proposed = Some(fee);
        Ok(vec![Messages::ClosingSigned(closing_signed)])
    }

    fn closing_tx(&self, fee: u64) -> Result<Transaction, Error> {
        let queues = &self.state.htlc_queues;
        let ctn = queues.ctn(Viewpoint::Local);
        let mut local_msat = queues.balance_in_view(
            Viewpoint::Local,
            Viewpoint::Local,
            ctn,
        );
        let mut remote_msat = queues.balance_in_view(
            Viewpoint::Remote,
            Viewpoint::Local,
            ctn,
        );
        if self.state.direction.is_outbound() {
            local_msat = local_msat.saturating_sub(fee * 1000);
        } else {
            remote_msat = remote_msat.saturating_sub(fee * 1000);
        }

        let local_script = self
            .state
            .closing
            .local_shutdown_script
            .clone()
            .ok_or(Error::UnexpectedMessage("closing_signed"))?;
        let remote_script = self
            .state
            .closing
            .remote_shutdown_script
            .clone()
            .ok_or(Error::UnexpectedMessage("closing_signed"))?;

        let dust = self
            .state
            .local_params
            .dust_limit_satoshis
            .max(self.state.remote_params.dust_limit_satoshis);
        let mut outputs = vec![];
        if local_msat / 1000 > dust {
            outputs.push(TxOut {
                value: local_msat / 1000,
                script_pubkey: local_script,
            });
        }
        if remote_msat / 1000 > dust {
            outputs.push(TxOut {
                value: remote_msat / 1000,
                script_pubkey: remote_script,
            });
        }
        outputs.sort_by(|a, b| {
            a.value.cmp(&b.value).then_with(|| {
                a.script_pubkey
                    .as_bytes()
                    .cmp(b.script_pubkey.as_bytes())
            })
        });

        Ok(Transaction {
            version: bolt3::TX_VERSION,
            lock_time: PackedLockTime::ZERO,
            input: vec![TxIn {
                previous_output: self.state.funding_outpoint,
                script_sig: Script::new(),
                sequence: Sequence(0xFFFF_FFFD),
                witness: Witness::new(),
            }],
            output: outputs,
        })
    }

    fn compose_closing_signed(
        &self,
        fee: u64,
    ) -> Result<ClosingSigned, Error> {
        let closing_tx = self.closing_tx(fee)?;
        let sighash = funding_input_sighash(
            &closing_tx,
            &self.funding_script(),
            self.state.funding_satoshis,
        );
        Ok(ClosingSigned {
            channel_id: self.channel_id()?,
            fee_satoshis: fee,
            signature: sign_hash(
                SECP256K1,
                sighash,
                &self.channel_secrets.funding_key,
            ),
        })
    }

    /// Processes the peer's `closing_signed`, converging on a common
    /// fee by the strictly-between rule. Returns our next offer, or
    /// `None` when agreement was reached and the closing transaction is
    /// being broadcast.
    pub fn recv_closing_signed(
        &mut self,
        closing_signed: &ClosingSigned,
    ) -> Result<Option<ClosingSigned>, Error> {
        self.require_stage(&[
            Lifecycle::Shutdown,
            Lifecycle::NegotiatingClosing,
        ])?;
        if self.state.stage == Lifecycle::Shutdown {
            self.transition(Lifecycle::NegotiatingClosing)?;
        }

        let proposed = closing_signed.fee_satoshis;
        let closing_tx = self.closing_tx(proposed)?;
        let sighash = funding_input_sighash(
            &closing_tx,
            &self.funding_script(),
            self.state.funding_satoshis,
        );
        if !verify_hash_sig(
            SECP256K1,
            sighash,
            &closing_signed.signature,
            &self.state.remote_keys.funding_pubkey,
        ) {
            return Err(Error::InvalidCommitmentSignature {
                ctn: self.state.htlc_queues.ctn(Viewpoint::Local),
            });
        }

        // each successive offer must lie strictly between the last two,
        // unless the peer accepts our last offer verbatim
        if let (Some(ours), Some(theirs)) = (
            self.state.closing.last_fee_proposed,
            self.state.closing.last_fee_received,
        ) {
            let (lower, upper) = (ours.min(theirs), ours.max(theirs));
            if proposed != ours
                && (proposed <= lower || proposed >= upper)
            {
                return Err(Error::ClosingFeeOutOfBounds {
                    proposed,
                    lower,
                    upper,
                });
            }
        }
        self.state.closing.last_fee_received = Some(proposed);

        match self.state.closing.last_fee_proposed {
            Some(ours) if ours == proposed => {
                // agreement: assemble and publish the mutual close
                let local_sig = sign_hash(
                    SECP256K1,
                    sighash,
                    &self.channel_secrets.funding_key,
                );
                let mut finalized = closing_tx;
                finalized.input[0].witness = spend_funding_witness(
                    &self.state.local_keys.funding_pubkey,
                    &self.state.remote_keys.funding_pubkey,
                    &local_sig,
                    &closing_signed.signature,
                    &self.funding_script(),
                );
                self.state.closing.closing_txid = Some(finalized.txid());
                self.transition(Lifecycle::Closing)?;
                self.events.push_back(ChannelEvent::BroadcastClosing {
                    channel_id: self.channel_id()?,
                    tx: finalized,
                });
                Ok(None)
            }
            Some(ours) => {
                // split the difference; when no integer lies strictly
                // between the offers, accept the peer's fee
                let mut next_fee = (ours + proposed) / 2;
                if next_fee == ours {
                    next_fee = proposed;
                }
                let reply = self.compose_closing_signed(next_fee)?;
                self.state.closing.last_fee_proposed = Some(next_fee);
                Ok(Some(reply))
            }
            None => {
                // the peer opened negotiation; accept its offer and
                // publish the mutual close
                let reply = self.compose_closing_signed(proposed)?;
                self.state.closing.last_fee_proposed = Some(proposed);
                let local_sig = sign_hash(
                    SECP256K1,
                    sighash,
                    &self.channel_secrets.funding_key,
                );
                let mut finalized = closing_tx;
                finalized.input[0].witness = spend_funding_witness(
                    &self.state.local_keys.funding_pubkey,
                    &self.state.remote_keys.funding_pubkey,
                    &local_sig,
                    &closing_signed.signature,
                    &self.funding_script(),
                );
                self.state.closing.closing_txid = Some(finalized.txid());
                self.transition(Lifecycle::Closing)?;
                self.events.push_back(ChannelEvent::BroadcastClosing {
                    channel_id: self.channel_id()?,
                    tx: finalized,
                });
                Ok(Some(reply))
            }
        }
    }

    /// Called when the mutual closing transaction is buried
    pub fn closing_confirmed(&mut self) -> Result<(), Error> {
        self.require_stage(&[Lifecycle::Closing])?;
        self.transition(Lifecycle::Closed)?;
        Ok(())
    }

    // ====================================================== force close

    /// Assembles the fully signed latest local commitment for broadcast
    pub fn force_close(&mut self) -> Result<Transaction, Error> {
        self.require_stage(&[
            Lifecycle::WaitingForFundingConfirmed,
            Lifecycle::WaitingForChannelReady,
            Lifecycle::Open,
            Lifecycle::Shutdown,
            Lifecycle::NegotiatingClosing,
            Lifecycle::Reestablishing,
        ])?;
        let remote_sig = self
            .state
            .remote_commitment_sig
            .ok_or(Error::UnexpectedMessage("force_close"))?;
        let ctn = self.state.htlc_queues.ctn(Viewpoint::Local);
        let local_point = self.local_point(ctn)?;
        let template =
            self.build_commitment(Viewpoint::Local, ctn, &local_point)?;
        let sighash = funding_input_sighash(
            &template.tx,
            &self.funding_script(),
            self.state.funding_satoshis,
        );
        let local_sig = sign_hash(
            SECP256K1,
            sighash,
            &self.channel_secrets.funding_key,
        );
        let mut tx = template.tx;
        tx.input[0].witness = spend_funding_witness(
            &self.state.local_keys.funding_pubkey,
            &self.state.remote_keys.funding_pubkey,
            &local_sig,
            &remote_sig,
            &self.funding_script(),
        );
        self.transition(Lifecycle::ForceClosing)?;
        self.events.push_back(ChannelEvent::BroadcastForceClose {
            channel_id: self.channel_id()?,
            tx: tx.clone(),
        });
        Ok(tx)
    }

    /// Called when the force-close commitment and all its sweeps are
    /// buried
    pub fn force_close_resolved(&mut self) -> Result<(), Error> {
        self.require_stage(&[Lifecycle::ForceClosing])?;
        self.transition(Lifecycle::Closed)?;
        Ok(())
    }

    // ==================================================== reestablishment

    /// Marks the channel as reconnecting; channel operations resume after
    /// `channel_reestablish` succeeds
    pub fn start_reestablish(
        &mut self,
    ) -> Result<ChannelReestablish, Error> {
        self.require_stage(&[Lifecycle::Open])?;
        self.transition(Lifecycle::Reestablishing)?;
        self.compose_reestablish()
    }

    /// Composes our `channel_reestablish` for the reconnect handshake
    pub fn compose_reestablish(
        &self,
    ) -> Result<ChannelReestablish, Error> {
        let queues = &self.state.htlc_queues;
        let next_commitment_number = queues.ctn(Viewpoint::Local) + 1;
        let next_revocation_number = queues.ctn(Viewpoint::Remote);
        // prove we still know the peer's last released secret
        let your_last_per_commitment_secret =
            match next_revocation_number {
                0 => Slice32::default(),
                n => self
                    .state
                    .revocation_store
                    .secret_for(commitment_to_index(n - 1))
                    .unwrap_or_default(),
            };
        Ok(ChannelReestablish {
            channel_id: self.channel_id()?,
            next_commitment_number,
            next_revocation_number,
            your_last_per_commitment_secret,
            my_current_per_commitment_point: self
                .local_point(queues.ctn(Viewpoint::Local))?,
        })
    }

    /// Processes the peer's `channel_reestablish`, retransmitting
    /// whatever the peer reports missing. Any gap larger than one is
    /// unrecoverable and forces a close.
    pub fn recv_reestablish(
        &mut self,
        reestablish: &ChannelReestablish,
    ) -> Result<Vec<Messages>, Error> {
        self.require_stage(&[
            Lifecycle::Open,
            Lifecycle::Reestablishing,
        ])?;
        if self.state.stage == Lifecycle::Open {
            self.transition(Lifecycle::Reestablishing)?;
        }

        let queues = &self.state.htlc_queues;
        let committed_remote = queues.ctn(Viewpoint::Remote);
        let awaiting_revoke = self.state.awaiting_revoke;
        let our_next_revocation = queues.ctn(Viewpoint::Local);

        let mut replies = vec![];

        // does the peer miss our last commitment_signed?
        match reestablish.next_commitment_number {
            // peer has everything we signed
            n if awaiting_revoke && n == committed_remote + 2 => {}
            n if !awaiting_revoke && n == committed_remote + 1 => {}
            // the peer never received our in-flight commitment_signed
            n if awaiting_revoke && n == committed_remote + 1 => {
                replies.push(Messages::CommitmentSigned(
                    self.compose_commitment_signed()?,
                ));
            }
            n => {
                // the divergence cannot be repaired: broadcast our
                // latest commitment
                if let Err(err) = self.force_close() {
                    error!(
                        "channel {}: cannot force-close after failed \
                         reestablishment: {}",
                        self.state.active_channel_id, err
                    );
                }
                return Err(Error::ReestablishUnrecoverable {
                    remote_next_commitment: n,
                    remote_next_revocation: reestablish
                        .next_revocation_number,
                });
            }
        }

        // does the peer miss our last revoke_and_ack?
        match reestablish.next_revocation_number {
            n if n == our_next_revocation => {
                // synchronized
            }
            n if n + 1 == our_next_revocation => {
                replies.push(Messages::RevokeAndAck(
                    self.compose_revoke(our_next_revocation - 1)?,
                ));
            }
            n => {
                if let Err(err) = self.force_close() {
                    error!(
                        "channel {}: cannot force-close after failed \
                         reestablishment: {}",
                        self.state.active_channel_id, err
                    );
                }
                return Err(Error::ReestablishUnrecoverable {
                    remote_next_commitment: reestablish
                        .next_commitment_number,
                    remote_next_revocation: n,
                });
            }
        }

        self.transition(Lifecycle::Open)?;
        Ok(replies)
    }
}

// Local and remote keysets expose the same basepoints; this seam lets
// commitment key derivation treat both sides uniformly.
trait BasepointSource {
    fn revocation_basepoint(&self) -> PublicKey;
    fn payment_basepoint(&self) -> PublicKey;
    fn delayed_payment_basepoint(&self) -> PublicKey;
    fn htlc_basepoint(&self) -> PublicKey;
}

impl BasepointSource for LocalKeyset {
    fn revocation_basepoint(&self) -> PublicKey {
        self.revocation_basepoint
    }
    fn payment_basepoint(&self) -> PublicKey {
        self.payment_basepoint
    }
    fn delayed_payment_basepoint(&self) -> PublicKey {
        self.delayed_payment_basepoint
    }
    fn htlc_basepoint(&self) -> PublicKey {
        self.htlc_basepoint
    }
}

impl BasepointSource for RemoteKeyset {
    fn revocation_basepoint(&self) -> PublicKey {
        self.revocation_basepoint
    }
    fn payment_basepoint(&self) -> PublicKey {
        self.payment_basepoint
    }
    fn delayed_payment_basepoint(&self) -> PublicKey {
        self.delayed_payment_basepoint
    }
    fn htlc_basepoint(&self) -> PublicKey {
        self.htlc_basepoint
    }
}

#[cfg(test)]
mod test {
    use bitcoin::hashes::Hash;
    use bitcoin::util::bip32::ExtendedPrivKey;
    use bitcoin::Network;

    use super::*;

    fn channel_secrets(seed_byte: u8) -> ChannelSecrets {
        let xpriv = ExtendedPrivKey::new_master(
            Network::Regtest,
            &[seed_byte; 32],
        )
        .unwrap();
        ChannelSecrets::with(SECP256K1, xpriv).unwrap()
    }

    fn open_pair() -> (BoltChannel, BoltChannel) {
        let policy = Policy {
            // test channels are small
            minimum_funding_satoshis: 100_000,
            ..Policy::default()
        };
        let mut local_params = PeerParams::default();
        local_params.channel_reserve_satoshis = 2_000;

        let (mut alice, open_channel) = BoltChannel::new_outbound(
            ChainHash::regtest(),
            policy.clone(),
            CommonParams::default(),
            local_params,
            channel_secrets(1),
            200_000,
            0,
            None,
        )
        .unwrap();

        let (mut bob, accept_channel) = BoltChannel::new_inbound(
            policy,
            local_params,
            channel_secrets(2),
            &open_channel,
            3,
            None,
        )
        .unwrap();

        alice
            .recv_accept_channel(&accept_channel, &open_channel)
            .unwrap();

        // funder constructs the funding transaction externally
        let funding_txid = bitcoin::Txid::from_hash(
            bitcoin::hashes::sha256d::Hash::hash(b"funding"),
        );
        let funding_created =
            alice.funding_constructed(funding_txid, 0).unwrap();
        let funding_signed =
            bob.recv_funding_created(&funding_created).unwrap();
        alice.recv_funding_signed(&funding_signed).unwrap();

        // three confirmations later
        let ready_a = alice.funding_confirmed().unwrap();
        let ready_b = bob.funding_confirmed().unwrap();
        alice.recv_channel_ready(&ready_b).unwrap();
        bob.recv_channel_ready(&ready_a).unwrap();

        assert!(alice.is_active());
        assert!(bob.is_active());
        (alice, bob)
    }

    #[test]
    fn open_small_channel() {
        let (alice, bob) = open_pair();
        assert_eq!(alice.local_balance_msat(), 200_000_000);
        assert_eq!(alice.remote_balance_msat(), 0);
        assert_eq!(bob.local_balance_msat(), 0);
        assert_eq!(bob.remote_balance_msat(), 200_000_000);
        assert_eq!(alice.channel_id().unwrap(), bob.channel_id().unwrap());
    }

    fn preimage(byte: u8) -> HashPreimage {
        HashPreimage::from_inner(Slice32::from_inner([byte; 32]))
    }

    fn route_htlc(
        alice: &mut BoltChannel,
        bob: &mut BoltChannel,
        amount_msat: u64,
        preimage_byte: u8,
    ) -> u64 {
        let update_add = alice
            .send_htlc(
                amount_msat,
                HashLock::from(preimage(preimage_byte)),
                500_040,
                OnionPacket::dumb_default(),
                500_000,
            )
            .unwrap();
        bob.recv_htlc(&update_add).unwrap();

        let commitment = alice.send_commitment().unwrap();
        let revoke = bob.recv_commitment(&commitment).unwrap();
        alice.recv_revoke(&revoke).unwrap();

        let commitment = bob.send_commitment().unwrap();
        let revoke = alice.recv_commitment(&commitment).unwrap();
        bob.recv_revoke(&revoke).unwrap();

        update_add.htlc_id
    }

    #[test]
    fn htlc_roundtrip() {
        let (mut alice, mut bob) = open_pair();
        let htlc_id = route_htlc(&mut alice, &mut bob, 50_000, 9);
        assert_eq!(htlc_id, 0);

        // commitment numbers advanced by one on each side
        assert_eq!(
            alice.state().htlc_queues.ctn(Viewpoint::Local),
            1
        );
        assert_eq!(bob.state().htlc_queues.ctn(Viewpoint::Local), 1);
        // amount is locked up, not yet transferred
        assert_eq!(alice.local_balance_msat(), 200_000_000 - 50_000);
        assert_eq!(bob.local_balance_msat(), 0);

        // bob settles
        let fulfill = bob.settle_htlc(htlc_id, preimage(9)).unwrap();
        alice.recv_htlc_fulfill(&fulfill).unwrap();

        let commitment = bob.send_commitment().unwrap();
        let revoke = alice.recv_commitment(&commitment).unwrap();
        bob.recv_revoke(&revoke).unwrap();
        let commitment = alice.send_commitment().unwrap();
        let revoke = bob.recv_commitment(&commitment).unwrap();
        alice.recv_revoke(&revoke).unwrap();

        assert_eq!(alice.local_balance_msat(), 200_000_000 - 50_000);
        assert_eq!(bob.local_balance_msat(), 50_000);
    }

    #[test]
    fn bad_commitment_signature_is_rejected() {
        let (mut alice, mut bob) = open_pair();
        let update_add = alice
            .send_htlc(
                50_000,
                HashLock::from(preimage(9)),
                500_040,
                OnionPacket::dumb_default(),
                500_000,
            )
            .unwrap();
        bob.recv_htlc(&update_add).unwrap();
        let mut commitment = alice.send_commitment().unwrap();
        // corrupt the funding signature
        commitment.signature = commitment.htlc_signatures[0];
        assert!(matches!(
            bob.recv_commitment(&commitment),
            Err(Error::InvalidCommitmentSignature { .. })
        ));
    }

    #[test]
    fn second_commitment_requires_revoke() {
        let (mut alice, mut bob) = open_pair();
        let update_add = alice
            .send_htlc(
                50_000,
                HashLock::from(preimage(9)),
                500_040,
                OnionPacket::dumb_default(),
                500_000,
            )
            .unwrap();
        bob.recv_htlc(&update_add).unwrap();
        alice.send_commitment().unwrap();
        assert_eq!(
            alice.send_commitment(),
            Err(Error::CommitmentOutstanding)
        );
    }

    #[test]
    fn reserve_is_enforced_on_send() {
        let (mut alice, _) = open_pair();
        // 200k sat channel, 2k sat reserve: sending everything must fail
        assert!(matches!(
            alice.send_htlc(
                200_000_000,
                HashLock::from(preimage(1)),
                500_040,
                OnionPacket::dumb_default(),
                500_000,
            ),
            Err(Error::WouldDipBelowReserve { .. })
        ));
    }

    #[test]
    fn expiry_too_soon_is_local_error() {
        let (mut alice, _) = open_pair();
        let err = alice
            .send_htlc(
                10_000,
                HashLock::from(preimage(1)),
                499_999,
                OnionPacket::dumb_default(),
                500_000,
            )
            .unwrap_err();
        assert!(!err.is_protocol_violation());
    }

    #[test]
    fn revocation_store_fills_on_revokes() {
        let (mut alice, mut bob) = open_pair();
        for round in 0..5u8 {
            route_htlc(&mut alice, &mut bob, 10_000, round + 10);
        }
        // five commitment exchanges: secrets for ctns 0..4 of the peer
        assert!(!alice.state().revocation_store.is_empty());
        for ctn in 0..5u64 {
            assert!(alice
                .state()
                .revocation_store
                .secret_for(commitment_to_index(ctn))
                .is_ok());
        }
    }

    #[test]
    fn cooperative_close_converges() {
        let (mut alice, mut bob) = open_pair();
        let script_a = Script::new_v0_p2wpkh(
            &bitcoin::WPubkeyHash::from_slice(&[0u8; 20]).unwrap(),
        );
        let script_b = script_a.clone();

        let shutdown_a = alice.shutdown(script_a.clone()).unwrap();
        let replies =
            bob.recv_shutdown(&shutdown_a, script_b.clone()).unwrap();
        // bob replies with its own shutdown; bob is not the funder so no
        // closing_signed yet
        assert_eq!(replies.len(), 1);
        let shutdown_b = match &replies[0] {
            Messages::Shutdown(shutdown) => shutdown.clone(),
            other => panic!("unexpected message {}", other),
        };
        let mut replies =
            alice.recv_shutdown(&shutdown_b, script_a).unwrap();
        // alice is the funder and the channel is drained: negotiation
        // starts
        let first_offer = match replies.pop() {
            Some(Messages::ClosingSigned(closing_signed)) => {
                closing_signed
            }
            other => panic!("expected closing_signed, got {:?}", other),
        };

        let reply = bob.recv_closing_signed(&first_offer).unwrap();
        // bob accepts alice's fee on the first round
        let bob_offer = reply.expect("bob answers with its signature");
        assert_eq!(bob_offer.fee_satoshis, first_offer.fee_satoshis);
        let finished =
            alice.recv_closing_signed(&bob_offer).unwrap();
        assert!(finished.is_none());
        assert_eq!(alice.stage(), Lifecycle::Closing);
    }

    #[test]
    fn reestablish_after_missed_revoke() {
        let (mut alice, mut bob) = open_pair();
        route_htlc(&mut alice, &mut bob, 10_000, 7);

        // Alice sends an HTLC and a commitment; Bob answers with revoke
        // and its own commitment, but both messages are lost.
        let update_add = alice
            .send_htlc(
                20_000,
                HashLock::from(preimage(8)),
                500_040,
                OnionPacket::dumb_default(),
                500_000,
            )
            .unwrap();
        bob.recv_htlc(&update_add).unwrap();
        let commitment = alice.send_commitment().unwrap();
        let _lost_revoke = bob.recv_commitment(&commitment).unwrap();

        // reconnect: alice still awaits the revoke for remote ctn 1->2
        let reestablish_a = alice.start_reestablish().unwrap();
        let reestablish_b = bob.start_reestablish().unwrap();

        // bob re-sends the lost revoke; alice learns bob already got the
        // commitment (its next_commitment_number advanced) and
        // retransmits nothing
        let replies_b = bob.recv_reestablish(&reestablish_a).unwrap();
        assert_eq!(replies_b.len(), 1);
        let replies_a = alice.recv_reestablish(&reestablish_b).unwrap();
        assert!(replies_a.is_empty());
        assert_eq!(bob.stage(), Lifecycle::Open);
        assert_eq!(alice.stage(), Lifecycle::Open);

        // delivering the retransmitted revoke completes the round
        match &replies_b[0] {
            Messages::RevokeAndAck(revoke) => {
                alice.recv_revoke(revoke).unwrap()
            }
            other => panic!("unexpected retransmission {}", other),
        }
        assert!(!alice.state().awaiting_revoke);
    }

    #[test]
    fn unrecoverable_gap_forces_close() {
        let (mut alice, mut bob) = open_pair();
        route_htlc(&mut alice, &mut bob, 10_000, 7);

        let mut reestablish = bob.compose_reestablish().unwrap();
        reestablish.next_commitment_number += 5;
        alice.start_reestablish().unwrap();
        assert!(matches!(
            alice.recv_reestablish(&reestablish),
            Err(Error::ReestablishUnrecoverable { .. })
        ));
        assert_eq!(alice.stage(), Lifecycle::ForceClosing);
    }

    #[test]
    fn force_close_produces_signed_commitment() {
        let (mut alice, mut bob) = open_pair();
        route_htlc(&mut alice, &mut bob, 100_000, 3);
        let tx = alice.force_close().unwrap();
        assert_eq!(tx.input.len(), 1);
        assert_eq!(
            tx.input[0].previous_output,
            alice.state().funding_outpoint
        );
        // witness: empty element, two signatures, witness script
        assert_eq!(tx.input[0].witness.len(), 4);
        assert_eq!(alice.stage(), Lifecycle::ForceClosing);
    }
}
