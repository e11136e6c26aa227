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

use amplify::DumbDefault;
use bitcoin::Script;
use lnc_p2p::bolt::{AcceptChannel, ChannelType, OpenChannel};
use secp256k1::{PublicKey, Secp256k1, Signing};

use crate::keys::{ChannelBasepoints, ChannelSecrets};
use crate::secrets;

/// Set of public keys used by the local side of the channel
#[derive(Clone, PartialEq, Eq, Debug)]
#[derive(StrictEncode, StrictDecode)]
pub struct LocalKeyset {
    /// Public key used in the funding outpoint multisig
    pub funding_pubkey: PublicKey,
    /// Base point for deriving keys used for penalty spending paths
    pub revocation_basepoint: PublicKey,
    /// Base point for deriving keys in `to_remote`
    pub payment_basepoint: PublicKey,
    /// Base point for deriving keys in `to_local` time-locked spending
    /// paths
    pub delayed_payment_basepoint: PublicKey,
    /// Base point for deriving HTLC-related keys
    pub htlc_basepoint: PublicKey,
    /// Commitment point to be used for the first commitment transaction
    pub first_per_commitment_point: PublicKey,
    /// Allows the sending node to commit to where funds will go on mutual
    /// close, which the remote node should enforce even if a node is
    /// compromised later.
    pub shutdown_scriptpubkey: Option<Script>,
    /// If `option_static_remotekey` or anchors are negotiated, the
    /// remotepubkey is simply the remote node's payment_basepoint,
    /// otherwise it is tweaked by the per-commitment point.
    pub static_remotekey: bool,
}

impl LocalKeyset {
    /// Assembles the keyset from channel secrets derived by
    /// [`ChannelSecrets::with`]
    pub fn with<C: Signing>(
        secp: &Secp256k1<C>,
        channel_secrets: &ChannelSecrets,
        shutdown_scriptpubkey: Option<Script>,
    ) -> Result<LocalKeyset, secrets::Error> {
        let basepoints: ChannelBasepoints =
            channel_secrets.basepoints(secp);
        let first_secret = secrets::per_commitment_secret(
            channel_secrets.per_commitment_seed,
            secrets::commitment_to_index(0),
        )?;
        let first_per_commitment_point = secrets::per_commitment_point(
            secp,
            first_secret,
            secrets::commitment_to_index(0),
        )?;
        Ok(LocalKeyset {
            funding_pubkey: basepoints.funding_pubkey,
            revocation_basepoint: basepoints.revocation_basepoint,
            payment_basepoint: basepoints.payment_basepoint,
            delayed_payment_basepoint: basepoints.delayed_payment_basepoint,
            htlc_basepoint: basepoints.htlc_basepoint,
            first_per_commitment_point,
            shutdown_scriptpubkey,
            static_remotekey: true,
        })
    }
}

impl DumbDefault for LocalKeyset {
    fn dumb_default() -> Self {
        LocalKeyset {
            funding_pubkey: dumb_pubkey!(),
            revocation_basepoint: dumb_pubkey!(),
            payment_basepoint: dumb_pubkey!(),
            delayed_payment_basepoint: dumb_pubkey!(),
            htlc_basepoint: dumb_pubkey!(),
            first_per_commitment_point: dumb_pubkey!(),
            shutdown_scriptpubkey: None,
            static_remotekey: true,
        }
    }
}

/// Set of public keys received from the remote side of the channel
#[derive(Clone, PartialEq, Eq, Debug)]
#[derive(StrictEncode, StrictDecode)]
pub struct RemoteKeyset {
    /// Public key used in the funding outpoint multisig
    pub funding_pubkey: PublicKey,
    /// Base point for deriving keys used for penalty spending paths
    pub revocation_basepoint: PublicKey,
    /// Base point for deriving keys in `to_remote`
    pub payment_basepoint: PublicKey,
    /// Base point for deriving keys in `to_local` time-locked spending
    /// paths
    pub delayed_payment_basepoint: PublicKey,
    /// Base point for deriving HTLC-related keys
    pub htlc_basepoint: PublicKey,
    /// The peer's first per-commitment point
    pub first_per_commitment_point: PublicKey,
    /// Upfront shutdown script committed by the peer, if any
    pub shutdown_scriptpubkey: Option<Script>,
    /// Whether the peer's `to_remote` output uses the static payment
    /// basepoint
    pub static_remotekey: bool,
}

impl DumbDefault for RemoteKeyset {
    fn dumb_default() -> Self {
        RemoteKeyset {
            funding_pubkey: dumb_pubkey!(),
            revocation_basepoint: dumb_pubkey!(),
            payment_basepoint: dumb_pubkey!(),
            delayed_payment_basepoint: dumb_pubkey!(),
            htlc_basepoint: dumb_pubkey!(),
            first_per_commitment_point: dumb_pubkey!(),
            shutdown_scriptpubkey: None,
            static_remotekey: true,
        }
    }
}

impl From<&OpenChannel> for RemoteKeyset {
    fn from(open_channel: &OpenChannel) -> Self {
        Self {
            funding_pubkey: open_channel.funding_pubkey,
            revocation_basepoint: open_channel.revocation_basepoint,
            payment_basepoint: open_channel.payment_point,
            delayed_payment_basepoint: open_channel
                .delayed_payment_basepoint,
            htlc_basepoint: open_channel.htlc_basepoint,
            first_per_commitment_point: open_channel
                .first_per_commitment_point,
            shutdown_scriptpubkey: open_channel
                .shutdown_scriptpubkey
                .clone(),
            static_remotekey: open_channel
                .channel_type
                .map(ChannelType::has_static_remotekey)
                .unwrap_or_default(),
        }
    }
}

impl From<&AcceptChannel> for RemoteKeyset {
    fn from(accept_channel: &AcceptChannel) -> Self {
        Self {
            funding_pubkey: accept_channel.funding_pubkey,
            revocation_basepoint: accept_channel.revocation_basepoint,
            payment_basepoint: accept_channel.payment_point,
            delayed_payment_basepoint: accept_channel
                .delayed_payment_basepoint,
            htlc_basepoint: accept_channel.htlc_basepoint,
            first_per_commitment_point: accept_channel
                .first_per_commitment_point,
            shutdown_scriptpubkey: accept_channel
                .shutdown_scriptpubkey
                .clone(),
            static_remotekey: accept_channel
                .channel_type
                .map(ChannelType::has_static_remotekey)
                .unwrap_or_default(),
        }
    }
}

