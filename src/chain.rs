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

//! Interfaces of the external collaborators: the bitcoin chain client,
//! the hierarchical key store and the BOLT-11 invoice decoder. The core
//! never talks to the chain, disk wallets or bech32 directly.

use bitcoin::util::bip32::{DerivationPath, ExtendedPrivKey};
use bitcoin::{BlockHash, OutPoint, Script, Transaction, Txid, TxOut};
use lnc_p2p::bolt::{FeatureVector, HashLock, ShortChannelId};
use secp256k1::PublicKey;
use tokio::sync::mpsc;

/// Chain client failures; read paths retry with backoff, broadcast paths
/// block until the client recovers.
#[derive(Clone, PartialEq, Eq, Hash, Debug, Display, Error)]
#[display(doc_comments)]
pub enum ChainError {
    /// transaction {txid} was rejected by the network: {reason}
    BroadcastRejected { txid: Txid, reason: String },

    /// chain client connection is lost
    Disconnected,

    /// fee estimation is not available for target {0}
    NoFeeEstimate(u32),
}

/// A confirmation event for a watched outpoint
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Confirmation {
    pub height: u32,
    /// The transaction spending (or creating) the watched outpoint
    pub tx: Transaction,
}

/// A new chain tip notification
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct TipUpdate {
    pub height: u32,
    pub block_hash: BlockHash,
}

/// An unspent output usable for funding
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Utxo {
    pub outpoint: OutPoint,
    pub output: TxOut,
    pub confirmations: u32,
}

/// The bitcoin chain backend. Implementations wrap whatever chain source
/// the application uses (bitcoind RPC, electrum, compact filters); all
/// requests go through a thread-safe queue inside the implementation.
#[async_trait::async_trait]
pub trait ChainClient: Send + Sync {
    /// Broadcasts a transaction to the network
    async fn broadcast(&self, tx: Transaction) -> Result<Txid, ChainError>;

    /// Estimated fee rate in satoshi per 1000-weight for confirmation
    /// within `conf_target` blocks
    async fn estimate_feerate(
        &self,
        conf_target: u32,
    ) -> Result<u32, ChainError>;

    /// Streams confirmations of transactions spending the outpoint (the
    /// funding output watch used by channels and the watchtower)
    async fn subscribe_confirms(
        &self,
        outpoint: OutPoint,
    ) -> mpsc::Receiver<Confirmation>;

    /// Streams new chain tips
    async fn subscribe_tip(&self) -> mpsc::Receiver<TipUpdate>;

    /// Lists unspent outputs paying to any of the given scripts
    async fn list_utxos(
        &self,
        scripts: Vec<Script>,
    ) -> Result<Vec<Utxo>, ChainError>;
}

/// The hierarchical-deterministic master key store. Only derivation is
/// exposed; the master key never leaves the implementation.
pub trait KeyStore: Send + Sync {
    /// Derives the extended private key at the given path
    fn derive(
        &self,
        path: &DerivationPath,
    ) -> Result<ExtendedPrivKey, bitcoin::util::bip32::Error>;
}

/// A decoded BOLT-11 invoice, as returned by the external decoder
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Invoice {
    /// Amount, when the invoice specifies one
    pub amount_msat: Option<u64>,

    pub payment_hash: HashLock,

    /// Payment secret for the final hop's TLV payload
    pub payment_secret: [u8; 32],

    pub features: FeatureVector,

    /// Minimum CLTV delta required by the payee's final hop
    pub min_final_cltv_delta: u32,

    pub payee: PublicKey,

    /// Private routing hints: `(node, scid, base_msat, proportional,
    /// cltv_delta)` per hop
    pub hop_hints: Vec<(PublicKey, ShortChannelId, u32, u32, u16)>,
}

/// The BOLT-11 bech32 decoder lives outside the core
pub trait InvoiceDecoder: Send + Sync {
    type Error: std::error::Error;

    fn decode(&self, bolt11: &str) -> Result<Invoice, Self::Error>;
}
