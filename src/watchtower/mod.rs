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

//! The watchtower: recognizes spends of channel funding outpoints,
//! classifies them as current, mutual-close or revoked commitments, and
//! punishes revoked broadcasts with a justice transaction sweeping every
//! output through the revocation key.

use std::collections::BTreeMap;
use std::sync::Arc;

use amplify::{Slice32, Wrapper};
use bitcoin::{
    EcdsaSighashType, OutPoint, PackedLockTime, Script, Sequence,
    Transaction, TxIn, TxOut, Witness,
};
use lnc_p2p::bolt::{ChannelId, HashLock};
use secp256k1::{PublicKey, SecretKey, SECP256K1};

use crate::bolt3::{
    self, htlc_output_sighash, recover_commitment_number,
    ScriptGenerators,
};
use crate::chain::ChainClient;
use crate::events::{ChannelEvent, EventBus};
use crate::keys::{
    derive_pubkey, derive_revocation_privkey, derive_revocation_pubkey,
    sign_hash,
};
use crate::secrets::{commitment_to_index, RevocationStore};

// Rough weight estimates for justice fee computation
const JUSTICE_BASE_WEIGHT: u64 = 300;
const JUSTICE_INPUT_WEIGHT: u64 = 400;

/// Watchtower errors
#[derive(Clone, PartialEq, Eq, Hash, Debug, Display, Error, From)]
#[display(doc_comments)]
pub enum Error {
    /// commitment {ctn} is not revoked; refusing to build a justice
    /// transaction
    NotRevoked { ctn: u64 },

    /// no outputs of the revoked commitment are recognizable; nothing to
    /// sweep
    NothingToSweep,

    /// revocation secret missing for commitment {0}
    #[from]
    MissingSecret(crate::secrets::Error),

    /// key derivation failure
    #[from]
    Keys(crate::keys::Error),
}

/// Classification of a transaction spending a channel funding outpoint
#[derive(Clone, Copy, PartialEq, Eq, Debug, Display)]
pub enum SpendClass {
    /// The latest (non-revoked) commitment of either side
    #[display("current commitment")]
    CurrentCommitment,

    /// A revoked commitment: a breach to punish
    #[display("revoked commitment {ctn}")]
    RevokedCommitment { ctn: u64 },

    /// The negotiated mutual closing transaction
    #[display("mutual close")]
    MutualClose,
}

/// HTLC metadata of a revoked commitment, retained to rebuild its output
/// scripts
#[derive(Clone, PartialEq, Eq, Debug)]
#[derive(StrictEncode, StrictDecode)]
pub struct RevokedHtlc {
    /// Offered by the commitment broadcaster
    pub offered: bool,
    pub amount_msat: u64,
    pub payment_hash: HashLock,
    pub cltv_expiry: u32,
}

/// Everything the watchtower keeps per monitored channel. The justice
/// transaction for any revoked commitment is derivable purely from this
/// data.
#[derive(Clone, PartialEq, Debug)]
#[derive(StrictEncode, StrictDecode)]
pub struct MonitoredChannel {
    pub channel_id: ChannelId,
    pub funding_outpoint: OutPoint,
    pub obscuring_factor: u64,

    /// CSV delay imposed on the remote side's `to_local`
    pub remote_to_self_delay: u16,

    /// Dust limit of the remote side's commitments
    pub remote_dust_limit: u64,

    pub anchors: bool,

    /// Remote basepoints entering the breached commitment's scripts
    pub remote_delayed_payment_basepoint: PublicKey,
    pub remote_htlc_basepoint: PublicKey,

    /// Our basepoints and the secrets unlocking the penalty paths
    pub local_htlc_basepoint: PublicKey,
    pub local_payment_basepoint: PublicKey,
    pub revocation_basepoint_secret: SecretKey,
    pub payment_basepoint_secret: SecretKey,

    /// Released secrets of every revoked remote commitment
    pub revocation_store: RevocationStore,

    /// Commitment number of the latest (valid) remote commitment
    pub latest_ctn: u64,

    /// HTLCs present in each revoked commitment, by commitment number
    pub revoked_htlcs: BTreeMap<u64, Vec<RevokedHtlc>>,

    /// Destination of swept funds
    pub sweep_script: Script,
}

impl MonitoredChannel {
    /// Records a newly revoked commitment
    pub fn register_revocation(
        &mut self,
        ctn: u64,
        secret: Slice32,
        htlcs: Vec<RevokedHtlc>,
    ) -> Result<(), Error> {
        self.revocation_store
            .insert(commitment_to_index(ctn), secret)?;
        self.revoked_htlcs.insert(ctn, htlcs);
        self.latest_ctn = self.latest_ctn.max(ctn + 1);
        Ok(())
    }

    /// Classifies a confirmed transaction spending the funding outpoint
    pub fn classify(&self, tx: &Transaction) -> Option<SpendClass> {
        let input = tx
            .input
            .iter()
            .find(|input| input.previous_output == self.funding_outpoint)?;

        let locktime = tx.lock_time.0;
        let sequence = input.sequence.0;
        if locktime >> 24 != 0x20 || sequence >> 24 != 0x80 {
            return Some(SpendClass::MutualClose);
        }
        let ctn = recover_commitment_number(
            locktime,
            sequence,
            self.obscuring_factor,
        );
        if self
            .revocation_store
            .secret_for(commitment_to_index(ctn))
            .is_ok()
        {
            Some(SpendClass::RevokedCommitment { ctn })
        } else {
            Some(SpendClass::CurrentCommitment)
        }
    }

    // Per-commitment keys of the breached remote commitment, derived
    // from the released secret.
    fn breach_keys(
        &self,
        ctn: u64,
    ) -> Result<(SecretKey, PublicKey, PublicKey, PublicKey, PublicKey), Error>
    {
        let index = commitment_to_index(ctn);
        let secret = self.revocation_store.secret_for(index)?;
        let per_commitment_secret =
            SecretKey::from_slice(secret.as_inner())
                .map_err(|_| Error::NotRevoked { ctn })?;
        let per_commitment_point =
            PublicKey::from_secret_key(SECP256K1, &per_commitment_secret);

        let revocation_privkey = derive_revocation_privkey(
            SECP256K1,
            &self.revocation_basepoint_secret,
            &per_commitment_secret,
        )?;
        let revocation_pubkey = derive_revocation_pubkey(
            SECP256K1,
            &PublicKey::from_secret_key(
                SECP256K1,
                &self.revocation_basepoint_secret,
            ),
            &per_commitment_point,
        )?;
        let delayed_pubkey = derive_pubkey(
            SECP256K1,
            &self.remote_delayed_payment_basepoint,
            &per_commitment_point,
        )?;
        let remote_htlc_pubkey = derive_pubkey(
            SECP256K1,
            &self.remote_htlc_basepoint,
            &per_commitment_point,
        )?;
        let local_htlc_pubkey = derive_pubkey(
            SECP256K1,
            &self.local_htlc_basepoint,
            &per_commitment_point,
        )?;
        Ok((
            revocation_privkey,
            revocation_pubkey,
            delayed_pubkey,
            remote_htlc_pubkey,
            local_htlc_pubkey,
        ))
    }

    /// Builds the justice transaction sweeping every recognizable output
    /// of a revoked commitment into `sweep_script`.
    pub fn justice_transaction(
        &self,
        breach_tx: &Transaction,
        ctn: u64,
        feerate_per_kw: u32,
    ) -> Result<Transaction, Error> {
        let (
            revocation_privkey,
            revocation_pubkey,
            delayed_pubkey,
            remote_htlc_pubkey,
            local_htlc_pubkey,
        ) = self.breach_keys(ctn)?;

        let to_local_script = Script::ln_to_local(
            0,
            revocation_pubkey,
            delayed_pubkey,
            self.remote_to_self_delay,
        );
        let to_remote_script = Script::ln_to_remote_v1(
            0,
            self.local_payment_basepoint,
        );

        // (input value, witness script or None for p2wpkh, claim kind)
        enum Claim {
            Revocation(Script),
            RevocationHtlc(Script),
            OurPayment,
        }
        let mut claims: Vec<(OutPoint, u64, Claim)> = vec![];
        let breach_txid = breach_tx.txid();

        for (vout, output) in breach_tx.output.iter().enumerate() {
            let outpoint = OutPoint {
                txid: breach_txid,
                vout: vout as u32,
            };
            if output.script_pubkey == to_local_script.to_v0_p2wsh() {
                claims.push((
                    outpoint,
                    output.value,
                    Claim::Revocation(to_local_script.clone()),
                ));
                continue;
            }
            if output.script_pubkey == to_remote_script {
                claims.push((outpoint, output.value, Claim::OurPayment));
                continue;
            }
            let htlcs = self.revoked_htlcs.get(&ctn);
            let matching_htlc = htlcs.and_then(|htlcs| {
                htlcs.iter().find_map(|htlc| {
                    let script = if htlc.offered {
                        Script::ln_offered_htlc(
                            0,
                            revocation_pubkey,
                            remote_htlc_pubkey,
                            local_htlc_pubkey,
                            htlc.payment_hash,
                            self.anchors,
                        )
                    } else {
                        Script::ln_received_htlc(
                            0,
                            revocation_pubkey,
                            remote_htlc_pubkey,
                            local_htlc_pubkey,
                            htlc.cltv_expiry,
                            htlc.payment_hash,
                            self.anchors,
                        )
                    };
                    (output.script_pubkey == script.to_v0_p2wsh())
                        .then_some(script)
                })
            });
            if let Some(script) = matching_htlc {
                claims.push((
                    outpoint,
                    output.value,
                    Claim::RevocationHtlc(script),
                ));
            }
            // anchors and unrecognized outputs are not worth sweeping
        }

        if claims.is_empty() {
            return Err(Error::NothingToSweep);
        }

        let total: u64 =
            claims.iter().map(|(_, value, _)| *value).sum();
        let weight = JUSTICE_BASE_WEIGHT
            + JUSTICE_INPUT_WEIGHT * claims.len() as u64;
        let fee = bolt3::weight_to_fee(weight, feerate_per_kw);

        let mut justice = Transaction {
            version: bolt3::TX_VERSION,
            lock_time: PackedLockTime::ZERO,
            input: claims
                .iter()
                .map(|(outpoint, _, _)| TxIn {
                    previous_output: *outpoint,
                    script_sig: Script::new(),
                    sequence: Sequence(0xFFFF_FFFD),
                    witness: Witness::new(),
                })
                .collect(),
            output: vec![TxOut {
                value: total.saturating_sub(fee),
                script_pubkey: self.sweep_script.clone(),
            }],
        };

        for (index, (_, value, claim)) in claims.iter().enumerate() {
            match claim {
                Claim::Revocation(script) => {
                    let sighash = htlc_output_sighash(
                        &justice, index, script, *value,
                    );
                    let sig =
                        sign_hash(SECP256K1, sighash, &revocation_privkey);
                    let mut sig_bytes = sig.serialize_der().to_vec();
                    sig_bytes
                        .push(EcdsaSighashType::All.to_u32() as u8);
                    justice.input[index].witness = Witness::from_vec(vec![
                        sig_bytes,
                        vec![1u8],
                        script.to_bytes(),
                    ]);
                }
                Claim::RevocationHtlc(script) => {
                    let sighash = htlc_output_sighash(
                        &justice, index, script, *value,
                    );
                    let sig =
                        sign_hash(SECP256K1, sighash, &revocation_privkey);
                    let mut sig_bytes = sig.serialize_der().to_vec();
                    sig_bytes
                        .push(EcdsaSighashType::All.to_u32() as u8);
                    justice.input[index].witness = Witness::from_vec(vec![
                        sig_bytes,
                        revocation_pubkey.serialize().to_vec(),
                        script.to_bytes(),
                    ]);
                }
                Claim::OurPayment => {
                    let script_code = to_remote_script
                        .p2wpkh_script_code()
                        .expect("to_remote_v1 is p2wpkh");
                    let sighash = htlc_output_sighash(
                        &justice,
                        index,
                        &script_code,
                        *value,
                    );
                    let sig = sign_hash(
                        SECP256K1,
                        sighash,
                        &self.payment_basepoint_secret,
                    );
                    let mut sig_bytes = sig.serialize_der().to_vec();
                    sig_bytes
                        .push(EcdsaSighashType::All.to_u32() as u8);
                    justice.input[index].witness = Witness::from_vec(vec![
                        sig_bytes,
                        self.local_payment_basepoint
                            .serialize()
                            .to_vec(),
                    ]);
                }
            }
        }

        Ok(justice)
    }
}

/// The watchtower service: a registry of monitored channels driven by
/// chain notifications.
pub struct Watchtower {
    channels: BTreeMap<ChannelId, MonitoredChannel>,
    chain: Arc<dyn ChainClient>,
    events: EventBus,
    feerate_per_kw: u32,
}

impl Watchtower {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        events: EventBus,
        feerate_per_kw: u32,
    ) -> Watchtower {
        Watchtower {
            channels: empty!(),
            chain,
            events,
            feerate_per_kw,
        }
    }

    /// Starts monitoring a channel which has reached the OPEN state
    pub fn monitor(&mut self, channel: MonitoredChannel) {
        debug!("watchtower: monitoring channel {}", channel.channel_id);
        self.channels.insert(channel.channel_id, channel);
    }

    /// Stops monitoring once the channel is fully closed and buried
    pub fn release(&mut self, channel_id: &ChannelId) {
        self.channels.remove(channel_id);
    }

    /// Feeds a revocation observed by a channel actor
    pub fn register_revocation(
        &mut self,
        channel_id: &ChannelId,
        ctn: u64,
        secret: Slice32,
        htlcs: Vec<RevokedHtlc>,
    ) -> Result<(), Error> {
        if let Some(channel) = self.channels.get_mut(channel_id) {
            channel.register_revocation(ctn, secret, htlcs)?;
        }
        Ok(())
    }

    #[inline]
    pub fn monitored(&self, channel_id: &ChannelId) -> Option<&MonitoredChannel> {
        self.channels.get(channel_id)
    }

    /// Examines a confirmed transaction; when it is a revoked commitment
    /// of a monitored channel, broadcasts the justice transaction within
    /// the same block interval.
    pub async fn process_transaction(
        &mut self,
        tx: &Transaction,
    ) -> Result<(), crate::chain::ChainError> {
        let spent: Vec<ChannelId> = self
            .channels
            .values()
            .filter(|channel| {
                tx.input.iter().any(|input| {
                    input.previous_output == channel.funding_outpoint
                })
            })
            .map(|channel| channel.channel_id)
            .collect();

        for channel_id in spent {
            let channel = &self.channels[&channel_id];
            match channel.classify(tx) {
                Some(SpendClass::RevokedCommitment { ctn }) => {
                    warn!(
                        "watchtower: revoked commitment {} of channel {} \
                         was broadcast; punishing",
                        ctn, channel_id
                    );
                    let justice = match channel.justice_transaction(
                        tx,
                        ctn,
                        self.feerate_per_kw,
                    ) {
                        Ok(justice) => justice,
                        Err(err) => {
                            error!(
                                "watchtower: cannot build justice tx for \
                                 channel {}: {}",
                                channel_id, err
                            );
                            continue;
                        }
                    };
                    let justice_txid =
                        self.chain.broadcast(justice).await?;
                    self.events.publish(ChannelEvent::BreachPunished {
                        channel_id,
                        ctn,
                        justice_txid,
                    });
                }
                Some(SpendClass::CurrentCommitment) => {
                    info!(
                        "watchtower: current commitment of channel {} \
                         confirmed on-chain",
                        channel_id
                    );
                }
                Some(SpendClass::MutualClose) => {
                    info!(
                        "watchtower: mutual close of channel {} confirmed",
                        channel_id
                    );
                }
                None => {}
            }
        }
        Ok(())
    }
}
