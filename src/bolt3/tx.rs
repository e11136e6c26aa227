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

//! Commitment transaction assembly: output construction, deterministic
//! ordering, fee deduction, BIP-143 sighashes and the second-stage HTLC
//! transactions.

use amplify::{Slice32, Wrapper};
use bitcoin::hashes::Hash as _;
use bitcoin::util::sighash::SighashCache;
use bitcoin::{
    EcdsaSighashType, OutPoint, PackedLockTime, Script, Sequence,
    Transaction, TxIn, TxOut, Witness,
};
use lnc_p2p::bolt::{HashLock, HashPreimage};
use secp256k1::ecdsa::Signature;
use secp256k1::PublicKey;

use super::{
    commit_tx_fee, htlc_success_fee, htlc_timeout_fee,
    obscured_commitment_number, ScriptGenerators, ANCHOR_OUTPUT_VALUE,
    TX_VERSION,
};

/// Commitment construction errors
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Display, Error)]
#[display(doc_comments)]
pub enum Error {
    /// funder balance of {available} msat cannot cover the {required} msat
    /// of commitment fee and anchor outputs
    FunderCannotAffordFee { available: u64, required: u64 },

    /// commitment number {0} exceeds the 48-bit space
    CommitmentNumberOverflow(u64),

    /// commitment transaction has no outputs above the dust limit
    AllOutputsTrimmed,
}

/// Per-commitment public keys entering the output scripts of one
/// commitment transaction. All keys are already tweaked by the
/// per-commitment point of the commitment's owner (the broadcaster).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct CommitmentKeys {
    /// Key allowing the non-broadcaster to punish a revoked broadcast
    pub revocation_pubkey: PublicKey,

    /// Broadcaster's CSV-delayed key in `to_local` and second-stage
    /// outputs
    pub local_delayed_pubkey: PublicKey,

    /// Non-broadcaster's key receiving the `to_remote` output
    pub remote_payment_key: PublicKey,

    /// Broadcaster's HTLC key
    pub local_htlc_pubkey: PublicKey,

    /// Non-broadcaster's HTLC key
    pub remote_htlc_pubkey: PublicKey,
}

/// An HTLC from the broadcaster's point of view, as it enters the
/// commitment transaction
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct HtlcInfo {
    /// HTLC id within its direction
    pub id: u64,

    /// `true` if the broadcaster offered this HTLC, `false` if it is
    /// received
    pub offered: bool,

    pub amount_msat: u64,

    pub payment_hash: HashLock,

    pub cltv_expiry: u32,
}

/// An untrimmed HTLC output of a built commitment
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct HtlcOutput {
    /// Output index within the commitment transaction
    pub vout: u32,

    pub htlc: HtlcInfo,

    /// Witness script of the P2WSH output
    pub witness_script: Script,
}

/// A fully built commitment transaction with metadata needed for signing
/// and claiming its outputs
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct CommitmentTemplate {
    pub tx: Transaction,

    /// Untrimmed HTLCs, ordered by their output index (the order HTLC
    /// signatures travel in `commitment_signed`)
    pub htlc_outputs: Vec<HtlcOutput>,

    /// Output index of `to_local`, unless trimmed
    pub to_local: Option<u32>,

    /// Witness script of the `to_local` output
    pub to_local_script: Script,

    /// Output index of `to_remote`, unless trimmed
    pub to_remote: Option<u32>,

    /// Fee actually paid by the funder
    pub fee: u64,
}

// An output candidate before deterministic ordering. The CLTV tie-breaker
// only applies between HTLC outputs sharing amount and script.
struct PlannedOutput {
    txout: TxOut,
    cltv: u32,
    htlc: Option<(HtlcInfo, Script)>,
    is_to_local: bool,
    is_to_remote: bool,
}

/// Builder of the commitment transactions of one channel. One instance per
/// commitment owner: `build` is called with that owner's balances and
/// tweaked keys.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct CommitmentBuilder {
    pub funding_outpoint: OutPoint,
    pub funding_amount: u64,
    pub obscuring_factor: u64,

    /// Dust limit of the commitment owner
    pub dust_limit: u64,

    /// CSV delay imposed on the commitment owner
    pub to_self_delay: u16,

    /// Whether the commitment owner funds the channel (and thus pays the
    /// fee)
    pub owner_is_funder: bool,

    pub anchors: bool,

    /// Funding keys, needed for anchor outputs
    pub local_funding_pubkey: PublicKey,
    pub remote_funding_pubkey: PublicKey,
}

impl CommitmentBuilder {
    pub fn build(
        &self,
        commitment_number: u64,
        to_local_msat: u64,
        to_remote_msat: u64,
        feerate_per_kw: u32,
        keys: &CommitmentKeys,
        htlcs: &[HtlcInfo],
    ) -> Result<CommitmentTemplate, Error> {
        if commitment_number > super::COMMITMENT_NUMBER_MASK {
            return Err(Error::CommitmentNumberOverflow(commitment_number));
        }

        // Dust pruning happens before fee computation: only untrimmed
        // HTLCs count towards the weight.
        let untrimmed: Vec<&HtlcInfo> = htlcs
            .iter()
            .filter(|htlc| htlc.amount_msat / 1000 > self.dust_limit)
            .collect();

        let fee =
            commit_tx_fee(feerate_per_kw, untrimmed.len(), self.anchors);
        let anchor_cost = if self.anchors {
            2 * ANCHOR_OUTPUT_VALUE
        } else {
            0
        };

        let (mut local_msat, mut remote_msat) =
            (to_local_msat, to_remote_msat);
        let funder_charge = (fee + anchor_cost) * 1000;
        if self.owner_is_funder {
            if local_msat < funder_charge {
                return Err(Error::FunderCannotAffordFee {
                    available: local_msat,
                    required: funder_charge,
                });
            }
            local_msat -= funder_charge;
        } else {
            if remote_msat < funder_charge {
                return Err(Error::FunderCannotAffordFee {
                    available: remote_msat,
                    required: funder_charge,
                });
            }
            remote_msat -= funder_charge;
        }

        let mut planned = Vec::with_capacity(untrimmed.len() + 4);

        let to_local_script = Script::ln_to_local(
            0,
            keys.revocation_pubkey,
            keys.local_delayed_pubkey,
            self.to_self_delay,
        );
        if local_msat / 1000 > self.dust_limit {
            planned.push(PlannedOutput {
                txout: TxOut {
                    value: local_msat / 1000,
                    script_pubkey: to_local_script.to_v0_p2wsh(),
                },
                cltv: 0,
                htlc: None,
                is_to_local: true,
                is_to_remote: false,
            });
        }
        if remote_msat / 1000 > self.dust_limit {
            let txout = if self.anchors {
                TxOut::ln_to_remote_anchored(
                    remote_msat / 1000,
                    keys.remote_payment_key,
                )
            } else {
                TxOut::ln_to_remote_v1(
                    remote_msat / 1000,
                    keys.remote_payment_key,
                )
            };
            planned.push(PlannedOutput {
                txout,
                cltv: 0,
                htlc: None,
                is_to_local: false,
                is_to_remote: true,
            });
        }
        if self.anchors {
            // Anchors are present only when the matching main output (or
            // any HTLC) exists for the respective side.
            if local_msat / 1000 > self.dust_limit || !untrimmed.is_empty()
            {
                planned.push(PlannedOutput {
                    txout: TxOut::ln_anchor(self.local_funding_pubkey),
                    cltv: 0,
                    htlc: None,
                    is_to_local: false,
                    is_to_remote: false,
                });
            }
            if remote_msat / 1000 > self.dust_limit
                || !untrimmed.is_empty()
            {
                planned.push(PlannedOutput {
                    txout: TxOut::ln_anchor(self.remote_funding_pubkey),
                    cltv: 0,
                    htlc: None,
                    is_to_local: false,
                    is_to_remote: false,
                });
            }
        }

        for htlc in untrimmed {
            let witness_script = if htlc.offered {
                Script::ln_offered_htlc(
                    0,
                    keys.revocation_pubkey,
                    keys.local_htlc_pubkey,
                    keys.remote_htlc_pubkey,
                    htlc.payment_hash,
                    self.anchors,
                )
            } else {
                Script::ln_received_htlc(
                    0,
                    keys.revocation_pubkey,
                    keys.local_htlc_pubkey,
                    keys.remote_htlc_pubkey,
                    htlc.cltv_expiry,
                    htlc.payment_hash,
                    self.anchors,
                )
            };
            planned.push(PlannedOutput {
                txout: TxOut {
                    value: htlc.amount_msat / 1000,
                    script_pubkey: witness_script.to_v0_p2wsh(),
                },
                cltv: htlc.cltv_expiry,
                htlc: Some((*htlc, witness_script)),
                is_to_local: false,
                is_to_remote: false,
            });
        }

        if planned.is_empty() {
            return Err(Error::AllOutputsTrimmed);
        }

        // BIP-69 with the BOLT-3 extension: amount, then scriptpubkey,
        // then cltv_expiry for otherwise identical HTLC outputs
        planned.sort_by(|a, b| {
            a.txout
                .value
                .cmp(&b.txout.value)
                .then_with(|| {
                    a.txout
                        .script_pubkey
                        .as_bytes()
                        .cmp(b.txout.script_pubkey.as_bytes())
                })
                .then_with(|| a.cltv.cmp(&b.cltv))
        });

        let (locktime, sequence) = obscured_commitment_number(
            commitment_number,
            self.obscuring_factor,
        );

        let mut outputs = Vec::with_capacity(planned.len());
        let mut htlc_outputs = vec![];
        let mut to_local = None;
        let mut to_remote = None;
        for (vout, part) in planned.into_iter().enumerate() {
            if part.is_to_local {
                to_local = Some(vout as u32);
            }
            if part.is_to_remote {
                to_remote = Some(vout as u32);
            }
            if let Some((htlc, witness_script)) = part.htlc {
                htlc_outputs.push(HtlcOutput {
                    vout: vout as u32,
                    htlc,
                    witness_script,
                });
            }
            outputs.push(part.txout);
        }

        let tx = Transaction {
            version: TX_VERSION,
            lock_time: PackedLockTime(locktime),
            input: vec![TxIn {
                previous_output: self.funding_outpoint,
                script_sig: Script::new(),
                sequence: Sequence(sequence),
                witness: Witness::new(),
            }],
            output: outputs,
        };

        Ok(CommitmentTemplate {
            tx,
            htlc_outputs,
            to_local,
            to_local_script,
            to_remote,
            fee,
        })
    }
}

/// BIP-143 sighash of the funding input of a commitment (or closing)
/// transaction
pub fn funding_input_sighash(
    tx: &Transaction,
    funding_script: &Script,
    funding_amount: u64,
) -> Slice32 {
    let sighash = SighashCache::new(tx)
        .segwit_signature_hash(
            0,
            funding_script,
            funding_amount,
            EcdsaSighashType::All,
        )
        .expect("commitment transactions always have input 0");
    Slice32::from_inner(sighash.into_inner())
}

/// BIP-143 sighash of an HTLC output spend (second-stage transaction or
/// direct claim)
pub fn htlc_output_sighash(
    tx: &Transaction,
    input_index: usize,
    witness_script: &Script,
    amount: u64,
) -> Slice32 {
    let sighash = SighashCache::new(tx)
        .segwit_signature_hash(
            input_index,
            witness_script,
            amount,
            EcdsaSighashType::All,
        )
        .expect("input index is taken from the same transaction");
    Slice32::from_inner(sighash.into_inner())
}

fn sig_with_hashtype(sig: &Signature) -> Vec<u8> {
    let mut data = sig.serialize_der().to_vec();
    data.push(EcdsaSighashType::All.to_u32() as u8);
    data
}

/// Witness satisfying the funding 2-of-2: signatures must follow the
/// lexicographic order of the funding pubkeys
pub fn spend_funding_witness(
    local_funding_pubkey: &PublicKey,
    remote_funding_pubkey: &PublicKey,
    local_sig: &Signature,
    remote_sig: &Signature,
    funding_script: &Script,
) -> Witness {
    let (first_sig, second_sig) = if local_funding_pubkey.serialize()
        < remote_funding_pubkey.serialize()
    {
        (local_sig, remote_sig)
    } else {
        (remote_sig, local_sig)
    };
    Witness::from_vec(vec![
        vec![],
        sig_with_hashtype(first_sig),
        sig_with_hashtype(second_sig),
        funding_script.to_bytes(),
    ])
}

fn htlc_second_stage_tx(
    commitment_txid: bitcoin::Txid,
    vout: u32,
    amount: u64,
    locktime: u32,
    revocation_pubkey: PublicKey,
    local_delayed_pubkey: PublicKey,
    to_self_delay: u16,
    anchors: bool,
) -> Transaction {
    Transaction {
        version: TX_VERSION,
        lock_time: PackedLockTime(locktime),
        input: vec![TxIn {
            previous_output: OutPoint {
                txid: commitment_txid,
                vout,
            },
            script_sig: Script::new(),
            sequence: Sequence(if anchors { 1 } else { 0 }),
            witness: Witness::new(),
        }],
        output: vec![TxOut::ln_to_local(
            amount,
            revocation_pubkey,
            local_delayed_pubkey,
            to_self_delay,
        )],
    }
}

/// Second-stage transaction timing out an offered HTLC. Locktime carries
/// the CLTV expiry; the output is delayed back to the broadcaster.
#[allow(clippy::too_many_arguments)]
pub fn htlc_timeout_tx(
    commitment_txid: bitcoin::Txid,
    htlc_output: &HtlcOutput,
    feerate_per_kw: u32,
    revocation_pubkey: PublicKey,
    local_delayed_pubkey: PublicKey,
    to_self_delay: u16,
    anchors: bool,
) -> Transaction {
    let amount = htlc_output.htlc.amount_msat / 1000
        - htlc_timeout_fee(feerate_per_kw, anchors);
    htlc_second_stage_tx(
        commitment_txid,
        htlc_output.vout,
        amount,
        htlc_output.htlc.cltv_expiry,
        revocation_pubkey,
        local_delayed_pubkey,
        to_self_delay,
        anchors,
    )
}

/// Second-stage transaction claiming a received HTLC with its preimage
#[allow(clippy::too_many_arguments)]
pub fn htlc_success_tx(
    commitment_txid: bitcoin::Txid,
    htlc_output: &HtlcOutput,
    feerate_per_kw: u32,
    revocation_pubkey: PublicKey,
    local_delayed_pubkey: PublicKey,
    to_self_delay: u16,
    anchors: bool,
) -> Transaction {
    let amount = htlc_output.htlc.amount_msat / 1000
        - htlc_success_fee(feerate_per_kw, anchors);
    htlc_second_stage_tx(
        commitment_txid,
        htlc_output.vout,
        amount,
        0,
        revocation_pubkey,
        local_delayed_pubkey,
        to_self_delay,
        anchors,
    )
}

/// Witness of the HTLC-timeout input: `0 <remote_sig> <local_sig> <>
/// <witness_script>`
pub fn htlc_timeout_witness(
    remote_sig: &Signature,
    local_sig: &Signature,
    witness_script: &Script,
) -> Witness {
    Witness::from_vec(vec![
        vec![],
        sig_with_hashtype(remote_sig),
        sig_with_hashtype(local_sig),
        vec![],
        witness_script.to_bytes(),
    ])
}

/// Witness of the HTLC-success input: `0 <remote_sig> <local_sig>
/// <preimage> <witness_script>`
pub fn htlc_success_witness(
    remote_sig: &Signature,
    local_sig: &Signature,
    preimage: HashPreimage,
    witness_script: &Script,
) -> Witness {
    Witness::from_vec(vec![
        vec![],
        sig_with_hashtype(remote_sig),
        sig_with_hashtype(local_sig),
        preimage.as_inner().as_inner().to_vec(),
        witness_script.to_bytes(),
    ])
}

#[cfg(test)]
mod test {
    use bitcoin::consensus::Encodable;
    use bitcoin::hashes::Hash;
    use bitcoin::Txid;
    use secp256k1::{SecretKey, SECP256K1};

    use super::super::obscuring_factor;
    use super::*;
    use crate::keys::{sign_hash, verify_hash_sig};

    fn pubkey(byte: u8) -> PublicKey {
        PublicKey::from_secret_key(
            SECP256K1,
            &SecretKey::from_slice(&[byte; 32]).unwrap(),
        )
    }

    fn test_keys() -> CommitmentKeys {
        CommitmentKeys {
            revocation_pubkey: pubkey(11),
            local_delayed_pubkey: pubkey(12),
            remote_payment_key: pubkey(13),
            local_htlc_pubkey: pubkey(14),
            remote_htlc_pubkey: pubkey(15),
        }
    }

    fn test_builder() -> CommitmentBuilder {
        CommitmentBuilder {
            funding_outpoint: OutPoint {
                txid: Txid::from_slice(&[8u8; 32]).unwrap(),
                vout: 0,
            },
            funding_amount: 200_000,
            obscuring_factor: obscuring_factor(&pubkey(1), &pubkey(2)),
            dust_limit: 546,
            to_self_delay: 144,
            owner_is_funder: true,
            anchors: false,
            local_funding_pubkey: pubkey(1),
            remote_funding_pubkey: pubkey(2),
        }
    }

    fn htlc(id: u64, offered: bool, amount_msat: u64) -> HtlcInfo {
        HtlcInfo {
            id,
            offered,
            amount_msat,
            payment_hash: HashLock::from_inner(amplify::Slice32::from_inner(
                [id as u8 + 1; 32],
            )),
            cltv_expiry: 500_000 + id as u32,
        }
    }

    fn serialize(tx: &Transaction) -> Vec<u8> {
        let mut data = vec![];
        tx.consensus_encode(&mut data).unwrap();
        data
    }

    #[test]
    fn empty_commitment_has_two_outputs() {
        let template = test_builder()
            .build(0, 150_000_000, 50_000_000, 253, &test_keys(), &[])
            .unwrap();
        assert_eq!(template.tx.output.len(), 2);
        assert!(template.to_local.is_some());
        assert!(template.to_remote.is_some());
        assert_eq!(template.fee, 184);
        // funder pays the fee
        let local_vout = template.to_local.unwrap() as usize;
        assert_eq!(template.tx.output[local_vout].value, 150_000 - 184);
    }

    #[test]
    fn commitment_number_is_obscured() {
        let builder = test_builder();
        let template = builder
            .build(42, 150_000_000, 50_000_000, 253, &test_keys(), &[])
            .unwrap();
        assert_eq!(
            super::super::recover_commitment_number(
                template.tx.lock_time.0,
                template.tx.input[0].sequence.0,
                builder.obscuring_factor,
            ),
            42
        );
    }

    #[test]
    fn rebuild_is_byte_identical() {
        let builder = test_builder();
        let htlcs = vec![
            htlc(0, true, 50_000_000),
            htlc(1, false, 30_000_000),
            htlc(2, true, 30_000_000),
        ];
        let mut reversed = htlcs.clone();
        reversed.reverse();

        let first = builder
            .build(5, 100_000_000, 50_000_000, 253, &test_keys(), &htlcs)
            .unwrap();
        let second = builder
            .build(5, 100_000_000, 50_000_000, 253, &test_keys(), &reversed)
            .unwrap();
        assert_eq!(serialize(&first.tx), serialize(&second.tx));
    }

    #[test]
    fn outputs_are_bip69_sorted() {
        let template = test_builder()
            .build(
                1,
                100_000_000,
                50_000_000,
                253,
                &test_keys(),
                &[htlc(0, true, 40_000_000), htlc(1, false, 2_000_000)],
            )
            .unwrap();
        let values: Vec<u64> =
            template.tx.output.iter().map(|txout| txout.value).collect();
        let mut sorted = values.clone();
        sorted.sort_unstable();
        assert_eq!(values, sorted);
    }

    #[test]
    fn dust_htlcs_are_trimmed() {
        let builder = test_builder();
        // exactly at dust limit: excluded
        let at_dust = builder
            .build(
                1,
                100_000_000,
                50_000_000,
                0,
                &test_keys(),
                &[htlc(0, true, builder.dust_limit * 1000)],
            )
            .unwrap();
        assert!(at_dust.htlc_outputs.is_empty());
        // one satoshi above: included
        let above_dust = builder
            .build(
                1,
                100_000_000,
                50_000_000,
                0,
                &test_keys(),
                &[htlc(0, true, (builder.dust_limit + 1) * 1000)],
            )
            .unwrap();
        assert_eq!(above_dust.htlc_outputs.len(), 1);
    }

    #[test]
    fn funder_fee_exhaustion_is_detected() {
        let result = test_builder().build(
            0,
            100_000, // 100 sat cannot pay a 184 sat fee
            199_900_000,
            253,
            &test_keys(),
            &[],
        );
        assert!(matches!(
            result,
            Err(Error::FunderCannotAffordFee { .. })
        ));
    }

    #[test]
    fn anchors_add_two_outputs() {
        let mut builder = test_builder();
        builder.anchors = true;
        let template = builder
            .build(0, 100_000_000, 50_000_000, 253, &test_keys(), &[])
            .unwrap();
        assert_eq!(template.tx.output.len(), 4);
        let anchor_count = template
            .tx
            .output
            .iter()
            .filter(|txout| txout.value == ANCHOR_OUTPUT_VALUE)
            .count();
        assert_eq!(anchor_count, 2);
    }

    #[test]
    fn funding_sighash_signature_roundtrip() {
        let builder = test_builder();
        let template = builder
            .build(0, 100_000_000, 50_000_000, 253, &test_keys(), &[])
            .unwrap();
        let funding_script =
            Script::ln_funding(0, pubkey(1), pubkey(2));
        let sighash = funding_input_sighash(
            &template.tx,
            &funding_script,
            builder.funding_amount,
        );
        let sk = SecretKey::from_slice(&[1u8; 32]).unwrap();
        let sig = sign_hash(SECP256K1, sighash, &sk);
        assert!(verify_hash_sig(SECP256K1, sighash, &sig, &pubkey(1)));
    }

    #[test]
    fn htlc_timeout_locks_to_expiry() {
        let builder = test_builder();
        let template = builder
            .build(
                3,
                100_000_000,
                50_000_000,
                253,
                &test_keys(),
                &[htlc(7, true, 50_000_000)],
            )
            .unwrap();
        let htlc_output = &template.htlc_outputs[0];
        let timeout_tx = htlc_timeout_tx(
            template.tx.txid(),
            htlc_output,
            253,
            test_keys().revocation_pubkey,
            test_keys().local_delayed_pubkey,
            144,
            false,
        );
        assert_eq!(
            timeout_tx.lock_time.0,
            htlc_output.htlc.cltv_expiry
        );
        assert_eq!(timeout_tx.input[0].sequence, Sequence(0));
        assert_eq!(
            timeout_tx.output[0].value,
            50_000 - super::super::htlc_timeout_fee(253, false)
        );
    }
}
