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

//! BOLT-3 transaction construction: commitment and HTLC transactions, their
//! scripts, weights, fees and the obscured commitment number encoding.

mod scripts;
mod tx;

pub use scripts::ScriptGenerators;
pub use tx::{
    funding_input_sighash, htlc_output_sighash, htlc_success_tx,
    htlc_success_witness, htlc_timeout_tx, htlc_timeout_witness,
    spend_funding_witness, CommitmentBuilder, CommitmentKeys,
    CommitmentTemplate, Error, HtlcInfo, HtlcOutput,
};

use bitcoin::hashes::{sha256, Hash, HashEngine};
use secp256k1::PublicKey;

/// Version of all channel transactions
pub const TX_VERSION: i32 = 2;

/// Weight of a commitment transaction without HTLC outputs and without
/// anchors
pub const BASE_COMMITMENT_WEIGHT: u64 = 724;

/// Weight added by each untrimmed HTLC output
pub const COMMITMENT_WEIGHT_PER_HTLC: u64 = 172;

/// Weight added by the pair of anchor outputs
pub const ANCHOR_ADDED_WEIGHT: u64 = 2 * 330;

/// Value of each anchor output in satoshi
pub const ANCHOR_OUTPUT_VALUE: u64 = 330;

/// Weight of the HTLC-timeout transaction
pub const HTLC_TIMEOUT_WEIGHT: u64 = 663;
/// Weight of the HTLC-success transaction
pub const HTLC_SUCCESS_WEIGHT: u64 = 703;
/// Weight of the HTLC-timeout transaction under anchors (CSV-1 input)
pub const HTLC_TIMEOUT_WEIGHT_ANCHORS: u64 = 666;
/// Weight of the HTLC-success transaction under anchors (CSV-1 input)
pub const HTLC_SUCCESS_WEIGHT_ANCHORS: u64 = 706;

/// Mask of the 48 bits a commitment number occupies
pub const COMMITMENT_NUMBER_MASK: u64 = (1 << 48) - 1;

/// Weight of a commitment carrying `htlc_count` untrimmed HTLCs
#[inline]
pub fn commitment_weight(htlc_count: usize, anchors: bool) -> u64 {
    BASE_COMMITMENT_WEIGHT
        + COMMITMENT_WEIGHT_PER_HTLC * htlc_count as u64
        + if anchors { ANCHOR_ADDED_WEIGHT } else { 0 }
}

/// Fee of a transaction of the given weight, rounded up
#[inline]
pub fn weight_to_fee(weight: u64, feerate_per_kw: u32) -> u64 {
    (weight * feerate_per_kw as u64 + 999) / 1000
}

/// Commitment transaction fee paid by the funder
#[inline]
pub fn commit_tx_fee(
    feerate_per_kw: u32,
    htlc_count: usize,
    anchors: bool,
) -> u64 {
    weight_to_fee(commitment_weight(htlc_count, anchors), feerate_per_kw)
}

/// Fee of the second-stage HTLC-timeout transaction
#[inline]
pub fn htlc_timeout_fee(feerate_per_kw: u32, anchors: bool) -> u64 {
    if anchors {
        weight_to_fee(HTLC_TIMEOUT_WEIGHT_ANCHORS, feerate_per_kw)
    } else {
        weight_to_fee(HTLC_TIMEOUT_WEIGHT, feerate_per_kw)
    }
}

/// Fee of the second-stage HTLC-success transaction
#[inline]
pub fn htlc_success_fee(feerate_per_kw: u32, anchors: bool) -> u64 {
    if anchors {
        weight_to_fee(HTLC_SUCCESS_WEIGHT_ANCHORS, feerate_per_kw)
    } else {
        weight_to_fee(HTLC_SUCCESS_WEIGHT, feerate_per_kw)
    }
}

/// The 48-bit factor obscuring commitment numbers in the locktime and
/// sequence fields: `SHA256(open_payment_basepoint ||
/// accept_payment_basepoint)`, lower 6 bytes.
pub fn obscuring_factor(
    open_payment_basepoint: &PublicKey,
    accept_payment_basepoint: &PublicKey,
) -> u64 {
    let mut engine = sha256::Hash::engine();
    engine.input(&open_payment_basepoint.serialize());
    engine.input(&accept_payment_basepoint.serialize());
    let hash = sha256::Hash::from_engine(engine);
    let mut buf = [0u8; 8];
    buf[2..].copy_from_slice(&hash.into_inner()[26..]);
    u64::from_be_bytes(buf)
}

/// Encodes an obscured commitment number into the `(locktime, sequence)`
/// pair of a commitment transaction
pub fn obscured_commitment_number(
    commitment_number: u64,
    obscuring_factor: u64,
) -> (u32, u32) {
    let obscured =
        (commitment_number ^ obscuring_factor) & COMMITMENT_NUMBER_MASK;
    let locktime = 0x2000_0000 | (obscured & 0x00FF_FFFF) as u32;
    let sequence = 0x8000_0000 | ((obscured >> 24) & 0x00FF_FFFF) as u32;
    (locktime, sequence)
}

/// Recovers the commitment number from the `(locktime, sequence)` pair of
/// an observed commitment transaction
pub fn recover_commitment_number(
    locktime: u32,
    sequence: u32,
    obscuring_factor: u64,
) -> u64 {
    let obscured = ((sequence as u64 & 0x00FF_FFFF) << 24)
        | (locktime as u64 & 0x00FF_FFFF);
    (obscured ^ obscuring_factor) & COMMITMENT_NUMBER_MASK
}

#[cfg(test)]
mod test {
    use secp256k1::{SecretKey, SECP256K1};

    use super::*;

    fn pubkey(byte: u8) -> PublicKey {
        PublicKey::from_secret_key(
            SECP256K1,
            &SecretKey::from_slice(&[byte; 32]).unwrap(),
        )
    }

    #[test]
    fn commitment_number_obscuring_roundtrip() {
        let factor = obscuring_factor(&pubkey(1), &pubkey(2));
        assert!(factor <= COMMITMENT_NUMBER_MASK);
        for ctn in [
            0u64,
            1,
            42,
            0xFF_FFFF,
            0x1_000000,
            0xDEAD_BEEF_CAFE & COMMITMENT_NUMBER_MASK,
            COMMITMENT_NUMBER_MASK,
        ] {
            let (locktime, sequence) =
                obscured_commitment_number(ctn, factor);
            assert_eq!(locktime >> 24, 0x20);
            assert_eq!(sequence >> 24, 0x80);
            assert_eq!(
                recover_commitment_number(locktime, sequence, factor),
                ctn
            );
        }
    }

    #[test]
    fn obscuring_factor_depends_on_direction() {
        assert_ne!(
            obscuring_factor(&pubkey(1), &pubkey(2)),
            obscuring_factor(&pubkey(2), &pubkey(1))
        );
    }

    #[test]
    fn fees_round_up() {
        // 724 * 253 / 1000 = 183.172
        assert_eq!(commit_tx_fee(253, 0, false), 184);
        assert_eq!(commit_tx_fee(0, 10, true), 0);
        // each HTLC adds 172 weight
        assert_eq!(
            commitment_weight(2, false) - commitment_weight(0, false),
            2 * COMMITMENT_WEIGHT_PER_HTLC
        );
        assert_eq!(
            commitment_weight(0, true) - commitment_weight(0, false),
            ANCHOR_ADDED_WEIGHT
        );
    }
}
