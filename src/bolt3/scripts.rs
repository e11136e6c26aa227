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

//! BOLT-3 script templates. The byte layouts produced here are consensus
//! contracts; every opcode matches the BOLT-3 appendix.

use bitcoin::blockdata::opcodes::all::*;
use bitcoin::blockdata::script;
use bitcoin::hashes::{ripemd160, Hash};
use bitcoin::{Script, TxOut};
use lnc_p2p::bolt::HashLock;
use secp256k1::PublicKey;

use super::ANCHOR_OUTPUT_VALUE;

fn bitcoin_pk(pk: PublicKey) -> bitcoin::PublicKey {
    bitcoin::PublicKey::new(pk)
}

// HTLC scripts commit to RIPEMD160(payment_hash), so a preimage can be
// checked on-script with a single OP_HASH160.
fn payment_hash160(payment_hash: HashLock) -> ripemd160::Hash {
    ripemd160::Hash::hash(payment_hash.as_ref())
}

/// Generators of the BOLT-3 witness scripts and transaction outputs.
///
/// Implemented for [`Script`] producing the witness scripts and for
/// [`TxOut`] producing the final P2WSH/P2WPKH outputs.
pub trait ScriptGenerators {
    /// 2-of-2 multisig locking the funding outpoint; keys sorted
    /// lexicographically by their serialization
    fn ln_funding(
        amount: u64,
        local_pubkey: PublicKey,
        remote_pubkey: PublicKey,
    ) -> Self;

    /// Broadcaster's main output: revocable or CSV-delayed to self
    fn ln_to_local(
        amount: u64,
        revocationpubkey: PublicKey,
        local_delayedpubkey: PublicKey,
        to_self_delay: u16,
    ) -> Self;

    /// Non-broadcaster's main output under `option_static_remotekey`
    fn ln_to_remote_v1(amount: u64, remote_pubkey: PublicKey) -> Self;

    /// Non-broadcaster's main output under anchor channel types: CSV-1
    /// encumbered P2WSH
    fn ln_to_remote_anchored(amount: u64, remote_pubkey: PublicKey) -> Self;

    /// HTLC offered by the commitment broadcaster
    fn ln_offered_htlc(
        amount: u64,
        revocationpubkey: PublicKey,
        local_htlcpubkey: PublicKey,
        remote_htlcpubkey: PublicKey,
        payment_hash: HashLock,
        anchors: bool,
    ) -> Self;

    /// HTLC received by the commitment broadcaster
    #[allow(clippy::too_many_arguments)]
    fn ln_received_htlc(
        amount: u64,
        revocationpubkey: PublicKey,
        local_htlcpubkey: PublicKey,
        remote_htlcpubkey: PublicKey,
        cltv_expiry: u32,
        payment_hash: HashLock,
        anchors: bool,
    ) -> Self;

    /// CPFP anchor output
    fn ln_anchor(funding_pubkey: PublicKey) -> Self;
}

impl ScriptGenerators for Script {
    fn ln_funding(
        _: u64,
        local_pubkey: PublicKey,
        remote_pubkey: PublicKey,
    ) -> Self {
        let (first, second) =
            if local_pubkey.serialize() < remote_pubkey.serialize() {
                (local_pubkey, remote_pubkey)
            } else {
                (remote_pubkey, local_pubkey)
            };
        script::Builder::new()
            .push_int(2)
            .push_key(&bitcoin_pk(first))
            .push_key(&bitcoin_pk(second))
            .push_int(2)
            .push_opcode(OP_CHECKMULTISIG)
            .into_script()
    }

    fn ln_to_local(
        _: u64,
        revocationpubkey: PublicKey,
        local_delayedpubkey: PublicKey,
        to_self_delay: u16,
    ) -> Self {
        script::Builder::new()
            .push_opcode(OP_IF)
            .push_key(&bitcoin_pk(revocationpubkey))
            .push_opcode(OP_ELSE)
            .push_int(to_self_delay as i64)
            .push_opcode(OP_CSV)
            .push_opcode(OP_DROP)
            .push_key(&bitcoin_pk(local_delayedpubkey))
            .push_opcode(OP_ENDIF)
            .push_opcode(OP_CHECKSIG)
            .into_script()
    }

    fn ln_to_remote_v1(_: u64, remote_pubkey: PublicKey) -> Self {
        Script::new_v0_p2wpkh(
            &bitcoin_pk(remote_pubkey)
                .wpubkey_hash()
                .expect("compressed key"),
        )
    }

    fn ln_to_remote_anchored(_: u64, remote_pubkey: PublicKey) -> Self {
        script::Builder::new()
            .push_key(&bitcoin_pk(remote_pubkey))
            .push_opcode(OP_CHECKSIGVERIFY)
            .push_int(1)
            .push_opcode(OP_CSV)
            .into_script()
    }

    fn ln_offered_htlc(
        _: u64,
        revocationpubkey: PublicKey,
        local_htlcpubkey: PublicKey,
        remote_htlcpubkey: PublicKey,
        payment_hash: HashLock,
        anchors: bool,
    ) -> Self {
        let builder = script::Builder::new()
            .push_opcode(OP_DUP)
            .push_opcode(OP_HASH160)
            .push_slice(&bitcoin_pk(revocationpubkey).pubkey_hash())
            .push_opcode(OP_EQUAL)
            .push_opcode(OP_IF)
            .push_opcode(OP_CHECKSIG)
            .push_opcode(OP_ELSE)
            .push_key(&bitcoin_pk(remote_htlcpubkey))
            .push_opcode(OP_SWAP)
            .push_opcode(OP_SIZE)
            .push_int(32)
            .push_opcode(OP_EQUAL)
            .push_opcode(OP_NOTIF)
            .push_opcode(OP_DROP)
            .push_int(2)
            .push_opcode(OP_SWAP)
            .push_key(&bitcoin_pk(local_htlcpubkey))
            .push_int(2)
            .push_opcode(OP_CHECKMULTISIG)
            .push_opcode(OP_ELSE)
            .push_opcode(OP_HASH160)
            .push_slice(&payment_hash160(payment_hash))
            .push_opcode(OP_EQUALVERIFY)
            .push_opcode(OP_CHECKSIG)
            .push_opcode(OP_ENDIF);
        let builder = if anchors {
            builder
                .push_int(1)
                .push_opcode(OP_CSV)
                .push_opcode(OP_DROP)
        } else {
            builder
        };
        builder.push_opcode(OP_ENDIF).into_script()
    }

    fn ln_received_htlc(
        _: u64,
        revocationpubkey: PublicKey,
        local_htlcpubkey: PublicKey,
        remote_htlcpubkey: PublicKey,
        cltv_expiry: u32,
        payment_hash: HashLock,
        anchors: bool,
    ) -> Self {
        let builder = script::Builder::new()
            .push_opcode(OP_DUP)
            .push_opcode(OP_HASH160)
            .push_slice(&bitcoin_pk(revocationpubkey).pubkey_hash())
            .push_opcode(OP_EQUAL)
            .push_opcode(OP_IF)
            .push_opcode(OP_CHECKSIG)
            .push_opcode(OP_ELSE)
            .push_key(&bitcoin_pk(remote_htlcpubkey))
            .push_opcode(OP_SWAP)
            .push_opcode(OP_SIZE)
            .push_int(32)
            .push_opcode(OP_EQUAL)
            .push_opcode(OP_IF)
            .push_opcode(OP_HASH160)
            .push_slice(&payment_hash160(payment_hash))
            .push_opcode(OP_EQUALVERIFY)
            .push_int(2)
            .push_opcode(OP_SWAP)
            .push_key(&bitcoin_pk(local_htlcpubkey))
            .push_int(2)
            .push_opcode(OP_CHECKMULTISIG)
            .push_opcode(OP_ELSE)
            .push_opcode(OP_DROP)
            .push_int(cltv_expiry as i64)
            .push_opcode(OP_CLTV)
            .push_opcode(OP_DROP)
            .push_opcode(OP_CHECKSIG)
            .push_opcode(OP_ENDIF);
        let builder = if anchors {
            builder
                .push_int(1)
                .push_opcode(OP_CSV)
                .push_opcode(OP_DROP)
        } else {
            builder
        };
        builder.push_opcode(OP_ENDIF).into_script()
    }

    fn ln_anchor(funding_pubkey: PublicKey) -> Self {
        script::Builder::new()
            .push_key(&bitcoin_pk(funding_pubkey))
            .push_opcode(OP_CHECKSIG)
            .push_opcode(OP_IFDUP)
            .push_opcode(OP_NOTIF)
            .push_int(16)
            .push_opcode(OP_CSV)
            .push_opcode(OP_ENDIF)
            .into_script()
    }
}

impl ScriptGenerators for TxOut {
    #[inline]
    fn ln_funding(
        amount: u64,
        local_pubkey: PublicKey,
        remote_pubkey: PublicKey,
    ) -> Self {
        TxOut {
            value: amount,
            script_pubkey: Script::ln_funding(
                amount,
                local_pubkey,
                remote_pubkey,
            )
            .to_v0_p2wsh(),
        }
    }

    #[inline]
    fn ln_to_local(
        amount: u64,
        revocationpubkey: PublicKey,
        local_delayedpubkey: PublicKey,
        to_self_delay: u16,
    ) -> Self {
        TxOut {
            value: amount,
            script_pubkey: Script::ln_to_local(
                amount,
                revocationpubkey,
                local_delayedpubkey,
                to_self_delay,
            )
            .to_v0_p2wsh(),
        }
    }

    #[inline]
    fn ln_to_remote_v1(amount: u64, remote_pubkey: PublicKey) -> Self {
        TxOut {
            value: amount,
            script_pubkey: Script::ln_to_remote_v1(amount, remote_pubkey),
        }
    }

    #[inline]
    fn ln_to_remote_anchored(
        amount: u64,
        remote_pubkey: PublicKey,
    ) -> Self {
        TxOut {
            value: amount,
            script_pubkey: Script::ln_to_remote_anchored(
                amount,
                remote_pubkey,
            )
            .to_v0_p2wsh(),
        }
    }

    #[inline]
    fn ln_offered_htlc(
        amount: u64,
        revocationpubkey: PublicKey,
        local_htlcpubkey: PublicKey,
        remote_htlcpubkey: PublicKey,
        payment_hash: HashLock,
        anchors: bool,
    ) -> Self {
        TxOut {
            value: amount,
            script_pubkey: Script::ln_offered_htlc(
                amount,
                revocationpubkey,
                local_htlcpubkey,
                remote_htlcpubkey,
                payment_hash,
                anchors,
            )
            .to_v0_p2wsh(),
        }
    }

    #[inline]
    fn ln_received_htlc(
        amount: u64,
        revocationpubkey: PublicKey,
        local_htlcpubkey: PublicKey,
        remote_htlcpubkey: PublicKey,
        cltv_expiry: u32,
        payment_hash: HashLock,
        anchors: bool,
    ) -> Self {
        TxOut {
            value: amount,
            script_pubkey: Script::ln_received_htlc(
                amount,
                revocationpubkey,
                local_htlcpubkey,
                remote_htlcpubkey,
                cltv_expiry,
                payment_hash,
                anchors,
            )
            .to_v0_p2wsh(),
        }
    }

    #[inline]
    fn ln_anchor(funding_pubkey: PublicKey) -> Self {
        TxOut {
            value: ANCHOR_OUTPUT_VALUE,
            script_pubkey: Script::ln_anchor(funding_pubkey).to_v0_p2wsh(),
        }
    }
}

#[cfg(test)]
mod test {
    use amplify::hex::ToHex;
    use lnc_p2p::bolt::HashPreimage;
    use secp256k1::{SecretKey, SECP256K1};

    use super::*;

    fn pubkey(byte: u8) -> PublicKey {
        PublicKey::from_secret_key(
            SECP256K1,
            &SecretKey::from_slice(&[byte; 32]).unwrap(),
        )
    }

    #[test]
    fn funding_keys_are_sorted() {
        let script_ab = Script::ln_funding(0, pubkey(1), pubkey(2));
        let script_ba = Script::ln_funding(0, pubkey(2), pubkey(1));
        assert_eq!(script_ab, script_ba);
        // 2 <33-byte key> <33-byte key> 2 OP_CHECKMULTISIG
        assert_eq!(script_ab.len(), 1 + 34 + 34 + 1 + 1);
    }

    #[test]
    fn to_local_layout() {
        let script = Script::ln_to_local(0, pubkey(1), pubkey(2), 144);
        let hex = script.to_hex();
        // OP_IF ... OP_ELSE <144> OP_CSV OP_DROP ... OP_ENDIF OP_CHECKSIG
        assert!(hex.starts_with("63"));
        assert!(hex.ends_with("68ac"));
        assert!(hex.contains("b275"));
    }

    #[test]
    fn small_csv_uses_op_n() {
        let script = Script::ln_to_local(0, pubkey(1), pubkey(2), 16);
        // OP_16 is a single opcode 0x60, no push data
        assert!(script.to_hex().contains("60b275"));
    }

    #[test]
    fn to_remote_v1_is_p2wpkh() {
        let txout = TxOut::ln_to_remote_v1(1000, pubkey(3));
        assert!(txout.script_pubkey.is_v0_p2wpkh());
    }

    #[test]
    fn anchors_append_csv_one() {
        let hash = HashLock::from(HashPreimage::random());
        let plain = Script::ln_offered_htlc(
            0,
            pubkey(1),
            pubkey(2),
            pubkey(3),
            hash,
            false,
        );
        let anchored = Script::ln_offered_htlc(
            0,
            pubkey(1),
            pubkey(2),
            pubkey(3),
            hash,
            true,
        );
        // plain: ... OP_ENDIF OP_ENDIF; anchored: ... 1 OP_CSV OP_DROP
        // OP_ENDIF
        assert_eq!(anchored.len(), plain.len() + 3);
        assert!(anchored.to_hex().ends_with("51b2756868"));
    }

    #[test]
    fn received_htlc_commits_to_cltv() {
        let hash = HashLock::from(HashPreimage::random());
        let with_small = Script::ln_received_htlc(
            0,
            pubkey(1),
            pubkey(2),
            pubkey(3),
            16,
            hash,
            false,
        );
        let with_large = Script::ln_received_htlc(
            0,
            pubkey(1),
            pubkey(2),
            pubkey(3),
            500_000,
            hash,
            false,
        );
        assert_ne!(with_small, with_large);
        // large CLTV requires a minimal 3-byte push
        assert_eq!(with_large.len(), with_small.len() + 3);
    }
}
