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

//! Key derivation: the purpose-9735 hierarchy yielding the node key and
//! per-channel basepoints, plus the per-commitment key tweaks of BOLT-3.

use amplify::{Slice32, Wrapper};
use bitcoin::hashes::{sha256, Hash, HashEngine};
use bitcoin::util::bip32::{ChildNumber, Error as Bip32Error, ExtendedPrivKey};
use secp256k1::ecdsa::Signature;
use secp256k1::{
    Message, PublicKey, Scalar, Secp256k1, SecretKey, Signing, Verification,
};

/// BIP-43 purpose field of the lightning key hierarchy ("key import/export
/// for lightning nodes", matching the 9735 port assignment)
pub const LN_PURPOSE: u32 = 9735;

/// Errors happening during key derivation and tweaking.
///
/// Tweak failures have negligible probability on real inputs; they surface
/// only for adversarial data (tweak equal to the negated key).
#[derive(Clone, PartialEq, Eq, Hash, Debug, Display, Error, From)]
#[display(doc_comments)]
pub enum Error {
    /// BIP-32 derivation error: {0}
    #[from]
    Bip32(Bip32Error),

    /// key tweak has produced the point at infinity or a zero scalar
    InvalidTweak,
}

impl From<secp256k1::Error> for Error {
    fn from(_: secp256k1::Error) -> Self {
        Error::InvalidTweak
    }
}

/// Secret basepoints of one channel, derived from the channel extended key.
///
/// The owner is the channel actor; secrets never leave it except as tweaked
/// per-commitment private keys used for signing.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ChannelSecrets {
    pub funding_key: SecretKey,
    pub payment_basepoint_secret: SecretKey,
    pub delayed_payment_basepoint_secret: SecretKey,
    pub revocation_basepoint_secret: SecretKey,
    pub htlc_basepoint_secret: SecretKey,
    /// Seed of the per-commitment secret tree (not itself a curve scalar)
    pub per_commitment_seed: Slice32,
}

impl Drop for ChannelSecrets {
    fn drop(&mut self) {
        // the seed derives every future commitment secret; wipe it when
        // the channel actor dies
        self.per_commitment_seed = Slice32::from_inner([0u8; 32]);
    }
}

// Hardened child indexes of the per-channel basepoint keys under the
// channel extended key
const IDX_FUNDING: u16 = 0;
const IDX_PAYMENT: u16 = 1;
const IDX_DELAYED: u16 = 2;
const IDX_REVOCATION: u16 = 3;
const IDX_HTLC: u16 = 5;
const IDX_COMMITMENT_SEED: u16 = 6;

impl ChannelSecrets {
    /// Derives the channel basepoint secrets from a *channel extended key*
    /// (itself obtained from the external key store at
    /// `m/9735'/<chain>'/<channel>'`).
    pub fn with<C: Signing>(
        secp: &Secp256k1<C>,
        channel_xpriv: ExtendedPrivKey,
    ) -> Result<ChannelSecrets, Error> {
        let derive = |index: u16| -> Result<SecretKey, Error> {
            let child = ChildNumber::from_hardened_idx(index as u32)?;
            Ok(channel_xpriv.derive_priv(secp, &[child])?.private_key)
        };
        let seed_key = derive(IDX_COMMITMENT_SEED)?;
        Ok(ChannelSecrets {
            funding_key: derive(IDX_FUNDING)?,
            payment_basepoint_secret: derive(IDX_PAYMENT)?,
            delayed_payment_basepoint_secret: derive(IDX_DELAYED)?,
            revocation_basepoint_secret: derive(IDX_REVOCATION)?,
            htlc_basepoint_secret: derive(IDX_HTLC)?,
            per_commitment_seed: Slice32::from_inner(seed_key.secret_bytes()),
        })
    }

    /// Public basepoints matching the secrets
    pub fn basepoints<C: Signing>(
        &self,
        secp: &Secp256k1<C>,
    ) -> ChannelBasepoints {
        ChannelBasepoints {
            funding_pubkey: PublicKey::from_secret_key(
                secp,
                &self.funding_key,
            ),
            payment_basepoint: PublicKey::from_secret_key(
                secp,
                &self.payment_basepoint_secret,
            ),
            delayed_payment_basepoint: PublicKey::from_secret_key(
                secp,
                &self.delayed_payment_basepoint_secret,
            ),
            revocation_basepoint: PublicKey::from_secret_key(
                secp,
                &self.revocation_basepoint_secret,
            ),
            htlc_basepoint: PublicKey::from_secret_key(
                secp,
                &self.htlc_basepoint_secret,
            ),
        }
    }
}

/// Public basepoints of one side of a channel
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[derive(StrictEncode, StrictDecode)]
pub struct ChannelBasepoints {
    pub funding_pubkey: PublicKey,
    pub payment_basepoint: PublicKey,
    pub delayed_payment_basepoint: PublicKey,
    pub revocation_basepoint: PublicKey,
    pub htlc_basepoint: PublicKey,
}

fn tweak_hash(point_first: &PublicKey, point_second: &PublicKey) -> Scalar {
    let mut engine = sha256::Hash::engine();
    engine.input(&point_first.serialize());
    engine.input(&point_second.serialize());
    let hash = sha256::Hash::from_engine(engine);
    Scalar::from_be_bytes(hash.into_inner())
        .expect("negligible probability of a hash above the curve order")
}

/// `pubkey = basepoint + SHA256(per_commitment_point || basepoint) * G`,
/// the localpubkey/remotepubkey/delayedpubkey/htlcpubkey derivation of
/// BOLT-3.
pub fn derive_pubkey<C: Verification>(
    secp: &Secp256k1<C>,
    basepoint: &PublicKey,
    per_commitment_point: &PublicKey,
) -> Result<PublicKey, Error> {
    let tweak = tweak_hash(per_commitment_point, basepoint);
    Ok(basepoint.add_exp_tweak(secp, &tweak)?)
}

/// `privkey = basepoint_secret + SHA256(per_commitment_point || basepoint)`
pub fn derive_privkey<C: Signing + Verification>(
    secp: &Secp256k1<C>,
    basepoint_secret: &SecretKey,
    per_commitment_point: &PublicKey,
) -> Result<SecretKey, Error> {
    let basepoint = PublicKey::from_secret_key(secp, basepoint_secret);
    let tweak = tweak_hash(per_commitment_point, &basepoint);
    Ok(basepoint_secret.add_tweak(&tweak)?)
}

/// `revocation_pubkey = revocation_basepoint * SHA256(revocation_basepoint
/// || per_commitment_point) + per_commitment_point *
/// SHA256(per_commitment_point || revocation_basepoint)`
pub fn derive_revocation_pubkey<C: Verification>(
    secp: &Secp256k1<C>,
    revocation_basepoint: &PublicKey,
    per_commitment_point: &PublicKey,
) -> Result<PublicKey, Error> {
    let basepoint_part = revocation_basepoint.mul_tweak(
        secp,
        &tweak_hash(revocation_basepoint, per_commitment_point),
    )?;
    let commitment_part = per_commitment_point.mul_tweak(
        secp,
        &tweak_hash(per_commitment_point, revocation_basepoint),
    )?;
    Ok(basepoint_part.combine(&commitment_part)?)
}

/// Secret-side counterpart of [`derive_revocation_pubkey`]; computable only
/// once the peer has released the per-commitment secret.
pub fn derive_revocation_privkey<C: Signing + Verification>(
    secp: &Secp256k1<C>,
    revocation_basepoint_secret: &SecretKey,
    per_commitment_secret: &SecretKey,
) -> Result<SecretKey, Error> {
    let revocation_basepoint =
        PublicKey::from_secret_key(secp, revocation_basepoint_secret);
    let per_commitment_point =
        PublicKey::from_secret_key(secp, per_commitment_secret);
    let basepoint_part = revocation_basepoint_secret.mul_tweak(
        &tweak_hash(&revocation_basepoint, &per_commitment_point),
    )?;
    let commitment_part = per_commitment_secret.mul_tweak(&tweak_hash(
        &per_commitment_point,
        &revocation_basepoint,
    ))?;
    let sum = Scalar::from_be_bytes(basepoint_part.secret_bytes())
        .map_err(|_| Error::InvalidTweak)?;
    Ok(commitment_part.add_tweak(&sum)?)
}

/// Signs a BIP-143 sighash. The resulting signature is always low-S as
/// required for relay-standard witnesses.
pub fn sign_hash<C: Signing>(
    secp: &Secp256k1<C>,
    sighash: Slice32,
    key: &SecretKey,
) -> Signature {
    let msg = Message::from_slice(sighash.as_inner())
        .expect("sighash is always 32 bytes");
    secp.sign_ecdsa(&msg, key)
}

/// Verifies a signature over a BIP-143 sighash
pub fn verify_hash_sig<C: Verification>(
    secp: &Secp256k1<C>,
    sighash: Slice32,
    sig: &Signature,
    pubkey: &PublicKey,
) -> bool {
    let msg = Message::from_slice(sighash.as_inner())
        .expect("sighash is always 32 bytes");
    secp.verify_ecdsa(&msg, sig, pubkey).is_ok()
}

#[cfg(test)]
mod test {
    use amplify::hex::FromHex;
    use secp256k1::SECP256K1;

    use super::*;

    // BOLT-3 Appendix E key derivation test vectors

    fn base_secret() -> SecretKey {
        SecretKey::from_slice(
            &Vec::<u8>::from_hex(
                "000102030405060708090a0b0c0d0e0f00010203\
                 0405060708090a0b0c0d0e0f",
            )
            .unwrap(),
        )
        .unwrap()
    }

    fn per_commitment_secret() -> SecretKey {
        SecretKey::from_slice(
            &Vec::<u8>::from_hex(
                "1f1e1d1c1b1a191817161514131211100f0e0d0c\
                 0b0a09080706050403020100",
            )
            .unwrap(),
        )
        .unwrap()
    }

    fn base_point() -> PublicKey {
        PublicKey::from_secret_key(SECP256K1, &base_secret())
    }

    fn per_commitment_point() -> PublicKey {
        PublicKey::from_secret_key(SECP256K1, &per_commitment_secret())
    }

    #[test]
    fn bolt3_basepoints() {
        assert_eq!(
            base_point().to_string(),
            "036d6caac248af96f6afa7f904f550253a0f3ef3f5aa2fe6838a95b216691468e2"
        );
        assert_eq!(
            per_commitment_point().to_string(),
            "025f7117a78150fe2ef97db7cfc83bd57b2e2c0d0dd25eaf467a4a1c2a45ce1486"
        );
    }

    #[test]
    fn bolt3_derive_pubkey() {
        let localpubkey = derive_pubkey(
            SECP256K1,
            &base_point(),
            &per_commitment_point(),
        )
        .unwrap();
        assert_eq!(
            localpubkey.to_string(),
            "0235f2dbfaa89b57ec7b055afe29849ef7ddfeb1cefdb9ebdc43f5494984db29e5"
        );
    }

    #[test]
    fn bolt3_derive_privkey() {
        let localprivkey = derive_privkey(
            SECP256K1,
            &base_secret(),
            &per_commitment_point(),
        )
        .unwrap();
        assert_eq!(
            localprivkey.display_secret().to_string(),
            "cbced912d3b21bf196a766651e436aff192362621ce317704ea2f75d87e7be0f"
        );
        // the tweaked private key must match the tweaked public key
        assert_eq!(
            PublicKey::from_secret_key(SECP256K1, &localprivkey),
            derive_pubkey(SECP256K1, &base_point(), &per_commitment_point())
                .unwrap()
        );
    }

    #[test]
    fn bolt3_derive_revocation_pubkey() {
        let revocationpubkey = derive_revocation_pubkey(
            SECP256K1,
            &base_point(),
            &per_commitment_point(),
        )
        .unwrap();
        assert_eq!(
            revocationpubkey.to_string(),
            "02916e326636d19c33f13e8c0c3a03dd157f332f3e99c317c141dd865eb01f8ff0"
        );
    }

    #[test]
    fn bolt3_derive_revocation_privkey() {
        let revocationprivkey = derive_revocation_privkey(
            SECP256K1,
            &base_secret(),
            &per_commitment_secret(),
        )
        .unwrap();
        assert_eq!(
            revocationprivkey.display_secret().to_string(),
            "d09ffff62ddb2297ab000cc85bcb4283fdeb6aa052affbc9dddcf33b61078110"
        );
        assert_eq!(
            PublicKey::from_secret_key(SECP256K1, &revocationprivkey),
            derive_revocation_pubkey(
                SECP256K1,
                &base_point(),
                &per_commitment_point()
            )
            .unwrap()
        );
    }

    #[test]
    fn channel_secrets_are_deterministic() {
        let xpriv = ExtendedPrivKey::new_master(
            bitcoin::Network::Regtest,
            &[42u8; 32],
        )
        .unwrap();
        let secrets_1 = ChannelSecrets::with(SECP256K1, xpriv).unwrap();
        let secrets_2 = ChannelSecrets::with(SECP256K1, xpriv).unwrap();
        assert_eq!(secrets_1, secrets_2);

        let basepoints = secrets_1.basepoints(SECP256K1);
        assert_ne!(basepoints.funding_pubkey, basepoints.payment_basepoint);
        assert_ne!(
            basepoints.revocation_basepoint,
            basepoints.htlc_basepoint
        );
    }

    #[test]
    fn signatures_are_low_s() {
        let sighash = Slice32::from_inner([7u8; 32]);
        let sig = sign_hash(SECP256K1, sighash, &base_secret());
        // serialize_compact of a normalized signature round-trips
        let mut normalized = sig;
        normalized.normalize_s();
        assert_eq!(sig, normalized);
        assert!(verify_hash_sig(SECP256K1, sighash, &sig, &base_point()));
    }
}
