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

//! Per-commitment secrets: derivation from the 48-bit index tree of BOLT-3
//! and the compact store keeping O(log N) secrets for all revoked
//! commitments.

use std::collections::BTreeMap;

use amplify::{Slice32, Wrapper};
use bitcoin::hashes::{sha256, Hash};
use secp256k1::{PublicKey, Secp256k1, SecretKey, Signing};

/// Number of index bits of the per-commitment secret tree
pub const SECRET_INDEX_BITS: u8 = 48;

/// The first (highest) per-commitment secret index; commitment number `c`
/// maps to index `2^48 - 1 - c`
pub const START_INDEX: u64 = (1 << SECRET_INDEX_BITS) - 1;

/// Maximum number of secrets the compact store ever holds
pub const STORE_SIZE: u8 = SECRET_INDEX_BITS + 1;

/// Errors of revocation secret management
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Display, Error)]
#[display(doc_comments)]
pub enum Error {
    /// per-commitment secret index {0:#x} exceeds the 48-bit index space
    IndexOverflow(u64),

    /// provided secret for index {index:#x} does not re-derive the known
    /// secret at index {conflicting:#x}; the peer is protocol-violating
    InvalidSecret { index: u64, conflicting: u64 },

    /// the secret at index {0:#x} cannot be derived from the stored
    /// secrets (it was never revoked)
    Underivable(u64),

    /// per-commitment secret at index {0:#x} is not a valid curve scalar
    NotAScalar(u64),
}

fn flip_and_hash(mut value: [u8; 32], bit: u8) -> [u8; 32] {
    value[(bit / 8) as usize] ^= 1 << (bit % 8);
    sha256::Hash::hash(&value).into_inner()
}

/// Derives a descendant secret in the Rusty-Russell tree: starting from
/// `base` (which covers `bits` low bits of the index space), flip-and-hash
/// every set low bit of `index` from high to low.
fn derive_from(base: [u8; 32], bits: u8, index: u64) -> [u8; 32] {
    let mut value = base;
    for bit in (0..bits).rev() {
        if (index >> bit) & 1 == 1 {
            value = flip_and_hash(value, bit);
        }
    }
    value
}

/// Commitment number `c` (counting up from zero) to secret tree index
/// (counting down from `2^48 - 1`)
#[inline]
pub fn commitment_to_index(commitment_number: u64) -> u64 {
    START_INDEX - commitment_number
}

/// Derives the per-commitment secret for the given tree index from the
/// channel seed. The seed sits at the root and covers all 48 index bits.
pub fn per_commitment_secret(
    seed: Slice32,
    index: u64,
) -> Result<Slice32, Error> {
    if index > START_INDEX {
        return Err(Error::IndexOverflow(index));
    }
    Ok(Slice32::from_inner(derive_from(
        seed.into_inner(),
        SECRET_INDEX_BITS,
        index,
    )))
}

/// The per-commitment point matching a per-commitment secret
pub fn per_commitment_point<C: Signing>(
    secp: &Secp256k1<C>,
    secret: Slice32,
    index: u64,
) -> Result<PublicKey, Error> {
    let key = SecretKey::from_slice(secret.as_inner())
        .map_err(|_| Error::NotAScalar(index))?;
    Ok(PublicKey::from_secret_key(secp, &key))
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[derive(StrictEncode, StrictDecode)]
struct StoredSecret {
    index: u64,
    secret: Slice32,
}

/// Compact storage of the peer's released per-commitment secrets.
///
/// Secrets arrive in decreasing index order (one per revocation). A secret
/// whose index has `b` trailing zero bits can re-derive every already
/// known secret within its `2^b`-wide subtree, so only one slot per
/// trailing-zero count is kept: at most 49 entries for the whole 48-bit
/// space.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
#[derive(StrictEncode, StrictDecode)]
pub struct RevocationStore {
    // bucket = number of trailing zero bits of the stored index
    known: BTreeMap<u8, StoredSecret>,
}

impl RevocationStore {
    /// Creates an empty store
    pub fn new() -> RevocationStore {
        RevocationStore::default()
    }

    /// Number of secrets currently kept; never exceeds [`STORE_SIZE`]
    pub fn len(&self) -> usize {
        self.known.len()
    }

    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }

    /// Inserts a newly released secret.
    ///
    /// Validates that the secret correctly re-derives every stored secret
    /// it subsumes; a mismatch means the peer released garbage and must be
    /// failed. Subsumed entries are discarded. Re-inserting the secret
    /// already known for an index is a no-op.
    pub fn insert(
        &mut self,
        index: u64,
        secret: Slice32,
    ) -> Result<(), Error> {
        if index > START_INDEX {
            return Err(Error::IndexOverflow(index));
        }
        let bucket = (index.trailing_zeros() as u8).min(SECRET_INDEX_BITS);
        // every lower bucket must be re-derivable from the new secret
        for (_, known) in self.known.range(..bucket) {
            let derived =
                derive_from(secret.into_inner(), bucket, known.index);
            if derived != known.secret.into_inner() {
                return Err(Error::InvalidSecret {
                    index,
                    conflicting: known.index,
                });
            }
        }
        if let Some(existing) = self.known.get(&bucket) {
            if existing.index == index {
                if existing.secret == secret {
                    return Ok(());
                }
                return Err(Error::InvalidSecret {
                    index,
                    conflicting: existing.index,
                });
            }
        }
        // entries in lower buckets are now subsumed by the new secret
        self.known = self.known.split_off(&bucket);
        self.known.insert(bucket, StoredSecret { index, secret });
        Ok(())
    }

    /// Re-derives the secret for any index revoked so far
    pub fn secret_for(&self, index: u64) -> Result<Slice32, Error> {
        if index > START_INDEX {
            return Err(Error::IndexOverflow(index));
        }
        for (bucket, known) in &self.known {
            let mask = !((1u64 << bucket) - 1);
            if index & mask == known.index {
                return Ok(Slice32::from_inner(derive_from(
                    known.secret.into_inner(),
                    *bucket,
                    index,
                )));
            }
        }
        Err(Error::Underivable(index))
    }
}

#[cfg(test)]
mod test {
    use amplify::hex::FromHex;
    use secp256k1::SECP256K1;

    use super::*;

    fn seed(hex: &str) -> Slice32 {
        Slice32::from_hex(hex).unwrap()
    }

    fn secret(hex: &str) -> Slice32 {
        Slice32::from_hex(hex).unwrap()
    }

    // BOLT-3 Appendix D generate_from_seed test vectors

    #[test]
    fn generate_from_seed_0_final_node() {
        assert_eq!(
            per_commitment_secret(
                seed("0000000000000000000000000000000000000000000000000000000000000000"),
                0xFFFFFFFFFFFF
            )
            .unwrap(),
            secret("02a40c85b6f28da08dfdbe0926c53fab2de6d28c10301f8f7c4073d5e42e3148")
        );
    }

    #[test]
    fn generate_from_seed_ff_final_node() {
        assert_eq!(
            per_commitment_secret(
                seed("FFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFF"),
                0xFFFFFFFFFFFF
            )
            .unwrap(),
            secret("7cc854b54e3e0dcdb010d7a3fee464a9687be6e8db3be6854c475621e007a5dc")
        );
    }

    #[test]
    fn generate_from_seed_ff_alternate_bits_1() {
        assert_eq!(
            per_commitment_secret(
                seed("FFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFF"),
                0xaaaaaaaaaaa
            )
            .unwrap(),
            secret("56f4008fb007ca9acf0e15b054d5c9fd12ee06cea347914ddbaed70d1c13a528")
        );
    }

    #[test]
    fn generate_from_seed_ff_alternate_bits_2() {
        assert_eq!(
            per_commitment_secret(
                seed("FFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFF"),
                0x555555555555
            )
            .unwrap(),
            secret("9015daaeb06dba4ccc05b91b2f73bd54405f2be9f217fbacd3c5ac2e62327d31")
        );
    }

    #[test]
    fn generate_from_seed_01_last_nontrivial() {
        assert_eq!(
            per_commitment_secret(
                seed("0101010101010101010101010101010101010101010101010101010101010101"),
                1
            )
            .unwrap(),
            secret("915c75942a26bb3a433a8ce2cb0427c29ec6c1775cfc78328b57f6ba7bfeaa9c")
        );
    }

    // BOLT-3 Appendix D insert_secret test vectors (correct sequence)

    fn correct_sequence() -> Vec<(u64, Slice32)> {
        vec![
            (281474976710655, secret("7cc854b54e3e0dcdb010d7a3fee464a9687be6e8db3be6854c475621e007a5dc")),
            (281474976710654, secret("c7518c8ae4660ed02894df8976fa1a3659c1a8b4b5bec0c4b872abeba4cb8964")),
            (281474976710653, secret("2273e227a5b7449b6e70f1fb4652864038b1cbf9cd7c043a7d6456b7fc275ad8")),
            (281474976710652, secret("27cddaa5624534cb6cb9d7da077cf2b22ab21e9b506fd4998a51d54502e99116")),
            (281474976710651, secret("c65716add7aa98ba7acb236352d665cab17345fe45b55fb879ff80e6bd0c41dd")),
            (281474976710650, secret("969660042a28f32d9be17344e09374b379962d03db1574df5a8a5a47e19ce3f2")),
            (281474976710649, secret("a5a64476122ca0925fb344bdc1854c1c0a59fc614298e50a33e331980a220f32")),
            (281474976710648, secret("05cde6323d949933f7f7b78776bcc1ea6d9b31447732e3802e1f7ac44b650e17")),
        ]
    }

    #[test]
    fn insert_secret_correct_sequence() {
        let mut store = RevocationStore::new();
        for (index, value) in correct_sequence() {
            store.insert(index, value).unwrap();
        }
        // after 8 inserts all previous secrets stay derivable
        for (index, value) in correct_sequence() {
            assert_eq!(store.secret_for(index).unwrap(), value);
        }
        assert!(store.len() <= STORE_SIZE as usize);
    }

    #[test]
    fn insert_secret_detects_corruption() {
        let mut store = RevocationStore::new();
        let sequence = correct_sequence();
        store.insert(sequence[0].0, sequence[0].1).unwrap();
        // secret #1 replaced by one derived from an unrelated seed
        let bogus = per_commitment_secret(
            seed("0000000000000000000000000000000000000000000000000000000000000000"),
            281474976710654,
        )
        .unwrap();
        assert_eq!(
            store.insert(281474976710654, bogus),
            Err(Error::InvalidSecret {
                index: 281474976710654,
                conflicting: 281474976710655,
            })
        );
    }

    #[test]
    fn insert_twice_is_noop() {
        let mut store = RevocationStore::new();
        let (index, value) = correct_sequence()[0];
        store.insert(index, value).unwrap();
        let snapshot = store.clone();
        store.insert(index, value).unwrap();
        assert_eq!(store, snapshot);
    }

    #[test]
    fn storage_stays_compact() {
        let master = seed(
            "FFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFF",
        );
        let mut store = RevocationStore::new();
        for commitment in 0..=1000u64 {
            let index = commitment_to_index(commitment);
            let value = per_commitment_secret(master, index).unwrap();
            store.insert(index, value).unwrap();
        }
        assert!(store.len() <= STORE_SIZE as usize);
        // spot-check distant ancestors
        for commitment in [0u64, 1, 13, 500, 999, 1000] {
            let index = commitment_to_index(commitment);
            assert_eq!(
                store.secret_for(index).unwrap(),
                per_commitment_secret(master, index).unwrap()
            );
        }
        assert!(store
            .secret_for(commitment_to_index(1001))
            .is_err());
    }

    #[test]
    fn secret_matches_announced_point() {
        let master = seed(
            "0101010101010101010101010101010101010101010101010101010101010101",
        );
        for commitment in 0..10u64 {
            let index = commitment_to_index(commitment);
            let value = per_commitment_secret(master, index).unwrap();
            let point =
                per_commitment_point(SECP256K1, value, index).unwrap();
            let key = SecretKey::from_slice(value.as_inner()).unwrap();
            assert_eq!(point, PublicKey::from_secret_key(SECP256K1, &key));
        }
    }
}
