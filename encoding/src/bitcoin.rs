// Wire encoding for lightning network peer protocol data types
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

use std::io::{Read, Write};

use bitcoin::hashes::{sha256, sha256d, Hash};
use bitcoin::{Script, Txid};
use secp256k1::ecdsa::Signature;
use secp256k1::{PublicKey, SecretKey};

use crate::{Error, LightningDecode, LightningEncode};

impl LightningEncode for sha256::Hash {
    fn lightning_encode<E: Write>(&self, mut e: E) -> Result<usize, Error> {
        e.write_all(&self.into_inner())?;
        Ok(sha256::Hash::LEN)
    }
}

impl LightningDecode for sha256::Hash {
    fn lightning_decode<D: Read>(mut d: D) -> Result<Self, Error> {
        let mut buf = [0u8; sha256::Hash::LEN];
        d.read_exact(&mut buf)?;
        Ok(sha256::Hash::from_inner(buf))
    }
}

impl LightningEncode for sha256d::Hash {
    fn lightning_encode<E: Write>(&self, mut e: E) -> Result<usize, Error> {
        e.write_all(&self.into_inner())?;
        Ok(sha256d::Hash::LEN)
    }
}

impl LightningDecode for sha256d::Hash {
    fn lightning_decode<D: Read>(mut d: D) -> Result<Self, Error> {
        let mut buf = [0u8; sha256d::Hash::LEN];
        d.read_exact(&mut buf)?;
        Ok(sha256d::Hash::from_inner(buf))
    }
}

// Transaction ids go on the wire in consensus byte order, not in the
// display (reversed) order.
impl LightningEncode for Txid {
    fn lightning_encode<E: Write>(&self, mut e: E) -> Result<usize, Error> {
        e.write_all(&self.into_inner())?;
        Ok(Txid::LEN)
    }
}

impl LightningDecode for Txid {
    fn lightning_decode<D: Read>(mut d: D) -> Result<Self, Error> {
        let mut buf = [0u8; Txid::LEN];
        d.read_exact(&mut buf)?;
        Ok(Txid::from_inner(buf))
    }
}

impl LightningEncode for PublicKey {
    fn lightning_encode<E: Write>(&self, mut e: E) -> Result<usize, Error> {
        e.write_all(&self.serialize())?;
        Ok(33)
    }
}

impl LightningDecode for PublicKey {
    fn lightning_decode<D: Read>(mut d: D) -> Result<Self, Error> {
        let mut buf = [0u8; 33];
        d.read_exact(&mut buf)?;
        PublicKey::from_slice(&buf).map_err(|_| {
            Error::DataIntegrityError(format!(
                "invalid public key data {}",
                amplify::hex::ToHex::to_hex(&buf[..])
            ))
        })
    }
}

impl LightningEncode for SecretKey {
    fn lightning_encode<E: Write>(&self, mut e: E) -> Result<usize, Error> {
        e.write_all(&self.secret_bytes())?;
        Ok(32)
    }
}

impl LightningDecode for SecretKey {
    fn lightning_decode<D: Read>(mut d: D) -> Result<Self, Error> {
        let mut buf = [0u8; 32];
        d.read_exact(&mut buf)?;
        SecretKey::from_slice(&buf).map_err(|_| {
            Error::DataIntegrityError(s!(
                "invalid secret key data (zero or above the curve order)"
            ))
        })
    }
}

// Signatures are transmitted in the 64-byte compact form; DER is never used
// on the lightning wire.
impl LightningEncode for Signature {
    fn lightning_encode<E: Write>(&self, mut e: E) -> Result<usize, Error> {
        e.write_all(&self.serialize_compact())?;
        Ok(64)
    }
}

impl LightningDecode for Signature {
    fn lightning_decode<D: Read>(mut d: D) -> Result<Self, Error> {
        let mut buf = [0u8; 64];
        d.read_exact(&mut buf)?;
        Signature::from_compact(&buf).map_err(|_| {
            Error::DataIntegrityError(s!("invalid compact signature data"))
        })
    }
}

impl LightningEncode for Script {
    fn lightning_encode<E: Write>(&self, mut e: E) -> Result<usize, Error> {
        let bytes = self.as_bytes();
        let len = bytes.len().lightning_encode(&mut e)?;
        e.write_all(bytes)?;
        Ok(len + bytes.len())
    }
}

impl LightningDecode for Script {
    fn lightning_decode<D: Read>(d: D) -> Result<Self, Error> {
        Vec::<u8>::lightning_decode(d).map(Script::from)
    }
}

#[cfg(test)]
mod test {
    use amplify::hex::FromHex;

    use super::*;
    use crate::lightning_serialize;

    #[test]
    fn pubkey_roundtrip() {
        let data = Vec::<u8>::from_hex(
            "0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798",
        )
        .unwrap();
        let pk = PublicKey::lightning_deserialize(&data).unwrap();
        assert_eq!(lightning_serialize(&pk).unwrap(), data);
    }

    #[test]
    fn invalid_pubkey_rejected() {
        let data = [0x04u8; 33];
        assert!(PublicKey::lightning_deserialize(data).is_err());
    }

    #[test]
    fn script_is_length_prefixed() {
        let script = Script::from(vec![0x00, 0x14]);
        assert_eq!(lightning_serialize(&script).unwrap(), [
            0x00, 0x02, 0x00, 0x14
        ]);
    }
}
