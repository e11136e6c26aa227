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

use crate::{Error, LightningDecode, LightningEncode};

// Lightning messages prefix variable-length fields with a 16-bit big-endian
// count; for byte vectors the count is the byte length.

impl LightningEncode for Vec<u8> {
    fn lightning_encode<E: Write>(&self, mut e: E) -> Result<usize, Error> {
        let len = self.len().lightning_encode(&mut e)?;
        e.write_all(self)?;
        Ok(len + self.len())
    }
}

impl LightningDecode for Vec<u8> {
    fn lightning_decode<D: Read>(mut d: D) -> Result<Self, Error> {
        let len = usize::lightning_decode(&mut d)?;
        let mut buf = vec![0u8; len];
        d.read_exact(&mut buf)?;
        Ok(buf)
    }
}

impl LightningEncode for Vec<secp256k1::ecdsa::Signature> {
    fn lightning_encode<E: Write>(&self, mut e: E) -> Result<usize, Error> {
        let mut len = self.len().lightning_encode(&mut e)?;
        for item in self {
            len += item.lightning_encode(&mut e)?;
        }
        Ok(len)
    }
}

impl LightningDecode for Vec<secp256k1::ecdsa::Signature> {
    fn lightning_decode<D: Read>(mut d: D) -> Result<Self, Error> {
        let count = usize::lightning_decode(&mut d)?;
        let mut vec = Vec::with_capacity(count);
        for _ in 0..count {
            vec.push(LightningDecode::lightning_decode(&mut d)?);
        }
        Ok(vec)
    }
}

impl<T> LightningEncode for Option<T>
where
    T: LightningEncode,
{
    // Optional fields may appear only at the end of a message or inside TLV
    // records; absence encodes as no bytes at all.
    fn lightning_encode<E: Write>(&self, e: E) -> Result<usize, Error> {
        match self {
            None => Ok(0),
            Some(value) => value.lightning_encode(e),
        }
    }
}

impl<T> LightningDecode for Option<T>
where
    T: LightningDecode,
{
    fn lightning_decode<D: Read>(mut d: D) -> Result<Self, Error> {
        let mut buf = vec![];
        d.read_to_end(&mut buf)?;
        if buf.is_empty() {
            return Ok(None);
        }
        T::lightning_deserialize(buf).map(Some)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::lightning_serialize;

    #[test]
    fn byte_vec_is_length_prefixed() {
        let vec = vec![0xDE, 0xAD, 0xBE, 0xEF];
        assert_eq!(lightning_serialize(&vec).unwrap(), [
            0x00, 0x04, 0xDE, 0xAD, 0xBE, 0xEF
        ]);
        assert_eq!(
            Vec::<u8>::lightning_deserialize([
                0x00, 0x04, 0xDE, 0xAD, 0xBE, 0xEF
            ])
            .unwrap(),
            vec
        );
    }

    #[test]
    fn empty_vec() {
        assert_eq!(lightning_serialize(&Vec::<u8>::new()).unwrap(), [
            0x00, 0x00
        ]);
    }

    #[test]
    fn trailing_option() {
        assert_eq!(
            lightning_serialize(&Option::<u32>::None).unwrap(),
            Vec::<u8>::new()
        );
        assert_eq!(lightning_serialize(&Some(0x01020304u32)).unwrap(), [
            0x01, 0x02, 0x03, 0x04
        ]);
        assert_eq!(Option::<u32>::lightning_deserialize([]).unwrap(), None);
    }
}
