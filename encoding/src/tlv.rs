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

//! TLV streams as defined in BOLT-1: a sequence of `{type: BigSize,
//! length: BigSize, value: length bytes}` records with strictly-increasing
//! types, appended to the fixed part of a message.

use std::collections::btree_map::Iter;
use std::collections::BTreeMap;
use std::io::{Read, Write};

use amplify::Wrapper;

use crate::{BigSize, Error, LightningDecode, LightningEncode};

/// TLV record type number.
///
/// The "it's ok to be odd" rule applies: odd types may be skipped by a reader
/// which does not know them, even types must cause a failure.
#[derive(
    Wrapper,
    Copy,
    Clone,
    Ord,
    PartialOrd,
    Eq,
    PartialEq,
    Hash,
    Debug,
    Display,
    Default,
    From
)]
#[display(inner)]
pub struct Type(u64);

impl Type {
    /// Detects whether the type number is even, i.e. must be understood by
    /// the reader.
    #[inline]
    pub fn is_even(self) -> bool {
        self.0 % 2 == 0
    }
}

/// Raw value of a TLV record which type is not known to the reader.
#[derive(
    Wrapper, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug, Default, From
)]
pub struct RawValue(Vec<u8>);

/// Errors generated by TLV stream processing
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Display, Error)]
#[display(doc_comments)]
pub enum TlvError {
    /// TLV type {read} appears after a type {max}; stream types must be
    /// strictly increasing
    Order {
        /// TLV type id read last
        read: u64,
        /// Maximal TLV type id read before
        max: u64,
    },

    /// TLV type {0} is repeated within the stream
    Repeated(u64),

    /// TLV record length {0} exceeds the remaining length of the stream
    Overflow(u64),

    /// unknown even TLV type {0}; the message can't be processed
    UnknownEvenType(u64),
}

/// Ordered set of TLV records indexed by their type number.
///
/// Encoding iterates the underlying map and thus always produces a canonical
/// strictly-ascending stream; decoding rejects streams violating the order.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct Stream(BTreeMap<Type, RawValue>);

impl Stream {
    /// Constructs an empty TLV stream.
    #[inline]
    pub fn new() -> Stream {
        Stream::default()
    }

    #[inline]
    pub fn get(&self, ty: impl Into<Type>) -> Option<&RawValue> {
        self.0.get(&ty.into())
    }

    /// Inserts a record; fails if a record with the same type is already
    /// present.
    pub fn insert(
        &mut self,
        ty: impl Into<Type>,
        value: impl Into<Vec<u8>>,
    ) -> Result<(), TlvError> {
        let ty = ty.into();
        if self.0.contains_key(&ty) {
            return Err(TlvError::Repeated(ty.into_inner()));
        }
        self.0.insert(ty, RawValue::from_inner(value.into()));
        Ok(())
    }

    #[inline]
    pub fn remove(&mut self, ty: impl Into<Type>) -> Option<RawValue> {
        self.0.remove(&ty.into())
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn iter(&self) -> Iter<Type, RawValue> {
        self.0.iter()
    }

    /// Verifies that all remaining record types are either odd or listed in
    /// `known`; the first violating even type fails the stream.
    pub fn check_no_unknown_even(
        &self,
        known: &[u64],
    ) -> Result<(), TlvError> {
        for ty in self.0.keys() {
            if ty.is_even() && !known.contains(&ty.into_inner()) {
                return Err(TlvError::UnknownEvenType(ty.into_inner()));
            }
        }
        Ok(())
    }
}

impl LightningEncode for Stream {
    fn lightning_encode<E: Write>(&self, mut e: E) -> Result<usize, Error> {
        let mut len = 0;
        for (ty, value) in &self.0 {
            len += BigSize::from(ty.into_inner()).lightning_encode(&mut e)?;
            len += BigSize::from(value.as_inner().len() as u64)
                .lightning_encode(&mut e)?;
            e.write_all(value.as_inner())?;
            len += value.as_inner().len();
        }
        Ok(len)
    }
}

impl LightningDecode for Stream {
    fn lightning_decode<D: Read>(mut d: D) -> Result<Self, Error> {
        let mut data = vec![];
        d.read_to_end(&mut data)?;

        let mut stream = Stream::new();
        let mut max_type = None;
        let mut cursor = &data[..];
        while !cursor.is_empty() {
            let ty = BigSize::lightning_decode(&mut cursor)?.into_inner();
            match max_type {
                Some(max) if ty == max => {
                    return Err(TlvError::Repeated(ty).into())
                }
                Some(max) if ty < max => {
                    return Err(TlvError::Order { read: ty, max }.into())
                }
                _ => max_type = Some(ty),
            }
            let len = match BigSize::lightning_decode(&mut cursor) {
                Ok(big_size) => big_size.into_inner(),
                Err(Error::BigSizeEof) => {
                    return Err(TlvError::Overflow(0).into())
                }
                Err(err) => return Err(err),
            };
            if len > cursor.len() as u64 {
                return Err(TlvError::Overflow(len).into());
            }
            let (value, rest) = cursor.split_at(len as usize);
            stream
                .insert(ty, value)
                .expect("the order check above ensures type uniqueness");
            cursor = rest;
        }
        Ok(stream)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::lightning_serialize;

    fn stream_of(records: &[(u64, &[u8])]) -> Stream {
        let mut stream = Stream::new();
        for (ty, value) in records {
            stream.insert(*ty, *value).unwrap();
        }
        stream
    }

    #[test]
    fn roundtrip() {
        let stream = stream_of(&[
            (1, &[0xAA][..]),
            (2, &[][..]),
            (253, &[0x01, 0x02, 0x03][..]),
        ]);
        let data = lightning_serialize(&stream).unwrap();
        assert_eq!(Stream::lightning_deserialize(&data).unwrap(), stream);
    }

    #[test]
    fn empty_stream() {
        let stream = Stream::new();
        assert_eq!(lightning_serialize(&stream).unwrap(), Vec::<u8>::new());
        assert_eq!(Stream::lightning_deserialize([]).unwrap(), stream);
    }

    #[test]
    fn decreasing_types_rejected() {
        // type 2 followed by type 1
        let data = [0x02, 0x00, 0x01, 0x00];
        assert_eq!(
            Stream::lightning_deserialize(data),
            Err(Error::Tlv(TlvError::Order { read: 1, max: 2 }))
        );
    }

    #[test]
    fn repeated_types_rejected() {
        let data = [0x01, 0x00, 0x01, 0x00];
        assert_eq!(
            Stream::lightning_deserialize(data),
            Err(Error::Tlv(TlvError::Repeated(1)))
        );
    }

    #[test]
    fn overflowing_length_rejected() {
        let data = [0x01, 0x05, 0xAA];
        assert_eq!(
            Stream::lightning_deserialize(data),
            Err(Error::Tlv(TlvError::Overflow(5)))
        );
    }

    #[test]
    fn unknown_even_detection() {
        let stream = stream_of(&[(2, &[0x00][..]), (3, &[0x00][..])]);
        assert_eq!(stream.check_no_unknown_even(&[2]), Ok(()));
        assert_eq!(
            stream.check_no_unknown_even(&[4]),
            Err(TlvError::UnknownEvenType(2))
        );
    }
}
