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

#![recursion_limit = "256"]
// Coding conventions
#![deny(
    non_upper_case_globals,
    non_camel_case_types,
    non_snake_case,
    unused_mut,
    unused_imports,
    dead_code
)]

#[allow(unused_imports)]
#[macro_use]
extern crate amplify;

mod big_size;
mod bitcoin;
mod collections;
mod error;
mod primitives;
pub mod tlv;

pub use big_size::BigSize;
pub use error::Error;

// -----------------------------------------------------------------------------

use std::io;

/// Maximum size of a lightning message payload before transport framing, as
/// required by BOLT-1.
pub const LN_MAX_MSG_LEN: usize = u16::MAX as usize;

/// Lightning-network specific encoding as defined in BOLT-1, 2, 3...
pub trait LightningEncode {
    fn lightning_encode<E: io::Write>(&self, e: E) -> Result<usize, Error>;

    fn lightning_serialize(&self) -> Result<Vec<u8>, Error> {
        let mut encoder = vec![];
        self.lightning_encode(&mut encoder)?;
        if encoder.len() > LN_MAX_MSG_LEN {
            return Err(Error::TooLargeData(encoder.len()));
        }
        Ok(encoder)
    }
}

/// Lightning-network specific encoding as defined in BOLT-1, 2, 3...
pub trait LightningDecode
where
    Self: Sized,
{
    fn lightning_decode<D: io::Read>(d: D) -> Result<Self, Error>;

    fn lightning_deserialize(data: impl AsRef<[u8]>) -> Result<Self, Error> {
        let mut decoder = io::Cursor::new(data.as_ref());
        let rv = Self::lightning_decode(&mut decoder)?;
        let consumed = decoder.position() as usize;

        // Fail if data are not consumed entirely.
        if consumed == data.as_ref().len() {
            Ok(rv)
        } else {
            Err(Error::DataNotEntirelyConsumed)
        }
    }
}

#[inline]
pub fn lightning_serialize<T>(data: &T) -> Result<Vec<u8>, Error>
where
    T: LightningEncode,
{
    data.lightning_serialize()
}

#[inline]
pub fn lightning_deserialize<T>(data: impl AsRef<[u8]>) -> Result<T, Error>
where
    T: LightningDecode,
{
    T::lightning_deserialize(data)
}
