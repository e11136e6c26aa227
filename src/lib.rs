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

//! Core of a non-custodial Lightning Network client: Noise transport, BOLT
//! channel state machines with commitment & HTLC transaction construction,
//! revocation secret management, gossip graph with pathfinding, Sphinx
//! onion routing and the watchtower punishing revoked commitments.
//!
//! External collaborators (the bitcoin chain client, the hierarchical key
//! store and the invoice decoder) are reached only through the traits in
//! [`chain`].

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

#[macro_use]
extern crate amplify;
#[macro_use]
extern crate strict_encoding;
#[macro_use]
extern crate log;
pub extern crate lnc_p2p as p2p;

#[cfg(feature = "serde")]
extern crate serde_crate as serde;

macro_rules! dumb_pubkey {
    () => {
        secp256k1::PublicKey::from_secret_key(
            secp256k1::SECP256K1,
            &secp256k1::ONE_KEY,
        )
    };
}

pub mod bolt3;
pub mod chain;
pub mod channel;
pub mod events;
pub mod keys;
pub mod onion;
pub mod peer;
pub mod router;
pub mod secrets;
pub mod storage;
pub mod transport;
pub mod watchtower;
