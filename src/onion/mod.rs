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

//! Sphinx payment onion (BOLT-4): fixed-size source-routed packets with
//! one ECDH-derived encryption layer per hop.

mod payload;

pub use payload::{HopPayload, PaymentData};

use amplify::{Slice32, Wrapper};
use bitcoin::hashes::{sha256, Hash, HashEngine, Hmac, HmacEngine};
use chacha20::cipher::{KeyIvInit, StreamCipher};
use chacha20::ChaCha20;
use lnc_encoding::{BigSize, LightningDecode, LightningEncode};
use lnc_p2p::bolt::{HashLock, OnionPacket, PAYMENT_SPHINX_LEN};
use secp256k1::ecdh::SharedSecret;
use secp256k1::{PublicKey, Scalar, SecretKey, SECP256K1};

/// Size of the per-frame HMAC
const HMAC_LEN: usize = 32;

/// Onion processing errors
#[derive(Clone, PartialEq, Eq, Hash, Debug, Display, Error, From)]
#[display(doc_comments)]
pub enum Error {
    /// onion version {0} is not supported
    BadVersion(u8),

    /// onion HMAC does not match; the packet was tampered with or
    /// misrouted
    BadHmac,

    /// onion ephemeral key is invalid
    BadEphemeralKey,

    /// hop payload cannot be parsed
    #[from]
    BadPayload(lnc_encoding::Error),

    /// route has no hops or exceeds the packet capacity
    RouteTooLong,
}

impl From<secp256k1::Error> for Error {
    fn from(_: secp256k1::Error) -> Self {
        Error::BadEphemeralKey
    }
}

/// A hop of the route as the onion constructor needs it
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Hop {
    pub node_id: PublicKey,
    pub payload: HopPayload,
}

/// The payload revealed to a forwarding node, together with the packet
/// to pass on (when the node is not the final hop)
#[derive(Clone, PartialEq, Debug)]
pub enum Peeled {
    /// Forward `next_packet` over the channel named in the payload
    Forward {
        payload: HopPayload,
        next_packet: OnionPacket,
    },

    /// We are the final recipient
    Receive { payload: HopPayload },
}

fn hmac_sha256(key: &[u8], parts: &[&[u8]]) -> [u8; 32] {
    let mut engine = HmacEngine::<sha256::Hash>::new(key);
    for part in parts {
        engine.input(part);
    }
    Hmac::<sha256::Hash>::from_engine(engine).into_inner()
}

// Per-hop key derivation: key = HMAC256(key_type, shared_secret)
fn derive_key(key_type: &[u8], shared_secret: &[u8; 32]) -> [u8; 32] {
    hmac_sha256(key_type, &[shared_secret])
}

fn cipher_stream(key: &[u8; 32], len: usize) -> Vec<u8> {
    let mut stream = vec![0u8; len];
    let mut cipher =
        ChaCha20::new(key.into(), &[0u8; 12].into());
    cipher.apply_keystream(&mut stream);
    stream
}

fn blinding_factor(
    ephemeral_pub: &PublicKey,
    shared_secret: &[u8; 32],
) -> Scalar {
    let mut engine = sha256::Hash::engine();
    engine.input(&ephemeral_pub.serialize());
    engine.input(shared_secret);
    let hash = sha256::Hash::from_engine(engine);
    Scalar::from_be_bytes(hash.into_inner())
        .expect("negligible probability of a hash above the curve order")
}

// The ECDH chain: per-hop shared secrets plus the ephemeral public key
// each hop will observe.
fn hop_shared_secrets(
    session_key: &SecretKey,
    path: &[Hop],
) -> Result<Vec<[u8; 32]>, Error> {
    let mut secrets = Vec::with_capacity(path.len());
    let mut ephemeral = *session_key;
    for hop in path {
        let shared_secret =
            SharedSecret::new(&hop.node_id, &ephemeral).secret_bytes();
        let ephemeral_pub =
            PublicKey::from_secret_key(SECP256K1, &ephemeral);
        secrets.push(shared_secret);
        let blinding = blinding_factor(&ephemeral_pub, &shared_secret);
        ephemeral = ephemeral.mul_tweak(&blinding)?;
    }
    Ok(secrets)
}

fn frame_bytes(payload: &HopPayload) -> Result<Vec<u8>, Error> {
    let body = payload.serialize()?;
    let mut frame = vec![];
    BigSize::from(body.len() as u64)
        .lightning_encode(&mut frame)
        .expect("memory encoders do not fail");
    frame.extend(body);
    Ok(frame)
}

/// Constructs the onion packet for a payment along `path`.
///
/// `associated_data` binds the onion to its HTLC; payments use the
/// payment hash.
pub fn construct_onion_packet(
    session_key: &SecretKey,
    path: &[Hop],
    associated_data: &HashLock,
) -> Result<OnionPacket, Error> {
    if path.is_empty() {
        return Err(Error::RouteTooLong);
    }
    let shared_secrets = hop_shared_secrets(session_key, path)?;

    // each hop's slot in the routing info: varint-prefixed payload plus
    // the hmac of the packet it forwards
    let frames = path
        .iter()
        .map(|hop| frame_bytes(&hop.payload))
        .collect::<Result<Vec<_>, _>>()?;
    let total: usize =
        frames.iter().map(|frame| frame.len() + HMAC_LEN).sum();
    if total > PAYMENT_SPHINX_LEN {
        return Err(Error::RouteTooLong);
    }

    // filler: the garbage the final hop must observe beyond its frame
    let mut filler: Vec<u8> = vec![];
    for (frame, shared_secret) in
        frames.iter().zip(&shared_secrets).take(path.len() - 1)
    {
        let slot = frame.len() + HMAC_LEN;
        let rho = derive_key(b"rho", shared_secret);
        filler.extend(std::iter::repeat(0u8).take(slot));
        let stream = cipher_stream(&rho, PAYMENT_SPHINX_LEN + slot);
        let offset = PAYMENT_SPHINX_LEN + slot - filler.len();
        for (byte, mask) in filler.iter_mut().zip(&stream[offset..]) {
            *byte ^= mask;
        }
    }

    // initial routing info is pseudorandom so the packet length leaks
    // nothing about the route length
    let pad_key = derive_key(b"pad", &session_key.secret_bytes());
    let mut routing_info: Vec<u8> =
        cipher_stream(&pad_key, PAYMENT_SPHINX_LEN);

    let mut hmac = [0u8; HMAC_LEN];
    for (index, (frame, shared_secret)) in
        frames.iter().zip(&shared_secrets).enumerate().rev()
    {
        let rho = derive_key(b"rho", shared_secret);
        let mu = derive_key(b"mu", shared_secret);

        // shift right and prepend this hop's frame + the hmac of the
        // packet it forwards
        let shift = frame.len() + HMAC_LEN;
        routing_info.truncate(PAYMENT_SPHINX_LEN - shift);
        let mut fresh =
            Vec::with_capacity(PAYMENT_SPHINX_LEN);
        fresh.extend_from_slice(frame);
        fresh.extend_from_slice(&hmac);
        fresh.append(&mut routing_info);
        routing_info = fresh;

        let stream = cipher_stream(&rho, PAYMENT_SPHINX_LEN);
        for (byte, mask) in routing_info.iter_mut().zip(&stream) {
            *byte ^= mask;
        }

        if index == path.len() - 1 && !filler.is_empty() {
            let offset = PAYMENT_SPHINX_LEN - filler.len();
            routing_info[offset..].copy_from_slice(&filler);
        }

        hmac = hmac_sha256(&mu, &[
            &routing_info,
            associated_data.as_ref(),
        ]);
    }

    let mut hop_data = [0u8; PAYMENT_SPHINX_LEN];
    hop_data.copy_from_slice(&routing_info);
    Ok(OnionPacket {
        version: 0,
        public_key: PublicKey::from_secret_key(SECP256K1, session_key),
        hop_data,
        hmac: Slice32::from_inner(hmac),
    })
}

/// Peels one layer off a received onion with the node's key, revealing
/// this hop's payload and the packet to forward.
pub fn peel_onion(
    node_key: &SecretKey,
    packet: &OnionPacket,
    associated_data: &HashLock,
) -> Result<Peeled, Error> {
    if packet.version != 0 {
        return Err(Error::BadVersion(packet.version));
    }
    let shared_secret =
        SharedSecret::new(&packet.public_key, node_key).secret_bytes();
    let mu = derive_key(b"mu", &shared_secret);
    let expected = hmac_sha256(&mu, &[
        &packet.hop_data[..],
        associated_data.as_ref(),
    ]);
    if expected != *packet.hmac.as_inner() {
        return Err(Error::BadHmac);
    }

    // decrypt over a zero-extended buffer so the forwarded packet stays
    // 1300 bytes
    let rho = derive_key(b"rho", &shared_secret);
    let mut buffer = vec![0u8; 2 * PAYMENT_SPHINX_LEN];
    buffer[..PAYMENT_SPHINX_LEN].copy_from_slice(&packet.hop_data);
    let stream = cipher_stream(&rho, 2 * PAYMENT_SPHINX_LEN);
    for (byte, mask) in buffer.iter_mut().zip(&stream) {
        *byte ^= mask;
    }

    let mut cursor = std::io::Cursor::new(&buffer[..]);
    let payload_len =
        BigSize::lightning_decode(&mut cursor)?.into_inner() as usize;
    let varint_len = cursor.position() as usize;
    if varint_len + payload_len + HMAC_LEN > PAYMENT_SPHINX_LEN {
        return Err(Error::BadPayload(
            lnc_encoding::Error::TooLargeData(payload_len),
        ));
    }
    let payload = HopPayload::deserialize(
        &buffer[varint_len..varint_len + payload_len],
    )?;
    let frame_len = varint_len + payload_len + HMAC_LEN;
    let mut next_hmac = [0u8; HMAC_LEN];
    next_hmac
        .copy_from_slice(&buffer[varint_len + payload_len..frame_len]);

    if next_hmac == [0u8; HMAC_LEN] {
        return Ok(Peeled::Receive { payload });
    }

    // re-blind the ephemeral key for the next hop
    let blinding =
        blinding_factor(&packet.public_key, &shared_secret);
    let next_public_key =
        packet.public_key.mul_tweak(SECP256K1, &blinding)?;

    let mut next_hop_data = [0u8; PAYMENT_SPHINX_LEN];
    next_hop_data
        .copy_from_slice(&buffer[frame_len..frame_len + PAYMENT_SPHINX_LEN]);

    Ok(Peeled::Forward {
        payload,
        next_packet: OnionPacket {
            version: 0,
            public_key: next_public_key,
            hop_data: next_hop_data,
            hmac: Slice32::from_inner(next_hmac),
        },
    })
}

/// Keys for decrypting failure messages travelling back along the route
pub fn failure_keys(shared_secret: &[u8; 32]) -> ([u8; 32], [u8; 32]) {
    (
        derive_key(b"um", shared_secret),
        derive_key(b"ammag", shared_secret),
    )
}

#[cfg(test)]
mod test {
    use lnc_p2p::bolt::{HashPreimage, ShortChannelId};

    use super::*;

    fn node_key(byte: u8) -> SecretKey {
        SecretKey::from_slice(&[byte; 32]).unwrap()
    }

    fn test_path() -> (Vec<SecretKey>, Vec<Hop>) {
        let keys: Vec<SecretKey> =
            vec![node_key(0x41), node_key(0x42), node_key(0x43)];
        let hops = vec![
            Hop {
                node_id: PublicKey::from_secret_key(SECP256K1, &keys[0]),
                payload: HopPayload::forward(
                    100_501,
                    500_082,
                    ShortChannelId::with(100, 1, 0),
                ),
            },
            Hop {
                node_id: PublicKey::from_secret_key(SECP256K1, &keys[1]),
                payload: HopPayload::forward(
                    100_000,
                    500_018,
                    ShortChannelId::with(200, 2, 0),
                ),
            },
            Hop {
                node_id: PublicKey::from_secret_key(SECP256K1, &keys[2]),
                payload: HopPayload::receive(
                    100_000,
                    500_018,
                    Slice32::from_inner([5u8; 32]),
                    100_000,
                ),
            },
        ];
        (keys, hops)
    }

    #[test]
    fn three_hop_forwarding() {
        let (keys, hops) = test_path();
        let payment_hash = HashLock::from(HashPreimage::random());
        let session_key = node_key(0x77);
        let packet =
            construct_onion_packet(&session_key, &hops, &payment_hash)
                .unwrap();

        let peeled =
            peel_onion(&keys[0], &packet, &payment_hash).unwrap();
        let packet_1 = match peeled {
            Peeled::Forward {
                payload,
                next_packet,
            } => {
                assert_eq!(payload, hops[0].payload);
                next_packet
            }
            Peeled::Receive { .. } => panic!("hop 0 is not final"),
        };

        let peeled =
            peel_onion(&keys[1], &packet_1, &payment_hash).unwrap();
        let packet_2 = match peeled {
            Peeled::Forward {
                payload,
                next_packet,
            } => {
                assert_eq!(payload, hops[1].payload);
                next_packet
            }
            Peeled::Receive { .. } => panic!("hop 1 is not final"),
        };

        match peel_onion(&keys[2], &packet_2, &payment_hash).unwrap() {
            Peeled::Receive { payload } => {
                assert_eq!(payload, hops[2].payload);
                assert!(payload.is_final());
            }
            Peeled::Forward { .. } => panic!("hop 2 is final"),
        }
    }

    #[test]
    fn tampered_packet_is_detected() {
        let (keys, hops) = test_path();
        let payment_hash = HashLock::from(HashPreimage::random());
        let mut packet = construct_onion_packet(
            &node_key(0x77),
            &hops,
            &payment_hash,
        )
        .unwrap();
        packet.hop_data[100] ^= 0x01;
        assert_eq!(
            peel_onion(&keys[0], &packet, &payment_hash).unwrap_err(),
            Error::BadHmac
        );
    }

    #[test]
    fn wrong_associated_data_is_detected() {
        let (keys, hops) = test_path();
        let payment_hash = HashLock::from(HashPreimage::random());
        let packet = construct_onion_packet(
            &node_key(0x77),
            &hops,
            &payment_hash,
        )
        .unwrap();
        let other_hash = HashLock::from(HashPreimage::random());
        assert_eq!(
            peel_onion(&keys[0], &packet, &other_hash).unwrap_err(),
            Error::BadHmac
        );
    }

    #[test]
    fn wrong_node_cannot_peel() {
        let (_, hops) = test_path();
        let payment_hash = HashLock::from(HashPreimage::random());
        let packet = construct_onion_packet(
            &node_key(0x77),
            &hops,
            &payment_hash,
        )
        .unwrap();
        assert_eq!(
            peel_onion(&node_key(0x55), &packet, &payment_hash)
                .unwrap_err(),
            Error::BadHmac
        );
    }

    #[test]
    fn single_hop_route() {
        let key = node_key(0x31);
        let hops = vec![Hop {
            node_id: PublicKey::from_secret_key(SECP256K1, &key),
            payload: HopPayload::receive(
                42_000,
                500_018,
                Slice32::from_inner([9u8; 32]),
                42_000,
            ),
        }];
        let payment_hash = HashLock::from(HashPreimage::random());
        let packet = construct_onion_packet(
            &node_key(0x78),
            &hops,
            &payment_hash,
        )
        .unwrap();
        match peel_onion(&key, &packet, &payment_hash).unwrap() {
            Peeled::Receive { payload } => {
                assert_eq!(payload.amt_to_forward, 42_000)
            }
            Peeled::Forward { .. } => panic!("single hop is final"),
        }
    }
}
