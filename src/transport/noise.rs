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

//! The three-act `Noise_XK` handshake of BOLT-8. The state machine is
//! synchronous and I/O-free; the async wrappers in the parent module
//! drive it over a socket.

use bitcoin::hashes::{sha256, Hash, HashEngine};
use chacha20poly1305::aead::generic_array::GenericArray;
use chacha20poly1305::aead::KeyInit;
use chacha20poly1305::{AeadInPlace, ChaCha20Poly1305};
use secp256k1::ecdh::SharedSecret;
use secp256k1::{PublicKey, SecretKey, SECP256K1};

use super::{Error, TAG_LEN};

/// Act one and two are 50 bytes: version, ephemeral key, tag
pub const ACT_ONE_LEN: usize = 50;
/// Act two mirrors act one
pub const ACT_TWO_LEN: usize = 50;
/// Act three is 66 bytes: version, encrypted static key, two tags
pub const ACT_THREE_LEN: usize = 66;

const HANDSHAKE_VERSION: u8 = 0;
const PROTOCOL_NAME: &[u8] = b"Noise_XK_secp256k1_ChaChaPoly_SHA256";
const PROLOGUE: &[u8] = b"lightning";

/// Symmetric keys coming out of a completed handshake
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct TransportKeys {
    pub send_key: [u8; 32],
    pub recv_key: [u8; 32],
    pub chaining_key: [u8; 32],
}

pub(super) fn hkdf2(salt: &[u8], ikm: &[u8]) -> ([u8; 32], [u8; 32]) {
    use bitcoin::hashes::{Hmac, HmacEngine};

    let mut extract = HmacEngine::<sha256::Hash>::new(salt);
    extract.input(ikm);
    let prk = Hmac::<sha256::Hash>::from_engine(extract).into_inner();

    let mut expand_1 = HmacEngine::<sha256::Hash>::new(&prk);
    expand_1.input(&[1u8]);
    let out_1 = Hmac::<sha256::Hash>::from_engine(expand_1).into_inner();

    let mut expand_2 = HmacEngine::<sha256::Hash>::new(&prk);
    expand_2.input(&out_1);
    expand_2.input(&[2u8]);
    let out_2 = Hmac::<sha256::Hash>::from_engine(expand_2).into_inner();

    (out_1, out_2)
}

pub(super) fn chacha_nonce(counter: u64) -> [u8; 12] {
    let mut nonce = [0u8; 12];
    nonce[4..].copy_from_slice(&counter.to_le_bytes());
    nonce
}

fn encrypt_with_ad(
    key: &[u8; 32],
    nonce: u64,
    ad: &[u8],
    plaintext: &[u8],
) -> Vec<u8> {
    let cipher = ChaCha20Poly1305::new(GenericArray::from_slice(key));
    let mut buffer = plaintext.to_vec();
    let tag = cipher
        .encrypt_in_place_detached(
            GenericArray::from_slice(&chacha_nonce(nonce)),
            ad,
            &mut buffer,
        )
        .expect("in-memory AEAD encryption does not fail");
    buffer.extend_from_slice(&tag);
    buffer
}

fn decrypt_with_ad(
    key: &[u8; 32],
    nonce: u64,
    ad: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>, Error> {
    if ciphertext.len() < TAG_LEN {
        return Err(Error::MacMismatch);
    }
    let (body, tag) = ciphertext.split_at(ciphertext.len() - TAG_LEN);
    let cipher = ChaCha20Poly1305::new(GenericArray::from_slice(key));
    let mut buffer = body.to_vec();
    cipher.decrypt_in_place_detached(
        GenericArray::from_slice(&chacha_nonce(nonce)),
        ad,
        &mut buffer,
        GenericArray::from_slice(tag),
    )?;
    Ok(buffer)
}

fn sha256_pair(a: &[u8], b: &[u8]) -> [u8; 32] {
    let mut engine = sha256::Hash::engine();
    engine.input(a);
    engine.input(b);
    sha256::Hash::from_engine(engine).into_inner()
}

fn ecdh(sk: &SecretKey, pk: &PublicKey) -> [u8; 32] {
    SharedSecret::new(pk, sk).secret_bytes()
}

enum Role {
    Initiator { remote_static: PublicKey },
    Responder,
}

/// The handshake state machine. Acts must be driven in order; any
/// failure poisons the state and the connection must be dropped.
pub struct HandshakeState {
    role: Role,
    local_static: SecretKey,
    ephemeral: Option<SecretKey>,
    remote_ephemeral: Option<PublicKey>,
    remote_static: Option<PublicKey>,
    hash: [u8; 32],
    chaining_key: [u8; 32],
    temp_k2: Option<[u8; 32]>,
    send_key: Option<[u8; 32]>,
    recv_key: Option<[u8; 32]>,
}

impl HandshakeState {
    fn new(local_static: SecretKey, role: Role) -> HandshakeState {
        let hash = sha256::Hash::hash(PROTOCOL_NAME).into_inner();
        let chaining_key = hash;
        let mut hash = sha256_pair(&hash, PROLOGUE);

        // h is pre-mixed with the responder's static key, which the
        // initiator knows upfront in the XK pattern
        let responder_static = match &role {
            Role::Initiator { remote_static } => remote_static.serialize(),
            Role::Responder => {
                PublicKey::from_secret_key(SECP256K1, &local_static)
                    .serialize()
            }
        };
        hash = sha256_pair(&hash, &responder_static);

        HandshakeState {
            role,
            local_static,
            ephemeral: None,
            remote_ephemeral: None,
            remote_static: None,
            hash,
            chaining_key,
            temp_k2: None,
            send_key: None,
            recv_key: None,
        }
    }

    /// Initiator constructor: the responder's static key is known
    /// upfront
    pub fn new_initiator(
        local_static: &SecretKey,
        remote_static: &PublicKey,
    ) -> HandshakeState {
        HandshakeState::new(*local_static, Role::Initiator {
            remote_static: *remote_static,
        })
    }

    /// Responder constructor
    pub fn new_responder(local_static: &SecretKey) -> HandshakeState {
        HandshakeState::new(*local_static, Role::Responder)
    }

    fn mix_key(&mut self, input: &[u8; 32]) -> [u8; 32] {
        let (chaining_key, temp_key) = hkdf2(&self.chaining_key, input);
        self.chaining_key = chaining_key;
        temp_key
    }

    /// Initiator: produces the 50-byte act one
    pub fn produce_act_one(
        &mut self,
        ephemeral: SecretKey,
    ) -> Result<[u8; ACT_ONE_LEN], Error> {
        let remote_static = match &self.role {
            Role::Initiator { remote_static } => *remote_static,
            Role::Responder => {
                return Err(Error::HandshakeVersion(HANDSHAKE_VERSION))
            }
        };
        let ephemeral_pub =
            PublicKey::from_secret_key(SECP256K1, &ephemeral);
        self.hash = sha256_pair(&self.hash, &ephemeral_pub.serialize());

        let es = ecdh(&ephemeral, &remote_static);
        let temp_k1 = self.mix_key(&es);
        let tag = encrypt_with_ad(&temp_k1, 0, &self.hash, &[]);
        self.hash = sha256_pair(&self.hash, &tag);
        self.ephemeral = Some(ephemeral);

        let mut act = [0u8; ACT_ONE_LEN];
        act[0] = HANDSHAKE_VERSION;
        act[1..34].copy_from_slice(&ephemeral_pub.serialize());
        act[34..].copy_from_slice(&tag);
        Ok(act)
    }

    /// Responder: consumes act one and produces act two
    pub fn process_act_one(
        &mut self,
        act: &[u8; ACT_ONE_LEN],
        ephemeral: SecretKey,
    ) -> Result<[u8; ACT_TWO_LEN], Error> {
        if act[0] != HANDSHAKE_VERSION {
            return Err(Error::HandshakeVersion(act[0]));
        }
        let remote_ephemeral = PublicKey::from_slice(&act[1..34])?;
        self.hash =
            sha256_pair(&self.hash, &remote_ephemeral.serialize());

        let es = ecdh(&self.local_static, &remote_ephemeral);
        let temp_k1 = self.mix_key(&es);
        decrypt_with_ad(&temp_k1, 0, &self.hash, &act[34..])?;
        self.hash = sha256_pair(&self.hash, &act[34..]);
        self.remote_ephemeral = Some(remote_ephemeral);

        // act two mirrors act one over the ephemeral keys
        let ephemeral_pub =
            PublicKey::from_secret_key(SECP256K1, &ephemeral);
        self.hash = sha256_pair(&self.hash, &ephemeral_pub.serialize());
        let ee = ecdh(&ephemeral, &remote_ephemeral);
        let temp_k2 = self.mix_key(&ee);
        let tag = encrypt_with_ad(&temp_k2, 0, &self.hash, &[]);
        self.hash = sha256_pair(&self.hash, &tag);
        self.ephemeral = Some(ephemeral);
        self.temp_k2 = Some(temp_k2);

        let mut reply = [0u8; ACT_TWO_LEN];
        reply[0] = HANDSHAKE_VERSION;
        reply[1..34].copy_from_slice(&ephemeral_pub.serialize());
        reply[34..].copy_from_slice(&tag);
        Ok(reply)
    }

    /// Initiator: consumes act two and produces the final 66-byte act
    /// three
    pub fn process_act_two(
        &mut self,
        act: &[u8; ACT_TWO_LEN],
    ) -> Result<[u8; ACT_THREE_LEN], Error> {
        if act[0] != HANDSHAKE_VERSION {
            return Err(Error::HandshakeVersion(act[0]));
        }
        let ephemeral = self
            .ephemeral
            .ok_or(Error::HandshakeVersion(HANDSHAKE_VERSION))?;
        let remote_ephemeral = PublicKey::from_slice(&act[1..34])?;
        self.hash =
            sha256_pair(&self.hash, &remote_ephemeral.serialize());

        let ee = ecdh(&ephemeral, &remote_ephemeral);
        let temp_k2 = self.mix_key(&ee);
        decrypt_with_ad(&temp_k2, 0, &self.hash, &act[34..])?;
        self.hash = sha256_pair(&self.hash, &act[34..]);

        // encrypt our static key towards the responder
        let local_static_pub =
            PublicKey::from_secret_key(SECP256K1, &self.local_static);
        let ciphertext = encrypt_with_ad(
            &temp_k2,
            1,
            &self.hash,
            &local_static_pub.serialize(),
        );
        self.hash = sha256_pair(&self.hash, &ciphertext);

        let se = ecdh(&self.local_static, &remote_ephemeral);
        let temp_k3 = self.mix_key(&se);
        let tag = encrypt_with_ad(&temp_k3, 0, &self.hash, &[]);

        let (send_key, recv_key) = hkdf2(&self.chaining_key, &[]);
        self.send_key = Some(send_key);
        self.recv_key = Some(recv_key);

        let mut reply = [0u8; ACT_THREE_LEN];
        reply[0] = HANDSHAKE_VERSION;
        reply[1..50].copy_from_slice(&ciphertext);
        reply[50..].copy_from_slice(&tag);
        Ok(reply)
    }

    /// Responder: consumes act three, learning and authenticating the
    /// initiator's static key
    pub fn process_act_three(
        &mut self,
        act: &[u8; ACT_THREE_LEN],
    ) -> Result<PublicKey, Error> {
        if act[0] != HANDSHAKE_VERSION {
            return Err(Error::HandshakeVersion(act[0]));
        }
        let ephemeral = self
            .ephemeral
            .ok_or(Error::HandshakeVersion(HANDSHAKE_VERSION))?;
        let temp_k2 = self
            .temp_k2
            .ok_or(Error::HandshakeVersion(HANDSHAKE_VERSION))?;

        let static_bytes =
            decrypt_with_ad(&temp_k2, 1, &self.hash, &act[1..50])?;
        let remote_static = PublicKey::from_slice(&static_bytes)?;
        self.hash = sha256_pair(&self.hash, &act[1..50]);

        let se = ecdh(&ephemeral, &remote_static);
        let temp_k3 = self.mix_key(&se);
        decrypt_with_ad(&temp_k3, 0, &self.hash, &act[50..])?;

        // the responder's send key is the initiator's receive key
        let (recv_key, send_key) = hkdf2(&self.chaining_key, &[]);
        self.send_key = Some(send_key);
        self.recv_key = Some(recv_key);
        self.remote_static = Some(remote_static);
        Ok(remote_static)
    }

    /// Extracts the transport keys once all three acts are complete
    pub fn into_transport_keys(self) -> Result<TransportKeys, Error> {
        match (self.send_key, self.recv_key) {
            (Some(send_key), Some(recv_key)) => Ok(TransportKeys {
                send_key,
                recv_key,
                chaining_key: self.chaining_key,
            }),
            _ => Err(Error::HandshakeVersion(HANDSHAKE_VERSION)),
        }
    }
}

#[cfg(test)]
mod test {
    use amplify::hex::{FromHex, ToHex};

    use super::*;

    // BOLT-8 handshake test vectors

    fn initiator_static() -> SecretKey {
        SecretKey::from_slice(
            &Vec::<u8>::from_hex(
                "1111111111111111111111111111111111111111111111111111111111111111",
            )
            .unwrap(),
        )
        .unwrap()
    }

    fn responder_static() -> SecretKey {
        SecretKey::from_slice(
            &Vec::<u8>::from_hex(
                "2121212121212121212121212121212121212121212121212121212121212121",
            )
            .unwrap(),
        )
        .unwrap()
    }

    fn initiator_ephemeral() -> SecretKey {
        SecretKey::from_slice(
            &Vec::<u8>::from_hex(
                "1212121212121212121212121212121212121212121212121212121212121212",
            )
            .unwrap(),
        )
        .unwrap()
    }

    fn responder_ephemeral() -> SecretKey {
        SecretKey::from_slice(
            &Vec::<u8>::from_hex(
                "2222222222222222222222222222222222222222222222222222222222222222",
            )
            .unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn bolt8_initiator_testvec() {
        let responder_pub = PublicKey::from_secret_key(
            SECP256K1,
            &responder_static(),
        );
        assert_eq!(
            responder_pub.to_string(),
            "028d7500dd4c12685d1f568b4c2b5048e8534b873319f3a8daa612b469132ec7f7"
        );

        let mut initiator = HandshakeState::new_initiator(
            &initiator_static(),
            &responder_pub,
        );
        let act_one =
            initiator.produce_act_one(initiator_ephemeral()).unwrap();
        assert_eq!(
            act_one.to_hex(),
            "00036360e856310ce5d294e8be33fc807077dc56ac80d95d9cd4ddbd21325eff73\
             f70df6086551151f58b8afe6c195782c6a"
        );

        let mut responder =
            HandshakeState::new_responder(&responder_static());
        let act_two = responder
            .process_act_one(&act_one, responder_ephemeral())
            .unwrap();
        assert_eq!(
            act_two.to_hex(),
            "0002466d7fcae563e5cb09a0d1870bb580344804617879a14949cf22285f1bae3f\
             276e2470b93aac583c9ef6eafca3f730ae"
        );

        let act_three = initiator.process_act_two(&act_two).unwrap();
        assert_eq!(
            act_three.to_hex(),
            "00b9e3a702e93e3a9948c2ed6e5fd7590a6e1c3a0344cfc9d5b57357049aa22355\
             361aa02e55a8fc28fef5bd6d71ad0c38228dc68b1c466263b47fdf31e560e139ba"
        );

        let remote = responder.process_act_three(&act_three).unwrap();
        assert_eq!(
            remote,
            PublicKey::from_secret_key(SECP256K1, &initiator_static())
        );

        let initiator_keys = initiator.into_transport_keys().unwrap();
        let responder_keys = responder.into_transport_keys().unwrap();
        assert_eq!(
            initiator_keys.send_key.to_hex(),
            "969ab31b4d288cedf6218839b27a3e2140827047f2c0f01bf5c04435d43511a9"
        );
        assert_eq!(
            initiator_keys.recv_key.to_hex(),
            "bb9020b8965f4df047e07f955f3c4b88418984aadc5cdb35096b9ea8fa5c3442"
        );
        assert_eq!(initiator_keys.send_key, responder_keys.recv_key);
        assert_eq!(initiator_keys.recv_key, responder_keys.send_key);
        assert_eq!(
            initiator_keys.chaining_key,
            responder_keys.chaining_key
        );
    }

    #[test]
    fn wrong_version_is_rejected() {
        let responder_pub = PublicKey::from_secret_key(
            SECP256K1,
            &responder_static(),
        );
        let mut initiator = HandshakeState::new_initiator(
            &initiator_static(),
            &responder_pub,
        );
        let mut act_one =
            initiator.produce_act_one(initiator_ephemeral()).unwrap();
        act_one[0] = 1;
        let mut responder =
            HandshakeState::new_responder(&responder_static());
        assert_eq!(
            responder
                .process_act_one(&act_one, responder_ephemeral())
                .unwrap_err(),
            Error::HandshakeVersion(1)
        );
    }

    #[test]
    fn corrupted_tag_is_rejected() {
        let responder_pub = PublicKey::from_secret_key(
            SECP256K1,
            &responder_static(),
        );
        let mut initiator = HandshakeState::new_initiator(
            &initiator_static(),
            &responder_pub,
        );
        let mut act_one =
            initiator.produce_act_one(initiator_ephemeral()).unwrap();
        act_one[49] ^= 0x01;
        let mut responder =
            HandshakeState::new_responder(&responder_static());
        assert_eq!(
            responder
                .process_act_one(&act_one, responder_ephemeral())
                .unwrap_err(),
            Error::MacMismatch
        );
    }
}
