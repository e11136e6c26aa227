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

//! Post-handshake message framing: each message travels as
//! `AEAD(length) || AEAD(payload)`, with independent nonce counters per
//! direction and key rotation every [`KEY_ROTATION_INTERVAL`] uses.

use chacha20poly1305::aead::generic_array::GenericArray;
use chacha20poly1305::aead::KeyInit;
use chacha20poly1305::{AeadInPlace, ChaCha20Poly1305};

use super::noise::{chacha_nonce, hkdf2};
use super::{Error, MAX_MSG_LEN, TAG_LEN};

/// Number of AEAD operations after which a direction rotates its key
pub const KEY_ROTATION_INTERVAL: u64 = 1000;

struct CipherState {
    key: [u8; 32],
    chaining_key: [u8; 32],
    nonce: u64,
}

impl CipherState {
    fn new(key: [u8; 32], chaining_key: [u8; 32]) -> CipherState {
        CipherState {
            key,
            chaining_key,
            nonce: 0,
        }
    }

    fn advance(&mut self) {
        self.nonce += 1;
        if self.nonce >= KEY_ROTATION_INTERVAL {
            let (chaining_key, key) =
                hkdf2(&self.chaining_key, &self.key);
            self.chaining_key = chaining_key;
            self.key = key;
            self.nonce = 0;
        }
    }

    fn encrypt(&mut self, plaintext: &[u8], output: &mut Vec<u8>) {
        let cipher =
            ChaCha20Poly1305::new(GenericArray::from_slice(&self.key));
        let start = output.len();
        output.extend_from_slice(plaintext);
        let tag = cipher
            .encrypt_in_place_detached(
                GenericArray::from_slice(&chacha_nonce(self.nonce)),
                &[],
                &mut output[start..],
            )
            .expect("in-memory AEAD encryption does not fail");
        output.extend_from_slice(&tag);
        self.advance();
    }

    fn decrypt(&mut self, ciphertext: &[u8]) -> Result<Vec<u8>, Error> {
        if ciphertext.len() < TAG_LEN {
            return Err(Error::MacMismatch);
        }
        let (body, tag) = ciphertext.split_at(ciphertext.len() - TAG_LEN);
        let cipher =
            ChaCha20Poly1305::new(GenericArray::from_slice(&self.key));
        let mut buffer = body.to_vec();
        cipher.decrypt_in_place_detached(
            GenericArray::from_slice(&chacha_nonce(self.nonce)),
            &[],
            &mut buffer,
            GenericArray::from_slice(tag),
        )?;
        self.advance();
        Ok(buffer)
    }
}

/// Sending half of the transport cipher
pub struct NoiseEncryptor {
    state: CipherState,
}

impl NoiseEncryptor {
    pub fn new(send_key: [u8; 32], chaining_key: [u8; 32]) -> Self {
        NoiseEncryptor {
            state: CipherState::new(send_key, chaining_key),
        }
    }

    /// Produces the full wire frame for one message:
    /// `AEAD(len) || AEAD(payload)`
    pub fn encrypt_message(
        &mut self,
        message: &[u8],
    ) -> Result<Vec<u8>, Error> {
        if message.len() > MAX_MSG_LEN {
            return Err(Error::OversizedMessage(message.len()));
        }
        let mut frame =
            Vec::with_capacity(2 + TAG_LEN + message.len() + TAG_LEN);
        let length = (message.len() as u16).to_be_bytes();
        self.state.encrypt(&length, &mut frame);
        self.state.encrypt(message, &mut frame);
        Ok(frame)
    }
}

/// Receiving half of the transport cipher
pub struct NoiseDecryptor {
    state: CipherState,
}

impl NoiseDecryptor {
    pub fn new(recv_key: [u8; 32], chaining_key: [u8; 32]) -> Self {
        NoiseDecryptor {
            state: CipherState::new(recv_key, chaining_key),
        }
    }

    /// Decrypts the 18-byte length field, returning the payload length
    pub fn decrypt_length(
        &mut self,
        field: &[u8; 2 + TAG_LEN],
    ) -> Result<usize, Error> {
        let plaintext = self.state.decrypt(field)?;
        let mut length = [0u8; 2];
        length.copy_from_slice(&plaintext);
        Ok(u16::from_be_bytes(length) as usize)
    }

    /// Decrypts the payload ciphertext (including its trailing tag)
    pub fn decrypt_body(
        &mut self,
        ciphertext: &mut [u8],
    ) -> Result<Vec<u8>, Error> {
        self.state.decrypt(ciphertext)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn pair() -> (NoiseEncryptor, NoiseDecryptor) {
        let key = [7u8; 32];
        let chaining_key = [9u8; 32];
        (
            NoiseEncryptor::new(key, chaining_key),
            NoiseDecryptor::new(key, chaining_key),
        )
    }

    fn transfer(
        encryptor: &mut NoiseEncryptor,
        decryptor: &mut NoiseDecryptor,
        message: &[u8],
    ) -> Vec<u8> {
        let frame = encryptor.encrypt_message(message).unwrap();
        let mut length_field = [0u8; 2 + TAG_LEN];
        length_field.copy_from_slice(&frame[..2 + TAG_LEN]);
        let len = decryptor.decrypt_length(&length_field).unwrap();
        assert_eq!(len, message.len());
        let mut body = frame[2 + TAG_LEN..].to_vec();
        decryptor.decrypt_body(&mut body).unwrap()
    }

    #[test]
    fn roundtrip() {
        let (mut encryptor, mut decryptor) = pair();
        for size in [0usize, 1, 255, 65535] {
            let message = vec![0xAB; size];
            assert_eq!(
                transfer(&mut encryptor, &mut decryptor, &message),
                message
            );
        }
    }

    #[test]
    fn oversized_message_rejected() {
        let (mut encryptor, _) = pair();
        assert_eq!(
            encryptor.encrypt_message(&vec![0u8; 65536]).unwrap_err(),
            Error::OversizedMessage(65536)
        );
    }

    #[test]
    fn corrupted_frame_rejected() {
        let (mut encryptor, mut decryptor) = pair();
        let frame = encryptor.encrypt_message(b"hello").unwrap();
        let mut length_field = [0u8; 2 + TAG_LEN];
        length_field.copy_from_slice(&frame[..2 + TAG_LEN]);
        length_field[0] ^= 0x01;
        assert_eq!(
            decryptor.decrypt_length(&length_field).unwrap_err(),
            Error::MacMismatch
        );
    }

    #[test]
    fn keys_rotate_in_step() {
        let (mut encryptor, mut decryptor) = pair();
        // two AEAD operations per message: cross several rotations
        for round in 0..2_000u32 {
            let message = round.to_be_bytes();
            assert_eq!(
                transfer(&mut encryptor, &mut decryptor, &message),
                message
            );
        }
    }
}
