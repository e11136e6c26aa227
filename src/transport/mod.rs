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

//! Encrypted peer transport: the `Noise_XK_secp256k1_ChaChaPoly_SHA256`
//! handshake of BOLT-8 and the length-prefixed AEAD message framing with
//! periodic key rotation.

mod encryptor;
mod noise;

pub use encryptor::{
    NoiseDecryptor, NoiseEncryptor, KEY_ROTATION_INTERVAL,
};
pub use noise::{
    HandshakeState, TransportKeys, ACT_ONE_LEN, ACT_THREE_LEN, ACT_TWO_LEN,
};

use amplify::IoError;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Maximum lightning message size accepted by the framing layer
pub const MAX_MSG_LEN: usize = u16::MAX as usize;

/// Poly1305 authentication tag length
pub const TAG_LEN: usize = 16;

/// Transport errors. Any of them is fatal for the connection; channel
/// state is untouched and recovers through reestablishment.
#[derive(Clone, PartialEq, Eq, Hash, Debug, Display, Error, From)]
#[display(doc_comments)]
pub enum Error {
    /// I/O error on the peer socket
    #[from(std::io::Error)]
    #[display(inner)]
    Io(IoError),

    /// handshake acts arrived in invalid order or with wrong version
    /// byte {0:#04x}
    HandshakeVersion(u8),

    /// handshake act has invalid public key data
    InvalidHandshakeKey,

    /// AEAD tag verification failed; the transport keys are out of sync
    MacMismatch,

    /// peer sent a message of {0} bytes exceeding the 65535-byte limit
    OversizedMessage(usize),
}

impl From<secp256k1::Error> for Error {
    fn from(_: secp256k1::Error) -> Self {
        Error::InvalidHandshakeKey
    }
}

impl From<chacha20poly1305::aead::Error> for Error {
    fn from(_: chacha20poly1305::aead::Error) -> Self {
        Error::MacMismatch
    }
}

/// A fully established Noise transport over an async byte stream
pub struct NoiseStream<S> {
    stream: S,
    encryptor: NoiseEncryptor,
    decryptor: NoiseDecryptor,
}

impl<S> NoiseStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps a stream with the transport keys produced by a completed
    /// handshake
    pub fn with(stream: S, keys: TransportKeys) -> NoiseStream<S> {
        NoiseStream {
            stream,
            encryptor: NoiseEncryptor::new(
                keys.send_key,
                keys.chaining_key,
            ),
            decryptor: NoiseDecryptor::new(
                keys.recv_key,
                keys.chaining_key,
            ),
        }
    }

    /// Encrypts and sends one lightning message
    pub async fn write_message(
        &mut self,
        message: &[u8],
    ) -> Result<(), Error> {
        let frame = self.encryptor.encrypt_message(message)?;
        self.stream.write_all(&frame).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Receives and decrypts one lightning message
    pub async fn read_message(&mut self) -> Result<Vec<u8>, Error> {
        let mut length_field = [0u8; 2 + TAG_LEN];
        self.stream.read_exact(&mut length_field).await?;
        let len = self.decryptor.decrypt_length(&length_field)?;

        let mut ciphertext = vec![0u8; len + TAG_LEN];
        self.stream.read_exact(&mut ciphertext).await?;
        self.decryptor.decrypt_body(&mut ciphertext)
    }

    /// Releases the inner stream
    pub fn into_inner(self) -> S {
        self.stream
    }
}

/// Runs the initiator side of the handshake over an async stream
pub async fn initiate<S>(
    stream: &mut S,
    local_static: &secp256k1::SecretKey,
    remote_static: &secp256k1::PublicKey,
    ephemeral: secp256k1::SecretKey,
) -> Result<TransportKeys, Error>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut handshake =
        HandshakeState::new_initiator(local_static, remote_static);
    let act_one = handshake.produce_act_one(ephemeral)?;
    stream.write_all(&act_one).await?;
    stream.flush().await?;

    let mut act_two = [0u8; ACT_TWO_LEN];
    stream.read_exact(&mut act_two).await?;
    let act_three = handshake.process_act_two(&act_two)?;
    stream.write_all(&act_three).await?;
    stream.flush().await?;

    handshake.into_transport_keys()
}

/// Runs the responder side of the handshake over an async stream;
/// returns the authenticated remote node key along with the transport
/// keys
pub async fn respond<S>(
    stream: &mut S,
    local_static: &secp256k1::SecretKey,
    ephemeral: secp256k1::SecretKey,
) -> Result<(TransportKeys, secp256k1::PublicKey), Error>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut handshake = HandshakeState::new_responder(local_static);

    let mut act_one = [0u8; ACT_ONE_LEN];
    stream.read_exact(&mut act_one).await?;
    let act_two = handshake.process_act_one(&act_one, ephemeral)?;
    stream.write_all(&act_two).await?;
    stream.flush().await?;

    let mut act_three = [0u8; ACT_THREE_LEN];
    stream.read_exact(&mut act_three).await?;
    let remote_static = handshake.process_act_three(&act_three)?;

    let keys = handshake.into_transport_keys()?;
    Ok((keys, remote_static))
}

#[cfg(test)]
mod test {
    use secp256k1::{PublicKey, SecretKey, SECP256K1};

    use super::*;

    fn key(byte: u8) -> SecretKey {
        SecretKey::from_slice(&[byte; 32]).unwrap()
    }

    #[tokio::test]
    async fn end_to_end_transport() {
        let initiator_static = key(0x11);
        let responder_static = key(0x21);
        let responder_pub =
            PublicKey::from_secret_key(SECP256K1, &responder_static);

        let (client, server) = tokio::io::duplex(4096);

        let client_task = tokio::spawn(async move {
            let mut stream = client;
            let keys = initiate(
                &mut stream,
                &initiator_static,
                &responder_pub,
                key(0x12),
            )
            .await
            .unwrap();
            let mut noise = NoiseStream::with(stream, keys);
            noise.write_message(b"ping over noise").await.unwrap();
            noise.read_message().await.unwrap()
        });

        let server_task = tokio::spawn(async move {
            let mut stream = server;
            let (keys, remote) =
                respond(&mut stream, &responder_static, key(0x22))
                    .await
                    .unwrap();
            assert_eq!(
                remote,
                PublicKey::from_secret_key(SECP256K1, &key(0x11))
            );
            let mut noise = NoiseStream::with(stream, keys);
            let received = noise.read_message().await.unwrap();
            assert_eq!(received, b"ping over noise");
            noise.write_message(b"pong").await.unwrap();
        });

        let reply = client_task.await.unwrap();
        server_task.await.unwrap();
        assert_eq!(reply, b"pong");
    }
}
