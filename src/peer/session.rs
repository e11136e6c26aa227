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

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use lnc_p2p::bolt::{
    ChainHash, ChannelId, FeatureVector, Init, Messages, Ping, Pong,
};
use secp256k1::rand::rngs::OsRng;
use secp256k1::{PublicKey, SecretKey};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::time::{interval, sleep_until, Instant};

use super::Error;
use crate::transport::{self, NoiseStream};

/// Keepalive ping cadence
pub const PING_INTERVAL: Duration = Duration::from_secs(30);

/// Deadline for the matching pong
pub const PONG_TIMEOUT: Duration = Duration::from_secs(10);

/// Consecutive unanswered pings tolerated before disconnecting
pub const MAX_MISSED_PONGS: u32 = 3;

// Pongs larger than this are ignored per BOLT-1
const MAX_PONG_SIZE: u16 = 65531;

const OUTBOUND_QUEUE_LEN: usize = 64;
const CHANNEL_MAILBOX_LEN: usize = 64;

/// Registry of live channel mailboxes, shared between peer sessions and
/// the channel runner. Entries are keyed by the (temporary or final)
/// channel id; sessions look up but never own channel state.
#[derive(Clone, Default)]
pub struct ChannelRegistry {
    mailboxes:
        Arc<Mutex<HashMap<ChannelId, mpsc::Sender<Messages>>>>,
}

impl ChannelRegistry {
    pub fn new() -> ChannelRegistry {
        ChannelRegistry::default()
    }

    /// Registers a channel mailbox; returns the receiving half for the
    /// channel actor
    pub fn register(
        &self,
        channel_id: ChannelId,
    ) -> mpsc::Receiver<Messages> {
        let (tx, rx) = mpsc::channel(CHANNEL_MAILBOX_LEN);
        self.mailboxes
            .lock()
            .expect("registry mutex poisoned")
            .insert(channel_id, tx);
        rx
    }

    /// Re-keys a mailbox when the temporary channel id is replaced by
    /// the final one
    pub fn rename(&self, from: ChannelId, to: ChannelId) {
        let mut mailboxes =
            self.mailboxes.lock().expect("registry mutex poisoned");
        if let Some(sender) = mailboxes.remove(&from) {
            mailboxes.insert(to, sender);
        }
    }

    pub fn unregister(&self, channel_id: &ChannelId) {
        self.mailboxes
            .lock()
            .expect("registry mutex poisoned")
            .remove(channel_id);
    }

    fn lookup(
        &self,
        channel_id: &ChannelId,
    ) -> Option<mpsc::Sender<Messages>> {
        self.mailboxes
            .lock()
            .expect("registry mutex poisoned")
            .get(channel_id)
            .cloned()
    }
}

/// Handle for sending messages to the peer; held by channel actors as
/// their outbound mailbox
#[derive(Clone, Debug)]
pub struct PeerHandle {
    remote_node: PublicKey,
    outbound: mpsc::Sender<Messages>,
}

impl PeerHandle {
    #[inline]
    pub fn remote_node(&self) -> PublicKey {
        self.remote_node
    }

    /// Queues a message for delivery; fails when the connection is gone
    pub async fn send(&self, message: Messages) -> bool {
        self.outbound.send(message).await.is_ok()
    }
}

/// One peer connection: Noise transport, negotiated features and the
/// demultiplexing loop
pub struct PeerSession<S> {
    noise: NoiseStream<S>,
    remote_node: PublicKey,
    remote_features: FeatureVector,
    registry: ChannelRegistry,
    gossip_tx: mpsc::Sender<Messages>,
    outbound_rx: mpsc::Receiver<Messages>,
    outbound_tx: mpsc::Sender<Messages>,
}

async fn exchange_init<S>(
    noise: &mut NoiseStream<S>,
    local_features: &FeatureVector,
    network: ChainHash,
) -> Result<FeatureVector, Error>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let init =
        Messages::Init(Init::with(local_features.clone(), network));
    noise.write_message(&init.serialize()?).await?;

    // every channel operation blocks until the peer's init arrives;
    // pings are not yet legal either
    let frame = noise.read_message().await?;
    let remote_init = match Messages::deserialize(frame)? {
        Messages::Init(init) => init,
        _ => return Err(Error::InitNotFirst),
    };

    let mut remote_features = remote_init.local_features;
    for bit in remote_init.global_features.iter() {
        remote_features.set_bit(bit);
    }
    if let Some(bit) = remote_features.unknown_even_bits().first() {
        return Err(Error::UnknownEvenFeature(*bit));
    }
    Ok(remote_features)
}

/// Establishes an outgoing connection: Noise handshake as initiator,
/// then the Init exchange.
pub async fn connect<S>(
    mut stream: S,
    local_key: &SecretKey,
    remote_node: PublicKey,
    local_features: FeatureVector,
    network: ChainHash,
    registry: ChannelRegistry,
    gossip_tx: mpsc::Sender<Messages>,
) -> Result<(PeerSession<S>, PeerHandle), Error>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let ephemeral = SecretKey::new(&mut OsRng);
    let keys = transport::initiate(
        &mut stream,
        local_key,
        &remote_node,
        ephemeral,
    )
    .await?;
    let mut noise = NoiseStream::with(stream, keys);
    let remote_features =
        exchange_init(&mut noise, &local_features, network).await?;
    info!("peer {} connected (outbound)", remote_node);

    Ok(PeerSession::with(
        noise,
        remote_node,
        remote_features,
        registry,
        gossip_tx,
    ))
}

/// Accepts an incoming connection: Noise handshake as responder, then
/// the Init exchange.
pub async fn accept<S>(
    mut stream: S,
    local_key: &SecretKey,
    local_features: FeatureVector,
    network: ChainHash,
    registry: ChannelRegistry,
    gossip_tx: mpsc::Sender<Messages>,
) -> Result<(PeerSession<S>, PeerHandle), Error>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let ephemeral = SecretKey::new(&mut OsRng);
    let (keys, remote_node) =
        transport::respond(&mut stream, local_key, ephemeral).await?;
    let mut noise = NoiseStream::with(stream, keys);
    let remote_features =
        exchange_init(&mut noise, &local_features, network).await?;
    info!("peer {} connected (inbound)", remote_node);

    Ok(PeerSession::with(
        noise,
        remote_node,
        remote_features,
        registry,
        gossip_tx,
    ))
}

impl<S> PeerSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    fn with(
        noise: NoiseStream<S>,
        remote_node: PublicKey,
        remote_features: FeatureVector,
        registry: ChannelRegistry,
        gossip_tx: mpsc::Sender<Messages>,
    ) -> (PeerSession<S>, PeerHandle) {
        let (outbound_tx, outbound_rx) =
            mpsc::channel(OUTBOUND_QUEUE_LEN);
        let handle = PeerHandle {
            remote_node,
            outbound: outbound_tx.clone(),
        };
        let session = PeerSession {
            noise,
            remote_node,
            remote_features,
            registry,
            gossip_tx,
            outbound_rx,
            outbound_tx,
        };
        (session, handle)
    }

    #[inline]
    pub fn remote_node(&self) -> PublicKey {
        self.remote_node
    }

    #[inline]
    pub fn remote_features(&self) -> &FeatureVector {
        &self.remote_features
    }

    /// The message loop. Runs until the peer disconnects, a transport
    /// failure happens or keepalives expire. On return all pending
    /// writes are cancelled; channel state is untouched and channels
    /// move to reestablishment on the next connection.
    pub async fn run(mut self) -> Result<(), Error> {
        let mut ping_timer = interval(PING_INTERVAL);
        // the first tick fires immediately; skip it
        ping_timer.tick().await;

        let mut pong_deadline: Option<Instant> = None;
        let mut missed_pongs = 0u32;

        loop {
            let pong_sleep = async move {
                match pong_deadline {
                    Some(deadline) => sleep_until(deadline).await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                frame = self.noise.read_message() => {
                    let message = Messages::deserialize(frame?)?;
                    self.dispatch(message, &mut pong_deadline, &mut missed_pongs).await?;
                }
                outbound = self.outbound_rx.recv() => {
                    match outbound {
                        Some(message) => {
                            self.noise
                                .write_message(&message.serialize()?)
                                .await?
                        }
                        // all handles dropped: orderly local shutdown
                        None => return Ok(()),
                    }
                }
                _ = ping_timer.tick() => {
                    let ping = Messages::Ping(Ping {
                        pong_size: 1,
                        ignored: vec![],
                    });
                    self.noise.write_message(&ping.serialize()?).await?;
                    if pong_deadline.is_none() {
                        pong_deadline =
                            Some(Instant::now() + PONG_TIMEOUT);
                    }
                }
                _ = pong_sleep => {
                    missed_pongs += 1;
                    pong_deadline = None;
                    warn!(
                        "peer {}: pong missed ({}/{})",
                        self.remote_node, missed_pongs, MAX_MISSED_PONGS
                    );
                    if missed_pongs >= MAX_MISSED_PONGS {
                        return Err(Error::PingTimeout(missed_pongs));
                    }
                }
            }
        }
    }

    async fn dispatch(
        &mut self,
        message: Messages,
        pong_deadline: &mut Option<Instant>,
        missed_pongs: &mut u32,
    ) -> Result<(), Error> {
        match message {
            Messages::Init(_) => {
                // a second init is harmless; ignore
                Ok(())
            }
            Messages::Ping(ping) => {
                if ping.pong_size <= MAX_PONG_SIZE {
                    let pong =
                        Messages::Pong(Pong::with(ping.pong_size));
                    self.noise
                        .write_message(&pong.serialize()?)
                        .await?;
                }
                Ok(())
            }
            Messages::Pong(_) => {
                *pong_deadline = None;
                *missed_pongs = 0;
                Ok(())
            }
            Messages::Error(ref error) => {
                let channel_id = error.channel_id;
                if channel_id.is_wildcard() {
                    error!(
                        "peer {} failed the connection: {}",
                        self.remote_node, error
                    );
                    return Err(Error::RemoteError(channel_id));
                }
                self.route_to_channel(channel_id, message).await
            }
            Messages::Warning(ref warning) => {
                warn!("peer {}: {}", self.remote_node, warning);
                Ok(())
            }
            Messages::Unknown { type_id, .. } => {
                if type_id % 2 == 0 {
                    return Err(Error::UnknownEvenMessage(type_id));
                }
                trace!(
                    "peer {}: ignoring unknown odd message {}",
                    self.remote_node,
                    type_id
                );
                Ok(())
            }
            message if message.is_gossip() => {
                // gossip bypasses channels and goes to the graph
                // ingestor; a congested ingestor drops gossip rather
                // than stalling the channel pipeline
                let _ = self.gossip_tx.try_send(message);
                Ok(())
            }
            message => {
                let channel_id = match message.channel_id() {
                    Some(channel_id) => channel_id,
                    None => return Ok(()),
                };
                self.route_to_channel(channel_id, message).await
            }
        }
    }

    async fn route_to_channel(
        &mut self,
        channel_id: ChannelId,
        message: Messages,
    ) -> Result<(), Error> {
        match self.registry.lookup(&channel_id) {
            Some(mailbox) => mailbox
                .send(message)
                .await
                .map_err(|_| Error::ChannelMailboxClosed(channel_id)),
            None => {
                // channel-scoped error back to the peer; the connection
                // survives
                warn!(
                    "peer {}: message for unknown channel {}",
                    self.remote_node, channel_id
                );
                let error = Messages::Error(lnc_p2p::bolt::Error {
                    channel_id,
                    data: b"unknown channel".to_vec(),
                });
                self.outbound_tx.send(error).await.ok();
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod test {
    use amplify::Wrapper;
    use lnc_p2p::bolt::{Feature, UpdateFee};
    use secp256k1::SECP256K1;

    use super::*;

    fn key(byte: u8) -> SecretKey {
        SecretKey::from_slice(&[byte; 32]).unwrap()
    }

    fn features() -> FeatureVector {
        let mut features = FeatureVector::new();
        features.set(Feature::OptionStaticRemotekey, false);
        features.set(Feature::VarOnionOptin, false);
        features
    }

    async fn session_pair() -> (
        (PeerSession<tokio::io::DuplexStream>, PeerHandle),
        (PeerSession<tokio::io::DuplexStream>, PeerHandle),
        mpsc::Receiver<Messages>,
        mpsc::Receiver<Messages>,
    ) {
        let (client, server) = tokio::io::duplex(65536);
        let (gossip_tx_a, gossip_rx_a) = mpsc::channel(16);
        let (gossip_tx_b, gossip_rx_b) = mpsc::channel(16);
        let responder_key = key(0x21);
        let responder_pub =
            PublicKey::from_secret_key(SECP256K1, &responder_key);

        let connect_key = key(0x11);
        let connect_side = connect(
            client,
            &connect_key,
            responder_pub,
            features(),
            ChainHash::regtest(),
            ChannelRegistry::new(),
            gossip_tx_a,
        );
        let accept_side = accept(
            server,
            &responder_key,
            features(),
            ChainHash::regtest(),
            ChannelRegistry::new(),
            gossip_tx_b,
        );
        let (connected, accepted) =
            tokio::join!(connect_side, accept_side);
        (
            connected.unwrap(),
            accepted.unwrap(),
            gossip_rx_a,
            gossip_rx_b,
        )
    }

    #[tokio::test]
    async fn init_exchange_and_feature_negotiation() {
        let ((session_a, _), (session_b, _), ..) =
            session_pair().await;
        assert!(session_a
            .remote_features()
            .supports(Feature::OptionStaticRemotekey));
        assert_eq!(
            session_a.remote_node(),
            PublicKey::from_secret_key(SECP256K1, &key(0x21))
        );
        assert_eq!(
            session_b.remote_node(),
            PublicKey::from_secret_key(SECP256K1, &key(0x11))
        );
    }

    #[tokio::test]
    async fn unknown_even_feature_disconnects() {
        let (client, server) = tokio::io::duplex(65536);
        let (gossip_tx_a, _keep_a) = mpsc::channel(16);
        let (gossip_tx_b, _keep_b) = mpsc::channel(16);
        let responder_key = key(0x21);
        let responder_pub =
            PublicKey::from_secret_key(SECP256K1, &responder_key);

        let mut bad_features = features();
        bad_features.set_bit(498);

        let connect_key = key(0x11);
        let connect_side = connect(
            client,
            &connect_key,
            responder_pub,
            bad_features,
            ChainHash::regtest(),
            ChannelRegistry::new(),
            gossip_tx_a,
        );
        let accept_side = accept(
            server,
            &responder_key,
            features(),
            ChainHash::regtest(),
            ChannelRegistry::new(),
            gossip_tx_b,
        );
        let (_, accepted) = tokio::join!(connect_side, accept_side);
        assert!(matches!(
            accepted.err(),
            Some(Error::UnknownEvenFeature(498))
        ));
    }

    #[tokio::test]
    async fn messages_demultiplex_to_channel_mailbox() {
        let ((session_a, handle_a), (session_b, _handle_b), ..) =
            session_pair().await;

        let channel_id = ChannelId::from_inner(
            amplify::Slice32::from_inner([0x0Cu8; 32]),
        );
        let mut mailbox = session_b.registry.register(channel_id);

        tokio::spawn(session_a.run());
        tokio::spawn(session_b.run());

        let update = Messages::UpdateFee(UpdateFee {
            channel_id,
            feerate_per_kw: 500,
        });
        assert!(handle_a.send(update.clone()).await);

        let received = mailbox.recv().await.unwrap();
        assert_eq!(received, update);
    }

    #[tokio::test]
    async fn unknown_channel_triggers_scoped_error() {
        let ((session_a, handle_a), (session_b, _handle_b), ..) =
            session_pair().await;

        let channel_id = ChannelId::from_inner(
            amplify::Slice32::from_inner([0x0Du8; 32]),
        );
        // register the channel on the SENDING side so the error reply
        // routes back into a mailbox we can observe
        let mut reply_mailbox =
            session_a.registry.register(channel_id);

        tokio::spawn(session_a.run());
        tokio::spawn(session_b.run());

        handle_a
            .send(Messages::UpdateFee(UpdateFee {
                channel_id,
                feerate_per_kw: 500,
            }))
            .await;

        match reply_mailbox.recv().await.unwrap() {
            Messages::Error(error) => {
                assert_eq!(error.channel_id, channel_id)
            }
            other => panic!("unexpected message {}", other),
        }
    }

    #[tokio::test]
    async fn gossip_routes_to_ingestor() {
        let (
            (session_a, handle_a),
            (session_b, _handle_b),
            _gossip_a,
            mut gossip_b,
        ) = session_pair().await;

        tokio::spawn(session_a.run());
        tokio::spawn(session_b.run());

        let filter = Messages::GossipTimestampFilter(
            lnc_p2p::bolt::GossipTimestampFilter {
                chain_hash: ChainHash::regtest(),
                first_timestamp: 0,
                timestamp_range: u32::MAX,
            },
        );
        handle_a.send(filter.clone()).await;
        assert_eq!(gossip_b.recv().await.unwrap(), filter);
    }
}
