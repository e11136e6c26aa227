// LNC P2P library implementing lightning network peer protocol messages
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

use std::fmt::{self, Display, Formatter};
use std::io;

use amplify::Wrapper;
use lnc_encoding::{self, tlv, LightningDecode, LightningEncode};

use super::{ChainHash, ChannelId, FeatureVector};

/// TLV type carrying the list of supported chains inside [`Init`]
const INIT_TLV_NETWORKS: u64 = 1;

/// Once authentication is complete, the first message reveals the features
/// supported or required by this node, even if this is a reconnection.
///
/// # Specification
/// <https://github.com/lightning/bolts/blob/master/01-messaging.md#the-init-message>
#[derive(Clone, PartialEq, Eq, Debug, Display)]
#[display("init({global_features}, {local_features})")]
pub struct Init {
    pub global_features: FeatureVector,
    pub local_features: FeatureVector,

    /// Chains the node is interested in, TLV type 1
    pub networks: Vec<ChainHash>,

    /// TLV records with types not known to this implementation
    pub unknown_tlvs: tlv::Stream,
}

impl Init {
    /// Constructs an `init` message announcing the given feature set on a
    /// single chain.
    pub fn with(features: FeatureVector, network: ChainHash) -> Init {
        Init {
            global_features: FeatureVector::new(),
            local_features: features,
            networks: vec![network],
            unknown_tlvs: none!(),
        }
    }
}

impl LightningEncode for Init {
    fn lightning_encode<E: io::Write>(
        &self,
        mut e: E,
    ) -> Result<usize, lnc_encoding::Error> {
        let mut len = self.global_features.lightning_encode(&mut e)?;
        len += self.local_features.lightning_encode(&mut e)?;

        let mut stream = self.unknown_tlvs.clone();
        if !self.networks.is_empty() {
            let mut value = Vec::with_capacity(self.networks.len() * 32);
            for network in &self.networks {
                value.extend_from_slice(network.as_inner().as_inner());
            }
            stream.insert(INIT_TLV_NETWORKS, value)?;
        }
        len += stream.lightning_encode(&mut e)?;
        Ok(len)
    }
}

impl LightningDecode for Init {
    fn lightning_decode<D: io::Read>(
        mut d: D,
    ) -> Result<Self, lnc_encoding::Error> {
        let global_features = FeatureVector::lightning_decode(&mut d)?;
        let local_features = FeatureVector::lightning_decode(&mut d)?;
        let mut stream = tlv::Stream::lightning_decode(&mut d)?;

        let mut networks = vec![];
        if let Some(value) = stream.remove(INIT_TLV_NETWORKS) {
            let data = value.as_inner();
            if data.len() % 32 != 0 {
                return Err(lnc_encoding::Error::DataIntegrityError(format!(
                    "init/networks length {} is not proportional to 32 bytes",
                    data.len()
                )));
            }
            for chunk in data.chunks(32) {
                networks.push(ChainHash::lightning_deserialize(chunk)?);
            }
        }
        stream.check_no_unknown_even(&[])?;

        Ok(Init {
            global_features,
            local_features,
            networks,
            unknown_tlvs: stream,
        })
    }
}

/// In order to allow for the existence of long-lived TCP connections, at
/// times it may be required that both ends keep alive the TCP connection
/// at the application level. Such messages also allow obfuscation of
/// traffic patterns.
///
/// # Specification
/// <https://github.com/lightning/bolts/blob/master/01-messaging.md#the-ping-and-pong-messages>
#[derive(Clone, PartialEq, Eq, Debug, Display)]
#[display("ping({pong_size})")]
pub struct Ping {
    pub pong_size: u16,
    pub ignored: Vec<u8>,
}

impl LightningEncode for Ping {
    fn lightning_encode<E: io::Write>(
        &self,
        mut e: E,
    ) -> Result<usize, lnc_encoding::Error> {
        let mut len = self.pong_size.lightning_encode(&mut e)?;
        len += self.ignored.lightning_encode(&mut e)?;
        Ok(len)
    }
}

impl LightningDecode for Ping {
    fn lightning_decode<D: io::Read>(
        mut d: D,
    ) -> Result<Self, lnc_encoding::Error> {
        Ok(Ping {
            pong_size: u16::lightning_decode(&mut d)?,
            ignored: Vec::<u8>::lightning_decode(&mut d)?,
        })
    }
}

/// Reply to a [`Ping`] message, carrying the number of ignored bytes the
/// ping asked for.
#[derive(Clone, PartialEq, Eq, Debug, Display)]
#[display("pong")]
pub struct Pong {
    pub ignored: Vec<u8>,
}

impl Pong {
    /// Constructs a pong matching the requested size of a received ping.
    ///
    /// BOLT-1 allows ignoring pings asking for an oversized pong; the caller
    /// is responsible for that policy.
    pub fn with(pong_size: u16) -> Pong {
        Pong {
            ignored: vec![0u8; pong_size as usize],
        }
    }
}

impl LightningEncode for Pong {
    fn lightning_encode<E: io::Write>(
        &self,
        mut e: E,
    ) -> Result<usize, lnc_encoding::Error> {
        self.ignored.lightning_encode(&mut e)
    }
}

impl LightningDecode for Pong {
    fn lightning_decode<D: io::Read>(
        mut d: D,
    ) -> Result<Self, lnc_encoding::Error> {
        Ok(Pong {
            ignored: Vec::<u8>::lightning_decode(&mut d)?,
        })
    }
}

/// For simplicity of diagnosis, it's often useful to tell a peer that
/// something is incorrect.
///
/// # Specification
/// <https://github.com/lightning/bolts/blob/master/01-messaging.md#the-error-and-warning-messages>
#[derive(Clone, PartialEq, Eq, Debug, Error)]
pub struct Error {
    /// The channel is referred to by channel_id, unless channel_id is 0
    /// (i.e. all bytes are 0), in which case it refers to all channels.
    pub channel_id: ChannelId,

    /// Any specific error details, either as string or binary data
    pub data: Vec<u8>,
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("Error")?;
        if self.channel_id.is_wildcard() {
            f.write_str(" on all channels")?;
        } else {
            write!(f, " on channel {}", self.channel_id)?;
        }
        // NB: if data is not composed solely of printable ASCII characters
        // (byte values 32 through 126 inclusive) it SHOULD NOT be printed
        // out verbatim.
        if self.data.iter().all(|byte| (32..=126).contains(byte)) {
            if let Ok(msg) = String::from_utf8(self.data.clone()) {
                write!(f, ": {}", msg)?;
            }
        }
        Ok(())
    }
}

impl LightningEncode for Error {
    fn lightning_encode<E: io::Write>(
        &self,
        mut e: E,
    ) -> Result<usize, lnc_encoding::Error> {
        let mut len = self.channel_id.lightning_encode(&mut e)?;
        len += self.data.lightning_encode(&mut e)?;
        Ok(len)
    }
}

impl LightningDecode for Error {
    fn lightning_decode<D: io::Read>(
        mut d: D,
    ) -> Result<Self, lnc_encoding::Error> {
        Ok(Error {
            channel_id: ChannelId::lightning_decode(&mut d)?,
            data: Vec::<u8>::lightning_decode(&mut d)?,
        })
    }
}

/// A non-fatal diagnostic message: the peer reports a recoverable protocol
/// divergence and continues operating.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Warning {
    /// Channel the warning refers to; all-zero means connection-level
    pub channel_id: ChannelId,

    /// Any specific warning details, either as string or binary data
    pub data: Vec<u8>,
}

impl Display for Warning {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("Warning")?;
        if !self.channel_id.is_wildcard() {
            write!(f, " on channel {}", self.channel_id)?;
        }
        if self.data.iter().all(|byte| (32..=126).contains(byte)) {
            if let Ok(msg) = String::from_utf8(self.data.clone()) {
                write!(f, ": {}", msg)?;
            }
        }
        Ok(())
    }
}

impl LightningEncode for Warning {
    fn lightning_encode<E: io::Write>(
        &self,
        mut e: E,
    ) -> Result<usize, lnc_encoding::Error> {
        let mut len = self.channel_id.lightning_encode(&mut e)?;
        len += self.data.lightning_encode(&mut e)?;
        Ok(len)
    }
}

impl LightningDecode for Warning {
    fn lightning_decode<D: io::Read>(
        mut d: D,
    ) -> Result<Self, lnc_encoding::Error> {
        Ok(Warning {
            channel_id: ChannelId::lightning_decode(&mut d)?,
            data: Vec::<u8>::lightning_decode(&mut d)?,
        })
    }
}

#[cfg(test)]
mod test {
    use amplify::hex::FromHex;

    use super::*;
    use crate::bolt::Messages;

    #[test]
    fn empty_init_serialization() {
        let init = Messages::Init(Init {
            global_features: FeatureVector::new(),
            local_features: FeatureVector::new(),
            networks: vec![],
            unknown_tlvs: none!(),
        });
        assert_eq!(
            init.serialize().unwrap(),
            Vec::<u8>::from_hex("001000000000").unwrap()
        );
    }

    #[test]
    fn init_with_networks_roundtrip() {
        let mut features = FeatureVector::new();
        features.set_bit(9);
        let init = Init::with(features, ChainHash::regtest());
        let data = lnc_encoding::lightning_serialize(&init).unwrap();
        let decoded = Init::lightning_deserialize(data).unwrap();
        assert_eq!(decoded, init);
        assert_eq!(decoded.networks, vec![ChainHash::regtest()]);
    }

    #[test]
    fn real_clightning_init() {
        // Real init message sent by c-lightning, with the networks TLV
        let init_recv = [
            // msg type
            0u8, 16, //
            // global features - 2 bytes
            0, 2, 34, 0, //
            // local features - 3 bytes
            0, 3, 2, 170, 162, //
            // TLV type 1 (networks)
            1, //
            // len
            32, //
            // mainnet genesis
            111, 226, 140, 10, 182, 241, 179, 114, 193, 166, 162, 70, 174,
            99, 247, 79, 147, 30, 131, 101, 225, 90, 8, 156, 104, 214, 25, 0,
            0, 0, 0, 0,
        ];
        let msg = Messages::deserialize(init_recv).unwrap();
        match msg {
            Messages::Init(init) => {
                assert_eq!(init.networks, vec![ChainHash::mainnet()])
            }
            other => panic!("unexpected message {}", other),
        }
    }

    #[test]
    fn error_display_filters_binary() {
        let error = Error {
            channel_id: ChannelId::wildcard(),
            data: b"internal failure".to_vec(),
        };
        assert_eq!(
            error.to_string(),
            "Error on all channels: internal failure"
        );
        let binary = Error {
            channel_id: ChannelId::wildcard(),
            data: vec![0x00, 0x01, 0x02],
        };
        assert_eq!(binary.to_string(), "Error on all channels");
    }
}
