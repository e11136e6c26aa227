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

use std::io;

use lnc_encoding::{self, LightningDecode, LightningEncode};

use super::{
    AcceptChannel, AnnouncementSignatures, ChannelAnnouncement,
    ChannelId, ChannelReady, ChannelReestablish, ChannelUpdate,
    ClosingSigned, CommitmentSigned, Error, FundingCreated, FundingSigned,
    GossipTimestampFilter, Init, NodeAnnouncement, OpenChannel, Ping, Pong,
    QueryChannelRange, QueryShortChannelIds, ReplyChannelRange,
    ReplyShortChannelIdsEnd, RevokeAndAck, Shutdown, SpliceAck, SpliceInit,
    SpliceLocked, UpdateAddHtlc, UpdateFailHtlc, UpdateFailMalformedHtlc,
    UpdateFee, UpdateFulfillHtlc, Warning,
};

/// All BOLT peer protocol messages known to this implementation, tagged with
/// their BOLT-1 message type numbers.
#[derive(Clone, PartialEq, Eq, Debug, Display, From)]
#[display(inner)]
#[non_exhaustive]
pub enum Messages {
    // Part I: messages from BOLT-1 (setup and control)
    #[from]
    Init(Init),
    #[from]
    Error(Error),
    #[from]
    Warning(Warning),
    #[from]
    Ping(Ping),
    #[from]
    Pong(Pong),

    // Part II: messages from BOLT-2 (channel management)
    #[from]
    OpenChannel(OpenChannel),
    #[from]
    AcceptChannel(AcceptChannel),
    #[from]
    FundingCreated(FundingCreated),
    #[from]
    FundingSigned(FundingSigned),
    #[from]
    ChannelReady(ChannelReady),
    #[from]
    Shutdown(Shutdown),
    #[from]
    ClosingSigned(ClosingSigned),
    #[from]
    UpdateAddHtlc(UpdateAddHtlc),
    #[from]
    UpdateFulfillHtlc(UpdateFulfillHtlc),
    #[from]
    UpdateFailHtlc(UpdateFailHtlc),
    #[from]
    CommitmentSigned(CommitmentSigned),
    #[from]
    RevokeAndAck(RevokeAndAck),
    #[from]
    UpdateFee(UpdateFee),
    #[from]
    UpdateFailMalformedHtlc(UpdateFailMalformedHtlc),
    #[from]
    ChannelReestablish(ChannelReestablish),

    // Part III: splicing (behind feature bit 62)
    #[from]
    SpliceInit(SpliceInit),
    #[from]
    SpliceAck(SpliceAck),
    #[from]
    SpliceLocked(SpliceLocked),

    // Part IV: messages from BOLT-7 (gossip)
    #[from]
    AnnouncementSignatures(AnnouncementSignatures),
    #[from]
    ChannelAnnouncement(ChannelAnnouncement),
    #[from]
    NodeAnnouncement(NodeAnnouncement),
    #[from]
    ChannelUpdate(ChannelUpdate),
    #[from]
    QueryShortChannelIds(QueryShortChannelIds),
    #[from]
    ReplyShortChannelIdsEnd(ReplyShortChannelIdsEnd),
    #[from]
    QueryChannelRange(QueryChannelRange),
    #[from]
    ReplyChannelRange(ReplyChannelRange),
    #[from]
    GossipTimestampFilter(GossipTimestampFilter),

    /// A message with a type number not known to this implementation. Odd
    /// types are ignorable; even types must fail the connection.
    #[display("unknown_message({type_id})")]
    Unknown {
        type_id: u16,
        payload: Vec<u8>,
    },
}

impl Messages {
    /// BOLT-1 message type number
    pub fn type_id(&self) -> u16 {
        match self {
            Messages::Warning(_) => 1,
            Messages::Init(_) => 16,
            Messages::Error(_) => 17,
            Messages::Ping(_) => 18,
            Messages::Pong(_) => 19,
            Messages::OpenChannel(_) => 32,
            Messages::AcceptChannel(_) => 33,
            Messages::FundingCreated(_) => 34,
            Messages::FundingSigned(_) => 35,
            Messages::ChannelReady(_) => 36,
            Messages::Shutdown(_) => 38,
            Messages::ClosingSigned(_) => 39,
            Messages::SpliceInit(_) => 74,
            Messages::SpliceAck(_) => 76,
            Messages::SpliceLocked(_) => 78,
            Messages::UpdateAddHtlc(_) => 128,
            Messages::UpdateFulfillHtlc(_) => 130,
            Messages::UpdateFailHtlc(_) => 131,
            Messages::CommitmentSigned(_) => 132,
            Messages::RevokeAndAck(_) => 133,
            Messages::UpdateFee(_) => 134,
            Messages::UpdateFailMalformedHtlc(_) => 135,
            Messages::ChannelReestablish(_) => 136,
            Messages::ChannelAnnouncement(_) => 256,
            Messages::NodeAnnouncement(_) => 257,
            Messages::ChannelUpdate(_) => 258,
            Messages::AnnouncementSignatures(_) => 259,
            Messages::QueryShortChannelIds(_) => 261,
            Messages::ReplyShortChannelIdsEnd(_) => 262,
            Messages::QueryChannelRange(_) => 263,
            Messages::ReplyChannelRange(_) => 264,
            Messages::GossipTimestampFilter(_) => 265,
            Messages::Unknown { type_id, .. } => *type_id,
        }
    }

    /// Channel the message belongs to, for demultiplexing. Messages still
    /// using a temporary channel id report it cast into the final id type;
    /// connection-level and gossip messages return `None`.
    pub fn channel_id(&self) -> Option<ChannelId> {
        match self {
            Messages::OpenChannel(msg) => {
                Some(msg.temporary_channel_id.into())
            }
            Messages::AcceptChannel(msg) => {
                Some(msg.temporary_channel_id.into())
            }
            Messages::FundingCreated(msg) => {
                Some(msg.temporary_channel_id.into())
            }
            Messages::FundingSigned(msg) => Some(msg.channel_id),
            Messages::ChannelReady(msg) => Some(msg.channel_id),
            Messages::Shutdown(msg) => Some(msg.channel_id),
            Messages::ClosingSigned(msg) => Some(msg.channel_id),
            Messages::UpdateAddHtlc(msg) => Some(msg.channel_id),
            Messages::UpdateFulfillHtlc(msg) => Some(msg.channel_id),
            Messages::UpdateFailHtlc(msg) => Some(msg.channel_id),
            Messages::CommitmentSigned(msg) => Some(msg.channel_id),
            Messages::RevokeAndAck(msg) => Some(msg.channel_id),
            Messages::UpdateFee(msg) => Some(msg.channel_id),
            Messages::UpdateFailMalformedHtlc(msg) => Some(msg.channel_id),
            Messages::ChannelReestablish(msg) => Some(msg.channel_id),
            Messages::SpliceInit(msg) => Some(msg.channel_id),
            Messages::SpliceAck(msg) => Some(msg.channel_id),
            Messages::SpliceLocked(msg) => Some(msg.channel_id),
            Messages::Error(msg) if !msg.channel_id.is_wildcard() => {
                Some(msg.channel_id)
            }
            Messages::Warning(msg) if !msg.channel_id.is_wildcard() => {
                Some(msg.channel_id)
            }
            _ => None,
        }
    }

    /// Detects gossip messages which bypass channels and go to the graph
    /// ingestor
    pub fn is_gossip(&self) -> bool {
        matches!(
            self,
            Messages::AnnouncementSignatures(_)
                | Messages::ChannelAnnouncement(_)
                | Messages::NodeAnnouncement(_)
                | Messages::ChannelUpdate(_)
                | Messages::QueryShortChannelIds(_)
                | Messages::ReplyShortChannelIdsEnd(_)
                | Messages::QueryChannelRange(_)
                | Messages::ReplyChannelRange(_)
                | Messages::GossipTimestampFilter(_)
        )
    }

    /// Serializes the message prefixed with its type number
    #[inline]
    pub fn serialize(&self) -> Result<Vec<u8>, lnc_encoding::Error> {
        lnc_encoding::lightning_serialize(self)
    }

    /// Parses a type-prefixed message
    #[inline]
    pub fn deserialize(
        data: impl AsRef<[u8]>,
    ) -> Result<Messages, lnc_encoding::Error> {
        lnc_encoding::lightning_deserialize(data)
    }
}

impl LightningEncode for Messages {
    fn lightning_encode<E: io::Write>(
        &self,
        mut e: E,
    ) -> Result<usize, lnc_encoding::Error> {
        let len = self.type_id().lightning_encode(&mut e)?;
        let body = match self {
            Messages::Init(msg) => msg.lightning_encode(&mut e)?,
            Messages::Error(msg) => msg.lightning_encode(&mut e)?,
            Messages::Warning(msg) => msg.lightning_encode(&mut e)?,
            Messages::Ping(msg) => msg.lightning_encode(&mut e)?,
            Messages::Pong(msg) => msg.lightning_encode(&mut e)?,
            Messages::OpenChannel(msg) => msg.lightning_encode(&mut e)?,
            Messages::AcceptChannel(msg) => msg.lightning_encode(&mut e)?,
            Messages::FundingCreated(msg) => msg.lightning_encode(&mut e)?,
            Messages::FundingSigned(msg) => msg.lightning_encode(&mut e)?,
            Messages::ChannelReady(msg) => msg.lightning_encode(&mut e)?,
            Messages::Shutdown(msg) => msg.lightning_encode(&mut e)?,
            Messages::ClosingSigned(msg) => msg.lightning_encode(&mut e)?,
            Messages::UpdateAddHtlc(msg) => msg.lightning_encode(&mut e)?,
            Messages::UpdateFulfillHtlc(msg) => {
                msg.lightning_encode(&mut e)?
            }
            Messages::UpdateFailHtlc(msg) => msg.lightning_encode(&mut e)?,
            Messages::CommitmentSigned(msg) => {
                msg.lightning_encode(&mut e)?
            }
            Messages::RevokeAndAck(msg) => msg.lightning_encode(&mut e)?,
            Messages::UpdateFee(msg) => msg.lightning_encode(&mut e)?,
            Messages::UpdateFailMalformedHtlc(msg) => {
                msg.lightning_encode(&mut e)?
            }
            Messages::ChannelReestablish(msg) => {
                msg.lightning_encode(&mut e)?
            }
            Messages::SpliceInit(msg) => msg.lightning_encode(&mut e)?,
            Messages::SpliceAck(msg) => msg.lightning_encode(&mut e)?,
            Messages::SpliceLocked(msg) => msg.lightning_encode(&mut e)?,
            Messages::AnnouncementSignatures(msg) => {
                msg.lightning_encode(&mut e)?
            }
            Messages::ChannelAnnouncement(msg) => {
                msg.lightning_encode(&mut e)?
            }
            Messages::NodeAnnouncement(msg) => {
                msg.lightning_encode(&mut e)?
            }
            Messages::ChannelUpdate(msg) => msg.lightning_encode(&mut e)?,
            Messages::QueryShortChannelIds(msg) => {
                msg.lightning_encode(&mut e)?
            }
            Messages::ReplyShortChannelIdsEnd(msg) => {
                msg.lightning_encode(&mut e)?
            }
            Messages::QueryChannelRange(msg) => {
                msg.lightning_encode(&mut e)?
            }
            Messages::ReplyChannelRange(msg) => {
                msg.lightning_encode(&mut e)?
            }
            Messages::GossipTimestampFilter(msg) => {
                msg.lightning_encode(&mut e)?
            }
            Messages::Unknown { payload, .. } => {
                e.write_all(payload)?;
                payload.len()
            }
        };
        Ok(len + body)
    }
}

impl LightningDecode for Messages {
    fn lightning_decode<D: io::Read>(
        mut d: D,
    ) -> Result<Self, lnc_encoding::Error> {
        let type_id = u16::lightning_decode(&mut d)?;
        Ok(match type_id {
            1 => Messages::Warning(Warning::lightning_decode(&mut d)?),
            16 => Messages::Init(Init::lightning_decode(&mut d)?),
            17 => Messages::Error(Error::lightning_decode(&mut d)?),
            18 => Messages::Ping(Ping::lightning_decode(&mut d)?),
            19 => Messages::Pong(Pong::lightning_decode(&mut d)?),
            32 => Messages::OpenChannel(OpenChannel::lightning_decode(
                &mut d,
            )?),
            33 => Messages::AcceptChannel(AcceptChannel::lightning_decode(
                &mut d,
            )?),
            34 => Messages::FundingCreated(
                FundingCreated::lightning_decode(&mut d)?,
            ),
            35 => Messages::FundingSigned(FundingSigned::lightning_decode(
                &mut d,
            )?),
            36 => Messages::ChannelReady(ChannelReady::lightning_decode(
                &mut d,
            )?),
            38 => Messages::Shutdown(Shutdown::lightning_decode(&mut d)?),
            39 => Messages::ClosingSigned(ClosingSigned::lightning_decode(
                &mut d,
            )?),
            74 => Messages::SpliceInit(SpliceInit::lightning_decode(&mut d)?),
            76 => Messages::SpliceAck(SpliceAck::lightning_decode(&mut d)?),
            78 => Messages::SpliceLocked(SpliceLocked::lightning_decode(
                &mut d,
            )?),
            128 => Messages::UpdateAddHtlc(UpdateAddHtlc::lightning_decode(
                &mut d,
            )?),
            130 => Messages::UpdateFulfillHtlc(
                UpdateFulfillHtlc::lightning_decode(&mut d)?,
            ),
            131 => Messages::UpdateFailHtlc(
                UpdateFailHtlc::lightning_decode(&mut d)?,
            ),
            132 => Messages::CommitmentSigned(
                CommitmentSigned::lightning_decode(&mut d)?,
            ),
            133 => Messages::RevokeAndAck(RevokeAndAck::lightning_decode(
                &mut d,
            )?),
            134 => Messages::UpdateFee(UpdateFee::lightning_decode(&mut d)?),
            135 => Messages::UpdateFailMalformedHtlc(
                UpdateFailMalformedHtlc::lightning_decode(&mut d)?,
            ),
            136 => Messages::ChannelReestablish(
                ChannelReestablish::lightning_decode(&mut d)?,
            ),
            256 => Messages::ChannelAnnouncement(
                ChannelAnnouncement::lightning_decode(&mut d)?,
            ),
            257 => Messages::NodeAnnouncement(
                NodeAnnouncement::lightning_decode(&mut d)?,
            ),
            258 => Messages::ChannelUpdate(ChannelUpdate::lightning_decode(
                &mut d,
            )?),
            259 => Messages::AnnouncementSignatures(
                AnnouncementSignatures::lightning_decode(&mut d)?,
            ),
            261 => Messages::QueryShortChannelIds(
                QueryShortChannelIds::lightning_decode(&mut d)?,
            ),
            262 => Messages::ReplyShortChannelIdsEnd(
                ReplyShortChannelIdsEnd::lightning_decode(&mut d)?,
            ),
            263 => Messages::QueryChannelRange(
                QueryChannelRange::lightning_decode(&mut d)?,
            ),
            264 => Messages::ReplyChannelRange(
                ReplyChannelRange::lightning_decode(&mut d)?,
            ),
            265 => Messages::GossipTimestampFilter(
                GossipTimestampFilter::lightning_decode(&mut d)?,
            ),
            unknown => {
                let mut payload = vec![];
                d.read_to_end(&mut payload)?;
                Messages::Unknown {
                    type_id: unknown,
                    payload,
                }
            }
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn type_numbers() {
        let ping = Messages::Ping(Ping {
            pong_size: 0,
            ignored: vec![],
        });
        assert_eq!(ping.type_id(), 18);
        assert_eq!(ping.serialize().unwrap()[..2], [0x00, 0x12]);
    }

    #[test]
    fn unknown_message_preserved() {
        let data = vec![0x03, 0xE9, 0xDE, 0xAD];
        let msg = Messages::deserialize(&data).unwrap();
        match &msg {
            Messages::Unknown { type_id, payload } => {
                assert_eq!(*type_id, 1001);
                assert_eq!(payload, &[0xDE, 0xAD]);
            }
            other => panic!("unexpected message {}", other),
        }
        assert_eq!(msg.serialize().unwrap(), data);
    }

    #[test]
    fn gossip_classification() {
        let ping = Messages::Ping(Ping {
            pong_size: 0,
            ignored: vec![],
        });
        assert!(!ping.is_gossip());
        assert_eq!(ping.channel_id(), None);
    }
}
