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

//! BOLT-defined lightning peer protocol messages and the data types they are
//! built from.

mod bolt1;
mod bolt2;
mod bolt7;
mod bolt9;
mod messages;
mod types;

pub use bolt1::{Error, Init, Ping, Pong, Warning};
pub use bolt2::{
    AcceptChannel, ChannelReady, ChannelReestablish, ChannelType,
    ClosingSigned, CommitmentSigned, FundingCreated, FundingSigned,
    OpenChannel, RevokeAndAck, Shutdown, SpliceAck, SpliceInit, SpliceLocked,
    UpdateAddHtlc, UpdateFailHtlc, UpdateFailMalformedHtlc,
    UpdateFulfillHtlc, UpdateFee, CHANNEL_FLAG_ANNOUNCE_CHANNEL,
};
pub use bolt7::{
    AnnouncementSignatures, ChannelAnnouncement, ChannelUpdate,
    GossipTimestampFilter, NodeAnnouncement, QueryChannelRange,
    QueryShortChannelIds, ReplyChannelRange, ReplyShortChannelIdsEnd,
    CHANNEL_FLAG_DIRECTION, CHANNEL_FLAG_DISABLED,
};
pub use bolt9::{Feature, FeatureVector, UnknownFeatureError};
pub use messages::Messages;
pub use types::{
    ActiveChannelId, Alias, ChainHash, ChannelId, HashLock, HashPreimage,
    NodeAddress, NodeColor, OnionPacket, ShortChannelId, TempChannelId,
    PAYMENT_SPHINX_LEN,
};
