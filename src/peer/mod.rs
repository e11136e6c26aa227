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

//! Peer connection management: the per-connection session actor running
//! the Noise transport, the Init gate, keepalives and message
//! demultiplexing into channel mailboxes.

mod session;

pub use session::{
    accept, connect, ChannelRegistry, PeerHandle, PeerSession,
    MAX_MISSED_PONGS, PING_INTERVAL, PONG_TIMEOUT,
};

use amplify::IoError;
use lnc_p2p::bolt::ChannelId;

/// Peer session errors. All of them terminate the connection; channels
/// survive and reestablish on the next connect.
#[derive(Clone, PartialEq, Eq, Hash, Debug, Display, Error, From)]
#[display(doc_comments)]
pub enum Error {
    /// transport failure: {0}
    #[from]
    #[display(inner)]
    Transport(crate::transport::Error),

    /// peer sent an unparsable message: {0}
    #[from]
    #[display(inner)]
    Encoding(lnc_encoding::Error),

    /// I/O failure on the peer socket
    #[from(std::io::Error)]
    #[display(inner)]
    Io(IoError),

    /// peer requires unknown even feature bit {0}; disconnecting
    UnknownEvenFeature(u16),

    /// peer sent a message with unknown even type {0}; disconnecting
    UnknownEvenMessage(u16),

    /// peer did not answer {0} consecutive pings; disconnecting
    PingTimeout(u32),

    /// peer sent channel messages before completing the init exchange
    InitNotFirst,

    /// peer sent an error for channel {0}, closing it
    RemoteError(ChannelId),

    /// internal mailbox for channel {0} is gone
    ChannelMailboxClosed(ChannelId),
}
