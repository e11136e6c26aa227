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

//! Gossip graph and pathfinding: ingestion of BOLT-7 announcements into
//! the public channel graph and weighted shortest-path search over it.

mod gossip;
mod path;

pub use gossip::{
    DirectionalPolicy, Error, GossipChannelInfo, GossipGraph,
    GossipNodeInfo, LocalChannelInfo, CHANNEL_PRUNE_BLOCKS,
    GOSSIP_PRUNE_SECONDS,
};
pub use path::{find_path, Route, RouteHop, RISK_FACTOR_PPB_PER_BLOCK};
