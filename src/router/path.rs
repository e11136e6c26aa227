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

//! Weighted pathfinding over the gossip graph: Dijkstra accumulating
//! backwards from the payment destination, so fees compound correctly.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use lnc_p2p::bolt::ShortChannelId;
use secp256k1::PublicKey;

use super::gossip::{DirectionalPolicy, GossipGraph};

/// Timelock risk weight: parts-per-billion of the amount per block of
/// added CLTV delta
pub const RISK_FACTOR_PPB_PER_BLOCK: u64 = 15;

/// One channel traversal of a found route
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct RouteHop {
    /// Node forwarding (or finally receiving) the payment
    pub node_id: PublicKey,

    /// Channel through which the payment reaches `node_id`
    pub short_channel_id: ShortChannelId,

    /// Amount arriving at `node_id` over this channel
    pub amount_msat: u64,

    /// CLTV delta this hop's policy demands (zero at the final hop,
    /// which uses the invoice's final delta instead)
    pub cltv_expiry_delta: u16,
}

/// A complete route from us to the destination
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Route {
    /// Hops in forwarding order; the last one is the destination
    pub hops: Vec<RouteHop>,

    /// Amount we must send over the first channel
    pub total_amount_msat: u64,

    /// Sum of all hop CLTV deltas (the final expiry delta is the
    /// caller's to add)
    pub total_cltv_delta: u32,
}

impl Route {
    /// Total routing fee: what we send minus what the destination
    /// receives
    pub fn total_fee_msat(&self) -> u64 {
        self.total_amount_msat
            - self
                .hops
                .last()
                .map(|hop| hop.amount_msat)
                .unwrap_or_default()
    }
}

fn forwarding_fee_msat(policy: &DirectionalPolicy, amount: u64) -> u64 {
    policy.fee_base_msat as u64
        + (amount * policy.fee_proportional_millionths as u64
            + 999_999)
            / 1_000_000
}

#[derive(Clone, Copy)]
struct NodeCost {
    amount_msat: u64,
    cltv_delta: u32,
    cost: u64,
    // channel towards the destination chosen at this node
    next_channel: Option<(ShortChannelId, PublicKey)>,
}

/// Finds the cheapest usable route from `source` to `destination` for
/// `amount_msat`.
///
/// Dijkstra runs from the destination towards the source: the amount a
/// node must receive grows by the forwarding fee of every traversed
/// hop, and the edge weight combines that fee with a timelock risk
/// penalty. Channels whose policy is missing, disabled or whose
/// HTLC bounds exclude the amount are skipped. The source's own
/// channels forward for free.
pub fn find_path(
    graph: &GossipGraph,
    source: &PublicKey,
    destination: &PublicKey,
    amount_msat: u64,
) -> Option<Route> {
    let mut best: HashMap<PublicKey, NodeCost> = HashMap::new();
    let mut queue: BinaryHeap<(Reverse<u64>, PublicKey)> =
        BinaryHeap::new();

    best.insert(*destination, NodeCost {
        amount_msat,
        cltv_delta: 0,
        cost: 0,
        next_channel: None,
    });
    queue.push((Reverse(0), *destination));

    while let Some((Reverse(cost), current)) = queue.pop() {
        let current_state = match best.get(&current) {
            Some(state) if state.cost == cost => *state,
            // outdated queue entry
            _ => continue,
        };
        if current == *source {
            break;
        }

        for channel in graph.channels() {
            let previous = match channel.other_node(&current) {
                Some(previous) => previous,
                None => continue,
            };
            let policy = match channel.policy_from(&previous) {
                Some(policy) => policy,
                None => continue,
            };
            if policy.disabled {
                continue;
            }
            let amount = current_state.amount_msat;
            if amount < policy.htlc_minimum_msat
                || amount > policy.htlc_maximum_msat
            {
                continue;
            }
            if let Some(capacity) = channel.capacity_sats {
                if amount > capacity * 1000 {
                    continue;
                }
            }

            // the sender pays no fee for forwarding over its own
            // channel
            let fee = if previous == *source {
                0
            } else {
                forwarding_fee_msat(policy, amount)
            };
            let risk = amount
                * policy.cltv_expiry_delta as u64
                * RISK_FACTOR_PPB_PER_BLOCK
                / 1_000_000_000;
            let edge_cost = fee + risk;

            let candidate = NodeCost {
                amount_msat: amount + fee,
                cltv_delta: current_state.cltv_delta
                    + policy.cltv_expiry_delta as u32,
                cost: current_state.cost + edge_cost,
                next_channel: Some((
                    channel.short_channel_id,
                    current,
                )),
            };
            let improves = best
                .get(&previous)
                .map(|existing| candidate.cost < existing.cost)
                .unwrap_or(true);
            if improves {
                best.insert(previous, candidate);
                queue.push((Reverse(candidate.cost), previous));
            }
        }

        // our own (possibly unannounced) channels reach the graph as
        // fee-free, delta-free first hops
        for local in graph.local_channels() {
            if local.remote_node != current
                || current_state.amount_msat
                    > local.outbound_capacity_msat
            {
                continue;
            }
            let candidate = NodeCost {
                next_channel: Some((local.short_channel_id, current)),
                ..current_state
            };
            let improves = best
                .get(source)
                .map(|existing| candidate.cost < existing.cost)
                .unwrap_or(true);
            if improves {
                best.insert(*source, candidate);
                queue.push((Reverse(candidate.cost), *source));
            }
        }
    }

    // walk forward from the source following the chosen channels
    let source_state = best.get(source)?;
    let total_amount_msat = source_state.amount_msat;
    let total_cltv_delta = source_state.cltv_delta;

    let mut hops = vec![];
    let mut cursor = *source;
    while let Some((short_channel_id, next_node)) =
        best.get(&cursor).and_then(|state| state.next_channel)
    {
        let next_state = best.get(&next_node)?;
        // local channels carry no advertised policy; they add no delta
        let cltv_expiry_delta = graph
            .channel(&short_channel_id)
            .and_then(|channel| channel.policy_from(&cursor))
            .map(|policy| policy.cltv_expiry_delta)
            .unwrap_or(0);
        hops.push(RouteHop {
            node_id: next_node,
            short_channel_id,
            amount_msat: next_state.amount_msat,
            cltv_expiry_delta,
        });
        cursor = next_node;
    }
    if cursor != *destination || hops.is_empty() {
        return None;
    }

    Some(Route {
        hops,
        total_amount_msat,
        total_cltv_delta,
    })
}

#[cfg(test)]
mod test {
    use lnc_p2p::bolt::ChainHash;
    use secp256k1::{SecretKey, SECP256K1};

    use super::super::gossip::test::{
        make_channel, make_update, node_key,
    };
    use super::super::gossip::GossipGraph;
    use super::*;

    fn pubkey(key: &SecretKey) -> PublicKey {
        PublicKey::from_secret_key(SECP256K1, key)
    }

    // A -- B -- C line: A->B with base 1000/prop 1/cltv 40, B->C with
    // base 500/prop 10/cltv 24
    fn line_graph() -> (GossipGraph, PublicKey, PublicKey, PublicKey) {
        let chain = ChainHash::regtest();
        let mut graph = GossipGraph::new(chain);

        let (key_a, key_b, key_c) =
            (node_key(0x0A), node_key(0x0B), node_key(0x0C));
        let scid_ab = ShortChannelId::with(100, 1, 0);
        let scid_bc = ShortChannelId::with(200, 1, 0);

        graph
            .process_channel_announcement(
                &make_channel(&key_a, &key_b, scid_ab, chain),
                Some(10_000_000),
            )
            .unwrap();
        graph
            .process_channel_announcement(
                &make_channel(&key_b, &key_c, scid_bc, chain),
                Some(10_000_000),
            )
            .unwrap();

        // direction A->B: announced by A
        let ab_direction = pubkey(&key_a).serialize()
            > pubkey(&key_b).serialize();
        graph
            .process_channel_update(&make_update(
                &key_a,
                ab_direction,
                scid_ab,
                chain,
                1_000,
                1_000,
                1,
                40,
            ))
            .unwrap();
        // direction B->C: announced by B
        let bc_direction = pubkey(&key_b).serialize()
            > pubkey(&key_c).serialize();
        graph
            .process_channel_update(&make_update(
                &key_b,
                bc_direction,
                scid_bc,
                chain,
                1_000,
                500,
                10,
                24,
            ))
            .unwrap();

        (graph, pubkey(&key_a), pubkey(&key_b), pubkey(&key_c))
    }

    #[test]
    fn line_route_fee_and_cltv() {
        let (graph, node_a, node_b, node_c) = line_graph();
        let route =
            find_path(&graph, &node_a, &node_c, 100_000).unwrap();

        assert_eq!(route.hops.len(), 2);
        assert_eq!(route.hops[0].node_id, node_b);
        assert_eq!(route.hops[1].node_id, node_c);

        // hop B forwards the invoice amount
        assert_eq!(route.hops[1].amount_msat, 100_000);
        // B charges 500 base + 1 proportional
        assert_eq!(route.hops[0].amount_msat, 100_501);
        // the source's own channel is free
        assert_eq!(route.total_amount_msat, 100_501);
        assert_eq!(route.total_fee_msat(), 501);
        // 24 for B->C plus 40 for A->B
        assert_eq!(route.total_cltv_delta, 64);
    }

    #[test]
    fn no_route_to_unknown_node() {
        let (graph, node_a, _, _) = line_graph();
        let stranger = pubkey(&node_key(0x5F));
        assert!(find_path(&graph, &node_a, &stranger, 1_000).is_none());
    }

    #[test]
    fn amount_bounds_respected() {
        let (graph, node_a, _, node_c) = line_graph();
        // below htlc_minimum of 1 msat is impossible to construct, but
        // above htlc_maximum the channel is skipped
        assert!(find_path(
            &graph,
            &node_a,
            &node_c,
            10_000_000_001
        )
        .is_none());
    }

    #[test]
    fn disabled_direction_skipped() {
        let chain = ChainHash::regtest();
        let (graph, node_a, _, node_c) = line_graph();
        let mut graph = graph;
        // disable B->C by a fresher update with the disabled flag
        let key_b = node_key(0x0B);
        let key_c = node_key(0x0C);
        let bc_direction = pubkey(&key_b).serialize()
            > pubkey(&key_c).serialize();
        let mut update = make_update(
            &key_b,
            bc_direction,
            ShortChannelId::with(200, 1, 0),
            chain,
            2_000,
            500,
            10,
            24,
        );
        // re-sign with the disabled flag set
        update.channel_flags |= lnc_p2p::bolt::CHANNEL_FLAG_DISABLED;
        let digest = update.signature_digest();
        update.signature = SECP256K1.sign_ecdsa(&digest, &key_b);
        graph.process_channel_update(&update).unwrap();

        assert!(find_path(&graph, &node_a, &node_c, 100_000).is_none());
    }

    #[test]
    fn unannounced_local_channel_as_first_hop() {
        let chain = ChainHash::regtest();
        let mut graph = GossipGraph::new(chain);
        let (key_us, key_b, key_c) =
            (node_key(0x01), node_key(0x0B), node_key(0x0C));
        let scid_bc = ShortChannelId::with(200, 1, 0);
        graph
            .process_channel_announcement(
                &make_channel(&key_b, &key_c, scid_bc, chain),
                Some(10_000_000),
            )
            .unwrap();
        let bc_direction =
            pubkey(&key_b).serialize() > pubkey(&key_c).serialize();
        graph
            .process_channel_update(&make_update(
                &key_b,
                bc_direction,
                scid_bc,
                chain,
                1_000,
                500,
                10,
                24,
            ))
            .unwrap();
        // our private channel to B never appears in gossip
        graph.upsert_local_channel(
            super::super::gossip::LocalChannelInfo {
                remote_node: pubkey(&key_b),
                channel_id: lnc_p2p::bolt::ChannelId::wildcard(),
                short_channel_id: ShortChannelId::with(150, 9, 0),
                outbound_capacity_msat: 1_000_000,
                inbound_capacity_msat: 0,
            },
        );

        let route = find_path(
            &graph,
            &pubkey(&key_us),
            &pubkey(&key_c),
            100_000,
        )
        .unwrap();
        assert_eq!(route.hops.len(), 2);
        assert_eq!(
            route.hops[0].short_channel_id,
            ShortChannelId::with(150, 9, 0)
        );
        // the private first hop is free; B's fee applies
        assert_eq!(route.total_fee_msat(), 501);
        assert_eq!(route.total_cltv_delta, 24);
    }

    #[test]
    fn cheaper_of_two_routes_wins() {
        let chain = ChainHash::regtest();
        let mut graph = GossipGraph::new(chain);
        let (key_a, key_b, key_c, key_d) = (
            node_key(0x0A),
            node_key(0x0B),
            node_key(0x0C),
            node_key(0x0D),
        );
        // A-B-D expensive, A-C-D cheap
        let channels = [
            (&key_a, &key_b, ShortChannelId::with(100, 1, 0)),
            (&key_b, &key_d, ShortChannelId::with(101, 1, 0)),
            (&key_a, &key_c, ShortChannelId::with(102, 1, 0)),
            (&key_c, &key_d, ShortChannelId::with(103, 1, 0)),
        ];
        for (key_1, key_2, scid) in channels {
            graph
                .process_channel_announcement(
                    &make_channel(key_1, key_2, scid, chain),
                    Some(10_000_000),
                )
                .unwrap();
        }
        let updates = [
            (&key_a, &key_b, ShortChannelId::with(100, 1, 0), 0u32),
            (&key_b, &key_d, ShortChannelId::with(101, 1, 0), 10_000),
            (&key_a, &key_c, ShortChannelId::with(102, 1, 0), 0),
            (&key_c, &key_d, ShortChannelId::with(103, 1, 0), 100),
        ];
        for (from, to, scid, base_fee) in updates {
            let direction =
                pubkey(from).serialize() > pubkey(to).serialize();
            graph
                .process_channel_update(&make_update(
                    from, direction, scid, chain, 1_000, base_fee, 0, 40,
                ))
                .unwrap();
        }

        let route = find_path(
            &graph,
            &pubkey(&key_a),
            &pubkey(&key_d),
            50_000,
        )
        .unwrap();
        assert_eq!(route.hops[0].node_id, pubkey(&key_c));
        assert_eq!(route.total_fee_msat(), 100);
    }
}
