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

//! HTLC bookkeeper: the dual-view queues tracking which updates are part
//! of which commitment on each side of the channel.
//!
//! Every update (add, settle, fail, fee change) is recorded together with
//! the pair of commitment numbers at which it enters the local and the
//! remote commitment. A commitment transaction for either side at any
//! commitment number is a pure function of this log.
//!
//! Within one channel messages are processed strictly in arrival order,
//! so at the moment a `commitment_signed` is received every update we
//! proposed earlier has been seen by the signer and is covered by its
//! signature.

use std::collections::BTreeMap;

use lnc_p2p::bolt::{HashLock, HashPreimage, OnionPacket};

/// Side of the channel owning a commitment transaction (or proposing an
/// update)
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Display)]
#[derive(StrictEncode, StrictDecode)]
pub enum Viewpoint {
    /// Our own commitment transaction
    #[display("local")]
    Local,

    /// The peer's commitment transaction
    #[display("remote")]
    Remote,
}

impl Viewpoint {
    #[inline]
    pub fn other(self) -> Viewpoint {
        match self {
            Viewpoint::Local => Viewpoint::Remote,
            Viewpoint::Remote => Viewpoint::Local,
        }
    }
}

/// Bookkeeping errors; each one is a protocol violation by whoever
/// proposed the offending update.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Display, Error)]
#[display(doc_comments)]
pub enum Error {
    /// HTLC id {0} is not the next expected id for its direction
    NonMonotonicHtlcId(u64),

    /// HTLC id {0} is not known in the direction it is resolved in
    UnknownHtlcId(u64),

    /// HTLC id {0} is already settled or failed
    AlreadyResolved(u64),

    /// HTLC id {0} is not yet irrevocably committed and cannot be resolved
    NotYetCommitted(u64),

    /// HTLC amount of {amount_msat} msat is below the required minimum of
    /// {minimum_msat} msat
    BelowMinimum {
        amount_msat: u64,
        minimum_msat: u64,
    },

    /// adding the HTLC would exceed the maximum of {0} concurrently
    /// accepted HTLCs
    TooManyHtlcs(u16),

    /// adding the HTLC would bring {in_flight_msat} msat in flight over
    /// the limit of {limit_msat} msat
    InFlightLimitExceeded {
        in_flight_msat: u64,
        limit_msat: u64,
    },

    /// preimage provided for HTLC {0} does not match its payment hash
    PreimageMismatch(u64),
}

/// Limits one side imposes on HTLCs offered *towards* it
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
#[derive(StrictEncode, StrictDecode)]
pub struct DirectionLimits {
    pub htlc_minimum_msat: u64,
    pub max_accepted_htlcs: u16,
    pub max_htlc_value_in_flight_msat: u64,
}

/// An HTLC as proposed by `update_add_htlc`
#[derive(Clone, PartialEq, Eq, Debug)]
#[derive(StrictEncode, StrictDecode)]
pub struct Htlc {
    pub id: u64,
    pub amount_msat: u64,
    pub payment_hash: HashLock,
    pub cltv_expiry: u32,
    pub onion: OnionPacket,
}

/// Pair of commitment numbers at which an update becomes part of each
/// side's commitment; `None` while the update is not yet covered by a
/// `commitment_signed` towards that side.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
#[derive(StrictEncode, StrictDecode)]
struct CtnPair {
    local: Option<u64>,
    remote: Option<u64>,
}

impl CtnPair {
    fn get(&self, view: Viewpoint) -> Option<u64> {
        match view {
            Viewpoint::Local => self.local,
            Viewpoint::Remote => self.remote,
        }
    }

    fn set(&mut self, view: Viewpoint, ctn: u64) {
        match view {
            Viewpoint::Local => self.local = Some(ctn),
            Viewpoint::Remote => self.remote = Some(ctn),
        }
    }

    fn effective_at(&self, view: Viewpoint, ctn: u64) -> bool {
        matches!(self.get(view), Some(at) if at <= ctn)
    }
}

#[derive(Clone, PartialEq, Eq, Debug)]
#[derive(StrictEncode, StrictDecode)]
struct HtlcEntry {
    htlc: Htlc,
    added: CtnPair,
    /// `Some` once a settle is proposed; the inner pair tracks the
    /// commitments the removal is part of
    settled: Option<CtnPair>,
    /// Same for a fail
    failed: Option<CtnPair>,
    preimage: Option<HashPreimage>,
}

impl HtlcEntry {
    fn new(htlc: Htlc) -> HtlcEntry {
        HtlcEntry {
            htlc,
            added: CtnPair::default(),
            settled: None,
            failed: None,
            preimage: None,
        }
    }

    fn resolution_proposed(&self) -> bool {
        self.settled.is_some() || self.failed.is_some()
    }

    fn removed_at(&self, view: Viewpoint, ctn: u64) -> bool {
        self.settled
            .map(|pair| pair.effective_at(view, ctn))
            .unwrap_or_default()
            || self
                .failed
                .map(|pair| pair.effective_at(view, ctn))
                .unwrap_or_default()
    }

    fn live_at(&self, view: Viewpoint, ctn: u64) -> bool {
        self.added.effective_at(view, ctn) && !self.removed_at(view, ctn)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[derive(StrictEncode, StrictDecode)]
struct FeeUpdate {
    feerate_per_kw: u32,
    applied: CtnPair,
}

/// The per-channel dual-view HTLC and fee log.
///
/// `ctn(view)` is the number of the latest *revoked-into* commitment of
/// that side: it increments when the respective side's `revoke_and_ack`
/// is exchanged. Updates pending for a side are assigned `ctn + 1` when a
/// `commitment_signed` towards that side is produced or received.
#[derive(Clone, PartialEq, Eq, Debug)]
#[derive(StrictEncode, StrictDecode)]
pub struct HtlcQueues {
    /// HTLCs offered by the local node
    sent: BTreeMap<u64, HtlcEntry>,

    /// HTLCs offered by the remote node
    received: BTreeMap<u64, HtlcEntry>,

    next_sent_id: u64,
    next_received_id: u64,

    ctn_local: u64,
    ctn_remote: u64,

    initial_local_msat: u64,
    initial_remote_msat: u64,

    initial_feerate_per_kw: u32,
    fee_updates: Vec<FeeUpdate>,

    /// Limits the local node imposes on HTLCs it receives
    local_limits: DirectionLimits,

    /// Limits the remote node imposes on HTLCs we send
    remote_limits: DirectionLimits,
}

impl HtlcQueues {
    pub fn new(
        initial_local_msat: u64,
        initial_remote_msat: u64,
        initial_feerate_per_kw: u32,
        local_limits: DirectionLimits,
        remote_limits: DirectionLimits,
    ) -> HtlcQueues {
        HtlcQueues {
            sent: empty!(),
            received: empty!(),
            next_sent_id: 0,
            next_received_id: 0,
            ctn_local: 0,
            ctn_remote: 0,
            initial_local_msat,
            initial_remote_msat,
            initial_feerate_per_kw,
            fee_updates: vec![],
            local_limits,
            remote_limits,
        }
    }

    /// Latest committed (revoked-into) commitment number of a side
    #[inline]
    pub fn ctn(&self, view: Viewpoint) -> u64 {
        match view {
            Viewpoint::Local => self.ctn_local,
            Viewpoint::Remote => self.ctn_remote,
        }
    }

    #[inline]
    pub fn next_sent_id(&self) -> u64 {
        self.next_sent_id
    }

    #[inline]
    pub fn next_received_id(&self) -> u64 {
        self.next_received_id
    }

    fn map(&self, direction: Viewpoint) -> &BTreeMap<u64, HtlcEntry> {
        match direction {
            Viewpoint::Local => &self.sent,
            Viewpoint::Remote => &self.received,
        }
    }

    // HTLCs offered towards `recipient` which have no resolution proposed
    // yet: the set counted against the recipient's limits.
    fn unresolved_towards(
        &self,
        recipient: Viewpoint,
    ) -> impl Iterator<Item = &HtlcEntry> {
        self.map(recipient.other())
            .values()
            .filter(|entry| !entry.resolution_proposed())
    }

    fn check_add_limits(
        &self,
        amount_msat: u64,
        recipient: Viewpoint,
    ) -> Result<(), Error> {
        let limits = match recipient {
            Viewpoint::Local => self.local_limits,
            Viewpoint::Remote => self.remote_limits,
        };
        if amount_msat < limits.htlc_minimum_msat {
            return Err(Error::BelowMinimum {
                amount_msat,
                minimum_msat: limits.htlc_minimum_msat,
            });
        }
        let unresolved: Vec<&HtlcEntry> =
            self.unresolved_towards(recipient).collect();
        if unresolved.len() >= limits.max_accepted_htlcs as usize {
            return Err(Error::TooManyHtlcs(limits.max_accepted_htlcs));
        }
        let in_flight: u64 = unresolved
            .iter()
            .map(|entry| entry.htlc.amount_msat)
            .sum::<u64>()
            + amount_msat;
        if in_flight > limits.max_htlc_value_in_flight_msat {
            return Err(Error::InFlightLimitExceeded {
                in_flight_msat: in_flight,
                limit_msat: limits.max_htlc_value_in_flight_msat,
            });
        }
        Ok(())
    }

    /// Registers an HTLC we are offering; returns the assigned id
    pub fn send_add(
        &mut self,
        amount_msat: u64,
        payment_hash: HashLock,
        cltv_expiry: u32,
        onion: OnionPacket,
    ) -> Result<u64, Error> {
        self.check_add_limits(amount_msat, Viewpoint::Remote)?;
        let id = self.next_sent_id;
        self.sent.insert(
            id,
            HtlcEntry::new(Htlc {
                id,
                amount_msat,
                payment_hash,
                cltv_expiry,
                onion,
            }),
        );
        self.next_sent_id += 1;
        Ok(id)
    }

    /// Registers an HTLC offered to us by the peer
    pub fn recv_add(&mut self, htlc: Htlc) -> Result<(), Error> {
        if htlc.id != self.next_received_id {
            return Err(Error::NonMonotonicHtlcId(htlc.id));
        }
        self.check_add_limits(htlc.amount_msat, Viewpoint::Local)?;
        self.received.insert(htlc.id, HtlcEntry::new(htlc));
        self.next_received_id += 1;
        Ok(())
    }

    fn entry_for_resolution(
        map: &mut BTreeMap<u64, HtlcEntry>,
        id: u64,
        ctn_local: u64,
        ctn_remote: u64,
    ) -> Result<&mut HtlcEntry, Error> {
        let entry = map.get_mut(&id).ok_or(Error::UnknownHtlcId(id))?;
        if entry.resolution_proposed() {
            return Err(Error::AlreadyResolved(id));
        }
        // Resolution is allowed only once the add is present in both
        // committed states.
        if !entry.added.effective_at(Viewpoint::Local, ctn_local)
            || !entry.added.effective_at(Viewpoint::Remote, ctn_remote)
        {
            return Err(Error::NotYetCommitted(id));
        }
        Ok(entry)
    }

    fn check_preimage(
        entry: &HtlcEntry,
        id: u64,
        preimage: HashPreimage,
    ) -> Result<(), Error> {
        if HashLock::from(preimage) != entry.htlc.payment_hash {
            return Err(Error::PreimageMismatch(id));
        }
        Ok(())
    }

    /// Settles an HTLC the peer offered to us, revealing its preimage
    pub fn send_settle(
        &mut self,
        id: u64,
        preimage: HashPreimage,
    ) -> Result<(), Error> {
        let (ctn_local, ctn_remote) = (self.ctn_local, self.ctn_remote);
        let entry = Self::entry_for_resolution(
            &mut self.received,
            id,
            ctn_local,
            ctn_remote,
        )?;
        Self::check_preimage(entry, id, preimage)?;
        entry.preimage = Some(preimage);
        entry.settled = Some(CtnPair::default());
        Ok(())
    }

    /// Records the peer settling an HTLC we offered
    pub fn recv_settle(
        &mut self,
        id: u64,
        preimage: HashPreimage,
    ) -> Result<(), Error> {
        let (ctn_local, ctn_remote) = (self.ctn_local, self.ctn_remote);
        let entry = Self::entry_for_resolution(
            &mut self.sent,
            id,
            ctn_local,
            ctn_remote,
        )?;
        Self::check_preimage(entry, id, preimage)?;
        entry.preimage = Some(preimage);
        entry.settled = Some(CtnPair::default());
        Ok(())
    }

    /// Fails an HTLC the peer offered to us
    pub fn send_fail(&mut self, id: u64) -> Result<(), Error> {
        let (ctn_local, ctn_remote) = (self.ctn_local, self.ctn_remote);
        let entry = Self::entry_for_resolution(
            &mut self.received,
            id,
            ctn_local,
            ctn_remote,
        )?;
        entry.failed = Some(CtnPair::default());
        Ok(())
    }

    /// Records the peer failing an HTLC we offered
    pub fn recv_fail(&mut self, id: u64) -> Result<(), Error> {
        let (ctn_local, ctn_remote) = (self.ctn_local, self.ctn_remote);
        let entry = Self::entry_for_resolution(
            &mut self.sent,
            id,
            ctn_local,
            ctn_remote,
        )?;
        entry.failed = Some(CtnPair::default());
        Ok(())
    }

    /// Registers an `update_fee` proposed by the funder
    pub fn add_fee_update(&mut self, feerate_per_kw: u32) {
        self.fee_updates.push(FeeUpdate {
            feerate_per_kw,
            applied: CtnPair::default(),
        });
    }

    /// Assigns pending updates to the peer's next commitment; called when
    /// composing `commitment_signed`.
    pub fn send_commitment(&mut self) {
        self.assign_pending(Viewpoint::Remote);
    }

    /// Assigns pending updates to our next commitment; called when a
    /// valid `commitment_signed` is received.
    pub fn recv_commitment(&mut self) {
        self.assign_pending(Viewpoint::Local);
    }

    fn assign_pending(&mut self, view: Viewpoint) {
        let target = self.ctn(view) + 1;
        for entry in
            self.sent.values_mut().chain(self.received.values_mut())
        {
            if entry.added.get(view).is_none() {
                entry.added.set(view, target);
            }
            if let Some(pair) = &mut entry.settled {
                if pair.get(view).is_none() {
                    pair.set(view, target);
                }
            }
            if let Some(pair) = &mut entry.failed {
                if pair.get(view).is_none() {
                    pair.set(view, target);
                }
            }
        }
        for update in &mut self.fee_updates {
            if update.applied.get(view).is_none() {
                update.applied.set(view, target);
            }
        }
    }

    /// Advances our committed state; called when sending
    /// `revoke_and_ack`.
    pub fn send_revoke(&mut self) {
        self.ctn_local += 1;
        self.gc();
    }

    /// Advances the peer's committed state; called when a valid
    /// `revoke_and_ack` is received.
    pub fn recv_revoke(&mut self) {
        self.ctn_remote += 1;
        self.gc();
    }

    // Entries resolved in both committed views can never appear in any
    // future commitment; drop them to keep the log bounded.
    fn gc(&mut self) {
        let (ctn_local, ctn_remote) = (self.ctn_local, self.ctn_remote);
        let is_terminal = |entry: &HtlcEntry| {
            entry.removed_at(Viewpoint::Local, ctn_local)
                && entry.removed_at(Viewpoint::Remote, ctn_remote)
        };
        self.sent.retain(|_, entry| !is_terminal(entry));
        self.received.retain(|_, entry| !is_terminal(entry));
    }

    /// HTLCs live in the given view at the given commitment number,
    /// together with the side which offered them
    pub fn htlcs_in_view(
        &self,
        view: Viewpoint,
        ctn: u64,
    ) -> Vec<(Viewpoint, &Htlc)> {
        let mut htlcs = vec![];
        for entry in self.sent.values() {
            if entry.live_at(view, ctn) {
                htlcs.push((Viewpoint::Local, &entry.htlc));
            }
        }
        for entry in self.received.values() {
            if entry.live_at(view, ctn) {
                htlcs.push((Viewpoint::Remote, &entry.htlc));
            }
        }
        htlcs
    }

    /// Millisatoshi balance of a channel side within the given view at
    /// the given commitment number. Live HTLC amounts belong to neither
    /// balance.
    pub fn balance_in_view(
        &self,
        subject: Viewpoint,
        view: Viewpoint,
        ctn: u64,
    ) -> u64 {
        let mut balance = match subject {
            Viewpoint::Local => self.initial_local_msat,
            Viewpoint::Remote => self.initial_remote_msat,
        };
        let (own_offers, their_offers) = match subject {
            Viewpoint::Local => (&self.sent, &self.received),
            Viewpoint::Remote => (&self.received, &self.sent),
        };
        for entry in own_offers.values() {
            if entry.added.effective_at(view, ctn) {
                balance -= entry.htlc.amount_msat;
            }
            if let Some(pair) = entry.failed {
                if pair.effective_at(view, ctn) {
                    balance += entry.htlc.amount_msat;
                }
            }
        }
        for entry in their_offers.values() {
            if let Some(pair) = entry.settled {
                if pair.effective_at(view, ctn) {
                    balance += entry.htlc.amount_msat;
                }
            }
        }
        balance
    }

    /// Fee rate effective in the given view at the given commitment
    /// number
    pub fn feerate_in_view(&self, view: Viewpoint, ctn: u64) -> u32 {
        self.fee_updates
            .iter()
            .rev()
            .find(|update| update.applied.effective_at(view, ctn))
            .map(|update| update.feerate_per_kw)
            .unwrap_or(self.initial_feerate_per_kw)
    }

    /// Millisatoshi total of adds proposed in the given direction which
    /// are not yet covered by any `commitment_signed`
    pub fn pending_unassigned_msat(&self, direction: Viewpoint) -> u64 {
        self.map(direction)
            .values()
            .filter(|entry| entry.added == CtnPair::default())
            .map(|entry| entry.htlc.amount_msat)
            .sum()
    }

    /// Whether any update is waiting to be covered by a
    /// `commitment_signed` towards the given side
    pub fn has_pending_updates(&self, view: Viewpoint) -> bool {
        self.sent
            .values()
            .chain(self.received.values())
            .any(|entry| {
                entry.added.get(view).is_none()
                    || matches!(entry.settled, Some(pair) if pair.get(view).is_none())
                    || matches!(entry.failed, Some(pair) if pair.get(view).is_none())
            })
            || self
                .fee_updates
                .iter()
                .any(|update| update.applied.get(view).is_none())
    }

    /// Preimage of a settled HTLC, when known
    pub fn preimage(&self, id: u64) -> Option<HashPreimage> {
        self.sent
            .get(&id)
            .or_else(|| self.received.get(&id))
            .and_then(|entry| entry.preimage)
    }

    /// The HTLC in a given direction, if still tracked
    pub fn get(&self, direction: Viewpoint, id: u64) -> Option<&Htlc> {
        self.map(direction).get(&id).map(|entry| &entry.htlc)
    }
}

#[cfg(test)]
mod test {
    use amplify::{DumbDefault, Slice32, Wrapper};

    use super::*;

    fn limits() -> DirectionLimits {
        DirectionLimits {
            htlc_minimum_msat: 1_000,
            max_accepted_htlcs: 3,
            max_htlc_value_in_flight_msat: 100_000,
        }
    }

    fn queues() -> HtlcQueues {
        HtlcQueues::new(200_000_000, 0, 253, limits(), limits())
    }

    fn preimage(byte: u8) -> HashPreimage {
        HashPreimage::from_inner(Slice32::from_inner([byte; 32]))
    }

    fn add_sent(queues: &mut HtlcQueues, amount_msat: u64) -> u64 {
        queues
            .send_add(
                amount_msat,
                HashLock::from(preimage(9)),
                500_040,
                OnionPacket::dumb_default(),
            )
            .unwrap()
    }

    // one full update round: we sign, they revoke, they sign, we revoke
    fn full_round(queues: &mut HtlcQueues) {
        queues.send_commitment();
        queues.recv_revoke();
        queues.recv_commitment();
        queues.send_revoke();
    }

    #[test]
    fn htlc_roundtrip_advances_both_views() {
        let mut queues = queues();
        let id = add_sent(&mut queues, 50_000);
        assert_eq!(id, 0);

        full_round(&mut queues);
        assert_eq!(queues.ctn(Viewpoint::Local), 1);
        assert_eq!(queues.ctn(Viewpoint::Remote), 1);

        // the HTLC is live in both views
        assert_eq!(queues.htlcs_in_view(Viewpoint::Local, 1).len(), 1);
        assert_eq!(queues.htlcs_in_view(Viewpoint::Remote, 1).len(), 1);
        // the offerer's balance dropped by the HTLC amount
        assert_eq!(
            queues.balance_in_view(Viewpoint::Local, Viewpoint::Local, 1),
            200_000_000 - 50_000
        );
    }

    #[test]
    fn settle_moves_balance_to_recipient() {
        let mut queues = queues();
        let id = add_sent(&mut queues, 50_000);
        full_round(&mut queues);

        queues.recv_settle(id, preimage(9)).unwrap();
        full_round(&mut queues);

        assert!(queues.htlcs_in_view(Viewpoint::Local, 2).is_empty());
        assert_eq!(
            queues.balance_in_view(Viewpoint::Remote, Viewpoint::Local, 2),
            50_000
        );
        assert_eq!(
            queues.balance_in_view(Viewpoint::Local, Viewpoint::Local, 2),
            200_000_000 - 50_000
        );
    }

    #[test]
    fn fail_returns_balance_to_offerer() {
        let mut queues = queues();
        let id = add_sent(&mut queues, 50_000);
        full_round(&mut queues);

        queues.recv_fail(id).unwrap();
        full_round(&mut queues);

        assert_eq!(
            queues.balance_in_view(Viewpoint::Local, Viewpoint::Local, 2),
            200_000_000
        );
        assert_eq!(
            queues.balance_in_view(Viewpoint::Remote, Viewpoint::Local, 2),
            0
        );
    }

    #[test]
    fn settle_requires_matching_preimage() {
        let mut queues = queues();
        let id = add_sent(&mut queues, 50_000);
        full_round(&mut queues);
        assert_eq!(
            queues.recv_settle(id, preimage(8)),
            Err(Error::PreimageMismatch(id))
        );
    }

    #[test]
    fn settle_requires_irrevocable_commitment() {
        let mut queues = queues();
        let id = add_sent(&mut queues, 50_000);
        // no commitment exchange yet
        assert_eq!(
            queues.recv_settle(id, preimage(9)),
            Err(Error::NotYetCommitted(id))
        );
    }

    #[test]
    fn received_ids_must_be_sequential() {
        let mut queues = queues();
        let htlc = Htlc {
            id: 1,
            amount_msat: 10_000,
            payment_hash: HashLock::from(preimage(1)),
            cltv_expiry: 500_000,
            onion: OnionPacket::dumb_default(),
        };
        assert_eq!(queues.recv_add(htlc), Err(Error::NonMonotonicHtlcId(1)));
    }

    #[test]
    fn limits_are_enforced() {
        let mut queues = queues();
        assert_eq!(
            queues.send_add(
                500,
                HashLock::from(preimage(1)),
                500_000,
                OnionPacket::dumb_default()
            ),
            Err(Error::BelowMinimum {
                amount_msat: 500,
                minimum_msat: 1_000,
            })
        );

        add_sent(&mut queues, 10_000);
        add_sent(&mut queues, 10_000);
        add_sent(&mut queues, 10_000);
        assert_eq!(
            queues.send_add(
                10_000,
                HashLock::from(preimage(1)),
                500_000,
                OnionPacket::dumb_default()
            ),
            Err(Error::TooManyHtlcs(3))
        );
    }

    #[test]
    fn in_flight_limit_is_enforced() {
        let mut queues = queues();
        add_sent(&mut queues, 60_000);
        assert_eq!(
            queues.send_add(
                50_000,
                HashLock::from(preimage(1)),
                500_000,
                OnionPacket::dumb_default()
            ),
            Err(Error::InFlightLimitExceeded {
                in_flight_msat: 110_000,
                limit_msat: 100_000,
            })
        );
    }

    #[test]
    fn views_agree_when_quiescent() {
        let mut queues = queues();
        add_sent(&mut queues, 30_000);
        add_sent(&mut queues, 20_000);
        full_round(&mut queues);
        queues
            .recv_add(Htlc {
                id: 0,
                amount_msat: 15_000,
                payment_hash: HashLock::from(preimage(2)),
                cltv_expiry: 500_010,
                onion: OnionPacket::dumb_default(),
            })
            .unwrap();
        // peer initiates the round for its update
        queues.recv_commitment();
        queues.send_revoke();
        queues.send_commitment();
        queues.recv_revoke();

        let ctn_local = queues.ctn(Viewpoint::Local);
        let ctn_remote = queues.ctn(Viewpoint::Remote);
        let tag = |direction: &Viewpoint, id: u64| {
            (matches!(direction, Viewpoint::Local) as u64) << 63 | id
        };
        let local_ids: Vec<u64> = queues
            .htlcs_in_view(Viewpoint::Local, ctn_local)
            .iter()
            .map(|(direction, htlc)| tag(direction, htlc.id))
            .collect();
        let remote_ids: Vec<u64> = queues
            .htlcs_in_view(Viewpoint::Remote, ctn_remote)
            .iter()
            .map(|(direction, htlc)| tag(direction, htlc.id))
            .collect();
        assert_eq!(local_ids, remote_ids);
        assert_eq!(local_ids.len(), 3);

        // balances in both views agree as well
        assert_eq!(
            queues.balance_in_view(
                Viewpoint::Local,
                Viewpoint::Local,
                ctn_local
            ),
            queues.balance_in_view(
                Viewpoint::Local,
                Viewpoint::Remote,
                ctn_remote
            ),
        );
    }

    #[test]
    fn fee_updates_apply_per_view() {
        let mut queues = queues();
        assert_eq!(queues.feerate_in_view(Viewpoint::Local, 0), 253);
        queues.add_fee_update(500);
        queues.send_commitment();
        assert_eq!(queues.feerate_in_view(Viewpoint::Remote, 1), 500);
        // not yet applied to the local view
        assert_eq!(queues.feerate_in_view(Viewpoint::Local, 1), 253);
        queues.recv_revoke();
        queues.recv_commitment();
        queues.send_revoke();
        assert_eq!(queues.feerate_in_view(Viewpoint::Local, 1), 500);
    }

    #[test]
    fn resolved_htlcs_are_garbage_collected() {
        let mut queues = queues();
        let id = add_sent(&mut queues, 50_000);
        full_round(&mut queues);
        queues.recv_fail(id).unwrap();
        full_round(&mut queues);
        assert!(queues.get(Viewpoint::Local, id).is_none());
        // ids are never reused
        assert_eq!(queues.next_sent_id(), 1);
    }
}
