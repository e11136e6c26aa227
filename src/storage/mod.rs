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

//! Crash-safe channel persistence: one directory per channel holding an
//! atomically replaced `state.v1` snapshot plus append-only revocation
//! and HTLC logs. Every write is fsync'd; readers tolerate torn tails by
//! discarding the last record when its length prefix does not match.
//!
//! A persistence failure is fatal: the caller must stop writing to the
//! network before any state could be lost.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use amplify::{IoError, Slice32};
use lnc_p2p::bolt::HashLock;
use strict_encoding::{StrictDecode, StrictEncode};

use crate::channel::ChannelState;

const STATE_FILE: &str = "state.v1";
const STATE_TMP_FILE: &str = "state.v1.tmp";
const REVOCATION_LOG: &str = "revocation.log";
const HTLC_LOG: &str = "htlc.log";

/// Persistence errors
#[derive(Clone, PartialEq, Eq, Debug, Display, Error, From)]
#[display(doc_comments)]
pub enum Error {
    /// filesystem failure: {0}
    #[from(io::Error)]
    #[display(inner)]
    Io(IoError),

    /// state serialization failure: {0}
    #[from]
    #[display(inner)]
    Encoding(strict_encoding::Error),
}

/// One record of the append-only revocation log
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[derive(StrictEncode, StrictDecode)]
pub struct RevocationRecord {
    pub index: u64,
    pub secret: Slice32,
}

/// One record of the append-only HTLC lifecycle journal
#[derive(Clone, PartialEq, Eq, Debug)]
#[derive(StrictEncode, StrictDecode)]
pub enum HtlcLogRecord {
    /// `update_add_htlc` sent or received
    Added {
        sent: bool,
        htlc_id: u64,
        amount_msat: u64,
        payment_hash: HashLock,
        cltv_expiry: u32,
    },

    /// `update_fulfill_htlc` sent or received
    Settled {
        sent: bool,
        htlc_id: u64,
        preimage: Slice32,
    },

    /// `update_fail_htlc` sent or received
    Failed { sent: bool, htlc_id: u64 },

    /// A `commitment_signed`/`revoke_and_ack` pair completed, moving a
    /// side to the given commitment number
    Committed { local: bool, ctn: u64 },
}

fn fsync_dir(dir: &Path) -> io::Result<()> {
    File::open(dir)?.sync_all()
}

fn append_record<T: StrictEncode>(
    path: &Path,
    record: &T,
) -> Result<(), Error> {
    let payload = strict_encoding::strict_serialize(record)?;
    let mut file =
        OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(&(payload.len() as u32).to_le_bytes())?;
    file.write_all(&payload)?;
    file.sync_all()?;
    Ok(())
}

// Reads length-prefixed records; a torn tail (incomplete length or
// payload) terminates the scan without an error.
fn read_records<T: StrictDecode>(path: &Path) -> Result<Vec<T>, Error> {
    let mut data = vec![];
    match File::open(path) {
        Ok(mut file) => {
            file.read_to_end(&mut data)?;
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            return Ok(vec![])
        }
        Err(err) => return Err(err.into()),
    }

    let mut records = vec![];
    let mut cursor = &data[..];
    while cursor.len() >= 4 {
        let mut length = [0u8; 4];
        length.copy_from_slice(&cursor[..4]);
        let length = u32::from_le_bytes(length) as usize;
        if cursor.len() < 4 + length {
            warn!(
                "storage: discarding torn tail record in {}",
                path.display()
            );
            break;
        }
        match strict_encoding::strict_deserialize(
            &cursor[4..4 + length],
        ) {
            Ok(record) => records.push(record),
            Err(_) => {
                warn!(
                    "storage: discarding undecodable tail record in {}",
                    path.display()
                );
                break;
            }
        }
        cursor = &cursor[4 + length..];
    }
    Ok(records)
}

/// Persistent storage of a single channel
#[derive(Clone, Debug)]
pub struct ChannelStorage {
    dir: PathBuf,
}

impl ChannelStorage {
    /// Opens (creating when necessary) the per-channel directory under
    /// `root`, named by the raw channel id
    pub fn open(
        root: impl AsRef<Path>,
        channel_id: Slice32,
    ) -> Result<ChannelStorage, Error> {
        let dir = root.as_ref().join(format!("{:x}", channel_id));
        fs::create_dir_all(&dir)?;
        Ok(ChannelStorage { dir })
    }

    #[inline]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Atomically replaces the channel state snapshot. The write goes to
    /// a temporary file, is fsync'd, renamed over the previous snapshot
    /// and the directory entry is fsync'd as well: a crash yields either
    /// the old or the new state, never a mix.
    pub fn save_state(&self, state: &ChannelState) -> Result<(), Error> {
        let payload = strict_encoding::strict_serialize(state)?;
        let tmp_path = self.dir.join(STATE_TMP_FILE);
        let final_path = self.dir.join(STATE_FILE);

        let mut tmp = File::create(&tmp_path)?;
        tmp.write_all(&(payload.len() as u32).to_le_bytes())?;
        tmp.write_all(&payload)?;
        tmp.sync_all()?;
        drop(tmp);

        fs::rename(&tmp_path, &final_path)?;
        fsync_dir(&self.dir)?;
        Ok(())
    }

    /// Loads the latest state snapshot; `None` when the channel was
    /// never saved
    pub fn load_state(&self) -> Result<Option<ChannelState>, Error> {
        let path = self.dir.join(STATE_FILE);
        let mut data = vec![];
        match File::open(&path) {
            Ok(mut file) => {
                file.read_to_end(&mut data)?;
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Ok(None)
            }
            Err(err) => return Err(err.into()),
        }
        if data.len() < 4 {
            return Ok(None);
        }
        let mut length = [0u8; 4];
        length.copy_from_slice(&data[..4]);
        let length = u32::from_le_bytes(length) as usize;
        if data.len() < 4 + length {
            // torn snapshot: the rename never completed
            return Ok(None);
        }
        Ok(Some(strict_encoding::strict_deserialize(
            &data[4..4 + length],
        )?))
    }

    /// Appends a released revocation secret to the log
    pub fn append_revocation(
        &self,
        index: u64,
        secret: Slice32,
    ) -> Result<(), Error> {
        append_record(&self.dir.join(REVOCATION_LOG), &RevocationRecord {
            index,
            secret,
        })
    }

    /// Replays the revocation log
    pub fn load_revocations(
        &self,
    ) -> Result<Vec<RevocationRecord>, Error> {
        read_records(&self.dir.join(REVOCATION_LOG))
    }

    /// Appends an HTLC lifecycle event
    pub fn append_htlc_event(
        &self,
        record: &HtlcLogRecord,
    ) -> Result<(), Error> {
        append_record(&self.dir.join(HTLC_LOG), record)
    }

    /// Replays the HTLC journal
    pub fn load_htlc_events(&self) -> Result<Vec<HtlcLogRecord>, Error> {
        read_records(&self.dir.join(HTLC_LOG))
    }

    /// Truncates the HTLC journal once both sides' commitments have
    /// moved past all recorded entries
    pub fn truncate_htlc_log(&self) -> Result<(), Error> {
        let path = self.dir.join(HTLC_LOG);
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }
        fsync_dir(&self.dir)?;
        Ok(())
    }

    /// Removes all channel files; called when the channel is fully
    /// closed and buried
    pub fn purge(self) -> Result<(), Error> {
        fs::remove_dir_all(&self.dir)?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::{AtomicU32, Ordering};

    use amplify::{DumbDefault, Wrapper};

    use super::*;

    static TEST_DIR_COUNTER: AtomicU32 = AtomicU32::new(0);

    fn test_root() -> PathBuf {
        let counter = TEST_DIR_COUNTER.fetch_add(1, Ordering::SeqCst);
        let dir = std::env::temp_dir().join(format!(
            "lnc-storage-test-{}-{}",
            std::process::id(),
            counter
        ));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn storage() -> ChannelStorage {
        ChannelStorage::open(test_root(), Slice32::from_inner([7u8; 32]))
            .unwrap()
    }

    #[test]
    fn state_snapshot_roundtrip() {
        let storage = storage();
        assert!(storage.load_state().unwrap().is_none());

        let mut state = ChannelState::dumb_default();
        state.funding_satoshis = 200_000;
        storage.save_state(&state).unwrap();

        let loaded = storage.load_state().unwrap().unwrap();
        assert_eq!(loaded.funding_satoshis, 200_000);

        // overwriting is idempotent
        state.funding_satoshis = 300_000;
        storage.save_state(&state).unwrap();
        assert_eq!(
            storage.load_state().unwrap().unwrap().funding_satoshis,
            300_000
        );
    }

    #[test]
    fn revocation_log_replay() {
        let storage = storage();
        for index in 0..5u64 {
            storage
                .append_revocation(
                    crate::secrets::START_INDEX - index,
                    Slice32::from_inner([index as u8; 32]),
                )
                .unwrap();
        }
        let records = storage.load_revocations().unwrap();
        assert_eq!(records.len(), 5);
        assert_eq!(records[0].index, crate::secrets::START_INDEX);
        assert_eq!(records[4].secret, Slice32::from_inner([4u8; 32]));
    }

    #[test]
    fn torn_tail_is_discarded() {
        let storage = storage();
        storage
            .append_revocation(1, Slice32::from_inner([1u8; 32]))
            .unwrap();
        storage
            .append_revocation(2, Slice32::from_inner([2u8; 32]))
            .unwrap();

        // simulate a crash mid-append: write a length prefix promising
        // more bytes than are present
        let path = storage.dir().join(REVOCATION_LOG);
        let mut file =
            OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&100u32.to_le_bytes()).unwrap();
        file.write_all(&[0xAA; 10]).unwrap();
        file.sync_all().unwrap();

        let records = storage.load_revocations().unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn htlc_journal_roundtrip_and_truncation() {
        let storage = storage();
        storage
            .append_htlc_event(&HtlcLogRecord::Added {
                sent: true,
                htlc_id: 0,
                amount_msat: 50_000,
                payment_hash: HashLock::default(),
                cltv_expiry: 500_040,
            })
            .unwrap();
        storage
            .append_htlc_event(&HtlcLogRecord::Committed {
                local: false,
                ctn: 1,
            })
            .unwrap();
        assert_eq!(storage.load_htlc_events().unwrap().len(), 2);

        storage.truncate_htlc_log().unwrap();
        assert!(storage.load_htlc_events().unwrap().is_empty());
    }

    #[test]
    fn purge_removes_directory() {
        let storage = storage();
        let mut state = ChannelState::dumb_default();
        state.funding_satoshis = 1;
        storage.save_state(&state).unwrap();
        let dir = storage.dir().to_path_buf();
        storage.purge().unwrap();
        assert!(!dir.exists());
    }
}
