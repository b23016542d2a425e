//! Unit tests for uta-journal.

use uta_core::{SeqNr, TimeValue};

use crate::{
    EventJournal, FileJournal, FileSnapshots, MemoryJournal, MemorySnapshots, SnapshotMeta,
    SnapshotStore,
};

// ── Shared contract checks, run against both backends ─────────────────────────

fn check_dense_sequencing(journal: &dyn EventJournal) {
    assert_eq!(journal.append("LaneActor-L-1", b"a").unwrap(), SeqNr(1));
    assert_eq!(journal.append("LaneActor-L-1", b"b").unwrap(), SeqNr(2));
    // Independent key gets its own sequence.
    assert_eq!(journal.append("RoadActor-R-1", b"x").unwrap(), SeqNr(1));
    assert_eq!(journal.last_seq("LaneActor-L-1").unwrap(), SeqNr(2));
    assert_eq!(journal.last_seq("unknown").unwrap(), SeqNr::ZERO);
}

fn check_replay_after(journal: &dyn EventJournal) {
    for payload in [b"e1", b"e2", b"e3"] {
        journal.append("k", payload).unwrap();
    }
    let all = journal.replay("k", SeqNr::ZERO).unwrap();
    assert_eq!(all.len(), 3);
    assert_eq!(all[0], (SeqNr(1), b"e1".to_vec()));
    assert_eq!(all[2], (SeqNr(3), b"e3".to_vec()));

    let tail = journal.replay("k", SeqNr(2)).unwrap();
    assert_eq!(tail, vec![(SeqNr(3), b"e3".to_vec())]);

    assert!(journal.replay("absent", SeqNr::ZERO).unwrap().is_empty());
}

fn check_truncate_keeps_numbering(journal: &dyn EventJournal) {
    for payload in [b"e1", b"e2", b"e3", b"e4"] {
        journal.append("k", payload).unwrap();
    }
    journal.truncate("k", SeqNr(2)).unwrap();

    let events = journal.replay("k", SeqNr::ZERO).unwrap();
    assert_eq!(events, vec![(SeqNr(3), b"e3".to_vec()), (SeqNr(4), b"e4".to_vec())]);

    // New appends continue the sequence, not restart it.
    assert_eq!(journal.append("k", b"e5").unwrap(), SeqNr(5));

    // Truncating twice to the same bound is a no-op.
    journal.truncate("k", SeqNr(2)).unwrap();
    assert_eq!(journal.last_seq("k").unwrap(), SeqNr(5));

    // Truncating beyond the last assigned seq is a structural error.
    assert!(journal.truncate("k", SeqNr(99)).is_err());
}

// ── MemoryJournal ─────────────────────────────────────────────────────────────

#[cfg(test)]
mod memory_journal {
    use super::*;

    #[test]
    fn dense_sequencing() {
        check_dense_sequencing(&MemoryJournal::new());
    }

    #[test]
    fn replay_after() {
        check_replay_after(&MemoryJournal::new());
    }

    #[test]
    fn truncate_keeps_numbering() {
        check_truncate_keeps_numbering(&MemoryJournal::new());
    }
}

// ── FileJournal ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod file_journal {
    use super::*;

    #[test]
    fn dense_sequencing() {
        let dir = tempfile::tempdir().unwrap();
        check_dense_sequencing(&FileJournal::open(dir.path(), false).unwrap());
    }

    #[test]
    fn replay_after() {
        let dir = tempfile::tempdir().unwrap();
        check_replay_after(&FileJournal::open(dir.path(), false).unwrap());
    }

    #[test]
    fn truncate_keeps_numbering() {
        let dir = tempfile::tempdir().unwrap();
        check_truncate_keeps_numbering(&FileJournal::open(dir.path(), true).unwrap());
    }

    #[test]
    fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let journal = FileJournal::open(dir.path(), true).unwrap();
            journal.append("k", b"e1").unwrap();
            journal.append("k", b"e2").unwrap();
        }
        let journal = FileJournal::open(dir.path(), true).unwrap();
        assert_eq!(journal.last_seq("k").unwrap(), SeqNr(2));
        assert_eq!(journal.replay("k", SeqNr(1)).unwrap(), vec![(SeqNr(2), b"e2".to_vec())]);
        // Appends after reopen continue the sequence.
        assert_eq!(journal.append("k", b"e3").unwrap(), SeqNr(3));
    }

    #[test]
    fn torn_tail_is_discarded_on_open() {
        let dir = tempfile::tempdir().unwrap();
        {
            let journal = FileJournal::open(dir.path(), true).unwrap();
            journal.append("k", b"good").unwrap();
        }
        // Simulate a crash mid-append: a length prefix promising more bytes
        // than were written.
        let log = dir.path().join("journal").join("k.log");
        let mut bytes = std::fs::read(&log).unwrap();
        bytes.extend_from_slice(&100u32.to_le_bytes());
        bytes.extend_from_slice(b"partial");
        std::fs::write(&log, &bytes).unwrap();

        let journal = FileJournal::open(dir.path(), true).unwrap();
        let events = journal.replay("k", SeqNr::ZERO).unwrap();
        assert_eq!(events, vec![(SeqNr(1), b"good".to_vec())]);
        // The torn frame never got a sequence number.
        assert_eq!(journal.append("k", b"next").unwrap(), SeqNr(2));
    }

    #[test]
    fn truncation_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let journal = FileJournal::open(dir.path(), true).unwrap();
            for payload in [b"e1", b"e2", b"e3"] {
                journal.append("k", payload).unwrap();
            }
            journal.truncate("k", SeqNr(2)).unwrap();
        }
        let journal = FileJournal::open(dir.path(), true).unwrap();
        assert_eq!(journal.replay("k", SeqNr::ZERO).unwrap(), vec![(SeqNr(3), b"e3".to_vec())]);
        assert_eq!(journal.append("k", b"e4").unwrap(), SeqNr(4));
    }
}

// ── Snapshot stores ───────────────────────────────────────────────────────────

fn meta(seq: u64, at: u64) -> SnapshotMeta {
    SnapshotMeta { seq_nr: SeqNr(seq), timestamp: TimeValue(at) }
}

fn check_snapshot_rotation(store: &dyn SnapshotStore) {
    assert!(store.latest("k").unwrap().is_none());

    store.save("k", meta(50, 10), b"state-50").unwrap();
    store.save("k", meta(120, 20), b"state-120").unwrap();

    let (m, state) = store.latest("k").unwrap().unwrap();
    assert_eq!(m, meta(120, 20));
    assert_eq!(state, b"state-120");

    // Rotation: drop generations older than the latest.
    store.delete("k", SeqNr(120)).unwrap();
    let (m, _) = store.latest("k").unwrap().unwrap();
    assert_eq!(m.seq_nr, SeqNr(120));

    // Deleting what is already gone is a no-op.
    store.delete("k", SeqNr(120)).unwrap();
    assert!(store.latest("k").unwrap().is_some());
}

#[cfg(test)]
mod snapshots {
    use super::*;

    #[test]
    fn memory_rotation() {
        let store = MemorySnapshots::new();
        check_snapshot_rotation(&store);
        assert_eq!(store.count("k"), 1);
    }

    #[test]
    fn file_rotation() {
        let dir = tempfile::tempdir().unwrap();
        check_snapshot_rotation(&FileSnapshots::open(dir.path()).unwrap());
    }

    #[test]
    fn file_latest_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = FileSnapshots::open(dir.path()).unwrap();
            store.save("k", meta(7, 3), b"blob").unwrap();
        }
        let store = FileSnapshots::open(dir.path()).unwrap();
        let (m, state) = store.latest("k").unwrap().unwrap();
        assert_eq!(m, meta(7, 3));
        assert_eq!(state, b"blob");
    }
}
