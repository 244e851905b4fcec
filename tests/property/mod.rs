//! Property-based testing for bitrot
//!
//! Uses proptest to check the persistence format and the scrub
//! classification against randomly generated states and trees.

use ::bitrot::*;
use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use std::collections::BTreeMap;
use std::fs;
use tempfile::TempDir;

/// Generate a plausible file record
fn record_strategy() -> impl Strategy<Value = FileRecord> {
    (
        any::<u64>(),
        prop_oneof![Just(0o100644u32), Just(0o100755u32), Just(0o100600u32)],
        0i64..4_000_000_000,
        0u32..1_000_000_000,
        any::<[u8; 32]>(),
    )
        .prop_map(|(size, mode, secs, nanos, digest)| FileRecord {
            size,
            mode,
            modified: Utc.timestamp_opt(secs, nanos).unwrap(),
            digest: ContentDigest::from_bytes(digest),
        })
}

/// Generate absolute paths under /data, including non-ASCII names
fn key_strategy() -> impl Strategy<Value = String> {
    prop::collection::vec("[a-zA-Z0-9 _.é文-]{1,12}", 1..=4)
        .prop_map(|parts| format!("/data/{}", parts.join("/")))
}

fn state_strategy() -> impl Strategy<Value = DirectoryState> {
    prop::collection::btree_map(key_strategy(), record_strategy(), 0..40).prop_map(|entries| {
        let mut state = DirectoryState::new("/data");
        for (key, record) in entries {
            state.insert(key, record);
        }
        state
    })
}

/// Generate small file trees as relative path to content
fn tree_strategy() -> impl Strategy<Value = BTreeMap<String, Vec<u8>>> {
    prop::collection::btree_map(
        ("[a-c]{1,2}", "[a-z]{1,6}").prop_map(|(dir, name)| format!("{}/{}.bin", dir, name)),
        prop::collection::vec(any::<u8>(), 1..256),
        1..12,
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Saving and loading preserves every entry exactly
    #[test]
    fn state_persistence_is_lossless(state in state_strategy()) {
        let bytes = state.serialize().unwrap();
        let restored = DirectoryState::deserialize(&bytes).unwrap();

        prop_assert_eq!(restored.root(), state.root());
        prop_assert_eq!(restored.len(), state.len());
        for (path, record) in state.iter() {
            prop_assert_eq!(restored.get(path), Some(record));
        }
    }

    /// Decoding yields the entries in the same order they were recorded in
    #[test]
    fn state_decoding_preserves_entry_order(state in state_strategy()) {
        let restored = DirectoryState::deserialize(&state.serialize().unwrap()).unwrap();
        let a: Vec<_> = state.iter().collect();
        let b: Vec<_> = restored.iter().collect();
        prop_assert_eq!(a, b);
    }

    /// File names made of arbitrary bytes survive persistence exactly
    #[cfg(unix)]
    #[test]
    fn raw_file_names_persist_losslessly(
        names in prop::collection::btree_set(
            prop::collection::vec(any::<u8>().prop_filter("no separator or NUL", |b| *b != b'/' && *b != 0), 1..16),
            1..10,
        ),
        record in record_strategy(),
    ) {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let mut state = DirectoryState::new("/data");
        for name in &names {
            state.insert(std::path::Path::new("/data").join(OsStr::from_bytes(name)), record.clone());
        }

        let restored = DirectoryState::deserialize(&state.serialize().unwrap()).unwrap();
        let a: Vec<_> = state.iter().collect();
        let b: Vec<_> = restored.iter().collect();
        prop_assert_eq!(a, b);
    }

    /// Any strict prefix of a saved state is rejected as corrupt
    #[test]
    fn truncated_state_is_corrupt(state in state_strategy(), cut in any::<prop::sample::Index>()) {
        let bytes = state.serialize().unwrap();
        let len = cut.index(bytes.len());
        let err = DirectoryState::deserialize(&bytes[..len]).unwrap_err();
        prop_assert!(err.is_corruption(), "unexpected error: {}", err);
    }

    /// Arbitrary bytes never decode into a state by accident, or fail any other way
    #[test]
    fn garbage_is_corrupt(bytes in prop::collection::vec(any::<u8>(), 0..512)) {
        if let Err(err) = DirectoryState::deserialize(&bytes) {
            prop_assert!(err.is_corruption(), "unexpected error: {}", err);
        }
    }

    /// Scrubbing an untouched tree twice never reports anything and changes nothing
    #[test]
    fn untouched_tree_is_stable(tree in tree_strategy()) {
        let temp_dir = TempDir::new().unwrap();
        let root = utils::resolve_root(temp_dir.path()).unwrap();
        for (path, content) in &tree {
            let full = root.join(path);
            fs::create_dir_all(full.parent().unwrap()).unwrap();
            fs::write(full, content).unwrap();
        }

        let scrubber = Scrubber::new(&root);
        let mut state = DirectoryState::new(&root);
        let mut reports: Vec<MismatchReport> = Vec::new();

        let first = scrubber.compare(&mut state, &mut reports).unwrap();
        prop_assert_eq!(first.new, tree.len());
        let snapshot: Vec<_> = state.iter().map(|(k, v)| (k.clone(), v.clone())).collect();

        let second = scrubber.compare(&mut state, &mut reports).unwrap();
        prop_assert_eq!(second.unchanged, tree.len());
        prop_assert!(reports.is_empty());
        let after: Vec<_> = state.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        prop_assert_eq!(snapshot, after);
    }
}
