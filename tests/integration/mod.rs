//! Multi-run scenarios
//!
//! Each test drives several complete runs (load, scrub, save) against a
//! temporary tree and a temporary state directory, the way the CLI does.

use ::bitrot::*;
use filetime::FileTime;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// Test harness holding a tree, its state directory, and the reports of the
/// most recent run
pub struct ScrubHarness {
    pub tree_dir: TempDir,
    pub state_dir: TempDir,
    pub root: PathBuf,
    pub store: StateDirectory,
}

impl ScrubHarness {
    /// Create an empty tree and state directory
    pub fn new() -> Self {
        let tree_dir = TempDir::new().unwrap();
        let state_dir = TempDir::new().unwrap();
        let root = utils::resolve_root(tree_dir.path()).unwrap();
        let store = StateDirectory::open(state_dir.path()).unwrap();

        Self {
            tree_dir,
            state_dir,
            root,
            store,
        }
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }

    /// Key the state uses for a file
    pub fn key(&self, relative: &str) -> PathBuf {
        self.path(relative)
    }

    pub fn write(&self, relative: &str, content: &[u8]) {
        let path = self.path(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    /// Replace a file's bytes while keeping its size and mtime
    pub fn rot(&self, relative: &str, content: &[u8]) {
        let path = self.path(relative);
        let metadata = fs::metadata(&path).unwrap();
        assert_eq!(metadata.len(), content.len() as u64, "rot must keep the size");
        let mtime = FileTime::from_last_modification_time(&metadata);
        fs::write(&path, content).unwrap();
        filetime::set_file_mtime(&path, mtime).unwrap();
    }

    /// Set a file's mtime to a fixed point
    pub fn touch(&self, relative: &str, unix_secs: i64) {
        filetime::set_file_mtime(self.path(relative), FileTime::from_unix_time(unix_secs, 0))
            .unwrap();
    }

    pub fn load(&self) -> DirectoryState {
        self.store.load_state(&self.root).unwrap()
    }

    /// One complete run: load, scrub, save
    pub fn run(&self) -> (ScanSummary, Vec<MismatchReport>) {
        self.run_with(Scrubber::new(&self.root)).unwrap()
    }

    /// One complete run with a custom scrubber
    pub fn run_with(&self, scrubber: Scrubber) -> Result<(ScanSummary, Vec<MismatchReport>)> {
        let mut reports: Vec<MismatchReport> = Vec::new();
        let summary = scrubber.run(&self.store, &mut reports, false)?;
        Ok((summary, reports))
    }

    pub fn state_file(&self) -> PathBuf {
        self.store.state_file_for(&self.root)
    }
}

#[test]
fn test_hello_world_scenario() {
    let h = ScrubHarness::new();
    h.write("a.txt", b"hello");

    let (summary, reports) = h.run();
    assert_eq!(summary.new, 1);
    assert!(reports.is_empty());
    let d1 = h.load().get(&h.key("a.txt")).unwrap().digest;
    assert_eq!(d1.to_hex(), utils::hash_data(b"hello"));

    h.rot("a.txt", b"world");

    let (summary, reports) = h.run();
    assert_eq!(summary.mismatched, 1);
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].path, h.key("a.txt"));
    assert_eq!(reports[0].expected, d1);
    assert_eq!(reports[0].actual.to_hex(), utils::hash_data(b"world"));
    assert_eq!(
        reports[0].to_string(),
        format!(
            "[Digest Mismatch] {} ({} -> {})",
            h.key("a.txt").display(),
            utils::hash_data(b"hello"),
            utils::hash_data(b"world")
        )
    );

    assert_eq!(h.load().get(&h.key("a.txt")).unwrap().digest, d1);
}

#[test]
fn test_only_the_rotten_file_is_reported() {
    let h = ScrubHarness::new();
    for i in 0..20 {
        h.write(&format!("dir{}/file{}.dat", i % 4, i), format!("payload {:04}", i).as_bytes());
    }
    h.run();

    h.rot("dir3/file7.dat", b"payload 9999");

    let (summary, reports) = h.run();
    assert_eq!(summary.files_seen, 20);
    assert_eq!(summary.unchanged, 19);
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].path, h.key("dir3/file7.dat"));
}

#[test]
fn test_edit_then_rot() {
    let h = ScrubHarness::new();
    h.write("notes.md", b"draft one");
    h.touch("notes.md", 1_500_000_000);
    h.run();

    // A real edit moves the mtime and is accepted
    h.write("notes.md", b"draft two");
    h.touch("notes.md", 1_500_000_500);
    let (summary, reports) = h.run();
    assert_eq!(summary.updated, 1);
    assert!(reports.is_empty());

    // Rot after the edit is measured against the new baseline
    h.rot("notes.md", b"draft twx");
    let (_, reports) = h.run();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].expected.to_hex(), utils::hash_data(b"draft two"));
}

#[test]
fn test_new_files_join_the_baseline() {
    let h = ScrubHarness::new();
    h.write("a.txt", b"a");
    h.run();

    h.write("b.txt", b"b");
    let (summary, _) = h.run();
    assert_eq!(summary.new, 1);
    assert_eq!(summary.unchanged, 1);
    assert_eq!(h.load().len(), 2);
}

#[test]
fn test_deleted_file_entries_are_kept() {
    let h = ScrubHarness::new();
    h.write("a.txt", b"a");
    h.write("b.txt", b"b");
    h.run();

    fs::remove_file(h.path("b.txt")).unwrap();
    let (summary, reports) = h.run();
    assert!(reports.is_empty());
    assert_eq!(summary.stale, 1);

    let state = h.load();
    assert_eq!(state.len(), 2);
    assert!(state.contains(&h.key("b.txt")));
}

/// Progress callback that swaps every other listed file for a directory once
/// the first file is digested; the swapped entries fail on read
#[cfg(target_os = "linux")]
fn fail_reads_after_first_file(files: Vec<PathBuf>) -> ProgressCallback {
    let fired = std::sync::atomic::AtomicBool::new(false);
    std::sync::Arc::new(move |info: ProgressInfo| {
        if fired.swap(true, std::sync::atomic::Ordering::SeqCst) {
            return;
        }
        for file in &files {
            if info.current_item.as_deref() != Some(file.as_path()) {
                fs::remove_file(file).unwrap();
                fs::create_dir(file).unwrap();
            }
        }
    })
}

#[cfg(target_os = "linux")]
#[test]
fn test_read_failure_aborts_run_and_keeps_saved_state() {
    let h = ScrubHarness::new();
    h.write("a.txt", b"a");
    h.run();
    let saved = fs::read(h.state_file()).unwrap();

    h.write("b.txt", b"b");
    h.write("c.txt", b"c");
    let files = vec![h.path("a.txt"), h.path("b.txt"), h.path("c.txt")];
    let scrubber = Scrubber::new(&h.root).with_progress_callback(fail_reads_after_first_file(files));

    let err = h.run_with(scrubber).unwrap_err();
    assert!(matches!(err, BitrotError::FileRead { .. }));
    assert!(!err.is_fatal_before_scan());

    // Byte-identical state file, no leftover temp file
    assert_eq!(fs::read(h.state_file()).unwrap(), saved);
    assert!(!h.state_file().with_extension("tmp").exists());
    assert_eq!(h.load().len(), 1);
}

#[test]
fn test_dry_run_leaves_saved_state_untouched() {
    let h = ScrubHarness::new();
    h.write("a.txt", b"a");
    h.run();
    let saved = fs::read(h.state_file()).unwrap();

    h.write("b.txt", b"b");
    let summary = Scrubber::new(&h.root)
        .run(&h.store, &mut Vec::<MismatchReport>::new(), true)
        .unwrap();
    assert_eq!(summary.new, 1);

    assert_eq!(fs::read(h.state_file()).unwrap(), saved);
    assert!(!h.load().contains(h.key("b.txt")));
}

#[cfg(target_os = "linux")]
#[test]
fn test_non_utf8_names_are_tracked_across_runs() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let h = ScrubHarness::new();
    let file = h.root.join(OsStr::from_bytes(b"photo\xff.jpg"));
    fs::write(&file, b"hello").unwrap();

    let (summary, _) = h.run();
    assert_eq!(summary.new, 1);
    assert!(h.load().contains(&file));

    let mtime = FileTime::from_last_modification_time(&fs::metadata(&file).unwrap());
    fs::write(&file, b"world").unwrap();
    filetime::set_file_mtime(&file, mtime).unwrap();

    let (_, reports) = h.run();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].path, file);
    assert!(reports[0].to_string().contains("photo\\xff.jpg"));
}

#[test]
fn test_corrupt_state_file_blocks_the_run() {
    let h = ScrubHarness::new();
    h.write("a.txt", b"a");
    h.run();

    let file = h.state_file();
    let bytes = fs::read(&file).unwrap();
    fs::write(&file, &bytes[..bytes.len() / 2]).unwrap();

    let err = h.store.load_state(&h.root).unwrap_err();
    assert!(err.is_corruption());
    assert!(err.is_fatal_before_scan());
    // The damaged file is not replaced
    assert_eq!(fs::read(&file).unwrap(), &bytes[..bytes.len() / 2]);
}

#[test]
fn test_roots_have_independent_state() {
    let h = ScrubHarness::new();
    h.write("one/a.txt", b"a");
    h.write("two/b.txt", b"b");

    let one = utils::resolve_root(&h.path("one")).unwrap();
    let two = utils::resolve_root(&h.path("two")).unwrap();
    assert_ne!(h.store.state_file_for(&one), h.store.state_file_for(&two));

    for root in [&one, &two] {
        let mut state = h.store.load_state(root).unwrap();
        Scrubber::new(root)
            .compare(&mut state, &mut Vec::<MismatchReport>::new())
            .unwrap();
        h.store.save_state(&state).unwrap();
    }

    let state_one = h.store.load_state(&one).unwrap();
    assert_eq!(state_one.len(), 1);
    assert!(state_one.contains(one.join("a.txt")));
}

#[test]
fn test_relative_root_maps_to_same_state() {
    let h = ScrubHarness::new();
    h.write("sub/a.txt", b"a");

    let direct = utils::resolve_root(&h.path("sub")).unwrap();
    let roundabout = utils::resolve_root(&h.path("sub").join("..").join("sub")).unwrap();
    assert_eq!(direct, roundabout);
    assert_eq!(h.store.state_file_for(&direct), h.store.state_file_for(&roundabout));
}

#[test]
fn test_excluded_files_are_never_recorded() {
    let h = ScrubHarness::new();
    h.write("keep/a.txt", b"a");
    h.write("keep/a.txt.swp", b"swap");
    h.write("build/out.o", b"obj");

    let scrubber = Scrubber::new(&h.root)
        .with_exclude_patterns(vec!["*.swp".to_string(), "build".to_string()])
        .unwrap();
    let mut state = h.load();
    let summary = scrubber
        .compare(&mut state, &mut Vec::<MismatchReport>::new())
        .unwrap();

    assert_eq!(summary.files_seen, 1);
    assert_eq!(state.len(), 1);
    assert!(state.contains(&h.key("keep/a.txt")));
}

