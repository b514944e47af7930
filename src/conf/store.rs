//! Numbered configuration snapshots: `<prefix>0`, `<prefix>1`, ...
use std::error;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use crate::command::Privilege;
use crate::dispatch::{dispatch, Context, Session};

#[derive(Debug)]
pub enum StoreError {
    Io(io::Error),
    /// Refusing to overwrite an existing snapshot. [path]
    Exists(PathBuf),
    /// Loading stopped at a failing line. [path, line number, reason]
    Aborted(PathBuf, usize, String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use StoreError::*;
        match self {
            Io(e) => write!(f, "snapshot I/O error: {}", e),
            Exists(p) => write!(f, "snapshot {} already exists", p.display()),
            Aborted(p, n, r) => write!(f, "load of {} aborted at line {}: {}", p.display(), n, r),
        }
    }
}

impl error::Error for StoreError {}

impl From<io::Error> for StoreError {
    fn from(error: io::Error) -> Self {
        StoreError::Io(error)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub good: usize,
    pub bad: usize,
}

#[derive(Debug, Clone)]
pub struct SnapshotStore {
    prefix: String,
    max_files: usize,
}

impl SnapshotStore {
    /// `max_files` of 0 keeps every snapshot
    pub fn new(prefix: &str, max_files: usize) -> Self {
        Self {
            prefix: prefix.to_string(),
            max_files,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn path_for(&self, id: &str) -> PathBuf {
        PathBuf::from(format!("{}{}", self.prefix, id))
    }

    // (directory, file name prefix)
    fn split_prefix(&self) -> (PathBuf, &str) {
        match self.prefix.rfind('/') {
            Some(0) => (PathBuf::from("/"), &self.prefix[1..]),
            Some(idx) => (PathBuf::from(&self.prefix[..idx]), &self.prefix[idx + 1..]),
            None => (PathBuf::from("."), self.prefix.as_str()),
        }
    }

    /// Existing snapshots ordered by id
    pub fn list(&self) -> Result<Vec<(u64, PathBuf)>, StoreError> {
        let (dir, base) = self.split_prefix();
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(vec![]),
            Err(err) => return Err(err.into()),
        };
        let mut snapshots = Vec::new();
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            let id = name
                .to_str()
                .and_then(|name| name.strip_prefix(base))
                .filter(|id| !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit()))
                .and_then(|id| id.parse::<u64>().ok());
            if let Some(id) = id {
                snapshots.push((id, entry.path()));
            }
        }
        snapshots.sort();
        Ok(snapshots)
    }

    pub fn find_last(&self) -> Result<Option<(u64, PathBuf)>, StoreError> {
        Ok(self.list()?.pop())
    }

    /// Write `lines` as the next snapshot, then drop the oldest ones beyond
    /// the configured maximum
    pub fn save_new(&self, lines: &[String]) -> Result<PathBuf, StoreError> {
        let id = match self.find_last()? {
            Some((last, _)) => last + 1,
            None => 0,
        };
        let path = self.path_for(&id.to_string());
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                return Err(StoreError::Exists(path))
            }
            Err(err) => return Err(err.into()),
        };
        for line in lines {
            writeln!(file, "{}", line)?;
        }
        file.sync_all()?;
        info!("Saved configuration snapshot {}", path.display());
        self.erase_old()?;
        Ok(path)
    }

    fn erase_old(&self) -> Result<(), StoreError> {
        if self.max_files < 1 {
            return Ok(());
        }
        let snapshots = self.list()?;
        if snapshots.len() <= self.max_files {
            return Ok(());
        }
        let excess = snapshots.len() - self.max_files;
        for (_, path) in &snapshots[..excess] {
            fs::remove_file(path)?;
            debug!("Erased old snapshot {}", path.display());
        }
        Ok(())
    }
}

pub fn read_lines(path: &Path) -> Result<Vec<String>, StoreError> {
    let reader = BufReader::new(File::open(path)?);
    let mut lines = Vec::new();
    for line in reader.lines() {
        lines.push(line?);
    }
    Ok(lines)
}

/// Feed a snapshot through the dispatcher at config privilege.
/// Failing lines are logged and counted, or stop the load when `abort_on_error`.
pub fn load(
    ctx: &mut Context,
    path: &Path,
    session: &mut dyn Session,
    abort_on_error: bool,
) -> Result<LoadReport, StoreError> {
    let mut report = LoadReport::default();
    for (i, line) in read_lines(path)?.iter().enumerate() {
        // every line is a full path, never relative to a mode entered above it
        session.set_edit_path(String::new());
        match dispatch(ctx, line, session, Privilege::Config) {
            Ok(()) => report.good += 1,
            Err(err) => {
                warn!("{}:{}: [{}] {}", path.display(), i + 1, line, err);
                if abort_on_error {
                    return Err(StoreError::Aborted(path.to_path_buf(), i + 1, err.to_string()));
                }
                report.bad += 1;
            }
        }
    }
    session.set_edit_path(String::new());
    info!(
        "Loaded {}: {} good line(s), {} bad",
        path.display(),
        report.good,
        report.bad
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::command::{apply_fn, handler, CommandKind, CommandTree, KeywordRegistry, Lister};
    use crate::conf::config_set;
    use crate::dispatch::CaptureSession;

    fn store(dir: &tempfile::TempDir, max_files: usize) -> SnapshotStore {
        let prefix = format!("{}/test.conf.", dir.path().display());
        SnapshotStore::new(&prefix, max_files)
    }

    fn lines(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir, 3);
        assert!(store.list().unwrap().is_empty());
        assert!(store.find_last().unwrap().is_none());
        let missing = SnapshotStore::new("/nonexistent/routerd/x.conf.", 3);
        assert!(missing.list().unwrap().is_empty());
    }

    #[test]
    fn test_save_and_list() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir, 0);
        for i in 0..12 {
            store.save_new(&[format!("hostname r{}", i)]).unwrap();
        }
        // unrelated files are ignored
        fs::write(dir.path().join("test.conf.old"), "x").unwrap();
        fs::write(dir.path().join("other.conf.1"), "x").unwrap();
        let ids: Vec<u64> = store.list().unwrap().into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, (0..12).collect::<Vec<_>>());
        let (last, path) = store.find_last().unwrap().unwrap();
        assert_eq!(last, 11);
        assert_eq!(read_lines(&path).unwrap(), vec!["hostname r11"]);
    }

    #[test]
    fn test_erase_old() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir, 2);
        for _ in 0..5 {
            store.save_new(&lines(&["ip routing"])).unwrap();
        }
        let ids: Vec<u64> = store.list().unwrap().into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![3, 4]);
    }

    #[test]
    fn test_never_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir, 0);
        let path = store.save_new(&lines(&["a"])).unwrap();
        let file = OpenOptions::new().write(true).create_new(true).open(&path);
        assert!(file.is_err());
        assert!(read_lines(&store.path_for("1")).is_err());
    }

    fn context() -> Context {
        let lister: Lister = Arc::new(|| (vec![], vec![]));
        let mut tree = CommandTree::new(KeywordRegistry::new(lister));
        let set = handler(|ctx, node, line, _| Ok(config_set(&mut ctx.candidate, node, line)?));
        for path in &["hostname (HOSTNAME)", "router rip network {NETWORK}"] {
            tree.install(
                CommandKind::Config,
                path,
                Privilege::Config,
                set.clone(),
                Some(apply_fn(|_| Ok(()))),
                "",
            )
            .unwrap();
        }
        Context::new("test", Arc::new(tree))
    }

    #[test]
    fn test_load_counts_bad_lines() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir, 0);
        let path = store
            .save_new(&lines(&[
                "hostname r1",
                "router rip network 10.0.0.1/8",
                "! comment",
                "router",
                "network 10.0.0.0/8",
                "router rip network 10.0.0.0/8",
            ]))
            .unwrap();

        let mut ctx = context();
        let mut session = CaptureSession::new(Privilege::Config);
        let report = load(&mut ctx, &path, &mut session, false).unwrap();
        // "router" enters a mode but the next line is still absolute
        assert_eq!(report, LoadReport { good: 4, bad: 2 });
        assert_eq!(
            ctx.candidate.lines(),
            vec!["hostname r1", "router rip network 10.0.0.0/8"]
        );
        assert_eq!(session.edit_path(), "");

        let mut ctx = context();
        let err = load(&mut ctx, &path, &mut session, true).unwrap_err();
        assert!(matches!(err, StoreError::Aborted(_, 2, _)));
    }
}
