//! Document storage boundary
//!
//! The orchestrator only loads and saves whole trees. Where the YAML lives
//! (a local file, a byte stream, memory) is up to the [`TreeStore`].

use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Local;
use confshift_tree::Tree;
use parking_lot::Mutex;

use crate::error::StorageError;

/// Render `tree` as YAML text
///
/// # Errors
/// Returns `Render` if the tree cannot be serialized
pub fn render_yaml(tree: &Tree) -> Result<String, StorageError> {
    tree.to_yaml_string().map_err(StorageError::Render)
}

fn parse_yaml(text: &str, location: &str) -> Result<Tree, StorageError> {
    Tree::from_yaml_str(text).map_err(|source| StorageError::Parse {
        location: location.to_string(),
        source,
    })
}

/// Loads and saves the document a run operates on
pub trait TreeStore {
    /// Load the document
    ///
    /// # Errors
    /// Returns error if the document cannot be read or parsed
    fn load(&mut self) -> Result<Tree, StorageError>;

    /// Persist `tree`, returning where it went
    ///
    /// # Errors
    /// Returns error if the document cannot be rendered or written
    fn save(&mut self, tree: &Tree) -> Result<String, StorageError>;

    /// Textual form used for dry-run comparison
    ///
    /// # Errors
    /// Returns error if the tree cannot be rendered
    fn render(&self, tree: &Tree) -> Result<String, StorageError> {
        render_yaml(tree)
    }

    /// Write out whatever `save` held back; called once at the end of a run
    ///
    /// # Errors
    /// Returns `Write` if the held document cannot be written
    fn flush(&mut self) -> Result<(), StorageError> {
        Ok(())
    }

    /// Human readable location
    fn describe(&self) -> String;
}

/// YAML document on the local filesystem
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
    backup: bool,
}

impl FileStore {
    /// Store at `path`, no backups
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            backup: false,
        }
    }

    /// Copy the current file aside before each save
    #[must_use]
    pub fn with_backup(mut self, backup: bool) -> Self {
        self.backup = backup;
        self
    }

    /// Document path
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `config.yaml` becomes `config_20200331225419.yaml`
    #[must_use]
    pub fn backup_path(&self, stamp: &str) -> PathBuf {
        let stem = self
            .path
            .file_stem()
            .map_or_else(String::new, |s| s.to_string_lossy().into_owned());
        let name = match self.path.extension() {
            Some(ext) => format!("{stem}_{stamp}.{}", ext.to_string_lossy()),
            None => format!("{stem}_{stamp}"),
        };
        self.path.with_file_name(name)
    }

    /// Copy the current file to a timestamped sibling
    ///
    /// Returns the backup path, or `None` when there is no file yet.
    ///
    /// # Errors
    /// Returns `Read` or `Write` on I/O failure
    pub fn backup_now(&self) -> Result<Option<PathBuf>, StorageError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let current = fs::read_to_string(&self.path).map_err(|source| StorageError::Read {
            location: self.describe(),
            source,
        })?;
        let target = self.backup_path(&Local::now().format("%Y%m%d%H%M%S").to_string());
        fs::write(&target, current.trim()).map_err(|source| StorageError::Write {
            location: target.display().to_string(),
            source,
        })?;
        tracing::info!(backup = %target.display(), "backed up document");
        Ok(Some(target))
    }
}

impl TreeStore for FileStore {
    fn load(&mut self) -> Result<Tree, StorageError> {
        let text = fs::read_to_string(&self.path).map_err(|source| StorageError::Read {
            location: self.describe(),
            source,
        })?;
        parse_yaml(&text, &self.describe())
    }

    fn save(&mut self, tree: &Tree) -> Result<String, StorageError> {
        let rendered = render_yaml(tree)?;
        if self.backup {
            self.backup_now()?;
        }
        fs::write(&self.path, rendered).map_err(|source| StorageError::Write {
            location: self.describe(),
            source,
        })?;
        tracing::debug!(path = %self.path.display(), "saved document");
        Ok(self.describe())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Document read from one stream and written to another
///
/// Input is read once and cached, so repeated loads see the same text.
/// A stream cannot be rewound, so `save` only keeps the latest rendering
/// and `flush` writes it as a single document.
pub struct StreamStore<R, W> {
    input: R,
    output: W,
    cached: Option<String>,
    held: Option<String>,
}

impl<R: Read, W: Write> StreamStore<R, W> {
    /// Read from `input`, write to `output`
    pub fn new(input: R, output: W) -> Self {
        Self {
            input,
            output,
            cached: None,
            held: None,
        }
    }

    /// Consume the store, returning the output
    pub fn into_output(self) -> W {
        self.output
    }
}

impl<R: Read, W: Write> TreeStore for StreamStore<R, W> {
    fn load(&mut self) -> Result<Tree, StorageError> {
        if self.cached.is_none() {
            let mut text = String::new();
            self.input
                .read_to_string(&mut text)
                .map_err(|source| StorageError::Read {
                    location: "stream".to_string(),
                    source,
                })?;
            self.cached = Some(text.trim().to_string());
        }
        parse_yaml(self.cached.as_deref().unwrap_or_default(), "stream")
    }

    fn save(&mut self, tree: &Tree) -> Result<String, StorageError> {
        self.held = Some(render_yaml(tree)?);
        Ok(self.describe())
    }

    fn flush(&mut self) -> Result<(), StorageError> {
        let Some(rendered) = self.held.take() else {
            return Ok(());
        };
        let write = |output: &mut W| -> std::io::Result<()> {
            output.write_all(rendered.as_bytes())?;
            output.flush()
        };
        write(&mut self.output).map_err(|source| StorageError::Write {
            location: self.describe(),
            source,
        })
    }

    fn describe(&self) -> String {
        "stream".to_string()
    }
}

#[derive(Debug, Default)]
struct MemoryDocument {
    tree: Tree,
    saves: usize,
}

/// In-memory document; clones share the same tree
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryDocument>>,
}

impl MemoryStore {
    /// Store holding `tree`
    #[must_use]
    pub fn new(tree: Tree) -> Self {
        Self {
            inner: Arc::new(Mutex::new(MemoryDocument { tree, saves: 0 })),
        }
    }

    /// Store parsed from YAML text
    ///
    /// # Errors
    /// Returns `Parse` for invalid YAML
    pub fn from_yaml(text: &str) -> Result<Self, StorageError> {
        Ok(Self::new(parse_yaml(text, "memory")?))
    }

    /// Current tree
    #[must_use]
    pub fn tree(&self) -> Tree {
        self.inner.lock().tree.clone()
    }

    /// Number of saves so far
    #[must_use]
    pub fn save_count(&self) -> usize {
        self.inner.lock().saves
    }
}

impl TreeStore for MemoryStore {
    fn load(&mut self) -> Result<Tree, StorageError> {
        Ok(self.tree())
    }

    fn save(&mut self, tree: &Tree) -> Result<String, StorageError> {
        let mut doc = self.inner.lock();
        doc.tree = tree.clone();
        doc.saves += 1;
        Ok(self.describe())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "foo:\n  bar: [element1]\n").unwrap();

        let mut store = FileStore::new(&path);
        let tree = store.load().unwrap();
        assert_eq!(tree.select(".foo.bar.[0]").unwrap(), &Tree::from("element1"));

        store.save(&Tree::from_yaml_str("foo: baz").unwrap()).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "foo: baz\n");
    }

    #[test]
    fn file_empty_is_null_and_missing_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "").unwrap();
        assert_eq!(FileStore::new(&path).load().unwrap(), Tree::Null);

        let missing = FileStore::new(dir.path().join("absent.yaml")).load();
        assert!(matches!(missing, Err(StorageError::Read { .. })));
    }

    #[test]
    fn file_invalid_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "foo: [unclosed").unwrap();
        assert!(matches!(FileStore::new(&path).load(), Err(StorageError::Parse { .. })));
    }

    #[test]
    fn file_backup_before_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "foo: bar\n").unwrap();

        let mut store = FileStore::new(&path).with_backup(true);
        store.save(&Tree::from_yaml_str("foo: baz").unwrap()).unwrap();

        let backups: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.starts_with("config_") && name.ends_with(".yaml"))
            .collect();
        assert_eq!(backups.len(), 1);
        assert_eq!(
            fs::read_to_string(dir.path().join(&backups[0])).unwrap(),
            "foo: bar"
        );
    }

    #[test]
    fn backup_path_format() {
        let store = FileStore::new("/etc/app/config.yaml");
        assert_eq!(
            store.backup_path("20200331225419"),
            PathBuf::from("/etc/app/config_20200331225419.yaml")
        );
    }

    #[test]
    fn stream_reads_once() {
        let input = std::io::Cursor::new("foo: bar\n");
        let mut store = StreamStore::new(input, Vec::new());
        assert_eq!(store.load().unwrap(), store.load().unwrap());

        store.save(&Tree::from_yaml_str("foo: baz").unwrap()).unwrap();
        store.flush().unwrap();
        assert_eq!(String::from_utf8(store.into_output()).unwrap(), "foo: baz\n");
    }

    #[test]
    fn stream_writes_last_save_once() {
        let mut store = StreamStore::new(std::io::Cursor::new("foo: baz\n"), Vec::new());
        store.save(&Tree::from_yaml_str("foo: bar").unwrap()).unwrap();
        store.save(&Tree::from_yaml_str("{}").unwrap()).unwrap();
        store.flush().unwrap();
        store.flush().unwrap();

        let written = String::from_utf8(store.into_output()).unwrap();
        assert_eq!(written, "{}\n");
        assert_eq!(Tree::from_yaml_str(&written).unwrap(), Tree::map());
    }

    #[test]
    fn stream_nothing_saved_writes_nothing() {
        let mut store = StreamStore::new(std::io::Cursor::new("a: 1"), Vec::new());
        store.load().unwrap();
        store.flush().unwrap();
        assert!(store.into_output().is_empty());
    }

    #[test]
    fn memory_shares_state() {
        let store = MemoryStore::from_yaml("a: 1").unwrap();
        let mut handle = store.clone();
        handle.save(&Tree::from_yaml_str("a: 2").unwrap()).unwrap();
        assert_eq!(store.tree(), Tree::from_yaml_str("a: 2").unwrap());
        assert_eq!(store.save_count(), 1);
    }
}
