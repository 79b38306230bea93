//! File system walker with extension and pattern filtering.
//!
//! Traverses directory trees lazily and yields candidate documents in
//! a stable order (sorted by file name within each directory).
//! Symlinks are followed; walkdir's ancestor tracking reports loops as
//! errors, which are logged and skipped, so enumeration always ends.

use glob::Pattern;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

use crate::core::error::{DocaError, Result};
use crate::core::types::DocumentRef;

/// File system walker with extension and exclude-pattern filtering
#[derive(Debug, Clone)]
pub struct FileWalker {
    /// Lower-case extensions to include, without the dot
    extensions: Vec<String>,

    /// Compiled glob excludes, matched against full paths
    exclude_patterns: Vec<Pattern>,

    /// Files above this size are flagged as oversize
    max_file_size_bytes: u64,
}

/// Lazy sequence of documents under one root
pub struct FileWalk<'a> {
    walker: &'a FileWalker,
    inner: walkdir::FilterEntry<walkdir::IntoIter, Box<dyn FnMut(&DirEntry) -> bool + 'a>>,
}

impl FileWalker {
    /// Compile the filters for a walk
    ///
    /// # Arguments
    ///
    /// * `extensions` - File extensions to include (case-insensitive)
    /// * `exclude_patterns` - Glob patterns for paths to exclude
    /// * `max_file_size_mb` - Size above which files count as oversize
    ///
    /// # Returns
    ///
    /// A new `FileWalker` instance or an error if a pattern is
    /// invalid
    pub fn new(
        extensions: Vec<String>,
        exclude_patterns: Vec<String>,
        max_file_size_mb: usize,
    ) -> Result<Self> {
        let exclude = exclude_patterns
            .into_iter()
            .map(|p| {
                Pattern::new(&p).map_err(|e| {
                    DocaError::ConfigError(format!("Invalid exclude pattern '{p}': {e}"))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let extensions = extensions
            .into_iter()
            .map(|e| e.trim_start_matches('.').to_lowercase())
            .collect();

        Ok(Self {
            extensions,
            exclude_patterns: exclude,
            max_file_size_bytes: (max_file_size_mb as u64) * 1024 * 1024,
        })
    }

    /// Size limit in bytes
    pub fn max_file_size_bytes(&self) -> u64 {
        self.max_file_size_bytes
    }

    /// Whether a document is above the size limit
    pub fn is_oversize(&self, doc: &DocumentRef) -> bool {
        doc.size_bytes > self.max_file_size_bytes
    }

    /// Check that `root` exists and is a directory
    pub fn validate_root(root: &Path) -> Result<()> {
        if !root.exists() {
            return Err(DocaError::NotFound(root.display().to_string()));
        }
        if !root.is_dir() {
            return Err(DocaError::NotADirectory(root.display().to_string()));
        }
        Ok(())
    }

    /// Start a lazy walk under `root`
    ///
    /// Each call re-enumerates the file system. With `recursive`
    /// false only the root's direct children are considered.
    pub fn walk<'a>(&'a self, root: &'a Path, recursive: bool) -> Result<FileWalk<'a>> {
        Self::validate_root(root)?;

        let mut walkdir = WalkDir::new(root)
            .follow_links(true)
            .sort_by_file_name();
        if !recursive {
            walkdir = walkdir.max_depth(1);
        }

        let filter: Box<dyn FnMut(&DirEntry) -> bool + 'a> =
            Box::new(move |e| self.should_process_entry(e, root));

        Ok(FileWalk {
            walker: self,
            inner: walkdir.into_iter().filter_entry(filter),
        })
    }

    /// Collect all matching documents from a directory
    pub fn collect_files(&self, root: &Path, recursive: bool) -> Result<Vec<DocumentRef>> {
        Ok(self.walk(root, recursive)?.collect())
    }

    /// Whether the walk enters `entry`. The root is always entered.
    fn should_process_entry(&self, entry: &DirEntry, root: &Path) -> bool {
        let path = entry.path();

        if path == root {
            return true;
        }

        if !entry.file_type().is_dir() {
            return true;
        }

        // Dot-directories
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            if name.starts_with('.') {
                return false;
            }
        }

        // Skip entire directory trees early
        for pattern in &self.exclude_patterns {
            if pattern.matches_path(path) || pattern.matches_path(&path.join("")) {
                tracing::debug!("Skipping excluded directory: {:?}", path);
                return false;
            }
        }

        true
    }

    /// Check a file path against the extension filter and excludes
    fn matches(&self, path: &Path) -> bool {
        let ext = match path.extension().and_then(|e| e.to_str()) {
            Some(ext) => ext.to_lowercase(),
            None => return false,
        };

        if !self.extensions.iter().any(|e| *e == ext) {
            return false;
        }

        !self.exclude_patterns.iter().any(|p| p.matches_path(path))
    }

    fn to_document(&self, entry: &DirEntry) -> Option<DocumentRef> {
        let path = entry.path();
        if !self.matches(path) {
            return None;
        }

        let size_bytes = match entry.metadata() {
            Ok(metadata) => metadata.len(),
            Err(e) => {
                tracing::warn!("Cannot stat {:?}: {}", path, e);
                return None;
            }
        };

        Some(DocumentRef {
            path: path.to_path_buf(),
            document_id: path.to_string_lossy().into_owned(),
            file_type: path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.to_lowercase())
                .unwrap_or_default(),
            size_bytes,
        })
    }
}

impl Iterator for FileWalk<'_> {
    type Item = DocumentRef;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.inner.next()? {
                Ok(entry) => {
                    if !entry.file_type().is_file() {
                        continue;
                    }
                    if let Some(doc) = self.walker.to_document(&entry) {
                        return Some(doc);
                    }
                }
                Err(e) => {
                    if let Some(ancestor) = e.loop_ancestor() {
                        tracing::warn!(
                            "Symlink loop at {:?} (points back to {:?}), not followed",
                            e.path().map(PathBuf::from),
                            ancestor
                        );
                    } else {
                        tracing::warn!("Walk error: {}", e);
                    }
                }
            }
        }
    }
}
