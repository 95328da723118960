//! Directory tree discovery with folder and extension exclusion.
//!
//! Excluded folders are pruned structurally: [`walkdir`] never descends into
//! them. Files are dropped when their name ends with an excluded suffix.
//!
//! Symlinks are not followed unless `follow_symlinks` is set. When they are,
//! `walkdir` detects links that point back at an ancestor; those entries are
//! logged and skipped, so a cyclic tree still terminates.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use walkdir::{DirEntry, WalkDir};

use crate::config::WalkerConfig;
use crate::error::{IndexError, Result};

/// Directory → retained filenames in that directory.
pub type FileTree = BTreeMap<PathBuf, Vec<String>>;

pub struct TreeWalker {
    ignore_folders: HashSet<String>,
    ignore_extensions: Vec<String>,
    follow_symlinks: bool,
}

impl TreeWalker {
    pub fn new(config: &WalkerConfig) -> Self {
        Self {
            ignore_folders: config.ignore_folders.iter().cloned().collect(),
            ignore_extensions: config.ignore_extensions.clone(),
            follow_symlinks: config.follow_symlinks,
        }
    }

    /// Walk `root` and return every visited directory with its retained files.
    ///
    /// Fails with [`IndexError::RootNotFound`] when `root` is missing or is
    /// not a directory. Unreadable entries below the root are skipped.
    pub fn walk(&self, root: &Path) -> Result<FileTree> {
        if !root.is_dir() {
            return Err(IndexError::RootNotFound {
                root: root.display().to_string(),
            });
        }

        let mut tree = FileTree::new();

        let walker = WalkDir::new(root)
            .follow_links(self.follow_symlinks)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !self.is_excluded_dir(e));

        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    if e.loop_ancestor().is_some() {
                        tracing::warn!("skipping symlink loop: {}", e);
                    } else {
                        tracing::warn!("walk error: {}", e);
                    }
                    continue;
                }
            };

            if entry.file_type().is_dir() {
                tree.entry(entry.path().to_path_buf()).or_default();
                continue;
            }

            if !entry.file_type().is_file() {
                continue;
            }

            let name = entry.file_name().to_string_lossy().to_string();
            if self.is_excluded_file(&name) {
                tracing::debug!(path = %entry.path().display(), "excluded by extension");
                continue;
            }

            let dir = entry
                .path()
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| root.to_path_buf());
            tree.entry(dir).or_default().push(name);
        }

        Ok(tree)
    }

    fn is_excluded_dir(&self, entry: &DirEntry) -> bool {
        // The root itself is never pruned, even if its name is on the list.
        entry.depth() > 0
            && entry.file_type().is_dir()
            && self
                .ignore_folders
                .contains(entry.file_name().to_string_lossy().as_ref())
    }

    fn is_excluded_file(&self, name: &str) -> bool {
        self.ignore_extensions
            .iter()
            .any(|ext| !ext.is_empty() && name.ends_with(ext.as_str()))
    }
}

/// Flatten a [`FileTree`] into full file paths (`dir/filename`), in order.
pub fn flatten(tree: &FileTree) -> Vec<String> {
    tree.iter()
        .flat_map(|(dir, files)| {
            files
                .iter()
                .map(move |f| dir.join(f).to_string_lossy().to_string())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn walker(folders: &[&str], exts: &[&str]) -> TreeWalker {
        TreeWalker::new(&WalkerConfig {
            ignore_folders: folders.iter().map(|s| s.to_string()).collect(),
            ignore_extensions: exts.iter().map(|s| s.to_string()).collect(),
            follow_symlinks: false,
        })
    }

    fn create_tree(files: &[&str]) -> TempDir {
        let tmp = TempDir::new().unwrap();
        for file in files {
            let path = tmp.path().join(file);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, "content").unwrap();
        }
        tmp
    }

    #[test]
    fn test_missing_root() {
        let w = walker(&[], &[]);
        let err = w.walk(Path::new("/no/such/root/anywhere")).unwrap_err();
        assert!(matches!(err, IndexError::RootNotFound { .. }));
    }

    #[test]
    fn test_file_as_root_is_not_found() {
        let tmp = create_tree(&["a.txt"]);
        let w = walker(&[], &[]);
        let err = w.walk(&tmp.path().join("a.txt")).unwrap_err();
        assert!(matches!(err, IndexError::RootNotFound { .. }));
    }

    #[test]
    fn test_excluded_folder_never_listed() {
        let tmp = create_tree(&[
            "a.txt",
            "node_modules/pkg/index.js",
            "src/node_modules/deep.txt",
            "src/main.rs",
        ]);
        let w = walker(&["node_modules"], &[]);
        let tree = w.walk(tmp.path()).unwrap();

        assert!(tree.keys().all(|d| !d.to_string_lossy().contains("node_modules")));
        let files = flatten(&tree);
        assert_eq!(files.len(), 2);
        assert!(files.iter().any(|f| f.ends_with("a.txt")));
        assert!(files.iter().any(|f| f.ends_with("main.rs")));
    }

    #[test]
    fn test_excluded_extension_anywhere() {
        let tmp = create_tree(&["a.txt", "b.log", "nested/c.log", "nested/d.md", "e.tar.gz"]);
        let w = walker(&[], &[".log", ".tar.gz"]);
        let files = flatten(&w.walk(tmp.path()).unwrap());

        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|f| !f.ends_with(".log")));
        assert!(files.iter().all(|f| !f.ends_with(".gz")));
    }

    #[test]
    fn test_every_directory_is_a_key() {
        let tmp = create_tree(&["a/b/c.txt"]);
        let w = walker(&[], &[]);
        let tree = w.walk(tmp.path()).unwrap();

        assert!(tree.contains_key(tmp.path()));
        assert!(tree.contains_key(&tmp.path().join("a")));
        assert_eq!(tree[&tmp.path().join("a").join("b")], vec!["c.txt"]);
    }

    #[test]
    fn test_flatten_joins_dir_and_name() {
        let tmp = create_tree(&["a.txt"]);
        let w = walker(&[], &[]);
        let files = flatten(&w.walk(tmp.path()).unwrap());
        assert_eq!(files, vec![format!("{}/a.txt", tmp.path().display())]);
    }

    #[test]
    fn test_root_named_like_excluded_folder_is_walked() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("bin");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("tool.sh"), "echo hi").unwrap();

        let w = walker(&["bin"], &[]);
        let files = flatten(&w.walk(&root).unwrap());
        assert_eq!(files.len(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_loop_terminates() {
        let tmp = create_tree(&["a/file.txt"]);
        std::os::unix::fs::symlink(tmp.path(), tmp.path().join("a").join("loop")).unwrap();

        let w = TreeWalker::new(&WalkerConfig {
            ignore_folders: Vec::new(),
            ignore_extensions: Vec::new(),
            follow_symlinks: true,
        });
        let files = flatten(&w.walk(tmp.path()).unwrap());
        assert_eq!(files.len(), 1);
    }
}
