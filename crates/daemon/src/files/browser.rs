//! Directory browsing with path validation.
//!
//! This module provides directory listing, depth-bounded tree building and
//! directory creation/removal. Every path goes through the [`PathGuard`]
//! before any filesystem access.

use std::cmp::Ordering;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::{stream, FutureExt, StreamExt};
use protocol::messages::{EntryKind, FileEntry, FileListResponse, TreeNode, TreeResponse};
use tokio::fs;
use tracing::{debug, warn};

use super::classify::classify;
use super::error::FsError;
use super::guard::PathGuard;
use super::{modified_secs, DEFAULT_MAX_CONCURRENCY};

/// An immediate child of a directory, as seen during traversal.
#[derive(Debug, Clone)]
pub(crate) struct Child {
    /// Entry name.
    pub name: String,
    /// Absolute path.
    pub path: PathBuf,
    /// Whether the entry itself is a directory (symlinks are not followed).
    pub is_dir: bool,
}

impl Child {
    /// Whether the entry name starts with a dot.
    pub fn is_hidden(&self) -> bool {
        self.name.starts_with('.')
    }
}

/// Read the immediate children of `dir`, sorted by name.
///
/// Entries whose type cannot be determined are skipped.
pub(crate) async fn read_children(dir: &Path) -> io::Result<Vec<Child>> {
    let mut read_dir = fs::read_dir(dir).await?;
    let mut children = Vec::new();

    while let Some(entry) = read_dir.next_entry().await? {
        let file_type = match entry.file_type().await {
            Ok(t) => t,
            Err(e) => {
                debug!(path = %entry.path().display(), error = %e, "Skipping unreadable entry");
                continue;
            }
        };

        children.push(Child {
            name: entry.file_name().to_string_lossy().into_owned(),
            path: entry.path(),
            is_dir: file_type.is_dir(),
        });
    }

    children.sort_by(|a, b| compare_names(&a.name, &b.name));
    Ok(children)
}

/// Case-folded name order, ties broken by the exact name.
pub(crate) fn compare_names(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

/// Directory browser confined to the guard's root.
pub struct DirectoryBrowser {
    /// Path confinement.
    guard: Arc<PathGuard>,
    /// Maximum number of subdirectories expanded at once while building trees.
    max_concurrency: usize,
}

impl DirectoryBrowser {
    /// Create a new directory browser.
    pub fn new(guard: Arc<PathGuard>) -> Self {
        Self {
            guard,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }

    /// Set how many subdirectories may be read concurrently.
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    /// List the immediate children of a directory.
    ///
    /// Hidden entries are included and flagged. Directories come first, then
    /// files, each group ordered by name.
    pub async fn list(&self, path: &str) -> Result<FileListResponse, FsError> {
        let dir = self.guard.resolve(path)?;
        self.require_directory(&dir, path).await?;

        let mut read_dir = fs::read_dir(&dir)
            .await
            .map_err(|e| FsError::from_io(e, path))?;
        let mut entries = Vec::new();

        while let Some(entry) = read_dir
            .next_entry()
            .await
            .map_err(|e| FsError::from_io(e, path))?
        {
            let file_type = match entry.file_type().await {
                Ok(t) => t,
                Err(_) => continue, // Skip entries we can't stat
            };

            let name = entry.file_name().to_string_lossy().into_owned();
            let entry_path = entry.path();

            // Size and timestamp follow symlinks only while the target stays
            // under the root; other links report their own metadata.
            let metadata = if file_type.is_symlink() && !self.guard.contains(&entry_path) {
                fs::symlink_metadata(&entry_path).await.ok()
            } else {
                fs::metadata(&entry_path).await.ok()
            };
            let size = metadata.as_ref().map(|m| m.len()).unwrap_or(0);
            let modified = metadata.as_ref().map(modified_secs).unwrap_or(0);

            let kind = if file_type.is_dir() {
                EntryKind::Directory
            } else {
                EntryKind::File
            };

            entries.push(FileEntry {
                language: (!kind.is_dir()).then(|| classify(&name).to_string()),
                is_hidden: name.starts_with('.'),
                path: self.guard.relative(&entry_path),
                name,
                kind,
                size,
                modified,
            });
        }

        entries.sort_by(|a, b| {
            b.kind
                .is_dir()
                .cmp(&a.kind.is_dir())
                .then_with(|| compare_names(&a.name, &b.name))
        });

        let parent_path = if dir == self.guard.root() {
            None
        } else {
            dir.parent().map(|p| self.guard.relative(p))
        };

        debug!(path = %path, count = entries.len(), "Listed directory");

        Ok(FileListResponse {
            current_path: self.guard.relative(&dir),
            parent_path,
            entries,
        })
    }

    /// Create a directory.
    ///
    /// With `recursive`, missing ancestors are created and an existing
    /// directory is not an error. Without it, the parent must exist and the
    /// target must not.
    pub async fn create_directory(&self, path: &str, recursive: bool) -> Result<(), FsError> {
        let dir = self.guard.resolve(path)?;

        let result = if recursive {
            fs::create_dir_all(&dir).await
        } else {
            fs::create_dir(&dir).await
        };
        result.map_err(|e| FsError::from_io(e, path))?;

        debug!(path = %path, recursive, "Created directory");
        Ok(())
    }

    /// Delete a directory.
    ///
    /// Without `recursive` the directory must be empty. With it, the whole
    /// subtree is removed; this cannot be undone.
    pub async fn delete_directory(&self, path: &str, recursive: bool) -> Result<(), FsError> {
        let dir = self.guard.resolve_non_root(path)?;

        let metadata = fs::symlink_metadata(&dir)
            .await
            .map_err(|e| FsError::from_io(e, path))?;
        if !metadata.is_dir() {
            return Err(FsError::NotADirectory(path.to_string()));
        }

        if recursive {
            fs::remove_dir_all(&dir)
                .await
                .map_err(|e| FsError::from_io(e, path))?;
        } else {
            let mut read_dir = fs::read_dir(&dir)
                .await
                .map_err(|e| FsError::from_io(e, path))?;
            let has_children = read_dir
                .next_entry()
                .await
                .map_err(|e| FsError::from_io(e, path))?
                .is_some();
            if has_children {
                return Err(FsError::NotEmpty(path.to_string()));
            }

            fs::remove_dir(&dir)
                .await
                .map_err(|e| FsError::from_io(e, path))?;
        }

        debug!(path = %path, recursive, "Deleted directory");
        Ok(())
    }

    /// Build a depth-bounded tree of non-hidden entries.
    ///
    /// A directory at depth `d` (top level is 0) is expanded only while
    /// `d < max_depth - 1`; deeper directories are listed without children.
    /// A `max_depth` of zero yields no tree at all.
    pub async fn build_tree(&self, path: &str, max_depth: u32) -> Result<TreeResponse, FsError> {
        let dir = self.guard.resolve(path)?;
        self.require_directory(&dir, path).await?;

        let tree = self.tree_level(dir.clone(), 0, max_depth).await?;

        Ok(TreeResponse {
            path: self.guard.relative(&dir),
            max_depth,
            tree,
        })
    }

    fn tree_level(
        &self,
        dir: PathBuf,
        depth: u32,
        max_depth: u32,
    ) -> BoxFuture<'_, Result<Option<Vec<TreeNode>>, FsError>> {
        async move {
            if depth >= max_depth {
                return Ok(None);
            }

            let children = read_children(&dir)
                .await
                .map_err(|e| FsError::from_io(e, self.guard.relative(&dir)))?;

            let nodes = stream::iter(children.into_iter().filter(|c| !c.is_hidden()))
                .map(|child| self.tree_node(child, depth, max_depth))
                .buffered(self.max_concurrency)
                .collect::<Vec<_>>()
                .await;

            Ok(Some(nodes))
        }
        .boxed()
    }

    async fn tree_node(&self, child: Child, depth: u32, max_depth: u32) -> TreeNode {
        let path = self.guard.relative(&child.path);

        if !child.is_dir {
            return TreeNode {
                language: Some(classify(&child.name).to_string()),
                name: child.name,
                path,
                kind: EntryKind::File,
                children: None,
            };
        }

        let children = if depth + 1 < max_depth {
            match self.tree_level(child.path.clone(), depth + 1, max_depth).await {
                Ok(children) => children,
                Err(e) => {
                    // An unreadable subdirectory is listed without children.
                    warn!(path = %path, error = %e, "Failed to expand directory");
                    None
                }
            }
        } else {
            None
        };

        TreeNode {
            name: child.name,
            path,
            kind: EntryKind::Directory,
            language: None,
            children,
        }
    }

    async fn require_directory(&self, dir: &Path, path: &str) -> Result<(), FsError> {
        let metadata = fs::metadata(dir)
            .await
            .map_err(|e| FsError::from_io(e, path))?;
        if !metadata.is_dir() {
            return Err(FsError::NotADirectory(path.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs as std_fs;
    use tempfile::TempDir;

    fn create_test_structure(dir: &Path) {
        std_fs::create_dir_all(dir.join("subdir/deeper/deepest")).unwrap();
        std_fs::create_dir_all(dir.join(".hidden_dir")).unwrap();
        std_fs::write(dir.join("file.txt"), "Hello").unwrap();
        std_fs::write(dir.join("main.rs"), "fn main() {}").unwrap();
        std_fs::write(dir.join("subdir/nested.py"), "print(1)").unwrap();
        std_fs::write(dir.join("subdir/deeper/deepest/leaf.md"), "# leaf").unwrap();
        std_fs::write(dir.join(".hidden"), "Hidden").unwrap();
    }

    fn browser() -> (DirectoryBrowser, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        create_test_structure(temp_dir.path());
        let guard = Arc::new(PathGuard::new(temp_dir.path()).unwrap());
        (DirectoryBrowser::new(guard), temp_dir)
    }

    #[tokio::test]
    async fn test_list_root() {
        let (browser, _temp_dir) = browser();
        let listing = browser.list("").await.unwrap();

        assert_eq!(listing.current_path, "");
        assert_eq!(listing.parent_path, None);

        let names: Vec<&str> = listing.entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(
            names,
            vec![".hidden_dir", "subdir", ".hidden", "file.txt", "main.rs"]
        );

        let hidden = &listing.entries[2];
        assert!(hidden.is_hidden);

        let file = &listing.entries[3];
        assert_eq!(file.kind, EntryKind::File);
        assert_eq!(file.language.as_deref(), Some("text"));
        assert_eq!(file.size, 5);
        assert_eq!(file.path, "file.txt");

        let dir = &listing.entries[1];
        assert_eq!(dir.kind, EntryKind::Directory);
        assert_eq!(dir.language, None);
    }

    #[tokio::test]
    async fn test_list_nested_has_parent() {
        let (browser, _temp_dir) = browser();
        let listing = browser.list("subdir/deeper").await.unwrap();
        assert_eq!(listing.current_path, "subdir/deeper");
        assert_eq!(listing.parent_path.as_deref(), Some("subdir"));
        assert_eq!(listing.entries[0].path, "subdir/deeper/deepest");

        let listing = browser.list("subdir").await.unwrap();
        assert_eq!(listing.parent_path.as_deref(), Some(""));
    }

    #[tokio::test]
    async fn test_directory_sorting() {
        let temp_dir = TempDir::new().unwrap();
        std_fs::write(temp_dir.path().join("zebra.txt"), "z").unwrap();
        std_fs::write(temp_dir.path().join("Apple.txt"), "a").unwrap();
        std_fs::create_dir_all(temp_dir.path().join("beta_dir")).unwrap();
        std_fs::create_dir_all(temp_dir.path().join("alpha_dir")).unwrap();

        let browser = DirectoryBrowser::new(Arc::new(PathGuard::new(temp_dir.path()).unwrap()));
        let entries = browser.list("").await.unwrap().entries;

        assert_eq!(entries[0].name, "alpha_dir");
        assert_eq!(entries[1].name, "beta_dir");
        assert_eq!(entries[2].name, "Apple.txt");
        assert_eq!(entries[3].name, "zebra.txt");
    }

    #[tokio::test]
    async fn test_list_link_outside_root_uses_link_metadata() {
        let (browser, temp_dir) = browser();
        let outside = TempDir::new().unwrap();
        std_fs::write(outside.path().join("big.bin"), vec![0u8; 100_000]).unwrap();
        std::os::unix::fs::symlink(
            outside.path().join("big.bin"),
            temp_dir.path().join("link.bin"),
        )
        .unwrap();
        std::os::unix::fs::symlink(
            temp_dir.path().join("main.rs"),
            temp_dir.path().join("inner.rs"),
        )
        .unwrap();

        let listing = browser.list("").await.unwrap();
        let size_of = |name: &str| {
            listing
                .entries
                .iter()
                .find(|e| e.name == name)
                .map(|e| e.size)
                .unwrap()
        };

        assert!(size_of("link.bin") < 100_000);
        assert_eq!(size_of("inner.rs"), "fn main() {}".len() as u64);
    }

    #[tokio::test]
    async fn test_list_errors() {
        let (browser, _temp_dir) = browser();
        assert!(matches!(
            browser.list("missing").await,
            Err(FsError::NotFound(_))
        ));
        assert!(matches!(
            browser.list("file.txt").await,
            Err(FsError::NotADirectory(_))
        ));
        assert!(matches!(
            browser.list("../").await,
            Err(FsError::AccessDenied(_))
        ));
    }

    #[tokio::test]
    async fn test_create_directory_recursive_is_idempotent() {
        let (browser, temp_dir) = browser();
        browser.create_directory("a/b/c", true).await.unwrap();
        browser.create_directory("a/b/c", true).await.unwrap();
        assert!(temp_dir.path().join("a/b/c").is_dir());
    }

    #[tokio::test]
    async fn test_create_directory_non_recursive() {
        let (browser, temp_dir) = browser();
        browser.create_directory("fresh", false).await.unwrap();
        assert!(temp_dir.path().join("fresh").is_dir());

        assert!(matches!(
            browser.create_directory("fresh", false).await,
            Err(FsError::AlreadyExists(_))
        ));
        assert!(matches!(
            browser.create_directory("no/parent", false).await,
            Err(FsError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_create_directory_over_file() {
        let (browser, _temp_dir) = browser();
        assert!(browser.create_directory("file.txt", true).await.is_err());
    }

    #[tokio::test]
    async fn test_delete_directory_not_empty() {
        let (browser, temp_dir) = browser();
        let result = browser.delete_directory("subdir", false).await;
        assert!(matches!(result, Err(FsError::NotEmpty(_))));
        assert!(temp_dir.path().join("subdir/nested.py").exists());
    }

    #[tokio::test]
    async fn test_delete_directory_empty_and_recursive() {
        let (browser, temp_dir) = browser();
        browser.delete_directory(".hidden_dir", false).await.unwrap();
        assert!(!temp_dir.path().join(".hidden_dir").exists());

        browser.delete_directory("subdir", true).await.unwrap();
        assert!(!temp_dir.path().join("subdir").exists());
    }

    #[tokio::test]
    async fn test_delete_directory_errors() {
        let (browser, _temp_dir) = browser();
        assert!(matches!(
            browser.delete_directory("file.txt", true).await,
            Err(FsError::NotADirectory(_))
        ));
        assert!(matches!(
            browser.delete_directory("missing", true).await,
            Err(FsError::NotFound(_))
        ));
        assert!(matches!(
            browser.delete_directory("", true).await,
            Err(FsError::InvalidArgument(_))
        ));
        assert!(matches!(
            browser.delete_directory("..", true).await,
            Err(FsError::AccessDenied(_))
        ));
    }

    #[tokio::test]
    async fn test_tree_respects_depth() {
        let (browser, _temp_dir) = browser();
        let tree = browser.build_tree("", 2).await.unwrap();
        assert_eq!(tree.max_depth, 2);

        let nodes = tree.tree.unwrap();
        let names: Vec<&str> = nodes.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["file.txt", "main.rs", "subdir"]);

        let main = &nodes[1];
        assert_eq!(main.language.as_deref(), Some("rust"));
        assert!(main.children.is_none());

        let subdir = &nodes[2];
        let children = subdir.children.as_ref().unwrap();
        let deeper = children.iter().find(|n| n.name == "deeper").unwrap();
        assert_eq!(deeper.kind, EntryKind::Directory);
        assert_eq!(deeper.path, "subdir/deeper");
        // At the depth boundary the directory is listed without children.
        assert!(deeper.children.is_none());

        let nested = children.iter().find(|n| n.name == "nested.py").unwrap();
        assert_eq!(nested.language.as_deref(), Some("python"));
    }

    #[tokio::test]
    async fn test_tree_depth_one_lists_top_level_only() {
        let (browser, _temp_dir) = browser();
        let nodes = browser.build_tree("", 1).await.unwrap().tree.unwrap();
        let subdir = nodes.iter().find(|n| n.name == "subdir").unwrap();
        assert!(subdir.children.is_none());
    }

    #[tokio::test]
    async fn test_tree_depth_zero_is_empty() {
        let (browser, _temp_dir) = browser();
        let tree = browser.build_tree("subdir", 0).await.unwrap();
        assert_eq!(tree.path, "subdir");
        assert!(tree.tree.is_none());
    }

    #[tokio::test]
    async fn test_tree_excludes_hidden() {
        let (browser, _temp_dir) = browser();
        let nodes = browser.build_tree("", 3).await.unwrap().tree.unwrap();
        assert!(nodes.iter().all(|n| !n.name.starts_with('.')));
    }

    #[tokio::test]
    async fn test_tree_is_deterministic() {
        let (browser, _temp_dir) = browser();
        let first = browser.build_tree("", 4).await.unwrap();
        let second = browser.build_tree("", 4).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_tree_errors() {
        let (browser, _temp_dir) = browser();
        assert!(matches!(
            browser.build_tree("file.txt", 3).await,
            Err(FsError::NotADirectory(_))
        ));
        assert!(matches!(
            browser.build_tree("../..", 3).await,
            Err(FsError::AccessDenied(_))
        ));
    }

    #[test]
    fn test_compare_names() {
        assert_eq!(compare_names("a", "B"), Ordering::Less);
        assert_eq!(compare_names("B", "a"), Ordering::Greater);
        assert_eq!(compare_names("A", "a"), Ordering::Less);
    }
}
