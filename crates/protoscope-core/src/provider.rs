//! Source repository providers
//!
//! A provider answers three questions about a repository at a ref: which
//! commit the ref points at, what a directory contains at that commit, and
//! what a file contains at that commit. All three are treated as slow and
//! fallible. Paths are repository-relative, `/`-separated, with `""` naming
//! the root.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::FetchError;

/// Which repository and branch to read
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoSpec {
    pub owner: String,
    pub repo: String,
    #[serde(default = "default_branch")]
    pub branch: String,
}

fn default_branch() -> String {
    "main".to_string()
}

impl RepoSpec {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>, branch: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
            branch: branch.into(),
        }
    }
}

impl std::fmt::Display for RepoSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}@{}", self.owner, self.repo, self.branch)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
}

/// One entry of a directory listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Repository-relative path of the entry itself
    pub path: String,
    pub kind: EntryKind,
}

impl DirEntry {
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: EntryKind::File,
        }
    }

    pub fn dir(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: EntryKind::Dir,
        }
    }
}

/// Access to repository contents pinned by commit
#[async_trait]
pub trait SourceProvider: Send + Sync {
    /// Commit the branch currently points at
    async fn head_commit(&self, repo: &RepoSpec) -> Result<String, FetchError>;

    /// Immediate children of a directory
    async fn list_dir(
        &self,
        repo: &RepoSpec,
        commit: &str,
        path: &str,
    ) -> Result<Vec<DirEntry>, FetchError>;

    /// Content of one file
    async fn get_file(&self, repo: &RepoSpec, commit: &str, path: &str)
    -> Result<String, FetchError>;
}

pub(crate) fn join_path(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{dir}/{name}")
    }
}

/// Provider backed by an in-memory file map.
///
/// Useful for tests and for feeding content that is already loaded.
#[derive(Debug, Default)]
pub struct MemoryProvider {
    commit: String,
    files: BTreeMap<String, String>,
    file_reads: AtomicUsize,
}

impl MemoryProvider {
    pub fn new(commit: impl Into<String>) -> Self {
        Self {
            commit: commit.into(),
            ..Self::default()
        }
    }

    /// Add a file
    pub fn add(mut self, path: impl Into<String>, content: impl Into<String>) -> Self {
        self.files.insert(path.into(), content.into());
        self
    }

    /// How many times file content has been requested
    pub fn file_reads(&self) -> usize {
        self.file_reads.load(Ordering::SeqCst)
    }

    fn check_commit(&self, commit: &str) -> Result<(), FetchError> {
        if commit == self.commit {
            Ok(())
        } else {
            Err(FetchError::new(
                format!("commit {commit}"),
                "unknown commit",
            ))
        }
    }
}

#[async_trait]
impl SourceProvider for MemoryProvider {
    async fn head_commit(&self, _repo: &RepoSpec) -> Result<String, FetchError> {
        Ok(self.commit.clone())
    }

    async fn list_dir(
        &self,
        _repo: &RepoSpec,
        commit: &str,
        path: &str,
    ) -> Result<Vec<DirEntry>, FetchError> {
        self.check_commit(commit)?;
        let prefix = if path.is_empty() {
            String::new()
        } else {
            format!("{path}/")
        };

        let mut dirs = BTreeSet::new();
        let mut entries = Vec::new();
        for file in self.files.keys() {
            let Some(rest) = file.strip_prefix(&prefix) else {
                continue;
            };
            match rest.split_once('/') {
                Some((child, _)) => {
                    if dirs.insert(child) {
                        entries.push(DirEntry::dir(join_path(path, child)));
                    }
                }
                None => entries.push(DirEntry::file(file.clone())),
            }
        }

        if entries.is_empty() && !path.is_empty() {
            return Err(FetchError::new(
                format!("directory {path}"),
                "no such directory",
            ));
        }
        Ok(entries)
    }

    async fn get_file(
        &self,
        _repo: &RepoSpec,
        commit: &str,
        path: &str,
    ) -> Result<String, FetchError> {
        self.check_commit(commit)?;
        self.file_reads.fetch_add(1, Ordering::SeqCst);
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| FetchError::new(format!("file {path}"), "no such file"))
    }
}

#[cfg(feature = "walk")]
pub use directory::{DirectoryProvider, WORKING_TREE};

#[cfg(feature = "walk")]
mod directory {
    use std::path::{Path, PathBuf};

    use async_trait::async_trait;
    use ignore::WalkBuilder;
    use tracing::debug;

    use super::{DirEntry, EntryKind, RepoSpec, SourceProvider, join_path};
    use crate::error::FetchError;

    /// Commit reported for checkouts that are not git repositories
    pub const WORKING_TREE: &str = "working-tree";

    /// Provider reading a local checkout.
    ///
    /// The checkout is whatever is on disk; the commit is read from `.git`
    /// when present, preferring the requested branch's ref.
    #[derive(Debug, Clone)]
    pub struct DirectoryProvider {
        root: PathBuf,
    }

    impl DirectoryProvider {
        pub fn new(root: impl Into<PathBuf>) -> Self {
            Self { root: root.into() }
        }

        pub fn root(&self) -> &Path {
            &self.root
        }

        fn resolve(&self, path: &str) -> PathBuf {
            path.split('/')
                .filter(|part| !part.is_empty())
                .fold(self.root.clone(), |acc, part| acc.join(part))
        }
    }

    async fn read_trimmed(path: &Path) -> Option<String> {
        let content = tokio::fs::read_to_string(path).await.ok()?;
        let trimmed = content.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    }

    async fn read_ref(git_dir: &Path, name: &str) -> Option<String> {
        if let Some(sha) = read_trimmed(&git_dir.join(name)).await {
            return Some(sha);
        }
        let packed = tokio::fs::read_to_string(git_dir.join("packed-refs")).await.ok()?;
        packed.lines().find_map(|line| {
            let (sha, reference) = line.split_once(' ')?;
            (reference == name).then(|| sha.to_string())
        })
    }

    #[async_trait]
    impl SourceProvider for DirectoryProvider {
        async fn head_commit(&self, repo: &RepoSpec) -> Result<String, FetchError> {
            let git_dir = self.root.join(".git");
            if !git_dir.is_dir() {
                if !self.root.is_dir() {
                    return Err(FetchError::new(
                        format!("checkout {}", self.root.display()),
                        "not a directory",
                    ));
                }
                debug!(root = %self.root.display(), "checkout has no .git, using working tree");
                return Ok(WORKING_TREE.to_string());
            }

            let branch_ref = format!("refs/heads/{}", repo.branch);
            if let Some(sha) = read_ref(&git_dir, &branch_ref).await {
                return Ok(sha);
            }

            let head = read_trimmed(&git_dir.join("HEAD")).await.ok_or_else(|| {
                FetchError::new(format!("HEAD of {}", self.root.display()), "unreadable")
            })?;
            match head.strip_prefix("ref: ") {
                Some(reference) => read_ref(&git_dir, reference).await.ok_or_else(|| {
                    FetchError::new(format!("ref {reference}"), "unresolved")
                }),
                None => Ok(head),
            }
        }

        async fn list_dir(
            &self,
            _repo: &RepoSpec,
            _commit: &str,
            path: &str,
        ) -> Result<Vec<DirEntry>, FetchError> {
            let dir = self.resolve(path);
            let base = path.to_string();
            let what = format!("directory {}", dir.display());

            let listed = tokio::task::spawn_blocking(move || {
                if !dir.is_dir() {
                    return Err("no such directory".to_string());
                }
                let walker = WalkBuilder::new(&dir)
                    .max_depth(Some(1))
                    .hidden(true)
                    .git_ignore(true)
                    .sort_by_file_name(|a, b| a.cmp(b))
                    .build();

                let mut entries = Vec::new();
                for entry in walker {
                    let entry = entry.map_err(|e| e.to_string())?;
                    if entry.depth() == 0 {
                        continue;
                    }
                    let name = entry.file_name().to_string_lossy().into_owned();
                    let kind = match entry.file_type() {
                        Some(ft) if ft.is_dir() => EntryKind::Dir,
                        Some(ft) if ft.is_file() => EntryKind::File,
                        _ => continue,
                    };
                    entries.push(DirEntry {
                        path: join_path(&base, &name),
                        kind,
                    });
                }
                Ok(entries)
            })
            .await
            .map_err(|e| FetchError::new(what.clone(), e))?;

            listed.map_err(|reason| FetchError::new(what, reason))
        }

        async fn get_file(
            &self,
            _repo: &RepoSpec,
            _commit: &str,
            path: &str,
        ) -> Result<String, FetchError> {
            let file = self.resolve(path);
            tokio::fs::read_to_string(&file)
                .await
                .map_err(|e| FetchError::new(format!("file {}", file.display()), e))
        }
    }

}
