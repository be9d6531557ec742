//! Commit-pinned source snapshots
//!
//! [`SnapshotCache`] pins a branch to the commit it points at, enumerates a
//! scope of the tree with concurrent directory fan-out, and fetches file
//! contents once per path. The resulting [`Snapshot`] is immutable.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, try_join_all};
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{FetchError, Result};
use crate::memo::{Memo, MemoStatus};
use crate::provider::{EntryKind, RepoSpec, SourceProvider};
use crate::references::SourceFile;

/// Which parts of a repository a snapshot covers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotScope {
    /// Directories enumerated recursively
    #[serde(default)]
    pub roots: Vec<String>,
    /// Files included explicitly, whatever their extension
    #[serde(default)]
    pub files: Vec<String>,
    /// Extensions (without the dot) kept from `roots`; empty keeps all
    #[serde(default)]
    pub extensions: Vec<String>,
}

impl SnapshotScope {
    fn keeps(&self, path: &str) -> bool {
        if self.extensions.is_empty() {
            return true;
        }
        let file_name = path.rsplit('/').next().unwrap_or(path);
        match file_name.rsplit_once('.') {
            Some((_, ext)) => self.extensions.iter().any(|e| e == ext),
            None => false,
        }
    }
}

/// Include/exclude glob filter over repository paths
#[derive(Debug, Clone)]
pub struct PathFilter {
    include: Option<GlobSet>,
    exclude: GlobSet,
}

impl PathFilter {
    /// Build a filter; an empty include list matches every path
    pub fn new(include: &[String], exclude: &[String]) -> Result<Self> {
        let include = if include.is_empty() {
            None
        } else {
            Some(build_globset(include)?)
        };
        Ok(Self {
            include,
            exclude: build_globset(exclude)?,
        })
    }

    /// Filter matching every path
    pub fn all() -> Self {
        Self {
            include: None,
            exclude: GlobSet::empty(),
        }
    }

    pub fn matches(&self, path: &str) -> bool {
        let included = self.include.as_ref().is_none_or(|set| set.is_match(path));
        included && !self.exclude.is_match(path)
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

/// An immutable, commit-pinned view of part of a repository
#[derive(Debug, Clone)]
pub struct Snapshot {
    owner: String,
    repo: String,
    commit_sha: String,
    paths: Vec<String>,
    contents: HashMap<String, Arc<String>>,
}

impl Snapshot {
    /// Snapshot from already-loaded content, in the given order
    pub fn from_files(
        owner: impl Into<String>,
        repo: impl Into<String>,
        commit_sha: impl Into<String>,
        files: impl IntoIterator<Item = (String, String)>,
    ) -> Self {
        let mut paths = Vec::new();
        let mut contents = HashMap::new();
        for (path, content) in files {
            if contents.insert(path.clone(), Arc::new(content)).is_none() {
                paths.push(path);
            }
        }
        Self {
            owner: owner.into(),
            repo: repo.into(),
            commit_sha: commit_sha.into(),
            paths,
            contents,
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn repo(&self) -> &str {
        &self.repo
    }

    pub fn commit_sha(&self) -> &str {
        &self.commit_sha
    }

    /// Every path, in enumeration order
    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    pub fn content(&self, path: &str) -> Option<&str> {
        self.contents.get(path).map(|c| c.as_str())
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Identity of a file in this snapshot
    pub fn source_file(&self, path: &str) -> SourceFile {
        SourceFile {
            owner: self.owner.clone(),
            repo: self.repo.clone(),
            commit_sha: self.commit_sha.clone(),
            path: path.to_string(),
        }
    }

    /// Files whose path passes `filter`, in enumeration order
    pub fn files<'a>(&'a self, filter: &'a PathFilter) -> impl Iterator<Item = (&'a str, &'a str)> {
        self.paths
            .iter()
            .filter(move |path| filter.matches(path))
            .filter_map(move |path| Some((path.as_str(), self.content(path)?)))
    }
}

struct CacheInner {
    provider: Arc<dyn SourceProvider>,
    repo: RepoSpec,
    scope: SnapshotScope,
    commit: Memo<String>,
    files: Mutex<HashMap<String, Arc<Memo<String>>>>,
}

impl CacheInner {
    async fn resolve_commit(self: &Arc<Self>) -> std::result::Result<Arc<String>, FetchError> {
        let inner = Arc::clone(self);
        self.commit
            .get_or_fetch(move || async move {
                let commit = inner.provider.head_commit(&inner.repo).await?;
                info!(repo = %inner.repo, %commit, "resolved branch tip");
                Ok::<_, FetchError>(commit)
            })
            .await
    }

    fn list_tree_from(
        self: Arc<Self>,
        commit: Arc<String>,
        path: String,
    ) -> BoxFuture<'static, std::result::Result<Vec<String>, FetchError>> {
        async move {
            let entries = self.provider.list_dir(&self.repo, &commit, &path).await?;
            let mut files = Vec::new();
            let mut subdirs = Vec::new();
            for entry in entries {
                match entry.kind {
                    EntryKind::File => files.push(entry.path),
                    EntryKind::Dir => subdirs.push(
                        Arc::clone(&self).list_tree_from(Arc::clone(&commit), entry.path),
                    ),
                }
            }
            debug!(path = %path, files = files.len(), subdirs = subdirs.len(), "listed directory");
            for nested in try_join_all(subdirs).await? {
                files.extend(nested);
            }
            Ok(files)
        }
        .boxed()
    }

    async fn get_file(
        self: &Arc<Self>,
        path: &str,
    ) -> std::result::Result<Arc<String>, FetchError> {
        let commit = self.resolve_commit().await?;
        let memo = {
            let mut files = self.files.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(
                files
                    .entry(path.to_string())
                    .or_insert_with(|| Arc::new(Memo::new(format!("file {path}")))),
            )
        };
        let inner = Arc::clone(self);
        let path = path.to_string();
        memo.get_or_fetch(move || async move {
            debug!(path = %path, "fetching file");
            inner.provider.get_file(&inner.repo, &commit, &path).await
        })
        .await
    }

    async fn build_snapshot(self: Arc<Self>) -> std::result::Result<Snapshot, FetchError> {
        let commit = self.resolve_commit().await?;

        let listings = try_join_all(
            self.scope
                .roots
                .iter()
                .map(|root| Arc::clone(&self).list_tree_from(Arc::clone(&commit), root.clone())),
        )
        .await?;

        let mut seen = HashSet::new();
        let mut paths = Vec::new();
        for path in listings.into_iter().flatten() {
            if self.scope.keeps(&path) && seen.insert(path.clone()) {
                paths.push(path);
            }
        }
        for path in &self.scope.files {
            if seen.insert(path.clone()) {
                paths.push(path.clone());
            }
        }

        let contents = try_join_all(paths.iter().map(|path| self.get_file(path))).await?;

        info!(
            repo = %self.repo,
            commit = %commit,
            files = paths.len(),
            "snapshot ready"
        );
        Ok(Snapshot {
            owner: self.repo.owner.clone(),
            repo: self.repo.repo.clone(),
            commit_sha: commit.to_string(),
            contents: paths.iter().cloned().zip(contents).collect(),
            paths,
        })
    }
}

/// Session cache for one repository branch and scope
pub struct SnapshotCache {
    inner: Arc<CacheInner>,
    snapshot: Memo<Snapshot>,
}

impl std::fmt::Debug for SnapshotCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotCache")
            .field("repo", &self.inner.repo)
            .field("scope", &self.inner.scope)
            .field("snapshot", &self.snapshot.status())
            .finish()
    }
}

impl SnapshotCache {
    pub fn new(provider: Arc<dyn SourceProvider>, repo: RepoSpec, scope: SnapshotScope) -> Self {
        let label = format!("snapshot {repo}");
        Self {
            inner: Arc::new(CacheInner {
                commit: Memo::new(format!("commit {repo}")),
                files: Mutex::new(HashMap::new()),
                provider,
                repo,
                scope,
            }),
            snapshot: Memo::new(label),
        }
    }

    pub fn repo(&self) -> &RepoSpec {
        &self.inner.repo
    }

    pub fn scope(&self) -> &SnapshotScope {
        &self.inner.scope
    }

    /// Commit the branch pointed at when first asked, fixed for the session
    pub async fn resolve_commit(&self) -> std::result::Result<Arc<String>, FetchError> {
        self.inner.resolve_commit().await
    }

    /// Every file below `root` at the pinned commit
    pub async fn list_tree(&self, root: &str) -> std::result::Result<Vec<String>, FetchError> {
        let commit = self.resolve_commit().await?;
        Arc::clone(&self.inner)
            .list_tree_from(commit, root.to_string())
            .await
    }

    /// Content of one file at the pinned commit; fetched at most once
    pub async fn get_file(&self, path: &str) -> std::result::Result<Arc<String>, FetchError> {
        self.inner.get_file(path).await
    }

    /// The populated snapshot of this cache's scope
    pub async fn snapshot(&self) -> std::result::Result<Arc<Snapshot>, FetchError> {
        let inner = Arc::clone(&self.inner);
        self.snapshot
            .get_or_fetch(move || inner.build_snapshot())
            .await
    }

    pub fn status(&self) -> MemoStatus {
        self.snapshot.status()
    }
}
