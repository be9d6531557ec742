//! protoscope - Measure protocol coverage of native implementations
//!
//! protoscope scans implementation sources (local checkouts of Hermes, React
//! Native, or anything described by a convention) for references to protocol
//! commands, events and types, and reports which part of a protocol schema
//! each implementation covers.
//!
//! The binary wires configuration, presets and output around
//! [`protoscope_core`]; this library exposes the same pieces for tests and
//! embedding.

pub mod config;
pub mod output;
pub mod presets;
pub mod protocol;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use eyre::{Result, WrapErr};
use protoscope_core::{
    CommentIndex, DirectoryProvider, Implementation, ImplementationStats, ProtocolSchema, RepoSpec,
    SnapshotCache, SnapshotScope, TagParser,
};
use tracing::info;

pub use config::{Config, DEFAULT_CONFIG_PATH, ImplementationConfig, Implementations};
pub use output::OutputFormat;

/// Directory to resolve the default config against: the nearest ancestor
/// holding a `.config/protoscope` directory, else the current directory
pub fn find_project_root() -> Result<PathBuf> {
    let cwd = std::env::current_dir().wrap_err("Failed to get current directory")?;
    let mut current = cwd.clone();

    loop {
        if current.join(".config/protoscope").is_dir() {
            return Ok(current);
        }

        if !current.pop() {
            return Ok(cwd);
        }
    }
}

/// Extract references for one configured implementation and compute its coverage
pub async fn implementation_stats(
    implementations: &Implementations,
    id: &str,
    schema: &ProtocolSchema,
) -> Result<ImplementationStats> {
    let implementation = implementations.get(id)?;
    coverage(implementation.as_ref(), schema)
        .await
        .wrap_err_with(|| format!("Failed to extract references for '{id}'"))
}

/// Coverage of an already built implementation
pub async fn coverage(
    implementation: &dyn Implementation,
    schema: &ProtocolSchema,
) -> Result<ImplementationStats> {
    let references = implementation.extract_references(schema).await?;
    Ok(ImplementationStats::compute(
        implementation.display_name(),
        schema,
        &references,
    ))
}

/// Collect tagged comments from every file below `root` with one of `extensions`
pub async fn scan_comments(
    root: &Path,
    extensions: &[String],
    parser: &TagParser,
) -> Result<CommentIndex> {
    let name = root
        .canonicalize()
        .ok()
        .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "local".to_string());
    let cache = SnapshotCache::new(
        Arc::new(DirectoryProvider::new(root)),
        RepoSpec::new("local", name, "main"),
        SnapshotScope {
            roots: vec![String::new()],
            files: vec![],
            extensions: extensions.to_vec(),
        },
    );
    let snapshot = cache
        .snapshot()
        .await
        .wrap_err_with(|| format!("Failed to read {}", root.display()))?;

    let index = parser.index(
        snapshot
            .paths()
            .iter()
            .filter_map(|path| Some((snapshot.source_file(path), snapshot.content(path)?))),
    );
    info!(files = snapshot.len(), comments = index.len(), "scanned comments");
    Ok(index)
}
