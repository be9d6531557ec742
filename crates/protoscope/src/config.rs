//! Configuration schema for protoscope
//!
//! Config lives at `.config/protoscope/config.yaml` relative to the project
//! root. Without a config file the built-in presets are used.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use eyre::{Result, WrapErr};
use protoscope_core::{
    Convention, ConventionExtractor, DEFAULT_TAG, DirectoryProvider, Implementation,
    MergedImplementation, TagParser,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::presets;

/// Default config location, relative to the project root
pub const DEFAULT_CONFIG_PATH: &str = ".config/protoscope/config.yaml";

fn default_tag() -> String {
    DEFAULT_TAG.to_string()
}

/// Root configuration for protoscope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Tag that marks protocol comments in implementation sources
    #[serde(default = "default_tag")]
    pub tag: String,

    /// Implementations to cross-reference
    #[serde(default)]
    pub implementations: Vec<ImplementationConfig>,
}

/// One implementation entry.
///
/// Exactly one of `preset`, `convention` and `merge` must be given.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImplementationConfig {
    pub id: String,

    /// Name of a built-in convention
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preset: Option<String>,

    /// A convention spelled out in full
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub convention: Option<Convention>,

    /// Ids of other entries whose references are concatenated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merge: Option<Vec<String>>,

    /// Local checkout of the implementation's repository (relative to the config file)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkout: Option<PathBuf>,
}

impl ImplementationConfig {
    pub fn preset(id: impl Into<String>, preset: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            preset: Some(preset.into()),
            convention: None,
            merge: None,
            checkout: None,
        }
    }

    pub fn merge(id: impl Into<String>, ids: &[&str]) -> Self {
        Self {
            id: id.into(),
            preset: None,
            convention: None,
            merge: Some(ids.iter().map(|s| s.to_string()).collect()),
            checkout: None,
        }
    }
}

/// Where an entry gets its references from, once validated
enum Source<'a> {
    Convention(Convention),
    Merge(&'a [String]),
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tag: default_tag(),
            implementations: vec![
                ImplementationConfig::preset(presets::HERMES, presets::HERMES),
                ImplementationConfig::preset(presets::HERMES_LEGACY, presets::HERMES_LEGACY),
                ImplementationConfig::preset(presets::REACT_NATIVE, presets::REACT_NATIVE),
                ImplementationConfig::merge(
                    presets::REACT_NATIVE_HERMES,
                    &[presets::REACT_NATIVE, presets::HERMES],
                ),
            ],
        }
    }
}

impl Config {
    /// Load and validate a config file; a missing file yields the presets
    pub fn load(path: &Path) -> Result<Config> {
        if !path.exists() {
            debug!(path = %path.display(), "no config file, using built-in presets");
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("Failed to read config file: {}", path.display()))?;
        let config = Config::parse(&content)
            .wrap_err_with(|| format!("Invalid config file: {}", path.display()))?;
        Ok(config)
    }

    /// Parse and validate YAML config text
    pub fn parse(content: &str) -> Result<Config> {
        let config: Config =
            serde_yaml::from_str(content).wrap_err("Failed to parse config YAML")?;
        config.validate()?;
        Ok(config)
    }

    /// Check ids, sources and merge targets
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for entry in &self.implementations {
            if !seen.insert(entry.id.as_str()) {
                eyre::bail!("Implementation '{}' is defined more than once", entry.id);
            }
        }
        for entry in &self.implementations {
            if let Source::Merge(ids) = self.source(entry)? {
                for id in ids {
                    if !seen.contains(id.as_str()) {
                        eyre::bail!(
                            "Implementation '{}' merges unknown implementation '{}'",
                            entry.id,
                            id
                        );
                    }
                }
            }
        }
        for entry in &self.implementations {
            self.check_cycles(&entry.id, &mut Vec::new())?;
        }
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&ImplementationConfig> {
        self.implementations.iter().find(|entry| entry.id == id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.implementations.iter().map(|entry| entry.id.as_str())
    }

    /// Point an entry at a local checkout
    pub fn set_checkout(&mut self, id: &str, checkout: PathBuf) -> Result<()> {
        let entry = self
            .implementations
            .iter_mut()
            .find(|entry| entry.id == id)
            .ok_or_else(|| eyre::eyre!("Unknown implementation '{}'", id))?;
        entry.checkout = Some(checkout);
        Ok(())
    }

    fn source<'a>(&self, entry: &'a ImplementationConfig) -> Result<Source<'a>> {
        match (&entry.preset, &entry.convention, &entry.merge) {
            (Some(name), None, None) => presets::preset(name).map(Source::Convention).ok_or_else(|| {
                eyre::eyre!(
                    "Implementation '{}' uses unknown preset '{}' (known: {})",
                    entry.id,
                    name,
                    presets::PRESETS.join(", ")
                )
            }),
            (None, Some(convention), None) => Ok(Source::Convention(convention.clone())),
            (None, None, Some(ids)) => Ok(Source::Merge(ids)),
            (None, None, None) => eyre::bail!(
                "Implementation '{}' has no source - please specify preset, convention, or merge",
                entry.id
            ),
            _ => eyre::bail!(
                "Implementation '{}' has multiple sources - please specify only one of preset, convention, or merge",
                entry.id
            ),
        }
    }

    fn check_cycles<'a>(&'a self, id: &'a str, stack: &mut Vec<&'a str>) -> Result<()> {
        if stack.contains(&id) {
            eyre::bail!("Implementation '{}' merges itself ({})", id, stack.join(" -> "));
        }
        let Some(entry) = self.get(id) else {
            return Ok(());
        };
        if let Some(ids) = &entry.merge {
            stack.push(id);
            for child in ids {
                self.check_cycles(child, stack)?;
            }
            stack.pop();
        }
        Ok(())
    }

    /// Build the implementation for an entry, with fresh snapshot caches.
    ///
    /// Relative checkouts are resolved against `base_dir`. Use
    /// [`Implementations`] to share one build per id across a session.
    pub fn build(&self, id: &str, base_dir: &Path) -> Result<Arc<dyn Implementation>> {
        self.build_with(id, base_dir, &mut |child| self.build(child, base_dir))
    }

    fn build_with(
        &self,
        id: &str,
        base_dir: &Path,
        child: &mut dyn FnMut(&str) -> Result<Arc<dyn Implementation>>,
    ) -> Result<Arc<dyn Implementation>> {
        let entry = self
            .get(id)
            .ok_or_else(|| {
                eyre::eyre!(
                    "Unknown implementation '{}' (configured: {})",
                    id,
                    self.ids().collect::<Vec<_>>().join(", ")
                )
            })?;

        match self.source(entry)? {
            Source::Convention(convention) => {
                let checkout = entry.checkout.as_ref().ok_or_else(|| {
                    eyre::eyre!(
                        "Implementation '{}' has no checkout - set `checkout` in the config or pass --checkout {}=<dir>",
                        id,
                        id
                    )
                })?;
                let root = base_dir.join(checkout);
                debug!(implementation = %id, root = %root.display(), "using local checkout");
                let extractor = ConventionExtractor::new(
                    convention,
                    Arc::new(DirectoryProvider::new(root)),
                    TagParser::new(self.tag.clone()),
                )
                .wrap_err_with(|| format!("Invalid convention for implementation '{id}'"))?;
                Ok(Arc::new(extractor))
            }
            Source::Merge(ids) => {
                let children = ids
                    .iter()
                    .map(|id| child(id.as_str()))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Arc::new(MergedImplementation::new(children)))
            }
        }
    }
}

/// The configured implementations of one session, each built at most once.
///
/// A merge entry reuses the instances of the entries it names, so every
/// repository is snapshotted once no matter how many entries read it.
pub struct Implementations {
    config: Config,
    base_dir: PathBuf,
    built: Mutex<HashMap<String, Arc<dyn Implementation>>>,
}

impl std::fmt::Debug for Implementations {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Implementations")
            .field("base_dir", &self.base_dir)
            .field("built", &self.lock().keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Implementations {
    pub fn new(config: Config, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            config,
            base_dir: base_dir.into(),
            built: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<dyn Implementation>>> {
        self.built.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The implementation for `id`, built on first use
    pub fn get(&self, id: &str) -> Result<Arc<dyn Implementation>> {
        if let Some(built) = self.lock().get(id) {
            return Ok(Arc::clone(built));
        }
        // Merge children go through `get` too; the lock is not held here
        let built = self
            .config
            .build_with(id, &self.base_dir, &mut |child| self.get(child))?;
        Ok(Arc::clone(self.lock().entry(id.to_string()).or_insert(built)))
    }
}
