//! Protocol versions: merging, ordering and stable subsets of schemas

use std::cmp::Ordering;
use std::future::Future;
use std::sync::Arc;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{FetchError, Result};
use crate::extractor::RepoCommit;
use crate::memo::{Memo, MemoStatus};
use crate::model::ProtocolModel;
use crate::schema::{Command, Domain, Event, ProtocolSchema, TypeDef};

/// Fields the member ordering looks at
trait Member {
    fn experimental(&self) -> bool;
    fn deprecated(&self) -> bool;
    fn optional(&self) -> bool {
        false
    }
    fn sort_name(&self) -> &str;

    fn is_stable(&self) -> bool {
        !self.experimental() && !self.deprecated()
    }
}

impl Member for Command {
    fn experimental(&self) -> bool {
        self.experimental
    }
    fn deprecated(&self) -> bool {
        self.deprecated
    }
    fn sort_name(&self) -> &str {
        &self.name
    }
}

impl Member for Event {
    fn experimental(&self) -> bool {
        self.experimental
    }
    fn deprecated(&self) -> bool {
        self.deprecated
    }
    fn sort_name(&self) -> &str {
        &self.name
    }
}

impl Member for TypeDef {
    fn experimental(&self) -> bool {
        self.experimental
    }
    fn deprecated(&self) -> bool {
        self.deprecated
    }
    fn sort_name(&self) -> &str {
        &self.id
    }
}

/// Case-insensitive order, lowercase first on ties
fn name_cmp(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| b.cmp(a))
}

fn member_cmp<M: Member>(a: &M, b: &M) -> Ordering {
    // `false < true`, so flagged members sort last
    a.experimental()
        .cmp(&b.experimental())
        .then_with(|| a.deprecated().cmp(&b.deprecated()))
        .then_with(|| a.optional().cmp(&b.optional()))
        .then_with(|| name_cmp(a.sort_name(), b.sort_name()))
}

fn sort_members<M: Member>(members: &mut Option<Vec<M>>) {
    if let Some(members) = members {
        members.sort_by(member_cmp);
    }
}

/// Sort domains by name and the members of each domain.
///
/// Experimental members go last, then deprecated ones, then by name.
pub fn sort_protocol(mut schema: ProtocolSchema) -> ProtocolSchema {
    for domain in &mut schema.domains {
        sort_members(&mut domain.commands);
        sort_members(&mut domain.events);
        sort_members(&mut domain.types);
    }
    schema
        .domains
        .sort_by(|a, b| name_cmp(&a.domain, &b.domain));
    schema
}

/// Tip-of-tree protocol: the domains of every document, sorted.
///
/// The version comes from the first document.
pub fn merge_protocols(
    first: ProtocolSchema,
    rest: impl IntoIterator<Item = ProtocolSchema>,
) -> ProtocolSchema {
    let mut merged = first;
    for schema in rest {
        merged.domains.extend(schema.domains);
    }
    sort_protocol(merged)
}

fn keep_stable<M: Member + Clone>(members: &Option<Vec<M>>) -> Option<Vec<M>> {
    members
        .as_ref()
        .map(|members| members.iter().filter(|m| m.is_stable()).cloned().collect())
}

/// Drop experimental and deprecated domains and members.
///
/// Stable domains always carry `events` and `types` lists, empty if the
/// source had none; `commands` stays absent when it was absent.
pub fn stable_protocol(schema: &ProtocolSchema) -> ProtocolSchema {
    let domains = schema
        .domains
        .iter()
        .filter(|domain| !domain.experimental && !domain.deprecated)
        .map(|domain| Domain {
            commands: keep_stable(&domain.commands),
            events: Some(keep_stable(&domain.events).unwrap_or_default()),
            types: Some(keep_stable(&domain.types).unwrap_or_default()),
            ..domain.clone()
        })
        .collect();
    ProtocolSchema {
        version: schema.version.clone(),
        domains,
    }
}

/// Descriptive data about a protocol version
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionMetadata {
    pub slug: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_source: Option<RepoCommit>,
    /// Whether upstream publishes this version, rather than it being derived
    #[serde(default)]
    pub is_available_upstream: bool,
}

type SchemaLoader = Box<dyn Fn() -> BoxFuture<'static, Result<ProtocolSchema>> + Send + Sync>;

/// A protocol schema that is loaded on first use and kept for the session
pub struct ProtocolVersion {
    metadata: VersionMetadata,
    loader: Option<SchemaLoader>,
    model: Memo<ProtocolModel>,
}

impl std::fmt::Debug for ProtocolVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolVersion")
            .field("metadata", &self.metadata)
            .field("model", &self.model.status())
            .finish()
    }
}

impl ProtocolVersion {
    /// A version whose schema is already in memory
    pub fn ready(metadata: VersionMetadata, schema: ProtocolSchema) -> Result<Self> {
        let model = ProtocolModel::new(schema)?;
        Ok(Self {
            model: Memo::ready(format!("protocol {}", metadata.slug), model),
            metadata,
            loader: None,
        })
    }

    /// A version whose schema is produced by `load` when first needed.
    ///
    /// A failed load is retried on the next call.
    pub fn lazy<F, Fut>(metadata: VersionMetadata, load: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ProtocolSchema>> + Send + 'static,
    {
        Self {
            model: Memo::new(format!("protocol {}", metadata.slug)),
            metadata,
            loader: Some(Box::new(move || load().boxed())),
        }
    }

    pub fn metadata(&self) -> &VersionMetadata {
        &self.metadata
    }

    pub fn status(&self) -> MemoStatus {
        self.model.status()
    }

    /// The indexed schema of this version
    pub async fn model(&self) -> Result<Arc<ProtocolModel>> {
        let what = format!("protocol version {}", self.metadata.slug);
        let model = self
            .model
            .get_or_fetch(move || {
                let pending = self.loader.as_ref().map(|load| load());
                async move {
                    let Some(pending) = pending else {
                        return Err(FetchError::new(what, "no loader"));
                    };
                    let schema = pending.await.map_err(|e| FetchError::new(&what, e))?;
                    debug!(version = %what, domains = schema.domains.len(), "loaded protocol");
                    ProtocolModel::new(schema).map_err(|e| FetchError::new(&what, e))
                }
            })
            .await?;
        Ok(model)
    }
}
