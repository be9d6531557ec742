//! Structural reference extraction
//!
//! An implementation of the protocol is described by a [`Convention`]: where
//! its sources live, how they split into subsets, and which identifiers
//! ("needles") it uses for each command, event and type. Needles are derived
//! from templates such as `m::{domainCamel}::{memberPascal}Request`.

use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::comments::{CommentIndex, TagParser};
use crate::error::{Error, Result};
use crate::model::{ProtocolModel, SeedRef};
use crate::provider::{RepoSpec, SourceProvider};
use crate::references::{LineIndex, Reference, ReferenceComment, ReferenceLocation, ReferenceMap};
use crate::schema::{MemberKind, ProtocolSchema};
use crate::snapshot::{PathFilter, Snapshot, SnapshotCache, SnapshotScope};

/// Name of the implicit subset containing every snapshot file
pub const ALL_FILES: &str = "all";

const PLACEHOLDERS: &[&str] = &["domain", "domainCamel", "member", "memberPascal", "wire"];

/// Pinned identity of the sources an implementation was read from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoCommit {
    pub owner: String,
    pub repo: String,
    pub commit_sha: String,
}

/// Where an implementation's references come from
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSourceMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<RepoCommit>,
}

/// Something that can find protocol references in its own sources.
///
/// Only `extract_references` is required; `filter_protocol` is derived from
/// it for every implementation.
#[async_trait]
pub trait Implementation: Send + Sync {
    /// Human-readable name
    fn display_name(&self) -> &str;

    /// Map every command, event and type of `schema` to its evidence
    async fn extract_references(&self, schema: &ProtocolSchema) -> Result<ReferenceMap>;

    async fn data_source(&self) -> Result<DataSourceMetadata> {
        Ok(DataSourceMetadata::default())
    }

    /// The part of `schema` this implementation uses, directly or through
    /// type references
    async fn filter_protocol(&self, schema: &ProtocolSchema) -> Result<ProtocolSchema> {
        let references = self.extract_references(schema).await?;
        let seeds = implemented_seeds(schema, &references);
        debug!(
            implementation = self.display_name(),
            seeds = seeds.len(),
            "filtering protocol"
        );
        ProtocolModel::new(schema.clone())?.filter_protocol(&seeds)
    }
}

/// Members with at least one reference, as closure seeds.
///
/// Commands come first, then events, then types, each in schema order.
pub fn implemented_seeds(schema: &ProtocolSchema, references: &ReferenceMap) -> Vec<SeedRef> {
    let mut seeds = Vec::new();
    for kind in MemberKind::ALL {
        for domain in &schema.domains {
            for local in domain.member_names(kind) {
                let name = format!("{}.{}", domain.domain, local);
                if references.is_referenced(kind, &name) {
                    seeds.push(SeedRef::new(kind, name));
                }
            }
        }
    }
    seeds
}

/// `Network` -> `network`
pub fn pascal_to_camel(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// `getCookies` -> `GetCookies`
pub fn camel_to_pascal(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// The wire name as a C string literal, `"Domain.member"`
pub fn quote_wire(domain: &str, member: &str) -> String {
    format!("\"{}\"", format!("{domain}.{member}").replace('"', "\\\""))
}

/// Check that a template only uses known placeholders
pub fn validate_template(template: &str) -> Result<()> {
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            return Err(Error::Pattern(format!(
                "unclosed placeholder in needle template {template:?}"
            )));
        };
        let name = &after[..close];
        if !PLACEHOLDERS.contains(&name) {
            return Err(Error::Pattern(format!(
                "unknown placeholder {{{name}}} in needle template {template:?}"
            )));
        }
        rest = &after[close + 1..];
    }
    if template.is_empty() {
        return Err(Error::Pattern("empty needle template".to_string()));
    }
    Ok(())
}

/// Expand a needle template for one member
pub fn expand_template(template: &str, domain: &str, member: &str) -> String {
    template
        .replace("{domainCamel}", &pascal_to_camel(domain))
        .replace("{memberPascal}", &camel_to_pascal(member))
        .replace("{domain}", domain)
        .replace("{member}", member)
        .replace("{wire}", &quote_wire(domain, member))
}

/// Finds needles bounded by a word boundary, whitespace or a parenthesis on
/// both sides.
#[derive(Debug, Clone)]
pub struct NeedleMatcher {
    needles: Vec<String>,
    regex: Regex,
}

impl NeedleMatcher {
    pub fn new(needles: &[String]) -> Result<Self> {
        let needles: Vec<String> = needles.iter().filter(|n| !n.is_empty()).cloned().collect();
        if needles.is_empty() {
            return Err(Error::Pattern("no needles to match".to_string()));
        }
        let alternation = needles
            .iter()
            .map(|n| regex::escape(n))
            .collect::<Vec<_>>()
            .join("|");
        Ok(Self {
            regex: Regex::new(&alternation)?,
            needles,
        })
    }

    /// Byte offsets of every accepted match, left to right.
    ///
    /// At each candidate position needles are tried in order and the first
    /// one whose edges are bounded wins. Matches do not overlap.
    pub fn find_all(&self, haystack: &str) -> Vec<usize> {
        let mut hits = Vec::new();
        let mut at = 0;
        while at < haystack.len() {
            let Some(m) = self.regex.find_at(haystack, at) else {
                break;
            };
            let start = m.start();
            match self.accept_at(haystack, start) {
                Some(len) => {
                    hits.push(start);
                    at = start + len;
                }
                None => {
                    at = start
                        + haystack[start..]
                            .chars()
                            .next()
                            .map_or(1, char::len_utf8);
                }
            }
        }
        hits
    }

    fn accept_at(&self, haystack: &str, start: usize) -> Option<usize> {
        self.needles
            .iter()
            .filter(|needle| haystack[start..].starts_with(needle.as_str()))
            .find(|needle| is_bounded(haystack, start, start + needle.len()))
            .map(|needle| needle.len())
    }
}

fn is_word(c: Option<char>) -> bool {
    c.is_some_and(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn is_separator(c: Option<char>) -> bool {
    c.is_some_and(|c| c.is_whitespace() || c == '(' || c == ')')
}

fn is_bounded(haystack: &str, start: usize, end: usize) -> bool {
    let before = haystack[..start].chars().next_back();
    let first = haystack[start..end].chars().next();
    let last = haystack[start..end].chars().next_back();
    let after = haystack[end..].chars().next();

    let leading = is_word(before) != is_word(first) || is_separator(before);
    let trailing = is_word(last) != is_word(after) || is_separator(after);
    leading && trailing
}

/// Include/exclude globs naming part of a snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubsetSpec {
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
}

/// Needle templates for one member kind and the subset they are searched in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NeedleRule {
    #[serde(default = "all_files")]
    pub subset: String,
    pub needles: Vec<String>,
}

fn all_files() -> String {
    ALL_FILES.to_string()
}

impl NeedleRule {
    pub fn new(subset: impl Into<String>, needles: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            subset: subset.into(),
            needles: needles.into_iter().map(Into::into).collect(),
        }
    }

    /// Needles for one member
    pub fn expand(&self, domain: &str, member: &str) -> Vec<String> {
        self.needles
            .iter()
            .map(|template| expand_template(template, domain, member))
            .collect()
    }
}

/// How an implementation names protocol symbols in its sources
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Convention {
    pub display_name: String,
    pub repo: RepoSpec,
    #[serde(flatten)]
    pub scope: SnapshotScope,
    #[serde(default)]
    pub subsets: BTreeMap<String, SubsetSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commands: Option<NeedleRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub events: Option<NeedleRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub types: Option<NeedleRule>,
    /// Subsets whose files are indexed for tagged comments
    #[serde(default)]
    pub comments: Vec<String>,
}

impl Convention {
    pub fn rule(&self, kind: MemberKind) -> Option<&NeedleRule> {
        match kind {
            MemberKind::Command => self.commands.as_ref(),
            MemberKind::Event => self.events.as_ref(),
            MemberKind::Type => self.types.as_ref(),
        }
    }

    /// Compile the subset filters, checking every name a rule refers to
    pub fn compile_subsets(&self) -> Result<BTreeMap<String, PathFilter>> {
        let mut filters = BTreeMap::new();
        filters.insert(ALL_FILES.to_string(), PathFilter::all());
        for (name, subset) in &self.subsets {
            filters.insert(name.clone(), PathFilter::new(&subset.include, &subset.exclude)?);
        }

        let referenced = MemberKind::ALL
            .iter()
            .filter_map(|kind| self.rule(*kind))
            .map(|rule| &rule.subset)
            .chain(&self.comments);
        for name in referenced {
            if !filters.contains_key(name) {
                return Err(Error::Pattern(format!(
                    "{} refers to unknown subset {name:?}",
                    self.display_name
                )));
            }
        }

        for kind in MemberKind::ALL {
            let Some(rule) = self.rule(kind) else {
                continue;
            };
            if rule.needles.is_empty() {
                return Err(Error::Pattern(format!(
                    "{} has a {} rule with no needles",
                    self.display_name,
                    kind.as_str()
                )));
            }
            for template in &rule.needles {
                validate_template(template)?;
            }
        }
        Ok(filters)
    }
}

struct ScanFile<'a> {
    path: &'a str,
    content: &'a str,
    lines: LineIndex<'a>,
}

struct ScanJob<'a> {
    kind: MemberKind,
    domain: &'a str,
    local: &'a str,
}

/// Compiled convention, shared with the blocking scan
struct Scanner {
    convention: Convention,
    filters: BTreeMap<String, PathFilter>,
    parser: TagParser,
    comments: OnceLock<CommentIndex>,
}

/// An [`Implementation`] driven by a [`Convention`] over a snapshot cache.
///
/// Matching needles is CPU-bound; it runs on tokio's blocking pool (and on
/// rayon with the `parallel` feature), not on the calling task.
pub struct ConventionExtractor {
    scanner: Arc<Scanner>,
    cache: SnapshotCache,
}

impl std::fmt::Debug for ConventionExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConventionExtractor")
            .field("display_name", &self.scanner.convention.display_name)
            .field("cache", &self.cache)
            .finish()
    }
}

impl ConventionExtractor {
    pub fn new(
        convention: Convention,
        provider: Arc<dyn SourceProvider>,
        parser: TagParser,
    ) -> Result<Self> {
        let filters = convention.compile_subsets()?;
        let cache = SnapshotCache::new(provider, convention.repo.clone(), convention.scope.clone());
        Ok(Self {
            scanner: Arc::new(Scanner {
                convention,
                filters,
                parser,
                comments: OnceLock::new(),
            }),
            cache,
        })
    }

    pub fn convention(&self) -> &Convention {
        &self.scanner.convention
    }

    pub async fn snapshot(&self) -> Result<Arc<Snapshot>> {
        Ok(self.cache.snapshot().await?)
    }
}

impl Scanner {
    fn filter(&self, subset: &str) -> &PathFilter {
        // compile_subsets checked every name a rule or comment list uses
        &self.filters[subset]
    }

    fn comment_index(&self, snapshot: &Snapshot) -> &CommentIndex {
        self.comments.get_or_init(|| {
            let subsets: Vec<&PathFilter> = self
                .convention
                .comments
                .iter()
                .map(|name| self.filter(name))
                .collect();
            let files = snapshot
                .paths()
                .iter()
                .filter(|path| subsets.iter().any(|f| f.matches(path)))
                .filter_map(|path| Some((snapshot.source_file(path), snapshot.content(path)?)));
            let index = self.parser.index(files);
            debug!(
                implementation = %self.convention.display_name,
                comments = index.len(),
                "indexed tagged comments"
            );
            index
        })
    }

    /// Extract references from this extractor's populated snapshot
    fn extract_from_snapshot(
        &self,
        snapshot: &Snapshot,
        schema: &ProtocolSchema,
    ) -> Result<ReferenceMap> {
        let comments = self.comment_index(snapshot);

        let mut files_by_subset: BTreeMap<&str, Vec<ScanFile<'_>>> = BTreeMap::new();
        for rule in MemberKind::ALL.iter().filter_map(|kind| self.convention.rule(*kind)) {
            if files_by_subset.contains_key(rule.subset.as_str()) {
                continue;
            }
            let files = snapshot
                .files(self.filter(&rule.subset))
                .map(|(path, content)| ScanFile {
                    path,
                    content,
                    lines: LineIndex::new(content),
                })
                .collect();
            files_by_subset.insert(rule.subset.as_str(), files);
        }

        let jobs: Vec<ScanJob<'_>> = schema
            .domains
            .iter()
            .flat_map(|domain| {
                MemberKind::ALL.into_iter().flat_map(move |kind| {
                    domain.member_names(kind).into_iter().map(move |local| ScanJob {
                        kind,
                        domain: &domain.domain,
                        local,
                    })
                })
            })
            .collect();

        let scan = |job: &ScanJob<'_>| -> Result<(MemberKind, String, Vec<Reference>)> {
            let qualified = format!("{}.{}", job.domain, job.local);
            let mut refs: Vec<Reference> = comments
                .get(&qualified)
                .iter()
                .map(|hit| {
                    Reference::Comment(ReferenceComment {
                        location: ReferenceLocation {
                            source: Some(hit.source.clone()),
                            line: hit.comment.line,
                            column: hit.comment.column,
                        },
                        comment: hit.comment.cleaned_text.clone(),
                        is_contentful_comment: hit.comment.has_additional_content,
                    })
                })
                .collect();

            if let Some(rule) = self.convention.rule(job.kind) {
                let matcher = NeedleMatcher::new(&rule.expand(job.domain, job.local))?;
                let files = files_by_subset
                    .get(rule.subset.as_str())
                    .map(Vec::as_slice)
                    .unwrap_or(&[]);
                for file in files {
                    for offset in matcher.find_all(file.content) {
                        let (line, column) = file.lines.locate(offset);
                        refs.push(Reference::Location(ReferenceLocation {
                            source: Some(snapshot.source_file(file.path)),
                            line,
                            column,
                        }));
                    }
                }
            }
            Ok((job.kind, qualified, refs))
        };

        #[cfg(feature = "parallel")]
        let scanned: Vec<_> = {
            use rayon::prelude::*;
            jobs.par_iter().map(scan).collect::<Result<_>>()?
        };
        #[cfg(not(feature = "parallel"))]
        let scanned: Vec<_> = jobs.iter().map(scan).collect::<Result<_>>()?;

        let mut references = ReferenceMap::new();
        for (kind, qualified, refs) in scanned {
            references.of_kind_mut(kind).entry(qualified).or_default().extend(refs);
        }

        info!(
            implementation = %self.convention.display_name,
            commands = references.referenced(MemberKind::Command).count(),
            events = references.referenced(MemberKind::Event).count(),
            types = references.referenced(MemberKind::Type).count(),
            "extracted references"
        );
        Ok(references)
    }
}

#[async_trait]
impl Implementation for ConventionExtractor {
    fn display_name(&self) -> &str {
        &self.scanner.convention.display_name
    }

    async fn extract_references(&self, schema: &ProtocolSchema) -> Result<ReferenceMap> {
        let snapshot = self.snapshot().await?;
        let scanner = Arc::clone(&self.scanner);
        let schema = schema.clone();
        tokio::task::spawn_blocking(move || scanner.extract_from_snapshot(&snapshot, &schema))
            .await
            .map_err(|err| Error::Scan(err.to_string()))?
    }

    async fn data_source(&self) -> Result<DataSourceMetadata> {
        let snapshot = self.snapshot().await?;
        Ok(DataSourceMetadata {
            repository: Some(RepoCommit {
                owner: snapshot.owner().to_string(),
                repo: snapshot.repo().to_string(),
                commit_sha: snapshot.commit_sha().to_string(),
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher(needles: &[&str]) -> NeedleMatcher {
        let needles: Vec<String> = needles.iter().map(|n| n.to_string()).collect();
        NeedleMatcher::new(&needles).unwrap()
    }

    #[test]
    fn test_case_transforms() {
        assert_eq!(pascal_to_camel("HeapProfiler"), "heapProfiler");
        assert_eq!(camel_to_pascal("getCookies"), "GetCookies");
        assert_eq!(pascal_to_camel(""), "");
        assert_eq!(quote_wire("Network", "enable"), r#""Network.enable""#);
        assert_eq!(quote_wire("A", "b\"c"), r#""A.b\"c""#);
    }

    #[test]
    fn test_expand_template() {
        assert_eq!(
            expand_template("m::{domainCamel}::{memberPascal}Request", "Runtime", "evaluate"),
            "m::runtime::EvaluateRequest"
        );
        assert_eq!(expand_template("{wire}", "Runtime", "evaluate"), r#""Runtime.evaluate""#);
        assert_eq!(expand_template("{domain}_{member}", "A", "b"), "A_b");
    }

    #[test]
    fn test_validate_template() {
        assert!(validate_template("m::{domainCamel}::{memberPascal}Request").is_ok());
        assert!(validate_template("{wire}").is_ok());
        assert!(validate_template("{nope}").is_err());
        assert!(validate_template("{domain").is_err());
        assert!(validate_template("").is_err());
    }

    #[test]
    fn test_match_boundaries() {
        let m = matcher(&["m::runtime::EvaluateRequest"]);
        assert_eq!(m.find_all("auto r = m::runtime::EvaluateRequest{};"), vec![9]);
        assert_eq!(m.find_all("foo(m::runtime::EvaluateRequest)"), vec![4]);
        // Part of a longer identifier on either side
        assert!(m.find_all("xm::runtime::EvaluateRequest").is_empty());
        assert!(m.find_all("m::runtime::EvaluateRequestFoo").is_empty());
    }

    #[test]
    fn test_match_wire_string() {
        let m = matcher(&[r#""Debugger.enable""#]);
        assert_eq!(m.find_all(r#"if (method == "Debugger.enable") {"#), vec![14]);
        assert_eq!(m.find_all(r#"handle("Debugger.enable")"#), vec![7]);
        // Quote-led needles need a word character, space or parenthesis before them
        assert!(m.find_all(r#"{"Debugger.enable", 1}"#).is_empty());
    }

    #[test]
    fn test_match_falls_back_to_later_needle() {
        // The first needle matches textually but is not bounded; the second is
        let m = matcher(&["Foo", "Foo_bar"]);
        assert_eq!(m.find_all(" Foo_bar "), vec![1]);
        assert_eq!(m.find_all(" Foo_bar Foo "), vec![1, 9]);
        let m = matcher(&["ab", "abc"]);
        assert_eq!(m.find_all("abc ab"), vec![0, 4]);
    }

    #[test]
    fn test_match_counts_repeats() {
        let m = matcher(&["Page::Reload"]);
        assert_eq!(m.find_all("Page::Reload Page::Reload\nPage::Reload").len(), 3);
    }

    #[test]
    fn test_unknown_subset_rejected() {
        let convention = Convention {
            display_name: "X".into(),
            repo: RepoSpec::new("o", "r", "main"),
            scope: SnapshotScope::default(),
            subsets: BTreeMap::new(),
            commands: Some(NeedleRule::new("agent", ["{wire}"])),
            events: None,
            types: None,
            comments: vec![],
        };
        assert!(matches!(convention.compile_subsets(), Err(Error::Pattern(_))));
    }

    #[test]
    fn test_rule_without_needles_rejected() {
        let mut convention = Convention {
            display_name: "X".into(),
            repo: RepoSpec::new("o", "r", "main"),
            scope: SnapshotScope::default(),
            subsets: BTreeMap::new(),
            commands: Some(NeedleRule::new(ALL_FILES, Vec::<String>::new())),
            events: None,
            types: None,
            comments: vec![ALL_FILES.to_string()],
        };
        let Err(Error::Pattern(message)) = convention.compile_subsets() else {
            panic!("expected an empty needle list to be rejected");
        };
        assert!(message.contains("no needles"), "{message}");

        convention.commands = Some(NeedleRule::new(ALL_FILES, ["{wire}"]));
        assert!(convention.compile_subsets().is_ok());
    }

    #[test]
    fn test_implemented_seed_order() {
        let schema = ProtocolSchema::from_json(
            r#"{ "domains": [
                { "domain": "A", "types": [ { "id": "T", "type": "string" } ],
                  "commands": [ { "name": "c" }, { "name": "d" } ],
                  "events": [ { "name": "e" } ] },
                { "domain": "B", "commands": [ { "name": "c" } ] }
            ] }"#,
        )
        .unwrap();
        let mut refs = ReferenceMap::new();
        let hit = || {
            vec![Reference::Location(ReferenceLocation {
                source: None,
                line: 1,
                column: 1,
            })]
        };
        refs.types.insert("A.T".into(), hit());
        refs.events.insert("A.e".into(), hit());
        refs.commands.insert("B.c".into(), hit());
        refs.commands.insert("A.c".into(), hit());
        refs.commands.insert("A.d".into(), vec![]);

        assert_eq!(
            implemented_seeds(&schema, &refs),
            vec![
                SeedRef::command("A.c"),
                SeedRef::command("B.c"),
                SeedRef::event("A.e"),
                SeedRef::ty("A.T"),
            ]
        );
    }
}
