//! Reference locations and the per-implementation reference map

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::schema::MemberKind;

/// Identity of a file inside a commit-pinned repository
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceFile {
    pub owner: String,
    pub repo: String,
    pub commit_sha: String,
    pub path: String,
}

/// A place in source code evidencing a protocol symbol
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceLocation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceFile>,
    /// Line number (1-indexed)
    pub line: usize,
    /// Column (1-indexed, in characters)
    pub column: usize,
}

/// A tagged developer comment mentioning a protocol symbol
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceComment {
    #[serde(flatten)]
    pub location: ReferenceLocation,
    /// Cleaned comment text
    pub comment: String,
    /// Whether the comment says more than just the tag and symbol
    pub is_contentful_comment: bool,
}

/// One piece of evidence for a symbol
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Reference {
    Comment(ReferenceComment),
    Location(ReferenceLocation),
}

impl Reference {
    pub fn location(&self) -> &ReferenceLocation {
        match self {
            Reference::Comment(c) => &c.location,
            Reference::Location(l) => l,
        }
    }

    pub fn source(&self) -> Option<&SourceFile> {
        self.location().source.as_ref()
    }

    pub fn as_comment(&self) -> Option<&ReferenceComment> {
        match self {
            Reference::Comment(c) => Some(c),
            Reference::Location(_) => None,
        }
    }
}

/// Evidence lists keyed by qualified name (`Domain.member`).
///
/// Lists keep discovery order and are never deduplicated.
pub type ReferenceList = BTreeMap<String, Vec<Reference>>;

/// Every command, event and type of a schema mapped to its evidence
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceMap {
    pub commands: ReferenceList,
    pub events: ReferenceList,
    pub types: ReferenceList,
}

impl ReferenceMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn of_kind(&self, kind: MemberKind) -> &ReferenceList {
        match kind {
            MemberKind::Command => &self.commands,
            MemberKind::Event => &self.events,
            MemberKind::Type => &self.types,
        }
    }

    pub fn of_kind_mut(&mut self, kind: MemberKind) -> &mut ReferenceList {
        match kind {
            MemberKind::Command => &mut self.commands,
            MemberKind::Event => &mut self.events,
            MemberKind::Type => &mut self.types,
        }
    }

    /// References for one symbol (empty if none were found)
    pub fn get(&self, kind: MemberKind, qualified_name: &str) -> &[Reference] {
        self.of_kind(kind)
            .get(qualified_name)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Whether a symbol has at least one piece of evidence
    pub fn is_referenced(&self, kind: MemberKind, qualified_name: &str) -> bool {
        !self.get(kind, qualified_name).is_empty()
    }

    /// Qualified names with at least one reference, in key order
    pub fn referenced(&self, kind: MemberKind) -> impl Iterator<Item = &str> {
        self.of_kind(kind)
            .iter()
            .filter(|(_, refs)| !refs.is_empty())
            .map(|(name, _)| name.as_str())
    }

    /// Append another map's lists after this one's, key by key
    pub fn extend(&mut self, other: ReferenceMap) {
        let ReferenceMap {
            commands,
            events,
            types,
        } = other;
        for (kind, theirs) in [
            (MemberKind::Command, commands),
            (MemberKind::Event, events),
            (MemberKind::Type, types),
        ] {
            let ours = self.of_kind_mut(kind);
            for (name, refs) in theirs {
                ours.entry(name).or_default().extend(refs);
            }
        }
    }

    /// Total number of references across all kinds
    pub fn len(&self) -> usize {
        MemberKind::ALL
            .iter()
            .map(|kind| self.of_kind(*kind).values().map(Vec::len).sum::<usize>())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Maps byte offsets to 1-based line/column positions
pub(crate) struct LineIndex<'a> {
    content: &'a str,
    line_starts: Vec<usize>,
}

impl<'a> LineIndex<'a> {
    pub(crate) fn new(content: &'a str) -> Self {
        let line_starts = std::iter::once(0)
            .chain(content.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        Self {
            content,
            line_starts,
        }
    }

    /// 1-based (line, column) of a byte offset; columns count characters
    pub(crate) fn locate(&self, offset: usize) -> (usize, usize) {
        let line = match self.line_starts.binary_search(&offset) {
            Ok(line) => line + 1,
            Err(line) => line,
        };
        let line_start = self.line_starts[line - 1];
        let end = offset.min(self.content.len());
        let column = self.content[line_start..end].chars().count() + 1;
        (line, column)
    }
}
