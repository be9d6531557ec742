//! protoscope-core - Cross-referencing protocol schemas with their implementations
//!
//! This crate provides the building blocks for:
//! - Finding where an implementation references protocol commands, events and
//!   types, both structurally (generated identifiers, wire strings) and through
//!   tagged developer comments
//! - Deriving the sub-schema an implementation actually uses, following type
//!   references transitively
//! - Merging, ordering and stabilizing protocol schema documents
//! - Computing coverage statistics per implementation
//!
//! # Features
//!
//! - `walk` - Enable [`DirectoryProvider`] for reading local checkouts (brings in `ignore`)
//! - `parallel` - Enable parallel reference scanning (brings in `rayon`)
//!
//! # Tagged comments
//!
//! A comment that mentions a protocol symbol after the tag is attached to that
//! symbol as documentation:
//!
//! ```
//! use protoscope_core::TagParser;
//!
//! let comments = TagParser::default().parse(
//!     "/**\n * @cdp Debugger.pause\n * Only pauses at the next statement.\n */\nvoid pause();\n",
//! );
//! let pause = &comments["Debugger.pause"][0];
//! assert_eq!(pause.line, 1);
//! assert!(pause.has_additional_content);
//! ```
//!
//! # Schema closure
//!
//! ```
//! use protoscope_core::{ProtocolModel, SeedRef};
//!
//! let model = ProtocolModel::from_json(r#"{ "domains": [
//!     { "domain": "Network",
//!       "types": [ { "id": "Cookie", "type": "object" }, { "id": "Unused", "type": "string" } ],
//!       "commands": [ { "name": "getCookies",
//!           "returns": [ { "name": "cookies", "type": "array", "items": { "$ref": "Cookie" } } ] } ] }
//! ] }"#).unwrap();
//!
//! let used = model.filter_protocol(&[SeedRef::command("Network.getCookies")]).unwrap();
//! assert_eq!(used.domains[0].types().len(), 1);
//! ```
//!
//! # In-memory sources (for testing)
//!
//! ```
//! use std::sync::Arc;
//! use protoscope_core::{
//!     Convention, ConventionExtractor, Implementation, MemoryProvider, NeedleRule,
//!     ProtocolSchema, RepoSpec, SnapshotScope, TagParser,
//! };
//!
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//! let provider = Arc::new(
//!     MemoryProvider::new("abc123").add("src/agent.cpp", r#"dispatch("Page.reload");"#),
//! );
//! let convention = Convention {
//!     display_name: "Example".into(),
//!     repo: RepoSpec::new("example", "agent", "main"),
//!     scope: SnapshotScope { roots: vec!["src".into()], ..Default::default() },
//!     subsets: Default::default(),
//!     commands: Some(NeedleRule::new("all", ["{wire}"])),
//!     events: None,
//!     types: None,
//!     comments: vec!["all".into()],
//! };
//! let extractor = ConventionExtractor::new(convention, provider, TagParser::default()).unwrap();
//!
//! let schema = ProtocolSchema::from_json(
//!     r#"{ "domains": [ { "domain": "Page", "commands": [ { "name": "reload" } ] } ] }"#,
//! ).unwrap();
//! let refs = extractor.extract_references(&schema).await.unwrap();
//! assert_eq!(refs.commands["Page.reload"][0].location().column, 10);
//! # });
//! ```

mod comments;
mod coverage;
mod error;
mod extractor;
mod memo;
mod merged;
mod model;
mod provider;
mod references;
mod schema;
mod snapshot;
mod versions;

pub use comments::{
    CommentIndex, CommentShape, CommentSpan, DEFAULT_TAG, FileTagComment, TagComment, TagComments,
    TagParser, clean_comment, comment_spans,
};
pub use coverage::{ImplementationStats, MemberCounts};
pub use error::{Error, FetchError, LookupKind, Result};
pub use extractor::{
    ALL_FILES, Convention, ConventionExtractor, DataSourceMetadata, Implementation, NeedleMatcher,
    NeedleRule, RepoCommit, SubsetSpec, camel_to_pascal, expand_template, implemented_seeds,
    pascal_to_camel, quote_wire, validate_template,
};
pub use memo::{Memo, MemoStatus};
pub use merged::MergedImplementation;
pub use model::{ProtocolModel, SeedRef};
pub use provider::{DirEntry, EntryKind, MemoryProvider, RepoSpec, SourceProvider};
pub use references::{
    Reference, ReferenceComment, ReferenceList, ReferenceLocation, ReferenceMap, SourceFile,
};
pub use schema::{
    Command, Domain, Event, KnownType, MemberKind, PropertyType, ProtocolSchema, ProtocolType,
    QualifiedName, TypeDef, Version,
};
pub use snapshot::{PathFilter, Snapshot, SnapshotCache, SnapshotScope};
pub use versions::{
    ProtocolVersion, VersionMetadata, merge_protocols, sort_protocol, stable_protocol,
};

#[cfg(feature = "walk")]
pub use provider::{DirectoryProvider, WORKING_TREE};
