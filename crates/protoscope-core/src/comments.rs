//! Tagged comment extraction
//!
//! Scans C-style source text for comments carrying a tag such as `@cdp`,
//! normalizes them to prose, and indexes them by the protocol symbol that
//! follows the tag:
//!
//! ```text
//! // @cdp Debugger.setBreakpointByUrl
//! // Only line breakpoints are supported.
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::references::{LineIndex, SourceFile};

/// Tag used by default to link comments to protocol symbols
pub const DEFAULT_TAG: &str = "@cdp";

/// Syntactic shape of an extracted comment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentShape {
    /// Consecutive `//` comments, each on its own line
    LineRun,
    /// A `//` comment following code on the same line
    Trailing,
    /// `/* ... */`, possibly unterminated
    Block,
}

/// Byte range of one comment in the scanned text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommentSpan {
    pub shape: CommentShape,
    pub start: usize,
    pub end: usize,
}

/// A tagged comment annotating one symbol
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagComment {
    /// Line of the comment start (1-indexed)
    pub line: usize,
    /// Column of the comment start (1-indexed)
    pub column: usize,
    /// Cleaned comment text, without a leading tag
    pub cleaned_text: String,
    /// Whether the comment says more than the tag and symbol
    pub has_additional_content: bool,
}

/// A tagged comment together with the file it was found in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileTagComment {
    pub source: SourceFile,
    pub comment: TagComment,
}

/// Tagged comments of a single text, by symbol
pub type TagComments = BTreeMap<String, Vec<TagComment>>;

/// Tagged comments of many files, by symbol
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommentIndex {
    pub by_symbol: BTreeMap<String, Vec<FileTagComment>>,
}

impl CommentIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Comments mentioning `symbol`, in file then discovery order
    pub fn get(&self, symbol: &str) -> &[FileTagComment] {
        self.by_symbol
            .get(symbol)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.by_symbol.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_symbol.is_empty()
    }
}

/// One `tag symbol` occurrence inside cleaned comment text
#[derive(Debug, Clone, PartialEq, Eq)]
struct TagMatch<'a> {
    symbol: &'a str,
    /// Byte length from the tag start to the symbol end
    len: usize,
}

/// Extracts tagged comments for a given tag literal
#[derive(Debug, Clone)]
pub struct TagParser {
    tag: String,
}

impl Default for TagParser {
    fn default() -> Self {
        Self::new(DEFAULT_TAG)
    }
}

impl TagParser {
    pub fn new(tag: impl Into<String>) -> Self {
        Self { tag: tag.into() }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Extract tagged comments from one source text
    pub fn parse(&self, content: &str) -> TagComments {
        let mut by_symbol = TagComments::new();
        if self.tag.is_empty() || !content.contains(self.tag.as_str()) {
            return by_symbol;
        }

        let lines = LineIndex::new(content);
        for span in comment_spans(content) {
            let raw = &content[span.start..span.end];
            if !raw.contains(self.tag.as_str()) {
                continue;
            }

            let cleaned = clean_comment(raw);
            let matches = self.tag_matches(&cleaned);
            if matches.is_empty() {
                continue;
            }

            let (line, column) = lines.locate(span.start);
            let cleaned_text = self.strip_leading_tag(&cleaned).to_string();
            let mut seen: Vec<&str> = Vec::new();
            for m in matches {
                if seen.contains(&m.symbol) {
                    continue;
                }
                seen.push(m.symbol);
                by_symbol
                    .entry(m.symbol.to_string())
                    .or_default()
                    .push(TagComment {
                        line,
                        column,
                        cleaned_text: cleaned_text.clone(),
                        has_additional_content: cleaned.len() > m.len,
                    });
            }
        }
        by_symbol
    }

    /// Extract and aggregate tagged comments from many files
    pub fn index<'a>(&self, files: impl IntoIterator<Item = (SourceFile, &'a str)>) -> CommentIndex {
        let mut index = CommentIndex::new();
        for (source, content) in files {
            for (symbol, comments) in self.parse(content) {
                let entry = index.by_symbol.entry(symbol).or_default();
                entry.extend(comments.into_iter().map(|comment| FileTagComment {
                    source: source.clone(),
                    comment,
                }));
            }
        }
        index
    }

    /// Find every `tag <symbol>` in cleaned text.
    ///
    /// The symbol is a run of word characters, `$` and `.` that neither
    /// starts nor ends with a dot, so `Domain.method` survives while trailing
    /// punctuation (`symbol.`, `symbol?`, `symbol's`) is dropped.
    fn tag_matches<'a>(&self, text: &'a str) -> Vec<TagMatch<'a>> {
        let mut matches = Vec::new();
        let mut from = 0;

        while let Some(pos) = text[from..].find(self.tag.as_str()) {
            let tag_start = from + pos;
            let after_tag = tag_start + self.tag.len();
            from = after_tag;

            let rest = &text[after_tag..];
            let symbol_start = rest.len() - rest.trim_start().len();
            if symbol_start == 0 {
                continue;
            }

            let candidate = &rest[symbol_start..];
            let taken = candidate
                .char_indices()
                .find(|(_, c)| !is_symbol_char(*c))
                .map(|(i, _)| i)
                .unwrap_or(candidate.len());
            let symbol = candidate[..taken].trim_end_matches('.');
            if symbol.is_empty() || symbol.starts_with('.') {
                continue;
            }

            let symbol_end = after_tag + symbol_start + symbol.len();
            matches.push(TagMatch {
                symbol,
                len: symbol_end - tag_start,
            });
            from = symbol_end;
        }
        matches
    }

    /// Drop a leading `tag` and the whitespace after it
    fn strip_leading_tag<'a>(&self, cleaned: &'a str) -> &'a str {
        match cleaned.strip_prefix(self.tag.as_str()) {
            Some(rest) if rest.starts_with(char::is_whitespace) => rest.trim_start(),
            _ => cleaned,
        }
    }
}

fn is_symbol_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$' || c == '.'
}

/// Locate every comment in C-style source text.
///
/// Block comments run to the first `*/` or to the end of input when
/// unterminated. Consecutive own-line `//` comments merge into one span.
/// String literals are not tracked.
pub fn comment_spans(content: &str) -> Vec<CommentSpan> {
    let bytes = content.as_bytes();
    let mut spans = Vec::new();
    let mut i = 0;

    while i + 1 < bytes.len() {
        if bytes[i] != b'/' {
            i += 1;
            continue;
        }

        match bytes[i + 1] {
            b'*' => {
                let end = content[i + 2..]
                    .find("*/")
                    .map(|p| i + 2 + p + 2)
                    .unwrap_or(content.len());
                spans.push(CommentSpan {
                    shape: CommentShape::Block,
                    start: i,
                    end,
                });
                i = end;
            }
            b'/' => {
                let line_start = content[..i].rfind('\n').map_or(0, |p| p + 1);
                let own_line = content[line_start..i]
                    .bytes()
                    .all(|b| b == b' ' || b == b'\t');
                let mut end = line_end(content, i);

                let shape = if own_line {
                    while end < content.len() {
                        let next = end + 1;
                        let rest = &content[next..];
                        let body = rest.trim_start_matches([' ', '\t']);
                        if !body.starts_with("//") {
                            break;
                        }
                        end = line_end(content, next);
                    }
                    CommentShape::LineRun
                } else {
                    CommentShape::Trailing
                };

                spans.push(CommentSpan {
                    shape,
                    start: i,
                    end,
                });
                i = end;
            }
            _ => i += 1,
        }
    }
    spans
}

fn line_end(content: &str, from: usize) -> usize {
    content[from..]
        .find('\n')
        .map_or(content.len(), |p| from + p)
}

/// Normalize a raw comment to prose.
///
/// Strips block delimiters, per-line `//` and `*` markers, blank edge lines
/// and trailing whitespace, then removes the common indentation.
pub fn clean_comment(raw: &str) -> String {
    let mut text = raw;
    let mut opened = false;
    if let Some(rest) = text.strip_prefix("/**").or_else(|| text.strip_prefix("/*")) {
        text = rest;
        opened = true;
    }
    if let Some(rest) = text.strip_suffix("*/") {
        text = rest;
    }

    let mut lines: Vec<String> = text
        .split('\n')
        .enumerate()
        .map(|(idx, line)| {
            let mut line = strip_line_marker(line);
            // padding after an opener on the same line is not indentation
            if idx == 0 && opened {
                line = line.trim_start();
            }
            strip_star_marker(line).trim_end().to_string()
        })
        .collect();

    while lines.first().is_some_and(|l| l.is_empty()) {
        lines.remove(0);
    }
    while lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }

    let indent = lines
        .iter()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.len() - l.trim_start_matches([' ', '\t']).len())
        .min()
        .unwrap_or(0);

    lines
        .iter()
        .map(|l| l.get(indent..).unwrap_or(""))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Remove a leading `//` (also `///` and `//!`)
fn strip_line_marker(line: &str) -> &str {
    let body = line.trim_start();
    match body.strip_prefix("//") {
        Some(rest) => rest
            .strip_prefix('/')
            .or_else(|| rest.strip_prefix('!'))
            .unwrap_or(rest),
        None => line,
    }
}

/// Remove a leading `*` and at most one space after it
fn strip_star_marker(line: &str) -> &str {
    let body = line.trim_start();
    match body.strip_prefix('*') {
        Some(rest) if !rest.starts_with('/') => rest.strip_prefix(' ').unwrap_or(rest),
        _ => line,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(content: &str) -> TagComments {
        TagParser::default().parse(content)
    }

    fn source(path: &str) -> SourceFile {
        SourceFile {
            owner: "owner".into(),
            repo: "repo".into(),
            commit_sha: "00000000".into(),
            path: path.into(),
        }
    }

    #[test]
    fn test_single_line_tag_only() {
        let comments = parse("// @cdp Network.requestWillBeSent\nint x;\n");
        let found = &comments["Network.requestWillBeSent"];
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].line, 1);
        assert_eq!(found[0].column, 1);
        assert_eq!(found[0].cleaned_text, "Network.requestWillBeSent");
        assert!(!found[0].has_additional_content);
    }

    #[test]
    fn test_block_comment_with_notes() {
        let comments = parse("/** @cdp Network.requestWillBeSent\n * notes */");
        let found = &comments["Network.requestWillBeSent"];
        assert_eq!(found.len(), 1);
        assert!(found[0].has_additional_content);
        assert_eq!(found[0].cleaned_text, "Network.requestWillBeSent\nnotes");
    }

    #[test]
    fn test_line_run_merges_into_one_comment() {
        let content = "int a;\n  // @cdp symbol1\n  // @cdp symbol2\n\n// separate @cdp symbol2\n";
        let comments = parse(content);

        let one = &comments["symbol1"];
        assert_eq!(one.len(), 1);
        assert_eq!((one[0].line, one[0].column), (2, 3));
        assert_eq!(one[0].cleaned_text, "symbol1\n@cdp symbol2");

        let two = &comments["symbol2"];
        assert_eq!(two.len(), 2);
        assert_eq!(two[0].line, 2);
        assert_eq!(two[1].line, 5);
        assert_eq!(two[1].cleaned_text, "separate @cdp symbol2");
    }

    #[test]
    fn test_trailing_comment_starts_at_marker() {
        let comments = parse("const x = 10; // inline @cdp symbol1 comment\n");
        let found = &comments["symbol1"];
        assert_eq!((found[0].line, found[0].column), (1, 15));
        assert_eq!(found[0].cleaned_text, "inline @cdp symbol1 comment");
        assert!(found[0].has_additional_content);
    }

    #[test]
    fn test_distinct_symbols_share_comment() {
        let content = "/*\n * @cdp A.one and @cdp B.two, also @cdp A.one again\n */";
        let comments = parse(content);
        assert_eq!(comments.len(), 2);
        assert_eq!(comments["A.one"].len(), 1);
        assert_eq!(comments["B.two"].len(), 1);
        assert_eq!(comments["A.one"][0], comments["B.two"][0]);
    }

    #[test]
    fn test_trailing_punctuation_dropped() {
        let content = "// @cdp symbol3's mentions can use punctuation.\n// @cdp symbol3.@cdp symbol3, @cdp symbol3?\n";
        let comments = parse(content);
        assert_eq!(comments.keys().collect::<Vec<_>>(), vec!["symbol3"]);
        assert_eq!(comments["symbol3"].len(), 1);
    }

    #[test]
    fn test_tag_split_across_lines() {
        let content = "/**\n * mentioning @cdp\n * symbol1\n */";
        let comments = parse(content);
        assert_eq!(comments["symbol1"].len(), 1);
    }

    #[test]
    fn test_tags_outside_comments_ignored() {
        let content = "const s = '@cdp Not.aComment';\nint y; /* nothing here */\n";
        assert!(parse(content).is_empty());
    }

    #[test]
    fn test_unterminated_block_comment() {
        let content = "int x;\n/* @cdp Runtime.evaluate never closed\n * still going";
        let comments = parse(content);
        let found = &comments["Runtime.evaluate"];
        assert_eq!(found[0].line, 2);
        assert_eq!(found[0].cleaned_text, "Runtime.evaluate never closed\nstill going");
    }

    #[test]
    fn test_indented_block_is_dedented() {
        let content = "      /**\n       * @cdp Domain.method\n       * note that the comment is indented\n       *   - nested\n       */";
        let comments = parse(content);
        let found = &comments["Domain.method"];
        assert_eq!(found[0].column, 7);
        assert_eq!(
            found[0].cleaned_text,
            "Domain.method\nnote that the comment is indented\n  - nested"
        );
    }

    #[test]
    fn test_comment_without_tag_dropped() {
        // tag present but never followed by whitespace and a symbol
        let content = "// @cdpish is not a tag\n// nor is a bare @cdp\n";
        let comments = parse(content);
        assert!(comments.is_empty());
    }

    #[test]
    fn test_clean_is_idempotent_on_plain_text() {
        let plain = "Network.enable\nnotes\n  - nested";
        assert_eq!(clean_comment(plain), plain);
        let once = clean_comment("/**\n * a\n *   b\n */");
        assert_eq!(clean_comment(&once), once);
    }

    #[test]
    fn test_clean_line_comments_keeps_relative_indent() {
        let raw = "// @cdp Page.navigate\n//   - detail\n//\n// end";
        assert_eq!(clean_comment(raw), "@cdp Page.navigate\n  - detail\n\nend");
    }

    #[test]
    fn test_comment_spans_shapes() {
        let content = "a(); // t\n// r1\n   // r2\n/* b */";
        let spans = comment_spans(content);
        let shapes: Vec<_> = spans.iter().map(|s| s.shape).collect();
        assert_eq!(
            shapes,
            vec![CommentShape::Trailing, CommentShape::LineRun, CommentShape::Block]
        );
        assert_eq!(&content[spans[1].start..spans[1].end], "// r1\n   // r2");
    }

    #[test]
    fn test_index_carries_file_identity() {
        let parser = TagParser::default();
        let index = parser.index([
            (source("a.cpp"), "// @cdp Debugger.pause\n"),
            (source("b.cpp"), "int x;\n// @cdp Debugger.pause: notes\n"),
        ]);
        let found = index.get("Debugger.pause");
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].source.path, "a.cpp");
        assert_eq!(found[1].source.path, "b.cpp");
        assert_eq!(found[1].comment.line, 2);
        assert!(index.get("Debugger.resume").is_empty());
    }

    #[test]
    fn test_custom_tag() {
        let parser = TagParser::new("@proto");
        let comments = parser.parse("// @proto Foo.bar\n// @cdp Baz.qux\n");
        assert_eq!(comments.keys().collect::<Vec<_>>(), vec!["Foo.bar"]);
    }
}
