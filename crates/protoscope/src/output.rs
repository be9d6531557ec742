//! Output formatting for references, coverage and comments

use eyre::Result;
use owo_colors::OwoColorize;
use protoscope_core::{CommentIndex, ImplementationStats, MemberKind, Reference, ReferenceMap};

/// Output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

fn colored_percent(percent: f64) -> String {
    let percent_str = format!("{:.1}%", percent);
    if percent >= 80.0 {
        percent_str.green().to_string()
    } else if percent >= 50.0 {
        percent_str.yellow().to_string()
    } else {
        percent_str.red().to_string()
    }
}

fn plural(kind: MemberKind) -> &'static str {
    match kind {
        MemberKind::Command => "commands",
        MemberKind::Event => "events",
        MemberKind::Type => "types",
    }
}

/// Render coverage statistics for several implementations
pub fn render_stats(stats: &[ImplementationStats], format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(stats)? + "\n"),
        OutputFormat::Text => Ok(render_stats_text(stats)),
    }
}

fn render_stats_text(stats: &[ImplementationStats]) -> String {
    let mut output = String::new();

    for s in stats {
        output.push('\n');
        output.push_str(&format!(
            "{} {} Coverage Report\n",
            "##".bold(),
            s.implementation.cyan().bold()
        ));
        output.push('\n');
        output.push_str(&format!(
            "Coverage: {} ({}/{} members)\n",
            colored_percent(s.coverage_percent()),
            s.implemented.members(),
            s.protocol.members()
        ));
        output.push_str(&format!(
            "  Domains:  {}/{}\n",
            s.implemented.domains, s.protocol.domains
        ));
        output.push_str(&format!(
            "  Commands: {}/{}\n",
            s.implemented.commands, s.protocol.commands
        ));
        output.push_str(&format!(
            "  Events:   {}/{}\n",
            s.implemented.events, s.protocol.events
        ));
        output.push_str(&format!(
            "  Types:    {}/{}\n",
            s.implemented.types, s.protocol.types
        ));
    }

    output
}

/// Render the reference map of one implementation
pub fn render_references(
    implementation: &str,
    references: &ReferenceMap,
    format: OutputFormat,
    verbose: bool,
) -> Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(references)? + "\n"),
        OutputFormat::Text => Ok(render_references_text(implementation, references, verbose)),
    }
}

fn describe_reference(reference: &Reference) -> String {
    let location = reference.location();
    let path = reference
        .source()
        .map(|s| s.path.as_str())
        .unwrap_or("<unknown>");
    let position = format!("{}:{}:{}", path, location.line, location.column);
    match reference.as_comment() {
        Some(comment) => {
            let first_line = comment.comment.lines().next().unwrap_or("");
            format!("{} {}", position, first_line.dimmed())
        }
        None => position,
    }
}

fn render_references_text(implementation: &str, references: &ReferenceMap, verbose: bool) -> String {
    let mut output = String::new();

    output.push('\n');
    output.push_str(&format!(
        "{} {} References\n",
        "##".bold(),
        implementation.cyan().bold()
    ));

    for kind in MemberKind::ALL {
        let list = references.of_kind(kind);
        let referenced: Vec<_> = list.iter().filter(|(_, refs)| !refs.is_empty()).collect();

        output.push('\n');
        output.push_str(&format!(
            "{} {} ({}/{} referenced):\n",
            "->".blue().bold(),
            plural(kind),
            referenced.len().to_string().green(),
            list.len()
        ));

        for (name, refs) in referenced {
            let comments = refs.iter().filter(|r| r.as_comment().is_some()).count();
            let mut line = format!("  {} {} ({} refs", "+".green(), name, refs.len());
            if comments > 0 {
                line.push_str(&format!(", {} comments", comments));
            }
            line.push_str(")\n");
            output.push_str(&line);

            if verbose {
                for r in refs {
                    output.push_str(&format!("      {}\n", describe_reference(r)));
                }
            }
        }

        if verbose {
            for (name, _) in list.iter().filter(|(_, refs)| refs.is_empty()) {
                output.push_str(&format!("  {} {}\n", "-".yellow(), name.dimmed()));
            }
        }
    }

    output
}

/// Render tagged comments found in local files
pub fn render_comments(index: &CommentIndex, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(index)? + "\n"),
        OutputFormat::Text => {
            let mut output = String::new();
            for (symbol, comments) in &index.by_symbol {
                output.push_str(&format!("{}\n", symbol.cyan().bold()));
                for hit in comments {
                    output.push_str(&format!(
                        "  {}:{}:{}\n",
                        hit.source.path, hit.comment.line, hit.comment.column
                    ));
                    for text in hit.comment.cleaned_text.lines() {
                        output.push_str(&format!("    {}\n", text.dimmed()));
                    }
                }
            }
            Ok(output)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protoscope_core::{MemberCounts, ReferenceComment, ReferenceLocation, SourceFile};

    fn stats() -> ImplementationStats {
        ImplementationStats {
            implementation: "Hermes".into(),
            protocol: MemberCounts {
                domains: 2,
                commands: 3,
                events: 1,
                types: 0,
            },
            implemented: MemberCounts {
                domains: 1,
                commands: 1,
                events: 1,
                types: 0,
            },
        }
    }

    #[test]
    fn test_stats_json() {
        let json = render_stats(&[stats()], OutputFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value[0]["implementation"], "Hermes");
        assert_eq!(value[0]["implemented"]["commands"], 1);
    }

    #[test]
    fn test_stats_text() {
        let text = render_stats(&[stats()], OutputFormat::Text).unwrap();
        assert!(text.contains("Coverage Report"));
        assert!(text.contains("(2/4 members)"));
        assert!(text.contains("Commands: 1/3"));
    }

    #[test]
    fn test_references_text() {
        let mut refs = ReferenceMap::new();
        refs.commands.insert(
            "Debugger.pause".into(),
            vec![Reference::Comment(ReferenceComment {
                location: ReferenceLocation {
                    source: Some(SourceFile {
                        owner: "facebook".into(),
                        repo: "hermes".into(),
                        commit_sha: "abc".into(),
                        path: "Agent.cpp".into(),
                    }),
                    line: 4,
                    column: 1,
                },
                comment: "Debugger.pause\nOnly at statements.".into(),
                is_contentful_comment: true,
            })],
        );
        refs.commands.insert("Debugger.resume".into(), vec![]);

        let brief = render_references("Hermes", &refs, OutputFormat::Text, false).unwrap();
        assert!(brief.contains("Debugger.pause (1 refs, 1 comments)"));
        assert!(!brief.contains("Agent.cpp"));
        assert!(!brief.contains("Debugger.resume"));

        let verbose = render_references("Hermes", &refs, OutputFormat::Text, true).unwrap();
        assert!(verbose.contains("Agent.cpp:4:1"));
        assert!(verbose.contains("Debugger.resume"));
    }
}
