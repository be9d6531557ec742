//! protoscope - Measure protocol coverage of native implementations
//!
//! protoscope finds where implementations reference protocol commands, events
//! and types, derives the sub-protocol each one implements, and reports
//! coverage.

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use eyre::{Result, WrapErr};
use owo_colors::OwoColorize;
use protoscope::output::{OutputFormat, render_comments, render_references, render_stats};
use protoscope::protocol::local_version;
use protoscope::{
    Config, DEFAULT_CONFIG_PATH, Implementations, coverage, find_project_root, scan_comments,
};
use protoscope_core::{ProtocolModel, TagParser};
use tracing::{Level, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// CLI arguments
#[derive(Debug, Parser)]
#[command(name = "protoscope", version, about)]
struct Cli {
    /// Path to config file (default: .config/protoscope/config.yaml)
    #[arg(short, long, global = true, env = "PROTOSCOPE_CONFIG")]
    config: Option<PathBuf>,

    /// Show debug logs and every reference
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

/// Where the protocol schema comes from
#[derive(Debug, Args)]
struct ProtocolArgs {
    /// Protocol schema JSON file; repeat to merge several documents
    #[arg(short, long = "schema", required = true)]
    schemas: Vec<PathBuf>,

    /// Keep only stable (non-experimental, non-deprecated) domains and members
    #[arg(long)]
    stable: bool,
}

#[derive(Debug, Args)]
struct CheckoutArgs {
    /// Local checkout for an implementation, as ID=DIR (overrides the config)
    #[arg(long = "checkout", value_name = "ID=DIR", value_parser = parse_checkout)]
    checkouts: Vec<(String, PathBuf)>,
}

/// Subcommands
#[derive(Debug, Subcommand)]
enum Command {
    /// Print where an implementation references each protocol member
    Refs {
        /// Implementation id from the config
        implementation: String,

        #[command(flatten)]
        protocol: ProtocolArgs,

        #[command(flatten)]
        checkouts: CheckoutArgs,

        #[arg(short, long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,

        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the part of the protocol an implementation uses, as schema JSON
    Filter {
        /// Implementation id from the config
        implementation: String,

        #[command(flatten)]
        protocol: ProtocolArgs,

        #[command(flatten)]
        checkouts: CheckoutArgs,

        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Report coverage per implementation
    Stats {
        /// Implementation ids (default: every configured implementation with a checkout)
        #[arg(short, long = "implementation")]
        implementations: Vec<String>,

        #[command(flatten)]
        protocol: ProtocolArgs,

        #[command(flatten)]
        checkouts: CheckoutArgs,

        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,

        /// Minimum coverage percentage to pass
        #[arg(long, default_value_t = 0.0)]
        threshold: f64,

        /// Exit with status 1 if any implementation is below the threshold
        #[arg(long)]
        check: bool,
    },

    /// List tagged comments in local source files
    Comments {
        /// Directory to scan
        #[arg(default_value = ".")]
        root: PathBuf,

        /// File extensions to scan
        #[arg(short, long, value_delimiter = ',', default_value = "cpp,h")]
        extensions: Vec<String>,

        /// Comment tag (default: the config's tag)
        #[arg(short, long)]
        tag: Option<String>,

        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
}

fn parse_checkout(value: &str) -> std::result::Result<(String, PathBuf), String> {
    let (id, dir) = value
        .split_once('=')
        .ok_or_else(|| format!("expected ID=DIR, got '{value}'"))?;
    if id.is_empty() || dir.is_empty() {
        return Err(format!("expected ID=DIR, got '{value}'"));
    }
    Ok((id.to_string(), PathBuf::from(dir)))
}

fn init_tracing(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::WARN };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .try_init()
        .ok();
}

/// Implementations of the loaded config, built once each per run
struct Session {
    implementations: Implementations,
}

impl Session {
    fn load(config_path: Option<PathBuf>, checkouts: &CheckoutArgs) -> Result<Session> {
        let config_path = match config_path {
            Some(path) => path,
            None => find_project_root()?.join(DEFAULT_CONFIG_PATH),
        };
        let mut config = Config::load(&config_path)?;

        // Relative checkouts in the config are relative to the config file;
        // --checkout values are made absolute against the current directory
        let base_dir = match config_path.parent() {
            Some(dir) if config_path.exists() => dir.to_path_buf(),
            _ => std::env::current_dir().wrap_err("Failed to get current directory")?,
        };
        for (id, dir) in &checkouts.checkouts {
            let dir = std::path::absolute(dir)
                .wrap_err_with(|| format!("Invalid checkout path: {}", dir.display()))?;
            config.set_checkout(id, dir)?;
        }
        Ok(Session {
            implementations: Implementations::new(config, base_dir),
        })
    }
}

async fn load_protocol(args: &ProtocolArgs) -> Result<std::sync::Arc<ProtocolModel>> {
    eprintln!(
        "{} Loading protocol from {} file(s)...",
        "->".blue().bold(),
        args.schemas.len()
    );
    let version = local_version(args.schemas.clone(), args.stable);
    let model = version
        .model()
        .await
        .wrap_err("Failed to load protocol schema")?;
    eprintln!(
        "   Found {} domains",
        model.schema().domains.len().to_string().green()
    );
    Ok(model)
}

fn write_output(output: Option<&Path>, content: &str) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, content)
                .wrap_err_with(|| format!("Failed to write {}", path.display()))?;
            eprintln!("{} Wrote {}", "OK".green().bold(), path.display());
        }
        None => print!("{}", content),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Refs {
            implementation,
            protocol,
            checkouts,
            format,
            output,
        } => {
            let session = Session::load(cli.config, &checkouts)?;
            let model = load_protocol(&protocol).await?;
            let implementation_ref = session.implementations.get(&implementation)?;

            eprintln!(
                "{} Scanning {}...",
                "->".blue().bold(),
                implementation_ref.display_name().cyan()
            );
            let references = implementation_ref
                .extract_references(model.schema())
                .await
                .wrap_err_with(|| format!("Failed to extract references for '{implementation}'"))?;
            let rendered = render_references(
                implementation_ref.display_name(),
                &references,
                format,
                cli.verbose,
            )?;
            write_output(output.as_deref(), &rendered)
        }

        Command::Filter {
            implementation,
            protocol,
            checkouts,
            output,
        } => {
            let session = Session::load(cli.config, &checkouts)?;
            let model = load_protocol(&protocol).await?;
            let implementation_ref = session.implementations.get(&implementation)?;

            let filtered = implementation_ref
                .filter_protocol(model.schema())
                .await
                .wrap_err_with(|| format!("Failed to filter protocol for '{implementation}'"))?;
            eprintln!(
                "   {} implements {} of {} domains",
                implementation_ref.display_name().cyan(),
                filtered.domains.len().to_string().green(),
                model.schema().domains.len()
            );
            write_output(output.as_deref(), &(filtered.to_json()? + "\n"))
        }

        Command::Stats {
            implementations,
            protocol,
            checkouts,
            format,
            threshold,
            check,
        } => {
            let session = Session::load(cli.config, &checkouts)?;
            let model = load_protocol(&protocol).await?;

            let explicit = !implementations.is_empty();
            let ids: Vec<String> = if explicit {
                implementations
            } else {
                session.implementations.config().ids().map(str::to_string).collect()
            };

            let mut all_stats = Vec::new();
            for id in &ids {
                let implementation = match session.implementations.get(id) {
                    Ok(implementation) => implementation,
                    Err(err) if !explicit => {
                        warn!(implementation = %id, "skipping: {err}");
                        continue;
                    }
                    Err(err) => return Err(err),
                };
                eprintln!("{} Scanning {}...", "->".blue().bold(), id.cyan());
                all_stats.push(
                    coverage(implementation.as_ref(), model.schema())
                        .await
                        .wrap_err_with(|| format!("Failed to extract references for '{id}'"))?,
                );
            }

            if all_stats.is_empty() {
                eyre::bail!(
                    "No implementation could be scanned - pass --checkout ID=DIR or set `checkout` in {}",
                    DEFAULT_CONFIG_PATH
                );
            }

            print!("{}", render_stats(&all_stats, format)?);

            let all_passing = all_stats.iter().all(|s| s.is_passing(threshold));
            if check && !all_passing {
                std::process::exit(1);
            }
            Ok(())
        }

        Command::Comments {
            root,
            extensions,
            tag,
            format,
        } => {
            let tag = match tag {
                Some(tag) => tag,
                None => {
                    let config_path = match cli.config {
                        Some(path) => path,
                        None => find_project_root()?.join(DEFAULT_CONFIG_PATH),
                    };
                    Config::load(&config_path)?.tag
                }
            };
            let index = scan_comments(&root, &extensions, &TagParser::new(tag)).await?;
            eprintln!(
                "{} Found {} tagged comments",
                "->".blue().bold(),
                index.len().to_string().green()
            );
            print!("{}", render_comments(&index, format)?);
            Ok(())
        }
    }
}
