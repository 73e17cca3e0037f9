//! MultiSCM CLI
//!
//! Inspects merged change-logs and lints composite configurations.
//!
//! Usage:
//!   multiscm changelog split <file> [--out-dir DIR] [--json]
//!   multiscm changelog keys <file>
//!   multiscm config lint <file> [--kind git --kind hg]

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn, Level};

use multiscm_core::changelog::{self, ParsedChangelog};
use multiscm_core::{CompositeConfig, SourceFactory};

#[derive(Parser)]
#[command(name = "multiscm")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Composite source control for CI builds", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect a merged change-log
    Changelog {
        #[command(subcommand)]
        action: ChangelogAction,
    },

    /// Work with composite configuration files
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ChangelogAction {
    /// Split a merged change-log into one file per source
    Split {
        /// Merged change-log document
        file: PathBuf,

        /// Directory to write `<key>.log` files into (print only if omitted)
        #[arg(short, long)]
        out_dir: Option<PathBuf>,

        /// Print the sections as JSON
        #[arg(long = "as-json")]
        as_json: bool,
    },

    /// List the source keys present in a merged change-log
    Keys {
        /// Merged change-log document
        file: PathBuf,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Check a composite configuration (.json or .toml)
    Lint {
        /// Configuration file
        file: PathBuf,

        /// Source kinds available to the composite (repeatable)
        #[arg(short, long = "kind")]
        kinds: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    multiscm_core::init_tracing(cli.json, level);

    match cli.command {
        Commands::Changelog { action } => match action {
            ChangelogAction::Split {
                file,
                out_dir,
                as_json,
            } => cmd_changelog_split(&file, out_dir.as_deref(), as_json).await,
            ChangelogAction::Keys { file } => cmd_changelog_keys(&file).await,
        },
        Commands::Config { action } => match action {
            ConfigAction::Lint { file, kinds } => cmd_config_lint(&file, &kinds),
        },
    }
}

async fn read_changelog(path: &Path) -> Result<ParsedChangelog> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read change-log: {:?}", path))?;
    let parsed = changelog::parse(&String::from_utf8_lossy(&bytes));
    if !parsed.complete {
        warn!(path = ?path, "change-log has no closing tag; the checkout that wrote it may have failed");
    }
    Ok(parsed)
}

#[derive(Debug, Serialize)]
struct SplitSummary {
    complete: bool,
    written: Vec<PathBuf>,
}

async fn cmd_changelog_split(file: &Path, out_dir: Option<&Path>, as_json: bool) -> Result<()> {
    let parsed = read_changelog(file).await?;

    let Some(out_dir) = out_dir else {
        if as_json {
            println!("{}", serde_json::to_string_pretty(&parsed)?);
        } else {
            for section in &parsed.sections {
                println!("== {} ==", section.key);
                println!("{}", section.text);
            }
        }
        return Ok(());
    };

    let written = write_sections(&parsed, out_dir).await?;
    info!(sections = written.len(), out_dir = ?out_dir, "split change-log");

    if as_json {
        let summary = SplitSummary {
            complete: parsed.complete,
            written,
        };
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        for path in &written {
            println!("{}", path.display());
        }
    }
    Ok(())
}

/// Write every section to `<out_dir>/<key>.log`. Repeated keys get a numeric
/// suffix so no section overwrites another.
async fn write_sections(parsed: &ParsedChangelog, out_dir: &Path) -> Result<Vec<PathBuf>> {
    tokio::fs::create_dir_all(out_dir)
        .await
        .with_context(|| format!("Failed to create output directory: {:?}", out_dir))?;

    let mut written: Vec<PathBuf> = Vec::with_capacity(parsed.sections.len());
    for section in &parsed.sections {
        let stem = file_stem_for(section.key.as_str());
        let mut path = out_dir.join(format!("{stem}.log"));
        let mut n = 1;
        while written.contains(&path) {
            path = out_dir.join(format!("{stem}_{n}.log"));
            n += 1;
        }
        tokio::fs::write(&path, &section.text)
            .await
            .with_context(|| format!("Failed to write section file: {:?}", path))?;
        written.push(path);
    }
    Ok(written)
}

/// Keys carry URLs and branch names; keep only filename-safe characters.
fn file_stem_for(key: &str) -> String {
    let stem: String = key
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let stem = stem.trim_matches('.');
    if stem.is_empty() {
        "source".to_string()
    } else {
        stem.to_string()
    }
}

async fn cmd_changelog_keys(file: &Path) -> Result<()> {
    let parsed = read_changelog(file).await?;
    for key in parsed.keys() {
        println!("{key}");
    }
    Ok(())
}

fn cmd_config_lint(file: &Path, kinds: &[String]) -> Result<()> {
    let config = CompositeConfig::from_path(file)
        .with_context(|| format!("Failed to load configuration: {:?}", file))?;

    if kinds.is_empty() {
        config.lint()?;
    } else {
        lint_factory(kinds)?.validate(&config)?;
    }

    println!("✓ {} ({} sources)", file.display(), config.children.len());
    for (index, child) in config.children.iter().enumerate() {
        println!("  [{index}] {}", child.kind);
    }
    Ok(())
}

/// Factory that knows the kind names but never constructs anything; enough
/// for `validate`, which checks kinds without building sources.
fn lint_factory(kinds: &[String]) -> Result<SourceFactory> {
    let mut factory = SourceFactory::new();
    for kind in kinds {
        factory.register(kind.as_str(), |_| {
            Err("source construction is not available from the CLI".into())
        })?;
    }
    Ok(factory)
}
