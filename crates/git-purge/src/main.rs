use std::path::PathBuf;

use clap::Parser;

use git_purge::config::{Overrides, Settings};
use git_purge::git::Git;
use git_purge::options::{ExportMode, ExportOptions};
use git_purge::output::{self, RunReport};
use git_purge::pipeline;
use git_purge::stream::PathFilterSet;
use git_purge::{logging, verify};

#[derive(Parser)]
#[command(
    name = "git-purge",
    version,
    about = "Remove files from the entire history of a git repository",
    long_about = "Remove files from the entire history of a git repository.\n\n\
        Every PATTERN is a regular expression matched against each file path with a \
        leading '/' prepended, so '/secret.key$' names the top-level file only, \
        '^/vendor/' a top-level directory, and '\\.bin$' any .bin file anywhere.\n\n\
        The repository is rewritten in place. Run it on a fresh clone."
)]
#[allow(clippy::struct_excessive_bools)] // CLI flags are naturally booleans
struct Cli {
    /// Path regular expressions to purge
    patterns: Vec<String>,

    /// Check that an unfiltered export/import round trip preserves history
    #[arg(short, long)]
    check: bool,

    /// Export only per-commit differences (quicker, less robust)
    #[arg(short, long)]
    diff: bool,

    /// Repository to operate on (default: current directory)
    #[arg(short = 'C', long, value_name = "DIR")]
    repo: Option<PathBuf>,

    /// Read additional patterns from a file, one per line
    #[arg(short = 'f', long, value_name = "FILE")]
    patterns_from: Option<PathBuf>,

    /// Objects between progress reports from the exporter
    #[arg(long, value_name = "N", env = "GIT_PURGE_PROGRESS")]
    progress: Option<u32>,

    /// Git executable to use
    #[arg(long, value_name = "PATH", env = "GIT_PURGE_GIT")]
    git: Option<PathBuf>,

    /// Print stream statistics after the run
    #[arg(long)]
    stats: bool,

    /// Print a JSON run report on stdout
    #[arg(long)]
    json: bool,

    /// Keep the checking-mode logs even when the check passes
    #[arg(long, requires = "check")]
    keep_logs: bool,

    /// More diagnostics (repeat for more)
    #[arg(short, long, action = clap::ArgAction::Count, conflicts_with = "quiet")]
    verbose: u8,

    /// Only report warnings and errors
    #[arg(short, long)]
    quiet: bool,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            patterns: self.patterns.clone(),
            patterns_from: self.patterns_from.clone(),
            repo: self.repo.clone(),
            git: self.git.clone(),
            progress: self.progress,
            mode: if self.diff {
                ExportMode::Diff
            } else {
                ExportMode::FullTree
            },
            check: self.check,
        }
    }
}

const fn mode_name(mode: ExportMode) -> &'static str {
    match mode {
        ExportMode::FullTree => "full-tree",
        ExportMode::Diff => "diff",
    }
}

fn export_options(git: &Git, settings: &Settings) -> anyhow::Result<ExportOptions> {
    if !git.is_repository() {
        anyhow::bail!("{} is not a git repository", settings.repo.display());
    }
    let version = git.version()?;
    tracing::debug!(%version, "detected git");
    let options = ExportOptions::new(version, settings.mode, settings.progress);
    tracing::debug!(args = ?options.args(), "export options");
    Ok(options)
}

fn cmd_purge(cli: &Cli, settings: &Settings, git: &Git) -> anyhow::Result<i32> {
    // Build the filter before anything is spawned: a bad pattern must never
    // leave a half-started rewrite behind.
    let filter = PathFilterSet::new(settings.patterns.iter().cloned())?;
    let options = export_options(git, settings)?;

    tracing::info!(
        patterns = filter.patterns().len(),
        mode = mode_name(settings.mode),
        "rewriting history of {}",
        settings.repo.display()
    );
    let outcome = pipeline::run_pipeline(git, &options, &filter)?;
    tracing::info!(
        dropped = outcome.stats.dropped,
        "removed {} file records from history",
        outcome.stats.dropped
    );

    output::print_elapsed(outcome.elapsed);
    if cli.stats {
        output::print_stats(&outcome.stats);
    }
    if cli.json {
        output::print_json(&RunReport {
            mode: "purge",
            patterns: filter.patterns(),
            elapsed_ms: outcome.elapsed.as_millis(),
            stats: outcome.stats,
        });
    }
    Ok(0)
}

fn cmd_check(cli: &Cli, settings: &Settings, git: &Git) -> anyhow::Result<i32> {
    if !settings.patterns.is_empty() {
        tracing::warn!("patterns are ignored in checking mode");
    }
    let options = export_options(git, settings)?;
    tracing::info!(
        mode = mode_name(settings.mode),
        "checking export/import round trip of {}",
        settings.repo.display()
    );
    let outcome = verify::run_check(git, &options, cli.keep_logs)?;

    eprintln!("[git-purge] check passed: round trip leaves history unchanged");
    output::print_elapsed(outcome.pipeline.elapsed);
    if let Some((before, after)) = &outcome.logs {
        eprintln!("[git-purge] logs kept: {} {}", before.display(), after.display());
    }
    if cli.stats {
        output::print_stats(&outcome.pipeline.stats);
    }
    if cli.json {
        output::print_json(&RunReport {
            mode: "check",
            patterns: &[],
            elapsed_ms: outcome.pipeline.elapsed.as_millis(),
            stats: outcome.pipeline.stats,
        });
    }
    Ok(0)
}

fn run(cli: &Cli) -> anyhow::Result<i32> {
    let settings = Settings::load(cli.overrides())?;
    let git = Git::new(&settings.git, &settings.repo);

    if settings.check {
        return cmd_check(cli, &settings, &git);
    }
    if settings.patterns.is_empty() {
        tracing::warn!("no patterns given; nothing to purge");
        return Ok(0);
    }
    cmd_purge(cli, &settings, &git)
}

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.quiet);

    let code = match run(&cli) {
        Ok(code) => code,
        Err(e) => {
            output::print_error(&e);
            output::exit_code_for(&e)
        }
    };
    std::process::exit(code);
}
