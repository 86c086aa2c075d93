//! Checking mode: prove that an unfiltered export/import round trip leaves
//! the history's meaningful content alone.
//!
//! A normalized log is captured before and after a pipeline run with an empty
//! filter. It records, per commit, the changed paths with their line counts,
//! author and committer with timestamps, the ref the commit was reached from,
//! and the full message. Object hashes are deliberately absent: they may
//! legitimately change when git re-serializes old objects.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use purge_stream::{PathFilterSet, PurgeError};

use crate::git::Git;
use crate::options::{ExportMode, ExportOptions};
use crate::pipeline::{PipelineOutcome, run_pipeline};

/// `git log` arguments producing the hash-free normalized history.
pub const NORMALIZED_LOG_ARGS: &[&str] = &[
    "-c",
    "core.quotepath=off",
    "log",
    "--all",
    "--source",
    "--numstat",
    "--no-renames",
    "--date=raw",
    "--format=tformat:--%nauthor %an <%ae> %ad%ncommitter %cn <%ce> %cd%nref %S%n%B",
];

/// Capture the normalized log of every commit reachable from any ref.
///
/// # Errors
///
/// Fails if `git log` cannot be run or exits non-zero. An empty repository
/// (no commits yet) yields an empty log rather than an error.
pub fn capture_normalized_log(git: &Git) -> anyhow::Result<Vec<u8>> {
    let has_refs = !git
        .output(&["for-each-ref", "--count=1", "--format=%(refname)"])?
        .is_empty();
    if !has_refs {
        return Ok(Vec::new());
    }
    git.output(NORMALIZED_LOG_ARGS)
        .context("failed to capture normalized history log")
}

/// The first line where two captures disagree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineDiff {
    /// 1-based line number.
    pub line: usize,
    pub before: Option<String>,
    pub after: Option<String>,
}

/// Pre- and post-run captures and whether they agree.
#[derive(Debug, Clone)]
pub struct VerificationReport {
    before: Vec<u8>,
    after: Vec<u8>,
    mode: ExportMode,
}

impl VerificationReport {
    pub const fn new(before: Vec<u8>, after: Vec<u8>, mode: ExportMode) -> Self {
        Self {
            before,
            after,
            mode,
        }
    }

    pub fn is_match(&self) -> bool {
        self.before == self.after
    }

    pub const fn mode(&self) -> ExportMode {
        self.mode
    }

    /// Locate the first differing line, if any.
    pub fn first_difference(&self) -> Option<LineDiff> {
        if self.is_match() {
            return None;
        }
        let mut before = self.before.split(|&b| b == b'\n');
        let mut after = self.after.split(|&b| b == b'\n');
        let mut line = 0;
        loop {
            line += 1;
            let (b, a) = (before.next(), after.next());
            if b != a {
                let text = |s: &[u8]| String::from_utf8_lossy(s).into_owned();
                return Some(LineDiff {
                    line,
                    before: b.map(text),
                    after: a.map(text),
                });
            }
            if b.is_none() {
                return None;
            }
        }
    }

    /// Write both captures into `dir` as `before.log` and `after.log`.
    ///
    /// # Errors
    ///
    /// Propagates filesystem errors.
    pub fn persist(&self, dir: &Path) -> std::io::Result<(PathBuf, PathBuf)> {
        let before = dir.join("before.log");
        let after = dir.join("after.log");
        fs::write(&before, &self.before)?;
        fs::write(&after, &self.after)?;
        Ok((before, after))
    }
}

/// Result of a passing check.
#[derive(Debug, Clone)]
pub struct CheckOutcome {
    pub pipeline: PipelineOutcome,
    /// Where the logs were kept, when requested.
    pub logs: Option<(PathBuf, PathBuf)>,
}

/// Run checking mode against the repository `git` points at.
///
/// This rewrites the repository (with nothing filtered), so it must only be
/// pointed at a disposable clone.
///
/// # Errors
///
/// Returns [`PurgeError::VerificationMismatch`] (wrapped in `anyhow`) when the
/// logs differ; the two captures are left in a temporary directory. Any
/// pipeline or log capture failure is propagated as is.
pub fn run_check(
    git: &Git,
    options: &ExportOptions,
    keep_logs: bool,
) -> anyhow::Result<CheckOutcome> {
    let before = capture_normalized_log(git)?;
    tracing::debug!(bytes = before.len(), "captured history before round trip");

    let pipeline = run_pipeline(git, options, &PathFilterSet::empty())?;

    let after = capture_normalized_log(git)?;
    tracing::debug!(bytes = after.len(), "captured history after round trip");

    let report = VerificationReport::new(before, after, options.mode());
    if report.is_match() {
        let logs = if keep_logs {
            Some(persist_to_temp(&report)?)
        } else {
            None
        };
        return Ok(CheckOutcome { pipeline, logs });
    }

    if let Some(diff) = report.first_difference() {
        tracing::error!(
            line = diff.line,
            before = diff.before.as_deref().unwrap_or("<end of log>"),
            after = diff.after.as_deref().unwrap_or("<end of log>"),
            "first difference in normalized history"
        );
    }
    let (before, after) = persist_to_temp(&report)?;
    Err(PurgeError::VerificationMismatch {
        before,
        after,
        diff_mode: report.mode() == ExportMode::Diff,
    }
    .into())
}

fn persist_to_temp(report: &VerificationReport) -> anyhow::Result<(PathBuf, PathBuf)> {
    let dir = tempfile::Builder::new()
        .prefix("git-purge-check-")
        .tempdir()
        .context("failed to create directory for verification logs")?
        .keep();
    report
        .persist(&dir)
        .with_context(|| format!("failed to write verification logs to {}", dir.display()))
}
