//! One export → filter → import run.
//!
//! ```text
//! Idle ──spawn──▶ Running ──export EOF──▶ Draining ──both exit 0──▶ Completed
//!   │                │                        │
//!   └────────────────┴────────────────────────┴──any failure──▶ Failed
//! ```
//!
//! Both git processes run concurrently with the filter loop. The loop itself
//! is single threaded: it reads one token from the exporter's stdout and
//! writes it to the importer's stdin before reading the next, so pipe
//! buffers provide all the back-pressure. Children are always reaped, on
//! success and on every error path (see the `Drop` impl).
//!
//! When several things go wrong at once, the one closest to the cause is
//! reported: a failed exporter first, then a malformed stream, then a failed
//! importer, then any other stream error.

use std::io::{BufReader, BufWriter};
use std::process::{Child, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use purge_stream::{PathFilterSet, PurgeError, RewriteStats, Side, rewrite_stream};

use crate::git::Git;
use crate::options::{ExportOptions, IMPORT_ARGS};

const PIPE_BUFFER: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Running,
    Draining,
    Completed,
    Failed,
}

/// What a successful run produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineOutcome {
    pub stats: RewriteStats,
    /// Wall-clock time from spawning the exporter until both processes exited.
    pub elapsed: Duration,
}

/// Live state of one run. Owns both child processes exclusively.
pub struct PipelineRun<'a> {
    git: &'a Git,
    options: &'a ExportOptions,
    export: Option<Child>,
    import: Option<Child>,
    started: Option<Instant>,
    state: PipelineState,
}

impl<'a> PipelineRun<'a> {
    pub const fn new(git: &'a Git, options: &'a ExportOptions) -> Self {
        Self {
            git,
            options,
            export: None,
            import: None,
            started: None,
            state: PipelineState::Idle,
        }
    }

    pub const fn state(&self) -> PipelineState {
        self.state
    }

    /// Drive the run to a terminal state. A run executes once; afterwards
    /// [`state`](Self::state) reports `Completed` or `Failed`.
    ///
    /// # Errors
    ///
    /// Any spawn failure, non-zero exit, framing or I/O error. Nothing is
    /// retried; the repository may be half rewritten when this fails.
    pub fn execute(&mut self, filter: &PathFilterSet) -> Result<PipelineOutcome, PurgeError> {
        if self.state != PipelineState::Idle {
            return Err(PurgeError::Io(std::io::Error::other(format!(
                "pipeline already ran (state {:?})",
                self.state
            ))));
        }
        let result = self.spawn().and_then(|()| {
            let streamed = self.stream(filter);
            self.finish(streamed)
        });
        self.transition(if result.is_ok() {
            PipelineState::Completed
        } else {
            PipelineState::Failed
        });
        result
    }

    fn transition(&mut self, next: PipelineState) {
        tracing::debug!(from = ?self.state, to = ?next, "pipeline state");
        self.state = next;
    }

    fn spawn(&mut self) -> Result<(), PurgeError> {
        tracing::debug!(args = ?self.options.args(), "spawning git export");
        self.started = Some(Instant::now());
        let export = self
            .git
            .command(self.options.args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .spawn()
            .map_err(|source| PurgeError::SubprocessSpawn {
                side: Side::Export,
                source,
            })?;
        self.export = Some(export);

        tracing::debug!(args = ?IMPORT_ARGS, "spawning git import");
        let import = self
            .git
            .command(IMPORT_ARGS)
            .stdin(Stdio::piped())
            // progress lines from the importer go to our stderr; stdout is for reports
            .stdout(Stdio::from(std::io::stderr()))
            .spawn()
            .map_err(|source| PurgeError::SubprocessSpawn {
                side: Side::Import,
                source,
            })?;
        self.import = Some(import);

        self.transition(PipelineState::Running);
        Ok(())
    }

    fn stream(&mut self, filter: &PathFilterSet) -> Result<RewriteStats, PurgeError> {
        let stdout = self
            .export
            .as_mut()
            .and_then(|c| c.stdout.take())
            .ok_or_else(|| missing_pipe("export stdout"))?;
        let stdin = self
            .import
            .as_mut()
            .and_then(|c| c.stdin.take())
            .ok_or_else(|| missing_pipe("import stdin"))?;

        let reader = BufReader::with_capacity(PIPE_BUFFER, stdout);
        let mut writer = BufWriter::with_capacity(PIPE_BUFFER, stdin);
        let stats = rewrite_stream(reader, &mut writer, filter);
        // Dropping the writer closes the importer's stdin: its end-of-input.
        drop(writer);
        stats
    }

    fn finish(
        &mut self,
        streamed: Result<RewriteStats, PurgeError>,
    ) -> Result<PipelineOutcome, PurgeError> {
        self.transition(PipelineState::Draining);

        let export_status = match self.export.take() {
            Some(child) => reap_export(child, streamed.is_ok())?,
            None => None,
        };
        let import_status = match self.import.take() {
            Some(mut child) => Some(child.wait()?),
            None => None,
        };
        let elapsed = self.started.map_or(Duration::ZERO, |t| t.elapsed());

        // A dead exporter truncates the stream. A truncated stream in turn makes
        // the importer fail on the missing `done`.
        check_exit(Side::Export, export_status)?;
        let streamed = match streamed {
            Err(err @ PurgeError::StreamFraming { .. }) => return Err(err),
            other => other,
        };
        check_exit(Side::Import, import_status)?;
        let stats = streamed?;
        tracing::debug!(?elapsed, dropped = stats.dropped, "pipeline finished");
        Ok(PipelineOutcome { stats, elapsed })
    }
}

impl Drop for PipelineRun<'_> {
    fn drop(&mut self) {
        for child in [self.export.take(), self.import.take()].into_iter().flatten() {
            reap_forcefully(child);
        }
    }
}

/// Wait for the exporter. After a stream error it may be blocked on a full
/// pipe nobody reads any more, so it is killed first. A process that had
/// already exited keeps its own status; one ended by our signal reports none.
fn reap_export(mut child: Child, stream_ok: bool) -> Result<Option<ExitStatus>, PurgeError> {
    if !stream_ok {
        if let Err(e) = child.kill() {
            tracing::debug!("kill failed (process likely exited): {e}");
        }
    }
    let status = child.wait()?;
    Ok((stream_ok || status.code().is_some()).then_some(status))
}

fn reap_forcefully(mut child: Child) {
    if let Err(e) = child.kill() {
        tracing::debug!("kill failed (process likely exited): {e}");
    }
    if let Err(e) = child.wait() {
        tracing::warn!("failed to reap git process {}: {e}", child.id());
    }
}

fn check_exit(side: Side, status: Option<ExitStatus>) -> Result<(), PurgeError> {
    match status {
        Some(status) if !status.success() => Err(PurgeError::SubprocessExit { side, status }),
        _ => Ok(()),
    }
}

fn missing_pipe(which: &str) -> PurgeError {
    PurgeError::Io(std::io::Error::other(format!("{which} was not captured")))
}

/// Run the full pipeline once with the given filter.
///
/// # Errors
///
/// See [`PipelineRun::execute`].
pub fn run_pipeline(
    git: &Git,
    options: &ExportOptions,
    filter: &PathFilterSet,
) -> Result<PipelineOutcome, PurgeError> {
    PipelineRun::new(git, options).execute(filter)
}
