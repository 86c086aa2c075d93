//! User-facing summaries on stderr, and the JSON report on stdout.

use std::time::Duration;

use purge_stream::{PurgeError, RewriteStats};
use serde::Serialize;

/// Exit status for a failed run: the [`PurgeError`] kind when there is one.
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    err.downcast_ref::<PurgeError>()
        .map_or(1, PurgeError::exit_code)
}

/// Machine-readable summary printed by `--json`.
#[derive(Debug, Serialize)]
pub struct RunReport<'a> {
    pub mode: &'static str,
    pub patterns: &'a [String],
    pub elapsed_ms: u128,
    pub stats: RewriteStats,
}

/// Print a Serialize value as pretty JSON, logging errors to stderr.
pub fn print_json(value: &(impl Serialize + ?Sized)) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("[git-purge] JSON serialization error: {e}"),
    }
}

pub fn print_elapsed(elapsed: Duration) {
    eprintln!("[git-purge] rewrite took {:.1}s", elapsed.as_secs_f64());
}

pub fn print_stats(stats: &RewriteStats) {
    eprintln!(
        "[git-purge] {} file changes seen, {} dropped; \
         {} data blocks ({} bytes); {} bytes in, {} bytes out",
        stats.file_changes,
        stats.dropped,
        stats.data_blocks,
        stats.data_bytes,
        stats.bytes_read,
        stats.bytes_written
    );
}

/// Describe a failure, naming the side that failed and any follow-up hint.
pub fn print_error(err: &anyhow::Error) {
    eprintln!("[git-purge] error: {err:#}");
    if let Some(PurgeError::VerificationMismatch {
        before,
        after,
        diff_mode,
    }) = err.downcast_ref::<PurgeError>()
    {
        eprintln!("[git-purge] before: {}", before.display());
        eprintln!("[git-purge] after:  {}", after.display());
        if *diff_mode {
            eprintln!("[git-purge] hint: the check ran with --diff; try again without it");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn exit_code_follows_error_kind() {
        let err: anyhow::Error = PurgeError::StreamFraming {
            declared: 1,
            received: 0,
        }
        .into();
        assert_eq!(exit_code_for(&err), 5);
    }

    #[test]
    fn exit_code_survives_context() {
        let err = anyhow::Error::from(PurgeError::VerificationMismatch {
            before: PathBuf::from("/tmp/b"),
            after: PathBuf::from("/tmp/a"),
            diff_mode: false,
        })
        .context("checking mode");
        assert_eq!(exit_code_for(&err), 1);
    }

    #[test]
    fn other_errors_exit_with_one() {
        assert_eq!(exit_code_for(&anyhow::anyhow!("boom")), 1);
    }

    #[test]
    fn report_serializes_stats() {
        let patterns = vec![r"\.bin$".to_string()];
        let report = RunReport {
            mode: "purge",
            patterns: &patterns,
            elapsed_ms: 12,
            stats: RewriteStats {
                dropped: 3,
                ..RewriteStats::default()
            },
        };
        let json: serde_json::Value = serde_json::to_value(&report).unwrap();
        assert_eq!(json["stats"]["dropped"], 3);
        assert_eq!(json["patterns"][0], r"\.bin$");
    }
}
