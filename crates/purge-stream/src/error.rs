use std::fmt;
use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;

/// Which of the two git processes an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Export,
    Import,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Export => f.write_str("export"),
            Self::Import => f.write_str("import"),
        }
    }
}

/// Every way a purge run can fail. Nothing is retried.
#[derive(Debug, thiserror::Error)]
pub enum PurgeError {
    #[error("invalid path pattern {pattern:?}: {source}")]
    Config {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("failed to start git {side}: {source}")]
    SubprocessSpawn {
        side: Side,
        #[source]
        source: io::Error,
    },

    #[error("git {side} failed ({status})")]
    SubprocessExit { side: Side, status: ExitStatus },

    #[error("truncated data block: header declared {declared} bytes but only {received} followed")]
    StreamFraming { declared: u64, received: u64 },

    #[error(
        "history differs after the export/import round trip; compare {} and {}",
        before.display(),
        after.display()
    )]
    VerificationMismatch {
        before: PathBuf,
        after: PathBuf,
        diff_mode: bool,
    },

    #[error("stream I/O failed: {0}")]
    Io(#[from] io::Error),
}

impl PurgeError {
    /// Process exit status for this error kind.
    ///
    /// ```text
    /// 1  verification mismatch, plain I/O failure
    /// 2  invalid path pattern
    /// 3  git export/import could not be started
    /// 4  git export/import exited non-zero
    /// 5  malformed export stream
    /// ```
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::VerificationMismatch { .. } | Self::Io(_) => 1,
            Self::Config { .. } => 2,
            Self::SubprocessSpawn { .. } => 3,
            Self::SubprocessExit { .. } => 4,
            Self::StreamFraming { .. } => 5,
        }
    }

    /// The process the error originated from, if any.
    pub const fn side(&self) -> Option<Side> {
        match self {
            Self::SubprocessSpawn { side, .. } | Self::SubprocessExit { side, .. } => Some(*side),
            _ => None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_are_distinct_per_kind() {
        let config = PurgeError::Config {
            pattern: "(".to_string(),
            source: regex::Regex::new("(").unwrap_err(),
        };
        let spawn = PurgeError::SubprocessSpawn {
            side: Side::Import,
            source: io::Error::new(io::ErrorKind::NotFound, "git"),
        };
        let framing = PurgeError::StreamFraming {
            declared: 10,
            received: 3,
        };
        let codes = [config.exit_code(), spawn.exit_code(), framing.exit_code()];
        assert_eq!(codes, [2, 3, 5]);
    }

    #[test]
    fn spawn_error_names_the_side() {
        let err = PurgeError::SubprocessSpawn {
            side: Side::Export,
            source: io::Error::new(io::ErrorKind::NotFound, "no such file"),
        };
        assert_eq!(err.side(), Some(Side::Export));
        assert!(err.to_string().contains("git export"), "{err}");
    }

    #[test]
    fn framing_message_reports_byte_counts() {
        let err = PurgeError::StreamFraming {
            declared: 42,
            received: 7,
        };
        let msg = err.to_string();
        assert!(msg.contains("42") && msg.contains('7'), "{msg}");
        assert_eq!(err.side(), None);
    }
}
