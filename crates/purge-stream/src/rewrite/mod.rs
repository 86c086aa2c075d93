//! The read → decide → write loop.
//!
//! Each token is classified by the reader, given a forwarding [`Decision`],
//! and written out immediately. Nothing is queued: a slow importer blocks the
//! write, which stops further reads, so back-pressure comes from the pipes.

use std::io::{BufRead, Write};

use serde::Serialize;

use crate::error::PurgeError;
use crate::path_filter::PathFilterSet;
use crate::token::{StreamToken, TokenReader};

/// What to do with one token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Forward,
    Drop,
}

/// Forwarding policy. Only `M` records whose path matches are dropped; data
/// blocks, deletions and every other line always pass through.
pub fn decide(token: &StreamToken, filter: &PathFilterSet) -> Decision {
    match token {
        StreamToken::FileChange(change) if filter.matches(&change.match_path()) => Decision::Drop,
        _ => Decision::Forward,
    }
}

/// Counters collected while rewriting one stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RewriteStats {
    pub tokens: u64,
    pub opaque_lines: u64,
    pub data_blocks: u64,
    pub data_bytes: u64,
    pub file_changes: u64,
    pub dropped: u64,
    pub bytes_read: u64,
    pub bytes_written: u64,
}

impl RewriteStats {
    fn record(&mut self, token: &StreamToken, decision: Decision) {
        self.tokens += 1;
        match token {
            StreamToken::Opaque(_) => self.opaque_lines += 1,
            StreamToken::DataBlock { payload, .. } => {
                self.data_blocks += 1;
                self.data_bytes += payload.len() as u64;
            }
            StreamToken::FileChange(_) => self.file_changes += 1,
        }
        match decision {
            Decision::Forward => self.bytes_written += token.encoded_len() as u64,
            Decision::Drop => self.dropped += 1,
        }
    }
}

/// Copy an export stream from `input` to `output`, dropping file-change
/// records whose path `filter` matches. Retained tokens keep their order and
/// their exact bytes. `output` is flushed before returning.
///
/// # Errors
///
/// Stops at the first framing or I/O error; whatever was written before it
/// has already reached `output`.
pub fn rewrite_stream<R, W>(
    input: R,
    output: &mut W,
    filter: &PathFilterSet,
) -> Result<RewriteStats, PurgeError>
where
    R: BufRead,
    W: Write + ?Sized,
{
    let mut reader = TokenReader::new(input);
    let mut stats = RewriteStats::default();

    while let Some(token) = reader.next_token()? {
        let decision = decide(&token, filter);
        match (&token, decision) {
            (_, Decision::Forward) => token.write_to(output)?,
            (StreamToken::FileChange(change), Decision::Drop) => {
                tracing::trace!(
                    path = %String::from_utf8_lossy(change.path()),
                    "dropping file change"
                );
            }
            (_, Decision::Drop) => {}
        }
        stats.record(&token, decision);
    }

    output.flush()?;
    stats.bytes_read = reader.bytes_read();
    Ok(stats)
}
