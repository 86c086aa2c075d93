//! Streaming engine behind `git-purge`.
//!
//! Reads a `git fast-export` stream, drops `M` records whose path matches a
//! [`PathFilterSet`], and forwards everything else byte-for-byte. Process
//! management lives in the `git-purge` crate; this crate only sees bytes.

pub mod error;
pub mod path_filter;
pub mod rewrite;
pub mod token;

pub use error::{PurgeError, Side};
pub use path_filter::PathFilterSet;
pub use rewrite::{Decision, RewriteStats, decide, rewrite_stream};
pub use token::{FileChange, LineKind, StreamToken, TokenReader, classify};
