pub mod config;
pub mod git;
pub mod logging;
pub mod options;
pub mod output;
pub mod pipeline;
pub mod verify;

// Re-export the stream engine so the binary and tests can use one crate path.
pub use purge_stream as stream;
