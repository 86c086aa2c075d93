//! Tokenizer for `git fast-export` streams.
//!
//! The stream is line oriented except for `data <N>` blocks, whose payload is
//! exactly `N` raw bytes and may contain anything, including newlines and
//! text that looks like other commands. The reader therefore has two read
//! primitives: one line at a time for headers, and an exact byte count for
//! payloads.
//!
//! ```text
//! commit refs/heads/main          -> Opaque
//! mark :3                         -> Opaque
//! data 14                         -> DataBlock (header + next 14 bytes)
//! M 100644 <40 hex> docs/a.txt    -> FileChange
//! D old.bin                       -> Opaque (deletions are never filtered)
//! ```

use std::io::{self, BufRead, Read, Write};

use crate::error::PurgeError;

/// How a single header line (without its trailing newline) is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind<'a> {
    /// `data <N>`: the next `N` bytes are an opaque payload.
    Data(u64),
    /// `M <mode> <ref> <path>`
    FileModify {
        mode: &'a [u8],
        blob_ref: &'a [u8],
        path: &'a [u8],
    },
    /// Anything else, forwarded untouched.
    Other,
}

/// Classify one header line. `line` must not include the trailing newline.
pub fn classify(line: &[u8]) -> LineKind<'_> {
    if let Some(len) = parse_data_header(line) {
        return LineKind::Data(len);
    }
    parse_file_modify(line).unwrap_or(LineKind::Other)
}

fn parse_data_header(line: &[u8]) -> Option<u64> {
    let digits = line.strip_prefix(b"data ")?;
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    std::str::from_utf8(digits).ok()?.parse().ok()
}

fn parse_file_modify(line: &[u8]) -> Option<LineKind<'_>> {
    let rest = line.strip_prefix(b"M ")?;
    let (mode, rest) = split_field(rest)?;
    if mode.len() != 6 || !mode.iter().all(u8::is_ascii_digit) {
        return None;
    }
    let (blob_ref, path) = split_field(rest)?;
    if !is_object_ref(blob_ref) || path.is_empty() {
        return None;
    }
    Some(LineKind::FileModify {
        mode,
        blob_ref,
        path,
    })
}

fn split_field(bytes: &[u8]) -> Option<(&[u8], &[u8])> {
    let pos = bytes.iter().position(|&b| b == b' ')?;
    Some((&bytes[..pos], &bytes[pos + 1..]))
}

/// Lowercase SHA-1 or SHA-256 hex object names, or `:<mark>` references.
fn is_object_ref(r: &[u8]) -> bool {
    if let Some(mark) = r.strip_prefix(b":") {
        return !mark.is_empty() && mark.iter().all(u8::is_ascii_digit);
    }
    matches!(r.len(), 40 | 64) && r.iter().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

/// A file-modify record, kept verbatim for forwarding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    raw: Vec<u8>,
    mode: String,
    blob_ref: String,
    path: Vec<u8>,
}

impl FileChange {
    pub fn mode(&self) -> &str {
        &self.mode
    }

    pub fn blob_ref(&self) -> &str {
        &self.blob_ref
    }

    /// The path exactly as it appears in the stream (possibly C-quoted).
    pub fn path(&self) -> &[u8] {
        &self.path
    }

    /// The path to match filters against: unquoted when the stream quoted it.
    pub fn match_path(&self) -> Vec<u8> {
        unquote_c_style(&self.path).unwrap_or_else(|| self.path.clone())
    }

    /// The full original line, including its newline.
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }
}

/// One record of the export stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamToken {
    /// Any line not specially interpreted, newline included.
    Opaque(Vec<u8>),
    /// A `data <N>` header line and exactly `N` payload bytes. Always emitted
    /// as one unit.
    DataBlock { header: Vec<u8>, payload: Vec<u8> },
    FileChange(FileChange),
}

impl StreamToken {
    /// Write the token back out byte-for-byte.
    ///
    /// # Errors
    ///
    /// Propagates any write failure from `out`.
    pub fn write_to<W: Write + ?Sized>(&self, out: &mut W) -> io::Result<()> {
        match self {
            Self::Opaque(line) => out.write_all(line),
            Self::DataBlock { header, payload } => {
                out.write_all(header)?;
                out.write_all(payload)
            }
            Self::FileChange(change) => out.write_all(&change.raw),
        }
    }

    /// Number of bytes `write_to` emits.
    pub fn encoded_len(&self) -> usize {
        match self {
            Self::Opaque(line) => line.len(),
            Self::DataBlock { header, payload } => header.len() + payload.len(),
            Self::FileChange(change) => change.raw.len(),
        }
    }
}

/// Pulls [`StreamToken`]s off a buffered byte source.
///
/// Holds at most one token (and its payload) in memory at a time.
pub struct TokenReader<R> {
    inner: R,
    bytes_read: u64,
}

impl<R: BufRead> TokenReader<R> {
    pub const fn new(inner: R) -> Self {
        Self {
            inner,
            bytes_read: 0,
        }
    }

    /// Total bytes consumed from the source so far.
    pub const fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Read the next token, or `None` at end of stream.
    ///
    /// # Errors
    ///
    /// Returns [`PurgeError::StreamFraming`] when a data block is cut short,
    /// and [`PurgeError::Io`] for read failures.
    pub fn next_token(&mut self) -> Result<Option<StreamToken>, PurgeError> {
        let mut line = Vec::new();
        let n = self.inner.read_until(b'\n', &mut line)?;
        if n == 0 {
            return Ok(None);
        }
        self.bytes_read += n as u64;

        let terminated = line.last() == Some(&b'\n');
        let body = if terminated {
            &line[..line.len() - 1]
        } else {
            &line[..]
        };

        let token = match classify(body) {
            LineKind::Data(declared) => {
                if !terminated {
                    return Err(PurgeError::StreamFraming {
                        declared,
                        received: 0,
                    });
                }
                let payload = self.read_payload(declared)?;
                StreamToken::DataBlock {
                    header: line,
                    payload,
                }
            }
            LineKind::FileModify {
                mode,
                blob_ref,
                path,
            } => {
                let mode = String::from_utf8_lossy(mode).into_owned();
                let blob_ref = String::from_utf8_lossy(blob_ref).into_owned();
                let path = path.to_vec();
                StreamToken::FileChange(FileChange {
                    raw: line,
                    mode,
                    blob_ref,
                    path,
                })
            }
            LineKind::Other => StreamToken::Opaque(line),
        };
        Ok(Some(token))
    }

    fn read_payload(&mut self, declared: u64) -> Result<Vec<u8>, PurgeError> {
        // Cap the up-front reservation; the declared size is untrusted.
        let capacity = usize::try_from(declared.min(1 << 20)).unwrap_or(0);
        let mut payload = Vec::with_capacity(capacity);
        let received = (&mut self.inner).take(declared).read_to_end(&mut payload)? as u64;
        self.bytes_read += received;
        if received < declared {
            return Err(PurgeError::StreamFraming { declared, received });
        }
        Ok(payload)
    }
}

impl<R: BufRead> Iterator for TokenReader<R> {
    type Item = Result<StreamToken, PurgeError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_token().transpose()
    }
}

/// Decode a C-style quoted path as written by git (`"dir/a\tb"`).
///
/// Returns `None` when `raw` is not a quoted string or the escapes are malformed.
pub fn unquote_c_style(raw: &[u8]) -> Option<Vec<u8>> {
    let inner = raw.strip_prefix(b"\"")?.strip_suffix(b"\"")?;
    let mut out = Vec::with_capacity(inner.len());
    let mut bytes = inner.iter().copied();
    while let Some(b) = bytes.next() {
        if b != b'\\' {
            out.push(b);
            continue;
        }
        let decoded = match bytes.next()? {
            b'a' => 0x07,
            b'b' => 0x08,
            b'f' => 0x0c,
            b'n' => b'\n',
            b'r' => b'\r',
            b't' => b'\t',
            b'v' => 0x0b,
            b'\\' => b'\\',
            b'"' => b'"',
            d @ b'0'..=b'3' => {
                let d2 = bytes.next().filter(|c| (b'0'..=b'7').contains(c))?;
                let d3 = bytes.next().filter(|c| (b'0'..=b'7').contains(c))?;
                ((d - b'0') << 6) | ((d2 - b'0') << 3) | (d3 - b'0')
            }
            _ => return None,
        };
        out.push(decoded);
    }
    Some(out)
}
