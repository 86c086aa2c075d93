//! Path patterns deciding which file-change records are purged.
//!
//! Every path is matched with a single leading `/` prepended. A pattern that
//! starts with `/` is anchored at that root slash, so `/test.bin$` names the
//! top-level `test.bin` only, `^/foo/` everything under the top-level `foo`,
//! and `\.bin$` matches anywhere in the tree. The rule applies to each
//! top-level alternative on its own: `/a$|/b$` anchors both branches, while a
//! `/` inside a group such as `(/a|/b)` is left alone. Matching is byte-exact
//! and case-sensitive; no separator or Unicode normalization is performed.

use regex::bytes::Regex;

use crate::error::PurgeError;

/// The compiled, immutable set of purge patterns.
#[derive(Debug, Clone, Default)]
pub struct PathFilterSet {
    patterns: Vec<String>,
    matcher: Option<Regex>,
}

impl PathFilterSet {
    /// Compile `patterns` into a single alternation.
    ///
    /// # Errors
    ///
    /// Returns [`PurgeError::Config`] naming the first pattern that is not a
    /// valid regular expression.
    pub fn new<I, S>(patterns: I) -> Result<Self, PurgeError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let patterns: Vec<String> = patterns.into_iter().map(Into::into).collect();
        if patterns.is_empty() {
            return Ok(Self::default());
        }

        for pattern in &patterns {
            if let Err(source) = Regex::new(pattern) {
                return Err(PurgeError::Config {
                    pattern: pattern.clone(),
                    source,
                });
            }
        }

        let combined = patterns
            .iter()
            .map(|p| anchored(p))
            .collect::<Vec<_>>()
            .join("|");
        let matcher = Regex::new(&combined).map_err(|source| PurgeError::Config {
            pattern: combined.clone(),
            source,
        })?;

        Ok(Self {
            patterns,
            matcher: Some(matcher),
        })
    }

    /// A filter that matches nothing; used for pure round trips.
    pub fn empty() -> Self {
        Self::default()
    }

    pub const fn is_empty(&self) -> bool {
        self.matcher.is_none()
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// Whether the repository-relative `path` (no leading slash) is purged.
    pub fn matches(&self, path: &[u8]) -> bool {
        let Some(matcher) = &self.matcher else {
            return false;
        };
        let mut rooted = Vec::with_capacity(path.len() + 1);
        rooted.push(b'/');
        rooted.extend_from_slice(path);
        matcher.is_match(&rooted)
    }
}

/// Wrap one user pattern for the combined alternation, anchoring every
/// top-level alternative that starts with `/`.
fn anchored(pattern: &str) -> String {
    let branches: Vec<String> = top_level_alternatives(pattern)
        .into_iter()
        .map(|branch| {
            if branch.starts_with('/') {
                format!("^{branch}")
            } else {
                branch.to_string()
            }
        })
        .collect();
    format!("(?:{})", branches.join("|"))
}

/// Split a valid regex on the `|` operators outside groups and classes.
fn top_level_alternatives(pattern: &str) -> Vec<&str> {
    let bytes = pattern.as_bytes();
    let mut branches = Vec::new();
    let mut start = 0;
    let mut depth = 0usize;
    let mut class_depth = 0usize;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 1,
            b'[' => {
                class_depth += 1;
                // a `]` right after `[` or `[^` is a literal
                if bytes.get(i + 1) == Some(&b'^') {
                    i += 1;
                }
                if bytes.get(i + 1) == Some(&b']') {
                    i += 1;
                }
            }
            b']' if class_depth > 0 => class_depth -= 1,
            _ if class_depth > 0 => {}
            b'(' => depth += 1,
            b')' => depth = depth.saturating_sub(1),
            b'|' if depth == 0 => {
                branches.push(&pattern[start..i]);
                start = i + 1;
            }
            _ => {}
        }
        i += 1;
    }
    branches.push(&pattern[start..]);
    branches
}
