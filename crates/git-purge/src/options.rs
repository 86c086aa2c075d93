//! Export/import argument lists, gated on the installed git version.

use std::fmt;

use regex::Regex;

/// `--reencode` only exists from this release on.
pub const REENCODE_MIN_VERSION: GitVersion = GitVersion::new(2, 23, 0);

/// Default `--progress` interval (objects between progress lines).
pub const DEFAULT_PROGRESS: u32 = 1000;

/// Fixed arguments for the importing side.
pub const IMPORT_ARGS: &[&str] = &["fast-import", "--done", "--force", "--quiet"];

/// A `major.minor.patch` git release number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct GitVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl GitVersion {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parse the output of `git --version`, e.g. `git version 2.39.3 (Apple Git-145)`
    /// or `git version 2.45.1.windows.1`. A missing patch level reads as 0.
    pub fn parse(text: &str) -> Option<Self> {
        let re = Regex::new(r"(\d+)\.(\d+)(?:\.(\d+))?").ok()?;
        let caps = re.captures(text)?;
        let major = caps.get(1)?.as_str().parse().ok()?;
        let minor = caps.get(2)?.as_str().parse().ok()?;
        let patch = caps.get(3).map_or(Some(0), |m| m.as_str().parse().ok())?;
        Some(Self::new(major, minor, patch))
    }
}

impl fmt::Display for GitVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// How commits are serialized by the exporter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportMode {
    /// Every commit carries its complete tree (`--full-tree`).
    #[default]
    FullTree,
    /// Only changes relative to the parent; quicker but more sensitive to
    /// serialization quirks.
    Diff,
}

/// The export argument list for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportOptions {
    mode: ExportMode,
    args: Vec<String>,
}

impl ExportOptions {
    pub fn new(version: GitVersion, mode: ExportMode, progress: u32) -> Self {
        let mut args: Vec<String> = [
            "fast-export",
            "--all",
            "--no-data",
            &format!("--progress={progress}"),
            "--signed-tags=warn-strip",
            "--tag-of-filtered-object=rewrite",
            "--use-done-feature",
        ]
        .iter()
        .map(ToString::to_string)
        .collect();

        if version >= REENCODE_MIN_VERSION {
            args.push("--reencode=no".to_string());
        }
        if mode == ExportMode::FullTree {
            args.push("--full-tree".to_string());
        }
        Self { mode, args }
    }

    pub const fn mode(&self) -> ExportMode {
        self.mode
    }

    /// Arguments to pass to `git`, starting with the `fast-export` subcommand.
    pub fn args(&self) -> &[String] {
        &self.args
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn parse_plain_version() {
        assert_eq!(
            GitVersion::parse("git version 2.43.0\n"),
            Some(GitVersion::new(2, 43, 0))
        );
    }

    #[test]
    fn parse_vendor_suffixes() {
        assert_eq!(
            GitVersion::parse("git version 2.39.3 (Apple Git-145)"),
            Some(GitVersion::new(2, 39, 3))
        );
        assert_eq!(
            GitVersion::parse("git version 2.45.1.windows.1"),
            Some(GitVersion::new(2, 45, 1))
        );
    }

    #[test]
    fn parse_two_component_version() {
        assert_eq!(GitVersion::parse("git version 3.0"), Some(GitVersion::new(3, 0, 0)));
    }

    #[test]
    fn parse_garbage() {
        assert_eq!(GitVersion::parse("not git"), None);
    }

    #[test]
    fn versions_order_numerically() {
        assert!(GitVersion::new(2, 9, 0) < GitVersion::new(2, 23, 0));
        assert!(GitVersion::new(2, 23, 0) <= REENCODE_MIN_VERSION);
        assert!(GitVersion::new(10, 0, 0) > REENCODE_MIN_VERSION);
    }

    #[test]
    fn base_arguments_always_present() {
        let opts = ExportOptions::new(GitVersion::new(2, 20, 1), ExportMode::FullTree, 1000);
        assert_eq!(
            opts.args()[..7],
            [
                "fast-export",
                "--all",
                "--no-data",
                "--progress=1000",
                "--signed-tags=warn-strip",
                "--tag-of-filtered-object=rewrite",
                "--use-done-feature",
            ]
        );
    }

    #[test]
    fn reencode_gated_on_version() {
        let old = ExportOptions::new(GitVersion::new(2, 22, 9), ExportMode::FullTree, 1000);
        assert!(!old.args().iter().any(|a| a == "--reencode=no"));

        let exact = ExportOptions::new(GitVersion::new(2, 23, 0), ExportMode::FullTree, 1000);
        assert!(exact.args().iter().any(|a| a == "--reencode=no"));
    }

    #[test]
    fn diff_mode_omits_full_tree() {
        let v = GitVersion::new(2, 40, 0);
        let full = ExportOptions::new(v, ExportMode::FullTree, 1000);
        let diff = ExportOptions::new(v, ExportMode::Diff, 1000);
        assert_eq!(full.args().last().map(String::as_str), Some("--full-tree"));
        assert!(!diff.args().iter().any(|a| a == "--full-tree"));
        assert_eq!(diff.mode(), ExportMode::Diff);
    }

    #[test]
    fn progress_interval_is_configurable() {
        let opts = ExportOptions::new(GitVersion::new(2, 40, 0), ExportMode::Diff, 50);
        assert!(opts.args().iter().any(|a| a == "--progress=50"));
    }

    #[test]
    fn import_arguments_are_fixed() {
        assert_eq!(IMPORT_ARGS, ["fast-import", "--done", "--force", "--quiet"]);
    }
}
