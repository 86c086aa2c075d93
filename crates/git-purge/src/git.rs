//! Thin wrapper for invoking the external `git` executable.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use anyhow::Context;

use crate::options::GitVersion;

/// A git executable bound to one repository directory.
#[derive(Debug, Clone)]
pub struct Git {
    program: PathBuf,
    repo: PathBuf,
}

impl Git {
    pub fn new(program: impl Into<PathBuf>, repo: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            repo: repo.into(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn repo(&self) -> &Path {
        &self.repo
    }

    /// A `git <args>` command running inside the repository. Stdio is left
    /// for the caller to configure.
    pub fn command<I, S>(&self, args: I) -> Command
    where
        I: IntoIterator<Item = S>,
        S: AsRef<std::ffi::OsStr>,
    {
        let mut cmd = Command::new(&self.program);
        cmd.current_dir(&self.repo).args(args);
        cmd
    }

    /// Run `git <args>` to completion and return its stdout.
    ///
    /// # Errors
    ///
    /// Fails if git cannot be started or exits non-zero; the error carries
    /// git's stderr.
    pub fn output(&self, args: &[&str]) -> anyhow::Result<Vec<u8>> {
        let out = self
            .command(args)
            .stdin(Stdio::null())
            .output()
            .with_context(|| {
                format!(
                    "failed to run {} {}",
                    self.program.display(),
                    args.join(" ")
                )
            })?;
        if !out.status.success() {
            anyhow::bail!(
                "git {} failed ({}): {}",
                args.join(" "),
                out.status,
                String::from_utf8_lossy(&out.stderr).trim()
            );
        }
        Ok(out.stdout)
    }

    /// Query the installed git release.
    ///
    /// # Errors
    ///
    /// Fails if git cannot be run or prints something that is not a version.
    pub fn version(&self) -> anyhow::Result<GitVersion> {
        let raw = self.output(&["--version"])?;
        let text = String::from_utf8_lossy(&raw);
        GitVersion::parse(&text)
            .with_context(|| format!("unrecognised `git --version` output: {}", text.trim()))
    }

    /// Whether the repository directory is inside a git work tree or bare repo.
    pub fn is_repository(&self) -> bool {
        self.output(&["rev-parse", "--git-dir"]).is_ok()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn git_available() -> bool {
        Command::new("git").arg("--version").output().is_ok()
    }

    #[test]
    fn version_of_installed_git() {
        if !git_available() {
            return;
        }
        let git = Git::new("git", ".");
        let v = git.version().unwrap();
        assert!(v.major >= 1, "{v}");
    }

    #[test]
    fn missing_program_is_an_error() {
        let git = Git::new("definitely-not-a-git-binary-xyz", ".");
        let err = git.version().unwrap_err();
        assert!(format!("{err:#}").contains("failed to run"), "{err:#}");
    }

    #[test]
    fn plain_directory_is_not_a_repository() {
        if !git_available() {
            return;
        }
        let tmp = tempfile::TempDir::new().unwrap();
        let git = Git::new("git", tmp.path());
        assert!(!git.is_repository());
    }
}
