//! Run settings, resolved once at startup.
//!
//! Priority for each value:
//!   1. command-line flag (clap also maps `GIT_PURGE_GIT` / `GIT_PURGE_PROGRESS`)
//!   2. `{repo}/.git-purge.toml`
//!   3. `{config_dir}/git-purge/config.toml`  (e.g. `~/.config/git-purge/config.toml`)
//!   4. built-in default
//!
//! Patterns are the exception: they accumulate from every source in that order.

use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::options::{DEFAULT_PROGRESS, ExportMode};

pub const PROJECT_CONFIG: &str = ".git-purge.toml";

/// Parsed representation of a config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    patterns: Vec<String>,
    progress: Option<u32>,
    git: Option<PathBuf>,
}

/// Read a config file. Missing files are silently `None`; unreadable or
/// malformed ones are warned about and ignored.
fn read_config(path: &Path) -> Option<FileConfig> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            tracing::warn!("ignoring unreadable config {}: {e}", path.display());
            return None;
        }
    };
    match toml::from_str(&content) {
        Ok(cfg) => Some(cfg),
        Err(e) => {
            tracing::warn!("ignoring malformed config {}: {e}", path.display());
            None
        }
    }
}

/// Read a patterns file: one regular expression per line, `#` comments and
/// blank lines skipped.
///
/// # Errors
///
/// Fails if the file cannot be read.
pub fn read_patterns_file(path: &Path) -> anyhow::Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read patterns file {}", path.display()))?;
    Ok(content
        .lines()
        .map(str::trim_end)
        .filter(|l| !l.trim().is_empty() && !l.trim_start().starts_with('#'))
        .map(str::to_string)
        .collect())
}

/// Values supplied on the command line (or via clap's env fallbacks).
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub patterns: Vec<String>,
    pub patterns_from: Option<PathBuf>,
    pub repo: Option<PathBuf>,
    pub git: Option<PathBuf>,
    pub progress: Option<u32>,
    pub mode: ExportMode,
    pub check: bool,
}

/// Everything one invocation needs, immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub git: PathBuf,
    pub repo: PathBuf,
    pub patterns: Vec<String>,
    pub progress: u32,
    pub mode: ExportMode,
    pub check: bool,
}

impl Settings {
    /// Resolve settings using the platform's user config directory.
    ///
    /// # Errors
    ///
    /// Fails if the working directory or a `--patterns-from` file cannot be read.
    pub fn load(overrides: Overrides) -> anyhow::Result<Self> {
        let global = dirs::config_dir().map(|d| d.join("git-purge").join("config.toml"));
        Self::load_from(overrides, global.as_deref())
    }

    /// Resolve settings from explicit paths. Useful for testing.
    ///
    /// # Errors
    ///
    /// See [`Settings::load`].
    pub fn load_from(overrides: Overrides, global_config: Option<&Path>) -> anyhow::Result<Self> {
        let repo = match overrides.repo {
            Some(dir) => dir,
            None => std::env::current_dir().context("cannot determine current directory")?,
        };

        let project = read_config(&repo.join(PROJECT_CONFIG)).unwrap_or_default();
        let global = global_config.and_then(read_config).unwrap_or_default();

        let mut patterns = overrides.patterns;
        if let Some(file) = &overrides.patterns_from {
            patterns.extend(read_patterns_file(file)?);
        }
        for p in project.patterns.into_iter().chain(global.patterns) {
            if !patterns.contains(&p) {
                patterns.push(p);
            }
        }

        let git = overrides
            .git
            .or(project.git)
            .or(global.git)
            .unwrap_or_else(|| PathBuf::from("git"));
        let progress = overrides
            .progress
            .or(project.progress)
            .or(global.progress)
            .unwrap_or(DEFAULT_PROGRESS);

        Ok(Self {
            git,
            repo,
            patterns,
            progress,
            mode: overrides.mode,
            check: overrides.check,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    fn overrides_in(dir: &Path) -> Overrides {
        Overrides {
            repo: Some(dir.to_path_buf()),
            ..Overrides::default()
        }
    }

    #[test]
    fn defaults_without_any_config() {
        let tmp = TempDir::new().unwrap();
        let s = Settings::load_from(overrides_in(tmp.path()), None).unwrap();
        assert_eq!(s.git, PathBuf::from("git"));
        assert_eq!(s.progress, DEFAULT_PROGRESS);
        assert!(s.patterns.is_empty());
        assert_eq!(s.mode, ExportMode::FullTree);
        assert!(!s.check);
    }

    #[test]
    fn project_config_supplies_values() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join(PROJECT_CONFIG),
            "patterns = [\"\\\\.bin$\"]\nprogress = 50\ngit = \"/opt/git/bin/git\"\n",
        )
        .unwrap();
        let s = Settings::load_from(overrides_in(tmp.path()), None).unwrap();
        assert_eq!(s.patterns, vec![r"\.bin$"]);
        assert_eq!(s.progress, 50);
        assert_eq!(s.git, PathBuf::from("/opt/git/bin/git"));
    }

    #[test]
    fn cli_wins_over_project_over_global() {
        let tmp = TempDir::new().unwrap();
        let global = tmp.path().join("global.toml");
        fs::write(&global, "progress = 10\ngit = \"global-git\"\n").unwrap();
        fs::write(tmp.path().join(PROJECT_CONFIG), "progress = 20\n").unwrap();

        let s = Settings::load_from(overrides_in(tmp.path()), Some(&global)).unwrap();
        assert_eq!(s.progress, 20);
        assert_eq!(s.git, PathBuf::from("global-git"));

        let o = Overrides {
            progress: Some(30),
            ..overrides_in(tmp.path())
        };
        let s = Settings::load_from(o, Some(&global)).unwrap();
        assert_eq!(s.progress, 30);
    }

    #[test]
    fn patterns_accumulate_in_priority_order_without_duplicates() {
        let tmp = TempDir::new().unwrap();
        let global = tmp.path().join("global.toml");
        fs::write(&global, "patterns = [\"^/global/\", \"^/cli/\"]\n").unwrap();
        fs::write(tmp.path().join(PROJECT_CONFIG), "patterns = [\"^/project/\"]\n").unwrap();
        let file = tmp.path().join("patterns.txt");
        fs::write(&file, "# secrets\n^/file/\n\n   \n").unwrap();

        let o = Overrides {
            patterns: vec!["^/cli/".to_string()],
            patterns_from: Some(file),
            ..overrides_in(tmp.path())
        };
        let s = Settings::load_from(o, Some(&global)).unwrap();
        assert_eq!(s.patterns, vec!["^/cli/", "^/file/", "^/project/", "^/global/"]);
    }

    #[test]
    fn malformed_config_is_ignored() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(PROJECT_CONFIG), "patterns = not toml [").unwrap();
        let s = Settings::load_from(overrides_in(tmp.path()), None).unwrap();
        assert!(s.patterns.is_empty());
    }

    #[test]
    fn unknown_keys_make_a_config_malformed() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(PROJECT_CONFIG), "progres = 5\n").unwrap();
        let s = Settings::load_from(overrides_in(tmp.path()), None).unwrap();
        assert_eq!(s.progress, DEFAULT_PROGRESS);
    }

    // Settings::load reads the user config dir from the environment; serialised
    // so no other test observes the override.
    #[cfg(target_os = "linux")]
    #[test]
    #[serial_test::serial]
    fn load_reads_user_config_dir() {
        let home = TempDir::new().unwrap();
        let dir = home.path().join("git-purge");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("config.toml"), "patterns = [\"^/from-user/\"]\n").unwrap();
        let repo = TempDir::new().unwrap();

        let previous = std::env::var_os("XDG_CONFIG_HOME");
        // SAFETY: single-threaded via serial_test.
        unsafe { std::env::set_var("XDG_CONFIG_HOME", home.path()) };
        let s = Settings::load(overrides_in(repo.path()));
        match previous {
            // SAFETY: single-threaded via serial_test.
            Some(v) => unsafe { std::env::set_var("XDG_CONFIG_HOME", v) },
            // SAFETY: single-threaded via serial_test.
            None => unsafe { std::env::remove_var("XDG_CONFIG_HOME") },
        }

        assert_eq!(s.unwrap().patterns, vec!["^/from-user/"]);
    }

    #[test]
    fn missing_patterns_file_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let o = Overrides {
            patterns_from: Some(tmp.path().join("nope.txt")),
            ..overrides_in(tmp.path())
        };
        let err = Settings::load_from(o, None).unwrap_err();
        assert!(format!("{err:#}").contains("cannot read patterns file"), "{err:#}");
    }
}
