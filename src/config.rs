use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Result};

use crate::path_sandbox;

pub const DEFAULT_LISTEN: &str = "127.0.0.1:45553";
pub const DEFAULT_FILES_DIR: &str = "files";
pub const DEFAULT_REMOTE: &str = "origin";
pub const DEFAULT_PULL_INTERVAL_SECS: u64 = 600;
pub const DEFAULT_COMMIT_MESSAGE: &str = "Updated files via web UI";
pub const DEFAULT_MAX_UPLOAD_SIZE: u64 = 10 * 1024 * 1024;
pub const DEFAULT_CORS_ORIGINS: &[&str] = &["http://localhost:45554", "http://localhost:5173"];

/// Process-start configuration. Read-only once the server is running.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub listen: String,
    pub repo_dir: PathBuf,
    pub files_dir: PathBuf,
    pub remote: String,
    pub pull_interval: Duration,
    pub pull_on_startup: bool,
    pub commit_message: String,
    pub max_upload_size: u64,
    pub cors_origins: Vec<String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            listen: DEFAULT_LISTEN.to_string(),
            repo_dir: PathBuf::from("."),
            files_dir: PathBuf::from(DEFAULT_FILES_DIR),
            remote: DEFAULT_REMOTE.to_string(),
            pull_interval: Duration::from_secs(DEFAULT_PULL_INTERVAL_SECS),
            pull_on_startup: true,
            commit_message: DEFAULT_COMMIT_MESSAGE.to_string(),
            max_upload_size: DEFAULT_MAX_UPLOAD_SIZE,
            cors_origins: DEFAULT_CORS_ORIGINS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl SyncConfig {
    pub fn validate(&self) -> Result<()> {
        if self.pull_interval.is_zero() {
            bail!("pull interval must be greater than zero");
        }
        if self.max_upload_size == 0 {
            bail!("max upload size must be greater than zero");
        }
        if self.remote.trim().is_empty() {
            bail!("remote name must not be empty");
        }
        Ok(())
    }

    /// Files directory, resolved against the repository directory when
    /// relative.
    pub fn files_path(&self) -> PathBuf {
        if self.files_dir.is_absolute() {
            self.files_dir.clone()
        } else {
            self.repo_dir.join(&self.files_dir)
        }
    }
}

/// Pathspec handed to `git add`: the files directory relative to the
/// repository root, or `.` when it lies outside the repository.
pub fn commit_pathspec(repo_root: &Path, files_base: &Path) -> String {
    let Ok(repo) = dunce::canonicalize(repo_root) else {
        return ".".to_string();
    };
    let files = dunce::canonicalize(files_base).unwrap_or_else(|_| files_base.to_path_buf());
    if !files.starts_with(&repo) {
        return ".".to_string();
    }
    let relative = path_sandbox::relative_to(&repo, &files);
    if relative.is_empty() {
        ".".to_string()
    } else {
        relative
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let config = SyncConfig::default();
        config.validate().unwrap();
        assert_eq!(config.pull_interval, Duration::from_secs(600));
        assert!(config.pull_on_startup);
        assert_eq!(config.commit_message, "Updated files via web UI");
        assert_eq!(config.max_upload_size, 10 * 1024 * 1024);
    }

    #[test]
    fn zero_interval_is_rejected() {
        let config = SyncConfig {
            pull_interval: Duration::ZERO,
            ..SyncConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_upload_cap_is_rejected() {
        let config = SyncConfig {
            max_upload_size: 0,
            ..SyncConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn relative_files_dir_lives_under_repo() {
        let config = SyncConfig {
            repo_dir: PathBuf::from("/srv/notes"),
            ..SyncConfig::default()
        };
        assert_eq!(config.files_path(), PathBuf::from("/srv/notes/files"));

        let config = SyncConfig {
            files_dir: PathBuf::from("/data/files"),
            ..config
        };
        assert_eq!(config.files_path(), PathBuf::from("/data/files"));
    }

    #[test]
    fn pathspec_is_relative_to_repo() {
        let repo = tempfile::tempdir().unwrap();
        let files = repo.path().join("files").join("notes");
        std::fs::create_dir_all(&files).unwrap();

        assert_eq!(commit_pathspec(repo.path(), &files), "files/notes");
        assert_eq!(commit_pathspec(repo.path(), repo.path()), ".");

        let elsewhere = tempfile::tempdir().unwrap();
        assert_eq!(commit_pathspec(repo.path(), elsewhere.path()), ".");
    }
}
