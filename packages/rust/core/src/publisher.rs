//! Commit publishing.
//!
//! After a run the working tree is checked with `git status --porcelain`; if
//! anything changed, everything is staged and committed with a fixed message.
//! No branch handling, no push, no retry.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use rulefeed_shared::{Result, RulefeedError};
use tracing::{debug, info, instrument};

/// Persists the regenerated workspace somewhere durable.
pub trait Publisher {
    /// Returns `true` when a commit was created.
    fn publish(&self) -> Result<bool>;
}

/// [`Publisher`] that commits to the git repository at `repo_dir`.
#[derive(Debug, Clone)]
pub struct GitPublisher {
    repo_dir: PathBuf,
    message: String,
}

impl GitPublisher {
    pub fn new(repo_dir: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self {
            repo_dir: repo_dir.into(),
            message: message.into(),
        }
    }

    pub fn repo_dir(&self) -> &Path {
        &self.repo_dir
    }

    fn git(&self, args: &[&str]) -> Result<Output> {
        debug!(?args, repo = %self.repo_dir.display(), "invoking git");

        let output = Command::new("git")
            .args(args)
            .current_dir(&self.repo_dir)
            .output()
            .map_err(|e| RulefeedError::Publish(format!("failed to spawn git: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RulefeedError::Publish(format!(
                "git {} exited with status {}: {}",
                args.first().copied().unwrap_or_default(),
                output.status.code().unwrap_or(-1),
                stderr.trim()
            )));
        }

        Ok(output)
    }
}

impl Publisher for GitPublisher {
    #[instrument(skip_all, fields(repo = %self.repo_dir.display()))]
    fn publish(&self) -> Result<bool> {
        let status = self.git(&["status", "--porcelain"])?;
        if status.stdout.iter().all(u8::is_ascii_whitespace) {
            info!("working tree clean, nothing to commit");
            return Ok(false);
        }

        info!("changes detected, committing");
        self.git(&["add", "."])?;
        self.git(&["commit", "-m", &self.message])?;
        Ok(true)
    }
}

/// [`Publisher`] used when committing is disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPublish;

impl Publisher for NoPublish {
    fn publish(&self) -> Result<bool> {
        debug!("publishing disabled");
        Ok(false)
    }
}
