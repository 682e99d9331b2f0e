//! Hand-off of written artifacts to version control.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use chrono::NaiveDate;

use crate::config::PublishConfig;
use crate::error::{Error, Result};

/// What a publisher did with the artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Publishing is disabled
    Skipped,
    /// Nothing staged differed from HEAD
    NothingToCommit,
    Committed,
    CommittedAndPushed,
}

/// Receives the artifact paths once they are fully written.
pub trait Publisher {
    fn publish(&self, date: NaiveDate, paths: &[PathBuf]) -> Result<PublishOutcome>;
}

/// Used when `publish.enabled = false`.
pub struct NoopPublisher;

impl Publisher for NoopPublisher {
    fn publish(&self, _date: NaiveDate, paths: &[PathBuf]) -> Result<PublishOutcome> {
        tracing::debug!(artifacts = paths.len(), "Publishing disabled");
        Ok(PublishOutcome::Skipped)
    }
}

/// Commits (and optionally pushes) artifacts with the `git` CLI.
pub struct GitPublisher {
    config: PublishConfig,
    repo_dir: PathBuf,
}

impl GitPublisher {
    pub fn new(config: PublishConfig, repo_dir: impl Into<PathBuf>) -> Self {
        Self {
            config,
            repo_dir: repo_dir.into(),
        }
    }

    pub fn commit_message(&self, date: NaiveDate) -> String {
        self.config
            .commit_message
            .replace("{date}", &date.format("%Y-%m-%d").to_string())
    }

    fn git(&self) -> Command {
        let mut cmd = Command::new("git");
        cmd.current_dir(&self.repo_dir);
        cmd
    }

    fn run(&self, mut cmd: Command, what: &str) -> Result<Output> {
        let output = cmd
            .output()
            .map_err(|e| Error::Publish(format!("failed to execute git {what}: {e}")))?;
        Ok(output)
    }

    fn run_checked(&self, cmd: Command, what: &str) -> Result<()> {
        let output = self.run(cmd, what)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Publish(format!(
                "git {what} failed: {}",
                stderr.trim()
            )));
        }
        Ok(())
    }

    fn has_staged_changes(&self) -> Result<bool> {
        let mut cmd = self.git();
        cmd.args(["diff", "--cached", "--quiet"]);
        let output = self.run(cmd, "diff")?;
        match output.status.code() {
            Some(0) => Ok(false),
            Some(1) => Ok(true),
            _ => Err(Error::Publish(format!(
                "git diff failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            ))),
        }
    }
}

impl Publisher for GitPublisher {
    fn publish(&self, date: NaiveDate, paths: &[PathBuf]) -> Result<PublishOutcome> {
        if paths.is_empty() {
            tracing::info!("No artifacts changed; nothing to publish");
            return Ok(PublishOutcome::NothingToCommit);
        }

        let mut add = self.git();
        add.arg("add").arg("--").args(paths.iter().map(PathBuf::as_path));
        self.run_checked(add, "add")?;

        if !self.has_staged_changes()? {
            tracing::info!("Artifacts match HEAD; nothing to commit");
            return Ok(PublishOutcome::NothingToCommit);
        }

        let message = self.commit_message(date);
        let mut commit = self.git();
        if let (Some(name), Some(email)) = (&self.config.author_name, &self.config.author_email) {
            commit
                .arg("-c")
                .arg(format!("user.name={name}"))
                .arg("-c")
                .arg(format!("user.email={email}"));
        }
        commit.args(["commit", "-m", &message]);
        self.run_checked(commit, "commit")?;
        tracing::info!(message = %message, files = paths.len(), "Committed artifacts");

        if !self.config.push {
            return Ok(PublishOutcome::Committed);
        }

        let mut push = self.git();
        push.args(["push", &self.config.remote, "HEAD"]);
        self.run_checked(push, "push")?;
        tracing::info!(remote = %self.config.remote, "Pushed artifacts");
        Ok(PublishOutcome::CommittedAndPushed)
    }
}

/// Pick the publisher for `config`, rooted at `repo_dir`.
pub fn publisher_for(config: &PublishConfig, repo_dir: &Path) -> Box<dyn Publisher> {
    if config.enabled {
        Box::new(GitPublisher::new(config.clone(), repo_dir))
    } else {
        Box::new(NoopPublisher)
    }
}
