// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Git plumbing used by the synchronization protocol.
//!
//! The protocol only talks to git through the [`GitClient`] trait, so it can
//! be exercised against a fake. [`GitCli`] is the real implementation: it
//! answers state queries through [`git2`], and shells out to the git binary
//! for everything that touches a working tree or a remote, since only the
//! binary implements `pull` with merge strategies and rename detection.

use crate::config::PullStrategy;

use git2::{Repository, RepositoryState as Git2State};
use std::{
    ffi::{OsStr, OsString},
    path::{Path, PathBuf},
    process::Command,
};
use tracing::{debug, instrument};

/// Committer identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub name: String,
    pub email: String,
}

impl Default for Identity {
    fn default() -> Self {
        Self {
            name: "magicspace".into(),
            email: "magicspace@localhost".into(),
        }
    }
}

/// Options of a no-commit pull.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullOptions {
    pub strategy: PullStrategy,
    pub rename_threshold: u8,
}

/// Git capabilities the synchronization protocol relies on.
///
/// Every operation takes the directory of the repository it applies to.
pub trait GitClient {
    /// Check that directory is the top level of a working tree.
    fn is_repository_root(&self, dir: &Path) -> Result<bool>;

    /// Check that `HEAD` points to a commit.
    fn has_commits(&self, dir: &Path) -> Result<bool>;

    /// Check that a merge is in progress, i.e., `MERGE_HEAD` exists.
    fn is_merging(&self, dir: &Path) -> Result<bool>;

    /// Path to git directory of repository.
    fn git_dir(&self, dir: &Path) -> Result<PathBuf>;

    /// Latest commit reachable from `HEAD` whose message matches extended
    /// regular expression.
    fn find_commit(&self, dir: &Path, pattern: &str) -> Result<Option<String>>;

    /// Clone repository sharing its object store, without checkout.
    fn clone_shared(&self, source: &Path, dest: &Path) -> Result<()>;

    /// Point `HEAD` at ref, e.g., an orphan branch.
    fn symbolic_ref(&self, dir: &Path, name: &str, target: &str) -> Result<()>;

    /// Mixed reset onto commit.
    fn reset(&self, dir: &Path, commit: &str) -> Result<()>;

    /// Stage every change of working tree.
    fn add_all(&self, dir: &Path) -> Result<()>;

    /// Porcelain status of working tree.
    fn status(&self, dir: &Path) -> Result<String>;

    /// Commit staged changes.
    fn commit(
        &self,
        dir: &Path,
        message: &str,
        allow_empty: bool,
        identity: Option<&Identity>,
    ) -> Result<()>;

    fn remote_add(&self, dir: &Path, name: &str, url: &Path) -> Result<()>;

    fn remote_remove(&self, dir: &Path, name: &str) -> Result<()>;

    /// Pull branch of remote without committing the merge.
    fn pull(&self, dir: &Path, remote: &str, branch: &str, options: &PullOptions)
        -> Result<String>;

    /// Patch of renames introduced by commit.
    fn show_renames(&self, dir: &Path, commit: &str, rename_threshold: u8) -> Result<String>;
}

/// Git client backed by git2 and the git binary.
#[derive(Debug, Default, Clone, Copy)]
pub struct GitCli;

impl GitCli {
    pub fn new() -> Self {
        Self
    }

    fn open(&self, dir: &Path) -> Result<Repository> {
        Repository::open(dir).map_err(GitError::from)
    }
}

impl GitClient for GitCli {
    fn is_repository_root(&self, dir: &Path) -> Result<bool> {
        let Ok(repository) = Repository::open(dir) else {
            return Ok(false);
        };

        let Some(workdir) = repository.workdir() else {
            return Ok(false);
        };

        let canonical = |path: &Path| path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        Ok(canonical(workdir) == canonical(dir))
    }

    fn has_commits(&self, dir: &Path) -> Result<bool> {
        let repository = self.open(dir)?;
        let has_commits = repository
            .head()
            .ok()
            .and_then(|head| head.target())
            .and_then(|oid| repository.find_commit(oid).ok())
            .is_some();
        Ok(has_commits)
    }

    fn is_merging(&self, dir: &Path) -> Result<bool> {
        let repository = self.open(dir)?;
        Ok(repository.state() == Git2State::Merge
            || repository.path().join("MERGE_HEAD").exists())
    }

    fn git_dir(&self, dir: &Path) -> Result<PathBuf> {
        Ok(self.open(dir)?.path().to_path_buf())
    }

    fn find_commit(&self, dir: &Path, pattern: &str) -> Result<Option<String>> {
        let grep = format!("--grep={pattern}");
        let output = gitcall(dir, ["rev-list", "-n", "1", "-E", grep.as_str(), "HEAD"])?;
        let commit = output.trim();
        Ok((!commit.is_empty()).then(|| commit.to_string()))
    }

    fn clone_shared(&self, source: &Path, dest: &Path) -> Result<()> {
        let args: [&OsStr; 5] = [
            "clone".as_ref(),
            "--shared".as_ref(),
            "--no-checkout".as_ref(),
            source.as_os_str(),
            dest.as_os_str(),
        ];
        gitcall(source, args).map(drop)
    }

    fn symbolic_ref(&self, dir: &Path, name: &str, target: &str) -> Result<()> {
        gitcall(dir, ["symbolic-ref", name, target]).map(drop)
    }

    fn reset(&self, dir: &Path, commit: &str) -> Result<()> {
        gitcall(dir, ["reset", "--quiet", commit]).map(drop)
    }

    fn add_all(&self, dir: &Path) -> Result<()> {
        gitcall(dir, ["add", "--all"]).map(drop)
    }

    fn status(&self, dir: &Path) -> Result<String> {
        gitcall(dir, ["status", "--porcelain"])
    }

    fn commit(
        &self,
        dir: &Path,
        message: &str,
        allow_empty: bool,
        identity: Option<&Identity>,
    ) -> Result<()> {
        let mut args: Vec<OsString> = Vec::new();
        if let Some(identity) = identity {
            args.extend([
                "-c".into(),
                format!("user.name={}", identity.name).into(),
                "-c".into(),
                format!("user.email={}", identity.email).into(),
            ]);
        }
        args.extend(["commit".into(), "--no-verify".into(), "--quiet".into()]);
        if allow_empty {
            args.push("--allow-empty".into());
        }
        args.extend(["--message".into(), message.into()]);

        gitcall(dir, args).map(drop)
    }

    fn remote_add(&self, dir: &Path, name: &str, url: &Path) -> Result<()> {
        let args: [&OsStr; 4] = ["remote".as_ref(), "add".as_ref(), name.as_ref(), url.as_os_str()];
        gitcall(dir, args).map(drop)
    }

    fn remote_remove(&self, dir: &Path, name: &str) -> Result<()> {
        gitcall(dir, ["remote", "remove", name]).map(drop)
    }

    #[instrument(skip(self, dir, options), level = "debug")]
    fn pull(
        &self,
        dir: &Path,
        remote: &str,
        branch: &str,
        options: &PullOptions,
    ) -> Result<String> {
        let mut args = vec![
            "pull".to_string(),
            "--no-commit".into(),
            "--no-rebase".into(),
            "--allow-unrelated-histories".into(),
        ];
        if options.strategy == PullStrategy::Ours {
            args.push("--strategy=ours".into());
        }
        args.extend([
            "--strategy-option=patience".into(),
            format!("--strategy-option=find-renames={}%", options.rename_threshold),
            remote.into(),
            branch.into(),
        ]);

        gitcall(dir, args)
    }

    fn show_renames(&self, dir: &Path, commit: &str, rename_threshold: u8) -> Result<String> {
        let renames = format!("--find-renames={rename_threshold}%");
        gitcall(
            dir,
            [
                "-c",
                "core.quotePath=false",
                "show",
                "--diff-filter=R",
                renames.as_str(),
                "--format=",
                commit,
            ],
        )
    }
}

fn gitcall(
    dir: &Path,
    args: impl IntoIterator<Item = impl AsRef<OsStr>>,
) -> Result<String> {
    let args = args
        .into_iter()
        .map(|arg| arg.as_ref().to_os_string())
        .collect::<Vec<_>>();
    let command = format!(
        "git {}",
        args.iter()
            .map(|arg| arg.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ")
    );
    debug!("{command} in {:?}", dir.display());

    let output = Command::new("git")
        .args(&args)
        .current_dir(dir)
        .output()
        .map_err(|err| GitError::Spawn {
            source: err,
            command: command.clone(),
        })?;
    let stdout = String::from_utf8_lossy(output.stdout.as_slice()).into_owned();
    let stderr = String::from_utf8_lossy(output.stderr.as_slice()).into_owned();

    if !output.status.success() {
        return Err(GitError::Command {
            command,
            stdout,
            stderr,
        });
    }

    Ok(stdout)
}

/// Git error types.
#[derive(Debug, thiserror::Error)]
pub enum GitError {
    #[error(transparent)]
    Git2(#[from] git2::Error),

    /// Git binary cannot be run.
    #[error("failed to run {command:?}")]
    Spawn {
        #[source]
        source: std::io::Error,
        command: String,
    },

    /// Git exited unsuccessfully.
    #[error("command {command:?} failed:\n{}", stderr.trim_end())]
    Command {
        command: String,
        stdout: String,
        stderr: String,
    },
}

impl GitError {
    /// Combined output of failed command, empty for other errors.
    pub fn output(&self) -> String {
        match self {
            Self::Command { stdout, stderr, .. } => format!("{stdout}\n{stderr}"),
            _ => String::new(),
        }
    }
}

/// Friendly result alias :3
pub type Result<T, E = GitError> = std::result::Result<T, E>;
