// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Git synchronization protocol.
//!
//! Generated output never lands in a project directly. Instead, it is
//! committed to an orphan branch named `magicspace` inside a scratch clone
//! of the project, and that branch is pulled into the project without
//! committing the merge. Git's three way merge then keeps every local edit
//! the user made to generated files, and leaves real conflicts for the user
//! to resolve.
//!
//! # Markers
//!
//! Generated commits carry a marker in their message:
//!
//! - `(magicspace-initial-commit)`: empty commit created in a repository
//!   without any commits, so there is something to merge into.
//! - `(magicspace-initialize)`: first generated commit.
//! - `(magicspace-update)`: every following generated commit.
//!
//! An update resets the orphan branch onto the latest initialize or update
//! commit before regenerating, so the pulled diff only contains what changed
//! in the generated output since then. The merge message is rewritten so
//! that the merge commit itself never looks like a marker commit.
//!
//! # Outcomes
//!
//! Expected repository states are reported as [`SyncOutcome`] values rather
//! than errors, so callers can present them as plain information.

pub mod git;
pub mod rename;

use crate::{
    builder::{BuildError, Builder},
    config::GitSettings,
    sync::{
        git::{GitClient, GitError, Identity, PullOptions},
        rename::{detect_renames, Rename},
    },
};

use regex::Regex;
use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    fs::{create_dir_all, read_dir, rename as move_path, write},
    path::{Path, PathBuf},
    sync::LazyLock,
};
use tracing::{debug, info, instrument, warn};

/// Name of orphan branch and temporary remote.
pub const BRANCH_NAME: &str = "magicspace";

/// Message of the empty commit created in repositories without commits.
pub const INITIAL_COMMIT_MESSAGE: &str = "(magicspace-initial-commit)";

/// Message of the first generated commit.
pub const INITIALIZE_COMMIT_MESSAGE: &str = "(magicspace-initialize)";

/// Message of following generated commits.
pub const UPDATE_COMMIT_MESSAGE: &str = "(magicspace-update)";

/// Extended regular expression matching generated commit messages.
pub const MARKER_PATTERN: &str = r"\(magicspace-(initialize|update)\)";

static LOCAL_CHANGES_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)your local changes to the following files would be overwritten")
        .expect("local changes pattern is valid")
});
static UNTRACKED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)untracked working tree files would be (overwritten|removed)")
        .expect("untracked files pattern is valid")
});
static CONFLICT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^CONFLICT|Automatic merge failed").expect("conflict pattern is valid")
});

/// Produce generated output inside a directory.
pub trait Generator {
    /// Generate output into directory.
    ///
    /// # Errors
    ///
    /// - Return [`BuildError`] if generation fails.
    fn generate(&self, dir: &Path) -> Result<(), BuildError>;
}

impl Generator for Builder {
    fn generate(&self, dir: &Path) -> Result<(), BuildError> {
        self.build(dir)?;
        self.run_postgenerate(dir)
    }
}

impl<F> Generator for F
where
    F: Fn(&Path) -> Result<(), BuildError>,
{
    fn generate(&self, dir: &Path) -> Result<(), BuildError> {
        self(dir)
    }
}

/// Facts about a project repository.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RepositoryState {
    /// Directory is the top level of a working tree.
    pub is_root: bool,

    /// `HEAD` points to a commit.
    pub has_commits: bool,

    /// Merge is in progress.
    pub merging: bool,

    /// Latest generated commit.
    pub marker: Option<String>,
}

/// Result of a synchronization request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    NotRepositoryRoot,
    MergeInProgress,
    AlreadyInitialized,
    AlreadyUpToDate,
    NotInitialized,
    EmptyRepository,

    /// Generated branch was pulled, merge is left uncommitted.
    Merged { conflicts: bool },
}

impl Display for SyncOutcome {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::NotRepositoryRoot => {
                fmt.write_str("project directory is not the root of a git repository")
            }
            Self::MergeInProgress => {
                fmt.write_str("a merge is in progress, resolve or abort it first")
            }
            Self::AlreadyInitialized => {
                fmt.write_str("project is already initialized, use --force to initialize again")
            }
            Self::AlreadyUpToDate => fmt.write_str("project is already up to date"),
            Self::NotInitialized => fmt.write_str("project has not been initialized yet"),
            Self::EmptyRepository => fmt.write_str("repository has no commits to update"),
            Self::Merged { conflicts: false } => {
                fmt.write_str("generated changes merged, review and commit them")
            }
            Self::Merged { conflicts: true } => {
                fmt.write_str("generated changes merged with conflicts, resolve and commit them")
            }
        }
    }
}

/// Synchronize generated output with a project repository.
#[derive(Debug, Clone)]
pub struct Synchronizer<G: GitClient> {
    git: G,
    project: PathBuf,
    settings: GitSettings,
}

impl<G: GitClient> Synchronizer<G> {
    pub fn new(git: G, project: impl Into<PathBuf>, settings: GitSettings) -> Self {
        Self {
            git,
            project: project.into(),
            settings,
        }
    }

    pub fn project(&self) -> &Path {
        &self.project
    }

    fn identity(&self) -> Identity {
        let default = Identity::default();
        Identity {
            name: self.settings.user_name.clone().unwrap_or(default.name),
            email: self.settings.user_email.clone().unwrap_or(default.email),
        }
    }

    /// Gather facts about the project repository.
    ///
    /// # Errors
    ///
    /// - Return [`SyncError::Git`] if repository cannot be inspected.
    pub fn state(&self) -> Result<RepositoryState> {
        if !self.git.is_repository_root(&self.project)? {
            return Ok(RepositoryState::default());
        }

        let has_commits = self.git.has_commits(&self.project)?;
        let marker = if has_commits {
            self.git.find_commit(&self.project, MARKER_PATTERN)?
        } else {
            None
        };

        Ok(RepositoryState {
            is_root: true,
            has_commits,
            merging: self.git.is_merging(&self.project)?,
            marker,
        })
    }

    /// Generate output and merge it into a project for the first time.
    ///
    /// # Errors
    ///
    /// - Return [`SyncError::LocalChanges`] or
    ///   [`SyncError::UntrackedOverwritten`] if the merge would destroy
    ///   work of the user.
    /// - Return [`SyncError`] if generation or any git operation fails.
    #[instrument(skip(self, generator), level = "debug")]
    pub fn initialize(&self, generator: &dyn Generator, force: bool) -> Result<SyncOutcome> {
        let mut state = self.state()?;
        if !state.is_root {
            return Ok(SyncOutcome::NotRepositoryRoot);
        }

        if !state.has_commits {
            info!("create initial commit in empty repository");
            self.git
                .commit(&self.project, INITIAL_COMMIT_MESSAGE, true, None)?;
            state.has_commits = true;
        }

        if state.merging {
            return Ok(SyncOutcome::MergeInProgress);
        }

        if !force && state.marker.is_some() {
            return Ok(SyncOutcome::AlreadyInitialized);
        }

        let scratch = self.scratch(None)?;
        generator.generate(scratch.path())?;
        self.git.add_all(scratch.path())?;
        self.git.commit(
            scratch.path(),
            INITIALIZE_COMMIT_MESSAGE,
            true,
            Some(&self.identity()),
        )?;

        self.merge(scratch.path(), "initialize")
    }

    /// Regenerate output and merge what changed since the last generation.
    ///
    /// # Errors
    ///
    /// - Return [`SyncError::LocalChanges`] or
    ///   [`SyncError::UntrackedOverwritten`] if the merge would destroy
    ///   work of the user.
    /// - Return [`SyncError`] if generation or any git operation fails.
    #[instrument(skip(self, generator), level = "debug")]
    pub fn update(&self, generator: &dyn Generator) -> Result<SyncOutcome> {
        let state = self.state()?;
        if !state.is_root {
            return Ok(SyncOutcome::NotRepositoryRoot);
        }

        if !state.has_commits {
            return Ok(SyncOutcome::EmptyRepository);
        }

        if state.merging {
            return Ok(SyncOutcome::MergeInProgress);
        }

        let Some(marker) = state.marker else {
            return Ok(SyncOutcome::NotInitialized);
        };

        let scratch = self.scratch(Some(&marker))?;
        generator.generate(scratch.path())?;
        self.git.add_all(scratch.path())?;
        if self.git.status(scratch.path())?.trim().is_empty() {
            info!("generated output did not change since {marker}");
            return Ok(SyncOutcome::AlreadyUpToDate);
        }

        self.git.commit(
            scratch.path(),
            UPDATE_COMMIT_MESSAGE,
            false,
            Some(&self.identity()),
        )?;

        self.merge(scratch.path(), "update")
    }

    // Clone project into fresh scratch directory with HEAD on the orphan branch.
    fn scratch(&self, marker: Option<&str>) -> Result<tempfile::TempDir> {
        let scratch = tempfile::Builder::new()
            .prefix("magicspace-")
            .tempdir()
            .map_err(SyncError::Scratch)?;
        debug!("scratch directory {:?}", scratch.path().display());

        self.git.clone_shared(&self.project, scratch.path())?;
        self.git.symbolic_ref(
            scratch.path(),
            "HEAD",
            &format!("refs/heads/{BRANCH_NAME}"),
        )?;
        if let Some(marker) = marker {
            self.git.reset(scratch.path(), marker)?;
        }

        Ok(scratch)
    }

    fn merge(&self, scratch: &Path, operation: &str) -> Result<SyncOutcome> {
        self.git
            .remote_add(&self.project, BRANCH_NAME, &scratch.join(".git"))?;

        let options = PullOptions {
            strategy: self.settings.strategy,
            rename_threshold: self.settings.rename_threshold,
        };
        let pulled = self
            .git
            .pull(&self.project, BRANCH_NAME, BRANCH_NAME, &options);

        // INVARIANT: Temporary remote never outlives the pull.
        if let Err(error) = self.git.remote_remove(&self.project, BRANCH_NAME) {
            warn!("failed to remove temporary remote: {error}");
        }

        let conflicts = match pulled {
            Ok(_) => false,
            Err(error) => classify_pull_failure(error)?,
        };

        self.rewrite_merge_message(operation)?;
        Ok(SyncOutcome::Merged { conflicts })
    }

    fn rewrite_merge_message(&self, operation: &str) -> Result<()> {
        let path = self.git.git_dir(&self.project)?.join("MERGE_MSG");
        if !path.exists() {
            return Ok(());
        }

        write(&path, format!("Merge magicspace {operation} changes\n")).map_err(|err| {
            SyncError::MergeMessage {
                source: err,
                path: path.clone(),
            }
        })
    }

    /// Detect directories the pending merge renamed.
    ///
    /// # Errors
    ///
    /// - Return [`SyncError::NotMerging`] if no merge is in progress.
    /// - Return [`SyncError::Git`] if merged commit cannot be inspected.
    #[instrument(skip(self), level = "debug")]
    pub fn detect_renames(&self) -> Result<Vec<Rename>> {
        if !self.git.is_merging(&self.project)? {
            return Err(SyncError::NotMerging);
        }

        let patch = self
            .git
            .show_renames(&self.project, "MERGE_HEAD", self.settings.rename_threshold)?;
        Ok(detect_renames(&patch, |dir| self.project.join(dir).is_dir()))
    }

    /// Move content of renamed directories to their new location.
    ///
    /// Entries that already exist at the new location are left in place.
    ///
    /// # Errors
    ///
    /// - Return [`SyncError::Move`] if an entry cannot be moved.
    #[instrument(skip(self, renames), level = "debug")]
    pub fn apply_renames(&self, renames: &[Rename]) -> Result<Vec<PathBuf>> {
        let mut moved = Vec::new();
        for rename in renames {
            let from = self.project.join(&rename.from);
            let to = self.project.join(&rename.to);
            let entries = read_dir(&from).map_err(|err| SyncError::Move {
                source: err,
                path: from.clone(),
            })?;
            create_dir_all(&to).map_err(|err| SyncError::Move {
                source: err,
                path: to.clone(),
            })?;

            for entry in entries {
                let entry = entry.map_err(|err| SyncError::Move {
                    source: err,
                    path: from.clone(),
                })?;
                let target = to.join(entry.file_name());
                if target.exists() {
                    warn!("keep {:?}, {:?} already exists", entry.path().display(), target.display());
                    continue;
                }

                move_path(entry.path(), &target).map_err(|err| SyncError::Move {
                    source: err,
                    path: entry.path(),
                })?;
                info!("move {:?} to {:?}", entry.path().display(), target.display());
                moved.push(target);
            }
        }

        Ok(moved)
    }
}

// Content conflicts are expected, destroying local work is not.
fn classify_pull_failure(error: GitError) -> Result<bool> {
    let output = error.output();
    if LOCAL_CHANGES_RE.is_match(&output) {
        return Err(SyncError::LocalChanges(output.trim().to_string()));
    }

    if UNTRACKED_RE.is_match(&output) {
        return Err(SyncError::UntrackedOverwritten(output.trim().to_string()));
    }

    if CONFLICT_RE.is_match(&output) {
        warn!("merge stopped with conflicts");
        return Ok(true);
    }

    Err(SyncError::Git(error))
}

/// Synchronization error types.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Git(#[from] GitError),

    #[error(transparent)]
    Build(#[from] BuildError),

    /// Scratch directory cannot be created.
    #[error("failed to create scratch directory")]
    Scratch(#[source] std::io::Error),

    /// Merge would overwrite uncommitted changes.
    #[error("merge would overwrite local changes, commit or stash them first:\n{0}")]
    LocalChanges(String),

    /// Merge would overwrite untracked files.
    #[error("merge would overwrite untracked files, move or remove them first:\n{0}")]
    UntrackedOverwritten(String),

    /// Merge message cannot be rewritten.
    #[error("failed to write merge message at {:?}", path.display())]
    MergeMessage {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Rename detection requires an uncommitted merge.
    #[error("no merge in progress, run update first")]
    NotMerging,

    /// Renamed directory content cannot be moved.
    #[error("failed to move {:?}", path.display())]
    Move {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = SyncError> = std::result::Result<T, E>;
