// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT


use anyhow::{bail, Result};
use git2::{IndexEntry, IndexTime, Repository, RepositoryInitOptions};
use std::{
    fs::{create_dir_all, read_to_string, write},
    path::{Path, PathBuf},
    process::Command,
};

pub(crate) struct RepoFixture {
    repo: Repository,
    path: PathBuf,
}

impl RepoFixture {
    pub(crate) fn new(path: impl AsRef<Path>) -> Result<Self> {
        let mut opts = RepositoryInitOptions::new();
        opts.initial_head("main");
        let repo = Repository::init_opts(path.as_ref(), &opts)?;

        // INVARIANT: Always provide valid name and email.
        //   - Git will complain if this is not set in CI/CD environments.
        let mut config = repo.config()?;
        config.set_str("user.name", "John Doe")?;
        config.set_str("user.email", "john@doe.com")?;

        Ok(Self {
            repo,
            path: path.as_ref().to_path_buf(),
        })
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn write(&self, filename: impl AsRef<Path>, contents: impl AsRef<str>) -> Result<()> {
        let path = self.path.join(filename);
        if let Some(parent) = path.parent() {
            create_dir_all(parent)?;
        }
        write(path, contents.as_ref())?;
        Ok(())
    }

    pub(crate) fn read(&self, filename: impl AsRef<Path>) -> Result<String> {
        Ok(read_to_string(self.path.join(filename))?)
    }

    pub(crate) fn stage_and_commit(
        &self,
        filename: impl AsRef<Path>,
        contents: impl AsRef<str>,
    ) -> Result<()> {
        let entry = IndexEntry {
            ctime: IndexTime::new(0, 0),
            mtime: IndexTime::new(0, 0),
            dev: 0,
            ino: 0,
            mode: 0o100644,
            uid: 0,
            gid: 0,
            file_size: contents.as_ref().len() as u32,
            id: self.repo.blob(contents.as_ref().as_bytes())?,
            flags: 0,
            flags_extended: 0,
            path: filename.as_ref().to_string_lossy().into_owned().into_bytes(),
        };

        // INVARIANT: Working tree matches index, so status stays clean.
        self.write(&filename, &contents)?;

        // INVARIANT: Reload index, git binary may have rewritten it.
        let mut index = self.repo.index()?;
        index.read(true)?;
        index.add_frombuffer(&entry, contents.as_ref().as_bytes())?;
        index.write()?;
        let tree_oid = index.write_tree()?;
        let tree = self.repo.find_tree(tree_oid)?;

        let signature = self.repo.signature()?;
        let mut parents = Vec::new();
        if let Some(parent) = self.repo.head().ok().and_then(|head| head.target()) {
            parents.push(self.repo.find_commit(parent)?);
        }
        let parents = parents.iter().collect::<Vec<_>>();

        self.repo.commit(
            Some("HEAD"),
            &signature,
            &signature,
            format!("chore: add {:?}", filename.as_ref()).as_ref(),
            &tree,
            &parents,
        )?;

        Ok(())
    }

    /// Commit pending merge with its prepared message.
    pub(crate) fn commit_merge(&self) -> Result<()> {
        self.git(["commit", "--no-edit", "--quiet"])
    }

    pub(crate) fn git<const N: usize>(&self, args: [&str; N]) -> Result<()> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.path)
            .output()?;
        if !output.status.success() {
            bail!(
                "git {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(output.stderr.as_slice())
            );
        }

        Ok(())
    }

    pub(crate) fn set_config(&self, key: &str, value: &str) -> Result<()> {
        self.repo.config()?.set_str(key, value)?;
        Ok(())
    }

    pub(crate) fn remotes(&self) -> Result<Vec<String>> {
        // INVARIANT: Reopen repository, git binary may have rewritten config.
        let repo = Repository::open(&self.path)?;
        let remotes = repo.remotes()?;
        Ok(remotes.iter().flatten().map(String::from).collect())
    }

    pub(crate) fn merge_message(&self) -> Result<String> {
        Ok(read_to_string(self.repo.path().join("MERGE_MSG"))?)
    }

    pub(crate) fn head_message(&self) -> Result<String> {
        let commit = self.repo.head()?.peel_to_commit()?;
        Ok(commit.message().unwrap_or_default().to_string())
    }
}
