// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Text and blob destination files.
//!
//! Text files understand `append` and `prepend` on top of the basic
//! `error`, `ignore`, and `replace` strategies. Appending or prepending text
//! that the file already contains does nothing, which keeps repeated
//! generation of files like `.gitignore` idempotent.
//!
//! The strategy of the first write also decides how pending content meets a
//! file that already exists on disk: `append` and `prepend` merge into it,
//! `ignore` leaves it untouched, `error` and `replace` overwrite it.

use crate::{
    config::{BlobMergeStrategy, DestinationConfig, TextMergeStrategy},
    destination::{format::CodeFormatter, DestinationError, DestinationFile, Result},
    source::Composed,
    structured::PropertyPath,
};

use std::{
    fs::{read, read_to_string},
    path::{Path, PathBuf},
};
use tracing::debug;

// Join two chunks of text on a line boundary.
fn join(first: &str, second: &str) -> String {
    if first.is_empty() || first.ends_with('\n') {
        format!("{first}{second}")
    } else {
        format!("{first}\n{second}")
    }
}

fn append(prior: &str, next: &str) -> String {
    if prior.contains(next) {
        prior.to_string()
    } else {
        join(prior, next)
    }
}

fn prepend(prior: &str, next: &str) -> String {
    if prior.contains(next) {
        prior.to_string()
    } else {
        join(next, prior)
    }
}

/// Plain UTF-8 text destination.
#[derive(Debug, Clone)]
pub struct TextFile {
    path: PathBuf,
    pending: Option<(String, TextMergeStrategy)>,
}

impl TextFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            pending: None,
        }
    }

    /// Fold text into pending content.
    ///
    /// # Errors
    ///
    /// - Return [`DestinationError::DuplicateWrite`] for a second write with
    ///   the `error` strategy.
    pub fn fold(&mut self, text: String, strategy: TextMergeStrategy) -> Result<()> {
        let Some((prior, _)) = self.pending.as_mut() else {
            self.pending = Some((text, strategy));
            return Ok(());
        };

        match strategy {
            TextMergeStrategy::Error => {
                return Err(DestinationError::DuplicateWrite {
                    path: self.path.clone(),
                    property_path: PropertyPath::root(),
                })
            }
            TextMergeStrategy::Ignore => debug!("ignore write to {:?}", self.path.display()),
            TextMergeStrategy::Replace => *prior = text,
            TextMergeStrategy::Append => *prior = append(prior, &text),
            TextMergeStrategy::Prepend => *prior = prepend(prior, &text),
        }

        Ok(())
    }

    /// Compose final text against existing file on disk.
    ///
    /// # Errors
    ///
    /// - Return [`DestinationError::Read`] if existing file cannot be read.
    pub fn compose(&self) -> Result<Option<String>> {
        let Some((text, strategy)) = self.pending.as_ref() else {
            return Ok(None);
        };

        if !self.path.exists() {
            return Ok(Some(text.clone()));
        }

        let existing = || {
            read_to_string(&self.path).map_err(|err| DestinationError::Read {
                source: err,
                path: self.path.clone(),
            })
        };

        let composed = match strategy {
            TextMergeStrategy::Ignore => return Ok(None),
            TextMergeStrategy::Error | TextMergeStrategy::Replace => text.clone(),
            TextMergeStrategy::Append => append(&existing()?, text),
            TextMergeStrategy::Prepend => prepend(&existing()?, text),
        };

        Ok(Some(composed))
    }
}

impl DestinationFile for TextFile {
    fn path(&self) -> &Path {
        &self.path
    }

    fn update(&mut self, content: Composed, config: &DestinationConfig) -> Result<()> {
        let DestinationConfig::Text(config) = config else {
            return Err(DestinationError::ConfigMismatch {
                path: self.path.clone(),
                found: config.kind(),
            });
        };

        match content {
            Composed::Text(text) => self.fold(text, config.merge_strategy),
            other => Err(DestinationError::ContentMismatch {
                path: self.path.clone(),
                found: other.kind(),
            }),
        }
    }

    fn render(&self, _: &dyn CodeFormatter) -> Result<Option<Vec<u8>>> {
        Ok(self.compose()?.map(String::into_bytes))
    }
}

/// Raw byte destination.
#[derive(Debug, Clone)]
pub struct BlobFile {
    path: PathBuf,
    pending: Option<(Vec<u8>, BlobMergeStrategy)>,
}

impl BlobFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            pending: None,
        }
    }
}

impl DestinationFile for BlobFile {
    fn path(&self) -> &Path {
        &self.path
    }

    fn update(&mut self, content: Composed, config: &DestinationConfig) -> Result<()> {
        let DestinationConfig::Blob(config) = config else {
            return Err(DestinationError::ConfigMismatch {
                path: self.path.clone(),
                found: config.kind(),
            });
        };

        // Text sources may feed blob destinations.
        let bytes = match content {
            Composed::Bytes(bytes) => bytes,
            Composed::Text(text) => text.into_bytes(),
            other => {
                return Err(DestinationError::ContentMismatch {
                    path: self.path.clone(),
                    found: other.kind(),
                })
            }
        };

        let Some((prior, _)) = self.pending.as_mut() else {
            self.pending = Some((bytes, config.merge_strategy));
            return Ok(());
        };

        match config.merge_strategy {
            BlobMergeStrategy::Error => Err(DestinationError::DuplicateWrite {
                path: self.path.clone(),
                property_path: PropertyPath::root(),
            }),
            BlobMergeStrategy::Ignore => Ok(()),
            BlobMergeStrategy::Replace => {
                *prior = bytes;
                Ok(())
            }
        }
    }

    fn render(&self, _: &dyn CodeFormatter) -> Result<Option<Vec<u8>>> {
        let Some((bytes, strategy)) = self.pending.as_ref() else {
            return Ok(None);
        };

        if *strategy == BlobMergeStrategy::Ignore && self.path.exists() {
            debug!("keep existing blob {:?}", self.path.display());
            return Ok(None);
        }

        // Skip rewriting identical content.
        if self.path.exists() {
            let existing = read(&self.path).map_err(|err| DestinationError::Read {
                source: err,
                path: self.path.clone(),
            })?;
            if existing == *bytes {
                return Ok(None);
            }
        }

        Ok(Some(bytes.clone()))
    }
}
