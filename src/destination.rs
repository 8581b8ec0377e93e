// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Destination merge engine.
//!
//! Template entries never write to disk directly. Instead, every entry
//! __updates__ a destination file held in memory, and once all entries have
//! been composed, every destination file is __flushed__ to disk in the order
//! it was first touched.
//!
//! # Destination Kinds
//!
//! Each destination kind is served by a [`DestinationFactory`] registered
//! under the kind's tag in a [`DestinationRegistry`]:
//!
//! - `json` and `toml`: structured files addressed through property paths,
//!   see [`structured`].
//! - `text`: plain text with append/prepend merging, see [`text`].
//! - `blob`: raw bytes, see [`text`].
//!
//! Destination files are keyed by their absolute path plus their kind, so
//! repeated updates to the same file fold into one pending state according
//! to their merge strategy. Because entries are composed strictly one after
//! another, the duplicate write check of the `error` strategy depends on the
//! order in which templates are applied.

pub mod format;
pub mod structured;
pub mod text;

use crate::{
    config::DestinationConfig,
    destination::{
        format::CodeFormatter,
        structured::{JsonFormat, StructuredFile, TomlFormat},
        text::{BlobFile, TextFile},
    },
    source::Composed,
    structured::PropertyPath,
};

use indexmap::IndexMap;
use std::{
    collections::HashMap,
    fmt::{Debug, Formatter, Result as FmtResult},
    fs::{create_dir_all, write},
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::{debug, info, instrument};

/// In-memory destination file.
pub trait DestinationFile: Send {
    /// Absolute path file is flushed to.
    fn path(&self) -> &Path;

    /// Fold content into pending state of file.
    fn update(&mut self, content: Composed, config: &DestinationConfig) -> Result<()>;

    /// Render final file content, merging with existing file on disk.
    ///
    /// Returns `None` when there is nothing to write.
    fn render(&self, formatter: &dyn CodeFormatter) -> Result<Option<Vec<u8>>>;
}

/// Capability of creating destination files of one kind.
pub trait DestinationFactory: Send + Sync {
    fn create(&self, path: PathBuf) -> Box<dyn DestinationFile>;
}

impl<F> DestinationFactory for F
where
    F: Fn(PathBuf) -> Box<dyn DestinationFile> + Send + Sync,
{
    fn create(&self, path: PathBuf) -> Box<dyn DestinationFile> {
        self(path)
    }
}

/// Destination kinds available to a build.
#[derive(Clone)]
pub struct DestinationRegistry {
    factories: HashMap<String, Arc<dyn DestinationFactory>>,
}

impl DestinationRegistry {
    /// Construct registry without any destination kinds.
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register factory for destination kind, replacing any previous one.
    pub fn register(&mut self, kind: impl Into<String>, factory: impl DestinationFactory + 'static) {
        self.factories.insert(kind.into(), Arc::new(factory));
    }

    pub fn get(&self, kind: &str) -> Option<&dyn DestinationFactory> {
        self.factories.get(kind).map(|factory| factory.as_ref())
    }
}

impl Default for DestinationRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register("json", |path: PathBuf| -> Box<dyn DestinationFile> {
            Box::new(StructuredFile::new(path, JsonFormat))
        });
        registry.register("toml", |path: PathBuf| -> Box<dyn DestinationFile> {
            Box::new(StructuredFile::new(path, TomlFormat))
        });
        registry.register("text", |path: PathBuf| -> Box<dyn DestinationFile> {
            Box::new(TextFile::new(path))
        });
        registry.register("blob", |path: PathBuf| -> Box<dyn DestinationFile> {
            Box::new(BlobFile::new(path))
        });
        registry
    }
}

impl Debug for DestinationRegistry {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        let mut kinds = self.factories.keys().collect::<Vec<_>>();
        kinds.sort();
        fmt.debug_struct("DestinationRegistry")
            .field("kinds", &kinds)
            .finish()
    }
}

/// Set of destination files touched by a build.
#[derive(Default)]
pub struct DestinationSet {
    files: IndexMap<(PathBuf, String), Box<dyn DestinationFile>>,
}

impl DestinationSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Fold content into destination file at absolute path.
    ///
    /// # Errors
    ///
    /// - Return [`DestinationError::UnknownKind`] if no factory is registered
    ///   for the destination kind.
    /// - Return [`DestinationError`] if content cannot be folded in.
    pub fn update(
        &mut self,
        registry: &DestinationRegistry,
        path: PathBuf,
        content: Composed,
        config: &DestinationConfig,
    ) -> Result<()> {
        let kind = config.kind();
        let key = (path.clone(), kind.to_string());
        if !self.files.contains_key(&key) {
            let factory = registry
                .get(kind)
                .ok_or_else(|| DestinationError::UnknownKind(kind.to_string()))?;
            debug!("open {kind} destination {:?}", path.display());
            self.files.insert(key.clone(), factory.create(path));
        }

        match self.files.get_mut(&key) {
            Some(file) => file.update(content, config),
            None => Err(DestinationError::UnknownKind(kind.to_string())),
        }
    }

    /// Write every destination file to disk.
    ///
    /// Files are written in the order they were first updated. Parent
    /// directories are created as needed.
    ///
    /// # Errors
    ///
    /// - Return [`DestinationError`] if any file fails to render or write.
    #[instrument(skip(self, formatter), level = "debug")]
    pub fn flush(&mut self, formatter: &dyn CodeFormatter) -> Result<Vec<PathBuf>> {
        let mut written = Vec::new();
        for (_, file) in self.files.drain(..) {
            let Some(bytes) = file.render(formatter)? else {
                debug!("nothing to write for {:?}", file.path().display());
                continue;
            };

            let path = file.path().to_path_buf();
            if let Some(parent) = path.parent() {
                create_dir_all(parent).map_err(|err| DestinationError::Write {
                    source: err,
                    path: parent.to_path_buf(),
                })?;
            }
            write(&path, bytes).map_err(|err| DestinationError::Write {
                source: err,
                path: path.clone(),
            })?;
            info!("write {:?}", path.display());
            written.push(path);
        }

        Ok(written)
    }
}

impl Debug for DestinationSet {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.debug_list()
            .entries(self.files.keys().map(|(path, kind)| format!("{kind}:{}", path.display())))
            .finish()
    }
}

/// Destination merge error types.
#[derive(Debug, thiserror::Error)]
pub enum DestinationError {
    /// No factory registered for destination kind.
    #[error("no destination registered for kind {0:?}")]
    UnknownKind(String),

    /// Second write to the same property with the `error` strategy.
    #[error("duplicate write to {property_path} of {:?}", path.display())]
    DuplicateWrite {
        path: PathBuf,
        property_path: PropertyPath,
    },

    /// Merge strategy cannot combine the given values.
    #[error(
        "{strategy} merge at {property_path} of {:?} requires {expected} values, found {found}",
        path.display()
    )]
    StrategyMismatch {
        path: PathBuf,
        property_path: PropertyPath,
        strategy: String,
        expected: &'static str,
        found: &'static str,
    },

    /// Spread requested for content that is not an object.
    #[error("cannot spread {found} into {property_path} of {:?}", path.display())]
    SpreadNonObject {
        path: PathBuf,
        property_path: PropertyPath,
        found: &'static str,
    },

    /// Property path addresses an array index past the supported limit.
    #[error(
        "array index in {property_path} of {:?} exceeds {}",
        path.display(),
        crate::structured::MAX_ARRAY_INDEX
    )]
    IndexLimit {
        path: PathBuf,
        property_path: PropertyPath,
    },

    /// Destination received content it cannot hold.
    #[error("{:?} cannot hold {found} content", path.display())]
    ContentMismatch { path: PathBuf, found: &'static str },

    /// Destination file received configuration of another kind.
    #[error("{:?} cannot be updated as {found} destination", path.display())]
    ConfigMismatch { path: PathBuf, found: &'static str },

    /// Existing file on disk cannot be read.
    #[error("failed to read destination at {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Existing file on disk is malformed.
    #[error("failed to parse destination at {:?}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    /// Final content cannot be serialized.
    #[error("failed to serialize destination at {:?}: {message}", path.display())]
    Serialize { path: PathBuf, message: String },

    /// Formatter failed on final content.
    #[error(transparent)]
    Format(#[from] crate::destination::format::FormatError),

    /// Final content cannot be written.
    #[error("failed to write destination at {:?}", path.display())]
    Write {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = DestinationError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{StructuredDestination, TextDestination, TextMergeStrategy},
        destination::format::PlainFormatter,
        structured::Structured,
    };
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::fs::read_to_string;

    #[test]
    fn flush_writes_in_first_touch_order() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let registry = DestinationRegistry::default();
        let mut set = DestinationSet::new();

        let gitignore = dir.path().join(".gitignore");
        let package = dir.path().join("nested/package.json");
        set.update(
            &registry,
            gitignore.clone(),
            Composed::Text("node_modules\n".into()),
            &DestinationConfig::Text(TextDestination {
                file_path: ".gitignore".into(),
                merge_strategy: TextMergeStrategy::Append,
            }),
        )?;
        set.update(
            &registry,
            package.clone(),
            Composed::Structured(Structured::from(json!({"name": "demo"}))),
            &DestinationConfig::Json(StructuredDestination::new("nested/package.json")),
        )?;
        assert_eq!(set.len(), 2);

        let written = set.flush(&PlainFormatter)?;
        assert_eq!(written, vec![gitignore.clone(), package.clone()]);
        assert_eq!(read_to_string(gitignore)?, "node_modules\n");
        assert_eq!(read_to_string(package)?, "{\n  \"name\": \"demo\"\n}\n");
        assert!(set.is_empty());

        Ok(())
    }

    #[test]
    fn unknown_destination_kind() {
        let registry = DestinationRegistry::empty();
        let mut set = DestinationSet::new();
        let result = set.update(
            &registry,
            PathBuf::from("/x/package.json"),
            Composed::Structured(Structured::Null),
            &DestinationConfig::Json(StructuredDestination::new("package.json")),
        );
        assert!(matches!(result, Err(DestinationError::UnknownKind(kind)) if kind == "json"));
    }

    #[test]
    fn custom_factory_replaces_builtin_kind() -> anyhow::Result<()> {
        struct Silent(PathBuf);

        impl DestinationFile for Silent {
            fn path(&self) -> &Path {
                &self.0
            }

            fn update(&mut self, _: Composed, _: &DestinationConfig) -> Result<()> {
                Ok(())
            }

            fn render(&self, _: &dyn CodeFormatter) -> Result<Option<Vec<u8>>> {
                Ok(None)
            }
        }

        let dir = tempfile::tempdir()?;
        let mut registry = DestinationRegistry::default();
        registry.register("json", |path: PathBuf| -> Box<dyn DestinationFile> {
            Box::new(Silent(path))
        });
        let mut set = DestinationSet::new();
        set.update(
            &registry,
            dir.path().join("package.json"),
            Composed::Structured(Structured::Null),
            &DestinationConfig::Json(StructuredDestination::new("package.json")),
        )?;

        assert!(set.flush(&PlainFormatter)?.is_empty());
        assert!(!dir.path().join("package.json").exists());

        Ok(())
    }
}
