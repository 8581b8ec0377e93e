// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Composable source resolvers.
//!
//! Each template entry names a __source__ that produces its content. Every
//! source kind is served by a [`SourceLoader`] registered under the kind's
//! tag in the builder's registry:
//!
//! - `inline`: literal value from the bundle definition.
//! - `json`: JSON file with comments, optionally narrowed to a property path.
//! - `module`: value or callback registered in the [`ModuleTable`].
//! - `text`: UTF-8 text file.
//! - `handlebars`: UTF-8 text file rendered with the bundle options.
//! - `blob`: raw bytes.
//!
//! Source files are resolved relative to the directory of the bundle that
//! declared the template. Failing to load a source is fatal for the whole
//! build.

use crate::{
    bundle::TemplateContext,
    config::{Options, SourceConfig},
    structured::Structured,
};

use handlebars::Handlebars;
use serde_json::Value;
use std::{
    collections::HashMap,
    fmt::{Debug, Formatter, Result as FmtResult},
    fs::{read, read_to_string},
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::{debug, instrument};

/// Content produced by a source.
#[derive(Debug, Clone, PartialEq)]
pub enum Composed {
    Structured(Structured),
    Text(String),
    Bytes(Vec<u8>),
}

impl Composed {
    /// Short name of content kind for error reporting.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Structured(_) => "structured",
            Self::Text(_) => "text",
            Self::Bytes(_) => "bytes",
        }
    }
}

/// Helpers handed to module callbacks.
#[derive(Debug, Clone, Copy)]
pub struct Helpers<'a> {
    pub context: &'a TemplateContext,
}

impl Helpers<'_> {
    /// Mark value as placeholder: applied only when destination lacks one.
    pub fn placeholder(&self, value: impl Into<Structured>) -> Structured {
        Structured::placeholder(value)
    }
}

/// Callback producing structured content from options.
pub type ModuleCallback =
    dyn Fn(&Options, &Helpers<'_>) -> anyhow::Result<Structured> + Send + Sync + 'static;

/// Registered module.
#[derive(Clone)]
pub enum Module {
    /// Plain exported value.
    Value(Structured),

    /// Callable export invoked with options and helpers.
    Callback(Arc<ModuleCallback>),
}

impl Module {
    pub fn callback<F>(callback: F) -> Self
    where
        F: Fn(&Options, &Helpers<'_>) -> anyhow::Result<Structured> + Send + Sync + 'static,
    {
        Self::Callback(Arc::new(callback))
    }
}

impl Debug for Module {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Value(value) => fmt.debug_tuple("Value").field(value).finish(),
            Self::Callback(_) => fmt.write_str("Callback(..)"),
        }
    }
}

/// Modules addressable by `module` sources.
#[derive(Debug, Default, Clone)]
pub struct ModuleTable {
    modules: HashMap<String, Module>,
}

impl ModuleTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register module under name, replacing any previous registration.
    pub fn register(&mut self, name: impl Into<String>, module: Module) {
        self.modules.insert(name.into(), module);
    }

    pub fn get(&self, name: &str) -> Option<&Module> {
        self.modules.get(name)
    }
}

/// Everything a loader may need to produce content.
#[derive(Debug, Clone, Copy)]
pub struct LoadScope<'a> {
    /// Directory of the bundle that declared the template.
    pub base_dir: &'a Path,

    /// Final options of the declaring bundle.
    pub options: &'a Options,

    /// Workspace and project the template is applied to.
    pub context: &'a TemplateContext,

    /// Registered modules.
    pub modules: &'a ModuleTable,
}

impl LoadScope<'_> {
    fn resolve(&self, file_path: &Path) -> PathBuf {
        self.base_dir.join(file_path)
    }
}

/// Capability of loading one kind of source.
pub trait SourceLoader: Send + Sync {
    /// Load content of source.
    ///
    /// Returns `None` when the source yields no content, e.g., a JSON
    /// property path that does not exist.
    fn load(&self, config: &SourceConfig, scope: &LoadScope<'_>) -> Result<Option<Composed>>;
}

/// Loader of `inline` sources.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineLoader;

impl SourceLoader for InlineLoader {
    fn load(&self, config: &SourceConfig, _scope: &LoadScope<'_>) -> Result<Option<Composed>> {
        match config {
            SourceConfig::Inline { value, .. } => Ok(Some(Composed::Structured(value.clone()))),
            other => Err(SourceError::KindMismatch {
                expected: "inline",
                found: other.kind(),
            }),
        }
    }
}

/// Loader of `json` sources.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonLoader;

impl SourceLoader for JsonLoader {
    #[instrument(skip(self, config, scope), level = "debug")]
    fn load(&self, config: &SourceConfig, scope: &LoadScope<'_>) -> Result<Option<Composed>> {
        let SourceConfig::Json {
            file_path,
            property_path,
            ..
        } = config
        else {
            return Err(SourceError::KindMismatch {
                expected: "json",
                found: config.kind(),
            });
        };

        let path = scope.resolve(file_path);
        let content = read_source(&path)?;
        let value: Value = serde_json_lenient::from_str(&content).map_err(|err| {
            SourceError::ParseJson {
                message: err.to_string(),
                path: path.clone(),
            }
        })?;
        let value = Structured::from(value);

        let Some(property_path) = property_path else {
            return Ok(Some(Composed::Structured(value)));
        };

        match value.get(property_path) {
            Some(extracted) => Ok(Some(Composed::Structured(extracted.clone()))),
            None => {
                debug!(
                    "property path {property_path} not found in {:?}",
                    path.display()
                );
                Ok(None)
            }
        }
    }
}

/// Loader of `module` sources.
#[derive(Debug, Default, Clone, Copy)]
pub struct ModuleLoader;

impl SourceLoader for ModuleLoader {
    fn load(&self, config: &SourceConfig, scope: &LoadScope<'_>) -> Result<Option<Composed>> {
        let SourceConfig::Module { name, .. } = config else {
            return Err(SourceError::KindMismatch {
                expected: "module",
                found: config.kind(),
            });
        };

        let module = scope
            .modules
            .get(name)
            .ok_or_else(|| SourceError::UnknownModule(name.clone()))?;

        let value = match module {
            Module::Value(value) => value.clone(),
            Module::Callback(callback) => {
                let helpers = Helpers {
                    context: scope.context,
                };
                callback(scope.options, &helpers).map_err(|err| SourceError::Module {
                    name: name.clone(),
                    source: err.into(),
                })?
            }
        };

        Ok(Some(Composed::Structured(value)))
    }
}

/// Loader of `text` sources.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextLoader;

impl SourceLoader for TextLoader {
    fn load(&self, config: &SourceConfig, scope: &LoadScope<'_>) -> Result<Option<Composed>> {
        let SourceConfig::Text { file_path, .. } = config else {
            return Err(SourceError::KindMismatch {
                expected: "text",
                found: config.kind(),
            });
        };

        Ok(Some(Composed::Text(read_source(&scope.resolve(file_path))?)))
    }
}

/// Loader of `handlebars` sources.
#[derive(Debug, Default, Clone, Copy)]
pub struct HandlebarsLoader;

impl SourceLoader for HandlebarsLoader {
    #[instrument(skip(self, config, scope), level = "debug")]
    fn load(&self, config: &SourceConfig, scope: &LoadScope<'_>) -> Result<Option<Composed>> {
        let SourceConfig::Handlebars { file_path, .. } = config else {
            return Err(SourceError::KindMismatch {
                expected: "handlebars",
                found: config.kind(),
            });
        };

        let path = scope.resolve(file_path);
        let template = read_source(&path)?;
        let mut renderer = Handlebars::new();
        renderer.register_escape_fn(handlebars::no_escape);
        let rendered = renderer
            .render_template(&template, &Value::Object(scope.options.clone()))
            .map_err(|err| SourceError::Render {
                message: err.to_string(),
                path,
            })?;

        Ok(Some(Composed::Text(rendered)))
    }
}

/// Loader of `blob` sources.
#[derive(Debug, Default, Clone, Copy)]
pub struct BlobLoader;

impl SourceLoader for BlobLoader {
    fn load(&self, config: &SourceConfig, scope: &LoadScope<'_>) -> Result<Option<Composed>> {
        let SourceConfig::Blob { file_path, .. } = config else {
            return Err(SourceError::KindMismatch {
                expected: "blob",
                found: config.kind(),
            });
        };

        let path = scope.resolve(file_path);
        let bytes = read(&path).map_err(|err| SourceError::Read { source: err, path })?;

        Ok(Some(Composed::Bytes(bytes)))
    }
}

fn read_source(path: &Path) -> Result<String> {
    read_to_string(path).map_err(|err| SourceError::Read {
        source: err,
        path: path.to_path_buf(),
    })
}

/// Source loading error types.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// Source file cannot be read.
    #[error("failed to read source at {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Source file is not valid JSON.
    #[error("failed to parse JSON source at {:?}: {message}", path.display())]
    ParseJson { message: String, path: PathBuf },

    /// Handlebars template failed to render.
    #[error("failed to render template at {:?}: {message}", path.display())]
    Render { message: String, path: PathBuf },

    /// No module registered under name.
    #[error("no module registered as {0:?}")]
    UnknownModule(String),

    /// Module callback failed.
    #[error("module {name:?} failed")]
    Module {
        name: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },

    /// Loader received a source of another kind.
    #[error("{expected} loader cannot load {found} source")]
    KindMismatch {
        expected: &'static str,
        found: &'static str,
    },
}

/// Friendly result alias :3
pub type Result<T, E = SourceError> = std::result::Result<T, E>;
