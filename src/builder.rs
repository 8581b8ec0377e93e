// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Builder facade.
//!
//! Tie bundle resolution, source loading, and destination merging together
//! into one build pass over a template directory.
//!
//! # Registry
//!
//! Every kind of source and destination, every module, and every built-in
//! bundle a build can use is listed in a [`Registry`] handed to the
//! [`Builder`]. Nothing is looked up from global state, so independent
//! builders can use different tables side by side.
//!
//! # Build Pass
//!
//! 1. Resolve bundle trees of all projects in the template directory.
//! 2. Apply template entries one after another: skip file level placeholders
//!    whose destination exists, expand path placeholders, load the source,
//!    and fold the content into its destination file.
//! 3. Flush every destination file to the output directory.

use crate::{
    bundle::{discover_projects, BuiltinBundle, BundleError, BundleResolver, BundleTable, ResolvedBundle},
    config::{ConfigError, Settings},
    destination::{
        format::{CodeFormatter, CommandFormatter, PlainFormatter},
        DestinationError, DestinationFactory, DestinationRegistry, DestinationSet,
    },
    path::{expand_path_placeholders, ModuleSpecifierResolver, PathRoots},
    source::{
        BlobLoader, HandlebarsLoader, InlineLoader, JsonLoader, LoadScope, Module, ModuleLoader,
        ModuleTable, SourceError, SourceLoader, TextLoader,
    },
};

use std::{
    collections::HashMap,
    fmt::{Debug, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
    process::Command,
    sync::Arc,
};
use tracing::{debug, info, instrument};

/// Default name of template directory inside a project.
pub const DEFAULT_TEMPLATE_DIR: &str = ".magicspace";

/// Name of settings file inside template directory.
pub const SETTINGS_FILE: &str = "settings.toml";

/// Tables of everything a build can use.
#[derive(Clone)]
pub struct Registry {
    sources: HashMap<String, Arc<dyn SourceLoader>>,
    destinations: DestinationRegistry,
    modules: ModuleTable,
    bundles: BundleTable,
}

impl Registry {
    /// Construct registry without anything registered.
    pub fn empty() -> Self {
        Self {
            sources: HashMap::new(),
            destinations: DestinationRegistry::empty(),
            modules: ModuleTable::new(),
            bundles: BundleTable::new(),
        }
    }

    pub fn register_source(&mut self, kind: impl Into<String>, loader: impl SourceLoader + 'static) {
        self.sources.insert(kind.into(), Arc::new(loader));
    }

    pub fn register_destination(
        &mut self,
        kind: impl Into<String>,
        factory: impl DestinationFactory + 'static,
    ) {
        self.destinations.register(kind, factory);
    }

    pub fn register_module(&mut self, name: impl Into<String>, module: Module) {
        self.modules.register(name, module);
    }

    pub fn register_bundle(&mut self, name: impl Into<String>, bundle: BuiltinBundle) {
        self.bundles.register(name, bundle);
    }

    pub fn source(&self, kind: &str) -> Option<&dyn SourceLoader> {
        self.sources.get(kind).map(|loader| loader.as_ref())
    }

    pub fn destinations(&self) -> &DestinationRegistry {
        &self.destinations
    }

    pub fn modules(&self) -> &ModuleTable {
        &self.modules
    }

    pub fn bundles(&self) -> &BundleTable {
        &self.bundles
    }
}

impl Default for Registry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register_source("inline", InlineLoader);
        registry.register_source("json", JsonLoader);
        registry.register_source("module", ModuleLoader);
        registry.register_source("text", TextLoader);
        registry.register_source("handlebars", HandlebarsLoader);
        registry.register_source("blob", BlobLoader);
        registry.destinations = DestinationRegistry::default();
        registry
    }
}

impl Debug for Registry {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        let mut sources = self.sources.keys().collect::<Vec<_>>();
        sources.sort();
        fmt.debug_struct("Registry")
            .field("sources", &sources)
            .field("destinations", &self.destinations)
            .field("modules", &self.modules)
            .field("bundles", &self.bundles)
            .finish()
    }
}

/// Result of a build pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BuildReport {
    /// Files written, in flush order.
    pub written: Vec<PathBuf>,

    /// Template entries applied.
    pub applied: usize,

    /// Template entries skipped.
    pub skipped: usize,
}

/// Generate output of a template directory.
#[derive(Debug, Clone)]
pub struct Builder {
    template_dir: PathBuf,
    registry: Registry,
    settings: Settings,
}

impl Builder {
    /// Construct builder over template directory.
    pub fn new(template_dir: impl Into<PathBuf>, registry: Registry, settings: Settings) -> Self {
        Self {
            template_dir: template_dir.into(),
            registry,
            settings,
        }
    }

    /// Construct builder with default registry, loading settings from the
    /// template directory.
    ///
    /// # Errors
    ///
    /// - Return [`BuildError::Config`] if settings file is malformed.
    pub fn open(template_dir: impl Into<PathBuf>) -> Result<Self> {
        let template_dir = template_dir.into();
        let settings = Settings::load(template_dir.join(SETTINGS_FILE))?;
        Ok(Self::new(template_dir, Registry::default(), settings))
    }

    pub fn template_dir(&self) -> &Path {
        &self.template_dir
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    fn specifiers(&self) -> ModuleSpecifierResolver {
        let resolve = &self.settings.resolve;
        let mut specifiers = ModuleSpecifierResolver::new()
            .with_package_dirs(resolve.package_dirs.iter().map(|dir| self.template_dir.join(dir)))
            .with_builtins(self.registry.bundles.names());
        if let Some(base_url) = &resolve.base_url {
            specifiers = specifiers.with_base_url(self.template_dir.join(base_url));
        }

        specifiers
    }

    fn formatter(&self) -> Box<dyn CodeFormatter> {
        match self
            .settings
            .format
            .command
            .as_deref()
            .and_then(CommandFormatter::from_command_line)
        {
            Some(formatter) => Box::new(formatter),
            None => Box::new(PlainFormatter),
        }
    }

    /// Resolve bundles of all projects against output directory.
    ///
    /// # Errors
    ///
    /// - Return [`BuildError::Bundle`] if bundle resolution fails.
    #[instrument(skip(self, output_dir), level = "debug")]
    pub fn resolve(&self, output_dir: impl AsRef<Path>) -> Result<Vec<ResolvedBundle>> {
        let output_dir = output_dir.as_ref();
        let specifiers = self.specifiers();
        let mut resolver = BundleResolver::new(&specifiers, &self.registry.bundles, output_dir);
        for root in discover_projects(&self.template_dir, output_dir)? {
            resolver.add_project(root)?;
        }

        Ok(resolver.finish()?)
    }

    /// Generate output into directory.
    ///
    /// # Errors
    ///
    /// - Return [`BuildError`] if resolution, loading, merging, or writing
    ///   fails. Nothing is written unless every entry merges cleanly.
    #[instrument(skip(self, output_dir), level = "debug")]
    pub fn build(&self, output_dir: impl AsRef<Path>) -> Result<BuildReport> {
        let output_dir = output_dir.as_ref();
        info!("generate {:?} into {:?}", self.template_dir.display(), output_dir.display());

        let bundles = self.resolve(output_dir)?;
        let mut report = BuildReport::default();
        let mut set = DestinationSet::new();
        for bundle in &bundles {
            let (applied, skipped) = self.apply(bundle, &mut set)?;
            report.applied += applied;
            report.skipped += skipped;
        }

        report.written = set.flush(self.formatter().as_ref())?;
        info!(
            "applied {} templates, skipped {}, wrote {} files",
            report.applied,
            report.skipped,
            report.written.len()
        );

        Ok(report)
    }

    fn apply(&self, bundle: &ResolvedBundle, set: &mut DestinationSet) -> Result<(usize, usize)> {
        let context = &bundle.context;
        let project_root = context
            .project
            .as_ref()
            .map(|project| project.path.as_path())
            .unwrap_or(context.workspace.as_path());
        let roots = PathRoots {
            workspace: &context.workspace,
            project: project_root,
            scope: context.scope_root(),
        };
        let scope = LoadScope {
            base_dir: &bundle.base_dir,
            options: &bundle.options,
            context,
            modules: &self.registry.modules,
        };

        let (mut applied, mut skipped) = (0, 0);
        for template in &bundle.templates {
            let path = expand_path_placeholders(template.destination.file_path(), &roots);

            // INVARIANT: File level placeholders never load their source.
            if template.source.placeholder() && path.exists() {
                debug!("keep existing {:?}", path.display());
                skipped += 1;
                continue;
            }

            let kind = template.source.kind();
            let loader = self
                .registry
                .source(kind)
                .ok_or_else(|| BuildError::UnknownSource(kind.to_string()))?;
            let Some(content) = loader.load(&template.source, &scope)? else {
                debug!("source of {:?} produced nothing", path.display());
                skipped += 1;
                continue;
            };

            set.update(&self.registry.destinations, path, content, &template.destination)
                .map_err(|err| BuildError::Merge {
                    bundle: bundle.name.clone(),
                    source: err,
                })?;
            applied += 1;
        }

        Ok((applied, skipped))
    }

    /// Run `postgenerate` scripts inside directory.
    ///
    /// # Errors
    ///
    /// - Return [`BuildError::Script`] if any script fails.
    #[instrument(skip(self, dir), level = "debug")]
    pub fn run_postgenerate(&self, dir: impl AsRef<Path>) -> Result<()> {
        for script in &self.settings.scripts.postgenerate {
            info!("run postgenerate script {script:?}");
            syscall_script(script, dir.as_ref())?;
        }

        Ok(())
    }
}

fn syscall_script(script: &str, dir: &Path) -> Result<()> {
    let output = Command::new("sh")
        .arg("-c")
        .arg(script)
        .current_dir(dir)
        .output()
        .map_err(|err| BuildError::Script {
            script: script.to_string(),
            message: err.to_string(),
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(output.stderr.as_slice());

        // INVARIANT: Chomp trailing newlines.
        return Err(BuildError::Script {
            script: script.to_string(),
            message: stderr.trim_end().to_string(),
        });
    }

    Ok(())
}

/// Build error types.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Bundle(#[from] BundleError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Destination(#[from] DestinationError),

    /// No loader registered for source kind.
    #[error("no source registered for kind {0:?}")]
    UnknownSource(String),

    /// Template content cannot be merged into its destination.
    #[error("failed to apply template of bundle {bundle:?}")]
    Merge {
        bundle: String,
        #[source]
        source: DestinationError,
    },

    /// Lifecycle script failed.
    #[error("postgenerate script {script:?} failed: {message}")]
    Script { script: String, message: String },
}

/// Friendly result alias :3
pub type Result<T, E = BuildError> = std::result::Result<T, E>;
