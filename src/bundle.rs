// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Bundle resolution engine.
//!
//! Walk the bundle tree of every project defined in a template directory,
//! and flatten it into an ordered list of [`ResolvedBundle`]s whose
//! templates are ready to be applied.
//!
//! # Identity
//!
//! A bundle is resolved once per identity within a build. The identity of a
//! bundle is its location, its workspace flag, and the project it applies
//! to. Workspace bundles apply once for the whole workspace, so they carry
//! no project. Referencing the same bundle again only folds options into
//! the existing node.
//!
//! # Options
//!
//! Every `extends` entry hands `{...inherited, ...explicit}` down to its
//! target. When a node is referenced more than once, a reference at the same
//! depth or closer to the project root overrides earlier options, while a
//! deeper reference only fills in options that are still missing. The final
//! options of a bundle are its own defaults overridden by the folded ones.
//!
//! # Order
//!
//! Bundles come out in post-order: extended bundles before the bundles that
//! extend them, `extends` declaration order preserved. Workspace bundles are
//! moved in front of project bundles afterwards, keeping their relative
//! order.
//!
//! # Composables
//!
//! A bundle may name a directory of __composable__ files. Every file in it
//! becomes an extra template entry targeting the same relative path:
//!
//! - `*.hbs` files are rendered with handlebars into text files named
//!   without the `.hbs` extension. A plain sibling with that name is
//!   considered part of the template and skipped.
//! - `*.json` files are deep merged into JSON files.
//! - Anything else is copied as is.
//!
//! Composable files are deduplicated by absolute path within each scope.

use crate::{
    config::{
        merge_options, BlobDestination, BlobMergeStrategy, BoilerplateDefinition,
        BundleDefinition, ConfigError, DefinitionFormat, DestinationConfig, Options, SourceConfig,
        StructuredDestination, StructuredMergeStrategy, TemplateConfig, TextDestination,
        TextMergeStrategy,
    },
    path::{BundleLocation, ModuleSpecifierResolver, PathError, BUNDLE_EXTENSIONS},
};

use ignore::WalkBuilder;
use indexmap::IndexMap;
use std::{
    collections::{BTreeMap, HashMap, HashSet},
    fmt::{Debug, Formatter, Result as FmtResult},
    fs::read_to_string,
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::{debug, info, instrument, warn};

/// Project a template applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectContext {
    /// Name of project.
    pub name: String,

    /// Absolute output directory of project.
    pub path: PathBuf,

    /// Project directory relative to workspace.
    pub relative: PathBuf,
}

/// Workspace and project a template is applied to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateContext {
    /// Absolute output directory of workspace.
    pub workspace: PathBuf,

    /// Project of template, absent for workspace bundles.
    pub project: Option<ProjectContext>,
}

impl TemplateContext {
    /// Root that relative destination paths are resolved against.
    pub fn scope_root(&self) -> &Path {
        self.project
            .as_ref()
            .map(|project| project.path.as_path())
            .unwrap_or(self.workspace.as_path())
    }
}

/// Function producing templates of a built-in bundle.
pub type TemplateGenerator =
    dyn Fn(&TemplateContext, &Options) -> anyhow::Result<Vec<TemplateConfig>> + Send + Sync;

/// Bundle registered in code instead of on disk.
#[derive(Clone, Default)]
pub struct BuiltinBundle {
    /// Static part of bundle.
    pub definition: BundleDefinition,

    /// Templates computed from context and final options.
    pub generator: Option<Arc<TemplateGenerator>>,
}

impl BuiltinBundle {
    pub fn new(definition: BundleDefinition) -> Self {
        Self {
            definition,
            generator: None,
        }
    }

    /// Attach template generator.
    pub fn with_generator<F>(mut self, generator: F) -> Self
    where
        F: Fn(&TemplateContext, &Options) -> anyhow::Result<Vec<TemplateConfig>>
            + Send
            + Sync
            + 'static,
    {
        self.generator = Some(Arc::new(generator));
        self
    }
}

impl Debug for BuiltinBundle {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.debug_struct("BuiltinBundle")
            .field("definition", &self.definition)
            .field("generator", &self.generator.as_ref().map(|_| ".."))
            .finish()
    }
}

/// Built-in bundles addressable by name.
#[derive(Debug, Clone, Default)]
pub struct BundleTable {
    bundles: BTreeMap<String, BuiltinBundle>,
}

impl BundleTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register bundle under name, replacing any previous registration.
    pub fn register(&mut self, name: impl Into<String>, bundle: BuiltinBundle) {
        self.bundles.insert(name.into(), bundle);
    }

    pub fn get(&self, name: &str) -> Option<&BuiltinBundle> {
        self.bundles.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.bundles.keys().map(String::as_str)
    }
}

/// Root definition of a project found in a template directory.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectRoot {
    /// Definition file.
    pub location: BundleLocation,

    /// Parsed definition.
    pub definition: BundleDefinition,

    /// Project the definition applies to.
    pub project: ProjectContext,
}

/// Find project definitions in template directory.
///
/// Recognizes `project.{toml,json}` for the project at the workspace root,
/// `<name>.project.{toml,json}` for additional projects, and
/// `boilerplate.{toml,json}` as shorthand for a root project that extends
/// boilerplate bundles.
///
/// # Errors
///
/// - Return [`BundleError::NoProjects`] if nothing is defined.
/// - Return [`BundleError`] if any definition cannot be read or parsed.
#[instrument(skip(template_dir, output_dir), level = "debug")]
pub fn discover_projects(
    template_dir: impl AsRef<Path>,
    output_dir: impl AsRef<Path>,
) -> Result<Vec<ProjectRoot>> {
    let template_dir = template_dir.as_ref();
    let output_dir = output_dir.as_ref();
    let root_name = template_dir
        .parent()
        .and_then(Path::file_name)
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "root".into());

    let mut roots = Vec::new();
    for path in definition_files(template_dir)? {
        let Some(file_name) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        let Some((stem, _)) = file_name.rsplit_once('.') else {
            continue;
        };

        let (mut definition, default_name, default_path) = match stem {
            "project" => (load_definition(&path)?, root_name.clone(), PathBuf::from(".")),
            "boilerplate" => {
                let boilerplate: BoilerplateDefinition = DefinitionFormat::of(&path)
                    .parse(&read_definition(&path)?)
                    .map_err(|err| BundleError::Config {
                        source: err,
                        path: path.clone(),
                    })?;
                (
                    BundleDefinition::from(boilerplate),
                    root_name.clone(),
                    PathBuf::from("."),
                )
            }
            stem => match stem.strip_suffix(".project") {
                Some(name) => (load_definition(&path)?, name.to_string(), PathBuf::from(name)),
                None => continue,
            },
        };

        let relative = definition.path.clone().unwrap_or(default_path);
        let name = definition.name.get_or_insert(default_name).clone();
        debug!("found project {name:?} at {:?}", relative.display());
        roots.push(ProjectRoot {
            location: BundleLocation::File(path),
            project: ProjectContext {
                name,
                path: crate::path::normalize(&output_dir.join(&relative)),
                relative,
            },
            definition,
        });
    }

    if roots.is_empty() {
        return Err(BundleError::NoProjects(template_dir.to_path_buf()));
    }

    Ok(roots)
}

fn definition_files(template_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for stem in ["project", "*.project", "boilerplate"] {
        for extension in BUNDLE_EXTENSIONS {
            let pattern = format!(
                "{}/{stem}.{extension}",
                glob::Pattern::escape(&template_dir.to_string_lossy())
            );
            for entry in glob::glob(&pattern)? {
                files.push(entry?);
            }
        }
    }

    files.sort();
    files.dedup();
    Ok(files)
}

fn read_definition(path: &Path) -> Result<String> {
    read_to_string(path).map_err(|err| BundleError::Read {
        source: err,
        path: path.to_path_buf(),
    })
}

fn load_definition(path: &Path) -> Result<BundleDefinition> {
    BundleDefinition::parse(&read_definition(path)?, DefinitionFormat::of(path)).map_err(|err| {
        BundleError::Config {
            source: err,
            path: path.to_path_buf(),
        }
    })
}

/// Identity of a bundle within a build.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BundleKey {
    pub location: BundleLocation,
    pub workspace: bool,
    pub project: Option<PathBuf>,
}

#[derive(Clone)]
struct Loaded {
    definition: BundleDefinition,
    generator: Option<Arc<TemplateGenerator>>,
}

struct Node {
    loaded: Arc<Loaded>,
    base_dir: PathBuf,
    project: ProjectContext,
    folded: Options,
    depth: usize,
}

impl Node {
    fn fold(&mut self, incoming: Options, depth: usize) {
        if depth <= self.depth {
            self.folded = merge_options(&self.folded, &incoming);
            self.depth = depth;
        } else {
            self.folded = merge_options(&incoming, &self.folded);
        }
    }
}

/// Bundle with final options and flattened templates.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedBundle {
    /// Name of bundle, or its location if unnamed.
    pub name: String,

    pub key: BundleKey,

    /// Directory that relative source paths resolve against.
    pub base_dir: PathBuf,

    /// Workspace and project templates apply to.
    pub context: TemplateContext,

    /// Final options.
    pub options: Options,

    /// Templates in application order.
    pub templates: Vec<TemplateConfig>,
}

/// Resolve bundle trees of projects.
pub struct BundleResolver<'a> {
    specifiers: &'a ModuleSpecifierResolver,
    builtins: &'a BundleTable,
    workspace: PathBuf,
    loaded: HashMap<BundleLocation, Arc<Loaded>>,
    nodes: IndexMap<BundleKey, Node>,
}

impl<'a> BundleResolver<'a> {
    /// Construct resolver for workspace output directory.
    pub fn new(
        specifiers: &'a ModuleSpecifierResolver,
        builtins: &'a BundleTable,
        workspace: impl Into<PathBuf>,
    ) -> Self {
        Self {
            specifiers,
            builtins,
            workspace: workspace.into(),
            loaded: HashMap::new(),
            nodes: IndexMap::new(),
        }
    }

    /// Walk bundle tree of project root.
    ///
    /// # Errors
    ///
    /// - Return [`BundleError::Unresolved`] if an `extends` specifier cannot
    ///   be resolved.
    /// - Return [`BundleError::Cycle`] if bundles extend each other.
    /// - Return [`BundleError`] if any definition cannot be loaded.
    #[instrument(skip(self, root), level = "debug")]
    pub fn add_project(&mut self, root: ProjectRoot) -> Result<()> {
        info!("resolve bundles of project {:?}", root.project.name);
        let fallback = root.location.base_dir(&self.workspace);
        self.loaded.insert(
            root.location.clone(),
            Arc::new(Loaded {
                definition: root.definition,
                generator: None,
            }),
        );

        let mut stack = Vec::new();
        self.visit(root.location, &fallback, Options::new(), &root.project, 0, &mut stack)
    }

    fn load(&mut self, location: &BundleLocation) -> Result<Arc<Loaded>> {
        if let Some(loaded) = self.loaded.get(location) {
            return Ok(loaded.clone());
        }

        let loaded = match location {
            BundleLocation::File(path) => Loaded {
                definition: load_definition(path)?,
                generator: None,
            },
            BundleLocation::Builtin(name) => {
                let bundle = self
                    .builtins
                    .get(name)
                    .ok_or_else(|| BundleError::UnknownBuiltin(name.clone()))?;
                Loaded {
                    definition: bundle.definition.clone(),
                    generator: bundle.generator.clone(),
                }
            }
        };

        let loaded = Arc::new(loaded);
        self.loaded.insert(location.clone(), loaded.clone());
        Ok(loaded)
    }

    fn visit(
        &mut self,
        location: BundleLocation,
        fallback: &Path,
        inherited: Options,
        project: &ProjectContext,
        depth: usize,
        stack: &mut Vec<BundleKey>,
    ) -> Result<()> {
        let loaded = self.load(&location)?;
        let workspace = loaded.definition.workspace;
        let key = BundleKey {
            location: location.clone(),
            workspace,
            project: (!workspace).then(|| project.relative.clone()),
        };

        if stack.contains(&key) {
            let chain = stack
                .iter()
                .chain(std::iter::once(&key))
                .map(|key| key.location.to_string())
                .collect::<Vec<_>>()
                .join(" -> ");
            return Err(BundleError::Cycle(chain));
        }

        let base_dir = location.base_dir(fallback);
        stack.push(key.clone());
        for extend in &loaded.definition.extends {
            let nested = merge_options(&inherited, &extend.options());
            let resolved = self
                .specifiers
                .resolve(extend.name(), &base_dir)
                .map_err(|err| BundleError::Unresolved {
                    specifier: extend.name().to_string(),
                    referrer: location.to_string(),
                    source: err,
                })?;
            debug!(
                "{location} extends {} ({})",
                resolved.location, resolved.kind
            );
            self.visit(resolved.location, &base_dir, nested, project, depth + 1, stack)?;
        }
        stack.pop();

        match self.nodes.get_mut(&key) {
            Some(node) => node.fold(inherited, depth),
            None => {
                self.nodes.insert(
                    key,
                    Node {
                        loaded,
                        base_dir,
                        project: project.clone(),
                        folded: inherited,
                        depth,
                    },
                );
            }
        }

        Ok(())
    }

    /// Evaluate templates of every resolved bundle.
    ///
    /// # Errors
    ///
    /// - Return [`BundleError::Generate`] if a built-in template generator
    ///   fails.
    /// - Return [`BundleError::Composables`] if a composables directory
    ///   cannot be walked.
    #[instrument(skip(self), level = "debug")]
    pub fn finish(self) -> Result<Vec<ResolvedBundle>> {
        let mut ordered = self.nodes.into_iter().collect::<Vec<_>>();
        ordered.sort_by_key(|(key, _)| !key.workspace);

        let mut seen = HashSet::new();
        let mut bundles = Vec::with_capacity(ordered.len());
        for (key, node) in ordered {
            let definition = &node.loaded.definition;
            let options = merge_options(&definition.options, &node.folded);
            let context = TemplateContext {
                workspace: self.workspace.clone(),
                project: (!key.workspace).then(|| node.project.clone()),
            };
            let name = definition
                .name
                .clone()
                .unwrap_or_else(|| key.location.to_string());

            let mut templates = definition.templates.clone();
            if let Some(generator) = &node.loaded.generator {
                let generated =
                    generator(&context, &options).map_err(|err| BundleError::Generate {
                        bundle: name.clone(),
                        source: err,
                    })?;
                templates.extend(generated);
            }

            if let Some(composables) = &definition.composables {
                let dir = node.base_dir.join(composables);
                for entry in composable_entries(&dir)? {
                    let scope = key.project.clone();
                    let source = entry.source.file_path().map(Path::to_path_buf);
                    if !seen.insert((scope, source)) {
                        debug!("skip duplicate composable {:?}", entry.destination.file_path());
                        continue;
                    }
                    templates.push(entry);
                }
            }

            debug!("bundle {name:?} contributes {} templates", templates.len());
            bundles.push(ResolvedBundle {
                name,
                key,
                base_dir: node.base_dir,
                context,
                options,
                templates,
            });
        }

        Ok(bundles)
    }
}

/// Template entries for every file in a composables directory.
///
/// # Errors
///
/// - Return [`BundleError::Composables`] if directory cannot be walked.
pub fn composable_entries(dir: &Path) -> Result<Vec<TemplateConfig>> {
    if !dir.is_dir() {
        warn!("composables directory {:?} does not exist", dir.display());
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in WalkBuilder::new(dir)
        .standard_filters(false)
        .sort_by_file_name(|left, right| left.cmp(right))
        .build()
    {
        let entry = entry.map_err(|err| BundleError::Composables {
            source: err,
            path: dir.to_path_buf(),
        })?;
        if entry.file_type().is_some_and(|kind| kind.is_file()) {
            files.push(entry.into_path());
        }
    }

    let templated = files
        .iter()
        .filter_map(|path| path.to_str()?.strip_suffix(".hbs").map(PathBuf::from))
        .collect::<HashSet<_>>();

    let mut entries = Vec::new();
    for path in files {
        if templated.contains(&path) {
            debug!("skip template sibling {:?}", path.display());
            continue;
        }

        let Ok(relative) = path.strip_prefix(dir) else {
            continue;
        };
        let relative = relative.to_string_lossy().into_owned();
        entries.push(composable_entry(path, relative));
    }

    Ok(entries)
}

fn composable_entry(path: PathBuf, relative: String) -> TemplateConfig {
    if let Some(target) = relative.strip_suffix(".hbs") {
        return TemplateConfig {
            source: SourceConfig::Handlebars {
                file_path: path,
                placeholder: false,
            },
            destination: DestinationConfig::Text(TextDestination {
                file_path: target.to_string(),
                merge_strategy: TextMergeStrategy::Replace,
            }),
        };
    }

    if relative.ends_with(".json") {
        return TemplateConfig {
            source: SourceConfig::Json {
                file_path: path,
                property_path: None,
                placeholder: false,
            },
            destination: DestinationConfig::Json(StructuredDestination {
                merge_strategy: StructuredMergeStrategy::Deep,
                spread: true,
                ..StructuredDestination::new(relative)
            }),
        };
    }

    TemplateConfig {
        source: SourceConfig::Blob {
            file_path: path,
            placeholder: false,
        },
        destination: DestinationConfig::Blob(BlobDestination {
            file_path: relative,
            merge_strategy: BlobMergeStrategy::Replace,
        }),
    }
}

/// Bundle resolution error types.
#[derive(Debug, thiserror::Error)]
pub enum BundleError {
    /// Template directory defines no project.
    #[error("no project or boilerplate definition found in {:?}", .0.display())]
    NoProjects(PathBuf),

    /// Extended bundle cannot be found.
    #[error("cannot resolve bundle {specifier:?} extended by {referrer}")]
    Unresolved {
        specifier: String,
        referrer: String,
        #[source]
        source: PathError,
    },

    /// Built-in bundle is not registered.
    #[error("built-in bundle {0:?} is not registered")]
    UnknownBuiltin(String),

    /// Bundles extend each other.
    #[error("bundle extension cycle: {0}")]
    Cycle(String),

    /// Definition file cannot be read.
    #[error("failed to read bundle definition {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Definition file is malformed.
    #[error("malformed bundle definition {:?}", path.display())]
    Config {
        #[source]
        source: ConfigError,
        path: PathBuf,
    },

    /// Built-in template generator failed.
    #[error("failed to generate templates of bundle {bundle:?}")]
    Generate {
        bundle: String,
        #[source]
        source: anyhow::Error,
    },

    /// Composables directory cannot be walked.
    #[error("failed to walk composables in {:?}", path.display())]
    Composables {
        #[source]
        source: ignore::Error,
        path: PathBuf,
    },

    #[error(transparent)]
    GlobPattern(#[from] glob::PatternError),

    #[error(transparent)]
    Glob(#[from] glob::GlobError),
}

/// Friendly result alias :3
pub type Result<T, E = BundleError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};
    use std::fs::{create_dir_all, write};

    fn write_file(path: impl AsRef<Path>, content: &str) -> anyhow::Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            create_dir_all(parent)?;
        }
        write(path, content)?;
        Ok(())
    }

    fn resolve(workspace: &Path) -> anyhow::Result<Vec<ResolvedBundle>> {
        let specifiers = ModuleSpecifierResolver::new();
        let builtins = BundleTable::new();
        resolve_with(workspace, &specifiers, &builtins)
    }

    fn resolve_with(
        workspace: &Path,
        specifiers: &ModuleSpecifierResolver,
        builtins: &BundleTable,
    ) -> anyhow::Result<Vec<ResolvedBundle>> {
        let out = workspace.join("out");
        let mut resolver = BundleResolver::new(specifiers, builtins, &out);
        for root in discover_projects(workspace.join(".magicspace"), &out)? {
            resolver.add_project(root)?;
        }
        Ok(resolver.finish()?)
    }

    fn names(bundles: &[ResolvedBundle]) -> Vec<&str> {
        bundles.iter().map(|bundle| bundle.name.as_str()).collect()
    }

    fn option<'a>(bundles: &'a [ResolvedBundle], name: &str, key: &str) -> Option<&'a Value> {
        bundles
            .iter()
            .find(|bundle| bundle.name == name)
            .and_then(|bundle| bundle.options.get(key))
    }

    #[test]
    fn closer_reference_wins_regardless_of_order() -> anyhow::Result<()> {
        for extends in [
            r#"extends = ["../bundles/a", { name = "../bundles/base", options = { author = "root" } }]"#,
            r#"extends = [{ name = "../bundles/base", options = { author = "root" } }, "../bundles/a"]"#,
        ] {
            let temp = tempfile::tempdir()?;
            let dir = temp.path().join("demo");
            write_file(
                dir.join(".magicspace/project.toml"),
                &format!("name = \"root\"\n{extends}\n"),
            )?;
            write_file(
                dir.join("bundles/a.toml"),
                indoc! {r#"
                    name = "a"
                    extends = [{ name = "./base", options = { author = "a" } }]
                "#},
            )?;
            write_file(
                dir.join("bundles/base.toml"),
                indoc! {r#"
                    name = "base"

                    [options]
                    author = "nobody"
                    license = "MIT"
                "#},
            )?;

            let bundles = resolve(&dir)?;
            assert_eq!(option(&bundles, "base", "author"), Some(&json!("root")));
            assert_eq!(option(&bundles, "base", "license"), Some(&json!("MIT")));
            assert_eq!(bundles.len(), 3);
        }

        Ok(())
    }

    #[test]
    fn explicit_options_override_inherited_ones() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let dir = temp.path().join("demo");
        write_file(
            dir.join(".magicspace/project.toml"),
            indoc! {r#"
                name = "root"
                extends = [{ name = "../a", options = { author = "root", year = 2020 } }]
            "#},
        )?;
        write_file(
            dir.join("a.toml"),
            indoc! {r#"
                name = "a"
                extends = [{ name = "./base", options = { author = "a" } }]
            "#},
        )?;
        write_file(dir.join("base.toml"), "name = \"base\"\n")?;

        let bundles = resolve(&dir)?;
        assert_eq!(names(&bundles), vec!["base", "a", "root"]);
        assert_eq!(option(&bundles, "base", "author"), Some(&json!("a")));
        assert_eq!(option(&bundles, "base", "year"), Some(&json!(2020)));
        assert_eq!(option(&bundles, "a", "author"), Some(&json!("root")));

        Ok(())
    }

    #[test]
    fn workspace_bundles_come_first_and_resolve_once() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let dir = temp.path().join("demo");
        write_file(
            dir.join(".magicspace/project.toml"),
            "name = \"root\"\nextends = [\"../shared\", \"../ws\"]\n",
        )?;
        write_file(
            dir.join(".magicspace/web.project.toml"),
            "extends = [\"../shared\", \"../ws\"]\n",
        )?;
        write_file(dir.join("shared.toml"), "name = \"shared\"\n")?;
        write_file(
            dir.join("ws.toml"),
            "name = \"ws\"\nworkspace = true\n",
        )?;

        let bundles = resolve(&dir)?;
        assert_eq!(names(&bundles), vec!["ws", "shared", "root", "shared", "web"]);

        let web = bundles
            .iter()
            .find(|bundle| bundle.name == "web")
            .and_then(|bundle| bundle.context.project.clone());
        assert_eq!(
            web.map(|project| project.relative),
            Some(PathBuf::from("web"))
        );
        assert_eq!(bundles[0].context.project, None);

        Ok(())
    }

    #[test]
    fn unresolvable_specifier_names_referrer() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let dir = temp.path().join("demo");
        write_file(
            dir.join(".magicspace/project.toml"),
            "extends = [\"./missing\"]\n",
        )?;

        let error = resolve(&dir).expect_err("missing bundle must fail");
        let message = error.to_string();
        assert!(message.contains("./missing"), "{message}");
        assert!(message.contains("project.toml"), "{message}");

        Ok(())
    }

    #[test]
    fn extension_cycle_is_fatal() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let dir = temp.path().join("demo");
        write_file(
            dir.join(".magicspace/project.toml"),
            "extends = [\"../a\"]\n",
        )?;
        write_file(dir.join("a.toml"), "extends = [\"./b\"]\n")?;
        write_file(dir.join("b.toml"), "extends = [\"./a\"]\n")?;

        let error = resolve(&dir).expect_err("cycle must fail");
        assert!(matches!(
            error.downcast_ref::<BundleError>(),
            Some(BundleError::Cycle(_))
        ));

        Ok(())
    }

    #[test]
    fn boilerplate_extends_with_options() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let dir = temp.path().join("demo");
        write_file(
            dir.join(".magicspace/boilerplate.json"),
            indoc! {r#"
                {
                  // comments are fine
                  "boilerplate": "node",
                  "options": { "name": "demo" },
                }
            "#},
        )?;

        let mut builtins = BundleTable::new();
        builtins.register(
            "node",
            BuiltinBundle::new(BundleDefinition {
                name: Some("node".into()),
                ..Default::default()
            })
            .with_generator(|context, options| {
                let name = options.get("name").cloned().unwrap_or(Value::Null);
                let project = context.project.as_ref().map(|project| project.name.clone());
                Ok(vec![TemplateConfig {
                    source: SourceConfig::Inline {
                        value: json!({ "name": name, "project": project }).into(),
                        placeholder: false,
                    },
                    destination: DestinationConfig::Json(StructuredDestination::new(
                        "package.json",
                    )),
                }])
            }),
        );
        let specifiers = ModuleSpecifierResolver::new().with_builtins(builtins.names());

        let bundles = resolve_with(&dir, &specifiers, &builtins)?;
        assert_eq!(names(&bundles), vec!["node", "demo"]);
        assert_eq!(
            bundles[0].templates[0].source,
            SourceConfig::Inline {
                value: json!({ "name": "demo", "project": "demo" }).into(),
                placeholder: false,
            }
        );

        Ok(())
    }

    #[test]
    fn composables_skip_template_siblings() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let dir = temp.path().join("demo");
        let composables = dir.join("composables");
        write_file(composables.join("README.md.hbs"), "# {{name}}\n")?;
        write_file(composables.join("README.md"), "# fallback\n")?;
        write_file(composables.join("tsconfig.json"), "{}")?;
        write_file(composables.join("assets/logo.png"), "png")?;

        let entries = composable_entries(&composables)?;
        let targets = entries
            .iter()
            .map(|entry| (entry.source.kind(), entry.destination.file_path().to_string()))
            .collect::<Vec<_>>();
        assert_eq!(
            targets,
            vec![
                ("handlebars", "README.md".to_string()),
                ("blob", "assets/logo.png".to_string()),
                ("json", "tsconfig.json".to_string()),
            ]
        );

        Ok(())
    }

    #[test]
    fn composables_deduplicate_within_scope() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let dir = temp.path().join("demo");
        write_file(
            dir.join(".magicspace/project.toml"),
            "extends = [\"../a\", \"../b\"]\n",
        )?;
        write_file(
            dir.join("a.toml"),
            "name = \"a\"\ncomposables = \"shared\"\n",
        )?;
        write_file(
            dir.join("b.toml"),
            "name = \"b\"\ncomposables = \"shared\"\n",
        )?;
        write_file(dir.join("shared/.editorconfig"), "root = true\n")?;

        let bundles = resolve(&dir)?;
        let counts = bundles
            .iter()
            .map(|bundle| (bundle.name.as_str(), bundle.templates.len()))
            .collect::<Vec<_>>();
        assert_eq!(counts, vec![("a", 1), ("b", 0), ("demo", 0)]);

        Ok(())
    }

    #[test]
    fn missing_template_directory_definitions() {
        let dir = tempfile::tempdir().ok();
        let result = dir
            .as_ref()
            .map(|dir| discover_projects(dir.path().join(".magicspace"), dir.path()));
        assert!(matches!(result, Some(Err(BundleError::NoProjects(_)))));
    }
}
