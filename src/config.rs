// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Specify the layout for configuration files that magicspace uses to
//! simplify the process of serialization and deserialization. File I/O is
//! left to the caller to figure out.
//!
//! # Bundle Definitions
//!
//! A __bundle__ is a named, extensible collection of templates plus default
//! options. Bundle definitions are written in TOML or JSON (comments
//! allowed). The template directory of a workspace, `.magicspace` by
//! default, holds the root definitions:
//!
//! - `project.toml` defines the project living at the workspace root.
//! - `<name>.project.toml` defines an additional project at `path`.
//! - `boilerplate.toml` is a shorthand for a root project that only extends
//!   one or more boilerplate bundles with a set of options.
//!
//! # Settings
//!
//! Workspace wide settings live in `settings.toml` of the template
//! directory. They control how the generated changes are merged back into
//! the project, which scripts run after generation, how output is
//! formatted, and where bundle packages are looked up.

use crate::structured::{PropertyPath, SortOrder, Structured};

use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::{
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
    str::FromStr,
};

/// Shallow option map handed to bundles and templates.
pub type Options = Map<String, Value>;

/// Shallow merge of option maps where `explicit` wins.
pub fn merge_options(inherited: &Options, explicit: &Options) -> Options {
    let mut merged = inherited.clone();
    merged.extend(explicit.iter().map(|(key, value)| (key.clone(), value.clone())));
    merged
}

/// Format of a definition file, derived from its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefinitionFormat {
    Toml,
    Json,
}

impl DefinitionFormat {
    /// Determine format from file extension, defaulting to TOML.
    pub fn of(path: impl AsRef<Path>) -> Self {
        match path.as_ref().extension().and_then(|ext| ext.to_str()) {
            Some("json") | Some("jsonc") => Self::Json,
            _ => Self::Toml,
        }
    }

    /// Deserialize content in this format.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::Deserialize`] for malformed TOML.
    /// - Return [`ConfigError::DeserializeJson`] for malformed JSON.
    pub fn parse<T>(self, data: &str) -> Result<T>
    where
        T: for<'de> Deserialize<'de>,
    {
        match self {
            Self::Toml => toml::de::from_str(data).map_err(ConfigError::Deserialize),
            Self::Json => serde_json_lenient::from_str(data)
                .map_err(|err| ConfigError::DeserializeJson(err.to_string())),
        }
    }
}

/// Bundle definition layout.
///
/// All bundles come with a definition that lists the bundles it extends,
/// default options, and the templates it contributes.
///
/// # General Layout
///
/// ```toml
/// name = "node"
/// workspace = false
/// composables = "composables"
/// extends = ["../base", { name = "@acme/lint", options = { strict = true } }]
///
/// [options]
/// author = "nobody"
///
/// [[templates]]
/// source = { type = "inline", value = { private = true } }
/// destination = { type = "json", file_path = "package.json", spread = true }
/// ```
#[derive(Default, Debug, PartialEq, Clone, Deserialize, Serialize)]
pub struct BundleDefinition {
    /// Name of bundle, or project for project definitions.
    pub name: Option<String>,

    /// Project directory relative to workspace, for project definitions.
    pub path: Option<PathBuf>,

    /// Apply once per workspace instead of once per project.
    #[serde(default)]
    pub workspace: bool,

    /// Bundles extended by this bundle, in application order.
    #[serde(default)]
    pub extends: Vec<ExtendEntry>,

    /// Default options, overridden by options passed down the tree.
    #[serde(default)]
    pub options: Options,

    /// Templates contributed by this bundle.
    #[serde(default)]
    pub templates: Vec<TemplateConfig>,

    /// Directory of composable files relative to the definition file.
    pub composables: Option<PathBuf>,
}

impl BundleDefinition {
    /// Parse definition in given format.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError`] if content is malformed.
    pub fn parse(data: &str, format: DefinitionFormat) -> Result<Self> {
        format.parse(data)
    }
}

impl FromStr for BundleDefinition {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        Self::parse(data, DefinitionFormat::Toml)
    }
}

impl Display for BundleDefinition {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

/// Entry in the `extends` listing of a bundle.
#[derive(Debug, PartialEq, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ExtendEntry {
    /// Plain specifier without explicit options.
    Name(String),

    /// Specifier with explicit options.
    Detailed {
        name: String,
        #[serde(default)]
        options: Options,
    },
}

impl ExtendEntry {
    pub fn name(&self) -> &str {
        match self {
            Self::Name(name) => name,
            Self::Detailed { name, .. } => name,
        }
    }

    pub fn options(&self) -> Options {
        match self {
            Self::Name(_) => Options::new(),
            Self::Detailed { options, .. } => options.clone(),
        }
    }
}

/// Boilerplate definition layout.
///
/// Shorthand for a root project that extends one or more boilerplate
/// bundles with their options.
#[derive(Debug, PartialEq, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum BoilerplateDefinition {
    Single(BoilerplateEntry),
    Multiple { boilerplates: Vec<BoilerplateEntry> },
    List(Vec<BoilerplateEntry>),
}

/// Single boilerplate reference.
#[derive(Debug, PartialEq, Clone, Deserialize, Serialize)]
pub struct BoilerplateEntry {
    /// Specifier of the boilerplate bundle.
    pub boilerplate: String,

    /// Options handed to the boilerplate bundle.
    #[serde(default)]
    pub options: Options,
}

impl BoilerplateDefinition {
    pub fn entries(&self) -> &[BoilerplateEntry] {
        match self {
            Self::Single(entry) => std::slice::from_ref(entry),
            Self::Multiple { boilerplates } => boilerplates,
            Self::List(entries) => entries,
        }
    }
}

impl From<BoilerplateDefinition> for BundleDefinition {
    fn from(boilerplate: BoilerplateDefinition) -> Self {
        Self {
            extends: boilerplate
                .entries()
                .iter()
                .map(|entry| ExtendEntry::Detailed {
                    name: entry.boilerplate.clone(),
                    options: entry.options.clone(),
                })
                .collect(),
            ..Default::default()
        }
    }
}

/// Template entry: where content comes from, and where it goes.
#[derive(Debug, PartialEq, Clone, Deserialize, Serialize)]
pub struct TemplateConfig {
    pub source: SourceConfig,
    pub destination: DestinationConfig,
}

/// Source of template content.
#[derive(Debug, PartialEq, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SourceConfig {
    /// Literal value.
    Inline {
        value: Structured,
        #[serde(default)]
        placeholder: bool,
    },

    /// JSON file, comments allowed, with optional sub-value extraction.
    Json {
        #[serde(alias = "filePath")]
        file_path: PathBuf,
        #[serde(default, alias = "propertyPath")]
        property_path: Option<PropertyPath>,
        #[serde(default)]
        placeholder: bool,
    },

    /// Module registered in the builder's registry.
    Module {
        name: String,
        #[serde(default)]
        placeholder: bool,
    },

    /// UTF-8 text file.
    Text {
        #[serde(alias = "filePath")]
        file_path: PathBuf,
        #[serde(default)]
        placeholder: bool,
    },

    /// UTF-8 text file rendered with the bundle options.
    Handlebars {
        #[serde(alias = "filePath")]
        file_path: PathBuf,
        #[serde(default)]
        placeholder: bool,
    },

    /// Raw bytes.
    Blob {
        #[serde(alias = "filePath")]
        file_path: PathBuf,
        #[serde(default)]
        placeholder: bool,
    },
}

impl SourceConfig {
    /// Registry key of source kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Inline { .. } => "inline",
            Self::Json { .. } => "json",
            Self::Module { .. } => "module",
            Self::Text { .. } => "text",
            Self::Handlebars { .. } => "handlebars",
            Self::Blob { .. } => "blob",
        }
    }

    /// Skip entry when destination file already exists.
    pub fn placeholder(&self) -> bool {
        match self {
            Self::Inline { placeholder, .. }
            | Self::Json { placeholder, .. }
            | Self::Module { placeholder, .. }
            | Self::Text { placeholder, .. }
            | Self::Handlebars { placeholder, .. }
            | Self::Blob { placeholder, .. } => *placeholder,
        }
    }

    /// File read by source, if any.
    pub fn file_path(&self) -> Option<&Path> {
        match self {
            Self::Json { file_path, .. }
            | Self::Text { file_path, .. }
            | Self::Handlebars { file_path, .. }
            | Self::Blob { file_path, .. } => Some(file_path.as_path()),
            Self::Inline { .. } | Self::Module { .. } => None,
        }
    }
}

/// Destination of template content.
#[derive(Debug, PartialEq, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DestinationConfig {
    Json(StructuredDestination),
    Toml(StructuredDestination),
    Text(TextDestination),
    Blob(BlobDestination),
}

impl DestinationConfig {
    /// Registry key of destination kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Json(_) => "json",
            Self::Toml(_) => "toml",
            Self::Text(_) => "text",
            Self::Blob(_) => "blob",
        }
    }

    /// Destination path, possibly starting with a path placeholder.
    pub fn file_path(&self) -> &str {
        match self {
            Self::Json(config) | Self::Toml(config) => &config.file_path,
            Self::Text(config) => &config.file_path,
            Self::Blob(config) => &config.file_path,
        }
    }
}

/// Structured destination options.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct StructuredDestination {
    #[serde(alias = "filePath")]
    pub file_path: String,

    #[serde(default, alias = "mergeStrategy")]
    pub merge_strategy: StructuredMergeStrategy,

    #[serde(default, alias = "propertyPath")]
    pub property_path: PropertyPath,

    #[serde(default)]
    pub spread: bool,

    #[serde(default)]
    pub sort: SortOrder,
}

impl StructuredDestination {
    pub fn new(file_path: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            merge_strategy: StructuredMergeStrategy::default(),
            property_path: PropertyPath::root(),
            spread: false,
            sort: SortOrder::default(),
        }
    }
}

/// Text destination options.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct TextDestination {
    #[serde(alias = "filePath")]
    pub file_path: String,

    #[serde(default, alias = "mergeStrategy")]
    pub merge_strategy: TextMergeStrategy,
}

/// Blob destination options.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct BlobDestination {
    #[serde(alias = "filePath")]
    pub file_path: String,

    #[serde(default, alias = "mergeStrategy")]
    pub merge_strategy: BlobMergeStrategy,
}

/// How repeated writes to the same structured property combine.
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StructuredMergeStrategy {
    #[default]
    Error,
    Ignore,
    Replace,
    Shallow,
    Deep,
    Union,
    Concat,
}

/// How repeated writes to the same text file combine.
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TextMergeStrategy {
    #[default]
    Error,
    Ignore,
    Replace,
    Append,
    Prepend,
}

/// How repeated writes to the same blob combine.
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BlobMergeStrategy {
    #[default]
    Error,
    Ignore,
    Replace,
}

macro_rules! strategy_display {
    ($($strategy:ty),*) => {$(
        impl Display for $strategy {
            fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
                write!(fmt, "{}", format!("{self:?}").to_lowercase())
            }
        }
    )*};
}

strategy_display!(StructuredMergeStrategy, TextMergeStrategy, BlobMergeStrategy);

/// Workspace settings layout.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default)]
    pub git: GitSettings,

    #[serde(default)]
    pub scripts: ScriptSettings,

    #[serde(default)]
    pub format: FormatSettings,

    #[serde(default)]
    pub resolve: ResolveSettings,
}

impl Settings {
    /// Load settings from file, or defaults if file is missing.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::Read`] if file exists but cannot be read.
    /// - Return [`ConfigError`] if content is malformed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Ok(Self::default());
        }

        std::fs::read_to_string(path)
            .map_err(|err| ConfigError::Read {
                source: err,
                path: path.to_path_buf(),
            })?
            .parse()
    }
}

impl FromStr for Settings {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut settings: Settings = toml::de::from_str(data).map_err(ConfigError::Deserialize)?;

        // INVARIANT: Perform shell expansion on every lookup directory.
        settings.resolve.base_url = settings
            .resolve
            .base_url
            .map(|path| expand_path(&path))
            .transpose()?;
        settings.resolve.package_dirs = settings
            .resolve
            .package_dirs
            .iter()
            .map(|path| expand_path(path))
            .collect::<Result<Vec<_>>>()?;

        Ok(settings)
    }
}

impl Display for Settings {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

fn expand_path(path: &Path) -> Result<PathBuf> {
    Ok(PathBuf::from(
        shellexpand::full(path.to_string_lossy().as_ref())
            .map_err(ConfigError::ShellExpansion)?
            .into_owned(),
    ))
}

/// Settings for merging generated changes into the project.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct GitSettings {
    /// Merge strategy handed to git pull.
    #[serde(default)]
    pub strategy: PullStrategy,

    /// Similarity percentage for rename detection, at most 100.
    #[serde(
        default = "default_rename_threshold",
        deserialize_with = "deserialize_rename_threshold"
    )]
    pub rename_threshold: u8,

    /// Committer name used in the scratch repository.
    pub user_name: Option<String>,

    /// Committer email used in the scratch repository.
    pub user_email: Option<String>,
}

impl Default for GitSettings {
    fn default() -> Self {
        Self {
            strategy: PullStrategy::default(),
            rename_threshold: default_rename_threshold(),
            user_name: None,
            user_email: None,
        }
    }
}

fn default_rename_threshold() -> u8 {
    10
}

fn deserialize_rename_threshold<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let threshold = u8::deserialize(deserializer)?;
    if threshold > 100 {
        return Err(de::Error::custom(format!(
            "rename_threshold is a percentage from 0 to 100, found {threshold}"
        )));
    }

    Ok(threshold)
}

/// Strategy for merging the generated branch.
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PullStrategy {
    /// Let git pick its default strategy.
    #[default]
    Default,

    /// Keep project side of every conflicting change.
    Ours,
}

/// Lifecycle scripts.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct ScriptSettings {
    /// Shell commands run inside the generated tree before committing.
    #[serde(default)]
    pub postgenerate: Vec<String>,
}

/// Output formatting.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct FormatSettings {
    /// External formatter reading stdin and writing stdout. The destination
    /// path is appended as the last argument.
    pub command: Option<Vec<String>>,
}

/// Bundle lookup.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct ResolveSettings {
    /// Directory bare specifiers are tried against first.
    pub base_url: Option<PathBuf>,

    /// Extra directories searched for bundle packages.
    #[serde(default)]
    pub package_dirs: Vec<PathBuf>,
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to deserialize TOML configuration.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to deserialize JSON configuration.
    #[error("failed to parse JSON configuration: {0}")]
    DeserializeJson(String),

    /// Failed to serialize configuration.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Failed to perform shell expansion on configuration.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),

    /// Failed to read configuration file.
    #[error("failed to read configuration at {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
pub type Result<T, E = ConfigError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structured::PathSegment;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;
    use serde_json::json;
    use simple_test_case::test_case;

    #[test]
    fn deserialize_bundle_definition() -> anyhow::Result<()> {
        let result: BundleDefinition = indoc! {r#"
            name = "node"
            extends = ["../base", { name = "@acme/lint", options = { strict = true } }]

            [options]
            author = "nobody"

            [[templates]]
            source = { type = "json", file_path = "package.json", property_path = "scripts" }
            destination = { type = "json", file_path = "<project>/package.json", merge_strategy = "deep", property_path = "scripts", sort = ["build"] }

            [[templates]]
            source = { type = "text", file_path = "gitignore", placeholder = true }
            destination = { type = "text", file_path = ".gitignore", merge_strategy = "append" }
        "#}
        .parse()?;

        let mut strict = Options::new();
        strict.insert("strict".into(), json!(true));
        let mut author = Options::new();
        author.insert("author".into(), json!("nobody"));

        let expect = BundleDefinition {
            name: Some("node".into()),
            path: None,
            workspace: false,
            extends: vec![
                ExtendEntry::Name("../base".into()),
                ExtendEntry::Detailed {
                    name: "@acme/lint".into(),
                    options: strict,
                },
            ],
            options: author,
            templates: vec![
                TemplateConfig {
                    source: SourceConfig::Json {
                        file_path: "package.json".into(),
                        property_path: Some(PropertyPath::from(vec![PathSegment::Key(
                            "scripts".into(),
                        )])),
                        placeholder: false,
                    },
                    destination: DestinationConfig::Json(StructuredDestination {
                        file_path: "<project>/package.json".into(),
                        merge_strategy: StructuredMergeStrategy::Deep,
                        property_path: PropertyPath::from(vec![PathSegment::Key(
                            "scripts".into(),
                        )]),
                        spread: false,
                        sort: SortOrder::Priority(vec!["build".into()]),
                    }),
                },
                TemplateConfig {
                    source: SourceConfig::Text {
                        file_path: "gitignore".into(),
                        placeholder: true,
                    },
                    destination: DestinationConfig::Text(TextDestination {
                        file_path: ".gitignore".into(),
                        merge_strategy: TextMergeStrategy::Append,
                    }),
                },
            ],
            composables: None,
        };

        assert_eq!(result, expect);

        Ok(())
    }

    #[test]
    fn deserialize_json_bundle_with_comments_and_camel_case() -> anyhow::Result<()> {
        let result = BundleDefinition::parse(
            indoc! {r#"
                {
                  // shared workspace bundle
                  "workspace": true,
                  "templates": [
                    {
                      "source": {"type": "inline", "value": {"recommendations": []}},
                      "destination": {
                        "type": "json",
                        "filePath": ".vscode/extensions.json",
                        "mergeStrategy": "shallow",
                        "spread": true
                      }
                    }
                  ]
                }
            "#},
            DefinitionFormat::Json,
        )?;

        assert!(result.workspace);
        assert_eq!(result.templates.len(), 1);
        assert_eq!(result.templates[0].destination.kind(), "json");
        assert_eq!(
            result.templates[0].destination.file_path(),
            ".vscode/extensions.json"
        );

        Ok(())
    }

    #[test]
    fn boilerplate_definition_extends_each_entry() -> anyhow::Result<()> {
        let definition: BoilerplateDefinition = DefinitionFormat::Toml.parse(indoc! {r#"
            boilerplate = "@acme/node"

            [options]
            name = "demo"
        "#})?;
        let bundle = BundleDefinition::from(definition);
        assert_eq!(bundle.extends.len(), 1);
        assert_eq!(bundle.extends[0].name(), "@acme/node");
        assert_eq!(bundle.extends[0].options().get("name"), Some(&json!("demo")));

        let definition: BoilerplateDefinition = DefinitionFormat::Json
            .parse(r#"[{"boilerplate": "a"}, {"boilerplate": "b", "options": {"x": 1}}]"#)?;
        let bundle = BundleDefinition::from(definition);
        assert_eq!(
            bundle.extends.iter().map(ExtendEntry::name).collect::<Vec<_>>(),
            vec!["a", "b"]
        );

        Ok(())
    }

    #[test]
    fn merge_options_explicit_wins() {
        let mut inherited = Options::new();
        inherited.insert("author".into(), json!("root"));
        inherited.insert("license".into(), json!("MIT"));
        let mut explicit = Options::new();
        explicit.insert("author".into(), json!("child"));

        let result = merge_options(&inherited, &explicit);
        assert_eq!(
            Value::Object(result),
            json!({"author": "child", "license": "MIT"})
        );
    }

    #[sealed_test(env = [("MAGIC_BUNDLES", "/opt/bundles")])]
    fn deserialize_settings() -> anyhow::Result<()> {
        let result: Settings = indoc! {r#"
            [git]
            strategy = "ours"
            rename_threshold = 30

            [scripts]
            postgenerate = ["touch generated"]

            [resolve]
            base_url = "$MAGIC_BUNDLES/local"
            package_dirs = ["$MAGIC_BUNDLES/shared"]
        "#}
        .parse()?;

        let expect = Settings {
            git: GitSettings {
                strategy: PullStrategy::Ours,
                rename_threshold: 30,
                user_name: None,
                user_email: None,
            },
            scripts: ScriptSettings {
                postgenerate: vec!["touch generated".into()],
            },
            format: FormatSettings::default(),
            resolve: ResolveSettings {
                base_url: Some(PathBuf::from("/opt/bundles/local")),
                package_dirs: vec![PathBuf::from("/opt/bundles/shared")],
            },
        };

        assert_eq!(result, expect);

        Ok(())
    }

    #[test_case("0", Some(0); "lowest")]
    #[test_case("100", Some(100); "highest")]
    #[test_case("101", None; "past percentage")]
    #[test_case("200", None; "far past percentage")]
    #[test]
    fn rename_threshold_is_percentage(threshold: &str, expect: Option<u8>) {
        let result = format!("[git]\nrename_threshold = {threshold}\n").parse::<Settings>();
        match expect {
            Some(expect) => assert!(
                matches!(&result, Ok(settings) if settings.git.rename_threshold == expect),
                "{result:?}"
            ),
            None => assert!(matches!(result, Err(ConfigError::Deserialize(_))), "{result:?}"),
        }
    }

    #[test]
    fn settings_defaults() -> anyhow::Result<()> {
        let result: Settings = "".parse()?;
        assert_eq!(result.git.rename_threshold, 10);
        assert_eq!(result.git.strategy, PullStrategy::Default);
        assert!(result.scripts.postgenerate.is_empty());
        Ok(())
    }
}
