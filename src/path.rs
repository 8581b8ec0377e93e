// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Path resolution utilities.
//!
//! Determine where bundle specifiers point to, and where destination files
//! end up once their path placeholders have been substituted.
//!
//! # Bundle Specifiers
//!
//! Bundles reference each other through __specifiers__ in their `extends`
//! listing. A specifier falls into one of four categories:
//!
//! - __Relative__: starts with `./`, `../`, or is absolute. Resolved against
//!   the directory of the referencing bundle.
//! - __Built-in__: name of a bundle registered in the builder's registry.
//! - __Base URL__: bare specifier found under the configured base URL
//!   directory.
//! - __Package__: bare specifier looked up in `node_modules` directories of
//!   the referencing bundle and all of its ancestors, then in any extra
//!   package directories, and finally in the bundle store.
//!
//! Files are probed as given, then with a `.toml` or `.json` extension. A
//! directory resolves to its `bundle.toml` or `bundle.json` entry.

use std::{
    collections::BTreeSet,
    fmt::{Display, Formatter, Result as FmtResult},
    path::{Component, Path, PathBuf},
};

/// Extensions probed when resolving bundle files, in order of preference.
pub const BUNDLE_EXTENSIONS: [&str; 2] = ["toml", "json"];

/// Name of entry file probed when a specifier resolves to a directory.
pub const BUNDLE_ENTRY: &str = "bundle";

/// Determine default absolute path to bundle store directory.
///
/// Uses XDG Base Directory path `$XDG_DATA_HOME/magicspace/bundles` as the
/// default bundle store. Does not check if the path returned actually
/// exists.
///
/// # Errors
///
/// - Return [`PathError::NoWayHome`] if data directory cannot be determined.
pub fn default_bundle_store_dir() -> Result<PathBuf> {
    dirs::data_dir()
        .map(|path| path.join("magicspace").join("bundles"))
        .ok_or(PathError::NoWayHome)
}

/// Category of a bundle specifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecifierKind {
    Relative,
    BaseUrl,
    Package,
    Builtin,
}

impl SpecifierKind {
    /// Categorize specifier without touching the file system.
    ///
    /// Only relative specifiers and registered built-ins can be told apart
    /// lexically. Any other bare specifier is reported as a package; the
    /// resolver decides later whether a base URL match takes precedence.
    pub fn of(specifier: &str, builtins: &BTreeSet<String>) -> Self {
        if is_relative(specifier) {
            Self::Relative
        } else if builtins.contains(specifier) {
            Self::Builtin
        } else {
            Self::Package
        }
    }
}

impl Display for SpecifierKind {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        let kind = match self {
            Self::Relative => "relative",
            Self::BaseUrl => "base-url",
            Self::Package => "package",
            Self::Builtin => "built-in",
        };

        fmt.write_str(kind)
    }
}

/// Where a resolved bundle specifier lives.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BundleLocation {
    /// Bundle definition file on disk.
    File(PathBuf),

    /// Bundle registered in the builder's registry.
    Builtin(String),
}

impl BundleLocation {
    /// Directory that relative paths of the bundle are resolved against.
    ///
    /// Built-in bundles have no directory of their own, so the referencing
    /// directory is used instead.
    pub fn base_dir(&self, fallback: &Path) -> PathBuf {
        match self {
            Self::File(path) => path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| fallback.to_path_buf()),
            Self::Builtin(_) => fallback.to_path_buf(),
        }
    }
}

impl Display for BundleLocation {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::File(path) => write!(fmt, "{}", path.display()),
            Self::Builtin(name) => write!(fmt, "builtin:{name}"),
        }
    }
}

/// Resolved bundle specifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSpecifier {
    pub kind: SpecifierKind,
    pub location: BundleLocation,
}

/// Resolve bundle specifiers to bundle locations.
#[derive(Debug, Default, Clone)]
pub struct ModuleSpecifierResolver {
    base_url: Option<PathBuf>,
    package_dirs: Vec<PathBuf>,
    builtins: BTreeSet<String>,
}

impl ModuleSpecifierResolver {
    /// Construct new specifier resolver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Directory bare specifiers are tried against before package lookup.
    pub fn with_base_url(mut self, base_url: impl Into<PathBuf>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Extra directories searched for package specifiers.
    pub fn with_package_dirs(mut self, dirs: impl IntoIterator<Item = impl Into<PathBuf>>) -> Self {
        self.package_dirs.extend(dirs.into_iter().map(Into::into));
        self
    }

    /// Names of bundles registered as built-ins.
    pub fn with_builtins(mut self, names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.builtins.extend(names.into_iter().map(Into::into));
        self
    }

    /// Categorize specifier without resolving it.
    pub fn categorize(&self, specifier: &str) -> SpecifierKind {
        SpecifierKind::of(specifier, &self.builtins)
    }

    /// Resolve specifier relative to the directory of its referrer.
    ///
    /// # Errors
    ///
    /// - Return [`PathError::Unresolved`] if no candidate file exists.
    pub fn resolve(&self, specifier: &str, referrer_dir: &Path) -> Result<ResolvedSpecifier> {
        let unresolved = || PathError::Unresolved {
            specifier: specifier.to_string(),
            referrer: referrer_dir.to_path_buf(),
        };

        match self.categorize(specifier) {
            SpecifierKind::Relative => {
                let path = normalize(&referrer_dir.join(specifier));
                probe_bundle_file(&path)
                    .map(|file| ResolvedSpecifier {
                        kind: SpecifierKind::Relative,
                        location: BundleLocation::File(file),
                    })
                    .ok_or_else(unresolved)
            }
            SpecifierKind::Builtin => Ok(ResolvedSpecifier {
                kind: SpecifierKind::Builtin,
                location: BundleLocation::Builtin(specifier.to_string()),
            }),
            SpecifierKind::BaseUrl | SpecifierKind::Package => {
                if let Some(file) = self
                    .base_url
                    .as_ref()
                    .and_then(|base| probe_bundle_file(&base.join(specifier)))
                {
                    return Ok(ResolvedSpecifier {
                        kind: SpecifierKind::BaseUrl,
                        location: BundleLocation::File(file),
                    });
                }

                self.package_candidates(specifier, referrer_dir)
                    .into_iter()
                    .find_map(|candidate| probe_bundle_file(&candidate))
                    .map(|file| ResolvedSpecifier {
                        kind: SpecifierKind::Package,
                        location: BundleLocation::File(file),
                    })
                    .ok_or_else(unresolved)
            }
        }
    }

    fn package_candidates(&self, specifier: &str, referrer_dir: &Path) -> Vec<PathBuf> {
        let mut candidates = referrer_dir
            .ancestors()
            .map(|dir| dir.join("node_modules").join(specifier))
            .collect::<Vec<_>>();
        candidates.extend(self.package_dirs.iter().map(|dir| dir.join(specifier)));
        if let Ok(store) = default_bundle_store_dir() {
            candidates.push(store.join(specifier));
        }

        candidates
    }
}

/// Probe for a bundle file at the given path.
///
/// Tries the path itself, then the path with each of the
/// [`BUNDLE_EXTENSIONS`] appended, then the directory entry file.
pub fn probe_bundle_file(path: &Path) -> Option<PathBuf> {
    if path.is_file() {
        return Some(path.to_path_buf());
    }

    for extension in BUNDLE_EXTENSIONS {
        let mut candidate = path.as_os_str().to_os_string();
        candidate.push(".");
        candidate.push(extension);
        let candidate = PathBuf::from(candidate);
        if candidate.is_file() {
            return Some(candidate);
        }
    }

    if path.is_dir() {
        return BUNDLE_EXTENSIONS
            .iter()
            .map(|extension| path.join(format!("{BUNDLE_ENTRY}.{extension}")))
            .find(|candidate| candidate.is_file());
    }

    None
}

fn is_relative(specifier: &str) -> bool {
    specifier == "."
        || specifier == ".."
        || specifier.starts_with("./")
        || specifier.starts_with("../")
        || Path::new(specifier).is_absolute()
}

/// Lexically normalize path by folding `.` and `..` components.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }

    out
}

/// Roots that destination path placeholders expand to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathRoots<'a> {
    /// Absolute workspace output directory.
    pub workspace: &'a Path,

    /// Absolute project output directory.
    pub project: &'a Path,

    /// Root used for relative paths without a placeholder.
    pub scope: &'a Path,
}

/// Expand `<workspace>` and `<project>` placeholders in destination path.
///
/// Only a leading placeholder is recognized. Any other bracket token is
/// left verbatim, and the result is joined onto the scope root like any
/// other relative path.
pub fn expand_path_placeholders(file_path: &str, roots: &PathRoots<'_>) -> PathBuf {
    let expand = |root: &Path, rest: &str| {
        let rest = rest.trim_start_matches(['/', '\\']);
        if rest.is_empty() {
            root.to_path_buf()
        } else {
            normalize(&root.join(rest))
        }
    };

    if let Some(rest) = file_path.strip_prefix("<workspace>") {
        expand(roots.workspace, rest)
    } else if let Some(rest) = file_path.strip_prefix("<project>") {
        expand(roots.project, rest)
    } else {
        normalize(&roots.scope.join(file_path))
    }
}

/// Path resolution error types.
#[derive(Clone, Debug, thiserror::Error)]
pub enum PathError {
    /// Data directory of user cannot be determined.
    #[error("cannot determine absolute path to user's data directory")]
    NoWayHome,

    /// Bundle specifier does not resolve to any file.
    #[error("cannot resolve bundle {specifier:?} referenced from {:?}", referrer.display())]
    Unresolved { specifier: String, referrer: PathBuf },
}

/// Friendly result alias :3
pub type Result<T, E = PathError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use simple_test_case::test_case;
    use std::fs::{create_dir_all, write};

    #[test_case("./base", SpecifierKind::Relative; "dot relative")]
    #[test_case("../shared/base", SpecifierKind::Relative; "parent relative")]
    #[test_case("/abs/base", SpecifierKind::Relative; "absolute")]
    #[test_case("node", SpecifierKind::Builtin; "registered builtin")]
    #[test_case("@scope/bundle", SpecifierKind::Package; "scoped package")]
    #[test]
    fn categorize_specifiers(specifier: &str, expect: SpecifierKind) {
        let resolver = ModuleSpecifierResolver::new().with_builtins(["node"]);
        pretty_assertions::assert_eq!(resolver.categorize(specifier), expect);
    }

    #[test]
    fn resolve_relative_with_extension_probing() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        create_dir_all(root.path().join("bundles/lib"))?;
        write(root.path().join("bundles/base.toml"), "name = \"base\"")?;
        write(root.path().join("bundles/lib/bundle.json"), "{}")?;
        let resolver = ModuleSpecifierResolver::new();
        let referrer = root.path().join("bundles");

        let result = resolver.resolve("./base", &referrer)?;
        assert_eq!(result.kind, SpecifierKind::Relative);
        assert_eq!(
            result.location,
            BundleLocation::File(root.path().join("bundles/base.toml"))
        );

        let result = resolver.resolve("./lib", &referrer)?;
        assert_eq!(
            result.location,
            BundleLocation::File(root.path().join("bundles/lib/bundle.json"))
        );

        Ok(())
    }

    #[test]
    fn resolve_package_from_ancestor_node_modules() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        create_dir_all(root.path().join("node_modules/@acme/bundle"))?;
        create_dir_all(root.path().join("project/.magicspace"))?;
        write(
            root.path().join("node_modules/@acme/bundle/bundle.toml"),
            "name = \"acme\"",
        )?;
        let resolver = ModuleSpecifierResolver::new();

        let result = resolver.resolve("@acme/bundle", &root.path().join("project/.magicspace"))?;
        assert_eq!(result.kind, SpecifierKind::Package);
        assert_eq!(
            result.location,
            BundleLocation::File(root.path().join("node_modules/@acme/bundle/bundle.toml"))
        );

        Ok(())
    }

    #[test]
    fn resolve_base_url_before_packages() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        create_dir_all(root.path().join("base"))?;
        write(root.path().join("base/shared.json"), "{}")?;
        let resolver = ModuleSpecifierResolver::new().with_base_url(root.path().join("base"));

        let result = resolver.resolve("shared", root.path())?;
        assert_eq!(result.kind, SpecifierKind::BaseUrl);

        Ok(())
    }

    #[test]
    fn unresolved_specifier_names_referrer() {
        let resolver = ModuleSpecifierResolver::new();
        let result = resolver.resolve("./missing", Path::new("/nowhere/at/all"));
        match result {
            Err(PathError::Unresolved {
                specifier,
                referrer,
            }) => {
                assert_eq!(specifier, "./missing");
                assert_eq!(referrer, PathBuf::from("/nowhere/at/all"));
            }
            other => panic!("expected unresolved error, got {other:?}"),
        }
    }

    #[test_case("<workspace>/package.json", "/ws/package.json"; "workspace token")]
    #[test_case("<project>/tsconfig.json", "/ws/app/tsconfig.json"; "project token")]
    #[test_case("src/index.ts", "/ws/app/src/index.ts"; "scope relative")]
    #[test_case("<unknown>/x", "/ws/app/<unknown>/x"; "unknown token verbatim")]
    #[test_case("<workspace>", "/ws"; "bare workspace token")]
    #[test]
    fn expand_destination_placeholders(file_path: &str, expect: &str) {
        let roots = PathRoots {
            workspace: Path::new("/ws"),
            project: Path::new("/ws/app"),
            scope: Path::new("/ws/app"),
        };
        pretty_assertions::assert_eq!(
            expand_path_placeholders(file_path, &roots),
            PathBuf::from(expect)
        );
    }
}
