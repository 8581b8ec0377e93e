// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Directory rename detection.
//!
//! When regenerated output moves files from one directory to another, git
//! reports one rename per file. Collapsing those file renames to the
//! directory rename behind them lets files the user added to the old
//! directory follow along.

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
};

/// Directory rename relative to repository root.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Rename {
    pub from: PathBuf,
    pub to: PathBuf,
}

impl Display for Rename {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        write!(fmt, "{} -> {}", self.from.display(), self.to.display())
    }
}

/// Extract `rename from`/`rename to` pairs of a patch.
pub fn parse_file_renames(patch: &str) -> Vec<(PathBuf, PathBuf)> {
    let mut renames = Vec::new();
    let mut from = None;
    for line in patch.lines() {
        if let Some(path) = line.strip_prefix("rename from ") {
            from = unquote_path(path);
        } else if let Some(path) = line.strip_prefix("rename to ") {
            if let (Some(from), Some(to)) = (from.take(), unquote_path(path)) {
                renames.push((from, to));
            }
        }
    }

    renames
}

/// Decode path as git prints it in patch headers.
///
/// Git wraps paths with special characters in double quotes and escapes
/// them C style, with octal escapes for raw bytes. Unquoted paths are taken
/// verbatim. Returns `None` for malformed quoting or paths that are not
/// valid UTF-8.
pub fn unquote_path(path: &str) -> Option<PathBuf> {
    let Some(quoted) = path
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
    else {
        return Some(PathBuf::from(path));
    };

    let mut bytes = Vec::with_capacity(quoted.len());
    let mut input = quoted.bytes();
    while let Some(byte) = input.next() {
        if byte != b'\\' {
            bytes.push(byte);
            continue;
        }

        let escaped = match input.next()? {
            b'a' => 0x07,
            b'b' => 0x08,
            b't' => b'\t',
            b'n' => b'\n',
            b'v' => 0x0b,
            b'f' => 0x0c,
            b'r' => b'\r',
            b'"' => b'"',
            b'\\' => b'\\',
            digit @ b'0'..=b'3' => {
                let mut value = digit - b'0';
                for _ in 0..2 {
                    match input.next()? {
                        digit @ b'0'..=b'7' => value = value * 8 + (digit - b'0'),
                        _ => return None,
                    }
                }
                value
            }
            _ => return None,
        };
        bytes.push(escaped);
    }

    String::from_utf8(bytes).ok().map(PathBuf::from)
}

/// Collapse file rename to the directory rename behind it.
///
/// Both directories are walked upward while their base names agree. Returns
/// `None` for renames inside one directory, when the walk reaches the
/// repository root on either side, or when both directories only share the
/// repository root.
pub fn collapse_rename(from: &Path, to: &Path) -> Option<Rename> {
    let mut from_dir = from.parent()?;
    let mut to_dir = to.parent()?;
    if from_dir == to_dir {
        return None;
    }

    while !is_root(from_dir) && !is_root(to_dir) && from_dir.file_name() == to_dir.file_name() {
        from_dir = from_dir.parent()?;
        to_dir = to_dir.parent()?;
    }

    if is_root(from_dir) || is_root(to_dir) || is_root(&common_root(from_dir, to_dir)) {
        return None;
    }

    Some(Rename {
        from: from_dir.to_path_buf(),
        to: to_dir.to_path_buf(),
    })
}

fn common_root(left: &Path, right: &Path) -> PathBuf {
    left.components()
        .zip(right.components())
        .take_while(|(left, right)| left == right)
        .map(|(component, _)| component)
        .collect()
}

fn is_root(dir: &Path) -> bool {
    dir.as_os_str().is_empty() || dir == Path::new(".")
}

/// Detect directory renames in a patch.
///
/// Renames whose source directory no longer exists according to `exists`
/// are dropped. Result is deduplicated, keeping first occurrence order.
pub fn detect_renames(patch: &str, exists: impl Fn(&Path) -> bool) -> Vec<Rename> {
    let mut renames: Vec<Rename> = Vec::new();
    for (from, to) in parse_file_renames(patch) {
        let Some(rename) = collapse_rename(&from, &to) else {
            continue;
        };

        if !exists(&rename.from) || renames.contains(&rename) {
            continue;
        }

        renames.push(rename);
    }

    renames
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use simple_test_case::test_case;

    fn rename(from: &str, to: &str) -> Rename {
        Rename {
            from: from.into(),
            to: to.into(),
        }
    }

    #[test_case("foo/yo/bar/x", "foo/ha/bar/x", Some(rename("foo/yo", "foo/ha")); "nested directory")]
    #[test_case("pkg/src/a/x", "pkg/lib/a/x", Some(rename("pkg/src", "pkg/lib")); "shared parent")]
    #[test_case("src/a/x", "lib/a/x", None; "top level directory")]
    #[test_case("foo/x", "foo/y", None; "same directory")]
    #[test_case("bar/x", "foo/bar/x", None; "reaches root")]
    #[test_case("x", "foo/x", None; "file at root")]
    #[test]
    fn collapse(from: &str, to: &str, expect: Option<Rename>) {
        pretty_assertions::assert_eq!(collapse_rename(Path::new(from), Path::new(to)), expect);
    }

    #[test]
    fn detect_from_patch() {
        let patch = indoc! {"
            diff --git a/foo/yo/bar/x b/foo/ha/bar/x
            similarity index 100%
            rename from foo/yo/bar/x
            rename to foo/ha/bar/x
            diff --git a/foo/yo/bar/y b/foo/ha/bar/y
            similarity index 100%
            rename from foo/yo/bar/y
            rename to foo/ha/bar/y
            diff --git a/lib/gone/a/x b/lib/here/a/x
            similarity index 100%
            rename from lib/gone/a/x
            rename to lib/here/a/x
            diff --git a/docs/a b/docs/b
            rename from docs/a
            rename to docs/b
        "};

        let renames = detect_renames(patch, |dir| dir != Path::new("lib/gone"));
        assert_eq!(renames, vec![rename("foo/yo", "foo/ha")]);
    }

    #[test_case("plain/path.txt", Some("plain/path.txt"); "unquoted")]
    #[test_case(r#""a b/x""#, Some("a b/x"); "quoted space")]
    #[test_case(r#""tab\there/x""#, Some("tab\there/x"); "escaped tab")]
    #[test_case(r#""quote\"d/back\\slash""#, Some("quote\"d/back\\slash"); "escaped quote and backslash")]
    #[test_case(r#""caf\303\251/x""#, Some("café/x"); "octal utf8")]
    #[test_case(r#""bad\q""#, None; "unknown escape")]
    #[test_case(r#""cut\30""#, None; "truncated octal")]
    #[test_case(r#""\377""#, None; "invalid utf8")]
    #[test]
    fn unquote_git_paths(path: &str, expect: Option<&str>) {
        pretty_assertions::assert_eq!(unquote_path(path), expect.map(PathBuf::from));
    }

    #[test]
    fn detect_from_patch_with_quoted_paths() {
        let patch = indoc! {r#"
            diff --git "a/my docs/old dir/x" "b/my docs/new dir/x"
            similarity index 100%
            rename from "my docs/old dir/x"
            rename to "my docs/new dir/x"
            diff --git "a/r\303\251sum\303\251/a/x" "b/r\303\251sum\303\251/b/x"
            similarity index 100%
            rename from "r\303\251sum\303\251/a/x"
            rename to "r\303\251sum\303\251/b/x"
        "#};

        let renames = detect_renames(patch, |_| true);
        assert_eq!(
            renames,
            vec![
                rename("my docs/old dir", "my docs/new dir"),
                rename("résumé/a", "résumé/b"),
            ]
        );
    }
}
