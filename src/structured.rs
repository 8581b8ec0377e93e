// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Structured content with placeholder markers.
//!
//! Structured destinations (JSON, TOML) are composed from [`Structured`]
//! trees rather than plain [`serde_json::Value`]s, because any node of the
//! tree may be marked as a __placeholder__. A placeholder carries a value
//! that should only be written if the destination does not already have one
//! at that position. Placeholders never reach the serialized output: they
//! are either discarded in favour of an existing value, or unwrapped.
//!
//! Property paths address positions inside structured documents. They are
//! written as `a.b[0]["c.d"]` or given as a list of segments.

use indexmap::IndexMap;
use serde::{de::Deserializer, Deserialize, Serialize, Serializer};
use serde_json::{Map, Number, Value};
use std::{
    cmp::Ordering,
    fmt::{Display, Formatter, Result as FmtResult},
    str::FromStr,
};

/// Structured value tree with placeholder markers.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Structured {
    #[default]
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Array(Vec<Structured>),
    Object(IndexMap<String, Structured>),

    /// Value applied only when destination lacks one.
    Placeholder(Box<Structured>),
}

impl Structured {
    /// Wrap value into a placeholder.
    ///
    /// Wrapping a placeholder again does not nest it.
    pub fn placeholder(value: impl Into<Structured>) -> Self {
        match value.into() {
            placeholder @ Self::Placeholder(_) => placeholder,
            value => Self::Placeholder(Box::new(value)),
        }
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self, Self::Placeholder(_))
    }

    pub fn as_object(&self) -> Option<&IndexMap<String, Structured>> {
        match self {
            Self::Object(object) => Some(object),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Vec<Structured>> {
        match self {
            Self::Array(array) => Some(array),
            _ => None,
        }
    }

    /// Short name of value kind for error reporting.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Array(_) => "array",
            Self::Object(_) => "object",
            Self::Placeholder(inner) => inner.kind(),
        }
    }

    /// Convert into plain value, unwrapping every placeholder.
    pub fn into_value(self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(value) => Value::Bool(value),
            Self::Number(value) => Value::Number(value),
            Self::String(value) => Value::String(value),
            Self::Array(values) => Value::Array(values.into_iter().map(Self::into_value).collect()),
            Self::Object(entries) => Value::Object(
                entries
                    .into_iter()
                    .map(|(key, value)| (key, value.into_value()))
                    .collect::<Map<_, _>>(),
            ),
            Self::Placeholder(inner) => inner.into_value(),
        }
    }

    /// Extract sub-tree at property path.
    pub fn get(&self, path: &PropertyPath) -> Option<&Structured> {
        let mut current = self;
        for segment in path.segments() {
            current = match (current, segment) {
                (Self::Placeholder(inner), _) => inner.get(&PropertyPath::from(vec![segment.clone()]))?,
                (Self::Object(entries), PathSegment::Key(key)) => entries.get(key)?,
                (Self::Object(entries), PathSegment::Index(index)) => {
                    entries.get(&index.to_string())?
                }
                (Self::Array(values), PathSegment::Index(index)) => values.get(*index)?,
                _ => return None,
            };
        }

        Some(current)
    }
}

impl From<Value> for Structured {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(value) => Self::Bool(value),
            Value::Number(value) => Self::Number(value),
            Value::String(value) => Self::String(value),
            Value::Array(values) => Self::Array(values.into_iter().map(Self::from).collect()),
            Value::Object(entries) => Self::Object(
                entries
                    .into_iter()
                    .map(|(key, value)| (key, Self::from(value)))
                    .collect(),
            ),
        }
    }
}

impl From<&str> for Structured {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for Structured {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<bool> for Structured {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<Vec<Structured>> for Structured {
    fn from(values: Vec<Structured>) -> Self {
        Self::Array(values)
    }
}

impl From<IndexMap<String, Structured>> for Structured {
    fn from(entries: IndexMap<String, Structured>) -> Self {
        Self::Object(entries)
    }
}

impl Serialize for Structured {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.clone().into_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Structured {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(Self::from)
    }
}

/// Merge source into target recursively.
///
/// Objects merge key by key, arrays merge index by index, anything else is
/// overwritten by the source. A placeholder in the source never overwrites
/// a value already present in the target, while a placeholder in the target
/// always yields to a concrete source.
pub fn deep_merge(target: &mut Structured, source: Structured) {
    if source.is_placeholder() {
        return;
    }

    if target.is_placeholder() {
        *target = source;
        return;
    }

    match (target, source) {
        (Structured::Object(target), Structured::Object(source)) => {
            for (key, value) in source {
                match target.get_mut(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        target.insert(key, value);
                    }
                }
            }
        }
        (Structured::Array(target), Structured::Array(source)) => {
            for (index, value) in source.into_iter().enumerate() {
                match target.get_mut(index) {
                    Some(existing) => deep_merge(existing, value),
                    None => target.push(value),
                }
            }
        }
        (target, source) => *target = source,
    }
}

/// Union of two arrays preserving first-seen order.
pub fn union(prior: Vec<Structured>, next: Vec<Structured>) -> Vec<Structured> {
    let mut out: Vec<Structured> = Vec::with_capacity(prior.len() + next.len());
    for value in prior.into_iter().chain(next) {
        if !out.contains(&value) {
            out.push(value);
        }
    }

    out
}

/// Concatenation of two arrays, duplicates kept.
pub fn concat(mut prior: Vec<Structured>, next: Vec<Structured>) -> Vec<Structured> {
    prior.extend(next);
    prior
}

/// Segment of a property path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

impl Display for PathSegment {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Key(key) => fmt.write_str(key),
            Self::Index(index) => write!(fmt, "{index}"),
        }
    }
}

/// Path to a property inside a structured document.
///
/// The empty path addresses the document root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct PropertyPath(Vec<PathSegment>);

impl PropertyPath {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    /// Bucket key of path: segments joined by a tab.
    pub fn key(&self) -> String {
        self.0
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\t")
    }
}

impl From<Vec<PathSegment>> for PropertyPath {
    fn from(segments: Vec<PathSegment>) -> Self {
        Self(segments)
    }
}

impl FromStr for PropertyPath {
    type Err = PropertyPathError;

    fn from_str(path: &str) -> Result<Self, Self::Err> {
        let malformed = || PropertyPathError(path.to_string());
        let mut segments = Vec::new();
        let mut chars = path.chars().peekable();
        let mut key = String::new();

        while let Some(ch) = chars.next() {
            match ch {
                '.' => {
                    if !key.is_empty() {
                        segments.push(PathSegment::Key(std::mem::take(&mut key)));
                    }
                }
                '[' => {
                    if !key.is_empty() {
                        segments.push(PathSegment::Key(std::mem::take(&mut key)));
                    }

                    let mut inner = String::new();
                    let mut closed = false;
                    for ch in chars.by_ref() {
                        if ch == ']' {
                            closed = true;
                            break;
                        }
                        inner.push(ch);
                    }

                    if !closed {
                        return Err(malformed());
                    }

                    let quoted = inner
                        .strip_prefix('"')
                        .and_then(|rest| rest.strip_suffix('"'))
                        .or_else(|| {
                            inner
                                .strip_prefix('\'')
                                .and_then(|rest| rest.strip_suffix('\''))
                        });
                    let segment = match quoted {
                        Some(quoted) => PathSegment::Key(quoted.to_string()),
                        None => inner
                            .trim()
                            .parse::<usize>()
                            .map(PathSegment::Index)
                            .map_err(|_| malformed())?,
                    };
                    segments.push(segment);
                }
                ']' => return Err(malformed()),
                ch => key.push(ch),
            }
        }

        if !key.is_empty() {
            segments.push(PathSegment::Key(key));
        }

        Ok(Self(segments))
    }
}

impl Display for PropertyPath {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        if self.0.is_empty() {
            return fmt.write_str("<root>");
        }

        for (position, segment) in self.0.iter().enumerate() {
            match segment {
                PathSegment::Key(key) if key.contains(['.', '[', ']']) => {
                    write!(fmt, "[{key:?}]")?
                }
                PathSegment::Key(key) if position == 0 => fmt.write_str(key)?,
                PathSegment::Key(key) => write!(fmt, ".{key}")?,
                PathSegment::Index(index) => write!(fmt, "[{index}]")?,
            }
        }

        Ok(())
    }
}

impl Serialize for PropertyPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.0.iter().map(|segment| match segment {
            PathSegment::Key(key) => Value::String(key.clone()),
            PathSegment::Index(index) => Value::Number((*index).into()),
        }))
    }
}

impl<'de> Deserialize<'de> for PropertyPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawSegment {
            Key(String),
            Index(usize),
        }

        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawPath {
            Dotted(String),
            Segments(Vec<RawSegment>),
        }

        match RawPath::deserialize(deserializer)? {
            RawPath::Dotted(path) => path.parse().map_err(serde::de::Error::custom),
            RawPath::Segments(segments) => Ok(Self(
                segments
                    .into_iter()
                    .map(|segment| match segment {
                        RawSegment::Key(key) => PathSegment::Key(key),
                        RawSegment::Index(index) => PathSegment::Index(index),
                    })
                    .collect(),
            )),
        }
    }
}

/// Malformed property path.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("malformed property path {0:?}")]
pub struct PropertyPathError(pub String);

/// Look up value at property path.
pub fn value_at<'a>(root: &'a Value, path: &PropertyPath) -> Option<&'a Value> {
    let mut current = root;
    for segment in path.segments() {
        current = match (current, segment) {
            (Value::Object(entries), segment) => entries.get(&segment.to_string())?,
            (Value::Array(values), PathSegment::Index(index)) => values.get(*index)?,
            _ => return None,
        };
    }

    Some(current)
}

/// Look up mutable value at property path without creating anything.
pub fn value_at_mut<'a>(root: &'a mut Value, path: &PropertyPath) -> Option<&'a mut Value> {
    let mut current = root;
    for segment in path.segments() {
        current = match (current, segment) {
            (Value::Object(entries), segment) => entries.get_mut(&segment.to_string())?,
            (Value::Array(values), PathSegment::Index(index)) => values.get_mut(*index)?,
            _ => return None,
        };
    }

    Some(current)
}

/// Largest array index a property path may create a slot at.
pub const MAX_ARRAY_INDEX: usize = u16::MAX as usize;

/// Mutable slot at property path, creating intermediate containers.
///
/// Intermediate values that are not containers are replaced, with an array
/// created when the following segment is an index and an object otherwise.
/// Return `None` without touching `root` if any index of the path is larger
/// than [`MAX_ARRAY_INDEX`].
pub fn slot_at<'a>(root: &'a mut Value, path: &PropertyPath) -> Option<&'a mut Value> {
    let oversized = path
        .segments()
        .iter()
        .any(|segment| matches!(segment, PathSegment::Index(index) if *index > MAX_ARRAY_INDEX));
    if oversized {
        return None;
    }

    let mut current = root;
    for segment in path.segments() {
        let replace = match segment {
            PathSegment::Index(_) => !current.is_array() && !current.is_object(),
            PathSegment::Key(_) => !current.is_object(),
        };
        if replace {
            *current = match segment {
                PathSegment::Index(_) => Value::Array(Vec::new()),
                PathSegment::Key(_) => Value::Object(Map::new()),
            };
        }

        current = match (current, segment) {
            (Value::Array(values), PathSegment::Index(index)) => {
                if values.len() <= *index {
                    values.resize(index + 1, Value::Null);
                }
                &mut values[*index]
            }
            (Value::Object(entries), segment) => {
                entries.entry(segment.to_string()).or_insert(Value::Null)
            }
            (other, _) => other,
        };
    }

    Some(current)
}

/// Name of value kind used in error messages.
pub fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Key sorting configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SortOrder {
    /// Sort alphabetically, or not at all.
    Enabled(bool),

    /// Listed keys first in list order, the rest alphabetically.
    Priority(Vec<String>),
}

impl SortOrder {
    pub fn is_enabled(&self) -> bool {
        match self {
            Self::Enabled(enabled) => *enabled,
            Self::Priority(_) => true,
        }
    }

    fn priority(&self) -> &[String] {
        match self {
            Self::Enabled(_) => &[],
            Self::Priority(keys) => keys.as_slice(),
        }
    }
}

impl Default for SortOrder {
    fn default() -> Self {
        Self::Enabled(true)
    }
}

/// Sort own keys of object by sort order.
pub fn sort_keys(entries: &mut Map<String, Value>, order: &SortOrder) {
    if !order.is_enabled() {
        return;
    }

    let priority = order.priority();
    let rank = |key: &str| priority.iter().position(|listed| listed == key);
    let mut sorted = std::mem::take(entries).into_iter().collect::<Vec<_>>();
    sorted.sort_by(|(left, _), (right, _)| match (rank(left), rank(right)) {
        (Some(left), Some(right)) => left.cmp(&right),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => compare_keys(left, right),
    });
    entries.extend(sorted);
}

// Case-insensitive first so that `name` and `Name` sit together, then exact.
fn compare_keys(left: &str, right: &str) -> Ordering {
    left.to_lowercase()
        .cmp(&right.to_lowercase())
        .then_with(|| left.cmp(right))
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use simple_test_case::test_case;

    fn structured(value: Value) -> Structured {
        Structured::from(value)
    }

    #[test]
    fn deep_merge_disjoint_keys_keeps_both() {
        let mut target = structured(json!({"scripts": {"build": "tsc"}}));
        deep_merge(&mut target, structured(json!({"scripts": {"test": "jest"}, "private": true})));
        assert_eq!(
            target.into_value(),
            json!({"scripts": {"build": "tsc", "test": "jest"}, "private": true})
        );
    }

    #[test]
    fn deep_merge_arrays_by_index() {
        let mut target = structured(json!([{"a": 1}, 2, 3]));
        deep_merge(&mut target, structured(json!([{"b": 2}, 5])));
        assert_eq!(target.into_value(), json!([{"a": 1, "b": 2}, 5, 3]));
    }

    #[test]
    fn deep_merge_placeholder_never_overwrites() {
        let mut target = structured(json!({"version": "2.0.0"}));
        let mut source = IndexMap::new();
        source.insert("version".to_string(), Structured::placeholder("0.1.0"));
        source.insert("license".to_string(), Structured::placeholder("MIT"));
        deep_merge(&mut target, Structured::Object(source));
        assert_eq!(
            target.into_value(),
            json!({"version": "2.0.0", "license": "MIT"})
        );
    }

    #[test]
    fn union_preserves_first_seen_order() {
        let prior = vec!["a".into(), "b".into()];
        let next = vec!["c".into(), "a".into(), "c".into()];
        assert_eq!(
            union(prior, next),
            vec![Structured::from("a"), "b".into(), "c".into()]
        );
    }

    #[test]
    fn concat_keeps_duplicates() {
        let prior: Vec<Structured> = vec!["a".into(), "b".into()];
        let next: Vec<Structured> = vec!["a".into()];
        let result = concat(prior.clone(), next.clone());
        assert_eq!(result.len(), prior.len() + next.len());
        assert_eq!(result, vec![Structured::from("a"), "b".into(), "a".into()]);
    }

    #[test_case("compilerOptions.paths", vec![PathSegment::Key("compilerOptions".into()), PathSegment::Key("paths".into())]; "dotted")]
    #[test_case("files[2]", vec![PathSegment::Key("files".into()), PathSegment::Index(2)]; "indexed")]
    #[test_case("settings[\"editor.tabSize\"]", vec![PathSegment::Key("settings".into()), PathSegment::Key("editor.tabSize".into())]; "quoted key")]
    #[test_case("", vec![]; "root")]
    #[test]
    fn parse_property_paths(path: &str, expect: Vec<PathSegment>) {
        pretty_assertions::assert_eq!(path.parse::<PropertyPath>(), Ok(PropertyPath::from(expect)));
    }

    #[test]
    fn malformed_property_path() {
        assert!("files[oops".parse::<PropertyPath>().is_err());
        assert!("files[x]".parse::<PropertyPath>().is_err());
    }

    #[test]
    fn property_path_bucket_key_uses_tabs() -> anyhow::Result<()> {
        let path: PropertyPath = "a.b[0]".parse()?;
        assert_eq!(path.key(), "a\tb\t0");
        Ok(())
    }

    #[test]
    fn slot_at_creates_intermediate_containers() -> anyhow::Result<()> {
        let mut root = json!({"a": 1});
        *slot_at(&mut root, &"a.b".parse()?).context("slot at a.b")? = json!(true);
        *slot_at(&mut root, &"list[1].name".parse()?).context("slot at list[1]")? = json!("x");
        assert_eq!(root, json!({"a": {"b": true}, "list": [null, {"name": "x"}]}));
        assert_eq!(value_at(&root, &"list[1].name".parse()?), Some(&json!("x")));
        Ok(())
    }

    #[test_case("a[18446744073709551615]"; "usize max")]
    #[test_case("a[4000000000].b"; "huge intermediate")]
    #[test_case("a[65536]"; "just past limit")]
    #[test]
    fn slot_at_refuses_oversized_index(path: &str) -> anyhow::Result<()> {
        let mut root = json!({"keep": true});
        assert!(slot_at(&mut root, &path.parse()?).is_none());
        pretty_assertions::assert_eq!(root, json!({"keep": true}));
        Ok(())
    }

    #[test]
    fn sort_keys_with_priority_list() {
        let mut entries = json!({"version": "1", "license": "MIT", "name": "x"})
            .as_object()
            .cloned()
            .unwrap_or_default();
        sort_keys(
            &mut entries,
            &SortOrder::Priority(vec!["name".into(), "version".into()]),
        );
        assert_eq!(
            entries.keys().collect::<Vec<_>>(),
            vec!["name", "version", "license"]
        );
    }

    #[test]
    fn sort_keys_disabled_keeps_order() {
        let mut entries = json!({"b": 1, "a": 2}).as_object().cloned().unwrap_or_default();
        sort_keys(&mut entries, &SortOrder::Enabled(false));
        assert_eq!(entries.keys().collect::<Vec<_>>(), vec!["b", "a"]);
    }
}
