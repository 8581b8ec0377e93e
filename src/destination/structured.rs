// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Structured destination files.
//!
//! A structured file accumulates one __bucket__ per property path. Writing
//! to a property path that already has a bucket folds the new content into
//! it according to the merge strategy of the new write.
//!
//! # Flush Order
//!
//! On flush, the existing file on disk (if any) is parsed as the base
//! document. Buckets are then applied sorted by their property path key, so
//! a bucket at the root is applied before one at `scripts`, which is
//! applied before one at `scripts.build`. Key sorting runs afterwards over
//! the same buckets in reverse, which means the first bucket in property
//! path order decides the final key order when several buckets sort the
//! same object.

use crate::{
    config::{DestinationConfig, StructuredDestination, StructuredMergeStrategy},
    destination::{format::CodeFormatter, DestinationError, DestinationFile, Result},
    source::Composed,
    structured::{
        concat, deep_merge, slot_at, sort_keys, union, value_at, value_at_mut, value_kind,
        PropertyPath, SortOrder, Structured,
    },
};

use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::{
    fs::read_to_string,
    path::{Path, PathBuf},
};
use tracing::debug;

/// Text encoding of a structured document.
pub trait StructuredFormat: Send + Sync {
    /// Parse existing document.
    fn parse(&self, text: &str) -> std::result::Result<Value, String>;

    /// Serialize final document.
    fn stringify(&self, value: &Value) -> std::result::Result<String, String>;
}

/// JSON with two space indentation.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonFormat;

impl StructuredFormat for JsonFormat {
    fn parse(&self, text: &str) -> std::result::Result<Value, String> {
        serde_json::from_str(text).map_err(|err| err.to_string())
    }

    fn stringify(&self, value: &Value) -> std::result::Result<String, String> {
        serde_json::to_string_pretty(value).map_err(|err| err.to_string())
    }
}

/// TOML document, top-level value must be a table.
#[derive(Debug, Default, Clone, Copy)]
pub struct TomlFormat;

impl StructuredFormat for TomlFormat {
    fn parse(&self, text: &str) -> std::result::Result<Value, String> {
        toml::from_str::<Value>(text).map_err(|err| err.to_string())
    }

    fn stringify(&self, value: &Value) -> std::result::Result<String, String> {
        toml::to_string_pretty(value).map_err(|err| err.to_string())
    }
}

/// Pending write at one property path.
#[derive(Debug, Clone, PartialEq)]
pub struct Bucket {
    pub property_path: PropertyPath,
    pub content: Structured,
    pub spread: bool,
    pub sort: SortOrder,
}

/// Structured destination file.
pub struct StructuredFile<F: StructuredFormat> {
    path: PathBuf,
    format: F,
    buckets: IndexMap<String, Bucket>,
}

impl<F: StructuredFormat> StructuredFile<F> {
    pub fn new(path: impl Into<PathBuf>, format: F) -> Self {
        Self {
            path: path.into(),
            format,
            buckets: IndexMap::new(),
        }
    }

    /// Pending buckets in accumulation order.
    pub fn buckets(&self) -> impl Iterator<Item = &Bucket> {
        self.buckets.values()
    }

    /// Fold structured content into bucket of its property path.
    ///
    /// # Errors
    ///
    /// - Return [`DestinationError::DuplicateWrite`] for a second write with
    ///   the `error` strategy.
    /// - Return [`DestinationError::StrategyMismatch`] if the strategy cannot
    ///   combine the prior and new values.
    pub fn fold(&mut self, content: Structured, config: &StructuredDestination) -> Result<()> {
        let incoming = Bucket {
            property_path: config.property_path.clone(),
            content,
            spread: config.spread,
            sort: config.sort.clone(),
        };

        let key = config.property_path.key();
        let Some(bucket) = self.buckets.get_mut(&key) else {
            self.buckets.insert(key, incoming);
            return Ok(());
        };

        let mismatch = |expected, found| DestinationError::StrategyMismatch {
            path: self.path.clone(),
            property_path: config.property_path.clone(),
            strategy: config.merge_strategy.to_string(),
            expected,
            found,
        };

        match config.merge_strategy {
            StructuredMergeStrategy::Error => {
                return Err(DestinationError::DuplicateWrite {
                    path: self.path.clone(),
                    property_path: config.property_path.clone(),
                })
            }
            StructuredMergeStrategy::Ignore => {
                debug!(
                    "ignore write to {} of {:?}",
                    config.property_path,
                    self.path.display()
                );
            }
            StructuredMergeStrategy::Replace => *bucket = incoming,
            StructuredMergeStrategy::Shallow => {
                match (&mut bucket.content, incoming.content) {
                    (Structured::Object(prior), Structured::Object(next)) => prior.extend(next),
                    (Structured::Object(_), next) => return Err(mismatch("object", next.kind())),
                    (prior, _) => return Err(mismatch("object", prior.kind())),
                }
                bucket.spread |= incoming.spread;
            }
            StructuredMergeStrategy::Deep => {
                deep_merge(&mut bucket.content, incoming.content);
                bucket.spread |= incoming.spread;
            }
            StructuredMergeStrategy::Union | StructuredMergeStrategy::Concat => {
                let prior = std::mem::take(&mut bucket.content);
                bucket.content = match (prior, incoming.content) {
                    (Structured::Array(prior), Structured::Array(next)) => {
                        if config.merge_strategy == StructuredMergeStrategy::Union {
                            Structured::Array(union(prior, next))
                        } else {
                            Structured::Array(concat(prior, next))
                        }
                    }
                    (prior @ Structured::Array(_), next) => {
                        let found = next.kind();
                        bucket.content = prior;
                        return Err(mismatch("array", found));
                    }
                    (prior, _) => {
                        let found = prior.kind();
                        bucket.content = prior;
                        return Err(mismatch("array", found));
                    }
                };
            }
        }

        Ok(())
    }

    fn load_existing(&self) -> Result<Option<Value>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let text = read_to_string(&self.path).map_err(|err| DestinationError::Read {
            source: err,
            path: self.path.clone(),
        })?;
        self.format
            .parse(&text)
            .map(Some)
            .map_err(|message| DestinationError::Parse {
                path: self.path.clone(),
                message,
            })
    }

    /// Compose final document from existing content and pending buckets.
    ///
    /// # Errors
    ///
    /// - Return [`DestinationError::Parse`] if existing file is malformed.
    /// - Return [`DestinationError::SpreadNonObject`] if spread content or
    ///   the existing value at its property path is not an object.
    /// - Return [`DestinationError::IndexLimit`] if a property path indexes
    ///   past [`crate::structured::MAX_ARRAY_INDEX`].
    pub fn compose(&self) -> Result<Option<Value>> {
        let mut result = self.load_existing()?;
        let mut ordered = self.buckets.values().collect::<Vec<_>>();
        ordered.sort_by_key(|bucket| bucket.property_path.key());

        for bucket in &ordered {
            apply_bucket(&mut result, bucket, &self.path)?;
        }

        for bucket in ordered.iter().rev() {
            if !bucket.sort.is_enabled() {
                continue;
            }

            if let Some(Value::Object(entries)) = result
                .as_mut()
                .and_then(|root| value_at_mut(root, &bucket.property_path))
            {
                sort_keys(entries, &bucket.sort);
            }
        }

        Ok(result)
    }
}

fn apply_bucket(result: &mut Option<Value>, bucket: &Bucket, path: &Path) -> Result<()> {
    let content = bucket.content.clone();

    if bucket.spread {
        let entries = match content {
            Structured::Object(entries) => entries,
            Structured::Placeholder(inner) => match *inner {
                Structured::Object(entries) => entries
                    .into_iter()
                    .map(|(key, value)| (key, Structured::placeholder(value)))
                    .collect(),
                other => {
                    return Err(DestinationError::SpreadNonObject {
                        path: path.to_path_buf(),
                        property_path: bucket.property_path.clone(),
                        found: other.kind(),
                    })
                }
            },
            other => {
                return Err(DestinationError::SpreadNonObject {
                    path: path.to_path_buf(),
                    property_path: bucket.property_path.clone(),
                    found: other.kind(),
                })
            }
        };

        let root = result.get_or_insert_with(|| Value::Object(Map::new()));
        let target = slot(root, bucket, path)?;
        if target.is_null() {
            *target = Value::Object(Map::new());
        }

        // INVARIANT: Never replace existing non-object data at spread target.
        let found = value_kind(target);
        return match target {
            Value::Object(target) => {
                assign(target, entries);
                Ok(())
            }
            _ => Err(DestinationError::SpreadNonObject {
                path: path.to_path_buf(),
                property_path: bucket.property_path.clone(),
                found,
            }),
        };
    }

    if bucket.property_path.is_root() {
        match content {
            Structured::Placeholder(inner) => {
                if result.is_none() {
                    *result = Some((*inner).into_value());
                }
            }
            content => *result = Some(content.into_value()),
        }

        return Ok(());
    }

    let present = result
        .as_ref()
        .and_then(|root| value_at(root, &bucket.property_path))
        .is_some();
    if content.is_placeholder() && present {
        debug!(
            "keep existing value at {} of {:?}",
            bucket.property_path,
            path.display()
        );
        return Ok(());
    }

    let root = result.get_or_insert_with(|| Value::Object(Map::new()));
    *slot(root, bucket, path)? = content.into_value();

    Ok(())
}

fn slot<'a>(root: &'a mut Value, bucket: &Bucket, path: &Path) -> Result<&'a mut Value> {
    slot_at(root, &bucket.property_path).ok_or_else(|| DestinationError::IndexLimit {
        path: path.to_path_buf(),
        property_path: bucket.property_path.clone(),
    })
}

// Shallow assignment where a placeholder loses to any present key.
fn assign(target: &mut Map<String, Value>, entries: IndexMap<String, Structured>) {
    for (key, value) in entries {
        if value.is_placeholder() && target.contains_key(&key) {
            continue;
        }

        target.insert(key, value.into_value());
    }
}

impl<F: StructuredFormat> DestinationFile for StructuredFile<F> {
    fn path(&self) -> &Path {
        &self.path
    }

    fn update(&mut self, content: Composed, config: &DestinationConfig) -> Result<()> {
        let (DestinationConfig::Json(config) | DestinationConfig::Toml(config)) = config else {
            return Err(DestinationError::ConfigMismatch {
                path: self.path.clone(),
                found: config.kind(),
            });
        };

        match content {
            Composed::Structured(content) => self.fold(content, config),
            other => Err(DestinationError::ContentMismatch {
                path: self.path.clone(),
                found: other.kind(),
            }),
        }
    }

    fn render(&self, formatter: &dyn CodeFormatter) -> Result<Option<Vec<u8>>> {
        let Some(document) = self.compose()? else {
            return Ok(None);
        };

        let text = self
            .format
            .stringify(&document)
            .map_err(|message| DestinationError::Serialize {
                path: self.path.clone(),
                message,
            })?;

        Ok(Some(formatter.format(&self.path, text)?.into_bytes()))
    }
}
