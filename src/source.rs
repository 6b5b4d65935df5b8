//! Source sets: the ordered files a renderer works on.
//!
//! A [`SourceSet`] is built from the direct entries of one base directory. Each
//! entry becomes a [`SourceRecord`] whose `content` stays `None` until the
//! owning renderer reads it.
//!
//! ## Ordering
//!
//! Discovery order is file-name order, so builds are reproducible on every
//! platform. The only supported reordering is reversal, requested through
//! [`SourceSet::sort`] and carried out lazily by [`SourceSet::prepare`].
//!
//! ## Filtering
//!
//! ```text
//! only:    [ "index.md", { pattern = "^posts/2024" } ]   keep matches
//! exclude: [ "drafts.md" ]                               drop matches
//! ```
//!
//! A literal matches the full record path or `base_dir/literal`; a pattern is a
//! regex searched anywhere in the full path. Filtering never reorders.

use crate::error::BuildError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Entries the OS drops into directories that are never content.
const METADATA_ENTRIES: &[&str] = &[".DS_Store", "Thumbs.db", "desktop.ini", ".directory"];

/// One file in a source set.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRecord {
    pub path: PathBuf,
    /// `None` until the read stage.
    pub content: Option<String>,
}

impl SourceRecord {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            content: None,
        }
    }

    pub fn with_content(path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: Some(content.into()),
        }
    }

    /// Content as a string slice, empty when not yet read.
    pub fn text(&self) -> &str {
        self.content.as_deref().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[serde(alias = "asc")]
    Ascending,
    #[serde(alias = "desc")]
    Descending,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SortOptions {
    pub reverse: bool,
}

/// One element of an `only`/`exclude` list.
#[derive(Debug, Clone)]
pub enum Criterion {
    Literal(PathBuf),
    Pattern(Regex),
}

impl Criterion {
    pub fn literal(path: impl Into<PathBuf>) -> Self {
        Criterion::Literal(path.into())
    }

    pub fn pattern(pattern: &str) -> Result<Self, BuildError> {
        Regex::new(pattern)
            .map(Criterion::Pattern)
            .map_err(|e| BuildError::Config(format!("invalid filter pattern '{pattern}': {e}")))
    }

    pub fn matches(&self, path: &Path, base_dir: &Path) -> bool {
        match self {
            Criterion::Literal(literal) => path == literal || path == base_dir.join(literal),
            Criterion::Pattern(regex) => regex.is_match(&path.to_string_lossy()),
        }
    }
}

/// Filter request. `only` takes priority when both lists are given.
#[derive(Debug, Clone, Default)]
pub struct FilterSpec {
    pub only: Option<Vec<Criterion>>,
    pub exclude: Option<Vec<Criterion>>,
}

impl FilterSpec {
    pub fn only(criteria: Vec<Criterion>) -> Self {
        Self {
            only: Some(criteria),
            exclude: None,
        }
    }

    pub fn exclude(criteria: Vec<Criterion>) -> Self {
        Self {
            only: None,
            exclude: Some(criteria),
        }
    }
}

/// Ordered records discovered under one base directory.
#[derive(Debug, Clone)]
pub struct SourceSet {
    base_dir: PathBuf,
    records: Vec<SourceRecord>,
    sort: SortOptions,
    prepared: bool,
}

impl SourceSet {
    /// Enumerate the direct file entries of `base_dir`.
    pub fn discover(base_dir: &Path) -> Result<Self, BuildError> {
        let mut records = Vec::new();
        let walker = WalkDir::new(base_dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name();
        for entry in walker {
            let entry = entry.map_err(|e| BuildError::io(base_dir, e.into()))?;
            // `Path::is_file` follows symlinks; a link keeps its own path so
            // destinations stay relative to `base_dir`.
            if !entry.path().is_file() || is_metadata_entry(entry.path()) {
                continue;
            }
            records.push(SourceRecord::new(entry.into_path()));
        }
        Ok(Self::from_records(base_dir, records))
    }

    pub fn from_records(base_dir: impl Into<PathBuf>, records: Vec<SourceRecord>) -> Self {
        Self {
            base_dir: base_dir.into(),
            records,
            sort: SortOptions::default(),
            prepared: false,
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn records(&self) -> &[SourceRecord] {
        &self.records
    }

    pub fn records_mut(&mut self) -> &mut [SourceRecord] {
        &mut self.records
    }

    pub fn sort_options(&self) -> SortOptions {
        self.sort
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Record the requested direction. The last tag wins; no tags is a no-op.
    pub fn sort(&mut self, tags: &[SortDirection]) {
        if let Some(last) = tags.last() {
            self.sort.reverse = *last == SortDirection::Descending;
        }
    }

    /// Apply the sort options in place. Reversing twice cancels out, so the
    /// engine goes through [`SourceSet::prepare`] instead.
    pub fn prerender(&mut self) {
        if self.sort.reverse {
            self.records.reverse();
        }
    }

    /// Run [`SourceSet::prerender`] once per source set.
    pub fn prepare(&mut self) {
        if !self.prepared {
            self.prerender();
            self.prepared = true;
        }
    }

    pub fn filter(&mut self, spec: &FilterSpec) -> Result<(), BuildError> {
        let (criteria, keep_matches) = match (&spec.only, &spec.exclude) {
            (Some(only), _) => (only, true),
            (None, Some(exclude)) => (exclude, false),
            (None, None) => {
                return Err(BuildError::Config(
                    "filter needs an 'only' or 'exclude' list".into(),
                ));
            }
        };
        let base_dir = &self.base_dir;
        self.records.retain(|record| {
            let matched = criteria.iter().any(|c| c.matches(&record.path, base_dir));
            matched == keep_matches
        });
        Ok(())
    }

    /// Keep the records for which `keep` returns true, in order.
    pub fn retain(&mut self, keep: impl FnMut(&SourceRecord) -> bool) {
        self.records.retain(keep);
    }
}

fn is_metadata_entry(path: &Path) -> bool {
    let Some(name) = path.file_name() else {
        return false;
    };
    // `._name` files are AppleDouble resource forks
    METADATA_ENTRIES.iter().any(|m| name == *m) || name.to_string_lossy().starts_with("._")
}
