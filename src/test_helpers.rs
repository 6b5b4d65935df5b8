//! Shared test utilities for the sitepress test suite.
//!
//! Provides a temp-directory tree builder and extractors that turn source
//! sets into plain vectors for `assert_eq!`.
//!
//! # Usage
//!
//! ```rust,ignore
//! use crate::test_helpers::*;
//!
//! let tmp = write_tree(&[("docs/a.md", "# A"), ("layout.html", "{{ content }}")]);
//! let set = SourceSet::discover(&tmp.path().join("docs")).unwrap();
//! assert_eq!(file_names(&set), vec!["a.md"]);
//! ```

use std::path::Path;
use tempfile::TempDir;

use crate::source::SourceSet;

// =========================================================================
// Fixture setup
// =========================================================================

/// Create a temp directory holding `files` (relative path, content).
pub fn write_tree(files: &[(&str, &str)]) -> TempDir {
    let tmp = TempDir::new().unwrap();
    for (relative, content) in files {
        let path = tmp.path().join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, content).unwrap();
    }
    tmp
}

/// Read a file the test expects to exist. Panics with the path on miss.
pub fn read(path: &Path) -> String {
    std::fs::read_to_string(path)
        .unwrap_or_else(|e| panic!("cannot read '{}': {e}", path.display()))
}

// =========================================================================
// Bulk extractors
// =========================================================================

/// File names of all records, in set order.
pub fn file_names(set: &SourceSet) -> Vec<String> {
    set.records()
        .iter()
        .map(|r| {
            r.path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        })
        .collect()
}

/// Record contents in set order; unread records show as empty strings.
pub fn contents(set: &SourceSet) -> Vec<String> {
    set.records().iter().map(|r| r.text().to_string()).collect()
}
