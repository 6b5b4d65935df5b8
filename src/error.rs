//! Error taxonomy for the build core.
//!
//! Every failure in the core surfaces unchanged to the top level: there is no
//! local recovery or retry, a build is all-or-nothing. The one exception is a
//! malformed filter spec ([`BuildError::Config`]), which the session reports
//! and skips.

use crate::template::TemplateError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("Config error: {0}")]
    Config(String),
    #[error("Module '{0}' is not defined, maybe not registered")]
    ModuleResolution(String),
    #[error("Module '{module}' cannot be applied to a {renderer} renderer")]
    UnsupportedModule {
        module: String,
        renderer: &'static str,
    },
    #[error("State error: {0}")]
    State(String),
    #[error("IO error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Template error in {}: {source}", path.display())]
    Template {
        path: PathBuf,
        #[source]
        source: TemplateError,
    },
    #[error("Module '{module}' failed: {message}")]
    Module { module: String, message: String },
    #[error("'{operation}' is not supported by a {renderer} renderer")]
    Unsupported {
        operation: &'static str,
        renderer: &'static str,
    },
    #[error("'{0}' called outside of a render block")]
    NoRenderBlock(&'static str),
}

impl BuildError {
    /// Wrap an IO error with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        BuildError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Failure reported by a user-supplied module while handling one record.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{0}")]
pub struct ModuleError(pub String);

impl ModuleError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}
