//! Template engines, selected by file extension.
//!
//! The renderer never knows which engine it talks to: it asks the
//! [`TemplateRegistry`] for the engine registered under a record's extension
//! and hands it the current text plus the [`Context`]. Three engines ship with
//! the crate:
//!
//! | Engine | Behaviour |
//! |--------|-----------|
//! | `markdown` | CommonMark to HTML via pulldown-cmark; context is ignored |
//! | `tera` | Jinja-style templates via Tera; autoescape is off so a layout's `{{ content }}` is inserted verbatim |
//! | `plain` | identity |
//!
//! Custom engines implement [`TemplateEngine`] and are registered per
//! extension with [`TemplateRegistry::register`].

use pulldown_cmark::{Options, Parser, html as md_html};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("Tera error: {0}")]
    Tera(#[from] tera::Error),
    #[error("no template engine registered for '{0}'")]
    NoEngine(String),
}

/// Variables visible to templates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Context {
    vars: Map<String, Value>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.vars.insert(key.into(), value.into());
    }

    /// Copy of this context with one extra binding.
    pub fn with(&self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let mut next = self.clone();
        next.insert(key, value);
        next
    }

    /// Bindings from `other` override ours.
    pub fn extend(&mut self, other: &Context) {
        for (key, value) in &other.vars {
            self.vars.insert(key.clone(), value.clone());
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.vars.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

impl From<Map<String, Value>> for Context {
    fn from(vars: Map<String, Value>) -> Self {
        Self { vars }
    }
}

pub trait TemplateEngine {
    fn name(&self) -> &'static str;

    /// Render `source` with `context`, returning the new text.
    fn render(&self, source: &str, context: &Context) -> Result<String, TemplateError>;
}

pub struct MarkdownEngine;

impl TemplateEngine for MarkdownEngine {
    fn name(&self) -> &'static str {
        "markdown"
    }

    fn render(&self, source: &str, _context: &Context) -> Result<String, TemplateError> {
        let options = Options::ENABLE_TABLES
            | Options::ENABLE_FOOTNOTES
            | Options::ENABLE_STRIKETHROUGH;
        let parser = Parser::new_ext(source, options);
        let mut html = String::with_capacity(source.len() * 3 / 2);
        md_html::push_html(&mut html, parser);
        Ok(html)
    }
}

pub struct TeraEngine;

impl TemplateEngine for TeraEngine {
    fn name(&self) -> &'static str {
        "tera"
    }

    fn render(&self, source: &str, context: &Context) -> Result<String, TemplateError> {
        let tera_context = tera::Context::from_serialize(context)?;
        Ok(tera::Tera::one_off(source, &tera_context, false)?)
    }
}

pub struct PlainEngine;

impl TemplateEngine for PlainEngine {
    fn name(&self) -> &'static str {
        "plain"
    }

    fn render(&self, source: &str, _context: &Context) -> Result<String, TemplateError> {
        Ok(source.to_string())
    }
}

/// Engine names accepted in the project file's `[settings].engines` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    Markdown,
    Tera,
    Plain,
}

impl EngineKind {
    pub fn build(self) -> Box<dyn TemplateEngine> {
        match self {
            EngineKind::Markdown => Box::new(MarkdownEngine),
            EngineKind::Tera => Box::new(TeraEngine),
            EngineKind::Plain => Box::new(PlainEngine),
        }
    }
}

/// Extension to engine mapping used when nothing is configured.
pub fn default_engine_map() -> BTreeMap<String, EngineKind> {
    [
        ("md", EngineKind::Markdown),
        ("markdown", EngineKind::Markdown),
        ("html", EngineKind::Tera),
        ("htm", EngineKind::Tera),
        ("tera", EngineKind::Tera),
        ("j2", EngineKind::Tera),
        ("txt", EngineKind::Plain),
    ]
    .into_iter()
    .map(|(ext, kind)| (ext.to_string(), kind))
    .collect()
}

#[derive(Default)]
pub struct TemplateRegistry {
    engines: HashMap<String, Box<dyn TemplateEngine>>,
}

impl TemplateRegistry {
    /// Registry with no engines at all.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_defaults() -> Self {
        Self::from_engine_map(&default_engine_map())
    }

    pub fn from_engine_map(map: &BTreeMap<String, EngineKind>) -> Self {
        let mut registry = Self::empty();
        for (ext, kind) in map {
            registry.register(ext, kind.build());
        }
        registry
    }

    /// Register `engine` for an extension (without the leading dot).
    pub fn register(&mut self, extension: &str, engine: Box<dyn TemplateEngine>) {
        self.engines
            .insert(extension.trim_start_matches('.').to_ascii_lowercase(), engine);
    }

    /// Engine for `path`'s extension, if one is registered.
    pub fn resolve(&self, path: &Path) -> Option<&dyn TemplateEngine> {
        let ext = path.extension()?.to_string_lossy().to_ascii_lowercase();
        self.engines.get(&ext).map(|engine| engine.as_ref())
    }
}
