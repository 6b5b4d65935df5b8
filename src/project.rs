//! Project files: the declarative build script.
//!
//! A project is a `press.toml` file listing render blocks. Each block names a
//! directory and the steps to run against the renderer opened for it; the
//! steps map one to one onto [`Session`] builder calls.
//!
//! ```toml
//! [settings]
//! engines = { rst = "plain" }      # merged over the default extension map
//!
//! [context]                        # visible to every template
//! site_title = "Notes"
//!
//! [[block]]
//! kind = "documents"
//! dir = "posts"
//! steps = [
//!   { sort = ["descending"] },
//!   { filter = { exclude = ["drafts.md", { pattern = "\\.tmp$" }] } },
//!   { apply = { module = "replace", args = ["teh", "the"] } },
//!   { layout = "layouts/post.html" },
//!   { output_to = { dir = "dist/posts" } },
//!   { collect_into = { path = "dist/feed.html", steps = [{ layout = "layouts/feed.html" }] } },
//! ]
//!
//! [[block]]
//! kind = "media"
//! dir = "images"
//! steps = [{ copy_to = "dist/images" }]
//! ```
//!
//! All paths are relative to the directory holding the project file. Unknown
//! keys are rejected to catch typos early.

use crate::error::BuildError;
use crate::module::ModuleRegistry;
use crate::renderer::{RendererKind, Toolchain};
use crate::session::Session;
use crate::source::{Criterion, FilterSpec, SortDirection};
use crate::template::{Context, EngineKind, TemplateRegistry, default_engine_map};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const PROJECT_FILENAME: &str = "press.toml";

#[derive(Error, Debug)]
pub enum ProjectError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Project validation error: {0}")]
    Validation(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Project {
    pub settings: Settings,
    pub context: Context,
    #[serde(rename = "block")]
    pub blocks: Vec<Block>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Extension to engine overrides, merged over [`default_engine_map`].
    pub engines: BTreeMap<String, EngineKind>,
}

impl Settings {
    pub fn engine_map(&self) -> BTreeMap<String, EngineKind> {
        let mut map = default_engine_map();
        for (ext, kind) in &self.engines {
            map.insert(ext.trim_start_matches('.').to_ascii_lowercase(), *kind);
        }
        map
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockKind {
    Documents,
    Media,
}

impl BlockKind {
    pub fn name(self) -> &'static str {
        match self {
            BlockKind::Documents => "documents",
            BlockKind::Media => "media",
        }
    }

    pub fn renderer_kind(self) -> RendererKind {
        match self {
            BlockKind::Documents => RendererKind::Document,
            BlockKind::Media => RendererKind::Media,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Block {
    pub kind: BlockKind,
    pub dir: PathBuf,
    #[serde(default)]
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Sort(Vec<SortDirection>),
    Filter(FilterDef),
    Apply {
        module: String,
        #[serde(default)]
        args: Vec<Value>,
    },
    Layout(PathBuf),
    Context(Context),
    CopyTo(PathBuf),
    OutputTo {
        dir: PathBuf,
        #[serde(default)]
        steps: Vec<Step>,
    },
    CollectInto {
        path: PathBuf,
        #[serde(default)]
        steps: Vec<Step>,
    },
}

impl Step {
    pub fn name(&self) -> &'static str {
        match self {
            Step::Sort(_) => "sort",
            Step::Filter(_) => "filter",
            Step::Apply { .. } => "apply",
            Step::Layout(_) => "layout",
            Step::Context(_) => "context",
            Step::CopyTo(_) => "copy_to",
            Step::OutputTo { .. } => "output_to",
            Step::CollectInto { .. } => "collect_into",
        }
    }

    /// One-line description used by `check`.
    pub fn describe(&self) -> String {
        let detail = match self {
            Step::Sort(tags) => tags
                .iter()
                .map(|t| match t {
                    SortDirection::Ascending => "ascending",
                    SortDirection::Descending => "descending",
                })
                .collect::<Vec<_>>()
                .join(","),
            Step::Filter(def) => def.describe(),
            Step::Apply { module, args } if args.is_empty() => module.clone(),
            Step::Apply { module, args } => {
                format!("{module} {}", Value::Array(args.clone()))
            }
            Step::Layout(path) | Step::CopyTo(path) => path.display().to_string(),
            Step::Context(_) => "bindings".to_string(),
            Step::OutputTo { dir, .. } => dir.display().to_string(),
            Step::CollectInto { path, .. } => path.display().to_string(),
        };
        format!("{} {}", self.name(), detail)
    }

    pub fn nested(&self) -> &[Step] {
        match self {
            Step::OutputTo { steps, .. } | Step::CollectInto { steps, .. } => steps,
            _ => &[],
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FilterDef {
    pub only: Option<Vec<CriterionDef>>,
    pub exclude: Option<Vec<CriterionDef>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CriterionDef {
    Literal(String),
    Pattern { pattern: String },
}

impl CriterionDef {
    fn to_criterion(&self) -> Result<Criterion, BuildError> {
        match self {
            CriterionDef::Literal(path) => Ok(Criterion::literal(path)),
            CriterionDef::Pattern { pattern } => Criterion::pattern(pattern),
        }
    }

    fn describe(&self) -> String {
        match self {
            CriterionDef::Literal(path) => path.clone(),
            CriterionDef::Pattern { pattern } => format!("/{pattern}/"),
        }
    }
}

impl FilterDef {
    pub fn to_spec(&self) -> Result<FilterSpec, BuildError> {
        let convert = |defs: &Option<Vec<CriterionDef>>| -> Result<Option<Vec<Criterion>>, BuildError> {
            defs.as_ref()
                .map(|defs| {
                    defs.iter()
                        .map(CriterionDef::to_criterion)
                        .collect::<Result<Vec<_>, _>>()
                })
                .transpose()
        };
        Ok(FilterSpec {
            only: convert(&self.only)?,
            exclude: convert(&self.exclude)?,
        })
    }

    fn describe(&self) -> String {
        let list = |defs: &[CriterionDef]| {
            defs.iter()
                .map(CriterionDef::describe)
                .collect::<Vec<_>>()
                .join(", ")
        };
        match (&self.only, &self.exclude) {
            (Some(only), _) => format!("only [{}]", list(only)),
            (None, Some(exclude)) => format!("exclude [{}]", list(exclude)),
            (None, None) => "(empty)".to_string(),
        }
    }
}

impl Project {
    /// Reject projects that could never build.
    pub fn validate(&self) -> Result<(), ProjectError> {
        for (i, block) in self.blocks.iter().enumerate() {
            let label = format!("block {} ({})", i + 1, block.kind.name());
            if block.dir.as_os_str().is_empty() {
                return Err(ProjectError::Validation(format!("{label}: dir must not be empty")));
            }
            validate_steps(&block.steps, block.kind, &label)?;
        }
        Ok(())
    }

    /// Module names used anywhere in the project that `registry` lacks.
    pub fn missing_modules(&self, registry: &ModuleRegistry) -> Vec<String> {
        fn walk(steps: &[Step], registry: &ModuleRegistry, missing: &mut Vec<String>) {
            for step in steps {
                if let Step::Apply { module, .. } = step {
                    if !registry.contains(module) && !missing.contains(module) {
                        missing.push(module.clone());
                    }
                }
                walk(step.nested(), registry, missing);
            }
        }
        let mut missing = Vec::new();
        for block in &self.blocks {
            walk(&block.steps, registry, &mut missing);
        }
        missing
    }

    /// Toolchain with the built-in modules and this project's engine map.
    pub fn toolchain(&self) -> Toolchain {
        Toolchain::new(
            ModuleRegistry::with_builtins(),
            TemplateRegistry::from_engine_map(&self.settings.engine_map()),
        )
    }
}

fn validate_steps(steps: &[Step], kind: BlockKind, label: &str) -> Result<(), ProjectError> {
    for step in steps {
        let media_ok = matches!(
            step,
            Step::Sort(_) | Step::Filter(_) | Step::Apply { .. } | Step::CopyTo(_)
        );
        if kind == BlockKind::Media && !media_ok {
            return Err(ProjectError::Validation(format!(
                "{label}: '{}' is not available in media blocks",
                step.name()
            )));
        }
        match step {
            Step::Filter(def) => {
                def.to_spec()
                    .map_err(|e| ProjectError::Validation(format!("{label}: {e}")))?;
            }
            Step::Apply { module, .. } if module.trim().is_empty() => {
                return Err(ProjectError::Validation(format!(
                    "{label}: apply needs a module name"
                )));
            }
            _ => {}
        }
        validate_steps(step.nested(), kind, label)?;
    }
    Ok(())
}

/// Load and validate the project file at `path`.
pub fn load_project(path: &Path) -> Result<Project, ProjectError> {
    let content = fs::read_to_string(path)?;
    let project: Project = toml::from_str(&content)?;
    project.validate()?;
    Ok(project)
}

/// Run every block of `project`, resolving paths against `root`.
pub fn run(project: &Project, root: &Path, toolchain: &Toolchain) -> Result<(), BuildError> {
    let mut session = Session::new(toolchain).with_globals(project.context.clone());
    for block in &project.blocks {
        session.block(block.kind.renderer_kind(), root.join(&block.dir), |s| {
            run_steps(&block.steps, s, root)
        })?;
    }
    Ok(())
}

fn run_steps(steps: &[Step], session: &mut Session, root: &Path) -> Result<(), BuildError> {
    for step in steps {
        run_step(step, session, root)?;
    }
    Ok(())
}

fn run_step(step: &Step, session: &mut Session, root: &Path) -> Result<(), BuildError> {
    match step {
        Step::Sort(tags) => session.sort(tags),
        Step::Filter(def) => session.filter(&def.to_spec()?),
        Step::Apply { module, args } => session.apply(module, args),
        Step::Layout(path) => session.layout(root.join(path)),
        Step::Context(context) => session.context(context),
        Step::CopyTo(dir) => session.copy_to(root.join(dir)).map(|_| ()),
        Step::OutputTo { dir, steps } => session
            .output_to(root.join(dir), |s| run_steps(steps, s, root))
            .map(|_| ()),
        Step::CollectInto { path, steps } => {
            session.collect_into(root.join(path), |s| run_steps(steps, s, root))
        }
    }
}

/// Returns a fully-commented stock `press.toml`.
pub fn stock_project_toml() -> &'static str {
    r##"# sitepress project
# =================
# Paths are relative to this file. Blocks run top to bottom.

# [settings]
# Extension -> engine ("markdown", "tera" or "plain"), merged over the
# defaults: md/markdown -> markdown, html/htm/tera/j2 -> tera, txt -> plain.
# Sources with no engine are copied through unchanged, with a warning.
# engines = { rst = "plain" }

# Variables visible to every template and layout.
[context]
site_title = "My Site"

# A documents block reads, renders and emits the files directly inside `dir`.
[[block]]
kind = "documents"
dir = "pages"
steps = [
  # Newest first. Tags: "ascending" (default) or "descending"; the last wins.
  { sort = ["ascending"] },
  # Drop drafts. Use `only` to keep matches instead. A string matches a path
  # (relative to `dir` or full); { pattern = "..." } is a regex.
  { filter = { exclude = [{ pattern = "draft" }] } },
  # Modules: skip_underscored (filter), replace / strip_front_matter
  # (preprocessors), append (processor).
  { apply = { module = "strip_front_matter" } },
  # Wraps every emitted document; the document is bound as `content`.
  { layout = "layouts/page.html" },
  # One .html file per source.
  { output_to = { dir = "dist" } },
  # Everything concatenated into one file; nested steps only apply here.
  { collect_into = { path = "dist/all.html", steps = [{ context = { section = "all" } }] } },
]

# A media block copies files byte for byte. Only sort, filter, apply (filter
# modules) and copy_to are available.
[[block]]
kind = "media"
dir = "images"
steps = [
  { apply = { module = "skip_underscored" } },
  { copy_to = "dist/images" },
]
"##
}
