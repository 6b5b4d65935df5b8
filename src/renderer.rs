//! Renderers: the state machine that carries a source set through its stages.
//!
//! ```text
//!   Unread ──read()──▶ Read ──render()──▶ Rendered
//!     │                 ▲ │                  │
//!     └─ preprocessor ──┘ └── preprocessor   └── processor, output, collect
//! ```
//!
//! The stage only moves forward. Every operation that needs a later stage
//! advances to it first, so callers never have to sequence `read`/`render`
//! by hand: `output_to` on an unread renderer reads, renders and writes.
//!
//! Two variants share the source-set handling and module dispatch:
//!
//! - [`MediaRenderer`]: files are copied byte for byte, only [`Filter`]
//!   modules apply.
//! - [`DocumentRenderer`]: files are read as text, rendered through the
//!   template engine registered for their extension (or a custom render
//!   function), optionally wrapped in a layout, and emitted.
//!
//! ## Layouts
//!
//! A layout is a template file rendered with the current [`Context`] plus a
//! `content` binding. It wraps each document once when emitting one file per
//! source, and wraps the whole concatenation once when collecting.
//!
//! [`Filter`]: crate::module::Filter

use crate::error::BuildError;
use crate::module::{Module, ModuleRegistry};
use crate::sink;
use crate::source::{FilterSpec, SortDirection, SourceRecord, SourceSet};
use crate::template::{Context, TemplateEngine, TemplateError, TemplateRegistry};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::mpsc::Sender;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RenderStage {
    Unread,
    Read,
    Rendered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RendererKind {
    Media,
    Document,
}

impl RendererKind {
    pub fn name(self) -> &'static str {
        match self {
            RendererKind::Media => "media",
            RendererKind::Document => "document",
        }
    }
}

/// Progress and warnings reported while building.
#[derive(Debug, Clone, PartialEq)]
pub enum BuildEvent {
    BlockOpened {
        kind: RendererKind,
        dir: PathBuf,
        sources: usize,
    },
    Written {
        source: PathBuf,
        destination: PathBuf,
    },
    Copied {
        source: PathBuf,
        destination: PathBuf,
    },
    Collected {
        destination: PathBuf,
        documents: usize,
    },
    Warning {
        path: PathBuf,
        message: String,
    },
    FilterSkipped {
        message: String,
    },
}

/// External collaborators every renderer operation may call on.
pub struct Toolchain {
    pub modules: ModuleRegistry,
    pub templates: TemplateRegistry,
    events: Option<Sender<BuildEvent>>,
}

impl Toolchain {
    pub fn new(modules: ModuleRegistry, templates: TemplateRegistry) -> Self {
        Self {
            modules,
            templates,
            events: None,
        }
    }

    /// Built-in modules and the default extension map.
    pub fn with_defaults() -> Self {
        Self::new(
            ModuleRegistry::with_builtins(),
            TemplateRegistry::with_defaults(),
        )
    }

    pub fn with_events(mut self, events: Sender<BuildEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn emit(&self, event: BuildEvent) {
        if let Some(tx) = &self.events {
            // A closed receiver only means nobody is listening.
            let _ = tx.send(event);
        }
    }
}

/// Custom render step: replaces per-extension template rendering.
pub type RenderFn = Rc<dyn Fn(&mut [SourceRecord], &Context) -> Result<(), BuildError>>;

fn resolve_module(toolchain: &Toolchain, name: &str) -> Result<Module, BuildError> {
    toolchain
        .modules
        .resolve(name)
        .ok_or_else(|| BuildError::ModuleResolution(name.to_string()))
}

fn module_failed(name: &str) -> impl Fn(crate::error::ModuleError) -> BuildError + '_ {
    move |e| BuildError::Module {
        module: name.to_string(),
        message: e.to_string(),
    }
}

fn copy_sources(
    sources: &mut SourceSet,
    toolchain: &Toolchain,
    output_dir: &Path,
) -> Result<Vec<PathBuf>, BuildError> {
    sources.prepare();
    fs::create_dir_all(output_dir).map_err(|e| BuildError::io(output_dir, e))?;
    let mut copied = Vec::with_capacity(sources.len());
    for record in sources.records() {
        let destination = sink::copy_file(&record.path, output_dir)?;
        toolchain.emit(BuildEvent::Copied {
            source: record.path.clone(),
            destination: destination.clone(),
        });
        copied.push(destination);
    }
    Ok(copied)
}

/// Copy-only renderer for images and other binary assets.
#[derive(Debug, Clone)]
pub struct MediaRenderer {
    sources: SourceSet,
}

impl MediaRenderer {
    pub fn new(sources: SourceSet) -> Self {
        Self { sources }
    }

    pub fn open(dir: &Path) -> Result<Self, BuildError> {
        Ok(Self::new(SourceSet::discover(dir)?))
    }

    pub fn sources(&self) -> &SourceSet {
        &self.sources
    }

    pub fn copy_to(
        &mut self,
        toolchain: &Toolchain,
        output_dir: &Path,
    ) -> Result<Vec<PathBuf>, BuildError> {
        copy_sources(&mut self.sources, toolchain, output_dir)
    }

    pub fn apply(
        &mut self,
        toolchain: &Toolchain,
        name: &str,
        args: &[Value],
    ) -> Result<(), BuildError> {
        match resolve_module(toolchain, name)? {
            Module::Filter(filter) => {
                debug!(module = name, "applying filter to media");
                self.sources.retain(|record| filter.filter(record, args));
                Ok(())
            }
            Module::Preprocessor(_) | Module::Processor(_) => Err(BuildError::UnsupportedModule {
                module: name.to_string(),
                renderer: RendererKind::Media.name(),
            }),
        }
    }
}

/// A layout file loaded together with the engine that renders it.
struct LoadedLayout<'t> {
    path: PathBuf,
    source: String,
    engine: &'t dyn TemplateEngine,
}

impl LoadedLayout<'_> {
    fn wrap(&self, body: &str, context: &Context) -> Result<String, BuildError> {
        self.engine
            .render(&self.source, &context.with("content", body))
            .map_err(|source| BuildError::Template {
                path: self.path.clone(),
                source,
            })
    }
}

/// Full text pipeline: read, render, wrap, emit.
#[derive(Clone)]
pub struct DocumentRenderer {
    sources: SourceSet,
    stage: RenderStage,
    layout: Option<PathBuf>,
    context: Context,
    render_fn: Option<RenderFn>,
}

impl DocumentRenderer {
    pub fn new(sources: SourceSet) -> Self {
        Self {
            sources,
            stage: RenderStage::Unread,
            layout: None,
            context: Context::new(),
            render_fn: None,
        }
    }

    pub fn open(dir: &Path) -> Result<Self, BuildError> {
        Ok(Self::new(SourceSet::discover(dir)?))
    }

    pub fn sources(&self) -> &SourceSet {
        &self.sources
    }

    pub fn stage(&self) -> RenderStage {
        self.stage
    }

    pub fn set_layout(&mut self, layout: Option<PathBuf>) {
        self.layout = layout;
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn set_context(&mut self, context: Context) {
        self.context = context;
    }

    pub fn context_mut(&mut self) -> &mut Context {
        &mut self.context
    }

    pub fn set_render_fn(&mut self, render_fn: RenderFn) {
        self.render_fn = Some(render_fn);
    }

    fn advance(&mut self, stage: RenderStage) {
        debug!(from = ?self.stage, to = ?stage, dir = %self.sources.base_dir().display(), "stage transition");
        self.stage = stage;
    }

    /// Load every record's text. No-op once read.
    pub fn read(&mut self) -> Result<(), BuildError> {
        if self.stage >= RenderStage::Read {
            return Ok(());
        }
        for record in self.sources.records_mut() {
            let text =
                fs::read_to_string(&record.path).map_err(|e| BuildError::io(&record.path, e))?;
            record.content = Some(text);
        }
        self.advance(RenderStage::Read);
        Ok(())
    }

    /// Render every record. No-op once rendered.
    pub fn render(&mut self, toolchain: &Toolchain) -> Result<(), BuildError> {
        if self.stage == RenderStage::Rendered {
            return Ok(());
        }
        self.sources.prepare();
        self.read()?;

        let context = &self.context;
        if let Some(render_fn) = &self.render_fn {
            render_fn(self.sources.records_mut(), context)?;
        } else {
            for record in self.sources.records_mut() {
                let Some(engine) = toolchain.templates.resolve(&record.path) else {
                    let message = "no template engine for this extension, content left as is";
                    warn!(path = %record.path.display(), "{message}");
                    toolchain.emit(BuildEvent::Warning {
                        path: record.path.clone(),
                        message: message.to_string(),
                    });
                    continue;
                };
                let rendered = engine
                    .render(record.text(), context)
                    .map_err(|source| BuildError::Template {
                        path: record.path.clone(),
                        source,
                    })?;
                record.content = Some(rendered);
            }
        }
        self.advance(RenderStage::Rendered);
        Ok(())
    }

    fn load_layout<'t>(
        &self,
        toolchain: &'t Toolchain,
    ) -> Result<Option<LoadedLayout<'t>>, BuildError> {
        let Some(path) = &self.layout else {
            return Ok(None);
        };
        let engine = toolchain
            .templates
            .resolve(path)
            .ok_or_else(|| BuildError::Template {
                path: path.clone(),
                source: TemplateError::NoEngine(path.display().to_string()),
            })?;
        let source = fs::read_to_string(path).map_err(|e| BuildError::io(path, e))?;
        Ok(Some(LoadedLayout {
            path: path.clone(),
            source,
            engine,
        }))
    }

    /// Rendered documents paired with their source paths, layout applied.
    fn emitted(&mut self, toolchain: &Toolchain) -> Result<Vec<(PathBuf, String)>, BuildError> {
        self.render(toolchain)?;
        let layout = self.load_layout(toolchain)?;
        self.sources
            .records()
            .iter()
            .map(|record| -> Result<(PathBuf, String), BuildError> {
                let text = match &layout {
                    Some(layout) => layout.wrap(record.text(), &self.context)?,
                    None => record.text().to_string(),
                };
                Ok((record.path.clone(), text))
            })
            .collect()
    }

    /// One string per document, in source order.
    pub fn output(&mut self, toolchain: &Toolchain) -> Result<Vec<String>, BuildError> {
        Ok(self
            .emitted(toolchain)?
            .into_iter()
            .map(|(_, text)| text)
            .collect())
    }

    /// Write one `.html` file per document under `output_dir`.
    pub fn output_to(
        &mut self,
        toolchain: &Toolchain,
        output_dir: &Path,
    ) -> Result<Vec<PathBuf>, BuildError> {
        let documents = self.emitted(toolchain)?;
        let base_dir = self.sources.base_dir();
        let mut written = Vec::with_capacity(documents.len());
        for (source, text) in documents {
            let destination = sink::destination_path(base_dir, &source, output_dir);
            sink::write_file(&destination, &text)?;
            toolchain.emit(BuildEvent::Written {
                source,
                destination: destination.clone(),
            });
            written.push(destination);
        }
        Ok(written)
    }

    /// All documents concatenated, wrapped in the layout once.
    pub fn collect(&mut self, toolchain: &Toolchain) -> Result<String, BuildError> {
        self.render(toolchain)?;
        let body: String = self.sources.records().iter().map(SourceRecord::text).collect();
        match self.load_layout(toolchain)? {
            Some(layout) => layout.wrap(&body, &self.context),
            None => Ok(body),
        }
    }

    pub fn collect_into(&mut self, toolchain: &Toolchain, path: &Path) -> Result<(), BuildError> {
        let text = self.collect(toolchain)?;
        sink::write_file(path, &text)?;
        toolchain.emit(BuildEvent::Collected {
            destination: path.to_path_buf(),
            documents: self.sources.len(),
        });
        Ok(())
    }

    pub fn copy_to(
        &mut self,
        toolchain: &Toolchain,
        output_dir: &Path,
    ) -> Result<Vec<PathBuf>, BuildError> {
        copy_sources(&mut self.sources, toolchain, output_dir)
    }

    pub fn apply(
        &mut self,
        toolchain: &Toolchain,
        name: &str,
        args: &[Value],
    ) -> Result<(), BuildError> {
        let module = resolve_module(toolchain, name)?;
        debug!(module = name, kind = module.kind(), stage = ?self.stage, "applying module");
        match module {
            Module::Preprocessor(preprocessor) => {
                if self.stage == RenderStage::Rendered {
                    return Err(BuildError::State(format!(
                        "cannot preprocess with '{name}' after rendering"
                    )));
                }
                self.read()?;
                for record in self.sources.records_mut() {
                    preprocessor
                        .preprocess(record, args)
                        .map_err(module_failed(name))?;
                }
            }
            Module::Processor(processor) => {
                self.render(toolchain)?;
                for record in self.sources.records_mut() {
                    processor.process(record, args).map_err(module_failed(name))?;
                }
            }
            Module::Filter(filter) => {
                self.sources.retain(|record| filter.filter(record, args));
            }
        }
        Ok(())
    }
}

/// The renderer a session currently acts on.
#[derive(Clone)]
pub enum Renderer {
    Media(MediaRenderer),
    Document(DocumentRenderer),
}

impl Renderer {
    pub fn open(kind: RendererKind, dir: &Path) -> Result<Self, BuildError> {
        Ok(match kind {
            RendererKind::Media => Renderer::Media(MediaRenderer::open(dir)?),
            RendererKind::Document => Renderer::Document(DocumentRenderer::open(dir)?),
        })
    }

    pub fn kind(&self) -> RendererKind {
        match self {
            Renderer::Media(_) => RendererKind::Media,
            Renderer::Document(_) => RendererKind::Document,
        }
    }

    pub fn sources(&self) -> &SourceSet {
        match self {
            Renderer::Media(r) => r.sources(),
            Renderer::Document(r) => r.sources(),
        }
    }

    fn sources_mut(&mut self) -> &mut SourceSet {
        match self {
            Renderer::Media(r) => &mut r.sources,
            Renderer::Document(r) => &mut r.sources,
        }
    }

    pub fn sort(&mut self, tags: &[SortDirection]) {
        self.sources_mut().sort(tags);
    }

    pub fn filter(&mut self, spec: &FilterSpec) -> Result<(), BuildError> {
        self.sources_mut().filter(spec)
    }

    pub fn apply(
        &mut self,
        toolchain: &Toolchain,
        name: &str,
        args: &[Value],
    ) -> Result<(), BuildError> {
        match self {
            Renderer::Media(r) => r.apply(toolchain, name, args),
            Renderer::Document(r) => r.apply(toolchain, name, args),
        }
    }

    pub fn copy_to(
        &mut self,
        toolchain: &Toolchain,
        output_dir: &Path,
    ) -> Result<Vec<PathBuf>, BuildError> {
        match self {
            Renderer::Media(r) => r.copy_to(toolchain, output_dir),
            Renderer::Document(r) => r.copy_to(toolchain, output_dir),
        }
    }

    /// The document renderer, or an error naming the unsupported operation.
    pub fn as_document_mut(
        &mut self,
        operation: &'static str,
    ) -> Result<&mut DocumentRenderer, BuildError> {
        match self {
            Renderer::Document(r) => Ok(r),
            Renderer::Media(_) => Err(BuildError::Unsupported {
                operation,
                renderer: RendererKind::Media.name(),
            }),
        }
    }
}

/// Independent copy of a renderer's full state, consumed by [`restore`].
///
/// [`restore`]: RendererSnapshot::restore
pub struct RendererSnapshot(Renderer);

impl RendererSnapshot {
    pub fn take(renderer: &Renderer) -> Self {
        Self(renderer.clone())
    }

    pub fn restore(self) -> Renderer {
        self.0
    }
}
