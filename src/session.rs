//! Build sessions: the "current renderer" that builder calls act on.
//!
//! A [`Session`] replaces an implicit global with an explicit value threaded
//! through closures. Opening a block makes a fresh renderer current for the
//! duration of the block body; every builder call inside the body (sort,
//! filter, apply, layout, ...) acts on it.
//!
//! ```rust,ignore
//! let toolchain = Toolchain::with_defaults();
//! let mut session = Session::new(&toolchain);
//! session.documents("posts", |s| {
//!     s.sort(&[SortDirection::Descending])?;
//!     s.layout("layouts/post.html")?;
//!     s.output_to("dist/posts", |s| s.bind("section", "posts"))?;
//!     s.collect_into("dist/feed.html", |s| {
//!         s.apply("strip_front_matter", &[])?;
//!         s.layout("layouts/feed.html")
//!     })
//! })?;
//! ```
//!
//! ## Scoped Outputs
//!
//! `output_to`, `collect_into`, `collect` and `output` run their body against
//! an independent copy of the current renderer: the body may filter, bind
//! context, apply modules or change the layout, the output is produced from
//! that mutated state, and afterwards the copy taken before the body is put
//! back. Sibling outputs in the same block therefore never see each other's
//! changes.
//!
//! ## Block States
//!
//! ```text
//! Idle ──documents()/media()──▶ InRenderBlock ──output_to()...──▶ ScopedOutput
//!  ▲                                 │    ▲                             │
//!  └──────────── block exit ─────────┘    └───────── restore ───────────┘
//! ```
//!
//! Builder calls made while idle fail with [`BuildError::NoRenderBlock`].
//! Render blocks do not nest. Opening a block inside another rebinds
//! "current" to the new renderer, and when the inner block exits the session
//! is idle: the outer renderer is gone, and further calls in the outer body
//! fail with [`BuildError::NoRenderBlock`].

use crate::error::BuildError;
use crate::renderer::{
    BuildEvent, DocumentRenderer, RenderFn, Renderer, RendererKind, RendererSnapshot, Toolchain,
};
use crate::source::{FilterSpec, SortDirection, SourceRecord};
use crate::template::Context;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tracing::{debug, warn};

pub struct Session<'t> {
    toolchain: &'t Toolchain,
    current: Option<Renderer>,
    globals: Context,
}

impl<'t> Session<'t> {
    pub fn new(toolchain: &'t Toolchain) -> Self {
        Self {
            toolchain,
            current: None,
            globals: Context::new(),
        }
    }

    /// Variables every new document renderer starts with.
    pub fn with_globals(mut self, globals: Context) -> Self {
        self.globals = globals;
        self
    }

    pub fn toolchain(&self) -> &'t Toolchain {
        self.toolchain
    }

    pub fn current(&self) -> Option<&Renderer> {
        self.current.as_ref()
    }

    pub fn is_idle(&self) -> bool {
        self.current.is_none()
    }

    fn current_mut(&mut self, operation: &'static str) -> Result<&mut Renderer, BuildError> {
        self.current
            .as_mut()
            .ok_or(BuildError::NoRenderBlock(operation))
    }

    fn document_mut(
        &mut self,
        operation: &'static str,
    ) -> Result<&mut DocumentRenderer, BuildError> {
        self.current_mut(operation)?.as_document_mut(operation)
    }

    fn open_renderer(&self, kind: RendererKind, dir: &Path) -> Result<Renderer, BuildError> {
        let mut renderer = Renderer::open(kind, dir)?;
        if let Renderer::Document(doc) = &mut renderer {
            doc.set_context(self.globals.clone());
        }
        self.toolchain.emit(BuildEvent::BlockOpened {
            kind,
            dir: dir.to_path_buf(),
            sources: renderer.sources().len(),
        });
        Ok(renderer)
    }

    /// Run `body` with a fresh renderer for `dir` as current.
    pub fn block(
        &mut self,
        kind: RendererKind,
        dir: impl AsRef<Path>,
        body: impl FnOnce(&mut Self) -> Result<(), BuildError>,
    ) -> Result<(), BuildError> {
        let renderer = self.open_renderer(kind, dir.as_ref())?;
        if self.current.replace(renderer).is_some() {
            debug!(dir = %dir.as_ref().display(), "render block opened inside another, rebinding");
        }
        let result = body(self);
        self.current = None;
        result
    }

    pub fn media(
        &mut self,
        dir: impl AsRef<Path>,
        body: impl FnOnce(&mut Self) -> Result<(), BuildError>,
    ) -> Result<(), BuildError> {
        self.block(RendererKind::Media, dir, body)
    }

    pub fn documents(
        &mut self,
        dir: impl AsRef<Path>,
        body: impl FnOnce(&mut Self) -> Result<(), BuildError>,
    ) -> Result<(), BuildError> {
        self.block(RendererKind::Document, dir, body)
    }

    pub fn sort(&mut self, tags: &[SortDirection]) -> Result<(), BuildError> {
        self.current_mut("sort")?.sort(tags);
        Ok(())
    }

    /// Filter the current set. A malformed spec is reported and skipped.
    pub fn filter(&mut self, spec: &FilterSpec) -> Result<(), BuildError> {
        match self.current_mut("filter")?.filter(spec) {
            Err(BuildError::Config(message)) => {
                warn!("{message}, filter skipped");
                self.toolchain.emit(BuildEvent::FilterSkipped { message });
                Ok(())
            }
            other => other,
        }
    }

    pub fn apply(&mut self, module: &str, args: &[Value]) -> Result<(), BuildError> {
        let toolchain = self.toolchain;
        self.current_mut("apply")?.apply(toolchain, module, args)
    }

    pub fn copy_to(&mut self, output_dir: impl AsRef<Path>) -> Result<Vec<PathBuf>, BuildError> {
        let toolchain = self.toolchain;
        self.current_mut("copy_to")?
            .copy_to(toolchain, output_dir.as_ref())
    }

    pub fn layout(&mut self, path: impl Into<PathBuf>) -> Result<(), BuildError> {
        self.document_mut("layout")?.set_layout(Some(path.into()));
        Ok(())
    }

    pub fn clear_layout(&mut self) -> Result<(), BuildError> {
        self.document_mut("layout")?.set_layout(None);
        Ok(())
    }

    /// Render with `render_fn` instead of the per-extension engines.
    pub fn render_with(
        &mut self,
        render_fn: impl Fn(&mut [SourceRecord], &Context) -> Result<(), BuildError> + 'static,
    ) -> Result<(), BuildError> {
        let render_fn: RenderFn = Rc::new(render_fn);
        self.document_mut("render")?.set_render_fn(render_fn);
        Ok(())
    }

    /// Assign the render context: the session globals overlaid with
    /// `context`. Bindings from an earlier assignment are dropped.
    pub fn context(&mut self, context: &Context) -> Result<(), BuildError> {
        let mut assigned = self.globals.clone();
        assigned.extend(context);
        self.document_mut("context")?.set_context(assigned);
        Ok(())
    }

    pub fn bind(&mut self, key: &str, value: impl Into<Value>) -> Result<(), BuildError> {
        self.document_mut("bind")?.context_mut().insert(key, value);
        Ok(())
    }

    /// Snapshot, run `body`, produce the effect, restore.
    fn scoped<T>(
        &mut self,
        operation: &'static str,
        body: impl FnOnce(&mut Self) -> Result<(), BuildError>,
        effect: impl FnOnce(&mut DocumentRenderer, &Toolchain) -> Result<T, BuildError>,
    ) -> Result<T, BuildError> {
        self.document_mut(operation)?;
        let snapshot = RendererSnapshot::take(self.current_mut(operation)?);
        debug!(operation, "snapshot taken");

        let toolchain = self.toolchain;
        let result = body(self).and_then(|()| effect(self.document_mut(operation)?, toolchain));

        self.current = Some(snapshot.restore());
        debug!(operation, "snapshot restored");
        result
    }

    /// Write one `.html` file per document under `output_dir`.
    pub fn output_to(
        &mut self,
        output_dir: impl AsRef<Path>,
        body: impl FnOnce(&mut Self) -> Result<(), BuildError>,
    ) -> Result<Vec<PathBuf>, BuildError> {
        let output_dir = output_dir.as_ref();
        self.scoped("output_to", body, |doc, toolchain| {
            doc.output_to(toolchain, output_dir)
        })
    }

    /// Write all documents, concatenated, to a single file.
    pub fn collect_into(
        &mut self,
        path: impl AsRef<Path>,
        body: impl FnOnce(&mut Self) -> Result<(), BuildError>,
    ) -> Result<(), BuildError> {
        let path = path.as_ref();
        self.scoped("collect_into", body, |doc, toolchain| {
            doc.collect_into(toolchain, path)
        })
    }

    pub fn collect(
        &mut self,
        body: impl FnOnce(&mut Self) -> Result<(), BuildError>,
    ) -> Result<String, BuildError> {
        self.scoped("collect", body, |doc, toolchain| doc.collect(toolchain))
    }

    pub fn output(
        &mut self,
        body: impl FnOnce(&mut Self) -> Result<(), BuildError>,
    ) -> Result<Vec<String>, BuildError> {
        self.scoped("output", body, |doc, toolchain| doc.output(toolchain))
    }

    /// Open a throwaway document renderer for `dir` and run `effect` on it.
    fn inline<T>(
        &mut self,
        operation: &'static str,
        dir: &Path,
        body: impl FnOnce(&mut Self) -> Result<(), BuildError>,
        effect: impl FnOnce(&mut DocumentRenderer, &Toolchain) -> Result<T, BuildError>,
    ) -> Result<T, BuildError> {
        let renderer = self.open_renderer(RendererKind::Document, dir)?;
        let previous = self.current.replace(renderer);

        let toolchain = self.toolchain;
        let result = body(self).and_then(|()| effect(self.document_mut(operation)?, toolchain));

        self.current = previous;
        result
    }

    /// Collect the documents of another directory without leaving the
    /// current block.
    pub fn collect_in(
        &mut self,
        dir: impl AsRef<Path>,
        body: impl FnOnce(&mut Self) -> Result<(), BuildError>,
    ) -> Result<String, BuildError> {
        self.inline("collect_in", dir.as_ref(), body, |doc, toolchain| {
            doc.collect(toolchain)
        })
    }

    pub fn output_in(
        &mut self,
        dir: impl AsRef<Path>,
        body: impl FnOnce(&mut Self) -> Result<(), BuildError>,
    ) -> Result<Vec<String>, BuildError> {
        self.inline("output_in", dir.as_ref(), body, |doc, toolchain| {
            doc.output(toolchain)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::RenderStage;
    use crate::source::Criterion;
    use crate::test_helpers::*;
    use std::sync::mpsc;

    fn noop(_: &mut Session) -> Result<(), BuildError> {
        Ok(())
    }

    #[test]
    fn calls_outside_a_block_fail() {
        let toolchain = Toolchain::with_defaults();
        let mut session = Session::new(&toolchain);
        assert!(matches!(
            session.sort(&[SortDirection::Descending]),
            Err(BuildError::NoRenderBlock("sort"))
        ));
        assert!(matches!(
            session.collect(noop),
            Err(BuildError::NoRenderBlock("collect"))
        ));
    }

    #[test]
    fn block_exit_returns_to_idle() {
        let tmp = write_tree(&[("docs/a.txt", "A")]);
        let toolchain = Toolchain::with_defaults();
        let mut session = Session::new(&toolchain);
        session
            .documents(tmp.path().join("docs"), |s| {
                assert!(!s.is_idle());
                assert_eq!(s.current().map(Renderer::kind), Some(RendererKind::Document));
                Ok(())
            })
            .unwrap();
        assert!(session.is_idle());
    }

    #[test]
    fn block_error_still_returns_to_idle() {
        let tmp = write_tree(&[("docs/a.txt", "A")]);
        let toolchain = Toolchain::with_defaults();
        let mut session = Session::new(&toolchain);
        let err = session
            .documents(tmp.path().join("docs"), |s| s.apply("missing", &[]))
            .unwrap_err();
        assert!(matches!(err, BuildError::ModuleResolution(_)));
        assert!(session.is_idle());
    }

    #[test]
    fn nested_block_rebinds_and_leaves_session_idle() {
        let tmp = write_tree(&[("docs/a.txt", "A"), ("img/x.png", "X"), ("img/y.png", "Y")]);
        let toolchain = Toolchain::with_defaults();
        let mut session = Session::new(&toolchain);
        let img = tmp.path().join("img");
        let mut after_inner = None;
        let err = session
            .documents(tmp.path().join("docs"), |s| {
                s.media(&img, |s| {
                    assert_eq!(s.current().map(Renderer::kind), Some(RendererKind::Media));
                    assert_eq!(s.current().map(|r| r.sources().len()), Some(2));
                    Ok(())
                })?;
                after_inner = Some(s.is_idle());
                s.sort(&[SortDirection::Descending])
            })
            .unwrap_err();
        assert_eq!(after_inner, Some(true));
        assert!(matches!(err, BuildError::NoRenderBlock("sort")));
        assert!(session.is_idle());
    }

    #[test]
    fn inline_collect_keeps_the_enclosing_block() {
        let tmp = write_tree(&[("docs/a.txt", "A"), ("other/b.txt", "B")]);
        let toolchain = Toolchain::with_defaults();
        let mut session = Session::new(&toolchain);
        let other = tmp.path().join("other");
        let mut inlined = String::new();
        let mut own = String::new();
        session
            .documents(tmp.path().join("docs"), |s| {
                inlined = s.collect_in(&other, noop)?;
                own = s.collect(noop)?;
                Ok(())
            })
            .unwrap();
        assert_eq!(inlined, "B");
        assert_eq!(own, "A");
    }

    #[test]
    fn sibling_outputs_do_not_see_each_others_filters() {
        let tmp = write_tree(&[("docs/a.txt", "A"), ("docs/b.txt", "B")]);
        let toolchain = Toolchain::with_defaults();
        let mut session = Session::new(&toolchain);
        let mut first = String::new();
        let mut second = String::new();
        session
            .documents(tmp.path().join("docs"), |s| {
                first = s.collect(|s| {
                    s.filter(&FilterSpec::only(vec![Criterion::literal("a.txt")]))
                })?;
                second = s.collect(noop)?;
                Ok(())
            })
            .unwrap();
        assert_eq!(first, "A");
        assert_eq!(second, "AB");
    }

    #[test]
    fn scoped_output_restores_unrendered_state() {
        let tmp = write_tree(&[("docs/a.txt", "A")]);
        let toolchain = Toolchain::with_defaults();
        let mut session = Session::new(&toolchain);
        session
            .documents(tmp.path().join("docs"), |s| {
                s.output(noop)?;
                let Some(Renderer::Document(doc)) = s.current() else {
                    panic!("expected a document renderer");
                };
                assert_eq!(doc.stage(), RenderStage::Unread);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn context_bound_in_scope_does_not_leak() {
        let tmp = write_tree(&[("docs/a.html", "{{ title | default(value='none') }}")]);
        let toolchain = Toolchain::with_defaults();
        let mut session = Session::new(&toolchain);
        let mut outputs = Vec::new();
        session
            .documents(tmp.path().join("docs"), |s| {
                outputs.push(s.collect(|s| s.bind("title", "first"))?);
                outputs.push(s.collect(noop)?);
                Ok(())
            })
            .unwrap();
        assert_eq!(outputs, vec!["first", "none"]);
    }

    #[test]
    fn globals_seed_document_context() {
        let tmp = write_tree(&[("docs/a.html", "{{ site }}/{{ page }}")]);
        let toolchain = Toolchain::with_defaults();
        let mut session = Session::new(&toolchain).with_globals(Context::new().with("site", "S"));
        let mut out = String::new();
        session
            .documents(tmp.path().join("docs"), |s| {
                s.context(&Context::new().with("page", "P"))?;
                out = s.collect(noop)?;
                Ok(())
            })
            .unwrap();
        assert_eq!(out, "S/P");
    }

    #[test]
    fn context_assignment_replaces_previous_bindings() {
        let tmp = write_tree(&[(
            "docs/a.html",
            "{{ site }}:{{ a | default(value='unset') }}:{{ b }}",
        )]);
        let toolchain = Toolchain::with_defaults();
        let mut session = Session::new(&toolchain).with_globals(Context::new().with("site", "S"));
        let mut out = String::new();
        session
            .documents(tmp.path().join("docs"), |s| {
                s.context(&Context::new().with("a", "first"))?;
                s.context(&Context::new().with("b", "second"))?;
                out = s.collect(noop)?;
                Ok(())
            })
            .unwrap();
        assert_eq!(out, "S:unset:second");
    }

    #[test]
    fn output_to_and_collect_into_write_files() {
        let tmp = write_tree(&[
            ("docs/a.md", "A"),
            ("docs/b.md", "B"),
            ("layout.html", "<wrap>{{content}}</wrap>"),
        ]);
        let toolchain = Toolchain::with_defaults();
        let mut session = Session::new(&toolchain);
        let out = tmp.path().join("out");
        let layout = tmp.path().join("layout.html");
        session
            .documents(tmp.path().join("docs"), |s| {
                s.layout(&layout)?;
                s.output_to(&out, noop)?;
                s.collect_into(out.join("all.html"), |s| s.clear_layout())
            })
            .unwrap();
        assert_eq!(read(&out.join("a.html")), "<wrap><p>A</p>\n</wrap>");
        assert_eq!(read(&out.join("all.html")), "<p>A</p>\n<p>B</p>\n");
    }

    #[test]
    fn malformed_filter_is_reported_and_skipped() {
        let tmp = write_tree(&[("docs/a.txt", "A")]);
        let (tx, rx) = mpsc::channel();
        let toolchain = Toolchain::with_defaults().with_events(tx);
        let mut session = Session::new(&toolchain);
        session
            .documents(tmp.path().join("docs"), |s| {
                s.filter(&FilterSpec::default())?;
                assert_eq!(s.current().map(|r| r.sources().len()), Some(1));
                Ok(())
            })
            .unwrap();
        assert!(
            rx.try_iter()
                .any(|e| matches!(e, BuildEvent::FilterSkipped { .. }))
        );
    }

    #[test]
    fn media_block_rejects_document_operations() {
        let tmp = write_tree(&[("img/a.png", "")]);
        let toolchain = Toolchain::with_defaults();
        let mut session = Session::new(&toolchain);
        let err = session
            .media(tmp.path().join("img"), |s| s.layout("layout.html"))
            .unwrap_err();
        assert!(matches!(err, BuildError::Unsupported { operation: "layout", .. }));
    }

    #[test]
    fn media_block_copies() {
        let tmp = write_tree(&[("img/a.png", "PNG"), ("img/_b.png", "B")]);
        let toolchain = Toolchain::with_defaults();
        let mut session = Session::new(&toolchain);
        let out = tmp.path().join("dist/img");
        session
            .media(tmp.path().join("img"), |s| {
                s.apply("skip_underscored", &[])?;
                s.copy_to(&out)?;
                Ok(())
            })
            .unwrap();
        assert_eq!(read(&out.join("a.png")), "PNG");
        assert!(!out.join("_b.png").exists());
    }

    #[test]
    fn collect_in_leaves_current_untouched() {
        let tmp = write_tree(&[("docs/a.txt", "A"), ("side/x.txt", "X"), ("side/y.txt", "Y")]);
        let toolchain = Toolchain::with_defaults();
        let mut session = Session::new(&toolchain);
        let side = tmp.path().join("side");
        let mut inline = String::new();
        session
            .documents(tmp.path().join("docs"), |s| {
                inline = s.collect_in(&side, |s| s.sort(&[SortDirection::Descending]))?;
                assert_eq!(s.current().map(|r| r.sources().len()), Some(1));
                Ok(())
            })
            .unwrap();
        assert_eq!(inline, "YX");
    }

    #[test]
    fn output_in_works_while_idle() {
        let tmp = write_tree(&[("side/x.txt", "X")]);
        let toolchain = Toolchain::with_defaults();
        let mut session = Session::new(&toolchain);
        let out = session.output_in(tmp.path().join("side"), noop).unwrap();
        assert_eq!(out, vec!["X"]);
        assert!(session.is_idle());
    }

    #[test]
    fn render_with_receives_context() {
        let tmp = write_tree(&[("docs/a.txt", "a")]);
        let toolchain = Toolchain::with_defaults();
        let mut session = Session::new(&toolchain);
        let mut out = String::new();
        session
            .documents(tmp.path().join("docs"), |s| {
                s.bind("suffix", "!")?;
                s.render_with(|records, ctx| {
                    let suffix = ctx.get("suffix").and_then(Value::as_str).unwrap_or("");
                    for record in records {
                        record.content = Some(format!("{}{suffix}", record.text()));
                    }
                    Ok(())
                })?;
                out = s.collect(noop)?;
                Ok(())
            })
            .unwrap();
        assert_eq!(out, "a!");
    }
}
