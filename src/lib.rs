//! # sitepress
//!
//! A document and media build pipeline driven by a declarative project file.
//! The project lists directories; each one is opened as a render block and a
//! sequence of steps (sort, filter, module application, template rendering,
//! layout wrapping) is applied before the results are written out.
//!
//! # Architecture: Renderer Sessions
//!
//! ```text
//! press.toml ─▶ Project ─▶ Session ─▶ current Renderer ─▶ dist/
//!                              │            │
//!                              │            ├── SourceSet      (records in order)
//!                              │            ├── ModuleRegistry (filters, pre/processors)
//!                              │            └── TemplateRegistry (engine per extension)
//!                              └── snapshot / restore around scoped outputs
//! ```
//!
//! A [`session::Session`] holds the renderer every builder call acts on.
//! Scoped outputs (`output_to`, `collect_into`, ...) snapshot that renderer,
//! let their nested steps mutate it, emit, and restore the snapshot, so one
//! output target's filters or bindings never reach its siblings.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`source`] | Source sets: discovery, sort options, `only`/`exclude` filtering |
//! | [`module`] | Filter / Preprocessor / Processor contracts and the name registry |
//! | [`template`] | Template engines selected by extension, and the render [`template::Context`] |
//! | [`renderer`] | The unread → read → rendered state machine, media and document variants |
//! | [`session`] | The current-renderer stack and scoped outputs |
//! | [`sink`] | Destination path mapping and file writes |
//! | [`project`] | `press.toml` loading, validation and execution |
//! | [`output`] | CLI output formatting of build events |
//! | [`error`] | The build error taxonomy |
//!
//! # Design Decisions
//!
//! ## Explicit Registries
//!
//! Modules and template engines are looked up in registries built at startup.
//! A missing module is a typed [`error::BuildError::ModuleResolution`], and a
//! module's capability is an enum tag, so dispatch is a `match` rather than a
//! runtime type probe.
//!
//! ## All-or-Nothing Builds
//!
//! Every error propagates to the top and stops the build. Writes already made
//! stay on disk; nothing is retried. The single exception is a filter with
//! neither `only` nor `exclude`, which is reported and skipped.
//!
//! ## Deterministic Order
//!
//! Sources are discovered in file-name order, and every per-record operation
//! runs in the set's current order, so two builds of the same tree produce
//! the same output in the same sequence.

pub mod error;
pub mod module;
pub mod output;
pub mod project;
pub mod renderer;
pub mod session;
pub mod sink;
pub mod source;
pub mod template;

#[cfg(test)]
pub(crate) mod test_helpers;
