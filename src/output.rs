//! CLI output formatting.
//!
//! The build core reports progress as [`BuildEvent`]s; this module turns them
//! into display lines. Paths are shown relative to the project root when they
//! live under it.
//!
//! ```text
//! documents posts/ (4 sources)
//!     posts/001-hello.md → dist/posts/001-hello.html
//!     posts/002-again.md → dist/posts/002-again.html
//!     collected 4 documents → dist/feed.html
//! media images/ (2 sources)
//!     images/a.png → dist/images/a.png
//!     warning: posts/notes.xyz: no template engine for this extension
//! ```
//!
//! `format_*` functions are pure and return strings; `print_*` wrappers write
//! to stdout.

use crate::project::Project;
use crate::renderer::BuildEvent;
use std::path::Path;

fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// Display `path` relative to `root` when possible.
fn relative(path: &Path, root: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .display()
        .to_string()
}

pub fn format_event(event: &BuildEvent, root: &Path) -> String {
    match event {
        BuildEvent::BlockOpened { kind, dir, sources } => {
            let noun = if *sources == 1 { "source" } else { "sources" };
            format!(
                "{} {}/ ({} {})",
                kind.name(),
                relative(dir, root),
                sources,
                noun
            )
        }
        BuildEvent::Written {
            source,
            destination,
        }
        | BuildEvent::Copied {
            source,
            destination,
        } => format!(
            "{}{} → {}",
            indent(1),
            relative(source, root),
            relative(destination, root)
        ),
        BuildEvent::Collected {
            destination,
            documents,
        } => format!(
            "{}collected {} documents → {}",
            indent(1),
            documents,
            relative(destination, root)
        ),
        BuildEvent::Warning { path, message } => {
            format!("{}warning: {}: {}", indent(1), relative(path, root), message)
        }
        BuildEvent::FilterSkipped { message } => {
            format!("{}warning: {}, filter skipped", indent(1), message)
        }
    }
}

/// Summary printed by `check`: one header per block, one line per step.
pub fn format_project_summary(project: &Project) -> Vec<String> {
    let mut lines = Vec::new();
    for (i, block) in project.blocks.iter().enumerate() {
        lines.push(format!(
            "{:0>3} {} {}/",
            i + 1,
            block.kind.name(),
            block.dir.display()
        ));
        for step in &block.steps {
            push_step_lines(step, 1, &mut lines);
        }
    }
    if lines.is_empty() {
        lines.push("(no blocks)".to_string());
    }
    lines
}

fn push_step_lines(step: &crate::project::Step, depth: usize, lines: &mut Vec<String>) {
    lines.push(format!("{}{}", indent(depth), step.describe()));
    for nested in step.nested() {
        push_step_lines(nested, depth + 1, lines);
    }
}

pub fn print_project_summary(project: &Project) {
    for line in format_project_summary(project) {
        println!("{}", line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::RendererKind;
    use std::path::PathBuf;

    #[test]
    fn block_opened_line() {
        let event = BuildEvent::BlockOpened {
            kind: RendererKind::Document,
            dir: PathBuf::from("/site/posts"),
            sources: 3,
        };
        assert_eq!(
            format_event(&event, Path::new("/site")),
            "document posts/ (3 sources)"
        );
    }

    #[test]
    fn single_source_is_singular() {
        let event = BuildEvent::BlockOpened {
            kind: RendererKind::Media,
            dir: PathBuf::from("/site/img"),
            sources: 1,
        };
        assert_eq!(format_event(&event, Path::new("/site")), "media img/ (1 source)");
    }

    #[test]
    fn written_line_is_relative() {
        let event = BuildEvent::Written {
            source: PathBuf::from("/site/posts/a.md"),
            destination: PathBuf::from("/site/dist/a.html"),
        };
        assert_eq!(
            format_event(&event, Path::new("/site")),
            "    posts/a.md → dist/a.html"
        );
    }

    #[test]
    fn path_outside_root_is_shown_whole() {
        let event = BuildEvent::Copied {
            source: PathBuf::from("/elsewhere/a.png"),
            destination: PathBuf::from("/site/dist/a.png"),
        };
        assert_eq!(
            format_event(&event, Path::new("/site")),
            "    /elsewhere/a.png → dist/a.png"
        );
    }

    #[test]
    fn collected_and_warning_lines() {
        let root = Path::new("/site");
        let collected = BuildEvent::Collected {
            destination: PathBuf::from("/site/dist/all.html"),
            documents: 2,
        };
        assert_eq!(
            format_event(&collected, root),
            "    collected 2 documents → dist/all.html"
        );
        let warning = BuildEvent::Warning {
            path: PathBuf::from("/site/posts/x.xyz"),
            message: "no engine".into(),
        };
        assert_eq!(
            format_event(&warning, root),
            "    warning: posts/x.xyz: no engine"
        );
    }

    #[test]
    fn project_summary_lists_nested_steps() {
        let project: Project = toml::from_str(
            r#"
            [[block]]
            kind = "documents"
            dir = "posts"
            steps = [
                { sort = ["descending"] },
                { output_to = { dir = "dist", steps = [{ layout = "l.html" }] } },
            ]
            "#,
        )
        .unwrap();
        assert_eq!(
            format_project_summary(&project),
            vec![
                "001 documents posts/",
                "    sort descending",
                "    output_to dist",
                "        layout l.html",
            ]
        );
    }

    #[test]
    fn empty_project_summary() {
        assert_eq!(
            format_project_summary(&Project::default()),
            vec!["(no blocks)"]
        );
    }
}
