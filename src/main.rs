use clap::{Parser, Subcommand};
use sitepress::{output, project};
use std::error::Error;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sitepress")]
#[command(about = "Declarative document and media build pipeline")]
#[command(long_about = "\
Declarative document and media build pipeline

A project file (press.toml) lists render blocks. Each block opens a
directory as documents (read, rendered, wrapped in a layout, written as
.html) or media (copied byte for byte) and runs its steps in order:

  [[block]]
  kind = \"documents\"
  dir = \"posts\"
  steps = [
    { sort = [\"descending\"] },
    { layout = \"layouts/post.html\" },
    { output_to = { dir = \"dist/posts\" } },
  ]

Run 'sitepress gen-project' to print a documented press.toml.")]
#[command(version)]
struct Cli {
    /// Project file
    #[arg(long, default_value = project::PROJECT_FILENAME, global = true)]
    project: PathBuf,

    /// Log debug diagnostics (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build the project
    Build,
    /// Load and validate the project without building
    Check,
    /// Print a stock press.toml with all options documented
    GenProject,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    match cli.command {
        Command::Build => {
            if !cli.project.exists() {
                println!("No project file at {}", cli.project.display());
                return Ok(());
            }
            let project = project::load_project(&cli.project)?;
            let root = project_root(&cli.project);

            let (tx, rx) = std::sync::mpsc::channel();
            let toolchain = project.toolchain().with_events(tx);
            let printer_root = root.clone();
            let printer = std::thread::spawn(move || {
                for event in rx {
                    println!("{}", output::format_event(&event, &printer_root));
                }
            });

            println!("==> Building {}", cli.project.display());
            let result = project::run(&project, &root, &toolchain);
            drop(toolchain);
            let _ = printer.join();
            result?;
            println!("==> Build complete");
        }
        Command::Check => {
            if !cli.project.exists() {
                println!("No project file at {}", cli.project.display());
                return Ok(());
            }
            println!("==> Checking {}", cli.project.display());
            let project = project::load_project(&cli.project)?;
            output::print_project_summary(&project);
            let missing = project.missing_modules(&project.toolchain().modules);
            if !missing.is_empty() {
                return Err(format!("unregistered modules: {}", missing.join(", ")).into());
            }
            println!("==> Project is valid");
        }
        Command::GenProject => {
            print!("{}", project::stock_project_toml());
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Directory the project's relative paths are resolved against.
fn project_root(project_file: &Path) -> PathBuf {
    project_file
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}
