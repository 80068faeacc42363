//! Thin driver binary: feeds source paths to `bt-dsl-driver::compile` and
//! reports diagnostics to stderr, writing each emitted BT.CPP XML artifact
//! next to (or into) the requested output location.
//!
//! Grounded on `vex-cli/src/main.rs`'s `clap::Subcommand` shape (one
//! subcommand per driver entry point, `anyhow::Result` at the boundary,
//! `env_logger`/`log` for progress); the subcommands themselves follow
//! spec.md §6's "driver options control build vs. single-output mode and
//! register package search paths" rather than Vex's compile/run/format
//! set, which has no BT-DSL analogue (no runtime execution, no formatter
//! in this spec).

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};

use bt_dsl_driver::config::ProjectConfig;
use bt_dsl_driver::loader::FsLoader;
use bt_dsl_driver::{compile, CompileOptions, CompileResult, OutputMode};

#[derive(Parser)]
#[command(name = "bt-dsl")]
#[command(version)]
#[command(about = "BT-DSL compiler: lowers behavior-tree source to BT.CPP XML", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile one or more modules, emitting one XML document per module.
    Build {
        /// Entry `.bt` source files.
        #[arg(value_name = "INPUT", required = true)]
        inputs: Vec<PathBuf>,

        /// Directory to write `<module>.xml` files into (defaults to each
        /// input's own directory).
        #[arg(short, long, value_name = "DIR")]
        out_dir: Option<PathBuf>,

        /// Additional package search roots for `bt-dsl-pkg://` imports.
        #[arg(long = "package-path", value_name = "DIR")]
        package_paths: Vec<PathBuf>,
    },

    /// Compile a single entry tree into one self-contained XML document,
    /// mangling imported subtree ids across module boundaries.
    SingleOutput {
        /// Entry `.bt` source file.
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// Name of the tree to root the document at. Falls back to the
        /// first `entry_trees` entry in `bt-dsl.toml` if omitted.
        #[arg(long, value_name = "TREE")]
        entry_tree: Option<String>,

        /// Output XML path (defaults to `<entry-tree>.xml` next to the input).
        #[arg(short, long, value_name = "OUTPUT")]
        output: Option<PathBuf>,

        #[arg(long = "package-path", value_name = "DIR")]
        package_paths: Vec<PathBuf>,
    },

    /// Parse and run every analysis pass without emitting XML, reporting
    /// diagnostics only.
    Check {
        #[arg(value_name = "INPUT", required = true)]
        inputs: Vec<PathBuf>,

        #[arg(long = "package-path", value_name = "DIR")]
        package_paths: Vec<PathBuf>,
    },
}

/// Reads `bt-dsl.toml` from the directory containing `first_input` (cwd if
/// there is none), returning an empty config when the file is absent. This
/// is additive convenience only (spec.md §6 / SPEC_FULL.md AMBIENT-3): the
/// CLI's own flags always take precedence over whatever it supplies.
fn load_project_config(first_input: Option<&std::path::Path>) -> Result<ProjectConfig> {
    let dir = first_input
        .and_then(|p| p.parent())
        .filter(|p| !p.as_os_str().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    Ok(bt_dsl_driver::config::load(&dir)
        .map_err(|e| anyhow!("failed to load bt-dsl.toml in {}: {e}", dir.display()))?
        .unwrap_or_default())
}

/// Appends `bt-dsl.toml`'s `package_paths` (resolved relative to `dir`)
/// after whatever the CLI was given directly, so `--package-path` always
/// wins ties.
fn merge_package_paths(
    cli_paths: Vec<PathBuf>,
    project: &ProjectConfig,
    dir: &std::path::Path,
) -> Vec<PathBuf> {
    let mut paths = cli_paths;
    paths.extend(project.package_paths.iter().map(|p| dir.join(p)));
    paths
}

fn main() -> ExitCode {
    env_logger::init();
    match run() {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

/// Returns `Ok(false)` on a clean compile failure (diagnostics already
/// printed) so `main` can choose the process exit code without treating
/// "the input had errors" as an `anyhow::Error`.
fn run() -> Result<bool> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Build {
            inputs,
            out_dir,
            package_paths,
        } => {
            let project = load_project_config(inputs.first().map(PathBuf::as_path))?;
            let dir = inputs
                .first()
                .and_then(|p| p.parent())
                .unwrap_or_else(|| std::path::Path::new("."));
            let loader = FsLoader::new(merge_package_paths(package_paths, &project, dir));
            let options = CompileOptions {
                mode: OutputMode::PerModule,
                package_paths: Vec::new(),
                entry_trees: project.entry_trees.clone(),
            };
            let result = compile(&inputs, &loader, &options);
            let ok = report(&result);
            if ok {
                for artifact in &result.artifacts {
                    let path = artifact_path(&artifact.name, out_dir.as_deref())?;
                    std::fs::write(&path, &artifact.xml)
                        .map_err(|e| anyhow!("failed to write {}: {e}", path.display()))?;
                    log::info!("wrote {}", path.display());
                }
            }
            Ok(ok)
        }

        Commands::SingleOutput {
            input,
            entry_tree,
            output,
            package_paths,
        } => {
            let project = load_project_config(Some(&input))?;
            let dir = input.parent().unwrap_or_else(|| std::path::Path::new("."));
            let entry_tree = entry_tree
                .or_else(|| project.entry_trees.first().cloned())
                .ok_or_else(|| {
                    anyhow!("no --entry-tree given and bt-dsl.toml declares no entry_trees")
                })?;
            let loader = FsLoader::new(merge_package_paths(package_paths, &project, dir));
            let options = CompileOptions {
                mode: OutputMode::SingleOutput {
                    entry_tree: entry_tree.clone(),
                },
                package_paths: Vec::new(),
                entry_trees: project.entry_trees.clone(),
            };
            let result = compile(std::slice::from_ref(&input), &loader, &options);
            let ok = report(&result);
            if ok {
                let artifact = result
                    .artifacts
                    .first()
                    .ok_or_else(|| anyhow!("no artifact produced for tree '{entry_tree}'"))?;
                let path = output.unwrap_or_else(|| {
                    input.with_file_name(format!("{entry_tree}.xml"))
                });
                std::fs::write(&path, &artifact.xml)
                    .map_err(|e| anyhow!("failed to write {}: {e}", path.display()))?;
                log::info!("wrote {}", path.display());
            }
            Ok(ok)
        }

        Commands::Check {
            inputs,
            package_paths,
        } => {
            let project = load_project_config(inputs.first().map(PathBuf::as_path))?;
            let dir = inputs
                .first()
                .and_then(|p| p.parent())
                .unwrap_or_else(|| std::path::Path::new("."));
            let loader = FsLoader::new(merge_package_paths(package_paths, &project, dir));
            let options = CompileOptions {
                mode: OutputMode::PerModule,
                package_paths: Vec::new(),
                entry_trees: project.entry_trees.clone(),
            };
            let result = compile(&inputs, &loader, &options);
            Ok(report(&result))
        }
    }
}

/// Prints every module's diagnostics to stderr in source order and
/// returns whether the compilation may proceed to emit XML.
fn report(result: &CompileResult) -> bool {
    for (file_id, bag) in &result.diagnostics {
        for d in bag.diagnostics() {
            let severity = match d.severity {
                bt_dsl_diagnostics::Severity::Error => "error",
                bt_dsl_diagnostics::Severity::Warning => "warning",
            };
            eprintln!(
                "{file_id}:{}-{}: {severity}[{}]: {}",
                d.range.start, d.range.end, d.code, d.message
            );
            for label in &d.secondary {
                eprintln!("  note: {}:{}-{}: {}", file_id, label.range.start, label.range.end, label.message);
            }
        }
    }
    !result.has_errors()
}

fn artifact_path(name: &str, out_dir: Option<&std::path::Path>) -> Result<PathBuf> {
    let stem = PathBuf::from(name);
    let file_name = stem
        .file_stem()
        .ok_or_else(|| anyhow!("module id '{name}' has no file stem"))?;
    let mut path = match out_dir {
        Some(dir) => dir.to_path_buf(),
        None => stem.parent().map(PathBuf::from).unwrap_or_default(),
    };
    if let Some(dir) = out_dir {
        std::fs::create_dir_all(dir)
            .map_err(|e| anyhow!("failed to create {}: {e}", dir.display()))?;
    }
    path.push(file_name);
    path.set_extension("xml");
    Ok(path)
}
