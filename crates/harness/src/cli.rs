//! CLI wiring for polyprep.

use crate::config::HarnessConfig;
use crate::driver::BatchDriver;
use crate::layout::{SourceMode, WorkspaceLayout};
use crate::manifest::Manifest;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use polyprep_source::{extract, BoundaryLocator, DirectiveFilter, LineListing, LineScanLocator};
use polyprep_tools::{ExternalTransformer, ShellToolchain};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "polyprep",
    about = "Extract, transform and time PolyBench kernels"
)]
pub struct Cli {
    /// Directory holding the archive and receiving the extracted sources.
    #[arg(long, global = true, default_value = ".")]
    pub workdir: PathBuf,

    /// JSON configuration; defaults apply when absent.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Compiler program; overrides the configuration file.
    #[arg(long, global = true)]
    pub compiler: Option<PathBuf>,

    /// Transformation tool program; overrides the configuration file.
    #[arg(long, global = true)]
    pub transformer: Option<PathBuf>,

    /// Log every intermediate snippet and stage transition.
    #[arg(long, global = true, default_value_t = false)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Set up the workspace, then process every kernel in the manifest.
    Run {
        /// Write a JSON run report here.
        #[arg(long)]
        report: Option<PathBuf>,
        /// Use an already-extracted sources directory instead of the archive.
        #[arg(long, default_value_t = false)]
        reuse_sources: bool,
    },
    /// Verify and unpack the archive and create the output directories.
    Prepare {
        #[arg(long, default_value_t = false)]
        reuse_sources: bool,
    },
    /// Print the boundary range of a function in a source file.
    Locate {
        #[arg(long)]
        file: PathBuf,
        #[arg(long)]
        function: String,
    },
    /// Print the directive-filtered text of a function.
    Extract {
        #[arg(long)]
        file: PathBuf,
        #[arg(long)]
        function: String,
        /// Drop everything up to and including the body-opening line.
        #[arg(long, default_value_t = false)]
        no_signature: bool,
    },
    /// Print the effective configuration.
    Config,
}

pub fn run_cli(cli: Cli) -> Result<()> {
    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let Cli {
        workdir,
        config,
        compiler,
        transformer,
        debug: _,
        command,
    } = cli;
    let mut config = match config {
        Some(path) => HarnessConfig::load_from_file(&path)?,
        None => HarnessConfig::default(),
    };
    apply_overrides(&mut config, compiler, transformer);

    match command {
        Command::Run {
            report,
            reuse_sources,
        } => {
            let layout = WorkspaceLayout::new(&workdir, &config);
            layout.prepare(&config, source_mode(reuse_sources))?;

            let manifest = Manifest::load(&layout.manifest_path())?;
            info!(kernels = manifest.len(), "manifest loaded");

            let transformer = ExternalTransformer::new(
                config.transformer.clone(),
                layout.scratch_path(),
                layout.sources_root().to_path_buf(),
            );
            let toolchain = ShellToolchain::new(
                layout.sources_root().to_path_buf(),
                config.preprocessor.clone(),
                config.compiler.clone(),
            );
            let mut driver = BatchDriver::new(&config, layout, transformer, toolchain);
            let batch = driver.run(&manifest)?;

            if let Some(path) = report {
                batch
                    .save(&path)
                    .with_context(|| format!("failed to write report {}", path.display()))?;
                info!(path = %path.display(), "run report written");
            }
        }
        Command::Prepare { reuse_sources } => {
            let layout = WorkspaceLayout::new(&workdir, &config);
            layout.prepare(&config, source_mode(reuse_sources))?;
        }
        Command::Locate { file, function } => {
            let listing = read_listing(&file)?;
            let range = LineScanLocator::new().locate(&listing, &function)?;
            println!("{}", serde_json::to_string_pretty(&range)?);
        }
        Command::Extract {
            file,
            function,
            no_signature,
        } => {
            let listing = read_listing(&file)?;
            let range = LineScanLocator::new().locate(&listing, &function)?;
            let filter = DirectiveFilter::new(config.locator.directive_marker.as_str());
            let mut body = extract(&listing, range, &filter);
            if no_signature {
                body = body.without_signature()?;
            }
            print!("{}", body.text());
        }
        Command::Config => {
            println!("{}", config.to_json()?);
        }
    }
    Ok(())
}

fn apply_overrides(
    config: &mut HarnessConfig,
    compiler: Option<PathBuf>,
    transformer: Option<PathBuf>,
) {
    if let Some(program) = compiler {
        config.compiler.program = program;
    }
    if let Some(program) = transformer {
        config.transformer.program = program;
    }
}

fn source_mode(reuse_sources: bool) -> SourceMode {
    if reuse_sources {
        SourceMode::Reuse
    } else {
        SourceMode::Extract
    }
}

fn read_listing(path: &Path) -> Result<LineListing> {
    LineListing::read(path).with_context(|| format!("failed to read {}", path.display()))
}
