//! NVVM Codegen Driver
//!
//! Command-line front of the link core. A session manifest (JSON) lists the
//! compiled units of a program; `nvcg link` turns it into one linked bitcode
//! file.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::{debug, info};
use nvcg_common::UnitKind;
use nvcg_ir::{decode_module, peek_version};
use nvcg_link::{CompilationSession, CompiledUnit, LinkOptions, SessionManifest};
use std::fs;
use std::path::{Path, PathBuf};
use std::process;

#[derive(Parser, Debug)]
#[command(name = "nvcg")]
#[command(about = "NVVM Codegen link driver")]
#[command(version = "0.1.0")]
struct Cli {
    /// More log output (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Link every unit of a session manifest into one bitcode file
    Link {
        /// Session manifest
        manifest: PathBuf,

        /// Output bitcode file
        #[arg(short, long, default_value = "merged.bc")]
        output: PathBuf,

        /// Also write the linked IR as text
        #[arg(long)]
        emit_ir: Option<PathBuf>,

        /// Write kernels, exported functions and globals as JSON
        #[arg(long)]
        abi: Option<PathBuf>,

        #[command(flatten)]
        link: LinkArgs,
    },

    /// Decode a bitcode file and print its IR
    Inspect {
        bitcode: PathBuf,
    },

    /// Print the dependency graph of a session, its roots and what is reachable
    Graph {
        manifest: PathBuf,

        #[command(flatten)]
        link: LinkArgs,
    },

    /// Print the symbol table and reference manifest of a bitcode file as JSON
    Describe {
        bitcode: PathBuf,

        /// Describe the unit as a support library
        #[arg(long)]
        library: bool,
    },
}

#[derive(clap::Args, Debug)]
struct LinkArgs {
    /// Walk the graph on a single thread
    #[arg(long)]
    sequential: bool,

    /// Worker threads for the parallel walk
    #[arg(long, conflicts_with = "sequential")]
    threads: Option<usize>,

    /// Reject generic to specific conversions that cannot be proven
    #[arg(long)]
    strict: bool,
}

impl LinkArgs {
    /// Override the options the flags name; everything else stays as given
    fn apply(&self, options: &mut LinkOptions) {
        if self.sequential {
            options.parallel = false;
        }
        if let Some(threads) = self.threads {
            options.parallel = true;
            options.threads = Some(threads);
        }
        if self.strict {
            options.strict_provenance = true;
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli.command) {
        eprintln!("error: {e:#}");
        process::exit(1);
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Link { manifest, output, emit_ir, abi, link } => {
            link_command(&manifest, &output, emit_ir.as_deref(), abi.as_deref(), &link)
        }
        Commands::Inspect { bitcode } => inspect_command(&bitcode),
        Commands::Graph { manifest, link } => graph_command(&manifest, &link),
        Commands::Describe { bitcode, library } => describe_command(&bitcode, library),
    }
}

fn open_session(manifest: &Path, link: &LinkArgs) -> Result<CompilationSession> {
    let mut manifest = SessionManifest::load(manifest)
        .with_context(|| format!("cannot load session manifest {}", manifest.display()))?;
    debug!("manifest lists {} units", manifest.units.len());
    let mut options = manifest.options.take().unwrap_or_default();
    link.apply(&mut options);
    manifest.options = Some(options);
    Ok(manifest.into_session(LinkOptions::default()))
}

/// Print the session's diagnostics, then turn the error into an `anyhow` one
fn fail(session: &CompilationSession, error: nvcg_common::CodegenError) -> anyhow::Error {
    session.reporter().print_diagnostics();
    anyhow::Error::new(error).context(session.reporter().summary())
}

fn link_command(
    manifest: &Path,
    output: &Path,
    emit_ir: Option<&Path>,
    abi: Option<&Path>,
    link: &LinkArgs,
) -> Result<()> {
    let mut session = open_session(manifest, link)?;
    let result = match session.run() {
        Ok(result) => result,
        Err(e) => return Err(fail(&session, e)),
    };
    for warning in session.reporter().diagnostics() {
        eprintln!("{warning}");
    }

    fs::write(output, &result.bitcode).with_context(|| format!("cannot write {}", output.display()))?;
    info!("linked module written to {}", output.display());

    if let Some(path) = emit_ir {
        fs::write(path, result.linked.module.to_string())
            .with_context(|| format!("cannot write {}", path.display()))?;
    }

    if let Some(path) = abi {
        let abi = serde_json::json!({
            "kernels": result.linked.kernels,
            "abi_surface": result.linked.abi_surface,
            "host_globals": result.linked.host_globals,
            "block_scoped": result.linked.block_scoped,
            "segments": result.linked.segments,
            "stats": result.stats,
        });
        fs::write(path, serde_json::to_string_pretty(&abi)?)
            .with_context(|| format!("cannot write {}", path.display()))?;
    }

    println!(
        "{}: {} kernels, {}/{} modules loaded, {}/{} symbols kept",
        output.display(),
        result.linked.kernels.len(),
        result.stats.modules_loaded,
        result.stats.modules_total,
        result.stats.symbols_reachable,
        result.stats.symbols_total
    );
    Ok(())
}

fn inspect_command(path: &Path) -> Result<()> {
    let bytes = fs::read(path).with_context(|| format!("cannot read {}", path.display()))?;
    let version = peek_version(&bytes).with_context(|| format!("{} is not a bitcode file", path.display()))?;
    let module = decode_module(&bytes).with_context(|| format!("cannot decode {}", path.display()))?;
    println!("; {} (IR {})", path.display(), version);
    print!("{module}");
    Ok(())
}

fn graph_command(manifest: &Path, link: &LinkArgs) -> Result<()> {
    let mut session = open_session(manifest, link)?;
    let analysis = match session.analyze() {
        Ok(analysis) => analysis,
        Err(e) => return Err(fail(&session, e)),
    };

    print!("{}", analysis.graph);
    println!();
    println!("roots:");
    for root in analysis.root_names() {
        println!("  {root}");
    }
    println!("reachable:");
    for id in analysis.dce.reachable_symbols() {
        println!("  {}", analysis.graph.qualified_name(id));
    }
    let stats = analysis.stats();
    println!(
        "{}/{} modules loaded, {} runtime checks",
        stats.modules_loaded, stats.modules_total, stats.runtime_checks
    );
    Ok(())
}

fn describe_command(path: &Path, library: bool) -> Result<()> {
    let bytes = fs::read(path).with_context(|| format!("cannot read {}", path.display()))?;
    let module = decode_module(&bytes).with_context(|| format!("cannot decode {}", path.display()))?;
    if module.name.is_empty() {
        bail!("{} holds a module without a name", path.display());
    }
    let kind = if library { UnitKind::Library } else { UnitKind::Crate };
    let unit = CompiledUnit::describe(&module, kind);
    println!("{}", serde_json::to_string_pretty(&unit)?);
    Ok(())
}
