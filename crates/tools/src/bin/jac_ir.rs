//! Inspect and exercise Jac parse trees.
//!
//! Usage:
//!   `jac-ir disasm <tree.json>`
//!   `jac-ir test <tree.json> [--filter TEXT] [--config FILE]`
//!   `jac-ir run <tree.json> <walker> [--ctx JSON] [--config FILE]`

use std::path::PathBuf;
use std::process;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indexmap::IndexMap;
use tracing::{error, info, warn};

use jac_foundation::Value;
use jac_runtime::Runtime;
use jac_tools::{compiled_nodes, load_config, load_tree};
use jac_vm::{compile_tree, disassemble};

#[derive(Parser, Debug)]
#[command(name = "jac-ir")]
#[command(about = "Disassemble, test and run Jac programs from JSON parse trees")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compile the tree and print the bytecode of every expression
    Disasm {
        tree: PathBuf,
        /// Leave out DEBUG_INFO records
        #[arg(long)]
        no_debug_info: bool,
    },
    /// Register the program and run its test cases
    Test {
        tree: PathBuf,
        /// Only run tests whose title contains this text
        #[arg(long)]
        filter: Option<String>,
        /// YAML runtime config
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Register the program and run one walker on a fresh graph
    Run {
        tree: PathBuf,
        walker: String,
        /// Walker context as a JSON object
        #[arg(long)]
        ctx: Option<String>,
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn main() {
    jac_tools::init_logging();

    let args = Args::parse();
    let outcome = match args.command {
        Command::Disasm { tree, no_debug_info } => disasm(tree, !no_debug_info),
        Command::Test {
            tree,
            filter,
            config,
        } => test(tree, filter, config),
        Command::Run {
            tree,
            walker,
            ctx,
            config,
        } => run(tree, walker, ctx, config),
    };
    match outcome {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(err) => {
            error!("{err:#}");
            process::exit(2);
        }
    }
}

fn disasm(path: PathBuf, debug_info: bool) -> Result<bool> {
    let mut tree = load_tree(&path)?;
    let count = compile_tree(&mut tree, debug_info);
    info!("{count} expressions compiled");
    for node in compiled_nodes(&tree) {
        let Some(code) = node.bytecode.as_deref() else {
            continue;
        };
        println!("; {} ({})", node.source_text(), node.loc);
        match disassemble(code) {
            Ok(lines) => lines.iter().for_each(|line| println!("  {line}")),
            Err(err) => warn!("{}: {err}", node.loc),
        }
    }
    Ok(true)
}

fn register(path: PathBuf, config: Option<PathBuf>) -> Result<(Runtime, jac_foundation::ElementId)> {
    let tree = load_tree(&path)?;
    let config = load_config(config.as_deref())?;
    let mut runtime = Runtime::new(config)?;
    let master = runtime.create_master("jac-ir");
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "main".to_string());
    let sentinel = runtime.sentinel_register(master, &name, &tree)?;
    let Some(registered) = runtime.sentinel(sentinel) else {
        bail!("sentinel {name} vanished after registration");
    };
    if !registered.is_active {
        for err in &registered.errors {
            error!("{err}");
        }
        bail!("{name} did not compile");
    }
    Ok((runtime, master))
}

fn test(path: PathBuf, filter: Option<String>, config: Option<PathBuf>) -> Result<bool> {
    let (mut runtime, master) = register(path, config)?;
    let summary = runtime.run_tests(master, filter.as_deref())?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(summary.success)
}

fn run(path: PathBuf, walker: String, ctx: Option<String>, config: Option<PathBuf>) -> Result<bool> {
    let ctx = match ctx {
        Some(text) => {
            let json: serde_json::Value = serde_json::from_str(&text).context("parsing --ctx")?;
            match Value::from_json(&json) {
                Value::Dict(map) => map,
                _ => bail!("--ctx must be a JSON object"),
            }
        }
        None => IndexMap::new(),
    };
    let (mut runtime, master) = register(path, config)?;
    runtime.graph_create(master, None)?;
    let report = runtime.walker_run(master, &walker, None, &ctx)?;
    print!("{}", runtime.output().stdout());
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(report.success)
}
