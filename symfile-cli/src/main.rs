use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use symfile_core::config::{BlockSize, Config, ShortWritePolicy};
use symfile_core::host::{DirHost, FixedSeed, RecordingEngine};
use symfile_core::naming::{self, ChunkName};
use symfile_core::path_safety::PathPolicy;
use symfile_core::seed::{dispose, initialize_seed, SeedOutcome};
use symfile_core::symbolize::symbolize_path;
use symfile_core::transfer::copy_file;
use symfile_core::SymfileError;

/// Exit status for failures that are not a transfer/symbolize error kind.
const EXIT_OTHER: i32 = 64;

#[derive(Parser)]
#[command(name = "symfile", version, about = "Seed transfer and chunked file symbolization")]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Copy a file from the host share into guest storage
    Copy {
        #[arg(long)]
        host_dir: PathBuf,
        /// Allow symlinks inside the host share as long as they resolve under it
        #[arg(long, default_value_t = false)]
        follow_symlinks: bool,
        host_id: String,
        dest: PathBuf,
    },
    /// Make every chunk of a guest file symbolic and list the variables
    Symbolize {
        #[arg(long, default_value_t = symfile_core::config::DEFAULT_BLOCK_SIZE)]
        block_size: usize,
        /// Identifier embedded in variable names (default: the cleaned path)
        #[arg(long)]
        name: Option<String>,
        /// Retry short write-backs up to N write calls
        #[arg(long)]
        retry: Option<u32>,
        path: PathBuf,
    },
    /// Fork-server start-up: fetch the seed, copy it to the guest path, symbolize it
    Seed {
        #[arg(long)]
        host_dir: PathBuf,
        #[arg(long)]
        seed: String,
        #[arg(long, default_value_t = false)]
        follow_symlinks: bool,
        #[arg(long)]
        config: Option<PathBuf>,
        /// Force fork-server mode regardless of FORK_SERVER
        #[arg(long, default_value_t = false)]
        fork_server: bool,
        #[arg(long)]
        guest_path: Option<PathBuf>,
        #[arg(long)]
        block_size: Option<usize>,
    },
    /// Print the variable name of one chunk
    Name { identifier: String, index: u64, total: u64 },
    /// Decode a chunk variable name
    Parse { name: String },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(Cli::parse()) {
        eprintln!("error: {e:#}");
        let code = e.downcast_ref::<SymfileError>().map(SymfileError::code).unwrap_or(EXIT_OTHER);
        std::process::exit(code);
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.cmd {
        Cmd::Copy { host_dir, follow_symlinks, host_id, dest } => {
            copy(&host_dir, follow_symlinks, &host_id, &dest)
        }
        Cmd::Symbolize { block_size, name, retry, path } => symbolize(block_size, name, retry, &path),
        Cmd::Seed { host_dir, seed, follow_symlinks, config, fork_server, guest_path, block_size } => {
            let host = share(&host_dir, follow_symlinks);
            seed_cmd(host, &seed, config.as_deref(), fork_server, guest_path, block_size)
        }
        Cmd::Name { identifier, index, total } => {
            if index >= total {
                return Err(anyhow!("chunk index {index} out of range for {total} chunks"));
            }
            println!("{}", naming::encode(&identifier, index, total));
            Ok(())
        }
        Cmd::Parse { name } => {
            let n = ChunkName::parse(&name).with_context(|| format!("parse {name:?}"))?;
            println!("{} {} {}", n.identifier, n.index, n.total);
            Ok(())
        }
    }
}

fn share(host_dir: &Path, follow_symlinks: bool) -> DirHost {
    DirHost::new(host_dir).with_policy(PathPolicy { follow_symlinks })
}

fn copy(host_dir: &Path, follow_symlinks: bool, host_id: &str, dest: &Path) -> Result<()> {
    let mut host = share(host_dir, follow_symlinks);
    let report = copy_file(&mut host, host_id, dest)?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn short_write_policy(retry: Option<u32>) -> ShortWritePolicy {
    match retry {
        Some(max_attempts) => ShortWritePolicy::Retry { max_attempts },
        None => ShortWritePolicy::Fail,
    }
}

fn symbolize(block_size: usize, name: Option<String>, retry: Option<u32>, path: &Path) -> Result<()> {
    let block = BlockSize::new(block_size)?;
    let policy = short_write_policy(retry);
    if let ShortWritePolicy::Retry { max_attempts: 0 } = policy {
        return Err(anyhow!("--retry needs at least one attempt"));
    }
    let identifier = name.unwrap_or_else(|| naming::clean_identifier(&path.to_string_lossy()));

    let mut engine = RecordingEngine::new();
    match symbolize_path(path, &identifier, block, &mut engine, policy) {
        Ok(report) => {
            let out = json!({ "report": report, "variables": engine.variables });
            println!("{}", serde_json::to_string_pretty(&out)?);
            Ok(())
        }
        Err(e) => {
            let cfg = Config::default();
            let e = dispose(cfg.disposition(e.kind()), &mut engine, e)?;
            Err(e).with_context(|| format!("symbolize {}", path.display()))
        }
    }
}

fn seed_cmd(
    mut host: DirHost,
    seed: &str,
    config: Option<&Path>,
    fork_server: bool,
    guest_path: Option<PathBuf>,
    block_size: Option<usize>,
) -> Result<()> {
    let mut cfg = match config {
        Some(p) => {
            let mut c = Config::load(p)?;
            c.fork_server |= Config::from_env().fork_server;
            c
        }
        None => Config::from_env(),
    };
    cfg.fork_server |= fork_server;
    if let Some(p) = guest_path {
        cfg.guest_path = p;
    }
    if let Some(b) = block_size {
        cfg.block_size = BlockSize::new(b)?;
    }

    let mut seeds = FixedSeed::new(seed);
    let mut engine = RecordingEngine::new();
    let outcome = initialize_seed(&cfg, &mut host, &mut seeds, &mut engine)?;

    let summary = match &outcome {
        SeedOutcome::Disabled => json!({ "status": "disabled" }),
        SeedOutcome::TransferFailed { seed, error } => json!({
            "status": "transfer-failed",
            "seed": seed,
            "kind": error.kind(),
            "error": error.to_string(),
        }),
        SeedOutcome::SymbolizeFailed { seed, transfer, error } => json!({
            "status": "symbolize-failed",
            "seed": seed,
            "transfer": transfer,
            "kind": error.kind(),
            "error": error.to_string(),
        }),
        SeedOutcome::Symbolized { seed, transfer, report } => json!({
            "status": "symbolized",
            "seed": seed,
            "transfer": transfer,
            "report": report,
            "variables": engine.variables,
        }),
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);

    if let Some(t) = engine.terminations.first() {
        std::process::exit(t.code);
    }
    Ok(())
}
