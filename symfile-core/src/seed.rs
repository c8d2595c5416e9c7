//! Process-start seed initialization for fork-server runs.

use crate::config::Config;
use crate::error::{Disposition, SymfileError};
use crate::host::{HostChannel, SeedRef, SeedSource, SymbolicEngine};
use crate::naming::clean_identifier;
use crate::symbolize::{symbolize_path, SymbolizeReport};
use crate::transfer::{copy_file, TransferReport};

#[derive(Debug)]
pub enum SeedOutcome {
    /// Fork-server mode is off; nothing was touched.
    Disabled,
    TransferFailed { seed: SeedRef, error: SymfileError },
    SymbolizeFailed { seed: SeedRef, transfer: TransferReport, error: SymfileError },
    Symbolized { seed: SeedRef, transfer: TransferReport, report: SymbolizeReport },
}

impl SeedOutcome {
    pub fn error(&self) -> Option<&SymfileError> {
        match self {
            SeedOutcome::TransferFailed { error, .. } | SeedOutcome::SymbolizeFailed { error, .. } => {
                Some(error)
            }
            _ => None,
        }
    }
}

/// Act on `error` according to `disposition`.
///
/// `Abort` hands the error back as `Err`; the other two consume the side
/// effect and return the error for reporting.
pub fn dispose<E: SymbolicEngine + ?Sized>(
    disposition: Disposition,
    engine: &mut E,
    error: SymfileError,
) -> Result<SymfileError, SymfileError> {
    match disposition {
        Disposition::Report => {
            tracing::warn!(kind = ?error.kind(), error = %error, "continuing after error");
            Ok(error)
        }
        Disposition::TerminateState => {
            engine.terminate_state(error.code(), &error.to_string());
            Ok(error)
        }
        Disposition::Abort => {
            tracing::error!(kind = ?error.kind(), error = %error, "aborting");
            Err(error)
        }
    }
}

/// Variable-name identifier for the guest copy of the seed.
pub fn seed_identifier(cfg: &Config) -> String {
    let raw = cfg.guest_path.to_string_lossy();
    if cfg.clean_identifier {
        clean_identifier(&raw)
    } else {
        raw.into_owned()
    }
}

/// Fetch the seed, copy it to the guest path, and make it symbolic.
///
/// A no-op unless `cfg.fork_server` is set. The seed's fork flag is passed
/// through untouched.
pub fn initialize_seed<H, S, E>(
    cfg: &Config,
    host: &mut H,
    seeds: &mut S,
    engine: &mut E,
) -> Result<SeedOutcome, SymfileError>
where
    H: HostChannel + ?Sized,
    S: SeedSource + ?Sized,
    E: SymbolicEngine + ?Sized,
{
    if !cfg.fork_server {
        return Ok(SeedOutcome::Disabled);
    }

    let seed = seeds.get_seed(cfg.seed_path_capacity);
    tracing::info!(path = %seed.path, should_fork = seed.should_fork, "seed received");

    let transfer = match copy_file(host, &seed.path, &cfg.guest_path) {
        Ok(t) => t,
        Err(e) => {
            let error = dispose(cfg.disposition(e.kind()), engine, e)?;
            return Ok(SeedOutcome::TransferFailed { seed, error });
        }
    };

    let identifier = seed_identifier(cfg);
    match symbolize_path(&cfg.guest_path, &identifier, cfg.block_size, engine, cfg.short_write) {
        Ok(report) => Ok(SeedOutcome::Symbolized { seed, transfer, report }),
        Err(e) => {
            let error = dispose(cfg.disposition(e.kind()), engine, e)?;
            Ok(SeedOutcome::SymbolizeFailed { seed, transfer, error })
        }
    }
}
