use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::{Path, PathBuf};

use crate::error::{ConfigError, Disposition, ErrorKind, Stage};

/// Environment variable whose presence selects fork-server mode.
pub const FORK_SERVER_ENV: &str = "FORK_SERVER";
/// Well-known guest path the seed is materialized at.
pub const DEFAULT_GUEST_PATH: &str = "/tmp/input";
pub const DEFAULT_BLOCK_SIZE: usize = 0x1000;
/// Upper bound on one symbolic variable (and so on the scratch buffer).
pub const MAX_BLOCK_SIZE: usize = 16 << 20;
pub const DEFAULT_SEED_PATH_CAPACITY: usize = 256;

/// Chunk size, validated before any buffer of this size is allocated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "usize", into = "usize")]
pub struct BlockSize(usize);

impl BlockSize {
    pub fn new(size: usize) -> Result<Self, ConfigError> {
        if size == 0 {
            return Err(ConfigError::ZeroBlockSize);
        }
        if size > MAX_BLOCK_SIZE {
            return Err(ConfigError::BlockSizeTooLarge { size, max: MAX_BLOCK_SIZE });
        }
        Ok(Self(size))
    }

    pub fn get(self) -> usize {
        self.0
    }
}

impl Default for BlockSize {
    fn default() -> Self {
        Self(DEFAULT_BLOCK_SIZE)
    }
}

impl TryFrom<usize> for BlockSize {
    type Error = ConfigError;
    fn try_from(v: usize) -> Result<Self, Self::Error> {
        Self::new(v)
    }
}

impl From<BlockSize> for usize {
    fn from(b: BlockSize) -> usize {
        b.0
    }
}

/// What to do when a write-back stores fewer bytes than were read.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "mode")]
pub enum ShortWritePolicy {
    #[default]
    Fail,
    /// Keep writing the remainder, giving up after `max_attempts` write calls.
    Retry { max_attempts: u32 },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub fork_server: bool,
    pub guest_path: PathBuf,
    pub block_size: BlockSize,
    pub seed_path_capacity: usize,
    pub short_write: ShortWritePolicy,
    pub on_transfer_error: Disposition,
    pub on_symbolize_error: Disposition,
    pub clean_identifier: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            fork_server: false,
            guest_path: PathBuf::from(DEFAULT_GUEST_PATH),
            block_size: BlockSize::default(),
            seed_path_capacity: DEFAULT_SEED_PATH_CAPACITY,
            short_write: ShortWritePolicy::Fail,
            on_transfer_error: Disposition::Report,
            on_symbolize_error: Disposition::TerminateState,
            clean_identifier: true,
        }
    }
}

impl Config {
    /// Defaults, with fork-server mode taken from the process environment.
    pub fn from_env() -> Self {
        Self { fork_server: std::env::var_os(FORK_SERVER_ENV).is_some(), ..Self::default() }
    }

    /// Load a JSON config file; absent fields keep their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let f = File::open(path)
            .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        let cfg: Config = serde_json::from_reader(std::io::BufReader::new(f))
            .map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.seed_path_capacity < 2 {
            return Err(ConfigError::SeedCapacity(self.seed_path_capacity));
        }
        if let ShortWritePolicy::Retry { max_attempts: 0 } = self.short_write {
            return Err(ConfigError::ZeroRetries);
        }
        Ok(())
    }

    pub fn disposition(&self, kind: ErrorKind) -> Disposition {
        match kind.stage() {
            Stage::Transfer => self.on_transfer_error,
            Stage::Symbolize => self.on_symbolize_error,
        }
    }
}
