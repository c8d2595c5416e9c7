use serde::{Deserialize, Serialize};
use std::io;
use std::path::PathBuf;

/// Closed set of failure classes shared by the transfer and symbolization stages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    TransferOpen,
    TransferCreate,
    TransferRead,
    TransferWrite,
    Seek,
    Read,
    Write,
    ShortWrite,
}

/// Which stage produced an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Transfer,
    Symbolize,
}

/// What the host-integration layer does with an error of a given kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Disposition {
    /// Log the error and carry on.
    Report,
    /// End the current exploration state through the engine.
    TerminateState,
    /// Hand the error back to the caller.
    Abort,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 8] = [
        ErrorKind::TransferOpen,
        ErrorKind::TransferCreate,
        ErrorKind::TransferRead,
        ErrorKind::TransferWrite,
        ErrorKind::Seek,
        ErrorKind::Read,
        ErrorKind::Write,
        ErrorKind::ShortWrite,
    ];

    /// Distinct non-zero code per kind; also used as the CLI exit status.
    pub fn code(self) -> i32 {
        match self {
            ErrorKind::TransferOpen => 1,
            ErrorKind::TransferCreate => 2,
            ErrorKind::TransferRead => 3,
            ErrorKind::TransferWrite => 4,
            ErrorKind::Seek => 5,
            ErrorKind::Read => 6,
            ErrorKind::Write => 7,
            ErrorKind::ShortWrite => 8,
        }
    }

    pub fn stage(self) -> Stage {
        match self {
            ErrorKind::TransferOpen
            | ErrorKind::TransferCreate
            | ErrorKind::TransferRead
            | ErrorKind::TransferWrite => Stage::Transfer,
            ErrorKind::Seek | ErrorKind::Read | ErrorKind::Write | ErrorKind::ShortWrite => {
                Stage::Symbolize
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SymfileError {
    #[error("open of host file {id} failed: {source}")]
    TransferOpen {
        id: String,
        #[source]
        source: io::Error,
    },

    #[error("could not create file {path:?}: {source}")]
    TransferCreate {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("host read failed after {transferred} bytes: {source}")]
    TransferRead {
        transferred: u64,
        #[source]
        source: io::Error,
    },

    #[error("could not write to file {path:?} after {transferred} bytes: {source}")]
    TransferWrite {
        path: PathBuf,
        transferred: u64,
        #[source]
        source: io::Error,
    },

    #[error("symbfile: could not seek to position {offset}: {source}")]
    Seek {
        offset: u64,
        #[source]
        source: io::Error,
    },

    #[error("symbfile: could not open {path:?}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("symbfile: could not read from file at {offset}: {source}")]
    Read {
        offset: u64,
        #[source]
        source: io::Error,
    },

    #[error("symbfile: could not write to file at {offset}: {source}")]
    Write {
        offset: u64,
        #[source]
        source: io::Error,
    },

    #[error("symbfile: could not write the read amount at {offset} ({written} of {expected} bytes)")]
    ShortWrite { offset: u64, expected: usize, written: usize },
}

impl SymfileError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SymfileError::TransferOpen { .. } => ErrorKind::TransferOpen,
            SymfileError::TransferCreate { .. } => ErrorKind::TransferCreate,
            SymfileError::TransferRead { .. } => ErrorKind::TransferRead,
            SymfileError::TransferWrite { .. } => ErrorKind::TransferWrite,
            SymfileError::Seek { .. } => ErrorKind::Seek,
            // Opening the guest file is the first read-side step of symbolization.
            SymfileError::Open { .. } | SymfileError::Read { .. } => ErrorKind::Read,
            SymfileError::Write { .. } => ErrorKind::Write,
            SymfileError::ShortWrite { .. } => ErrorKind::ShortWrite,
        }
    }

    pub fn code(&self) -> i32 {
        self.kind().code()
    }
}

/// Rejected configuration values.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("block size must be non-zero")]
    ZeroBlockSize,

    #[error("block size {size} exceeds the {max} byte limit")]
    BlockSizeTooLarge { size: usize, max: usize },

    #[error("seed path capacity must be at least 2 bytes, got {0}")]
    SeedCapacity(usize),

    #[error("retry policy needs at least one attempt")]
    ZeroRetries,

    #[error("read config {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("parse config {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
