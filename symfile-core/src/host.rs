//! Collaborators supplied by the symbolic-execution platform.
//!
//! A real guest backs these with hypercalls; [`DirHost`], [`RecordingEngine`]
//! and [`FixedSeed`] are in-process stand-ins used by the CLI and the tests.

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Read};
use std::path::PathBuf;

use serde::Serialize;

use crate::path_safety::{resolve_host_id, PathPolicy};

/// Opaque handle returned by [`HostChannel::open`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HostHandle(pub i32);

/// Read-only capability channel to files living on the host.
pub trait HostChannel {
    fn open(&mut self, id: &str) -> io::Result<HostHandle>;

    /// `Ok(0)` is end of stream; `Err` is the host's hard failure.
    fn read(&mut self, handle: HostHandle, buf: &mut [u8]) -> io::Result<usize>;

    fn close(&mut self, handle: HostHandle);
}

/// The execution engine's view of symbolic inputs.
pub trait SymbolicEngine {
    /// Declare `buf` as the named symbolic variable. The engine may replace the
    /// concrete contents with values of its choosing.
    fn make_symbolic(&mut self, buf: &mut [u8], name: &str);

    /// End the current exploration state.
    fn terminate_state(&mut self, code: i32, message: &str);
}

/// Seed reference handed out once per process.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SeedRef {
    pub path: String,
    pub should_fork: bool,
}

pub trait SeedSource {
    /// Fill a path buffer of `capacity` bytes (NUL included) and report the fork decision.
    fn get_seed(&mut self, capacity: usize) -> SeedRef;
}

/// Truncate `path` to fit a NUL-terminated buffer of `capacity` bytes.
pub fn bound_seed_path(path: &str, capacity: usize) -> &str {
    let max = capacity.saturating_sub(1);
    if path.len() <= max {
        return path;
    }
    let mut end = max;
    while !path.is_char_boundary(end) {
        end -= 1;
    }
    &path[..end]
}

/// Host channel serving files out of a local directory.
pub struct DirHost {
    root: PathBuf,
    policy: PathPolicy,
    next: i32,
    open: HashMap<HostHandle, File>,
}

impl DirHost {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into(), policy: PathPolicy::default(), next: 0, open: HashMap::new() }
    }

    pub fn with_policy(mut self, policy: PathPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Handles currently open; a correct transfer leaves this at zero.
    pub fn open_handles(&self) -> usize {
        self.open.len()
    }
}

impl HostChannel for DirHost {
    fn open(&mut self, id: &str) -> io::Result<HostHandle> {
        let path = resolve_host_id(&self.root, id, self.policy)?;
        let file = File::open(&path)?;
        if !file.metadata()?.is_file() {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, format!("{id:?} is not a file")));
        }
        let handle = HostHandle(self.next);
        self.next += 1;
        self.open.insert(handle, file);
        tracing::trace!(id, handle = handle.0, "host file opened");
        Ok(handle)
    }

    fn read(&mut self, handle: HostHandle, buf: &mut [u8]) -> io::Result<usize> {
        let file = self
            .open
            .get_mut(&handle)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "bad host handle"))?;
        file.read(buf)
    }

    fn close(&mut self, handle: HostHandle) {
        self.open.remove(&handle);
    }
}

/// A registered symbolic variable and the concrete bytes it started from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SymbolicVariable {
    pub name: String,
    pub len: usize,
    #[serde(skip)]
    pub data: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Termination {
    pub code: i32,
    pub message: String,
}

/// Engine that keeps every variable and termination it sees.
#[derive(Debug, Default)]
pub struct RecordingEngine {
    pub variables: Vec<SymbolicVariable>,
    pub terminations: Vec<Termination>,
}

impl RecordingEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_terminated(&self) -> bool {
        !self.terminations.is_empty()
    }
}

impl SymbolicEngine for RecordingEngine {
    fn make_symbolic(&mut self, buf: &mut [u8], name: &str) {
        tracing::debug!(name, len = buf.len(), "symbolic variable registered");
        self.variables.push(SymbolicVariable {
            name: name.to_string(),
            len: buf.len(),
            data: buf.to_vec(),
        });
    }

    fn terminate_state(&mut self, code: i32, message: &str) {
        tracing::error!(code, message, "state terminated");
        self.terminations.push(Termination { code, message: message.to_string() });
    }
}

/// Seed source returning a preconfigured reference.
#[derive(Clone, Debug)]
pub struct FixedSeed {
    pub path: String,
    pub should_fork: bool,
    pub queries: usize,
}

impl FixedSeed {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into(), should_fork: false, queries: 0 }
    }
}

impl SeedSource for FixedSeed {
    fn get_seed(&mut self, capacity: usize) -> SeedRef {
        self.queries += 1;
        SeedRef {
            path: bound_seed_path(&self.path, capacity).to_string(),
            should_fork: self.should_fork,
        }
    }
}
