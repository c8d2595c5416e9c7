use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::SymfileError;
use crate::host::{HostChannel, HostHandle};

/// Bytes requested from the host per read.
pub const TRANSFER_BUFFER_SIZE: usize = 64 * 1024;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TransferReport {
    pub source: String,
    pub destination: PathBuf,
    pub bytes: u64,
    pub digest_hex: String,
}

/// Host handle that is closed when dropped.
struct HostFile<'a, H: HostChannel + ?Sized> {
    host: &'a mut H,
    handle: HostHandle,
}

impl<H: HostChannel + ?Sized> HostFile<'_, H> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.host.read(self.handle, buf)
    }
}

impl<H: HostChannel + ?Sized> Drop for HostFile<'_, H> {
    fn drop(&mut self) {
        self.host.close(self.handle);
    }
}

/// Destination that is closed and unlinked on drop unless committed.
struct PartialOutput<W: Write = File> {
    path: PathBuf,
    sink: Option<W>,
}

impl PartialOutput<File> {
    fn create(path: &Path) -> io::Result<Self> {
        let mut opts = OpenOptions::new();
        opts.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            opts.mode(0o700);
        }
        let file = opts.open(path)?;
        Ok(Self { path: path.to_path_buf(), sink: Some(file) })
    }
}

impl<W: Write> PartialOutput<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.sink.as_mut() {
            Some(w) => w.write(buf),
            None => Err(io::Error::other("output already committed")),
        }
    }

    fn commit(mut self) {
        self.sink.take();
    }
}

impl<W: Write> Drop for PartialOutput<W> {
    fn drop(&mut self) {
        if self.sink.take().is_some() {
            if let Err(e) = std::fs::remove_file(&self.path) {
                tracing::warn!(path = %self.path.display(), error = %e, "could not remove partial file");
            }
        }
    }
}

/// Copy host file `host_id` to `dest`, byte for byte.
///
/// On error both handles are closed and `dest` does not exist afterwards.
pub fn copy_file<H: HostChannel + ?Sized>(
    host: &mut H,
    host_id: &str,
    dest: &Path,
) -> Result<TransferReport, SymfileError> {
    copy_into(host, host_id, dest, PartialOutput::create)
}

/// The copy loop, with the destination supplied by `create` once the host file is open.
fn copy_into<H, W, C>(
    host: &mut H,
    host_id: &str,
    dest: &Path,
    create: C,
) -> Result<TransferReport, SymfileError>
where
    H: HostChannel + ?Sized,
    W: Write,
    C: FnOnce(&Path) -> io::Result<PartialOutput<W>>,
{
    // Anything left over from an earlier run goes first.
    match std::fs::remove_file(dest) {
        Ok(()) => tracing::debug!(path = %dest.display(), "removed stale destination"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => tracing::debug!(path = %dest.display(), error = %e, "could not remove destination"),
    }

    let handle = host
        .open(host_id)
        .map_err(|source| failed(SymfileError::TransferOpen { id: host_id.to_string(), source }))?;
    let mut src = HostFile { host, handle };

    let mut out = create(dest)
        .map_err(|source| failed(SymfileError::TransferCreate { path: dest.to_path_buf(), source }))?;

    let mut buf = vec![0u8; TRANSFER_BUFFER_SIZE];
    let mut hasher = blake3::Hasher::new();
    let mut transferred = 0u64;
    loop {
        let n = src
            .read(&mut buf)
            .map_err(|source| failed(SymfileError::TransferRead { transferred, source }))?;
        if n == 0 {
            break;
        }
        let chunk = &buf[..n];
        let written = out.write(chunk).map_err(|source| {
            failed(SymfileError::TransferWrite { path: dest.to_path_buf(), transferred, source })
        })?;
        if written != n {
            let source = io::Error::new(
                io::ErrorKind::WriteZero,
                format!("short write: {written} of {n} bytes"),
            );
            return Err(failed(SymfileError::TransferWrite {
                path: dest.to_path_buf(),
                transferred,
                source,
            }));
        }
        hasher.update(chunk);
        transferred += n as u64;
    }

    out.commit();
    drop(src);

    tracing::info!(
        source = host_id,
        bytes = transferred,
        destination = %dest.display(),
        "file transferred"
    );
    Ok(TransferReport {
        source: host_id.to_string(),
        destination: dest.to_path_buf(),
        bytes: transferred,
        digest_hex: hasher.finalize().to_hex().to_string(),
    })
}

fn failed(e: SymfileError) -> SymfileError {
    tracing::warn!(kind = ?e.kind(), error = %e, "transfer failed");
    e
}
