use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use serde::Serialize;

use crate::config::{BlockSize, ShortWritePolicy};
use crate::error::SymfileError;
use crate::host::SymbolicEngine;
use crate::naming;

/// One planned window of a file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Chunk {
    pub index: u64,
    pub total: u64,
    pub offset: u64,
    pub len: usize,
}

/// Partition of `size` bytes into `block_size` windows, the last one possibly shorter.
#[derive(Clone, Debug)]
pub struct ChunkPlan {
    size: u64,
    block: u64,
    next: u64,
}

impl ChunkPlan {
    pub fn new(size: u64, block_size: BlockSize) -> Self {
        Self { size, block: block_size.get() as u64, next: 0 }
    }

    pub fn total(&self) -> u64 {
        self.size.div_ceil(self.block)
    }
}

impl Iterator for ChunkPlan {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        let offset = self.next * self.block;
        if offset >= self.size {
            return None;
        }
        let len = (self.size - offset).min(self.block) as usize;
        let chunk = Chunk { index: self.next, total: self.total(), offset, len };
        self.next += 1;
        Some(chunk)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SymbolizeReport {
    pub identifier: String,
    pub chunks: u64,
    pub bytes: u64,
}

/// Read until `buf` is full or the file ends.
fn read_up_to<F: Read + ?Sized>(file: &mut F, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match file.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

fn write_back<F: Write + ?Sized>(
    file: &mut F,
    data: &[u8],
    offset: u64,
    policy: ShortWritePolicy,
) -> Result<(), SymfileError> {
    let attempts = match policy {
        ShortWritePolicy::Fail => 1,
        ShortWritePolicy::Retry { max_attempts } => max_attempts.max(1),
    };
    let mut written = 0;
    for attempt in 0..attempts {
        let n = file
            .write(&data[written..])
            .map_err(|source| SymfileError::Write { offset: offset + written as u64, source })?;
        written += n;
        if written == data.len() || n == 0 {
            break;
        }
        tracing::debug!(offset, written, expected = data.len(), attempt, "short write-back");
    }
    if written != data.len() {
        return Err(SymfileError::ShortWrite { offset, expected: data.len(), written });
    }
    Ok(())
}

/// Make the window at `offset` symbolic in place.
///
/// Reads up to `buf.len()` bytes, registers them with the engine under `name`,
/// and writes whatever the engine left in the buffer back to the same offset.
/// Returns the number of bytes processed, which is short of `buf.len()` only
/// at end of file.
pub fn make_chunk_symbolic<F, E>(
    file: &mut F,
    offset: u64,
    buf: &mut [u8],
    name: &str,
    engine: &mut E,
    policy: ShortWritePolicy,
) -> Result<usize, SymfileError>
where
    F: Read + Write + Seek + ?Sized,
    E: SymbolicEngine + ?Sized,
{
    file.seek(SeekFrom::Start(offset)).map_err(|source| SymfileError::Seek { offset, source })?;
    let n = read_up_to(file, buf).map_err(|source| SymfileError::Read { offset, source })?;
    if n == 0 {
        return Ok(0);
    }

    let data = &mut buf[..n];
    engine.make_symbolic(data, name);

    file.seek(SeekFrom::Start(offset)).map_err(|source| SymfileError::Seek { offset, source })?;
    write_back(file, data, offset, policy)?;
    Ok(n)
}

/// Make all `size` bytes of `file` symbolic, one variable per `block_size` window.
///
/// Chunk names embed the final chunk count, computed before the first chunk is touched.
pub fn make_whole_file_symbolic<F, E>(
    file: &mut F,
    size: u64,
    block_size: BlockSize,
    identifier: &str,
    engine: &mut E,
    policy: ShortWritePolicy,
) -> Result<SymbolizeReport, SymfileError>
where
    F: Read + Write + Seek + ?Sized,
    E: SymbolicEngine + ?Sized,
{
    let plan = ChunkPlan::new(size, block_size);
    let mut buf = vec![0u8; size.min(block_size.get() as u64) as usize];

    let mut chunks = 0u64;
    for chunk in plan {
        let name = naming::encode(identifier, chunk.index, chunk.total);
        let window = &mut buf[..chunk.len];
        let n = make_chunk_symbolic(file, chunk.offset, window, &name, engine, policy)?;
        if n < chunk.len {
            // The file is shorter than the size we were given.
            let missing = size - chunk.offset - n as u64;
            return Err(SymfileError::Read {
                offset: chunk.offset + n as u64,
                source: io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("file ended {missing} bytes early"),
                ),
            });
        }
        tracing::debug!(name = %name, offset = chunk.offset, len = n, "chunk symbolized");
        chunks += 1;
    }

    tracing::info!(identifier, chunks, bytes = size, "file made symbolic");
    Ok(SymbolizeReport { identifier: identifier.to_string(), chunks, bytes: size })
}

/// Open `path` read/write, measure it, and make the whole file symbolic.
pub fn symbolize_path<E: SymbolicEngine + ?Sized>(
    path: &Path,
    identifier: &str,
    block_size: BlockSize,
    engine: &mut E,
    policy: ShortWritePolicy,
) -> Result<SymbolizeReport, SymfileError> {
    let mut file: File = OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .map_err(|source| SymfileError::Open { path: path.to_path_buf(), source })?;
    let size =
        file.seek(SeekFrom::End(0)).map_err(|source| SymfileError::Seek { offset: 0, source })?;
    make_whole_file_symbolic(&mut file, size, block_size, identifier, engine, policy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::RecordingEngine;
    use std::io::Cursor;

    fn bs(n: usize) -> BlockSize {
        BlockSize::new(n).unwrap()
    }

    #[test]
    fn plan_10000_by_4096() {
        let plan = ChunkPlan::new(10_000, bs(4096));
        assert_eq!(plan.total(), 3);
        let chunks: Vec<_> = plan.collect();
        let lens: Vec<_> = chunks.iter().map(|c| c.len).collect();
        let offs: Vec<_> = chunks.iter().map(|c| c.offset).collect();
        assert_eq!(lens, vec![4096, 4096, 1808]);
        assert_eq!(offs, vec![0, 4096, 8192]);
        assert!(chunks.iter().all(|c| c.total == 3));
    }

    #[test]
    fn plan_exact_multiple_and_empty() {
        let lens: Vec<_> = ChunkPlan::new(8192, bs(4096)).map(|c| c.len).collect();
        assert_eq!(lens, vec![4096, 4096]);
        assert_eq!(ChunkPlan::new(0, bs(4096)).count(), 0);
        assert_eq!(ChunkPlan::new(0, bs(4096)).total(), 0);
    }

    #[test]
    fn chunk_round_trip_is_identity() {
        let data: Vec<u8> = (0..100u8).collect();
        let mut file = Cursor::new(data.clone());
        let mut engine = RecordingEngine::new();
        let mut buf = [0u8; 32];
        let n = make_chunk_symbolic(
            &mut file,
            40,
            &mut buf,
            "v",
            &mut engine,
            ShortWritePolicy::Fail,
        )
        .unwrap();
        assert_eq!(n, 32);
        assert_eq!(engine.variables[0].data, &data[40..72]);
        assert_eq!(file.into_inner(), data);
    }

    #[test]
    fn chunk_at_end_reads_short() {
        let mut file = Cursor::new(vec![7u8; 10]);
        let mut engine = RecordingEngine::new();
        let mut buf = [0u8; 8];
        let n = make_chunk_symbolic(
            &mut file,
            6,
            &mut buf,
            "v",
            &mut engine,
            ShortWritePolicy::Fail,
        )
        .unwrap();
        assert_eq!(n, 4);
        assert_eq!(engine.variables[0].len, 4);
        assert_eq!(file.into_inner().len(), 10);
    }

    #[test]
    fn empty_file_does_nothing() {
        let mut file = Cursor::new(Vec::new());
        let mut engine = RecordingEngine::new();
        let r = make_whole_file_symbolic(
            &mut file,
            0,
            bs(4096),
            "empty",
            &mut engine,
            ShortWritePolicy::Fail,
        )
        .unwrap();
        assert_eq!(r.chunks, 0);
        assert!(engine.variables.is_empty());
    }

    #[test]
    fn truncated_file_is_an_error_not_a_hang() {
        let mut file = Cursor::new(vec![1u8; 100]);
        let mut engine = RecordingEngine::new();
        let err = make_whole_file_symbolic(
            &mut file,
            200,
            bs(64),
            "t",
            &mut engine,
            ShortWritePolicy::Fail,
        )
        .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Read);
        assert!(err.to_string().contains("100"), "{err}");
        assert_eq!(engine.variables.len(), 2);
        assert_eq!(engine.variables[1].len, 36);
    }
}
