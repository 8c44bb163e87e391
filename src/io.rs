//! Bridges between pipelines and `std::io`.

use crate::chunk::{Chunk, Encoding};
use crate::completion::Completion;
use crate::error::Result;
use crate::stream::Stage;
use crate::writable::{Sink, Writable};
use std::cell::RefCell;
use std::io::{ErrorKind, Read, Write};
use std::rc::Rc;

/// A [`Sink`] that writes every chunk to an underlying writer.
///
/// Chunks are written as bytes (`Chunk::into_bytes`) and the writer is
/// flushed after each chunk. I/O failures complete the write with
/// `Error::Io`.
pub struct IoSink<W: Write> {
    writer: RefCell<W>,
}

impl<W: Write> IoSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: RefCell::new(writer),
        }
    }

    // The borrow ends before `done` runs, so callbacks may write again.
    fn write_chunk(&self, chunk: Chunk) -> Result<()> {
        let bytes = chunk.into_bytes()?;
        let mut writer = self.writer.borrow_mut();
        writer.write_all(&bytes)?;
        writer.flush()?;
        Ok(())
    }
}

impl<W: Write + 'static> IoSink<W> {
    /// Wraps the sink in a `Writable` stage.
    pub fn into_writable(self) -> Rc<Writable> {
        Writable::with_sink(self)
    }
}

impl<W: Write> Sink for IoSink<W> {
    fn write(&self, chunk: Chunk, _encoding: Option<Encoding>, done: Completion) -> Result<()> {
        match self.write_chunk(chunk) {
            Ok(()) => done.done(),
            Err(err) => {
                tracing::debug!(error = %err, "sink write failed");
                done.fail(err)
            }
        }
    }
}

/// Reads `reader` to exhaustion, writing each read as a `Chunk::Bytes`
/// of at most `chunk_size` bytes into `stage`, then ends the stage.
///
/// Returns the number of bytes pumped. Read errors are returned directly
/// and leave the stage un-ended.
pub fn pump<R, S>(mut reader: R, stage: &S, chunk_size: usize) -> Result<u64>
where
    R: Read,
    S: Stage + ?Sized,
{
    let mut buffer = vec![0u8; chunk_size.max(1)];
    let mut total = 0u64;
    loop {
        let n = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        total += n as u64;
        stage.write(Chunk::Bytes(buffer[..n].to_vec()), None, None)?;
    }
    tracing::debug!(bytes = total, "source exhausted, ending stage");
    stage.end()?;
    Ok(total)
}
