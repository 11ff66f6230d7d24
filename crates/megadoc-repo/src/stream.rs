//! Chunked, incrementally decoded reads.

use std::io::{ErrorKind, Read};

use megadoc_core::{MegaDocError, Result, StreamDecoder};

/// Boxed chunk iterator returned by repositories.
pub type ChunkStream = Box<dyn Iterator<Item = Result<String>> + Send>;

/// Iterator over decoded chunks of a reader.
///
/// Each step reads up to `chunk_size` bytes. Multi-byte sequences split across
/// chunk boundaries are carried over by the decoder. The stream is not
/// resumable: after an I/O error it ends.
pub struct FileChunks<R> {
    reader: R,
    buf: Vec<u8>,
    decoder: StreamDecoder,
    label: String,
    done: bool,
}

impl<R: Read> FileChunks<R> {
    /// Wrap `reader`. `label` names the source in errors.
    pub fn new(reader: R, chunk_size: usize, decoder: StreamDecoder, label: impl Into<String>) -> Self {
        Self {
            reader,
            buf: vec![0; chunk_size.max(1)],
            decoder,
            label: label.into(),
            done: false,
        }
    }

    /// Whether decoding switched to the permissive fallback.
    pub fn is_fallback(&self) -> bool {
        self.decoder.is_fallback()
    }

    /// Fill the buffer, stopping early only at end of input.
    fn fill(&mut self) -> std::io::Result<usize> {
        let mut filled = 0;
        while filled < self.buf.len() {
            match self.reader.read(&mut self.buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }
}

impl<R: Read> Iterator for FileChunks<R> {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            let read = match self.fill() {
                Ok(n) => n,
                Err(err) => {
                    self.done = true;
                    return Some(Err(MegaDocError::io(self.label.clone(), &err)));
                }
            };

            let last = read < self.buf.len();
            let was_fallback = self.decoder.is_fallback();
            let text = self.decoder.decode_chunk(&self.buf[..read], last);
            if !was_fallback && self.decoder.is_fallback() {
                tracing::warn!(file = %self.label, "invalid sequence in stream, switching to fallback encoding");
            }
            self.done = last;

            if !text.is_empty() {
                return Some(Ok(text));
            }
        }
        None
    }
}
