use crate::error::InferenceError;
use crate::protocol::ChatChunk;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("undecodable stream record {line:?}: {source}")]
pub struct DecodeError {
    pub line: String,
    #[source]
    pub source: serde_json::Error,
}

impl From<DecodeError> for InferenceError {
    fn from(err: DecodeError) -> Self {
        InferenceError::Protocol(err.to_string())
    }
}

/// Turns an arbitrarily chunked NDJSON body into [`ChatChunk`] records.
///
/// Bytes after the last newline are held until the next chunk (or
/// [`StreamDecoder::finish`]) completes the record. Once a record with
/// `done: true` has been produced everything that follows is ignored.
#[derive(Debug, Default)]
pub struct StreamDecoder {
    buffer: Vec<u8>,
    /// Bytes at the front of `buffer` already known to hold no newline.
    scanned: usize,
    done: bool,
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once the terminal record has been decoded.
    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<ChatChunk>, DecodeError> {
        let mut records = Vec::new();
        if self.done {
            return Ok(records);
        }

        self.buffer.extend_from_slice(chunk);

        while let Some(offset) = self.buffer[self.scanned..].iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=self.scanned + offset).collect();
            self.scanned = 0;
            if let Some(record) = self.decode_line(&line)? {
                records.push(record);
                if self.done {
                    self.buffer.clear();
                    break;
                }
            }
        }
        self.scanned = self.buffer.len();

        Ok(records)
    }

    /// Flushes a trailing record that was not newline-terminated.
    pub fn finish(&mut self) -> Result<Option<ChatChunk>, DecodeError> {
        if self.done {
            self.buffer.clear();
            return Ok(None);
        }
        let rest = std::mem::take(&mut self.buffer);
        self.scanned = 0;
        self.decode_line(&rest)
    }

    fn decode_line(&mut self, line: &[u8]) -> Result<Option<ChatChunk>, DecodeError> {
        let line = line.trim_ascii();
        if line.is_empty() {
            return Ok(None);
        }

        let record: ChatChunk = serde_json::from_slice(line).map_err(|source| DecodeError {
            line: String::from_utf8_lossy(line).into_owned(),
            source,
        })?;
        self.done = record.done;
        Ok(Some(record))
    }
}
