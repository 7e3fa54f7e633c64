//! Incremental text sources.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs::File;
use tokio::io::AsyncReadExt;

/// Default read size for file sources.
pub const DEFAULT_SOURCE_CHUNK_BYTES: usize = 4096;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid UTF-8 in {path} near byte {offset}")]
    InvalidUtf8 { path: PathBuf, offset: u64 },
}

/// Supplies text a piece at a time.
#[async_trait]
pub trait TextSource: Send {
    /// Next piece of text, or `None` once the source is exhausted.
    async fn next_text(&mut self) -> Result<Option<String>, SourceError>;
}

/// Reads a UTF-8 file in fixed-size pieces.
///
/// A multi-byte character cut by a read boundary is carried over to the
/// next read, so pieces are always valid strings.
pub struct FileSource {
    path: PathBuf,
    file: Option<File>,
    chunk_bytes: usize,
    carry: Vec<u8>,
    offset: u64,
    done: bool,
}

impl FileSource {
    pub fn new(path: impl AsRef<Path>, chunk_bytes: usize) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            file: None,
            chunk_bytes: chunk_bytes.max(4),
            carry: Vec::new(),
            offset: 0,
            done: false,
        }
    }

    fn io_error(&self, source: std::io::Error) -> SourceError {
        SourceError::Io {
            path: self.path.clone(),
            source,
        }
    }

    /// Split `carry` into the longest valid UTF-8 prefix and keep the rest.
    fn take_valid(&mut self, at_eof: bool) -> Result<String, SourceError> {
        let valid = match std::str::from_utf8(&self.carry) {
            Ok(_) => self.carry.len(),
            Err(e) if e.error_len().is_none() && !at_eof => e.valid_up_to(),
            Err(e) => {
                return Err(SourceError::InvalidUtf8 {
                    path: self.path.clone(),
                    offset: self.offset + e.valid_up_to() as u64,
                });
            }
        };

        let rest = self.carry.split_off(valid);
        let bytes = std::mem::replace(&mut self.carry, rest);
        let start = self.offset;
        self.offset += bytes.len() as u64;
        String::from_utf8(bytes).map_err(|e| SourceError::InvalidUtf8 {
            path: self.path.clone(),
            offset: start + e.utf8_error().valid_up_to() as u64,
        })
    }
}

#[async_trait]
impl TextSource for FileSource {
    async fn next_text(&mut self) -> Result<Option<String>, SourceError> {
        if self.done {
            return Ok(None);
        }

        if self.file.is_none() {
            let file = File::open(&self.path)
                .await
                .map_err(|e| self.io_error(e))?;
            self.file = Some(file);
        }

        loop {
            let mut buf = vec![0u8; self.chunk_bytes];
            let read = match self.file.as_mut() {
                Some(file) => file.read(&mut buf).await.map_err(|source| SourceError::Io {
                    path: self.path.clone(),
                    source,
                })?,
                None => 0,
            };

            if read == 0 {
                self.done = true;
                self.file = None;
                if self.carry.is_empty() {
                    return Ok(None);
                }
                return self.take_valid(true).map(Some);
            }

            self.carry.extend_from_slice(&buf[..read]);
            let text = self.take_valid(false)?;
            if !text.is_empty() {
                return Ok(Some(text));
            }
        }
    }
}

/// In-memory source handing out preset pieces.
#[derive(Debug, Default)]
pub struct StringSource {
    pieces: VecDeque<String>,
}

impl StringSource {
    /// A source that yields `text` in one piece.
    pub fn new(text: impl Into<String>) -> Self {
        Self::from_pieces([text.into()])
    }

    /// A source that yields each piece in turn.
    pub fn from_pieces<I, S>(pieces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            pieces: pieces.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl TextSource for StringSource {
    async fn next_text(&mut self) -> Result<Option<String>, SourceError> {
        Ok(self.pieces.pop_front())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    async fn read_all(source: &mut dyn TextSource) -> Vec<String> {
        let mut pieces = Vec::new();
        while let Some(piece) = source.next_text().await.unwrap() {
            pieces.push(piece);
        }
        pieces
    }

    #[tokio::test]
    async fn test_string_source_pieces() {
        let mut source = StringSource::from_pieces(["One. ", "Two."]);
        assert_eq!(read_all(&mut source).await, vec!["One. ", "Two."]);
        assert!(source.next_text().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_file_source_reads_in_pieces() {
        let mut file = NamedTempFile::new().unwrap();
        let text = "Alpha one. Beta two. Gamma three.";
        file.write_all(text.as_bytes()).unwrap();

        let mut source = FileSource::new(file.path(), 8);
        let pieces = read_all(&mut source).await;
        assert!(pieces.len() > 1);
        assert!(pieces.iter().all(|p| p.len() <= 8));
        assert_eq!(pieces.concat(), text);
    }

    #[tokio::test]
    async fn test_file_source_keeps_multibyte_chars_whole() {
        let mut file = NamedTempFile::new().unwrap();
        let text = "ééééé ü 日本語のテキスト";
        file.write_all(text.as_bytes()).unwrap();

        let mut source = FileSource::new(file.path(), 5);
        assert_eq!(read_all(&mut source).await.concat(), text);
    }

    #[tokio::test]
    async fn test_file_source_invalid_utf8() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"ok \xff\xfe bad").unwrap();

        let mut source = FileSource::new(file.path(), 64);
        let result = source.next_text().await;
        assert!(matches!(result, Err(SourceError::InvalidUtf8 { offset: 3, .. })));
    }

    #[tokio::test]
    async fn test_file_source_missing_file() {
        let mut source = FileSource::new("/nonexistent/readalong.txt", 64);
        assert!(matches!(source.next_text().await, Err(SourceError::Io { .. })));
    }
}
