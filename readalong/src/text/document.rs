//! The text being read: everything loaded so far plus the chunker over it.

use super::sentences::{Direction, find_sentence_boundary};
use super::source::{SourceError, TextSource};
use super::{Chunk, Chunker, word_count};

/// Default number of ready chunks below which more text is loaded.
pub const DEFAULT_LOAD_MORE_THRESHOLD: usize = 20;

pub struct Document {
    text: String,
    chunker: Chunker,
    source: Box<dyn TextSource>,
    source_done: bool,
    load_more_threshold: usize,
}

impl Document {
    pub fn new(source: Box<dyn TextSource>, load_more_threshold: usize) -> Self {
        Self {
            text: String::new(),
            chunker: Chunker::new(),
            source,
            source_done: false,
            load_more_threshold,
        }
    }

    /// All text loaded so far.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Words loaded so far.
    pub fn word_count(&self) -> usize {
        word_count(&self.text)
    }

    /// True once the source has reported its end.
    pub fn is_source_done(&self) -> bool {
        self.source_done
    }

    /// Pull one more piece from the source.
    ///
    /// Returns false when the source had nothing left.
    pub async fn load_more(&mut self) -> Result<bool, SourceError> {
        if self.source_done {
            return Ok(false);
        }

        match self.source.next_text().await? {
            Some(piece) => {
                log::debug!("Loaded {} bytes of text", piece.len());
                self.text.push_str(&piece);
                self.chunker.append(&piece);
                Ok(true)
            }
            None => {
                log::debug!("Text source finished ({} words)", self.word_count());
                self.source_done = true;
                self.chunker.finish();
                Ok(false)
            }
        }
    }

    /// Next chunk to synthesize, loading text as needed.
    ///
    /// `None` means the chunker is empty and the source is finished.
    pub async fn next_chunk(&mut self) -> Result<Option<Chunk>, SourceError> {
        if !self.source_done && self.chunker.remaining() < self.load_more_threshold {
            self.load_more().await?;
        }

        while self.chunker.remaining() == 0 && !self.source_done {
            self.load_more().await?;
        }

        Ok(self.chunker.next().ok())
    }

    /// Restart chunking at `word` of the loaded text.
    pub fn rebase_at(&mut self, word: usize) {
        self.chunker.rebase_from(&self.text, word);
    }

    /// Nearest sentence start before or after `word`.
    pub fn sentence_boundary(&self, word: usize, direction: Direction) -> Option<usize> {
        find_sentence_boundary(&self.text, word, direction)
    }
}
