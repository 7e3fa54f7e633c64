//! Text handling: sources, sentence chunking, and speech cleanup.
//!
//! Word positions are indices into the whitespace-delimited tokens of the
//! whole accumulated text. Everything here counts words the same way.

pub mod chunker;
mod cleaner;
pub mod document;
pub mod sentences;
pub mod source;

pub use chunker::{Chunker, ChunkerError};
pub use cleaner::clean_for_speech;
pub use document::Document;
pub use sentences::{Direction, find_sentence_boundary};
pub use source::{FileSource, SourceError, StringSource, TextSource};

/// A group of consecutive sentences ready for synthesis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Position in the current chunk sequence
    pub index: usize,
    /// Sentence text, single-spaced
    pub text: String,
    /// Index of the chunk's first word in the whole text
    pub start_word: usize,
    /// Number of words in the chunk
    pub word_count: usize,
}

/// Number of whitespace-delimited words in `text`.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Byte offset where word `n` of `text` starts, if it exists.
pub fn word_offset(text: &str, n: usize) -> Option<usize> {
    let mut seen = 0;
    let mut in_word = false;

    for (i, c) in text.char_indices() {
        if c.is_whitespace() {
            in_word = false;
        } else if !in_word {
            if seen == n {
                return Some(i);
            }
            seen += 1;
            in_word = true;
        }
    }

    None
}
