//! Sentence segmentation and sentence-boundary search.
//!
//! Sentences come from the UAX #29 boundary rules. A boundary that would
//! land inside a whitespace-delimited word is ignored, so word counts of the
//! pieces always add up to the word count of the whole text.

use std::iter::Peekable;
use unicode_segmentation::{USentenceBoundIndices, UnicodeSegmentation};

/// Which way to look for the next sentence start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Backward,
    Forward,
}

/// One sentence of a larger text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sentence<'a> {
    /// Raw slice of the source text, including trailing whitespace
    pub raw: &'a str,
    /// Byte offset of `raw` within the source text
    pub byte_start: usize,
    /// Index of the sentence's first word within the source text
    pub start_word: usize,
    /// Number of whitespace-delimited words
    pub word_count: usize,
}

impl Sentence<'_> {
    /// Sentence text ready for chunking: trimmed, line breaks as spaces.
    pub fn text(&self) -> String {
        self.raw
            .trim()
            .chars()
            .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
            .collect()
    }
}

/// Lazy iterator over the non-empty sentences of a text.
pub struct Sentences<'a> {
    text: &'a str,
    bounds: Peekable<USentenceBoundIndices<'a>>,
    next_word: usize,
}

impl<'a> Sentences<'a> {
    /// Segment `text`, numbering words from `first_word`.
    pub fn new(text: &'a str, first_word: usize) -> Self {
        Self {
            text,
            bounds: text.split_sentence_bound_indices().peekable(),
            next_word: first_word,
        }
    }
}

impl<'a> Iterator for Sentences<'a> {
    type Item = Sentence<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (start, piece) = self.bounds.next()?;
            let mut end = start + piece.len();

            while let Some(&(next_start, next_piece)) = self.bounds.peek() {
                if !inside_word(self.text, next_start) {
                    break;
                }
                end = next_start + next_piece.len();
                self.bounds.next();
            }

            let raw = &self.text[start..end];
            let word_count = raw.split_whitespace().count();
            if word_count == 0 {
                continue;
            }

            let sentence = Sentence {
                raw,
                byte_start: start,
                start_word: self.next_word,
                word_count,
            };
            self.next_word += word_count;
            return Some(sentence);
        }
    }
}

/// True when byte offset `at` sits between two non-whitespace characters.
fn inside_word(text: &str, at: usize) -> bool {
    let before = text[..at].chars().next_back();
    let after = text[at..].chars().next();
    matches!((before, after), (Some(b), Some(a)) if !b.is_whitespace() && !a.is_whitespace())
}

/// Find the word index of the nearest sentence start strictly before or
/// after `word_index`.
///
/// Backward from the middle of a sentence lands on that sentence's start;
/// from a sentence's first word it lands on the previous sentence. The scan
/// stops as soon as the answer is known.
pub fn find_sentence_boundary(
    text: &str,
    word_index: usize,
    direction: Direction,
) -> Option<usize> {
    let mut starts = Sentences::new(text, 0).map(|s| s.start_word);

    match direction {
        Direction::Forward => starts.find(|&start| start > word_index),
        Direction::Backward => {
            let mut best = None;
            for start in starts {
                if start >= word_index {
                    break;
                }
                best = Some(start);
            }
            best
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEXT: &str = "Alpha one. Beta two. Gamma three. Delta four.";

    #[test]
    fn test_sentences_have_word_offsets() {
        let sentences: Vec<_> = Sentences::new(TEXT, 0).collect();
        assert_eq!(sentences.len(), 4);
        assert_eq!(
            sentences.iter().map(|s| s.start_word).collect::<Vec<_>>(),
            vec![0, 2, 4, 6]
        );
        assert_eq!(sentences[1].text(), "Beta two.");
        assert_eq!(sentences[2].byte_start, TEXT.find("Gamma").unwrap());
    }

    #[test]
    fn test_first_word_offset() {
        let first = Sentences::new("One two. Three.", 10).next().unwrap();
        assert_eq!(first.start_word, 10);
        assert_eq!(first.word_count, 2);
    }

    #[test]
    fn test_newlines_become_spaces() {
        let sentences: Vec<_> = Sentences::new("Line one\ncontinues here. Next.", 0).collect();
        assert_eq!(sentences[0].text(), "Line one continues here.");
    }

    #[test]
    fn test_whitespace_only_pieces_dropped() {
        let sentences: Vec<_> = Sentences::new("  \n\n  ", 0).collect();
        assert!(sentences.is_empty());
    }

    #[test]
    fn test_no_boundary_inside_word() {
        let text = "He said \"Stop.\"Then left. Ok.";
        let total: usize = Sentences::new(text, 0).map(|s| s.word_count).sum();
        assert_eq!(total, text.split_whitespace().count());
    }

    #[test]
    fn test_boundary_backward_mid_sentence() {
        assert_eq!(find_sentence_boundary(TEXT, 5, Direction::Backward), Some(4));
    }

    #[test]
    fn test_boundary_backward_at_sentence_start() {
        assert_eq!(find_sentence_boundary(TEXT, 4, Direction::Backward), Some(2));
    }

    #[test]
    fn test_boundary_backward_at_start() {
        assert_eq!(find_sentence_boundary(TEXT, 0, Direction::Backward), None);
        assert_eq!(find_sentence_boundary(TEXT, 1, Direction::Backward), Some(0));
    }

    #[test]
    fn test_boundary_forward() {
        assert_eq!(find_sentence_boundary(TEXT, 0, Direction::Forward), Some(2));
        assert_eq!(find_sentence_boundary(TEXT, 3, Direction::Forward), Some(4));
        assert_eq!(find_sentence_boundary(TEXT, 6, Direction::Forward), None);
    }

    #[test]
    fn test_boundary_empty_text() {
        assert_eq!(find_sentence_boundary("", 0, Direction::Forward), None);
        assert_eq!(find_sentence_boundary("", 3, Direction::Backward), None);
    }
}
