//! Incremental sentence-pair chunking.
//!
//! Text arrives in pieces. Complete sentences are grouped two at a time into
//! chunks; the last sentence of the text seen so far is held back until more
//! text arrives or the source is finished, because it may still be growing.

use std::collections::VecDeque;
use thiserror::Error;

use super::sentences::Sentences;
use super::{Chunk, word_offset};

/// Sentences per chunk.
const SENTENCES_PER_CHUNK: usize = 2;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChunkerError {
    #[error("No chunk available")]
    Exhausted,
}

/// A sentence that has been cut but not yet placed in a chunk.
#[derive(Debug, Clone)]
struct Pending {
    text: String,
    start_word: usize,
    count: usize,
    sentences: usize,
}

#[derive(Debug, Default)]
pub struct Chunker {
    /// Raw text not yet cut into sentences
    tail: String,
    /// Word index of the first word in `tail`
    tail_word: usize,
    /// Sentences waiting for a partner
    group: Option<Pending>,
    ready: VecDeque<Chunk>,
    next_index: usize,
    finished: bool,
}

impl Chunker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add more source text.
    pub fn append(&mut self, text: &str) {
        self.tail.push_str(text);
        self.cut();
    }

    /// Mark the source as complete and release everything held back.
    pub fn finish(&mut self) {
        self.finished = true;
        self.cut();
        self.flush_group();
    }

    /// Whether `finish` has been called.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Take the next chunk.
    pub fn next(&mut self) -> Result<Chunk, ChunkerError> {
        self.ready.pop_front().ok_or(ChunkerError::Exhausted)
    }

    /// Chunks ready to be taken.
    pub fn remaining(&self) -> usize {
        self.ready.len()
    }

    /// Restart chunking from the word after `after_word` in `full_text`.
    pub fn rebase(&mut self, full_text: &str, after_word: usize) {
        self.rebase_from(full_text, after_word + 1);
    }

    /// Restart chunking at word `start_word` of `full_text`.
    ///
    /// Everything queued is dropped and chunk numbering starts over at zero.
    pub fn rebase_from(&mut self, full_text: &str, start_word: usize) {
        let offset = word_offset(full_text, start_word).unwrap_or(full_text.len());

        self.ready.clear();
        self.group = None;
        self.next_index = 0;
        self.tail = full_text[offset..].to_string();
        self.tail_word = start_word;

        self.cut();
        if self.finished {
            self.flush_group();
        }
    }

    /// Move complete sentences from `tail` into chunks.
    fn cut(&mut self) {
        let mut complete: Vec<Pending> = Vec::new();
        let mut held_from = None;

        let mut sentences = Sentences::new(&self.tail, self.tail_word).peekable();
        while let Some(sentence) = sentences.next() {
            if sentences.peek().is_none() && !self.finished {
                held_from = Some((sentence.byte_start, sentence.start_word));
                break;
            }
            complete.push(Pending {
                text: sentence.text(),
                start_word: sentence.start_word,
                count: sentence.word_count,
                sentences: 1,
            });
        }

        match held_from {
            Some((byte_start, start_word)) => {
                self.tail.drain(..byte_start);
                self.tail_word = start_word;
            }
            None => {
                self.tail_word += complete.iter().map(|s| s.count).sum::<usize>();
                self.tail.clear();
            }
        }

        for sentence in complete {
            self.push_sentence(sentence);
        }
    }

    fn push_sentence(&mut self, sentence: Pending) {
        let group = match self.group.take() {
            None => sentence,
            Some(mut group) => {
                group.text.push(' ');
                group.text.push_str(&sentence.text);
                group.count += sentence.count;
                group.sentences += sentence.sentences;
                group
            }
        };

        if group.sentences >= SENTENCES_PER_CHUNK {
            self.emit(group);
        } else {
            self.group = Some(group);
        }
    }

    fn flush_group(&mut self) {
        if let Some(group) = self.group.take() {
            self.emit(group);
        }
    }

    fn emit(&mut self, group: Pending) {
        self.ready.push_back(Chunk {
            index: self.next_index,
            text: group.text,
            start_word: group.start_word,
            word_count: group.count,
        });
        self.next_index += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const TEXT: &str = "Alpha one. Beta two. Gamma three. Delta four. Epsilon five. Zeta six.";

    fn drain(chunker: &mut Chunker) -> Vec<Chunk> {
        std::iter::from_fn(|| chunker.next().ok()).collect()
    }

    fn finished(text: &str) -> Chunker {
        let mut chunker = Chunker::new();
        chunker.append(text);
        chunker.finish();
        chunker
    }

    #[test]
    fn test_pairs_sentences() {
        let chunks = drain(&mut finished(TEXT));
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].text, "Alpha one. Beta two.");
        assert_eq!(chunks[1].text, "Gamma three. Delta four.");
        assert_eq!(chunks[2].text, "Epsilon five. Zeta six.");
        assert_eq!(
            chunks.iter().map(|c| c.start_word).collect::<Vec<_>>(),
            vec![0, 4, 8]
        );
        assert_eq!(
            chunks.iter().map(|c| c.index).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
    }

    #[test]
    fn test_odd_sentence_count() {
        let chunks = drain(&mut finished("One. Two. Three."));
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].text, "Three.");
        assert_eq!(chunks[1].start_word, 2);
    }

    #[test]
    fn test_empty_input() {
        let mut chunker = finished("   \n  ");
        assert_eq!(chunker.next(), Err(ChunkerError::Exhausted));
        assert_eq!(chunker.remaining(), 0);
    }

    #[test]
    fn test_holds_back_until_finished() {
        let mut chunker = Chunker::new();
        chunker.append("One. Two. Thr");
        // "Thr" may still grow, and "One. Two." is a complete pair
        assert_eq!(chunker.remaining(), 1);
        assert_eq!(chunker.next().unwrap().text, "One. Two.");

        chunker.append("ee. Four.");
        // "Three." waits for its partner, "Four." may still grow
        assert_eq!(chunker.next(), Err(ChunkerError::Exhausted));

        chunker.finish();
        let chunk = chunker.next().unwrap();
        assert_eq!(chunk.text, "Three. Four.");
        assert_eq!(chunk.start_word, 2);
    }

    #[test]
    fn test_word_split_across_appends() {
        let mut chunker = Chunker::new();
        chunker.append("Hello wor");
        chunker.append("ld. Bye now.");
        chunker.finish();
        let chunks = drain(&mut chunker);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Hello world. Bye now.");
        assert_eq!(chunks[0].word_count, 4);
    }

    #[test]
    fn test_rebase_after_word() {
        let mut chunker = finished(TEXT);
        chunker.next().unwrap();

        chunker.rebase(TEXT, 3);
        let chunks = drain(&mut chunker);
        assert_eq!(chunks[0].index, 0);
        assert_eq!(chunks[0].start_word, 4);
        assert_eq!(chunks[0].text, "Gamma three. Delta four.");
        assert_eq!(chunks.len(), 2);
    }

    #[test]
    fn test_rebase_mid_sentence() {
        let mut chunker = finished(TEXT);
        chunker.rebase_from(TEXT, 5);
        let chunks = drain(&mut chunker);
        assert_eq!(chunks[0].text, "three. Delta four.");
        assert_eq!(chunks[0].start_word, 5);
    }

    #[test]
    fn test_rebase_past_end() {
        let mut chunker = finished(TEXT);
        chunker.rebase_from(TEXT, 100);
        assert_eq!(chunker.next(), Err(ChunkerError::Exhausted));
    }

    #[test]
    fn test_rebase_before_finish_holds_back() {
        let mut chunker = Chunker::new();
        chunker.append(TEXT);
        chunker.rebase_from(TEXT, 8);
        // "Epsilon five." waits for a partner, "Zeta six." is held back
        assert_eq!(chunker.remaining(), 0);
        chunker.finish();
        assert_eq!(chunker.next().unwrap().start_word, 8);
    }

    fn words_of(chunks: &[Chunk]) -> Vec<String> {
        chunks
            .iter()
            .flat_map(|c| c.text.split_whitespace().map(str::to_string))
            .collect()
    }

    proptest! {
        #[test]
        fn prop_chunks_reproduce_words(
            sentences in prop::collection::vec("[A-Z][a-z]{0,6}( [a-z]{1,6}){0,4}[.!?]", 0..12),
            seps in prop::collection::vec("( |\n|  )", 12),
        ) {
            let mut text = String::new();
            for (i, s) in sentences.iter().enumerate() {
                text.push_str(s);
                text.push_str(&seps[i]);
            }

            let chunks = drain(&mut finished(&text));
            let expected: Vec<String> = text.split_whitespace().map(str::to_string).collect();
            prop_assert_eq!(words_of(&chunks), expected);

            let mut next_word = 0;
            for chunk in &chunks {
                prop_assert_eq!(chunk.start_word, next_word);
                next_word += chunk.text.split_whitespace().count();
            }
        }

        #[test]
        fn prop_append_split_matches_whole(
            sentences in prop::collection::vec("[A-Z][a-z]{0,6}( [a-z]{1,6}){0,3}\\.", 1..10),
            cut in 0usize..200,
        ) {
            let text = sentences.join(" ");
            let cut = text
                .char_indices()
                .map(|(i, _)| i)
                .nth(cut % text.chars().count().max(1))
                .unwrap_or(0);

            let mut pieces = Chunker::new();
            pieces.append(&text[..cut]);
            pieces.append(&text[cut..]);
            pieces.finish();

            prop_assert_eq!(drain(&mut pieces), drain(&mut finished(&text)));
        }

        #[test]
        fn prop_rebase_reproduces_suffix(
            sentences in prop::collection::vec("[A-Z][a-z]{0,6}( [a-z]{1,6}){0,3}\\.", 1..10),
            after in 0usize..40,
        ) {
            let text = sentences.join(" ");
            let mut chunker = finished(&text);
            chunker.rebase(&text, after);

            let expected: Vec<String> = text
                .split_whitespace()
                .skip(after + 1)
                .map(str::to_string)
                .collect();
            prop_assert_eq!(words_of(&drain(&mut chunker)), expected);
        }
    }
}
