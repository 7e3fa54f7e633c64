//! Estimating which word is being spoken.
//!
//! Synthesizers here do not report word timestamps, so each word gets a
//! share of the chunk's duration proportional to its length plus one
//! separator (no separator after the last word).

use futures_util::Stream;
use futures_util::stream;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Interval, MissedTickBehavior};

use super::output::{AudioOutput, frames_to_duration};

/// Default polling period for the word stream.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(30);

/// Cumulative end time of each word within a chunk.
#[derive(Debug, Clone)]
pub struct WordTimeline {
    ends: Vec<Duration>,
}

impl WordTimeline {
    pub fn new<S: AsRef<str>>(words: &[S], total: Duration) -> Self {
        let last = words.len().saturating_sub(1);
        let weights: Vec<u64> = words
            .iter()
            .enumerate()
            .map(|(i, w)| w.as_ref().chars().count() as u64 + u64::from(i != last))
            .collect();
        let total_weight: u64 = weights.iter().sum::<u64>().max(1);

        let mut cumulative = 0u64;
        let ends = weights
            .iter()
            .map(|w| {
                cumulative += w;
                total.mul_f64(cumulative as f64 / total_weight as f64)
            })
            .collect();

        Self { ends }
    }

    pub fn len(&self) -> usize {
        self.ends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ends.is_empty()
    }

    /// Word whose window contains `elapsed`; the last word once past the end.
    pub fn index_at(&self, elapsed: Duration) -> Option<usize> {
        if self.ends.is_empty() {
            return None;
        }
        let i = self.ends.partition_point(|end| *end <= elapsed);
        Some(i.min(self.ends.len() - 1))
    }
}

struct WordClock {
    timeline: WordTimeline,
    output: Arc<dyn AudioOutput>,
    start_frame: u64,
    frames: u64,
    sample_rate: u32,
    ticks: Interval,
    last: Option<usize>,
    done: bool,
}

/// Stream of word indices (relative to the chunk) as its audio plays.
///
/// Polls the output's render clock, yields only when the index changes,
/// makes sure the final word is yielded, and ends when the audio has played.
pub(crate) fn word_stream(
    timeline: WordTimeline,
    output: Arc<dyn AudioOutput>,
    start_frame: u64,
    frames: u64,
    poll_interval: Duration,
) -> impl Stream<Item = usize> + Send + 'static {
    let mut ticks = tokio::time::interval(poll_interval.max(Duration::from_millis(1)));
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let sample_rate = output.sample_rate();

    let clock = WordClock {
        done: timeline.is_empty() || frames == 0,
        timeline,
        output,
        start_frame,
        frames,
        sample_rate,
        ticks,
        last: None,
    };

    stream::unfold(clock, |mut clock| async move {
        while !clock.done {
            clock.ticks.tick().await;

            let played = clock
                .output
                .frames_rendered()
                .saturating_sub(clock.start_frame)
                .min(clock.frames);
            let elapsed = frames_to_duration(played, clock.sample_rate);
            let finished = played >= clock.frames;

            let index = if finished {
                clock.done = true;
                clock.timeline.len() - 1
            } else {
                match clock.timeline.index_at(elapsed) {
                    Some(index) => index,
                    None => break,
                }
            };

            if clock.last.is_none_or(|last| index > last) {
                clock.last = Some(index);
                return Some((index, clock));
            }
        }
        None
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::output::VirtualOutput;
    use futures_util::StreamExt;
    use tokio::sync::oneshot;
    use tokio::time::Instant;

    #[test]
    fn test_timeline_weights() {
        let timeline = WordTimeline::new(&["Hi", "there"], Duration::from_secs(1));
        assert_eq!(timeline.ends[0], Duration::from_millis(375));
        assert_eq!(timeline.ends[1], Duration::from_secs(1));
    }

    #[test]
    fn test_index_at() {
        let timeline = WordTimeline::new(&["Hi", "there"], Duration::from_secs(1));
        assert_eq!(timeline.index_at(Duration::ZERO), Some(0));
        assert_eq!(timeline.index_at(Duration::from_millis(374)), Some(0));
        assert_eq!(timeline.index_at(Duration::from_millis(375)), Some(1));
        assert_eq!(timeline.index_at(Duration::from_secs(5)), Some(1));
    }

    #[test]
    fn test_empty_timeline() {
        let timeline = WordTimeline::new::<&str>(&[], Duration::from_secs(1));
        assert!(timeline.is_empty());
        assert_eq!(timeline.index_at(Duration::ZERO), None);
    }

    fn schedule(output: &Arc<VirtualOutput>, frames: usize) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        output.schedule(vec![0.0; frames], tx).unwrap();
        rx
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_tracks_playback() {
        let output = Arc::new(VirtualOutput::new(1_000));
        let _done = schedule(&output, 1_000);
        let timeline = WordTimeline::new(&["Hi", "there"], Duration::from_secs(1));

        let start = Instant::now();
        let seen: Vec<(usize, Duration)> =
            word_stream(timeline, output.clone(), 0, 1_000, DEFAULT_POLL_INTERVAL)
                .map(|i| (i, start.elapsed()))
                .collect()
                .await;

        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], (0, Duration::ZERO));
        assert_eq!(seen[1].0, 1);
        assert!(seen[1].1 >= Duration::from_millis(375));
        assert!(seen[1].1 <= Duration::from_millis(375) + DEFAULT_POLL_INTERVAL);
        assert!(start.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_yields_skipped_last_word() {
        let output = Arc::new(VirtualOutput::new(1_000));
        let _done = schedule(&output, 100);
        let words = ["a", "b", "c", "d", "e", "f"];
        let timeline = WordTimeline::new(&words, Duration::from_millis(100));

        // Poll slower than the words go by
        let seen: Vec<usize> =
            word_stream(timeline, output.clone(), 0, 100, Duration::from_millis(70))
                .collect()
                .await;

        assert_eq!(seen.first(), Some(&0));
        assert_eq!(seen.last(), Some(&5));
        assert!(seen.windows(2).all(|w| w[0] < w[1]));
        assert!(seen.len() < words.len());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_waits_for_its_own_audio() {
        let output = Arc::new(VirtualOutput::new(1_000));
        let _first = schedule(&output, 500);
        let _second = schedule(&output, 500);
        let timeline = WordTimeline::new(&["one", "two"], Duration::from_millis(500));

        let start = Instant::now();
        let seen: Vec<(usize, Duration)> =
            word_stream(timeline, output.clone(), 500, 500, DEFAULT_POLL_INTERVAL)
                .map(|i| (i, start.elapsed()))
                .collect()
                .await;

        assert_eq!(seen[0].0, 0);
        assert_eq!(seen[1].0, 1);
        assert!(seen[1].1 >= Duration::from_millis(500 + 250));
        assert!(start.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_empty_cases() {
        let output = Arc::new(VirtualOutput::new(1_000));
        let empty = WordTimeline::new::<&str>(&[], Duration::from_secs(1));
        let none: Vec<usize> = word_stream(empty, output.clone(), 0, 1_000, DEFAULT_POLL_INTERVAL)
            .collect()
            .await;
        assert!(none.is_empty());

        let silent = WordTimeline::new(&["hi"], Duration::ZERO);
        let none: Vec<usize> = word_stream(silent, output.clone(), 0, 0, DEFAULT_POLL_INTERVAL)
            .collect()
            .await;
        assert!(none.is_empty());
    }
}
