//! Look-ahead synthesis.
//!
//! A single producer task keeps up to `buffer_ahead` synthesized chunks
//! ready. Consumers either pop from that buffer or park a oneshot waiter
//! that the producer fills next. Only one production is ever in flight, so
//! no chunk is synthesized twice by concurrent callers.

use speech_client::{SynthError, Synthesizer};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tokio::sync::{Notify, oneshot};
use tokio::task::JoinHandle;

use crate::cache::{CacheKey, SynthesisCache};
use crate::text::{Chunk, Document, clean_for_speech};

/// Default number of chunks kept ready ahead of playback.
pub const DEFAULT_BUFFER_AHEAD: usize = 2;

#[derive(Error, Debug, Clone)]
pub enum PipelineError {
    #[error("End of text")]
    Exhausted,

    #[error("Cancelled")]
    Cancelled,

    #[error("Synthesis pipeline used before setup()")]
    NotInitialized,

    #[error("Speech synthesis failed: {0}")]
    Synthesis(Arc<SynthError>),

    #[error("Audio cache error: {0}")]
    Cache(String),

    #[error("Text source error: {0}")]
    Source(String),
}

/// Audio for one chunk, ready to play.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesizedChunk {
    pub text: String,
    /// PCM16 mono at the synthesizer's sample rate
    pub audio: Vec<u8>,
    pub start_word: usize,
}

type Waiter = oneshot::Sender<Result<SynthesizedChunk, PipelineError>>;

#[derive(Default)]
struct State {
    buffer: VecDeque<SynthesizedChunk>,
    waiters: VecDeque<Waiter>,
    /// Bumped by reset(); productions from an older generation are dropped
    generation: u64,
    /// Set after a failed production, cleared by next() or reset()
    stalled: bool,
    started: bool,
    attempts: u64,
}

struct Shared {
    state: Mutex<State>,
    wake: Notify,
    document: Arc<tokio::sync::Mutex<Document>>,
    synthesizer: Arc<dyn Synthesizer>,
    buffer_ahead: usize,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn has_work(&self) -> bool {
        let st = self.state();
        !st.stalled && (st.buffer.len() < self.buffer_ahead || !st.waiters.is_empty())
    }
}

pub struct SynthesisPipeline {
    shared: Arc<Shared>,
    cache: Mutex<Option<SynthesisCache>>,
    producer: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl SynthesisPipeline {
    /// Create a pipeline over `document`. Pass `None` to run without a cache.
    pub fn new(
        document: Arc<tokio::sync::Mutex<Document>>,
        synthesizer: Arc<dyn Synthesizer>,
        cache: Option<SynthesisCache>,
        buffer_ahead: usize,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State::default()),
                wake: Notify::new(),
                document,
                synthesizer,
                buffer_ahead: buffer_ahead.max(1),
            }),
            cache: Mutex::new(cache),
            producer: tokio::sync::Mutex::new(None),
        }
    }

    /// Initialize the synthesizer and start producing. Safe to call twice.
    pub async fn setup(&self) -> Result<(), PipelineError> {
        let mut producer = self.producer.lock().await;
        if producer.is_some() {
            return Ok(());
        }

        log::debug!("Initializing {} synthesizer", self.shared.synthesizer.name());
        self.shared
            .synthesizer
            .initialize()
            .await
            .map_err(|e| PipelineError::Synthesis(Arc::new(e)))?;

        let cache = self
            .cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        *producer = Some(tokio::spawn(produce(self.shared.clone(), cache)));

        self.shared.state().started = true;
        self.shared.wake.notify_one();
        Ok(())
    }

    /// Next chunk in order, waiting for it to be produced if necessary.
    pub async fn next(&self) -> Result<SynthesizedChunk, PipelineError> {
        let rx = {
            let mut st = self.shared.state();
            if !st.started {
                return Err(PipelineError::NotInitialized);
            }
            st.stalled = false;

            if let Some(chunk) = st.buffer.pop_front() {
                drop(st);
                self.shared.wake.notify_one();
                return Ok(chunk);
            }

            let (tx, rx) = oneshot::channel();
            st.waiters.push_back(tx);
            rx
        };

        self.shared.wake.notify_one();
        rx.await.unwrap_or(Err(PipelineError::Cancelled))
    }

    /// Pop a ready chunk without waiting.
    pub fn try_next(&self) -> Option<SynthesizedChunk> {
        let chunk = self.shared.state().buffer.pop_front();
        if chunk.is_some() {
            self.shared.wake.notify_one();
        }
        chunk
    }

    /// Drop everything buffered and fail pending `next()` calls with
    /// `Cancelled`. A production already running is discarded when it lands.
    pub fn reset(&self) {
        let waiters = {
            let mut st = self.shared.state();
            st.generation += 1;
            st.buffer.clear();
            st.stalled = false;
            std::mem::take(&mut st.waiters)
        };

        log::debug!("Pipeline reset, cancelling {} waiter(s)", waiters.len());
        for waiter in waiters {
            let _ = waiter.send(Err(PipelineError::Cancelled));
        }
        self.shared.wake.notify_one();
    }

    /// Chunks ready to play right now.
    pub fn buffered(&self) -> usize {
        self.shared.state().buffer.len()
    }

    #[cfg(test)]
    fn attempts(&self) -> u64 {
        self.shared.state().attempts
    }
}

impl Drop for SynthesisPipeline {
    fn drop(&mut self) {
        if let Some(handle) = self.producer.get_mut().take() {
            handle.abort();
        }
    }
}

/// Producer loop: one production at a time, woken by `Notify`.
///
/// A chunk whose synthesis failed is kept and retried on the next wake-up
/// unless a reset moved the reader somewhere else in the meantime.
async fn produce(shared: Arc<Shared>, mut cache: Option<SynthesisCache>) {
    let mut retry: Option<(u64, Chunk)> = None;

    loop {
        while !shared.has_work() {
            shared.wake.notified().await;
        }

        let current = shared.state().generation;
        let (generation, chunk) = match retry.take() {
            Some((generation, chunk)) if generation == current => (generation, chunk),
            _ => match pull_chunk(&shared).await {
                (generation, Ok(chunk)) => (generation, chunk),
                (generation, Err(e)) => {
                    deliver(&shared, generation, Err(e));
                    continue;
                }
            },
        };

        match render(&shared, cache.as_mut(), &chunk).await {
            Ok(audio) => deliver(&shared, generation, Ok(synthesized(chunk, audio))),
            Err(e) => {
                retry = Some((generation, chunk));
                deliver(&shared, generation, Err(e));
            }
        }
    }
}

/// Take the next chunk from the document, sampling the generation under its lock.
async fn pull_chunk(shared: &Shared) -> (u64, Result<Chunk, PipelineError>) {
    let mut document = shared.document.lock().await;
    let generation = {
        let mut st = shared.state();
        st.attempts += 1;
        st.generation
    };

    let result = match document.next_chunk().await {
        Ok(Some(chunk)) => Ok(chunk),
        Ok(None) => Err(PipelineError::Exhausted),
        Err(e) => Err(PipelineError::Source(e.to_string())),
    };
    (generation, result)
}

/// Audio for `chunk`, from the cache or the synthesizer.
async fn render(
    shared: &Shared,
    mut cache: Option<&mut SynthesisCache>,
    chunk: &Chunk,
) -> Result<Vec<u8>, PipelineError> {
    let synthesizer = &shared.synthesizer;
    let key = CacheKey::new(&chunk.text, synthesizer.voice(), synthesizer.sample_rate());

    if let Some(cache) = cache.as_deref_mut() {
        if let Some(audio) = cache
            .lookup(&key)
            .map_err(|e| PipelineError::Cache(e.to_string()))?
        {
            log::debug!("Cache hit for chunk {} ({})", chunk.index, key);
            return Ok(audio);
        }
    }

    let spoken = clean_for_speech(&chunk.text);
    if spoken.is_empty() {
        return Ok(Vec::new());
    }

    log::debug!("Synthesizing chunk {}: {:?}", chunk.index, spoken);
    let audio = synthesizer.synthesize(&spoken).await.map_err(|e| {
        log::warn!("Synthesis failed for chunk {}: {}", chunk.index, e);
        PipelineError::Synthesis(Arc::new(e))
    })?;

    if let Some(cache) = cache {
        if let Err(e) = cache.store(&key, &audio) {
            log::warn!("Failed to cache audio for chunk {}: {}", chunk.index, e);
        }
    }

    Ok(audio)
}

fn synthesized(chunk: Chunk, audio: Vec<u8>) -> SynthesizedChunk {
    SynthesizedChunk {
        text: chunk.text,
        audio,
        start_word: chunk.start_word,
    }
}

/// Hand a finished production to the oldest live waiter, or buffer it.
fn deliver(shared: &Shared, generation: u64, result: Result<SynthesizedChunk, PipelineError>) {
    let mut st = shared.state();
    if generation != st.generation {
        log::debug!("Dropping production from before a reset");
        return;
    }

    match result {
        Ok(chunk) => {
            let mut pending = Ok(chunk);
            let mut skipped = false;
            while let Some(waiter) = st.waiters.pop_front() {
                match waiter.send(pending) {
                    Ok(()) => return,
                    Err(back) => {
                        skipped = true;
                        pending = back;
                    }
                }
            }
            if let Ok(chunk) = pending {
                if skipped {
                    // It was owed to a caller, so it plays before anything newer
                    st.buffer.push_front(chunk);
                } else {
                    st.buffer.push_back(chunk);
                }
            }
        }
        Err(e) => {
            for waiter in st.waiters.drain(..) {
                let _ = waiter.send(Err(e.clone()));
            }
            st.stalled = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::StringSource;
    use speech_client::MockSynthesizer;
    use std::time::Duration;
    use tempfile::TempDir;

    const TEXT: &str = "Alpha one. Beta two. Gamma three. Delta four. Epsilon five. Zeta six.";

    fn document(text: &str) -> Arc<tokio::sync::Mutex<Document>> {
        Arc::new(tokio::sync::Mutex::new(Document::new(
            Box::new(StringSource::new(text)),
            0,
        )))
    }

    fn pipeline(
        text: &str,
        synth: &Arc<MockSynthesizer>,
        cache: Option<SynthesisCache>,
    ) -> SynthesisPipeline {
        SynthesisPipeline::new(document(text), synth.clone(), cache, DEFAULT_BUFFER_AHEAD)
    }

    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_next_before_setup() {
        let synth = Arc::new(MockSynthesizer::always_succeeds());
        let p = pipeline(TEXT, &synth, None);
        assert!(matches!(p.next().await, Err(PipelineError::NotInitialized)));
    }

    #[tokio::test]
    async fn test_setup_initializes_once() {
        let synth = Arc::new(MockSynthesizer::always_succeeds());
        let p = pipeline(TEXT, &synth, None);
        p.setup().await.unwrap();
        p.setup().await.unwrap();
        assert_eq!(synth.init_count(), 1);
    }

    #[tokio::test]
    async fn test_delivers_in_order() {
        let synth = Arc::new(MockSynthesizer::always_succeeds().with_samples_per_char(1));
        let p = pipeline(TEXT, &synth, None);
        p.setup().await.unwrap();

        let starts: Vec<usize> = vec![
            p.next().await.unwrap().start_word,
            p.next().await.unwrap().start_word,
            p.next().await.unwrap().start_word,
        ];
        assert_eq!(starts, vec![0, 4, 8]);
        assert!(matches!(p.next().await, Err(PipelineError::Exhausted)));
    }

    #[tokio::test]
    async fn test_fills_buffer_ahead() {
        let synth = Arc::new(MockSynthesizer::always_succeeds().with_samples_per_char(1));
        let p = pipeline(TEXT, &synth, None);
        p.setup().await.unwrap();
        settle().await;

        assert_eq!(p.buffered(), DEFAULT_BUFFER_AHEAD);
        assert_eq!(synth.call_count(), 2);

        let first = p.try_next().unwrap();
        assert_eq!(first.text, "Alpha one. Beta two.");
        settle().await;
        assert_eq!(synth.call_count(), 3);
    }

    #[tokio::test]
    async fn test_concurrent_next_on_exhausted_text() {
        let synth = Arc::new(MockSynthesizer::always_succeeds());
        let p = pipeline("", &synth, None);
        p.setup().await.unwrap();
        settle().await;
        let before = p.attempts();

        let (a, b) = tokio::join!(p.next(), p.next());
        assert!(matches!(a, Err(PipelineError::Exhausted)));
        assert!(matches!(b, Err(PipelineError::Exhausted)));
        assert_eq!(p.attempts() - before, 1);
        assert_eq!(synth.call_count(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_next_no_duplicate_synthesis() {
        let synth = Arc::new(
            MockSynthesizer::always_succeeds()
                .with_samples_per_char(1)
                .with_latency(Duration::from_millis(10)),
        );
        let p = pipeline(TEXT, &synth, None);
        p.setup().await.unwrap();

        let (a, b) = tokio::join!(p.next(), p.next());
        assert_eq!(a.unwrap().start_word, 0);
        assert_eq!(b.unwrap().start_word, 4);
        let requests = synth.requests();
        let mut unique = requests.clone();
        unique.dedup();
        assert_eq!(requests, unique);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_cancels_waiters() {
        let synth = Arc::new(MockSynthesizer::always_succeeds().with_latency(Duration::from_secs(5)));
        let p = Arc::new(pipeline(TEXT, &synth, None));
        p.setup().await.unwrap();

        let waiter = {
            let p = p.clone();
            tokio::spawn(async move { p.next().await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        p.reset();

        let result = waiter.await.unwrap();
        assert!(matches!(result, Err(PipelineError::Cancelled)));
        assert_eq!(p.buffered(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_discards_in_flight_production() {
        let synth = Arc::new(
            MockSynthesizer::always_succeeds()
                .with_samples_per_char(1)
                .with_latency(Duration::from_secs(1)),
        );
        let doc = document(TEXT);
        let p = SynthesisPipeline::new(doc.clone(), synth.clone(), None, 1);
        p.setup().await.unwrap();

        // First production is now sleeping inside the synthesizer
        tokio::time::sleep(Duration::from_millis(10)).await;
        {
            let mut doc = doc.lock().await;
            doc.rebase_at(8);
            p.reset();
        }

        let next = p.next().await.unwrap();
        assert_eq!(next.start_word, 8);
        assert_eq!(next.text, "Epsilon five. Zeta six.");
    }

    #[tokio::test]
    async fn test_failure_fails_waiters_then_recovers() {
        let synth = Arc::new(MockSynthesizer::fails_then_succeeds(1, "overloaded"));
        let p = SynthesisPipeline::new(document(TEXT), synth.clone(), None, 1);
        p.setup().await.unwrap();

        let first = p.next().await;
        assert!(matches!(first, Err(PipelineError::Synthesis(_))));
        settle().await;
        // Stalled: nothing retried until asked
        assert_eq!(synth.call_count(), 1);

        // The failed chunk is retried, not skipped
        let second = p.next().await.unwrap();
        assert_eq!(second.start_word, 0);
        assert_eq!(synth.call_count(), 2);
    }

    #[tokio::test]
    async fn test_uses_cache_and_stores() {
        let dir = TempDir::new().unwrap();
        let synth = Arc::new(MockSynthesizer::always_succeeds().with_samples_per_char(1));

        {
            let cache = SynthesisCache::open(dir.path()).unwrap();
            let p = pipeline(TEXT, &synth, Some(cache));
            p.setup().await.unwrap();
            for _ in 0..3 {
                p.next().await.unwrap();
            }
        }
        assert_eq!(synth.call_count(), 3);

        let cache = SynthesisCache::open(dir.path()).unwrap();
        let p = pipeline(TEXT, &synth, Some(cache));
        p.setup().await.unwrap();
        let replay = p.next().await.unwrap();
        assert_eq!(replay.text, "Alpha one. Beta two.");
        assert!(!replay.audio.is_empty());
        assert_eq!(synth.call_count(), 3);
    }

    #[tokio::test]
    async fn test_cache_write_failure_still_delivers() {
        let dir = TempDir::new().unwrap();
        let cache_dir = dir.path().join("cache");
        let cache = SynthesisCache::open(&cache_dir).unwrap();
        // Stores now fail: there is no directory to write the temp file in
        std::fs::remove_dir_all(&cache_dir).unwrap();

        let synth = Arc::new(MockSynthesizer::always_succeeds().with_samples_per_char(1));
        let p = pipeline(TEXT, &synth, Some(cache));
        p.setup().await.unwrap();

        let chunk = p.next().await.unwrap();
        assert_eq!(chunk.text, "Alpha one. Beta two.");
        assert!(!chunk.audio.is_empty());
        assert!(!cache_dir.exists());
        assert_eq!(p.next().await.unwrap().start_word, 4);
    }

    #[tokio::test]
    async fn test_cache_not_reused_across_sample_rates() {
        let dir = TempDir::new().unwrap();
        let at_24k = Arc::new(MockSynthesizer::always_succeeds().with_samples_per_char(1));
        {
            let p = pipeline(TEXT, &at_24k, Some(SynthesisCache::open(dir.path()).unwrap()));
            p.setup().await.unwrap();
            p.next().await.unwrap();
        }
        assert!(at_24k.call_count() >= 1);

        let at_16k = Arc::new(
            MockSynthesizer::always_succeeds()
                .with_samples_per_char(1)
                .with_sample_rate(16_000),
        );
        let p = pipeline(TEXT, &at_16k, Some(SynthesisCache::open(dir.path()).unwrap()));
        p.setup().await.unwrap();
        p.next().await.unwrap();
        // The 24 kHz entry is a miss, so the first chunk is synthesized again
        assert_eq!(
            at_16k.requests().first().map(String::as_str),
            Some("Alpha one. Beta two.")
        );
    }

    #[tokio::test]
    async fn test_cleaned_text_goes_to_synthesizer() {
        let synth = Arc::new(MockSynthesizer::always_succeeds().with_samples_per_char(1));
        let p = pipeline("\u{201c}Hi\u{2026}\u{201d} she said.", &synth, None);
        p.setup().await.unwrap();

        let chunk = p.next().await.unwrap();
        assert_eq!(chunk.text, "\u{201c}Hi\u{2026}\u{201d} she said.");
        assert_eq!(synth.requests(), vec!["\"Hi.\" she said.".to_string()]);
    }
}
