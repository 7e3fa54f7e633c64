//! Reading session: drives the pipeline and playback engine, tracks the
//! spoken word, and handles pause, seek and restart.

mod types;

pub use types::{ReadingState, ReadingStatus};

use futures_util::StreamExt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;

use crate::pipeline::{PipelineError, SynthesisPipeline, SynthesizedChunk};
use crate::playback::{PlaybackEngine, PlaybackError};
use crate::text::{Direction, Document, SourceError};

struct Inner {
    document: Arc<Mutex<Document>>,
    pipeline: SynthesisPipeline,
    engine: PlaybackEngine,
    state: watch::Sender<ReadingState>,
    /// The pipeline no longer lines up with `current_word_index`
    stale: AtomicBool,
}

impl Inner {
    fn update(&self, f: impl FnOnce(&mut ReadingState)) {
        self.state.send_modify(f);
    }

    fn set_status(&self, status: ReadingStatus) {
        self.state.send_if_modified(|s| {
            let changed = s.status != status;
            s.status = status;
            changed
        });
    }

    fn set_word(&self, word: usize) {
        self.state.send_if_modified(|s| {
            let changed = s.current_word_index != word;
            s.current_word_index = word;
            changed
        });
    }

    fn status(&self) -> ReadingStatus {
        self.state.borrow().status
    }

    fn current_word(&self) -> usize {
        self.state.borrow().current_word_index
    }

    /// Throw away everything prepared and chunk again from `word`.
    async fn reposition(&self, word: usize) {
        let mut document = self.document.lock().await;
        document.rebase_at(word);
        // Under the document lock so the producer never mixes old and new chunks
        self.pipeline.reset();
        drop(document);

        self.stale.store(false, Ordering::SeqCst);
        self.set_word(word);
    }

    /// Play one synthesized chunk, publishing words as they are spoken.
    async fn play_chunk(&self, chunk: SynthesizedChunk) -> Result<(), PlaybackError> {
        self.update(|s| {
            s.status = ReadingStatus::Reading;
            s.current_word_index = chunk.start_word;
        });

        let scheduled = self.engine.schedule(&chunk.audio)?;
        let words: Vec<&str> = chunk.text.split_whitespace().collect();
        let spoken = self
            .engine
            .word_stream(&words, &scheduled)
            .for_each(|i| {
                self.set_word(chunk.start_word + i);
                futures_util::future::ready(())
            });

        let (played, ()) = tokio::join!(scheduled.finished(), spoken);
        played
    }

    fn finish(&self, error: PipelineError) {
        match error {
            PipelineError::Exhausted => {
                log::info!("Reached the end of the text");
                self.set_status(ReadingStatus::Restartable);
            }
            PipelineError::Cancelled => self.set_status(ReadingStatus::Idle),
            other => {
                log::error!("Reading stopped: {}", other);
                self.update(|s| {
                    s.status = ReadingStatus::Idle;
                    s.error_message = Some(other.to_string());
                });
            }
        }
    }
}

async fn play_loop(inner: Arc<Inner>) {
    loop {
        let chunk = match inner.pipeline.try_next() {
            Some(chunk) => chunk,
            None => {
                inner.set_status(ReadingStatus::Loading);
                match inner.pipeline.next().await {
                    Ok(chunk) => chunk,
                    Err(e) => return inner.finish(e),
                }
            }
        };

        log::debug!("Playing chunk at word {}", chunk.start_word);
        match inner.play_chunk(chunk).await {
            Ok(()) => {}
            // Someone called stop(); whoever did owns the state now
            Err(PlaybackError::Stopped) => return,
            Err(e) => {
                log::error!("Playback failed: {}", e);
                inner.stale.store(true, Ordering::SeqCst);
                inner.update(|s| {
                    s.status = ReadingStatus::Idle;
                    s.error_message = Some(e.to_string());
                });
                return;
            }
        }
    }
}

/// One document being read aloud.
pub struct ReadingSession {
    inner: Arc<Inner>,
    play_task: Mutex<Option<JoinHandle<()>>>,
}

impl ReadingSession {
    pub fn new(
        document: Arc<Mutex<Document>>,
        pipeline: SynthesisPipeline,
        engine: PlaybackEngine,
    ) -> Self {
        let (state, _) = watch::channel(ReadingState::default());
        Self {
            inner: Arc::new(Inner {
                document,
                pipeline,
                engine,
                state,
                stale: AtomicBool::new(false),
            }),
            play_task: Mutex::new(None),
        }
    }

    /// Prepare the synthesizer and start synthesizing ahead.
    pub async fn setup(&self) -> Result<(), PipelineError> {
        self.inner.update(|s| {
            s.status = ReadingStatus::Preparing;
            s.error_message = None;
        });

        let result = self.prepare().await;
        self.inner.update(|s| {
            s.status = ReadingStatus::Idle;
            if let Err(e) = &result {
                s.error_message = Some(e.to_string());
            }
        });
        result
    }

    async fn prepare(&self) -> Result<(), PipelineError> {
        {
            // Have something to seek within before the first chunk is pulled
            let mut document = self.inner.document.lock().await;
            if document.word_count() == 0 && !document.is_source_done() {
                document
                    .load_more()
                    .await
                    .map_err(|e| PipelineError::Source(e.to_string()))?;
            }
        }
        self.inner.pipeline.setup().await
    }

    /// Pause if reading, otherwise start (from the top once finished).
    pub async fn toggle_auto_read(&self) {
        match self.inner.status() {
            ReadingStatus::Reading | ReadingStatus::Loading => self.cancel().await,
            ReadingStatus::Idle => self.start().await,
            ReadingStatus::Restartable => {
                self.restart().await;
                self.start().await;
            }
            ReadingStatus::Preparing => log::debug!("Still preparing, ignoring toggle"),
        }
    }

    async fn start(&self) {
        if self.inner.stale.load(Ordering::SeqCst) {
            // Resume at the start of the sentence being read
            let current = self.inner.current_word();
            let from = self
                .inner
                .document
                .lock()
                .await
                .sentence_boundary(current + 1, Direction::Backward)
                .unwrap_or(0);
            self.inner.reposition(from).await;
        }

        self.inner.update(|s| s.error_message = None);
        self.spawn_play_loop().await;
    }

    async fn spawn_play_loop(&self) {
        let mut task = self.play_task.lock().await;
        *task = Some(tokio::spawn(play_loop(self.inner.clone())));
    }

    /// Abort the play task and wait for it to go away.
    async fn stop_play_task(&self) -> bool {
        let Some(task) = self.play_task.lock().await.take() else {
            return false;
        };
        let was_running = !task.is_finished();
        task.abort();
        let _ = task.await;
        was_running
    }

    /// Stop reading. The position is kept.
    pub async fn cancel(&self) {
        if self.stop_play_task().await {
            self.inner.stale.store(true, Ordering::SeqCst);
        }
        self.inner.engine.stop();

        if self.inner.status().is_active() {
            self.inner.set_status(ReadingStatus::Idle);
        }
    }

    /// Go back to the first word.
    pub async fn restart(&self) {
        self.cancel().await;
        self.inner.reposition(0).await;
        self.inner.update(|s| {
            s.status = ReadingStatus::Idle;
            s.error_message = None;
        });
    }

    /// Jump to the previous or next sentence start. Reading continues from
    /// there if it was active.
    pub async fn skip(&self, direction: Direction) {
        let current = self.inner.current_word();
        let target = self
            .inner
            .document
            .lock()
            .await
            .sentence_boundary(current, direction);
        let Some(target) = target else {
            log::debug!("No sentence {:?} of word {}", direction, current);
            return;
        };

        log::debug!("Skipping {:?} from word {} to {}", direction, current, target);
        match self.inner.status() {
            ReadingStatus::Reading | ReadingStatus::Loading => {
                self.stop_play_task().await;
                self.inner.engine.stop();
                self.inner.reposition(target).await;
                self.spawn_play_loop().await;
            }
            ReadingStatus::Restartable => {
                // There is text ahead again
                self.inner.stale.store(true, Ordering::SeqCst);
                self.inner.update(|s| {
                    s.status = ReadingStatus::Idle;
                    s.current_word_index = target;
                });
            }
            ReadingStatus::Idle | ReadingStatus::Preparing => {
                self.inner.stale.store(true, Ordering::SeqCst);
                self.inner.set_word(target);
            }
        }
    }

    /// Move to `word`, loading text up to it first. Reading, if active,
    /// continues from the start of that word's sentence.
    pub async fn seek(&self, word: usize) -> Result<(), SourceError> {
        let was_active = self.inner.status().is_active();
        if was_active {
            self.cancel().await;
        }

        let word = {
            let mut document = self.inner.document.lock().await;
            while document.word_count() <= word && document.load_more().await? {}
            word.min(document.word_count().saturating_sub(1))
        };

        self.inner.stale.store(true, Ordering::SeqCst);
        self.inner.update(|s| {
            s.current_word_index = word;
            if s.status == ReadingStatus::Restartable {
                s.status = ReadingStatus::Idle;
            }
        });

        if was_active {
            self.start().await;
        }
        Ok(())
    }

    /// Pull more text from the source. Returns false once it is exhausted.
    pub async fn load_more(&self) -> Result<bool, SourceError> {
        self.inner.document.lock().await.load_more().await
    }

    pub async fn can_step_back(&self) -> bool {
        let current = self.inner.current_word();
        self.inner
            .document
            .lock()
            .await
            .sentence_boundary(current, Direction::Backward)
            .is_some()
    }

    pub async fn can_step_forward(&self) -> bool {
        let current = self.inner.current_word();
        self.inner
            .document
            .lock()
            .await
            .sentence_boundary(current, Direction::Forward)
            .is_some()
    }

    /// Text loaded so far.
    pub async fn text(&self) -> String {
        self.inner.document.lock().await.text().to_string()
    }

    pub fn state(&self) -> ReadingState {
        self.inner.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ReadingState> {
        self.inner.state.subscribe()
    }
}

impl Drop for ReadingSession {
    fn drop(&mut self) {
        if let Some(task) = self.play_task.get_mut().take() {
            task.abort();
        }
    }
}
