//! Gapless playback of synthesized chunks with live word tracking.

pub mod output;
pub mod pcm;
#[cfg(feature = "speaker")]
pub mod speaker;
pub mod timing;

pub use output::{AudioOutput, VirtualOutput};
pub use pcm::DEFAULT_CROSSFADE_SAMPLES;
#[cfg(feature = "speaker")]
pub use speaker::SpeakerOutput;
pub use timing::{DEFAULT_POLL_INTERVAL, WordTimeline};

use futures_util::Stream;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;

use output::frames_to_duration;
use pcm::{Smoother, decode_pcm16};

#[derive(Error, Debug, Clone)]
pub enum PlaybackError {
    #[error("Invalid audio: {0}")]
    InvalidAudio(String),

    #[error("Audio device error: {0}")]
    Device(String),

    #[error("Playback stopped")]
    Stopped,
}

/// A buffer handed to the output, with its place on the render clock.
#[derive(Debug)]
pub struct ScheduledAudio {
    /// Render-clock frame at which this buffer starts
    pub start_frame: u64,
    pub frames: u64,
    pub sample_rate: u32,
    done: oneshot::Receiver<()>,
}

impl ScheduledAudio {
    pub fn duration(&self) -> Duration {
        frames_to_duration(self.frames, self.sample_rate)
    }

    /// Wait until the buffer has played. Fails if playback was stopped first.
    pub async fn finished(self) -> Result<(), PlaybackError> {
        self.done.await.map_err(|_| PlaybackError::Stopped)
    }
}

struct EngineState {
    smoother: Smoother,
    /// Render-clock frame where the next buffer will start
    scheduled_end: u64,
}

pub struct PlaybackEngine {
    output: Arc<dyn AudioOutput>,
    state: Mutex<EngineState>,
    poll_interval: Duration,
}

impl PlaybackEngine {
    pub fn new(output: Arc<dyn AudioOutput>, crossfade_samples: usize, poll_interval: Duration) -> Self {
        Self {
            output,
            state: Mutex::new(EngineState {
                smoother: Smoother::new(crossfade_samples),
                scheduled_end: 0,
            }),
            poll_interval,
        }
    }

    fn state(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn sample_rate(&self) -> u32 {
        self.output.sample_rate()
    }

    /// Queue PCM16 audio right after whatever is already scheduled.
    pub fn schedule(&self, audio: &[u8]) -> Result<ScheduledAudio, PlaybackError> {
        let samples = decode_pcm16(audio)?;
        let (tx, done) = oneshot::channel();

        let mut st = self.state();
        let samples = st.smoother.process(samples);
        let frames = samples.len() as u64;
        let start_frame = st.scheduled_end.max(self.output.frames_rendered());

        self.output.schedule(samples, tx)?;
        st.scheduled_end = start_frame + frames;

        Ok(ScheduledAudio {
            start_frame,
            frames,
            sample_rate: self.output.sample_rate(),
            done,
        })
    }

    /// Schedule `audio` and wait for it to finish playing.
    pub async fn queue(&self, audio: &[u8]) -> Result<(), PlaybackError> {
        self.schedule(audio)?.finished().await
    }

    /// Indices (into `words`) of the word being spoken as `scheduled` plays.
    pub fn word_stream<S: AsRef<str>>(
        &self,
        words: &[S],
        scheduled: &ScheduledAudio,
    ) -> impl Stream<Item = usize> + Send + 'static {
        let timeline = WordTimeline::new(words, scheduled.duration());
        timing::word_stream(
            timeline,
            self.output.clone(),
            scheduled.start_frame,
            scheduled.frames,
            self.poll_interval,
        )
    }

    /// Silence the output and drop everything scheduled.
    pub fn stop(&self) {
        let mut st = self.state();
        self.output.stop();
        st.scheduled_end = self.output.frames_rendered();
        st.smoother.reset_tail();
    }
}
