//! Audio sinks the engine can drive.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::PlaybackError;

/// Somewhere to play mono f32 samples.
///
/// Buffers play back-to-back in scheduling order. `frames_rendered` counts
/// frames the device has actually consumed; it never runs ahead of playback
/// and does not advance while nothing is scheduled.
pub trait AudioOutput: Send + Sync {
    fn sample_rate(&self) -> u32;

    /// Queue samples after everything already scheduled. `on_played` fires
    /// once they have been rendered; it is dropped if playback is stopped first.
    fn schedule(&self, samples: Vec<f32>, on_played: oneshot::Sender<()>)
    -> Result<(), PlaybackError>;

    fn frames_rendered(&self) -> u64;

    /// Discard everything scheduled and go quiet.
    fn stop(&self);
}

pub(crate) fn frames_to_duration(frames: u64, sample_rate: u32) -> Duration {
    Duration::from_nanos(frames.saturating_mul(1_000_000_000) / sample_rate.max(1) as u64)
}

/// An output with no device: it "plays" by letting tokio time pass.
///
/// Used for `--silent` runs and in tests, where paused time makes playback
/// instantaneous but still correctly ordered.
pub struct VirtualOutput {
    sample_rate: u32,
    state: Mutex<VirtualState>,
}

#[derive(Default)]
struct VirtualState {
    /// Frames from segments that have completely played
    played: u64,
    segments: VecDeque<Segment>,
    timers: Vec<JoinHandle<()>>,
}

struct Segment {
    start: Instant,
    end: Instant,
    frames: u64,
}

impl VirtualOutput {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            state: Mutex::new(VirtualState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, VirtualState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn rendered_at(&self, st: &mut VirtualState, now: Instant) -> u64 {
        while st.segments.front().is_some_and(|seg| seg.end <= now) {
            if let Some(seg) = st.segments.pop_front() {
                st.played += seg.frames;
            }
        }

        let partial = st.segments.front().map_or(0, |seg| {
            let elapsed = now.saturating_duration_since(seg.start);
            let frames = elapsed.as_nanos() * self.sample_rate as u128 / 1_000_000_000;
            (frames as u64).min(seg.frames)
        });

        st.played + partial
    }
}

impl AudioOutput for VirtualOutput {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn schedule(
        &self,
        samples: Vec<f32>,
        on_played: oneshot::Sender<()>,
    ) -> Result<(), PlaybackError> {
        let now = Instant::now();
        let frames = samples.len() as u64;
        let mut st = self.state();

        let start = st.segments.back().map_or(now, |seg| seg.end.max(now));
        let end = start + frames_to_duration(frames, self.sample_rate);
        st.segments.push_back(Segment { start, end, frames });

        st.timers.retain(|t| !t.is_finished());
        st.timers.push(tokio::spawn(async move {
            tokio::time::sleep_until(end).await;
            let _ = on_played.send(());
        }));

        Ok(())
    }

    fn frames_rendered(&self) -> u64 {
        let mut st = self.state();
        self.rendered_at(&mut st, Instant::now())
    }

    fn stop(&self) {
        let mut st = self.state();
        let rendered = self.rendered_at(&mut st, Instant::now());
        st.played = rendered;
        st.segments.clear();
        for timer in st.timers.drain(..) {
            timer.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_clock_follows_time() {
        let output = VirtualOutput::new(1_000);
        let (tx, rx) = oneshot::channel();
        output.schedule(vec![0.0; 500], tx).unwrap();

        assert_eq!(output.frames_rendered(), 0);
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(output.frames_rendered(), 200);

        rx.await.unwrap();
        assert_eq!(output.frames_rendered(), 500);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(output.frames_rendered(), 500);
    }

    #[tokio::test(start_paused = true)]
    async fn test_buffers_play_back_to_back() {
        let output = VirtualOutput::new(1_000);
        let (tx1, rx1) = oneshot::channel();
        let (tx2, rx2) = oneshot::channel();
        output.schedule(vec![0.0; 100], tx1).unwrap();
        output.schedule(vec![0.0; 300], tx2).unwrap();

        let start = Instant::now();
        rx1.await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_millis(100));
        rx2.await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_millis(400));
        assert_eq!(output.frames_rendered(), 400);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_gap_does_not_count() {
        let output = VirtualOutput::new(1_000);
        let (tx, rx) = oneshot::channel();
        output.schedule(vec![0.0; 100], tx).unwrap();
        rx.await.unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        let (tx, _rx) = oneshot::channel();
        output.schedule(vec![0.0; 100], tx).unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(output.frames_rendered(), 130);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_drops_pending() {
        let output = VirtualOutput::new(1_000);
        let (tx, rx) = oneshot::channel();
        output.schedule(vec![0.0; 1_000], tx).unwrap();
        tokio::time::sleep(Duration::from_millis(250)).await;

        output.stop();
        assert!(rx.await.is_err());
        assert_eq!(output.frames_rendered(), 250);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(output.frames_rendered(), 250);
    }
}
