//! Default audio device output via rodio.
//!
//! rodio's `OutputStream` must stay on the thread that created it, so a
//! dedicated thread owns the stream and sink and takes commands over a channel.

use rodio::buffer::SamplesBuffer;
use rodio::source::EmptyCallback;
use rodio::{OutputStream, Sink, Source};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::Duration;
use tokio::sync::oneshot;

use super::PlaybackError;
use super::output::AudioOutput;

enum Command {
    Play(Vec<f32>, oneshot::Sender<()>),
    Stop,
    Shutdown,
}

pub struct SpeakerOutput {
    sample_rate: u32,
    rendered: Arc<AtomicU64>,
    commands: Mutex<mpsc::Sender<Command>>,
}

impl SpeakerOutput {
    /// Open the default output device.
    pub fn open(sample_rate: u32) -> Result<Self, PlaybackError> {
        let rendered = Arc::new(AtomicU64::new(0));
        let (commands, rx) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::channel();

        let counter = rendered.clone();
        thread::Builder::new()
            .name("readalong-audio".into())
            .spawn(move || run_device(sample_rate, counter, rx, ready_tx))
            .map_err(|e| PlaybackError::Device(format!("Failed to start audio thread: {}", e)))?;

        ready_rx
            .recv()
            .map_err(|_| PlaybackError::Device("Audio thread exited during startup".into()))??;

        Ok(Self {
            sample_rate,
            rendered,
            commands: Mutex::new(commands),
        })
    }

    fn send(&self, command: Command) -> Result<(), PlaybackError> {
        self.commands
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .send(command)
            .map_err(|_| PlaybackError::Device("Audio thread is gone".into()))
    }
}

impl AudioOutput for SpeakerOutput {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn schedule(
        &self,
        samples: Vec<f32>,
        on_played: oneshot::Sender<()>,
    ) -> Result<(), PlaybackError> {
        self.send(Command::Play(samples, on_played))
    }

    fn frames_rendered(&self) -> u64 {
        self.rendered.load(Ordering::Acquire)
    }

    fn stop(&self) {
        if let Err(e) = self.send(Command::Stop) {
            log::warn!("Failed to stop audio: {}", e);
        }
    }
}

impl Drop for SpeakerOutput {
    fn drop(&mut self) {
        let _ = self.send(Command::Shutdown);
    }
}

fn run_device(
    sample_rate: u32,
    rendered: Arc<AtomicU64>,
    commands: mpsc::Receiver<Command>,
    ready: mpsc::Sender<Result<(), PlaybackError>>,
) {
    let opened = OutputStream::try_default()
        .map_err(|e| PlaybackError::Device(e.to_string()))
        .and_then(|(stream, handle)| {
            Sink::try_new(&handle)
                .map(|sink| (stream, sink))
                .map_err(|e| PlaybackError::Device(e.to_string()))
        });

    let (_stream, sink) = match opened {
        Ok(device) => {
            let _ = ready.send(Ok(()));
            device
        }
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };
    log::debug!("Audio device open at {} Hz", sample_rate);

    while let Ok(command) = commands.recv() {
        match command {
            Command::Play(samples, on_played) => {
                let buffer = SamplesBuffer::new(1, sample_rate, samples);
                sink.append(Counted {
                    inner: buffer,
                    rendered: rendered.clone(),
                });

                let on_played = Mutex::new(Some(on_played));
                sink.append(EmptyCallback::<f32>::new(Box::new(move || {
                    if let Some(tx) = on_played.lock().ok().and_then(|mut tx| tx.take()) {
                        let _ = tx.send(());
                    }
                })));
            }
            Command::Stop => {
                sink.clear();
                // clear() leaves the sink paused
                sink.play();
            }
            Command::Shutdown => break,
        }
    }

    sink.stop();
}

/// Passes samples through, counting each one handed to the device.
struct Counted<S> {
    inner: S,
    rendered: Arc<AtomicU64>,
}

impl<S> Iterator for Counted<S>
where
    S: Source<Item = f32>,
{
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        let sample = self.inner.next()?;
        self.rendered.fetch_add(1, Ordering::Release);
        Some(sample)
    }
}

impl<S> Source for Counted<S>
where
    S: Source<Item = f32>,
{
    fn current_frame_len(&self) -> Option<usize> {
        self.inner.current_frame_len()
    }

    fn channels(&self) -> u16 {
        self.inner.channels()
    }

    fn sample_rate(&self) -> u32 {
        self.inner.sample_rate()
    }

    fn total_duration(&self) -> Option<Duration> {
        self.inner.total_duration()
    }
}
