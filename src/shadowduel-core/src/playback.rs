//! Local audio output through rodio.
//!
//! The output stream is opened on a dedicated thread per utterance; the
//! thread reports whether playback started, then either fires the
//! completion signal at natural end or exits quietly when stopped.

use async_trait::async_trait;
use rodio::{Decoder, OutputStreamBuilder, Sink};
use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::error::PlaybackError;
use crate::speech::{AudioHandle, PlaybackCompletion, PlaybackSignal};

const STOP_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// An encoded payload (MP3, WAV, ...) played on the default output device.
pub struct RodioAudio {
    payload: Option<Vec<u8>>,
    stop: Arc<AtomicBool>,
}

impl RodioAudio {
    pub fn new(payload: Vec<u8>) -> Self {
        Self {
            payload: Some(payload),
            stop: Arc::new(AtomicBool::new(false)),
        }
    }
}

#[async_trait]
impl AudioHandle for RodioAudio {
    async fn start(&mut self) -> Result<PlaybackCompletion, PlaybackError> {
        let payload = self.payload.take().ok_or(PlaybackError::AlreadyStarted)?;
        let (ready_tx, ready_rx) = oneshot::channel();
        let (signal, completion) = PlaybackCompletion::channel();
        let stop = Arc::clone(&self.stop);

        std::thread::Builder::new()
            .name("shadowduel-playback".to_string())
            .spawn(move || play_blocking(payload, stop, ready_tx, signal))
            .map_err(|e| PlaybackError::Device(format!("Failed to spawn playback thread: {}", e)))?;

        ready_rx.await.map_err(|_| PlaybackError::Aborted)??;
        Ok(completion)
    }

    fn stop(&mut self) {
        self.payload = None;
        self.stop.store(true, Ordering::Release);
    }
}

impl Drop for RodioAudio {
    fn drop(&mut self) {
        self.stop();
    }
}

fn play_blocking(
    payload: Vec<u8>,
    stop: Arc<AtomicBool>,
    ready: oneshot::Sender<Result<(), PlaybackError>>,
    signal: PlaybackSignal,
) {
    let mut stream = match OutputStreamBuilder::open_default_stream() {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready.send(Err(PlaybackError::Device(e.to_string())));
            return;
        }
    };
    stream.log_on_drop(false);

    let source = match Decoder::new(Cursor::new(payload)) {
        Ok(source) => source,
        Err(e) => {
            let _ = ready.send(Err(PlaybackError::Decode(e.to_string())));
            return;
        }
    };

    let sink = Sink::connect_new(stream.mixer());
    sink.append(source);

    if ready.send(Ok(())).is_err() {
        warn!("playback starter went away before audio began");
        sink.stop();
        return;
    }

    while !sink.empty() {
        if stop.load(Ordering::Acquire) {
            sink.stop();
            debug!("playback stopped before natural end");
            return;
        }
        std::thread::sleep(STOP_POLL_INTERVAL);
    }

    signal.finish();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stop_before_start_is_idempotent() {
        let mut audio = RodioAudio::new(vec![1, 2, 3]);
        audio.stop();
        audio.stop();
        assert!(matches!(
            audio.start().await,
            Err(PlaybackError::AlreadyStarted)
        ));
    }
}
