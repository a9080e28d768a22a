//! Speech synthesis client contract.
//!
//! A [`SpeechSynthesizer`] turns a reply into an [`AudioHandle`]. Starting
//! the handle yields a [`PlaybackCompletion`], a one-shot future that
//! resolves exactly once: `true` when the audio ran to its natural end,
//! `false` when the handle was stopped or dropped first.

use async_trait::async_trait;
use tokio::sync::oneshot;

use crate::error::{PlaybackError, SynthesisError};
use crate::speaker::Speaker;

/// Voice identity and speaking rate for one debater.
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceProfile {
    pub voice_id: String,
    pub speaking_rate: f32,
}

/// Static speaker to voice mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceMap {
    pub a: VoiceProfile,
    pub b: VoiceProfile,
}

impl VoiceMap {
    pub fn for_speaker(&self, speaker: Speaker) -> &VoiceProfile {
        match speaker {
            Speaker::A => &self.a,
            Speaker::B => &self.b,
        }
    }
}

#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesize `text` in `speaker`'s voice. Playback does not begin until
    /// [`AudioHandle::start`] is called.
    async fn synthesize(
        &self,
        text: &str,
        speaker: Speaker,
    ) -> Result<Box<dyn AudioHandle>, SynthesisError>;
}

/// Playable audio owned by whoever holds the handle.
#[async_trait]
pub trait AudioHandle: Send {
    /// Begin playback.
    async fn start(&mut self) -> Result<PlaybackCompletion, PlaybackError>;

    /// Stop playback and release the output. Idempotent, and a no-op after
    /// natural completion.
    fn stop(&mut self);
}

/// Fires the matching [`PlaybackCompletion`] on natural end.
#[derive(Debug)]
pub struct PlaybackSignal(oneshot::Sender<()>);

impl PlaybackSignal {
    pub fn finish(self) {
        let _ = self.0.send(());
    }
}

/// Resolves once playback ends or is cancelled.
#[derive(Debug)]
pub struct PlaybackCompletion(oneshot::Receiver<()>);

impl PlaybackCompletion {
    pub fn channel() -> (PlaybackSignal, PlaybackCompletion) {
        let (tx, rx) = oneshot::channel();
        (PlaybackSignal(tx), PlaybackCompletion(rx))
    }

    /// `true` on natural end, `false` if the signal was dropped unfired.
    pub async fn ended(self) -> bool {
        self.0.await.is_ok()
    }
}
