//! Error types for the debate system.

use thiserror::Error;

use crate::speaker::Speaker;

/// Failure to obtain a reply from the text-generation provider.
#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("Generation provider returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Generation provider returned no candidates")]
    NoCandidates,

    #[error("Generation provider returned an empty reply")]
    EmptyReply,

    #[error("Reply was attributed to {actual}, expected {expected}")]
    WrongSpeaker { expected: Speaker, actual: Speaker },

    #[error("Generation request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("OpenAI API error: {0}")]
    OpenAIError(#[from] async_openai::error::OpenAIError),
}

/// Failure to turn text into an audio payload.
#[derive(Error, Debug)]
pub enum SynthesisError {
    #[error("Speech provider returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Speech provider returned no audio")]
    EmptyAudio,

    #[error("Speech request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("TTS engine error: {0}")]
    Engine(String),

    #[error("Failed to encode audio: {0}")]
    Encode(#[from] hound::Error),
}

/// The platform refused to start playback of a synthesized payload.
#[derive(Error, Debug)]
pub enum PlaybackError {
    #[error("No audio output device available: {0}")]
    Device(String),

    #[error("Audio payload could not be decoded: {0}")]
    Decode(String),

    #[error("Audio handle was already started")]
    AlreadyStarted,

    #[error("Playback thread exited before starting")]
    Aborted,
}

/// Errors surfaced to the front-end: setup failures and the terminal
/// stop of a running debate.
#[derive(Error, Debug)]
pub enum DebateError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Giving up on {speaker} after {attempts} failed generation attempts: {last_error}")]
    RetriesExhausted {
        speaker: Speaker,
        attempts: u32,
        last_error: String,
    },

    #[error("Debate orchestrator is no longer running")]
    OrchestratorClosed,
}
