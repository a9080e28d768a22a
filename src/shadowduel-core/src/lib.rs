//! ShadowDuel Core Library
//!
//! Two AI personas argue in alternating turns; each reply is voiced and
//! the next turn starts when playback ends. The turn state machine lives in
//! [`session`], the async driver in [`orchestrator`], and the generation and
//! speech providers behind the [`ReplyGenerator`] and [`SpeechSynthesizer`]
//! traits.

pub mod config;
pub mod elevenlabs;
pub mod error;
pub mod gemini;
pub mod generation;
pub mod kokoro;
pub mod openai;
pub mod orchestrator;
pub mod playback;
pub mod session;
pub mod speaker;
pub mod speech;

pub use config::{Config, GenerationProvider, SpeechProvider, default_config};
pub use elevenlabs::ElevenLabsSynthesizer;
pub use error::{DebateError, GenerationError, PlaybackError, SynthesisError};
pub use gemini::GeminiGenerator;
pub use generation::ReplyGenerator;
pub use kokoro::KokoroSynthesizer;
pub use openai::OpenAIGenerator;
pub use orchestrator::{DebateHandle, DebateOrchestrator};
pub use session::{Notice, Phase, SessionSnapshot, TurnSettings};
pub use speaker::{Speaker, Turn};
pub use speech::{AudioHandle, SpeechSynthesizer};
