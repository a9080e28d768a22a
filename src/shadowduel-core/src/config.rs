//! Configuration module for loading TOML config files.
//!
//! Every section is optional; anything missing falls back to the defaults
//! returned by [`default_config`]. Credentials are never read from here.

use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::DebateError;
use crate::generation::{GenerationParams, Personas};
use crate::session::TurnSettings;
use crate::speaker::Speaker;
use crate::speech::{VoiceMap, VoiceProfile};

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub debate: DebateSettings,
    pub timing: TimingConfig,
    pub generation: GenerationConfig,
    pub speech: SpeechConfig,
    pub speakers: SpeakersConfig,
    pub logging: LoggingConfig,
}

/// What the debate is about and who opens it.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DebateSettings {
    pub topic: String,
    pub opening_speaker: Speaker,
    /// Counterpart input handed to the opening speaker, since the transcript
    /// is empty on the first turn.
    pub opening_prompt: String,
}

impl Default for DebateSettings {
    fn default() -> Self {
        Self {
            topic: "which AI lab builds the superior technology".to_string(),
            opening_speaker: Speaker::A,
            opening_prompt: DEFAULT_OPENING_PROMPT.to_string(),
        }
    }
}

/// Retry and pacing constants for the turn loop.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub fallback_delay_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base_ms: 1000,
            fallback_delay_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationProvider {
    #[default]
    Gemini,
    OpenAI,
}

/// Text-generation provider settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub provider: GenerationProvider,
    /// Provider default is used when unset.
    pub model: Option<String>,
    /// Provider default is used when unset.
    pub api_base: Option<String>,
    pub max_output_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: GenerationProvider::Gemini,
            model: None,
            api_base: None,
            max_output_tokens: 250,
            temperature: 0.9,
            top_p: 0.95,
            top_k: 40,
            request_timeout_secs: 120,
            connect_timeout_secs: 30,
        }
    }
}

impl GenerationConfig {
    pub fn model(&self) -> &str {
        match (&self.model, self.provider) {
            (Some(model), _) => model,
            (None, GenerationProvider::Gemini) => "gemini-2.0-flash",
            (None, GenerationProvider::OpenAI) => "gpt-4o-mini",
        }
    }

    pub fn api_base(&self) -> &str {
        match (&self.api_base, self.provider) {
            (Some(base), _) => base,
            (None, GenerationProvider::Gemini) => "https://generativelanguage.googleapis.com/v1beta",
            (None, GenerationProvider::OpenAI) => "https://api.openai.com/v1",
        }
    }

    pub fn params(&self) -> GenerationParams {
        GenerationParams {
            max_output_tokens: self.max_output_tokens,
            temperature: self.temperature,
            top_p: self.top_p,
            top_k: self.top_k,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeechProvider {
    #[default]
    ElevenLabs,
    Kokoro,
}

/// Speech provider settings shared by both voices.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    pub provider: SpeechProvider,
    pub api_base: String,
    pub model_id: String,
    pub stability: f32,
    pub similarity_boost: f32,
    pub request_timeout_secs: u64,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            provider: SpeechProvider::ElevenLabs,
            api_base: "https://api.elevenlabs.io/v1".to_string(),
            model_id: "eleven_multilingual_v2".to_string(),
            stability: 0.5,
            similarity_boost: 0.75,
            request_timeout_secs: 60,
        }
    }
}

/// Per-debater persona and voice.
#[derive(Debug, Clone)]
pub struct SpeakerConfig {
    pub name: String,
    pub persona: String,
    /// ElevenLabs voice.
    pub voice_id: String,
    /// Kokoro voice, used when the speech provider is `kokoro`.
    pub local_voice_id: String,
    pub speaking_rate: f32,
}

/// A `[speakers.x]` table as written. Missing keys keep that speaker's
/// defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SpeakerOverride {
    name: Option<String>,
    persona: Option<String>,
    voice_id: Option<String>,
    local_voice_id: Option<String>,
    speaking_rate: Option<f32>,
}

impl SpeakerOverride {
    fn apply(self, speaker: &mut SpeakerConfig) {
        if let Some(name) = self.name {
            speaker.name = name;
        }
        if let Some(persona) = self.persona {
            speaker.persona = persona;
        }
        if let Some(voice_id) = self.voice_id {
            speaker.voice_id = voice_id;
        }
        if let Some(local_voice_id) = self.local_voice_id {
            speaker.local_voice_id = local_voice_id;
        }
        if let Some(rate) = self.speaking_rate {
            speaker.speaking_rate = rate;
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SpeakersOverride {
    a: SpeakerOverride,
    b: SpeakerOverride,
}

impl From<SpeakersOverride> for SpeakersConfig {
    fn from(overrides: SpeakersOverride) -> Self {
        let mut speakers = SpeakersConfig::default();
        overrides.a.apply(&mut speakers.a);
        overrides.b.apply(&mut speakers.b);
        speakers
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(from = "SpeakersOverride")]
pub struct SpeakersConfig {
    pub a: SpeakerConfig,
    pub b: SpeakerConfig,
}

impl Default for SpeakersConfig {
    fn default() -> Self {
        Self {
            a: SpeakerConfig {
                name: "ChatGPT".to_string(),
                persona: DEFAULT_PERSONA_A.to_string(),
                voice_id: "EXAVITQu4vr4xnSDxMaL".to_string(),
                local_voice_id: "bf_emma".to_string(),
                speaking_rate: 1.0,
            },
            b: SpeakerConfig {
                name: "Gemini".to_string(),
                persona: DEFAULT_PERSONA_B.to_string(),
                voice_id: "XB0fDUnXU5powFXDhCwa".to_string(),
                local_voice_id: "af_sky".to_string(),
                speaking_rate: 1.0,
            },
        }
    }
}

impl SpeakersConfig {
    pub fn get(&self, speaker: Speaker) -> &SpeakerConfig {
        match speaker {
            Speaker::A => &self.a,
            Speaker::B => &self.b,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. `"warn"` or `"shadowduel_core=debug"`.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, DebateError> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| DebateError::ConfigError(format!("Failed to read config: {}", e)))?;

        Self::from_str(&content)
    }

    /// Load configuration from string content.
    pub fn from_str(content: &str) -> Result<Self, DebateError> {
        let config: Config = toml::from_str(content)
            .map_err(|e| DebateError::ConfigError(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the providers would refuse anyway.
    pub fn validate(&self) -> Result<(), DebateError> {
        if self.timing.max_retries > MAX_RETRIES_LIMIT {
            return Err(DebateError::ConfigError(format!(
                "timing.max_retries must be at most {}, got {}",
                MAX_RETRIES_LIMIT, self.timing.max_retries
            )));
        }
        for (key, value) in [
            ("backoff_base_ms", self.timing.backoff_base_ms),
            ("fallback_delay_ms", self.timing.fallback_delay_ms),
        ] {
            if value > MAX_DELAY_MS {
                return Err(DebateError::ConfigError(format!(
                    "timing.{} must be at most {} ms, got {}",
                    key, MAX_DELAY_MS, value
                )));
            }
        }
        if self.generation.max_output_tokens == 0 {
            return Err(DebateError::ConfigError(
                "generation.max_output_tokens must be greater than 0".to_string(),
            ));
        }
        if !(0.0..=2.0).contains(&self.generation.temperature) {
            return Err(DebateError::ConfigError(format!(
                "generation.temperature must be between 0.0 and 2.0, got {}",
                self.generation.temperature
            )));
        }
        if !(0.0..=1.0).contains(&self.generation.top_p) {
            return Err(DebateError::ConfigError(format!(
                "generation.top_p must be between 0.0 and 1.0, got {}",
                self.generation.top_p
            )));
        }
        for speaker in [Speaker::A, Speaker::B] {
            let rate = self.speakers.get(speaker).speaking_rate;
            if rate <= 0.0 || rate > 4.0 {
                return Err(DebateError::ConfigError(format!(
                    "speaking_rate for {} must be in (0, 4], got {}",
                    speaker, rate
                )));
            }
        }
        Ok(())
    }

    /// Persona for `speaker` with placeholders replaced.
    pub fn persona(&self, speaker: Speaker) -> String {
        self.render(&self.speakers.get(speaker).persona, speaker)
    }

    /// Opening prompt as seen by the opening speaker.
    pub fn opening_prompt(&self) -> String {
        self.render(&self.debate.opening_prompt, self.debate.opening_speaker)
    }

    pub fn personas(&self) -> Personas {
        Personas {
            a: self.persona(Speaker::A),
            b: self.persona(Speaker::B),
        }
    }

    /// Voice for `speaker` under the configured speech provider.
    pub fn voice(&self, speaker: Speaker) -> VoiceProfile {
        let cfg = self.speakers.get(speaker);
        let voice_id = match self.speech.provider {
            SpeechProvider::ElevenLabs => cfg.voice_id.clone(),
            SpeechProvider::Kokoro => cfg.local_voice_id.clone(),
        };
        VoiceProfile {
            voice_id,
            speaking_rate: cfg.speaking_rate,
        }
    }

    pub fn voices(&self) -> VoiceMap {
        VoiceMap {
            a: self.voice(Speaker::A),
            b: self.voice(Speaker::B),
        }
    }

    pub fn turn_settings(&self) -> TurnSettings {
        TurnSettings {
            opening_speaker: self.debate.opening_speaker,
            max_retries: self.timing.max_retries,
            backoff_base: Duration::from_millis(self.timing.backoff_base_ms),
            fallback_delay: Duration::from_millis(self.timing.fallback_delay_ms),
        }
    }

    pub fn speaker_name(&self, speaker: Speaker) -> &str {
        &self.speakers.get(speaker).name
    }

    fn render(&self, template: &str, speaker: Speaker) -> String {
        template
            .replace("{name}", self.speaker_name(speaker))
            .replace("{opponent_name}", self.speaker_name(speaker.complement()))
            .replace("{topic}", &self.debate.topic)
    }
}

const MAX_RETRIES_LIMIT: u32 = 100;

/// Ten minutes.
const MAX_DELAY_MS: u64 = 600_000;

/// Default configuration embedded in the binary.
pub fn default_config() -> Config {
    Config::default()
}

const DEFAULT_OPENING_PROMPT: &str = "Open a tense debate with {opponent_name} about {topic}. \
Be brief, confrontational, and straight to the point.";

const DEFAULT_PERSONA_A: &str = r#"You are {name}, and you are locked in a heated live debate with {opponent_name} about {topic}.

HOW YOU SPEAK:
- Two or three sentences at most, every one of them charged with emotion
- Sound like a real person under pressure: interruptions, disbelief, sarcasm, dramatic pauses...
- CAPS for the words you would shout, dashes when you cut yourself off-
- Short vocal cues are allowed: *scoffs*, *sighs*, *laughs*

HOW YOU ARGUE:
- Attack the last thing {opponent_name} said, directly
- Never concede a point; push harder when cornered
- Stay on the topic and stay in character as {name} at all times
"#;

const DEFAULT_PERSONA_B: &str = r#"You are {name}, facing {opponent_name} in an intense, emotional debate about {topic}.

HOW YOU SPEAK:
- Keep it to two or three sentences, packed with personality
- Mock, dismiss, and needle; rhetorical questions are your favourite weapon
- CAPS for emphasis, ellipses for effect..., dashes to cut your opponent off-
- Short vocal cues are allowed: *smirks*, *shakes head*, *laughs*

HOW YOU ARGUE:
- Go straight after the weakest part of {opponent_name}'s last point
- Never back down; escalate when challenged
- Stay on the topic and never break character as {name}
"#;
